//! Display-ready network interface records.

use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

/// CIDR prefix length derived from an interface netmask.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubnetPrefix {
    /// Number of set bits in the netmask (0-32).
    Bits(u8),
    /// The netmask text did not parse into four octets; kept verbatim.
    Unparsed(String),
}

impl SubnetPrefix {
    /// Convert a dotted-decimal netmask into a prefix length.
    ///
    /// Counts set bits across all four octets, so a non-contiguous mask still
    /// yields its population count.
    pub fn from_mask(mask: &str) -> Self {
        let octets: Option<Vec<u8>> = mask.split('.').map(|part| part.parse().ok()).collect();

        match octets {
            Some(octets) if octets.len() == 4 => {
                SubnetPrefix::Bits(octets.iter().map(|b| b.count_ones()).sum::<u32>() as u8)
            }
            _ => SubnetPrefix::Unparsed(mask.to_string()),
        }
    }

    /// Numeric prefix length, if the mask was parsed.
    pub fn bits(&self) -> Option<u8> {
        match self {
            SubnetPrefix::Bits(bits) => Some(*bits),
            SubnetPrefix::Unparsed(_) => None,
        }
    }
}

impl fmt::Display for SubnetPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubnetPrefix::Bits(bits) => write!(f, "{}", bits),
            SubnetPrefix::Unparsed(raw) => write!(f, "{}", raw),
        }
    }
}

/// How a name prefix maps to a label.
enum Label {
    /// Fixed label.
    Fixed(&'static str),
    /// Label followed by the raw interface name.
    WithName(&'static str),
}

/// Prefix rules, checked in order after the `en0` special case.
const FRIENDLY_NAMES: &[(&str, Label)] = &[
    ("en", Label::WithName("Ethernet")),
    ("bridge", Label::WithName("Bridge")),
    ("utun", Label::Fixed("VPN Tunnel")),
    ("awdl", Label::Fixed("AirDrop")),
    ("llw", Label::Fixed("Low Latency WLAN")),
    ("vmnet", Label::Fixed("VM Network")),
    ("veth", Label::Fixed("Virtual Ethernet")),
];

/// Human-friendly label for an OS interface name.
pub fn friendly_name(name: &str) -> String {
    if name == "en0" {
        return "Wi-Fi / Ethernet".to_string();
    }

    FRIENDLY_NAMES
        .iter()
        .find(|(prefix, _)| name.starts_with(prefix))
        .map(|(_, label)| match label {
            Label::Fixed(text) => text.to_string(),
            Label::WithName(text) => format!("{} {}", text, name),
        })
        .unwrap_or_else(|| name.to_string())
}

/// A local IPv4 interface, ready to be offered for bridging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkInterface {
    /// Unique key within one enumeration (`{name}-{ip_address}`).
    pub id: String,
    /// Interface name (e.g., "en0", "eth0").
    pub name: String,
    /// Friendly label derived from `name`.
    pub display_name: String,
    /// IPv4 address assigned to the interface.
    pub ip_address: Ipv4Addr,
    /// Prefix length of the interface netmask.
    pub subnet_prefix: SubnetPrefix,
    /// Interface is up.
    pub is_up: bool,
}

impl NetworkInterface {
    /// Build a record from the interface name, address and netmask text.
    pub fn new(name: String, ip_address: Ipv4Addr, netmask: &str, is_up: bool) -> Self {
        Self {
            id: format!("{}-{}", name, ip_address),
            display_name: friendly_name(&name),
            subnet_prefix: SubnetPrefix::from_mask(netmask),
            name,
            ip_address,
            is_up,
        }
    }

    /// Network containing this interface, when the prefix is numeric.
    pub fn network(&self) -> Option<Ipv4Net> {
        let bits = self.subnet_prefix.bits()?;
        Ipv4Net::new(self.ip_address, bits).ok().map(|net| net.trunc())
    }
}

impl fmt::Display for NetworkInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) - {}/{}",
            self.display_name, self.name, self.ip_address, self.subnet_prefix
        )
    }
}
