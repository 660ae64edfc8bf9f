//! Enumeration of bridgeable local interfaces.

use std::net::IpAddr;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::net::interface::NetworkInterface;
use crate::net::source::{InterfaceSource, RawInterface, SystemInterfaces};

/// Lists local IPv4 interfaces and keeps the most recent listing.
pub struct InterfaceEnumerator<S = SystemInterfaces> {
    source: S,
    cached: Vec<NetworkInterface>,
}

impl InterfaceEnumerator<SystemInterfaces> {
    /// Create an enumerator over the live OS interface table.
    pub fn new() -> Self {
        Self::with_source(SystemInterfaces)
    }
}

impl Default for InterfaceEnumerator<SystemInterfaces> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: InterfaceSource> InterfaceEnumerator<S> {
    /// Create an enumerator over an arbitrary interface table and load it once.
    pub fn with_source(source: S) -> Self {
        let mut enumerator = Self {
            source,
            cached: Vec::new(),
        };
        enumerator.refresh();
        enumerator
    }

    /// Query the interface table and return a fresh, name-sorted listing.
    ///
    /// Loopback entries and entries without an IPv4 address are skipped. A
    /// table that cannot be read yields an empty list.
    pub fn list_interfaces(&self) -> Vec<NetworkInterface> {
        let entries = match self.source.interfaces() {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Interface table unavailable: {}", err);
                return Vec::new();
            }
        };

        let mut interfaces: Vec<NetworkInterface> =
            entries.into_iter().filter_map(materialize).collect();

        // Stable, so entries sharing a name keep table order
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(count = interfaces.len(), "Enumerated interfaces");
        interfaces
    }

    /// Re-read the interface table and cache the result.
    pub fn refresh(&mut self) -> &[NetworkInterface] {
        self.cached = self.list_interfaces();
        &self.cached
    }

    /// Listing from the last refresh.
    pub fn interfaces(&self) -> &[NetworkInterface] {
        &self.cached
    }

    /// Look up an interface by name in a fresh listing.
    pub fn find(&self, name: &str) -> Result<NetworkInterface> {
        self.list_interfaces()
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| Error::InterfaceNotFound(name.to_string()))
    }
}

/// Turn a raw table entry into a record, if it qualifies.
fn materialize(raw: RawInterface) -> Option<NetworkInterface> {
    if raw.is_loopback {
        return None;
    }

    let Some(IpAddr::V4(addr)) = raw.address else {
        return None;
    };
    if addr.is_loopback() {
        return None;
    }

    let mask = raw.netmask.map(|mask| mask.to_string()).unwrap_or_default();

    Some(NetworkInterface::new(raw.name, addr, &mask, raw.is_up))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::interface::SubnetPrefix;
    use std::net::{Ipv4Addr, Ipv6Addr};

    struct StaticTable(Vec<RawInterface>);

    impl InterfaceSource for StaticTable {
        fn interfaces(&self) -> Result<Vec<RawInterface>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenTable;

    impl InterfaceSource for BrokenTable {
        fn interfaces(&self) -> Result<Vec<RawInterface>> {
            Err(Error::InterfaceQuery("getifaddrs failed".to_string()))
        }
    }

    fn v4(name: &str, addr: [u8; 4], mask: [u8; 4]) -> RawInterface {
        RawInterface {
            name: name.to_string(),
            is_up: true,
            is_loopback: false,
            address: Some(IpAddr::V4(Ipv4Addr::from(addr))),
            netmask: Some(IpAddr::V4(Ipv4Addr::from(mask))),
        }
    }

    fn loopback() -> RawInterface {
        RawInterface {
            is_loopback: true,
            ..v4("lo0", [127, 0, 0, 1], [255, 0, 0, 0])
        }
    }

    #[test]
    fn test_loopback_only_table_is_empty() {
        let enumerator = InterfaceEnumerator::with_source(StaticTable(vec![
            loopback(),
            RawInterface {
                address: Some(IpAddr::V6(Ipv6Addr::LOCALHOST)),
                netmask: None,
                ..loopback()
            },
        ]));

        assert!(enumerator.list_interfaces().is_empty());
        assert!(enumerator.interfaces().is_empty());
    }

    #[test]
    fn test_skips_non_ipv4_and_addressless_entries() {
        let enumerator = InterfaceEnumerator::with_source(StaticTable(vec![
            RawInterface {
                address: Some(IpAddr::V6("fe80::1".parse().unwrap())),
                ..v4("en0", [0, 0, 0, 0], [0, 0, 0, 0])
            },
            RawInterface {
                address: None,
                netmask: None,
                ..v4("en1", [0, 0, 0, 0], [0, 0, 0, 0])
            },
            v4("en2", [10, 0, 0, 2], [255, 0, 0, 0]),
        ]));

        let names: Vec<_> = enumerator
            .list_interfaces()
            .into_iter()
            .map(|iface| iface.name)
            .collect();
        assert_eq!(names, vec!["en2"]);
    }

    #[test]
    fn test_sorted_by_name() {
        let enumerator = InterfaceEnumerator::with_source(StaticTable(vec![
            v4("utun3", [10, 8, 0, 2], [255, 255, 255, 255]),
            loopback(),
            v4("bridge100", [192, 168, 2, 1], [255, 255, 255, 0]),
            v4("en0", [192, 168, 1, 20], [255, 255, 255, 0]),
        ]));

        let listed = enumerator.list_interfaces();
        let names: Vec<_> = listed.iter().map(|iface| iface.name.as_str()).collect();
        assert_eq!(names, vec!["bridge100", "en0", "utun3"]);
        assert_eq!(listed, enumerator.list_interfaces());

        assert_eq!(listed[0].display_name, "Bridge bridge100");
        assert_eq!(listed[1].subnet_prefix, SubnetPrefix::Bits(24));
        assert_eq!(listed[2].subnet_prefix, SubnetPrefix::Bits(32));
    }

    #[test]
    fn test_multiple_addresses_keep_distinct_ids() {
        let enumerator = InterfaceEnumerator::with_source(StaticTable(vec![
            v4("en0", [192, 168, 1, 20], [255, 255, 255, 0]),
            v4("en0", [10, 0, 0, 20], [255, 0, 0, 0]),
        ]));

        let listed = enumerator.list_interfaces();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "en0-192.168.1.20");
        assert_eq!(listed[1].id, "en0-10.0.0.20");
    }

    #[test]
    fn test_missing_or_foreign_netmask_is_unparsed() {
        let enumerator = InterfaceEnumerator::with_source(StaticTable(vec![
            RawInterface {
                netmask: None,
                ..v4("en3", [10, 0, 0, 3], [0, 0, 0, 0])
            },
            RawInterface {
                netmask: Some(IpAddr::V6("ffff:ffff::".parse().unwrap())),
                ..v4("en4", [10, 0, 0, 4], [0, 0, 0, 0])
            },
        ]));

        let listed = enumerator.list_interfaces();
        assert_eq!(listed[0].subnet_prefix, SubnetPrefix::Unparsed(String::new()));
        assert_eq!(
            listed[1].subnet_prefix,
            SubnetPrefix::Unparsed("ffff:ffff::".to_string())
        );
    }

    #[test]
    fn test_down_interface_is_listed() {
        let enumerator = InterfaceEnumerator::with_source(StaticTable(vec![RawInterface {
            is_up: false,
            ..v4("vmnet8", [172, 16, 0, 1], [255, 255, 0, 0])
        }]));

        let listed = enumerator.list_interfaces();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].is_up);
        assert_eq!(listed[0].display_name, "VM Network");
    }

    #[test]
    fn test_broken_table_is_empty() {
        let enumerator = InterfaceEnumerator::with_source(BrokenTable);
        assert!(enumerator.list_interfaces().is_empty());
    }

    #[test]
    fn test_refresh_picks_up_changes() {
        let mut enumerator = InterfaceEnumerator::with_source(StaticTable(Vec::new()));
        assert!(enumerator.interfaces().is_empty());

        enumerator.source.0.push(v4("en1", [10, 1, 0, 1], [255, 255, 0, 0]));
        assert!(enumerator.interfaces().is_empty());
        assert_eq!(enumerator.refresh().len(), 1);
        assert_eq!(enumerator.interfaces()[0].name, "en1");
    }

    #[test]
    fn test_find() {
        let enumerator = InterfaceEnumerator::with_source(StaticTable(vec![v4(
            "en0",
            [192, 168, 1, 20],
            [255, 255, 255, 0],
        )]));

        assert_eq!(enumerator.find("en0").unwrap().ip_address, Ipv4Addr::new(192, 168, 1, 20));
        match enumerator.find("nonexistent_interface_xyz") {
            Err(Error::InterfaceNotFound(name)) => {
                assert_eq!(name, "nonexistent_interface_xyz");
            }
            _ => panic!("Expected InterfaceNotFound error"),
        }
    }

    #[test]
    fn test_list_system_interfaces() {
        // Host dependent; only check the guarantees that hold everywhere
        let listed = InterfaceEnumerator::new().list_interfaces();
        assert!(listed.windows(2).all(|pair| pair[0].name <= pair[1].name));
        assert!(listed.iter().all(|iface| !iface.ip_address.is_loopback()));
    }
}
