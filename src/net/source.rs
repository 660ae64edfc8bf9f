//! Raw interface descriptors read from the operating system.

use std::net::IpAddr;

use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use nix::sys::socket::SockaddrStorage;

use crate::error::{Error, Result};

/// One entry of the OS interface table, before any filtering.
///
/// An interface with several addresses appears once per address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInterface {
    /// OS-level interface name (e.g., "en0", "eth0").
    pub name: String,
    /// Interface is administratively up.
    pub is_up: bool,
    /// Interface is flagged as loopback.
    pub is_loopback: bool,
    /// Address assigned by this entry, if any.
    pub address: Option<IpAddr>,
    /// Netmask for `address`, if the OS reported one.
    pub netmask: Option<IpAddr>,
}

/// Capability to read the live interface table.
pub trait InterfaceSource {
    /// Return every entry of the interface table.
    fn interfaces(&self) -> Result<Vec<RawInterface>>;
}

/// Interface table backed by `getifaddrs(3)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> Result<Vec<RawInterface>> {
        let addrs = getifaddrs().map_err(|e| Error::InterfaceQuery(e.to_string()))?;

        Ok(addrs
            .map(|ifaddr| RawInterface {
                is_up: ifaddr.flags.contains(InterfaceFlags::IFF_UP),
                is_loopback: ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK),
                address: ifaddr.address.as_ref().and_then(ip_of),
                netmask: ifaddr.netmask.as_ref().and_then(ip_of),
                name: ifaddr.interface_name,
            })
            .collect())
    }
}

fn ip_of(addr: &SockaddrStorage) -> Option<IpAddr> {
    if let Some(sin) = addr.as_sockaddr_in() {
        return Some(IpAddr::V4(sin.ip()));
    }
    addr.as_sockaddr_in6().map(|sin6| IpAddr::V6(sin6.ip()))
}
