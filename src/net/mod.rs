//! Local network interface discovery.

pub mod enumerator;
pub mod interface;
pub mod source;

pub use enumerator::InterfaceEnumerator;
pub use interface::{friendly_name, NetworkInterface, SubnetPrefix};
pub use source::{InterfaceSource, RawInterface, SystemInterfaces};

/// List bridgeable interfaces from the live OS table.
pub fn list_interfaces() -> Vec<NetworkInterface> {
    InterfaceEnumerator::new().list_interfaces()
}
