//! beacon-dns - supervise an mDNS reflector between two network interfaces.
//!
//! This library lists the local IPv4 interfaces that can be bridged and runs
//! the external `mdns-reflector` helper between two of them, capturing its
//! output and tracking its lifecycle.

pub mod config;
pub mod error;
pub mod log_buffer;
pub mod logging;
pub mod net;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_util;

pub use config::{SupervisorConfig, HELPER_NAME};
pub use error::{Error, Result};
pub use log_buffer::{LogBuffer, MAX_LOG_CHARACTERS};
pub use net::{
    friendly_name, list_interfaces, InterfaceEnumerator, InterfaceSource, NetworkInterface,
    RawInterface, SubnetPrefix, SystemInterfaces,
};
pub use supervisor::{FixedHelper, HelperLocator, ResourceRoots, Supervisor, SupervisorState};

/// Package name.
pub const PACKAGE: &str = "beacon-dns";
