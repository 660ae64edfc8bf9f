//! Configuration loading.

pub mod supervisor;

pub use supervisor::{SupervisorConfig, HELPER_NAME};
