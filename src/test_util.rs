//! Shared helpers for tests that start child processes.

use tokio::sync::Mutex;

/// Serializes tests that fork.
///
/// A script written by one test can still be open for writing in a child
/// forked by another, and executing it then fails with ETXTBSY.
pub(crate) static SPAWN_LOCK: Mutex<()> = Mutex::const_new(());
