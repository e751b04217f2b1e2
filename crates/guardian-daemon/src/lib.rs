//! guardian-daemon library: Exposes internal modules for testing.
//!
//! This is a thin library layer over the daemon components,
//! allowing integration tests to drive a daemon without stdin.

pub mod command;
pub mod config;
pub mod confirm;
pub mod daemon;
pub mod native_fs;
pub mod storage;

// Re-export key types for convenience
pub use command::{Command, CommandError};
pub use config::{Args, ConfigError, DaemonConfig};
pub use confirm::StdinConfirmer;
pub use daemon::Daemon;
pub use native_fs::NativeFs;
pub use storage::{CatalogStorage, PersistentStore};
