//! vulndb-curator - lifecycle management for vulnerability database bundles
//!
//! This crate keeps one versioned vulnerability database installed on disk:
//! - Update checks against a distribution source, throttled by a marker file
//! - Staged downloads and imports, validated before they become active
//! - Atomic promotion by rename, so readers never see a half-updated database
//! - Integrity (checksum, schema) and staleness validation on every read

pub mod archive;
pub mod config;
pub mod core;
pub mod db;
pub mod distribution;
pub mod installation;
pub mod logging;

#[cfg(test)]
mod test_support;

// Re-export commonly used items
pub use crate::config::CuratorConfig;
pub use crate::core::error::{CuratorError, ErrorRecovery, RecoveryAction, Result};
pub use crate::db::{Description, Reader, SchemaVersion, Status};
pub use crate::distribution::{Archive, Client, DistributionError, LocalMirror};
pub use crate::installation::{Curator, ProgressCallback, StagedProgress};
