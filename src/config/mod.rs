//! Configuration for the vulnerability database curator
//!
//! Provides:
//! - Layered loading (defaults, JSON file, environment)
//! - Atomic JSON saves
//! - Derived database paths

mod storage;

pub use storage::{ConfigError, ConfigResult, CuratorConfig, ENV_PREFIX};
