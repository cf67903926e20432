//! Core types shared across the curator
//!
//! - Error types and recovery hints
//! - Small formatting and path helpers

pub mod error;
pub mod utils;

pub use error::{CuratorError, ErrorRecovery, IntegrityError, RecoveryAction, Result, StaleError};
