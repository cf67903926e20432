//! Installation and lifecycle of the vulnerability database
//!
//! Provides:
//! - The curator: status, validation, update, import, delete
//! - Throttling of remote update checks
//! - Integrity and staleness validation
//! - Progress reporting for long-running operations

mod curator;
mod monitor;
mod throttle;
mod validate;

#[cfg(test)]
mod tests;

pub use curator::Curator;
pub use monitor::{stage, AtomicStage, ManualProgress, ProgressCallback, StagedProgress};
pub use throttle::{ThrottleError, UpdateCheckThrottle, LAST_UPDATE_CHECK_FILE_NAME};
pub use validate::{ensure_not_stale, ensure_not_stale_at, validate_integrity};
