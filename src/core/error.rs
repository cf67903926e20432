//! Error types for the curator
//!
//! Integrity and staleness failures are kept as distinct variants so callers
//! can decide that an old-but-intact database is still usable with a warning.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::utils::format_duration_short;
use crate::archive::ArchiveError;
use crate::db::checksum::ChecksumError;
use crate::db::DescriptionError;
use crate::distribution::DistributionError;

/// Result type alias for curator operations
pub type Result<T> = std::result::Result<T, CuratorError>;

/// Main error type for the curator
#[derive(Error, Debug)]
pub enum CuratorError {
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Stale(#[from] StaleError),

    #[error("unable to read current database metadata: {0}")]
    CurrentDescription(#[source] DescriptionError),

    #[error("unable to update vulnerability database: {0}")]
    Download(#[from] DistributionError),

    #[error("unable to activate new vulnerability database: {0}")]
    Activation(#[source] Box<CuratorError>),

    #[error("no distribution client configured")]
    MissingClient,

    #[error("unable to create db temp dir in {}: {source}", .root.display())]
    StagingDir {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to purge existing database ({}): {source}", .path.display())]
    Purge {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to promote {} to {}: {source}", .staged.display(), .active.display())]
    Swap {
        staged: PathBuf,
        active: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
}

impl CuratorError {
    /// Innermost error once activation wrapping is peeled off
    pub fn root(&self) -> &CuratorError {
        match self {
            CuratorError::Activation(inner) => inner.root(),
            other => other,
        }
    }

    /// Whether the artifact is corrupt, missing or of the wrong schema
    pub fn is_integrity(&self) -> bool {
        matches!(self.root(), CuratorError::Integrity(_))
    }

    /// Whether the artifact is intact but older than allowed
    pub fn is_stale(&self) -> bool {
        matches!(self.root(), CuratorError::Stale(_))
    }
}

/// Artifact directory failed integrity validation
#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("database metadata not found: {}", .dir.display())]
    MissingDescription { dir: PathBuf },

    #[error("failed to parse database metadata ({}): {source}", .dir.display())]
    UnreadableDescription {
        dir: PathBuf,
        #[source]
        source: DescriptionError,
    },

    #[error("bad db checksum ({}): {expected:?} vs {actual:?}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("unable to verify db checksum: {0}")]
    Checksum(#[from] ChecksumError),

    #[error("unsupported database version: have={have} want={want}")]
    UnsupportedVersion { have: u32, want: u32 },
}

/// Artifact is older than the configured maximum age
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "the vulnerability database was built {} ago (max allowed age is {})",
    format_duration_short(.age),
    format_duration_short(.max_allowed)
)]
pub struct StaleError {
    pub age: Duration,
    pub max_allowed: Duration,
}

/// Trait for error recovery strategies
pub trait ErrorRecovery {
    /// Check if the error is retryable
    fn is_retryable(&self) -> bool;

    /// Get recovery action suggestion
    fn recovery_action(&self) -> RecoveryAction;
}

/// Recovery action suggestions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry the operation
    Retry,
    /// Fetch a newer database
    Update,
    /// Remove the installed database and install again
    Reinstall,
    /// Notify user and wait for input
    NotifyUser,
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryAction::Retry => write!(f, "retry the operation"),
            RecoveryAction::Update => write!(f, "run an update to fetch a newer database"),
            RecoveryAction::Reinstall => write!(f, "delete the database and install it again"),
            RecoveryAction::NotifyUser => write!(f, "check the configuration and file permissions"),
        }
    }
}

impl ErrorRecovery for CuratorError {
    fn is_retryable(&self) -> bool {
        match self {
            CuratorError::Download(e) => e.is_retryable(),
            CuratorError::Activation(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    fn recovery_action(&self) -> RecoveryAction {
        match self {
            CuratorError::Activation(inner) => inner.recovery_action(),
            CuratorError::Integrity(IntegrityError::MissingDescription { .. }) => {
                RecoveryAction::Update
            }
            CuratorError::Integrity(IntegrityError::UnsupportedVersion { .. }) => {
                RecoveryAction::Update
            }
            CuratorError::Integrity(_) => RecoveryAction::Reinstall,
            CuratorError::CurrentDescription(_) => RecoveryAction::Reinstall,
            CuratorError::Stale(_) => RecoveryAction::Update,
            CuratorError::Download(_) => RecoveryAction::Retry,
            _ => RecoveryAction::NotifyUser,
        }
    }
}
