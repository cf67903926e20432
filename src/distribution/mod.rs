//! Distribution clients
//!
//! A client answers two questions for the curator: is there a newer
//! artifact than the one installed, and where does it land once fetched.
//! Transport is entirely the client's business; the curator only sees a
//! staged directory it can validate and promote.

mod mirror;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::db::Description;
use crate::installation::ManualProgress;

pub use mirror::{Listing, ListingStatus, LocalMirror, LISTING_FILE_NAME};

/// Error types for distribution clients
#[derive(Error, Debug)]
pub enum DistributionError {
    #[error("unable to read listing ({}): {source}", .path.display())]
    ListingRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse listing ({}): {source}", .path.display())]
    ListingDecode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to write listing ({}): {source}", .path.display())]
    ListingWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid archive path in listing: {path:?}")]
    InvalidArchivePath { path: String },

    #[error("unable to create download dir in {}: {source}", .parent.display())]
    Staging {
        parent: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to unarchive database: {0}")]
    Extract(#[from] ArchiveError),
}

impl DistributionError {
    /// Whether trying again later could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DistributionError::ListingRead { source, .. } => {
                source.kind() != std::io::ErrorKind::NotFound
            }
            DistributionError::ListingWrite { .. } | DistributionError::Staging { .. } => true,
            DistributionError::Extract(ArchiveError::Task(_)) => true,
            _ => false,
        }
    }
}

/// A candidate artifact offered by a distribution source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Archive {
    /// Description of the artifact inside the archive
    pub description: Description,
    /// Location of the archive, relative to the source
    pub path: String,
}

/// Source of new artifacts
#[async_trait]
pub trait Client: Send + Sync {
    /// A candidate newer than `current`, if any
    ///
    /// `current` is `None` when nothing is installed.
    async fn is_update_available(
        &self,
        current: Option<&Description>,
    ) -> Result<Option<Archive>, DistributionError>;

    /// Fetch `archive` into a new directory under `dest_parent`
    ///
    /// Returns the staged directory, which holds the payload and its
    /// description. `progress` advances as the archive is consumed.
    async fn download(
        &self,
        archive: &Archive,
        dest_parent: &Path,
        progress: &ManualProgress,
    ) -> Result<PathBuf, DistributionError>;
}
