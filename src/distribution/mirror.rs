//! Filesystem-backed distribution source
//!
//! A mirror directory holds a `latest.json` listing plus the archives it
//! points at. Useful for air-gapped installs and as the reference client
//! in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use super::{Archive, Client, DistributionError};
use crate::archive::unarchive;
use crate::core::utils::create_staging_dir;
use crate::db::{Description, MODEL_VERSION};
use crate::installation::ManualProgress;

/// Listing file at the mirror root
pub const LISTING_FILE_NAME: &str = "latest.json";

/// Support status of the schema a listing serves
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    #[default]
    Active,
    Deprecated,
    EndOfLife,
}

/// Contents of `latest.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listing {
    #[serde(default)]
    pub status: ListingStatus,
    pub archive: Archive,
}

/// Distribution client reading from a local directory
#[derive(Debug, Clone)]
pub struct LocalMirror {
    root: PathBuf,
}

impl LocalMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn listing_path(&self) -> PathBuf {
        self.root.join(LISTING_FILE_NAME)
    }

    /// Read and decode the mirror listing
    pub async fn listing(&self) -> Result<Listing, DistributionError> {
        let path = self.listing_path();
        let content = tokio::fs::read(&path)
            .await
            .map_err(|source| DistributionError::ListingRead {
                path: path.clone(),
                source,
            })?;

        serde_json::from_slice(&content)
            .map_err(|source| DistributionError::ListingDecode { path, source })
    }

    /// Publish `listing` as the mirror's latest
    pub async fn write_listing(&self, listing: &Listing) -> Result<(), DistributionError> {
        let path = self.listing_path();
        let content = serde_json::to_vec_pretty(listing).map_err(|e| {
            DistributionError::ListingWrite {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            }
        })?;

        tokio::fs::write(&path, content)
            .await
            .map_err(|source| DistributionError::ListingWrite { path, source })
    }

    /// Resolve an archive path from the listing inside the mirror root
    fn archive_path(&self, archive: &Archive) -> Result<PathBuf, DistributionError> {
        let relative = Path::new(&archive.path);
        let contained = !archive.path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

        if !contained {
            return Err(DistributionError::InvalidArchivePath {
                path: archive.path.clone(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Client for LocalMirror {
    async fn is_update_available(
        &self,
        current: Option<&Description>,
    ) -> Result<Option<Archive>, DistributionError> {
        let listing = self.listing().await?;

        match listing.status {
            ListingStatus::Active => {}
            ListingStatus::Deprecated => tracing::warn!(
                "this version of the vulnerability database is deprecated, please upgrade"
            ),
            ListingStatus::EndOfLife => tracing::warn!(
                "this version of the vulnerability database is no longer updated, please upgrade"
            ),
        }

        let candidate = listing.archive;
        if candidate.description.schema_version.model() != Some(MODEL_VERSION) {
            tracing::debug!(
                schema = %candidate.description.schema_version,
                "listing serves an incompatible schema"
            );
            return Ok(None);
        }

        match current {
            Some(current) if candidate.description.built <= current.built => {
                tracing::debug!(
                    current = %current.built,
                    candidate = %candidate.description.built,
                    "installed database is up to date"
                );
                Ok(None)
            }
            _ => Ok(Some(candidate)),
        }
    }

    async fn download(
        &self,
        archive: &Archive,
        dest_parent: &Path,
        progress: &ManualProgress,
    ) -> Result<PathBuf, DistributionError> {
        let source = self.archive_path(archive)?;
        let staged = create_staging_dir(dest_parent, "download")
            .await
            .map_err(|source| DistributionError::Staging {
                parent: dest_parent.to_path_buf(),
                source,
            })?;

        tracing::debug!(
            archive = %source.display(),
            staged = %staged.display(),
            "extracting archive from mirror"
        );

        unarchive(&source, &staged, Some(progress.clone())).await?;
        Ok(staged)
    }
}
