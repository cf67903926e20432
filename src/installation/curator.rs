//! Database curator
//!
//! Owns the database root and everything under it. The active artifact
//! lives at `<root>/<model>`; candidates are staged in sibling
//! `tmp-v<model>-*` directories, validated there, and promoted by rename so
//! readers only ever see the complete old artifact or the complete new one.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::monitor::{stage, CompleteOnDrop, Monitor, ProgressCallback};
use super::throttle::UpdateCheckThrottle;
use super::validate::{ensure_not_stale_at, validate_integrity};
use crate::archive::unarchive;
use crate::config::CuratorConfig;
use crate::core::error::{CuratorError, Result};
use crate::core::utils::{create_staging_dir, is_staging_dir, staging_dir_path};
use crate::db::{read_description, Description, Reader, Status};
use crate::distribution::Client;

/// Lifecycle manager for the vulnerability database
pub struct Curator {
    config: CuratorConfig,
    client: Option<Arc<dyn Client>>,
    progress_callback: Option<ProgressCallback>,
}

impl Curator {
    /// Curator without a distribution client
    ///
    /// Enough for status, reads, imports and deletes. Updates need
    /// [`Curator::with_client`].
    pub fn new(config: CuratorConfig) -> Self {
        Self {
            config,
            client: None,
            progress_callback: None,
        }
    }

    /// Set the distribution client used by [`Curator::update`]
    pub fn with_client(mut self, client: Arc<dyn Client>) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the observer receiving one progress handle per update or import
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn config(&self) -> &CuratorConfig {
        &self.config
    }

    /// Report on the active database without changing anything
    pub async fn status(&self) -> Status {
        self.status_at(Utc::now()).await
    }

    pub(crate) async fn status_at(&self, now: DateTime<Utc>) -> Status {
        let dir = self.config.db_directory_path();
        let mut status = Status {
            location: dir.clone(),
            ..Default::default()
        };

        match read_description(&dir).await {
            Ok(Some(description)) => {
                status.built = Some(description.built);
                status.schema_version = Some(description.schema_version);
                status.checksum = Some(description.checksum);
            }
            Ok(None) => {}
            Err(e) => {
                status.error = Some(CuratorError::CurrentDescription(e));
                return status;
            }
        }

        if let Err(e) = self.validate_at(now).await {
            status.error = Some(e);
        }
        status
    }

    /// Check integrity and, when enabled, age of the active database
    pub async fn validate(&self) -> Result<Description> {
        self.validate_at(Utc::now()).await
    }

    pub(crate) async fn validate_at(&self, now: DateTime<Utc>) -> Result<Description> {
        let description =
            validate_integrity(&self.config.db_directory_path(), self.config.validate_checksum)
                .await?;

        if self.config.validate_age {
            ensure_not_stale_at(&description, self.config.max_allowed_built_age, now)?;
        }
        Ok(description)
    }

    /// Read handle over the active database; fails if it does not validate
    pub async fn reader(&self) -> Result<Reader> {
        let description = self.validate().await?;
        Ok(Reader::new(self.config.db_directory_path(), description))
    }

    /// Remove the active database; removing nothing is not an error
    pub async fn delete(&self) -> Result<()> {
        let dir = self.config.db_directory_path();
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!(path = %dir.display(), "deleted vulnerability DB");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CuratorError::Purge { path: dir, source }),
        }
    }

    /// Check for and install a newer database
    ///
    /// Returns whether the active database changed. A failed remote check
    /// is logged and reported as "no update"; it does not count as a
    /// completed check for throttling.
    pub async fn update(&self) -> Result<bool> {
        self.update_at(Utc::now()).await
    }

    pub(crate) async fn update_at(&self, now: DateTime<Utc>) -> Result<bool> {
        let client = self.client.as_ref().ok_or(CuratorError::MissingClient)?;
        let db_dir = self.config.db_directory_path();
        let throttle = UpdateCheckThrottle::new(&db_dir, self.config.update_check_max_frequency);

        if !throttle.is_check_allowed_at(now).await {
            tracing::debug!("max update check frequency not met, skipping DB update check");
            return Ok(false);
        }

        self.prune_staging_dirs_at(now).await;

        let current = read_description(&db_dir)
            .await
            .map_err(CuratorError::CurrentDescription)?;

        let monitor = Monitor::new(self.progress_callback.as_ref());
        monitor.set_stage(stage::CHECKING);

        let (candidate, check_failed) = match client.is_update_available(current.as_ref()).await {
            Ok(candidate) => (candidate, false),
            Err(e) => {
                tracing::warn!("unable to check for vulnerability database update");
                tracing::debug!(error = %e, "check for vulnerability update failed");
                (None, true)
            }
        };

        let Some(candidate) = candidate else {
            monitor.set_stage(stage::NO_UPDATE);
            if !check_failed {
                record_check(&throttle, now).await;
            }
            return Ok(false);
        };

        tracing::info!(
            version = %candidate.description.schema_version,
            built = %candidate.description.built,
            "downloading new vulnerability DB"
        );
        monitor.set_stage(stage::DOWNLOADING);

        self.ensure_root().await?;
        let staged = {
            let _complete = CompleteOnDrop(monitor.download_progress());
            client
                .download(&candidate, &self.config.root_dir, monitor.download_progress())
                .await?
        };

        self.activate(&staged, &monitor)
            .await
            .map_err(|e| CuratorError::Activation(Box::new(e)))?;

        tracing::info!(
            from = ?current.as_ref().map(|d| d.built),
            to = %candidate.description.built,
            version = %candidate.description.schema_version,
            "updated vulnerability DB"
        );

        record_check(&throttle, now).await;
        Ok(true)
    }

    /// Install the database bundle at `archive`, replacing the active one
    pub async fn import(&self, archive: &Path) -> Result<()> {
        self.import_at(archive, Utc::now()).await
    }

    pub(crate) async fn import_at(&self, archive: &Path, now: DateTime<Utc>) -> Result<()> {
        self.prune_staging_dirs_at(now).await;

        let monitor = Monitor::new(self.progress_callback.as_ref());
        monitor.set_stage(stage::UNARCHIVING);

        self.ensure_root().await?;
        let staged = create_staging_dir(&self.config.root_dir, "import")
            .await
            .map_err(|source| CuratorError::StagingDir {
                root: self.config.root_dir.clone(),
                source,
            })?;

        {
            let _complete = CompleteOnDrop(monitor.download_progress());
            unarchive(archive, &staged, Some(monitor.download_progress().clone())).await?;
        }

        let description = self.activate(&staged, &monitor).await?;
        tracing::info!(
            archive = %archive.display(),
            version = %description.schema_version,
            built = %description.built,
            "imported vulnerability DB"
        );
        Ok(())
    }

    /// Validate `staged` and promote it to the active directory
    ///
    /// A staged directory that fails validation is left where it is and
    /// the active directory is not touched.
    async fn activate(&self, staged: &Path, monitor: &Monitor) -> Result<Description> {
        let _complete = CompleteOnDrop(monitor.import_progress());

        monitor.set_stage(stage::VALIDATING);
        let description = validate_integrity(staged, self.config.validate_checksum).await?;

        monitor.set_stage(stage::ACTIVATING);
        self.promote(staged).await?;
        Ok(description)
    }

    /// Swap `staged` into the active path
    ///
    /// The old directory is parked under a staging name first. If the staged
    /// directory cannot be moved into place the parked one is restored.
    async fn promote(&self, staged: &Path) -> Result<()> {
        let active = self.config.db_directory_path();
        let parked = staging_dir_path(&self.config.root_dir, "retired");

        let parked = match tokio::fs::rename(&active, &parked).await {
            Ok(()) => Some(parked),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(CuratorError::Purge {
                    path: active,
                    source,
                })
            }
        };

        if let Err(source) = tokio::fs::rename(staged, &active).await {
            if let Some(parked) = &parked {
                if let Err(e) = tokio::fs::rename(parked, &active).await {
                    tracing::error!(
                        error = %e,
                        parked = %parked.display(),
                        "unable to restore previous vulnerability DB"
                    );
                }
            }
            return Err(CuratorError::Swap {
                staged: staged.to_path_buf(),
                active,
                source,
            });
        }

        if let Some(parked) = parked {
            if let Err(e) = tokio::fs::remove_dir_all(&parked).await {
                tracing::warn!(
                    error = %e,
                    path = %parked.display(),
                    "unable to remove previous vulnerability DB"
                );
            }
        }
        Ok(())
    }

    /// Remove staging directories older than the retention period
    ///
    /// Failed updates and imports leave their staging directory behind for
    /// inspection; this is where they go away. Returns how many were removed.
    pub async fn prune_staging_dirs(&self) -> usize {
        self.prune_staging_dirs_at(Utc::now()).await
    }

    pub(crate) async fn prune_staging_dirs_at(&self, now: DateTime<Utc>) -> usize {
        let root = &self.config.root_dir;
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                tracing::debug!(error = %e, root = %root.display(), "unable to list DB root");
                return 0;
            }
        };

        let mut pruned = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "unable to read DB root entry");
                    break;
                }
            };

            let path = entry.path();
            if !is_staging_dir(&path) {
                continue;
            }

            let age = match staging_age(&entry, now).await {
                Some(age) => age,
                None => continue,
            };
            if age <= self.config.staging_retention {
                continue;
            }

            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "removed stale staging dir");
                    pruned += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "unable to remove staging dir")
                }
            }
        }
        pruned
    }

    async fn ensure_root(&self) -> Result<()> {
        let root = &self.config.root_dir;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| CuratorError::StagingDir {
                root: root.clone(),
                source,
            })
    }
}

impl std::fmt::Debug for Curator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Curator")
            .field("config", &self.config)
            .field("client", &self.client.is_some())
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

/// Age of a staging directory entry, `None` when it is not a directory
async fn staging_age(entry: &tokio::fs::DirEntry, now: DateTime<Utc>) -> Option<Duration> {
    let metadata = entry.metadata().await.ok()?;
    if !metadata.is_dir() {
        return None;
    }
    let modified: DateTime<Utc> = metadata.modified().ok()?.into();
    Some((now - modified).to_std().unwrap_or(Duration::ZERO))
}

async fn record_check(throttle: &UpdateCheckThrottle, now: DateTime<Utc>) {
    if let Err(e) = throttle.record_check_at(now).await {
        tracing::debug!(error = %e, "unable to record update check");
    }
}
