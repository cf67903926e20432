//! Update-check throttle
//!
//! A single RFC3339 timestamp in the active database directory records the
//! last update check that finished without error. Checks more frequent than
//! the configured interval are skipped. Anything wrong with the marker file
//! lets the check through: local corruption must never block an update.

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Marker file inside the active database directory
pub const LAST_UPDATE_CHECK_FILE_NAME: &str = "last_update_check";

/// Error types for the last-check marker
#[derive(Error, Debug)]
pub enum ThrottleError {
    #[error("unable to read last update check timestamp ({}): {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse last update check timestamp {value:?}: {source}")]
    Parse {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("empty update check timestamp ({})", .path.display())]
    Empty { path: PathBuf },

    #[error("unable to write last update check timestamp ({}): {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Gate deciding whether a remote update check may run
#[derive(Debug, Clone)]
pub struct UpdateCheckThrottle {
    marker_path: PathBuf,
    max_frequency: Duration,
}

impl UpdateCheckThrottle {
    /// Throttle backed by the marker inside `db_dir`
    ///
    /// A zero `max_frequency` disables throttling.
    pub fn new(db_dir: &Path, max_frequency: Duration) -> Self {
        Self {
            marker_path: db_dir.join(LAST_UPDATE_CHECK_FILE_NAME),
            max_frequency,
        }
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    /// Whether a remote check is due now
    pub async fn is_check_allowed(&self) -> bool {
        self.is_check_allowed_at(Utc::now()).await
    }

    /// Whether a remote check is due at `now`
    pub async fn is_check_allowed_at(&self, now: DateTime<Utc>) -> bool {
        if self.max_frequency.is_zero() {
            tracing::trace!("no max-frequency set for update check");
            return true;
        }

        let last = match self.last_checked().await {
            Ok(Some(last)) => last,
            Ok(None) => {
                tracing::trace!("first-run of DB update");
                return true;
            }
            Err(e) => {
                tracing::trace!(error = %e, "unable to determine if update check is allowed");
                return true;
            }
        };

        if self.is_skewed(last, now) {
            tracing::debug!(%last, %now, "update check marker is too far in the future, ignoring it");
            return true;
        }

        match (now - last).to_std() {
            Ok(elapsed) => elapsed > self.max_frequency,
            // marker slightly ahead of the clock: the interval has not passed
            Err(_) => false,
        }
    }

    /// Whether `last` lies further ahead of `now` than one check interval
    fn is_skewed(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        (last - now)
            .to_std()
            .map(|ahead| ahead > self.max_frequency)
            .unwrap_or(false)
    }

    /// Timestamp of the last error-free check, `None` on first run
    pub async fn last_checked(&self) -> Result<Option<DateTime<Utc>>, ThrottleError> {
        let content = match tokio::fs::read_to_string(&self.marker_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ThrottleError::Read {
                    path: self.marker_path.clone(),
                    source,
                })
            }
        };

        let value = content.split_whitespace().next().ok_or_else(|| ThrottleError::Empty {
            path: self.marker_path.clone(),
        })?;

        let last = DateTime::parse_from_rfc3339(value)
            .map_err(|source| ThrottleError::Parse {
                value: value.to_string(),
                source,
            })?
            .with_timezone(&Utc);

        if last.year() <= 1 {
            return Err(ThrottleError::Empty {
                path: self.marker_path.clone(),
            });
        }

        Ok(Some(last))
    }

    /// Record an error-free check finishing now
    pub async fn record_check(&self) -> Result<(), ThrottleError> {
        self.record_check_at(Utc::now()).await
    }

    /// Record an error-free check finishing at `now`
    ///
    /// The marker never moves backward: an existing later timestamp is kept,
    /// unless it is more than one interval ahead of `now`.
    pub async fn record_check_at(&self, now: DateTime<Utc>) -> Result<(), ThrottleError> {
        let now = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let now = DateTime::parse_from_rfc3339(&now)
            .map_err(|source| ThrottleError::Parse {
                value: now.clone(),
                source,
            })?
            .with_timezone(&Utc);

        if let Ok(Some(last)) = self.last_checked().await {
            if last > now && !self.is_skewed(last, now) {
                tracing::trace!(%last, %now, "keeping later update check timestamp");
                return Ok(());
            }
        }

        let write_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ThrottleError::Write { path, source }
        };

        let temp_path = self.marker_path.with_extension("tmp");
        tokio::fs::write(&temp_path, now.to_rfc3339_opts(SecondsFormat::Secs, true))
            .await
            .map_err(write_err(&temp_path))?;
        tokio::fs::rename(&temp_path, &self.marker_path)
            .await
            .map_err(write_err(&self.marker_path))
    }
}
