//! Integrity and staleness checks for an artifact directory

use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;

use crate::core::error::{IntegrityError, StaleError};
use crate::db::{read_description, validate_by_hash, Description, MODEL_VERSION, VULNERABILITY_DB_FILE_NAME};

/// Validate the artifact in `dir` and return its description
///
/// Checks, in order: the description exists and decodes, the payload digest
/// matches (when `validate_checksum` is set), and the schema model is the
/// one this build reads.
pub async fn validate_integrity(
    dir: &Path,
    validate_checksum: bool,
) -> Result<Description, IntegrityError> {
    let description = read_description(dir)
        .await
        .map_err(|source| IntegrityError::UnreadableDescription {
            dir: dir.to_path_buf(),
            source,
        })?
        .ok_or_else(|| IntegrityError::MissingDescription {
            dir: dir.to_path_buf(),
        })?;

    if validate_checksum {
        let payload = dir.join(VULNERABILITY_DB_FILE_NAME);
        let (valid, actual) = validate_by_hash(&payload, &description.checksum).await?;
        if !valid {
            return Err(IntegrityError::ChecksumMismatch {
                path: payload,
                expected: description.checksum.clone(),
                actual,
            });
        }
    }

    match description.schema_version.model() {
        Some(MODEL_VERSION) => Ok(description),
        have => Err(IntegrityError::UnsupportedVersion {
            have: have.unwrap_or(0),
            want: MODEL_VERSION,
        }),
    }
}

/// Reject an artifact built longer than `max_allowed` before now
pub fn ensure_not_stale(description: &Description, max_allowed: Duration) -> Result<(), StaleError> {
    ensure_not_stale_at(description, max_allowed, Utc::now())
}

/// Reject an artifact built longer than `max_allowed` before `now`
///
/// An age exactly equal to `max_allowed` is still fresh. A build time in
/// the future counts as zero age.
pub fn ensure_not_stale_at(
    description: &Description,
    max_allowed: Duration,
    now: DateTime<Utc>,
) -> Result<(), StaleError> {
    let age = (now - description.built).to_std().unwrap_or(Duration::ZERO);
    if age > max_allowed {
        return Err(StaleError { age, max_allowed });
    }
    Ok(())
}
