//! Description sidecar for an artifact directory
//!
//! Every artifact directory carries one `import.json` describing the payload
//! next to it. The curator only ever reads it; producers of staged
//! directories write it once, before the directory is handed over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::{ADDITION, DESCRIPTION_FILE_NAME, MODEL_VERSION, REVISION};

/// Error types for reading and writing descriptions
#[derive(Error, Debug)]
pub enum DescriptionError {
    #[error("unable to read DB metadata ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse DB metadata ({}): {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to encode DB metadata ({}): {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Schema version string of the form `v<model>.<revision>.<addition>`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SchemaVersion(String);

impl SchemaVersion {
    /// Create a schema version from its components
    pub fn new(model: u32, revision: u32, addition: u32) -> Self {
        Self(format!("v{}.{}.{}", model, revision, addition))
    }

    /// The schema version this build produces
    pub fn current() -> Self {
        Self::new(MODEL_VERSION, REVISION, ADDITION)
    }

    /// Split into `(model, revision, addition)`
    ///
    /// The leading `v` is optional. Anything other than three numeric
    /// components yields `None`.
    pub fn parse(&self) -> Option<(u32, u32, u32)> {
        let s = self.0.trim().trim_start_matches('v');
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return None;
        }

        let model = parts[0].parse().ok()?;
        let revision = parts[1].parse().ok()?;
        let addition = parts[2].parse().ok()?;
        Some((model, revision, addition))
    }

    /// Model number, the only component that decides compatibility
    pub fn model(&self) -> Option<u32> {
        let s = self.0.trim().trim_start_matches('v');
        s.split('.').next()?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered by numeric components; unparseable versions sort first
impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.parse()
            .cmp(&other.parse())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl From<&str> for SchemaVersion {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SchemaVersion {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata describing one artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Description {
    /// Schema version of the payload
    pub schema_version: SchemaVersion,
    /// When the payload was built (UTC)
    pub built: DateTime<Utc>,
    /// Payload digest as `<algorithm>:<hex>`
    pub checksum: String,
}

impl Description {
    pub fn new(
        schema_version: impl Into<SchemaVersion>,
        built: DateTime<Utc>,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            schema_version: schema_version.into(),
            built,
            checksum: checksum.into(),
        }
    }
}

/// Read the description inside `dir`
///
/// An absent sidecar is `Ok(None)`: no artifact installed yet is a valid state.
pub async fn read_description(dir: &Path) -> Result<Option<Description>, DescriptionError> {
    let path = dir.join(DESCRIPTION_FILE_NAME);

    let content = match tokio::fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(DescriptionError::Io { path, source }),
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|source| DescriptionError::Decode { path, source })
}

/// Write the description inside `dir` via temp file + rename
pub async fn write_description(dir: &Path, description: &Description) -> Result<(), DescriptionError> {
    let path = dir.join(DESCRIPTION_FILE_NAME);
    let content = serde_json::to_vec_pretty(description).map_err(|source| {
        DescriptionError::Encode {
            path: path.clone(),
            source,
        }
    })?;

    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, &content)
        .await
        .map_err(|source| DescriptionError::Io {
            path: temp_path.clone(),
            source,
        })?;

    tokio::fs::rename(&temp_path, &path)
        .await
        .map_err(|source| DescriptionError::Io { path, source })
}
