use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::path::PathBuf;

use super::SchemaVersion;
use crate::core::error::CuratorError;

/// Read-only report on the active artifact
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub built: Option<DateTime<Utc>>,
    pub schema_version: Option<SchemaVersion>,
    pub location: PathBuf,
    pub checksum: Option<String>,
    /// Why the artifact is unusable, if it is
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<CuratorError>,
}

impl Status {
    /// Whether the active artifact passed every validation
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

fn serialize_error<S>(error: &Option<CuratorError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}
