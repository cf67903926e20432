use std::path::{Path, PathBuf};

use super::{Description, VULNERABILITY_DB_FILE_NAME};

/// Read handle over a validated artifact directory
///
/// Only handed out after integrity and staleness checks pass, so holders
/// never see a payload that disagrees with its description.
#[derive(Debug, Clone)]
pub struct Reader {
    location: PathBuf,
    description: Description,
}

impl Reader {
    pub(crate) fn new(location: PathBuf, description: Description) -> Self {
        Self {
            location,
            description,
        }
    }

    /// Directory the artifact lives in
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Description validated when this reader was created
    pub fn description(&self) -> &Description {
        &self.description
    }

    /// Path of the payload file
    pub fn payload_path(&self) -> PathBuf {
        self.location.join(VULNERABILITY_DB_FILE_NAME)
    }

    /// Open the payload for reading
    pub async fn open_payload(&self) -> std::io::Result<tokio::fs::File> {
        tokio::fs::File::open(self.payload_path()).await
    }
}
