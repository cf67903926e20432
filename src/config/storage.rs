//! Curator configuration storage
//!
//! Configuration is layered: built-in defaults, then an optional JSON file,
//! then `VULNDB_*` environment variables. Saving writes JSON through a temp
//! file + rename so a crash never leaves a half-written file behind.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::db::{MODEL_VERSION, VULNERABILITY_DB_FILE_NAME};

/// Prefix for environment overrides (`VULNDB_ROOT_DIR`, ...)
pub const ENV_PREFIX: &str = "VULNDB";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unable to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for the database curator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CuratorConfig {
    /// Directory holding the active database and its staging siblings
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Reject databases older than `max_allowed_built_age`
    #[serde(default = "default_true")]
    pub validate_age: bool,

    /// Recompute the payload digest on every validation
    #[serde(default = "default_true")]
    pub validate_checksum: bool,

    #[serde(default = "default_max_allowed_built_age", with = "humantime_serde")]
    pub max_allowed_built_age: Duration,

    /// Minimum time between remote update checks; zero checks every time
    #[serde(default = "default_update_check_max_frequency", with = "humantime_serde")]
    pub update_check_max_frequency: Duration,

    /// How long failed staging directories are kept before pruning
    #[serde(default = "default_staging_retention", with = "humantime_serde")]
    pub staging_retention: Duration,
}

fn default_root_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("vulndb")
        .join("db")
}

fn default_true() -> bool {
    true
}

fn default_max_allowed_built_age() -> Duration {
    Duration::from_secs(5 * 24 * 3600)
}

fn default_update_check_max_frequency() -> Duration {
    Duration::from_secs(2 * 3600)
}

fn default_staging_retention() -> Duration {
    Duration::from_secs(24 * 3600)
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            validate_age: default_true(),
            validate_checksum: default_true(),
            max_allowed_built_age: default_max_allowed_built_age(),
            update_check_max_frequency: default_update_check_max_frequency(),
            staging_retention: default_staging_retention(),
        }
    }
}

impl CuratorConfig {
    /// Defaults rooted at `root_dir`
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Default::default()
        }
    }

    /// Load layered configuration
    ///
    /// A `path` that is given must exist; environment variables override
    /// both the file and the defaults.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Json)
                    .required(true),
            );
        }

        let config: Self = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        tracing::debug!(root = %config.root_dir.display(), "loaded curator configuration");
        Ok(config)
    }

    /// Load configuration from a JSON file only, without layering
    pub async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration with atomic write
    pub async fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, path).await?;

        Ok(())
    }

    /// Reject settings the curator cannot work with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("root_dir must not be empty".to_string()));
        }
        Ok(())
    }

    /// Directory of the active database, `<root>/<model>`
    pub fn db_directory_path(&self) -> PathBuf {
        self.root_dir.join(MODEL_VERSION.to_string())
    }

    /// Payload file of the active database
    pub fn db_file_path(&self) -> PathBuf {
        self.db_directory_path().join(VULNERABILITY_DB_FILE_NAME)
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
