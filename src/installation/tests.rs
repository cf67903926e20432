//! Tests for the installation module
//!
//! Curator scenarios run against a real temporary directory and a scripted
//! distribution client that counts how often it is called.

use super::*;
use crate::archive::unarchive;
use crate::config::CuratorConfig;
use crate::core::error::CuratorError;
use crate::core::utils::{create_staging_dir, is_staging_dir};
use crate::db::{read_description, write_description, Description, SchemaVersion};
use crate::distribution::{Archive, Client, DistributionError};
use crate::test_support::{bundle_bytes, create_test_description, write_test_artifact};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

/// Distribution client returning a fixed answer
struct FakeClient {
    candidate: Option<Archive>,
    bundle: PathBuf,
    fail_check: bool,
    checks: AtomicUsize,
    downloads: AtomicUsize,
}

impl FakeClient {
    fn no_update() -> Self {
        Self {
            candidate: None,
            bundle: PathBuf::new(),
            fail_check: false,
            checks: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            fail_check: true,
            ..Self::no_update()
        }
    }

    fn offering(description: Description, bundle: PathBuf) -> Self {
        Self {
            candidate: Some(Archive {
                description,
                path: "bundle.tar.gz".to_string(),
            }),
            bundle,
            ..Self::no_update()
        }
    }

    fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Client for FakeClient {
    async fn is_update_available(
        &self,
        _current: Option<&Description>,
    ) -> Result<Option<Archive>, DistributionError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_check {
            return Err(DistributionError::ListingRead {
                path: PathBuf::from("fake://latest.json"),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "offline"),
            });
        }
        Ok(self.candidate.clone())
    }

    async fn download(
        &self,
        _archive: &Archive,
        dest_parent: &Path,
        progress: &ManualProgress,
    ) -> Result<PathBuf, DistributionError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let staged = create_staging_dir(dest_parent, "download")
            .await
            .map_err(|source| DistributionError::Staging {
                parent: dest_parent.to_path_buf(),
                source,
            })?;
        unarchive(&self.bundle, &staged, Some(progress.clone())).await?;
        Ok(staged)
    }
}

/// Whole-second timestamp so the marker file round-trips exactly
fn test_now() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap()
}

fn create_test_config(temp: &TempDir) -> CuratorConfig {
    CuratorConfig::with_root(temp.path().join("db"))
}

fn create_test_curator(temp: &TempDir, client: Arc<FakeClient>) -> Curator {
    Curator::new(create_test_config(temp)).with_client(client)
}

async fn install_active(config: &CuratorConfig, payload: &[u8], built: DateTime<Utc>) -> Description {
    write_test_artifact(&config.db_directory_path(), payload, built).await
}

async fn write_bundle(dir: &Path, name: &str, payload: &[u8], description: &Description) -> PathBuf {
    let path = dir.join(name);
    tokio::fs::write(&path, bundle_bytes(payload, description))
        .await
        .unwrap();
    path
}

async fn staging_dirs(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(root).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        if is_staging_dir(&entry.path()) {
            found.push(entry.path());
        }
    }
    found
}

fn capture_progress() -> (ProgressCallback, Arc<Mutex<Vec<StagedProgress>>>) {
    let seen: Arc<Mutex<Vec<StagedProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: ProgressCallback = Arc::new(move |p| sink.lock().push(p));
    (callback, seen)
}

// ============================================================================
// Status, reader and delete
// ============================================================================

#[tokio::test]
async fn test_status_without_database() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));

    let status = curator.status().await;
    assert!(!status.is_ok());
    assert!(status.built.is_none());
    assert_eq!(status.location, curator.config().db_directory_path());
    assert!(status.error.as_ref().unwrap().is_integrity());
}

#[tokio::test]
async fn test_status_of_valid_database() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));
    let installed = install_active(curator.config(), b"payload", Utc::now()).await;

    let status = curator.status().await;
    assert!(status.is_ok(), "unexpected error: {:?}", status.error);
    assert_eq!(status.built, Some(installed.built));
    assert_eq!(status.schema_version, Some(SchemaVersion::current()));
    assert_eq!(status.checksum, Some(installed.checksum));
}

#[tokio::test]
async fn test_status_with_corrupt_description() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));
    let dir = curator.config().db_directory_path();
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join(crate::db::DESCRIPTION_FILE_NAME), "not json")
        .await
        .unwrap();

    let status = curator.status().await;
    assert!(matches!(status.error, Some(CuratorError::CurrentDescription(_))));
}

#[tokio::test]
async fn test_status_serializes_error_as_text() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));

    let json = serde_json::to_value(curator.status().await).unwrap();
    assert!(json["error"].as_str().unwrap().contains("database metadata not found"));
    assert!(json["built"].is_null());
}

#[tokio::test]
async fn test_reader_over_valid_database() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));
    let installed = install_active(curator.config(), b"payload", Utc::now()).await;

    let reader = curator.reader().await.unwrap();
    assert_eq!(reader.description(), &installed);
    assert_eq!(reader.payload_path(), curator.config().db_file_path());

    use tokio::io::AsyncReadExt;
    let mut content = Vec::new();
    reader.open_payload().await.unwrap().read_to_end(&mut content).await.unwrap();
    assert_eq!(content, b"payload");
}

#[tokio::test]
async fn test_reader_fails_closed_on_tampering() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));
    install_active(curator.config(), b"payload", Utc::now()).await;
    tokio::fs::write(curator.config().db_file_path(), b"tampered")
        .await
        .unwrap();

    let err = curator.reader().await.unwrap_err();
    assert!(err.is_integrity());
    assert!(!err.is_stale());
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));

    // nothing installed yet
    curator.delete().await.unwrap();

    install_active(curator.config(), b"payload", Utc::now()).await;
    curator.delete().await.unwrap();
    assert!(!curator.config().db_directory_path().exists());

    curator.delete().await.unwrap();
    assert!(curator.status().await.error.unwrap().is_integrity());
}

// ============================================================================
// Staleness
// ============================================================================

#[tokio::test]
async fn test_stale_database_rejected() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));
    let now = test_now();
    install_active(curator.config(), b"payload", now - Duration::days(10)).await;

    let status = curator.status_at(now).await;
    let err = status.error.unwrap();
    assert!(err.is_stale());
    assert!(!err.is_integrity());
    assert!(err.to_string().contains("5 days"), "message: {err}");

    assert!(curator.reader().await.unwrap_err().is_stale());
}

#[tokio::test]
async fn test_stale_database_allowed_when_age_check_disabled() {
    let temp = TempDir::new().unwrap();
    let mut config = create_test_config(&temp);
    config.validate_age = false;
    let curator = Curator::new(config);
    install_active(curator.config(), b"payload", Utc::now() - Duration::days(10)).await;

    assert!(curator.status().await.is_ok());
    assert!(curator.reader().await.is_ok());
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn test_update_without_client() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));
    assert!(matches!(curator.update().await, Err(CuratorError::MissingClient)));
}

#[tokio::test]
async fn test_throttled_update_skips_client() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(FakeClient::no_update());
    let curator = create_test_curator(&temp, Arc::clone(&client));
    let now = test_now();
    install_active(curator.config(), b"payload", now).await;

    let throttle = UpdateCheckThrottle::new(
        &curator.config().db_directory_path(),
        curator.config().update_check_max_frequency,
    );
    throttle.record_check_at(now - Duration::minutes(30)).await.unwrap();

    assert!(!curator.update_at(now).await.unwrap());
    assert_eq!(client.checks(), 0);
}

#[tokio::test]
async fn test_repeated_update_within_window_checks_once() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(FakeClient::no_update());
    let curator = create_test_curator(&temp, Arc::clone(&client));
    let t0 = test_now();
    install_active(curator.config(), b"payload", t0).await;

    assert!(!curator.update_at(t0).await.unwrap());
    assert_eq!(client.checks(), 1);

    assert!(!curator.update_at(t0 + Duration::hours(1)).await.unwrap());
    assert_eq!(client.checks(), 1);

    assert!(!curator.update_at(t0 + Duration::hours(3)).await.unwrap());
    assert_eq!(client.checks(), 2);
}

#[tokio::test]
async fn test_failed_check_not_recorded() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(FakeClient::failing());
    let curator = create_test_curator(&temp, Arc::clone(&client));
    let now = test_now();
    install_active(curator.config(), b"payload", now).await;

    assert!(!curator.update_at(now).await.unwrap());
    assert_eq!(client.checks(), 1);

    let throttle = UpdateCheckThrottle::new(&curator.config().db_directory_path(), Default::default());
    assert!(throttle.last_checked().await.unwrap().is_none());

    // the next call is not throttled
    assert!(!curator.update_at(now + Duration::minutes(1)).await.unwrap());
    assert_eq!(client.checks(), 2);
}

#[tokio::test]
async fn test_unreadable_current_description_fails_update() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(FakeClient::no_update());
    let curator = create_test_curator(&temp, Arc::clone(&client));
    let dir = curator.config().db_directory_path();
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join(crate::db::DESCRIPTION_FILE_NAME), "{broken")
        .await
        .unwrap();

    let err = curator.update().await.unwrap_err();
    assert!(matches!(err, CuratorError::CurrentDescription(_)));
    assert_eq!(client.checks(), 0);
}

#[tokio::test]
async fn test_update_installs_candidate() {
    let temp = TempDir::new().unwrap();
    let now = test_now();
    let offered = create_test_description(b"new payload", now);
    let bundle = write_bundle(temp.path(), "bundle.tar.gz", b"new payload", &offered).await;
    let client = Arc::new(FakeClient::offering(offered.clone(), bundle));
    let (callback, seen) = capture_progress();
    let curator = create_test_curator(&temp, Arc::clone(&client)).with_progress_callback(callback);
    install_active(curator.config(), b"old payload", now - Duration::days(1)).await;

    assert!(curator.update_at(now).await.unwrap());
    assert_eq!(client.downloads(), 1);

    let active = read_description(&curator.config().db_directory_path()).await.unwrap();
    assert_eq!(active, Some(offered));
    assert_eq!(tokio::fs::read(curator.config().db_file_path()).await.unwrap(), b"new payload");

    let throttle = UpdateCheckThrottle::new(&curator.config().db_directory_path(), Default::default());
    assert_eq!(throttle.last_checked().await.unwrap(), Some(now));

    let published = seen.lock();
    assert_eq!(published.len(), 1);
    assert!(published[0].is_completed());
    assert_eq!(published[0].stage(), stage::ACTIVATING);
}

#[tokio::test]
async fn test_update_leaves_no_parked_directories() {
    let temp = TempDir::new().unwrap();
    let now = test_now();
    let offered = create_test_description(b"new payload", now);
    let bundle = write_bundle(temp.path(), "bundle.tar.gz", b"new payload", &offered).await;
    let client = Arc::new(FakeClient::offering(offered, bundle));
    let curator = create_test_curator(&temp, client);
    install_active(curator.config(), b"old payload", now - Duration::days(1)).await;

    curator.update_at(now).await.unwrap();

    assert!(staging_dirs(&curator.config().root_dir).await.is_empty());
    assert!(curator.reader().await.is_ok());
}

#[tokio::test]
async fn test_failed_activation_preserves_active() {
    let temp = TempDir::new().unwrap();
    let now = test_now();
    // the description claims a different payload than the one shipped
    let offered = create_test_description(b"expected payload", now);
    let bundle = write_bundle(temp.path(), "bundle.tar.gz", b"corrupt payload", &offered).await;
    let client = Arc::new(FakeClient::offering(offered, bundle));
    let curator = create_test_curator(&temp, Arc::clone(&client));
    let installed = install_active(curator.config(), b"old payload", now - Duration::days(1)).await;

    let err = curator.update_at(now).await.unwrap_err();
    assert!(matches!(err, CuratorError::Activation(_)));
    assert!(err.is_integrity());
    assert!(err.to_string().contains("unable to activate new vulnerability database"));

    let active = read_description(&curator.config().db_directory_path()).await.unwrap();
    assert_eq!(active, Some(installed));
    assert_eq!(tokio::fs::read(curator.config().db_file_path()).await.unwrap(), b"old payload");

    let throttle = UpdateCheckThrottle::new(&curator.config().db_directory_path(), Default::default());
    assert!(throttle.last_checked().await.unwrap().is_none());

    // the rejected candidate stays behind for inspection
    assert_eq!(staging_dirs(&curator.config().root_dir).await.len(), 1);
}

// ============================================================================
// Import
// ============================================================================

#[tokio::test]
async fn test_fresh_install_via_import() {
    let temp = TempDir::new().unwrap();
    let (callback, seen) = capture_progress();
    let curator = Curator::new(create_test_config(&temp)).with_progress_callback(callback);
    let description = create_test_description(b"payload", Utc::now());
    let bundle = write_bundle(temp.path(), "bundle.tar.gz", b"payload", &description).await;

    curator.import(&bundle).await.unwrap();

    let status = curator.status().await;
    assert!(status.is_ok(), "unexpected error: {:?}", status.error);
    assert_eq!(status.checksum, Some(description.checksum));
    assert!(staging_dirs(&curator.config().root_dir).await.is_empty());

    let published = seen.lock();
    assert_eq!(published.len(), 1);
    assert!(published[0].is_completed());
}

#[tokio::test]
async fn test_import_replaces_active() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));
    install_active(curator.config(), b"old payload", Utc::now() - Duration::days(2)).await;

    let description = create_test_description(b"new payload", Utc::now());
    let bundle = write_bundle(temp.path(), "bundle.tar", b"new payload", &description).await;
    curator.import(&bundle).await.unwrap();

    assert_eq!(curator.reader().await.unwrap().description(), &description);
}

#[tokio::test]
async fn test_import_unsupported_schema_preserves_active() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));
    let installed = install_active(curator.config(), b"old payload", Utc::now()).await;

    let mut description = create_test_description(b"new payload", Utc::now());
    description.schema_version = SchemaVersion::new(5, 0, 0);
    let bundle = write_bundle(temp.path(), "bundle.tar.gz", b"new payload", &description).await;

    let err = curator.import(&bundle).await.unwrap_err();
    assert!(err.to_string().contains("unsupported database version: have=5 want=6"));
    assert_eq!(curator.reader().await.unwrap().description(), &installed);
}

#[tokio::test]
async fn test_import_missing_archive() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));

    let err = curator.import(&temp.path().join("absent.tar.gz")).await.unwrap_err();
    assert!(matches!(err, CuratorError::Archive(_)));
    assert!(!curator.config().db_directory_path().exists());
}

#[tokio::test]
async fn test_import_without_description() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));

    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(7);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, crate::db::VULNERABILITY_DB_FILE_NAME, &b"payload"[..])
        .unwrap();
    let archive = temp.path().join("bundle.tar");
    tokio::fs::write(&archive, builder.into_inner().unwrap()).await.unwrap();

    let err = curator.import(&archive).await.unwrap_err();
    assert!(err.is_integrity());
    assert!(err.to_string().contains("database metadata not found"));
}

// ============================================================================
// Staging hygiene
// ============================================================================

#[tokio::test]
async fn test_prune_respects_retention() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));
    let root = &curator.config().root_dir;
    tokio::fs::create_dir_all(root).await.unwrap();

    let leftover = create_staging_dir(root, "download").await.unwrap();
    tokio::fs::write(root.join("tmp-v6-notes.txt"), b"not a directory").await.unwrap();
    install_active(curator.config(), b"payload", Utc::now()).await;

    assert_eq!(curator.prune_staging_dirs().await, 0);
    assert!(leftover.exists());

    assert_eq!(curator.prune_staging_dirs_at(Utc::now() + Duration::days(2)).await, 1);
    assert!(!leftover.exists());
    assert!(root.join("tmp-v6-notes.txt").exists());
    assert!(curator.config().db_directory_path().exists());
}

#[tokio::test]
async fn test_prune_without_root() {
    let temp = TempDir::new().unwrap();
    let curator = Curator::new(create_test_config(&temp));
    assert_eq!(curator.prune_staging_dirs().await, 0);
}

#[tokio::test]
async fn test_import_prunes_old_staging_dirs() {
    let temp = TempDir::new().unwrap();
    let mut config = create_test_config(&temp);
    config.staging_retention = std::time::Duration::ZERO;
    let curator = Curator::new(config);
    tokio::fs::create_dir_all(&curator.config().root_dir).await.unwrap();
    let leftover = create_staging_dir(&curator.config().root_dir, "import").await.unwrap();

    let description = create_test_description(b"payload", Utc::now());
    let bundle = write_bundle(temp.path(), "bundle.tar.gz", b"payload", &description).await;
    curator
        .import_at(&bundle, Utc::now() + Duration::seconds(5))
        .await
        .unwrap();

    assert!(!leftover.exists());
}

#[tokio::test]
async fn test_description_written_by_producer_is_read_back() {
    let temp = TempDir::new().unwrap();
    let description = Description::new("v6.1.0", Utc::now(), "blake3:00");
    write_description(temp.path(), &description).await.unwrap();
    assert_eq!(read_description(temp.path()).await.unwrap(), Some(description));
}
