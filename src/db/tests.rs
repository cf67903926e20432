//! Tests for the database artifact model

use super::*;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use tempfile::TempDir;
use tokio::runtime::Runtime;

// ============================================================================
// Schema version
// ============================================================================

#[test]
fn test_schema_version_current() {
    let current = SchemaVersion::current();
    assert_eq!(current.as_str(), format!("v{}.{}.{}", MODEL_VERSION, REVISION, ADDITION));
    assert_eq!(current.model(), Some(MODEL_VERSION));
}

#[test]
fn test_schema_version_parse() {
    assert_eq!(SchemaVersion::from("v6.0.2").parse(), Some((6, 0, 2)));
    assert_eq!(SchemaVersion::from("6.1.0").parse(), Some((6, 1, 0)));
    assert_eq!(SchemaVersion::from("v6.1").parse(), None);
    assert_eq!(SchemaVersion::from("v6.x.0").parse(), None);
    assert_eq!(SchemaVersion::from("").parse(), None);
}

#[test]
fn test_schema_version_model() {
    assert_eq!(SchemaVersion::from("v5.0.0").model(), Some(5));
    assert_eq!(SchemaVersion::from("6").model(), Some(6));
    assert_eq!(SchemaVersion::from("vX.0.0").model(), None);
}

#[test]
fn test_schema_version_ordering() {
    let mut versions: Vec<SchemaVersion> = ["v6.1.0", "v5.9.9", "v6.0.10", "v6.0.2"]
        .into_iter()
        .map(SchemaVersion::from)
        .collect();
    versions.sort();

    let sorted: Vec<&str> = versions.iter().map(|v| v.as_str()).collect();
    assert_eq!(sorted, vec!["v5.9.9", "v6.0.2", "v6.0.10", "v6.1.0"]);
}

// ============================================================================
// Description sidecar
// ============================================================================

fn create_test_description() -> Description {
    Description::new(
        "v6.0.2",
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        "sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
    )
}

#[test]
fn test_description_json_shape() {
    let json = serde_json::to_value(create_test_description()).unwrap();
    assert_eq!(json["schemaVersion"], "v6.0.2");
    assert_eq!(json["built"], "2024-03-01T12:00:00Z");
    assert!(json["checksum"].as_str().unwrap().starts_with("sha256:"));
}

#[tokio::test]
async fn test_read_absent_description() {
    let temp_dir = TempDir::new().unwrap();
    assert!(read_description(temp_dir.path()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_write_then_read_description() {
    let temp_dir = TempDir::new().unwrap();
    let description = create_test_description();

    write_description(temp_dir.path(), &description).await.unwrap();
    assert!(!temp_dir.path().join("import.json.tmp").exists());
    assert_eq!(read_description(temp_dir.path()).await.unwrap(), Some(description));
}

#[tokio::test]
async fn test_malformed_description_names_file() {
    let temp_dir = TempDir::new().unwrap();
    tokio::fs::write(temp_dir.path().join(DESCRIPTION_FILE_NAME), "{\"built\": 12")
        .await
        .unwrap();

    let err = read_description(temp_dir.path()).await.unwrap_err();
    assert!(matches!(err, DescriptionError::Decode { .. }));
    assert!(err.to_string().contains(DESCRIPTION_FILE_NAME));
}

#[tokio::test]
async fn test_description_accepts_offset_timestamps() {
    let temp_dir = TempDir::new().unwrap();
    let json = r#"{"schemaVersion":"v6.0.2","built":"2024-03-01T14:00:00+02:00","checksum":"sha256:00"}"#;
    tokio::fs::write(temp_dir.path().join(DESCRIPTION_FILE_NAME), json)
        .await
        .unwrap();

    let description = read_description(temp_dir.path()).await.unwrap().unwrap();
    assert_eq!(description.built, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
}

// ============================================================================
// Checksums
// ============================================================================

#[test]
fn test_digest_algorithm_split() {
    let (algorithm, digest) = DigestAlgorithm::split("sha256:abcDEF01").unwrap();
    assert_eq!(algorithm, DigestAlgorithm::Sha256);
    assert_eq!(digest, "abcDEF01");

    let (algorithm, _) = DigestAlgorithm::split("blake3:00").unwrap();
    assert_eq!(algorithm, DigestAlgorithm::Blake3);

    for bad in ["sha256", "md5:abcd", "sha256:", "sha256:xyz", ":abcd"] {
        assert!(DigestAlgorithm::split(bad).is_err(), "{bad} should be rejected");
    }
}

#[tokio::test]
async fn test_calculate_sha256_known_value() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(VULNERABILITY_DB_FILE_NAME);
    tokio::fs::write(&path, b"test").await.unwrap();

    let checksum = calculate_checksum(&path, DigestAlgorithm::Sha256).await.unwrap();
    assert_eq!(
        checksum,
        "sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
    );
}

#[tokio::test]
async fn test_calculate_blake3_matches_library() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(VULNERABILITY_DB_FILE_NAME);
    tokio::fs::write(&path, b"test").await.unwrap();

    let checksum = calculate_checksum(&path, DigestAlgorithm::Blake3).await.unwrap();
    assert_eq!(checksum, format!("blake3:{}", blake3::hash(b"test").to_hex()));
}

#[tokio::test]
async fn test_validate_by_hash_is_case_insensitive() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(VULNERABILITY_DB_FILE_NAME);
    tokio::fs::write(&path, b"test").await.unwrap();

    let expected = "sha256:9F86D081884C7D659A2FEAA0C55AD015A3BF4F1B2B0B822CD15D6C15B0F00A08";
    let (valid, actual) = validate_by_hash(&path, expected).await.unwrap();
    assert!(valid);
    assert!(actual.starts_with("sha256:9f86"));
}

#[tokio::test]
async fn test_validate_by_hash_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.db");
    let err = validate_by_hash(&path, "sha256:00").await.unwrap_err();
    assert!(matches!(err, checksum::ChecksumError::Io { .. }));
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A file always validates against its own checksum, for both algorithms
    #[test]
    fn prop_checksum_self_consistent(
        content in prop::collection::vec(any::<u8>(), 0..4096),
        use_blake3 in any::<bool>(),
    ) {
        let rt = Runtime::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(VULNERABILITY_DB_FILE_NAME);
        std::fs::write(&path, &content).unwrap();

        let algorithm = if use_blake3 { DigestAlgorithm::Blake3 } else { DigestAlgorithm::Sha256 };
        let checksum = rt.block_on(calculate_checksum(&path, algorithm)).unwrap();
        let (valid, actual) = rt.block_on(validate_by_hash(&path, &checksum)).unwrap();

        prop_assert!(valid);
        prop_assert_eq!(actual, checksum);
    }

    /// Component ordering agrees with numeric tuple ordering
    #[test]
    fn prop_schema_ordering_numeric(a in (0u32..20, 0u32..20, 0u32..20), b in (0u32..20, 0u32..20, 0u32..20)) {
        let left = SchemaVersion::new(a.0, a.1, a.2);
        let right = SchemaVersion::new(b.0, b.1, b.2);
        prop_assert_eq!(left.cmp(&right), a.cmp(&b));
    }
}
