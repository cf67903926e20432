//! Fixtures shared by unit tests

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;

use crate::db::{
    write_description, Description, SchemaVersion, DESCRIPTION_FILE_NAME,
    VULNERABILITY_DB_FILE_NAME,
};

/// Description matching `payload`, with the current schema
pub(crate) fn create_test_description(payload: &[u8], built: DateTime<Utc>) -> Description {
    Description::new(
        SchemaVersion::current(),
        built,
        format!("sha256:{:x}", Sha256::digest(payload)),
    )
}

/// Write a complete artifact (payload + description) into `dir`
pub(crate) async fn write_test_artifact(
    dir: &Path,
    payload: &[u8],
    built: DateTime<Utc>,
) -> Description {
    tokio::fs::create_dir_all(dir).await.unwrap();
    tokio::fs::write(dir.join(VULNERABILITY_DB_FILE_NAME), payload)
        .await
        .unwrap();
    let description = create_test_description(payload, built);
    write_description(dir, &description).await.unwrap();
    description
}

/// Gzip-compressed tar holding `payload` and `description`
pub(crate) fn bundle_bytes(payload: &[u8], description: &Description) -> Vec<u8> {
    let sidecar = serde_json::to_vec(description).unwrap();

    let mut builder = tar::Builder::new(Vec::new());
    for (name, body) in [
        (VULNERABILITY_DB_FILE_NAME, payload),
        (DESCRIPTION_FILE_NAME, sidecar.as_slice()),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, body).unwrap();
    }
    let tar = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}

/// Write a bundle archive to `path` and return the description inside it
pub(crate) async fn write_test_bundle(
    path: &Path,
    payload: &[u8],
    built: DateTime<Utc>,
) -> Description {
    let description = create_test_description(payload, built);
    tokio::fs::write(path, bundle_bytes(payload, &description))
        .await
        .unwrap();
    description
}
