//! Payload digests
//!
//! Checksums are written as `<algorithm>:<lowercase hex>` so the algorithm
//! can change without a schema bump.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 1024 * 1024;

/// Error types for digest computation
#[derive(Error, Debug)]
pub enum ChecksumError {
    #[error("unsupported checksum format: {value:?}")]
    UnsupportedFormat { value: String },

    #[error("unable to hash {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha256,
    Blake3,
}

impl DigestAlgorithm {
    /// Split `<algorithm>:<hex>` into its algorithm and digest
    pub fn split(checksum: &str) -> Result<(Self, &str), ChecksumError> {
        let unsupported = || ChecksumError::UnsupportedFormat {
            value: checksum.to_string(),
        };

        let (algorithm, digest) = checksum.split_once(':').ok_or_else(unsupported)?;
        let algorithm = match algorithm {
            "sha256" => DigestAlgorithm::Sha256,
            "blake3" => DigestAlgorithm::Blake3,
            _ => return Err(unsupported()),
        };

        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(unsupported());
        }

        Ok((algorithm, digest))
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DigestAlgorithm::Sha256 => write!(f, "sha256"),
            DigestAlgorithm::Blake3 => write!(f, "blake3"),
        }
    }
}

enum Hasher {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            DigestAlgorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize(self) -> String {
        match self {
            Hasher::Sha256(h) => format!("{:x}", h.finalize()),
            Hasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Calculate the checksum of a file, formatted as `<algorithm>:<hex>`
pub async fn calculate_checksum(path: &Path, algorithm: DigestAlgorithm) -> Result<String, ChecksumError> {
    let io_err = |source| ChecksumError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).await.map_err(io_err)?;
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buffer).await.map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{}:{}", algorithm, hasher.finalize()))
}

/// Hash `path` with the algorithm named in `expected` and compare
///
/// Returns whether the digests match together with the actual checksum.
pub async fn validate_by_hash(path: &Path, expected: &str) -> Result<(bool, String), ChecksumError> {
    let (algorithm, _) = DigestAlgorithm::split(expected)?;
    let actual = calculate_checksum(path, algorithm).await?;
    Ok((actual.eq_ignore_ascii_case(expected), actual))
}
