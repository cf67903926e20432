//! Archive extraction for database bundles
//!
//! Bundles are tar archives, optionally gzip-compressed. Compression is
//! detected from the magic bytes rather than the file name so a mirror can
//! name its files however it likes.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::installation::ManualProgress;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Error types for archive extraction
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("unable to open archive {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to extract archive {}: {source}", .path.display())]
    Extract {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction task failed: {0}")]
    Task(String),
}

/// Extract `archive` into `dest`
///
/// Runs on the blocking pool. When `progress` is given its total is set to
/// the archive size and it advances as compressed bytes are consumed.
/// Entries that would land outside `dest` are skipped by the tar reader.
pub async fn unarchive(
    archive: &Path,
    dest: &Path,
    progress: Option<ManualProgress>,
) -> Result<(), ArchiveError> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || unarchive_blocking(&archive, &dest, progress))
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}

fn unarchive_blocking(
    archive: &Path,
    dest: &Path,
    progress: Option<ManualProgress>,
) -> Result<(), ArchiveError> {
    let open_err = |source| ArchiveError::Open {
        path: archive.to_path_buf(),
        source,
    };
    let extract_err = |source| ArchiveError::Extract {
        path: archive.to_path_buf(),
        source,
    };

    let file = File::open(archive).map_err(open_err)?;
    let size = file.metadata().map_err(open_err)?.len();
    if let Some(p) = &progress {
        p.set_total(size as i64);
    }

    let mut reader = BufReader::new(CountingReader {
        inner: file,
        progress,
    });
    let compressed = reader.fill_buf().map_err(open_err)?.starts_with(&GZIP_MAGIC);

    let reader: Box<dyn Read> = if compressed {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };

    tracing::debug!(
        archive = %archive.display(),
        dest = %dest.display(),
        compressed,
        "unarchiving database bundle"
    );

    tar::Archive::new(reader).unpack(dest).map_err(extract_err)
}

struct CountingReader<R> {
    inner: R,
    progress: Option<ManualProgress>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if let Some(p) = &self.progress {
            p.add(n as i64);
        }
        Ok(n)
    }
}
