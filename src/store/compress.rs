//! gzip storage of the backup at rest.
//!
//! While a session is open the backup lives uncompressed at its own path.
//! When compression is enabled it is kept as `<path>.gz` between runs, and
//! both directions run while the backup is locked.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info, warn};

use crate::error::{ArchiveError, Result};

/// `<path>.gz`
pub fn compressed_path(path: &Path) -> PathBuf {
    with_suffix(path, ".gz")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Copy the content of `<path>.gz` into `out`, the open and still empty
/// backup at `path`.
///
/// Returns `true` if content was restored. Nothing happens when there is no
/// compressed copy, or when `out` already has content: a plain file left by
/// an interrupted finalize holds everything the `.gz` does. The backup is
/// written in place, so a lock held on `out` stays valid. On failure `out`
/// is truncated back to empty.
pub fn decompress_into(path: &Path, out: &mut File) -> Result<bool> {
    let gz_path = compressed_path(path);
    let len = out.metadata().map_err(|e| ArchiveError::io(path, e))?.len();
    if len != 0 || !gz_path.exists() {
        return Ok(false);
    }

    let result = (|| -> io::Result<()> {
        let mut decoder = GzDecoder::new(BufReader::new(File::open(&gz_path)?));
        io::copy(&mut decoder, out)?;
        out.sync_all()
    })();

    match result {
        Ok(()) => {
            debug!(path = %gz_path.display(), "Decompressed backup");
            Ok(true)
        }
        Err(source) => {
            if let Err(e) = out.set_len(0) {
                warn!(path = %path.display(), error = %e, "Could not discard partial backup");
            }
            Err(ArchiveError::Compression {
                path: gz_path,
                source,
            })
        }
    }
}

/// Compress `path` into `<path>.gz` and remove `path`.
///
/// The `.gz` is written to a temporary sibling and renamed into place, so an
/// existing archive is never left half-written.
pub fn compress(path: &Path, level: u32) -> Result<()> {
    let gz_path = compressed_path(path);
    let tmp_path = with_suffix(&gz_path, ".tmp");

    let result = (|| -> io::Result<()> {
        let mut input = BufReader::new(File::open(path)?);
        let mut encoder = GzEncoder::new(
            BufWriter::new(File::create(&tmp_path)?),
            Compression::new(level.min(9)),
        );
        io::copy(&mut input, &mut encoder)?;
        encoder
            .finish()?
            .into_inner()
            .map_err(|e| e.into_error())?
            .sync_all()?;
        std::fs::rename(&tmp_path, &gz_path)?;
        std::fs::remove_file(path)
    })();

    match result {
        Ok(()) => {
            info!(path = %gz_path.display(), "Compressed backup");
            Ok(())
        }
        Err(source) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(ArchiveError::Compression {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}
