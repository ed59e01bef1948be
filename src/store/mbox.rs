//! Append-only MBOX backup file with exclusive locking.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use advisory_lock::{AdvisoryFileLock, FileLockError, FileLockMode};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{ArchiveError, Result};
use crate::model::message::Message;
use crate::parser::header;
use crate::parser::mbox::{is_mbox_separator, MboxParser};
use crate::store::compress;

/// Sender written on the `From ` separator of appended messages.
const ENVELOPE_SENDER: &str = "MAILER-DAEMON";

/// The MBOX backup file.
///
/// Locking follows classic MBOX tooling: a `<path>.lock` dot-lock file
/// plus an exclusive advisory lock on the file itself.
pub struct BackupMbox {
    path: PathBuf,
    file: File,
    dot_lock: Option<PathBuf>,
    file_locked: bool,
}

impl BackupMbox {
    /// Open the backup at `path`, creating an empty file if it is missing.
    ///
    /// Fails with [`ArchiveError::InvalidMbox`] if the file has content that
    /// does not start with a `From ` separator.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| ArchiveError::io(&path, e))?;
        MboxParser::new(&path)?.validate()?;

        Ok(Self {
            path,
            file,
            dot_lock: None,
            file_locked: false,
        })
    }

    /// Path to the backup file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this handle currently holds both locks.
    pub fn is_locked(&self) -> bool {
        self.dot_lock.is_some() && self.file_locked
    }

    /// Take the dot-lock and the advisory lock without waiting.
    pub fn lock(&mut self) -> Result<()> {
        let dot_lock = dot_lock_path(&self.path);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&dot_lock)
        {
            Ok(mut f) => {
                // Owner pid helps an operator clear a stale lock
                if let Err(e) = writeln!(f, "{}", std::process::id()) {
                    warn!(path = %dot_lock.display(), error = %e, "Could not write pid to dot-lock");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ArchiveError::Locked(self.path.clone()));
            }
            Err(e) => return Err(ArchiveError::io(&dot_lock, e)),
        }
        self.dot_lock = Some(dot_lock);

        // Fully qualified: `File` has inherent lock methods with other signatures
        if let Err(e) = AdvisoryFileLock::try_lock(&self.file, FileLockMode::Exclusive) {
            self.remove_dot_lock();
            return match e {
                FileLockError::AlreadyLocked => Err(ArchiveError::Locked(self.path.clone())),
                other => Err(ArchiveError::Lock {
                    path: self.path.clone(),
                    source: other,
                }),
            };
        }
        self.file_locked = true;

        // The previous holder may have finalized the file away between our
        // open and our lock; appends would then land in an unlinked file.
        match is_same_file(&self.file, &self.path) {
            Ok(true) => {
                debug!(path = %self.path.display(), "Locked backup");
                Ok(())
            }
            Ok(false) => {
                self.unlock()?;
                Err(ArchiveError::Locked(self.path.clone()))
            }
            Err(e) => {
                if let Err(unlock) = self.unlock() {
                    warn!(path = %self.path.display(), error = %unlock, "Could not unlock backup");
                }
                Err(ArchiveError::io(&self.path, e))
            }
        }
    }

    /// Release both locks. Releasing an unlocked backup is a no-op.
    pub fn unlock(&mut self) -> Result<()> {
        let mut result = Ok(());
        if self.file_locked {
            self.file_locked = false;
            if let Err(e) = AdvisoryFileLock::unlock(&self.file) {
                result = Err(ArchiveError::Lock {
                    path: self.path.clone(),
                    source: e,
                });
            }
        }
        self.remove_dot_lock();
        debug!(path = %self.path.display(), "Unlocked backup");
        result
    }

    fn remove_dot_lock(&mut self) {
        if let Some(dot_lock) = self.dot_lock.take() {
            if let Err(e) = std::fs::remove_file(&dot_lock) {
                warn!(path = %dot_lock.display(), error = %e, "Could not remove dot-lock");
            }
        }
    }

    /// Fill an empty backup from its `<path>.gz` copy.
    ///
    /// Call with the locks held. Returns `true` if content was restored; a
    /// backup that already has content is left alone. Restored content that
    /// is not an MBOX is discarded and reported as [`ArchiveError::InvalidMbox`].
    pub fn restore_compressed(&mut self) -> Result<bool> {
        if !compress::decompress_into(&self.path, &mut self.file)? {
            return Ok(false);
        }
        if let Err(e) = MboxParser::new(&self.path)?.validate() {
            if let Err(trunc) = self.file.set_len(0) {
                warn!(path = %self.path.display(), error = %trunc, "Could not discard restored backup");
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Collect the normalized `Message-ID` of every message in the backup.
    ///
    /// Messages without an ID are not indexed.
    pub fn message_ids(&self) -> Result<HashSet<String>> {
        let mut ids = HashSet::new();
        MboxParser::new(&self.path)?.parse_headers_only(&mut |_offset, raw_headers| {
            let headers = header::parse_header_block(raw_headers);
            if let Some(id) = header::message_id(&headers) {
                ids.insert(id);
            }
            true
        })?;
        Ok(ids)
    }

    /// Append a message, framed with a `From ` separator and `>From ` escaping.
    pub fn append(&mut self, message: &Message) -> Result<()> {
        let mut buf = Vec::with_capacity(message.raw.len() + 128);
        buf.extend_from_slice(self.separator_padding()?);
        buf.extend_from_slice(from_line(message.delivered).as_bytes());
        escape_body(&message.raw, &mut buf);
        if !buf.ends_with(b"\n") {
            buf.push(b'\n');
        }
        buf.push(b'\n');

        self.file
            .write_all(&buf)
            .map_err(|e| ArchiveError::io(&self.path, e))
    }

    /// Flush appended data to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.file
            .flush()
            .and_then(|_| self.file.sync_data())
            .map_err(|e| ArchiveError::io(&self.path, e))
    }

    /// Bytes needed so the next separator follows a blank line.
    fn separator_padding(&mut self) -> Result<&'static [u8]> {
        let len = self
            .file
            .metadata()
            .map_err(|e| ArchiveError::io(&self.path, e))?
            .len();
        if len == 0 {
            return Ok(&b""[..]);
        }

        let tail_len = len.min(2);
        let mut tail = [0u8; 2];
        self.file
            .seek(SeekFrom::End(-(tail_len as i64)))
            .and_then(|_| self.file.read_exact(&mut tail[..tail_len as usize]))
            .map_err(|e| ArchiveError::io(&self.path, e))?;
        let tail = &tail[..tail_len as usize];

        let padding: &'static [u8] = if tail.ends_with(b"\n\n") {
            b""
        } else if tail.ends_with(b"\n") {
            b"\n"
        } else {
            b"\n\n"
        };
        Ok(padding)
    }
}

impl Drop for BackupMbox {
    fn drop(&mut self) {
        if self.file_locked || self.dot_lock.is_some() {
            if let Err(e) = self.unlock() {
                warn!(path = %self.path.display(), error = %e, "Could not unlock backup");
            }
        }
    }
}

/// Whether `path` still names the file open as `file`.
fn is_same_file(file: &File, path: &Path) -> std::io::Result<bool> {
    let on_disk = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let open = file.metadata()?;
        Ok(open.dev() == on_disk.dev() && open.ino() == on_disk.ino())
    }
    #[cfg(not(unix))]
    {
        let _ = (file, on_disk);
        Ok(true)
    }
}

/// `<path>.lock`
pub fn dot_lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// `From MAILER-DAEMON Thu Jan  4 10:00:00 2024\n`
fn from_line(delivered: Option<DateTime<Utc>>) -> String {
    let when = delivered.unwrap_or_else(Utc::now);
    format!("From {ENVELOPE_SENDER} {}\n", when.format("%a %b %e %H:%M:%S %Y"))
}

/// Copy `raw` into `out`, escaping lines that would read as a separator.
///
/// An envelope `From ` line already at the top of `raw` is dropped; the
/// backup writes its own.
fn escape_body(raw: &[u8], out: &mut Vec<u8>) {
    let mut lines = raw.split_inclusive(|&b| b == b'\n').peekable();
    if lines.peek().is_some_and(|first| is_mbox_separator(first)) {
        lines.next();
    }
    for line in lines {
        if line.starts_with(b"From ") {
            out.push(b'>');
        }
        out.extend_from_slice(line);
    }
}
