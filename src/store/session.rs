//! Scoped access to one source folder and the locked backup.
//!
//! [`ArchiveSession::acquire`] opens both mailboxes and locks the backup.
//! The backup is finalized and the lock released exactly once, either by
//! [`ArchiveSession::release`] or, on any early exit, when the session is
//! dropped. Everything that touches the backup file, including compression,
//! happens while the lock is held.

use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::error::Result;
use crate::store::compress;
use crate::store::maildir::Maildir;
use crate::store::mbox::BackupMbox;

/// How the backup is stored between sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Keep the backup gzip-compressed at rest.
    pub compress: bool,
    /// gzip level, 0-9.
    pub compression_level: u32,
}

/// An open source folder paired with the exclusively locked backup.
pub struct ArchiveSession {
    backup: BackupMbox,
    source: Maildir,
    backup_path: PathBuf,
    options: SessionOptions,
    released: bool,
}

impl ArchiveSession {
    /// Open the source folder, open and lock the backup, and restore it
    /// from its compressed copy when compression is enabled.
    ///
    /// On failure nothing stays locked, and a backup that could not be
    /// restored is removed again (its `.gz` is untouched).
    pub fn acquire(
        backup_path: impl AsRef<Path>,
        source_path: impl AsRef<Path>,
        options: SessionOptions,
    ) -> Result<Self> {
        let backup_path = backup_path.as_ref().to_path_buf();
        let source = Maildir::open(source_path)?;

        let mut backup = BackupMbox::open(&backup_path)?;
        backup.lock()?;
        if options.compress {
            if let Err(e) = backup.restore_compressed() {
                // Still locked: nobody else can have opened the empty file
                if let Err(rm) = std::fs::remove_file(&backup_path) {
                    warn!(path = %backup_path.display(), error = %rm, "Could not remove empty backup");
                }
                return Err(e);
            }
        }

        debug!(
            backup = %backup_path.display(),
            source = %source.path().display(),
            "Acquired archive session"
        );
        Ok(Self {
            backup,
            source,
            backup_path,
            options,
            released: false,
        })
    }

    /// The backup (mutable, for appends) and the source folder.
    pub fn mailboxes(&mut self) -> (&mut BackupMbox, &Maildir) {
        (&mut self.backup, &self.source)
    }

    /// Flush and finalize the backup, then unlock it.
    ///
    /// Finalizing happens while both locks are still held, so no other
    /// process can lock the plain file before it is compressed and removed.
    /// The unlock always runs; the first error is returned.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let flushed = self.backup.flush();
        // A failed flush leaves the plain file for the next run to pick up
        let finalized = if flushed.is_ok() {
            self.finalize()
        } else {
            Ok(())
        };
        let unlocked = self.backup.unlock();
        debug!(backup = %self.backup_path.display(), "Released archive session");

        flushed.and(finalized).and(unlocked)
    }

    /// Compress the backup when enabled; otherwise nothing to do.
    fn finalize(&self) -> Result<()> {
        if !self.options.compress {
            debug!(path = %self.backup_path.display(), "Backup finalize: compression disabled");
            return Ok(());
        }
        compress::compress(&self.backup_path, self.options.compression_level)
    }
}

impl Drop for ArchiveSession {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            error!(backup = %self.backup_path.display(), error = %e, "Failed to release archive session");
        }
    }
}
