//! Copy messages older than the retention window into the backup.
//!
//! A message is archived when its `Message-ID` is not already in the backup
//! and its `Date` falls strictly before `today - retention_days`. Problems
//! with individual messages are recorded in the [`ArchiveReport`] and never
//! stop the pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use tracing::{debug, error, info};

use crate::error::{ArchiveError, MessageError, Result};
use crate::parser::date;
use crate::store::maildir::Maildir;
use crate::store::mbox::BackupMbox;

/// Outcome of one archive pass over a source folder.
#[derive(Debug, Default)]
pub struct ArchiveReport {
    /// Messages appended to the backup.
    pub appended: usize,
    /// Messages skipped because their `Message-ID` was already archived.
    pub duplicates: usize,
    /// Messages skipped because they are inside the retention window.
    pub too_recent: usize,
    /// Messages that could not be fetched or dated, with their key.
    pub errors: Vec<(String, MessageError)>,
}

impl ArchiveReport {
    /// Messages that reached the eligibility test.
    pub fn evaluated(&self) -> usize {
        self.appended + self.duplicates + self.too_recent
    }
}

/// `today - retention_days`, clamped to the earliest representable date.
pub fn cutoff_date(today: NaiveDate, retention_days: u64) -> NaiveDate {
    today
        .checked_sub_days(Days::new(retention_days))
        .unwrap_or(NaiveDate::MIN)
}

/// Archive pass configuration.
pub struct Archiver {
    retention_days: u64,
    today: NaiveDate,
    cancel: Option<Arc<AtomicBool>>,
}

impl Archiver {
    /// Archiver keeping `retention_days` of recent mail, relative to the
    /// local calendar date.
    pub fn new(retention_days: u64) -> Self {
        Self {
            retention_days,
            today: Local::now().date_naive(),
            cancel: None,
        }
    }

    /// Use `today` instead of the current local date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Stop before the next message once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Messages dated strictly before this day are old enough.
    pub fn cutoff(&self) -> NaiveDate {
        cutoff_date(self.today, self.retention_days)
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Copy every eligible message of `source` into `backup`.
    ///
    /// The membership index is read from `backup` once, before any append,
    /// and is not updated during the pass.
    ///
    /// Returns an error only for backup I/O failures or cancellation;
    /// per-message problems are in the report.
    pub fn archive(&self, backup: &mut BackupMbox, source: &Maildir) -> Result<ArchiveReport> {
        let archived_ids = backup.message_ids()?;
        let cutoff = self.cutoff();
        debug!(
            indexed = archived_ids.len(),
            cutoff = %cutoff,
            source = %source.path().display(),
            "Starting archive pass"
        );

        let mut report = ArchiveReport::default();
        let total = source.len();

        for (i, key) in source.keys().enumerate() {
            if self.cancelled() {
                info!(appended = report.appended, "Archive pass interrupted");
                return Err(ArchiveError::Cancelled);
            }

            let message = match source.get(key) {
                Ok(m) => m,
                Err(e) => {
                    error!(key = key, error = %e, "Skipping message");
                    report.errors.push((key.to_string(), e));
                    continue;
                }
            };

            let raw_date = message.date.as_deref().unwrap_or_default();
            let Some(sent) = date::parse_date(raw_date) else {
                let e = MessageError::Date {
                    value: raw_date.to_string(),
                };
                error!(key = key, error = %e, "Skipping message");
                report.errors.push((key.to_string(), e));
                continue;
            };

            let already_archived = message
                .message_id
                .as_ref()
                .is_some_and(|id| archived_ids.contains(id));

            if already_archived {
                debug!("{}/{} message {} is already archived", i + 1, total, key);
                report.duplicates += 1;
            } else if sent.date() < cutoff {
                backup.append(&message)?;
                debug!(
                    "{}/{} message {} dated {} archived",
                    i + 1,
                    total,
                    key,
                    sent.date()
                );
                report.appended += 1;
            } else {
                debug!(
                    "{}/{} message {} dated {} is inside the retention window",
                    i + 1,
                    total,
                    key,
                    sent.date()
                );
                report.too_recent += 1;
            }
        }

        Ok(report)
    }
}
