//! Integration tests for archive passes over real maildir and MBOX files.

use std::fs;
use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use chrono::{Days, Local, NaiveDate};
use predicates::prelude::*;

use mboxarchive::archive::Archiver;
use mboxarchive::error::MessageError;
use mboxarchive::parser::mbox::MboxParser;
use mboxarchive::store::mbox::BackupMbox;
use mboxarchive::store::session::{ArchiveSession, SessionOptions};

fn make_folder(root: &Path, name: &str) -> PathBuf {
    let folder = root.join(name);
    for d in ["cur", "new", "tmp"] {
        fs::create_dir_all(folder.join(d)).unwrap();
    }
    folder
}

fn date_days_ago(today: NaiveDate, days: u64) -> String {
    today
        .checked_sub_days(Days::new(days))
        .unwrap()
        .format("%a, %d %b %Y 09:30:00 -0500")
        .to_string()
}

fn raw_message(id: &str, date: &str, subject: &str) -> String {
    format!(
        "Message-ID: <{id}>\nDate: {date}\nFrom: Sender <sender@example.com>\nSubject: {subject}\n\nHello,\nFrom now on this line needs escaping.\n"
    )
}

fn deliver(folder: &Path, key: &str, raw: &str) {
    fs::write(folder.join("cur").join(format!("{key}:2,S")), raw).unwrap();
}

/// Open a session, run one archive pass, release.
fn archive_once(
    backup: &Path,
    folder: &Path,
    archiver: &Archiver,
    options: SessionOptions,
) -> mboxarchive::archive::ArchiveReport {
    let mut session = ArchiveSession::acquire(backup, folder, options).unwrap();
    let (mbox, source) = session.mailboxes();
    let report = archiver.archive(mbox, source).unwrap();
    session.release().unwrap();
    report
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

fn backup_len(path: &Path) -> u64 {
    MboxParser::new(path)
        .unwrap()
        .parse_headers_only(&mut |_offset, _headers| true)
        .unwrap()
}

// ─── End-to-end: 200 / 100 / 10 days old, default retention ─────────

#[test]
fn test_end_to_end_default_retention() {
    let temp = assert_fs::TempDir::new().unwrap();
    let inbox = make_folder(temp.path(), "INBOX");
    let today = Local::now().date_naive();

    deliver(&inbox, "old", &raw_message("old@example.com", &date_days_ago(today, 200), "Old"));
    deliver(&inbox, "mid", &raw_message("mid@example.com", &date_days_ago(today, 100), "Mid"));
    deliver(&inbox, "new", &raw_message("new@example.com", &date_days_ago(today, 10), "New"));

    let backup = temp.child("mail_archive");
    let archiver = Archiver::new(180);

    let first = archive_once(backup.path(), &inbox, &archiver, SessionOptions::default());
    assert_eq!(first.appended, 1);
    assert_eq!(first.too_recent, 2);
    assert!(first.errors.is_empty());

    assert!(read(backup.path()).contains("<old@example.com>"));
    assert!(!read(backup.path()).contains("<mid@example.com>"));
    assert!(!read(backup.path()).contains("<new@example.com>"));
    assert!(read(backup.path()).contains("\n>From now on this line needs escaping.\n"));

    let second = archive_once(backup.path(), &inbox, &archiver, SessionOptions::default());
    assert_eq!(second.appended, 0);
    assert_eq!(second.duplicates, 1);
    assert_eq!(backup_len(backup.path()), 1);

    temp.child("mail_archive.lock").assert(predicate::path::missing());
}

// ─── Messages are copied verbatim apart from MBOX framing ───────────

#[test]
fn test_archived_message_is_verbatim() {
    let temp = assert_fs::TempDir::new().unwrap();
    let inbox = make_folder(temp.path(), "INBOX");
    let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    let raw = raw_message("verbatim@example.com", &date_days_ago(today, 365), "Verbatim");
    deliver(&inbox, "v", &raw);

    let backup = temp.child("mail_archive");
    let archiver = Archiver::new(180).with_today(today);
    archive_once(backup.path(), &inbox, &archiver, SessionOptions::default());

    assert_eq!(backup_len(backup.path()), 1);
    let stored = read(backup.path());
    let (from_line, rest) = stored.split_once('\n').unwrap();
    assert!(from_line.starts_with("From MAILER-DAEMON "));
    let unescaped = rest.replace("\n>From ", "\nFrom ");
    assert_eq!(unescaped, format!("{raw}\n"));
}

// ─── Deduplication against what the backup already holds ────────────

#[test]
fn test_shared_message_id_with_backup_is_never_appended() {
    let temp = assert_fs::TempDir::new().unwrap();
    let inbox = make_folder(temp.path(), "INBOX");
    let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();

    // Backup already holds one copy
    temp.child("mail_archive")
        .write_str(&format!(
            "From MAILER-DAEMON Mon Jan  1 00:00:00 2024\n{}\n",
            raw_message("shared@example.com", &date_days_ago(today, 500), "Shared")
                .replace("\nFrom now", "\n>From now")
        ))
        .unwrap();

    deliver(&inbox, "copy1", &raw_message("shared@example.com", &date_days_ago(today, 400), "Copy 1"));
    deliver(&inbox, "copy2", &raw_message("shared@example.com", &date_days_ago(today, 5), "Copy 2"));

    let archiver = Archiver::new(180).with_today(today);
    let report = archive_once(
        &temp.path().join("mail_archive"),
        &inbox,
        &archiver,
        SessionOptions::default(),
    );
    assert_eq!(report.appended, 0);
    assert_eq!(report.duplicates, 2);
    assert_eq!(backup_len(&temp.path().join("mail_archive")), 1);
}

// ─── One broken message does not stop the pass ──────────────────────

#[test]
fn test_fetch_failure_is_isolated() {
    let temp = assert_fs::TempDir::new().unwrap();
    let inbox = make_folder(temp.path(), "INBOX");
    let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();

    for i in 0..4 {
        deliver(
            &inbox,
            &format!("good{i}"),
            &raw_message(&format!("good{i}@example.com"), &date_days_ago(today, 300), "Good"),
        );
    }
    fs::write(inbox.join("new").join("broken"), b"\x00\x01\x02\x03 no headers here").unwrap();

    let archiver = Archiver::new(180).with_today(today);
    let report = archive_once(
        &temp.path().join("mail_archive"),
        &inbox,
        &archiver,
        SessionOptions::default(),
    );

    assert_eq!(report.evaluated(), 4);
    assert_eq!(report.appended, 4);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, "broken");
    assert!(matches!(report.errors[0].1, MessageError::Fetch { .. }));
}

// ─── Malformed zone repair end to end ───────────────────────────────

#[test]
fn test_malformed_date_repaired_and_unrecoverable_skipped() {
    let temp = assert_fs::TempDir::new().unwrap();
    let inbox = make_folder(temp.path(), "INBOX");

    deliver(&inbox, "repair", &raw_message("repair@example.com", "Mon, 1 Jan 2001 00:00:00 EST-5)", "Repair"));
    deliver(&inbox, "garbage", &raw_message("garbage@example.com", "the day after tomorrow", "Garbage"));

    let backup = temp.child("mail_archive");
    let report = archive_once(backup.path(), &inbox, &Archiver::new(180), SessionOptions::default());

    assert_eq!(report.appended, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, "garbage");
    assert!(read(backup.path()).contains("<repair@example.com>"));
    assert!(!read(backup.path()).contains("<garbage@example.com>"));
}

// ─── Several folders share one backup ───────────────────────────────

#[test]
fn test_folders_processed_in_turn() {
    let temp = assert_fs::TempDir::new().unwrap();
    let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    let inbox = make_folder(temp.path(), "INBOX");
    let sent = make_folder(temp.path(), "Sent");
    deliver(&inbox, "i", &raw_message("i@example.com", &date_days_ago(today, 300), "In"));
    deliver(&sent, "s", &raw_message("s@example.com", &date_days_ago(today, 300), "Out"));
    // Same message filed in both folders
    deliver(&sent, "dup", &raw_message("i@example.com", &date_days_ago(today, 300), "In"));

    let backup = temp.path().join("mail_archive");
    let archiver = Archiver::new(180).with_today(today);
    let first = archive_once(&backup, &inbox, &archiver, SessionOptions::default());
    let second = archive_once(&backup, &sent, &archiver, SessionOptions::default());

    assert_eq!(first.appended, 1);
    assert_eq!(second.appended, 1);
    assert_eq!(second.duplicates, 1);

    let ids = BackupMbox::open(&backup).unwrap().message_ids().unwrap();
    assert_eq!(ids.len(), 2);
}

// ─── Compressed backup across runs ──────────────────────────────────

#[test]
fn test_compressed_backup_is_idempotent() {
    let temp = assert_fs::TempDir::new().unwrap();
    let inbox = make_folder(temp.path(), "INBOX");
    let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    deliver(&inbox, "a", &raw_message("a@example.com", &date_days_ago(today, 300), "A"));
    deliver(&inbox, "b", &raw_message("b@example.com", &date_days_ago(today, 250), "B"));

    let backup = temp.path().join("mail_archive");
    let options = SessionOptions {
        compress: true,
        compression_level: 9,
    };
    let archiver = Archiver::new(180).with_today(today);

    assert_eq!(archive_once(&backup, &inbox, &archiver, options).appended, 2);
    temp.child("mail_archive").assert(predicate::path::missing());
    temp.child("mail_archive.gz").assert(predicate::path::exists());

    let second = archive_once(&backup, &inbox, &archiver, options);
    assert_eq!(second.appended, 0);
    assert_eq!(second.duplicates, 2);

    let mut session = ArchiveSession::acquire(&backup, &inbox, options).unwrap();
    let ids = session.mailboxes().0.message_ids().unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains("<a@example.com>"));
    session.release().unwrap();
}

// ─── Store acquisition failures ─────────────────────────────────────

#[test]
fn test_corrupt_backup_fails_acquire() {
    let temp = assert_fs::TempDir::new().unwrap();
    let inbox = make_folder(temp.path(), "INBOX");
    temp.child("mail_archive").write_str("garbage\n").unwrap();

    let result = ArchiveSession::acquire(
        temp.path().join("mail_archive"),
        &inbox,
        SessionOptions::default(),
    );
    assert!(matches!(
        result,
        Err(mboxarchive::error::ArchiveError::InvalidMbox(_))
    ));
    temp.child("mail_archive.lock").assert(predicate::path::missing());
    temp.child("mail_archive").assert("garbage\n");
}
