//! CLI entry point for `mboxArchive`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use mboxarchive::archive::Archiver;
use mboxarchive::config::Config;
use mboxarchive::error::ArchiveError;
use mboxarchive::hook;
use mboxarchive::store::compress;
use mboxarchive::store::session::{ArchiveSession, SessionOptions};

/// Exit status after an operator interrupt (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

/// Archive mail older than a number of days from maildir folders into an MBOX backup.
#[derive(Parser)]
#[command(name = "mboxarchive", version)]
struct Cli {
    /// Archive mail older than this many days
    #[arg(short, long, default_value_t = 180)]
    days: u64,

    /// Name/path of the MBOX backup file
    #[arg(short, long = "archive-name", default_value = "mail_archive")]
    archive_name: String,

    /// Directory holding the maildir folders
    #[arg(short = 'p', long = "mailbox-path", default_value = ".")]
    mailbox_path: String,

    /// Folders to archive, in order
    #[arg(short, long, num_args = 1.., default_values_t = vec!["INBOX".to_string()])]
    folders: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = mboxarchive::config::load_config();
    setup_logging(&config.general.log_level, &config);

    let interrupted = install_interrupt_flag()?;

    let archive_path = expand(&cli.archive_name);
    let mailbox_path = expand(&cli.mailbox_path);

    match run(&cli, &config, &archive_path, &mailbox_path, &interrupted) {
        Err(e) if matches!(e.downcast_ref::<ArchiveError>(), Some(ArchiveError::Cancelled)) => {
            warn!("Interrupted, backup released");
            std::process::exit(EXIT_INTERRUPTED);
        }
        other => other,
    }
}

/// Flag set by SIGINT, SIGTERM or SIGHUP. The run stops at the next message
/// or folder and the backup is released before the process exits.
fn install_interrupt_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("Cannot install interrupt handler")?;
    Ok(interrupted)
}

/// Archive every folder in order. A store failure stops the run.
fn run(
    cli: &Cli,
    config: &Config,
    archive_path: &Path,
    mailbox_path: &Path,
    interrupted: &Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let options = SessionOptions {
        compress: config.archive.compress,
        compression_level: config.archive.compression_level,
    };
    let archiver = Archiver::new(cli.days).with_cancel_flag(Arc::clone(interrupted));
    info!(cutoff = %archiver.cutoff(), "Archiving mail dated before cutoff");

    for folder in &cli.folders {
        if interrupted.load(Ordering::SeqCst) {
            return Err(ArchiveError::Cancelled.into());
        }
        let source_path = mailbox_path.join(folder);
        let mut session = ArchiveSession::acquire(archive_path, &source_path, options)
            .with_context(|| {
                format!(
                    "Cannot open '{}' with backup '{}'",
                    source_path.display(),
                    archive_path.display()
                )
            })?;

        let (backup, source) = session.mailboxes();
        let report = archiver.archive(backup, source)?;
        session.release()?;

        info!(
            folder = %folder,
            appended = report.appended,
            duplicates = report.duplicates,
            too_recent = report.too_recent,
            errors = report.errors.len(),
            "Folder archived"
        );

        if let Some(command) = &config.hook.post_archive {
            if let Err(e) = hook::run_post_archive(command, folder) {
                error!(folder = %folder, error = %e, "Post-archive command failed");
            }
        }
    }

    log_archive_size(archive_path, options);
    Ok(())
}

/// Expand a leading `~` to the home directory.
fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn log_archive_size(archive_path: &Path, options: SessionOptions) {
    use humansize::{format_size, BINARY};

    let stored = if options.compress {
        compress::compressed_path(archive_path)
    } else {
        archive_path.to_path_buf()
    };
    if let Ok(meta) = std::fs::metadata(&stored) {
        info!(
            path = %stored.display(),
            size = %format_size(meta.len(), BINARY),
            "Backup size"
        );
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mboxarchive::config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mboxarchive.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}
