//! External command run after a folder has been archived.
//!
//! Deleting archived mail from the remote service is left to a separate
//! script; this only launches it.

use std::process::{Command, ExitStatus};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum HookError {
    #[error("post-archive command is empty")]
    Empty,

    #[error("cannot run post-archive command '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("post-archive command '{program}' failed with {status}")]
    Failed { program: String, status: ExitStatus },
}

/// Run `command` (program then arguments) with `folder` appended.
pub fn run_post_archive(command: &[String], folder: &str) -> Result<(), HookError> {
    let (program, args) = command.split_first().ok_or(HookError::Empty)?;
    debug!(program = %program, folder = folder, "Running post-archive command");

    let status = Command::new(program)
        .args(args)
        .arg(folder)
        .status()
        .map_err(|source| HookError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !status.success() {
        return Err(HookError::Failed {
            program: program.clone(),
            status,
        });
    }
    info!(program = %program, folder = folder, "Post-archive command finished");
    Ok(())
}
