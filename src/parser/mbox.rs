//! Streaming MBOX parser.
//!
//! Reads MBOX files line-by-line with a large buffer.
//! Never loads the entire file into memory. Tolerant of malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{ArchiveError, Result};

/// Size of the internal read buffer (1 MB for fast sequential reads on modern SSDs).
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Streaming MBOX parser.
///
/// Reads through the file sequentially, invoking a caller-supplied callback for
/// every message boundary it finds. The parser is tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line
/// - Truncated messages at EOF
/// - UTF-8 BOM at the start of the file
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
}

impl MboxParser {
    /// Create a parser for the given MBOX file.
    ///
    /// Verifies that the file exists and is readable, but does NOT validate
    /// that it is actually an MBOX (see [`MboxParser::validate`]).
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| ArchiveError::io(&path, e))?;
        Ok(Self {
            path,
            file_size: metadata.len(),
        })
    }

    /// Check that the first non-blank line is a `From ` separator.
    ///
    /// An empty file is a valid, empty MBOX.
    pub fn validate(&self) -> Result<()> {
        if self.file_size == 0 {
            return Ok(());
        }

        let file = File::open(&self.path).map_err(|e| ArchiveError::io(&self.path, e))?;
        let mut reader = BufReader::new(file);
        let mut line_buf: Vec<u8> = Vec::with_capacity(256);

        loop {
            line_buf.clear();
            let n = reader
                .read_until(b'\n', &mut line_buf)
                .map_err(|e| ArchiveError::io(&self.path, e))?;
            if n == 0 {
                return Ok(());
            }
            if is_blank_line(&line_buf) {
                continue;
            }
            return if is_mbox_separator(&line_buf) {
                Ok(())
            } else {
                Err(ArchiveError::InvalidMbox(self.path.clone()))
            };
        }
    }

    /// Walk the MBOX, calling `header_callback` with the header block of
    /// each message.
    ///
    /// The callback receives `(offset, header_bytes)`; the header bytes start
    /// with the `From ` separator line. It returns `true` to continue or
    /// `false` to stop early.
    ///
    /// Returns the number of messages found.
    pub fn parse_headers_only(
        &self,
        header_callback: &mut dyn FnMut(u64, &[u8]) -> bool,
    ) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| ArchiveError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut current_offset: u64 = 0;
        let mut header_buf: Vec<u8> = Vec::with_capacity(16 * 1024);
        let mut in_headers = false;
        let mut message_start: Option<u64> = None;
        let mut prev_line_was_empty = true;

        // Reusable line buffer
        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line_buf.clear();
            let line_len = reader
                .read_until(b'\n', &mut line_buf)
                .map_err(|e| ArchiveError::io(&self.path, e))?;
            if line_len == 0 {
                break;
            }

            if is_mbox_separator(&line_buf) {
                if !prev_line_was_empty {
                    warn!(
                        offset = current_offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                // Emit the *previous* message
                if let Some(start) = message_start {
                    if !header_callback(start, &header_buf) {
                        return Ok(count);
                    }
                    count += 1;
                }
                header_buf.clear();
                header_buf.extend_from_slice(&line_buf);
                in_headers = true;
                message_start = Some(current_offset);
            } else if in_headers {
                if is_blank_line(&line_buf) {
                    in_headers = false;
                } else {
                    header_buf.extend_from_slice(&line_buf);
                }
            }

            prev_line_was_empty = is_blank_line(&line_buf);
            current_offset += line_len as u64;
        }

        if let Some(start) = message_start {
            if header_callback(start, &header_buf) {
                count += 1;
            }
        }

        Ok(count)
    }
}

/// Check whether a line is an MBOX separator (`From ` at the start).
pub(crate) fn is_mbox_separator(line: &[u8]) -> bool {
    // Skip BOM if present at very start
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
