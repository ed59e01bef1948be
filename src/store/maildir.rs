//! Read-only maildir folder.
//!
//! A folder holds one message per file under `new/` and `cur/`. Readers
//! need no locking: delivery agents write to `tmp/` and rename into place.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{ArchiveError, MessageError, Result};
use crate::model::message::Message;
use crate::parser::eml;

/// Separator between the unique name and the info part of a `cur/` file name.
const INFO_SEPARATOR: &str = ":2,";

/// A maildir folder opened for enumeration.
///
/// The key table is built once when the folder is opened; keys stay valid
/// for the lifetime of this value.
pub struct Maildir {
    path: PathBuf,
    keys: Vec<String>,
    files: HashMap<String, PathBuf>,
}

impl Maildir {
    /// Open the maildir at `path` and list its messages.
    ///
    /// Keys are listed from `new/` then `cur/`, each in file-name order.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let new_dir = path.join("new");
        let cur_dir = path.join("cur");
        if !new_dir.is_dir() && !cur_dir.is_dir() {
            return Err(ArchiveError::SourceNotFound(path));
        }

        let mut keys = Vec::new();
        let mut files = HashMap::new();
        for dir in [new_dir, cur_dir] {
            if !dir.is_dir() {
                continue;
            }
            let mut names: Vec<(String, PathBuf)> = Vec::new();
            for entry in fs::read_dir(&dir).map_err(|e| ArchiveError::io(&dir, e))? {
                let entry = entry.map_err(|e| ArchiveError::io(&dir, e))?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }
                names.push((name, entry.path()));
            }
            names.sort();

            for (name, file) in names {
                let key = key_from_file_name(&name).to_string();
                if files.contains_key(&key) {
                    warn!(key = %key, path = %file.display(), "Duplicate maildir key, ignoring file");
                    continue;
                }
                keys.push(key.clone());
                files.insert(key, file);
            }
        }

        debug!(path = %path.display(), count = keys.len(), "Opened maildir");
        Ok(Self { path, keys, files })
    }

    /// Path to the maildir folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of messages listed when the folder was opened.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Message keys in enumeration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Read and parse the message stored under `key`.
    pub fn get(&self, key: &str) -> std::result::Result<Message, MessageError> {
        let file = self
            .files
            .get(key)
            .ok_or_else(|| MessageError::fetch(format!("no message with key {key}")))?;
        let data = fs::read(file)
            .map_err(|e| MessageError::fetch(format!("cannot read {}: {e}", file.display())))?;
        let delivered = fs::metadata(file)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        eml::parse_message(data, delivered)
    }
}

/// Strip the `:2,<flags>` info suffix from a maildir file name.
fn key_from_file_name(name: &str) -> &str {
    name.split(INFO_SEPARATOR).next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_maildir(root: &Path) {
        for d in ["cur", "new", "tmp"] {
            fs::create_dir_all(root.join(d)).unwrap();
        }
    }

    #[test]
    fn test_key_from_file_name() {
        assert_eq!(key_from_file_name("1700000000.M1P2.host:2,S"), "1700000000.M1P2.host");
        assert_eq!(key_from_file_name("1700000000.M1P2.host"), "1700000000.M1P2.host");
    }

    #[test]
    fn test_open_missing_folder() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            Maildir::open(tmp.path().join("INBOX")),
            Err(ArchiveError::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_keys_new_then_cur() {
        let tmp = tempfile::tempdir().unwrap();
        make_maildir(tmp.path());
        fs::write(tmp.path().join("cur").join("a:2,S"), "Subject: a\n\nA\n").unwrap();
        fs::write(tmp.path().join("new").join("b"), "Subject: b\n\nB\n").unwrap();
        fs::write(tmp.path().join("new").join(".hidden"), "x").unwrap();
        fs::write(tmp.path().join("tmp").join("c"), "Subject: c\n\nC\n").unwrap();

        let md = Maildir::open(tmp.path()).unwrap();
        assert_eq!(md.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(md.len(), 2);

        let msg = md.get("a").unwrap();
        assert_eq!(msg.raw, b"Subject: a\n\nA\n".to_vec());
        assert!(msg.delivered.is_some());
    }

    #[test]
    fn test_get_unknown_key() {
        let tmp = tempfile::tempdir().unwrap();
        make_maildir(tmp.path());
        let md = Maildir::open(tmp.path()).unwrap();
        assert!(md.is_empty());
        assert!(matches!(md.get("nope"), Err(MessageError::Fetch { .. })));
    }
}
