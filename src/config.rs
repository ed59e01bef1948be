//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MBOXARCHIVE_CONFIG` (environment variable)
//! 2. `~/.config/mboxarchive/config.toml` (Linux/macOS)
//!    `%APPDATA%\mboxarchive\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Backup file handling.
    pub archive: ArchiveConfig,
    /// External commands run after archiving.
    pub hook: HookConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override the directory holding `mboxarchive.log`.
    pub log_dir: Option<PathBuf>,
}

/// Backup file handling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Keep the backup gzip-compressed at rest (`<archive>.gz`).
    pub compress: bool,
    /// gzip level, 0-9.
    pub compression_level: u32,
}

/// External commands run after archiving.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Program and arguments run after each archived folder. The folder
    /// name is appended as the last argument.
    pub post_archive: Option<Vec<String>>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compress: false,
            compression_level: 6,
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MBOXARCHIVE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mboxarchive").join("config.toml"))
}

/// Return the directory for the log file.
pub fn log_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.log_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mboxarchive")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert!(!cfg.archive.compress);
        assert_eq!(cfg.archive.compression_level, 6);
        assert!(cfg.hook.post_archive.is_none());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[archive]
compress = true

[hook]
post_archive = ["purge-label", "--yes"]
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert!(cfg.archive.compress);
        assert_eq!(cfg.archive.compression_level, 6);
        assert_eq!(
            cfg.hook.post_archive.as_deref(),
            Some(&["purge-label".to_string(), "--yes".to_string()][..])
        );
        assert_eq!(cfg.general.log_level, "warn");
    }

    #[test]
    fn test_log_dir_override() {
        let mut cfg = Config::default();
        cfg.general.log_dir = Some(PathBuf::from("/var/log/mba"));
        assert_eq!(log_dir(&cfg), PathBuf::from("/var/log/mba"));
    }
}
