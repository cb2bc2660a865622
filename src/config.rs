//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILSIFT_CONFIG` (environment variable)
//! 2. `~/.config/mailsift/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailsift\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fuzzy::{FuzzyConfig, DEFAULT_THRESHOLD};
use crate::model::record::Folder;
use crate::search::parser::QueryDefaults;
use crate::search::query::DEFAULT_TOP_N;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Query defaults, the lowest-precedence layer under flags and tokens.
    pub query: QueryConfig,
    /// Text output settings.
    pub display: DisplayConfig,
    /// Known account addresses.
    pub accounts: AccountsConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Default record source when `--input` is not given.
    pub input: Option<PathBuf>,
}

/// Query defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub fuzzy: bool,
    /// Similarity threshold in `[0, 1]`.
    pub fuzzy_threshold: f64,
    pub case_sensitive: bool,
    pub top_n: usize,
    /// Maximum records fetched (0 = no limit).
    pub limit: usize,
    /// Default folder restriction.
    pub folder: Option<String>,
    /// Restrict queries to mail addressed to the preferred account.
    pub restrict_to_account: bool,
}

/// Text output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Width of the longest histogram bar, in characters.
    pub bar_width: usize,
    /// `strftime` format for dates in record lists.
    pub date_format: String,
    /// Subject column width in record lists.
    pub subject_width: usize,
}

/// Known account addresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// Preferred account address.
    pub default: Option<String>,
    /// All configured addresses, in preference order.
    pub addresses: Vec<String>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
            input: None,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            fuzzy: true,
            fuzzy_threshold: DEFAULT_THRESHOLD,
            case_sensitive: false,
            top_n: DEFAULT_TOP_N,
            limit: 0,
            folder: None,
            restrict_to_account: false,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            bar_width: 24,
            date_format: "%Y-%m-%d %H:%M".to_string(),
            subject_width: 40,
        }
    }
}

impl QueryConfig {
    /// Parser defaults for this section. An out-of-range threshold falls
    /// back to the built-in one.
    pub fn to_defaults(&self) -> QueryDefaults {
        let threshold = if (0.0..=1.0).contains(&self.fuzzy_threshold) {
            self.fuzzy_threshold
        } else {
            tracing::warn!(
                value = self.fuzzy_threshold,
                "Configured fuzzy_threshold outside [0, 1], using default"
            );
            DEFAULT_THRESHOLD
        };
        QueryDefaults {
            fuzzy: FuzzyConfig {
                enabled: self.fuzzy,
                threshold,
                case_sensitive: self.case_sensitive,
            },
            top_n: self.top_n,
            limit: self.limit,
            folder: self.folder.as_deref().map(Folder::from),
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    config_file_path()
        .and_then(|path| load_from(&path))
        .unwrap_or_default()
}

/// Load one configuration file. `None` if it is missing or unreadable
/// (the failure is logged).
pub fn load_from(path: &Path) -> Option<Config> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                Some(cfg)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                None
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            None
        }
    }
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;
    save_to(config, &path)
}

/// Save configuration to `path`, creating parent directories.
pub fn save_to(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILSIFT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailsift").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailsift")
}

/// Log file name inside [`cache_dir`].
pub const LOG_FILE: &str = "mailsift.log";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert!(cfg.query.fuzzy);
        assert_eq!(cfg.query.top_n, 10);
        assert_eq!(cfg.display.bar_width, 24);
        assert!(cfg.accounts.addresses.is_empty());
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let mut cfg = Config::default();
        cfg.accounts.default = Some("me@example.com".to_string());
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.accounts.default, cfg.accounts.default);
        assert_eq!(parsed.display.date_format, cfg.display.date_format);
        assert!((parsed.query.fuzzy_threshold - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[query]
top_n = 3
folder = "sent"

[accounts]
addresses = ["a@x.com", "b@y.com"]
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.query.top_n, 3);
        assert_eq!(cfg.accounts.addresses.len(), 2);
        assert_eq!(cfg.display.bar_width, 24);

        let defaults = cfg.query.to_defaults();
        assert_eq!(defaults.top_n, 3);
        assert_eq!(defaults.folder, Some(Folder::Sent));
        assert!(defaults.fuzzy.enabled);
    }

    #[test]
    fn test_bad_threshold_falls_back() {
        let cfg: Config = toml::from_str("[query]\nfuzzy_threshold = 4.0").expect("parse");
        assert!((cfg.query.to_defaults().fuzzy.threshold - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.display.bar_width = 30;
        save_to(&cfg, &path).expect("save");
        let loaded = load_from(&path).expect("load");
        assert_eq!(loaded.display.bar_width, 30);

        std::fs::write(&path, "not [valid toml").expect("write");
        assert!(load_from(&path).is_none());
        assert!(load_from(&dir.path().join("missing.toml")).is_none());
    }
}
