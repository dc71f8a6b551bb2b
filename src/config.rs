//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$EMAIL_TO_EPUB_CONFIG` (environment variable)
//! 2. `~/.config/email-to-epub/config.toml` (Linux/macOS)
//!    `%APPDATA%\email-to-epub\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags override whatever is loaded here.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Book metadata defaults.
    pub book: BookConfig,
    /// Remote image download settings.
    pub fetch: FetchConfig,
    /// Working cache directories.
    pub paths: PathsConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Book metadata defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BookConfig {
    pub title: String,
    pub author: String,
    /// Cover image; the embedded placeholder is used when unset.
    pub cover: Option<PathBuf>,
}

/// Remote image download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum number of downloads in flight for one email.
    pub concurrency: usize,
    /// Upper bound for one download, HEAD check included.
    pub timeout_secs: u64,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

/// Working cache directories, relative to the current directory unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub images_dir: PathBuf,
    pub attachments_dir: PathBuf,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            title: "Emails".to_string(),
            author: "Email to Epub".to_string(),
            cover: None,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            timeout_secs: 120,
            user_agent: concat!("email-to-epub/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            images_dir: PathBuf::from("images"),
            attachments_dir: PathBuf::from("attachments"),
        }
    }
}

impl FetchConfig {
    /// Per-download timeout as a [`std::time::Duration`].
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
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
    if let Ok(env_path) = std::env::var("EMAIL_TO_EPUB_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("email-to-epub").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("email-to-epub")
}
