//! TOML configuration.
//!
//! Only `[db]` is required; every other section falls back to defaults.
//! [`load_config`] validates ranges and returns descriptive errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub content: ContentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    /// Directory where accepted uploads are kept until their run completes.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
    /// Largest decompressed entry that will be read (zip-bomb guard).
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_resume_ttl_secs")]
    pub resume_ttl_secs: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            max_batch_size: default_max_batch_size(),
            default_batch_size: default_batch_size(),
            max_entry_bytes: default_max_entry_bytes(),
            preview_chars: default_preview_chars(),
            session_ttl_secs: default_session_ttl_secs(),
            resume_ttl_secs: default_resume_ttl_secs(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}
fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_max_batch_size() -> usize {
    100
}
fn default_batch_size() -> usize {
    10
}
fn default_max_entry_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_preview_chars() -> usize {
    150
}
fn default_session_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_resume_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    /// Lifetime of a title/slug lookup cache.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_max_requests() -> usize {
    20
}
fn default_window_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    /// Record kind that a scope id must resolve to.
    #[serde(default = "default_container_kind")]
    pub container_kind: String,
    /// Record kind eligible for replacement.
    #[serde(default = "default_record_kind")]
    pub record_kind: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            container_kind: default_container_kind(),
            record_kind: default_record_kind(),
        }
    }
}

fn default_container_kind() -> String {
    "story".to_string()
}
fn default_record_kind() -> String {
    "chapter".to_string()
}

impl Config {
    /// Defaults with the database and uploads under `data_dir`.
    pub fn minimal(data_dir: &Path) -> Self {
        Self {
            db: DbConfig {
                path: data_dir.join("zcr.sqlite"),
            },
            server: ServerConfig::default(),
            import: ImportConfig {
                upload_dir: data_dir.join("uploads"),
                ..ImportConfig::default()
            },
            matching: MatchingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            content: ContentConfig::default(),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.import.session_ttl_secs)
    }

    pub fn resume_ttl(&self) -> Duration {
        Duration::from_secs(self.import.resume_ttl_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.matching.cache_ttl_secs)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit.window_secs)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.import.max_batch_size == 0 {
            anyhow::bail!("import.max_batch_size must be > 0");
        }
        if self.import.default_batch_size == 0
            || self.import.default_batch_size > self.import.max_batch_size
        {
            anyhow::bail!(
                "import.default_batch_size must be in [1, {}]",
                self.import.max_batch_size
            );
        }
        if self.import.max_upload_bytes == 0 {
            anyhow::bail!("import.max_upload_bytes must be > 0");
        }
        if self.import.max_entry_bytes == 0 {
            anyhow::bail!("import.max_entry_bytes must be > 0");
        }
        if self.rate_limit.max_requests == 0 {
            anyhow::bail!("rate_limit.max_requests must be > 0");
        }
        if self.rate_limit.window_secs == 0 {
            anyhow::bail!("rate_limit.window_secs must be > 0");
        }
        if self.content.container_kind.trim().is_empty() || self.content.record_kind.trim().is_empty()
        {
            anyhow::bail!("content.container_kind and content.record_kind must not be empty");
        }
        if self.content.container_kind == self.content.record_kind {
            anyhow::bail!("content.container_kind and content.record_kind must differ");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
