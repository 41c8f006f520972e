//! Configuration management for the transfer bridge.
//!
//! Loads configuration from a TOML file, with `Config::default()` as the
//! fallback when no file is given.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub rec: RecConfig,
    pub webdav: WebDavConfig,
    pub transfer: TransferConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecConfig {
    /// Base URL of the Rec cloud API
    #[serde(default = "default_rec_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_rec_timeout")]
    pub timeout_secs: u64,

    /// Directory under $HOME holding cached auth tokens (`~/.reccli-ts/<sha256(account)>`)
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebDavConfig {
    /// Base URL of the WebDAV endpoint
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Maximum number of concurrently running transfer tasks
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,

    /// Worker pool size for transfer (Rec -> WebDAV) tasks
    #[serde(default = "default_transfer_workers")]
    pub transfer_workers: usize,

    /// Worker pool size for download/upload tasks
    #[serde(default = "default_io_workers")]
    pub io_workers: usize,

    /// Retry budget per task
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Base backoff in milliseconds (doubles each attempt, capped)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff cap in milliseconds
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Progress sampling cadence in milliseconds
    #[serde(default = "default_progress_sample_ms")]
    pub progress_sample_ms: u64,

    /// Aggregation throttle for combining per-worker progress updates, in milliseconds
    #[serde(default = "default_aggregation_throttle_ms")]
    pub aggregation_throttle_ms: u64,

    /// Delay before auto-removing a terminal task after a status fetch
    #[serde(default = "default_autogc_ms")]
    pub autogc_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_port() -> u16 {
    8787
}
fn default_rec_url() -> String {
    "https://api.example-rec.invalid".to_string()
}
fn default_rec_timeout() -> u64 {
    30
}
fn default_cache_dir() -> String {
    ".reccli-ts".to_string()
}
fn default_max_concurrent() -> usize {
    8
}
fn default_transfer_workers() -> usize {
    2
}
fn default_io_workers() -> usize {
    4
}
fn default_retry_budget() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_backoff_cap_ms() -> u64 {
    5000
}
fn default_progress_sample_ms() -> u64 {
    200
}
fn default_aggregation_throttle_ms() -> u64 {
    100
}
fn default_autogc_ms() -> u64 {
    100
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default() -> Self {
        Config {
            server: ServerConfig { port: default_port() },
            rec: RecConfig {
                base_url: default_rec_url(),
                timeout_secs: default_rec_timeout(),
                cache_dir: default_cache_dir(),
            },
            webdav: WebDavConfig { base_url: None },
            transfer: TransferConfig {
                max_concurrent_tasks: default_max_concurrent(),
                transfer_workers: default_transfer_workers(),
                io_workers: default_io_workers(),
                retry_budget: default_retry_budget(),
                backoff_base_ms: default_backoff_base_ms(),
                backoff_cap_ms: default_backoff_cap_ms(),
                progress_sample_ms: default_progress_sample_ms(),
                aggregation_throttle_ms: default_aggregation_throttle_ms(),
                autogc_ms: default_autogc_ms(),
            },
            log: LogConfig { level: default_log_level() },
        }
    }
}
