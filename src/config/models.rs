use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub downloads: DownloadsConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default)]
    pub api: ApiLimits,
}

/// API request limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiLimits {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
    #[serde(default = "default_max_batch_urls")]
    pub max_batch_urls: usize,
    #[serde(default = "default_max_playlist_entries")]
    pub max_playlist_entries: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api: ApiLimits::default(),
        }
    }
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            max_batch_urls: default_max_batch_urls(),
            max_playlist_entries: default_max_playlist_entries(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5001))
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(1024 * 1024)
}

fn default_max_batch_urls() -> usize {
    20
}

fn default_max_playlist_entries() -> usize {
    50
}

/// Where artifacts land and how jobs are scheduled
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadsConfig {
    #[serde(default = "default_download_dir")]
    pub dir: PathBuf,
    /// Cadence of streaming progress updates
    #[serde(default = "default_stream_interval_ms")]
    pub stream_interval_ms: u64,
    /// Upper bound on concurrently fetching jobs, 0 means unbounded
    #[serde(default)]
    pub max_concurrent_jobs: usize,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            dir: default_download_dir(),
            stream_interval_ms: default_stream_interval_ms(),
            max_concurrent_jobs: 0,
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_stream_interval_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
        }
    }
}

fn default_history_path() -> PathBuf {
    PathBuf::from("data/history")
}

/// External fetch engine settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_binary")]
    pub binary: String,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retries")]
    pub fragment_retries: u32,
    #[serde(default = "default_socket_timeout_secs")]
    pub socket_timeout_secs: u64,
    #[serde(default = "default_file_access_retries")]
    pub file_access_retries: u32,
    #[serde(default = "default_sleep_requests_secs")]
    pub sleep_requests_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_engine_binary(),
            retries: default_retries(),
            fragment_retries: default_retries(),
            socket_timeout_secs: default_socket_timeout_secs(),
            file_access_retries: default_file_access_retries(),
            sleep_requests_secs: default_sleep_requests_secs(),
        }
    }
}

fn default_engine_binary() -> String {
    "yt-dlp".to_string()
}

fn default_retries() -> u32 {
    10
}

fn default_socket_timeout_secs() -> u64 {
    30
}

fn default_file_access_retries() -> u32 {
    5
}

fn default_sleep_requests_secs() -> u64 {
    1
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
