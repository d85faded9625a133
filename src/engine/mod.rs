//! Fetch engine boundary.
//!
//! The engine performs discovery, format negotiation, transfer and merging.
//! The orchestrator only sees the narrow typed events defined here.

pub mod format;
mod ytdlp;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

pub use format::FetchRequest;
pub use ytdlp::{YtDlpEngine, parse_line};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Diagnostic reported by the engine, kept verbatim
    #[error("{0}")]
    Download(String),

    #[error("unexpected engine output: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte-level progress of the stream currently being fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamProgress {
    pub downloaded_bytes: Option<u64>,
    /// Exact total, or the engine's estimate when the exact size is unknown
    pub total_bytes: Option<u64>,
    pub percent: Option<f64>,
    /// Bytes per second
    pub speed: Option<f64>,
    /// Seconds remaining
    pub eta: Option<u64>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Downloading(StreamProgress),
    Finished { filename: Option<String> },
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcessEvent {
    Started,
    Processing,
    Finished,
}

/// Transfer of a file that is not one of the primary streams, such as a
/// subtitle track written next to the media.
#[derive(Debug, Clone, PartialEq)]
pub struct SideFile {
    pub filename: Option<String>,
    pub finished: bool,
}

/// Both callback channels share one ordered stream.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Stream(StreamEvent),
    PostProcess(PostProcessEvent),
    SideFile(SideFile),
}

pub type EventSender = UnboundedSender<EngineEvent>;

#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Final path of the produced artifact, if the engine reported one
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub format_id: String,
    pub ext: String,
    pub resolution: String,
    pub filesize: u64,
    pub vcodec: String,
    pub acodec: String,
    pub format_note: String,
    pub fps: f64,
    pub tbr: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub name: String,
    pub formats: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto: bool,
}

/// Metadata-only probe result for a single item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    pub thumbnail: String,
    pub duration: u64,
    pub uploader: String,
    pub view_count: u64,
    pub description: String,
    pub webpage_url: String,
    pub formats: Vec<FormatInfo>,
    pub subtitles: BTreeMap<String, SubtitleTrack>,
    /// Streams the selector resolves to (2 when video and audio are fetched separately)
    pub requested_streams: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub id: String,
    pub title: String,
    pub url: String,
    pub thumbnail: String,
    pub duration: u64,
    pub uploader: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub thumbnail: String,
    pub entries: Vec<PlaylistEntry>,
}

#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// Resolve metadata without fetching content. With a selector, the
    /// result also reports how many streams that selector resolves to.
    async fn probe(&self, url: &str, selector: Option<&str>) -> Result<MediaInfo, EngineError>;

    /// Flat playlist listing; `None` when the URL is a single item.
    async fn playlist(&self, url: &str) -> Result<Option<PlaylistInfo>, EngineError>;

    /// Fetch and post-process, reporting progress through `events` in order.
    async fn fetch(
        &self,
        request: FetchRequest,
        events: EventSender,
    ) -> Result<FetchOutcome, EngineError>;

    /// Names of the site extractors the engine ships with.
    async fn extractors(&self) -> Result<Vec<String>, EngineError>;
}

/// Human-readable name for a subtitle language code.
pub fn language_name(code: &str) -> String {
    let name = match code {
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "nl" => "Dutch",
        "pl" => "Polish",
        "tr" => "Turkish",
        "vi" => "Vietnamese",
        "th" => "Thai",
        "id" => "Indonesian",
        "sv" => "Swedish",
        "no" => "Norwegian",
        other => return other.to_uppercase(),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_name() {
        assert_eq!(language_name("en"), "English");
        assert_eq!(language_name("sv"), "Swedish");
        assert_eq!(language_name("xx"), "XX");
    }

    #[test]
    fn test_download_error_displays_verbatim() {
        let err = EngineError::Download("ERROR: HTTP Error 429: Too Many Requests".into());
        assert_eq!(err.to_string(), "ERROR: HTTP Error 429: Too Many Requests");
    }
}
