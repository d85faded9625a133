//! Request and response bodies for the HTTP surface.
//!
//! Download endpoints share the option fields of [`JobOptions`]:
//!
//! ```json
//! {
//!   "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
//!   "quality": "1080",
//!   "audio_only": false,
//!   "audio_format": "mp3",
//!   "download_subs": true,
//!   "sub_lang": "de",
//!   "embed_subs": false
//! }
//! ```
//!
//! Every field except `url` is optional. Progress endpoints return
//! [`JobSnapshot`](crate::jobs::JobSnapshot) as-is.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{FormatInfo, MediaInfo, PlaylistEntry, PlaylistInfo, SubtitleTrack};
use crate::jobs::JobOptions;
use crate::observability::MetricsSnapshot;

#[derive(Debug, Deserialize, Clone)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
    #[serde(flatten)]
    pub options: JobOptions,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchDownloadRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(flatten)]
    pub options: JobOptions,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlaylistDownloadRequest {
    #[serde(default)]
    pub url: String,
    /// Zero-based entry indices; absent means every entry
    #[serde(default)]
    pub selected_indices: Option<Vec<usize>>,
    #[serde(flatten)]
    pub options: JobOptions,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfoRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DownloadAccepted {
    pub download_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchAccepted {
    pub download_ids: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaylistAccepted {
    pub download_ids: Vec<String>,
    pub count: usize,
    pub playlist_title: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryAccepted {
    pub download_id: String,
    pub retry_count: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            removed: None,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(untagged)]
pub enum InfoResponse {
    Playlist(PlaylistInfoResponse),
    Media(Box<MediaInfoResponse>),
}

#[derive(Debug, Serialize, Clone)]
pub struct PlaylistInfoResponse {
    pub is_playlist: bool,
    pub playlist_title: String,
    pub playlist_id: String,
    /// Entries in the playlist, before the listing cap
    pub playlist_count: usize,
    pub uploader: String,
    pub thumbnail: String,
    pub entries: Vec<PlaylistEntry>,
}

impl PlaylistInfoResponse {
    pub fn new(info: PlaylistInfo, max_entries: usize) -> Self {
        let playlist_count = info.entries.len();
        let thumbnail = if info.thumbnail.is_empty() {
            info.entries
                .first()
                .map(|e| e.thumbnail.clone())
                .unwrap_or_default()
        } else {
            info.thumbnail
        };
        let mut entries = info.entries;
        entries.truncate(max_entries);

        Self {
            is_playlist: true,
            playlist_title: info.title,
            playlist_id: info.id,
            playlist_count,
            uploader: info.uploader,
            thumbnail,
            entries,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct MediaInfoResponse {
    pub is_playlist: bool,
    pub title: String,
    pub thumbnail: String,
    pub duration: u64,
    pub uploader: String,
    pub view_count: u64,
    pub description: String,
    pub formats: Vec<FormatInfo>,
    pub webpage_url: String,
    pub subtitles: BTreeMap<String, SubtitleTrack>,
    pub has_subtitles: bool,
}

impl From<MediaInfo> for MediaInfoResponse {
    fn from(info: MediaInfo) -> Self {
        Self {
            is_playlist: false,
            has_subtitles: !info.subtitles.is_empty(),
            title: info.title,
            thumbnail: info.thumbnail,
            duration: info.duration,
            uploader: info.uploader,
            view_count: info.view_count,
            description: info.description,
            formats: info.formats,
            webpage_url: info.webpage_url,
            subtitles: info.subtitles,
        }
    }
}

/// One file in the download directory.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FileEntry {
    pub filename: String,
    pub size: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub active_jobs: usize,
    pub tracked_jobs: usize,
    pub metrics: MetricsSnapshot,
    pub version: String,
}
