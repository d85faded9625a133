//! Job record, captured request and the normalized snapshot served to readers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Retry budget per job lineage.
pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Starting,
    Downloading,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Starting => "starting",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "starting" => Ok(JobStatus::Starting),
            "downloading" => Ok(JobStatus::Downloading),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Subtitle handling requested by the caller (video jobs only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleOptions {
    #[serde(rename = "download_subs", default)]
    pub download: bool,
    #[serde(rename = "sub_lang", default = "default_sub_lang")]
    pub language: String,
    #[serde(rename = "embed_subs", default)]
    pub embed: bool,
}

impl Default for SubtitleOptions {
    fn default() -> Self {
        Self {
            download: false,
            language: default_sub_lang(),
            embed: false,
        }
    }
}

/// Options shared by every job created from one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default)]
    pub audio_only: bool,
    #[serde(default = "default_audio_format")]
    pub audio_format: String,
    #[serde(flatten)]
    pub subtitles: SubtitleOptions,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            audio_only: false,
            audio_format: default_audio_format(),
            subtitles: SubtitleOptions::default(),
        }
    }
}

fn default_quality() -> String {
    "best".to_string()
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

fn default_sub_lang() -> String {
    "en".to_string()
}

/// Request parameters captured at creation so a retry can replay them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub url: String,
    #[serde(flatten)]
    pub options: JobOptions,
}

impl JobRequest {
    pub fn new(url: impl Into<String>, options: JobOptions) -> Self {
        Self {
            url: url.into(),
            options,
        }
    }

    pub fn format_type(&self) -> &'static str {
        if self.options.audio_only { "audio" } else { "video" }
    }
}

/// Descriptive metadata, filled once the engine resolves it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: String,
    pub thumbnail: String,
    pub uploader: String,
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistContext {
    /// 1-based position among the selected entries
    pub index: usize,
    pub count: usize,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub streams: Vec<f64>,
    pub current_stream: usize,
    pub progress: f64,
    pub is_merging: bool,
    pub speed: String,
    pub eta: String,
    pub filesize: String,
    pub filename: String,
    pub error: String,
    pub warning: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub request: JobRequest,
    pub metadata: MediaMetadata,
    pub playlist: Option<PlaylistContext>,
    /// Set while a runner owns this record.
    pub runner_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: impl Into<String>, request: JobRequest, total_streams: usize) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            streams: vec![0.0; total_streams.clamp(1, 2)],
            current_stream: 0,
            progress: 0.0,
            is_merging: false,
            speed: String::new(),
            eta: String::new(),
            filesize: String::new(),
            filename: String::new(),
            error: String::new(),
            warning: String::new(),
            retry_count: 0,
            max_retries: MAX_RETRIES,
            request,
            metadata: MediaMetadata::default(),
            playlist: None,
            runner_active: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_streams(&self) -> usize {
        self.streams.len()
    }

    /// Replaces the stream plan, keeping the current index in range.
    pub fn set_total_streams(&mut self, total: usize) {
        let total = total.clamp(1, 2);
        if total != self.streams.len() {
            self.streams.resize(total, 0.0);
        }
        self.current_stream = self.current_stream.min(total - 1);
    }

    pub fn is_last_stream(&self) -> bool {
        self.current_stream + 1 >= self.streams.len()
    }

    pub fn can_retry(&self) -> bool {
        self.status == JobStatus::Error
            && self.retry_count < self.max_retries
            && !self.runner_active
    }

    /// Terminal and no longer owned by a runner: nothing will change it
    /// until a retry.
    pub fn is_settled(&self) -> bool {
        self.status.is_terminal() && !self.runner_active
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Moves an errored record back to `pending` for another attempt.
    ///
    /// Returns the new retry count. The record is left untouched on rejection.
    pub fn begin_retry(&mut self) -> Result<u32, RetryRejection> {
        if self.status != JobStatus::Error {
            return Err(RetryRejection::NotInErrorState);
        }
        if self.retry_count >= self.max_retries {
            return Err(RetryRejection::MaxRetriesReached);
        }
        if self.runner_active {
            return Err(RetryRejection::Busy);
        }

        self.status = JobStatus::Pending;
        self.progress = 0.0;
        self.speed.clear();
        self.eta.clear();
        self.error.clear();
        self.warning.clear();
        self.current_stream = 0;
        self.streams.iter_mut().for_each(|s| *s = 0.0);
        self.is_merging = false;
        self.retry_count += 1;
        self.touch();
        Ok(self.retry_count)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let playlist = self.playlist.as_ref();
        JobSnapshot {
            id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            streams: self.streams.clone(),
            current_stream: self.current_stream,
            total_streams: self.total_streams(),
            is_merging: self.is_merging,
            filename: self.filename.clone(),
            title: self.metadata.title.clone(),
            thumbnail: self.metadata.thumbnail.clone(),
            uploader: self.metadata.uploader.clone(),
            duration: self.metadata.duration,
            speed: self.speed.clone(),
            eta: self.eta.clone(),
            filesize: self.filesize.clone(),
            error: self.error.clone(),
            warning: self.warning.clone(),
            can_retry: self.can_retry(),
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            url: self.request.url.clone(),
            quality: self.request.options.quality.clone(),
            audio_only: self.request.options.audio_only,
            is_playlist: playlist.is_some(),
            playlist_index: playlist.map(|p| p.index),
            playlist_count: playlist.map(|p| p.count),
            playlist_title: playlist.map(|p| p.title.clone()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryRejection {
    NotInErrorState,
    MaxRetriesReached,
    Busy,
}

/// Point-in-time view of a job, as served by the progress endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub status: JobStatus,
    pub progress: f64,
    pub streams: Vec<f64>,
    pub current_stream: usize,
    pub total_streams: usize,
    pub is_merging: bool,
    pub filename: String,
    pub title: String,
    pub thumbnail: String,
    pub uploader: String,
    pub duration: u64,
    pub speed: String,
    pub eta: String,
    pub filesize: String,
    pub error: String,
    pub warning: String,
    pub can_retry: bool,
    pub retry_count: u32,
    pub max_retries: u32,
    pub url: String,
    pub quality: String,
    pub audio_only: bool,
    pub is_playlist: bool,
    pub playlist_index: Option<usize>,
    pub playlist_count: Option<usize>,
    pub playlist_title: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errored(retry_count: u32) -> JobRecord {
        let mut record = JobRecord::new(
            "job-1",
            JobRequest::new("https://example.com/v", JobOptions::default()),
            2,
        );
        record.status = JobStatus::Error;
        record.error = "boom".into();
        record.progress = 37.5;
        record.streams = vec![83.3, 0.0];
        record.retry_count = retry_count;
        record
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = JobRecord::new(
            "job-1",
            JobRequest::new("https://example.com/v", JobOptions::default()),
            2,
        );
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.streams, vec![0.0, 0.0]);
        assert_eq!(record.max_retries, MAX_RETRIES);
        assert!(!record.can_retry());
    }

    #[test]
    fn test_stream_count_is_clamped() {
        let request = JobRequest::new("https://example.com/v", JobOptions::default());
        assert_eq!(JobRecord::new("a", request.clone(), 0).total_streams(), 1);
        assert_eq!(JobRecord::new("b", request, 5).total_streams(), 2);
    }

    #[test]
    fn test_set_total_streams_keeps_index_in_range() {
        let mut record = errored(0);
        record.current_stream = 1;
        record.set_total_streams(1);
        assert_eq!(record.streams.len(), 1);
        assert_eq!(record.current_stream, 0);
    }

    #[test]
    fn test_begin_retry_resets_transient_state() {
        let mut record = errored(1);
        record.warning = "partial".into();
        record.current_stream = 1;

        let count = record.begin_retry().unwrap();

        assert_eq!(count, 2);
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.progress, 0.0);
        assert_eq!(record.streams, vec![0.0, 0.0]);
        assert_eq!(record.current_stream, 0);
        assert!(record.error.is_empty());
        assert!(record.warning.is_empty());
    }

    #[test]
    fn test_begin_retry_rejections_leave_record_untouched() {
        let mut exhausted = errored(MAX_RETRIES);
        assert_eq!(
            exhausted.begin_retry(),
            Err(RetryRejection::MaxRetriesReached)
        );
        assert_eq!(exhausted.status, JobStatus::Error);
        assert_eq!(exhausted.progress, 37.5);

        let mut running = errored(0);
        running.status = JobStatus::Downloading;
        assert_eq!(
            running.begin_retry(),
            Err(RetryRejection::NotInErrorState)
        );
        assert_eq!(running.retry_count, 0);

        let mut owned = errored(0);
        owned.runner_active = true;
        assert_eq!(owned.begin_retry(), Err(RetryRejection::Busy));
        assert!(!owned.can_retry());
    }

    #[test]
    fn test_snapshot_carries_playlist_context() {
        let mut record = errored(0);
        record.playlist = Some(PlaylistContext {
            index: 3,
            count: 10,
            title: "Mix".into(),
        });
        let snapshot = record.snapshot();
        assert!(snapshot.is_playlist);
        assert_eq!(snapshot.playlist_index, Some(3));
        assert_eq!(snapshot.playlist_title.as_deref(), Some("Mix"));
        assert!(snapshot.can_retry);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: JobOptions = serde_json::from_str(r#"{"download_subs": true}"#).unwrap();
        assert_eq!(options.quality, "best");
        assert_eq!(options.audio_format, "mp3");
        assert!(options.subtitles.download);
        assert_eq!(options.subtitles.language, "en");
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [JobStatus::Pending, JobStatus::Processing, JobStatus::Error] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("queued".parse::<JobStatus>().is_err());
    }
}
