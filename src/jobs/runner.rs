//! Job runner - drives one job from `pending` to a terminal status

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::{EngineEvent, FetchEngine, FetchRequest};
use crate::humanize;
use crate::ledger::{HistoryRecord, HistoryStore};
use crate::observability::Metrics;

use super::error::{JobError, Result};
use super::progress;
use super::record::{
    JobOptions, JobRecord, JobRequest, JobStatus, MediaMetadata, PlaylistContext, SubtitleOptions,
};
use super::registry::JobRegistry;

pub const SUBTITLE_WARNING: &str =
    "Subtitles unavailable (rate limited), video downloaded successfully";

/// Limits and paths the runner needs from the loaded configuration.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub download_dir: PathBuf,
    pub max_batch_urls: usize,
    pub max_playlist_entries: usize,
    /// 0 leaves job concurrency unbounded
    pub max_concurrent_jobs: usize,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            max_batch_urls: 20,
            max_playlist_entries: 50,
            max_concurrent_jobs: 0,
        }
    }
}

impl RunnerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            download_dir: config.downloads.dir.clone(),
            max_batch_urls: config.server.api.max_batch_urls,
            max_playlist_entries: config.server.api.max_playlist_entries,
            max_concurrent_jobs: config.downloads.max_concurrent_jobs,
        }
    }
}

/// Metadata and playlist position known before the job starts.
#[derive(Debug, Clone, Default)]
pub struct JobSeed {
    pub metadata: MediaMetadata,
    pub playlist: Option<PlaylistContext>,
}

/// How a failed fetch affects the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Only subtitles or other side files were lost
    Auxiliary,
    Fatal,
}

pub fn classify_failure(message: &str) -> FailureKind {
    let message = message.to_lowercase();
    if message.contains("subtitle") || message.contains("429") {
        FailureKind::Auxiliary
    } else {
        FailureKind::Fatal
    }
}

enum Outcome {
    Completed {
        artifact: Option<PathBuf>,
        warning: Option<&'static str>,
    },
    Failed(String),
}

#[derive(Clone)]
pub struct JobRunner {
    registry: JobRegistry,
    engine: Arc<dyn FetchEngine>,
    history: Arc<HistoryStore>,
    metrics: Arc<Metrics>,
    settings: Arc<RunnerSettings>,
    permits: Option<Arc<Semaphore>>,
}

impl JobRunner {
    pub fn new(
        registry: JobRegistry,
        engine: Arc<dyn FetchEngine>,
        history: Arc<HistoryStore>,
        metrics: Arc<Metrics>,
        settings: RunnerSettings,
    ) -> Self {
        let permits = (settings.max_concurrent_jobs > 0)
            .then(|| Arc::new(Semaphore::new(settings.max_concurrent_jobs)));
        Self {
            registry,
            engine,
            history,
            metrics,
            settings: Arc::new(settings),
            permits,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<dyn FetchEngine> {
        &self.engine
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Accept a single job and start it in the background.
    pub fn submit(&self, request: JobRequest) -> Result<String> {
        self.submit_with(request, JobSeed::default())
    }

    pub fn submit_with(&self, request: JobRequest, seed: JobSeed) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let plan = FetchRequest::for_job(&request, &self.settings.download_dir);

        let mut record = JobRecord::new(&id, request, plan.expected_streams);
        record.metadata = seed.metadata;
        record.playlist = seed.playlist;
        record.runner_active = true;
        let url = record.request.url.clone();
        self.registry.create(record)?;

        self.metrics.job_accepted();
        info!(job_id = %id, url = %url, "Job accepted");
        self.spawn(id.clone());
        Ok(id)
    }

    /// Reset an errored job and run it again under the same id.
    pub fn retry(&self, id: &str) -> Result<u32> {
        let count = self.registry.with_lock(id, |record| {
            let count = record.begin_retry()?;
            record.runner_active = true;
            Ok::<_, JobError>(count)
        })??;

        self.metrics.job_retried();
        info!(job_id = %id, retry_count = count, "Retrying job");
        self.spawn(id.to_string());
        Ok(count)
    }

    /// Start a fresh job from a stored history record.
    pub fn redownload(&self, history_id: &str) -> Result<String> {
        let Some(entry) = self.history.get(history_id)? else {
            return Err(JobError::NotFound(history_id.to_string()));
        };

        let options = JobOptions {
            quality: entry.quality.clone(),
            audio_only: entry.is_audio(),
            audio_format: entry
                .audio_format
                .clone()
                .unwrap_or_else(|| "mp3".to_string()),
            subtitles: SubtitleOptions::default(),
        };
        let seed = JobSeed {
            metadata: MediaMetadata {
                title: entry.title,
                thumbnail: entry.thumbnail,
                uploader: entry.uploader,
                duration: entry.duration,
            },
            playlist: None,
        };
        self.submit_with(JobRequest::new(entry.url, options), seed)
    }

    fn spawn(&self, id: String) {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(&id).await });
    }

    /// One attempt, start to finish. The record must already be marked
    /// `runner_active`; the flag is cleared once the outcome is recorded.
    pub async fn run(&self, id: &str) {
        let _permit = match &self.permits {
            Some(permits) => permits.clone().acquire_owned().await.ok(),
            None => None,
        };

        match self.attempt(id).await {
            Ok(outcome) => self.finalize(id, outcome).await,
            Err(e) => error!(job_id = %id, error = %e, "Job record vanished mid-run"),
        }

        let _ = self.registry.with_lock(id, |record| record.runner_active = false);
    }

    async fn attempt(&self, id: &str) -> Result<Outcome> {
        let request = self.registry.with_lock(id, |record| {
            record.status = JobStatus::Starting;
            record.request.clone()
        })?;
        let plan = FetchRequest::for_job(&request, &self.settings.download_dir);
        debug!(job_id = %id, selector = %plan.selector, "Starting job");

        let info = match self.engine.probe(&request.url, Some(&plan.selector)).await {
            Ok(info) => info,
            Err(e) => return Ok(Outcome::Failed(e.to_string())),
        };
        self.registry.with_lock(id, |record| {
            let metadata = &mut record.metadata;
            if !info.title.is_empty() {
                metadata.title = info.title.clone();
            }
            if !info.thumbnail.is_empty() {
                metadata.thumbnail = info.thumbnail.clone();
            }
            if !info.uploader.is_empty() {
                metadata.uploader = info.uploader.clone();
            }
            if info.duration > 0 {
                metadata.duration = info.duration;
            }
            if info.requested_streams > 0 {
                record.set_total_streams(info.requested_streams);
            }
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (result, ()) = tokio::join!(self.engine.fetch(plan, tx), self.pump(id, rx));

        let (errored, error_text, streams_done, filename) = self.registry.with_lock(id, |record| {
            (
                record.status == JobStatus::Error,
                record.error.clone(),
                record.streams.iter().all(|p| *p >= 100.0),
                record.filename.clone(),
            )
        })?;

        let outcome = match result {
            Ok(_) if errored => Outcome::Failed(if error_text.is_empty() {
                "Download failed".to_string()
            } else {
                error_text
            }),
            Ok(fetched) => Outcome::Completed {
                artifact: fetched.path,
                warning: None,
            },
            Err(e) => {
                let message = e.to_string();
                let kind = classify_failure(&message);
                let primary = kind == FailureKind::Auxiliary
                    && self.primary_produced(streams_done, &filename).await;
                match kind {
                    FailureKind::Auxiliary if primary => {
                        warn!(job_id = %id, error = %message, "Side files failed, keeping primary artifact");
                        Outcome::Completed {
                            artifact: None,
                            warning: Some(SUBTITLE_WARNING),
                        }
                    }
                    _ => Outcome::Failed(message),
                }
            }
        };
        Ok(outcome)
    }

    /// The primary artifact exists once every primary stream finished, or
    /// when the recorded file is already on disk from an earlier attempt.
    async fn primary_produced(&self, streams_done: bool, filename: &str) -> bool {
        if filename.is_empty() {
            return false;
        }
        if streams_done {
            return true;
        }
        tokio::fs::try_exists(self.settings.download_dir.join(filename))
            .await
            .unwrap_or(false)
    }

    /// Feed engine events into the record until the engine drops its sender.
    async fn pump(&self, id: &str, mut events: mpsc::UnboundedReceiver<EngineEvent>) {
        while let Some(event) = events.recv().await {
            if self
                .registry
                .with_lock(id, |record| progress::apply(record, &event))
                .is_err()
            {
                break;
            }
        }
    }

    async fn finalize(&self, id: &str, outcome: Outcome) {
        let entry = match outcome {
            Outcome::Completed { artifact, warning } => {
                let filename = match self.registry.with_lock(id, |record| {
                    if let Some(name) = artifact
                        .as_deref()
                        .and_then(Path::file_name)
                        .and_then(|n| n.to_str())
                    {
                        record.filename = name.to_string();
                    }
                    record.filename.clone()
                }) {
                    Ok(name) => name,
                    Err(_) => return,
                };

                let path = artifact.unwrap_or_else(|| self.settings.download_dir.join(&filename));
                let size = if filename.is_empty() {
                    0
                } else {
                    tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0)
                };

                let entry = self.registry.with_lock(id, |record| {
                    record.status = JobStatus::Completed;
                    record.progress = 100.0;
                    record.is_merging = false;
                    record.speed.clear();
                    record.eta.clear();
                    record.error.clear();
                    if let Some(text) = warning {
                        record.warning = text.to_string();
                    }
                    if record.filesize.is_empty() && size > 0 {
                        record.filesize = humanize::format_size(size);
                    }
                    history_record(record, size)
                });
                self.metrics.job_completed();
                info!(job_id = %id, filename = %filename, bytes = size, "Job completed");
                entry
            }
            Outcome::Failed(message) => {
                warn!(job_id = %id, error = %message, "Job failed");
                self.metrics.job_failed();
                self.registry.with_lock(id, |record| {
                    record.status = JobStatus::Error;
                    record.error = message;
                    record.is_merging = false;
                    record.speed.clear();
                    record.eta.clear();
                    history_record(record, 0)
                })
            }
        };

        let Ok(entry) = entry else {
            return;
        };
        if let Err(e) = self.history.upsert(entry) {
            error!(job_id = %id, error = %e, "Failed to write history record");
        }
    }
}

/// History entry for a record that just reached a terminal status.
pub fn history_record(record: &JobRecord, filesize: u64) -> HistoryRecord {
    let options = &record.request.options;
    let completed = record.status == JobStatus::Completed;
    HistoryRecord {
        id: record.id.clone(),
        url: record.request.url.clone(),
        title: record.metadata.title.clone(),
        thumbnail: record.metadata.thumbnail.clone(),
        uploader: record.metadata.uploader.clone(),
        duration: record.metadata.duration,
        quality: options.quality.clone(),
        format_type: record.request.format_type().to_string(),
        audio_format: options.audio_only.then(|| options.audio_format.clone()),
        filename: record.filename.clone(),
        filesize,
        status: record.status,
        error: (record.status == JobStatus::Error).then(|| record.error.clone()),
        created_at: record.created_at,
        completed_at: completed.then(Utc::now),
    }
}
