//! Live progress streams for subscribers

use std::time::Duration;

use futures_util::Stream;
use futures_util::stream;
use serde::Serialize;

use super::record::JobSnapshot;
use super::registry::JobRegistry;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProgressUpdate {
    Snapshot(Box<JobSnapshot>),
    NotFound { error: String },
}

struct Cursor {
    registry: JobRegistry,
    id: String,
    interval: Duration,
    started: bool,
    done: bool,
}

/// Snapshots of one job: the first immediately, then one per `interval`.
///
/// The stream ends once the job is terminal and its runner has released it,
/// so the last snapshot carries the final outcome rather than an
/// intermediate error reported by the engine mid-run.
pub fn subscribe(
    registry: JobRegistry,
    id: impl Into<String>,
    interval: Duration,
) -> impl Stream<Item = ProgressUpdate> + Send + 'static {
    let cursor = Cursor {
        registry,
        id: id.into(),
        interval,
        started: false,
        done: false,
    };

    stream::unfold(cursor, |mut cursor| async move {
        if cursor.done {
            return None;
        }
        if cursor.started {
            tokio::time::sleep(cursor.interval).await;
        }
        cursor.started = true;

        let (update, settled) = match cursor.registry.observe(&cursor.id) {
            Ok((snapshot, settled)) => (ProgressUpdate::Snapshot(Box::new(snapshot)), settled),
            Err(_) => (
                ProgressUpdate::NotFound {
                    error: "Download not found".to_string(),
                },
                true,
            ),
        };
        cursor.done = settled;
        Some((update, cursor))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::record::{JobOptions, JobRecord, JobRequest, JobStatus};
    use futures_util::StreamExt;

    fn record(id: &str, status: JobStatus) -> JobRecord {
        let mut record = JobRecord::new(
            id,
            JobRequest::new("https://example.com/v", JobOptions::default()),
            1,
        );
        record.status = status;
        record
    }

    #[tokio::test]
    async fn test_terminal_job_emits_once() {
        let registry = JobRegistry::new();
        registry.create(record("done", JobStatus::Completed)).unwrap();

        let updates: Vec<_> = subscribe(registry, "done", Duration::from_millis(5))
            .collect()
            .await;
        assert_eq!(updates.len(), 1);
        assert!(matches!(&updates[0], ProgressUpdate::Snapshot(s) if s.status == JobStatus::Completed));
    }

    #[tokio::test]
    async fn test_unknown_job_emits_not_found() {
        let updates: Vec<_> = subscribe(JobRegistry::new(), "nope", Duration::from_millis(5))
            .collect()
            .await;
        assert_eq!(
            updates,
            vec![ProgressUpdate::NotFound {
                error: "Download not found".into()
            }]
        );
        let json = serde_json::to_value(&updates[0]).unwrap();
        assert_eq!(json, serde_json::json!({"error": "Download not found"}));
    }

    #[tokio::test]
    async fn test_stream_follows_job_to_completion() {
        let registry = JobRegistry::new();
        registry.create(record("live", JobStatus::Downloading)).unwrap();

        let writer = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer
                .with_lock("live", |r| {
                    r.status = JobStatus::Completed;
                    r.progress = 100.0;
                })
                .unwrap();
        });

        let updates: Vec<_> = subscribe(registry, "live", Duration::from_millis(5))
            .collect()
            .await;
        assert!(updates.len() >= 2);
        assert!(matches!(&updates[0], ProgressUpdate::Snapshot(s) if s.status == JobStatus::Downloading));
        let last = updates.last().unwrap();
        assert!(matches!(last, ProgressUpdate::Snapshot(s) if s.progress == 100.0));
    }

    #[tokio::test]
    async fn test_stream_waits_for_runner_to_release_errored_job() {
        let registry = JobRegistry::new();
        let mut owned = record("owned", JobStatus::Error);
        owned.error = "transfer interrupted".to_string();
        owned.runner_active = true;
        registry.create(owned).unwrap();

        let writer = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer
                .with_lock("owned", |r| {
                    r.status = JobStatus::Completed;
                    r.error.clear();
                    r.progress = 100.0;
                    r.runner_active = false;
                })
                .unwrap();
        });

        let updates: Vec<_> = subscribe(registry, "owned", Duration::from_millis(5))
            .collect()
            .await;
        assert!(updates.len() >= 2);
        assert!(matches!(&updates[0], ProgressUpdate::Snapshot(s) if s.status == JobStatus::Error));
        let last = updates.last().unwrap();
        assert!(matches!(last, ProgressUpdate::Snapshot(s) if s.status == JobStatus::Completed));
    }
}
