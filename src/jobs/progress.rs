//! Progress aggregation.
//!
//! Converts raw engine events into the normalized fields of a [`JobRecord`].
//! Every function here is pure and runs inside the registry lock.

use std::path::Path;

use crate::engine::{EngineEvent, PostProcessEvent, StreamEvent, StreamProgress};
use crate::humanize;

use super::record::{JobRecord, JobStatus};

/// Weight of each stream when a job downloads video and audio separately.
/// The remaining share is reserved for the merge phase.
pub const STREAM_WEIGHT: f64 = 0.45;
pub const MERGE_CHECKPOINT: f64 = 90.0;
pub const POSTPROCESS_STARTED: f64 = 92.0;
pub const POSTPROCESS_RUNNING: f64 = 95.0;
pub const POSTPROCESS_FINISHED: f64 = 98.0;

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Percentage for one stream event, or `None` when the event carries nothing usable.
pub fn stream_percent(progress: &StreamProgress) -> Option<f64> {
    let computed = match (progress.downloaded_bytes, progress.total_bytes) {
        (Some(done), Some(total)) if total > 0 => Some(round1(done as f64 / total as f64 * 100.0)),
        _ => progress.percent.filter(|p| p.is_finite()),
    };
    computed.map(|p| p.clamp(0.0, 100.0))
}

pub fn overall_progress(streams: &[f64]) -> f64 {
    let overall = match streams {
        [first, second] => round1(first * STREAM_WEIGHT + second * STREAM_WEIGHT),
        [only] => *only,
        _ => 0.0,
    };
    overall.clamp(0.0, 100.0)
}

pub fn apply(record: &mut JobRecord, event: &EngineEvent) {
    match event {
        EngineEvent::Stream(event) => apply_stream_event(record, event),
        EngineEvent::PostProcess(event) => apply_postprocess_event(record, *event),
        // Subtitle tracks never occupy a stream slot nor name the artifact.
        EngineEvent::SideFile(_) => {}
    }
}

pub fn apply_stream_event(record: &mut JobRecord, event: &StreamEvent) {
    match event {
        StreamEvent::Downloading(progress) => on_downloading(record, progress),
        StreamEvent::Finished { filename } => on_finished(record, filename.as_deref()),
        StreamEvent::Error { message } => {
            record.status = JobStatus::Error;
            record.error = message.clone();
        }
    }
}

fn on_downloading(record: &mut JobRecord, progress: &StreamProgress) {
    // Once the last primary stream has finished the job stays in post-processing.
    if record.status == JobStatus::Processing {
        return;
    }
    if let Some(name) = progress.filename.as_deref() {
        record_filename(record, name);
    }

    record.status = JobStatus::Downloading;
    record.is_merging = false;

    let index = record.current_stream;
    if let Some(percent) = stream_percent(progress) {
        let slot = &mut record.streams[index];
        *slot = slot.max(percent);
    }
    record.progress = overall_progress(&record.streams);

    if let Some(text) = progress.speed.and_then(humanize::format_rate) {
        record.speed = text;
    }
    if let Some(eta) = progress.eta {
        record.eta = humanize::format_eta(eta);
    }
    if let Some(total) = progress.total_bytes.filter(|t| *t > 0) {
        record.filesize = humanize::format_size(total);
    }
}

fn on_finished(record: &mut JobRecord, filename: Option<&str>) {
    if record.status == JobStatus::Processing {
        return;
    }
    if let Some(name) = filename {
        record_filename(record, name);
    }

    let index = record.current_stream;
    record.streams[index] = 100.0;

    if !record.is_last_stream() {
        record.current_stream += 1;
        record.speed.clear();
        record.eta.clear();
        record.progress = overall_progress(&record.streams);
    } else {
        record.status = JobStatus::Processing;
        record.is_merging = true;
        record.progress = MERGE_CHECKPOINT;
        record.speed.clear();
        record.eta = "Merging...".to_string();
    }
}

pub fn apply_postprocess_event(record: &mut JobRecord, event: PostProcessEvent) {
    let (checkpoint, eta) = match event {
        PostProcessEvent::Started => (POSTPROCESS_STARTED, "Processing..."),
        PostProcessEvent::Processing => (POSTPROCESS_RUNNING, "Processing..."),
        PostProcessEvent::Finished => (POSTPROCESS_FINISHED, "Finalizing..."),
    };

    if record.status == JobStatus::Processing {
        record.progress = record.progress.max(checkpoint);
    } else {
        record.status = JobStatus::Processing;
        record.progress = checkpoint;
    }
    record.is_merging = true;
    record.speed.clear();
    record.eta = eta.to_string();
}

fn record_filename(record: &mut JobRecord, path: &str) {
    if let Some(name) = Path::new(path).file_name().and_then(|n| n.to_str()) {
        record.filename = name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SideFile;
    use crate::jobs::record::{JobOptions, JobRequest};

    fn record(streams: usize) -> JobRecord {
        JobRecord::new(
            "job",
            JobRequest::new("https://example.com/v", JobOptions::default()),
            streams,
        )
    }

    fn bytes(done: u64, total: u64) -> StreamEvent {
        StreamEvent::Downloading(StreamProgress {
            downloaded_bytes: Some(done),
            total_bytes: Some(total),
            ..StreamProgress::default()
        })
    }

    fn finished() -> StreamEvent {
        StreamEvent::Finished { filename: None }
    }

    #[test]
    fn test_stream_percent_prefers_bytes() {
        let progress = StreamProgress {
            downloaded_bytes: Some(1),
            total_bytes: Some(3),
            percent: Some(99.0),
            ..StreamProgress::default()
        };
        assert_eq!(stream_percent(&progress), Some(33.3));
    }

    #[test]
    fn test_stream_percent_falls_back_to_carried_percent() {
        let progress = StreamProgress {
            downloaded_bytes: Some(10),
            total_bytes: Some(0),
            percent: Some(42.0),
            ..StreamProgress::default()
        };
        assert_eq!(stream_percent(&progress), Some(42.0));
        assert_eq!(stream_percent(&StreamProgress::default()), None);
    }

    #[test]
    fn test_stream_percent_is_clamped() {
        let over = StreamProgress {
            downloaded_bytes: Some(300),
            total_bytes: Some(200),
            ..StreamProgress::default()
        };
        assert_eq!(stream_percent(&over), Some(100.0));

        let negative = StreamProgress {
            percent: Some(-5.0),
            ..StreamProgress::default()
        };
        assert_eq!(stream_percent(&negative), Some(0.0));
    }

    #[test]
    fn test_single_stream_scenario() {
        let mut record = record(1);

        apply_stream_event(&mut record, &bytes(50, 200));
        assert_eq!(record.progress, 25.0);
        assert_eq!(record.status, JobStatus::Downloading);

        apply_stream_event(&mut record, &bytes(100, 200));
        assert_eq!(record.progress, 50.0);

        apply_stream_event(&mut record, &bytes(200, 200));
        assert_eq!(record.progress, 100.0);

        apply_stream_event(&mut record, &finished());
        assert_eq!(record.status, JobStatus::Processing);
        assert!(record.is_merging);
        assert_eq!(record.progress, 90.0);
        assert!(record.speed.is_empty());
        assert_eq!(record.eta, "Merging...");
    }

    #[test]
    fn test_two_stream_weighting() {
        let mut record = record(2);

        apply_stream_event(&mut record, &bytes(50, 100));
        assert_eq!(record.progress, 22.5);

        apply_stream_event(&mut record, &finished());
        assert_eq!(record.current_stream, 1);
        assert_eq!(record.progress, 45.0);
        assert!(record.eta.is_empty());

        apply_stream_event(&mut record, &bytes(1, 2));
        assert_eq!(record.progress, 67.5);

        apply_stream_event(&mut record, &finished());
        assert_eq!(record.progress, 90.0);
        assert!(record.is_merging);
        assert_eq!(record.status, JobStatus::Processing);
    }

    #[test]
    fn test_stream_progress_never_regresses() {
        let mut record = record(1);
        apply_stream_event(&mut record, &bytes(80, 100));
        apply_stream_event(&mut record, &bytes(40, 100));
        assert_eq!(record.streams[0], 80.0);
        assert_eq!(record.progress, 80.0);
    }

    #[test]
    fn test_finished_without_downloading() {
        let mut record = record(2);
        apply_stream_event(&mut record, &finished());
        assert_eq!(record.streams, vec![100.0, 0.0]);
        assert_eq!(record.progress, 45.0);
        assert_eq!(record.current_stream, 1);
    }

    #[test]
    fn test_late_downloading_does_not_leave_processing() {
        let mut record = record(1);
        apply_stream_event(&mut record, &finished());
        apply_stream_event(&mut record, &bytes(1, 100));
        assert_eq!(record.status, JobStatus::Processing);
        assert_eq!(record.progress, 90.0);
        assert!(record.current_stream < record.total_streams());
    }

    #[test]
    fn test_subtitles_before_primary_streams_leave_slots_alone() {
        let mut record = record(2);
        for lang in ["de", "en"] {
            let name = format!("/tmp/out/Clip.{lang}.vtt");
            apply(
                &mut record,
                &EngineEvent::SideFile(SideFile {
                    filename: Some(name.clone()),
                    finished: false,
                }),
            );
            apply(
                &mut record,
                &EngineEvent::SideFile(SideFile {
                    filename: Some(name),
                    finished: true,
                }),
            );
        }
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.streams, vec![0.0, 0.0]);
        assert_eq!(record.current_stream, 0);
        assert!(record.filename.is_empty());

        apply(&mut record, &EngineEvent::Stream(bytes(50, 100)));
        assert_eq!(record.status, JobStatus::Downloading);
        assert_eq!(record.streams, vec![50.0, 0.0]);
        assert_eq!(record.progress, 22.5);

        apply(&mut record, &EngineEvent::Stream(finished()));
        apply(&mut record, &EngineEvent::Stream(bytes(1, 2)));
        assert_eq!(record.progress, 67.5);
        assert!(!record.is_merging);
    }

    #[test]
    fn test_postprocess_checkpoints() {
        let mut record = record(1);
        apply_postprocess_event(&mut record, PostProcessEvent::Started);
        assert_eq!(record.status, JobStatus::Processing);
        assert!(record.is_merging);
        assert_eq!(record.progress, 92.0);

        apply_postprocess_event(&mut record, PostProcessEvent::Processing);
        assert_eq!(record.progress, 95.0);

        apply_postprocess_event(&mut record, PostProcessEvent::Finished);
        assert_eq!(record.progress, 98.0);
        assert_eq!(record.eta, "Finalizing...");

        // a second post-processor starting does not move the bar backwards
        apply_postprocess_event(&mut record, PostProcessEvent::Started);
        assert_eq!(record.progress, 98.0);
    }

    #[test]
    fn test_error_event_keeps_retry_count() {
        let mut record = record(1);
        record.retry_count = 2;
        apply_stream_event(
            &mut record,
            &StreamEvent::Error {
                message: "HTTP Error 403".into(),
            },
        );
        assert_eq!(record.status, JobStatus::Error);
        assert_eq!(record.error, "HTTP Error 403");
        assert_eq!(record.retry_count, 2);
    }

    #[test]
    fn test_display_fields() {
        let mut record = record(1);
        let event = StreamEvent::Downloading(StreamProgress {
            downloaded_bytes: Some(1024),
            total_bytes: Some(10 * 1024 * 1024),
            speed: Some(2.0 * 1024.0 * 1024.0),
            eta: Some(12),
            filename: Some("/tmp/out/My Video.f137.mp4".into()),
            ..StreamProgress::default()
        });
        apply_stream_event(&mut record, &event);
        assert_eq!(record.speed, "2.0 MiB/s");
        assert_eq!(record.eta, "12s");
        assert_eq!(record.filesize, "10.00 MiB");
        assert_eq!(record.filename, "My Video.f137.mp4");

        // malformed speed keeps the previous text
        let event = StreamEvent::Downloading(StreamProgress {
            speed: Some(f64::NAN),
            percent: Some(1.0),
            ..StreamProgress::default()
        });
        apply_stream_event(&mut record, &event);
        assert_eq!(record.speed, "2.0 MiB/s");
    }
}
