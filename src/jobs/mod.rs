//! Job lifecycle: records, the shared registry, progress aggregation and runners

pub mod error;
pub mod fanout;
pub mod progress;
pub mod publisher;
pub mod record;
pub mod registry;
pub mod runner;

pub use error::{JobError, Result};
pub use fanout::PlaylistSubmission;
pub use publisher::{ProgressUpdate, subscribe};
pub use record::{
    JobOptions, JobRecord, JobRequest, JobSnapshot, JobStatus, MAX_RETRIES, MediaMetadata,
    PlaylistContext, SubtitleOptions,
};
pub use registry::JobRegistry;
pub use runner::{JobRunner, JobSeed, RunnerSettings, SUBTITLE_WARNING};
