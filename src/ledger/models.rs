use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::record::JobStatus;

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Terminal outcome of one job, persisted once per attempt lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub url: String,
    pub title: String,
    pub thumbnail: String,
    pub uploader: String,
    pub duration: u64,
    pub quality: String,
    /// `audio` or `video`
    pub format_type: String,
    pub audio_format: Option<String>,
    pub filename: String,
    pub filesize: u64,
    pub status: JobStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl HistoryRecord {
    pub fn is_audio(&self) -> bool {
        self.format_type == "audio"
    }

    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.url.to_lowercase().contains(needle)
    }
}

/// Listing parameters: newest first, optional title/URL filter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub search: String,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
            search: String::new(),
        }
    }
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

impl HistoryQuery {
    pub(crate) fn needle(&self) -> Option<String> {
        let trimmed = self.search.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
    }

    pub(crate) fn accepts(&self, record: &HistoryRecord, needle: Option<&str>) -> bool {
        needle.is_none_or(|n| record.matches(n))
    }
}
