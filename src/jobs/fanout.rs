//! Batch and playlist submission

use std::collections::HashSet;

use serde::Serialize;
use tracing::info;

use super::error::{JobError, Result};
use super::record::{JobOptions, JobRequest, MediaMetadata, PlaylistContext};
use super::runner::{JobRunner, JobSeed};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistSubmission {
    pub download_ids: Vec<String>,
    pub playlist_title: String,
}

impl JobRunner {
    /// One independent job per non-blank URL, sharing `options`.
    pub fn submit_batch(&self, urls: &[String], options: &JobOptions) -> Result<Vec<String>> {
        let limit = self.settings().max_batch_urls;
        if urls.is_empty() {
            return Err(JobError::Validation("No URLs provided".to_string()));
        }
        if urls.len() > limit {
            return Err(JobError::Validation(format!(
                "Maximum {limit} URLs allowed per batch"
            )));
        }

        let ids = urls
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .map(|url| self.submit(JobRequest::new(url, options.clone())))
            .collect::<Result<Vec<_>>>()?;

        info!(requested = urls.len(), accepted = ids.len(), "Batch accepted");
        Ok(ids)
    }

    /// Expand a playlist into one job per entry.
    ///
    /// `selected` holds zero-based entry indices; out-of-range and repeated
    /// indices are ignored. The entry count is capped at the configured limit.
    pub async fn submit_playlist(
        &self,
        url: &str,
        options: &JobOptions,
        selected: Option<&[usize]>,
    ) -> Result<PlaylistSubmission> {
        let playlist = self
            .engine()
            .playlist(url)
            .await?
            .ok_or_else(|| JobError::Validation("URL is not a playlist".to_string()))?;

        let mut entries = playlist.entries;
        if let Some(indices) = selected {
            let mut seen = HashSet::new();
            entries = indices
                .iter()
                .filter(|&&i| i < entries.len() && seen.insert(i))
                .map(|&i| entries[i].clone())
                .collect();
        }
        entries.truncate(self.settings().max_playlist_entries);

        let count = entries.len();
        let mut download_ids = Vec::with_capacity(count);
        for (position, entry) in entries.into_iter().enumerate() {
            if entry.url.is_empty() {
                continue;
            }
            let seed = JobSeed {
                metadata: MediaMetadata {
                    title: entry.title,
                    thumbnail: entry.thumbnail,
                    uploader: entry.uploader,
                    duration: entry.duration,
                },
                playlist: Some(PlaylistContext {
                    index: position + 1,
                    count,
                    title: playlist.title.clone(),
                }),
            };
            download_ids.push(self.submit_with(JobRequest::new(entry.url, options.clone()), seed)?);
        }

        info!(
            playlist = %playlist.title,
            accepted = download_ids.len(),
            "Playlist accepted"
        );
        Ok(PlaylistSubmission {
            download_ids,
            playlist_title: playlist.title,
        })
    }
}
