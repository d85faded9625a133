//! Format selection for a captured job request.

use std::path::{Path, PathBuf};

use crate::jobs::record::JobRequest;

/// Video qualities that resolve to separate video and audio streams.
pub const VIDEO_QUALITIES: &[&str] = &["best", "2160", "1440", "1080", "720", "480", "360"];

pub const MERGE_OUTPUT_FORMAT: &str = "mp4";
const DEFAULT_AUDIO_QUALITY: &str = "192";
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioExtraction {
    pub codec: String,
    pub quality: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleFetch {
    pub languages: Vec<String>,
    pub format: String,
    pub embed: bool,
}

/// Everything the engine needs to fetch one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub selector: String,
    pub output_template: PathBuf,
    pub merge_output_format: Option<String>,
    pub audio: Option<AudioExtraction>,
    pub subtitles: Option<SubtitleFetch>,
    /// Streams the selector is expected to produce before the probe confirms it
    pub expected_streams: usize,
}

impl FetchRequest {
    pub fn for_job(request: &JobRequest, download_dir: &Path) -> Self {
        let options = &request.options;
        let output_template = download_dir.join(OUTPUT_TEMPLATE);

        if options.audio_only {
            let quality = if options.quality == "best" {
                DEFAULT_AUDIO_QUALITY.to_string()
            } else {
                options.quality.clone()
            };
            return Self {
                url: request.url.clone(),
                selector: "bestaudio/best".to_string(),
                output_template,
                merge_output_format: None,
                audio: Some(AudioExtraction {
                    codec: options.audio_format.clone(),
                    quality,
                }),
                subtitles: None,
                expected_streams: 1,
            };
        }

        let (selector, expected_streams) = video_selector(&options.quality);
        let subtitles = options.subtitles.download.then(|| {
            let mut languages = vec![options.subtitles.language.clone()];
            if options.subtitles.language != "en" {
                languages.push("en".to_string());
            }
            SubtitleFetch {
                languages,
                format: "srt/vtt/best".to_string(),
                embed: options.subtitles.embed,
            }
        });

        Self {
            url: request.url.clone(),
            selector,
            output_template,
            merge_output_format: Some(MERGE_OUTPUT_FORMAT.to_string()),
            audio: None,
            subtitles,
            expected_streams,
        }
    }
}

/// Selector string and expected stream count for a video quality token.
pub fn video_selector(quality: &str) -> (String, usize) {
    if !VIDEO_QUALITIES.contains(&quality) {
        return ("best[ext=mp4]/best".to_string(), 1);
    }

    let selector = if quality == "best" {
        "bestvideo[ext=mp4]+bestaudio[ext=m4a]/bestvideo+bestaudio/best[ext=mp4]/best".to_string()
    } else {
        format!(
            "bestvideo[height<={q}][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height<={q}]+bestaudio/best[height<={q}][ext=mp4]/best",
            q = quality
        )
    };
    (selector, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::record::{JobOptions, SubtitleOptions};

    fn request(options: JobOptions) -> JobRequest {
        JobRequest::new("https://example.com/watch?v=1", options)
    }

    #[test]
    fn test_height_capped_selector() {
        let (selector, streams) = video_selector("720");
        assert_eq!(
            selector,
            "bestvideo[height<=720][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height<=720]+bestaudio/best[height<=720][ext=mp4]/best"
        );
        assert_eq!(streams, 2);
    }

    #[test]
    fn test_best_selector_has_no_height_filter() {
        let (selector, streams) = video_selector("best");
        assert!(!selector.contains("height"));
        assert_eq!(streams, 2);
    }

    #[test]
    fn test_unknown_quality_is_single_stream() {
        assert_eq!(video_selector("4k"), ("best[ext=mp4]/best".to_string(), 1));
    }

    #[test]
    fn test_audio_only_request() {
        let fetch = FetchRequest::for_job(
            &request(JobOptions {
                audio_only: true,
                audio_format: "opus".into(),
                subtitles: SubtitleOptions {
                    download: true,
                    ..SubtitleOptions::default()
                },
                ..JobOptions::default()
            }),
            Path::new("/data"),
        );
        assert_eq!(fetch.selector, "bestaudio/best");
        assert_eq!(fetch.expected_streams, 1);
        assert_eq!(
            fetch.audio,
            Some(AudioExtraction {
                codec: "opus".into(),
                quality: "192".into()
            })
        );
        assert!(fetch.subtitles.is_none());
        assert!(fetch.merge_output_format.is_none());
        assert_eq!(fetch.output_template, Path::new("/data/%(title)s.%(ext)s"));
    }

    #[test]
    fn test_subtitles_fall_back_to_english() {
        let fetch = FetchRequest::for_job(
            &request(JobOptions {
                subtitles: SubtitleOptions {
                    download: true,
                    language: "de".into(),
                    embed: true,
                },
                ..JobOptions::default()
            }),
            Path::new("downloads"),
        );
        let subs = fetch.subtitles.unwrap();
        assert_eq!(subs.languages, vec!["de".to_string(), "en".to_string()]);
        assert_eq!(subs.format, "srt/vtt/best");
        assert!(subs.embed);
        assert_eq!(fetch.merge_output_format.as_deref(), Some("mp4"));
    }
}
