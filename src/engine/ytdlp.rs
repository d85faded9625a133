//! `yt-dlp` subprocess engine.
//!
//! Progress is read from machine-readable `--progress-template` lines on
//! either pipe; untagged stderr is collected and reported verbatim when the
//! process exits unsuccessfully. Both pipes are drained to EOF.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, trace, warn};

use super::{
    EngineError, EngineEvent, EventSender, FetchEngine, FetchOutcome, FetchRequest, FormatInfo,
    MediaInfo, PlaylistEntry, PlaylistInfo, PostProcessEvent, SideFile, StreamEvent,
    StreamProgress, SubtitleTrack, language_name,
};
use crate::config::EngineConfig;

const LINE_TAG: &str = "MFP";
const DOWNLOAD_TEMPLATE: &str = "download:MFP|dl|%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s|%(progress._percent_str)s|%(info.ext)s|%(progress.filename)s";
const POSTPROCESS_TEMPLATE: &str = "postprocess:MFP|pp|%(progress.status)s|%(progress.postprocessor)s";
const ARTIFACT_TEMPLATE: &str = "after_move:MFP|file|%(filepath)s";
const DESCRIPTION_LIMIT: usize = 500;

/// Subtitle containers; transfers of these never count as a primary stream.
const SIDE_FILE_EXTENSIONS: &[&str] = &[
    "vtt", "srt", "ass", "ssa", "ttml", "dfxp", "sbv", "lrc", "json3", "srv1", "srv2", "srv3",
];

/// One recognized line of engine stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineLine {
    Event(EngineEvent),
    Artifact(PathBuf),
}

#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    program: String,
    retries: u32,
    fragment_retries: u32,
    socket_timeout_secs: u64,
    file_access_retries: u32,
    sleep_requests_secs: u64,
}

impl YtDlpEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            program: config.binary.clone(),
            retries: config.retries,
            fragment_retries: config.fragment_retries,
            socket_timeout_secs: config.socket_timeout_secs,
            file_access_retries: config.file_access_retries,
            sleep_requests_secs: config.sleep_requests_secs,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn_error(&self, source: std::io::Error) -> EngineError {
        EngineError::Spawn {
            program: self.program.clone(),
            source,
        }
    }

    /// Runs a metadata-only invocation and decodes its JSON dump.
    async fn dump_json(&self, args: &[&str], url: &str) -> Result<RawInfo, EngineError> {
        let output = self
            .command()
            .args(args)
            .arg("--")
            .arg(url)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<String> = stderr.lines().map(str::to_owned).collect();
            return Err(EngineError::Download(failure_message(
                &lines,
                &self.program,
                output.status,
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| EngineError::Parse(e.to_string()))
    }

    pub fn fetch_args(&self, request: &FetchRequest) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--newline".into(),
            "--progress".into(),
            "--no-colors".into(),
            "--no-simulate".into(),
            "--progress-template".into(),
            DOWNLOAD_TEMPLATE.into(),
            "--progress-template".into(),
            POSTPROCESS_TEMPLATE.into(),
            "--print".into(),
            ARTIFACT_TEMPLATE.into(),
            "--no-playlist".into(),
            "--continue".into(),
            "--retries".into(),
            self.retries.to_string(),
            "--fragment-retries".into(),
            self.fragment_retries.to_string(),
            "--socket-timeout".into(),
            self.socket_timeout_secs.to_string(),
            "--file-access-retries".into(),
            self.file_access_retries.to_string(),
            "--sleep-requests".into(),
            self.sleep_requests_secs.to_string(),
            "-f".into(),
            request.selector.clone(),
            "-o".into(),
            request.output_template.to_string_lossy().into_owned(),
        ];

        if let Some(format) = &request.merge_output_format {
            args.extend(["--merge-output-format".into(), format.clone()]);
        }

        if let Some(audio) = &request.audio {
            args.extend([
                "--extract-audio".into(),
                "--audio-format".into(),
                audio.codec.clone(),
                "--audio-quality".into(),
                audio.quality.clone(),
                "--embed-thumbnail".into(),
                "--embed-metadata".into(),
            ]);
        }

        if let Some(subs) = &request.subtitles {
            args.extend([
                "--write-subs".into(),
                "--write-auto-subs".into(),
                "--sub-langs".into(),
                subs.languages.join(","),
                "--sub-format".into(),
                subs.format.clone(),
                "--sleep-subtitles".into(),
                "2".into(),
            ]);
            if subs.embed {
                args.push("--embed-subs".into());
            }
        }

        args.push("--".into());
        args.push(request.url.clone());
        args
    }
}

#[async_trait]
impl FetchEngine for YtDlpEngine {
    async fn probe(&self, url: &str, selector: Option<&str>) -> Result<MediaInfo, EngineError> {
        let mut args = vec!["-J", "--no-warnings", "--no-playlist"];
        if let Some(selector) = selector {
            args.extend(["-f", selector]);
        }
        debug!(url, ?selector, "Probing media");
        let raw = self.dump_json(&args, url).await?;
        Ok(raw.into_media_info(url))
    }

    async fn playlist(&self, url: &str) -> Result<Option<PlaylistInfo>, EngineError> {
        debug!(url, "Resolving playlist");
        let raw = self
            .dump_json(&["-J", "--flat-playlist", "--no-warnings"], url)
            .await?;
        Ok(raw.into_playlist())
    }

    async fn extractors(&self) -> Result<Vec<String>, EngineError> {
        let output = self
            .command()
            .arg("--list-extractors")
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<String> = stderr.lines().map(str::to_owned).collect();
            return Err(EngineError::Download(failure_message(
                &lines,
                &self.program,
                output.status,
            )));
        }

        Ok(extractor_names(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        events: EventSender,
    ) -> Result<FetchOutcome, EngineError> {
        let args = self.fetch_args(&request);
        info!(url = %request.url, selector = %request.selector, "Starting engine");

        let mut child = self
            .command()
            .args(&args)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Parse("engine stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Parse("engine stderr was not captured".into()))?;
        let diagnostics = tokio::spawn(collect_diagnostics(stderr, events.clone()));
        let artifact = forward_events(stdout, &events).await;

        let status = child.wait().await?;
        let diagnostics = diagnostics.await.unwrap_or_default();

        if status.success() {
            Ok(FetchOutcome { path: artifact })
        } else {
            let message = failure_message(&diagnostics, &self.program, status);
            warn!(url = %request.url, %status, error = %message, "Engine failed");
            Err(EngineError::Download(message))
        }
    }
}

/// Next newline-terminated line, decoded lossily. Invalid UTF-8 (file names
/// in legacy encodings) must not end the read: a child whose pipe loses its
/// reader dies on SIGPIPE.
async fn next_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

/// Drains stdout, forwarding events in order. Returns the produced path.
async fn forward_events<R: AsyncRead + Unpin>(reader: R, events: &EventSender) -> Option<PathBuf> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut artifact = None;
    loop {
        let line = match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Engine stdout closed unexpectedly");
                break;
            }
        };
        match parse_line(&line) {
            Some(EngineLine::Event(event)) => {
                // The receiver only goes away if the job was dropped.
                let _ = events.send(event);
            }
            Some(EngineLine::Artifact(path)) => artifact = Some(path),
            None => trace!(line = %line, "engine output"),
        }
    }
    artifact
}

/// Drains stderr. Quiet mode can route progress lines here, so tagged lines
/// are forwarded as events and everything else is kept for error reporting.
async fn collect_diagnostics<R: AsyncRead + Unpin>(reader: R, events: EventSender) -> Vec<String> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut collected = Vec::new();
    loop {
        let line = match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Engine stderr closed unexpectedly");
                break;
            }
        };
        match parse_line(&line) {
            Some(EngineLine::Event(event)) => {
                let _ = events.send(event);
            }
            Some(EngineLine::Artifact(_)) => {}
            None => {
                trace!(line = %line, "engine stderr");
                collected.push(line);
            }
        }
    }
    collected
}

/// Sorted, de-duplicated extractor names. Generic fallbacks are not sites;
/// broken extractors are listed with a parenthesized note that is dropped.
fn extractor_names(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(|line| line.split(" (").next().unwrap_or(line).trim())
        .filter(|name| !name.is_empty() && !name.starts_with("generic"))
        .map(str::to_owned)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Error lines reported by the engine, or the tail of its stderr.
fn failure_message(stderr: &[String], program: &str, status: ExitStatus) -> String {
    let errors: Vec<&str> = stderr
        .iter()
        .map(|line| line.trim())
        .filter(|line| line.starts_with("ERROR:"))
        .collect();
    if !errors.is_empty() {
        return errors.join("\n");
    }

    let tail: Vec<&str> = stderr
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect();
    if tail.is_empty() {
        return format!("{program} exited with {status}");
    }
    tail[tail.len().saturating_sub(5)..].join("\n")
}

/// Parses one output line produced by the progress and print templates.
pub fn parse_line(line: &str) -> Option<EngineLine> {
    let rest = line.trim_end().strip_prefix(LINE_TAG)?.strip_prefix('|')?;
    let (kind, rest) = rest.split_once('|')?;

    match kind {
        "dl" => parse_download(rest).map(EngineLine::Event),
        "pp" => parse_postprocess(rest).map(EngineLine::Event),
        "file" if !rest.is_empty() => Some(EngineLine::Artifact(PathBuf::from(rest))),
        _ => None,
    }
}

fn parse_download(rest: &str) -> Option<EngineEvent> {
    // filename goes last because it may itself contain the separator
    let fields: Vec<&str> = rest.splitn(9, '|').collect();
    let [status, done, total, estimate, speed, eta, percent, ext, filename] = fields.as_slice()
    else {
        return None;
    };
    let filename = field(filename).map(str::to_owned);

    if is_side_file(field(ext), filename.as_deref()) {
        return match *status {
            "downloading" | "finished" | "error" => Some(EngineEvent::SideFile(SideFile {
                filename,
                finished: *status == "finished",
            })),
            _ => None,
        };
    }

    let event = match *status {
        "downloading" => StreamEvent::Downloading(StreamProgress {
            downloaded_bytes: number(done).map(|v| v as u64),
            total_bytes: number(total).or_else(|| number(estimate)).map(|v| v as u64),
            percent: percent_value(percent),
            speed: number(speed),
            eta: number(eta).map(|v| v as u64),
            filename,
        }),
        "finished" => StreamEvent::Finished { filename },
        "error" => StreamEvent::Error {
            message: "transfer interrupted".to_string(),
        },
        _ => return None,
    };
    Some(EngineEvent::Stream(event))
}

fn is_side_file(ext: Option<&str>, filename: Option<&str>) -> bool {
    let ext = ext.or_else(|| filename.and_then(|f| Path::new(f).extension()?.to_str()));
    ext.is_some_and(|ext| {
        SIDE_FILE_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    })
}

fn parse_postprocess(rest: &str) -> Option<EngineEvent> {
    let status = rest.split('|').next()?;
    let event = match status {
        "started" => PostProcessEvent::Started,
        "processing" => PostProcessEvent::Processing,
        "finished" => PostProcessEvent::Finished,
        _ => return None,
    };
    Some(EngineEvent::PostProcess(event))
}

fn field(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    (!raw.is_empty() && raw != "NA" && raw != "None").then_some(raw)
}

fn number(raw: &str) -> Option<f64> {
    field(raw)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// `_percent_str` may carry padding or color codes around the number.
fn percent_value(raw: &str) -> Option<f64> {
    let head = raw.split('%').next()?;
    let digits = head
        .rsplit(|c: char| !(c.is_ascii_digit() || c == '.'))
        .next()?;
    number(digits)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    title: Option<String>,
    thumbnail: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
    description: Option<String>,
    webpage_url: Option<String>,
    formats: Option<Vec<RawFormat>>,
    requested_formats: Option<Vec<serde_json::Value>>,
    subtitles: Option<BTreeMap<String, Vec<RawSubtitle>>>,
    automatic_captions: Option<BTreeMap<String, Vec<RawSubtitle>>>,
    entries: Option<Vec<Option<RawEntry>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFormat {
    format_id: Option<String>,
    ext: Option<String>,
    resolution: Option<String>,
    filesize: Option<f64>,
    vcodec: Option<String>,
    acodec: Option<String>,
    format_note: Option<String>,
    fps: Option<f64>,
    tbr: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSubtitle {
    ext: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
}

fn subtitle_formats(tracks: &[RawSubtitle]) -> Vec<String> {
    tracks
        .iter()
        .map(|t| t.ext.clone().unwrap_or_else(|| "vtt".to_string()))
        .collect()
}

impl RawInfo {
    fn is_playlist(&self) -> bool {
        self.kind.as_deref() == Some("playlist") || self.entries.is_some()
    }

    fn into_media_info(self, url: &str) -> MediaInfo {
        let formats = self
            .formats
            .unwrap_or_default()
            .into_iter()
            .map(|f| FormatInfo {
                format_id: f.format_id.unwrap_or_default(),
                ext: f.ext.unwrap_or_default(),
                resolution: f.resolution.unwrap_or_else(|| "audio only".to_string()),
                filesize: f.filesize.unwrap_or(0.0) as u64,
                vcodec: f.vcodec.unwrap_or_else(|| "none".to_string()),
                acodec: f.acodec.unwrap_or_else(|| "none".to_string()),
                format_note: f.format_note.unwrap_or_default(),
                fps: f.fps.unwrap_or(0.0),
                tbr: f.tbr.unwrap_or(0.0),
            })
            .collect();

        let mut subtitles = BTreeMap::new();
        for (lang, tracks) in self.subtitles.unwrap_or_default() {
            subtitles.insert(
                lang.clone(),
                SubtitleTrack {
                    name: language_name(&lang),
                    formats: subtitle_formats(&tracks),
                    auto: false,
                },
            );
        }
        for (lang, tracks) in self.automatic_captions.unwrap_or_default() {
            subtitles.entry(lang.clone()).or_insert_with(|| SubtitleTrack {
                name: format!("{} (auto)", language_name(&lang)),
                formats: subtitle_formats(&tracks),
                auto: true,
            });
        }

        let requested = self.requested_formats.map_or(0, |f| f.len());

        MediaInfo {
            title: self.title.unwrap_or_else(|| "Unknown".to_string()),
            thumbnail: self.thumbnail.unwrap_or_default(),
            duration: self.duration.unwrap_or(0.0) as u64,
            uploader: self.uploader.unwrap_or_else(|| "Unknown".to_string()),
            view_count: self.view_count.unwrap_or(0),
            description: self
                .description
                .map(|d| d.chars().take(DESCRIPTION_LIMIT).collect())
                .unwrap_or_default(),
            webpage_url: self.webpage_url.unwrap_or_else(|| url.to_string()),
            formats,
            subtitles,
            requested_streams: if requested >= 2 { 2 } else { 1 },
        }
    }

    fn into_playlist(self) -> Option<PlaylistInfo> {
        if !self.is_playlist() {
            return None;
        }

        let uploader = self.uploader.unwrap_or_else(|| "Unknown".to_string());
        let entries: Vec<PlaylistEntry> = self
            .entries
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .map(|e| PlaylistEntry {
                id: e.id.unwrap_or_default(),
                title: e.title.unwrap_or_else(|| "Unknown".to_string()),
                url: e.url.or(e.webpage_url).unwrap_or_default(),
                thumbnail: e.thumbnail.unwrap_or_default(),
                duration: e.duration.unwrap_or(0.0) as u64,
                uploader: e.uploader.unwrap_or_else(|| uploader.clone()),
            })
            .collect();

        let thumbnail = self
            .thumbnail
            .filter(|t| !t.is_empty())
            .or_else(|| entries.first().map(|e| e.thumbnail.clone()))
            .unwrap_or_default();

        Some(PlaylistInfo {
            id: self.id.unwrap_or_default(),
            title: self.title.unwrap_or_else(|| "Playlist".to_string()),
            uploader,
            thumbnail,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::format::FetchRequest;
    use crate::jobs::record::{JobOptions, JobRequest};
    use std::path::Path;

    fn engine() -> YtDlpEngine {
        YtDlpEngine::new(&EngineConfig::default())
    }

    #[test]
    fn test_parse_downloading_line() {
        let line =
            "MFP|dl|downloading|1048576|4194304|NA|524288.5|6|  25.0%|mp4|/data/Clip|1.f137.mp4";
        let parsed = parse_line(line).unwrap();
        let EngineLine::Event(EngineEvent::Stream(StreamEvent::Downloading(progress))) = parsed
        else {
            panic!("expected downloading event, got {parsed:?}");
        };
        assert_eq!(progress.downloaded_bytes, Some(1_048_576));
        assert_eq!(progress.total_bytes, Some(4_194_304));
        assert_eq!(progress.speed, Some(524288.5));
        assert_eq!(progress.eta, Some(6));
        assert_eq!(progress.percent, Some(25.0));
        assert_eq!(progress.filename.as_deref(), Some("/data/Clip|1.f137.mp4"));
    }

    #[test]
    fn test_parse_uses_estimate_when_total_missing() {
        let line = "MFP|dl|downloading|10|NA|40.0|NA|NA|NA|mp4|out.mp4";
        let Some(EngineLine::Event(EngineEvent::Stream(StreamEvent::Downloading(progress)))) =
            parse_line(line)
        else {
            panic!("expected downloading event");
        };
        assert_eq!(progress.total_bytes, Some(40));
        assert_eq!(progress.speed, None);
        assert_eq!(progress.percent, None);
    }

    #[test]
    fn test_parse_finished_and_postprocess() {
        assert_eq!(
            parse_line("MFP|dl|finished|100|100|NA|NA|NA|100%|webm|a.webm"),
            Some(EngineLine::Event(EngineEvent::Stream(StreamEvent::Finished {
                filename: Some("a.webm".into())
            })))
        );
        assert_eq!(
            parse_line("MFP|pp|started|Merger"),
            Some(EngineLine::Event(EngineEvent::PostProcess(
                PostProcessEvent::Started
            )))
        );
        assert_eq!(
            parse_line("MFP|file|/data/Clip.mp4"),
            Some(EngineLine::Artifact(PathBuf::from("/data/Clip.mp4")))
        );
    }

    #[test]
    fn test_subtitle_transfers_are_side_files() {
        assert_eq!(
            parse_line("MFP|dl|downloading|10|40|NA|NA|NA|25%|vtt|/data/Clip.de.vtt"),
            Some(EngineLine::Event(EngineEvent::SideFile(SideFile {
                filename: Some("/data/Clip.de.vtt".into()),
                finished: false,
            })))
        );
        // falls back to the file extension when the info field is missing
        assert_eq!(
            parse_line("MFP|dl|finished|40|40|NA|NA|NA|100%|NA|/data/Clip.en.SRT"),
            Some(EngineLine::Event(EngineEvent::SideFile(SideFile {
                filename: Some("/data/Clip.en.SRT".into()),
                finished: true,
            })))
        );
        assert!(matches!(
            parse_line("MFP|dl|finished|1|1|NA|NA|NA|100%|m4a|/data/Clip.f140.m4a"),
            Some(EngineLine::Event(EngineEvent::Stream(StreamEvent::Finished { .. })))
        ));
    }

    #[tokio::test]
    async fn test_stderr_is_drained_past_invalid_utf8() {
        let mut stderr = b"MFP|dl|downloading|1|2|NA|NA|NA|50%|mp4|caf".to_vec();
        stderr.extend_from_slice(b"\xE9.mp4\n");
        stderr.extend_from_slice(b"MFP|dl|finished|2|2|NA|NA|NA|100%|mp4|clip.mp4\n");
        stderr.extend_from_slice(b"ERROR: real diagnostic\n");

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let collected = collect_diagnostics(&stderr[..], tx).await;
        assert_eq!(collected, vec!["ERROR: real diagnostic".to_string()]);

        let Some(EngineEvent::Stream(StreamEvent::Downloading(progress))) = rx.recv().await else {
            panic!("expected downloading event");
        };
        assert_eq!(progress.filename.as_deref(), Some("caf\u{fffd}.mp4"));
        assert!(matches!(
            rx.recv().await,
            Some(EngineEvent::Stream(StreamEvent::Finished { .. }))
        ));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_stdout_is_drained_past_invalid_utf8() {
        let mut stdout = b"[download] \xFF\xFE garbage\r\n".to_vec();
        stdout.extend_from_slice(b"MFP|pp|started|Merger\n");
        stdout.extend_from_slice(b"MFP|file|/data/Clip.mp4\n");

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let artifact = forward_events(&stdout[..], &tx).await;
        assert_eq!(artifact, Some(PathBuf::from("/data/Clip.mp4")));
        assert_eq!(
            rx.recv().await,
            Some(EngineEvent::PostProcess(PostProcessEvent::Started))
        );
    }

    #[test]
    fn test_extractor_names() {
        let listing = "youtube\nyoutube:tab\ngeneric\nAbcNews (CURRENTLY BROKEN)\nyoutube\n\n";
        assert_eq!(
            extractor_names(listing),
            vec!["AbcNews".to_string(), "youtube".into(), "youtube:tab".into()]
        );
    }

    #[test]
    fn test_parse_ignores_foreign_lines() {
        assert_eq!(parse_line("[youtube] abc: Downloading webpage"), None);
        assert_eq!(parse_line("MFP|dl|downloading|1|2"), None);
        assert_eq!(parse_line("MFP|pp|weird|X"), None);
        assert_eq!(parse_line("MFP|file|"), None);
    }

    #[test]
    fn test_percent_value_strips_decoration() {
        assert_eq!(percent_value("  42.5%"), Some(42.5));
        assert_eq!(percent_value("\u{1b}[0;94m  7.0%\u{1b}[0m"), Some(7.0));
        assert_eq!(percent_value("NA"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_message_prefers_error_lines() {
        use std::os::unix::process::ExitStatusExt;

        let status = ExitStatus::from_raw(1 << 8);
        let stderr = vec![
            "WARNING: something".to_string(),
            "ERROR: Unable to download video subtitles for 'en': HTTP Error 429".to_string(),
        ];
        assert_eq!(
            failure_message(&stderr, "yt-dlp", status),
            "ERROR: Unable to download video subtitles for 'en': HTTP Error 429"
        );

        let noisy: Vec<String> = (0..8).map(|i| format!("line {i}")).collect();
        assert_eq!(
            failure_message(&noisy, "yt-dlp", status),
            "line 3\nline 4\nline 5\nline 6\nline 7"
        );
        assert!(failure_message(&[], "yt-dlp", status).starts_with("yt-dlp exited with"));
    }

    #[test]
    fn test_fetch_args_for_video_with_subs() {
        let mut options = JobOptions::default();
        options.quality = "1080".into();
        options.subtitles.download = true;
        options.subtitles.embed = true;
        let request = FetchRequest::for_job(
            &JobRequest::new("https://example.com/v", options),
            Path::new("/data"),
        );

        let args = engine().fetch_args(&request);
        let joined = args.join(" ");
        assert!(joined.contains("--merge-output-format mp4"));
        assert!(joined.contains("--sub-langs en"));
        assert!(joined.contains("--embed-subs"));
        assert!(joined.contains("--continue"));
        assert!(!joined.contains("--extract-audio"));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/v"));
        assert_eq!(args[args.len() - 2], "--");
    }

    #[test]
    fn test_fetch_args_for_audio() {
        let mut options = JobOptions::default();
        options.audio_only = true;
        options.audio_format = "m4a".into();
        let request = FetchRequest::for_job(
            &JobRequest::new("https://example.com/a", options),
            Path::new("/data"),
        );
        let joined = engine().fetch_args(&request).join(" ");
        assert!(joined.contains("--extract-audio --audio-format m4a --audio-quality 192"));
        assert!(joined.contains("--embed-thumbnail"));
        assert!(!joined.contains("--merge-output-format"));
    }

    #[test]
    fn test_media_info_from_dump() {
        let dump = serde_json::json!({
            "title": "Clip",
            "uploader": null,
            "duration": 61.5,
            "description": "x".repeat(600),
            "formats": [{"format_id": "137", "ext": "mp4", "filesize": null, "fps": 30}],
            "requested_formats": [{"format_id": "137"}, {"format_id": "140"}],
            "subtitles": {"de": [{"ext": "vtt"}]},
            "automatic_captions": {"de": [{"ext": "srv1"}], "en": [{}]}
        });
        let raw: RawInfo = serde_json::from_value(dump).unwrap();
        let info = raw.into_media_info("https://example.com/v");

        assert_eq!(info.title, "Clip");
        assert_eq!(info.uploader, "Unknown");
        assert_eq!(info.duration, 61);
        assert_eq!(info.description.chars().count(), 500);
        assert_eq!(info.requested_streams, 2);
        assert_eq!(info.formats[0].resolution, "audio only");
        assert_eq!(info.subtitles["de"].name, "German");
        assert!(!info.subtitles["de"].auto);
        assert_eq!(info.subtitles["en"].name, "English (auto)");
        assert_eq!(info.subtitles["en"].formats, vec!["vtt".to_string()]);
        assert_eq!(info.webpage_url, "https://example.com/v");
    }

    #[test]
    fn test_flat_playlist_from_dump() {
        let dump = serde_json::json!({
            "_type": "playlist",
            "id": "PL1",
            "title": "Mix",
            "uploader": "chan",
            "entries": [
                {"id": "a", "title": "A", "url": "https://example.com/a", "thumbnail": "t.jpg"},
                null,
                {"id": "b", "webpage_url": "https://example.com/b"}
            ]
        });
        let raw: RawInfo = serde_json::from_value(dump).unwrap();
        let playlist = raw.into_playlist().unwrap();

        assert_eq!(playlist.title, "Mix");
        assert_eq!(playlist.entries.len(), 2);
        assert_eq!(playlist.entries[1].url, "https://example.com/b");
        assert_eq!(playlist.entries[1].title, "Unknown");
        assert_eq!(playlist.entries[1].uploader, "chan");
        assert_eq!(playlist.thumbnail, "t.jpg");
    }

    #[test]
    fn test_single_video_is_not_a_playlist() {
        let raw: RawInfo = serde_json::from_value(serde_json::json!({"title": "Clip"})).unwrap();
        assert!(raw.into_playlist().is_none());
    }
}
