//! Downloader (yt-dlp) contract: metadata, engagement heatmap, comments,
//! sectioned and full downloads, and full-video subtitles.

use crate::captions::SubtitleEntry;
use crate::process::{self, RunOutcome, RunSpec};
use crate::tools::ToolPaths;
use clipforge_core::{CancelFlag, ClipForgeError, IntensityPoint, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const INFO_TIMEOUT: Duration = Duration::from_secs(60);
const COMMENTS_TIMEOUT: Duration = Duration::from_secs(120);
const RANGE_TIMEOUT: Duration = Duration::from_secs(180);
const FULL_TIMEOUT: Duration = Duration::from_secs(600);
const SUBTITLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Metadata the downloader can produce without fetching any media.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub duration_s: f64,
    /// Precomputed viewer-engagement heatmap, already 0..1, when the
    /// platform exposes one.
    pub heatmap: Vec<IntensityPoint>,
}

// ── JSON shapes yt-dlp prints ────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    heatmap: Vec<RawHeatmapEntry>,
    #[serde(default)]
    comments: Vec<RawComment>,
}

#[derive(Debug, Deserialize)]
struct RawHeatmapEntry {
    start_time: f64,
    end_time: f64,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    text: Option<String>,
}

/// Fetch id, title, duration, and the engagement heatmap for a URL.
pub fn fetch_video_info(tools: &ToolPaths, url: &str, cancel: &CancelFlag) -> Result<VideoInfo> {
    let spec = RunSpec::new(
        "video metadata fetch",
        &tools.downloader,
        vec![
            "--dump-single-json".into(),
            "--no-download".into(),
            "--no-warnings".into(),
            url.into(),
        ],
        INFO_TIMEOUT,
        cancel.clone(),
    );
    let out = process::run_checked(&spec)?;
    parse_video_info(&out.stdout)
}

/// Parse a `--dump-single-json` payload into [`VideoInfo`].
pub fn parse_video_info(json: &str) -> Result<VideoInfo> {
    let raw: RawInfo = serde_json::from_str(json)
        .map_err(|e| ClipForgeError::Serialization(format!("downloader metadata: {e}")))?;

    let heatmap = raw
        .heatmap
        .iter()
        .filter(|h| h.end_time > h.start_time)
        .map(|h| {
            IntensityPoint::new(
                (h.start_time * 1000.0) as u64,
                (h.end_time * 1000.0) as u64,
                (h.value as f32).clamp(0.0, 1.0),
            )
        })
        .collect();

    Ok(VideoInfo {
        id: raw.id.unwrap_or_else(|| "unknown".into()),
        title: raw.title.unwrap_or_else(|| "Untitled".into()),
        duration_s: raw.duration.unwrap_or(0.0),
        heatmap,
    })
}

/// Fetch up to `max` comment texts. Empty on any failure: comments are a
/// best-effort signal, never fatal.
pub fn fetch_comments(tools: &ToolPaths, url: &str, max: usize, cancel: &CancelFlag) -> Vec<String> {
    let spec = RunSpec::new(
        "comment fetch",
        &tools.downloader,
        vec![
            "--dump-single-json".into(),
            "--no-download".into(),
            "--no-warnings".into(),
            "--get-comments".into(),
            "--extractor-args".into(),
            format!("youtube:max_comments={max}"),
            url.into(),
        ],
        COMMENTS_TIMEOUT,
        cancel.clone(),
    );

    match process::run(&spec) {
        Ok(out) if matches!(out.outcome, RunOutcome::Completed { success: true }) => {
            parse_comments(&out.stdout, max)
        }
        Ok(out) => {
            debug!(outcome = ?out.outcome, "Comment fetch did not complete cleanly");
            Vec::new()
        }
        Err(e) => {
            debug!(error = %e, "Comment fetch failed");
            Vec::new()
        }
    }
}

fn parse_comments(json: &str, max: usize) -> Vec<String> {
    let raw: RawInfo = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(_) => return Vec::new(),
    };
    raw.comments
        .into_iter()
        .filter_map(|c| c.text)
        .take(max)
        .collect()
}

/// Download only `[start_s, end_s]` of the video, capped at `height_cap`
/// vertical resolution.
///
/// Returns [`ClipForgeError::PartialFetchUnsupported`] when the installed
/// downloader does not understand sectioned fetches, so the caller can fall
/// back to a cached full download.
pub fn download_range(
    tools: &ToolPaths,
    url: &str,
    start_s: f64,
    end_s: f64,
    height_cap: u32,
    dest: &Path,
    cancel: &CancelFlag,
) -> Result<()> {
    let section = format!("*{:.2}-{:.2}", start_s.max(0.0), end_s);
    let mut args = common_fetch_args(height_cap, dest);
    args.extend([
        "--download-sections".into(),
        section,
        "--force-keyframes-at-cuts".into(),
        url.into(),
    ]);

    let spec = RunSpec::new(
        "sectioned download",
        &tools.downloader,
        args,
        RANGE_TIMEOUT,
        cancel.clone(),
    );
    let out = process::run(&spec)?;

    match out.outcome {
        RunOutcome::Completed { success: true } if dest.exists() => Ok(()),
        RunOutcome::Cancelled => Err(ClipForgeError::Cancelled),
        RunOutcome::TimedOut => Err(ClipForgeError::Timeout {
            what: "sectioned download".into(),
            seconds: RANGE_TIMEOUT.as_secs(),
        }),
        _ => {
            if section_flag_rejected(&out.stderr) {
                warn!("Downloader rejected --download-sections; full fallback engaged");
                Err(ClipForgeError::PartialFetchUnsupported)
            } else {
                Err(ClipForgeError::ClipFailure(format!(
                    "sectioned download failed: {}",
                    process::stderr_tail(&out.stderr)
                )))
            }
        }
    }
}

/// Download the whole video at the capped resolution.
pub fn download_full(
    tools: &ToolPaths,
    url: &str,
    height_cap: u32,
    dest: &Path,
    cancel: &CancelFlag,
) -> Result<()> {
    let mut args = common_fetch_args(height_cap, dest);
    args.push(url.into());

    let spec = RunSpec::new(
        "full download",
        &tools.downloader,
        args,
        FULL_TIMEOUT,
        cancel.clone(),
    );
    let out = process::run_checked(&spec)?;
    if dest.exists() {
        info!(dest = %dest.display(), "Full video downloaded");
        Ok(())
    } else {
        Err(ClipForgeError::ClipFailure(format!(
            "full download produced no file: {}",
            process::stderr_tail(&out.stderr)
        )))
    }
}

fn common_fetch_args(height_cap: u32, dest: &Path) -> Vec<String> {
    vec![
        "-f".into(),
        format!("bestvideo[height<={height_cap}]+bestaudio/best[height<={height_cap}]"),
        "--merge-output-format".into(),
        "mp4".into(),
        "--no-warnings".into(),
        "--no-playlist".into(),
        "-o".into(),
        dest.to_string_lossy().into_owned(),
    ]
}

/// Old downloaders print an option error for `--download-sections`.
fn section_flag_rejected(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("download-sections")
        && (lower.contains("no such option")
            || lower.contains("unrecognized")
            || lower.contains("unknown option"))
}

/// Fetch the full-video subtitle track as JSON3, preferring uploaded subs
/// over auto-generated ones.
pub fn fetch_subtitles(
    tools: &ToolPaths,
    url: &str,
    temp_dir: &Path,
    cancel: &CancelFlag,
) -> Result<Vec<SubtitleEntry>> {
    let template = temp_dir.join("subs.%(ext)s");
    let spec = RunSpec::new(
        "subtitle fetch",
        &tools.downloader,
        vec![
            "--skip-download".into(),
            "--write-subs".into(),
            "--write-auto-subs".into(),
            "--sub-langs".into(),
            "en.*,en".into(),
            "--sub-format".into(),
            "json3".into(),
            "--no-warnings".into(),
            "-o".into(),
            template.to_string_lossy().into_owned(),
            url.into(),
        ],
        SUBTITLE_TIMEOUT,
        cancel.clone(),
    );
    process::run_checked(&spec)?;

    let file = find_subtitle_file(temp_dir)
        .ok_or_else(|| ClipForgeError::EnhancementFailure("no subtitle track produced".into()))?;
    let payload = std::fs::read_to_string(&file)?;
    let entries = parse_json3(&payload)?;
    debug!(entries = entries.len(), file = %file.display(), "Parsed subtitle track");
    Ok(entries)
}

fn find_subtitle_file(temp_dir: &Path) -> Option<PathBuf> {
    let dir = std::fs::read_dir(temp_dir).ok()?;
    dir.filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("subs.") && n.ends_with(".json3"))
        })
}

// ── JSON3 subtitle format ───────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Json3Track {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(rename = "tStartMs")]
    t_start_ms: Option<u64>,
    #[serde(rename = "dDurationMs")]
    d_duration_ms: Option<u64>,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    utf8: Option<String>,
}

/// Parse YouTube's JSON3 caption format into subtitle entries.
pub fn parse_json3(payload: &str) -> Result<Vec<SubtitleEntry>> {
    let track: Json3Track = serde_json::from_str(payload)
        .map_err(|e| ClipForgeError::Serialization(format!("json3 subtitles: {e}")))?;

    let mut entries = Vec::new();
    for event in track.events {
        let Some(start_ms) = event.t_start_ms else {
            continue;
        };
        let text: String = event
            .segs
            .iter()
            .filter_map(|s| s.utf8.as_deref())
            .collect::<Vec<_>>()
            .join("")
            .trim()
            .to_string();
        if text.is_empty() {
            continue;
        }
        let duration_ms = event.d_duration_ms.unwrap_or(2000);
        entries.push(SubtitleEntry {
            start_s: start_ms as f64 / 1000.0,
            end_s: (start_ms + duration_ms) as f64 / 1000.0,
            text,
        });
    }
    Ok(entries)
}

/// True when the artifact contains at least one audio stream.
pub fn has_audio_stream(tools: &ToolPaths, media: &Path, cancel: &CancelFlag) -> Result<bool> {
    let spec = RunSpec::new(
        "audio stream probe",
        &tools.ffprobe,
        vec![
            "-v".into(),
            "error".into(),
            "-select_streams".into(),
            "a".into(),
            "-show_entries".into(),
            "stream=codec_type".into(),
            "-of".into(),
            "json".into(),
            media.to_string_lossy().into_owned(),
        ],
        Duration::from_secs(15),
        cancel.clone(),
    );
    let out = process::run_checked(&spec)?;
    Ok(parse_stream_probe(&out.stdout))
}

fn parse_stream_probe(json: &str) -> bool {
    #[derive(Deserialize)]
    struct Probe {
        #[serde(default)]
        streams: Vec<serde_json::Value>,
    }
    serde_json::from_str::<Probe>(json)
        .map(|p| !p.streams.is_empty())
        .unwrap_or(false)
}

/// Probe width/height of the primary video stream.
pub fn probe_dimensions(tools: &ToolPaths, media: &Path, cancel: &CancelFlag) -> Result<(u32, u32)> {
    let spec = RunSpec::new(
        "dimension probe",
        &tools.ffprobe,
        vec![
            "-v".into(),
            "error".into(),
            "-select_streams".into(),
            "v:0".into(),
            "-show_entries".into(),
            "stream=width,height".into(),
            "-of".into(),
            "json".into(),
            media.to_string_lossy().into_owned(),
        ],
        Duration::from_secs(15),
        cancel.clone(),
    );
    let out = process::run_checked(&spec)?;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default)]
        streams: Vec<Dim>,
    }
    #[derive(Deserialize)]
    struct Dim {
        width: Option<u32>,
        height: Option<u32>,
    }
    let probe: Probe = serde_json::from_str(&out.stdout)
        .map_err(|e| ClipForgeError::Serialization(format!("dimension probe: {e}")))?;
    probe
        .streams
        .first()
        .and_then(|d| Some((d.width?, d.height?)))
        .ok_or_else(|| ClipForgeError::ClipFailure("no video stream in artifact".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_video_info_with_heatmap() {
        let json = r#"{
            "id": "abc123",
            "title": "Test Video",
            "duration": 600.0,
            "heatmap": [
                {"start_time": 0.0, "end_time": 6.0, "value": 0.4},
                {"start_time": 6.0, "end_time": 12.0, "value": 0.9}
            ]
        }"#;
        let info = parse_video_info(json).unwrap();
        assert_eq!(info.id, "abc123");
        assert_eq!(info.title, "Test Video");
        assert_eq!(info.heatmap.len(), 2);
        assert_eq!(info.heatmap[1].start_ms, 6000);
        assert!((info.heatmap[1].intensity - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_parse_video_info_without_heatmap() {
        let json = r#"{"id": "x", "title": "No Heatmap", "duration": 120.5}"#;
        let info = parse_video_info(json).unwrap();
        assert!(info.heatmap.is_empty());
        assert!((info.duration_s - 120.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_video_info_clamps_values() {
        let json = r#"{"id":"x","title":"t","duration":10,
            "heatmap":[{"start_time":0,"end_time":5,"value":1.7}]}"#;
        let info = parse_video_info(json).unwrap();
        assert!((info.heatmap[0].intensity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_video_info_bad_json() {
        assert!(parse_video_info("not json").is_err());
    }

    #[test]
    fn test_parse_comments_caps_at_max() {
        let json = r#"{"comments": [
            {"text": "one"}, {"text": "two"}, {"text": "three"}
        ]}"#;
        let comments = parse_comments(json, 2);
        assert_eq!(comments, vec!["one", "two"]);
    }

    #[test]
    fn test_section_flag_rejection_detection() {
        assert!(section_flag_rejected(
            "yt-dlp: error: no such option: --download-sections"
        ));
        assert!(!section_flag_rejected("ERROR: video unavailable"));
    }

    #[test]
    fn test_parse_json3_joins_segments() {
        let payload = r#"{"events": [
            {"tStartMs": 1000, "dDurationMs": 2000,
             "segs": [{"utf8": "hello "}, {"utf8": "world"}]},
            {"tStartMs": 4000, "dDurationMs": 1500, "segs": [{"utf8": "again"}]},
            {"tStartMs": 9000, "segs": [{"utf8": "\n"}]}
        ]}"#;
        let entries = parse_json3(payload).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "hello world");
        assert!((entries[0].start_s - 1.0).abs() < 1e-9);
        assert!((entries[0].end_s - 3.0).abs() < 1e-9);
        assert_eq!(entries[1].text, "again");
    }

    #[test]
    fn test_parse_stream_probe() {
        assert!(parse_stream_probe(r#"{"streams": [{"codec_type": "audio"}]}"#));
        assert!(!parse_stream_probe(r#"{"streams": []}"#));
        assert!(!parse_stream_probe("garbage"));
    }
}
