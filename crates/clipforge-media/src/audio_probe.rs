//! Audio-energy probe: per-window RMS loudness from the transcoder, with a
//! silence-detection fallback.

use crate::process::{self, RunOutcome, RunSpec};
use crate::tools::ToolPaths;
use clipforge_analysis::SilenceInterval;
use clipforge_core::{CancelFlag, IntensityPoint};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// dB floor/ceiling mapped linearly onto `[0, 1]`.
const DB_FLOOR: f64 = -60.0;
const DB_CEILING: f64 = -10.0;

const SILENCE_NOISE_DB: &str = "-35dB";
const SILENCE_MIN_DURATION_S: &str = "0.3";

const PROBE_TIMEOUT: Duration = Duration::from_secs(150);

static PTS_TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"pts_time:([0-9.]+)").unwrap());
static RMS_LEVEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"lavfi\.astats\.Overall\.RMS_level=(-?[0-9.]+|-?inf)").unwrap());
static SILENCE_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"silence_start:\s*(-?[0-9.]+)").unwrap());
static SILENCE_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"silence_end:\s*(-?[0-9.]+)").unwrap());

/// Combined result of the audio passes: the intensity signal plus the
/// silence intervals the boundary optimizer snaps to.
#[derive(Debug, Clone, Default)]
pub struct AudioAnalysis {
    pub points: Vec<IntensityPoint>,
    pub silences: Vec<SilenceInterval>,
}

/// Analyze a local media file's audio.
///
/// Never fails: on any error the affected part comes back empty and the
/// caller treats the probe as absent.
pub fn analyze_audio(
    tools: &ToolPaths,
    media: &Path,
    duration_s: f64,
    window_s: u64,
    cancel: &CancelFlag,
) -> AudioAnalysis {
    // Silence intervals serve both the fallback signal and boundary
    // optimization, so that pass always runs.
    let silences = detect_silences(tools, media, cancel).unwrap_or_default();

    let points = match rms_signal(tools, media, duration_s, window_s, cancel) {
        Some(points) if !points.is_empty() => points,
        // A source that also produced no silence data has no usable audio
        // at all; report the probe as empty rather than inventing a flat
        // full-loudness signal.
        _ if silences.is_empty() => {
            warn!("Audio probe produced no data");
            Vec::new()
        }
        _ => {
            warn!("RMS pass empty; deriving audio signal from silence intervals");
            silence_derived_signal(&silences, duration_s, window_s)
        }
    };

    AudioAnalysis { points, silences }
}

/// Per-window RMS loudness via `asetnsamples` + `astats` metadata printing.
fn rms_signal(
    tools: &ToolPaths,
    media: &Path,
    duration_s: f64,
    window_s: u64,
    cancel: &CancelFlag,
) -> Option<Vec<IntensityPoint>> {
    let window_s = window_s.max(1);
    let samples_per_window = 44_100 * window_s;
    let filter = format!(
        "aresample=44100,asetnsamples=n={samples_per_window},astats=metadata=1:reset=1,\
         ametadata=print:key=lavfi.astats.Overall.RMS_level:file=-"
    );
    let spec = RunSpec::new(
        "audio RMS probe",
        &tools.transcoder,
        vec![
            "-hide_banner".into(),
            "-nostats".into(),
            "-i".into(),
            media.to_string_lossy().into_owned(),
            "-map".into(),
            "0:a:0".into(),
            "-af".into(),
            filter,
            "-f".into(),
            "null".into(),
            "-".into(),
        ],
        PROBE_TIMEOUT,
        cancel.clone(),
    );

    let out = process::run(&spec).ok()?;
    if !matches!(out.outcome, RunOutcome::Completed { success: true }) {
        debug!(outcome = ?out.outcome, "RMS probe did not complete");
        return None;
    }

    let points = parse_rms_windows(&out.stdout, duration_s, window_s);
    Some(normalize(points))
}

/// Parse interleaved `pts_time:` / `RMS_level=` lines into windows.
fn parse_rms_windows(stdout: &str, duration_s: f64, window_s: u64) -> Vec<IntensityPoint> {
    let mut points = Vec::new();
    let mut current_time: Option<f64> = None;

    for line in stdout.lines() {
        if let Some(caps) = PTS_TIME_RE.captures(line) {
            current_time = caps[1].parse().ok();
        } else if let Some(caps) = RMS_LEVEL_RE.captures(line) {
            let Some(time) = current_time.take() else {
                continue;
            };
            let db: f64 = match &caps[1] {
                "-inf" | "inf" => DB_FLOOR,
                text => text.parse().unwrap_or(DB_FLOOR),
            };
            let clamped = db.clamp(DB_FLOOR, DB_CEILING);
            let intensity = ((clamped - DB_FLOOR) / (DB_CEILING - DB_FLOOR)) as f32;
            let start_ms = (time * 1000.0) as u64;
            let end_ms = (((time + window_s as f64).min(duration_s.max(time))) * 1000.0) as u64;
            if end_ms > start_ms {
                points.push(IntensityPoint::new(start_ms, end_ms, intensity));
            }
        }
    }
    points
}

/// One silence-detection pass; also usable on its own for clip boundaries.
pub fn detect_silences(
    tools: &ToolPaths,
    media: &Path,
    cancel: &CancelFlag,
) -> Option<Vec<SilenceInterval>> {
    let spec = RunSpec::new(
        "silence detection",
        &tools.transcoder,
        vec![
            "-hide_banner".into(),
            "-nostats".into(),
            "-i".into(),
            media.to_string_lossy().into_owned(),
            "-af".into(),
            format!("silencedetect=noise={SILENCE_NOISE_DB}:d={SILENCE_MIN_DURATION_S}"),
            "-f".into(),
            "null".into(),
            "-".into(),
        ],
        PROBE_TIMEOUT,
        cancel.clone(),
    );
    let out = process::run(&spec).ok()?;
    if !matches!(out.outcome, RunOutcome::Completed { success: true }) {
        return None;
    }
    Some(parse_silences(&out.stderr))
}

/// Pair up `silence_start` / `silence_end` stderr lines.
fn parse_silences(stderr: &str) -> Vec<SilenceInterval> {
    let mut silences = Vec::new();
    let mut open_start: Option<f64> = None;

    for line in stderr.lines() {
        if let Some(caps) = SILENCE_START_RE.captures(line) {
            open_start = caps[1].parse().ok();
        } else if let Some(caps) = SILENCE_END_RE.captures(line) {
            if let (Some(start), Ok(end)) = (open_start.take(), caps[1].parse::<f64>()) {
                if end > start {
                    silences.push(SilenceInterval {
                        start_s: start.max(0.0),
                        end_s: end,
                    });
                }
            }
        }
    }
    silences
}

/// Fallback signal: windows are loud in proportion to how little of them is
/// silent.
fn silence_derived_signal(
    silences: &[SilenceInterval],
    duration_s: f64,
    window_s: u64,
) -> Vec<IntensityPoint> {
    if duration_s <= 0.0 {
        return Vec::new();
    }
    let window_s = window_s.max(1);
    let windows = (duration_s / window_s as f64).ceil() as u64;
    let points = (0..windows)
        .map(|i| {
            let start = (i * window_s) as f64;
            let end = ((i + 1) * window_s) as f64;
            let overlap: f64 = silences
                .iter()
                .map(|s| (s.end_s.min(end) - s.start_s.max(start)).max(0.0))
                .sum();
            let ratio = (overlap / (end - start)).clamp(0.0, 1.0);
            IntensityPoint::new(
                (start * 1000.0) as u64,
                ((end.min(duration_s)) * 1000.0) as u64,
                (1.0 - ratio * 0.9) as f32,
            )
        })
        .collect();
    normalize(points)
}

/// Min-max renormalize intensities to span the full 0..1 range.
fn normalize(mut points: Vec<IntensityPoint>) -> Vec<IntensityPoint> {
    let (mut min, mut max) = (f32::INFINITY, f32::NEG_INFINITY);
    for p in &points {
        min = min.min(p.intensity);
        max = max.max(p.intensity);
    }
    let range = max - min;
    if range > f32::EPSILON {
        for p in &mut points {
            p.intensity = (p.intensity - min) / range;
        }
    }
    points
}
