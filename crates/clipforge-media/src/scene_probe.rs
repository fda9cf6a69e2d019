//! Scene-change probe: cut density as an excitement proxy.

use crate::process::{self, RunOutcome, RunSpec};
use crate::tools::ToolPaths;
use clipforge_core::{CancelFlag, IntensityPoint};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

const SCENE_THRESHOLD: f64 = 0.3;
const WINDOW_S: u64 = 2;
const ANALYSIS_WIDTH: u32 = 640;

static SHOWINFO_PTS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"pts_time:([0-9.]+)").unwrap());

/// Length classes pick the sampling rate and the time budget; longer inputs
/// get sparser sampling and a bigger budget, and a timeout keeps whatever
/// events were already seen.
fn length_class(duration_s: f64) -> (Option<u32>, Duration) {
    if duration_s > 2.0 * 3600.0 {
        (Some(1), Duration::from_secs(180))
    } else if duration_s > 30.0 * 60.0 {
        (Some(2), Duration::from_secs(120))
    } else {
        (None, Duration::from_secs(90))
    }
}

/// Detect scene changes and bucket them into a normalized 2 s signal.
/// Empty on failure; partial on timeout.
pub fn scene_signal(
    tools: &ToolPaths,
    media: &Path,
    duration_s: f64,
    cancel: &CancelFlag,
) -> Vec<IntensityPoint> {
    let (fps, timeout) = length_class(duration_s);

    let mut filter = String::new();
    if let Some(fps) = fps {
        filter.push_str(&format!("fps={fps},"));
    }
    filter.push_str(&format!(
        "scale={ANALYSIS_WIDTH}:-2,select='gt(scene,{SCENE_THRESHOLD})',showinfo"
    ));

    let spec = RunSpec::new(
        "scene probe",
        &tools.transcoder,
        vec![
            "-hide_banner".into(),
            "-nostats".into(),
            "-i".into(),
            media.to_string_lossy().into_owned(),
            "-vf".into(),
            filter,
            "-an".into(),
            "-f".into(),
            "null".into(),
            "-".into(),
        ],
        timeout,
        cancel.clone(),
    );

    let out = match process::run(&spec) {
        Ok(out) => out,
        Err(e) => {
            warn!(error = %e, "Scene probe failed to run");
            return Vec::new();
        }
    };

    match out.outcome {
        RunOutcome::Completed { success: true } => {}
        RunOutcome::TimedOut => {
            warn!("Scene probe timed out; keeping partial results");
        }
        other => {
            debug!(outcome = ?other, "Scene probe did not complete");
            return Vec::new();
        }
    }

    let timestamps = parse_scene_timestamps(&out.stderr);
    debug!(events = timestamps.len(), "Scene changes detected");
    bucket_events(&timestamps, duration_s, WINDOW_S)
}

/// Pull `pts_time` values out of showinfo stderr lines.
fn parse_scene_timestamps(stderr: &str) -> Vec<f64> {
    stderr
        .lines()
        .filter(|line| line.contains("Parsed_showinfo"))
        .filter_map(|line| SHOWINFO_PTS_RE.captures(line))
        .filter_map(|caps| caps[1].parse().ok())
        .collect()
}

/// Count events per window and normalize counts to 0..1.
fn bucket_events(timestamps: &[f64], duration_s: f64, window_s: u64) -> Vec<IntensityPoint> {
    if timestamps.is_empty() || duration_s <= 0.0 {
        return Vec::new();
    }
    let window_s = window_s.max(1);
    let windows = (duration_s / window_s as f64).ceil() as usize;
    let mut counts = vec![0u32; windows];
    for &t in timestamps {
        let index = (t / window_s as f64) as usize;
        if index < windows {
            counts[index] += 1;
        }
    }
    let max = counts.iter().copied().max().unwrap_or(1).max(1);

    counts
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > 0)
        .map(|(i, &count)| {
            let start_ms = i as u64 * window_s * 1000;
            let end_ms = ((i as u64 + 1) * window_s * 1000).min((duration_s * 1000.0) as u64);
            IntensityPoint::new(start_ms, end_ms, count as f32 / max as f32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_classes() {
        let (fps, timeout) = length_class(600.0);
        assert_eq!(fps, None);
        assert_eq!(timeout, Duration::from_secs(90));

        let (fps, timeout) = length_class(45.0 * 60.0);
        assert_eq!(fps, Some(2));
        assert_eq!(timeout, Duration::from_secs(120));

        let (fps, timeout) = length_class(3.0 * 3600.0);
        assert_eq!(fps, Some(1));
        assert_eq!(timeout, Duration::from_secs(180));
    }

    #[test]
    fn test_parse_scene_timestamps() {
        let stderr = "\
[Parsed_showinfo_2 @ 0x55] n:   0 pts:  12800 pts_time:12.8    pos: 1 fmt:yuv420p\n\
[Parsed_showinfo_2 @ 0x55] n:   1 pts:  25600 pts_time:25.6    pos: 2 fmt:yuv420p\n\
random noise line pts_time:99.9\n";
        let stamps = parse_scene_timestamps(stderr);
        assert_eq!(stamps.len(), 2);
        assert!((stamps[0] - 12.8).abs() < 1e-9);
        assert!((stamps[1] - 25.6).abs() < 1e-9);
    }

    #[test]
    fn test_bucket_events_counts_and_normalizes() {
        // Three cuts in [0,2), one in [4,6).
        let stamps = vec![0.1, 0.5, 1.9, 4.2];
        let points = bucket_events(&stamps, 10.0, 2);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].start_ms, 0);
        assert!((points[0].intensity - 1.0).abs() < 1e-6);
        assert_eq!(points[1].start_ms, 4000);
        assert!((points[1].intensity - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_bucket_events_empty() {
        assert!(bucket_events(&[], 10.0, 2).is_empty());
    }

    #[test]
    fn test_bucket_events_ignores_out_of_range() {
        let points = bucket_events(&[50.0], 10.0, 2);
        assert!(points.is_empty());
    }
}
