//! Smart-reframe analysis: find where the action sits in each sampled
//! frame and derive a smooth dynamic crop path.
//!
//! Frames stream out of the transcoder as raw RGB24 at a small analysis
//! width; each frame is scored over five vertical strips with a slight
//! central bias, the best contiguous three-strip window picks the crop
//! center, and the per-frame crop X is smoothed over a centered window.

use crate::process::stderr_tail;
use crate::tools::ToolPaths;
use crate::transcode::CropKeyframe;
use clipforge_core::{CancelFlag, ClipForgeError, Result};
use crossbeam_channel::bounded;
use rayon::prelude::*;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const SAMPLE_FPS: f64 = 2.0;
const ANALYSIS_WIDTH: u32 = 160;
const STRIPS: usize = 5;
const STRIP_WINDOW: usize = 3;
const SMOOTH_WINDOW: usize = 5;

/// Per-frame analysis budget; the whole pass is capped at
/// `frames × 5 s` with a floor.
const PER_FRAME_BUDGET: Duration = Duration::from_secs(5);

/// Slight central bias: the middle of the frame usually is the subject.
const STRIP_BIAS: [f32; STRIPS] = [0.95, 1.0, 1.05, 1.0, 0.95];

/// Derive the dynamic crop path for a clip.
///
/// `offset_s`/`duration_s` select the clip range inside `media`;
/// `source_size` is the real video resolution the keyframe X values are
/// expressed in. Sources that are already at least 9:16 tall get a single
/// static center keyframe.
pub fn analyze_reframe(
    tools: &ToolPaths,
    media: &Path,
    offset_s: f64,
    duration_s: f64,
    source_size: (u32, u32),
    cancel: &CancelFlag,
) -> Result<Vec<CropKeyframe>> {
    let (src_w, src_h) = source_size;
    if src_w == 0 || src_h == 0 {
        return Err(ClipForgeError::EnhancementFailure(
            "reframe: unknown source dimensions".into(),
        ));
    }

    let crop_w = ((src_h as f64 * 9.0 / 16.0).floor() as u32).min(src_w);
    if src_w as f64 / src_h as f64 <= 9.0 / 16.0 {
        // Already vertical: static center crop.
        return Ok(vec![CropKeyframe { time_s: 0.0, x: 0.0 }]);
    }

    let frames = sample_frames(tools, media, offset_s, duration_s, source_size, cancel)?;
    if frames.frames.is_empty() {
        return Err(ClipForgeError::EnhancementFailure(
            "reframe: no frames sampled".into(),
        ));
    }
    debug!(frames = frames.frames.len(), "Sampled frames for reframe");

    // Score every frame's best strip window in parallel.
    let centers: Vec<f64> = frames
        .frames
        .par_iter()
        .map(|frame| best_window_center(frame, frames.width, frames.height))
        .collect();

    // Center fraction → crop left edge in source pixels, then smooth.
    let max_x = (src_w - crop_w) as f64;
    let raw_x: Vec<f64> = centers
        .iter()
        .map(|&center| (center * src_w as f64 - crop_w as f64 / 2.0).clamp(0.0, max_x))
        .collect();
    let smoothed = smooth_path(&raw_x, SMOOTH_WINDOW);

    Ok(thin_keyframes(&smoothed, SAMPLE_FPS, src_w))
}

struct SampledFrames {
    frames: Vec<Vec<u8>>,
    width: usize,
    height: usize,
}

/// Stream raw RGB24 frames from the transcoder at the analysis size.
fn sample_frames(
    tools: &ToolPaths,
    media: &Path,
    offset_s: f64,
    duration_s: f64,
    source_size: (u32, u32),
    cancel: &CancelFlag,
) -> Result<SampledFrames> {
    let (src_w, src_h) = source_size;
    let height = {
        let ideal = (src_h as u64 * ANALYSIS_WIDTH as u64 / src_w.max(1) as u64) as u32;
        ((ideal / 2) * 2).max(2)
    };
    let frame_bytes = (ANALYSIS_WIDTH * height * 3) as usize;

    let mut child = Command::new(&tools.transcoder)
        .args([
            "-hide_banner",
            "-nostats",
            "-ss",
            &format!("{offset_s:.3}"),
            "-i",
            &media.to_string_lossy(),
            "-t",
            &format!("{duration_s:.3}"),
            "-vf",
            &format!("fps={SAMPLE_FPS},scale={ANALYSIS_WIDTH}:{height}"),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            ClipForgeError::UpstreamUnavailable(format!("reframe frame sampling: {e}"))
        })?;

    let mut stdout = child.stdout.take().expect("stdout was piped");
    let mut stderr = child.stderr.take().expect("stderr was piped");

    // Frames flow through a bounded channel so a stalled scorer
    // back-pressures the decoder instead of buffering unbounded.
    let (tx, rx) = bounded::<Vec<u8>>(16);
    let reader = std::thread::spawn(move || {
        loop {
            let mut frame = vec![0u8; frame_bytes];
            // EOF or a broken pipe both mean the stream is over.
            if stdout.read_exact(&mut frame).is_err() {
                break;
            }
            if tx.send(frame).is_err() {
                break;
            }
        }
    });
    let stderr_reader = std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf);
        buf
    });

    let expected_frames = (duration_s * SAMPLE_FPS).ceil().max(1.0) as u32;
    let timeout =
        (PER_FRAME_BUDGET * expected_frames).max(Duration::from_secs(30));
    let started = Instant::now();

    let mut frames: Vec<Vec<u8>> = Vec::with_capacity(expected_frames as usize);
    let mut aborted = false;
    loop {
        if cancel.is_cancelled() || started.elapsed() > timeout {
            aborted = true;
            let _ = child.kill();
            break;
        }
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(frame) => frames.push(frame),
            // A finished child surfaces as Disconnected once the reader
            // drains the pipe and drops its sender; idle ticks just mean
            // the decoder is still working.
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    // Dropping the receiver unblocks a reader stuck on a full channel
    // before it gets joined.
    drop(rx);
    let _ = child.wait();
    let _ = reader.join();
    let err_text = stderr_reader.join().unwrap_or_default();

    if cancel.is_cancelled() {
        return Err(ClipForgeError::Cancelled);
    }
    if aborted {
        return Err(ClipForgeError::Timeout {
            what: "reframe frame sampling".into(),
            seconds: timeout.as_secs(),
        });
    }
    if frames.is_empty() {
        warn!(stderr = %stderr_tail(&err_text), "Frame sampling produced nothing");
    }

    Ok(SampledFrames {
        frames,
        width: ANALYSIS_WIDTH as usize,
        height: height as usize,
    })
}

/// Score five strips and return the best 3-strip window's center as a
/// fraction of frame width.
fn best_window_center(rgb: &[u8], width: usize, height: usize) -> f64 {
    let scores = strip_scores(rgb, width, height);
    let mut best_start = 0usize;
    let mut best_score = f32::NEG_INFINITY;
    for start in 0..=(STRIPS - STRIP_WINDOW) {
        let score: f32 = scores[start..start + STRIP_WINDOW].iter().sum();
        if score > best_score {
            best_score = score;
            best_start = start;
        }
    }
    (best_start as f64 + STRIP_WINDOW as f64 / 2.0) / STRIPS as f64
}

/// Brightness + saturation per vertical strip, with the central bias
/// applied.
fn strip_scores(rgb: &[u8], width: usize, height: usize) -> [f32; STRIPS] {
    let strip_width = (width / STRIPS).max(1);
    let mut sums = [0.0f32; STRIPS];
    let mut counts = [0u32; STRIPS];

    for y in 0..height {
        for x in 0..width {
            let base = (y * width + x) * 3;
            if base + 2 >= rgb.len() {
                break;
            }
            let (r, g, b) = (rgb[base] as f32, rgb[base + 1] as f32, rgb[base + 2] as f32);
            let max = r.max(g).max(b);
            let min = r.min(g).min(b);
            let brightness = (r + g + b) / (3.0 * 255.0);
            let saturation = (max - min) / 255.0;
            let strip = (x / strip_width).min(STRIPS - 1);
            sums[strip] += 0.6 * brightness + 0.4 * saturation;
            counts[strip] += 1;
        }
    }

    let mut scores = [0.0f32; STRIPS];
    for i in 0..STRIPS {
        if counts[i] > 0 {
            scores[i] = sums[i] / counts[i] as f32 * STRIP_BIAS[i];
        }
    }
    scores
}

/// Centered moving average over the crop path.
fn smooth_path(values: &[f64], window: usize) -> Vec<f64> {
    if values.len() < 2 || window <= 1 {
        return values.to_vec();
    }
    let half = window / 2;
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

/// Collapse the per-frame path into keyframes, keeping points only where
/// the crop actually moves.
fn thin_keyframes(path: &[f64], fps: f64, src_w: u32) -> Vec<CropKeyframe> {
    let threshold = src_w as f64 * 0.02;
    let mut keyframes: Vec<CropKeyframe> = Vec::new();
    for (i, &x) in path.iter().enumerate() {
        let time_s = i as f64 / fps;
        let moved = keyframes
            .last()
            .map(|last| (x - last.x).abs() > threshold)
            .unwrap_or(true);
        if moved || i == path.len() - 1 {
            keyframes.push(CropKeyframe { time_s, x });
        }
    }
    keyframes
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an RGB24 frame with a bright region covering strip `hot`.
    fn frame_with_hot_strip(width: usize, height: usize, hot: usize) -> Vec<u8> {
        let strip_width = width / STRIPS;
        let mut rgb = vec![20u8; width * height * 3];
        for y in 0..height {
            for x in hot * strip_width..(hot + 1) * strip_width {
                let base = (y * width + x) * 3;
                rgb[base] = 250;
                rgb[base + 1] = 120;
                rgb[base + 2] = 40;
            }
        }
        rgb
    }

    #[test]
    fn test_best_window_follows_bright_strip() {
        let (w, h) = (160, 90);
        let left = best_window_center(&frame_with_hot_strip(w, h, 0), w, h);
        let right = best_window_center(&frame_with_hot_strip(w, h, 4), w, h);
        assert!(left < 0.5, "left-hot frame centered at {left}");
        assert!(right > 0.5, "right-hot frame centered at {right}");
    }

    #[test]
    fn test_uniform_frame_prefers_center() {
        let (w, h) = (160, 90);
        let rgb = vec![128u8; w * h * 3];
        let center = best_window_center(&rgb, w, h);
        assert!((center - 0.5).abs() < 1e-6, "got {center}");
    }

    #[test]
    fn test_strip_bias_favors_middle() {
        assert!(STRIP_BIAS[2] > STRIP_BIAS[0]);
        assert!(STRIP_BIAS[2] > STRIP_BIAS[4]);
    }

    #[test]
    fn test_smooth_path_damps_jitter() {
        let jittery = vec![100.0, 100.0, 300.0, 100.0, 100.0];
        let smoothed = smooth_path(&jittery, 5);
        assert!(smoothed[2] < 300.0);
        assert!(smoothed[2] > 100.0);
    }

    #[test]
    fn test_thin_keyframes_drops_static_run() {
        let path = vec![100.0; 20];
        let keyframes = thin_keyframes(&path, 2.0, 1920);
        assert_eq!(keyframes.len(), 2); // first and last only
        assert_eq!(keyframes[0].time_s, 0.0);
    }

    #[test]
    fn test_thin_keyframes_keeps_movement() {
        let path: Vec<f64> = (0..10).map(|i| i as f64 * 100.0).collect();
        let keyframes = thin_keyframes(&path, 2.0, 1920);
        assert!(keyframes.len() >= 9);
    }
}
