//! Transcoding: crop-mode filter graphs and H.264 vertical output.

use crate::process::{self, RunSpec};
use crate::tools::ToolPaths;
use clipforge_core::{CancelFlag, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(600);

/// Original audio gain under a dub track.
pub const DUB_ORIGINAL_GAIN: f64 = 0.15;

/// Output quality tier; fixes resolution cap, output size, and CRF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "1080")]
    Q1080,
    #[serde(rename = "720")]
    Q720,
    #[serde(rename = "480")]
    Q480,
}

impl Default for Quality {
    fn default() -> Self {
        Self::Q1080
    }
}

impl Quality {
    /// Source download height cap.
    pub fn height_cap(self) -> u32 {
        match self {
            Self::Q1080 => 1080,
            Self::Q720 => 720,
            Self::Q480 => 480,
        }
    }

    /// 9:16 output dimensions.
    pub fn output_size(self) -> (u32, u32) {
        match self {
            Self::Q1080 => (1080, 1920),
            Self::Q720 => (720, 1280),
            Self::Q480 => (480, 854),
        }
    }

    pub fn crf(self) -> u32 {
        match self {
            Self::Q1080 => 18,
            Self::Q720 => 20,
            Self::Q480 => 22,
        }
    }

    pub fn from_height(height: u32) -> Self {
        match height {
            0..=480 => Self::Q480,
            481..=720 => Self::Q720,
            _ => Self::Q1080,
        }
    }
}

/// One keyframe of a dynamic crop: left edge `x` (source pixels) at clip
/// time `time_s`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropKeyframe {
    pub time_s: f64,
    pub x: f64,
}

/// How a wide source becomes a tall output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CropMode {
    /// Scale up preserving aspect, center-crop to target.
    Center,
    /// Blurred scaled-up background with the fitted clip overlaid.
    BlurPad,
    /// Fit inside with black padding.
    Letterbox,
    /// Follow the action with a (possibly dynamic) crop window.
    SmartReframe { crops: Vec<CropKeyframe> },
}

impl CropMode {
    /// Parse the wire name used by the API (`center`, `blur_pad`,
    /// `letterbox`, `smart_reframe`).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "center" => Some(Self::Center),
            "blur_pad" => Some(Self::BlurPad),
            "letterbox" => Some(Self::Letterbox),
            "smart_reframe" => Some(Self::SmartReframe { crops: Vec::new() }),
            _ => None,
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::BlurPad => "blur_pad",
            Self::Letterbox => "letterbox",
            Self::SmartReframe { .. } => "smart_reframe",
        }
    }
}

/// Everything one transcode run needs.
#[derive(Debug, Clone)]
pub struct TranscodePlan {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Seek into the input before decoding.
    pub seek_s: f64,
    /// Clip length; `None` re-encodes to the end (caption burn pass).
    pub duration_s: Option<f64>,
    pub mode: CropMode,
    pub quality: Quality,
    /// Source dimensions, required for smart reframe crop math.
    pub source_size: (u32, u32),
    /// Burn this ASS stylesheet into the video.
    pub subtitles: Option<PathBuf>,
    /// Pass the audio through unchanged instead of re-encoding.
    pub copy_audio: bool,
}

impl TranscodePlan {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, quality: Quality) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            seek_s: 0.0,
            duration_s: None,
            mode: CropMode::Center,
            quality,
            source_size: (1920, 1080),
            subtitles: None,
            copy_audio: false,
        }
    }
}

/// Build the complete transcoder argument list for a plan. Pure: the same
/// plan always produces the same invocation.
pub fn build_transcode_args(plan: &TranscodePlan) -> Vec<String> {
    let (out_w, out_h) = plan.quality.output_size();
    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into()];

    if plan.seek_s > 0.0 {
        args.extend(["-ss".into(), format!("{:.3}", plan.seek_s)]);
    }
    args.extend(["-i".into(), plan.input.to_string_lossy().into_owned()]);
    if let Some(duration) = plan.duration_s {
        args.extend(["-t".into(), format!("{duration:.3}")]);
    }

    let subtitle_filter = plan
        .subtitles
        .as_ref()
        .map(|path| format!("ass={}", path.to_string_lossy()));

    match crop_filter(&plan.mode, plan.source_size, out_w, out_h) {
        FilterGraph::Simple(mut chain) => {
            if let Some(subs) = subtitle_filter {
                chain = format!("{chain},{subs}");
            }
            args.extend(["-vf".into(), chain]);
        }
        FilterGraph::Complex(mut graph) => {
            if let Some(subs) = subtitle_filter {
                graph = format!("{graph};[vout]{subs}[vfinal]");
                args.extend(["-filter_complex".into(), graph, "-map".into(), "[vfinal]".into()]);
            } else {
                args.extend(["-filter_complex".into(), graph, "-map".into(), "[vout]".into()]);
            }
            args.extend(["-map".into(), "0:a?".into()]);
        }
    }

    args.extend([
        "-c:v".into(),
        "libx264".into(),
        "-profile:v".into(),
        "high".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-crf".into(),
        plan.quality.crf().to_string(),
        "-preset".into(),
        "medium".into(),
    ]);

    if plan.copy_audio {
        args.extend(["-c:a".into(), "copy".into()]);
    } else {
        args.extend([
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            "-ar".into(),
            "44100".into(),
        ]);
    }

    args.extend([
        "-movflags".into(),
        "+faststart".into(),
        plan.output.to_string_lossy().into_owned(),
    ]);
    args
}

enum FilterGraph {
    /// `-vf` chain.
    Simple(String),
    /// `-filter_complex` graph ending in `[vout]`.
    Complex(String),
}

fn crop_filter(mode: &CropMode, source: (u32, u32), out_w: u32, out_h: u32) -> FilterGraph {
    match mode {
        CropMode::Center => FilterGraph::Simple(format!(
            "scale={out_w}:{out_h}:force_original_aspect_ratio=increase,crop={out_w}:{out_h}"
        )),
        CropMode::Letterbox => FilterGraph::Simple(format!(
            "scale={out_w}:{out_h}:force_original_aspect_ratio=decrease,\
             pad={out_w}:{out_h}:(ow-iw)/2:(oh-ih)/2:black"
        )),
        CropMode::BlurPad => FilterGraph::Complex(format!(
            "[0:v]split=2[bg][fg];\
             [bg]scale={out_w}:{out_h}:force_original_aspect_ratio=increase,\
             crop={out_w}:{out_h},boxblur=20:5[bgb];\
             [fg]scale={out_w}:{out_h}:force_original_aspect_ratio=decrease[fgs];\
             [bgb][fgs]overlay=(W-w)/2:(H-h)/2[vout]"
        )),
        CropMode::SmartReframe { crops } => {
            let (src_w, src_h) = source;
            let crop_w = crop_width(src_w, src_h, out_w, out_h);
            let x_expr = crop_x_expr(crops, src_w, crop_w);
            FilterGraph::Simple(format!(
                "crop={crop_w}:{src_h}:'{x_expr}':0,scale={out_w}:{out_h}"
            ))
        }
    }
}

/// Width of a source-resolution crop window with the output aspect ratio.
fn crop_width(src_w: u32, src_h: u32, out_w: u32, out_h: u32) -> u32 {
    let ideal = (src_h as f64 * out_w as f64 / out_h as f64).floor() as u32;
    // Keep it even for yuv420p and inside the source.
    (ideal.min(src_w) / 2) * 2
}

/// Express the crop X as a piecewise-linear function of time between
/// keyframes. A single keyframe (or none) degrades to a constant.
fn crop_x_expr(crops: &[CropKeyframe], src_w: u32, crop_w: u32) -> String {
    let max_x = (src_w.saturating_sub(crop_w)) as f64;
    let clamp = |x: f64| x.clamp(0.0, max_x);

    match crops {
        [] => format!("{:.1}", max_x / 2.0),
        [only] => format!("{:.1}", clamp(only.x)),
        _ => {
            // Innermost else: hold the last keyframe's x.
            let mut expr = format!("{:.1}", clamp(crops[crops.len() - 1].x));
            for pair in crops.windows(2).rev() {
                let (a, b) = (pair[0], pair[1]);
                let span = (b.time_s - a.time_s).max(0.001);
                expr = format!(
                    "if(between(t,{:.3},{:.3}),{:.1}+({:.1}-{:.1})*(t-{:.3})/{:.3},{})",
                    a.time_s,
                    b.time_s,
                    clamp(a.x),
                    clamp(b.x),
                    clamp(a.x),
                    a.time_s,
                    span,
                    expr
                );
            }
            // Before the first keyframe: hold its x.
            format!(
                "if(lt(t,{:.3}),{:.1},{})",
                crops[0].time_s,
                clamp(crops[0].x),
                expr
            )
        }
    }
}

/// Run a transcode plan to completion.
pub fn transcode(tools: &ToolPaths, plan: &TranscodePlan, cancel: &CancelFlag) -> Result<()> {
    let args = build_transcode_args(plan);
    let spec = RunSpec::new(
        "transcode",
        &tools.transcoder,
        args,
        TRANSCODE_TIMEOUT,
        cancel.clone(),
    );
    process::run_checked(&spec)?;
    info!(output = %plan.output.display(), "Transcode complete");
    Ok(())
}

/// Arguments that mix synthesized dub tracks over the original audio.
///
/// Each `(wav, delay_ms)` pair becomes an `adelay`ed input; the original
/// track is ducked to [`DUB_ORIGINAL_GAIN`].
pub fn build_dub_args(clip: &Path, dubs: &[(PathBuf, u64)], output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-i".into(),
        clip.to_string_lossy().into_owned(),
    ];
    for (wav, _) in dubs {
        args.extend(["-i".into(), wav.to_string_lossy().into_owned()]);
    }

    let mut graph = format!("[0:a]volume={DUB_ORIGINAL_GAIN}[orig]");
    let mut mix_inputs = String::from("[orig]");
    for (i, (_, delay_ms)) in dubs.iter().enumerate() {
        graph.push_str(&format!(
            ";[{}:a]adelay={delay_ms}|{delay_ms}[d{i}]",
            i + 1
        ));
        mix_inputs.push_str(&format!("[d{i}]"));
    }
    graph.push_str(&format!(
        ";{mix_inputs}amix=inputs={}:duration=first:normalize=0[aout]",
        dubs.len() + 1
    ));

    args.extend([
        "-filter_complex".into(),
        graph,
        "-map".into(),
        "0:v".into(),
        "-map".into(),
        "[aout]".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "192k".into(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}
