//! The analyze pipeline: probes → fusion → detection → boundary snap →
//! virality scores.
//!
//! Probe orchestration policy: metadata (with the platform heatmap, when
//! present) and comments need no media download. The heatmap, when
//! available, is authoritative and used alone. Without one, a strong
//! comment signal stands alone; otherwise a single analysis download feeds
//! the audio and scene probes in parallel and everything non-empty is
//! fused.

use clipforge_analysis::{
    combine_signals, default_weight, detect_segments, optimize_segments, score_segment,
    BoundaryOptions, CombineOptions, CommentMoment, DetectOptions, OptimizedSegment,
    SilenceInterval, ViralityBreakdown,
};
use clipforge_core::{
    CancelFlag, CombinedHeatmap, Result, SignalMethod, SignalSource,
};
use clipforge_media::{
    analyze_audio, downloader, scene_signal, ToolPaths,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

const MAX_COMMENTS: usize = 200;
const COMMENT_WINDOW_S: u64 = 5;
const AUDIO_WINDOW_S: u64 = 2;
/// Analysis downloads only need enough pixels for scene detection.
const ANALYSIS_HEIGHT_CAP: u32 = 480;

/// Client-tunable detection settings, all optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzeSettings {
    pub top_n: Option<usize>,
    pub min_duration_s: Option<f64>,
    pub max_duration_s: Option<f64>,
    pub min_gap_s: Option<f64>,
    pub intensity_threshold: Option<f32>,
}

impl AnalyzeSettings {
    pub fn detect_options(&self) -> DetectOptions {
        let defaults = DetectOptions::default();
        DetectOptions {
            top_n: self.top_n.unwrap_or(defaults.top_n),
            min_duration_s: self.min_duration_s.unwrap_or(defaults.min_duration_s),
            max_duration_s: self.max_duration_s.unwrap_or(defaults.max_duration_s),
            min_gap_s: self.min_gap_s.unwrap_or(defaults.min_gap_s),
            intensity_threshold: self
                .intensity_threshold
                .unwrap_or(defaults.intensity_threshold),
        }
    }

    fn boundary_options(&self) -> BoundaryOptions {
        let detect = self.detect_options();
        BoundaryOptions {
            min_duration_s: detect.min_duration_s,
            max_duration_s: detect.max_duration_s,
        }
    }
}

/// Basic video facts for the response envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummary {
    pub id: String,
    pub title: String,
    pub duration_s: f64,
}

/// How the segments were found.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSummary {
    /// The method that drove detection (`heatmap`, `comments`, `combined`,
    /// or the best-effort method when everything came back empty).
    pub primary: SignalMethod,
    pub methods: Vec<SignalMethod>,
    pub threshold: f32,
    /// True when the relaxed-gap pass admitted segments; the strict
    /// `minGapS` guarantee is weakened in that case.
    pub relaxed: bool,
}

/// Everything `/api/analyze` returns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOutcome {
    pub video: VideoSummary,
    pub heatmap: CombinedHeatmap,
    pub segments: Vec<OptimizedSegment>,
    pub detection: DetectionSummary,
    /// Segment id → score breakdown.
    pub virality_scores: HashMap<String, ViralityBreakdown>,
    pub comment_moments: Vec<CommentMoment>,
}

/// Run the full analysis pipeline for a URL. Blocking; run on a worker
/// thread.
pub fn analyze_url(
    tools: &ToolPaths,
    work_dir: &Path,
    url: &str,
    settings: &AnalyzeSettings,
    cancel: &CancelFlag,
) -> Result<AnalyzeOutcome> {
    let info = downloader::fetch_video_info(tools, url, cancel)?;
    info!(
        video = %info.id,
        duration_s = info.duration_s,
        has_heatmap = !info.heatmap.is_empty(),
        "Analyzing video"
    );
    cancel.check()?;

    let comments = downloader::fetch_comments(tools, url, MAX_COMMENTS, cancel);
    let comment_signal = clipforge_analysis::extract_comment_signal(
        &comments,
        info.duration_s,
        COMMENT_WINDOW_S,
    );
    cancel.check()?;

    let mut sources: Vec<SignalSource> = Vec::new();
    let mut silences: Vec<SilenceInterval> = Vec::new();
    let primary;

    if !info.heatmap.is_empty() {
        // The platform's own engagement curve is the best signal there is;
        // use it alone.
        primary = SignalMethod::Heatmap;
        sources.push(SignalSource::new(
            SignalMethod::Heatmap,
            1.0,
            info.heatmap.clone(),
        ));
    } else if comment_signal.is_strong() {
        primary = SignalMethod::Comments;
        sources.push(SignalSource::new(
            SignalMethod::Comments,
            default_weight(SignalMethod::Comments),
            comment_signal.points.clone(),
        ));
    } else {
        // Fallback analysis: one download, then audio and scene in
        // parallel.
        let media_path = work_dir.join(format!("analysis_{}.mp4", info.id));
        match downloader::download_full(
            tools,
            url,
            ANALYSIS_HEIGHT_CAP,
            &media_path,
            cancel,
        ) {
            Ok(()) => {
                let (audio, scene) = rayon::join(
                    || analyze_audio(tools, &media_path, info.duration_s, AUDIO_WINDOW_S, cancel),
                    || scene_signal(tools, &media_path, info.duration_s, cancel),
                );
                silences = audio.silences.clone();
                if !audio.points.is_empty() {
                    sources.push(SignalSource::new(
                        SignalMethod::Audio,
                        default_weight(SignalMethod::Audio),
                        audio.points,
                    ));
                }
                if !scene.is_empty() {
                    sources.push(SignalSource::new(
                        SignalMethod::Scene,
                        default_weight(SignalMethod::Scene),
                        scene,
                    ));
                }
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Analysis download failed; continuing with comment signal only");
            }
        }
        let _ = std::fs::remove_file(work_dir.join(format!("analysis_{}.mp4", info.id)));

        if !comment_signal.is_empty() {
            sources.push(SignalSource::new(
                SignalMethod::Comments,
                default_weight(SignalMethod::Comments),
                comment_signal.points.clone(),
            ));
        }
        primary = match sources.len() {
            0 | 1 => sources
                .first()
                .map(|s| s.method)
                .unwrap_or(SignalMethod::Audio),
            _ => SignalMethod::Combined,
        };
    }
    cancel.check()?;

    let duration_ms = (info.duration_s * 1000.0) as u64;
    let combined = combine_signals(sources, duration_ms, &CombineOptions::default());

    let detect_options = settings.detect_options();
    let detection = detect_segments(&combined, info.duration_s, &detect_options);
    let segments = optimize_segments(
        &detection.segments,
        &combined,
        &silences,
        info.duration_s,
        &settings.boundary_options(),
    );

    let virality_scores = segments
        .iter()
        .map(|opt| {
            (
                opt.segment.id.clone(),
                score_segment(&opt.segment, &combined, info.duration_s),
            )
        })
        .collect();

    info!(
        segments = segments.len(),
        primary = %primary,
        threshold = detection.threshold_used,
        "Analysis complete"
    );

    let methods = combined.methods_used.clone();
    Ok(AnalyzeOutcome {
        video: VideoSummary {
            id: info.id,
            title: info.title,
            duration_s: info.duration_s,
        },
        heatmap: combined,
        segments,
        detection: DetectionSummary {
            primary,
            methods,
            threshold: detection.threshold_used,
            relaxed: detection.relaxed,
        },
        virality_scores,
        comment_moments: comment_signal.moments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = AnalyzeSettings::default();
        let opts = settings.detect_options();
        assert_eq!(opts.top_n, 5);
        assert!((opts.min_duration_s - 15.0).abs() < 1e-9);
        assert!((opts.max_duration_s - 60.0).abs() < 1e-9);
        assert!((opts.min_gap_s - 30.0).abs() < 1e-9);
        assert!((opts.intensity_threshold - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_settings_overrides() {
        let json = r#"{"topN": 3, "minGapS": 10.0}"#;
        let settings: AnalyzeSettings = serde_json::from_str(json).unwrap();
        let opts = settings.detect_options();
        assert_eq!(opts.top_n, 3);
        assert!((opts.min_gap_s - 10.0).abs() < 1e-9);
        assert!((opts.max_duration_s - 60.0).abs() < 1e-9);
    }
}
