//! Virality scorer: a weighted composite of six 0..100 sub-scores.

use clipforge_core::{CombinedHeatmap, IntensityPoint, Segment};
use serde::Serialize;

const W_PEAK: f64 = 0.30;
const W_HOOK: f64 = 0.25;
const W_PACING: f64 = 0.15;
const W_AUDIO: f64 = 0.15;
const W_POSITION: f64 = 0.10;
const W_DURATION: f64 = 0.05;

/// Per-segment score breakdown. Every sub-score and the overall land in
/// 0..100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViralityBreakdown {
    pub overall: u32,
    pub peak_intensity: u32,
    pub hook_strength: u32,
    pub pacing: u32,
    pub audio_energy: u32,
    pub position_bonus: u32,
    pub duration_fit: u32,
    pub label: &'static str,
    pub color: &'static str,
}

/// Score one segment against the heatmap it was detected in.
pub fn score_segment(
    segment: &Segment,
    heatmap: &CombinedHeatmap,
    video_duration_s: f64,
) -> ViralityBreakdown {
    let avg = f64::from(segment.avg_intensity);

    let peak = (100.0 * f64::from(segment.peak_intensity)).round() as u32;
    let hook = hook_strength(segment, heatmap, avg);
    let pacing = pacing_score(segment, heatmap);
    let audio = (100.0 * avg).round() as u32;
    let position = position_bonus(segment.start_s, video_duration_s);
    let duration = duration_fit(segment.duration_s);

    let overall = (W_PEAK * f64::from(peak)
        + W_HOOK * f64::from(hook)
        + W_PACING * f64::from(pacing)
        + W_AUDIO * f64::from(audio)
        + W_POSITION * f64::from(position)
        + W_DURATION * f64::from(duration))
    .round() as u32;

    let (label, color) = label_for(overall);

    ViralityBreakdown {
        overall,
        peak_intensity: peak.min(100),
        hook_strength: hook,
        pacing,
        audio_energy: audio.min(100),
        position_bonus: position,
        duration_fit: duration,
        label,
        color,
    }
}

/// Points whose span intersects `[start, start+3)`.
fn hook_points<'a>(segment: &Segment, heatmap: &'a CombinedHeatmap) -> Vec<&'a IntensityPoint> {
    let start_ms = (segment.start_s.max(0.0) * 1000.0) as u64;
    let end_ms = ((segment.start_s + 3.0).max(0.0) * 1000.0) as u64;
    heatmap
        .points
        .iter()
        .filter(|p| p.start_ms < end_ms && p.end_ms > start_ms)
        .collect()
}

fn hook_strength(segment: &Segment, heatmap: &CombinedHeatmap, avg: f64) -> u32 {
    let points = hook_points(segment, heatmap);
    if points.is_empty() {
        return (50.0 * avg).round() as u32;
    }
    let h = points.iter().map(|p| f64::from(p.intensity)).sum::<f64>() / points.len() as f64;
    let bonus = if h > avg { 15.0 } else { 0.0 };
    (85.0 * h + bonus).min(100.0).round() as u32
}

/// Intensity variance over the segment reads as pacing: flat audio bores,
/// movement retains.
fn pacing_score(segment: &Segment, heatmap: &CombinedHeatmap) -> u32 {
    let start_ms = (segment.start_s.max(0.0) * 1000.0) as u64;
    let end_ms = (segment.end_s.max(0.0) * 1000.0) as u64;
    let values: Vec<f64> = heatmap
        .points
        .iter()
        .filter(|p| p.start_ms < end_ms && p.end_ms > start_ms)
        .map(|p| f64::from(p.intensity))
        .collect();
    if values.len() < 3 {
        return 50;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (400.0 * variance.sqrt()).min(100.0).round() as u32
}

/// Earlier is better: clips from the opening third hook cold viewers.
fn position_bonus(start_s: f64, video_duration_s: f64) -> u32 {
    if video_duration_s <= 0.0 {
        return 50;
    }
    let pos = (start_s / video_duration_s).clamp(0.0, 1.0);
    let score = if pos < 1.0 / 3.0 {
        100.0 - 60.0 * pos // 100 → 80 across the first third
    } else if pos < 2.0 / 3.0 {
        80.0 - 90.0 * (pos - 1.0 / 3.0) // 80 → 50
    } else {
        50.0 - 60.0 * (pos - 2.0 / 3.0) // 50 → 30
    };
    score.round() as u32
}

/// The 30–45 s band is the short-form sweet spot.
fn duration_fit(duration_s: f64) -> u32 {
    let score = if (30.0..=45.0).contains(&duration_s) {
        100.0
    } else if (20.0..30.0).contains(&duration_s) {
        70.0 + 3.0 * (duration_s - 20.0)
    } else if duration_s > 45.0 && duration_s <= 60.0 {
        100.0 - 70.0 * (duration_s - 45.0) / 15.0
    } else if (15.0..20.0).contains(&duration_s) {
        50.0
    } else {
        30.0
    };
    score.round() as u32
}

fn label_for(overall: u32) -> (&'static str, &'static str) {
    if overall >= 80 {
        ("Viral", "#ef4444")
    } else if overall >= 60 {
        ("Strong", "#22c55e")
    } else if overall >= 40 {
        ("Good", "#f59e0b")
    } else {
        ("Fair", "#9ca3af")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_core::{mint_segment_id, SignalMethod};

    fn heatmap(values: &[f32]) -> CombinedHeatmap {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &v)| IntensityPoint::new(i as u64 * 2000, (i as u64 + 1) * 2000, v))
            .collect();
        CombinedHeatmap {
            points,
            window_ms: 2000,
            methods_used: vec![SignalMethod::Heatmap],
        }
    }

    fn seg(start: f64, end: f64, avg: f32, peak: f32) -> Segment {
        Segment {
            id: mint_segment_id(),
            start_s: start,
            end_s: end,
            duration_s: end - start,
            avg_intensity: avg,
            peak_intensity: peak,
        }
    }

    #[test]
    fn test_all_scores_in_bounds() {
        let map = heatmap(&[0.9, 0.1, 0.7, 0.3, 0.8, 0.2, 0.95, 0.5]);
        for (start, end) in [(0.0, 8.0), (2.0, 14.0), (6.0, 16.0)] {
            let b = score_segment(&seg(start, end, 0.6, 0.95), &map, 16.0);
            for score in [
                b.overall,
                b.peak_intensity,
                b.hook_strength,
                b.pacing,
                b.audio_energy,
                b.position_bonus,
                b.duration_fit,
            ] {
                assert!(score <= 100, "sub-score {score} above 100");
            }
        }
    }

    #[test]
    fn test_scoring_deterministic() {
        let map = heatmap(&[0.4, 0.8, 0.6, 0.2, 0.9]);
        let s = seg(0.0, 10.0, 0.58, 0.9);
        assert_eq!(
            score_segment(&s, &map, 10.0),
            score_segment(&s, &map, 10.0)
        );
    }

    #[test]
    fn test_peak_and_audio_track_intensities() {
        let map = heatmap(&[0.5; 20]);
        let b = score_segment(&seg(0.0, 30.0, 0.5, 0.9), &map, 40.0);
        assert_eq!(b.peak_intensity, 90);
        assert_eq!(b.audio_energy, 50);
    }

    #[test]
    fn test_hook_prefers_strong_opening() {
        let mut strong_open = vec![0.3f32; 30];
        strong_open[0] = 1.0;
        strong_open[1] = 1.0;
        let strong = score_segment(&seg(0.0, 30.0, 0.3, 1.0), &heatmap(&strong_open), 60.0);
        let weak = score_segment(&seg(0.0, 30.0, 0.3, 1.0), &heatmap(&[0.3; 30]), 60.0);
        assert!(strong.hook_strength > weak.hook_strength);
    }

    #[test]
    fn test_hook_fallback_without_points() {
        let map = heatmap(&[]);
        let b = score_segment(&seg(0.0, 30.0, 0.8, 0.9), &map, 60.0);
        assert_eq!(b.hook_strength, 40); // 50 · 0.8
    }

    #[test]
    fn test_pacing_flat_vs_varied() {
        let flat = score_segment(&seg(0.0, 30.0, 0.5, 0.5), &heatmap(&[0.5; 30]), 60.0);
        let varied_values: Vec<f32> = (0..30).map(|i| if i % 2 == 0 { 0.1 } else { 0.9 }).collect();
        let varied = score_segment(&seg(0.0, 30.0, 0.5, 0.9), &heatmap(&varied_values), 60.0);
        assert_eq!(flat.pacing, 0);
        assert!(varied.pacing > 80);
    }

    #[test]
    fn test_pacing_defaults_with_sparse_points() {
        let map = heatmap(&[0.5, 0.6]);
        let b = score_segment(&seg(0.0, 3.0, 0.5, 0.6), &map, 60.0);
        assert_eq!(b.pacing, 50);
    }

    #[test]
    fn test_position_bonus_piecewise() {
        assert_eq!(position_bonus(0.0, 600.0), 100);
        assert_eq!(position_bonus(200.0, 600.0), 80);
        assert_eq!(position_bonus(400.0, 600.0), 50);
        assert_eq!(position_bonus(600.0, 600.0), 30);
        assert!(position_bonus(100.0, 600.0) > position_bonus(150.0, 600.0));
    }

    #[test]
    fn test_duration_fit_bands() {
        assert_eq!(duration_fit(35.0), 100);
        assert_eq!(duration_fit(30.0), 100);
        assert_eq!(duration_fit(45.0), 100);
        assert_eq!(duration_fit(20.0), 70);
        assert_eq!(duration_fit(25.0), 85);
        assert_eq!(duration_fit(60.0), 30);
        assert_eq!(duration_fit(17.0), 50);
        assert_eq!(duration_fit(10.0), 30);
        assert_eq!(duration_fit(90.0), 30);
    }

    #[test]
    fn test_labels_by_bucket() {
        assert_eq!(label_for(85), ("Viral", "#ef4444"));
        assert_eq!(label_for(65), ("Strong", "#22c55e"));
        assert_eq!(label_for(45), ("Good", "#f59e0b"));
        assert_eq!(label_for(20), ("Fair", "#9ca3af"));
    }

    #[test]
    fn test_overall_weighted_combination() {
        let map = heatmap(&[0.5; 30]);
        let b = score_segment(&seg(0.0, 30.0, 0.5, 0.8), &map, 600.0);
        let expected = (0.30 * 80.0
            + 0.25 * f64::from(b.hook_strength)
            + 0.15 * f64::from(b.pacing)
            + 0.15 * 50.0
            + 0.10 * 100.0
            + 0.05 * 100.0)
            .round() as u32;
        assert_eq!(b.overall, expected);
    }
}
