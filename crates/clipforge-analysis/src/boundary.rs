//! Boundary optimizer: snap raw peak segments to natural sentence/scene
//! boundaries and score the opening hook.

use clipforge_core::{CombinedHeatmap, Segment};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How far before/after the detected start the optimizer may search.
const START_SEARCH_BACK_S: f64 = 5.0;
const START_SEARCH_FWD_S: f64 = 2.0;

/// Seconds of leading audio treated as the hook.
const HOOK_SPAN_S: f64 = 3.0;

/// A silence interval reported by the audio probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SilenceInterval {
    pub start_s: f64,
    pub end_s: f64,
}

/// Duration bounds the optimizer must respect.
#[derive(Debug, Clone)]
pub struct BoundaryOptions {
    pub min_duration_s: f64,
    pub max_duration_s: f64,
}

impl Default for BoundaryOptions {
    fn default() -> Self {
        Self {
            min_duration_s: 15.0,
            max_duration_s: 60.0,
        }
    }
}

/// What kind of boundary the optimized start landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryType {
    /// Start snapped to the end of a silence interval.
    SentenceStart,
    /// Start snapped to a high-energy bucket.
    EnergyPeak,
    /// Original detector bounds kept.
    Original,
}

/// A segment with optimized bounds plus hook diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedSegment {
    #[serde(flatten)]
    pub segment: Segment,
    pub boundary_type: BoundaryType,
    /// `round(100 · energy(start, start+3))`.
    pub hook_score: i32,
    /// Signed shift of the start relative to the detector output.
    pub hook_shift_s: f64,
}

/// Optimize every segment independently, then verify the result set is
/// still non-overlapping; a conflicting segment reverts to its original
/// bounds.
pub fn optimize_segments(
    segments: &[Segment],
    heatmap: &CombinedHeatmap,
    silences: &[SilenceInterval],
    duration_s: f64,
    opts: &BoundaryOptions,
) -> Vec<OptimizedSegment> {
    let mut optimized: Vec<OptimizedSegment> = segments
        .iter()
        .map(|seg| optimize_one(seg, heatmap, silences, duration_s, opts))
        .collect();

    // Expansion can only move a start 5s back, but adjacent originals were
    // gap-separated; re-verify anyway and revert any range that now
    // collides with its predecessor.
    for i in 1..optimized.len() {
        if optimized[i].segment.start_s < optimized[i - 1].segment.end_s {
            debug!(
                index = i,
                "Optimized bounds overlap predecessor; reverting to original"
            );
            optimized[i] = passthrough(&segments[i], heatmap);
        }
    }

    optimized
}

fn optimize_one(
    segment: &Segment,
    heatmap: &CombinedHeatmap,
    silences: &[SilenceInterval],
    duration_s: f64,
    opts: &BoundaryOptions,
) -> OptimizedSegment {
    let (best_start, boundary_type) =
        find_best_start(segment, heatmap, silences, duration_s);
    let best_end = find_best_end(best_start, segment, heatmap, silences, duration_s, opts);

    // Final duration clamp; the end may not pass the video tail.
    let clamped_duration = (best_end - best_start)
        .clamp(opts.min_duration_s, opts.max_duration_s)
        .min(duration_s - best_start);
    let end_s = best_start + clamped_duration;

    let (avg, peak) = range_intensities(heatmap, best_start, end_s)
        .unwrap_or((segment.avg_intensity, segment.peak_intensity));

    OptimizedSegment {
        segment: Segment {
            id: segment.id.clone(),
            start_s: round1(best_start),
            end_s: round1(end_s),
            duration_s: round1(end_s - best_start),
            avg_intensity: round3(avg),
            peak_intensity: round3(peak),
        },
        boundary_type,
        hook_score: hook_score(heatmap, best_start),
        hook_shift_s: round1(best_start - segment.start_s),
    }
}

/// Search `[start-5, start+2]` for the strongest opening boundary.
fn find_best_start(
    segment: &Segment,
    heatmap: &CombinedHeatmap,
    silences: &[SilenceInterval],
    duration_s: f64,
) -> (f64, BoundaryType) {
    let lo = (segment.start_s - START_SEARCH_BACK_S).max(0.0);
    let hi = (segment.start_s + START_SEARCH_FWD_S).min(duration_s);

    // Keeping the original bounds scores the plain hook energy, with no
    // snap bonus.
    let mut best_start = segment.start_s;
    let mut best_type = BoundaryType::Original;
    let mut best_score = 100.0 * energy(heatmap, segment.start_s, segment.start_s + HOOK_SPAN_S);

    // A sentence boundary: the end of a silence interval.
    for silence in silences {
        let candidate = silence.end_s;
        if candidate < lo || candidate > hi {
            continue;
        }
        let score = 100.0 * energy(heatmap, candidate, candidate + HOOK_SPAN_S) + 20.0;
        if score > best_score {
            best_score = score;
            best_start = candidate;
            best_type = BoundaryType::SentenceStart;
        }
    }

    // A high-energy bucket inside the window.
    for point in &heatmap.points {
        let candidate = point.start_ms as f64 / 1000.0;
        if candidate < lo || candidate > hi || point.intensity <= 0.5 {
            continue;
        }
        let follow = energy(heatmap, candidate, candidate + HOOK_SPAN_S);
        let score = 100.0 * ((f64::from(point.intensity) + follow) / 2.0) + 10.0;
        if score > best_score {
            best_score = score;
            best_start = candidate;
            best_type = BoundaryType::EnergyPeak;
        }
    }

    (best_start, best_type)
}

/// Search `[start+min, start+max]` for the most natural ending.
fn find_best_end(
    best_start: f64,
    segment: &Segment,
    heatmap: &CombinedHeatmap,
    silences: &[SilenceInterval],
    duration_s: f64,
    opts: &BoundaryOptions,
) -> f64 {
    let lo = best_start + opts.min_duration_s;
    let hi = (best_start + opts.max_duration_s).min(duration_s);

    // Ending right where silence begins reads as a finished sentence;
    // first match wins.
    for silence in silences {
        if silence.start_s >= lo && silence.start_s <= hi {
            return silence.start_s;
        }
    }

    // Otherwise the first significant energy drop.
    let mut prev: Option<f32> = None;
    for point in &heatmap.points {
        let t = point.start_ms as f64 / 1000.0;
        if t > hi {
            break;
        }
        if t >= lo {
            if let Some(prev) = prev {
                if prev > 0.4 && point.intensity < 0.5 * prev {
                    return t;
                }
            }
        }
        prev = Some(point.intensity);
    }

    // No natural ending: keep the detector's duration inside the window.
    (best_start + segment.duration_s).clamp(lo, hi)
}

/// Mean heatmap intensity over `[from, to)`, 0.0 when nothing overlaps.
fn energy(heatmap: &CombinedHeatmap, from: f64, to: f64) -> f64 {
    heatmap.energy(from, to).map(f64::from).unwrap_or(0.0)
}

fn hook_score(heatmap: &CombinedHeatmap, start_s: f64) -> i32 {
    (100.0 * energy(heatmap, start_s, start_s + HOOK_SPAN_S)).round() as i32
}

/// Average and max intensity of the points overlapping `[start, end)`.
fn range_intensities(heatmap: &CombinedHeatmap, start_s: f64, end_s: f64) -> Option<(f32, f32)> {
    let start_ms = (start_s.max(0.0) * 1000.0) as u64;
    let end_ms = (end_s.max(0.0) * 1000.0) as u64;
    let mut sum = 0.0f32;
    let mut max = 0.0f32;
    let mut count = 0u32;
    for p in &heatmap.points {
        if p.start_ms < end_ms && p.end_ms > start_ms {
            sum += p.intensity;
            max = max.max(p.intensity);
            count += 1;
        }
    }
    (count > 0).then(|| (sum / count as f32, max))
}

/// Keep a segment exactly as the detector produced it.
fn passthrough(segment: &Segment, heatmap: &CombinedHeatmap) -> OptimizedSegment {
    OptimizedSegment {
        segment: segment.clone(),
        boundary_type: BoundaryType::Original,
        hook_score: hook_score(heatmap, segment.start_s),
        hook_shift_s: 0.0,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_core::{mint_segment_id, IntensityPoint, SignalMethod};

    fn heatmap(values: &[f32]) -> CombinedHeatmap {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &v)| IntensityPoint::new(i as u64 * 2000, (i as u64 + 1) * 2000, v))
            .collect();
        CombinedHeatmap {
            points,
            window_ms: 2000,
            methods_used: vec![SignalMethod::Audio],
        }
    }

    fn seg(start: f64, end: f64) -> Segment {
        Segment {
            id: mint_segment_id(),
            start_s: start,
            end_s: end,
            duration_s: end - start,
            avg_intensity: 0.5,
            peak_intensity: 0.8,
        }
    }

    #[test]
    fn test_start_snaps_to_silence_end() {
        // A silence interval at [98, 99] just before a segment starting
        // at 100 should pull the start to the silence end.
        let values = vec![0.6f32; 150]; // 300s of steady energy
        let map = heatmap(&values);
        let silences = vec![SilenceInterval {
            start_s: 98.0,
            end_s: 99.0,
        }];
        let out = optimize_segments(
            &[seg(100.0, 140.0)],
            &map,
            &silences,
            300.0,
            &BoundaryOptions::default(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].boundary_type, BoundaryType::SentenceStart);
        assert!((out[0].segment.start_s - 99.0).abs() < 0.11);
        assert!((out[0].hook_shift_s - -1.0).abs() < 0.11);
    }

    #[test]
    fn test_silence_outside_window_ignored() {
        let map = heatmap(&vec![0.3f32; 150]);
        let silences = vec![SilenceInterval {
            start_s: 80.0,
            end_s: 81.0,
        }];
        let out = optimize_segments(
            &[seg(100.0, 140.0)],
            &map,
            &silences,
            300.0,
            &BoundaryOptions::default(),
        );
        assert_eq!(out[0].boundary_type, BoundaryType::Original);
        assert!((out[0].segment.start_s - 100.0).abs() < 1e-9);
        assert_eq!(out[0].hook_shift_s, 0.0);
    }

    #[test]
    fn test_start_snaps_to_energy_peak() {
        // High-energy bucket at 96s inside the search window, low energy at
        // the original start.
        let mut values = vec![0.2f32; 150];
        values[48] = 0.9; // bucket starting at 96s
        values[49] = 0.9;
        let map = heatmap(&values);
        let out = optimize_segments(
            &[seg(100.0, 140.0)],
            &map,
            &[],
            300.0,
            &BoundaryOptions::default(),
        );
        assert_eq!(out[0].boundary_type, BoundaryType::EnergyPeak);
        assert!((out[0].segment.start_s - 96.0).abs() < 0.11);
    }

    #[test]
    fn test_end_prefers_silence_start() {
        let values = vec![0.6f32; 150];
        let map = heatmap(&values);
        let silences = vec![SilenceInterval {
            start_s: 130.0,
            end_s: 131.5,
        }];
        let out = optimize_segments(
            &[seg(100.0, 160.0)],
            &map,
            &silences,
            300.0,
            &BoundaryOptions::default(),
        );
        assert!((out[0].segment.end_s - 130.0).abs() < 0.11);
    }

    #[test]
    fn test_end_finds_energy_drop() {
        // Energy collapses from 0.8 to 0.2 at 130s.
        let mut values = vec![0.8f32; 150];
        for v in values.iter_mut().skip(65) {
            *v = 0.2;
        }
        let map = heatmap(&values);
        let out = optimize_segments(
            &[seg(100.0, 160.0)],
            &map,
            &[],
            300.0,
            &BoundaryOptions::default(),
        );
        assert!(
            (out[0].segment.end_s - 130.0).abs() < 2.1,
            "end was {}",
            out[0].segment.end_s
        );
    }

    #[test]
    fn test_duration_bounds_enforced() {
        let map = heatmap(&vec![0.5f32; 300]);
        let out = optimize_segments(
            &[seg(10.0, 70.0)],
            &map,
            &[],
            600.0,
            &BoundaryOptions::default(),
        );
        let d = out[0].segment.duration_s;
        assert!((15.0..=60.0).contains(&d), "duration {d} out of bounds");
    }

    #[test]
    fn test_overlap_reverts_to_original() {
        // Segment one's end stretches to a silence at 58s while segment
        // two's start snaps back to a silence ending at 56s; the optimizer
        // must resolve the collision by reverting the second segment.
        let values = vec![0.6f32; 300];
        let map = heatmap(&values);
        let silences = vec![
            SilenceInterval {
                start_s: 58.0,
                end_s: 63.0,
            },
            SilenceInterval {
                start_s: 55.2,
                end_s: 56.0,
            },
        ];
        let a = seg(0.0, 40.0);
        let b = seg(60.0, 100.0);
        let out = optimize_segments(
            &[a.clone(), b.clone()],
            &map,
            &silences,
            600.0,
            &BoundaryOptions::default(),
        );
        assert!((out[0].segment.end_s - 58.0).abs() < 0.11);
        assert_eq!(out[1].boundary_type, BoundaryType::Original);
        assert!((out[1].segment.start_s - b.start_s).abs() < 1e-9);
        assert!(
            out[1].segment.start_s >= out[0].segment.end_s,
            "post-condition violated: [{}, {}] then [{}, {}]",
            out[0].segment.start_s,
            out[0].segment.end_s,
            out[1].segment.start_s,
            out[1].segment.end_s
        );
    }

    #[test]
    fn test_hook_score_reflects_opening_energy() {
        let mut values = vec![0.1f32; 150];
        values[50] = 1.0; // strong opening bucket at 100s
        values[51] = 1.0;
        let map = heatmap(&values);
        let out = optimize_segments(
            &[seg(100.0, 130.0)],
            &map,
            &[],
            300.0,
            &BoundaryOptions::default(),
        );
        assert!(out[0].hook_score > 50, "hook was {}", out[0].hook_score);
    }
}
