//! Peak detection: adaptive thresholding, zone merging, candidate sizing,
//! and greedy non-overlapping selection.

use clipforge_core::{mint_segment_id, CombinedHeatmap, IntensityPoint, Segment};
use tracing::debug;

/// Consecutive above-threshold markers closer than this merge into one zone.
const ZONE_MERGE_GAP_MS: u64 = 3000;

/// The adaptive threshold keeps relaxing until at least this many markers
/// survive (or the floor is hit).
const MIN_MARKERS: usize = 5;

/// Options for segment detection.
#[derive(Debug, Clone)]
pub struct DetectOptions {
    pub top_n: usize,
    pub min_duration_s: f64,
    pub max_duration_s: f64,
    pub min_gap_s: f64,
    pub intensity_threshold: f32,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            top_n: 5,
            min_duration_s: 15.0,
            max_duration_s: 60.0,
            min_gap_s: 30.0,
            intensity_threshold: 0.6,
        }
    }
}

/// Outcome of a detection run, with diagnostics for the API `detection`
/// block.
#[derive(Debug, Clone)]
pub struct Detection {
    pub segments: Vec<Segment>,
    /// Threshold that finally produced markers.
    pub threshold_used: f32,
    /// True when the relaxed-gap pass admitted at least one segment, which
    /// weakens the `min_gap_s` guarantee.
    pub relaxed: bool,
}

/// A contiguous above-threshold region of the heatmap.
#[derive(Debug)]
struct Zone {
    start_ms: u64,
    end_ms: u64,
    intensities: Vec<f32>,
    peak_intensity: f32,
    peak_time_ms: u64,
}

/// A sized, peak-centered range that has not yet survived selection.
#[derive(Debug, Clone)]
struct Candidate {
    start_s: f64,
    end_s: f64,
    avg_intensity: f32,
    peak_intensity: f32,
    score: f64,
}

/// Detect the top highlight segments of a combined heatmap.
pub fn detect_segments(
    heatmap: &CombinedHeatmap,
    duration_s: f64,
    opts: &DetectOptions,
) -> Detection {
    let (markers, threshold_used) = adaptive_markers(&heatmap.points, opts.intensity_threshold);
    if markers.is_empty() {
        return Detection {
            segments: Vec::new(),
            threshold_used,
            relaxed: false,
        };
    }

    let max_span_ms = (opts.max_duration_s * 1000.0) as u64;
    let zones: Vec<Zone> = merge_zones(&markers)
        .into_iter()
        .flat_map(|z| split_oversized(z, max_span_ms))
        .collect();
    debug!(
        markers = markers.len(),
        zones = zones.len(),
        threshold = threshold_used,
        "Extracted peak zones"
    );

    let mut candidates: Vec<Candidate> = zones
        .iter()
        .map(|z| size_candidate(z, duration_s, opts))
        .collect();

    // Stable sort keeps zone order for equal scores.
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let (mut selected, relaxed) = select_greedy(&candidates, opts);

    selected.sort_by(|a, b| a.start_s.partial_cmp(&b.start_s).unwrap_or(std::cmp::Ordering::Equal));

    let segments = selected
        .into_iter()
        .map(|c| Segment {
            id: mint_segment_id(),
            start_s: round1(c.start_s),
            end_s: round1(c.end_s),
            duration_s: round1(c.end_s - c.start_s),
            avg_intensity: round3(c.avg_intensity),
            peak_intensity: round3(c.peak_intensity),
        })
        .collect();

    Detection {
        segments,
        threshold_used,
        relaxed,
    }
}

/// Relax the threshold in 0.1 steps until enough markers survive.
fn adaptive_markers(points: &[IntensityPoint], start_threshold: f32) -> (Vec<IntensityPoint>, f32) {
    let mut threshold = start_threshold;
    loop {
        let markers: Vec<IntensityPoint> = points
            .iter()
            .filter(|p| p.intensity >= threshold)
            .copied()
            .collect();
        if markers.len() >= MIN_MARKERS || threshold <= 0.2 + 1e-6 {
            return (markers, threshold);
        }
        threshold -= 0.1;
    }
}

/// Merge time-adjacent markers (gap ≤ 3 s) into zones.
fn merge_zones(markers: &[IntensityPoint]) -> Vec<Zone> {
    let mut zones: Vec<Zone> = Vec::new();
    for marker in markers {
        match zones.last_mut() {
            Some(zone) if marker.start_ms.saturating_sub(zone.end_ms) <= ZONE_MERGE_GAP_MS => {
                zone.end_ms = zone.end_ms.max(marker.end_ms);
                zone.intensities.push(marker.intensity);
                if marker.intensity > zone.peak_intensity {
                    zone.peak_intensity = marker.intensity;
                    zone.peak_time_ms = (marker.start_ms + marker.end_ms) / 2;
                }
            }
            _ => zones.push(Zone {
                start_ms: marker.start_ms,
                end_ms: marker.end_ms,
                intensities: vec![marker.intensity],
                peak_intensity: marker.intensity,
                peak_time_ms: (marker.start_ms + marker.end_ms) / 2,
            }),
        }
    }
    zones
}

/// A zone longer than the maximum clip duration cannot center one clip on
/// one peak; carve it into consecutive max-duration sub-zones, each with its
/// own local peak. A flat, always-hot signal thereby still yields several
/// uniformly spaced candidates instead of collapsing into one.
fn split_oversized(zone: Zone, max_span_ms: u64) -> Vec<Zone> {
    if zone.end_ms - zone.start_ms <= max_span_ms {
        return vec![zone];
    }

    // Reconstruct per-marker extents: intensities are stored in marker
    // order, spread evenly across the zone span.
    let count = zone.intensities.len().max(1) as u64;
    let step = (zone.end_ms - zone.start_ms) / count;
    let mut pieces: Vec<Zone> = Vec::new();

    for (i, &intensity) in zone.intensities.iter().enumerate() {
        let start_ms = zone.start_ms + i as u64 * step;
        let end_ms = if i as u64 == count - 1 {
            zone.end_ms
        } else {
            start_ms + step
        };
        let mid_ms = (start_ms + end_ms) / 2;
        match pieces.last_mut() {
            Some(piece) if end_ms - piece.start_ms <= max_span_ms => {
                piece.end_ms = end_ms;
                piece.intensities.push(intensity);
                if intensity > piece.peak_intensity {
                    piece.peak_intensity = intensity;
                    piece.peak_time_ms = mid_ms;
                }
            }
            _ => pieces.push(Zone {
                start_ms,
                end_ms,
                intensities: vec![intensity],
                peak_intensity: intensity,
                peak_time_ms: mid_ms,
            }),
        }
    }

    pieces
}

/// Expand or shrink a zone symmetrically around its peak so the candidate
/// lands inside the duration bounds, shifting off video edges when clipped.
fn size_candidate(zone: &Zone, duration_s: f64, opts: &DetectOptions) -> Candidate {
    let mut start_s = zone.start_ms as f64 / 1000.0;
    let mut end_s = zone.end_ms as f64 / 1000.0;
    let peak_s = zone.peak_time_ms as f64 / 1000.0;

    let zone_duration = end_s - start_s;
    if zone_duration < opts.min_duration_s {
        let half = opts.min_duration_s / 2.0;
        (start_s, end_s) = center_on(peak_s, half, duration_s);
    } else if zone_duration > opts.max_duration_s {
        let half = opts.max_duration_s / 2.0;
        (start_s, end_s) = center_on(peak_s, half, duration_s);
    }

    let avg = zone.intensities.iter().sum::<f32>() / zone.intensities.len() as f32;
    let duration = end_s - start_s;
    let score = f64::from(avg)
        + 0.3 * f64::from(zone.peak_intensity)
        + 0.1 * (duration / opts.max_duration_s).min(1.0);

    Candidate {
        start_s,
        end_s,
        avg_intensity: avg,
        peak_intensity: zone.peak_intensity,
        score,
    }
}

/// Center a `2·half` second range on `peak_s`, sliding it inward when a
/// video boundary clips one edge.
fn center_on(peak_s: f64, half: f64, duration_s: f64) -> (f64, f64) {
    let mut start = peak_s - half;
    let mut end = peak_s + half;
    if start < 0.0 {
        end = (end - start).min(duration_s);
        start = 0.0;
    }
    if end > duration_s {
        start = (start - (end - duration_s)).max(0.0);
        end = duration_s;
    }
    (start, end)
}

/// Greedy selection in score order under the gap constraint, with a single
/// relaxed pass when the strict pass comes up short.
fn select_greedy(candidates: &[Candidate], opts: &DetectOptions) -> (Vec<Candidate>, bool) {
    let mut selected: Vec<Candidate> = Vec::with_capacity(opts.top_n);
    let mut taken = vec![false; candidates.len()];

    admit_pass(candidates, &mut selected, &mut taken, opts.min_gap_s, opts.top_n);

    let mut relaxed = false;
    if selected.len() < opts.top_n && taken.iter().any(|t| !t) {
        let relaxed_gap = (opts.min_gap_s / 2.0).max(10.0);
        let before = selected.len();
        admit_pass(candidates, &mut selected, &mut taken, relaxed_gap, opts.top_n);
        relaxed = selected.len() > before;
        if relaxed {
            debug!(gap = relaxed_gap, "Relaxed gap pass admitted extra segments");
        }
    }

    (selected, relaxed)
}

fn admit_pass(
    candidates: &[Candidate],
    selected: &mut Vec<Candidate>,
    taken: &mut [bool],
    gap_s: f64,
    top_n: usize,
) {
    for (i, candidate) in candidates.iter().enumerate() {
        if selected.len() >= top_n {
            break;
        }
        if taken[i] {
            continue;
        }
        let clears_gap = selected.iter().all(|s| {
            (candidate.start_s - s.end_s).max(s.start_s - candidate.end_s) >= gap_s
        });
        if clears_gap {
            taken[i] = true;
            selected.push(candidate.clone());
        }
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
    use clipforge_core::SignalMethod;

    /// Build a uniform 2s-bucket heatmap from intensities.
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

    /// 600s baseline-0.2 heatmap with 10s bumps at the given (start_s,
    /// intensity) pairs.
    fn bumpy(bumps: &[(usize, f32)]) -> CombinedHeatmap {
        let mut values = vec![0.2f32; 300];
        for &(start_s, intensity) in bumps {
            for bucket in start_s / 2..(start_s + 10) / 2 {
                values[bucket] = intensity;
            }
        }
        heatmap(&values)
    }

    #[test]
    fn test_well_spaced_peaks_all_selected() {
        let map = bumpy(&[(100, 0.9), (250, 0.95), (410, 0.92), (520, 0.88)]);
        let detection = detect_segments(&map, 600.0, &DetectOptions::default());
        let segs = &detection.segments;

        assert_eq!(segs.len(), 4, "expected one segment per bump");
        for seg in segs {
            assert!(seg.duration_s >= 15.0 - 0.1);
            assert!(seg.duration_s <= 60.0 + 0.1);
            assert!(seg.start_s >= 0.0 && seg.end_s <= 600.0);
        }
        for pair in segs.windows(2) {
            assert!(
                pair[1].start_s - pair[0].end_s >= 30.0,
                "gap violated between {} and {}",
                pair[0].end_s,
                pair[1].start_s
            );
        }
        // Each segment centers near its bump.
        let centers: Vec<f64> = segs.iter().map(|s| (s.start_s + s.end_s) / 2.0).collect();
        for (center, expected) in centers.iter().zip([105.0, 255.0, 415.0, 525.0]) {
            assert!(
                (center - expected).abs() < 10.0,
                "center {center} should be near {expected}"
            );
        }
    }

    #[test]
    fn test_threshold_relaxes_below_default() {
        // Everything at 0.55, below the 0.6 default threshold.
        let map = heatmap(&[0.55; 300]);
        let detection = detect_segments(&map, 600.0, &DetectOptions::default());
        assert!(detection.threshold_used < 0.6);
        assert_eq!(detection.segments.len(), 5);
        for pair in detection.segments.windows(2) {
            assert!(pair[1].start_s >= pair[0].end_s);
        }
    }

    #[test]
    fn test_nearby_peaks_merge_into_one_zone() {
        // Bumps at 100s and 101s with a sub-3s gap merge into one zone.
        let mut values = vec![0.1f32; 300];
        values[50] = 0.9; // [100,102)
        values[51] = 0.85; // [102,104), adjacent, same zone
        let map = heatmap(&values);
        let detection = detect_segments(&map, 600.0, &DetectOptions::default());
        assert_eq!(detection.segments.len(), 1);
        let seg = &detection.segments[0];
        let center = (seg.start_s + seg.end_s) / 2.0;
        assert!((center - 101.0).abs() < 2.0, "center was {center}");
    }

    #[test]
    fn test_empty_heatmap_empty_result() {
        let map = heatmap(&[]);
        let detection = detect_segments(&map, 600.0, &DetectOptions::default());
        assert!(detection.segments.is_empty());
    }

    #[test]
    fn test_all_zero_heatmap_empty_result() {
        let map = heatmap(&[0.0; 100]);
        let detection = detect_segments(&map, 200.0, &DetectOptions::default());
        assert!(detection.segments.is_empty());
    }

    #[test]
    fn test_candidate_expands_around_early_peak() {
        // A single 2s spike at t=2s must still produce a >=15s segment
        // clamped to the video start.
        let mut values = vec![0.1f32; 100];
        values[1] = 0.95;
        let map = heatmap(&values);
        let detection = detect_segments(&map, 200.0, &DetectOptions::default());
        assert_eq!(detection.segments.len(), 1);
        let seg = &detection.segments[0];
        assert!(seg.start_s >= 0.0);
        assert!(seg.duration_s >= 15.0 - 0.1);
    }

    #[test]
    fn test_oversized_zone_shrinks_to_max() {
        // 80s of continuous high intensity collapses to max_duration
        // centered on its peak.
        let mut values = vec![0.1f32; 300];
        for v in values.iter_mut().take(90).skip(50) {
            *v = 0.8;
        }
        values[70] = 0.95;
        let map = heatmap(&values);
        let detection = detect_segments(&map, 600.0, &DetectOptions::default());
        assert_eq!(detection.segments.len(), 1);
        let seg = &detection.segments[0];
        assert!(seg.duration_s <= 60.0 + 0.1);
        assert!(
            seg.start_s <= 141.0 && 141.0 <= seg.end_s,
            "peak time must stay inside the selected segment, got [{}, {}]",
            seg.start_s,
            seg.end_s
        );
        assert!((seg.peak_intensity - 0.95).abs() < 1e-3);
    }

    #[test]
    fn test_relaxed_pass_reported() {
        // Three peaks 20s apart: strict 30s gap can pick only one of the
        // cluster, relaxation (gap 15) admits more.
        let mut values = vec![0.1f32; 300];
        values[50] = 0.9;
        values[60] = 0.88;
        values[70] = 0.86;
        let map = heatmap(&values);
        let opts = DetectOptions {
            top_n: 3,
            ..Default::default()
        };
        let detection = detect_segments(&map, 600.0, &opts);
        assert!(detection.segments.len() > 1);
        assert!(detection.relaxed);
    }

    #[test]
    fn test_output_rounding() {
        let map = bumpy(&[(100, 0.9)]);
        let detection = detect_segments(&map, 600.0, &DetectOptions::default());
        for seg in &detection.segments {
            assert!(((seg.start_s * 10.0).round() - seg.start_s * 10.0).abs() < 1e-9);
            let scaled = seg.avg_intensity * 1000.0;
            assert!((scaled.round() - scaled).abs() < 1e-3);
        }
    }
}
