//! Signal combiner: resample heterogeneous probe outputs onto one grid,
//! weight, normalize, and optionally smooth.

use clipforge_core::{CombinedHeatmap, IntensityPoint, SignalMethod, SignalSource};
use tracing::debug;

/// Options for signal fusion.
#[derive(Debug, Clone)]
pub struct CombineOptions {
    /// Width of each grid bucket in milliseconds.
    pub window_ms: u64,
    /// Centered moving-average window; `None` disables smoothing.
    pub smoothing: Option<usize>,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            window_ms: 2000,
            smoothing: Some(3),
        }
    }
}

/// Fuse weighted signal sources into one normalized heatmap.
///
/// Empty sources are dropped. A single surviving source passes through
/// unchanged. Otherwise each source is resampled onto a uniform grid with
/// bucket-max semantics, normalized, weight-summed, normalized again, and
/// optionally smoothed.
pub fn combine_signals(
    sources: Vec<SignalSource>,
    duration_ms: u64,
    opts: &CombineOptions,
) -> CombinedHeatmap {
    let mut sources: Vec<SignalSource> = sources.into_iter().filter(|s| !s.is_empty()).collect();

    if sources.is_empty() || duration_ms == 0 {
        return CombinedHeatmap::empty(opts.window_ms);
    }

    if sources.len() == 1 {
        let source = sources.remove(0);
        return CombinedHeatmap {
            points: source.points,
            window_ms: opts.window_ms,
            methods_used: vec![source.method],
        };
    }

    let window_ms = opts.window_ms.max(1);
    let buckets = duration_ms.div_ceil(window_ms) as usize;
    let mut accumulator = vec![0.0f32; buckets];
    let mut methods_used: Vec<SignalMethod> = Vec::with_capacity(sources.len() + 1);

    for source in &sources {
        let mut resampled = resample_max(&source.points, buckets, window_ms);
        normalize_in_place(&mut resampled);
        for (acc, value) in accumulator.iter_mut().zip(&resampled) {
            *acc += source.weight * value;
        }
        methods_used.push(source.method);
    }
    methods_used.push(SignalMethod::Combined);

    normalize_in_place(&mut accumulator);

    let mut values = accumulator;
    if let Some(window) = opts.smoothing {
        values = smooth(&values, window);
    }

    debug!(
        sources = sources.len(),
        buckets,
        window_ms,
        "Combined signal sources"
    );

    let points = values
        .iter()
        .enumerate()
        .map(|(i, &intensity)| {
            let start = i as u64 * window_ms;
            IntensityPoint::new(start, (start + window_ms).min(duration_ms), intensity)
        })
        .collect();

    CombinedHeatmap {
        points,
        window_ms,
        methods_used,
    }
}

/// Project points onto a uniform grid, taking the max intensity of every
/// point overlapping each bucket. Resampling an already-matching grid is a
/// no-op.
fn resample_max(points: &[IntensityPoint], buckets: usize, window_ms: u64) -> Vec<f32> {
    let mut grid = vec![0.0f32; buckets];
    for point in points {
        if point.end_ms <= point.start_ms {
            continue;
        }
        let first = (point.start_ms / window_ms) as usize;
        let last = ((point.end_ms - 1) / window_ms) as usize;
        for value in grid
            .iter_mut()
            .take(buckets.min(last + 1))
            .skip(first.min(buckets))
        {
            *value = value.max(point.intensity);
        }
    }
    grid
}

/// Min-max normalize to `[0, 1]`. A flat non-zero signal is scaled by its
/// max instead so it keeps contributing.
fn normalize_in_place(values: &mut [f32]) {
    let (mut min, mut max) = (f32::INFINITY, f32::NEG_INFINITY);
    for &v in values.iter() {
        min = min.min(v);
        max = max.max(v);
    }
    if !min.is_finite() || !max.is_finite() {
        return;
    }
    let range = max - min;
    if range > f32::EPSILON {
        for v in values.iter_mut() {
            *v = (*v - min) / range;
        }
    } else if max > f32::EPSILON {
        for v in values.iter_mut() {
            *v /= max;
        }
    }
}

/// Centered moving average; edge buckets average over what exists.
fn smooth(values: &[f32], window: usize) -> Vec<f32> {
    if window <= 1 || values.len() < 2 {
        return values.to_vec();
    }
    let half = window / 2;
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            values[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
        })
        .collect()
}

/// Default fallback fusion weight for a probe method. The viewer heatmap is
/// used alone when present, so it carries no fusion weight.
pub fn default_weight(method: SignalMethod) -> f32 {
    match method {
        SignalMethod::Audio => 1.0,
        SignalMethod::Scene => 0.6,
        SignalMethod::Comments => 1.2,
        SignalMethod::Heatmap | SignalMethod::Combined => 1.0,
    }
}
