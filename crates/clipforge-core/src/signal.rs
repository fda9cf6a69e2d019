//! Intensity signals: the common shape every probe reduces to.

use serde::{Deserialize, Serialize};

/// One time bucket of signal intensity.
///
/// Invariant: `start_ms < end_ms` and `intensity` in `[0, 1]`. A sequence of
/// points is monotonic in `start_ms` but may have gaps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntensityPoint {
    pub start_ms: u64,
    pub end_ms: u64,
    pub intensity: f32,
}

impl IntensityPoint {
    pub fn new(start_ms: u64, end_ms: u64, intensity: f32) -> Self {
        Self {
            start_ms,
            end_ms,
            intensity,
        }
    }

    /// Midpoint of the bucket in seconds.
    pub fn mid_s(&self) -> f64 {
        (self.start_ms + self.end_ms) as f64 / 2000.0
    }
}

/// Where a signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalMethod {
    Heatmap,
    Audio,
    Scene,
    Comments,
    /// Sentinel recorded alongside the contributors when more than one
    /// source went into a fused heatmap.
    Combined,
}

impl SignalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heatmap => "heatmap",
            Self::Audio => "audio",
            Self::Scene => "scene",
            Self::Comments => "comments",
            Self::Combined => "combined",
        }
    }
}

impl std::fmt::Display for SignalMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One weighted input to the signal combiner. Built per analysis request
/// and discarded after fusion.
#[derive(Debug, Clone)]
pub struct SignalSource {
    pub method: SignalMethod,
    pub weight: f32,
    pub points: Vec<IntensityPoint>,
}

impl SignalSource {
    pub fn new(method: SignalMethod, weight: f32, points: Vec<IntensityPoint>) -> Self {
        Self {
            method,
            weight,
            points,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A fused heatmap on a uniform time grid.
///
/// Every point spans exactly `window_ms` (the last one may be clipped to the
/// video duration) and intensities are min-max normalized to `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedHeatmap {
    pub points: Vec<IntensityPoint>,
    pub window_ms: u64,
    pub methods_used: Vec<SignalMethod>,
}

impl CombinedHeatmap {
    pub fn empty(window_ms: u64) -> Self {
        Self {
            points: Vec::new(),
            window_ms,
            methods_used: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Mean intensity of buckets intersecting `[start_s, end_s)`, or `None`
    /// when no bucket overlaps the range.
    pub fn energy(&self, start_s: f64, end_s: f64) -> Option<f32> {
        let start_ms = (start_s.max(0.0) * 1000.0) as u64;
        let end_ms = (end_s.max(0.0) * 1000.0) as u64;
        let mut sum = 0.0f32;
        let mut count = 0u32;
        for p in &self.points {
            if p.start_ms < end_ms && p.end_ms > start_ms {
                sum += p.intensity;
                count += 1;
            }
        }
        (count > 0).then(|| sum / count as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(values: &[f32]) -> CombinedHeatmap {
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

    #[test]
    fn test_energy_over_range() {
        let map = grid(&[0.0, 0.5, 1.0, 0.5]);
        // [2s, 6s) covers buckets 1 and 2
        let e = map.energy(2.0, 6.0).unwrap();
        assert!((e - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_energy_empty_range() {
        let map = grid(&[0.2, 0.4]);
        assert_eq!(map.energy(10.0, 12.0), None);
    }

    #[test]
    fn test_point_midpoint() {
        let p = IntensityPoint::new(1000, 3000, 0.5);
        assert!((p.mid_s() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_method_wire_names() {
        assert_eq!(SignalMethod::Heatmap.as_str(), "heatmap");
        assert_eq!(SignalMethod::Combined.as_str(), "combined");
        let json = serde_json::to_string(&SignalMethod::Comments).unwrap();
        assert_eq!(json, "\"comments\"");
    }
}
