//! Highlight segments and the naming rules around them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A selected highlight range.
///
/// Segments in a result list are strictly non-overlapping and sorted by
/// `start_s`. Times carry one decimal, intensities three.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Opaque token, unique for the process lifetime.
    pub id: String,
    pub start_s: f64,
    pub end_s: f64,
    pub duration_s: f64,
    pub avg_intensity: f32,
    pub peak_intensity: f32,
}

impl Segment {
    /// Gap in seconds between this segment and another; negative means the
    /// two ranges overlap.
    pub fn gap_to(&self, other: &Segment) -> f64 {
        (self.start_s - other.end_s).max(other.start_s - self.end_s)
    }
}

/// Mint a process-unique segment id.
pub fn mint_segment_id() -> String {
    format!("seg_{}", Uuid::new_v4().simple())
}

/// Reduce a video title to a safe file-name stem: alphanumerics, dash and
/// underscore survive, runs of anything else collapse to one underscore,
/// capped at 50 characters.
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len().min(50));
    let mut last_was_sep = true;
    for ch in title.chars() {
        if out.len() >= 50 {
            break;
        }
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    let trimmed = out.trim_end_matches('_').to_string();
    if trimmed.is_empty() {
        "clip".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_gap_between_disjoint_segments() {
        let a = seg(0.0, 20.0);
        let b = seg(50.0, 70.0);
        assert!((a.gap_to(&b) - 30.0).abs() < 1e-9);
        assert!((b.gap_to(&a) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_negative_on_overlap() {
        let a = seg(0.0, 30.0);
        let b = seg(25.0, 60.0);
        assert!(a.gap_to(&b) < 0.0);
    }

    #[test]
    fn test_segment_ids_unique() {
        let ids: Vec<_> = (0..100).map(|_| mint_segment_id()).collect();
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn test_sanitize_title_basic() {
        assert_eq!(sanitize_title("My Great Video!"), "My_Great_Video");
        assert_eq!(sanitize_title("hello"), "hello");
    }

    #[test]
    fn test_sanitize_title_collapses_runs() {
        assert_eq!(sanitize_title("a & b ?? c"), "a_b_c");
        assert_eq!(sanitize_title("beat-drop (live)"), "beat-drop_live");
    }

    #[test]
    fn test_sanitize_title_caps_length() {
        let long = "x".repeat(120);
        assert_eq!(sanitize_title(&long).len(), 50);
    }

    #[test]
    fn test_sanitize_title_empty_falls_back() {
        assert_eq!(sanitize_title("???"), "clip");
        assert_eq!(sanitize_title(""), "clip");
    }
}
