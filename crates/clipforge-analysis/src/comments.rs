//! Comment-timestamp extraction: viewers who write "2:31 is gold" are a
//! free engagement signal.

use clipforge_core::IntensityPoint;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static COMMENT_TIMESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})(?::(\d{2}))?\b").unwrap());

/// A "strong" comment signal covers at least this many distinct buckets and
/// lets the engine skip the audio/scene fallback download.
const STRONG_BUCKET_COUNT: usize = 5;

/// One frequently-referenced moment, for explainability in the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentMoment {
    pub time_s: u64,
    pub count: u32,
    pub sample_text: String,
}

/// Bucketed comment-timestamp signal plus ranked moments.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSignal {
    pub points: Vec<IntensityPoint>,
    pub moments: Vec<CommentMoment>,
}

impl CommentSignal {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Enough distinct moments that the fallback probes can be skipped.
    pub fn is_strong(&self) -> bool {
        self.points.len() >= STRONG_BUCKET_COUNT
    }
}

/// Extract timestamp mentions from comment texts and bucket them into a
/// normalized intensity signal.
///
/// Mentions past `duration + 5 s` are treated as typos or chapter lists and
/// dropped.
pub fn extract_comment_signal(
    comments: &[String],
    duration_s: f64,
    window_s: u64,
) -> CommentSignal {
    let window_s = window_s.max(1);
    let cutoff_s = duration_s + 5.0;
    let mut buckets: std::collections::BTreeMap<u64, (u32, String)> =
        std::collections::BTreeMap::new();

    for comment in comments {
        for caps in COMMENT_TIMESTAMP_RE.captures_iter(comment) {
            let Some(seconds) = capture_seconds(&caps) else {
                continue;
            };
            if seconds as f64 > cutoff_s {
                continue;
            }
            let bucket = seconds / window_s;
            let entry = buckets
                .entry(bucket)
                .or_insert_with(|| (0, comment.trim().to_string()));
            entry.0 += 1;
        }
    }

    if buckets.is_empty() {
        return CommentSignal {
            points: Vec::new(),
            moments: Vec::new(),
        };
    }

    let max_count = buckets.values().map(|(c, _)| *c).max().unwrap_or(1).max(1);

    let points = buckets
        .iter()
        .map(|(&bucket, &(count, _))| {
            IntensityPoint::new(
                bucket * window_s * 1000,
                (bucket + 1) * window_s * 1000,
                count as f32 / max_count as f32,
            )
        })
        .collect();

    let mut moments: Vec<CommentMoment> = buckets
        .into_iter()
        .map(|(bucket, (count, sample_text))| CommentMoment {
            time_s: bucket * window_s,
            count,
            sample_text,
        })
        .collect();
    moments.sort_by(|a, b| b.count.cmp(&a.count).then(a.time_s.cmp(&b.time_s)));

    CommentSignal { points, moments }
}

/// Turn regex captures into total seconds: `m:ss` or `h:mm:ss`.
fn capture_seconds(caps: &regex::Captures<'_>) -> Option<u64> {
    let first: u64 = caps.get(1)?.as_str().parse().ok()?;
    let second: u64 = caps.get(2)?.as_str().parse().ok()?;
    match caps.get(3) {
        Some(third) => {
            let third: u64 = third.as_str().parse().ok()?;
            Some(first * 3600 + second * 60 + third)
        }
        None => Some(first * 60 + second),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extracts_minute_second_mentions() {
        let comments = strings(&["2:31 is gold", "the bit at 2:33 killed me", "lol 2:31"]);
        let signal = extract_comment_signal(&comments, 600.0, 5);
        assert_eq!(signal.points.len(), 1); // 151s and 153s share bucket 30
        assert_eq!(signal.moments[0].count, 3);
        assert_eq!(signal.moments[0].time_s, 150);
    }

    #[test]
    fn test_extracts_hour_form() {
        let comments = strings(&["1:02:03 was wild"]);
        let signal = extract_comment_signal(&comments, 4000.0, 5);
        assert_eq!(signal.moments[0].time_s, 3720); // 3723s bucketed to 5s
    }

    #[test]
    fn test_rejects_past_duration() {
        let comments = strings(&["see 9:00 for the drop", "and 59:59 too"]);
        let signal = extract_comment_signal(&comments, 600.0, 5);
        // 540s kept (within 605s cutoff), 3599s dropped.
        assert_eq!(signal.points.len(), 1);
        assert_eq!(signal.moments[0].time_s, 540);
    }

    #[test]
    fn test_counts_normalized_to_unit_range() {
        let comments = strings(&["0:10", "0:10", "0:10", "5:00"]);
        let signal = extract_comment_signal(&comments, 600.0, 5);
        let max = signal.points.iter().map(|p| p.intensity).fold(0.0, f32::max);
        let min = signal.points.iter().map(|p| p.intensity).fold(1.0, f32::min);
        assert!((max - 1.0).abs() < 1e-6);
        assert!((min - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_timestamps_yields_empty() {
        let comments = strings(&["great video", "subscribed!"]);
        let signal = extract_comment_signal(&comments, 600.0, 5);
        assert!(signal.is_empty());
        assert!(!signal.is_strong());
    }

    #[test]
    fn test_strong_signal_needs_five_buckets() {
        let weak = extract_comment_signal(&strings(&["1:00", "2:00", "3:00"]), 600.0, 5);
        assert!(!weak.is_strong());
        let strong = extract_comment_signal(
            &strings(&["0:10", "1:00", "2:00", "3:00", "4:00", "5:00"]),
            600.0,
            5,
        );
        assert!(strong.is_strong());
    }

    #[test]
    fn test_moments_ranked_by_count() {
        let comments = strings(&["3:00", "3:00 again", "0:30"]);
        let signal = extract_comment_signal(&comments, 600.0, 5);
        assert_eq!(signal.moments[0].time_s, 180);
        assert_eq!(signal.moments[0].count, 2);
        assert_eq!(signal.moments[1].count, 1);
    }

    #[test]
    fn test_sample_text_is_first_mention() {
        let comments = strings(&["first at 1:00", "second at 1:02"]);
        let signal = extract_comment_signal(&comments, 600.0, 5);
        assert_eq!(signal.moments[0].sample_text, "first at 1:00");
    }
}
