//! Timestamp parsing and formatting.
//!
//! Three places in the pipeline care about clock text: comment timestamps
//! (`1:23`, `01:02:03`, bare seconds), progress messages and output file
//! names (`m:ss`, `{m}m{SS}s`), and ASS subtitle events (`H:MM:SS.cc`).

use once_cell::sync::Lazy;
use regex::Regex;

static TIMESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(\d{1,2}):)?(\d{1,2}):(\d{2})$|^(\d+)$").unwrap());

/// Parse `"h:mm:ss"`, `"m:ss"`, or a bare integer second count.
///
/// Returns the total number of seconds, or `None` for anything that is not
/// one of those three literal shapes. Minute/second fields above 59 are
/// rejected in the colon forms.
pub fn parse_timestamp(text: &str) -> Option<u64> {
    let caps = TIMESTAMP_RE.captures(text.trim())?;

    if let Some(secs) = caps.get(4) {
        return secs.as_str().parse().ok();
    }

    let minutes: u64 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: u64 = caps.get(3)?.as_str().parse().ok()?;
    if seconds > 59 {
        return None;
    }

    match caps.get(1) {
        Some(hours) => {
            if minutes > 59 {
                return None;
            }
            let hours: u64 = hours.as_str().parse().ok()?;
            Some(hours * 3600 + minutes * 60 + seconds)
        }
        None => Some(minutes * 60 + seconds),
    }
}

/// Format seconds as `m:ss` (minutes unbounded).
pub fn format_mmss(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Format a clip start time as the `{m}m{SS}s` file-name token.
pub fn format_clip_token(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{}m{:02}s", total / 60, total % 60)
}

/// Format seconds as the ASS `H:MM:SS.cc` timestamp.
pub fn format_ass_time(seconds: f64) -> String {
    let clamped = seconds.max(0.0);
    let centis = (clamped * 100.0).round() as u64;
    let (cs, total_secs) = (centis % 100, centis / 100);
    format!(
        "{}:{:02}:{:02}.{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        cs
    )
}
