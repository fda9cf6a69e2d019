//! ClipForge Core - Foundation types for the highlight pipeline
//!
//! This crate provides the fundamental types used throughout ClipForge:
//! - Intensity signals and sources (the currency of peak detection)
//! - Segments (selected highlight ranges)
//! - Timestamp parsing and formatting
//! - Cancellation handles and the error taxonomy

pub mod cancel;
pub mod error;
pub mod segment;
pub mod signal;
pub mod time;

pub use cancel::CancelFlag;
pub use error::{ClipForgeError, Result};
pub use segment::{mint_segment_id, sanitize_title, Segment};
pub use signal::{CombinedHeatmap, IntensityPoint, SignalMethod, SignalSource};
pub use time::{format_ass_time, format_clip_token, format_mmss, parse_timestamp};
