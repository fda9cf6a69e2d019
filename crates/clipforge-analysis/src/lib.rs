//! ClipForge Analysis - from raw signals to scored highlight segments.
//!
//! Pure math, no I/O: the media crate acquires signals, this crate fuses
//! them, finds peaks, snaps boundaries, and scores virality.

pub mod boundary;
pub mod combiner;
pub mod comments;
pub mod peaks;
pub mod virality;

pub use boundary::{optimize_segments, BoundaryOptions, BoundaryType, OptimizedSegment, SilenceInterval};
pub use combiner::{combine_signals, default_weight, CombineOptions};
pub use comments::{extract_comment_signal, CommentMoment, CommentSignal};
pub use peaks::{detect_segments, DetectOptions, Detection};
pub use virality::{score_segment, ViralityBreakdown};
