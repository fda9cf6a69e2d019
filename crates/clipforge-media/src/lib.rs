//! ClipForge Media - everything that talks to external media tooling.
//!
//! The downloader (yt-dlp) and transcoder (FFmpeg) are external
//! collaborators with fixed contracts: this crate owns binary resolution,
//! supervised spawning with timeout/cancel semantics, and the parsers for
//! what those tools print.

pub mod audio_probe;
pub mod captions;
pub mod downloader;
pub mod process;
pub mod reframe;
pub mod scene_probe;
pub mod speech;
pub mod tools;
pub mod transcode;

pub use audio_probe::{analyze_audio, AudioAnalysis};
pub use captions::{CaptionAnimation, CaptionPosition, CaptionStyle, SubtitleEntry};
pub use downloader::VideoInfo;
pub use reframe::analyze_reframe;
pub use scene_probe::scene_signal;
pub use speech::{LazyTool, SpeechKit};
pub use tools::{ToolOverrides, ToolPaths};
pub use transcode::{CropKeyframe, CropMode, Quality, TranscodePlan};
