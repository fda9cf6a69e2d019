//! Error types for ClipForge.

use thiserror::Error;

/// Main error type for ClipForge operations.
#[derive(Error, Debug)]
pub enum ClipForgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid client input. Surfaces as a 4xx and never enters a job.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The downloader or transcoder binary is missing or failed to start.
    #[error("Upstream tool unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A signal probe returned no usable data. Absorbed by the combiner.
    #[error("Probe produced no data: {0}")]
    ProbeEmpty(String),

    /// The downloader rejected a sectioned fetch. Internal: triggers the
    /// full-download fallback and is never surfaced to clients.
    #[error("Partial fetch unsupported by downloader")]
    PartialFetchUnsupported,

    /// Fatal failure while producing one clip. The job continues with the
    /// remaining clips.
    #[error("Clip failed: {0}")]
    ClipFailure(String),

    /// Captioning, translation, or dubbing failed. The clip is still
    /// delivered without the enhancement.
    #[error("Enhancement failed: {0}")]
    EnhancementFailure(String),

    #[error("{what} timed out after {seconds}s")]
    Timeout { what: String, seconds: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClipForgeError {
    /// True for errors that abort the whole job rather than one stage.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for ClipForge operations.
pub type Result<T> = std::result::Result<T, ClipForgeError>;
