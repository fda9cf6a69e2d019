//! Job progress snapshots, shaped for live UI consumption.

use serde::{Deserialize, Serialize};

/// Stage a job is currently in. `Done` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Downloading,
    Analyzing,
    Processing,
    Captioning,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// A snapshot of a job's state. `current_clip` is 1-based and
/// non-decreasing over a job's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub status: JobStatus,
    pub current_clip: u32,
    pub total_clips: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgress {
    /// State of a freshly submitted job, before any work starts.
    pub fn queued(total_clips: u32) -> Self {
        Self {
            status: JobStatus::Downloading,
            current_clip: 0,
            total_clips,
            message: "Queued".into(),
            files: None,
            error: None,
        }
    }

    pub fn stage(status: JobStatus, current_clip: u32, total_clips: u32, message: impl Into<String>) -> Self {
        Self {
            status,
            current_clip,
            total_clips,
            message: message.into(),
            files: None,
            error: None,
        }
    }

    pub fn done(total_clips: u32, files: Vec<String>) -> Self {
        Self {
            status: JobStatus::Done,
            current_clip: total_clips,
            total_clips,
            message: format!("Produced {} clip(s)", files.len()),
            files: Some(files),
            error: None,
        }
    }

    pub fn failed(current_clip: u32, total_clips: u32, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            status: JobStatus::Error,
            current_clip,
            total_clips,
            message: error.clone(),
            files: None,
            error: Some(error),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobProgress::done(3, vec![]).is_terminal());
        assert!(JobProgress::failed(1, 3, "boom").is_terminal());
        assert!(!JobProgress::queued(3).is_terminal());
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&JobStatus::Downloading).unwrap();
        assert_eq!(json, "\"downloading\"");
        let json = serde_json::to_string(&JobStatus::Captioning).unwrap();
        assert_eq!(json, "\"captioning\"");
    }

    #[test]
    fn test_progress_serializes_camel_case() {
        let progress = JobProgress::stage(JobStatus::Processing, 2, 5, "working");
        let json = serde_json::to_string(&progress).unwrap();
        assert!(json.contains("\"currentClip\":2"));
        assert!(json.contains("\"totalClips\":5"));
        assert!(!json.contains("files"), "None fields are omitted: {json}");
    }
}
