//! Shared server state with a lazily-built engine.
//!
//! Tool resolution is attempted at startup for a fast warning, but a
//! missing binary only becomes a hard (502) error when a request actually
//! needs the engine, so installing yt-dlp and retrying requires no
//! restart.

use clipforge_core::Result;
use clipforge_engine::{Engine, ProgressHub};
use clipforge_media::{ToolOverrides, ToolPaths};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

struct StateInner {
    overrides: ToolOverrides,
    output_dir: PathBuf,
    temp_dir: PathBuf,
    hub: Arc<ProgressHub>,
    engine: Mutex<Option<Engine>>,
}

/// Cloneable handle threaded through every request handler.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

impl AppState {
    pub fn new(
        overrides: ToolOverrides,
        output_dir: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(StateInner {
                overrides,
                output_dir: output_dir.into(),
                temp_dir: temp_dir.into(),
                hub: Arc::new(ProgressHub::new()),
                engine: Mutex::new(None),
            }),
        }
    }

    /// Try to build the engine now so startup logs show missing tools.
    pub fn warm_up(&self) {
        if let Err(e) = self.engine() {
            warn!(error = %e, "External tools not ready; requests will fail until they are");
        }
    }

    /// The progress hub, live even while the engine cannot be built.
    pub fn hub(&self) -> Arc<ProgressHub> {
        Arc::clone(&self.inner.hub)
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.inner.output_dir
    }

    pub fn temp_dir(&self) -> &PathBuf {
        &self.inner.temp_dir
    }

    /// Get or build the engine; each call retries resolution after an
    /// earlier failure.
    pub fn engine(&self) -> Result<Engine> {
        let mut slot = self.inner.engine.lock();
        if let Some(engine) = slot.as_ref() {
            return Ok(engine.clone());
        }
        let tools = ToolPaths::resolve(&self.inner.overrides)?;
        let engine = Engine::new(
            Arc::clone(&self.inner.hub),
            tools,
            self.inner.output_dir.clone(),
            self.inner.temp_dir.clone(),
        );
        *slot = Some(engine.clone());
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_memoized_once_built() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = ToolOverrides {
            downloader: Some(PathBuf::from("/bin/true")),
            transcoder: Some(PathBuf::from("/bin/true")),
            ffprobe: Some(PathBuf::from("/bin/true")),
        };
        let state = AppState::new(overrides, dir.path().join("out"), dir.path().join("tmp"));
        let first = state.engine().unwrap();
        let second = state.engine().unwrap();
        assert_eq!(first.output_dir(), second.output_dir());
    }

    #[test]
    fn test_hub_available_without_engine() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(
            ToolOverrides::default(),
            dir.path().join("out"),
            dir.path().join("tmp"),
        );
        let job = state.hub().submit(1);
        assert!(state.hub().get(job.id).is_some());
    }
}
