//! Resolution of the external tool binaries.
//!
//! Order of preference: explicit override (config/env) → `$PATH` lookup →
//! for the transcoder only, an automatic ffmpeg-sidecar download.

use clipforge_core::{ClipForgeError, Result};
use std::path::PathBuf;
use tracing::{info, warn};

/// Explicit binary locations, typically from `CLIPFORGE_*` env vars.
#[derive(Debug, Clone, Default)]
pub struct ToolOverrides {
    pub downloader: Option<PathBuf>,
    pub transcoder: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

/// Resolved binaries for one process lifetime.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    /// yt-dlp or compatible.
    pub downloader: PathBuf,
    /// ffmpeg or compatible.
    pub transcoder: PathBuf,
    pub ffprobe: PathBuf,
}

impl ToolPaths {
    /// Resolve all three binaries or explain what is missing.
    pub fn resolve(overrides: &ToolOverrides) -> Result<Self> {
        let downloader = match &overrides.downloader {
            Some(path) => path.clone(),
            None => which::which("yt-dlp").map_err(|_| {
                ClipForgeError::UpstreamUnavailable(
                    "yt-dlp not found on PATH (set CLIPFORGE_YTDLP to override)".into(),
                )
            })?,
        };

        let transcoder = match &overrides.transcoder {
            Some(path) => path.clone(),
            None => match which::which("ffmpeg") {
                Ok(path) => path,
                Err(_) => provision_ffmpeg()?,
            },
        };

        let ffprobe = match &overrides.ffprobe {
            Some(path) => path.clone(),
            None => which::which("ffprobe").unwrap_or_else(|_| sibling(&transcoder, "ffprobe")),
        };

        info!(
            downloader = %downloader.display(),
            transcoder = %transcoder.display(),
            ffprobe = %ffprobe.display(),
            "Resolved external tools"
        );

        Ok(Self {
            downloader,
            transcoder,
            ffprobe,
        })
    }
}

/// Download a static FFmpeg build next to the executable when the system
/// has none.
fn provision_ffmpeg() -> Result<PathBuf> {
    warn!("ffmpeg not found on PATH; downloading a static build");
    ffmpeg_sidecar::download::auto_download().map_err(|e| {
        ClipForgeError::UpstreamUnavailable(format!(
            "ffmpeg not found and automatic download failed: {e}"
        ))
    })?;
    Ok(ffmpeg_sidecar::paths::ffmpeg_path())
}

/// `ffprobe` ships beside `ffmpeg` in every static build.
fn sibling(transcoder: &std::path::Path, name: &str) -> PathBuf {
    let file = if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    };
    transcoder
        .parent()
        .map(|dir| dir.join(&file))
        .unwrap_or_else(|| PathBuf::from(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win_over_path_lookup() {
        let overrides = ToolOverrides {
            downloader: Some(PathBuf::from("/opt/yt-dlp")),
            transcoder: Some(PathBuf::from("/opt/ffmpeg")),
            ffprobe: Some(PathBuf::from("/opt/ffprobe")),
        };
        let tools = ToolPaths::resolve(&overrides).unwrap();
        assert_eq!(tools.downloader, PathBuf::from("/opt/yt-dlp"));
        assert_eq!(tools.transcoder, PathBuf::from("/opt/ffmpeg"));
        assert_eq!(tools.ffprobe, PathBuf::from("/opt/ffprobe"));
    }

    #[test]
    fn test_sibling_path_derivation() {
        let probe = sibling(std::path::Path::new("/usr/local/bin/ffmpeg"), "ffprobe");
        assert!(probe.ends_with("ffprobe") || probe.ends_with("ffprobe.exe"));
        assert!(probe.starts_with("/usr/local/bin"));
    }
}
