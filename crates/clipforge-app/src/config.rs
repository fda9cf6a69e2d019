//! Server configuration from environment variables.

use clipforge_media::ToolOverrides;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Runtime configuration, environment-driven with working defaults.
///
/// | Variable | Meaning | Default |
/// |---|---|---|
/// | `CLIPFORGE_BIND` | listen address | `127.0.0.1:3000` |
/// | `CLIPFORGE_OUTPUT_DIR` | final clip directory | `./output` |
/// | `CLIPFORGE_TEMP_DIR` | per-job scratch | `./temp` |
/// | `CLIPFORGE_YTDLP` | downloader binary | `$PATH` lookup |
/// | `CLIPFORGE_FFMPEG` | transcoder binary | `$PATH` / auto-download |
/// | `CLIPFORGE_FFPROBE` | probe binary | `$PATH` / sibling |
/// | `CLIPFORGE_LOG` | tracing filter | `info` |
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind: SocketAddr,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub log_filter: String,
    #[serde(skip)]
    pub tool_overrides: ToolOverrides,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".parse().expect("static address"),
            output_dir: PathBuf::from("output"),
            temp_dir: PathBuf::from("temp"),
            log_filter: "info".into(),
            tool_overrides: ToolOverrides::default(),
        }
    }
}

impl Config {
    /// Assemble from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(bind) = std::env::var("CLIPFORGE_BIND") {
            config.bind = bind
                .parse()
                .map_err(|e| anyhow::anyhow!("CLIPFORGE_BIND '{bind}': {e}"))?;
        }
        if let Ok(dir) = std::env::var("CLIPFORGE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("CLIPFORGE_TEMP_DIR") {
            config.temp_dir = PathBuf::from(dir);
        }
        if let Ok(filter) = std::env::var("CLIPFORGE_LOG") {
            config.log_filter = filter;
        }
        config.tool_overrides = ToolOverrides {
            downloader: std::env::var_os("CLIPFORGE_YTDLP").map(PathBuf::from),
            transcoder: std::env::var_os("CLIPFORGE_FFMPEG").map(PathBuf::from),
            ffprobe: std::env::var_os("CLIPFORGE_FFPROBE").map(PathBuf::from),
        };
        Ok(config)
    }
}
