//! Speech capabilities: transcription, translation, and speech synthesis.
//!
//! Each capability is an external command resolved lazily on first use and
//! memoized; a resolution or invocation failure poisons the handle so later
//! clips skip the retry instead of stalling the job.

use crate::captions::SubtitleEntry;
use crate::process::{self, RunSpec};
use clipforge_core::{CancelFlag, ClipForgeError, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(180);
const TRANSLATE_TIMEOUT: Duration = Duration::from_secs(60);
const SYNTH_TIMEOUT: Duration = Duration::from_secs(60);

static SRT_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2})[,.](\d{3})")
        .unwrap()
});

enum LazyState {
    Unresolved,
    Ready(PathBuf),
    Poisoned,
}

/// A lazily-resolved external command handle.
pub struct LazyTool {
    /// Default binary name looked up on `$PATH`.
    name: &'static str,
    /// Environment variable overriding the binary path.
    env: &'static str,
    state: Mutex<LazyState>,
}

impl LazyTool {
    pub const fn new(name: &'static str, env: &'static str) -> Self {
        Self {
            name,
            env,
            state: Mutex::new(LazyState::Unresolved),
        }
    }

    /// Resolve the binary, memoizing the outcome either way.
    pub fn get(&self) -> Result<PathBuf> {
        let mut state = self.state.lock();
        match &*state {
            LazyState::Ready(path) => Ok(path.clone()),
            LazyState::Poisoned => Err(ClipForgeError::EnhancementFailure(format!(
                "{} unavailable (previous failure)",
                self.name
            ))),
            LazyState::Unresolved => {
                let resolved = std::env::var_os(self.env)
                    .map(PathBuf::from)
                    .or_else(|| which::which(self.name).ok());
                match resolved {
                    Some(path) => {
                        debug!(tool = self.name, path = %path.display(), "Resolved speech tool");
                        *state = LazyState::Ready(path.clone());
                        Ok(path)
                    }
                    None => {
                        warn!(tool = self.name, env = self.env, "Speech tool not found");
                        *state = LazyState::Poisoned;
                        Err(ClipForgeError::EnhancementFailure(format!(
                            "{} not found on PATH (set {} to override)",
                            self.name, self.env
                        )))
                    }
                }
            }
        }
    }

    /// Mark the tool unusable after a runtime failure.
    pub fn poison(&self) {
        *self.state.lock() = LazyState::Poisoned;
    }
}

/// The three speech capabilities a job may need. One kit per process; all
/// methods are enhancement-grade (failures downgrade, never abort).
pub struct SpeechKit {
    transcriber: LazyTool,
    translator: LazyTool,
    synthesizer: LazyTool,
}

impl Default for SpeechKit {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechKit {
    pub fn new() -> Self {
        Self {
            transcriber: LazyTool::new("whisper-cli", "CLIPFORGE_TRANSCRIBER"),
            translator: LazyTool::new("argos-translate", "CLIPFORGE_TRANSLATOR"),
            synthesizer: LazyTool::new("piper", "CLIPFORGE_TTS"),
        }
    }

    /// Transcribe a clip's audio. Contract: the transcriber receives the
    /// media path and prints SRT on stdout.
    pub fn transcribe(&self, clip: &Path, cancel: &CancelFlag) -> Result<Vec<SubtitleEntry>> {
        let program = self.transcriber.get()?;
        let spec = RunSpec::new(
            "transcription",
            program,
            vec![
                "--output-srt".into(),
                clip.to_string_lossy().into_owned(),
            ],
            TRANSCRIBE_TIMEOUT,
            cancel.clone(),
        );
        let out = match process::run_checked(&spec) {
            Ok(out) => out,
            Err(e) => {
                if !e.is_cancelled() {
                    self.transcriber.poison();
                }
                return Err(e);
            }
        };
        let entries = parse_srt(&out.stdout);
        if entries.is_empty() {
            return Err(ClipForgeError::EnhancementFailure(
                "transcription produced no entries".into(),
            ));
        }
        Ok(entries)
    }

    /// Translate entries line by line. Contract: each entry is passed as
    /// one argv item and the translator prints one translated line per
    /// entry on stdout.
    pub fn translate(
        &self,
        entries: &[SubtitleEntry],
        target_lang: &str,
        cancel: &CancelFlag,
    ) -> Result<Vec<SubtitleEntry>> {
        let program = self.translator.get()?;
        let mut args = vec!["--to".into(), target_lang.to_string()];
        args.extend(entries.iter().map(|e| e.text.replace('\n', " ")));

        let spec = RunSpec::new(
            "translation",
            program,
            args,
            TRANSLATE_TIMEOUT,
            cancel.clone(),
        );
        let out = match process::run_checked(&spec) {
            Ok(out) => out,
            Err(e) => {
                if !e.is_cancelled() {
                    self.translator.poison();
                }
                return Err(e);
            }
        };

        let lines: Vec<&str> = out.stdout.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() != entries.len() {
            return Err(ClipForgeError::EnhancementFailure(format!(
                "translation line count mismatch: {} in, {} out",
                entries.len(),
                lines.len()
            )));
        }

        Ok(entries
            .iter()
            .zip(lines)
            .map(|(entry, line)| SubtitleEntry {
                start_s: entry.start_s,
                end_s: entry.end_s,
                text: line.trim().to_string(),
            })
            .collect())
    }

    /// Synthesize one entry's speech into a WAV file.
    pub fn synthesize(&self, text: &str, output: &Path, cancel: &CancelFlag) -> Result<()> {
        let program = self.synthesizer.get()?;
        let spec = RunSpec::new(
            "speech synthesis",
            program,
            vec![
                "--text".into(),
                text.to_string(),
                "--output_file".into(),
                output.to_string_lossy().into_owned(),
            ],
            SYNTH_TIMEOUT,
            cancel.clone(),
        );
        if let Err(e) = process::run_checked(&spec) {
            if !e.is_cancelled() {
                self.synthesizer.poison();
            }
            return Err(e);
        }
        if output.exists() {
            Ok(())
        } else {
            Err(ClipForgeError::EnhancementFailure(
                "synthesizer produced no file".into(),
            ))
        }
    }
}

/// Parse SRT text into subtitle entries.
pub fn parse_srt(srt: &str) -> Vec<SubtitleEntry> {
    let mut entries = Vec::new();
    let mut lines = srt.lines().peekable();

    while let Some(line) = lines.next() {
        let Some(caps) = SRT_TIME_RE.captures(line) else {
            continue;
        };
        let ts = |h: usize, m: usize, s: usize, ms: usize| -> f64 {
            let get = |i: usize| caps[i].parse::<f64>().unwrap_or(0.0);
            get(h) * 3600.0 + get(m) * 60.0 + get(s) + get(ms) / 1000.0
        };
        let start_s = ts(1, 2, 3, 4);
        let end_s = ts(5, 6, 7, 8);

        let mut text_lines = Vec::new();
        while let Some(next) = lines.peek() {
            if next.trim().is_empty() {
                break;
            }
            text_lines.push(lines.next().unwrap_or_default().trim().to_string());
        }
        let text = text_lines.join(" ");
        if !text.is_empty() && end_s > start_s {
            entries.push(SubtitleEntry {
                start_s,
                end_s,
                text,
            });
        }
    }
    entries
}
