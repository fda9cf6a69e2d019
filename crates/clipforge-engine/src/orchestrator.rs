//! Job orchestrator: the per-clip pipeline.
//!
//! Each job runs on a dedicated worker thread and walks its segments
//! sequentially through download → optional reframe analysis → transcode →
//! optional caption/translate/dub. Download and transcode failures are
//! fatal for that clip only; enhancement failures downgrade the clip.

use crate::analyze::{analyze_url, AnalyzeSettings};
use crate::hub::{JobHandle, ProgressHub};
use crate::progress::{JobProgress, JobStatus};
use clipforge_core::{
    format_clip_token, format_mmss, sanitize_title, CancelFlag, ClipForgeError, Result, Segment,
};
use clipforge_media::{
    captions::{self, CaptionStyle, SubtitleEntry},
    downloader::{self, VideoInfo},
    reframe, transcode,
    transcode::{CropMode, Quality, TranscodePlan},
    SpeechKit, ToolPaths,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Extra media fetched on both sides of a segment so boundary-snapped cuts
/// never run out of frames.
const FETCH_BUFFER_S: f64 = 3.0;

/// Hard cap on synthesized dub lines per clip.
const MAX_DUB_LINES: usize = 32;

/// Batch jobs accept at most this many URLs.
const MAX_BATCH_URLS: usize = 20;

/// What to do with a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslateMode {
    /// Translated text goes into the caption overlay.
    #[default]
    Captions,
    /// Translated text is synthesized and mixed over the original audio.
    Dub,
}

/// A user-submitted cut job.
#[derive(Debug, Clone)]
pub struct CutRequest {
    pub url: String,
    pub video_title: String,
    pub segments: Vec<Segment>,
    pub crop_mode: CropMode,
    /// Caption preset name; `None` or `"off"` disables the overlay.
    pub captions: Option<String>,
    pub quality: Quality,
    pub translate_to: Option<String>,
    pub translate_mode: TranslateMode,
    /// Client-edited subtitles, clip-relative, keyed by segment id.
    pub edited_subtitles: HashMap<String, Vec<SubtitleEntry>>,
}

impl CutRequest {
    fn caption_style(&self) -> Option<CaptionStyle> {
        self.captions
            .as_deref()
            .filter(|name| *name != "off")
            .and_then(CaptionStyle::preset)
    }

    fn wants_enhancement(&self) -> bool {
        self.caption_style().is_some() || self.translate_to.is_some()
    }
}

/// A batch of URLs processed with shared settings.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub urls: Vec<String>,
    pub settings: AnalyzeSettings,
    pub crop_mode: CropMode,
    pub captions: Option<String>,
}

/// Per-job one-shot caches, reset at submit and dropped at completion so
/// concurrent jobs stay isolated.
#[derive(Default)]
struct JobCaches {
    full_video: Option<PathBuf>,
    subtitles: Option<Vec<SubtitleEntry>>,
}

/// How progress lines are numbered: per clip for cut jobs, per URL for
/// batches.
#[derive(Clone, Copy)]
enum ProgressFrame {
    PerClip { total: u32 },
    Fixed { current: u32, total: u32 },
}

impl ProgressFrame {
    fn view(self, clip_index: usize) -> (u32, u32) {
        match self {
            Self::PerClip { total } => (clip_index as u32 + 1, total),
            Self::Fixed { current, total } => (current, total),
        }
    }
}

/// A fetched clip artifact and where the segment starts inside it.
struct ClipMedia {
    path: PathBuf,
    seek_s: f64,
    /// Full-video artifacts are cached and must survive clip cleanup.
    shared: bool,
}

/// The engine owns the hub plus everything a worker needs.
#[derive(Clone)]
pub struct Engine {
    hub: Arc<ProgressHub>,
    tools: ToolPaths,
    speech: Arc<SpeechKit>,
    output_dir: PathBuf,
    temp_dir: PathBuf,
}

impl Engine {
    pub fn new(
        hub: Arc<ProgressHub>,
        tools: ToolPaths,
        output_dir: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            hub,
            tools,
            speech: Arc::new(SpeechKit::new()),
            output_dir: output_dir.into(),
            temp_dir: temp_dir.into(),
        }
    }

    pub fn hub(&self) -> &Arc<ProgressHub> {
        &self.hub
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Validate and enqueue a cut job; the id returns before work starts.
    pub fn submit_cut(&self, request: CutRequest) -> Result<Uuid> {
        if request.url.trim().is_empty() {
            return Err(ClipForgeError::InvalidInput("url is required".into()));
        }
        if request.segments.is_empty() {
            return Err(ClipForgeError::InvalidInput(
                "at least one segment is required".into(),
            ));
        }

        let job = self.hub.submit(request.segments.len() as u32);
        let engine = self.clone();
        let worker_job = Arc::clone(&job);
        std::thread::spawn(move || engine.run_cut_job(worker_job, request));
        Ok(job.id)
    }

    /// Validate and enqueue a batch job.
    pub fn submit_batch(&self, request: BatchRequest) -> Result<Uuid> {
        if request.urls.is_empty() {
            return Err(ClipForgeError::InvalidInput("urls is required".into()));
        }
        if request.urls.len() > MAX_BATCH_URLS {
            return Err(ClipForgeError::InvalidInput(format!(
                "batch size {} exceeds the limit of {MAX_BATCH_URLS}",
                request.urls.len()
            )));
        }

        let job = self.hub.submit(request.urls.len() as u32);
        let engine = self.clone();
        let worker_job = Arc::clone(&job);
        std::thread::spawn(move || engine.run_batch_job(worker_job, request));
        Ok(job.id)
    }

    // ── Cut job worker ───────────────────────────────────────────

    fn run_cut_job(&self, job: Arc<JobHandle>, request: CutRequest) {
        let temp = self.temp_dir.join(format!("job_{}", job.id.simple()));
        if let Err(e) = std::fs::create_dir_all(&temp) {
            self.hub.publish(
                &job,
                JobProgress::failed(0, request.segments.len() as u32, e.to_string()),
            );
            return;
        }

        let total = request.segments.len() as u32;
        let frame = ProgressFrame::PerClip { total };
        let files = match self.run_clips(&job, &request, frame, &temp) {
            Ok(files) => files,
            Err(e) => {
                self.hub
                    .publish(&job, JobProgress::failed(0, total, terminal_message(&e)));
                cleanup_temp(&temp);
                return;
            }
        };

        let progress = if files.is_empty() {
            JobProgress::failed(total, total, "all clips failed")
        } else {
            JobProgress::done(total, files)
        };
        self.hub.publish(&job, progress);
        cleanup_temp(&temp);
    }

    /// Process every segment of a request sequentially. A per-clip failure
    /// skips that clip; cancellation and job-fatal errors bubble up.
    fn run_clips(
        &self,
        job: &JobHandle,
        request: &CutRequest,
        frame: ProgressFrame,
        temp: &Path,
    ) -> Result<Vec<String>> {
        let info = downloader::fetch_video_info(&self.tools, &request.url, &job.cancel)?;
        let title = if request.video_title.trim().is_empty() {
            sanitize_title(&info.title)
        } else {
            sanitize_title(&request.video_title)
        };

        let mut caches = JobCaches::default();
        let mut files = Vec::new();

        for (i, segment) in request.segments.iter().enumerate() {
            job.cancel.check()?;
            match self.process_clip(job, request, &info, &title, i, segment, frame, temp, &mut caches)
            {
                Ok(filename) => files.push(filename),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    error!(
                        job = %job.id,
                        clip = i + 1,
                        error = %e,
                        "Clip failed; continuing with remaining clips"
                    );
                }
            }
        }
        Ok(files)
    }

    #[allow(clippy::too_many_arguments)]
    fn process_clip(
        &self,
        job: &JobHandle,
        request: &CutRequest,
        info: &VideoInfo,
        title: &str,
        clip_index: usize,
        segment: &Segment,
        frame: ProgressFrame,
        temp: &Path,
        caches: &mut JobCaches,
    ) -> Result<String> {
        let (current, total) = frame.view(clip_index);
        let clip_no = clip_index + 1;

        self.hub.publish(
            job,
            JobProgress::stage(
                JobStatus::Downloading,
                current,
                total,
                format!(
                    "Downloading clip {clip_no}/{}: {} → {}",
                    request.segments.len(),
                    format_mmss(segment.start_s),
                    format_mmss(segment.end_s)
                ),
            ),
        );

        let media = self.fetch_clip_media(request, info, clip_index, segment, temp, caches, &job.cancel)?;
        let source_size = downloader::probe_dimensions(&self.tools, &media.path, &job.cancel)?;

        let mode = self.effective_crop_mode(
            job,
            request,
            &media,
            segment,
            clip_no,
            (current, total),
            source_size,
        )?;

        self.hub.publish(
            job,
            JobProgress::stage(
                JobStatus::Processing,
                current,
                total,
                format!("Processing clip {clip_no} ({})", mode.wire_name()),
            ),
        );

        let cut_path = temp.join(format!("cut_{clip_index}.mp4"));
        let plan = TranscodePlan {
            input: media.path.clone(),
            output: cut_path.clone(),
            seek_s: media.seek_s,
            duration_s: Some(segment.duration_s),
            mode,
            quality: request.quality,
            source_size,
            subtitles: None,
            copy_audio: false,
        };
        transcode::transcode(&self.tools, &plan, &job.cancel)?;
        if !media.shared {
            let _ = std::fs::remove_file(&media.path);
        }

        let filename = format!(
            "{title}_clip{clip_no}_{}.mp4",
            format_clip_token(segment.start_s)
        );
        let final_path = self.output_dir.join(&filename);

        if request.wants_enhancement() {
            self.hub.publish(
                job,
                JobProgress::stage(
                    JobStatus::Captioning,
                    current,
                    total,
                    format!("Captioning clip {clip_no}"),
                ),
            );
            match self.enhance_clip(request, segment, clip_index, &cut_path, &final_path, temp, caches, &job.cancel)
            {
                Ok(()) => {
                    let _ = std::fs::remove_file(&cut_path);
                }
                Err(e) if e.is_cancelled() => {
                    // The half-written output must not outlive the job.
                    let _ = std::fs::remove_file(&final_path);
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        clip = clip_no,
                        error = %e,
                        "Enhancement failed; delivering the plain clip"
                    );
                    move_file(&cut_path, &final_path)?;
                }
            }
        } else {
            move_file(&cut_path, &final_path)?;
        }

        info!(job = %job.id, file = %final_path.display(), "Clip produced");
        Ok(filename)
    }

    /// S1: fetch the segment's media, preferring a sectioned download and
    /// falling back to one cached full download per job.
    #[allow(clippy::too_many_arguments)]
    fn fetch_clip_media(
        &self,
        request: &CutRequest,
        info: &VideoInfo,
        clip_index: usize,
        segment: &Segment,
        temp: &Path,
        caches: &mut JobCaches,
        cancel: &CancelFlag,
    ) -> Result<ClipMedia> {
        let buffered_start = (segment.start_s - FETCH_BUFFER_S).max(0.0);
        let partial_path = temp.join(format!("segment_{clip_index}_{}.mp4", info.id));

        let partial = downloader::download_range(
            &self.tools,
            &request.url,
            buffered_start,
            segment.end_s + FETCH_BUFFER_S,
            request.quality.height_cap(),
            &partial_path,
            cancel,
        );

        match partial {
            Ok(()) => {
                // A sectioned fetch that lost its audio track is useless
                // for a short; discard and take the full path.
                if downloader::has_audio_stream(&self.tools, &partial_path, cancel)? {
                    return Ok(ClipMedia {
                        path: partial_path,
                        seek_s: segment.start_s - buffered_start,
                        shared: false,
                    });
                }
                warn!(clip = clip_index + 1, "Sectioned fetch has no audio; using full download");
                let _ = std::fs::remove_file(&partial_path);
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(ClipForgeError::Timeout { what, seconds }) => {
                return Err(ClipForgeError::Timeout { what, seconds })
            }
            Err(ClipForgeError::PartialFetchUnsupported) => {}
            Err(e) => {
                warn!(error = %e, "Sectioned fetch failed; trying full download");
            }
        }

        let full_path = match &caches.full_video {
            Some(path) => path.clone(),
            None => {
                let path = temp.join(format!("full_{}.mp4", info.id));
                downloader::download_full(
                    &self.tools,
                    &request.url,
                    request.quality.height_cap(),
                    &path,
                    cancel,
                )?;
                caches.full_video = Some(path.clone());
                path
            }
        };

        Ok(ClipMedia {
            path: full_path,
            seek_s: segment.start_s,
            shared: true,
        })
    }

    /// S2: resolve the crop mode, running reframe analysis when asked.
    fn effective_crop_mode(
        &self,
        job: &JobHandle,
        request: &CutRequest,
        media: &ClipMedia,
        segment: &Segment,
        clip_no: usize,
        (current, total): (u32, u32),
        source_size: (u32, u32),
    ) -> Result<CropMode> {
        let CropMode::SmartReframe { crops } = &request.crop_mode else {
            return Ok(request.crop_mode.clone());
        };
        if !crops.is_empty() {
            return Ok(request.crop_mode.clone());
        }

        self.hub.publish(
            job,
            JobProgress::stage(
                JobStatus::Analyzing,
                current,
                total,
                format!("Analyzing framing for clip {clip_no}"),
            ),
        );

        match reframe::analyze_reframe(
            &self.tools,
            &media.path,
            media.seek_s,
            segment.duration_s,
            source_size,
            &job.cancel,
        ) {
            Ok(crops) => Ok(CropMode::SmartReframe { crops }),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(clip = clip_no, error = %e, "Reframe analysis failed; using center crop");
                Ok(CropMode::Center)
            }
        }
    }

    /// S4: captions, translation, dubbing. Any failure here is an
    /// enhancement failure: the caller delivers the plain clip instead.
    #[allow(clippy::too_many_arguments)]
    fn enhance_clip(
        &self,
        request: &CutRequest,
        segment: &Segment,
        clip_index: usize,
        cut_path: &Path,
        final_path: &Path,
        temp: &Path,
        caches: &mut JobCaches,
        cancel: &CancelFlag,
    ) -> Result<()> {
        let mut entries = self.subtitles_for_segment(request, segment, cut_path, temp, caches, cancel)?;

        if let Some(lang) = &request.translate_to {
            entries = self.speech.translate(&entries, lang, cancel)?;
        }

        let style = request.caption_style();
        let dub = request.translate_to.is_some() && request.translate_mode == TranslateMode::Dub;

        let mut current: PathBuf = cut_path.to_path_buf();

        if let Some(style) = style {
            let ass_path = temp.join(format!("captions_{clip_index}.ass"));
            let ass = captions::render_ass(&entries, &style, request.quality.output_size());
            std::fs::write(&ass_path, ass)?;

            let burned = if dub {
                temp.join(format!("captioned_{clip_index}.mp4"))
            } else {
                final_path.to_path_buf()
            };
            let plan = TranscodePlan {
                input: current.clone(),
                output: burned.clone(),
                seek_s: 0.0,
                duration_s: None,
                mode: CropMode::Center,
                quality: request.quality,
                source_size: request.quality.output_size(),
                subtitles: Some(ass_path),
                copy_audio: true,
            };
            transcode::transcode(&self.tools, &plan, cancel)?;
            current = burned;
        }

        if dub {
            let mut dubs: Vec<(PathBuf, u64)> = Vec::new();
            for (k, entry) in entries.iter().take(MAX_DUB_LINES).enumerate() {
                cancel.check()?;
                let wav = temp.join(format!("dub_{clip_index}_{k}.wav"));
                self.speech.synthesize(&entry.text, &wav, cancel)?;
                dubs.push((wav, (entry.start_s.max(0.0) * 1000.0) as u64));
            }
            if dubs.is_empty() {
                return Err(ClipForgeError::EnhancementFailure(
                    "nothing to dub".into(),
                ));
            }
            let args = transcode::build_dub_args(&current, &dubs, final_path);
            let spec = clipforge_media::process::RunSpec::new(
                "dub mix",
                &self.tools.transcoder,
                args,
                Duration::from_secs(300),
                cancel.clone(),
            );
            clipforge_media::process::run_checked(&spec)?;
        } else if current != *final_path {
            move_file(&current, final_path)?;
        }

        Ok(())
    }

    /// Subtitle preference order: client edits → cached full-video track
    /// sliced to the clip → local transcription.
    fn subtitles_for_segment(
        &self,
        request: &CutRequest,
        segment: &Segment,
        cut_path: &Path,
        temp: &Path,
        caches: &mut JobCaches,
        cancel: &CancelFlag,
    ) -> Result<Vec<SubtitleEntry>> {
        if let Some(edited) = request.edited_subtitles.get(&segment.id) {
            if !edited.is_empty() {
                return Ok(edited.clone());
            }
        }

        if caches.subtitles.is_none() {
            caches.subtitles = Some(
                match downloader::fetch_subtitles(&self.tools, &request.url, temp, cancel) {
                    Ok(track) => track,
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        warn!(error = %e, "Subtitle fetch failed; will transcribe per clip");
                        Vec::new()
                    }
                },
            );
        }

        let sliced = match &caches.subtitles {
            Some(track) => captions::slice_entries(track, segment.start_s, segment.end_s),
            None => Vec::new(),
        };
        if !sliced.is_empty() {
            return Ok(sliced);
        }

        let transcribed = self.speech.transcribe(cut_path, cancel)?;
        Ok(transcribed)
    }

    // ── Batch worker ─────────────────────────────────────────────

    fn run_batch_job(&self, job: Arc<JobHandle>, request: BatchRequest) {
        let total = request.urls.len() as u32;
        let temp = self.temp_dir.join(format!("job_{}", job.id.simple()));
        if let Err(e) = std::fs::create_dir_all(&temp) {
            self.hub
                .publish(&job, JobProgress::failed(0, total, e.to_string()));
            return;
        }

        let mut files = Vec::new();
        for (i, url) in request.urls.iter().enumerate() {
            let current = i as u32 + 1;
            if job.cancel.is_cancelled() {
                self.hub
                    .publish(&job, JobProgress::failed(current, total, "cancelled"));
                cleanup_temp(&temp);
                return;
            }

            self.hub.publish(
                &job,
                JobProgress::stage(
                    JobStatus::Analyzing,
                    current,
                    total,
                    format!("Analyzing video {current}/{total}"),
                ),
            );

            let outcome = match analyze_url(&self.tools, &temp, url, &request.settings, &job.cancel)
            {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => {
                    self.hub
                        .publish(&job, JobProgress::failed(current, total, "cancelled"));
                    cleanup_temp(&temp);
                    return;
                }
                Err(e) => {
                    error!(url, error = %e, "Batch analysis failed; skipping URL");
                    continue;
                }
            };
            if outcome.segments.is_empty() {
                warn!(url, "No segments detected; skipping URL");
                continue;
            }

            let cut = CutRequest {
                url: url.clone(),
                video_title: outcome.video.title.clone(),
                segments: outcome.segments.iter().map(|o| o.segment.clone()).collect(),
                crop_mode: request.crop_mode.clone(),
                captions: request.captions.clone(),
                quality: Quality::default(),
                translate_to: None,
                translate_mode: TranslateMode::Captions,
                edited_subtitles: HashMap::new(),
            };
            let frame = ProgressFrame::Fixed { current, total };
            match self.run_clips(&job, &cut, frame, &temp) {
                Ok(mut produced) => files.append(&mut produced),
                Err(e) if e.is_cancelled() => {
                    self.hub
                        .publish(&job, JobProgress::failed(current, total, "cancelled"));
                    cleanup_temp(&temp);
                    return;
                }
                Err(e) => {
                    error!(url, error = %e, "Batch cut failed; skipping URL");
                }
            }
        }

        let progress = if files.is_empty() {
            JobProgress::failed(total, total, "all videos failed")
        } else {
            JobProgress::done(total, files)
        };
        self.hub.publish(&job, progress);
        cleanup_temp(&temp);
    }
}

fn terminal_message(error: &ClipForgeError) -> String {
    if error.is_cancelled() {
        "cancelled".into()
    } else {
        error.to_string()
    }
}

fn cleanup_temp(temp: &Path) {
    if let Err(e) = std::fs::remove_dir_all(temp) {
        if temp.exists() {
            warn!(dir = %temp.display(), error = %e, "Failed to remove job temp dir");
        }
    }
}

/// Rename with a copy fallback for cross-device moves.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    let _ = std::fs::remove_file(from);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ProgressHub;
    use clipforge_core::mint_segment_id;
    use clipforge_media::ToolOverrides;

    fn test_engine(dir: &Path) -> Engine {
        let overrides = ToolOverrides {
            downloader: Some(PathBuf::from("/bin/false")),
            transcoder: Some(PathBuf::from("/bin/false")),
            ffprobe: Some(PathBuf::from("/bin/false")),
        };
        Engine::new(
            Arc::new(ProgressHub::new()),
            ToolPaths::resolve(&overrides).unwrap(),
            dir.join("output"),
            dir.join("temp"),
        )
    }

    fn segment(start: f64, end: f64) -> Segment {
        Segment {
            id: mint_segment_id(),
            start_s: start,
            end_s: end,
            duration_s: end - start,
            avg_intensity: 0.6,
            peak_intensity: 0.9,
        }
    }

    fn cut_request(segments: Vec<Segment>) -> CutRequest {
        CutRequest {
            url: "https://example.com/watch?v=abc".into(),
            video_title: "My Video".into(),
            segments,
            crop_mode: CropMode::Center,
            captions: None,
            quality: Quality::Q1080,
            translate_to: None,
            translate_mode: TranslateMode::Captions,
            edited_subtitles: HashMap::new(),
        }
    }

    #[test]
    fn test_submit_cut_rejects_empty_segments() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        let err = engine.submit_cut(cut_request(vec![])).unwrap_err();
        assert!(matches!(err, ClipForgeError::InvalidInput(_)));
    }

    #[test]
    fn test_submit_cut_rejects_empty_url() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        let mut request = cut_request(vec![segment(10.0, 40.0)]);
        request.url = "  ".into();
        assert!(matches!(
            engine.submit_cut(request),
            Err(ClipForgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_submit_batch_enforces_limit() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        let request = BatchRequest {
            urls: (0..21).map(|i| format!("https://example.com/{i}")).collect(),
            settings: AnalyzeSettings::default(),
            crop_mode: CropMode::Center,
            captions: None,
        };
        assert!(matches!(
            engine.submit_batch(request),
            Err(ClipForgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_submit_cut_returns_id_before_work() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        let id = engine.submit_cut(cut_request(vec![segment(10.0, 40.0)])).unwrap();
        let job = engine.hub().get(id).expect("job must be registered");
        assert_eq!(job.snapshot().total_clips, 1);
    }

    #[test]
    fn test_cut_job_with_broken_tools_terminates_in_error() {
        // Both binaries are /bin/false: the metadata fetch fails and the
        // job must reach a terminal error, not hang.
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        let id = engine.submit_cut(cut_request(vec![segment(10.0, 40.0)])).unwrap();

        let job = engine.hub().get(id).unwrap();
        for _ in 0..100 {
            if job.snapshot().is_terminal() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        let last = job.snapshot();
        assert_eq!(last.status, JobStatus::Error);
    }

    #[test]
    fn test_caption_style_resolution() {
        let mut request = cut_request(vec![segment(0.0, 30.0)]);
        assert!(request.caption_style().is_none());
        request.captions = Some("off".into());
        assert!(request.caption_style().is_none());
        request.captions = Some("tiktok".into());
        assert!(request.caption_style().is_some());
        assert!(!request.wants_enhancement() || request.caption_style().is_some());
    }

    #[test]
    fn test_translate_mode_wire_format() {
        let mode: TranslateMode = serde_json::from_str("\"dub\"").unwrap();
        assert_eq!(mode, TranslateMode::Dub);
        let mode: TranslateMode = serde_json::from_str("\"captions\"").unwrap();
        assert_eq!(mode, TranslateMode::Captions);
    }

    #[test]
    fn test_progress_frame_views() {
        let per_clip = ProgressFrame::PerClip { total: 3 };
        assert_eq!(per_clip.view(0), (1, 3));
        assert_eq!(per_clip.view(2), (3, 3));
        let fixed = ProgressFrame::Fixed { current: 2, total: 5 };
        assert_eq!(fixed.view(0), (2, 5));
        assert_eq!(fixed.view(4), (2, 5));
    }

    #[test]
    fn test_move_file_renames() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.mp4");
        let to = dir.path().join("b.mp4");
        std::fs::write(&from, b"data").unwrap();
        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"data");
    }
}
