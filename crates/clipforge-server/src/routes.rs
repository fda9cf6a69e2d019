//! Route table and request handlers.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path as UrlPath, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clipforge_core::{CancelFlag, ClipForgeError, Segment};
use clipforge_engine::{analyze_url, AnalyzeSettings, CutRequest, TranslateMode};
use clipforge_media::captions::{slice_entries, SubtitleEntry};
use clipforge_media::downloader;
use clipforge_media::transcode::{CropMode, Quality};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;
use uuid::Uuid;

/// Assemble the full route table over shared state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/subtitles", post(subtitles))
        .route("/api/cut", post(cut))
        .route("/api/jobs/:id", get(job_status))
        .route("/api/jobs/:id/progress", get(job_progress))
        .route("/api/jobs/:id/cancel", post(job_cancel))
        .route("/api/batch", post(batch))
        .route("/api/batch/:id/progress", get(job_progress))
        .route("/output/:filename", get(output_file))
        .with_state(state)
}

// ── Request bodies ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeBody {
    url: String,
    #[serde(default)]
    settings: Option<AnalyzeSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubtitlesBody {
    url: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CutBody {
    url: String,
    segments: Vec<Segment>,
    crop_mode: String,
    #[serde(default)]
    captions: Option<String>,
    #[serde(default)]
    video_title: String,
    #[serde(default)]
    quality: Option<u32>,
    #[serde(default)]
    translate_to: Option<String>,
    #[serde(default)]
    translate_mode: Option<TranslateMode>,
    #[serde(default)]
    edited_subtitles: Option<HashMap<String, Vec<SubtitleEntry>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchBody {
    urls: Vec<String>,
    #[serde(default)]
    settings: Option<AnalyzeSettings>,
    #[serde(default)]
    crop_mode: Option<String>,
    #[serde(default)]
    captions: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubtitlesResponse {
    subtitles: HashMap<String, Vec<SubtitleEntry>>,
}

// ── Handlers ─────────────────────────────────────────────────────

async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeBody>,
) -> Result<impl IntoResponse, ApiError> {
    validate_url(&body.url)?;
    let engine = state.engine()?;
    let settings = body.settings.unwrap_or_default();
    let url = body.url.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        analyze_url(
            engine.tools(),
            engine.temp_dir(),
            &url,
            &settings,
            &CancelFlag::new(),
        )
    })
    .await
    .map_err(|e| ClipForgeError::Internal(format!("analysis task panicked: {e}")))??;

    Ok(Json(outcome))
}

async fn subtitles(
    State(state): State<AppState>,
    Json(body): Json<SubtitlesBody>,
) -> Result<impl IntoResponse, ApiError> {
    validate_url(&body.url)?;
    let engine = state.engine()?;
    let url = body.url.clone();

    let work_dir = engine.temp_dir().join(format!("subs_{}", Uuid::new_v4().simple()));
    std::fs::create_dir_all(&work_dir).map_err(ClipForgeError::Io)?;

    let fetch_dir = work_dir.clone();
    let track = tokio::task::spawn_blocking(move || {
        downloader::fetch_subtitles(engine.tools(), &url, &fetch_dir, &CancelFlag::new())
    })
    .await
    .map_err(|e| ClipForgeError::Internal(format!("subtitle task panicked: {e}")))??;
    let _ = std::fs::remove_dir_all(&work_dir);

    let subtitles = body
        .segments
        .iter()
        .map(|seg| {
            (
                seg.id.clone(),
                slice_entries(&track, seg.start_s, seg.end_s),
            )
        })
        .collect();

    Ok(Json(SubtitlesResponse { subtitles }))
}

async fn cut(
    State(state): State<AppState>,
    Json(body): Json<CutBody>,
) -> Result<impl IntoResponse, ApiError> {
    validate_url(&body.url)?;
    let crop_mode = CropMode::parse(&body.crop_mode)
        .ok_or_else(|| ApiError::bad_request(format!("unknown crop mode '{}'", body.crop_mode)))?;
    let quality = body.quality.map(Quality::from_height).unwrap_or_default();

    let request = CutRequest {
        url: body.url,
        video_title: body.video_title,
        segments: body.segments,
        crop_mode,
        captions: body.captions,
        quality,
        translate_to: body.translate_to,
        translate_mode: body.translate_mode.unwrap_or_default(),
        edited_subtitles: body.edited_subtitles.unwrap_or_default(),
    };

    let job_id = state.engine()?.submit_cut(request)?;
    Ok(Json(json!({ "jobId": job_id.to_string() })))
}

async fn batch(
    State(state): State<AppState>,
    Json(body): Json<BatchBody>,
) -> Result<impl IntoResponse, ApiError> {
    for url in &body.urls {
        validate_url(url)?;
    }
    let crop_mode = match body.crop_mode.as_deref() {
        None => CropMode::Center,
        Some(name) => CropMode::parse(name)
            .ok_or_else(|| ApiError::bad_request(format!("unknown crop mode '{name}'")))?,
    };

    let total_urls = body.urls.len();
    let request = clipforge_engine::BatchRequest {
        urls: body.urls,
        settings: body.settings.unwrap_or_default(),
        crop_mode,
        captions: body.captions,
    };

    let batch_id = state.engine()?.submit_batch(request)?;
    Ok(Json(json!({
        "batchId": batch_id.to_string(),
        "totalUrls": total_urls,
    })))
}

async fn job_status(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = lookup_job(&state, &id)?;
    Ok(Json(json!({
        "id": job.id.to_string(),
        "progress": job.snapshot(),
    })))
}

/// SSE stream of `JobProgress` events. The latest snapshot is replayed on
/// attach; the terminal event is the last frame before the stream closes.
async fn job_progress(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let job = lookup_job(&state, &id)?;
    let (listener_id, rx) = state
        .hub()
        .attach(job.id)
        .ok_or_else(|| ApiError::not_found("job"))?;
    debug!(job = %job.id, listener = listener_id, "Progress stream opened");

    let stream = ReceiverStream::new(rx).map(|progress| {
        let payload = serde_json::to_string(&progress).unwrap_or_else(|_| "{}".into());
        Ok::<Event, Infallible>(Event::default().data(payload))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn job_cancel(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = lookup_job(&state, &id)?;
    state.hub().cancel(job.id);
    Ok(Json(json!({ "cancelled": true })))
}

async fn output_file(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let safe = sanitize_filename(&filename)
        .ok_or_else(|| ApiError::bad_request("invalid file name"))?;
    let path = state.output_dir().join(safe);

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::not_found("file"))?;

    Ok(([(header::CONTENT_TYPE, "video/mp4")], bytes))
}

// ── Helpers ──────────────────────────────────────────────────────

fn lookup_job(
    state: &AppState,
    id: &str,
) -> Result<std::sync::Arc<clipforge_engine::JobHandle>, ApiError> {
    let uuid = Uuid::parse_str(id).map_err(|_| ApiError::bad_request("malformed job id"))?;
    state.hub().get(uuid).ok_or_else(|| ApiError::not_found("job"))
}

fn validate_url(url: &str) -> Result<(), ApiError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request("url is required"));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(ApiError::bad_request("url must be http(s)"));
    }
    Ok(())
}

/// Only bare file names may leave the output directory.
fn sanitize_filename(name: &str) -> Option<&str> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("clip_1.mp4"), Some("clip_1.mp4"));
        assert_eq!(sanitize_filename("My_Video_clip1_1m40s.mp4"), Some("My_Video_clip1_1m40s.mp4"));
        assert!(sanitize_filename("../secret").is_none());
        assert!(sanitize_filename("a/b.mp4").is_none());
        assert!(sanitize_filename("a\\b.mp4").is_none());
        assert!(sanitize_filename(".hidden").is_none());
        assert!(sanitize_filename("").is_none());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/watch?v=x").is_ok());
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("").is_err());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("watch?v=x").is_err());
    }

    #[test]
    fn test_cut_body_deserializes_camel_case() {
        let json = r#"{
            "url": "https://example.com/v",
            "segments": [{
                "id": "seg_1", "startS": 10.0, "endS": 40.0, "durationS": 30.0,
                "avgIntensity": 0.6, "peakIntensity": 0.9
            }],
            "cropMode": "blur_pad",
            "captions": "tiktok",
            "videoTitle": "My Video",
            "quality": 720,
            "translateTo": "es",
            "translateMode": "dub"
        }"#;
        let body: CutBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.crop_mode, "blur_pad");
        assert_eq!(body.quality, Some(720));
        assert_eq!(body.translate_mode, Some(TranslateMode::Dub));
        assert_eq!(body.segments[0].start_s, 10.0);
    }

    #[test]
    fn test_cut_body_minimal() {
        let json = r#"{"url": "https://e.com", "segments": [], "cropMode": "center"}"#;
        let body: CutBody = serde_json::from_str(json).unwrap();
        assert!(body.captions.is_none());
        assert!(body.video_title.is_empty());
        assert!(body.edited_subtitles.is_none());
    }

    #[test]
    fn test_batch_body_defaults() {
        let json = r#"{"urls": ["https://e.com/1", "https://e.com/2"]}"#;
        let body: BatchBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.urls.len(), 2);
        assert!(body.crop_mode.is_none());
    }
}
