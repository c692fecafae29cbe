//! Sela HTTP API
//!
//! Axum-based HTTP server for the self-explanation study. The browser client
//! drives a trial through these endpoints; researchers pull collected data
//! through the export group.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function returning `(StatusCode, serde_json::Value)`. The inner
//! functions are directly testable without axum dispatch machinery.
//!
//! Endpoints:
//! - GET  /health                  — health check with DB status
//! - GET  /version                 — server version info
//! - POST /session/trial           — register participant + trial, start a session
//! - POST /session/context         — select the concept under discussion
//! - POST /message                 — one learner audio submission (multipart)
//! - POST /recordings/screen       — upload a screen-recording chunk (multipart)
//! - POST /events/navigation       — slide navigation, deduplicated
//! - POST /events/interaction      — UI events (chat window, playback, recording)
//! - POST /log                     — free-form interaction log line
//! - GET  /audio/intro             — generate/fetch the introduction audio
//! - GET  /audio/concept/:name     — generate + stream concept intro audio
//! - GET  /media/intro/:file       — serve generated intro audio
//! - GET  /media/concept/:file     — serve generated concept audio
//! - GET  /media/user/:pid/:folder/:file — serve participant files
//! - GET  /export/complete         — ZIP of the whole storage tree
//! - GET  /export/latest           — ZIP of latest-session CSVs (needs DB)
//! - GET  /dashboard               — collection counters
//! - GET  /files                   — flat file listing
//! - GET  /diagnostics             — runtime + storage snapshot

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use sela_core::models::{self, RecordingType, Speaker, TrialType};

use crate::sessions::{ActiveConcept, SessionContext};
use crate::state::{AppState, NavMark};
use crate::subsystems::dialogue::{self, DialogueError};
use crate::subsystems::export::{self, ExportError};
use crate::subsystems::storage::{sanitize_component, StorageLayout};
use crate::subsystems::{persist, synthesis};

const INTRO_TEXT: &str = "Hello, let us begin the self-explanation journey! We'll be exploring \
the concept of Extraneous Variables, focusing on Correlation, Confounders, and Moderators. \
Please go through each concept and explain what you understand about them in your own words!";

/// Repeated navigation to the same slide within this window is dropped.
const NAV_DEDUP_WINDOW: Duration = Duration::from_secs(1);

fn concept_intro_text(concept_name: &str) -> String {
    format!(
        "Now go through this concept of {concept_name}, and try explaining what you understood \
         from this concept in your own words!"
    )
}

/// Build the axum router with all endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/session/trial", post(session_trial_handler))
        .route("/session/context", post(session_context_handler))
        .route("/message", post(message_handler))
        .route("/recordings/screen", post(screen_recording_handler))
        .route("/events/navigation", post(navigation_handler))
        .route("/events/interaction", post(interaction_event_handler))
        .route("/log", post(log_handler))
        .route("/audio/intro", get(intro_audio_handler))
        .route("/audio/concept/:name", get(concept_audio_handler))
        .route("/media/intro/:file", get(serve_intro_handler))
        .route("/media/concept/:file", get(serve_concept_handler))
        .route("/media/user/:pid/:folder/:file", get(serve_user_handler))
        .route("/export/complete", get(export_complete_handler))
        .route("/export/latest", get(export_latest_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/files", get(files_handler))
        .route("/diagnostics", get(diagnostics_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    info!("Sela HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TrialRequest {
    pub participant_id: String,
    pub trial_type: String,
}

#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    pub session_id: String,
    pub concept_name: String,
}

#[derive(Debug, Deserialize)]
pub struct NavigationEvent {
    pub session_id: String,
    #[serde(default)]
    pub slide_number: Option<String>,
    #[serde(default)]
    pub concept_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InteractionEvent {
    pub session_id: String,
    pub event_type: String,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default)]
    pub concept_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogRequest {
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub details: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

fn error_body(msg: impl Into<String>) -> serde_json::Value {
    serde_json::json!({
        "error": msg.into(),
        "status": "error",
    })
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check — pings the DB when configured.
pub async fn health_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    let database = match &state.pool {
        None => "not configured".to_string(),
        Some(pool) => match sela_core::db::health_check(pool).await {
            Ok(v) => v,
            Err(e) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    serde_json::json!({
                        "status": "unhealthy",
                        "error": e.to_string(),
                    }),
                );
            }
        },
    };

    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
            "concepts": state.concepts.len(),
        }),
    )
}

/// Inner version — pure, no IO.
pub fn version_inner(state: &AppState) -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "version_tag": state.config.service.version_tag,
    })
}

/// Inner trial setup — validates inputs, registers a fresh session, starts
/// a new conversation log and records the session row.
pub async fn session_trial_inner(
    state: &AppState,
    req: TrialRequest,
) -> (StatusCode, serde_json::Value) {
    if req.participant_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_body("Missing trial type or participant ID"),
        );
    }
    let trial = match TrialType::parse(&req.trial_type) {
        Ok(t) => t,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "Invalid trial type",
                    "received": req.trial_type,
                }),
            );
        }
    };

    let participant_id = sanitize_component(&req.participant_id);
    let session_id = models::new_session_id(&participant_id);
    let interaction_id = models::new_interaction_id(&participant_id);
    let version = state.config.service.version_tag.clone();

    if let Err(e) = state.layout.init_log(&participant_id, trial, &interaction_id, &version) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body(format!("Failed to initialize log: {e}")),
        );
    }

    persist::ensure_participant(state.pool.as_ref(), &participant_id).await;
    persist::create_session(
        state.pool.as_ref(),
        &session_id,
        &participant_id,
        trial.as_str(),
        &version,
    )
    .await;
    persist::save_interaction(
        state.pool.as_ref(),
        &session_id,
        Speaker::System.as_str(),
        "Session",
        &format!("Trial type set to {} for participant {participant_id}", trial.as_str()),
        0,
    )
    .await;

    state.sessions.insert(SessionContext::new(
        session_id.clone(),
        participant_id.clone(),
        trial,
        interaction_id.clone(),
    ));
    info!(%participant_id, trial = trial.as_str(), %session_id, "trial session started");

    (
        StatusCode::OK,
        serde_json::json!({
            "status": "success",
            "session_id": session_id,
            "interaction_id": interaction_id,
            "trial_type": trial.as_str(),
        }),
    )
}

/// Inner context set — selects the concept the next submissions are graded
/// against and zeroes its attempt counter.
pub async fn session_context_inner(
    state: &AppState,
    req: ContextRequest,
) -> (StatusCode, serde_json::Value) {
    let Some(concept) = state.concepts.find(&req.concept_name) else {
        return (
            StatusCode::BAD_REQUEST,
            error_body("Invalid concept selection"),
        );
    };
    let active = ActiveConcept {
        name: concept.name.clone(),
        golden_answer: concept.golden_answer.clone(),
    };

    let Some(ctx) = state
        .sessions
        .with_session(&req.session_id, |s| {
            s.set_concept(active);
            (s.participant_id.clone(), s.trial_type)
        })
    else {
        return (StatusCode::BAD_REQUEST, error_body("unknown session id"));
    };
    let (participant_id, trial) = ctx;

    let line = format!("Context set for concept: {}", concept.name);
    if let Err(e) = state
        .layout
        .append_log(&participant_id, trial, Speaker::System.as_str(), &line)
    {
        warn!(error = %e, "failed to append context line to log");
    }
    persist::save_interaction(
        state.pool.as_ref(),
        &req.session_id,
        Speaker::System.as_str(),
        &concept.name,
        &line,
        0,
    )
    .await;

    (
        StatusCode::OK,
        serde_json::json!({
            "message": format!("Context set for {}.", concept.name),
        }),
    )
}

/// Inner message — delegates to the dialogue pipeline.
pub async fn message_inner(
    state: &AppState,
    session_id: &str,
    submission: dialogue::Submission,
) -> (StatusCode, serde_json::Value) {
    match dialogue::process_message(state, session_id, submission).await {
        Ok(outcome) => (
            StatusCode::OK,
            serde_json::json!({
                "response": outcome.response,
                "ai_audio_url": outcome.ai_audio_url,
                "user_transcript": outcome.user_transcript,
                "attempt_number": outcome.attempt_number,
            }),
        ),
        Err(
            e @ (DialogueError::UnknownSession
            | DialogueError::EmptySubmission
            | DialogueError::UnknownConcept
            | DialogueError::MissingContext),
        ) => (StatusCode::BAD_REQUEST, error_body(e.to_string())),
        Err(DialogueError::Io(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body(format!("storage error: {e}")),
        ),
    }
}

/// Inner screen-recording save. Chunk uploads of the same name get a
/// `_1`, `_2`, ... suffix instead of overwriting.
pub async fn screen_recording_inner(
    state: &AppState,
    session_id: &str,
    original_filename: Option<String>,
    data: Vec<u8>,
) -> (StatusCode, serde_json::Value) {
    if data.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_body("No screen recording file provided"),
        );
    }
    let Some(ctx) = state.sessions.snapshot(session_id) else {
        return (StatusCode::BAD_REQUEST, error_body("unknown session id"));
    };

    let filename = match original_filename {
        Some(name)
            if name.starts_with("screen_recording_") && name.ends_with(".webm") =>
        {
            sanitize_component(&name)
        }
        _ => format!(
            "screen_recording_{}.webm",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ),
    };

    let dir = state
        .layout
        .screen_recordings_dir(&ctx.participant_id, ctx.trial_type);
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body(format!("Error saving file: {e}")),
        );
    }
    let path = StorageLayout::unique_path(&dir, &filename);
    let size = data.len();
    if let Err(e) = tokio::fs::write(&path, &data).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body(format!("Error saving file: {e}")),
        );
    }

    let saved_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(filename);
    persist::save_recording(
        state.pool.as_ref(),
        &ctx.session_id,
        RecordingType::Screen.as_str(),
        &path.to_string_lossy(),
        Some(&saved_name),
        Some(size as i64),
        None,
        None,
    )
    .await;

    let size_mb = (size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;
    info!(participant_id = %ctx.participant_id, filename = %saved_name, size_mb, "screen recording saved");
    (
        StatusCode::OK,
        serde_json::json!({
            "status": "success",
            "filename": saved_name,
            "size_mb": size_mb,
        }),
    )
}

/// Whether a navigation event is new enough (or different enough) to log.
pub fn should_log_navigation(
    last: &Option<NavMark>,
    slide: &str,
    concept: &str,
    now: Instant,
) -> bool {
    match last {
        None => true,
        Some(mark) => {
            mark.slide != slide
                || mark.concept != concept
                || now.duration_since(mark.at) > NAV_DEDUP_WINDOW
        }
    }
}

/// Inner navigation event — duplicate clicks within the dedup window write
/// a single log line.
pub async fn navigation_inner(
    state: &AppState,
    req: NavigationEvent,
) -> (StatusCode, serde_json::Value) {
    let Some(ctx) = state.sessions.snapshot(&req.session_id) else {
        return (StatusCode::BAD_REQUEST, error_body("unknown session id"));
    };
    let slide = req.slide_number.unwrap_or_else(|| "unknown".to_string());
    let concept = req.concept_name.unwrap_or_else(|| "unknown".to_string());

    let now = Instant::now();
    let accept = {
        let mut guard = state.nav_guard.lock().expect("nav guard lock");
        let accept = should_log_navigation(&guard, &slide, &concept, now);
        if accept {
            *guard = Some(NavMark {
                slide: slide.clone(),
                concept: concept.clone(),
                at: now,
            });
        }
        accept
    };

    if accept {
        let line = format!("User navigated to slide [{slide}] with the concept: [{concept}]");
        if let Err(e) = state
            .layout
            .append_log(&ctx.participant_id, ctx.trial_type, Speaker::System.as_str(), &line)
        {
            warn!(error = %e, "failed to log navigation");
        }
        persist::save_interaction(
            state.pool.as_ref(),
            &ctx.session_id,
            Speaker::System.as_str(),
            &concept,
            &line,
            0,
        )
        .await;
    }

    (
        StatusCode::OK,
        serde_json::json!({
            "status": "success",
            "logged": accept,
        }),
    )
}

/// Renders a UI event into the log line format the analysis scripts expect.
pub fn format_interaction_event(event_type: &str, details: &serde_json::Value, concept: &str) -> String {
    let detail = |key: &str| -> String {
        details
            .get(key)
            .and_then(|v| v.as_str().map(str::to_string).or_else(|| Some(v.to_string())))
            .unwrap_or_else(|| "unknown".to_string())
    };
    match event_type {
        "CHAT_WINDOW" => format!("User {} the chat window", detail("action")),
        "PAGE_NAVIGATION" => format!(
            "User navigated to slide [{}] with the concept: [{concept}]",
            detail("to_page")
        ),
        "AUDIO_PLAYBACK" => format!(
            "User {} audio playback at {} seconds",
            detail("action"),
            detail("timestamp")
        ),
        "RECORDING" => match detail("action").as_str() {
            "started" => format!("User started recording at {}", detail("timestamp")),
            "stopped" => format!("User stopped recording at {}", detail("timestamp")),
            "submitted" => format!(
                "User submitted recording (size: {} bytes, duration: {}) at {}",
                detail("blobSize"),
                detail("duration"),
                detail("timestamp")
            ),
            other => format!("User recording event: {other}"),
        },
        other => format!("User event {other}: {details}"),
    }
}

/// Inner interaction event — logs UI events (chat window, playback, recording).
pub async fn interaction_event_inner(
    state: &AppState,
    req: InteractionEvent,
) -> (StatusCode, serde_json::Value) {
    let Some(ctx) = state.sessions.snapshot(&req.session_id) else {
        return (StatusCode::BAD_REQUEST, error_body("unknown session id"));
    };
    let concept = req.concept_name.unwrap_or_else(|| "unknown".to_string());
    let line = format_interaction_event(&req.event_type, &req.details, &concept);

    if let Err(e) = state
        .layout
        .append_log(&ctx.participant_id, ctx.trial_type, Speaker::System.as_str(), &line)
    {
        warn!(error = %e, "failed to log interaction event");
    }
    persist::save_interaction(
        state.pool.as_ref(),
        &ctx.session_id,
        Speaker::System.as_str(),
        &concept,
        &line,
        0,
    )
    .await;

    (
        StatusCode::OK,
        serde_json::json!({ "status": "success", "message": "Event logged successfully" }),
    )
}

/// Inner free-form log line, `User {type}: {details}`.
pub async fn log_inner(state: &AppState, req: LogRequest) -> (StatusCode, serde_json::Value) {
    if req.kind.trim().is_empty() || req.details.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_body("Missing interaction type or details"),
        );
    }
    let Some(ctx) = state.sessions.snapshot(&req.session_id) else {
        return (StatusCode::BAD_REQUEST, error_body("unknown session id"));
    };
    let line = format!("User {}: {}", req.kind, req.details);
    if let Err(e) = state
        .layout
        .append_log(&ctx.participant_id, ctx.trial_type, Speaker::System.as_str(), &line)
    {
        warn!(error = %e, "failed to append log line");
    }
    (StatusCode::OK, serde_json::json!({ "status": "success" }))
}

/// Inner intro audio — generates the file on first request and logs the
/// intro text as an AI turn for the requesting session.
pub async fn intro_audio_inner(
    state: &AppState,
    session_id: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let filename = StorageLayout::general_audio_filename("intro_message", None);
    let path = state.layout.intro_audio_dir().join(&filename);

    let existed = path.exists();
    match synthesis::synthesize_to_file(state.synthesizer.as_ref(), INTRO_TEXT, &path).await {
        Ok(true) => {
            if !existed {
                if let Some(ctx) = session_id.and_then(|id| state.sessions.snapshot(id)) {
                    if let Err(e) = state.layout.append_log(
                        &ctx.participant_id,
                        ctx.trial_type,
                        Speaker::Ai.as_str(),
                        INTRO_TEXT,
                    ) {
                        warn!(error = %e, "failed to log intro text");
                    }
                }
            }
            (
                StatusCode::OK,
                serde_json::json!({ "intro_audio_url": format!("/media/intro/{filename}") }),
            )
        }
        Ok(false) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body("Failed to generate introduction audio"),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body(format!("Failed to generate introduction audio: {e}")),
        ),
    }
}

/// Inner concept audio — regenerates when the requested concept differs from
/// the last one generated, then returns the MP3 bytes.
pub async fn concept_audio_inner(
    state: &AppState,
    concept_name: &str,
    session_id: Option<&str>,
) -> Result<Vec<u8>, (StatusCode, serde_json::Value)> {
    if state.concepts.find(concept_name).is_none() {
        return Err((StatusCode::BAD_REQUEST, error_body("Invalid concept selection")));
    }
    let safe = sanitize_component(concept_name);
    let filename = StorageLayout::general_audio_filename("concept_intro", Some(&safe));
    let path = state.layout.concept_audio_dir().join(&filename);
    let text = concept_intro_text(concept_name);

    // Serialize regeneration: the file name is shared across sessions, so a
    // concept switch must not race a concurrent read of the old audio.
    {
        let mut last = state.concept_audio_guard.lock().await;
        let stale = last.as_deref() != Some(concept_name);
        if stale && path.exists() {
            let _ = tokio::fs::remove_file(&path).await;
        }
        let generated = synthesis::synthesize_to_file(state.synthesizer.as_ref(), &text, &path)
            .await
            .map_err(|e| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body(format!("Failed to generate audio: {e}")),
                )
            })?;
        if !generated {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("Failed to generate audio"),
            ));
        }
        if stale {
            if let Some(ctx) = session_id.and_then(|id| state.sessions.snapshot(id)) {
                if let Err(e) = state.layout.append_log(
                    &ctx.participant_id,
                    ctx.trial_type,
                    Speaker::Ai.as_str(),
                    &text,
                ) {
                    warn!(error = %e, "failed to log concept intro");
                }
            }
            *last = Some(concept_name.to_string());
        }
    }

    tokio::fs::read(&path).await.map_err(|_| {
        (StatusCode::NOT_FOUND, error_body("Audio file not found"))
    })
}

/// Inner dashboard — DB counters and recent sessions when configured,
/// storage usage always.
pub async fn dashboard_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    let (files, bytes) = export::storage_usage(state.layout.root());
    let (database, recent) = match &state.pool {
        None => (serde_json::json!("not configured"), serde_json::json!([])),
        Some(pool) => {
            let stats = match persist::dashboard_stats(pool).await {
                Ok(stats) => serde_json::to_value(stats).unwrap_or_default(),
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            };
            let recent = match persist::recent_sessions(pool, 10).await {
                Ok(sessions) => serde_json::to_value(sessions).unwrap_or_default(),
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            };
            (stats, recent)
        }
    };
    (
        StatusCode::OK,
        serde_json::json!({
            "database": database,
            "recent_sessions": recent,
            "storage_files": files,
            "storage_bytes": bytes,
            "active_sessions": state.sessions.len(),
        }),
    )
}

/// Inner diagnostics snapshot.
pub async fn diagnostics_inner(state: &AppState) -> serde_json::Value {
    let (files, bytes) = export::storage_usage(state.layout.root());
    let recordings_in_db = match &state.pool {
        None => None,
        Some(pool) => persist::recordings_count(pool).await.ok(),
    };
    let diag = export::Diagnostics {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_working_directory: std::env::current_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unavailable".to_string()),
        storage_root: state.layout.root().to_string_lossy().into_owned(),
        storage_root_exists: state.layout.root().exists(),
        storage_files: files,
        storage_bytes: bytes,
        database_configured: state.pool.is_some(),
        recordings_in_db,
        chat_enabled: state.chat.is_some(),
        transcriber: state.transcriber.name().to_string(),
        synthesizer: state.synthesizer.name().to_string(),
        concepts: state.concepts.names().iter().map(|s| s.to_string()).collect(),
        active_sessions: state.sessions.len(),
        environment: export::EnvPresence::probe(),
    };
    serde_json::to_value(diag).unwrap_or_default()
}

// ============================================================================
// File serving helpers
// ============================================================================

fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext) {
        Some("mp3") => "audio/mpeg",
        Some("webm") => "video/webm",
        Some("wav") => "audio/wav",
        Some("txt") => "text/plain; charset=utf-8",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

async fn serve_file(dir: std::path::PathBuf, filename: &str) -> axum::response::Response {
    let safe = sanitize_component(filename);
    let path = dir.join(&safe);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type_for(&safe))],
            bytes,
        )
            .into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(error_body("File not found")),
        )
            .into_response(),
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner(&state)))
}

pub async fn session_trial_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TrialRequest>,
) -> impl IntoResponse {
    let (status, body) = session_trial_inner(&state, req).await;
    (status, Json(body))
}

pub async fn session_context_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContextRequest>,
) -> impl IntoResponse {
    let (status, body) = session_context_inner(&state, req).await;
    (status, Json(body))
}

pub async fn message_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut session_id = None;
    let mut submission = dialogue::Submission {
        audio_ext: "wav".to_string(),
        ..Default::default()
    };

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("session_id") => {
                session_id = field.text().await.ok();
            }
            Some("concept_name") => {
                submission.concept_name = field.text().await.ok().filter(|s| !s.is_empty());
            }
            Some("message") => {
                submission.message = field.text().await.ok().filter(|s| !s.is_empty());
            }
            Some("audio") => {
                if let Some(file_name) = field.file_name() {
                    if let Some((_, ext)) = file_name.rsplit_once('.') {
                        submission.audio_ext = sanitize_component(ext);
                    }
                }
                submission.audio = field.bytes().await.ok().map(|b| b.to_vec()).filter(|a| !a.is_empty());
            }
            _ => {}
        }
    }

    let Some(session_id) = session_id else {
        return (StatusCode::BAD_REQUEST, Json(error_body("Missing session_id")));
    };

    let (status, body) = message_inner(&state, &session_id, submission).await;
    (status, Json(body))
}

pub async fn screen_recording_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut session_id = None;
    let mut filename = None;
    let mut data = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("session_id") => {
                session_id = field.text().await.ok();
            }
            Some("screen_recording") => {
                filename = field.file_name().map(str::to_string);
                data = field.bytes().await.ok().map(|b| b.to_vec());
            }
            _ => {}
        }
    }

    let Some(session_id) = session_id else {
        return (StatusCode::BAD_REQUEST, Json(error_body("Missing session_id")));
    };
    let Some(data) = data else {
        return (
            StatusCode::BAD_REQUEST,
            Json(error_body("No screen recording file provided")),
        );
    };

    let (status, body) = screen_recording_inner(&state, &session_id, filename, data).await;
    (status, Json(body))
}

pub async fn navigation_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NavigationEvent>,
) -> impl IntoResponse {
    let (status, body) = navigation_inner(&state, req).await;
    (status, Json(body))
}

pub async fn interaction_event_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InteractionEvent>,
) -> impl IntoResponse {
    let (status, body) = interaction_event_inner(&state, req).await;
    (status, Json(body))
}

pub async fn log_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogRequest>,
) -> impl IntoResponse {
    let (status, body) = log_inner(&state, req).await;
    (status, Json(body))
}

pub async fn intro_audio_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SessionQuery>,
) -> impl IntoResponse {
    let (status, body) = intro_audio_inner(&state, q.session_id.as_deref()).await;
    (status, Json(body))
}

pub async fn concept_audio_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(q): Query<SessionQuery>,
) -> axum::response::Response {
    match concept_audio_inner(&state, &name, q.session_id.as_deref()).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "audio/mpeg")],
            bytes,
        )
            .into_response(),
        Err((status, body)) => (status, Json(body)).into_response(),
    }
}

pub async fn serve_intro_handler(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> axum::response::Response {
    serve_file(state.layout.intro_audio_dir(), &file).await
}

pub async fn serve_concept_handler(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> axum::response::Response {
    serve_file(state.layout.concept_audio_dir(), &file).await
}

pub async fn serve_user_handler(
    State(state): State<Arc<AppState>>,
    Path((pid, folder, file)): Path<(String, String, String)>,
) -> axum::response::Response {
    let dir = state
        .layout
        .user_data_dir()
        .join(sanitize_component(&pid))
        .join(sanitize_component(&folder));
    serve_file(dir, &file).await
}

pub async fn export_complete_handler(
    State(state): State<Arc<AppState>>,
) -> axum::response::Response {
    match export::build_complete_zip(state.layout.root()) {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/zip".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!(
                        "attachment; filename=\"sela_export_{}.zip\"",
                        chrono::Local::now().format("%Y%m%d_%H%M%S")
                    ),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(ExportError::Empty) => (
            StatusCode::NOT_FOUND,
            Json(error_body("nothing to export")),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_body(e.to_string())),
        )
            .into_response(),
    }
}

pub async fn export_latest_handler(
    State(state): State<Arc<AppState>>,
) -> axum::response::Response {
    let Some(pool) = &state.pool else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(error_body("database not configured")),
        )
            .into_response();
    };
    match export::build_latest_sessions_zip(pool).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/zip".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"latest_sessions.zip\"".to_string(),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(ExportError::Empty) => (
            StatusCode::NOT_FOUND,
            Json(error_body("nothing to export")),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_body(e.to_string())),
        )
            .into_response(),
    }
}

pub async fn dashboard_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = dashboard_inner(&state).await;
    (status, Json(body))
}

pub async fn files_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let entries = export::browse_files(state.layout.root());
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "root": state.layout.root().to_string_lossy(),
            "count": entries.len(),
            "files": entries,
        })),
    )
}

pub async fn diagnostics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(diagnostics_inner(&state).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nav_dedup_window() {
        let now = Instant::now();
        assert!(should_log_navigation(&None, "3", "Correlation", now));

        let mark = Some(NavMark {
            slide: "3".to_string(),
            concept: "Correlation".to_string(),
            at: now,
        });
        // Identical navigation right away is dropped.
        assert!(!should_log_navigation(&mark, "3", "Correlation", now));
        // A different slide or concept always logs.
        assert!(should_log_navigation(&mark, "4", "Correlation", now));
        assert!(should_log_navigation(&mark, "3", "Moderators", now));
        // Same slide again after the window has passed.
        assert!(should_log_navigation(
            &mark,
            "3",
            "Correlation",
            now + Duration::from_millis(1100)
        ));
    }

    #[test]
    fn test_interaction_event_formats() {
        let details = serde_json::json!({ "action": "opened" });
        assert_eq!(
            format_interaction_event("CHAT_WINDOW", &details, "none"),
            "User opened the chat window"
        );

        let details = serde_json::json!({ "action": "paused", "timestamp": "12.5" });
        assert_eq!(
            format_interaction_event("AUDIO_PLAYBACK", &details, "none"),
            "User paused audio playback at 12.5 seconds"
        );

        let details = serde_json::json!({
            "action": "submitted", "blobSize": "1024", "duration": "3s", "timestamp": "t1"
        });
        assert_eq!(
            format_interaction_event("RECORDING", &details, "none"),
            "User submitted recording (size: 1024 bytes, duration: 3s) at t1"
        );

        let details = serde_json::json!({ "to_page": "2" });
        assert_eq!(
            format_interaction_event("PAGE_NAVIGATION", &details, "Confounders"),
            "User navigated to slide [2] with the concept: [Confounders]"
        );
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("a.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("rec.webm"), "video/webm");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
