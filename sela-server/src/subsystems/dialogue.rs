//! The tutoring exchange: one learner submission in, one reply out.
//!
//! Pipeline: resolve the concept under discussion, store any uploaded audio,
//! transcribe it (or take the text message as-is), log the learner turn,
//! grade the attempt (similarity short-circuit first, language model
//! otherwise), log the reply, and queue reply synthesis. The reply text
//! returns immediately; audio follows when a worker finishes.

use thiserror::Error;
use tracing::{debug, info, warn};

use sela_core::models::{RecordingType, Speaker};
use sela_core::tutor::{self, FeedbackPrompt};

use crate::sessions::ActiveConcept;
use crate::state::AppState;
use crate::subsystems::persist;
use crate::subsystems::storage::StorageLayout;
use crate::subsystems::synthesis::SynthesisJob;

/// Shown in place of a transcript when speech-to-text yields nothing.
pub const TRANSCRIPT_UNAVAILABLE: &str = "Audio processing failed.";

#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("unknown session id")]
    UnknownSession,
    #[error("Message or audio is required.")]
    EmptySubmission,
    #[error("Concept not found.")]
    UnknownConcept,
    #[error("{}", tutor::MISSING_CONTEXT_MESSAGE)]
    MissingContext,
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// One learner submission: a text message, an audio clip, or both, with an
/// optional explicit concept overriding the session's active one.
#[derive(Debug, Default)]
pub struct Submission {
    pub concept_name: Option<String>,
    pub message: Option<String>,
    pub audio: Option<Vec<u8>>,
    pub audio_ext: String,
}

/// What the browser gets back for one submission.
#[derive(Debug, Clone)]
pub struct MessageOutcome {
    pub response: String,
    pub user_transcript: String,
    /// 1-based attempt number this submission counted as.
    pub attempt_number: u32,
    /// URL the reply audio will appear under, if synthesis is queued.
    pub ai_audio_url: Option<String>,
}

pub async fn process_message(
    state: &AppState,
    session_id: &str,
    submission: Submission,
) -> Result<MessageOutcome, DialogueError> {
    let Some(ctx) = state.sessions.snapshot(session_id) else {
        return Err(DialogueError::UnknownSession);
    };
    if submission.message.is_none() && submission.audio.is_none() {
        return Err(DialogueError::EmptySubmission);
    }

    // An explicit concept wins over the session's active one; a submission
    // with neither cannot be graded.
    let concept = match &submission.concept_name {
        Some(name) => {
            let found = state
                .concepts
                .find(name)
                .ok_or(DialogueError::UnknownConcept)?;
            ActiveConcept {
                name: found.name.clone(),
                golden_answer: found.golden_answer.clone(),
            }
        }
        None => ctx.concept.clone().ok_or(DialogueError::MissingContext)?,
    };

    let attempt = state
        .sessions
        .with_session(session_id, |s| s.begin_attempt(&concept.name))
        .ok_or(DialogueError::UnknownSession)?;
    let attempt_number = attempt + 1;

    let task_dir = state
        .layout
        .ensure_task_dirs(&ctx.participant_id, ctx.trial_type)?;

    // Persist the raw audio under the participant tree and transcribe it;
    // a plain text message skips both.
    let user_transcript = match &submission.audio {
        None => submission.message.clone().unwrap_or_default(),
        Some(audio) => {
            let ext = if submission.audio_ext.is_empty() {
                "wav"
            } else {
                submission.audio_ext.as_str()
            };
            let audio_name = StorageLayout::attempt_audio_filename(
                "user",
                &concept.name,
                attempt_number,
                &ctx.participant_id,
                ext,
            );
            let audio_path = task_dir.join(&audio_name);
            tokio::fs::write(&audio_path, audio).await?;
            persist::save_recording(
                state.pool.as_ref(),
                &ctx.session_id,
                RecordingType::UserAudio.as_str(),
                &audio_path.to_string_lossy(),
                Some(&audio_name),
                Some(audio.len() as i64),
                Some(&concept.name),
                Some(attempt_number as i32),
            )
            .await;

            match state.transcriber.transcribe(&audio_path).await {
                Ok(Some(text)) => text,
                Ok(None) | Err(_) => TRANSCRIPT_UNAVAILABLE.to_string(),
            }
        }
    };
    debug!(session_id, concept = %concept.name, attempt_number, "learner turn ready");

    state.layout.append_log(
        &ctx.participant_id,
        ctx.trial_type,
        Speaker::User.as_str(),
        &user_transcript,
    )?;
    persist::save_interaction(
        state.pool.as_ref(),
        &ctx.session_id,
        Speaker::User.as_str(),
        &concept.name,
        &user_transcript,
        attempt_number as i32,
    )
    .await;

    let response = grade_attempt(state, &concept, &user_transcript, attempt).await;
    info!(session_id, concept = %concept.name, attempt_number, "tutor reply ready");

    state.layout.append_log(
        &ctx.participant_id,
        ctx.trial_type,
        Speaker::Ai.as_str(),
        &response,
    )?;
    persist::save_interaction(
        state.pool.as_ref(),
        &ctx.session_id,
        Speaker::Ai.as_str(),
        &concept.name,
        &response,
        attempt_number as i32,
    )
    .await;

    let ai_audio_url =
        queue_reply_audio(state, &ctx, &response, &concept.name, attempt_number).await;

    Ok(MessageOutcome {
        response,
        user_transcript,
        attempt_number,
        ai_audio_url,
    })
}

/// Similarity short-circuit first; anything below threshold goes to the
/// language model with the stage-appropriate instruction.
async fn grade_attempt(
    state: &AppState,
    concept: &ActiveConcept,
    learner_text: &str,
    attempt: u32,
) -> String {
    if learner_text != TRANSCRIPT_UNAVAILABLE
        && tutor::matches_golden_answer(
            learner_text,
            &concept.golden_answer,
            state.config.llm.similarity_threshold,
        )
    {
        debug!(concept = %concept.name, "golden-answer match, skipping model call");
        return tutor::CORRECT_MOVE_ON_MESSAGE.to_string();
    }

    let prompt = FeedbackPrompt::build(&concept.name, &concept.golden_answer, learner_text, attempt);
    match &state.chat {
        Some(chat) => match chat.complete(&prompt.system, &prompt.user).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "chat completion failed");
                format!("Error generating AI response: {e}")
            }
        },
        None => "Error generating AI response: no API key configured".to_string(),
    }
}

async fn queue_reply_audio(
    state: &AppState,
    ctx: &crate::sessions::SessionContext,
    response: &str,
    concept_name: &str,
    attempt_number: u32,
) -> Option<String> {
    let filename = StorageLayout::attempt_audio_filename(
        "ai",
        concept_name,
        attempt_number,
        &ctx.participant_id,
        "mp3",
    );
    let output_path = state
        .layout
        .task_dir(&ctx.participant_id, ctx.trial_type)
        .join(&filename);
    let job = SynthesisJob {
        text: response.to_string(),
        output_path,
        session_id: Some(ctx.session_id.clone()),
        concept_name: Some(concept_name.to_string()),
        attempt_number: Some(attempt_number as i32),
    };
    match state.synth_queue.send(job).await {
        Ok(()) => Some(StorageLayout::user_file_url(
            &ctx.participant_id,
            ctx.trial_type,
            &filename,
        )),
        Err(_) => {
            warn!("synthesis queue closed; reply ships without audio");
            None
        }
    }
}
