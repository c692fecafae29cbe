//! Best-effort persistence over Postgres.
//!
//! The text log under `user_data/` is the durable record; database rows are
//! supplementary. When no `DATABASE_URL` is configured the pool is absent and
//! every write becomes a logged no-op, and a failed write never aborts the
//! participant-facing request.

use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;

use sela_core::models::{Interaction, Session};

// ============================================================================
// Writes (never fail the request)
// ============================================================================

pub async fn ensure_participant(pool: Option<&PgPool>, participant_id: &str) {
    let Some(pool) = pool else {
        return;
    };
    let res = sqlx::query(
        "INSERT INTO participants (participant_id) VALUES ($1)
         ON CONFLICT (participant_id) DO NOTHING",
    )
    .bind(participant_id)
    .execute(pool)
    .await;
    if let Err(e) = res {
        warn!(participant_id, error = %e, "failed to upsert participant row");
    }
}

pub async fn create_session(
    pool: Option<&PgPool>,
    session_id: &str,
    participant_id: &str,
    trial_type: &str,
    version: &str,
) {
    let Some(pool) = pool else {
        return;
    };
    let res = sqlx::query(
        "INSERT INTO sessions (session_id, participant_id, trial_type, version)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (session_id) DO NOTHING",
    )
    .bind(session_id)
    .bind(participant_id)
    .bind(trial_type)
    .bind(version)
    .execute(pool)
    .await;
    if let Err(e) = res {
        warn!(session_id, error = %e, "failed to insert session row");
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn save_interaction(
    pool: Option<&PgPool>,
    session_id: &str,
    speaker: &str,
    concept_name: &str,
    message: &str,
    attempt_number: i32,
) {
    let Some(pool) = pool else {
        return;
    };
    let res = sqlx::query(
        "INSERT INTO interactions (session_id, speaker, concept_name, message, attempt_number)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(session_id)
    .bind(speaker)
    .bind(concept_name)
    .bind(message)
    .bind(attempt_number)
    .execute(pool)
    .await;
    if let Err(e) = res {
        warn!(session_id, speaker, error = %e, "failed to insert interaction row");
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn save_recording(
    pool: Option<&PgPool>,
    session_id: &str,
    recording_type: &str,
    file_path: &str,
    original_filename: Option<&str>,
    file_size: Option<i64>,
    concept_name: Option<&str>,
    attempt_number: Option<i32>,
) {
    let Some(pool) = pool else {
        return;
    };
    let res = sqlx::query(
        "INSERT INTO recordings
             (session_id, recording_type, file_path, original_filename,
              file_size, concept_name, attempt_number)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(session_id)
    .bind(recording_type)
    .bind(file_path)
    .bind(original_filename)
    .bind(file_size)
    .bind(concept_name)
    .bind(attempt_number)
    .execute(pool)
    .await;
    if let Err(e) = res {
        warn!(session_id, recording_type, error = %e, "failed to insert recording row");
    }
}

// ============================================================================
// Reads (for the dashboard and exports)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub participants: i64,
    pub sessions: i64,
    pub interactions: i64,
    pub recordings: i64,
}

pub async fn dashboard_stats(pool: &PgPool) -> Result<DashboardStats, sqlx::Error> {
    let participants: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM participants")
        .fetch_one(pool)
        .await?;
    let sessions: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
        .fetch_one(pool)
        .await?;
    let interactions: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM interactions")
        .fetch_one(pool)
        .await?;
    let recordings: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recordings")
        .fetch_one(pool)
        .await?;
    Ok(DashboardStats {
        participants: participants.0,
        sessions: sessions.0,
        interactions: interactions.0,
        recordings: recordings.0,
    })
}

/// Recordings row count for the diagnostics snapshot.
pub async fn recordings_count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recordings")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Newest sessions first, for the dashboard.
pub async fn recent_sessions(pool: &PgPool, limit: i64) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        "SELECT id, session_id, participant_id, trial_type, version,
                started_at, completed_at
         FROM sessions
         ORDER BY started_at DESC
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Most recent session per participant, newest first.
pub async fn latest_sessions(pool: &PgPool) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        "SELECT DISTINCT ON (participant_id)
                id, session_id, participant_id, trial_type, version,
                started_at, completed_at
         FROM sessions
         ORDER BY participant_id, started_at DESC",
    )
    .fetch_all(pool)
    .await
}

pub async fn interactions_for_sessions(
    pool: &PgPool,
    session_ids: &[String],
) -> Result<Vec<Interaction>, sqlx::Error> {
    sqlx::query_as::<_, Interaction>(
        "SELECT id, session_id, speaker, concept_name, message,
                attempt_number, created_at
         FROM interactions
         WHERE session_id = ANY($1)
         ORDER BY session_id, created_at, id",
    )
    .bind(session_ids)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    // Write helpers must be silent no-ops without a configured pool; the
    // request path calls them unconditionally.
    #[tokio::test]
    async fn test_writes_skip_without_pool() {
        ensure_participant(None, "P01").await;
        create_session(None, "sid", "P01", "Trial_1", "v2").await;
        save_interaction(None, "sid", "USER", "Correlation", "hello", 1).await;
        save_recording(None, "sid", "screen", "/tmp/x.webm", None, None, None, None).await;
    }
}
