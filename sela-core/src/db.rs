use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn create_pool(config: &DatabaseConfig) -> Result<Option<PgPool>, sqlx::Error> {
    let url = match &config.url {
        Some(u) => u,
        None => return Ok(None),
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(url)
        .await?;
    Ok(Some(pool))
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Idempotent schema creation, run once at startup.
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    const STATEMENTS: &[&str] = &[
        r#"
        CREATE TABLE IF NOT EXISTS participants (
            id SERIAL PRIMARY KEY,
            participant_id TEXT UNIQUE NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id SERIAL PRIMARY KEY,
            session_id TEXT UNIQUE NOT NULL,
            participant_id TEXT NOT NULL REFERENCES participants(participant_id),
            trial_type TEXT NOT NULL,
            version TEXT NOT NULL,
            started_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            completed_at TIMESTAMPTZ
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS interactions (
            id SERIAL PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(session_id),
            speaker TEXT NOT NULL,
            concept_name TEXT NOT NULL,
            message TEXT NOT NULL,
            attempt_number INT NOT NULL DEFAULT 1,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS recordings (
            id SERIAL PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(session_id),
            recording_type TEXT NOT NULL,
            file_path TEXT NOT NULL,
            original_filename TEXT,
            file_size BIGINT,
            concept_name TEXT,
            attempt_number INT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        // Defined by the study schema; nothing in the main flow writes it.
        r#"
        CREATE TABLE IF NOT EXISTS user_events (
            id SERIAL PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(session_id),
            event_type TEXT NOT NULL,
            event_data JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    ];

    for stmt in STATEMENTS {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
