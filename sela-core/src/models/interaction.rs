use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Interaction {
    pub id: i32,
    pub session_id: String,
    pub speaker: String,
    pub concept_name: String,
    pub message: String,
    pub attempt_number: i32,
    pub created_at: DateTime<Utc>,
}

/// Who produced a logged line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Ai,
    System,
}

impl Speaker {
    /// Uppercase form used in both the DB and the text log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Ai => "AI",
            Self::System => "SYSTEM",
        }
    }
}
