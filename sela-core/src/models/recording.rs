use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recording {
    pub id: i32,
    pub session_id: String,
    pub recording_type: String,
    pub file_path: String,
    pub original_filename: Option<String>,
    pub file_size: Option<i64>,
    pub concept_name: Option<String>,
    pub attempt_number: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingType {
    UserAudio,
    AiAudio,
    Screen,
}

impl RecordingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserAudio => "user_audio",
            Self::AiAudio => "ai_audio",
            Self::Screen => "screen",
        }
    }
}
