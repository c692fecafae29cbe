use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Defined by the study schema but unused by the main flow.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserEvent {
    pub id: i32,
    pub session_id: String,
    pub event_type: String,
    pub event_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
