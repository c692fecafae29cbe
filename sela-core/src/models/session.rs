use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SelaError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: i32,
    pub session_id: String,
    pub participant_id: String,
    pub trial_type: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Experimental condition label. Controls session categorization and the
/// on-disk folder the participant's data lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialType {
    Trial1,
    Trial2,
    Test,
}

impl TrialType {
    pub fn parse(s: &str) -> Result<Self, SelaError> {
        match s {
            "Trial_1" => Ok(Self::Trial1),
            "Trial_2" => Ok(Self::Trial2),
            "Test" => Ok(Self::Test),
            other => Err(SelaError::InvalidTrialType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial1 => "Trial_1",
            Self::Trial2 => "Trial_2",
            Self::Test => "Test",
        }
    }

    /// Folder name under `user_data/{participant_id}/`.
    pub fn folder_name(&self) -> &'static str {
        match self {
            Self::Trial1 => "main_task_1",
            Self::Trial2 => "main_task_2",
            Self::Test => "test_task",
        }
    }
}

/// `{participant_id}_{YYYYmmddHHMMSS}_{8 hex chars}` — unique per setup call.
pub fn new_session_id(participant_id: &str) -> String {
    let ts = Utc::now().format("%Y%m%d%H%M%S");
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
    format!("{}_{}_{}", participant_id, ts, suffix)
}

/// Interaction id used in the conversation-log header:
/// `{participant_id}_{YYYYmmddHHMMSS}`.
pub fn new_interaction_id(participant_id: &str) -> String {
    let ts = Utc::now().format("%Y%m%d%H%M%S");
    format!("{}_{}", participant_id, ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trial_type_round_trip() {
        for s in ["Trial_1", "Trial_2", "Test"] {
            assert_eq!(TrialType::parse(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn test_trial_type_rejects_unknown() {
        assert!(TrialType::parse("Trial_3").is_err());
        assert!(TrialType::parse("").is_err());
    }

    #[test]
    fn test_folder_names() {
        assert_eq!(TrialType::Trial1.folder_name(), "main_task_1");
        assert_eq!(TrialType::Trial2.folder_name(), "main_task_2");
        assert_eq!(TrialType::Test.folder_name(), "test_task");
    }

    #[test]
    fn test_session_id_shape() {
        let id = new_session_id("P07");
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "P07");
        assert_eq!(parts[1].len(), 14);
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(new_session_id("P1"), new_session_id("P1"));
    }
}
