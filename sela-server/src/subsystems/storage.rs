//! On-disk layout for participant data and generated audio.
//!
//! Everything lives under a single storage root:
//!
//! ```text
//! <root>/
//!   intro_audio/                  shared generated prompts
//!   concept_audio/                per-concept explanation audio
//!   user_data/<pid>/<task>/       one folder per participant and trial
//!       conversation_log_<pid>.txt
//!       screen_recordings/
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;

use sela_core::models::TrialType;

/// Resolves every path the server reads or writes under the storage root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn intro_audio_dir(&self) -> PathBuf {
        self.root.join("intro_audio")
    }

    pub fn concept_audio_dir(&self) -> PathBuf {
        self.root.join("concept_audio")
    }

    pub fn user_data_dir(&self) -> PathBuf {
        self.root.join("user_data")
    }

    /// Creates the shared directories. Per-participant folders are created
    /// lazily when a trial starts.
    pub fn ensure_base_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(self.intro_audio_dir())?;
        fs::create_dir_all(self.concept_audio_dir())?;
        fs::create_dir_all(self.user_data_dir())?;
        Ok(())
    }

    pub fn task_dir(&self, participant_id: &str, trial: TrialType) -> PathBuf {
        self.user_data_dir()
            .join(sanitize_component(participant_id))
            .join(trial.folder_name())
    }

    pub fn screen_recordings_dir(&self, participant_id: &str, trial: TrialType) -> PathBuf {
        self.task_dir(participant_id, trial).join("screen_recordings")
    }

    pub fn ensure_task_dirs(&self, participant_id: &str, trial: TrialType) -> io::Result<PathBuf> {
        let dir = self.task_dir(participant_id, trial);
        fs::create_dir_all(dir.join("screen_recordings"))?;
        Ok(dir)
    }

    // ========================================================================
    // Conversation log
    // ========================================================================

    pub fn log_path(&self, participant_id: &str, trial: TrialType) -> PathBuf {
        self.task_dir(participant_id, trial)
            .join(format!("conversation_log_{}.txt", sanitize_component(participant_id)))
    }

    /// Writes the log header for a fresh trial, truncating any earlier log
    /// for the same participant and trial.
    pub fn init_log(
        &self,
        participant_id: &str,
        trial: TrialType,
        interaction_id: &str,
        version_tag: &str,
    ) -> io::Result<()> {
        self.ensure_task_dirs(participant_id, trial)?;
        let path = self.log_path(participant_id, trial);
        let mut file = fs::File::create(path)?;
        writeln!(file, "{}", "=".repeat(80))?;
        writeln!(file, "CONVERSATION LOG")?;
        writeln!(file, "{}", "=".repeat(80))?;
        writeln!(file)?;
        writeln!(file, "PARTICIPANT ID: {participant_id}")?;
        writeln!(file, "INTERACTION ID: {interaction_id}")?;
        writeln!(file, "VERSION: {version_tag}")?;
        writeln!(file, "TRIAL: {}", trial.as_str())?;
        writeln!(file, "TIMESTAMP: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(file)?;
        writeln!(file, "{}", "-".repeat(80))?;
        writeln!(file)?;
        Ok(())
    }

    /// Appends one utterance. The log is the durable transcript even when no
    /// database is configured, so failures here surface to the caller.
    pub fn append_log(
        &self,
        participant_id: &str,
        trial: TrialType,
        speaker: &str,
        text: &str,
    ) -> io::Result<()> {
        let path = self.log_path(participant_id, trial);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(
            file,
            "[{}] {speaker}: {text}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(file)?;
        Ok(())
    }

    // ========================================================================
    // Audio filenames
    // ========================================================================

    /// Filename for an utterance tied to a graded attempt, e.g.
    /// `user_Correlation_2_P01.wav`.
    pub fn attempt_audio_filename(
        prefix: &str,
        concept: &str,
        attempt_number: u32,
        participant_id: &str,
        ext: &str,
    ) -> String {
        format!(
            "{prefix}_{}_{attempt_number}_{}.{ext}",
            sanitize_component(concept),
            sanitize_component(participant_id)
        )
    }

    /// Filename for shared generated audio, e.g. `concept_Correlation.mp3`.
    pub fn general_audio_filename(prefix: &str, concept: Option<&str>) -> String {
        match concept {
            Some(name) => format!("{prefix}_{}.mp3", sanitize_component(name)),
            None => format!("{prefix}.mp3"),
        }
    }

    /// Returns a path in `dir` based on `filename` that does not collide with
    /// an existing file, appending `_1`, `_2`, ... before the extension.
    pub fn unique_path(dir: &Path, filename: &str) -> PathBuf {
        let candidate = dir.join(filename);
        if !candidate.exists() {
            return candidate;
        }
        let (stem, ext) = match filename.rsplit_once('.') {
            Some((s, e)) => (s.to_string(), Some(e.to_string())),
            None => (filename.to_string(), None),
        };
        for n in 1.. {
            let name = match &ext {
                Some(e) => format!("{stem}_{n}.{e}"),
                None => format!("{stem}_{n}"),
            };
            let candidate = dir.join(&name);
            if !candidate.exists() {
                return candidate;
            }
        }
        unreachable!()
    }

    /// URL path under which a stored participant file is served back.
    pub fn user_file_url(participant_id: &str, trial: TrialType, filename: &str) -> String {
        format!(
            "/media/user/{}/{}/{filename}",
            sanitize_component(participant_id),
            trial.folder_name()
        )
    }
}

/// Reduces a caller-supplied name to a safe single path component: spaces
/// become underscores, anything outside `[A-Za-z0-9._-]` is dropped, and
/// leading dots are stripped so the result can never traverse upward.
pub fn sanitize_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('_');
        }
    }
    let trimmed = out.trim_start_matches('.').to_string();
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sanitize_strips_traversal() {
        assert_eq!(sanitize_component("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_component("my file.webm"), "my_file.webm");
        assert_eq!(sanitize_component(".hidden"), "hidden");
        assert_eq!(sanitize_component("///"), "file");
    }

    #[test]
    fn test_attempt_audio_filename() {
        let name = StorageLayout::attempt_audio_filename("user", "Correlation", 2, "P01", "wav");
        assert_eq!(name, "user_Correlation_2_P01.wav");
    }

    #[test]
    fn test_general_audio_filename() {
        assert_eq!(
            StorageLayout::general_audio_filename("concept", Some("Confounders")),
            "concept_Confounders.mp3"
        );
        assert_eq!(StorageLayout::general_audio_filename("intro", None), "intro.mp3");
    }

    #[test]
    fn test_log_header_and_append() {
        let dir = tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        layout
            .init_log("P01", TrialType::Trial1, "P01_20250101120000_deadbeef", "v2")
            .unwrap();
        layout.append_log("P01", TrialType::Trial1, "USER", "hello").unwrap();
        layout.append_log("P01", TrialType::Trial1, "AI", "hi there").unwrap();

        let text = std::fs::read_to_string(layout.log_path("P01", TrialType::Trial1)).unwrap();
        assert!(text.starts_with(&"=".repeat(80)));
        assert!(text.contains("CONVERSATION LOG"));
        assert!(text.contains("PARTICIPANT ID: P01"));
        assert!(text.contains("TRIAL: Trial_1"));
        assert!(text.contains("] USER: hello"));
        assert!(text.contains("] AI: hi there"));
    }

    #[test]
    fn test_init_log_truncates_previous() {
        let dir = tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        layout.init_log("P01", TrialType::Test, "id1", "v2").unwrap();
        layout.append_log("P01", TrialType::Test, "USER", "stale").unwrap();
        layout.init_log("P01", TrialType::Test, "id2", "v2").unwrap();

        let text = std::fs::read_to_string(layout.log_path("P01", TrialType::Test)).unwrap();
        assert!(!text.contains("stale"));
        assert!(text.contains("INTERACTION ID: id2"));
    }

    #[test]
    fn test_unique_path_appends_counter() {
        let dir = tempdir().unwrap();
        let first = StorageLayout::unique_path(dir.path(), "rec.webm");
        assert_eq!(first, dir.path().join("rec.webm"));
        std::fs::write(&first, b"x").unwrap();

        let second = StorageLayout::unique_path(dir.path(), "rec.webm");
        assert_eq!(second, dir.path().join("rec_1.webm"));
        std::fs::write(&second, b"x").unwrap();

        let third = StorageLayout::unique_path(dir.path(), "rec.webm");
        assert_eq!(third, dir.path().join("rec_2.webm"));
    }

    #[test]
    fn test_task_dir_uses_trial_folder() {
        let layout = StorageLayout::new("/data");
        assert_eq!(
            layout.task_dir("P01", TrialType::Trial2),
            PathBuf::from("/data/user_data/P01/main_task_2")
        );
    }
}
