//! Researcher-facing exports: ZIP archives of collected data, a file
//! browser over the storage root, and a diagnostics snapshot.

use std::io::{Cursor, Write};
use std::path::Path;

use serde::Serialize;
use sqlx::PgPool;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::persist;

/// Top-level folder name inside the complete-data archive.
const EXPORT_ROOT: &str = "Exported_Data";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("nothing to export")]
    Empty,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

fn zip_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Archives every file under `root` beneath an `Exported_Data/` prefix.
/// Errors with [`ExportError::Empty`] when no files exist yet.
pub fn build_complete_zip(root: &Path) -> Result<Vec<u8>, ExportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip_options();
    let mut files = 0usize;

    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        zip.start_file(format!("{EXPORT_ROOT}/{rel}"), options)?;
        zip.write_all(&std::fs::read(entry.path())?)?;
        files += 1;
    }

    if files == 0 {
        return Err(ExportError::Empty);
    }
    debug!(files, "complete export built");
    Ok(zip.finish()?.into_inner())
}

/// Archive with two CSVs covering the most recent session per participant:
/// `sessions.csv` and `interactions.csv`.
pub async fn build_latest_sessions_zip(pool: &PgPool) -> Result<Vec<u8>, ExportError> {
    let sessions = persist::latest_sessions(pool).await?;
    if sessions.is_empty() {
        return Err(ExportError::Empty);
    }
    let ids: Vec<String> = sessions.iter().map(|s| s.session_id.clone()).collect();
    let interactions = persist::interactions_for_sessions(pool, &ids).await?;

    let mut sessions_csv = csv::Writer::from_writer(Vec::new());
    sessions_csv.write_record([
        "session_id",
        "participant_id",
        "trial_type",
        "version",
        "started_at",
        "completed_at",
    ])?;
    for s in &sessions {
        sessions_csv.write_record([
            s.session_id.as_str(),
            s.participant_id.as_str(),
            s.trial_type.as_str(),
            s.version.as_str(),
            &s.started_at.to_rfc3339(),
            &s.completed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ])?;
    }

    let mut interactions_csv = csv::Writer::from_writer(Vec::new());
    interactions_csv.write_record([
        "session_id",
        "speaker",
        "concept_name",
        "attempt_number",
        "message",
        "created_at",
    ])?;
    for i in &interactions {
        interactions_csv.write_record([
            i.session_id.as_str(),
            i.speaker.as_str(),
            i.concept_name.as_str(),
            &i.attempt_number.to_string(),
            i.message.as_str(),
            &i.created_at.to_rfc3339(),
        ])?;
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip_options();
    zip.start_file("sessions.csv", options)?;
    zip.write_all(&sessions_csv.into_inner().map_err(|e| e.into_error())?)?;
    zip.start_file("interactions.csv", options)?;
    zip.write_all(&interactions_csv.into_inner().map_err(|e| e.into_error())?)?;
    Ok(zip.finish()?.into_inner())
}

// ============================================================================
// File browser and diagnostics
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub modified: Option<String>,
}

/// Flat listing of every file under the storage root, relative paths,
/// sorted for stable output.
pub fn browse_files(root: &Path) -> Vec<FileEntry> {
    let mut entries: Vec<FileEntry> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let meta = e.metadata().ok();
            FileEntry {
                path: e
                    .path()
                    .strip_prefix(root)
                    .unwrap_or(e.path())
                    .to_string_lossy()
                    .replace('\\', "/"),
                size: meta.as_ref().map(|m| m.len()).unwrap_or(0),
                modified: meta.and_then(|m| m.modified().ok()).map(|t| {
                    chrono::DateTime::<chrono::Local>::from(t)
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string()
                }),
            }
        })
        .collect();
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

#[derive(Debug, Serialize)]
pub struct Diagnostics {
    pub version: String,
    pub uptime_secs: u64,
    pub current_working_directory: String,
    pub storage_root: String,
    pub storage_root_exists: bool,
    pub storage_files: usize,
    pub storage_bytes: u64,
    pub database_configured: bool,
    /// Recordings rows in the database; `None` when running file-only or
    /// the count query fails.
    pub recordings_in_db: Option<i64>,
    pub chat_enabled: bool,
    pub transcriber: String,
    pub synthesizer: String,
    pub concepts: Vec<String>,
    pub active_sessions: usize,
    /// Which deployment variables are present, values withheld.
    pub environment: EnvPresence,
}

#[derive(Debug, Serialize)]
pub struct EnvPresence {
    pub database_url: bool,
    pub openai_api_key: bool,
    pub port: bool,
}

impl EnvPresence {
    pub fn probe() -> Self {
        let set = |k: &str| std::env::var(k).map(|v| !v.is_empty()).unwrap_or(false);
        Self {
            database_url: set("DATABASE_URL"),
            openai_api_key: set("OPENAI_API_KEY"),
            port: set("PORT"),
        }
    }
}

pub fn storage_usage(root: &Path) -> (usize, u64) {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(n, bytes), e| {
            (n + 1, bytes + e.metadata().map(|m| m.len()).unwrap_or(0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_complete_zip_empty_root() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            build_complete_zip(dir.path()),
            Err(ExportError::Empty)
        ));
    }

    #[test]
    fn test_complete_zip_contains_prefixed_entries() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("user_data/P01/test_task")).unwrap();
        fs::write(
            dir.path().join("user_data/P01/test_task/conversation_log_P01.txt"),
            b"hello",
        )
        .unwrap();

        let bytes = build_complete_zip(dir.path()).unwrap();
        // PK zip magic.
        assert_eq!(&bytes[..2], b"PK");

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);
        let name = archive.by_index(0).unwrap().name().to_string();
        assert_eq!(
            name,
            "Exported_Data/user_data/P01/test_task/conversation_log_P01.txt"
        );
    }

    #[test]
    fn test_browse_files_relative_sorted() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/two.txt"), b"22").unwrap();
        fs::write(dir.path().join("a.txt"), b"1").unwrap();

        let entries = browse_files(dir.path());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "a.txt");
        assert_eq!(entries[0].size, 1);
        assert_eq!(entries[1].path, "b/two.txt");
    }

    #[test]
    fn test_storage_usage_counts_files_and_bytes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x"), b"abc").unwrap();
        fs::write(dir.path().join("y"), b"de").unwrap();
        assert_eq!(storage_usage(dir.path()), (2, 5));
    }
}
