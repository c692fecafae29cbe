//! Background text-to-speech workers.
//!
//! Tutor replies return to the browser as text immediately; the matching
//! audio file is produced by a small fixed pool of workers draining a shared
//! queue. The browser polls the file URL until the worker has written it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sela_core::models::RecordingType;
use sela_core::Synthesizer;

use super::persist;

/// One reply to voice. `session_id` etc. feed the recordings table once the
/// file lands on disk.
#[derive(Debug)]
pub struct SynthesisJob {
    pub text: String,
    pub output_path: PathBuf,
    pub session_id: Option<String>,
    pub concept_name: Option<String>,
    pub attempt_number: Option<i32>,
}

/// Spawns `count` workers over a shared receiver. Workers exit when the
/// sending side of the queue is dropped.
pub fn spawn_workers(
    count: usize,
    rx: mpsc::Receiver<SynthesisJob>,
    synthesizer: Arc<dyn Synthesizer>,
    pool: Option<PgPool>,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));
    (0..count)
        .map(|worker_id| {
            let rx = Arc::clone(&rx);
            let synthesizer = Arc::clone(&synthesizer);
            let pool = pool.clone();
            tokio::spawn(async move {
                info!(worker_id, "synthesis worker started");
                loop {
                    let job = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(job) = job else {
                        debug!(worker_id, "synthesis queue closed");
                        break;
                    };
                    run_job(worker_id, job, synthesizer.as_ref(), pool.as_ref()).await;
                }
            })
        })
        .collect()
}

async fn run_job(
    worker_id: usize,
    job: SynthesisJob,
    synthesizer: &dyn Synthesizer,
    pool: Option<&PgPool>,
) {
    match synthesize_to_file(synthesizer, &job.text, &job.output_path).await {
        Ok(true) => {
            debug!(worker_id, path = %job.output_path.display(), "reply audio written");
            if let Some(session_id) = &job.session_id {
                let size = tokio::fs::metadata(&job.output_path)
                    .await
                    .map(|m| m.len() as i64)
                    .ok();
                persist::save_recording(
                    pool,
                    session_id,
                    RecordingType::AiAudio.as_str(),
                    &job.output_path.to_string_lossy(),
                    None,
                    size,
                    job.concept_name.as_deref(),
                    job.attempt_number,
                )
                .await;
            }
        }
        Ok(false) => {
            debug!(worker_id, "synthesizer produced no audio for reply");
        }
        Err(e) => {
            warn!(worker_id, error = %e, "reply synthesis failed");
        }
    }
}

/// Synthesizes `text` into `path` unless the file already exists. Returns
/// whether the file is present afterwards.
pub async fn synthesize_to_file(
    synthesizer: &dyn Synthesizer,
    text: &str,
    path: &Path,
) -> anyhow::Result<bool> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(true);
    }
    let Some(bytes) = synthesizer.synthesize(text).await? else {
        return Ok(false);
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &bytes).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sela_core::SpeechError;
    use tempfile::tempdir;

    struct FixedSynth(Option<Vec<u8>>);

    #[async_trait]
    impl Synthesizer for FixedSynth {
        async fn synthesize(&self, _text: &str) -> Result<Option<Vec<u8>>, SpeechError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_synthesize_to_file_writes_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sub").join("reply.mp3");
        let synth = FixedSynth(Some(b"MP3DATA".to_vec()));
        assert!(synthesize_to_file(&synth, "hello", &path).await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"MP3DATA");
    }

    #[tokio::test]
    async fn test_synthesize_to_file_skips_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reply.mp3");
        std::fs::write(&path, b"OLD").unwrap();
        let synth = FixedSynth(Some(b"NEW".to_vec()));
        assert!(synthesize_to_file(&synth, "hello", &path).await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"OLD");
    }

    #[tokio::test]
    async fn test_synthesize_to_file_none_means_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reply.mp3");
        let synth = FixedSynth(None);
        assert!(!synthesize_to_file(&synth, "hello", &path).await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_workers_drain_queue_and_exit() {
        let dir = tempdir().unwrap();
        let (tx, rx) = mpsc::channel(8);
        let synth: Arc<dyn Synthesizer> = Arc::new(FixedSynth(Some(b"A".to_vec())));
        let handles = spawn_workers(2, rx, synth, None);

        for i in 0..4 {
            tx.send(SynthesisJob {
                text: format!("reply {i}"),
                output_path: dir.path().join(format!("r{i}.mp3")),
                session_id: None,
                concept_name: None,
                attempt_number: None,
            })
            .await
            .unwrap();
        }
        drop(tx);
        for h in handles {
            h.await.unwrap();
        }
        for i in 0..4 {
            assert!(dir.path().join(format!("r{i}.mp3")).exists());
        }
    }
}
