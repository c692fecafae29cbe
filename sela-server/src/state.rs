//! Shared application state.

use std::sync::Arc;
use std::time::Instant;

use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{info, warn};

use sela_core::{
    ChatClient, ChatConfig, ConceptLibrary, DisabledSynthesizer, DisabledTranscriber,
    FallbackSynthesizer, FallbackTranscriber, SelaConfig, SynthesisConfig, Synthesizer,
    Transcriber, TranscriptionConfig,
};

use crate::sessions::SessionRegistry;
use crate::subsystems::storage::StorageLayout;
use crate::subsystems::synthesis::SynthesisJob;

const SYNTH_QUEUE_DEPTH: usize = 64;

/// Last navigation event that was written to the log, for deduplication.
#[derive(Debug, Clone)]
pub struct NavMark {
    pub slide: String,
    pub concept: String,
    pub at: Instant,
}

pub struct AppState {
    pub config: SelaConfig,
    pub pool: Option<PgPool>,
    pub concepts: ConceptLibrary,
    pub layout: StorageLayout,
    pub sessions: SessionRegistry,
    /// Absent when no API key is configured; tutor replies degrade to a
    /// canned error string.
    pub chat: Option<ChatClient>,
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub synth_queue: mpsc::Sender<SynthesisJob>,
    /// Name of the concept whose explanation audio was generated last.
    /// Guards against serving a stale file while a new one is written.
    pub concept_audio_guard: tokio::sync::Mutex<Option<String>>,
    /// Last accepted navigation event, for debouncing duplicate clicks.
    pub nav_guard: std::sync::Mutex<Option<NavMark>>,
    pub started_at: Instant,
}

impl AppState {
    /// Wires up every subsystem from config. The caller hands the returned
    /// receiver to [`synthesis::spawn_workers`].
    ///
    /// [`synthesis::spawn_workers`]: crate::subsystems::synthesis::spawn_workers
    pub fn build(
        config: SelaConfig,
        pool: Option<PgPool>,
    ) -> anyhow::Result<(Arc<AppState>, mpsc::Receiver<SynthesisJob>)> {
        let layout = StorageLayout::new(&config.storage.root);
        layout.ensure_base_dirs()?;

        let concepts = ConceptLibrary::load(&config.storage.concepts_file);
        info!(count = concepts.len(), "concept library loaded");

        let chat = match ChatClient::new(
            ChatConfig {
                max_retries: config.llm.max_retries,
                retry_delay_ms: config.llm.retry_delay_ms,
                ..ChatConfig::new(
                    None,
                    config.llm.model.clone(),
                    config.llm.max_tokens,
                    config.llm.temperature,
                )
            },
            config.llm.base_url.clone(),
        ) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "chat client unavailable; tutor replies disabled");
                None
            }
        };

        let transcription = TranscriptionConfig {
            max_retries: config.speech.max_retries,
            retry_delay_ms: config.speech.retry_delay_ms,
            cache_entries: config.speech.transcript_cache_entries,
            ..TranscriptionConfig::new(None, config.speech.transcription_model.clone())
        };
        let transcriber: Arc<dyn Transcriber> = if transcription.api_key.is_empty() {
            warn!("no API key configured; transcription disabled");
            Arc::new(DisabledTranscriber)
        } else {
            Arc::new(FallbackTranscriber::new(
                transcription,
                config.speech.base_url.clone(),
            )?)
        };

        let synthesis = SynthesisConfig {
            max_retries: config.speech.max_retries,
            retry_delay_ms: config.speech.retry_delay_ms,
            ..SynthesisConfig::new(
                None,
                config.speech.synthesis_model.clone(),
                config.speech.synthesis_voice.clone(),
                config.speech.synthesis_chunk_chars,
            )
        };
        let synthesizer: Arc<dyn Synthesizer> = if synthesis.api_key.is_empty() {
            warn!("no API key configured; synthesis disabled");
            Arc::new(DisabledSynthesizer)
        } else {
            Arc::new(FallbackSynthesizer::new(
                synthesis,
                config.speech.base_url.clone(),
            )?)
        };

        let (tx, rx) = mpsc::channel(SYNTH_QUEUE_DEPTH);

        let state = Arc::new(AppState {
            config,
            pool,
            concepts,
            layout,
            sessions: SessionRegistry::new(),
            chat,
            transcriber,
            synthesizer,
            synth_queue: tx,
            concept_audio_guard: tokio::sync::Mutex::new(None),
            nav_guard: std::sync::Mutex::new(None),
            started_at: Instant::now(),
        });
        Ok((state, rx))
    }
}
