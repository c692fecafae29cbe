//! Speech adapters — hosted speech-to-text and text-to-speech.
//!
//! Both directions follow the same shape: a `Transcriber` / `Synthesizer`
//! trait, a hosted OpenAI-compatible client, and a fallback wrapper that
//! degrades to `Ok(None)` instead of propagating errors, so the dialogue
//! path can answer with a canned message rather than a 500.
//!
//! The hosted transcriber memoizes results in a size-bounded in-memory
//! cache keyed by file path; repeat submissions of the same upload skip
//! the network round trip.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Audio file not found: {path}")]
    FileNotFound { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

// ============================================================================
// Traits
// ============================================================================

/// Audio file in, transcript out. `Ok(None)` signals graceful degradation
/// (fallback mode) — the caller substitutes a canned failure reply.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<Option<String>, SpeechError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Feedback text in, encoded MP3 bytes out. Same `Ok(None)` degradation
/// contract as [`Transcriber`].
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Option<Vec<u8>>, SpeechError>;

    fn name(&self) -> &str;
}

// ============================================================================
// Config types
// ============================================================================

#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub api_key: String,
    pub model: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub cache_entries: usize,
}

impl TranscriptionConfig {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model,
            max_retries: 3,
            retry_delay_ms: 1000,
            cache_entries: 32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub chunk_chars: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl SynthesisConfig {
    pub fn new(api_key: Option<String>, model: String, voice: String, chunk_chars: usize) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model,
            voice,
            chunk_chars,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

// ============================================================================
// HostedTranscriber
// ============================================================================

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct HostedTranscriber {
    client: Client,
    config: TranscriptionConfig,
    base_url: String,
    cache: Mutex<HashMap<PathBuf, String>>,
}

impl HostedTranscriber {
    pub fn new(config: TranscriptionConfig, base_url: String) -> Result<Self, SpeechError> {
        if config.api_key.is_empty() {
            return Err(SpeechError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
            cache: Mutex::new(HashMap::new()),
        })
    }

    async fn transcribe_uncached(&self, audio_path: &Path) -> Result<String, SpeechError> {
        if !audio_path.exists() {
            return Err(SpeechError::FileNotFound {
                path: audio_path.display().to_string(),
            });
        }

        let bytes = tokio::fs::read(audio_path).await?;
        let filename = audio_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = Retry::spawn(retry_strategy, || {
            self.transcribe_once(bytes.clone(), filename.clone())
        })
        .await;

        match result {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All transcription retry attempts failed"
                );
                Err(SpeechError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    async fn transcribe_once(&self, bytes: Vec<u8>, filename: String) -> Result<String, SpeechError> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(filename))
            .text("model", self.config.model.clone());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), message = %message, "Transcription API error");
            return Err(SpeechError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: TranscriptionResponse = response.json().await?;
        Ok(parsed.text)
    }

    fn cache_get(&self, path: &Path) -> Option<String> {
        self.cache.lock().expect("cache lock").get(path).cloned()
    }

    fn cache_put(&self, path: &Path, text: &str) {
        let mut cache = self.cache.lock().expect("cache lock");
        if cache.len() >= self.config.cache_entries {
            // Bounded memoization, not an LRU; evicting any entry keeps the cap.
            if let Some(victim) = cache.keys().next().cloned() {
                cache.remove(&victim);
            }
        }
        cache.insert(path.to_path_buf(), text.to_string());
    }
}

#[async_trait]
impl Transcriber for HostedTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<Option<String>, SpeechError> {
        if let Some(hit) = self.cache_get(audio_path) {
            tracing::debug!(path = %audio_path.display(), "Transcript cache hit");
            return Ok(Some(hit));
        }

        let text = self.transcribe_uncached(audio_path).await?;
        self.cache_put(audio_path, &text);
        Ok(Some(text))
    }

    fn name(&self) -> &str {
        "hosted-whisper"
    }
}

/// On any transcription error, logs a warning and returns `Ok(None)` so the
/// dialogue path degrades to an "audio processing failed" reply.
pub struct FallbackTranscriber {
    inner: HostedTranscriber,
}

impl FallbackTranscriber {
    pub fn new(config: TranscriptionConfig, base_url: String) -> Result<Self, SpeechError> {
        Ok(Self {
            inner: HostedTranscriber::new(config, base_url)?,
        })
    }
}

#[async_trait]
impl Transcriber for FallbackTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<Option<String>, SpeechError> {
        match self.inner.transcribe(audio_path).await {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %audio_path.display(),
                    "Transcription failed — degrading to canned reply"
                );
                Ok(None)
            }
        }
    }

    fn name(&self) -> &str {
        "hosted-whisper-fallback"
    }
}

// ============================================================================
// HostedSynthesizer
// ============================================================================

pub struct HostedSynthesizer {
    client: Client,
    config: SynthesisConfig,
    base_url: String,
}

impl HostedSynthesizer {
    pub fn new(config: SynthesisConfig, base_url: String) -> Result<Self, SpeechError> {
        if config.api_key.is_empty() {
            return Err(SpeechError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// Synthesize one chunk with retries.
    async fn synthesize_chunk(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = Retry::spawn(retry_strategy, || self.synthesize_once(text)).await;

        match result {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All synthesis retry attempts failed"
                );
                Err(SpeechError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    async fn synthesize_once(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let url = format!("{}/v1/audio/speech", self.base_url);

        let body = serde_json::json!({
            "model": self.config.model,
            "voice": self.config.voice,
            "input": text,
            "response_format": "mp3",
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), message = %message, "Synthesis API error");
            return Err(SpeechError::Api {
                code: status.as_u16(),
                message,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Synthesizer for HostedSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Option<Vec<u8>>, SpeechError> {
        let mut combined = Vec::new();
        for chunk in split_text(text, self.config.chunk_chars) {
            let segment = self.synthesize_chunk(&chunk).await?;
            combined.extend_from_slice(&segment);
        }
        Ok(Some(combined))
    }

    fn name(&self) -> &str {
        "hosted-tts"
    }
}

/// `Ok(None)` on any synthesis error; the caller skips the audio artifact
/// and only the text reply reaches the learner.
pub struct FallbackSynthesizer {
    inner: HostedSynthesizer,
}

impl FallbackSynthesizer {
    pub fn new(config: SynthesisConfig, base_url: String) -> Result<Self, SpeechError> {
        Ok(Self {
            inner: HostedSynthesizer::new(config, base_url)?,
        })
    }
}

#[async_trait]
impl Synthesizer for FallbackSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Option<Vec<u8>>, SpeechError> {
        match self.inner.synthesize(text).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::warn!(error = %e, "Synthesis failed; reply will ship without audio");
                Ok(None)
            }
        }
    }

    fn name(&self) -> &str {
        "hosted-tts-fallback"
    }
}

/// Stand-in used when no API key is configured. Audio features quietly
/// produce nothing and the rest of the service runs normally.
pub struct DisabledTranscriber;

#[async_trait]
impl Transcriber for DisabledTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> Result<Option<String>, SpeechError> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

pub struct DisabledSynthesizer;

#[async_trait]
impl Synthesizer for DisabledSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<Option<Vec<u8>>, SpeechError> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Split `text` into chunks of at most `max_chars` characters, preferring
/// whitespace boundaries. MP3 segments concatenate frame-by-frame, so the
/// joined output plays through.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if max_chars == 0 || chars.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let hard_end = (start + max_chars).min(chars.len());
        let mut end = hard_end;
        if hard_end < chars.len() {
            // Walk back to the last whitespace inside the budget.
            if let Some(ws) = (start..hard_end).rev().find(|&i| chars[i].is_whitespace()) {
                if ws > start {
                    end = ws;
                }
            }
        }
        let chunk: String = chars[start..end].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        start = if end > start { end } else { start + max_chars };
    }
    chunks
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stt_config() -> TranscriptionConfig {
        TranscriptionConfig {
            api_key: "test-key".to_string(),
            model: "whisper-1".to_string(),
            max_retries: 2,
            retry_delay_ms: 20,
            cache_entries: 2,
        }
    }

    fn tts_config(chunk_chars: usize) -> SynthesisConfig {
        SynthesisConfig {
            api_key: "test-key".to_string(),
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            chunk_chars,
            max_retries: 2,
            retry_delay_ms: 20,
        }
    }

    fn temp_audio() -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        f.write_all(b"RIFFfakewavdata").unwrap();
        f
    }

    #[tokio::test]
    async fn test_transcribe_returns_text() {
        let server = MockServer::start().await;
        let t = HostedTranscriber::new(stt_config(), server.uri()).unwrap();
        let audio = temp_audio();

        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "correlation is not causation"
            })))
            .mount(&server)
            .await;

        let text = t.transcribe(audio.path()).await.unwrap();
        assert_eq!(text.as_deref(), Some("correlation is not causation"));
    }

    #[tokio::test]
    async fn test_transcribe_memoizes_by_path() {
        let server = MockServer::start().await;
        let t = HostedTranscriber::new(stt_config(), server.uri()).unwrap();
        let audio = temp_audio();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "once only"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let first = t.transcribe(audio.path()).await.unwrap();
        let second = t.transcribe(audio.path()).await.unwrap();
        assert_eq!(first, second);
        // Mock expectation of exactly one call is verified on drop.
    }

    #[tokio::test]
    async fn test_transcript_cache_is_bounded() {
        let server = MockServer::start().await;
        let t = HostedTranscriber::new(stt_config(), server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "x"
            })))
            .mount(&server)
            .await;

        let files: Vec<_> = (0..4).map(|_| temp_audio()).collect();
        for f in &files {
            t.transcribe(f.path()).await.unwrap();
        }
        assert!(t.cache.lock().unwrap().len() <= 2);
    }

    #[tokio::test]
    async fn test_transcribe_missing_file_is_error() {
        let server = MockServer::start().await;
        let t = HostedTranscriber::new(stt_config(), server.uri()).unwrap();

        let result = t.transcribe(Path::new("/nonexistent/audio.wav")).await;
        assert!(matches!(result, Err(SpeechError::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn test_fallback_transcriber_returns_none_on_api_error() {
        let server = MockServer::start().await;
        let t = FallbackTranscriber::new(stt_config(), server.uri()).unwrap();
        let audio = temp_audio();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let result = t.transcribe(audio.path()).await;
        assert!(result.is_ok(), "Fallback must not propagate errors");
        assert!(result.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_synthesize_returns_bytes() {
        let server = MockServer::start().await;
        let s = HostedSynthesizer::new(tts_config(500), server.uri()).unwrap();

        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"MP3DATA".to_vec()))
            .mount(&server)
            .await;

        let bytes = s.synthesize("short text").await.unwrap().unwrap();
        assert_eq!(bytes, b"MP3DATA");
    }

    #[tokio::test]
    async fn test_synthesize_concatenates_chunks() {
        let server = MockServer::start().await;
        let s = HostedSynthesizer::new(tts_config(10), server.uri()).unwrap();

        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"SEG".to_vec()))
            .expect(4)
            .mount(&server)
            .await;

        let text = "one two three four five six"; // splits into 4 chunks of <= 10 chars
        let bytes = s.synthesize(text).await.unwrap().unwrap();
        assert_eq!(bytes, b"SEGSEGSEGSEG");
    }

    #[tokio::test]
    async fn test_fallback_synthesizer_returns_none_on_api_error() {
        let server = MockServer::start().await;
        let s = FallbackSynthesizer::new(tts_config(500), server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let result = s.synthesize("hello").await;
        assert!(result.is_ok());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_split_text_short_input_is_one_chunk() {
        assert_eq!(split_text("hello world", 500), vec!["hello world"]);
    }

    #[test]
    fn test_split_text_respects_budget_and_whitespace() {
        let chunks = split_text("one two three four five six", 10);
        assert!(chunks.len() >= 3);
        for c in &chunks {
            assert!(c.chars().count() <= 10, "chunk too long: {:?}", c);
            assert!(!c.starts_with(' ') && !c.ends_with(' '));
        }
        assert_eq!(chunks.join(" "), "one two three four five six");
    }

    #[test]
    fn test_split_text_handles_unbroken_runs() {
        let chunks = split_text("abcdefghijklmnop", 5);
        assert_eq!(chunks.join(""), "abcdefghijklmnop");
        for c in &chunks {
            assert!(c.chars().count() <= 5);
        }
    }
}
