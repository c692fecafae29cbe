use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct SelaConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub speech: SpeechConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
    /// Version tag recorded on session rows and log-file headers.
    pub version_tag: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Overridden by the DATABASE_URL environment variable. When neither
    /// is set the server runs file-only and skips every DB write.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpeechConfig {
    /// Base URL of the OpenAI-compatible speech API.
    pub base_url: String,
    pub transcription_model: String,
    pub synthesis_model: String,
    pub synthesis_voice: String,
    /// Long synthesis input is split into chunks of at most this many
    /// characters and the resulting MP3 segments concatenated.
    pub synthesis_chunk_chars: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    /// Bounded memoization of transcription results, keyed by file path.
    pub transcript_cache_entries: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible chat completions API.
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    /// Learner text at or above this similarity to the golden answer
    /// short-circuits to the canned "move on" reply without an LLM call.
    pub similarity_threshold: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root of the upload tree (intro_audio/, concept_audio/, user_data/).
    pub root: String,
    /// Path of the concepts JSON file.
    pub concepts_file: String,
    /// Number of synthesis worker tasks.
    #[serde(default = "default_synthesis_workers")]
    pub synthesis_workers: usize,
}

fn default_synthesis_workers() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
        }
    }
}

impl SelaConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        let mut cfg: SelaConfig = s.try_deserialize()?;

        // Deployment secrets come from the environment, never the file.
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                cfg.database.url = Some(url);
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                cfg.http.port = port;
            }
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[service]
log_level = "info"
version_tag = "V2"

[speech]
base_url = "https://api.openai.com"
transcription_model = "whisper-1"
synthesis_model = "tts-1"
synthesis_voice = "alloy"
synthesis_chunk_chars = 2000
max_retries = 3
retry_delay_ms = 500
transcript_cache_entries = 32

[llm]
base_url = "https://api.openai.com"
model = "gpt-4o-mini"
max_tokens = 200
temperature = 0.7
max_retries = 3
retry_delay_ms = 500
similarity_threshold = 0.8

[storage]
root = "uploads"
concepts_file = "concepts.json"
"#;

    #[test]
    fn test_load_sample_config() {
        let mut f = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();

        let cfg = SelaConfig::load(f.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.service.version_tag, "V2");
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert!((cfg.llm.similarity_threshold - 0.8).abs() < f64::EPSILON);
        // Defaults kick in for omitted sections.
        assert_eq!(cfg.http.port, std::env::var("PORT").map(|p| p.parse().unwrap()).unwrap_or(5001));
        assert_eq!(cfg.storage.synthesis_workers, 4);
        assert_eq!(cfg.database.max_connections, 5);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(SelaConfig::load("/nonexistent/sela.toml").is_err());
    }
}
