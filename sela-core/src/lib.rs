pub mod chat;
pub mod concepts;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod similarity;
pub mod speech;
pub mod tutor;

pub use chat::{ChatClient, ChatConfig, ChatError};
pub use concepts::{Concept, ConceptLibrary};
pub use config::SelaConfig;
pub use error::SelaError;
pub use similarity::{normalize, ratio};
pub use speech::{
    DisabledSynthesizer, DisabledTranscriber, FallbackSynthesizer, FallbackTranscriber,
    HostedSynthesizer, HostedTranscriber, SpeechError, SynthesisConfig, Synthesizer, Transcriber,
    TranscriptionConfig,
};
pub use tutor::{AttemptStage, FeedbackPrompt, CORRECT_MOVE_ON_MESSAGE, MISSING_CONTEXT_MESSAGE};
