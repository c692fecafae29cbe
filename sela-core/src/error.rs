use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelaError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown concept: {0}")]
    UnknownConcept(String),

    #[error("Invalid trial type: {0}")]
    InvalidTrialType(String),

    #[error("Other error: {0}")]
    Other(String),
}
