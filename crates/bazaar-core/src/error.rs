use thiserror::Error;

#[derive(Debug, Error)]
pub enum BazaarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
}

pub type Result<T> = std::result::Result<T, BazaarError>;
