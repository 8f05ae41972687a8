use thiserror::Error;

#[derive(Error, Debug)]
pub enum UnderwritingError {
    #[error("Missing configuration value: {0}")]
    MissingConfig(String),

    #[error("Invalid configuration value for {key}: {details}")]
    InvalidConfig { key: String, details: String },

    #[error("Text generation failed: {0}")]
    GenerationFailed(String),

    #[cfg(any(feature = "gemini", feature = "bigquery"))]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, UnderwritingError>;
