use std::io;
use std::path::PathBuf;

use imagegen_contracts::requests::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("API key is not configured")]
    Configuration,

    #[error("API error: {status} {status_text} - {message}")]
    RemoteApi {
        status: u16,
        status_text: String,
        message: String,
    },

    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to encode image {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("image store upload failed: {0}")]
    Upload(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}
