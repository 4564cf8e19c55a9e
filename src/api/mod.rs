pub mod client;
pub mod types;
pub mod ws;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode: {0}")]
    Decode(String),
    #[error("missing credentials: {0}")]
    Credentials(&'static str),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}
