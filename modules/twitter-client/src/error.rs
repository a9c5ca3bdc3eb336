use thiserror::Error;

pub type Result<T> = std::result::Result<T, TwitterError>;

#[derive(Debug, Error)]
pub enum TwitterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The endpoint's quota is exhausted. `reset` is the epoch second at
    /// which the window reopens, when the response carried it.
    #[error("rate limit exhausted")]
    RateLimited { reset: Option<i64> },

    #[error("malformed status payload: {0}")]
    Malformed(String),
}

impl TwitterError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TwitterError::RateLimited { .. })
    }
}
