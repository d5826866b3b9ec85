use thiserror::Error;

/// Errors an outbound integration may return.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network or transport failure (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(String),
    /// The upstream API answered with an application-level error.
    #[error("provider api error status={status}: {message}")]
    Api { status: u16, message: String },
    /// A response payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// A required configuration value is missing or invalid.
    #[error("config error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Transport(m) if m.contains("timed out"))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        // Bot API URLs carry the token in the path.
        let e = e.without_url();
        if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else if e.is_timeout() {
            ProviderError::Transport(format!("request timed out: {e}"))
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::Decode(e.to_string())
    }
}
