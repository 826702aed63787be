//! Exchange error types

use thiserror::Error;

/// Failure of a single exchange call
///
/// `Api` is the venue rejecting a request (non-2xx); `Network` covers
/// timeouts and transport failures. Both are recoverable at the loop level.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("API error ({status}) on {endpoint}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ExchangeError {
    pub fn is_api(&self) -> bool {
        matches!(self, Self::Api { .. })
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
