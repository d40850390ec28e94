//! Client error types.

use thiserror::Error;
use wirerpc_protocol::{Fault, ProtocolError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server returned {0}")]
    Fault(Fault),

    #[error("authentication required{}", challenge_suffix(.challenge))]
    AuthenticationRequired { challenge: Option<String> },

    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid header {0:?}")]
    InvalidHeader(String),
}

fn challenge_suffix(challenge: &Option<String>) -> String {
    challenge
        .as_deref()
        .map(|c| format!(" ({})", c))
        .unwrap_or_default()
}

impl ClientError {
    /// Returns the fault if the server answered with one.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            ClientError::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}
