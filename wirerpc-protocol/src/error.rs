//! Protocol error types and fault codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while converting, encoding or decoding RPC messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("cannot serialize data of type \"{0}\"")]
    UnsupportedType(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("unsupported character encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        ProtocolError::MalformedPayload(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ProtocolError::InvalidMessage(msg.into())
    }

    /// Reclassifies an error raised after the document itself was read:
    /// the payload is well-formed but does not hold a valid message.
    pub(crate) fn into_invalid(self) -> Self {
        match self {
            ProtocolError::MalformedPayload(msg) => ProtocolError::InvalidMessage(msg),
            other => other,
        }
    }

    /// Returns the fault code a server reports when this error aborts a call.
    pub fn fault_code(&self) -> FaultCode {
        match self {
            ProtocolError::UnsupportedType(_) => FaultCode::InternalError,
            ProtocolError::MalformedPayload(_) => FaultCode::ParseError,
            ProtocolError::InvalidMessage(_) => FaultCode::InvalidRequest,
            ProtocolError::UnsupportedEncoding(_) => FaultCode::UnsupportedEncoding,
            ProtocolError::TypeMismatch { .. } => FaultCode::InvalidParams,
            ProtocolError::Io(_) => FaultCode::InternalError,
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            ProtocolError::Io(e.into())
        } else {
            ProtocolError::MalformedPayload(e.to_string())
        }
    }
}

/// Stable fault codes placed into fault responses.
///
/// The numeric values follow the XML-RPC fault code interoperability
/// convention and are part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultCode {
    ParseError,
    UnsupportedEncoding,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ApplicationError,
}

impl FaultCode {
    /// Numeric code carried on the wire.
    pub fn code(&self) -> i64 {
        match self {
            FaultCode::ParseError => -32700,
            FaultCode::UnsupportedEncoding => -32701,
            FaultCode::InvalidRequest => -32600,
            FaultCode::MethodNotFound => -32601,
            FaultCode::InvalidParams => -32602,
            FaultCode::InternalError => -32603,
            FaultCode::ApplicationError => -32500,
        }
    }

    /// Maps a numeric wire code back onto a known fault code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -32700 => Some(FaultCode::ParseError),
            -32701 => Some(FaultCode::UnsupportedEncoding),
            -32600 => Some(FaultCode::InvalidRequest),
            -32601 => Some(FaultCode::MethodNotFound),
            -32602 => Some(FaultCode::InvalidParams),
            -32603 => Some(FaultCode::InternalError),
            -32500 => Some(FaultCode::ApplicationError),
            _ => None,
        }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultCode::ParseError => write!(f, "PARSE_ERROR"),
            FaultCode::UnsupportedEncoding => write!(f, "UNSUPPORTED_ENCODING"),
            FaultCode::InvalidRequest => write!(f, "INVALID_REQUEST"),
            FaultCode::MethodNotFound => write!(f, "METHOD_NOT_FOUND"),
            FaultCode::InvalidParams => write!(f, "INVALID_PARAMS"),
            FaultCode::InternalError => write!(f, "INTERNAL_ERROR"),
            FaultCode::ApplicationError => write!(f, "APPLICATION_ERROR"),
        }
    }
}
