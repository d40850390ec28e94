//! Server error types.

use crate::config::ConfigError;
use thiserror::Error;
use wirerpc_protocol::FaultCode;

/// Failure to route a method name to a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("malformed method name {0:?}")]
    MalformedMethodName(String),

    #[error("no handler registered for {0:?}")]
    HandlerNotFound(String),
}

impl RoutingError {
    /// Routing failures are reported as unknown methods.
    pub fn fault_code(&self) -> FaultCode {
        FaultCode::MethodNotFound
    }
}

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] wirerpc_protocol::ProtocolError),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_error_display() {
        assert_eq!(
            RoutingError::MalformedMethodName("foo".into()).to_string(),
            "malformed method name \"foo\""
        );
        assert_eq!(
            RoutingError::HandlerNotFound("Foo".into()).fault_code(),
            FaultCode::MethodNotFound
        );
    }
}
