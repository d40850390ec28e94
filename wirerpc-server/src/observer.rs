//! Dispatch observers.
//!
//! The router reports every boundary it crosses to an injected observer
//! instead of logging through global state.

use wirerpc_protocol::{Call, Fault, Grammar, ProtocolError, Value};

/// A boundary crossed while handling one request.
#[derive(Debug)]
pub enum DispatchEvent<'a> {
    Decoded {
        grammar: Grammar,
        call: &'a Call,
    },
    DecodeFailed {
        grammar: Grammar,
        error: &'a ProtocolError,
    },
    Invoking {
        handler: &'a str,
        method: &'a str,
        args: usize,
    },
    Completed {
        method: &'a str,
        value: &'a Value,
    },
    Faulted {
        method: Option<&'a str>,
        fault: &'a Fault,
    },
    Encoded {
        grammar: Grammar,
        bytes: usize,
    },
}

pub trait DispatchObserver: Send + Sync {
    fn observe(&self, event: &DispatchEvent<'_>);
}

/// Logs dispatch events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DispatchObserver for TracingObserver {
    fn observe(&self, event: &DispatchEvent<'_>) {
        match event {
            DispatchEvent::Decoded { grammar, call } => {
                tracing::debug!(%grammar, method = %call.method, args = call.args.len(), "decoded call")
            }
            DispatchEvent::DecodeFailed { grammar, error } => {
                tracing::warn!(%grammar, "failed to decode call: {}", error)
            }
            DispatchEvent::Invoking {
                handler,
                method,
                args,
            } => tracing::debug!(handler, method, args, "invoking handler"),
            DispatchEvent::Completed { method, value } => {
                tracing::debug!(method, kind = value.kind(), "call completed")
            }
            DispatchEvent::Faulted { method, fault } => tracing::warn!(
                method = method.unwrap_or("-"),
                code = fault.code,
                "call faulted: {}",
                fault.message
            ),
            DispatchEvent::Encoded { grammar, bytes } => {
                tracing::debug!(%grammar, bytes, "encoded response")
            }
        }
    }
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl DispatchObserver for NoopObserver {
    fn observe(&self, _event: &DispatchEvent<'_>) {}
}
