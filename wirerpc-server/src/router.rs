//! Method dispatch.
//!
//! Every inbound payload walks the state machine
//! `Idle -> Parsed -> Dispatched -> {Completed | Faulted}` and produces
//! exactly one [`Response`]. Handler errors and panics are captured and
//! turned into faults; nothing escapes the router.

use crate::error::RoutingError;
use crate::handler::HandlerResolver;
use crate::observer::{DispatchEvent, DispatchObserver, TracingObserver};
use bytes::Bytes;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use wirerpc_protocol::{
    Call, Charset, Fault, FaultCode, Grammar, Message, Outcome, ProtocolError, Response, Value,
};

/// Router state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Parsed,
    Dispatched,
    Completed,
    Faulted,
}

impl DispatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchState::Completed | DispatchState::Faulted)
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchState::Idle => "idle",
            DispatchState::Parsed => "parsed",
            DispatchState::Dispatched => "dispatched",
            DispatchState::Completed => "completed",
            DispatchState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Outcome of dispatching one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub response: Response,
    /// The last state reached before termination.
    pub reached: DispatchState,
    /// Terminal state.
    pub state: DispatchState,
}

impl Dispatch {
    fn new(response: Response, reached: DispatchState) -> Self {
        let state = if response.is_fault() {
            DispatchState::Faulted
        } else {
            DispatchState::Completed
        };
        Self {
            response,
            reached,
            state,
        }
    }

    /// HTTP status implied by the response: faults are sent as 500.
    pub fn http_status(&self) -> u16 {
        if self.response.is_fault() {
            500
        } else {
            200
        }
    }
}

/// Splits `handler.method` on the first `.`.
pub fn split_method(name: &str) -> Result<(&str, &str), RoutingError> {
    match name.split_once('.') {
        Some((handler, method)) if !handler.is_empty() && !method.is_empty() => {
            Ok((handler, method))
        }
        _ => Err(RoutingError::MalformedMethodName(name.to_string())),
    }
}

/// Dispatches calls to handlers.
pub struct Router {
    resolver: Arc<dyn HandlerResolver>,
    observer: Arc<dyn DispatchObserver>,
}

impl Router {
    pub fn new(resolver: impl HandlerResolver + 'static) -> Self {
        Self::with_resolver(Arc::new(resolver))
    }

    pub fn with_resolver(resolver: Arc<dyn HandlerResolver>) -> Self {
        Self {
            resolver,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replaces the default tracing observer.
    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Decodes a payload and dispatches the call it carries.
    ///
    /// The response inherits the call's encoding and id. When the payload
    /// cannot be decoded, it is written in the declared encoding if that is
    /// supported, otherwise in the grammar default.
    pub fn handle(
        &self,
        grammar: Grammar,
        payload: &[u8],
        declared_encoding: Option<&str>,
    ) -> Dispatch {
        let call = match grammar.decode_message(payload, declared_encoding) {
            Ok(Message::Call(call)) => call,
            Ok(Message::Response(_)) => {
                let fault = Fault::with_code(
                    FaultCode::InvalidRequest,
                    "expected a method call, found a method response",
                );
                return self.reject(grammar, declared_encoding, fault);
            }
            Err(e) => {
                self.observer.observe(&DispatchEvent::DecodeFailed {
                    grammar,
                    error: &e,
                });
                let fault = Fault::with_code(e.fault_code(), e.to_string());
                return self.reject(grammar, declared_encoding, fault);
            }
        };

        self.observer
            .observe(&DispatchEvent::Decoded { grammar, call: &call });
        self.dispatch(call)
    }

    /// Dispatches an already decoded call, starting in the parsed state.
    pub fn dispatch(&self, call: Call) -> Dispatch {
        let Call {
            method,
            args,
            encoding,
            id,
        } = call;

        let routed = split_method(&method).and_then(|(handler_id, method_id)| {
            match self.resolver.resolve(handler_id) {
                Some(handler) => Ok((handler, handler_id, method_id)),
                None => Err(RoutingError::HandlerNotFound(handler_id.to_string())),
            }
        });
        let (handler, handler_id, method_id) = match routed {
            Ok(routed) => routed,
            Err(e) => {
                let response = Response::fault(Fault::with_code(e.fault_code(), e.to_string()));
                return self.finish(&method, response, encoding, id, DispatchState::Parsed);
            }
        };

        self.observer.observe(&DispatchEvent::Invoking {
            handler: handler_id,
            method: method_id,
            args: args.len(),
        });
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(method_id, &args)));
        let response = match outcome {
            Ok(Ok(value)) => Response::success(value),
            Ok(Err(e)) => Response::fault(e.into()),
            Err(payload) => Response::fault(Fault::with_code(
                FaultCode::InternalError,
                format!("handler {} panicked: {}", handler_id, panic_message(&*payload)),
            )),
        };
        self.finish(&method, response, encoding, id, DispatchState::Dispatched)
    }

    /// Encodes a dispatch result in the grammar of the request.
    pub fn encode(&self, grammar: Grammar, dispatch: &Dispatch) -> Result<Bytes, ProtocolError> {
        let bytes = grammar.encode_message(&Message::Response(dispatch.response.clone()))?;
        self.observer.observe(&DispatchEvent::Encoded {
            grammar,
            bytes: bytes.len(),
        });
        Ok(bytes)
    }

    fn reject(&self, grammar: Grammar, declared_encoding: Option<&str>, fault: Fault) -> Dispatch {
        let encoding = declared_encoding
            .and_then(|label| Charset::from_label(label).ok())
            .map_or(grammar.default_encoding(), |charset| charset.label());
        self.observer.observe(&DispatchEvent::Faulted {
            method: None,
            fault: &fault,
        });
        Dispatch::new(
            Response::fault(fault).with_encoding(encoding),
            DispatchState::Idle,
        )
    }

    fn finish(
        &self,
        method: &str,
        response: Response,
        encoding: String,
        id: Option<Value>,
        reached: DispatchState,
    ) -> Dispatch {
        match &response.outcome {
            Outcome::Completed(value) => {
                self.observer
                    .observe(&DispatchEvent::Completed { method, value })
            }
            Outcome::Faulted(fault) => {
                self.observer.observe(&DispatchEvent::Faulted {
                    method: Some(method),
                    fault,
                })
            }
        }
        Dispatch::new(response.with_encoding(encoding).with_id(id), reached)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
