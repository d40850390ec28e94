//! Handler objects and their registry.
//!
//! A method name `handler.method` is split on its first `.`; the handler id
//! is looked up through a [`HandlerResolver`] and the method id is passed to
//! [`Handler::invoke`] together with the positional arguments.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use wirerpc_protocol::{Fault, FaultCode, ProtocolError, Value};

/// Error returned by a handler. Becomes the fault of the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub code: i64,
    pub message: String,
}

impl HandlerError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// An application-defined failure.
    pub fn application(message: impl Into<String>) -> Self {
        Self::new(FaultCode::ApplicationError.code(), message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(FaultCode::InvalidParams.code(), message)
    }

    pub fn method_not_found(handler: &str, method: &str) -> Self {
        Self::new(
            FaultCode::MethodNotFound.code(),
            format!("method {}.{} not found", handler, method),
        )
    }

    /// Checks the argument count.
    pub fn check_arity(args: &[Value], expected: usize) -> Result<(), HandlerError> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(Self::invalid_params(format!(
                "expected {} argument(s), got {}",
                expected,
                args.len()
            )))
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<HandlerError> for Fault {
    fn from(e: HandlerError) -> Self {
        Fault::new(e.code, e.message)
    }
}

impl From<ProtocolError> for HandlerError {
    fn from(e: ProtocolError) -> Self {
        Self::new(e.fault_code().code(), e.to_string())
    }
}

/// An object exposing RPC methods.
///
/// Arity and argument types are the handler's concern.
pub trait Handler: Send + Sync {
    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, HandlerError>;

    /// Method ids this handler advertises through `system.listMethods`.
    fn methods(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Maps handler ids to handler instances.
pub trait HandlerResolver: Send + Sync {
    fn resolve(&self, handler_id: &str) -> Option<Arc<dyn Handler>>;
}

type MethodFn = dyn Fn(&[Value]) -> Result<Value, HandlerError> + Send + Sync;

/// A handler assembled from closures, one per method.
#[derive(Default)]
pub struct MethodTable {
    methods: HashMap<String, Box<MethodFn>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method.
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Box::new(f));
        self
    }
}

impl Handler for MethodTable {
    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, HandlerError> {
        match self.methods.get(method) {
            Some(f) => f(args),
            None => Err(HandlerError::new(
                FaultCode::MethodNotFound.code(),
                format!("method {:?} not found", method),
            )),
        }
    }

    fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.methods())
            .finish()
    }
}

/// In-memory handler registry.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under an id, replacing any previous one.
    pub fn register(&mut self, id: impl Into<String>, handler: Arc<dyn Handler>) -> &mut Self {
        let id = id.into();
        tracing::debug!(handler = %id, "registered handler");
        self.handlers.insert(id, handler);
        self
    }

    pub fn with_handler(mut self, id: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.register(id, Arc::new(handler));
        self
    }

    /// Registers the built-in `system` handler. Call after all other
    /// handlers are registered; its method listing is taken now.
    pub fn with_system_handler(mut self) -> Self {
        let mut listing = self.method_names();
        listing.extend(
            crate::system::SYSTEM_METHODS
                .iter()
                .map(|m| format!("{}.{}", crate::system::SYSTEM_HANDLER, m)),
        );
        listing.sort();
        listing.dedup();
        self.register(
            crate::system::SYSTEM_HANDLER,
            Arc::new(crate::system::SystemHandler::new(listing)),
        );
        self
    }

    /// Fully qualified `handler.method` names of every advertised method.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .iter()
            .flat_map(|(id, handler)| {
                handler
                    .methods()
                    .into_iter()
                    .map(move |method| format!("{}.{}", id, method))
            })
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve(&self, handler_id: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(handler_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc() -> MethodTable {
        MethodTable::new()
            .method("add", |args| {
                HandlerError::check_arity(args, 2)?;
                match (args[0].as_i64(), args[1].as_i64()) {
                    (Some(a), Some(b)) => Ok(Value::Int(a + b)),
                    _ => Err(HandlerError::invalid_params("add expects integers")),
                }
            })
            .method("fail", |_| Err(HandlerError::application("boom")))
    }

    #[test]
    fn test_method_table_invoke() {
        let table = calc();
        assert_eq!(
            table.invoke("add", &[Value::Int(2), Value::Int(3)]),
            Ok(Value::Int(5))
        );
        let err = table.invoke("add", &[Value::Int(2)]).unwrap_err();
        assert_eq!(err.code, FaultCode::InvalidParams.code());
        let err = table.invoke("nope", &[]).unwrap_err();
        assert_eq!(err.code, FaultCode::MethodNotFound.code());
        assert_eq!(table.methods(), vec!["add", "fail"]);
    }

    #[test]
    fn test_registry_resolve() {
        let registry = HandlerRegistry::new().with_handler("Calc", calc());
        assert!(registry.resolve("Calc").is_some());
        assert!(registry.resolve("calc").is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.method_names(), vec!["Calc.add", "Calc.fail"]);
    }

    #[test]
    fn test_system_handler_listing() {
        let registry = HandlerRegistry::new()
            .with_handler("Calc", calc())
            .with_system_handler();
        assert_eq!(
            registry.method_names(),
            vec!["Calc.add", "Calc.fail", "system.listMethods", "system.ping"]
        );
    }

    #[test]
    fn test_handler_error_conversions() {
        let fault: Fault = HandlerError::application("boom").into();
        assert_eq!(fault.code, -32500);
        assert_eq!(fault.message, "boom");

        let err: HandlerError = ProtocolError::TypeMismatch {
            expected: "string",
            found: "int",
        }
        .into();
        assert_eq!(err.code, FaultCode::InvalidParams.code());
    }
}
