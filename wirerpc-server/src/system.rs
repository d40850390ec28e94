//! Built-in `system` handler.

use crate::handler::{Handler, HandlerError};
use wirerpc_protocol::Value;

/// Handler id of the built-in handler.
pub const SYSTEM_HANDLER: &str = "system";

/// Methods the built-in handler answers.
pub const SYSTEM_METHODS: [&str; 2] = ["listMethods", "ping"];

/// Answers `system.listMethods` and `system.ping`.
#[derive(Debug, Clone)]
pub struct SystemHandler {
    listing: Vec<String>,
}

impl SystemHandler {
    /// Creates the handler with the fully qualified method names to advertise.
    pub fn new(listing: Vec<String>) -> Self {
        Self { listing }
    }
}

impl Handler for SystemHandler {
    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, HandlerError> {
        match method {
            "listMethods" => {
                HandlerError::check_arity(args, 0)?;
                Ok(Value::List(
                    self.listing.iter().cloned().map(Value::Str).collect(),
                ))
            }
            "ping" => Ok(Value::Bool(true)),
            _ => Err(HandlerError::method_not_found(SYSTEM_HANDLER, method)),
        }
    }

    fn methods(&self) -> Vec<String> {
        SYSTEM_METHODS.iter().map(|m| m.to_string()).collect()
    }
}
