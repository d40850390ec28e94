//! Call and response envelopes.

use crate::charset::DEFAULT_ENCODING;
use crate::error::{FaultCode, ProtocolError};
use crate::value::Value;
use std::fmt;

/// A protocol-level error returned in place of a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i64,
    pub message: String,
}

impl Fault {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a fault carrying one of the stable fault codes.
    pub fn with_code(code: FaultCode, message: impl Into<String>) -> Self {
        Self::new(code.code(), message)
    }

    /// Returns the stable fault code, if the numeric code is a known one.
    pub fn fault_code(&self) -> Option<FaultCode> {
        FaultCode::from_code(self.code)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault {}: {}", self.code, self.message)
    }
}

impl std::error::Error for Fault {}

/// Terminal outcome of a call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(Value),
    Faulted(Fault),
}

/// A method call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: String,
    pub args: Vec<Value>,
    /// Character encoding the call was or will be transmitted in.
    pub encoding: String,
    /// Correlation id, carried by grammars that have one (JSON-RPC).
    pub id: Option<Value>,
}

impl Call {
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
            encoding: DEFAULT_ENCODING.to_string(),
            id: None,
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_id(mut self, id: Value) -> Self {
        self.id = Some(id);
        self
    }
}

/// A response: exactly one of a success value or a fault.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub outcome: Outcome,
    pub encoding: String,
    pub id: Option<Value>,
}

impl Response {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            encoding: DEFAULT_ENCODING.to_string(),
            id: None,
        }
    }

    pub fn success(value: Value) -> Self {
        Self::new(Outcome::Completed(value))
    }

    pub fn fault(fault: Fault) -> Self {
        Self::new(Outcome::Faulted(fault))
    }

    /// Builds a response from separately decoded parts.
    ///
    /// Fails when both or neither of the value and the fault are present.
    pub fn from_parts(value: Option<Value>, fault: Option<Fault>) -> Result<Self, ProtocolError> {
        match (value, fault) {
            (Some(value), None) => Ok(Self::success(value)),
            (None, Some(fault)) => Ok(Self::fault(fault)),
            (Some(_), Some(_)) => Err(ProtocolError::invalid(
                "response carries both a result and a fault",
            )),
            (None, None) => Err(ProtocolError::invalid(
                "response carries neither a result nor a fault",
            )),
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_id(mut self, id: Option<Value>) -> Self {
        self.id = id;
        self
    }

    pub fn is_fault(&self) -> bool {
        matches!(self.outcome, Outcome::Faulted(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Completed(value) => Some(value),
            Outcome::Faulted(_) => None,
        }
    }

    pub fn get_fault(&self) -> Option<&Fault> {
        match &self.outcome {
            Outcome::Completed(_) => None,
            Outcome::Faulted(fault) => Some(fault),
        }
    }

    pub fn into_result(self) -> Result<Value, Fault> {
        match self.outcome {
            Outcome::Completed(value) => Ok(value),
            Outcome::Faulted(fault) => Err(fault),
        }
    }
}

/// Either side of an exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Call(Call),
    Response(Response),
}

impl Message {
    pub fn encoding(&self) -> &str {
        match self {
            Message::Call(call) => &call.encoding,
            Message::Response(response) => &response.encoding,
        }
    }

    pub fn set_encoding(&mut self, encoding: impl Into<String>) {
        match self {
            Message::Call(call) => call.encoding = encoding.into(),
            Message::Response(response) => response.encoding = encoding.into(),
        }
    }

    pub fn into_call(self) -> Result<Call, ProtocolError> {
        match self {
            Message::Call(call) => Ok(call),
            Message::Response(_) => Err(ProtocolError::invalid(
                "expected a method call, found a method response",
            )),
        }
    }

    pub fn into_response(self) -> Result<Response, ProtocolError> {
        match self {
            Message::Response(response) => Ok(response),
            Message::Call(_) => Err(ProtocolError::invalid(
                "expected a method response, found a method call",
            )),
        }
    }
}

impl From<Call> for Message {
    fn from(call: Call) -> Self {
        Message::Call(call)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_defaults() {
        let call = Call::new("Foo.bar", vec![Value::Int(1)]);
        assert_eq!(call.encoding, "iso-8859-1");
        assert_eq!(call.id, None);
        let call = call.with_encoding("utf-8").with_id(Value::Int(7));
        assert_eq!(call.encoding, "utf-8");
        assert_eq!(call.id, Some(Value::Int(7)));
    }

    #[test]
    fn test_response_from_parts() {
        let ok = Response::from_parts(Some(Value::Int(1)), None).unwrap();
        assert_eq!(ok.value(), Some(&Value::Int(1)));
        assert!(!ok.is_fault());

        let fault = Response::from_parts(None, Some(Fault::new(4, "Too many parameters"))).unwrap();
        assert!(fault.is_fault());
        assert_eq!(fault.get_fault().unwrap().code, 4);
        assert_eq!(fault.value(), None);
    }

    #[test]
    fn test_response_exclusivity() {
        let both = Response::from_parts(Some(Value::Null), Some(Fault::new(1, "x")));
        assert!(matches!(both, Err(ProtocolError::InvalidMessage(_))));

        let neither = Response::from_parts(None, None);
        assert!(matches!(neither, Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_into_result() {
        assert_eq!(
            Response::success(Value::Bool(true)).into_result(),
            Ok(Value::Bool(true))
        );
        let err = Response::fault(Fault::with_code(FaultCode::MethodNotFound, "nope"))
            .into_result()
            .unwrap_err();
        assert_eq!(err.code, -32601);
        assert_eq!(err.fault_code(), Some(FaultCode::MethodNotFound));
        assert_eq!(err.to_string(), "fault -32601: nope");
    }

    #[test]
    fn test_message_conversions() {
        let mut msg = Message::from(Call::new("a.b", vec![]));
        assert_eq!(msg.encoding(), "iso-8859-1");
        msg.set_encoding("utf-8");
        assert_eq!(msg.encoding(), "utf-8");
        assert!(msg.clone().into_response().is_err());
        assert_eq!(msg.into_call().unwrap().method, "a.b");

        let msg = Message::from(Response::success(Value::Null));
        assert!(msg.clone().into_call().is_err());
        assert!(msg.into_response().is_ok());
    }
}
