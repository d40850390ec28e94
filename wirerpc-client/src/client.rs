//! High-level client API.

use crate::error::ClientError;
use crate::transport::{HttpTransport, TransportConfig};
use wirerpc_protocol::{Call, FromValue, Grammar, Message, ToValue, Value};

/// High-level client for one wirerpc endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    transport: HttpTransport,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: TransportConfig) -> Result<Self, ClientError> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
        })
    }

    /// Returns the grammar calls are written in.
    pub fn grammar(&self) -> Grammar {
        self.transport.config().grammar
    }

    /// Builds the call for `method`. JSON-RPC calls get a fresh id.
    pub fn prepare(&self, method: &str, args: Vec<Value>) -> Call {
        let config = self.transport.config();
        let call = Call::new(method, args).with_encoding(config.encoding.clone());
        match config.grammar {
            Grammar::JsonRpc => call.with_id(Value::Str(uuid::Uuid::new_v4().to_string())),
            _ => call,
        }
    }

    /// Calls `method` and returns its result. A fault becomes
    /// [`ClientError::Fault`].
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, ClientError> {
        let call = self.prepare(method, args);
        let encoding = call.encoding.clone();
        let id = call.id.clone();
        let payload = self.grammar().encode_message(&Message::Call(call))?;

        let response = self.transport.send(payload, &encoding).await?;
        if id.is_some() && response.id != id {
            tracing::warn!(method, "response id does not match call id");
        }
        response.into_result().map_err(ClientError::Fault)
    }

    /// Calls `method` with native arguments and converts the result.
    pub async fn call_as<T: FromValue>(
        &self,
        method: &str,
        args: &[&(dyn ToValue + Sync)],
    ) -> Result<T, ClientError> {
        let args = args
            .iter()
            .map(|arg| arg.to_value())
            .collect::<Result<Vec<_>, _>>()?;
        let value = self.call(method, args).await?;
        Ok(T::from_value(&value)?)
    }

    /// Lists the methods the endpoint advertises.
    pub async fn list_methods(&self) -> Result<Vec<String>, ClientError> {
        self.call_as("system.listMethods", &[]).await
    }

    /// Pings the endpoint.
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.call("system.ping", Vec::new()).await?;
        Ok(())
    }
}
