//! Grammar-independent codec interface.

use crate::error::ProtocolError;
use crate::json::JsonRpc;
use crate::message::{Call, Message, Outcome, Response};
use crate::value::{Value, TYPE_TAG};
use crate::wddx::Wddx;
use crate::xmlrpc::XmlRpc;
use bytes::Bytes;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A wire grammar: encodes values and messages into its wire tree and
/// parses payloads back.
///
/// Encoding a value into a node is total over [`Value`]. Encoding a
/// message refuses member names the grammar would read back as markup
/// (see [`check_member_names`]). Decoding never substitutes defaults: a
/// payload that cannot be read is [`ProtocolError::MalformedPayload`], a
/// well-formed payload that is not a valid message is
/// [`ProtocolError::InvalidMessage`].
///
/// A grammar whose list and map constructs are structurally identical
/// must decode that construct as a map; telling the two apart is left to
/// the caller's protocol level.
pub trait WireFormat {
    /// Node type of the wire tree.
    type Node;

    /// MIME type sent in the Content-Type header.
    fn mime_type(&self) -> &'static str;

    /// Encoding assumed when neither the payload nor the transport names one.
    fn default_encoding(&self) -> &'static str;

    fn encode(&self, value: &Value) -> Self::Node;

    fn decode(&self, node: &Self::Node) -> Result<Value, ProtocolError>;

    fn encode_call(&self, call: &Call) -> Self::Node;

    fn encode_response(&self, response: &Response) -> Self::Node;

    /// Renders a message into bytes in the message's character encoding.
    fn encode_message(&self, message: &Message) -> Result<Bytes, ProtocolError>;

    /// Parses a payload. An encoding declared inside the payload wins over
    /// `declared_encoding`, which wins over [`Self::default_encoding`].
    fn decode_message(
        &self,
        payload: &[u8],
        declared_encoding: Option<&str>,
    ) -> Result<Message, ProtocolError>;

    fn content_type(&self, encoding: &str) -> String {
        format!("{}; charset={}", self.mime_type(), encoding)
    }
}

/// The grammars supported by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Grammar {
    XmlRpc,
    JsonRpc,
    Wddx,
}

impl Grammar {
    pub const ALL: [Grammar; 3] = [Grammar::XmlRpc, Grammar::JsonRpc, Grammar::Wddx];

    pub fn name(&self) -> &'static str {
        match self {
            Grammar::XmlRpc => "xml-rpc",
            Grammar::JsonRpc => "json-rpc",
            Grammar::Wddx => "wddx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Grammar::XmlRpc => XmlRpc.mime_type(),
            Grammar::JsonRpc => JsonRpc.mime_type(),
            Grammar::Wddx => Wddx.mime_type(),
        }
    }

    pub fn default_encoding(&self) -> &'static str {
        match self {
            Grammar::XmlRpc => XmlRpc.default_encoding(),
            Grammar::JsonRpc => JsonRpc.default_encoding(),
            Grammar::Wddx => Wddx.default_encoding(),
        }
    }

    pub fn content_type(&self, encoding: &str) -> String {
        format!("{}; charset={}", self.mime_type(), encoding)
    }

    pub fn encode_message(&self, message: &Message) -> Result<Bytes, ProtocolError> {
        let bytes = match self {
            Grammar::XmlRpc => XmlRpc.encode_message(message),
            Grammar::JsonRpc => JsonRpc.encode_message(message),
            Grammar::Wddx => Wddx.encode_message(message),
        }?;
        tracing::debug!(grammar = self.name(), bytes = bytes.len(), "encoded message");
        Ok(bytes)
    }

    pub fn decode_message(
        &self,
        payload: &[u8],
        declared_encoding: Option<&str>,
    ) -> Result<Message, ProtocolError> {
        tracing::debug!(grammar = self.name(), bytes = payload.len(), "decoding message");
        match self {
            Grammar::XmlRpc => XmlRpc.decode_message(payload, declared_encoding),
            Grammar::JsonRpc => JsonRpc.decode_message(payload, declared_encoding),
            Grammar::Wddx => Wddx.decode_message(payload, declared_encoding),
        }
    }

    /// Decodes a payload that must be a call.
    pub fn decode_call(
        &self,
        payload: &[u8],
        declared_encoding: Option<&str>,
    ) -> Result<Call, ProtocolError> {
        self.decode_message(payload, declared_encoding)?.into_call()
    }

    /// Decodes a payload that must be a response.
    pub fn decode_response(
        &self,
        payload: &[u8],
        declared_encoding: Option<&str>,
    ) -> Result<Response, ProtocolError> {
        self.decode_message(payload, declared_encoding)?
            .into_response()
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Grammar {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xml-rpc" | "xmlrpc" | "xml" => Ok(Grammar::XmlRpc),
            "json-rpc" | "jsonrpc" | "json" => Ok(Grammar::JsonRpc),
            "wddx" => Ok(Grammar::Wddx),
            _ => Err(format!("unknown grammar: {}", s)),
        }
    }
}

/// Timestamp layout of the XML-RPC `dateTime.iso8601` tag.
pub(crate) const COMPACT_TIMESTAMP: &str = "%Y%m%dT%H:%M:%S";

/// Timestamp layout with date separators, used by WDDX.
pub(crate) const EXTENDED_TIMESTAMP: &str = "%Y-%m-%dT%H:%M:%S";

/// Parses either timestamp layout.
pub(crate) fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, COMPACT_TIMESTAMP)
        .or_else(|_| NaiveDateTime::parse_from_str(text, EXTENDED_TIMESTAMP))
        .ok()
}

/// Fails when a member name inside `value` would not read back as a plain
/// member: [`TYPE_TAG`] leading a map or among a record's fields, a name
/// used twice in one map, or `class_hint` as the only member of a map.
pub fn check_member_names(value: &Value, class_hint: Option<&str>) -> Result<(), ProtocolError> {
    let members = match value {
        Value::List(items) => {
            return items
                .iter()
                .try_for_each(|item| check_member_names(item, class_hint))
        }
        Value::Map(members) => {
            match members.as_slice() {
                [(name, _), ..] if name == TYPE_TAG => return Err(reserved(name)),
                [(name, _)] if Some(name.as_str()) == class_hint => return Err(reserved(name)),
                _ => {}
            }
            members
        }
        Value::Record { fields, .. } => {
            if fields.iter().any(|(name, _)| name == TYPE_TAG) {
                return Err(reserved(TYPE_TAG));
            }
            fields
        }
        _ => return Ok(()),
    };

    let mut seen = HashSet::with_capacity(members.len());
    for (name, value) in members {
        if !seen.insert(name.as_str()) {
            return Err(ProtocolError::UnsupportedType(format!(
                "map with duplicate member {}",
                name
            )));
        }
        check_member_names(value, class_hint)?;
    }
    Ok(())
}

fn reserved(name: &str) -> ProtocolError {
    ProtocolError::UnsupportedType(format!("map with reserved member {}", name))
}

/// Runs [`check_member_names`] over every value a message carries.
pub(crate) fn check_message(message: &Message, class_hint: Option<&str>) -> Result<(), ProtocolError> {
    let (values, id) = match message {
        Message::Call(call) => (call.args.as_slice(), call.id.as_ref()),
        Message::Response(response) => {
            let values = match &response.outcome {
                Outcome::Completed(value) => std::slice::from_ref(value),
                Outcome::Faulted(_) => &[],
            };
            (values, response.id.as_ref())
        }
    };
    values
        .iter()
        .chain(id)
        .try_for_each(|value| check_member_names(value, class_hint))
}
