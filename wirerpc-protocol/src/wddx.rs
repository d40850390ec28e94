//! WDDX 1.0 grammar.
//!
//! A packet wraps exactly one value:
//!
//! ```text
//! <wddxPacket version="1.0"><header></header><data>VALUE</data></wddxPacket>
//! ```
//!
//! WDDX has no call envelope of its own. A call is the struct
//! `{methodName, params}`, a response is `{result}` or
//! `{fault: {faultCode, faultString}}`.

use crate::charset::DEFAULT_ENCODING;
use crate::codec::{check_message, parse_timestamp, WireFormat, EXTENDED_TIMESTAMP};
use crate::error::ProtocolError;
use crate::message::{Call, Message, Outcome, Response};
use crate::value::{Value, TYPE_TAG};
use crate::xml::{self, Element};
use crate::xmlrpc::{fault_from_struct, tag_record};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;

pub const WDDX_VERSION: &str = "1.0";

/// The WDDX wire grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wddx;

impl WireFormat for Wddx {
    type Node = Element;

    fn mime_type(&self) -> &'static str {
        "text/xml"
    }

    fn default_encoding(&self) -> &'static str {
        DEFAULT_ENCODING
    }

    fn encode(&self, value: &Value) -> Element {
        match value {
            Value::Int(n) => Element::text("number", n.to_string()),
            // Debug output always carries a '.' or an exponent, which keeps
            // floats apart from integers on decode.
            Value::Float(n) => Element::text("number", format!("{:?}", n)),
            Value::Bool(b) => Element::new("boolean").with_attr("value", b.to_string()),
            Value::Str(s) => Element::text("string", s.as_str()),
            Value::Null => Element::new("null"),
            Value::Bytes(b) => Element::text("binary", BASE64.encode(b))
                .with_attr("length", b.len().to_string()),
            Value::Timestamp(ts) => {
                Element::text("dateTime", ts.format(EXTENDED_TIMESTAMP).to_string())
            }
            Value::List(items) => {
                let mut array = Element::new("array").with_attr("length", items.len().to_string());
                for item in items {
                    array.push(self.encode(item));
                }
                array
            }
            Value::Map(members) => encode_struct(None, members),
            Value::Record { type_name, fields } => {
                encode_struct(Some(type_name.as_str()), fields)
            }
        }
    }

    fn decode(&self, node: &Element) -> Result<Value, ProtocolError> {
        match node.name.as_str() {
            "array" => {
                node.expect_no_text()?;
                check_length(node, node.children.len())?;
                node.children
                    .iter()
                    .map(|item| self.decode(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            }
            "struct" => self.decode_struct(node),
            _ => decode_scalar(node),
        }
    }

    fn encode_call(&self, call: &Call) -> Element {
        packet(self.encode(&Value::Map(vec![
            ("methodName".to_string(), Value::Str(call.method.clone())),
            ("params".to_string(), Value::List(call.args.clone())),
        ])))
    }

    fn encode_response(&self, response: &Response) -> Element {
        let body = match &response.outcome {
            Outcome::Completed(value) => ("result".to_string(), value.clone()),
            Outcome::Faulted(fault) => (
                "fault".to_string(),
                Value::Map(vec![
                    ("faultCode".to_string(), Value::Int(fault.code)),
                    ("faultString".to_string(), Value::Str(fault.message.clone())),
                ]),
            ),
        };
        packet(self.encode(&Value::Map(vec![body])))
    }

    fn encode_message(&self, message: &Message) -> Result<Bytes, ProtocolError> {
        check_message(message, None)?;
        let root = match message {
            Message::Call(call) => self.encode_call(call),
            Message::Response(response) => self.encode_response(response),
        };
        xml::write_document(&root, message.encoding())
    }

    fn decode_message(
        &self,
        payload: &[u8],
        declared_encoding: Option<&str>,
    ) -> Result<Message, ProtocolError> {
        let (doc, charset) = xml::read_document(payload, declared_encoding, self.default_encoding())?;
        let mut message = self
            .decode_packet(&doc.root)
            .map_err(ProtocolError::into_invalid)?;
        message.set_encoding(charset.label());
        Ok(message)
    }
}

impl Wddx {
    fn decode_packet(&self, root: &Element) -> Result<Message, ProtocolError> {
        let body = unwrap_packet(root)?;
        let location = body.describe();
        let Value::Map(members) = self.decode(body)? else {
            return Err(ProtocolError::malformed(format!(
                "packet must hold a struct, found {}",
                location
            )));
        };

        if members.iter().any(|(name, _)| name == "methodName") {
            Ok(Message::Call(decode_call(members, &location)?))
        } else {
            Ok(Message::Response(decode_response(members, &location)?))
        }
    }

    fn decode_struct(&self, node: &Element) -> Result<Value, ProtocolError> {
        node.expect_no_text()?;
        let mut members: Vec<(String, Value)> = Vec::with_capacity(node.children.len());
        for var in &node.children {
            if var.name != "var" {
                return Err(ProtocolError::malformed(format!(
                    "expected <var>, found {} in {}",
                    var.describe(),
                    node.describe()
                )));
            }
            let name = var.attr("name").ok_or_else(|| {
                ProtocolError::malformed(format!("missing name attribute on {}", var.describe()))
            })?;
            if members.iter().any(|(n, _)| n == name) {
                return Err(ProtocolError::malformed(format!(
                    "duplicate member {:?} in {}",
                    name,
                    node.describe()
                )));
            }
            var.expect_no_text()?;
            let value = match var.children.as_slice() {
                [value] => self.decode(value)?,
                _ => {
                    return Err(ProtocolError::malformed(format!(
                        "{} must hold exactly one value",
                        var.describe()
                    )))
                }
            };
            members.push((name.to_string(), value));
        }
        tag_record(members, node)
    }
}

fn encode_struct(type_name: Option<&str>, members: &[(String, Value)]) -> Element {
    let mut node = Element::new("struct");
    if let Some(type_name) = type_name {
        node.push(encode_var(TYPE_TAG, &Value::Str(type_name.to_string())));
    }
    for (name, value) in members {
        node.push(encode_var(name, value));
    }
    node
}

fn encode_var(name: &str, value: &Value) -> Element {
    Element::new("var")
        .with_attr("name", name)
        .with_child(Wddx.encode(value))
}

fn packet(body: Element) -> Element {
    Element::new("wddxPacket")
        .with_attr("version", WDDX_VERSION)
        .with_child(Element::new("header"))
        .with_child(Element::new("data").with_child(body))
}

fn unwrap_packet(root: &Element) -> Result<&Element, ProtocolError> {
    if root.name != "wddxPacket" {
        return Err(ProtocolError::malformed(format!(
            "expected <wddxPacket>, found {}",
            root.describe()
        )));
    }
    if let Some(version) = root.attr("version") {
        if version != WDDX_VERSION {
            return Err(ProtocolError::malformed(format!(
                "unsupported WDDX version {:?}",
                version
            )));
        }
    }
    root.expect_no_text()?;

    let data = match root.children.as_slice() {
        [header, data] if header.name == "header" => data,
        [data] => data,
        _ => {
            return Err(ProtocolError::malformed(format!(
                "{} must hold an optional <header> and one <data>",
                root.describe()
            )))
        }
    };
    if data.name != "data" {
        return Err(ProtocolError::malformed(format!(
            "expected <data>, found {}",
            data.describe()
        )));
    }
    data.expect_no_text()?;
    match data.children.as_slice() {
        [body] => Ok(body),
        _ => Err(ProtocolError::malformed(format!(
            "{} must hold exactly one value",
            data.describe()
        ))),
    }
}

fn decode_scalar(node: &Element) -> Result<Value, ProtocolError> {
    node.expect_leaf()?;
    let text = node.text.trim();
    let bad = |what: &str| {
        ProtocolError::malformed(format!("invalid {} {:?} in {}", what, text, node.describe()))
    };

    match node.name.as_str() {
        "string" => Ok(Value::Str(node.text.clone())),
        "number" => {
            let integral = !text.contains(['.', 'e', 'E']);
            match text.parse::<i64>() {
                Ok(n) if integral => Ok(Value::Int(n)),
                _ => text.parse().map(Value::Float).map_err(|_| bad("number")),
            }
        }
        "boolean" => {
            node.expect_no_text()?;
            match node.attr("value") {
                Some("true") => Ok(Value::Bool(true)),
                Some("false") => Ok(Value::Bool(false)),
                Some(other) => Err(ProtocolError::malformed(format!(
                    "invalid boolean value {:?} in {}",
                    other,
                    node.describe()
                ))),
                None => Err(ProtocolError::malformed(format!(
                    "missing value attribute on {}",
                    node.describe()
                ))),
            }
        }
        "null" => {
            node.expect_no_text()?;
            Ok(Value::Null)
        }
        "dateTime" => parse_timestamp(text)
            .map(Value::Timestamp)
            .ok_or_else(|| bad("dateTime")),
        "binary" => {
            let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            let bytes = BASE64
                .decode(compact.as_bytes())
                .map_err(|_| bad("base64"))?;
            check_length(node, bytes.len())?;
            Ok(Value::Bytes(Bytes::from(bytes)))
        }
        _ => Err(ProtocolError::malformed(format!(
            "unknown value type {}",
            node.describe()
        ))),
    }
}

/// Checks an optional `length` attribute against the actual count.
fn check_length(node: &Element, actual: usize) -> Result<(), ProtocolError> {
    let Some(declared) = node.attr("length") else {
        return Ok(());
    };
    match declared.trim().parse::<usize>() {
        Ok(n) if n == actual => Ok(()),
        Ok(n) => Err(ProtocolError::malformed(format!(
            "{} declares length {} but holds {}",
            node.describe(),
            n,
            actual
        ))),
        Err(_) => Err(ProtocolError::malformed(format!(
            "invalid length {:?} on {}",
            declared,
            node.describe()
        ))),
    }
}

fn decode_call(members: Vec<(String, Value)>, location: &str) -> Result<Call, ProtocolError> {
    let mut method = None;
    let mut params = None;
    for (name, value) in members {
        match (name.as_str(), value) {
            ("methodName", Value::Str(s)) => method = Some(s),
            ("params", Value::List(items)) => params = Some(items),
            (name @ ("methodName" | "params"), other) => {
                return Err(ProtocolError::malformed(format!(
                    "{} has the wrong type {} in {}",
                    name,
                    other.kind(),
                    location
                )))
            }
            (other, _) => {
                return Err(ProtocolError::malformed(format!(
                    "unexpected member {:?} in call {}",
                    other, location
                )))
            }
        }
    }

    let method = method.unwrap_or_default();
    if method.trim().is_empty() {
        return Err(ProtocolError::malformed(format!(
            "empty methodName in {}",
            location
        )));
    }
    let params = params.ok_or_else(|| {
        ProtocolError::malformed(format!("missing params in call {}", location))
    })?;
    Ok(Call::new(method.trim(), params))
}

fn decode_response(
    members: Vec<(String, Value)>,
    location: &str,
) -> Result<Response, ProtocolError> {
    let mut result = None;
    let mut fault = None;
    for (name, value) in members {
        match name.as_str() {
            "result" => result = Some(value),
            "fault" => fault = Some(fault_from_struct(&value, location)?),
            other => {
                return Err(ProtocolError::malformed(format!(
                    "unexpected member {:?} in response {}",
                    other, location
                )))
            }
        }
    }
    Response::from_parts(result, fault)
}
