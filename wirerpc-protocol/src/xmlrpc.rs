//! XML-RPC grammar.
//!
//! ```text
//! <methodCall>
//!   <methodName>handler.method</methodName>
//!   <params><param><value>...</value></param>...</params>
//! </methodCall>
//!
//! <methodResponse>
//!   <params><param><value>...</value></param></params>
//! </methodResponse>
//! <methodResponse>
//!   <fault><value><struct>faultCode, faultString</struct></value></fault>
//! </methodResponse>
//! ```

use crate::charset::DEFAULT_ENCODING;
use crate::codec::{check_message, parse_timestamp, WireFormat, COMPACT_TIMESTAMP};
use crate::error::ProtocolError;
use crate::message::{Call, Fault, Message, Outcome, Response};
use crate::value::{Value, TYPE_TAG};
use crate::xml::{self, Element};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;

/// The XML-RPC wire grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlRpc;

impl WireFormat for XmlRpc {
    type Node = Element;

    fn mime_type(&self) -> &'static str {
        "text/xml"
    }

    fn default_encoding(&self) -> &'static str {
        DEFAULT_ENCODING
    }

    /// Encodes a value as a `<value>` element.
    fn encode(&self, value: &Value) -> Element {
        Element::new("value").with_child(encode_inner(value))
    }

    /// Decodes a `<value>` element.
    fn decode(&self, node: &Element) -> Result<Value, ProtocolError> {
        decode_value(node)
    }

    fn encode_call(&self, call: &Call) -> Element {
        let mut params = Element::new("params");
        for arg in &call.args {
            params.push(Element::new("param").with_child(self.encode(arg)));
        }
        Element::new("methodCall")
            .with_child(Element::text("methodName", call.method.as_str()))
            .with_child(params)
    }

    fn encode_response(&self, response: &Response) -> Element {
        let body = match &response.outcome {
            Outcome::Completed(value) => Element::new("params")
                .with_child(Element::new("param").with_child(self.encode(value))),
            Outcome::Faulted(fault) => {
                let fault_struct = Value::Map(vec![
                    ("faultCode".to_string(), Value::Int(fault.code)),
                    ("faultString".to_string(), Value::Str(fault.message.clone())),
                ]);
                Element::new("fault").with_child(self.encode(&fault_struct))
            }
        };
        Element::new("methodResponse").with_child(body)
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
        let mut message = decode_root(&doc.root).map_err(ProtocolError::into_invalid)?;
        message.set_encoding(charset.label());
        Ok(message)
    }
}

fn decode_root(root: &Element) -> Result<Message, ProtocolError> {
    match root.name.as_str() {
        "methodCall" => Ok(Message::Call(decode_call(root)?)),
        "methodResponse" => Ok(Message::Response(decode_response(root)?)),
        _ => Err(ProtocolError::malformed(format!(
            "expected <methodCall> or <methodResponse>, found {}",
            root.describe()
        ))),
    }
}

fn encode_inner(value: &Value) -> Element {
    match value {
        Value::Int(n) if i32::try_from(*n).is_ok() => Element::text("int", n.to_string()),
        Value::Int(n) => Element::text("i8", n.to_string()),
        Value::Float(n) => Element::text("double", n.to_string()),
        Value::Bool(b) => Element::text("boolean", if *b { "1" } else { "0" }),
        Value::Str(s) => Element::text("string", s.as_str()),
        Value::Null => Element::new("nil"),
        Value::Bytes(b) => Element::text("base64", BASE64.encode(b)),
        Value::Timestamp(ts) => {
            Element::text("dateTime.iso8601", ts.format(COMPACT_TIMESTAMP).to_string())
        }
        Value::List(items) => {
            let mut data = Element::new("data");
            for item in items {
                data.push(XmlRpc.encode(item));
            }
            Element::new("array").with_child(data)
        }
        Value::Map(members) => encode_struct(None, members),
        Value::Record { type_name, fields } => encode_struct(Some(type_name.as_str()), fields),
    }
}

fn encode_struct(type_name: Option<&str>, members: &[(String, Value)]) -> Element {
    let mut node = Element::new("struct");
    if let Some(type_name) = type_name {
        node.push(encode_member(TYPE_TAG, &Value::Str(type_name.to_string())));
    }
    for (name, value) in members {
        node.push(encode_member(name, value));
    }
    node
}

fn encode_member(name: &str, value: &Value) -> Element {
    Element::new("member")
        .with_child(Element::text("name", name))
        .with_child(XmlRpc.encode(value))
}

fn decode_value(node: &Element) -> Result<Value, ProtocolError> {
    if node.name != "value" {
        return Err(ProtocolError::malformed(format!(
            "expected <value>, found {}",
            node.describe()
        )));
    }

    let inner = match node.children.as_slice() {
        // An untyped value is a string, whitespace included.
        [] => return Ok(Value::Str(node.text.clone())),
        [inner] => {
            node.expect_no_text()?;
            inner
        }
        [_, extra, ..] => {
            return Err(ProtocolError::malformed(format!(
                "unexpected {} in {}",
                extra.describe(),
                node.describe()
            )))
        }
    };

    match inner.name.as_str() {
        "array" => {
            let data = inner.expect_only_child("data")?;
            data.expect_no_text()?;
            let items = data
                .children
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(items))
        }
        "struct" => decode_struct(inner),
        _ => decode_scalar(inner),
    }
}

fn decode_scalar(node: &Element) -> Result<Value, ProtocolError> {
    node.expect_leaf()?;
    let text = node.text.trim();
    let bad = |what: &str| {
        ProtocolError::malformed(format!("invalid {} {:?} in {}", what, text, node.describe()))
    };

    match node.name.as_str() {
        "int" | "i4" | "i8" => text.parse().map(Value::Int).map_err(|_| bad("integer")),
        "double" => text.parse().map(Value::Float).map_err(|_| bad("double")),
        "boolean" => match text {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            _ => Err(bad("boolean")),
        },
        "string" => Ok(Value::Str(node.text.clone())),
        "nil" => {
            node.expect_no_text()?;
            Ok(Value::Null)
        }
        "base64" => {
            let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            BASE64
                .decode(compact.as_bytes())
                .map(|b| Value::Bytes(Bytes::from(b)))
                .map_err(|_| bad("base64"))
        }
        "dateTime.iso8601" => parse_timestamp(text)
            .map(Value::Timestamp)
            .ok_or_else(|| bad("dateTime")),
        _ => Err(ProtocolError::malformed(format!(
            "unknown value type {}",
            node.describe()
        ))),
    }
}

fn decode_struct(node: &Element) -> Result<Value, ProtocolError> {
    node.expect_no_text()?;
    let mut members: Vec<(String, Value)> = Vec::with_capacity(node.children.len());
    for member in &node.children {
        if member.name != "member" {
            return Err(ProtocolError::malformed(format!(
                "expected <member>, found {} in {}",
                member.describe(),
                node.describe()
            )));
        }
        member.expect_no_text()?;
        let (name, value) = match member.children.as_slice() {
            [name, value] if name.name == "name" => (name, value),
            _ => {
                return Err(ProtocolError::malformed(format!(
                    "{} must contain <name> followed by <value>",
                    member.describe()
                )))
            }
        };
        name.expect_leaf()?;
        if members.iter().any(|(n, _)| *n == name.text) {
            return Err(ProtocolError::malformed(format!(
                "duplicate member {:?} in {}",
                name.text,
                node.describe()
            )));
        }
        members.push((name.text.clone(), decode_value(value)?));
    }
    tag_record(members, node)
}

/// Turns a member list whose first member is the type tag into a record.
pub(crate) fn tag_record(
    mut members: Vec<(String, Value)>,
    node: &Element,
) -> Result<Value, ProtocolError> {
    match members.first() {
        Some((name, _)) if name == TYPE_TAG => {}
        _ => return Ok(Value::Map(members)),
    }
    match members.remove(0).1 {
        Value::Str(type_name) => Ok(Value::Record {
            type_name,
            fields: members,
        }),
        other => Err(ProtocolError::malformed(format!(
            "{} member must be a string, found {} in {}",
            TYPE_TAG,
            other.kind(),
            node.describe()
        ))),
    }
}

fn decode_call(root: &Element) -> Result<Call, ProtocolError> {
    root.expect_no_text()?;
    let mut method = None;
    let mut params = None;
    for child in &root.children {
        let slot = match child.name.as_str() {
            "methodName" => &mut method,
            "params" => &mut params,
            _ => {
                return Err(ProtocolError::malformed(format!(
                    "unexpected {} in {}",
                    child.describe(),
                    root.describe()
                )))
            }
        };
        if slot.replace(child).is_some() {
            return Err(ProtocolError::malformed(format!(
                "duplicate {} in {}",
                child.describe(),
                root.describe()
            )));
        }
    }

    let method = method.ok_or_else(|| {
        ProtocolError::malformed(format!("missing <methodName> in {}", root.describe()))
    })?;
    method.expect_leaf()?;
    let name = method.text.trim();
    if name.is_empty() {
        return Err(ProtocolError::malformed(format!(
            "empty {}",
            method.describe()
        )));
    }

    let args = match params {
        Some(params) => decode_params(params)?,
        None => Vec::new(),
    };
    Ok(Call::new(name, args))
}

fn decode_params(params: &Element) -> Result<Vec<Value>, ProtocolError> {
    params.expect_no_text()?;
    params
        .children
        .iter()
        .map(|param| {
            if param.name != "param" {
                return Err(ProtocolError::malformed(format!(
                    "expected <param>, found {} in {}",
                    param.describe(),
                    params.describe()
                )));
            }
            decode_value(param.expect_only_child("value")?)
        })
        .collect()
}

fn decode_response(root: &Element) -> Result<Response, ProtocolError> {
    root.expect_no_text()?;
    let mut value = None;
    let mut fault = None;
    for child in &root.children {
        match child.name.as_str() {
            "params" if value.is_none() => {
                let mut args = decode_params(child)?;
                if args.len() != 1 {
                    return Err(ProtocolError::malformed(format!(
                        "{} must hold exactly one <param>, found {}",
                        child.describe(),
                        args.len()
                    )));
                }
                value = args.pop();
            }
            "fault" if fault.is_none() => {
                fault = Some(decode_fault(child)?);
            }
            _ => {
                return Err(ProtocolError::malformed(format!(
                    "unexpected {} in {}",
                    child.describe(),
                    root.describe()
                )))
            }
        }
    }
    Response::from_parts(value, fault)
}

fn decode_fault(node: &Element) -> Result<Fault, ProtocolError> {
    let value = decode_value(node.expect_only_child("value")?)?;
    fault_from_struct(&value, &node.describe())
}

/// Reads a `faultCode`/`faultString` struct.
pub(crate) fn fault_from_struct(value: &Value, location: &str) -> Result<Fault, ProtocolError> {
    let Value::Map(_) = value else {
        return Err(ProtocolError::malformed(format!(
            "fault in {} must be a struct, found {}",
            location,
            value.kind()
        )));
    };
    let code = value.get("faultCode").and_then(Value::as_i64).ok_or_else(|| {
        ProtocolError::malformed(format!("missing integer faultCode in {}", location))
    })?;
    let message = value.get("faultString").and_then(Value::as_str).ok_or_else(|| {
        ProtocolError::malformed(format!("missing string faultString in {}", location))
    })?;
    Ok(Fault::new(code, message))
}
