//! JSON-RPC 1.0 grammar.
//!
//! Calls are `{"method", "params", "id"}` objects and responses are
//! `{"result", "error", "id"}` objects. Values JSON has no literal for
//! travel as class hints: `{"__jsonclass__": [kind, payload]}` with kind
//! `datetime`, `base64` or `double` (non-finite floats).

use crate::charset::{self, Charset};
use crate::codec::{check_message, parse_timestamp, WireFormat, COMPACT_TIMESTAMP};
use crate::error::ProtocolError;
use crate::message::{Call, Fault, Message, Outcome, Response};
use crate::value::{Value, TYPE_TAG};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{json, Map, Number, Value as Json};
use std::fmt;

/// Reserved member name of a class hint object.
pub const CLASS_HINT: &str = "__jsonclass__";

/// The JSON-RPC 1.0 wire grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRpc;

impl WireFormat for JsonRpc {
    type Node = Json;

    fn mime_type(&self) -> &'static str {
        "application/json"
    }

    fn default_encoding(&self) -> &'static str {
        "utf-8"
    }

    fn encode(&self, value: &Value) -> Json {
        match value {
            Value::Int(n) => Json::from(*n),
            Value::Float(n) => match Number::from_f64(*n) {
                Some(number) => Json::Number(number),
                None => class_hint("double", non_finite_label(*n)),
            },
            Value::Bool(b) => Json::Bool(*b),
            Value::Str(s) => Json::String(s.clone()),
            Value::Null => Json::Null,
            Value::Bytes(b) => class_hint("base64", &BASE64.encode(b)),
            Value::Timestamp(ts) => {
                class_hint("datetime", &ts.format(COMPACT_TIMESTAMP).to_string())
            }
            Value::List(items) => Json::Array(items.iter().map(|v| self.encode(v)).collect()),
            Value::Map(members) => self.encode_object(None, members),
            Value::Record { type_name, fields } => {
                self.encode_object(Some(type_name.as_str()), fields)
            }
        }
    }

    fn decode(&self, node: &Json) -> Result<Value, ProtocolError> {
        match node {
            Json::Null => Ok(Value::Null),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if n.is_u64() {
                    Err(ProtocolError::malformed(format!("integer {} out of range", n)))
                } else {
                    n.as_f64()
                        .map(Value::Float)
                        .ok_or_else(|| ProtocolError::malformed(format!("invalid number {}", n)))
                }
            }
            Json::String(s) => Ok(Value::Str(s.clone())),
            Json::Array(items) => items
                .iter()
                .map(|item| self.decode(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Json::Object(members) => match class_hint_of(members) {
                Some(hint) => decode_class_hint(hint),
                None => self.decode_object(members),
            },
        }
    }

    fn encode_call(&self, call: &Call) -> Json {
        let params: Vec<Json> = call.args.iter().map(|v| self.encode(v)).collect();
        json!({
            "method": call.method,
            "params": params,
            "id": self.encode_id(call.id.as_ref()),
        })
    }

    fn encode_response(&self, response: &Response) -> Json {
        let (result, error) = match &response.outcome {
            Outcome::Completed(value) => (self.encode(value), Json::Null),
            Outcome::Faulted(fault) => (
                Json::Null,
                json!({ "code": fault.code, "message": fault.message }),
            ),
        };
        json!({
            "result": result,
            "error": error,
            "id": self.encode_id(response.id.as_ref()),
        })
    }

    fn encode_message(&self, message: &Message) -> Result<Bytes, ProtocolError> {
        check_message(message, Some(CLASS_HINT))?;
        let node = match message {
            Message::Call(call) => self.encode_call(call),
            Message::Response(response) => self.encode_response(response),
        };
        let charset = Charset::from_label(message.encoding())?;
        let text = serde_json::to_string(&node)?;
        Ok(Bytes::from(charset.encode(&text, unicode_escape)))
    }

    fn decode_message(
        &self,
        payload: &[u8],
        declared_encoding: Option<&str>,
    ) -> Result<Message, ProtocolError> {
        let charset = charset::resolve(None, declared_encoding, self.default_encoding())?;
        let text = charset.decode(payload)?;
        let node = serde_json::from_str::<StrictJson>(&text)?.0;
        let mut message = self
            .decode_envelope(&node)
            .map_err(ProtocolError::into_invalid)?;
        message.set_encoding(charset.label());
        Ok(message)
    }
}

impl JsonRpc {
    fn decode_envelope(&self, node: &Json) -> Result<Message, ProtocolError> {
        let Json::Object(members) = node else {
            return Err(ProtocolError::malformed(format!(
                "expected a JSON-RPC object, found {}",
                json_kind(node)
            )));
        };
        if members.contains_key("method") {
            Ok(Message::Call(self.decode_call(members)?))
        } else {
            Ok(Message::Response(self.decode_response(members)?))
        }
    }

    fn encode_object(&self, type_name: Option<&str>, members: &[(String, Value)]) -> Json {
        let mut object = Map::with_capacity(members.len() + 1);
        if let Some(type_name) = type_name {
            object.insert(TYPE_TAG.to_string(), Json::String(type_name.to_string()));
        }
        for (name, value) in members {
            object.insert(name.clone(), self.encode(value));
        }
        Json::Object(object)
    }

    fn decode_object(&self, members: &Map<String, Json>) -> Result<Value, ProtocolError> {
        let mut iter = members.iter().peekable();
        let type_name = match iter.peek() {
            Some((name, tag)) if name.as_str() == TYPE_TAG => {
                let Json::String(type_name) = tag else {
                    return Err(ProtocolError::malformed(format!(
                        "{} member must be a string, found {}",
                        TYPE_TAG,
                        json_kind(tag)
                    )));
                };
                iter.next();
                Some(type_name.clone())
            }
            _ => None,
        };

        let fields = iter
            .map(|(name, value)| Ok((name.clone(), self.decode(value)?)))
            .collect::<Result<Vec<_>, ProtocolError>>()?;
        Ok(match type_name {
            Some(type_name) => Value::Record { type_name, fields },
            None => Value::Map(fields),
        })
    }

    fn encode_id(&self, id: Option<&Value>) -> Json {
        id.map_or(Json::Null, |id| self.encode(id))
    }

    fn decode_id(&self, members: &Map<String, Json>) -> Result<Option<Value>, ProtocolError> {
        match members.get("id") {
            None | Some(Json::Null) => Ok(None),
            Some(id) => self.decode(id).map(Some),
        }
    }

    fn decode_call(&self, members: &Map<String, Json>) -> Result<Call, ProtocolError> {
        reject_unknown(members, &["method", "params", "id"])?;
        let method = match members.get("method") {
            Some(Json::String(method)) if !method.trim().is_empty() => method.trim(),
            Some(Json::String(_)) => return Err(ProtocolError::malformed("empty method name")),
            Some(other) => {
                return Err(ProtocolError::malformed(format!(
                    "method must be a string, found {}",
                    json_kind(other)
                )))
            }
            None => return Err(ProtocolError::malformed("missing method")),
        };
        let args = match members.get("params") {
            Some(Json::Array(params)) => params
                .iter()
                .map(|param| self.decode(param))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(ProtocolError::malformed(format!(
                    "params must be an array, found {}",
                    json_kind(other)
                )))
            }
            None => return Err(ProtocolError::malformed("missing params")),
        };

        let mut call = Call::new(method, args);
        call.id = self.decode_id(members)?;
        Ok(call)
    }

    fn decode_response(&self, members: &Map<String, Json>) -> Result<Response, ProtocolError> {
        reject_unknown(members, &["result", "error", "id"])?;
        let result = members.get("result");
        let error = members.get("error").filter(|e| !e.is_null());

        let value = match (result, error) {
            // A fault response carries a null result.
            (Some(Json::Null), Some(_)) => None,
            (Some(result), _) => Some(self.decode(result)?),
            (None, _) => None,
        };
        let fault = error.map(decode_error).transpose()?;

        Ok(Response::from_parts(value, fault)?.with_id(self.decode_id(members)?))
    }
}

fn decode_error(error: &Json) -> Result<Fault, ProtocolError> {
    let Json::Object(members) = error else {
        return Err(ProtocolError::malformed(format!(
            "error must be an object, found {}",
            json_kind(error)
        )));
    };
    let code = members
        .get("code")
        .and_then(Json::as_i64)
        .ok_or_else(|| ProtocolError::malformed("missing integer error code"))?;
    let message = members
        .get("message")
        .and_then(Json::as_str)
        .ok_or_else(|| ProtocolError::malformed("missing string error message"))?;
    Ok(Fault::new(code, message))
}

/// Members some peers add to the envelope; accepted and ignored.
const IGNORED_MEMBERS: [&str; 2] = ["jsonrpc", "version"];

fn reject_unknown(members: &Map<String, Json>, known: &[&str]) -> Result<(), ProtocolError> {
    match members
        .keys()
        .find(|k| !known.contains(&k.as_str()) && !IGNORED_MEMBERS.contains(&k.as_str()))
    {
        Some(unknown) => Err(ProtocolError::malformed(format!(
            "unexpected member {:?} in JSON-RPC envelope",
            unknown
        ))),
        None => Ok(()),
    }
}

fn class_hint(kind: &str, payload: &str) -> Json {
    json!({ CLASS_HINT: [kind, payload] })
}

fn class_hint_of(members: &Map<String, Json>) -> Option<&Json> {
    if members.len() == 1 {
        members.get(CLASS_HINT)
    } else {
        None
    }
}

fn decode_class_hint(hint: &Json) -> Result<Value, ProtocolError> {
    let (kind, payload) = match hint.as_array().map(Vec::as_slice) {
        Some([Json::String(kind), Json::String(payload)]) => (kind.as_str(), payload.as_str()),
        _ => {
            return Err(ProtocolError::malformed(format!(
                "{} must be a [kind, payload] pair of strings",
                CLASS_HINT
            )))
        }
    };
    let bad = || ProtocolError::malformed(format!("invalid {} payload {:?}", kind, payload));

    match kind {
        "datetime" => parse_timestamp(payload).map(Value::Timestamp).ok_or_else(bad),
        "base64" => BASE64
            .decode(payload)
            .map(|b| Value::Bytes(Bytes::from(b)))
            .map_err(|_| bad()),
        "double" => match payload {
            "inf" => Ok(Value::Float(f64::INFINITY)),
            "-inf" => Ok(Value::Float(f64::NEG_INFINITY)),
            "nan" => Ok(Value::Float(f64::NAN)),
            _ => Err(bad()),
        },
        _ => Err(ProtocolError::malformed(format!(
            "unknown {} kind {:?}",
            CLASS_HINT, kind
        ))),
    }
}

fn non_finite_label(n: f64) -> &'static str {
    if n.is_nan() {
        "nan"
    } else if n.is_sign_positive() {
        "inf"
    } else {
        "-inf"
    }
}

fn json_kind(node: &Json) -> &'static str {
    match node {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Writes a character as one or two `\uXXXX` escapes.
fn unicode_escape(c: char, out: &mut String) {
    let mut units = [0u16; 2];
    for unit in c.encode_utf16(&mut units) {
        out.push_str(&format!("\\u{:04x}", unit));
    }
}

/// A JSON tree that rejects objects with duplicate member names.
struct StrictJson(Json);

impl<'de> Deserialize<'de> for StrictJson {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(StrictVisitor).map(StrictJson)
    }
}

struct StrictVisitor;

impl<'de> Visitor<'de> for StrictVisitor {
    type Value = Json;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Json, E> {
        Ok(Json::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Json, E> {
        Ok(Json::from(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Json, E> {
        Ok(Json::from(v))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Json, E> {
        Ok(Number::from_f64(v).map_or(Json::Null, Json::Number))
    }

    fn visit_str<E>(self, v: &str) -> Result<Json, E> {
        Ok(Json::String(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<Json, E> {
        Ok(Json::String(v))
    }

    fn visit_unit<E>(self) -> Result<Json, E> {
        Ok(Json::Null)
    }

    fn visit_none<E>(self) -> Result<Json, E> {
        Ok(Json::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Json, A::Error> {
        let mut items = Vec::new();
        while let Some(StrictJson(item)) = seq.next_element()? {
            items.push(item);
        }
        Ok(Json::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Json, A::Error> {
        let mut members = Map::new();
        while let Some(name) = map.next_key::<String>()? {
            if members.contains_key(&name) {
                return Err(de::Error::custom(format!("duplicate member {:?}", name)));
            }
            let StrictJson(value) = map.next_value()?;
            members.insert(name, value);
        }
        Ok(Json::Object(members))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::arb_value;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn decode_text(text: &str) -> Result<Value, ProtocolError> {
        let node = serde_json::from_str::<StrictJson>(text)?.0;
        JsonRpc.decode(&node)
    }

    #[test]
    fn test_encode_scalars() {
        assert_eq!(JsonRpc.encode(&Value::Int(1)), json!(1));
        assert_eq!(JsonRpc.encode(&Value::Float(1.0)).to_string(), "1.0");
        assert_eq!(JsonRpc.encode(&Value::Bool(false)), json!(false));
        assert_eq!(JsonRpc.encode(&Value::Null), Json::Null);
        assert_eq!(JsonRpc.encode(&Value::List(vec![])), json!([]));
    }

    #[test]
    fn test_int_and_float_stay_distinct() {
        assert_eq!(decode_text("1").unwrap(), Value::Int(1));
        assert_eq!(decode_text("1.0").unwrap(), Value::Float(1.0));
        assert_eq!(decode_text("1e3").unwrap(), Value::Float(1000.0));
        assert!(matches!(
            decode_text("18446744073709551615"),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_object_keeps_order() {
        let value = Value::Map(vec![
            ("upperBound".into(), Value::Int(139)),
            ("lowerBound".into(), Value::Int(18)),
        ]);
        let text = JsonRpc.encode(&value).to_string();
        assert_eq!(text, r#"{"upperBound":139,"lowerBound":18}"#);
        assert_eq!(decode_text(&text).unwrap(), value);
    }

    #[test]
    fn test_record_tagging() {
        let record = Value::record(
            "pkg.Type",
            vec![
                ("name".into(), Value::Str("Timm".into())),
                ("age".into(), Value::Int(30)),
            ],
        );
        let text = JsonRpc.encode(&record).to_string();
        assert_eq!(text, r#"{"__type":"pkg.Type","name":"Timm","age":30}"#);
        assert_eq!(decode_text(&text).unwrap(), record);

        let err = decode_text(r#"{"__type":1}"#).unwrap_err();
        assert!(err.to_string().contains("__type member must be a string"));
    }

    #[test]
    fn test_class_hints() {
        let ts = NaiveDate::from_ymd_opt(2005, 11, 29)
            .unwrap()
            .and_hms_opt(18, 13, 48)
            .unwrap();
        assert_eq!(
            JsonRpc.encode(&Value::Timestamp(ts)),
            json!({"__jsonclass__": ["datetime", "20051129T18:13:48"]})
        );
        assert_eq!(
            JsonRpc.encode(&Value::Bytes(Bytes::from_static(b"Unittest"))),
            json!({"__jsonclass__": ["base64", "VW5pdHRlc3Q="]})
        );
        assert_eq!(
            decode_text(r#"{"__jsonclass__":["double","-inf"]}"#).unwrap(),
            Value::Float(f64::NEG_INFINITY)
        );
        assert!(matches!(
            decode_text(r#"{"__jsonclass__":["regexp","a+"]}"#),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_duplicate_members_rejected() {
        let err = decode_text(r#"{"a":1,"a":2}"#).unwrap_err();
        assert!(err.to_string().contains("duplicate member"), "{}", err);
        assert!(err.to_string().contains("line 1"), "{}", err);
    }

    #[test]
    fn test_call_roundtrip_with_id() {
        let call = Call::new("Foo.bar", vec![Value::Int(1), Value::Str("x".into())])
            .with_encoding("utf-8")
            .with_id(Value::Str("req-1".into()));
        let bytes = JsonRpc.encode_message(&call.clone().into()).unwrap();
        assert_eq!(
            &bytes[..],
            br#"{"method":"Foo.bar","params":[1,"x"],"id":"req-1"}"#
        );
        assert_eq!(JsonRpc.decode_message(&bytes, None).unwrap(), Message::Call(call));
    }

    #[test]
    fn test_call_validation() {
        for payload in [
            &br#"{"method":"a.b"}"#[..],
            br#"{"params":[1]}"#,
            br#"{"method":7,"params":[]}"#,
            br#"{"method":"","params":[]}"#,
            br#"{"method":"a.b","params":{}}"#,
            br#"{"method":"a.b","params":[],"extra":1}"#,
            br#"{"method":"a.b","params":[{"__jsonclass__":["base64","!"]}]}"#,
            br#"[1,2]"#,
        ] {
            assert!(
                matches!(
                    JsonRpc.decode_message(payload, None),
                    Err(ProtocolError::InvalidMessage(_))
                ),
                "accepted {}",
                String::from_utf8_lossy(payload)
            );
        }
        for payload in [
            &br#"{"method":"a.b","params":["#[..],
            br#"{"method":"a.b","method":"c.d","params":[]}"#,
            b"",
        ] {
            assert!(
                matches!(
                    JsonRpc.decode_message(payload, None),
                    Err(ProtocolError::MalformedPayload(_))
                ),
                "{}",
                String::from_utf8_lossy(payload)
            );
        }
        assert!(JsonRpc
            .decode_message(br#"{"jsonrpc":"2.0","method":"a.b","params":[],"id":1}"#, None)
            .is_ok());
    }

    #[test]
    fn test_responses() {
        let ok = JsonRpc
            .decode_message(br#"{"result":null,"error":null,"id":3}"#, None)
            .unwrap()
            .into_response()
            .unwrap();
        assert_eq!(ok.value(), Some(&Value::Null));
        assert_eq!(ok.id, Some(Value::Int(3)));

        let fault = JsonRpc
            .decode_message(
                br#"{"result":null,"error":{"code":-32601,"message":"nope"},"id":null}"#,
                None,
            )
            .unwrap()
            .into_response()
            .unwrap();
        assert_eq!(fault.get_fault(), Some(&Fault::new(-32601, "nope")));
        assert_eq!(fault.id, None);
    }

    #[test]
    fn test_response_exclusivity() {
        for payload in [
            &br#"{"result":1,"error":{"code":1,"message":"x"},"id":null}"#[..],
            br#"{"error":null,"id":null}"#,
            br#"{"result":null,"error":{"code":"x"},"id":null}"#,
        ] {
            assert!(matches!(
                JsonRpc.decode_message(payload, None),
                Err(ProtocolError::InvalidMessage(_))
            ));
        }
    }

    #[test]
    fn test_reserved_member_names() {
        // An object whose only member is the class hint is always a hint.
        assert!(decode_text(r#"{"__jsonclass__":1}"#).is_err());
        assert_eq!(
            decode_text(r#"{"__jsonclass__":1,"a":2}"#).unwrap(),
            Value::Map(vec![
                ("__jsonclass__".into(), Value::Int(1)),
                ("a".into(), Value::Int(2)),
            ])
        );
        // A leading __type member is read as a record tag.
        assert_eq!(
            decode_text(r#"{"__type":"pkg.Type","a":1}"#).unwrap(),
            Value::record("pkg.Type", vec![("a".into(), Value::Int(1))])
        );

        for value in [
            Value::Map(vec![(CLASS_HINT.into(), Value::Str("x".into()))]),
            Value::Map(vec![(TYPE_TAG.into(), Value::Str("pkg.Type".into()))]),
            Value::record("pkg.Type", vec![(TYPE_TAG.into(), Value::Str("other".into()))]),
            Value::Map(vec![("a".into(), Value::Null), ("a".into(), Value::Int(1))]),
        ] {
            let call = Call::new("a.b", vec![value.clone()]).with_encoding("utf-8");
            assert!(
                matches!(
                    JsonRpc.encode_message(&call.into()),
                    Err(ProtocolError::UnsupportedType(_))
                ),
                "encoded {:?}",
                value
            );
        }
    }

    #[test]
    fn test_whitespace_strings_and_names() {
        let value = Value::Map(vec![
            ("".into(), Value::Str("  ".into())),
            ("\t".into(), Value::Str("\r\n".into())),
        ]);
        let call = Call::new("a.b", vec![value]).with_encoding("utf-8");
        let bytes = JsonRpc.encode_message(&call.clone().into()).unwrap();
        assert_eq!(JsonRpc.decode_message(&bytes, None).unwrap(), Message::Call(call));
    }

    #[test]
    fn test_latin1_escapes() {
        let call = Call::new("a.b", vec![Value::Str("ä€😀".into())]);
        let bytes = JsonRpc.encode_message(&call.clone().into()).unwrap();
        assert_eq!(
            &bytes[..],
            b"{\"method\":\"a.b\",\"params\":[\"\xe4\\u20ac\\ud83d\\ude00\"],\"id\":null}"
        );
        assert_eq!(
            JsonRpc.decode_message(&bytes, Some("iso-8859-1")).unwrap(),
            Message::Call(call)
        );
    }

    #[test]
    fn test_default_encoding_is_utf8() {
        let message = JsonRpc
            .decode_message("{\"method\":\"a.b\",\"params\":[\"ä\"]}".as_bytes(), None)
            .unwrap();
        assert_eq!(message.encoding(), "utf-8");
    }

    proptest! {
        #[test]
        fn prop_value_roundtrip(value in arb_value()) {
            let text = JsonRpc.encode(&value).to_string();
            prop_assert_eq!(decode_text(&text).unwrap(), value);
        }
    }
}
