//! In-memory value model shared by all wire grammars.

use bytes::Bytes;
use chrono::NaiveDateTime;
use std::fmt;

/// Reserved member name carrying a record's type name on the wire.
pub const TYPE_TAG: &str = "__type";

/// A value that can cross the wire.
///
/// `List` and `Map` are distinct here even though some grammars could
/// represent both with one construct. Which one a native collection
/// becomes is decided once, at the conversion boundary (see
/// [`crate::convert`]); decoders rely on the grammar tag only.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
    Bytes(Bytes),
    Timestamp(NaiveDateTime),
    List(Vec<Value>),
    /// Ordered members with unique keys.
    Map(Vec<(String, Value)>),
    /// A tagged object: type name plus ordered fields.
    Record {
        type_name: String,
        fields: Vec<(String, Value)>,
    },
}

impl Value {
    /// Creates a record value.
    pub fn record(type_name: impl Into<String>, fields: Vec<(String, Value)>) -> Self {
        Value::Record {
            type_name: type_name.into(),
            fields,
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "double",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Null => "nil",
            Value::Bytes(_) => "base64",
            Value::Timestamp(_) => "dateTime",
            Value::List(_) => "array",
            Value::Map(_) => "struct",
            Value::Record { .. } => "record",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the members of a map or the fields of a record.
    pub fn members(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(members) => Some(members),
            Value::Record { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Looks up a member of a map or a field of a record by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.members()?
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// Returns the record's type name, if this is a record.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Value::Record { type_name, .. } => Some(type_name),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Null => write!(f, "null"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M:%S")),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(members) => fmt_members(f, members),
            Value::Record { type_name, fields } => {
                write!(f, "{} ", type_name)?;
                fmt_members(f, fields)
            }
        }
    }
}

fn fmt_members(f: &mut fmt::Formatter<'_>, members: &[(String, Value)]) -> fmt::Result {
    write!(f, "{{")?;
    for (i, (name, value)) in members.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: {}", name, value)?;
    }
    write!(f, "}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Value {
        Value::record(
            "pkg.Type",
            vec![
                ("name".to_string(), Value::Str("Timm".to_string())),
                ("age".to_string(), Value::Int(30)),
            ],
        )
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Int(7).as_i64(), Some(7));
        assert_eq!(Value::Int(7).as_f64(), Some(7.0));
        assert_eq!(Value::Float(1.5).as_i64(), None);
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Str("x".into()).as_str(), Some("x"));
        assert!(Value::Null.is_null());
        assert_eq!(Value::List(vec![Value::Null]).as_list().map(|l| l.len()), Some(1));
    }

    #[test]
    fn test_record_lookup() {
        let value = person();
        assert_eq!(value.type_name(), Some("pkg.Type"));
        assert_eq!(value.get("age"), Some(&Value::Int(30)));
        assert_eq!(value.get("missing"), None);
        assert_eq!(Value::Int(1).get("age"), None);
    }

    #[test]
    fn test_map_order_is_significant() {
        let a = Value::Map(vec![
            ("a".into(), Value::Int(1)),
            ("b".into(), Value::Int(2)),
        ]);
        let b = Value::Map(vec![
            ("b".into(), Value::Int(2)),
            ("a".into(), Value::Int(1)),
        ]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        assert_eq!(person().to_string(), "pkg.Type {name: \"Timm\", age: 30}");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Bool(false)]).to_string(),
            "[1, false]"
        );
        assert_eq!(Value::Bytes(Bytes::from_static(b"abc")).to_string(), "<3 bytes>");
    }

    #[test]
    fn test_kind() {
        assert_eq!(Value::Int(1).kind(), "int");
        assert_eq!(Value::Map(vec![]).kind(), "struct");
        assert_eq!(person().kind(), "record");
    }
}
