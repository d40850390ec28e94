//! Conversion boundary between native Rust values and [`Value`].
//!
//! Everything that crosses the wire is turned into a [`Value`] up front;
//! codecs only ever match over that sum type. Record types declare their
//! field list through [`RecordType`] instead of being inspected at encode
//! time.

use crate::error::ProtocolError;
use crate::value::Value;
use bytes::Bytes;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};

/// Key of a native keyed collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Index(i64),
    Name(String),
}

impl Key {
    fn into_name(self) -> String {
        match self {
            Key::Index(n) => n.to_string(),
            Key::Name(s) => s,
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Index(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Name(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Name(s)
    }
}

/// Returns whether `keys`, in iteration order, are exactly `0, 1, .., n-1`.
///
/// An empty key set counts as contiguous.
pub fn is_contiguous_zero_based<'a>(keys: impl IntoIterator<Item = &'a Key>) -> bool {
    keys.into_iter()
        .enumerate()
        .all(|(i, key)| matches!(key, Key::Index(n) if *n == i as i64))
}

/// Builds a list or a map from a keyed collection.
///
/// Yields [`Value::List`] when the keys form a contiguous zero-based
/// sequence and [`Value::Map`] otherwise, with integer keys rendered as
/// decimal strings. Later duplicates replace earlier entries in place.
pub fn from_keyed(entries: Vec<(Key, Value)>) -> Value {
    if is_contiguous_zero_based(entries.iter().map(|(k, _)| k)) {
        return Value::List(entries.into_iter().map(|(_, v)| v).collect());
    }

    let mut members: Vec<(String, Value)> = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let name = key.into_name();
        match members.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => members.push((name, value)),
        }
    }
    Value::Map(members)
}

/// Conversion of a native value into the value model.
pub trait ToValue {
    fn to_value(&self) -> Result<Value, ProtocolError>;
}

/// Conversion of a decoded value back into a native value.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ProtocolError>;
}

fn mismatch(expected: &'static str, found: &Value) -> ProtocolError {
    ProtocolError::TypeMismatch {
        expected,
        found: found.kind(),
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        Ok(self.clone())
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        (**self).to_value()
    }
}

impl ToValue for () {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        Ok(Value::Null)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        Ok(Value::Bool(*self))
    }
}

macro_rules! lossless_int_to_value {
    ($($t:ty),*) => {
        $(
            impl ToValue for $t {
                fn to_value(&self) -> Result<Value, ProtocolError> {
                    Ok(Value::Int(i64::from(*self)))
                }
            }
        )*
    };
}

lossless_int_to_value!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! checked_int_to_value {
    ($($t:ty),*) => {
        $(
            impl ToValue for $t {
                fn to_value(&self) -> Result<Value, ProtocolError> {
                    i64::try_from(*self)
                        .map(Value::Int)
                        .map_err(|_| ProtocolError::UnsupportedType(stringify!($t).to_string()))
                }
            }
        )*
    };
}

checked_int_to_value!(u64, usize, isize, i128, u128);

impl ToValue for f32 {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        Ok(Value::Float(f64::from(*self)))
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        Ok(Value::Float(*self))
    }
}

impl ToValue for str {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        Ok(Value::Str(self.to_string()))
    }
}

impl ToValue for String {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        Ok(Value::Str(self.clone()))
    }
}

impl ToValue for char {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        Ok(Value::Str(self.to_string()))
    }
}

impl ToValue for Bytes {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        Ok(Value::Bytes(self.clone()))
    }
}

impl ToValue for NaiveDateTime {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        Ok(Value::Timestamp(*self))
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        match self {
            Some(v) => v.to_value(),
            None => Ok(Value::Null),
        }
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        self.iter()
            .map(ToValue::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List)
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        self.as_slice().to_value()
    }
}

impl<T: ToValue> ToValue for BTreeMap<String, T> {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        let mut members = Vec::with_capacity(self.len());
        for (name, value) in self {
            members.push((name.clone(), value.to_value()?));
        }
        Ok(Value::Map(members))
    }
}

/// Members are emitted sorted by key so the output is deterministic.
impl<T: ToValue> ToValue for HashMap<String, T> {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        let mut names: Vec<&String> = self.keys().collect();
        names.sort();
        let mut members = Vec::with_capacity(self.len());
        for name in names {
            members.push((name.clone(), self[name].to_value()?));
        }
        Ok(Value::Map(members))
    }
}

/// Integer-keyed maps become lists when their keys are `0..n`.
impl<T: ToValue> ToValue for BTreeMap<i64, T> {
    fn to_value(&self) -> Result<Value, ProtocolError> {
        let mut entries = Vec::with_capacity(self.len());
        for (key, value) in self {
            entries.push((Key::Index(*key), value.to_value()?));
        }
        Ok(from_keyed(entries))
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        value.as_bool().ok_or_else(|| mismatch("boolean", value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        value.as_i64().ok_or_else(|| mismatch("int", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        value
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| mismatch("i32", value))
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        value
            .as_i64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| mismatch("u32", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        value.as_f64().ok_or_else(|| mismatch("double", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("string", value))
    }
}

impl FromValue for Bytes {
    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            other => Err(mismatch("base64", other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            other => Err(mismatch("dateTime", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        match value {
            Value::List(items) => items.iter().map(T::from_value).collect(),
            other => Err(mismatch("array", other)),
        }
    }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Map(members) => members
                .iter()
                .map(|(name, v)| Ok((name.clone(), T::from_value(v)?)))
                .collect(),
            other => Err(mismatch("struct", other)),
        }
    }
}

/// Descriptor for a native type that crosses the wire as a tagged record.
///
/// `FIELDS` is the declared field list; `field_values` must return one
/// value per declared field, in the same order.
pub trait RecordType: Sized {
    const TYPE_NAME: &'static str;
    const FIELDS: &'static [&'static str];

    fn field_values(&self) -> Result<Vec<Value>, ProtocolError>;

    fn from_fields(fields: &FieldReader<'_>) -> Result<Self, ProtocolError>;
}

/// Read access to the fields of a decoded record.
pub struct FieldReader<'a> {
    fields: &'a [(String, Value)],
}

impl<'a> FieldReader<'a> {
    /// Converts the named field. A missing field reads as `Null`.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, ProtocolError> {
        let value = self
            .fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .unwrap_or(&Value::Null);
        T::from_value(value)
    }
}

/// Converts a record type into a tagged [`Value::Record`].
pub fn record_to_value<R: RecordType>(record: &R) -> Result<Value, ProtocolError> {
    let values = record.field_values()?;
    if values.len() != R::FIELDS.len() {
        return Err(ProtocolError::UnsupportedType(R::TYPE_NAME.to_string()));
    }
    let fields = R::FIELDS
        .iter()
        .map(|name| name.to_string())
        .zip(values)
        .collect();
    Ok(Value::record(R::TYPE_NAME, fields))
}

/// Converts a tagged [`Value::Record`] back into its record type.
pub fn record_from_value<R: RecordType>(value: &Value) -> Result<R, ProtocolError> {
    match value {
        Value::Record { type_name, fields } if type_name == R::TYPE_NAME => {
            R::from_fields(&FieldReader { fields })
        }
        other => Err(mismatch(R::TYPE_NAME, other)),
    }
}
