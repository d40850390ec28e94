//! Shared proptest strategies.

use crate::value::{Value, TYPE_TAG};
use bytes::Bytes;
use proptest::prelude::*;

/// Whole-second timestamps between 1970 and 2096.
pub(crate) fn arb_timestamp() -> impl Strategy<Value = chrono::NaiveDateTime> {
    (0i64..4_000_000_000).prop_filter_map("out of range", |secs| {
        chrono::DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
    })
}

/// Member names, including empty and whitespace-bearing ones. Never the
/// record tag, which only round-trips in leading position of a record.
pub(crate) fn arb_name() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_ \t\r\n.-]{0,8}".prop_filter("reserved", |name| name != TYPE_TAG)
}

/// Strings with markup characters and whitespace-only runs.
pub(crate) fn arb_string() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 \t\r\näöü€<>&\"']{0,12}",
        "[ \t\r\n]{1,4}",
    ]
}

/// Arbitrary values, excluding NaN and member names that collide with
/// the reserved tags.
pub(crate) fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Value::Int),
        any::<f64>()
            .prop_filter("NaN never compares equal", |f| !f.is_nan())
            .prop_map(Value::Float),
        any::<bool>().prop_map(Value::Bool),
        arb_string().prop_map(Value::Str),
        Just(Value::Null),
        proptest::collection::vec(any::<u8>(), 0..16).prop_map(|b| Value::Bytes(Bytes::from(b))),
        arb_timestamp().prop_map(Value::Timestamp),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            proptest::collection::btree_map(arb_name(), inner.clone(), 0..4)
                .prop_map(|m| Value::Map(m.into_iter().collect())),
            (
                "[a-z][a-zA-Z0-9_.]{0,8}",
                proptest::collection::btree_map(arb_name(), inner, 0..4)
            )
                .prop_map(|(type_name, fields)| {
                    Value::record(type_name, fields.into_iter().collect())
                }),
        ]
    })
}
