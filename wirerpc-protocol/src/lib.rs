//! # wirerpc-protocol
//!
//! Wire formats for wirerpc.
//!
//! This crate provides:
//! - The dynamically typed [`Value`] model and the native conversion boundary
//! - XML-RPC, JSON-RPC 1.0 and WDDX grammars behind the [`WireFormat`] trait
//! - Call/Response envelopes with character encoding metadata
//! - Error types and stable fault codes

pub mod charset;
pub mod codec;
pub mod convert;
pub mod error;
pub mod json;
pub mod message;
pub mod value;
pub mod wddx;
pub mod xml;
pub mod xmlrpc;

#[cfg(test)]
mod testing;

pub use charset::{Charset, DEFAULT_ENCODING};
pub use codec::{check_member_names, Grammar, WireFormat};
pub use convert::{
    from_keyed, is_contiguous_zero_based, record_from_value, record_to_value, FieldReader,
    FromValue, Key, RecordType, ToValue,
};
pub use error::{FaultCode, ProtocolError};
pub use json::JsonRpc;
pub use message::{Call, Fault, Message, Outcome, Response};
pub use value::{Value, TYPE_TAG};
pub use wddx::Wddx;
pub use xmlrpc::XmlRpc;

/// Maximum accepted payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;
