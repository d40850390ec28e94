//! # wirerpc-client
//!
//! Client library for wirerpc.
//!
//! This crate provides:
//! - An HTTP transport posting encoded calls with reqwest
//! - Status interpretation separate from the round trip
//! - A high-level async API returning results or faults

pub mod client;
pub mod error;
pub mod transport;

pub use client::Client;
pub use error::ClientError;
pub use transport::{interpret_response, HttpTransport, TransportConfig, DEFAULT_USER_AGENT};
