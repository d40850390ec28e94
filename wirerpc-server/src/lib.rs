//! # wirerpc-server
//!
//! HTTP endpoint for wirerpc.
//!
//! This crate provides:
//! - Handler registration and method routing (`handler.method`)
//! - A dispatch state machine with injectable observers
//! - The built-in `system` handler
//! - An HTTP/1 server with one path per grammar
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod observer;
pub mod router;
pub mod server;
pub mod system;

pub use config::{Config, ConfigError, EndpointConfig, MetricsConfig, NetworkConfig, RpcConfig};
pub use error::{RoutingError, ServerError};
pub use handler::{Handler, HandlerError, HandlerRegistry, HandlerResolver, MethodTable};
pub use metrics::Metrics;
pub use observer::{DispatchEvent, DispatchObserver, NoopObserver, TracingObserver};
pub use router::{split_method, Dispatch, DispatchState, Router};
pub use server::{Server, ServerConfig, ServerStats};
pub use system::SystemHandler;
