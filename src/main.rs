//! wirerpc - RPC endpoint for legacy wire formats
//!
//! Serves XML-RPC, JSON-RPC 1.0 and WDDX calls over HTTP and routes them to
//! registered handlers.

use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wirerpc_protocol::Value;
use wirerpc_server::{
    Config, HandlerError, HandlerRegistry, MethodTable, Router, Server, ServerConfig,
};

/// Handler registered under `demo`.
fn demo_handler() -> MethodTable {
    MethodTable::new()
        .method("echo", |args| Ok(Value::List(args.to_vec())))
        .method("add", |args| {
            args.iter().try_fold(Value::Int(0), |sum, arg| match (sum, arg) {
                (Value::Int(a), Value::Int(b)) => a
                    .checked_add(*b)
                    .map(Value::Int)
                    .ok_or_else(|| HandlerError::application("integer overflow")),
                (sum, arg) => match (sum.as_f64(), arg.as_f64()) {
                    (Some(a), Some(b)) => Ok(Value::Float(a + b)),
                    _ => Err(HandlerError::invalid_params(format!(
                        "cannot add {}",
                        arg.kind()
                    ))),
                },
            })
        })
        .method("concat", |args| {
            let mut out = String::new();
            for arg in args {
                match arg.as_str() {
                    Some(s) => out.push_str(s),
                    None => {
                        return Err(HandlerError::invalid_params(format!(
                            "cannot concatenate {}",
                            arg.kind()
                        )))
                    }
                }
            }
            Ok(Value::Str(out))
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if WIRERPC_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("WIRERPC_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("WIRERPC_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    tracing::info!("Starting wirerpc server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max body size: {} bytes", config.rpc.max_body_bytes);
    match config.rpc.encoding {
        Some(ref encoding) => tracing::info!("  Response encoding: {}", encoding),
        None => tracing::info!("  Response encoding: per request"),
    }

    let registry = HandlerRegistry::new()
        .with_handler("demo", demo_handler())
        .with_system_handler();
    tracing::info!("  Methods: {}", registry.method_names().join(", "));

    let server_config = ServerConfig::from_config(&config)?;
    if server_config.metrics_enabled() {
        tracing::info!("  Metrics: enabled ({})", server_config.metrics_path);
    } else {
        tracing::info!("  Metrics: disabled");
    }
    let server = Arc::new(Server::new(server_config, Arc::new(Router::new(registry))));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
