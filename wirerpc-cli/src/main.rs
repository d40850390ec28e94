//! wirerpc-cli - Command-line client for wirerpc endpoints
//!
//! Arguments and results are written as JSON. Values JSON has no literal
//! for use `{"__jsonclass__": [kind, payload]}` hints.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wirerpc_client::{Client, ClientError, TransportConfig};
use wirerpc_protocol::Grammar;

#[derive(Parser)]
#[command(name = "wirerpc-cli")]
#[command(about = "Command-line client for XML-RPC, JSON-RPC and WDDX endpoints")]
#[command(version)]
struct Cli {
    /// Server base URL
    #[arg(short, long, default_value = "http://127.0.0.1:8080", env = "WIRERPC_URL")]
    server: String,

    /// Wire grammar (xml-rpc, json-rpc, wddx)
    #[arg(short, long, default_value = "xml-rpc", env = "WIRERPC_GRAMMAR")]
    grammar: Grammar,

    /// Endpoint path (defaults to the grammar's standard path)
    #[arg(short, long)]
    path: Option<String>,

    /// Character encoding of requests (defaults to the grammar's)
    #[arg(short, long)]
    encoding: Option<String>,

    /// Extra request header as NAME:VALUE
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Call a method and print its result
    Call {
        /// Method name (handler.method)
        method: String,

        /// Arguments as JSON literals; anything else is sent as a string
        args: Vec<String>,
    },

    /// Ping the endpoint
    Ping,

    /// List the methods the endpoint advertises
    ListMethods,

    /// Print the encoded call without sending it
    Encode {
        /// Method name (handler.method)
        method: String,

        /// Arguments as JSON literals; anything else is sent as a string
        args: Vec<String>,
    },

    /// Decode a call or response payload
    Decode {
        /// Payload file (reads stdin when omitted)
        file: Option<PathBuf>,
    },
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    match s.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected NAME:VALUE, got {:?}", s)),
    }
}

/// Builds a client for the endpoint the options name.
fn connect(cli: &Cli, encoding: &str) -> Result<Client, ClientError> {
    let path = cli
        .path
        .clone()
        .unwrap_or_else(|| commands::default_path(cli.grammar).to_string());
    let url = format!("{}{}", cli.server.trim_end_matches('/'), path);
    tracing::debug!(%url, grammar = %cli.grammar, "using endpoint");

    let mut config = TransportConfig::new(url, cli.grammar)
        .with_encoding(encoding)
        .with_request_timeout(Duration::from_secs(cli.timeout));
    for (name, value) in &cli.headers {
        config = config.with_header(name.clone(), value.clone());
    }
    Client::new(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let encoding = cli
        .encoding
        .clone()
        .unwrap_or_else(|| cli.grammar.default_encoding().to_string());

    let result = match &cli.command {
        Commands::Call { method, args } => {
            commands::call(&connect(&cli, &encoding)?, method, args).await
        }
        Commands::Ping => commands::ping(&connect(&cli, &encoding)?).await,
        Commands::ListMethods => commands::list_methods(&connect(&cli, &encoding)?).await,
        Commands::Encode { method, args } => {
            match commands::encode_call(cli.grammar, &encoding, method, args) {
                Ok(payload) => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&payload)?;
                    stdout.write_all(b"\n")?;
                    return Ok(());
                }
                Err(e) => Err(e),
            }
        }
        Commands::Decode { file } => {
            let payload = match file {
                Some(path) => std::fs::read(path)?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            commands::decode(cli.grammar, cli.encoding.as_deref(), &payload)
        }
    };

    match result {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}
