//! HTTP endpoint.
//!
//! Each configured path feeds POST bodies to the [`Router`] in one grammar
//! and writes the encoded response back. Faults are sent with status 500.

use crate::config::{Config, RpcConfig};
use crate::error::ServerError;
use crate::metrics::{Metrics, METRICS_CONTENT_TYPE};
use crate::router::Router;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use wirerpc_protocol::charset::content_type_charset;
use wirerpc_protocol::Charset;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Endpoints, body limit and response encoding.
    pub rpc: RpcConfig,
    /// Path metrics are served at.
    pub metrics_path: String,
    /// Metrics instance (if metrics are enabled).
    pub metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("rpc", &self.rpc)
            .field("metrics_path", &self.metrics_path)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            rpc: RpcConfig::default(),
            metrics_path: "/metrics".to_string(),
            metrics: None,
        }
    }

    /// Builds the server configuration, creating metrics when enabled.
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        let metrics = if config.metrics.enabled {
            Some(Arc::new(Metrics::new()?))
        } else {
            None
        };
        Ok(Self {
            bind_addr: config.network.bind_addr,
            rpc: config.rpc.clone(),
            metrics_path: config.metrics.path.clone(),
            metrics,
        })
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns whether metrics are enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics.is_some()
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub faults_total: AtomicU64,
}

/// HTTP server for wirerpc.
pub struct Server {
    config: ServerConfig,
    service: Arc<RpcService>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, router: Arc<Router>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let encoding = config.rpc.encoding.as_deref().and_then(|label| {
            Charset::from_label(label)
                .map_err(|e| tracing::warn!("ignoring response encoding: {}", e))
                .ok()
        });
        let service = RpcService {
            router,
            rpc: config.rpc.clone(),
            encoding,
            metrics_path: config.metrics_path.clone(),
            metrics: config.metrics.clone(),
            stats: Arc::new(ServerStats::default()),
        };
        Self {
            config,
            service: Arc::new(service),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and runs the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Runs the server on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);

        let addr = listener.local_addr()?;
        for endpoint in &self.config.rpc.endpoints {
            tracing::info!(
                "Serving {} at http://{}{}",
                endpoint.grammar,
                addr,
                endpoint.path
            );
        }
        if self.config.metrics_enabled() {
            tracing::info!("Serving metrics at http://{}{}", addr, self.config.metrics_path);
        }

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let service = self.service.clone();
                            service.connection_opened();
                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let conn_service = service.clone();
                                let svc = service_fn(move |req| {
                                    let service = conn_service.clone();
                                    async move { Ok::<_, Infallible>(service.handle(req).await) }
                                });
                                if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                                    tracing::debug!("Connection {} error: {}", peer, e);
                                }
                                service.connection_closed();
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.service.stats
    }
}

/// Per-request handling shared by all connections.
struct RpcService {
    router: Arc<Router>,
    rpc: RpcConfig,
    /// Encoding forced onto every response.
    encoding: Option<Charset>,
    metrics_path: String,
    metrics: Option<Arc<Metrics>>,
    stats: Arc<ServerStats>,
}

impl RpcService {
    fn connection_opened(&self) {
        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
        if let Some(ref metrics) = self.metrics {
            metrics.connections_total.inc();
            metrics.connections_active.inc();
        }
    }

    fn connection_closed(&self) {
        self.stats.connections_active.fetch_sub(1, Ordering::Relaxed);
        if let Some(ref metrics) = self.metrics {
            metrics.connections_active.dec();
        }
    }

    async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let path = req.uri().path().to_string();

        if let Some(ref metrics) = self.metrics {
            if path == self.metrics_path {
                return match metrics.encode() {
                    Ok(body) => reply(StatusCode::OK, METRICS_CONTENT_TYPE, body),
                    Err(e) => plain(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                };
            }
        }

        let Some(grammar) = self.rpc.grammar_for(&path) else {
            return plain(StatusCode::NOT_FOUND, "Not Found");
        };
        if req.method() != Method::POST {
            let mut response = plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("POST"));
            return response;
        }

        let start = Instant::now();
        self.stats.requests_total.fetch_add(1, Ordering::Relaxed);
        if let Some(ref metrics) = self.metrics {
            metrics.requests_total.with_label_values(&[grammar.name()]).inc();
        }

        let declared = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(content_type_charset)
            .map(str::to_string);

        let body = match Limited::new(req.into_body(), self.rpc.max_body_bytes)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                tracing::warn!(%grammar, limit = self.rpc.max_body_bytes, "request body too large");
                return plain(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
            }
            Err(e) => {
                tracing::debug!(%grammar, "failed to read request body: {}", e);
                return plain(StatusCode::BAD_REQUEST, "Bad Request");
            }
        };

        let mut dispatch = self.router.handle(grammar, &body, declared.as_deref());
        if let Some(charset) = self.encoding {
            dispatch.response.encoding = charset.label().to_string();
        }
        if let Some(fault) = dispatch.response.get_fault() {
            self.stats.faults_total.fetch_add(1, Ordering::Relaxed);
            if let Some(ref metrics) = self.metrics {
                metrics.record_fault(fault.code);
            }
        }

        let response = match self.router.encode(grammar, &dispatch) {
            Ok(bytes) => {
                let status = StatusCode::from_u16(dispatch.http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                reply(
                    status,
                    &grammar.content_type(&dispatch.response.encoding),
                    bytes,
                )
            }
            Err(e) => {
                tracing::error!(%grammar, "failed to encode response: {}", e);
                plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };

        if let Some(ref metrics) = self.metrics {
            metrics
                .request_duration
                .with_label_values(&[grammar.name()])
                .observe(start.elapsed().as_secs_f64());
        }
        response
    }
}

fn reply(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

fn plain(status: StatusCode, body: impl Into<String>) -> Response<Full<Bytes>> {
    reply(status, "text/plain; charset=utf-8", body.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerError, HandlerRegistry, MethodTable};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wirerpc_protocol::{Call, Grammar, Message, Value};

    fn router() -> Arc<Router> {
        let echo = MethodTable::new()
            .method("echo", |args| {
                HandlerError::check_arity(args, 1)?;
                Ok(args[0].clone())
            })
            .method("fail", |_| Err(HandlerError::application("nope")));
        Arc::new(Router::new(
            HandlerRegistry::new()
                .with_handler("Test", echo)
                .with_system_handler(),
        ))
    }

    fn service(config: ServerConfig) -> Arc<RpcService> {
        Server::new(config, router()).service.clone()
    }

    fn default_service() -> Arc<RpcService> {
        service(ServerConfig::new("127.0.0.1:0".parse().unwrap()))
    }

    fn post(path: &str, content_type: &str, body: impl Into<Bytes>) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, content_type)
            .body(Full::new(body.into()))
            .unwrap()
    }

    async fn body_of(response: Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    fn encoded_call(grammar: Grammar, call: Call) -> Bytes {
        grammar.encode_message(&Message::Call(call)).unwrap()
    }

    #[tokio::test]
    async fn test_xmlrpc_success() {
        let service = default_service();
        let call = Call::new("Test.echo", vec![Value::Str("Grüße".into())]);
        let response = service
            .handle(post("/RPC2", "text/xml", encoded_call(Grammar::XmlRpc, call)))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/xml; charset=iso-8859-1"
        );
        let decoded = Grammar::XmlRpc
            .decode_response(&body_of(response).await, None)
            .unwrap();
        assert_eq!(decoded.value(), Some(&Value::Str("Grüße".into())));
    }

    #[tokio::test]
    async fn test_fault_is_500() {
        let service = default_service();
        let call = Call::new("Test.fail", vec![])
            .with_encoding("utf-8")
            .with_id(Value::Int(5));
        let response = service
            .handle(post(
                "/json",
                "application/json; charset=utf-8",
                encoded_call(Grammar::JsonRpc, call),
            ))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let decoded = Grammar::JsonRpc
            .decode_response(&body_of(response).await, Some("utf-8"))
            .unwrap();
        assert_eq!(decoded.get_fault().unwrap().message, "nope");
        assert_eq!(decoded.id, Some(Value::Int(5)));
        assert_eq!(service.stats.faults_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unknown_handler_over_wddx() {
        let service = default_service();
        let call = Call::new("Foo.bar", vec![]);
        let response = service
            .handle(post("/wddx", "text/xml", encoded_call(Grammar::Wddx, call)))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let decoded = Grammar::Wddx
            .decode_response(&body_of(response).await, None)
            .unwrap();
        assert_eq!(decoded.get_fault().unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_charset_from_content_type() {
        let service = default_service();
        let body = "{\"method\":\"Test.echo\",\"params\":[\"\u{e4}\"],\"id\":1}";
        let latin1: Vec<u8> = body.chars().map(|c| c as u32 as u8).collect();
        let response = service
            .handle(post("/json", "application/json; charset=ISO-8859-1", latin1))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "application/json; charset=iso-8859-1"
        );
        let decoded = Grammar::JsonRpc
            .decode_response(&body_of(response).await, Some("iso-8859-1"))
            .unwrap();
        assert_eq!(decoded.value(), Some(&Value::Str("ä".into())));
    }

    #[tokio::test]
    async fn test_parse_error_fault() {
        let service = default_service();
        let response = service
            .handle(post("/RPC2", "text/xml", "<methodCall>"))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let decoded = Grammar::XmlRpc
            .decode_response(&body_of(response).await, None)
            .unwrap();
        assert_eq!(decoded.get_fault().unwrap().code, -32700);
    }

    #[tokio::test]
    async fn test_routing_errors() {
        let service = default_service();
        let response = service.handle(post("/nope", "text/xml", "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let request = Request::builder()
            .method(Method::GET)
            .uri("/RPC2")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = service.handle(request).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "POST");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let mut config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        config.rpc.max_body_bytes = 16;
        let service = service(config);
        let call = Call::new("Test.echo", vec![Value::Str("x".repeat(64))]);
        let response = service
            .handle(post("/RPC2", "text/xml", encoded_call(Grammar::XmlRpc, call)))
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_response_encoding_override() {
        let mut config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        config.rpc.encoding = Some("UTF8".to_string());
        let service = service(config);
        let call = Call::new("system.ping", vec![]);
        let response = service
            .handle(post("/RPC2", "text/xml", encoded_call(Grammar::XmlRpc, call)))
            .await;
        assert_eq!(response.headers()[CONTENT_TYPE], "text/xml; charset=utf-8");
        let body = body_of(response).await;
        assert!(body.starts_with(b"<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap()).with_metrics(metrics);
        let service = service(config);

        let call = Call::new("Test.fail", vec![]);
        service
            .handle(post("/RPC2", "text/xml", encoded_call(Grammar::XmlRpc, call)))
            .await;

        let request = Request::builder()
            .uri("/metrics")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = service.handle(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let text = String::from_utf8(body_of(response).await.to_vec()).unwrap();
        assert!(text.contains("wirerpc_requests_total{grammar=\"xml-rpc\"} 1"));
        assert!(text.contains("wirerpc_faults_total{code=\"-32500\"} 1"));
    }

    #[tokio::test]
    async fn test_server_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(Server::new(ServerConfig::new(addr), router()));
        let task = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(listener).await })
        };

        let body = r#"{"method":"system.ping","params":[],"id":"a"}"#;
        let request = format!(
            "POST /json HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            addr,
            body.len(),
            body
        );
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8(raw).unwrap();

        assert!(raw.starts_with("HTTP/1.1 200 OK"), "{}", raw);
        assert!(raw.ends_with(r#"{"result":true,"error":null,"id":"a"}"#), "{}", raw);

        server.shutdown();
        task.await.unwrap().unwrap();
        assert!(!server.is_running());
        assert_eq!(server.stats().requests_total.load(Ordering::Relaxed), 1);
    }
}
