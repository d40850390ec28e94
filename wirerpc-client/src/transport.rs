//! HTTP transport.
//!
//! One POST per call. Interpreting the HTTP status is kept apart from the
//! network round trip in [`interpret_response`].

use crate::error::ClientError;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, WWW_AUTHENTICATE};
use std::time::Duration;
use wirerpc_protocol::charset::content_type_charset;
use wirerpc_protocol::{Grammar, Response};

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("wirerpc/", env!("CARGO_PKG_VERSION"));

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Endpoint URL.
    pub url: String,
    /// Grammar calls are written in.
    pub grammar: Grammar,
    /// Encoding calls are written in. Defaults to the grammar's.
    pub encoding: String,
    pub user_agent: String,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
    pub connect_timeout: Duration,
    /// Request timeout.
    pub request_timeout: Duration,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>, grammar: Grammar) -> Self {
        Self {
            url: url.into(),
            grammar,
            encoding: grammar.default_encoding().to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: Vec::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Turns an HTTP reply into a decoded response.
///
/// 200 and 500 both carry a response document (faults arrive with 500).
/// 401 becomes [`ClientError::AuthenticationRequired`]; every other status
/// is [`ClientError::UnexpectedStatus`].
pub fn interpret_response(
    grammar: Grammar,
    status: u16,
    www_authenticate: Option<&str>,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Response, ClientError> {
    match status {
        200 | 500 => {
            let declared = content_type.and_then(content_type_charset);
            Ok(grammar.decode_response(body, declared)?)
        }
        401 => Err(ClientError::AuthenticationRequired {
            challenge: www_authenticate.map(str::to_string),
        }),
        other => Err(ClientError::UnexpectedStatus(other)),
    }
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ClientError::InvalidHeader(name.clone()))?;
            let value =
                HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(value.clone()))?;
            headers.append(name, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Posts an encoded call and decodes the reply.
    pub async fn send(&self, payload: Bytes, encoding: &str) -> Result<Response, ClientError> {
        let grammar = self.config.grammar;
        tracing::debug!(url = %self.config.url, %grammar, bytes = payload.len(), "posting call");

        let reply = self
            .http
            .post(&self.config.url)
            .header(CONTENT_TYPE, grammar.content_type(encoding))
            .body(payload)
            .send()
            .await?;

        let status = reply.status().as_u16();
        let header = |name: HeaderName| {
            reply
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let challenge = header(WWW_AUTHENTICATE);
        let content_type = header(CONTENT_TYPE);
        let body = reply.bytes().await?;
        tracing::debug!(status, bytes = body.len(), "received reply");

        interpret_response(
            grammar,
            status,
            challenge.as_deref(),
            content_type.as_deref(),
            &body,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirerpc_protocol::{Message, Value};

    fn encoded(grammar: Grammar, response: Response) -> Bytes {
        grammar.encode_message(&Message::Response(response)).unwrap()
    }

    #[test]
    fn test_success_reply() {
        let body = encoded(Grammar::XmlRpc, Response::success(Value::Int(7)));
        let response =
            interpret_response(Grammar::XmlRpc, 200, None, Some("text/xml"), &body).unwrap();
        assert_eq!(response.value(), Some(&Value::Int(7)));
    }

    #[test]
    fn test_fault_reply_with_500() {
        let body = encoded(
            Grammar::Wddx,
            Response::fault(wirerpc_protocol::Fault::new(-32601, "no such method")),
        );
        let response = interpret_response(Grammar::Wddx, 500, None, None, &body).unwrap();
        let fault = response.get_fault().unwrap();
        assert_eq!(fault.code, -32601);
        assert_eq!(fault.message, "no such method");
    }

    #[test]
    fn test_unauthorized_reply() {
        let err = interpret_response(
            Grammar::XmlRpc,
            401,
            Some("Basic realm=\"rpc\""),
            None,
            b"",
        )
        .unwrap_err();
        match err {
            ClientError::AuthenticationRequired { challenge } => {
                assert_eq!(challenge.as_deref(), Some("Basic realm=\"rpc\""));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = interpret_response(Grammar::XmlRpc, 401, None, None, b"").unwrap_err();
        assert!(matches!(
            err,
            ClientError::AuthenticationRequired { challenge: None }
        ));
    }

    #[test]
    fn test_unexpected_status() {
        let err = interpret_response(Grammar::JsonRpc, 404, None, None, b"Not Found").unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedStatus(404)));
    }

    #[test]
    fn test_charset_from_content_type() {
        let body = b"{\"result\":\"\xe4\",\"error\":null,\"id\":1}";
        let response = interpret_response(
            Grammar::JsonRpc,
            200,
            None,
            Some("application/json; charset=iso-8859-1"),
            body,
        )
        .unwrap();
        assert_eq!(response.value(), Some(&Value::Str("ä".into())));
        assert_eq!(response.id, Some(Value::Int(1)));
    }

    #[test]
    fn test_malformed_body() {
        let err = interpret_response(Grammar::XmlRpc, 200, None, None, b"<html>").unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_invalid_header_rejected() {
        let config = TransportConfig::new("http://127.0.0.1:1/RPC2", Grammar::XmlRpc)
            .with_header("bad header", "x");
        assert!(matches!(
            HttpTransport::new(config),
            Err(ClientError::InvalidHeader(name)) if name == "bad header"
        ));
    }
}
