//! Transport-neutral request and response values.
//!
//! The orchestrator converts the host server's request into a
//! [`GatewayRequest`] once, then every downstream component (proxy, canary
//! engine, version router, mirror) works on this owned value. Header names
//! are stored canonically lowercased; conventional casing is re-applied by
//! the HTTP client at the wire.

use actix_web::http::Method;
use actix_web::web::Bytes;
use actix_web::{HttpRequest, HttpResponse};

/// An inbound request as seen by the gateway pipeline.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    /// HTTP method
    pub method: Method,
    /// Normalized request path (leading slash, no trailing slash)
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: String,
    /// Headers with lowercased names; a name may repeat
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Bytes,
    /// Peer address when known, used by ip-hash balancing
    pub client_ip: Option<String>,
}

impl GatewayRequest {
    /// Builds a gateway request from the host server's request parts.
    pub fn from_actix(req: &HttpRequest, body: Bytes) -> Self {
        let headers = req
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();

        Self {
            method: req.method().clone(),
            path: crate::utils::pattern::normalize_path(req.path()),
            query: req.query_string().to_string(),
            headers,
            body,
            client_ip: req
                .connection_info()
                .realip_remote_addr()
                .map(|s| s.to_string()),
        }
    }

    /// First value of the named header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Replaces every value of the named header with a single value.
    pub fn set_header(&mut self, name: &str, value: &str) {
        let name = name.to_lowercase();
        self.headers.retain(|(key, _)| *key != name);
        self.headers.push((name, value.to_string()));
    }

    /// Appends a header value without touching existing ones.
    pub fn append_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_lowercase(), value.to_string()));
    }

    /// Removes every value of the named header.
    pub fn remove_header(&mut self, name: &str) {
        let name = name.to_lowercase();
        self.headers.retain(|(key, _)| *key != name);
    }

    /// Value of a query parameter, if present.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.split('&').find_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some(key), Some(value)) if key == name => Some(value),
                _ => None,
            }
        })
    }
}

/// An upstream response travelling back through the gateway pipeline.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    /// HTTP status code
    pub status: u16,
    /// Headers with lowercased names
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

impl GatewayResponse {
    /// First value of the named header.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Replaces every value of the named header with a single value.
    pub fn set_header(&mut self, name: &str, value: &str) {
        let name = name.to_lowercase();
        self.headers.retain(|(key, _)| *key != name);
        self.headers.push((name, value.to_string()));
    }

    /// Removes every value of the named header.
    pub fn remove_header(&mut self, name: &str) {
        let name = name.to_lowercase();
        self.headers.retain(|(key, _)| *key != name);
    }

    /// Whether the upstream reported a server-side failure (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// Converts into the host server's response type.
    ///
    /// Framing headers are dropped: the body is re-serialized by the host
    /// server, which computes its own `Content-Length`.
    pub fn into_http_response(self) -> HttpResponse {
        let status = actix_web::http::StatusCode::from_u16(self.status)
            .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY);
        let mut builder = HttpResponse::build(status);

        for (name, value) in &self.headers {
            if matches!(
                name.as_str(),
                "content-length" | "transfer-encoding" | "connection"
            ) {
                continue;
            }
            builder.append_header((name.as_str(), value.as_str()));
        }

        builder.body(self.body)
    }
}
