//! HTTP transport abstraction.
//!
//! The ticket manager and VM managers build [`ApiRequest`]s and hand them to
//! a [`ProxmoxTransport`]. The production back-end is [`HttpTransport`]
//! (reqwest); tests inject a scripted transport instead.

use crate::error::{ProxmoxError, ProxmoxResult};
use crate::types::ProxmoxConfig;

use reqwest::{Client, Method};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    fn as_reqwest(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Delete => Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

/// A single API call, path relative to `/api2/json`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(fields);
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status plus decoded JSON body. Non-2xx responses are returned, not raised;
/// interpreting them is the caller's job.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub status_text: String,
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes API requests. Implementations must be `Send + Sync` so a single
/// instance can serve concurrent operations behind an `Arc`.
#[async_trait::async_trait]
pub trait ProxmoxTransport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> ProxmoxResult<ApiResponse>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  reqwest back-end
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport from config. Certificate checks are relaxed only on
    /// this client when `config.insecure` is set.
    pub fn new(config: &ProxmoxConfig) -> ProxmoxResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProxmoxError::connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait::async_trait]
impl ProxmoxTransport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> ProxmoxResult<ApiResponse> {
        let url = self.url(&request.path);
        log::debug!("[Proxmox] {:?} {}", request.method, request.path);

        let mut builder = self.client.request(request.method.as_reqwest(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Form(ref fields) => builder.form(fields),
            RequestBody::Json(ref body) => builder.json(body),
        };

        let resp = builder.send().await?;
        let status = resp.status();
        // pveproxy reports errors in the reason phrase ("401 authentication failure")
        let status_text = resp
            .extensions()
            .get::<hyper::ext::ReasonPhrase>()
            .map(|phrase| String::from_utf8_lossy(phrase.as_bytes()).trim().to_string())
            .filter(|phrase| !phrase.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string());
        let text = resp
            .text()
            .await
            .map_err(|e| ProxmoxError::parse(format!("Failed to read response body: {e}")))?;

        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(v) => v,
                // Error pages from the proxy in front of pveproxy are not JSON.
                Err(_) if !status.is_success() => serde_json::Value::Null,
                Err(e) => {
                    return Err(ProxmoxError::parse(format!(
                        "JSON parse error: {e}; body: {}",
                        text.chars().take(500).collect::<String>()
                    )))
                }
            }
        };

        Ok(ApiResponse {
            status: status.as_u16(),
            status_text,
            body,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Scripted transport (tests)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Route {
        method: HttpMethod,
        path: String,
        responses: VecDeque<ProxmoxResult<ApiResponse>>,
    }

    /// Replays canned responses per (method, path) and records every request.
    /// The last response of a route is repeated once the queue runs dry.
    pub(crate) struct MockTransport {
        routes: Mutex<Vec<Route>>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl MockTransport {
        pub(crate) fn new() -> Self {
            Self {
                routes: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn on(self, method: HttpMethod, path: &str, response: ProxmoxResult<ApiResponse>) -> Self {
            {
                let mut routes = self.routes.lock().unwrap();
                match routes.iter_mut().find(|r| r.method == method && r.path == path) {
                    Some(route) => route.responses.push_back(response),
                    None => routes.push(Route {
                        method,
                        path: path.to_string(),
                        responses: VecDeque::from([response]),
                    }),
                }
            }
            self
        }

        /// Accept the usual ticket exchange.
        pub(crate) fn with_ticket(self) -> Self {
            self.on(HttpMethod::Post, "/access/ticket", Ok(ok(ticket_body())))
        }

        pub(crate) fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
            self.requests().into_iter().filter(|r| r.path == path).collect()
        }

        pub(crate) fn last_request_to(&self, path: &str) -> ApiRequest {
            self.requests_to(path)
                .pop()
                .unwrap_or_else(|| panic!("no request sent to {path}"))
        }
    }

    #[async_trait::async_trait]
    impl ProxmoxTransport for MockTransport {
        async fn execute(&self, request: ApiRequest) -> ProxmoxResult<ApiResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let mut routes = self.routes.lock().unwrap();
            let route = routes
                .iter_mut()
                .find(|r| r.method == request.method && r.path == request.path)
                .ok_or_else(|| {
                    ProxmoxError::connection(format!(
                        "no route for {:?} {}",
                        request.method, request.path
                    ))
                })?;
            if route.responses.len() > 1 {
                route.responses.pop_front().unwrap()
            } else {
                route.responses.front().cloned().unwrap()
            }
        }
    }

    pub(crate) fn ok(data: serde_json::Value) -> ApiResponse {
        ApiResponse {
            status: 200,
            status_text: "OK".into(),
            body: serde_json::json!({ "data": data }),
        }
    }

    pub(crate) fn status(code: u16, text: &str, body: serde_json::Value) -> ApiResponse {
        ApiResponse {
            status: code,
            status_text: text.into(),
            body,
        }
    }

    /// Answer a single HTTP request on a loopback port with `status_line`
    /// and `body`, then close. Returns the origin to point a config at.
    pub(crate) async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let content_length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(response.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    pub(crate) fn ticket_body() -> serde_json::Value {
        serde_json::json!({
            "ticket": "PVE:root@pam:65A1B2C3::sig",
            "CSRFPreventionToken": "65A1B2C3:csrf",
            "username": "root@pam",
            "cap": { "dc": {}, "nodes": {} }
        })
    }
}
