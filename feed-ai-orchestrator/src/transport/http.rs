//! HTTP transport for the AI backend group.
//!
//! All endpoints share one base URL, resolved from configuration at startup.

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use tracing::{debug, warn};

use super::traits::*;

/// reqwest-backed transport.
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport rooted at `base_url`.
    pub fn new(base_url: Url) -> Result<Self, reqwest::Error> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self { client, base_url })
    }

    /// Reuse an existing client (shared connection pool).
    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the endpoint URL, keeping any path prefix of the base URL.
    fn endpoint_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn send(&self, request: &TransportRequest) -> Result<RawPayload, TransportError> {
        let url = self.endpoint_url(&request.path);

        let mut http_request = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };

        if !request.query.is_empty() {
            http_request = http_request.query(&request.query);
        }

        if let Some(body) = &request.body {
            http_request = http_request.json(body);
        }

        let response = http_request
            .timeout(request.timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                code: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(classify)?;

        Ok(RawPayload::new(status.as_u16(), body))
    }
}

/// Network failures and timeouts both mean "unreachable".
fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Unreachable("request timed out".to_string())
    } else {
        TransportError::Unreachable(error.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: TransportRequest) -> Result<RawPayload, TransportError> {
        debug!(
            method = %request.method,
            path = %request.path,
            timeout_ms = request.timeout.as_millis() as u64,
            "Calling AI backend"
        );

        // Bound the whole call, body read included
        let result = match tokio::time::timeout(request.timeout, self.send(&request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(request.timeout)),
        };

        if let Err(error) = &result {
            warn!(method = %request.method, path = %request.path, %error, "AI backend call failed");
        }

        result
    }
}
