//! HTTP transport to the Notion web API.
//!
//! All inference traffic goes through a single pooled reqwest client with a
//! fixed, browser-shaped header set. The headers are what a logged-in Notion
//! web session would send; the upstream rejects requests that look otherwise.

use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;

use crate::config::{NotionConfig, ServerConfig};
use crate::error::{sanitize_upstream_error, ProxyError};

const INFERENCE_PATH: &str = "/api/v3/runInferenceTranscript";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn build_client(server: &ServerConfig) -> Result<reqwest::Client, ProxyError> {
    let pool_idle_timeout = if server.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(server.http_pool_idle_timeout_secs))
    };

    reqwest::Client::builder()
        .pool_max_idle_per_host(server.http_pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(server.timeout))
        .build()
        .map_err(|err| ProxyError::Transport(format!("Failed to build HTTP client: {err}")))
}

fn build_session_headers(notion: &NotionConfig) -> Result<HeaderMap, ProxyError> {
    fn value(name: &str, raw: &str) -> Result<HeaderValue, ProxyError> {
        HeaderValue::from_str(raw)
            .map_err(|_| ProxyError::Config(format!("notion.{name} contains invalid header bytes")))
    }

    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(http::header::ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        http::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
    );
    headers.insert(http::header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(
        HeaderName::from_static("notion-client-version"),
        value("client_version", &notion.client_version)?,
    );
    headers.insert(
        HeaderName::from_static("x-notion-active-user-header"),
        value("user_id", &notion.user_id)?,
    );
    headers.insert(
        HeaderName::from_static("x-notion-space-id"),
        value("space_id", &notion.space_id)?,
    );
    // token_v2 is the entire session credential; it is never logged.
    headers.insert(
        http::header::COOKIE,
        value("token_v2", &format!("token_v2={}", notion.token_v2))?,
    );
    Ok(headers)
}

/// Pooled client plus the prebuilt session headers for one Notion workspace.
pub struct NotionTransport {
    client: reqwest::Client,
    headers: HeaderMap,
    base_url: String,
    inference_url: String,
}

impl NotionTransport {
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] when a credential contains bytes that
    /// cannot be carried in an HTTP header, or [`ProxyError::Transport`] when
    /// the client cannot be constructed.
    pub fn new(server: &ServerConfig, notion: &NotionConfig) -> Result<Self, ProxyError> {
        let base_url = notion.base_url.trim_end_matches('/').to_string();
        let inference_url = format!("{base_url}{INFERENCE_PATH}");
        Ok(Self {
            client: build_client(server)?,
            headers: build_session_headers(notion)?,
            base_url,
            inference_url,
        })
    }

    /// Issue one GET to the Notion root so the upstream sets its anti-bot
    /// cookies and the connection pool holds a live TLS session. Failure is
    /// reported but never fatal; the first inference request will simply pay
    /// the handshake cost itself.
    pub async fn warm_up(&self) {
        let request = self
            .client
            .get(&self.base_url)
            .headers(self.headers.clone())
            .timeout(Duration::from_secs(10));
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(status = response.status().as_u16(), "session warm-up complete");
            }
            Ok(response) => {
                tracing::warn!(
                    status = response.status().as_u16(),
                    "session warm-up returned non-success status"
                );
            }
            Err(err) => {
                tracing::warn!(error = %err, "session warm-up failed");
            }
        }
    }

    /// POST a pre-serialized inference payload and hand back the streaming
    /// response after the status has been checked.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Transport`] when the request cannot be sent and
    /// [`ProxyError::Upstream`] for any non-2xx status, with the response
    /// body sanitized into the message.
    pub async fn run_inference(&self, payload: bytes::Bytes) -> Result<reqwest::Response, ProxyError> {
        let response = self
            .client
            .post(&self.inference_url)
            .headers(self.headers.clone())
            .body(payload)
            .send()
            .await
            .map_err(|err| ProxyError::Transport(format!("Upstream request failed: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let message = sanitize_upstream_error(&body);
        tracing::warn!(status = status.as_u16(), message = %message, "upstream rejected inference request");
        Err(upstream_error(status, message))
    }

    #[must_use]
    pub fn inference_url(&self) -> &str {
        &self.inference_url
    }
}

fn upstream_error(status: StatusCode, message: String) -> ProxyError {
    let message = match status {
        StatusCode::UNAUTHORIZED => {
            format!("Notion session rejected (check token_v2): {message}")
        }
        StatusCode::FORBIDDEN => {
            format!("Notion denied access (check space_id and user_id): {message}")
        }
        _ => message,
    };
    ProxyError::Upstream {
        status: status.as_u16(),
        message,
    }
}
