//! Outgoing HTTP transport backed by a blocking ureq agent.

use std::io::Read;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use ureq::Agent;
use url::Url;

use super::headers;
use super::{HttpRequest, HttpResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport failures surfaced to callers.
#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("failed to read HTTP body: {0}")]
    HttpIo(#[from] std::io::Error),

    #[error("cannot build HTTP request: {0}")]
    BadRequest(String),
}

/// A blocking request/response client for UPnP control traffic.
///
/// Two modes, chosen at construction:
///
/// - keep-alive: connections are pooled per `(host, port)` by the
///   underlying agent and reused across calls (description + SCPD
///   fetches benefit from this);
/// - one-shot: every request carries `Connection: close`, matching how
///   SOAP invocations and GENA subscriptions are expected to behave.
///
/// Redirects are never followed; UPnP description and control URLs are
/// direct addresses.
pub struct HttpClient {
    agent: Agent,
    keep_alive: bool,
}

impl HttpClient {
    pub fn new(keep_alive: bool) -> Self {
        Self::with_timeouts(keep_alive, DEFAULT_TIMEOUT, DEFAULT_TIMEOUT)
    }

    /// `connect_timeout` bounds connection establishment,
    /// `read_timeout` the rest of the exchange.
    pub fn with_timeouts(keep_alive: bool, connect_timeout: Duration, read_timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .allow_non_standard_methods(true)
            .max_redirects(0)
            .timeout_connect(Some(connect_timeout))
            .timeout_global(Some(connect_timeout + read_timeout))
            .build()
            .into();
        Self { agent, keep_alive }
    }

    /// Performs one request/response round-trip against `url`. The HTTP
    /// method is whatever the request carries (POST, GET, SUBSCRIBE,
    /// UNSUBSCRIBE, ...).
    pub fn post(&self, request: &HttpRequest, url: &Url) -> Result<HttpResponse, HttpClientError> {
        debug!(method = request.method(), url = url.as_str(), "HTTP exchange");

        let mut builder = ureq::http::Request::builder()
            .method(request.method())
            .uri(url.as_str());
        for (name, value) in request.headers().iter() {
            // Host and Content-Length are derived by the agent from the
            // URL and the body; forwarding ours would duplicate them.
            if name.eq_ignore_ascii_case(headers::HOST)
                || name.eq_ignore_ascii_case(headers::CONTENT_LENGTH)
            {
                continue;
            }
            builder = builder.header(name, value);
        }
        if !self.keep_alive {
            builder = builder.header(headers::CONNECTION, headers::CLOSE);
        }
        let outgoing = builder
            .body(request.body())
            .map_err(|e| HttpClientError::BadRequest(e.to_string()))?;

        let response = self.agent.run(outgoing)?;
        let (parts, body) = response.into_parts();

        let reason = parts.status.canonical_reason().unwrap_or("");
        let mut mapped = HttpResponse::new(parts.status.as_u16(), reason);
        for (name, value) in parts.headers.iter() {
            mapped.set_header(name.as_str(), value.to_str().unwrap_or_default());
        }
        let mut buf = Vec::new();
        body.into_reader().read_to_end(&mut buf)?;
        mapped.set_body(buf, false);
        Ok(mapped)
    }

    /// Convenience GET returning the body bytes, used for description
    /// documents.
    pub fn get(&self, url: &Url) -> Result<HttpResponse, HttpClientError> {
        let request = HttpRequest::new("GET", url.path());
        self.post(&request, url)
    }
}
