// LCP Core - Licensed Content Protection engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! HTTP transport
//!
//! The engine talks to three kinds of remote endpoints: the License Status
//! server (status, license refresh, register, renew, return), the
//! revocation authority (CRL) and the publication host. All of them go
//! through the [`HttpClient`] trait so hosts can route requests through
//! their own network stack and tests can substitute a fake.
//!
//! # Error policy
//! Transport failures surface as `LcpError::Reqwest`. Any HTTP status,
//! including 4xx/5xx, is a successful [`HttpResponse`]: each caller decides
//! which status codes it accepts and which error it reports otherwise.
//!
//! # Retries
//! None. Timeouts are the only policy applied here, retries belong to the
//! caller.

use crate::error::{LcpError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// An outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    /// Value of the `Accept` header
    pub accept: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            accept: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST with an empty body
    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_accept<S: Into<String>>(mut self, media_type: S) -> Self {
        self.accept = Some(media_type.into());
        self
    }
}

/// A response received from the server, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: None,
            body,
        }
    }

    /// Check for HTTP 200, the only status LCP servers answer on success
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Body as text for error messages, truncated
    pub fn body_excerpt(&self) -> String {
        const MAX_EXCERPT: usize = 200;
        let text = String::from_utf8_lossy(&self.body);
        match text.char_indices().nth(MAX_EXCERPT) {
            Some((end, _)) => format!("{}...", &text[..end]),
            None => text.into_owned(),
        }
    }

    /// One-line description used in error messages
    pub fn describe(&self) -> String {
        let excerpt = self.body_excerpt();
        if excerpt.trim().is_empty() {
            format!("HTTP {}", self.status)
        } else {
            format!("HTTP {}: {}", self.status, excerpt.trim())
        }
    }
}

/// Result of a streamed download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    /// Number of bytes written
    pub length: u64,
    /// SHA-256 digest of the written bytes
    pub sha256: Vec<u8>,
    pub content_type: Option<String>,
}

/// Transport used for every remote call
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send a request and collect the whole response body
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Stream a GET response body to `destination`
    ///
    /// # Errors
    /// - `PublicationDownloadFailed` for any status other than 200
    /// - `Reqwest` / `Io` for transport and file errors
    async fn download(&self, url: &Url, destination: &Path) -> Result<DownloadedFile>;
}

/// Configuration for ReqwestHttpClient
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: format!("lcp-core/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }
}

/// Builder for ClientConfig
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// [`HttpClient`] backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client with custom configuration
    ///
    /// # Errors
    /// Returns error if the user agent is not a valid header value or the
    /// TLS backend can't be initialized
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| LcpError::Configuration(format!("Invalid user agent: {}", e)))?,
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self { client })
    }
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        tracing::debug!(method = %request.method, url = %request.url, "sending request");

        let mut builder = self.client.request(request.method, request.url);
        if let Some(accept) = &request.accept {
            builder = builder.header(ACCEPT, accept.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = content_type(response.headers());
        let body = response.bytes().await?.to_vec();

        tracing::debug!(status, bytes = body.len(), "received response");

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }

    async fn download(&self, url: &Url, destination: &Path) -> Result<DownloadedFile> {
        tracing::debug!(%url, destination = %destination.display(), "downloading");

        let response = self.client.get(url.clone()).send().await?;
        if response.status().as_u16() != 200 {
            return Err(LcpError::PublicationDownloadFailed(format!(
                "Download failed with status: {}",
                response.status()
            )));
        }

        let content_type = content_type(response.headers());
        let mut file = tokio::fs::File::create(destination).await?;
        let mut hasher = Sha256::new();
        let mut length: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(destination).await;
                    return Err(e.into());
                }
            };
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            length += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(DownloadedFile {
            length,
            sha256: hasher.finalize().to_vec(),
            content_type,
        })
    }
}

// ===== TESTS =====
