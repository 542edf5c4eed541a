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


//! Certificate Revocation List cache
//!
//! The crypto library needs the revocation list of the LCP root authority to
//! reject licenses signed with a revoked provider certificate. The list is
//! downloaded as DER, wrapped as PEM and cached; a cached copy younger than
//! the configured maximum age (7 days by default) is returned as-is.
//!
//! # Concurrency
//! Refreshes are serialized so several validations starting together issue a
//! single download.

use crate::api::client::{HttpClient, HttpRequest};
use crate::error::{LcpError, Result};
use crate::storage::crl_cache::{CachedCrl, CrlStore};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

const PEM_HEADER: &str = "-----BEGIN X509 CRL-----";
const PEM_FOOTER: &str = "-----END X509 CRL-----";

/// Fetches and caches the Certificate Revocation List
pub struct CrlService {
    http: Arc<dyn HttpClient>,
    store: Arc<dyn CrlStore>,
    url: Url,
    max_age: Duration,
    refresh_lock: Mutex<()>,
}

impl CrlService {
    /// Create a CRL service
    ///
    /// # Errors
    /// Returns `Configuration` if `url` is not an absolute URL
    pub fn new(
        http: Arc<dyn HttpClient>,
        store: Arc<dyn CrlStore>,
        url: &str,
        max_age: Duration,
    ) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| LcpError::Configuration(format!("Invalid CRL URL '{}': {}", url, e)))?;

        Ok(Self {
            http,
            store,
            url,
            max_age,
            refresh_lock: Mutex::new(()),
        })
    }

    /// Get the PEM-encoded CRL, downloading it when the cache is stale
    ///
    /// # Errors
    /// Returns `CrlFetchFailure` if the list must be downloaded and the
    /// download fails. A stale cached copy is not used as a fallback.
    pub async fn retrieve(&self) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;

        match self.store.load().await {
            Ok(Some(cached)) if cached.is_fresh(Utc::now(), self.max_age) => {
                tracing::debug!(fetched_at = %cached.fetched_at, "using cached CRL");
                return Ok(cached.pem);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to read cached CRL"),
        }

        self.fetch_and_store().await
    }

    /// Download the CRL regardless of the cache
    pub async fn refresh(&self) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_store().await
    }

    async fn fetch_and_store(&self) -> Result<String> {
        tracing::info!(url = %self.url, "downloading certificate revocation list");

        let response = self
            .http
            .send(HttpRequest::get(self.url.clone()))
            .await
            .map_err(|e| LcpError::CrlFetchFailure(e.to_string()))?;

        if !response.is_ok() {
            return Err(LcpError::CrlFetchFailure(response.describe()));
        }

        let pem = wrap_pem(&response.body);
        let cached = CachedCrl::new(pem, Utc::now());

        // The list is usable even if it couldn't be cached
        if let Err(e) = self.store.save(&cached).await {
            tracing::warn!(error = %e, "failed to cache CRL");
        }

        Ok(cached.pem)
    }
}

/// Wrap a DER revocation list in PEM delimiters
pub fn wrap_pem(der: &[u8]) -> String {
    format!("{}{}{}", PEM_HEADER, BASE64.encode(der), PEM_FOOTER)
}
