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


//! Engine configuration
//!
//! [`LcpConfig`] gathers every tunable of the engine. It can be built in code
//! with [`LcpConfig::builder`] or loaded from a JSON file where every field is
//! optional:
//!
//! ```json
//! {
//!   "supported_profiles": ["http://readium.org/lcp/basic-profile"],
//!   "database_path": "/var/lib/reader/lcp.db",
//!   "http_timeout_secs": 15
//! }
//! ```

use crate::error::{LcpError, Result};
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Encryption profile of the LCP basic (test) profile
pub const BASIC_PROFILE: &str = "http://readium.org/lcp/basic-profile";

/// Encryption profile of LCP 1.0 production licenses
pub const PROFILE_1_0: &str = "http://readium.org/lcp/profile-1.0";

/// Certificate Revocation List of the EDRLab root authority
pub const DEFAULT_CRL_URL: &str = "http://crl.edrlab.telesec.de/rl/EDRLab_CA.crl";

/// A cached CRL is refreshed after this many days
const DEFAULT_CRL_MAX_AGE_DAYS: i64 = 7;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Name reported to the license server when the host name is unavailable
const FALLBACK_DEVICE_NAME: &str = "Unknown device";

/// Configuration for the LCP engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LcpConfig {
    /// Encryption profiles the crypto library can handle
    pub supported_profiles: Vec<String>,

    /// Where to download the Certificate Revocation List from
    pub crl_url: String,

    /// Age in days after which the cached CRL is fetched again
    pub crl_max_age_days: i64,

    /// Timeout of every HTTP request, in seconds
    pub http_timeout_secs: u64,

    pub user_agent: String,

    /// SQLite database holding passphrases and license metadata.
    /// `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,

    /// Device name reported to the license server, defaults to the host name
    pub device_name: Option<String>,

    /// Number of passphrases the user may type before giving up.
    /// `None` asks until the user cancels.
    pub max_passphrase_attempts: Option<u32>,
}

impl Default for LcpConfig {
    fn default() -> Self {
        Self {
            supported_profiles: vec![BASIC_PROFILE.to_string(), PROFILE_1_0.to_string()],
            crl_url: DEFAULT_CRL_URL.to_string(),
            crl_max_age_days: DEFAULT_CRL_MAX_AGE_DAYS,
            http_timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: format!("lcp-core/{}", env!("CARGO_PKG_VERSION")),
            database_path: None,
            device_name: None,
            max_passphrase_attempts: None,
        }
    }
}

impl LcpConfig {
    pub fn builder() -> LcpConfigBuilder {
        LcpConfigBuilder::new()
    }

    /// Load configuration from a JSON file
    ///
    /// # Errors
    /// - `Io` if the file can't be read
    /// - `Configuration` if the content is not a valid configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LcpError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.supported_profiles.is_empty() {
            return Err(LcpError::Configuration(
                "at least one supported profile is required".to_string(),
            ));
        }
        if self.crl_max_age_days <= 0 {
            return Err(LcpError::Configuration(format!(
                "crl_max_age_days must be positive, got {}",
                self.crl_max_age_days
            )));
        }
        url::Url::parse(&self.crl_url)
            .map_err(|e| LcpError::Configuration(format!("invalid crl_url: {}", e)))?;
        Ok(())
    }

    pub fn is_profile_supported(&self, profile: &str) -> bool {
        self.supported_profiles.iter().any(|p| p == profile)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn crl_max_age(&self) -> ChronoDuration {
        ChronoDuration::days(self.crl_max_age_days)
    }

    /// Device name reported to the license server
    pub fn resolve_device_name(&self) -> String {
        if let Some(name) = &self.device_name {
            return name.clone();
        }
        hostname::get()
            .ok()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| FALLBACK_DEVICE_NAME.to_string())
    }
}

/// Builder for LcpConfig
#[derive(Debug)]
pub struct LcpConfigBuilder {
    config: LcpConfig,
}

impl LcpConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LcpConfig::default(),
        }
    }

    pub fn supported_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.supported_profiles = profiles.into_iter().map(Into::into).collect();
        self
    }

    pub fn crl_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.crl_url = url.into();
        self
    }

    pub fn crl_max_age_days(mut self, days: i64) -> Self {
        self.config.crl_max_age_days = days;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout_secs = timeout.as_secs();
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.database_path = Some(path.into());
        self
    }

    pub fn device_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.device_name = Some(name.into());
        self
    }

    pub fn max_passphrase_attempts(mut self, attempts: u32) -> Self {
        self.config.max_passphrase_attempts = Some(attempts);
        self
    }

    pub fn build(self) -> LcpConfig {
        self.config
    }
}

impl Default for LcpConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
