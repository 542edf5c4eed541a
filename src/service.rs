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


//! LCP service
//!
//! Composition root of the engine: builds the repositories, the HTTP
//! transport and every service once, then hands them to each validation.
//! Nothing is global; an application may run several services side by side,
//! each with its own database.
//!
//! # Example
//! ```no_run
//! use lcp_core::{FileLicenseContainer, LcpConfig, LcpCrypto, LcpService};
//! use std::sync::Arc;
//!
//! # async fn example(crypto: Arc<dyn LcpCrypto>) -> lcp_core::error::Result<()> {
//! let config = LcpConfig::builder().database_path("./lcp.db").build();
//! let service = LcpService::new(config, crypto).await?;
//!
//! let container = Arc::new(FileLicenseContainer::new("./book.lcpl"));
//! let license = service.retrieve_license(container, None, false).await?;
//! let plain = license.decipher(b"...")?;
//! # Ok(())
//! # }
//! ```

use crate::api::client::{ClientConfig, HttpClient, ReqwestHttpClient};
use crate::api::crl::CrlService;
use crate::api::registration::DeviceService;
use crate::config::LcpConfig;
use crate::crypto::LcpCrypto;
use crate::error::{LcpError, Result};
use crate::license::container::LicenseContainer;
use crate::license::document::LicenseDocument;
use crate::license::link::{rel, Link, Links};
use crate::license::license::License;
use crate::license::passphrases::{LcpAuthenticating, PassphraseService};
use crate::license::status::StatusDocument;
use crate::license::validation::{LicenseValidation, ValidationServices};
use crate::storage::{
    CrlStore, Database, DeviceRepository, LicenseRepository, PassphraseRepository, SqliteCrlStore,
    SqliteDeviceRepository, SqliteLicenseRepository, SqlitePassphraseRepository,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Collaborators injected into [`LcpService::with_components`]
#[derive(Clone)]
pub struct LcpComponents {
    pub http: Arc<dyn HttpClient>,
    pub crypto: Arc<dyn LcpCrypto>,
    pub passphrases: Arc<dyn PassphraseRepository>,
    pub licenses: Arc<dyn LicenseRepository>,
    pub devices: Arc<dyn DeviceRepository>,
    pub crl_store: Arc<dyn CrlStore>,
}

impl LcpComponents {
    /// Every repository backed by `database`
    pub fn sqlite(database: &Database, http: Arc<dyn HttpClient>, crypto: Arc<dyn LcpCrypto>) -> Self {
        let pool = database.pool().clone();
        Self {
            http,
            crypto,
            passphrases: Arc::new(SqlitePassphraseRepository::new(pool.clone())),
            licenses: Arc::new(SqliteLicenseRepository::new(pool.clone())),
            devices: Arc::new(SqliteDeviceRepository::new(pool.clone())),
            crl_store: Arc::new(SqliteCrlStore::new(pool)),
        }
    }
}

/// A protected publication downloaded from its License Document
#[derive(Debug, Clone)]
pub struct AcquiredPublication {
    /// Where the publication was written
    pub path: PathBuf,
    /// File name to give the publication, from its media type
    pub suggested_filename: String,
    /// License Document to package with the publication
    pub license: LicenseDocument,
}

/// Entry point of the LCP engine
pub struct LcpService {
    config: LcpConfig,
    services: ValidationServices,
    licenses: Arc<dyn LicenseRepository>,
}

impl LcpService {
    /// Create a service from configuration
    ///
    /// Opens the database at `config.database_path`, in memory when unset.
    ///
    /// # Errors
    /// - `Configuration` if the configuration is invalid
    /// - `Sqlx` / `Io` if the database can't be opened
    pub async fn new(config: LcpConfig, crypto: Arc<dyn LcpCrypto>) -> Result<Self> {
        config.validate()?;

        let database = match &config.database_path {
            Some(path) => Database::new(path).await?,
            None => Database::new_in_memory().await?,
        };

        let http = ReqwestHttpClient::with_config(
            ClientConfig::builder()
                .timeout(config.http_timeout())
                .user_agent(config.user_agent.clone())
                .build(),
        )?;

        let components = LcpComponents::sqlite(&database, Arc::new(http), crypto);
        Self::with_components(config, components)
    }

    /// Create a service with injected collaborators
    pub fn with_components(config: LcpConfig, components: LcpComponents) -> Result<Self> {
        config.validate()?;

        let crl = CrlService::new(
            Arc::clone(&components.http),
            components.crl_store,
            &config.crl_url,
            config.crl_max_age(),
        )?;
        let devices = DeviceService::new(
            Arc::clone(&components.http),
            Arc::clone(&components.licenses),
            components.devices,
            config.resolve_device_name(),
        );
        let passphrases = PassphraseService::new(
            components.passphrases,
            Arc::clone(&components.crypto),
            config.max_passphrase_attempts,
        );

        let services = ValidationServices {
            supported_profiles: config.supported_profiles.clone(),
            http: components.http,
            crl: Arc::new(crl),
            devices: Arc::new(devices),
            passphrases: Arc::new(passphrases),
            crypto: components.crypto,
        };

        Ok(Self {
            config,
            services,
            licenses: components.licenses,
        })
    }

    pub fn config(&self) -> &LcpConfig {
        &self.config
    }

    pub fn crl(&self) -> &CrlService {
        &self.services.crl
    }

    pub fn devices(&self) -> &DeviceService {
        &self.services.devices
    }

    /// Start a validation sharing this service's collaborators
    pub fn validation(
        &self,
        authentication: Option<Arc<dyn LcpAuthenticating>>,
        allow_user_interaction: bool,
    ) -> LicenseValidation {
        LicenseValidation::new(self.services.clone(), authentication, allow_user_interaction)
    }

    /// Open the license stored in `container`
    ///
    /// Validates the license, records it locally and, when validation
    /// brought a newer License Document, writes it back to the container.
    ///
    /// # Arguments
    /// * `authentication` - Asked for the passphrase when none is stored
    /// * `allow_user_interaction` - When false, `authentication` is never asked
    ///
    /// # Errors
    /// - `Container` if the container can't be read or written
    /// - any validation error
    pub async fn retrieve_license(
        &self,
        container: Arc<dyn LicenseContainer>,
        authentication: Option<Arc<dyn LcpAuthenticating>>,
        allow_user_interaction: bool,
    ) -> Result<License> {
        let data = container.read().await?;
        let validated = self
            .validation(authentication, allow_user_interaction)
            .validate(data.clone())
            .await?;

        self.licenses.add_license(&validated.license).await?;

        if validated.license.json().as_bytes() != data.as_slice() {
            tracing::info!(license_id = %validated.license.id, "storing updated license in container");
            container.write(&validated.license).await?;
        }

        Ok(License::new(
            validated,
            self.services.clone(),
            Arc::clone(&self.licenses),
            Some(container),
        ))
    }

    /// Fetch the Status Document of a license, without validating it
    pub async fn fetch_status(&self, license: &LicenseDocument) -> Result<StatusDocument> {
        self.services.fetch_status(license).await
    }

    /// Download the publication protected by a License Document
    ///
    /// The advertised `length` and `hash` of the `publication` link are
    /// checked when present. The file is removed when a check fails.
    ///
    /// # Errors
    /// - `InvalidLicenseDocument` / `MissingRequiredLink` if the license doesn't parse
    /// - `PublicationDownloadFailed` if the download fails or has the wrong length
    /// - `PublicationHashMismatch` if the content doesn't match the hash
    pub async fn acquire_publication(
        &self,
        license_bytes: &[u8],
        destination: &Path,
    ) -> Result<AcquiredPublication> {
        let license = LicenseDocument::parse(license_bytes)?;
        let link = license.required_link(rel::PUBLICATION)?.clone();
        let url = link.url()?;

        tracing::info!(license_id = %license.id, %url, "downloading publication");
        let downloaded = match self.services.http.download(&url, destination).await {
            Ok(downloaded) => downloaded,
            Err(LcpError::PublicationDownloadFailed(message)) => {
                return Err(LcpError::PublicationDownloadFailed(message))
            }
            Err(e) => return Err(LcpError::PublicationDownloadFailed(e.to_string())),
        };

        if let Err(e) = verify_download(&link, downloaded.length, &downloaded.sha256) {
            let _ = tokio::fs::remove_file(destination).await;
            return Err(e);
        }

        let media_type = link.media_type.clone().or(downloaded.content_type);
        let suggested_filename = format!("{}.{}", license.id, extension_for(media_type.as_deref()));

        Ok(AcquiredPublication {
            path: destination.to_path_buf(),
            suggested_filename,
            license,
        })
    }
}

/// Check a download against the `length` and `hash` advertised by its link
///
/// The hash is the SHA-256 digest in base64; hex digests are accepted too.
fn verify_download(link: &Link, length: u64, sha256: &[u8]) -> Result<()> {
    if let Some(expected) = link.length {
        if expected != length {
            return Err(LcpError::PublicationDownloadFailed(format!(
                "Expected {} bytes, received {}",
                expected, length
            )));
        }
    }

    if let Some(expected) = &link.hash {
        let is_hex = expected.len() == 64 && expected.chars().all(|c| c.is_ascii_hexdigit());
        let matches = if is_hex {
            expected.eq_ignore_ascii_case(&hex::encode(sha256))
        } else {
            *expected == BASE64.encode(sha256)
        };
        if !matches {
            return Err(LcpError::PublicationHashMismatch {
                expected: expected.clone(),
                actual: BASE64.encode(sha256),
            });
        }
    }

    Ok(())
}

/// File extension of a protected publication
fn extension_for(media_type: Option<&str>) -> &'static str {
    let media_type = media_type
        .and_then(|t| t.split(';').next())
        .map(str::trim)
        .unwrap_or_default();

    match media_type {
        "application/pdf+lcp" | "application/pdf" => "lcpdf",
        "application/audiobook+lcp" | "application/audiobook+zip" => "lcpa",
        "application/divina+lcp" | "application/divina+zip" => "lcpdi",
        _ => "epub",
    }
}
