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


//! Validated license façade
//!
//! [`License`] is what a reading application holds while a protected
//! publication is open. It deciphers resources, reports the copy and print
//! budgets, and renews or returns the loan through the Status Document links.
//!
//! The validated documents are swapped wholesale after a renew or return;
//! readers get a cheap [`Arc`] snapshot through [`License::documents`].

use crate::api::client::{HttpRequest, HttpResponse};
use crate::error::{LcpError, Result};
use crate::license::container::LicenseContainer;
use crate::license::document::LicenseDocument;
use crate::license::link::{rel, Link, Links};
use crate::license::status::StatusDocument;
use crate::license::validation::{LicenseValidation, ValidatedLicense, ValidationServices};
use crate::storage::{LicenseRepository, UserRights};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use url::Url;

/// Host callbacks used while renewing a loan
#[async_trait]
pub trait RenewDelegate: Send + Sync {
    /// End date to request, `None` lets the provider decide
    ///
    /// # Arguments
    /// * `max_end` - Latest end date the provider accepts, when known
    async fn preferred_end_date(&self, max_end: Option<DateTime<Utc>>) -> Option<DateTime<Utc>>;

    /// Show the provider's renewal page and return once the user is done
    async fn present_web_page(&self, url: &Url) -> Result<()>;
}

/// A license ready to decipher its publication
pub struct License {
    documents: RwLock<Arc<ValidatedLicense>>,
    services: ValidationServices,
    licenses: Arc<dyn LicenseRepository>,
    container: Option<Arc<dyn LicenseContainer>>,
}

impl License {
    /// Wrap a validated license
    ///
    /// # Arguments
    /// * `container` - Where the License Document came from, updated when a
    ///   renewal brings a new license
    pub fn new(
        validated: ValidatedLicense,
        services: ValidationServices,
        licenses: Arc<dyn LicenseRepository>,
        container: Option<Arc<dyn LicenseContainer>>,
    ) -> Self {
        Self {
            documents: RwLock::new(Arc::new(validated)),
            services,
            licenses,
            container,
        }
    }

    /// Snapshot of the current license, status and decryption context
    pub fn documents(&self) -> Arc<ValidatedLicense> {
        let documents = self.documents.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&documents)
    }

    pub fn license(&self) -> LicenseDocument {
        self.documents().license.clone()
    }

    pub fn status(&self) -> Option<StatusDocument> {
        self.documents().status.clone()
    }

    /// Check whether `now` falls inside the rights period of the license
    pub fn is_within_rights_period(&self, now: DateTime<Utc>) -> bool {
        self.documents().license.is_within_rights_period(now)
    }

    // ===== Deciphering =====

    /// Decipher publication resource bytes
    ///
    /// # Errors
    /// Returns `Decryption` if the crypto library rejects the data
    pub fn decipher(&self, data: &[u8]) -> Result<Vec<u8>> {
        let documents = self.documents();
        self.services
            .crypto
            .decrypt(&documents.context, data)
            .map_err(LcpError::Decryption)
    }

    // ===== Rights =====

    /// Characters left to copy, `None` if unlimited
    pub async fn characters_to_copy_left(&self) -> Result<Option<u32>> {
        Ok(self.user_rights().await?.copies_left)
    }

    /// Pages left to print, `None` if unlimited
    pub async fn pages_to_print_left(&self) -> Result<Option<u32>> {
        Ok(self.user_rights().await?.prints_left)
    }

    /// Check whether `characters` more characters may be copied
    pub async fn can_copy(&self, characters: u32) -> Result<bool> {
        Ok(self
            .characters_to_copy_left()
            .await?
            .map_or(true, |left| left >= characters))
    }

    /// Check whether `pages` more pages may be printed
    pub async fn can_print(&self, pages: u32) -> Result<bool> {
        Ok(self
            .pages_to_print_left()
            .await?
            .map_or(true, |left| left >= pages))
    }

    async fn user_rights(&self) -> Result<UserRights> {
        let documents = self.documents();
        let license = &documents.license;
        match self.licenses.user_rights(&license.id).await? {
            Some(rights) => Ok(rights),
            // Not recorded yet, the license grants its full rights
            None => Ok(UserRights {
                copies_left: license.rights.copy,
                prints_left: license.rights.print,
            }),
        }
    }

    // ===== Renew =====

    pub fn can_renew(&self) -> bool {
        self.status_link(rel::RENEW).is_some()
    }

    /// Latest end date obtainable by renewing
    pub fn max_renew_date(&self) -> Option<DateTime<Utc>> {
        self.documents()
            .status
            .as_ref()
            .and_then(StatusDocument::potential_end)
    }

    /// Extend the loan
    ///
    /// An HTML `renew` link is handed to the delegate to show; otherwise the
    /// renewal is requested directly, with the end date picked by the
    /// delegate. On success the license is validated again to pick up the
    /// new rights. The Status Document sent back by the provider is kept
    /// when the status server can't be reached afterwards.
    ///
    /// # Errors
    /// - `MissingRequiredLink` if the Status Document has no `renew` link
    /// - `InvalidRenewalPeriod` if the provider refuses the end date
    /// - `RenewFailed` for any other failure
    pub async fn renew(&self, delegate: &dyn RenewDelegate) -> Result<()> {
        let link = self
            .status_link(rel::RENEW)
            .ok_or_else(|| LcpError::missing_link(rel::RENEW))?;

        let renewed = if link.is_html() {
            let url = link.url()?;
            tracing::info!(%url, "presenting renewal page");
            delegate.present_web_page(&url).await?;
            None
        } else {
            let max_end = self.max_renew_date();
            let mut parameters = self.services.devices.device_parameters().await?;
            if let Some(end) = delegate.preferred_end_date(max_end).await {
                parameters.insert("end", end.to_rfc3339_opts(SecondsFormat::Secs, true));
            }

            let response = self
                .post(&link, &parameters)
                .await
                .map_err(|e| LcpError::RenewFailed(e.to_string()))?;

            match response.status {
                200 => {}
                403 => return Err(LcpError::InvalidRenewalPeriod { max_end }),
                _ => return Err(LcpError::RenewFailed(response.describe())),
            }

            match StatusDocument::parse(&response.body) {
                Ok(status) => Some(status),
                Err(e) => {
                    tracing::debug!(error = %e, "renew response is not a status document");
                    None
                }
            }
        };

        self.revalidate(renewed).await
    }

    /// Validate the held license again, fetching the status and any newer license
    ///
    /// # Arguments
    /// * `known_status` - Latest Status Document received, used when the
    ///   status server can't be reached. The held one is used otherwise.
    async fn revalidate(&self, known_status: Option<StatusDocument>) -> Result<()> {
        let current = self.documents();
        let validation = LicenseValidation::new(self.services.clone(), None, false);
        let mut validated = validation
            .validate(current.license.json().as_bytes().to_vec())
            .await?;

        if validated.status.is_none() {
            validated.status = known_status.or_else(|| current.status.clone());
        }

        let changed = validated.license.json() != current.license.json();
        if changed {
            tracing::info!(license_id = %validated.license.id, "license updated");
            if let Some(container) = &self.container {
                container.write(&validated.license).await?;
            }
        }

        self.replace(validated);
        Ok(())
    }

    // ===== Return =====

    pub fn can_return(&self) -> bool {
        self.status_link(rel::RETURN).is_some()
    }

    /// Return the publication before the end of the loan
    ///
    /// # Errors
    /// - `MissingRequiredLink` if the Status Document has no `return` link
    /// - `AlreadyReturned` if the loan was already returned or expired
    /// - `ReturnFailed` for any other failure
    pub async fn return_publication(&self) -> Result<()> {
        let link = self
            .status_link(rel::RETURN)
            .ok_or_else(|| LcpError::missing_link(rel::RETURN))?;

        let parameters = self.services.devices.device_parameters().await?;
        let response = self
            .post(&link, &parameters)
            .await
            .map_err(|e| LcpError::ReturnFailed(e.to_string()))?;

        match response.status {
            200 => {}
            403 => return Err(LcpError::AlreadyReturned),
            _ => return Err(LcpError::ReturnFailed(response.describe())),
        }

        match StatusDocument::parse(&response.body) {
            Ok(status) => {
                tracing::info!(license_id = %status.id, status = status.status.as_str(), "publication returned");
                let current = self.documents();
                self.replace(ValidatedLicense {
                    license: current.license.clone(),
                    status: Some(status),
                    context: current.context.clone(),
                });
            }
            Err(e) => tracing::warn!(error = %e, "return response is not a status document"),
        }
        Ok(())
    }

    // ===== Helpers =====

    fn status_link(&self, rel: &str) -> Option<Link> {
        self.documents()
            .status
            .as_ref()
            .and_then(|status| status.link(rel))
            .cloned()
    }

    async fn post(
        &self,
        link: &Link,
        parameters: &HashMap<&str, String>,
    ) -> Result<HttpResponse> {
        let url = link.url_with(parameters)?;
        self.services.http.send(HttpRequest::post(url)).await
    }

    fn replace(&self, validated: ValidatedLicense) {
        let mut documents = self.documents.write().unwrap_or_else(|e| e.into_inner());
        *documents = Arc::new(validated);
    }
}

impl std::fmt::Debug for License {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let documents = self.documents();
        f.debug_struct("License")
            .field("id", &documents.license.id)
            .field("status", &documents.status.as_ref().map(|s| s.status))
            .finish()
    }
}
