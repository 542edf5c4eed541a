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


//! Device registration
//!
//! A reading device registers itself once per license against the Status
//! Document's `register` link, so the provider can count devices and revoke
//! a license shared too widely. The device is identified by a persistent
//! random id and a human readable name.
//!
//! # Idempotence
//! The registered flag lives in the [`LicenseRepository`]. The check, the
//! POST and the flag update run under a per-license lock, so concurrent
//! validations of the same license issue a single POST.

use crate::api::client::{HttpClient, HttpRequest};
use crate::error::{LcpError, Result};
use crate::license::document::LicenseDocument;
use crate::license::link::{rel, Links};
use crate::license::status::StatusDocument;
use crate::storage::{DeviceRepository, LicenseRepository};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

/// Outcome of [`DeviceService::register_if_needed`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationOutcome {
    /// The device was registered before this call, nothing was sent
    pub already_registered: bool,
    /// Body returned by the server, usually an updated Status Document
    pub status_data: Option<Vec<u8>>,
}

/// Registers this device against license status servers
pub struct DeviceService {
    http: Arc<dyn HttpClient>,
    licenses: Arc<dyn LicenseRepository>,
    devices: Arc<dyn DeviceRepository>,
    device_name: String,
    license_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DeviceService {
    pub fn new(
        http: Arc<dyn HttpClient>,
        licenses: Arc<dyn LicenseRepository>,
        devices: Arc<dyn DeviceRepository>,
        device_name: String,
    ) -> Self {
        Self {
            http,
            licenses,
            devices,
            device_name,
            license_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Persistent identifier of this device
    pub async fn device_id(&self) -> Result<String> {
        self.devices.device_id().await
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// `id` and `name` template parameters identifying this device
    pub async fn device_parameters(&self) -> Result<HashMap<&'static str, String>> {
        let mut parameters = HashMap::new();
        parameters.insert("id", self.device_id().await?);
        parameters.insert("name", self.device_name.clone());
        Ok(parameters)
    }

    /// Register the device for `license` unless it already did
    ///
    /// # Returns
    /// - `already_registered: true` without any request when the flag is set
    /// - the response body after a successful POST
    /// - an empty outcome when the Status Document has no `register` link
    ///
    /// # Errors
    /// Returns `RegistrationFailed` if the server answers anything but 200 or
    /// can't be reached
    pub async fn register_if_needed(
        &self,
        license: &LicenseDocument,
        status: &StatusDocument,
    ) -> Result<RegistrationOutcome> {
        let lock = self.lock_for(&license.id)?;
        let _guard = lock.lock().await;

        if self.licenses.is_device_registered(&license.id).await? {
            tracing::debug!(license_id = %license.id, "device already registered");
            return Ok(RegistrationOutcome {
                already_registered: true,
                status_data: None,
            });
        }

        let Some(link) = status.link(rel::REGISTER) else {
            tracing::debug!(license_id = %license.id, "status document has no register link");
            return Ok(RegistrationOutcome::default());
        };

        let url = link.url_with(&self.device_parameters().await?)?;
        tracing::info!(license_id = %license.id, device = %self.device_name, "registering device");

        let response = self
            .http
            .send(HttpRequest::post(url))
            .await
            .map_err(|e| LcpError::RegistrationFailed(e.to_string()))?;

        if !response.is_ok() {
            return Err(LcpError::RegistrationFailed(response.describe()));
        }

        self.licenses.register_device(&license.id).await?;

        Ok(RegistrationOutcome {
            already_registered: false,
            status_data: Some(response.body),
        })
    }

    fn lock_for(&self, license_id: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .license_locks
            .lock()
            .map_err(|_| LcpError::internal("registration lock table poisoned"))?;

        Ok(locks
            .entry(license_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }
}
