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


//! License validation state machine
//!
//! Turns License Document bytes into a [`ValidatedLicense`]: the parsed
//! license, its optional Status Document and the decryption context built by
//! the crypto library.
//!
//! # Pipeline
//! ```text
//! Start ─▶ ValidatingLicense ─▶ RequestingPassphrase ─▶ ValidatingIntegrity
//!               ▲                                          │         │
//!               │                              (no status) ▼         │ (status known)
//!        FetchingLicense ◀─(stale)─ RegisteringDevice ◀─ CheckingStatus ◀─ FetchingStatus
//!                                          │
//!                                          ▼
//!                                        Valid
//! ```
//!
//! Each state has an entry action producing exactly one event; a single
//! transition function maps `(state, event)` to the next state. Transitions
//! happen one at a time in [`LicenseValidation::validate`], which consumes
//! the machine so one instance validates one license.
//!
//! # Recovery
//! - A Status Document that can't be fetched is ignored; the license is
//!   valid without status.
//! - Device registration failures are logged and never fail validation. A
//!   Status Document sent back by the registration goes through the same
//!   status checks as the fetched one.
//! - Before fetching an updated license, the current triple is saved. If the
//!   update then fails for any reason, the saved triple is returned instead
//!   of the error.

use crate::api::client::{HttpClient, HttpRequest};
use crate::api::crl::CrlService;
use crate::api::registration::DeviceService;
use crate::crypto::{DecryptionContext, LcpCrypto};
use crate::error::{LcpError, Result};
use crate::license::document::LicenseDocument;
use crate::license::link::{rel, Link, Links};
use crate::license::passphrases::{LcpAuthenticating, PassphraseService};
use crate::license::status::{Status, StatusDocument};
use std::collections::VecDeque;
use std::sync::Arc;

/// Media type requested when fetching a Status Document
pub const STATUS_MEDIA_TYPE: &str = "application/vnd.readium.license.status.v1.0+json";

/// Media type requested when fetching a License Document
pub const LICENSE_MEDIA_TYPE: &str = "application/vnd.readium.lcp.license.v1.0+json";

/// A license that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedLicense {
    pub license: LicenseDocument,
    /// `None` when the license has no status link or the status server
    /// couldn't be reached
    pub status: Option<StatusDocument>,
    pub context: DecryptionContext,
}

/// Collaborators shared by every validation
#[derive(Clone)]
pub struct ValidationServices {
    /// Encryption profiles accepted by the crypto library
    pub supported_profiles: Vec<String>,
    pub http: Arc<dyn HttpClient>,
    pub crl: Arc<CrlService>,
    pub devices: Arc<DeviceService>,
    pub passphrases: Arc<PassphraseService>,
    pub crypto: Arc<dyn LcpCrypto>,
}

impl ValidationServices {
    /// GET the Status Document of `license`
    ///
    /// # Errors
    /// - `MissingRequiredLink` if the license has no `status` link
    /// - `StatusFetchFailure` for transport errors and non-200 answers
    /// - `InvalidStatusDocument` if the body doesn't parse
    pub async fn fetch_status(&self, license: &LicenseDocument) -> Result<StatusDocument> {
        let link = license.required_link(rel::STATUS)?;
        let response = self
            .get(link, STATUS_MEDIA_TYPE)
            .await
            .map_err(|e| LcpError::StatusFetchFailure(e.to_string()))?;

        if !response.is_ok() {
            return Err(LcpError::StatusFetchFailure(response.describe()));
        }
        StatusDocument::parse(&response.body)
    }

    /// GET the up-to-date License Document referenced by `status`
    async fn fetch_license(&self, status: &StatusDocument) -> Result<Vec<u8>> {
        let link = status.required_link(rel::LICENSE)?;
        let response = self
            .get(link, LICENSE_MEDIA_TYPE)
            .await
            .map_err(|e| LcpError::LicenseFetchFailure(e.to_string()))?;

        if !response.is_ok() {
            return Err(LcpError::LicenseFetchFailure(response.describe()));
        }
        Ok(response.body)
    }

    async fn get(&self, link: &Link, media_type: &str) -> Result<crate::api::client::HttpResponse> {
        let url = link.url_with(&self.devices.device_parameters().await?)?;
        self.http.send(HttpRequest::get(url).with_accept(media_type)).await
    }
}

// ===== States and events =====

enum State {
    Start,
    ValidatingLicense {
        data: Vec<u8>,
        status: Option<StatusDocument>,
    },
    RequestingPassphrase {
        license: LicenseDocument,
        status: Option<StatusDocument>,
    },
    ValidatingIntegrity {
        license: LicenseDocument,
        status: Option<StatusDocument>,
        passphrase: String,
    },
    FetchingStatus {
        license: LicenseDocument,
        context: DecryptionContext,
    },
    CheckingStatus {
        license: LicenseDocument,
        status: StatusDocument,
        context: DecryptionContext,
    },
    RegisteringDevice {
        license: LicenseDocument,
        status: StatusDocument,
        context: DecryptionContext,
    },
    FetchingLicense {
        status: StatusDocument,
    },
    Valid(ValidatedLicense),
    Failure(LcpError),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Start => "start",
            State::ValidatingLicense { .. } => "validating_license",
            State::RequestingPassphrase { .. } => "requesting_passphrase",
            State::ValidatingIntegrity { .. } => "validating_integrity",
            State::FetchingStatus { .. } => "fetching_status",
            State::CheckingStatus { .. } => "checking_status",
            State::RegisteringDevice { .. } => "registering_device",
            State::FetchingLicense { .. } => "fetching_license",
            State::Valid(_) => "valid",
            State::Failure(_) => "failure",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, State::Valid(_) | State::Failure(_))
    }
}

enum Event {
    ReceivedLicenseBytes(Vec<u8>),
    LicenseValidated(LicenseDocument),
    PassphraseReceived(String),
    IntegrityValidated(DecryptionContext),
    StatusReceived(StatusDocument),
    StatusAccepted,
    /// Carries the Status Document returned by the server, when it sent one
    DeviceRegistered(Option<StatusDocument>),
    OperationFailed(LcpError),
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::ReceivedLicenseBytes(_) => "received_license_bytes",
            Event::LicenseValidated(_) => "license_validated",
            Event::PassphraseReceived(_) => "passphrase_received",
            Event::IntegrityValidated(_) => "integrity_validated",
            Event::StatusReceived(_) => "status_received",
            Event::StatusAccepted => "status_accepted",
            Event::DeviceRegistered(_) => "device_registered",
            Event::OperationFailed(_) => "operation_failed",
        }
    }
}

enum Step {
    Entered(State),
    Ignored(State),
}

// ===== Machine =====

/// Validates one License Document
pub struct LicenseValidation {
    services: ValidationServices,
    authentication: Option<Arc<dyn LcpAuthenticating>>,
    allow_user_interaction: bool,
    /// Last valid triple, saved before fetching an updated license
    fallback: Option<ValidatedLicense>,
}

impl LicenseValidation {
    /// Create a validation
    ///
    /// # Arguments
    /// * `authentication` - Asked for the passphrase when none is stored
    /// * `allow_user_interaction` - When false, `authentication` is never asked
    pub fn new(
        services: ValidationServices,
        authentication: Option<Arc<dyn LcpAuthenticating>>,
        allow_user_interaction: bool,
    ) -> Self {
        Self {
            services,
            authentication,
            allow_user_interaction,
            fallback: None,
        }
    }

    /// Run the whole validation of `data`
    ///
    /// # Errors
    /// Any [`LcpError`] raised by a step that isn't recovered, see the
    /// module documentation.
    pub async fn validate(mut self, data: Vec<u8>) -> Result<ValidatedLicense> {
        let mut state = State::Start;
        let mut events = VecDeque::from([Event::ReceivedLicenseBytes(data)]);

        while let Some(event) = events.pop_front() {
            match self.transition(state, event) {
                Step::Entered(next) => state = next,
                Step::Ignored(unchanged) => {
                    state = unchanged;
                    continue;
                }
            }

            if let Some(event) = self.enter(&state).await {
                events.push_back(event);
            }
        }

        match state {
            State::Valid(validated) => {
                tracing::info!(
                    license_id = %validated.license.id,
                    status = ?validated.status.as_ref().map(|s| s.status),
                    "license validated"
                );
                Ok(validated)
            }
            State::Failure(error) => match self.fallback.take() {
                Some(fallback) => {
                    tracing::warn!(
                        license_id = %fallback.license.id,
                        error = %error,
                        "updated license rejected, keeping the previous one"
                    );
                    Ok(fallback)
                }
                None => {
                    tracing::debug!(error = %error, "license validation failed");
                    Err(error)
                }
            },
            other => Err(LcpError::internal(format!(
                "License validation stalled in state {}",
                other.name()
            ))),
        }
    }

    fn transition(&mut self, state: State, event: Event) -> Step {
        let from = state.name();
        let on = event.name();

        let next = match (state, event) {
            (State::Start, Event::ReceivedLicenseBytes(data)) => {
                State::ValidatingLicense { data, status: None }
            }

            (State::ValidatingLicense { status, .. }, Event::LicenseValidated(license)) => {
                State::RequestingPassphrase { license, status }
            }

            (State::RequestingPassphrase { license, status }, Event::PassphraseReceived(passphrase)) => {
                State::ValidatingIntegrity {
                    license,
                    status,
                    passphrase,
                }
            }

            (State::ValidatingIntegrity { license, status, .. }, Event::IntegrityValidated(context)) => {
                match status {
                    // Carried over from a license refresh, no need to fetch it again
                    Some(status) => State::RegisteringDevice {
                        license,
                        status,
                        context,
                    },
                    None => State::FetchingStatus { license, context },
                }
            }

            (State::FetchingStatus { license, context }, Event::StatusReceived(status)) => {
                State::CheckingStatus {
                    license,
                    status,
                    context,
                }
            }

            (State::FetchingStatus { license, context }, Event::OperationFailed(error)) => {
                tracing::warn!(license_id = %license.id, error = %error, "status document unavailable");
                State::Valid(ValidatedLicense {
                    license,
                    status: None,
                    context,
                })
            }

            (State::CheckingStatus { license, status, context }, Event::StatusAccepted) => {
                State::RegisteringDevice {
                    license,
                    status,
                    context,
                }
            }

            (State::RegisteringDevice { license, status, context }, Event::DeviceRegistered(updated)) => {
                let status = updated.unwrap_or(status);

                // Refresh at most once, the fallback marks a refresh already happened
                let stale = status.has_newer_license_than(license.effective_updated());
                if let Err(error) = check_status(&status) {
                    tracing::warn!(license_id = %license.id, error = %error, "registration answered with an unusable status");
                    State::Failure(error)
                } else if stale && self.fallback.is_none() {
                    tracing::info!(license_id = %license.id, "a newer license is available");
                    self.fallback = Some(ValidatedLicense {
                        license,
                        status: Some(status.clone()),
                        context,
                    });
                    State::FetchingLicense { status }
                } else {
                    State::Valid(ValidatedLicense {
                        license,
                        status: Some(status),
                        context,
                    })
                }
            }

            (State::FetchingLicense { status }, Event::ReceivedLicenseBytes(data)) => {
                State::ValidatingLicense {
                    data,
                    status: Some(status),
                }
            }

            (
                State::ValidatingLicense { .. }
                | State::RequestingPassphrase { .. }
                | State::ValidatingIntegrity { .. }
                | State::CheckingStatus { .. }
                | State::FetchingLicense { .. },
                Event::OperationFailed(error),
            ) => State::Failure(error),

            (state, _) => {
                tracing::warn!(state = from, event = on, "ignoring unexpected license validation event");
                return Step::Ignored(state);
            }
        };

        tracing::debug!(from, event = on, to = next.name(), "license validation transition");
        Step::Entered(next)
    }

    /// Run the entry action of `state`, returning the event it raises
    async fn enter(&self, state: &State) -> Option<Event> {
        let event = match state {
            State::Start | State::Valid(_) | State::Failure(_) => return None,

            State::ValidatingLicense { data, .. } => match self.parse_license(data) {
                Ok(license) => Event::LicenseValidated(license),
                Err(e) => Event::OperationFailed(e),
            },

            State::RequestingPassphrase { license, .. } => {
                match self
                    .services
                    .passphrases
                    .resolve(license, self.authentication.as_deref(), self.allow_user_interaction)
                    .await
                {
                    Ok(passphrase) => Event::PassphraseReceived(passphrase),
                    Err(e) => Event::OperationFailed(e),
                }
            }

            State::ValidatingIntegrity {
                license, passphrase, ..
            } => match self.create_context(license, passphrase).await {
                Ok(context) => Event::IntegrityValidated(context),
                Err(e) => Event::OperationFailed(e),
            },

            State::FetchingStatus { license, .. } => match self.services.fetch_status(license).await {
                Ok(status) => Event::StatusReceived(status),
                Err(e) => Event::OperationFailed(e),
            },

            State::CheckingStatus { status, .. } => match check_status(status) {
                Ok(()) => Event::StatusAccepted,
                Err(e) => Event::OperationFailed(e),
            },

            State::RegisteringDevice { license, status, .. } => {
                Event::DeviceRegistered(self.register_device(license, status).await)
            }

            State::FetchingLicense { status } => match self.services.fetch_license(status).await {
                Ok(data) => Event::ReceivedLicenseBytes(data),
                Err(e) => Event::OperationFailed(e),
            },
        };

        debug_assert!(!state.is_terminal());
        Some(event)
    }

    fn parse_license(&self, data: &[u8]) -> Result<LicenseDocument> {
        let license = LicenseDocument::parse(data)?;
        let profile = &license.encryption.profile;
        if !self.services.supported_profiles.iter().any(|p| p == profile) {
            return Err(LcpError::ProfileNotSupported(profile.clone()));
        }
        Ok(license)
    }

    async fn create_context(&self, license: &LicenseDocument, passphrase: &str) -> Result<DecryptionContext> {
        let crl = self.services.crl.retrieve().await?;

        let crypto = Arc::clone(&self.services.crypto);
        let json = license.json().to_string();
        let passphrase = passphrase.to_string();
        tokio::task::spawn_blocking(move || crypto.create_context(&json, &passphrase, &crl))
            .await?
            .map_err(LcpError::InvalidLicense)
    }

    /// Register the device, returning the Status Document sent back by the server
    async fn register_device(&self, license: &LicenseDocument, status: &StatusDocument) -> Option<StatusDocument> {
        match self.services.devices.register_if_needed(license, status).await {
            Ok(outcome) => {
                let data = outcome.status_data?;
                match StatusDocument::parse(&data) {
                    Ok(updated) => Some(updated),
                    Err(e) => {
                        tracing::debug!(error = %e, "registration response is not a status document");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(license_id = %license.id, error = %e, "device registration failed");
                None
            }
        }
    }
}

/// Accept usable statuses, turn the others into their error
pub fn check_status(status: &StatusDocument) -> Result<()> {
    let updated = status.updated.status;
    match status.status {
        Status::Ready | Status::Active => Ok(()),
        Status::Returned => Err(LcpError::LicenseReturned { updated }),
        Status::Expired => Err(LcpError::LicenseExpired { updated }),
        Status::Cancelled => Err(LcpError::LicenseCancelled { updated }),
        Status::Revoked => Err(LcpError::LicenseRevoked {
            updated,
            device_count: status.registered_device_count(),
        }),
    }
}
