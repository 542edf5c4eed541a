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


//! Passphrase resolution
//!
//! Finds the passphrase hash unlocking a license:
//! 1. hashes stored for this license and for every license of the same user
//! 2. otherwise the [`LcpAuthenticating`] delegate, asked until it returns a
//!    valid passphrase or gives up
//!
//! Every candidate is checked by the crypto library; a hash accepted from the
//! delegate is stored for next time. Cleartext passphrases are never stored
//! nor logged.

use crate::crypto::{LcpCrypto, PassphraseHash};
use crate::error::{LcpError, Result};
use crate::license::document::{LicenseDocument, User};
use crate::license::link::{rel, Link, Links};
use crate::storage::PassphraseRepository;
use async_trait::async_trait;
use std::sync::Arc;

/// Why the delegate is asked for a passphrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationReason {
    /// No stored passphrase unlocks the license
    PassphraseNotFound,
    /// The previously typed passphrase was wrong
    InvalidPassphrase,
}

/// What the user is shown when asked for a passphrase
///
/// Leaves out the encryption material and signature of the license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedLicense {
    pub license_id: String,
    /// Hint chosen by the provider, e.g. "Enter your email address"
    pub hint: String,
    /// Page explaining how to recover the passphrase
    pub hint_link: Option<Link>,
    /// Contact pages of the provider
    pub support_links: Vec<Link>,
    pub provider: String,
    pub user: User,
}

impl AuthenticatedLicense {
    pub fn from_license(license: &LicenseDocument) -> Self {
        Self {
            license_id: license.id.clone(),
            hint: license.encryption.user_key.text_hint.clone(),
            hint_link: license.hint_link().cloned(),
            support_links: license.links_with_rel(rel::SUPPORT).into_iter().cloned().collect(),
            provider: license.provider.clone(),
            user: license.user.clone(),
        }
    }
}

/// Asks the user for a passphrase
#[async_trait]
pub trait LcpAuthenticating: Send + Sync {
    /// Return the cleartext passphrase, or `None` if the user cancels
    async fn retrieve_passphrase(
        &self,
        license: &AuthenticatedLicense,
        reason: AuthenticationReason,
    ) -> Option<String>;
}

/// Resolves the passphrase hash of a license
pub struct PassphraseService {
    repository: Arc<dyn PassphraseRepository>,
    crypto: Arc<dyn LcpCrypto>,
    max_attempts: Option<u32>,
}

impl PassphraseService {
    /// Create a passphrase service
    ///
    /// # Arguments
    /// * `max_attempts` - Passphrases the delegate may return before giving
    ///   up with `InvalidPassphrase`, `None` for no limit
    pub fn new(
        repository: Arc<dyn PassphraseRepository>,
        crypto: Arc<dyn LcpCrypto>,
        max_attempts: Option<u32>,
    ) -> Self {
        Self {
            repository,
            crypto,
            max_attempts,
        }
    }

    /// Find the passphrase hash unlocking `license`
    ///
    /// # Arguments
    /// * `authentication` - Delegate asked when no stored passphrase fits
    /// * `allow_user_interaction` - When false, the delegate is never asked
    ///
    /// # Errors
    /// - `Cancelled` if nothing stored fits and the delegate is absent,
    ///   not allowed, or returns `None`
    /// - `InvalidPassphrase` once `max_attempts` wrong passphrases were typed
    pub async fn resolve(
        &self,
        license: &LicenseDocument,
        authentication: Option<&dyn LcpAuthenticating>,
        allow_user_interaction: bool,
    ) -> Result<String> {
        let candidates = self.stored_candidates(license).await?;
        if !candidates.is_empty() {
            if let Some(hash) = self.find_valid(license, candidates).await? {
                tracing::debug!(license_id = %license.id, "stored passphrase accepted");
                return Ok(hash);
            }
        }

        let authentication = match authentication {
            Some(authentication) if allow_user_interaction => authentication,
            _ => {
                tracing::debug!(license_id = %license.id, "no stored passphrase and no one to ask");
                return Err(LcpError::Cancelled);
            }
        };

        let summary = AuthenticatedLicense::from_license(license);
        let mut reason = AuthenticationReason::PassphraseNotFound;
        let mut attempts: u32 = 0;

        loop {
            if self.max_attempts.map_or(false, |max| attempts >= max) {
                tracing::warn!(license_id = %license.id, attempts, "passphrase attempts exhausted");
                return Err(LcpError::InvalidPassphrase);
            }

            let Some(clear) = authentication.retrieve_passphrase(&summary, reason).await else {
                tracing::debug!(license_id = %license.id, "passphrase request cancelled");
                return Err(LcpError::Cancelled);
            };
            attempts += 1;

            let candidates = PassphraseHash::candidates(&clear)
                .into_iter()
                .map(PassphraseHash::into_string)
                .collect();

            if let Some(hash) = self.find_valid(license, candidates).await? {
                self.repository
                    .add_passphrase(&hash, &license.id, &license.provider, license.user.id.as_deref())
                    .await?;
                tracing::info!(license_id = %license.id, "passphrase accepted and stored");
                return Ok(hash);
            }

            tracing::debug!(license_id = %license.id, attempts, "passphrase rejected");
            reason = AuthenticationReason::InvalidPassphrase;
        }
    }

    async fn stored_candidates(&self, license: &LicenseDocument) -> Result<Vec<String>> {
        let mut candidates = Vec::new();
        if let Some(hash) = self.repository.passphrase(&license.id).await? {
            candidates.push(hash);
        }
        if let Some(user_id) = &license.user.id {
            for hash in self.repository.passphrases(user_id).await? {
                if !candidates.contains(&hash) {
                    candidates.push(hash);
                }
            }
        }
        Ok(candidates)
    }

    async fn find_valid(&self, license: &LicenseDocument, candidates: Vec<String>) -> Result<Option<String>> {
        let crypto = Arc::clone(&self.crypto);
        let json = license.json().to_string();
        let found = tokio::task::spawn_blocking(move || {
            crypto.find_one_valid_passphrase(&json, &candidates)
        })
        .await?;
        Ok(found)
    }
}
