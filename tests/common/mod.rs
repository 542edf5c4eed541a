//! Shared fixtures for the integration tests
//!
//! Every test gets its own wiremock server acting as License Status server,
//! revocation authority and publication host, an in-memory database and a
//! fake crypto library accepting a single passphrase.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use lcp_core::api::ReqwestHttpClient;
use lcp_core::config::LcpConfigBuilder;
use lcp_core::crypto::{hash_passphrase, CryptoError, DecryptionContext, LcpCrypto};
use lcp_core::storage::{CachedCrl, CrlStore, Database, PassphraseRepository};
use lcp_core::{
    AuthenticatedLicense, AuthenticationReason, LcpAuthenticating, LcpComponents, LcpConfig,
    LcpService, LicenseContainer, LicenseDocument,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::MockServer;

pub const LICENSE_ID: &str = "ef15e740-697f-11e3-949a-0800200c9a66";
pub const USER_ID: &str = "d9f298a7-7f34-49e7-8aae-4378ecb1d597";
pub const PROVIDER: &str = "https://www.imaginaryebookretailer.com";
pub const PASSPHRASE: &str = "open sesame";
pub const BASIC_PROFILE: &str = "http://readium.org/lcp/basic-profile";
pub const LICENSE_UPDATED: &str = "2014-02-21T09:44:17Z";
pub const SEEDED_CRL: &str = "-----BEGIN X509 CRL-----c2VlZGVk-----END X509 CRL-----";

// ===== Paths served by the mock server =====

pub fn status_path() -> String {
    format!("/licenses/{}/status", LICENSE_ID)
}

pub fn license_path() -> String {
    format!("/licenses/{}", LICENSE_ID)
}

pub fn register_path() -> String {
    format!("/licenses/{}/register", LICENSE_ID)
}

pub fn renew_path() -> String {
    format!("/licenses/{}/renew", LICENSE_ID)
}

pub fn return_path() -> String {
    format!("/licenses/{}/return", LICENSE_ID)
}

// ===== Documents =====

/// License Document pointing at the mock server
pub struct LicenseJson {
    base: String,
    pub profile: String,
    pub updated: String,
    pub hint_link: bool,
    pub status_link: bool,
    pub publication_hash: Option<String>,
    pub publication_length: Option<u64>,
}

impl LicenseJson {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.to_string(),
            profile: BASIC_PROFILE.to_string(),
            updated: LICENSE_UPDATED.to_string(),
            hint_link: true,
            status_link: true,
            publication_hash: None,
            publication_length: None,
        }
    }

    pub fn profile(mut self, profile: &str) -> Self {
        self.profile = profile.to_string();
        self
    }

    pub fn updated(mut self, updated: &str) -> Self {
        self.updated = updated.to_string();
        self
    }

    pub fn without_hint_link(mut self) -> Self {
        self.hint_link = false;
        self
    }

    pub fn without_status_link(mut self) -> Self {
        self.status_link = false;
        self
    }

    pub fn publication(mut self, hash: &str, length: u64) -> Self {
        self.publication_hash = Some(hash.to_string());
        self.publication_length = Some(length);
        self
    }

    pub fn build(&self) -> String {
        let mut publication = json!({
            "rel": "publication",
            "href": format!("{}/book.epub", self.base),
            "type": "application/epub+zip",
        });
        if let Some(hash) = &self.publication_hash {
            publication["hash"] = json!(hash);
        }
        if let Some(length) = self.publication_length {
            publication["length"] = json!(length);
        }

        let mut links = Vec::new();
        if self.hint_link {
            links.push(json!({"rel": "hint", "href": format!("{}/hint", self.base), "type": "text/html"}));
        }
        links.push(publication);
        if self.status_link {
            links.push(json!({
                "rel": "status",
                "href": format!("{}{}", self.base, status_path()),
                "type": "application/vnd.readium.license.status.v1.0+json",
            }));
        }

        json!({
            "id": LICENSE_ID,
            "issued": "2013-11-04T01:08:15Z",
            "updated": self.updated,
            "provider": PROVIDER,
            "encryption": {
                "profile": self.profile,
                "content_key": {
                    "algorithm": "http://www.w3.org/2001/04/xmlenc#aes256-cbc",
                    "encrypted_value": "/k8RpXqf4E2WEunCp76E8PjhS051NXwAXeTD1ioazYxCRGvHLAck/KQ3cCh5JxDmCK0nRLyAxs1X0aA3z55boQ=="
                },
                "user_key": {
                    "algorithm": "http://www.w3.org/2001/04/xmlenc#sha256",
                    "text_hint": "Enter your email address",
                    "key_check": "jJEjUDipHK3OjGt6kFq7dcOLZuicQFUYwQ+TYkAIWKm6Xv6kpHFhF7LOkUK/Owww"
                }
            },
            "links": links,
            "rights": {"print": 10, "copy": 2048},
            "user": {"id": USER_ID, "encrypted": ["email"]},
            "signature": {
                "algorithm": "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
                "certificate": "MIIDEjCCAfoCAQEwDQYJKoZIhvcNAQEFBQAwTzELMAkGA1UEBhMCRlIxDjAMBgNV",
                "value": "q/3IInic9c/EaJHyG1Kkqk5v1zlJNsiQBmxz4lykhyD3dA2jg2ZzrOenYU9GxP"
            }
        })
        .to_string()
    }
}

/// Status Document pointing at the mock server
pub struct StatusJson {
    base: String,
    pub status: String,
    pub license_updated: String,
    pub events: Vec<String>,
}

impl StatusJson {
    pub fn new(base: &str, status: &str) -> Self {
        Self {
            base: base.to_string(),
            status: status.to_string(),
            license_updated: LICENSE_UPDATED.to_string(),
            events: Vec::new(),
        }
    }

    pub fn license_updated(mut self, updated: &str) -> Self {
        self.license_updated = updated.to_string();
        self
    }

    pub fn events(mut self, events: &[&str]) -> Self {
        self.events = events.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn build(&self) -> String {
        let events: Vec<_> = self
            .events
            .iter()
            .enumerate()
            .map(|(i, event_type)| {
                json!({
                    "type": event_type,
                    "name": format!("Device {}", i),
                    "id": format!("device-{}", i),
                    "timestamp": "2014-02-21T09:44:17Z",
                })
            })
            .collect();

        json!({
            "id": LICENSE_ID,
            "status": self.status,
            "message": format!("The license is {}", self.status),
            "updated": {
                "license": self.license_updated,
                "status": "2014-03-01T12:00:00Z",
            },
            "links": [
                {
                    "rel": "license",
                    "href": format!("{}{}", self.base, license_path()),
                    "type": "application/vnd.readium.lcp.license.v1.0+json",
                },
                {
                    "rel": "register",
                    "href": format!("{}{}{{?id,name}}", self.base, register_path()),
                    "templated": true,
                },
                {
                    "rel": "renew",
                    "href": format!("{}{}{{?end,id,name}}", self.base, renew_path()),
                    "templated": true,
                },
                {
                    "rel": "return",
                    "href": format!("{}{}{{?id,name}}", self.base, return_path()),
                    "templated": true,
                }
            ],
            "potential_rights": {"end": "2030-01-01T00:00:00Z"},
            "events": events,
        })
        .to_string()
    }
}

// ===== Fake crypto library =====

/// Context handed out by [`FakeCrypto`]
pub struct FakeContext {
    pub license_json: String,
}

/// Accepts a single passphrase hash and records every call
pub struct FakeCrypto {
    valid_hash: String,
    /// License JSON containing this text fails the signature check
    rejected_marker: Mutex<Option<String>>,
    pub find_calls: AtomicUsize,
    pub context_calls: AtomicUsize,
    crls: Mutex<Vec<String>>,
}

impl FakeCrypto {
    pub fn new(passphrase: &str) -> Self {
        Self {
            valid_hash: hash_passphrase(passphrase),
            rejected_marker: Mutex::new(None),
            find_calls: AtomicUsize::new(0),
            context_calls: AtomicUsize::new(0),
            crls: Mutex::new(Vec::new()),
        }
    }

    pub fn reject_licenses_containing(&self, marker: &str) {
        *self.rejected_marker.lock().unwrap() = Some(marker.to_string());
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn context_calls(&self) -> usize {
        self.context_calls.load(Ordering::SeqCst)
    }

    /// Revocation lists received by `create_context`, in order
    pub fn crls(&self) -> Vec<String> {
        self.crls.lock().unwrap().clone()
    }
}

impl LcpCrypto for FakeCrypto {
    fn find_one_valid_passphrase(&self, _license_json: &str, passphrases: &[String]) -> Option<String> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        passphrases.iter().find(|p| **p == self.valid_hash).cloned()
    }

    fn create_context(
        &self,
        license_json: &str,
        passphrase: &str,
        crl: &str,
    ) -> Result<DecryptionContext, CryptoError> {
        self.context_calls.fetch_add(1, Ordering::SeqCst);
        self.crls.lock().unwrap().push(crl.to_string());

        if passphrase != self.valid_hash {
            return Err(CryptoError::UserKeyCheckInvalid);
        }
        if let Some(marker) = self.rejected_marker.lock().unwrap().as_deref() {
            if license_json.contains(marker) {
                return Err(CryptoError::LicenseSignatureInvalid);
            }
        }
        Ok(DecryptionContext::new(FakeContext {
            license_json: license_json.to_string(),
        }))
    }

    /// "Deciphers" by reversing the bytes
    fn decrypt(&self, context: &DecryptionContext, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        context
            .downcast_ref::<FakeContext>()
            .ok_or(CryptoError::ContextInvalid)?;
        Ok(data.iter().rev().copied().collect())
    }
}

// ===== Authentication delegate =====

/// Answers passphrase requests from a script, then cancels
pub struct ScriptedAuthentication {
    answers: Mutex<VecDeque<Option<String>>>,
    reasons: Mutex<Vec<AuthenticationReason>>,
}

impl ScriptedAuthentication {
    pub fn new(answers: &[Option<&str>]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().map(|a| a.map(str::to_string)).collect()),
            reasons: Mutex::new(Vec::new()),
        })
    }

    pub fn delegate(self: &Arc<Self>) -> Option<Arc<dyn LcpAuthenticating>> {
        let delegate: Arc<dyn LcpAuthenticating> = self.clone();
        Some(delegate)
    }

    pub fn calls(&self) -> usize {
        self.reasons.lock().unwrap().len()
    }

    pub fn reasons(&self) -> Vec<AuthenticationReason> {
        self.reasons.lock().unwrap().clone()
    }
}

#[async_trait]
impl LcpAuthenticating for ScriptedAuthentication {
    async fn retrieve_passphrase(
        &self,
        license: &AuthenticatedLicense,
        reason: AuthenticationReason,
    ) -> Option<String> {
        assert_eq!(license.license_id, LICENSE_ID);
        self.reasons.lock().unwrap().push(reason);
        self.answers.lock().unwrap().pop_front().flatten()
    }
}

// ===== Container =====

/// License container kept in memory
pub struct MemoryContainer {
    data: Mutex<Vec<u8>>,
    writes: AtomicUsize,
}

impl MemoryContainer {
    pub fn new(json: &str) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(json.as_bytes().to_vec()),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.data.lock().unwrap().clone()).unwrap()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LicenseContainer for MemoryContainer {
    async fn read(&self) -> lcp_core::Result<Vec<u8>> {
        Ok(self.data.lock().unwrap().clone())
    }

    async fn write(&self, license: &LicenseDocument) -> lcp_core::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.data.lock().unwrap() = license.json().as_bytes().to_vec();
        Ok(())
    }
}

// ===== Harness =====

/// A service wired to a mock server and an in-memory database
pub struct Harness {
    pub server: MockServer,
    pub crypto: Arc<FakeCrypto>,
    pub database: Database,
    pub components: LcpComponents,
    pub service: LcpService,
}

impl Harness {
    /// Harness whose CRL cache holds a fresh [`SEEDED_CRL`]
    pub async fn new() -> Self {
        Self::with_config(|config| config).await
    }

    pub async fn with_config(customize: impl FnOnce(LcpConfigBuilder) -> LcpConfigBuilder) -> Self {
        let harness = Self::without_crl(customize).await;
        harness.seed_crl(SEEDED_CRL, Duration::zero()).await;
        harness
    }

    /// Harness with an empty CRL cache
    pub async fn without_crl(customize: impl FnOnce(LcpConfigBuilder) -> LcpConfigBuilder) -> Self {
        let server = MockServer::start().await;
        let crypto = Arc::new(FakeCrypto::new(PASSPHRASE));
        let database = Database::new_in_memory().await.unwrap();

        let http = Arc::new(ReqwestHttpClient::new().unwrap());
        let components = LcpComponents::sqlite(&database, http, crypto.clone());

        let config: LcpConfig = customize(
            LcpConfig::builder()
                .crl_url(format!("{}/crl", server.uri()))
                .device_name("Test Reader"),
        )
        .build();
        let service = LcpService::with_components(config, components.clone()).unwrap();

        Self {
            server,
            crypto,
            database,
            components,
            service,
        }
    }

    pub fn base(&self) -> String {
        self.server.uri()
    }

    pub fn license(&self) -> LicenseJson {
        LicenseJson::new(&self.base())
    }

    pub fn status(&self, status: &str) -> StatusJson {
        StatusJson::new(&self.base(), status)
    }

    /// Store a CRL fetched `age` ago
    pub async fn seed_crl(&self, pem: &str, age: Duration) {
        self.components
            .crl_store
            .save(&CachedCrl::new(pem.to_string(), Utc::now() - age))
            .await
            .unwrap();
    }

    /// Store the valid passphrase hash as if the user typed it before
    pub async fn store_passphrase(&self) {
        self.components
            .passphrases
            .add_passphrase(&hash_passphrase(PASSPHRASE), LICENSE_ID, PROVIDER, Some(USER_ID))
            .await
            .unwrap();
    }
}
