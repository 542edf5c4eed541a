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


//! Boundary with the trusted LCP cryptographic library
//!
//! The engine never implements certificate-chain checks, signature verification
//! or AES itself. Those live in an external library (typically the native LCP
//! client library shipped by the rights-management vendor) exposed to the
//! engine through the [`LcpCrypto`] trait.
//!
//! # Operations
//! - **find_one_valid_passphrase**: test stored passphrase hashes against a license
//! - **create_context**: check integrity and build a [`DecryptionContext`]
//! - **decrypt**: decipher publication resource bytes with a context
//!
//! # Passphrases
//! Only SHA-256 digests of the user's passphrase cross this boundary, see
//! [`passphrase`].

pub mod passphrase;

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use passphrase::{hash_passphrase, is_hashed_passphrase, PassphraseHash};

/// Failures reported by the crypto library
///
/// The integrity variants map to the checks the library performs while
/// building a [`DecryptionContext`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The license is outside of its rights period
    #[error("the license is out of date")]
    LicenseOutOfDate,

    /// The provider certificate is listed in the revocation list
    #[error("the provider certificate was revoked")]
    CertificateRevoked,

    /// The provider certificate was not signed by the root authority
    #[error("the provider certificate signature is invalid")]
    CertificateSignatureInvalid,

    /// The license was issued outside the certificate validity period
    #[error("the license was signed outside the certificate validity period")]
    LicenseSignatureDateInvalid,

    /// The license signature does not match its content
    #[error("the license signature is invalid")]
    LicenseSignatureInvalid,

    /// The passphrase does not unlock the user key
    #[error("the user key check failed")]
    UserKeyCheckInvalid,

    /// The content key could not be decrypted with the user key
    #[error("the content key could not be decrypted")]
    ContentKeyDecryptError,

    /// The decryption context was not produced by this library
    #[error("the decryption context is invalid")]
    ContextInvalid,

    /// Deciphering publication content failed
    #[error("the content could not be decrypted")]
    ContentDecryptError,

    /// Any other library failure
    #[error("{0}")]
    Other(String),
}

/// Opaque capability produced by the crypto library
///
/// It is the only object able to decipher publication resources. The engine
/// moves it around without ever looking inside; the library that created it
/// downcasts it back with [`DecryptionContext::downcast_ref`].
#[derive(Clone)]
pub struct DecryptionContext {
    inner: Arc<dyn Any + Send + Sync>,
}

impl DecryptionContext {
    /// Wrap a library-specific context
    pub fn new<T: Any + Send + Sync>(context: T) -> Self {
        Self {
            inner: Arc::new(context),
        }
    }

    /// Get the library-specific context back, if it has type `T`
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for DecryptionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecryptionContext(..)")
    }
}

/// Trusted cryptographic library used to validate licenses
///
/// Every method receives the License Document's JSON verbatim, as downloaded,
/// because the signature covers its exact serialization.
///
/// Implementations are called from blocking worker threads and may take their
/// time.
pub trait LcpCrypto: Send + Sync {
    /// Return the first hash in `passphrases` able to unlock the license
    fn find_one_valid_passphrase(&self, license_json: &str, passphrases: &[String]) -> Option<String>;

    /// Check the license integrity and build its decryption context
    ///
    /// # Arguments
    /// * `license_json` - License Document as downloaded
    /// * `passphrase` - SHA-256 hex digest of the user passphrase
    /// * `crl` - PEM-encoded certificate revocation list
    fn create_context(
        &self,
        license_json: &str,
        passphrase: &str,
        crl: &str,
    ) -> std::result::Result<DecryptionContext, CryptoError>;

    /// Decipher publication resource bytes
    fn decrypt(&self, context: &DecryptionContext, data: &[u8]) -> std::result::Result<Vec<u8>, CryptoError>;
}
