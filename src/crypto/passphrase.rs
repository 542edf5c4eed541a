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


//! Passphrase hashing
//!
//! # What is a passphrase hash?
//! - SHA-256 digest of the passphrase typed by the user, as UTF-8
//! - Formatted as 64 lowercase hex characters
//! - The only form ever stored, compared or sent to the crypto library
//!
//! # Already-hashed passphrases
//! Some providers hand out the digest instead of the cleartext. Input that
//! already looks like a digest is tried verbatim in addition to its own hash,
//! see [`PassphraseHash::candidates`].
//!
//! # Storage
//! - Never log or expose the cleartext or the digest

use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

/// Newtype wrapper around a passphrase digest
///
/// Guarantees the wrapped string is a 64 character lowercase hex SHA-256
/// digest. `Debug` is redacted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PassphraseHash(String);

impl PassphraseHash {
    /// Hash a cleartext passphrase
    pub fn from_clear(clear: &str) -> Self {
        Self(hash_passphrase(clear))
    }

    /// Wrap an existing digest
    ///
    /// Returns `None` unless `hex` is 64 hex characters. The digest is
    /// normalized to lowercase.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        is_hashed_passphrase(hex).then(|| Self(hex.to_ascii_lowercase()))
    }

    /// Digests worth testing for a passphrase typed by the user
    ///
    /// The hash of the input always comes first, followed by the input itself
    /// when it already is a digest.
    pub fn candidates(clear: &str) -> Vec<Self> {
        let mut candidates = vec![Self::from_clear(clear)];
        if let Some(hashed) = Self::from_hex(clear) {
            if !candidates.contains(&hashed) {
                candidates.push(hashed);
            }
        }
        candidates
    }

    /// Get the hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the hex digest
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for PassphraseHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PassphraseHash(***)")
    }
}

/// SHA-256 digest of `clear` as lowercase hex
///
/// # Example
/// ```
/// use lcp_core::crypto::hash_passphrase;
///
/// assert_eq!(
///     hash_passphrase("abc"),
///     "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
/// );
/// ```
pub fn hash_passphrase(clear: &str) -> String {
    hex::encode(Sha256::digest(clear.as_bytes()))
}

/// Check whether `value` has the shape of a passphrase digest
pub fn is_hashed_passphrase(value: &str) -> bool {
    static DIGEST: OnceLock<Regex> = OnceLock::new();
    DIGEST
        .get_or_init(|| Regex::new(r"^[a-fA-F0-9]{64}$").expect("digest pattern is valid"))
        .is_match(value)
}
