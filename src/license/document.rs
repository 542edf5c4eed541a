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


//! License Document model and parsing
//!
//! A License Document is the signed JSON descriptor distributed with (or
//! inside) an LCP protected publication. It names the encryption parameters,
//! the user rights and the remote resources attached to one license.
//!
//! # Example
//! ```json
//! {
//!   "id": "ef15e740-697f-11e3-949a-0800200c9a66",
//!   "issued": "2013-11-04T01:08:15+01:00",
//!   "updated": "2014-02-21T09:44:17+01:00",
//!   "provider": "https://www.imaginaryebookretailer.com",
//!   "encryption": {
//!     "profile": "http://readium.org/lcp/basic-profile",
//!     "content_key": { "algorithm": "http://www.w3.org/2001/04/xmlenc#aes256-cbc", "encrypted_value": "..." },
//!     "user_key": { "algorithm": "http://www.w3.org/2001/04/xmlenc#sha256", "text_hint": "...", "key_check": "..." }
//!   },
//!   "links": [
//!     { "rel": "hint", "href": "https://www.imaginaryebookretailer.com/lcp/hint", "type": "text/html" },
//!     { "rel": "publication", "href": "https://www.example.com/file.epub", "type": "application/epub+zip" }
//!   ],
//!   "rights": { "print": 10, "copy": 2048 },
//!   "user": { "id": "d9f298a7-7f34-49e7-8aae-4378ecb1d597", "encrypted": ["email"] },
//!   "signature": { "algorithm": "...", "certificate": "...", "value": "..." }
//! }
//! ```
//!
//! # Validation at parse time
//! Parsing fails when the JSON does not match the schema above, and when the
//! `hint` or `publication` link is missing. Encryption profile checks are
//! the validation state machine's business since they depend on the caller.
//!
//! The downloaded JSON is kept verbatim: the signature covers its exact
//! serialization, so the crypto library must receive it untouched.

use crate::error::{LcpError, Result};
use crate::license::link::{rel, Link, Links};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parsed License Document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseDocument {
    /// Unique license identifier, used as repository key
    pub id: String,

    /// Date the license was first issued
    pub issued: DateTime<Utc>,

    /// Date the license was last updated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,

    /// URI of the license provider
    pub provider: String,

    pub encryption: Encryption,

    pub links: Vec<Link>,

    #[serde(default)]
    pub rights: Rights,

    #[serde(default)]
    pub user: User,

    pub signature: Signature,

    /// Document as downloaded
    #[serde(skip)]
    json: String,
}

/// Encryption parameters of the license
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encryption {
    /// Encryption profile URI, checked against the supported profiles
    pub profile: String,
    pub content_key: ContentKey,
    pub user_key: UserKey,
}

/// Publication content key, encrypted with the user key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentKey {
    /// Base64 encrypted content key
    pub encrypted_value: String,
    pub algorithm: String,
}

/// User key derivation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserKey {
    /// Hint shown to the user when asking for the passphrase
    pub text_hint: String,
    pub algorithm: String,
    /// Value encrypted with the user key, used to check a passphrase
    pub key_check: String,
}

/// Rights granted to the user
///
/// `None` means the right is not restricted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rights {
    /// Number of pages that may be printed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print: Option<u32>,

    /// Number of characters that may be copied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

/// User the license was issued to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Names of the fields encrypted with the user key
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encrypted: Vec<String>,
}

/// License signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub algorithm: String,
    /// Provider certificate (base64 DER)
    pub certificate: String,
    pub value: String,
}

impl LicenseDocument {
    /// Parse and structurally validate a License Document
    ///
    /// # Errors
    /// - `InvalidLicenseDocument` if the bytes are not a valid License Document
    /// - `MissingRequiredLink` if the `hint` or `publication` link is absent
    pub fn parse(data: &[u8]) -> Result<Self> {
        let json = std::str::from_utf8(data)
            .map_err(|e| LcpError::InvalidLicenseDocument(format!("Not UTF-8: {}", e)))?;

        let mut license: LicenseDocument = serde_json::from_str(json)
            .map_err(|e| LcpError::InvalidLicenseDocument(e.to_string()))?;

        for required in [rel::HINT, rel::PUBLICATION] {
            license.required_link(required)?;
        }

        license.json = json.to_string();
        Ok(license)
    }

    /// Document as downloaded, to hand over to the crypto library or a container
    pub fn json(&self) -> &str {
        &self.json
    }

    /// Serialize the modeled fields back to JSON
    ///
    /// Unlike [`json`](Self::json), the result is not covered by the signature.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Date of the last change: `updated`, or `issued` if never updated
    pub fn effective_updated(&self) -> DateTime<Utc> {
        self.updated.unwrap_or(self.issued)
    }

    /// Check whether `now` falls inside the `start`/`end` rights period
    pub fn is_within_rights_period(&self, now: DateTime<Utc>) -> bool {
        let started = self.rights.start.map_or(true, |start| start <= now);
        let not_ended = self.rights.end.map_or(true, |end| now <= end);
        started && not_ended
    }

    /// Link to the page explaining how to recover the passphrase
    pub fn hint_link(&self) -> Option<&Link> {
        self.link(rel::HINT)
    }

    /// Link to the protected publication
    pub fn publication_link(&self) -> Option<&Link> {
        self.link(rel::PUBLICATION)
    }

    /// Link to the Status Document, if the provider hosts one
    pub fn status_link(&self) -> Option<&Link> {
        self.link(rel::STATUS)
    }
}

impl Links for LicenseDocument {
    fn links(&self) -> &[Link] {
        &self.links
    }
}

/// Equality over the modeled fields; the downloaded JSON is not compared.
impl PartialEq for LicenseDocument {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.issued == other.issued
            && self.updated == other.updated
            && self.provider == other.provider
            && self.encryption == other.encryption
            && self.links == other.links
            && self.rights == other.rights
            && self.user == other.user
            && self.signature == other.signature
    }
}

impl Eq for LicenseDocument {}
