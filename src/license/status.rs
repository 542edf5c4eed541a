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


//! Status Document model and parsing
//!
//! The Status Document is hosted by the License Status server and reports the
//! current lifecycle state of one license, along with the links used to
//! register a device, fetch an updated license, renew or return the loan.
//!
//! # Example
//! ```json
//! {
//!   "id": "ef15e740-697f-11e3-949a-0800200c9a66",
//!   "status": "active",
//!   "message": "Your license is active.",
//!   "updated": { "license": "2014-02-21T09:44:17Z", "status": "2014-03-01T12:00:00Z" },
//!   "links": [
//!     { "rel": "license", "href": "https://lsd.example.com/licenses/ef15e740", "type": "application/vnd.readium.lcp.license.v1.0+json" },
//!     { "rel": "register", "href": "https://lsd.example.com/licenses/ef15e740/register{?id,name}", "templated": true }
//!   ],
//!   "potential_rights": { "end": "2014-12-04T01:08:15Z" },
//!   "events": [
//!     { "type": "register", "name": "Jo's Reader", "id": "709e1380-3528-11e5-a2cb-0800200c9a66", "timestamp": "2014-02-21T09:44:17Z" }
//!   ]
//! }
//! ```

use crate::error::{LcpError, Result};
use crate::license::link::{rel, Link, Links};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type recorded when a device registers the license
pub const REGISTER_EVENT: &str = "register";

/// Lifecycle state of a license
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Issued, no device registered yet
    Ready,
    /// At least one device registered
    Active,
    /// Revoked by the provider
    Revoked,
    /// Returned by the user
    Returned,
    /// Cancelled before any device registered
    Cancelled,
    /// Reached its end date
    Expired,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ready => "ready",
            Status::Active => "active",
            Status::Revoked => "revoked",
            Status::Returned => "returned",
            Status::Cancelled => "cancelled",
            Status::Expired => "expired",
        }
    }

    /// Check whether the license can still be used
    pub fn is_usable(&self) -> bool {
        matches!(self, Status::Ready | Status::Active)
    }
}

/// Parsed Status Document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDocument {
    /// Identifier of the license this status describes
    pub id: String,

    pub status: Status,

    /// Human readable explanation of the status
    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub updated: Updated,

    #[serde(default)]
    pub links: Vec<Link>,

    /// Rights the user may obtain by renewing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_rights: Option<PotentialRights>,

    #[serde(default)]
    pub events: Vec<Event>,
}

/// Last modification dates reported by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Updated {
    /// Date the License Document was last updated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<DateTime<Utc>>,

    /// Date the status last changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DateTime<Utc>>,
}

/// Maximum rights obtainable through renewal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotentialRights {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

/// An entry of the license history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event type: register, renew, return, revoke, cancel
    #[serde(rename = "type")]
    pub event_type: String,

    /// Name of the device that triggered the event
    #[serde(default)]
    pub name: String,

    /// Identifier of the device that triggered the event
    #[serde(default)]
    pub id: String,

    #[serde(rename = "timestamp", skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl StatusDocument {
    /// Parse a Status Document
    ///
    /// # Errors
    /// Returns `InvalidStatusDocument` if the JSON is malformed or the status
    /// value is not one of the six known states.
    pub fn parse(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| LcpError::InvalidStatusDocument(e.to_string()))
    }

    /// Number of events of the given type
    pub fn event_count(&self, event_type: &str) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    /// Number of devices that registered the license
    pub fn registered_device_count(&self) -> usize {
        self.event_count(REGISTER_EVENT)
    }

    /// Check whether the server holds a license more recent than `license_updated`
    pub fn has_newer_license_than(&self, license_updated: DateTime<Utc>) -> bool {
        self.updated
            .license
            .map_or(false, |updated| updated > license_updated)
    }

    /// Latest end date obtainable by renewing
    pub fn potential_end(&self) -> Option<DateTime<Utc>> {
        self.potential_rights.as_ref().and_then(|rights| rights.end)
    }

    /// Link to the up-to-date License Document
    pub fn license_link(&self) -> Option<&Link> {
        self.link(rel::LICENSE)
    }
}

impl Links for StatusDocument {
    fn links(&self) -> &[Link] {
        &self.links
    }
}
