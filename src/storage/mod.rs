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


//! Local persistence
//!
//! Repositories are traits so hosts can plug their own storage. The SQLite
//! implementations share one [`Database`] pool.
//!
//! # Database Schema
//! - Passphrases: accepted passphrase hashes by license and user
//! - Licenses: device registration flag and rights budgets
//! - Settings: device identifier
//! - CrlCache: last downloaded revocation list
//!
//! # Usage Example
//! ```no_run
//! use lcp_core::storage::{Database, PassphraseRepository, SqlitePassphraseRepository};
//!
//! # async fn example() -> lcp_core::error::Result<()> {
//! let db = Database::new("./lcp.db").await?;
//! let passphrases = SqlitePassphraseRepository::new(db.pool().clone());
//! let hash = passphrases.passphrase("ef15e740-697f-11e3-949a-0800200c9a66").await?;
//! # Ok(())
//! # }
//! ```

pub mod crl_cache;
pub mod database;
pub mod device;
pub mod licenses;
pub mod migrations;
pub mod passphrases;

pub use crl_cache::{CachedCrl, CrlStore, SqliteCrlStore};
pub use database::Database;
pub use device::{DeviceRepository, SqliteDeviceRepository};
pub use licenses::{LicenseRepository, SqliteLicenseRepository, UserRights};
pub use passphrases::{PassphraseRepository, SqlitePassphraseRepository};
