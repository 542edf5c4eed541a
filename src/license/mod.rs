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


//! License and Status Documents, validation and the validated license façade

pub mod container;
pub mod document;
pub mod license;
pub mod link;
pub mod passphrases;
pub mod status;
pub mod validation;

pub use container::{FileLicenseContainer, LicenseContainer};
pub use document::LicenseDocument;
pub use license::{License, RenewDelegate};
pub use link::{Link, Links};
pub use passphrases::{AuthenticatedLicense, AuthenticationReason, LcpAuthenticating, PassphraseService};
pub use status::{Status, StatusDocument};
pub use validation::{LicenseValidation, ValidatedLicense, ValidationServices};
