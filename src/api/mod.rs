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


//! Remote endpoints
//!
//! - [`client`]: HTTP transport shared by every remote call
//! - [`crl`]: Certificate Revocation List download and cache
//! - [`registration`]: device registration against the License Status server

pub mod client;
pub mod crl;
pub mod registration;

pub use client::{ClientConfig, DownloadedFile, HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use crl::CrlService;
pub use registration::{DeviceService, RegistrationOutcome};
