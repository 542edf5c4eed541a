//! Readium LCP license acquisition and validation engine
//!
//! Opens License Documents, checks them against their Status Document and
//! the trusted crypto library, and hands back a [`License`] able to decipher
//! the protected publication.
//!
//! Entry point: [`LcpService`].

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod license;
pub mod service;
pub mod storage;

pub use config::LcpConfig;
pub use crypto::{CryptoError, DecryptionContext, LcpCrypto};
pub use error::{LcpError, Result};
pub use license::{
    AuthenticatedLicense, AuthenticationReason, FileLicenseContainer, LcpAuthenticating, License,
    LicenseContainer, LicenseDocument, RenewDelegate, Status, StatusDocument, ValidatedLicense,
};
pub use service::{AcquiredPublication, LcpComponents, LcpService};
