//! Error types for LCP Core
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Every failure raised while acquiring, validating or using a license is
//! funnelled into a single [`LcpError`] value so the host application gets one
//! typed, localizable error regardless of which step failed.
//!
//! ## Categories
//!
//! - **Structural**: the License or Status Document is malformed or lacks a
//!   required link
//! - **Policy**: the encryption profile is not in the supported allow-list
//! - **Authentication**: the passphrase could not be obtained
//! - **Integrity**: the crypto library rejected the license
//! - **Network**: CRL, status, license, registration, renew and return calls
//! - **Status**: the Status Document reports a terminal lifecycle state
//! - **Infrastructure**: container, database, I/O and serialization failures

use crate::crypto::CryptoError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias using our LcpError type
pub type Result<T> = std::result::Result<T, LcpError>;

/// Main error type for LCP Core
///
/// Each variant includes a descriptive message and, where the server provides
/// it, the context needed to present the failure to the user.
#[derive(Error, Debug)]
pub enum LcpError {
    // ===== Structural Errors =====

    /// The License Document could not be parsed
    #[error("Invalid License Document: {0}")]
    InvalidLicenseDocument(String),

    /// The Status Document could not be parsed
    #[error("Invalid Status Document: {0}")]
    InvalidStatusDocument(String),

    /// A link required for the current operation is absent
    #[error("Missing required link: {0}")]
    MissingRequiredLink(String),

    // ===== Policy Errors =====

    /// The license encryption profile is not in the supported allow-list
    #[error("License profile not supported: {0}")]
    ProfileNotSupported(String),

    // ===== Authentication Errors =====

    /// The user declined to provide a passphrase, or nobody could be asked
    #[error("Operation cancelled")]
    Cancelled,

    /// The passphrase attempt limit was reached without a valid passphrase
    #[error("Invalid passphrase")]
    InvalidPassphrase,

    // ===== Integrity Errors =====

    /// The crypto library rejected the license
    #[error("Invalid license: {0}")]
    InvalidLicense(CryptoError),

    /// Deciphering publication data failed
    #[error("Decryption failed: {0}")]
    Decryption(CryptoError),

    // ===== Network Errors =====

    /// The Certificate Revocation List could not be fetched
    #[error("Failed to fetch the certificate revocation list: {0}")]
    CrlFetchFailure(String),

    /// The Status Document could not be fetched
    #[error("Failed to fetch the Status Document: {0}")]
    StatusFetchFailure(String),

    /// The updated License Document could not be fetched
    #[error("Failed to fetch the License Document: {0}")]
    LicenseFetchFailure(String),

    /// The device registration was refused by the server
    #[error("Device registration failed: {0}")]
    RegistrationFailed(String),

    /// The loan could not be renewed
    #[error("Renew failed: {0}")]
    RenewFailed(String),

    /// The requested renewal end date is outside the allowed period
    #[error("Incorrect renewal period, the maximum end date is {}", format_optional_date(.max_end))]
    InvalidRenewalPeriod {
        /// Latest end date the provider accepts, when known
        max_end: Option<DateTime<Utc>>,
    },

    /// The publication could not be returned
    #[error("Return failed: {0}")]
    ReturnFailed(String),

    /// The publication was already returned, or the loan already expired
    #[error("This publication has already been returned or has expired")]
    AlreadyReturned,

    /// The protected publication could not be downloaded
    #[error("Failed to download the publication: {0}")]
    PublicationDownloadFailed(String),

    /// The downloaded publication does not match the hash advertised by the license
    #[error("Publication integrity check failed: expected hash {expected}, got {actual}")]
    PublicationHashMismatch {
        expected: String,
        actual: String,
    },

    // ===== Status Errors =====

    /// The license was returned
    #[error("This license was returned on {}", format_optional_date(.updated))]
    LicenseReturned {
        updated: Option<DateTime<Utc>>,
    },

    /// The license expired
    #[error("This license expired on {}", format_optional_date(.updated))]
    LicenseExpired {
        updated: Option<DateTime<Utc>>,
    },

    /// The license was cancelled
    #[error("This license was cancelled on {}", format_optional_date(.updated))]
    LicenseCancelled {
        updated: Option<DateTime<Utc>>,
    },

    /// The license was revoked by its provider
    #[error("This license was revoked on {} after being registered by {device_count} device(s)", format_optional_date(.updated))]
    LicenseRevoked {
        updated: Option<DateTime<Utc>>,
        /// Number of `register` events in the Status Document
        device_count: usize,
    },

    // ===== Infrastructure Errors =====

    /// Reading or writing the license container failed
    #[error("License container error: {0}")]
    Container(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    Internal(String),

    // ===== External Library Errors =====
    // Automatic conversions from external error types

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_optional_date(date: &Option<DateTime<Utc>>) -> String {
    match date {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => "an unknown date".to_string(),
    }
}

impl From<tokio::task::JoinError> for LcpError {
    fn from(err: tokio::task::JoinError) -> Self {
        LcpError::Internal(format!("Background task failed: {}", err))
    }
}

// Helper methods for creating common errors
impl LcpError {
    /// Create an Internal error with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        LcpError::Internal(message.into())
    }

    /// Create a Container error with a message
    pub fn container<S: Into<String>>(message: S) -> Self {
        LcpError::Container(message.into())
    }

    /// Create a MissingRequiredLink error for a link relation
    pub fn missing_link<S: Into<String>>(rel: S) -> Self {
        LcpError::MissingRequiredLink(rel.into())
    }

    /// Check if error comes from a remote call
    ///
    /// Returns `true` for failures that may succeed later without any change
    /// on the user's side.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            LcpError::CrlFetchFailure(_)
                | LcpError::StatusFetchFailure(_)
                | LcpError::LicenseFetchFailure(_)
                | LcpError::RegistrationFailed(_)
                | LcpError::PublicationDownloadFailed(_)
                | LcpError::Reqwest(_)
        )
    }

    /// Check if error reports a terminal license status from the Status Document
    pub fn is_status_error(&self) -> bool {
        matches!(
            self,
            LcpError::LicenseReturned { .. }
                | LcpError::LicenseExpired { .. }
                | LcpError::LicenseCancelled { .. }
                | LcpError::LicenseRevoked { .. }
        )
    }

    /// Get user-friendly error message suitable for display
    ///
    /// This returns actionable error messages that can be shown to end users,
    /// with technical details omitted where appropriate.
    pub fn user_message(&self) -> String {
        match self {
            LcpError::ProfileNotSupported(_) => {
                "This publication is protected with a license profile this application does not support.".to_string()
            }
            LcpError::Cancelled => "The passphrase request was cancelled.".to_string(),
            LcpError::InvalidPassphrase => {
                "The passphrase is incorrect. Please check it with your provider.".to_string()
            }
            LcpError::InvalidLicense(cause) => {
                format!("The license of this publication is invalid: {}.", cause)
            }
            LcpError::LicenseRevoked { device_count, .. } => {
                format!(
                    "The license was revoked by its provider after being registered by {} device(s).",
                    device_count
                )
            }
            LcpError::LicenseReturned { .. } => {
                "This publication was returned and can't be opened anymore.".to_string()
            }
            LcpError::LicenseExpired { .. } => {
                "The loan of this publication has expired.".to_string()
            }
            LcpError::LicenseCancelled { .. } => {
                "The license of this publication was cancelled by its provider.".to_string()
            }
            LcpError::AlreadyReturned => {
                "This publication has already been returned.".to_string()
            }
            e if e.is_network_error() => {
                "Could not reach the license server. Please check your connection and try again.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
