//! License validation against a mock License Status server

mod common;

use chrono::{TimeZone, Utc};
use common::*;
use lcp_core::storage::LicenseRepository;
use lcp_core::{AuthenticationReason, LcpError, Status};
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, ResponseTemplate};

async fn mount_status(harness: &Harness, body: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path(status_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(expected)
        .mount(&harness.server)
        .await;
}

async fn mount_register(harness: &Harness, status: u16, expected: u64) {
    Mock::given(method("POST"))
        .and(path(register_path()))
        .respond_with(ResponseTemplate::new(status))
        .expect(expected)
        .mount(&harness.server)
        .await;
}

#[tokio::test]
async fn test_missing_link_fails_before_any_request() {
    let harness = Harness::new().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.server)
        .await;

    let json = harness.license().without_hint_link().build();
    let error = harness
        .service
        .validation(None, false)
        .validate(json.into_bytes())
        .await
        .unwrap_err();

    assert!(matches!(error, LcpError::MissingRequiredLink(rel) if rel == "hint"));
    assert_eq!(harness.crypto.find_calls(), 0);
}

#[tokio::test]
async fn test_unsupported_profile_never_asks_for_a_passphrase() {
    let harness = Harness::new().await;
    let authentication = ScriptedAuthentication::new(&[Some(PASSPHRASE)]);

    let json = harness
        .license()
        .profile("http://readium.org/lcp/profile-2.0")
        .build();
    let error = harness
        .service
        .validation(authentication.delegate(), true)
        .validate(json.into_bytes())
        .await
        .unwrap_err();

    assert!(matches!(error, LcpError::ProfileNotSupported(p) if p == "http://readium.org/lcp/profile-2.0"));
    assert_eq!(authentication.calls(), 0);
    assert_eq!(harness.crypto.find_calls(), 0);
}

#[tokio::test]
async fn test_stored_passphrase_skips_the_delegate() {
    let harness = Harness::new().await;
    harness.store_passphrase().await;
    let authentication = ScriptedAuthentication::new(&[Some(PASSPHRASE)]);

    let json = harness.license().without_status_link().build();
    let validated = harness
        .service
        .validation(authentication.delegate(), true)
        .validate(json.into_bytes())
        .await
        .unwrap();

    assert_eq!(validated.license.id, LICENSE_ID);
    assert!(validated.status.is_none());
    assert_eq!(authentication.calls(), 0);
}

#[tokio::test]
async fn test_wrong_passphrase_asks_again() {
    let harness = Harness::new().await;
    let authentication = ScriptedAuthentication::new(&[Some("wrong"), Some(PASSPHRASE)]);

    let json = harness.license().without_status_link().build();
    harness
        .service
        .validation(authentication.delegate(), true)
        .validate(json.into_bytes())
        .await
        .unwrap();

    assert_eq!(
        authentication.reasons(),
        vec![
            AuthenticationReason::PassphraseNotFound,
            AuthenticationReason::InvalidPassphrase
        ]
    );
}

#[tokio::test]
async fn test_cancelled_passphrase_request() {
    let harness = Harness::new().await;
    let authentication = ScriptedAuthentication::new(&[Some("wrong"), None]);

    let json = harness.license().without_status_link().build();
    let error = harness
        .service
        .validation(authentication.delegate(), true)
        .validate(json.into_bytes())
        .await
        .unwrap_err();

    assert!(matches!(error, LcpError::Cancelled));
    assert_eq!(
        authentication.reasons(),
        vec![
            AuthenticationReason::PassphraseNotFound,
            AuthenticationReason::InvalidPassphrase
        ]
    );
}

#[tokio::test]
async fn test_no_user_interaction_means_cancelled() {
    let harness = Harness::new().await;
    let authentication = ScriptedAuthentication::new(&[Some(PASSPHRASE)]);

    let json = harness.license().without_status_link().build();
    let error = harness
        .service
        .validation(authentication.delegate(), false)
        .validate(json.into_bytes())
        .await
        .unwrap_err();

    assert!(matches!(error, LcpError::Cancelled));
    assert_eq!(authentication.calls(), 0);
}

#[tokio::test]
async fn test_attempt_limit_gives_invalid_passphrase() {
    let harness = Harness::with_config(|config| config.max_passphrase_attempts(2)).await;
    let authentication =
        ScriptedAuthentication::new(&[Some("wrong"), Some("still wrong"), Some(PASSPHRASE)]);

    let json = harness.license().without_status_link().build();
    let error = harness
        .service
        .validation(authentication.delegate(), true)
        .validate(json.into_bytes())
        .await
        .unwrap_err();

    assert!(matches!(error, LcpError::InvalidPassphrase));
    assert_eq!(authentication.calls(), 2);
}

#[tokio::test]
async fn test_revoked_license_reports_device_count() {
    let harness = Harness::new().await;
    harness.store_passphrase().await;
    let status = harness
        .status("revoked")
        .events(&["register", "register", "renew"])
        .build();
    mount_status(&harness, status, 1).await;
    mount_register(&harness, 200, 0).await;

    let error = harness
        .service
        .validation(None, false)
        .validate(harness.license().build().into_bytes())
        .await
        .unwrap_err();

    match error {
        LcpError::LicenseRevoked { updated, device_count } => {
            assert_eq!(device_count, 2);
            assert_eq!(updated, Some(Utc.with_ymd_and_hms(2014, 3, 1, 12, 0, 0).unwrap()));
        }
        other => panic!("expected LicenseRevoked, got {:?}", other),
    }
}

#[tokio::test]
async fn test_returned_license_is_rejected() {
    let harness = Harness::new().await;
    harness.store_passphrase().await;
    mount_status(&harness, harness.status("returned").build(), 1).await;

    let error = harness
        .service
        .validation(None, false)
        .validate(harness.license().build().into_bytes())
        .await
        .unwrap_err();

    assert!(matches!(error, LcpError::LicenseReturned { .. }));
}

#[tokio::test]
async fn test_active_license_end_to_end() {
    let harness = Harness::new().await;
    let authentication = ScriptedAuthentication::new(&[Some(PASSPHRASE)]);
    mount_status(&harness, harness.status("active").events(&["register"]).build(), 1).await;
    mount_register(&harness, 200, 1).await;
    Mock::given(method("GET"))
        .and(path(license_path()))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.server)
        .await;

    let json = harness.license().build();
    let validated = harness
        .service
        .validation(authentication.delegate(), true)
        .validate(json.clone().into_bytes())
        .await
        .unwrap();

    let status = validated.status.expect("status document");
    assert_eq!(status.status, Status::Active);
    assert_eq!(validated.license.json(), json);
    assert_eq!(harness.crypto.context_calls(), 1);
    assert_eq!(harness.crypto.crls(), vec![SEEDED_CRL.to_string()]);

    let licenses = &harness.components.licenses;
    assert!(licenses.is_device_registered(LICENSE_ID).await.unwrap());
}

#[tokio::test]
async fn test_unreachable_status_server_keeps_license_valid() {
    let harness = Harness::new().await;
    harness.store_passphrase().await;
    Mock::given(method("GET"))
        .and(path(status_path()))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&harness.server)
        .await;

    let validated = harness
        .service
        .validation(None, false)
        .validate(harness.license().build().into_bytes())
        .await
        .unwrap();

    assert!(validated.status.is_none());
}

#[tokio::test]
async fn test_registration_failure_is_not_fatal() {
    let harness = Harness::new().await;
    harness.store_passphrase().await;
    mount_status(&harness, harness.status("ready").build(), 1).await;
    mount_register(&harness, 500, 1).await;

    let validated = harness
        .service
        .validation(None, false)
        .validate(harness.license().build().into_bytes())
        .await
        .unwrap();

    assert_eq!(validated.status.unwrap().status, Status::Ready);
    let licenses = &harness.components.licenses;
    assert!(!licenses.is_device_registered(LICENSE_ID).await.unwrap());
}

#[tokio::test]
async fn test_registration_happens_once() {
    let harness = Harness::new().await;
    harness.store_passphrase().await;
    mount_status(&harness, harness.status("ready").build(), 2).await;
    mount_register(&harness, 200, 1).await;

    let json = harness.license().build();
    for _ in 0..2 {
        harness
            .service
            .validation(None, false)
            .validate(json.clone().into_bytes())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_registration_response_replaces_status() {
    let harness = Harness::new().await;
    harness.store_passphrase().await;
    mount_status(&harness, harness.status("ready").build(), 1).await;
    Mock::given(method("POST"))
        .and(path(register_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(harness.status("active").events(&["register"]).build()),
        )
        .expect(1)
        .mount(&harness.server)
        .await;

    let validated = harness
        .service
        .validation(None, false)
        .validate(harness.license().build().into_bytes())
        .await
        .unwrap();

    let status = validated.status.unwrap();
    assert_eq!(status.status, Status::Active);
    assert_eq!(status.registered_device_count(), 1);
}

#[tokio::test]
async fn test_revoked_registration_response_fails_validation() {
    let harness = Harness::new().await;
    harness.store_passphrase().await;
    mount_status(&harness, harness.status("ready").build(), 1).await;
    Mock::given(method("POST"))
        .and(path(register_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(harness.status("revoked").events(&["register"]).build()),
        )
        .expect(1)
        .mount(&harness.server)
        .await;

    let error = harness
        .service
        .validation(None, false)
        .validate(harness.license().build().into_bytes())
        .await
        .unwrap_err();

    assert!(matches!(error, LcpError::LicenseRevoked { device_count: 1, .. }));
}

#[tokio::test]
async fn test_newer_license_is_fetched_once() {
    let harness = Harness::new().await;
    harness.store_passphrase().await;
    let newer = "2015-01-01T00:00:00Z";
    mount_status(&harness, harness.status("active").license_updated(newer).build(), 1).await;
    mount_register(&harness, 200, 1).await;
    Mock::given(method("GET"))
        .and(path(license_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string(harness.license().updated(newer).build()))
        .expect(1)
        .mount(&harness.server)
        .await;

    let validated = harness
        .service
        .validation(None, false)
        .validate(harness.license().build().into_bytes())
        .await
        .unwrap();

    assert_eq!(
        validated.license.updated,
        Some(Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap())
    );
    assert!(validated.status.is_some());
    assert_eq!(harness.crypto.context_calls(), 2);
}

#[tokio::test]
async fn test_failed_license_fetch_falls_back_to_current_license() {
    let harness = Harness::new().await;
    harness.store_passphrase().await;
    let newer = "2015-01-01T00:00:00Z";
    mount_status(&harness, harness.status("active").license_updated(newer).build(), 1).await;
    mount_register(&harness, 200, 1).await;
    Mock::given(method("GET"))
        .and(path(license_path()))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&harness.server)
        .await;

    let json = harness.license().build();
    let validated = harness
        .service
        .validation(None, false)
        .validate(json.clone().into_bytes())
        .await
        .unwrap();

    assert_eq!(validated.license.json(), json);
    assert_eq!(validated.status.unwrap().status, Status::Active);
}

#[tokio::test]
async fn test_invalid_updated_license_falls_back_to_current_license() {
    let harness = Harness::new().await;
    harness.store_passphrase().await;
    let newer = "2015-01-01T00:00:00Z";
    mount_status(&harness, harness.status("active").license_updated(newer).build(), 1).await;
    mount_register(&harness, 200, 1).await;
    Mock::given(method("GET"))
        .and(path(license_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string(harness.license().updated(newer).build()))
        .expect(1)
        .mount(&harness.server)
        .await;
    harness.crypto.reject_licenses_containing(newer);

    let json = harness.license().build();
    let validated = harness
        .service
        .validation(None, false)
        .validate(json.clone().into_bytes())
        .await
        .unwrap();

    assert_eq!(validated.license.json(), json);
    assert_eq!(harness.crypto.context_calls(), 2);
}

#[tokio::test]
async fn test_updated_license_with_unsupported_profile_falls_back() {
    let harness = Harness::new().await;
    harness.store_passphrase().await;
    let newer = "2015-01-01T00:00:00Z";
    mount_status(&harness, harness.status("active").license_updated(newer).build(), 1).await;
    mount_register(&harness, 200, 1).await;
    let updated = harness
        .license()
        .updated(newer)
        .profile("http://readium.org/lcp/profile-2.0")
        .build();
    Mock::given(method("GET"))
        .and(path(license_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string(updated))
        .expect(1)
        .mount(&harness.server)
        .await;

    let validated = harness
        .service
        .validation(None, false)
        .validate(harness.license().build().into_bytes())
        .await
        .unwrap();

    assert_eq!(validated.license.encryption.profile, BASIC_PROFILE);
}
