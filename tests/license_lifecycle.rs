//! Opening, renewing and returning a license, and acquiring its publication

mod common;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, TimeZone, Utc};
use common::*;
use lcp_core::{LcpError, License, RenewDelegate, Status};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

/// Opens the license of `harness`, with an active status and a registered device
async fn open_license(harness: &Harness, status_calls: u64) -> (License, std::sync::Arc<MemoryContainer>) {
    harness.store_passphrase().await;
    Mock::given(method("GET"))
        .and(path(status_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string(harness.status("active").build()))
        .expect(status_calls)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(register_path()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&harness.server)
        .await;

    let container = MemoryContainer::new(&harness.license().build());
    let license = harness
        .service
        .retrieve_license(container.clone(), None, false)
        .await
        .unwrap();
    (license, container)
}

struct RenewUntil {
    end: Option<DateTime<Utc>>,
    offered_max: Mutex<Option<Option<DateTime<Utc>>>>,
    pages: Mutex<Vec<Url>>,
}

impl RenewUntil {
    fn new(end: Option<DateTime<Utc>>) -> Self {
        Self {
            end,
            offered_max: Mutex::new(None),
            pages: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RenewDelegate for RenewUntil {
    async fn preferred_end_date(&self, max_end: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        *self.offered_max.lock().unwrap() = Some(max_end);
        self.end
    }

    async fn present_web_page(&self, url: &Url) -> lcp_core::Result<()> {
        self.pages.lock().unwrap().push(url.clone());
        Ok(())
    }
}

// ===== Opening =====

#[tokio::test]
async fn test_retrieve_license_records_rights() {
    let harness = Harness::new().await;
    let (license, container) = open_license(&harness, 1).await;

    assert_eq!(license.status().unwrap().status, Status::Active);
    assert_eq!(license.characters_to_copy_left().await.unwrap(), Some(2048));
    assert_eq!(license.pages_to_print_left().await.unwrap(), Some(10));
    assert!(license.can_copy(2048).await.unwrap());
    assert!(!license.can_copy(2049).await.unwrap());
    assert!(license.can_print(10).await.unwrap());
    assert!(!license.can_print(11).await.unwrap());
    assert_eq!(container.writes(), 0);
}

#[tokio::test]
async fn test_decipher_uses_the_validated_context() {
    let harness = Harness::new().await;
    let (license, _container) = open_license(&harness, 1).await;

    assert_eq!(license.decipher(b"abc").unwrap(), b"cba".to_vec());
}

#[tokio::test]
async fn test_updated_license_is_written_to_container() {
    let harness = Harness::new().await;
    harness.store_passphrase().await;
    let newer = "2015-01-01T00:00:00Z";
    let updated_json = harness.license().updated(newer).build();
    Mock::given(method("GET"))
        .and(path(status_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(harness.status("active").license_updated(newer).build()),
        )
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(register_path()))
        .respond_with(ResponseTemplate::new(200))
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path(license_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string(updated_json.clone()))
        .expect(1)
        .mount(&harness.server)
        .await;

    let container = MemoryContainer::new(&harness.license().build());
    let license = harness
        .service
        .retrieve_license(container.clone(), None, false)
        .await
        .unwrap();

    assert_eq!(container.writes(), 1);
    assert_eq!(container.contents(), updated_json);
    assert_eq!(license.license().json(), updated_json);
}

// ===== Renew =====

#[tokio::test]
async fn test_renew_sends_the_preferred_end_date() {
    let harness = Harness::new().await;
    let (license, _container) = open_license(&harness, 2).await;
    Mock::given(method("POST"))
        .and(path(renew_path()))
        .and(query_param("end", "2029-06-01T00:00:00Z"))
        .and(query_param("name", "Test Reader"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&harness.server)
        .await;

    assert!(license.can_renew());
    let delegate = RenewUntil::new(Some(Utc.with_ymd_and_hms(2029, 6, 1, 0, 0, 0).unwrap()));
    license.renew(&delegate).await.unwrap();

    let max_end = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(*delegate.offered_max.lock().unwrap(), Some(Some(max_end)));
    assert_eq!(license.max_renew_date(), Some(max_end));
}

#[tokio::test]
async fn test_renewal_keeps_a_status_when_status_server_is_down() {
    let harness = Harness::new().await;
    harness.store_passphrase().await;
    Mock::given(method("GET"))
        .and(path(status_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string(harness.status("active").build()))
        .up_to_n_times(1)
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path(status_path()))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(register_path()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path(renew_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(harness.status("active").events(&["register", "renew"]).build()),
        )
        .expect(1)
        .mount(&harness.server)
        .await;

    let container = MemoryContainer::new(&harness.license().build());
    let license = harness
        .service
        .retrieve_license(container, None, false)
        .await
        .unwrap();
    assert!(license.can_renew());
    assert!(license.can_return());

    license.renew(&RenewUntil::new(None)).await.unwrap();

    let status = license.status().expect("status kept after renewal");
    assert_eq!(status.status, Status::Active);
    assert_eq!(status.event_count("renew"), 1);
    assert!(license.can_renew());
    assert!(license.can_return());
    assert_eq!(
        license.max_renew_date(),
        Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_refused_renewal_reports_the_maximum_end_date() {
    let harness = Harness::new().await;
    let (license, _container) = open_license(&harness, 1).await;
    Mock::given(method("POST"))
        .and(path(renew_path()))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&harness.server)
        .await;

    let delegate = RenewUntil::new(Some(Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap()));
    let error = license.renew(&delegate).await.unwrap_err();

    match error {
        LcpError::InvalidRenewalPeriod { max_end } => {
            assert_eq!(max_end, Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()));
        }
        other => panic!("expected InvalidRenewalPeriod, got {:?}", other),
    }
}

#[tokio::test]
async fn test_renew_server_error() {
    let harness = Harness::new().await;
    let (license, _container) = open_license(&harness, 1).await;
    Mock::given(method("POST"))
        .and(path(renew_path()))
        .respond_with(ResponseTemplate::new(500).set_body_string("maintenance"))
        .mount(&harness.server)
        .await;

    let error = license.renew(&RenewUntil::new(None)).await.unwrap_err();
    assert!(matches!(error, LcpError::RenewFailed(message) if message.contains("500")));
}

// ===== Return =====

#[tokio::test]
async fn test_return_updates_the_status() {
    let harness = Harness::new().await;
    let (license, _container) = open_license(&harness, 1).await;
    Mock::given(method("POST"))
        .and(path(return_path()))
        .and(query_param("name", "Test Reader"))
        .respond_with(ResponseTemplate::new(200).set_body_string(harness.status("returned").build()))
        .expect(1)
        .mount(&harness.server)
        .await;

    assert!(license.can_return());
    license.return_publication().await.unwrap();

    assert_eq!(license.status().unwrap().status, Status::Returned);
}

#[tokio::test]
async fn test_second_return_is_refused() {
    let harness = Harness::new().await;
    let (license, _container) = open_license(&harness, 1).await;
    Mock::given(method("POST"))
        .and(path(return_path()))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&harness.server)
        .await;

    let error = license.return_publication().await.unwrap_err();
    assert!(matches!(error, LcpError::AlreadyReturned));
    assert_eq!(license.status().unwrap().status, Status::Active);
}

// ===== Publication =====

#[tokio::test]
async fn test_acquire_publication_checks_hash() {
    let harness = Harness::new().await;
    let content = b"protected publication bytes".to_vec();
    let hash = BASE64.encode(Sha256::digest(&content));
    Mock::given(method("GET"))
        .and(path("/book.epub"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .expect(1)
        .mount(&harness.server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("download.part");
    let json = harness.license().publication(&hash, content.len() as u64).build();

    let acquired = harness
        .service
        .acquire_publication(json.as_bytes(), &destination)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&destination).unwrap(), content);
    assert_eq!(acquired.suggested_filename, format!("{}.epub", LICENSE_ID));
    assert_eq!(acquired.license.id, LICENSE_ID);
}

#[tokio::test]
async fn test_acquire_publication_removes_corrupted_download() {
    let harness = Harness::new().await;
    let content = b"protected publication bytes".to_vec();
    let hash = BASE64.encode(Sha256::digest(b"something else"));
    Mock::given(method("GET"))
        .and(path("/book.epub"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .mount(&harness.server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("download.part");
    let json = harness.license().publication(&hash, content.len() as u64).build();

    let error = harness
        .service
        .acquire_publication(json.as_bytes(), &destination)
        .await
        .unwrap_err();

    assert!(matches!(error, LcpError::PublicationHashMismatch { .. }));
    assert!(!destination.exists());
}
