//! End-to-end registration and access flows against on-disk stores.

use sharelock_crypto::{CredentialManager, EncryptionSecret};
use sharelock_files::{JsonFileRegistryStore, LocalContentStore, ResourceRegistry};
use sharelock_gateway::{
    AccessDecision, AccessGateway, DenialReason, FileUpload, GatewayError, Locator,
    PlainTextEncoder, RegistrationRequest, UploadPolicy,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn open_gateway(dir: &Path, secret: Option<&str>) -> AccessGateway {
    let store = JsonFileRegistryStore::new(dir.join("registry.json"));
    let registry = ResourceRegistry::open(Arc::new(store)).expect("open registry");
    let content = LocalContentStore::new(dir.join("uploads")).expect("uploads dir");
    let secret = secret.map(|s| EncryptionSecret::new(s).expect("secret"));
    AccessGateway::new(
        Arc::new(registry),
        Arc::new(content),
        CredentialManager::new(secret),
        Arc::new(PlainTextEncoder),
        UploadPolicy::default(),
    )
}

#[test]
fn private_url_requires_its_credential() {
    let dir = TempDir::new().unwrap();
    let gateway = open_gateway(dir.path(), Some("scenario-secret"));

    let receipt = gateway
        .register(RegistrationRequest::for_url("https://example.com").private())
        .unwrap();
    let key = receipt.credential.expect("private registration issues a key");

    let expected = AccessDecision::Granted(Locator::Redirect {
        address: "https://example.com".to_string(),
    });
    assert_eq!(gateway.access(&receipt.id, Some(key.expose())).unwrap(), expected);
    assert_eq!(
        gateway.access(&receipt.id, Some("WRONG")).unwrap(),
        AccessDecision::Denied(DenialReason::CredentialMismatch)
    );
    assert_eq!(
        gateway.access(&receipt.id, None).unwrap(),
        AccessDecision::Denied(DenialReason::CredentialRequired)
    );

    // The stored record holds no plaintext and survives a restart
    let table = std::fs::read_to_string(dir.path().join("registry.json")).unwrap();
    assert!(!table.contains(key.expose()));

    let reopened = open_gateway(dir.path(), Some("scenario-secret"));
    assert_eq!(reopened.access(&receipt.id, Some(key.expose())).unwrap(), expected);

    // A different secret cannot unlock it
    let other = open_gateway(dir.path(), Some("another-secret"));
    assert_eq!(
        other.access(&receipt.id, Some(key.expose())).unwrap(),
        AccessDecision::Denied(DenialReason::CredentialMismatch)
    );
}

#[test]
fn public_file_returns_uploaded_bytes() {
    let dir = TempDir::new().unwrap();
    let gateway = open_gateway(dir.path(), None);
    let bytes = b"%PDF-1.4 quarterly report".to_vec();

    let receipt = gateway
        .register(RegistrationRequest::for_file(FileUpload {
            bytes: bytes.clone(),
            content_type: "application/pdf".to_string(),
            original_name: Some("report.pdf".to_string()),
        }))
        .unwrap();
    assert!(receipt.credential.is_none());

    let locator = match gateway.access(&receipt.id, None).unwrap() {
        AccessDecision::Granted(locator) => locator,
        other => panic!("expected grant, got {:?}", other),
    };
    match &locator {
        Locator::File {
            content_type,
            original_name,
            ..
        } => {
            assert_eq!(content_type, "application/pdf");
            assert_eq!(original_name.as_deref(), Some("report.pdf"));
        }
        other => panic!("expected file locator, got {:?}", other),
    }
    assert_eq!(gateway.read_content(&locator).unwrap(), Some(bytes));
}

#[test]
fn file_and_url_together_is_rejected() {
    let dir = TempDir::new().unwrap();
    let gateway = open_gateway(dir.path(), Some("scenario-secret"));
    gateway
        .register(RegistrationRequest::for_url("https://kept.example"))
        .unwrap();
    let before = gateway.registry().snapshot();

    let err = gateway
        .register(RegistrationRequest {
            file: Some(FileUpload {
                bytes: vec![1, 2, 3],
                content_type: "image/png".to_string(),
                original_name: None,
            }),
            url: Some("https://example.com".to_string()),
            is_private: true,
        })
        .unwrap_err();

    assert!(matches!(err, GatewayError::Validation(_)));
    assert_eq!(gateway.registry().snapshot(), before);
    assert_eq!(
        std::fs::read_dir(dir.path().join("uploads")).unwrap().count(),
        0
    );
}

#[test]
fn private_registration_without_secret_is_refused() {
    let dir = TempDir::new().unwrap();
    let gateway = open_gateway(dir.path(), None);

    let err = gateway
        .register(RegistrationRequest::for_url("https://example.com").private())
        .unwrap_err();

    assert!(matches!(err, GatewayError::Configuration(_)));
    assert!(gateway.registry().is_empty());
    assert!(!dir.path().join("registry.json").exists());
}

#[test]
fn oversized_upload_is_rejected() {
    let dir = TempDir::new().unwrap();
    let gateway = open_gateway(dir.path(), None);
    let limit = gateway.policy().max_bytes;

    let err = gateway
        .register(RegistrationRequest::for_file(FileUpload {
            bytes: vec![0u8; limit as usize + 1],
            content_type: "image/jpeg".to_string(),
            original_name: Some("big.jpg".to_string()),
        }))
        .unwrap_err();

    assert!(matches!(
        err,
        GatewayError::SizeExceeded { actual, .. } if actual == limit + 1
    ));
    assert!(gateway.registry().is_empty());
}
