//! Registration and access decisions for shared resources.

use crate::encoder::{CodeEncoder, CodeImage};
use crate::errors::{GatewayError, Result};
use crate::policy::{extension_for, validate_url, UploadPolicy};
use metrics::counter;
use sharelock_crypto::{
    new_credential, new_resource_id, CredentialManager, PlaintextCredential, ResourceId,
};
use sharelock_files::{ContentStore, ResourceKind, ResourceRecord, ResourceRegistry, Visibility};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Uploaded file as received from a client.
#[derive(Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub original_name: Option<String>,
}

impl fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUpload")
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .field("original_name", &self.original_name)
            .finish()
    }
}

/// Input to [`AccessGateway::register`]. Exactly one of `file` or `url`
/// must be set; a blank `url` counts as unset.
#[derive(Debug, Clone, Default)]
pub struct RegistrationRequest {
    pub file: Option<FileUpload>,
    pub url: Option<String>,
    pub is_private: bool,
}

impl RegistrationRequest {
    pub fn for_url(address: impl Into<String>) -> Self {
        Self {
            url: Some(address.into()),
            ..Self::default()
        }
    }

    pub fn for_file(upload: FileUpload) -> Self {
        Self {
            file: Some(upload),
            ..Self::default()
        }
    }

    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }
}

/// Result of a successful registration.
///
/// `credential` is the only copy of the plaintext credential that will ever
/// exist outside the caller; it cannot be recovered later.
#[derive(Debug, Clone)]
pub struct RegistrationReceipt {
    pub id: ResourceId,
    pub code_payload: String,
    pub code_image: CodeImage,
    pub credential: Option<PlaintextCredential>,
}

/// Where a granted request should be served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    File {
        storage_path: String,
        content_type: String,
        original_name: Option<String>,
    },
    Redirect {
        address: String,
    },
}

impl Locator {
    fn from_kind(kind: &ResourceKind) -> Self {
        match kind {
            ResourceKind::File {
                storage_path,
                content_type,
                original_name,
                ..
            } => Locator::File {
                storage_path: storage_path.clone(),
                content_type: content_type.clone(),
                original_name: original_name.clone(),
            },
            ResourceKind::Url { address } => Locator::Redirect {
                address: address.clone(),
            },
        }
    }
}

/// Why an access request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenialReason {
    NotFound,
    CredentialRequired,
    CredentialMismatch,
}

impl DenialReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::NotFound => "not_found",
            DenialReason::CredentialRequired => "credential_required",
            DenialReason::CredentialMismatch => "credential_mismatch",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            DenialReason::NotFound => "Resource not found",
            DenialReason::CredentialRequired => "A private key is required for this resource",
            DenialReason::CredentialMismatch => "Invalid private key",
        };
        f.write_str(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Granted(Locator),
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted(_))
    }

    fn outcome(&self) -> &'static str {
        match self {
            AccessDecision::Granted(_) => "granted",
            AccessDecision::Denied(reason) => reason.code(),
        }
    }
}

/// Front door for registration and access.
pub struct AccessGateway {
    registry: Arc<ResourceRegistry>,
    content: Arc<dyn ContentStore>,
    credentials: CredentialManager,
    encoder: Arc<dyn CodeEncoder>,
    policy: UploadPolicy,
}

impl AccessGateway {
    pub fn new(
        registry: Arc<ResourceRegistry>,
        content: Arc<dyn ContentStore>,
        credentials: CredentialManager,
        encoder: Arc<dyn CodeEncoder>,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            registry,
            content,
            credentials,
            encoder,
            policy,
        }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Whether an encryption secret is configured.
    pub fn private_registrations_enabled(&self) -> bool {
        self.credentials.is_configured()
    }

    /// Register a file or URL and return its code (and credential if private).
    ///
    /// All input validation happens before anything is generated or written.
    pub fn register(&self, request: RegistrationRequest) -> Result<RegistrationReceipt> {
        match self.register_inner(request) {
            Ok(receipt) => Ok(receipt),
            Err(err) => {
                counter!("sharelock_registration_failures_total", "reason" => err.code())
                    .increment(1);
                Err(err)
            }
        }
    }

    fn register_inner(&self, request: RegistrationRequest) -> Result<RegistrationReceipt> {
        let target = Self::validate_target(&self.policy, request.file, request.url)?;

        if request.is_private && !self.credentials.is_configured() {
            return Err(GatewayError::Configuration(
                "private registrations require an encryption secret".to_string(),
            ));
        }

        let id = new_resource_id();
        let (visibility, credential) = if request.is_private {
            let credential = new_credential();
            let ciphertext = self.credentials.encrypt(&credential)?;
            (Visibility::Private { credential: ciphertext }, Some(credential))
        } else {
            (Visibility::Public, None)
        };

        let code_payload = id.to_hex();
        let code_image = self
            .encoder
            .encode(&code_payload)
            .map_err(|e| GatewayError::CodeEncoding(e.to_string()))?;

        let kind = match target {
            Target::File(upload) => {
                let storage_path = self.content.put(
                    &id,
                    extension_for(&upload.content_type),
                    &upload.bytes,
                )?;
                ResourceKind::File {
                    storage_path,
                    original_name: upload.original_name,
                    content_type: upload.content_type,
                    size_bytes: upload.bytes.len() as u64,
                }
            }
            Target::Url(address) => ResourceKind::Url { address },
        };

        let record = ResourceRecord::new(id, kind, visibility);
        let kind_label = record.kind.label();
        let visibility_label = record.visibility.label();
        let stored_path = match &record.kind {
            ResourceKind::File { storage_path, .. } => Some(storage_path.clone()),
            ResourceKind::Url { .. } => None,
        };

        if let Err(err) = self.registry.insert(record) {
            if let Some(path) = stored_path {
                if let Err(cleanup) = self.content.remove(&path) {
                    warn!("Failed to remove content for unregistered {}: {}", id, cleanup);
                }
            }
            return Err(err.into());
        }

        info!(
            "Registered {} resource {} ({})",
            kind_label, id, visibility_label
        );
        counter!(
            "sharelock_registrations_total",
            "kind" => kind_label,
            "visibility" => visibility_label
        )
        .increment(1);

        Ok(RegistrationReceipt {
            id,
            code_payload,
            code_image,
            credential,
        })
    }

    fn validate_target(
        policy: &UploadPolicy,
        file: Option<FileUpload>,
        url: Option<String>,
    ) -> Result<Target> {
        let url = url.filter(|u| !u.trim().is_empty());
        match (file, url) {
            (Some(_), Some(_)) => Err(GatewayError::Validation(
                "Provide either a file or a URL, not both".to_string(),
            )),
            (None, None) => Err(GatewayError::Validation(
                "No file or URL provided".to_string(),
            )),
            (None, Some(url)) => Ok(Target::Url(validate_url(&url)?)),
            (Some(upload), None) => {
                policy.check_content_type(&upload.content_type)?;
                policy.check_size(upload.bytes.len() as u64)?;
                if upload.bytes.is_empty() {
                    return Err(GatewayError::Validation("Uploaded file is empty".to_string()));
                }
                Ok(Target::File(upload))
            }
        }
    }

    /// Decide whether `credential` unlocks resource `id`.
    ///
    /// Public resources ignore the credential. An empty credential counts
    /// as absent. The only error is a private resource with no secret
    /// configured.
    pub fn access(&self, id: &ResourceId, credential: Option<&str>) -> Result<AccessDecision> {
        let decision = self.decide(id, credential)?;
        debug!("Access to {}: {}", id, decision.outcome());
        counter!("sharelock_access_total", "outcome" => decision.outcome()).increment(1);
        Ok(decision)
    }

    /// As [`access`](Self::access), for an identifier that has not been
    /// parsed yet. Malformed identifiers are reported as not found.
    pub fn access_raw(&self, id: &str, credential: Option<&str>) -> Result<AccessDecision> {
        match id.parse::<ResourceId>() {
            Ok(id) => self.access(&id, credential),
            Err(_) => {
                debug!("Access with malformed id: not_found");
                counter!("sharelock_access_total", "outcome" => DenialReason::NotFound.code())
                    .increment(1);
                Ok(AccessDecision::Denied(DenialReason::NotFound))
            }
        }
    }

    fn decide(&self, id: &ResourceId, credential: Option<&str>) -> Result<AccessDecision> {
        let Some(record) = self.registry.lookup(id) else {
            return Ok(AccessDecision::Denied(DenialReason::NotFound));
        };

        match &record.visibility {
            Visibility::Public => Ok(AccessDecision::Granted(Locator::from_kind(&record.kind))),
            Visibility::Private { credential: stored } => {
                let supplied = match credential {
                    Some(c) if !c.is_empty() => c,
                    _ => return Ok(AccessDecision::Denied(DenialReason::CredentialRequired)),
                };
                if self.credentials.verify(supplied, stored)? {
                    Ok(AccessDecision::Granted(Locator::from_kind(&record.kind)))
                } else {
                    Ok(AccessDecision::Denied(DenialReason::CredentialMismatch))
                }
            }
        }
    }

    /// Bytes for a granted file locator, `None` for a redirect.
    pub fn read_content(&self, locator: &Locator) -> Result<Option<Vec<u8>>> {
        match locator {
            Locator::File { storage_path, .. } => Ok(Some(self.content.read(storage_path)?)),
            Locator::Redirect { .. } => Ok(None),
        }
    }

    /// Render the code for an already registered resource.
    pub fn code_for(&self, id: &ResourceId) -> Result<Option<CodeImage>> {
        if self.registry.lookup(id).is_none() {
            return Ok(None);
        }
        self.encoder
            .encode(&id.to_hex())
            .map(Some)
            .map_err(|e| GatewayError::CodeEncoding(e.to_string()))
    }
}

impl fmt::Debug for AccessGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGateway")
            .field("registry", &self.registry)
            .field("private_enabled", &self.credentials.is_configured())
            .field("policy", &self.policy)
            .finish()
    }
}

enum Target {
    File(FileUpload),
    Url(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{EncodeError, PlainTextEncoder};
    use sharelock_crypto::EncryptionSecret;
    use sharelock_files::{MemoryContentStore, MemoryRegistryStore};

    struct FailingEncoder;

    impl CodeEncoder for FailingEncoder {
        fn encode(&self, _payload: &str) -> std::result::Result<CodeImage, EncodeError> {
            Err(EncodeError("renderer unavailable".to_string()))
        }
    }

    struct Fixture {
        gateway: AccessGateway,
        store: Arc<MemoryRegistryStore>,
        content: Arc<MemoryContentStore>,
    }

    fn fixture_with(secret: Option<&str>, encoder: Arc<dyn CodeEncoder>) -> Fixture {
        let store = Arc::new(MemoryRegistryStore::new());
        let content = Arc::new(MemoryContentStore::new());
        let registry = Arc::new(ResourceRegistry::open(store.clone()).unwrap());
        let secret = secret.map(|s| EncryptionSecret::new(s).unwrap());
        let gateway = AccessGateway::new(
            registry,
            content.clone(),
            CredentialManager::new(secret),
            encoder,
            UploadPolicy::default(),
        );
        Fixture {
            gateway,
            store,
            content,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Some("gateway-test-secret"), Arc::new(PlainTextEncoder))
    }

    fn png(len: usize) -> FileUpload {
        FileUpload {
            bytes: vec![7u8; len],
            content_type: "image/png".to_string(),
            original_name: Some("photo.png".to_string()),
        }
    }

    #[test]
    fn test_code_payload_is_the_id() {
        let f = fixture();
        let receipt = f
            .gateway
            .register(RegistrationRequest::for_url("https://example.com"))
            .unwrap();

        assert_eq!(receipt.code_payload, receipt.id.to_hex());
        assert_eq!(receipt.code_image.bytes, receipt.id.to_hex().into_bytes());
        assert!(receipt.credential.is_none());
    }

    #[test]
    fn test_public_ignores_supplied_credential() {
        let f = fixture();
        let receipt = f
            .gateway
            .register(RegistrationRequest::for_url("https://example.com"))
            .unwrap();

        for supplied in [None, Some(""), Some("whatever")] {
            let decision = f.gateway.access(&receipt.id, supplied).unwrap();
            assert_eq!(
                decision,
                AccessDecision::Granted(Locator::Redirect {
                    address: "https://example.com".to_string()
                })
            );
        }
    }

    #[test]
    fn test_private_gating() {
        let f = fixture();
        let receipt = f
            .gateway
            .register(RegistrationRequest::for_file(png(32)).private())
            .unwrap();
        let key = receipt.credential.clone().unwrap();

        assert_eq!(
            f.gateway.access(&receipt.id, None).unwrap(),
            AccessDecision::Denied(DenialReason::CredentialRequired)
        );
        assert_eq!(
            f.gateway.access(&receipt.id, Some("")).unwrap(),
            AccessDecision::Denied(DenialReason::CredentialRequired)
        );
        assert_eq!(
            f.gateway.access(&receipt.id, Some("0000")).unwrap(),
            AccessDecision::Denied(DenialReason::CredentialMismatch)
        );

        let locator = match f.gateway.access(&receipt.id, Some(key.expose())).unwrap() {
            AccessDecision::Granted(locator) => locator,
            other => panic!("expected grant, got {:?}", other),
        };
        assert_eq!(f.gateway.read_content(&locator).unwrap(), Some(vec![7u8; 32]));
    }

    #[test]
    fn test_unknown_and_malformed_ids_are_not_found() {
        let f = fixture();
        assert_eq!(
            f.gateway.access(&new_resource_id(), None).unwrap(),
            AccessDecision::Denied(DenialReason::NotFound)
        );
        assert_eq!(
            f.gateway.access_raw("../etc/passwd", Some("k")).unwrap(),
            AccessDecision::Denied(DenialReason::NotFound)
        );
    }

    #[test]
    fn test_validation_precedes_side_effects() {
        let f = fixture();

        let both = RegistrationRequest {
            file: Some(png(4)),
            url: Some("https://example.com".to_string()),
            is_private: false,
        };
        assert!(matches!(
            f.gateway.register(both),
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            f.gateway.register(RegistrationRequest::default()),
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            f.gateway.register(RegistrationRequest::for_url("   ")),
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            f.gateway.register(RegistrationRequest::for_file(png(0))),
            Err(GatewayError::Validation(_))
        ));

        let html = FileUpload {
            content_type: "text/html".to_string(),
            ..png(4)
        };
        assert!(matches!(
            f.gateway.register(RegistrationRequest::for_file(html)),
            Err(GatewayError::UnsupportedContentKind { .. })
        ));

        assert_eq!(f.store.write_count(), 0);
        assert!(f.content.is_empty());
    }

    #[test]
    fn test_blank_url_with_file_registers_the_file() {
        let f = fixture();
        let request = RegistrationRequest {
            file: Some(png(4)),
            url: Some(String::new()),
            is_private: false,
        };
        let receipt = f.gateway.register(request).unwrap();
        assert!(matches!(
            f.gateway.registry().lookup(&receipt.id).unwrap().kind,
            ResourceKind::File { .. }
        ));
    }

    #[test]
    fn test_private_without_secret_is_configuration_error() {
        let f = fixture_with(None, Arc::new(PlainTextEncoder));
        assert!(!f.gateway.private_registrations_enabled());

        let err = f
            .gateway
            .register(RegistrationRequest::for_url("https://example.com").private())
            .unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
        assert!(f.gateway.registry().is_empty());

        // Public sharing still works without a secret
        assert!(f
            .gateway
            .register(RegistrationRequest::for_url("https://example.com"))
            .is_ok());
    }

    #[test]
    fn test_encoder_failure_creates_no_record() {
        let f = fixture_with(Some("secret"), Arc::new(FailingEncoder));
        let err = f
            .gateway
            .register(RegistrationRequest::for_file(png(8)))
            .unwrap_err();

        assert!(matches!(err, GatewayError::CodeEncoding(_)));
        assert!(f.gateway.registry().is_empty());
        assert!(f.content.is_empty());
    }

    #[test]
    fn test_persistence_failure_rolls_back_content() {
        let f = fixture();
        f.store.set_fail_writes(true);

        let err = f
            .gateway
            .register(RegistrationRequest::for_file(png(8)).private())
            .unwrap_err();

        assert!(matches!(err, GatewayError::Persistence(_)));
        assert!(f.gateway.registry().is_empty());
        assert!(f.content.is_empty());
    }

    #[test]
    fn test_code_for_registered_only() {
        let f = fixture();
        let receipt = f
            .gateway
            .register(RegistrationRequest::for_url("https://example.com"))
            .unwrap();

        assert_eq!(
            f.gateway.code_for(&receipt.id).unwrap(),
            Some(receipt.code_image)
        );
        assert_eq!(f.gateway.code_for(&new_resource_id()).unwrap(), None);
    }
}
