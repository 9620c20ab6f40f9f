//! Error types for the access gateway

use sharelock_crypto::CredentialError;
use sharelock_files::{ContentError, RegistryError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unsupported content type: {content_type}")]
    UnsupportedContentKind { content_type: String },

    #[error("Upload of {actual} bytes exceeds the limit of {limit} bytes")]
    SizeExceeded { limit: u64, actual: u64 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Code encoding failed: {0}")]
    CodeEncoding(String),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] RegistryError),

    #[error("Content storage error: {0}")]
    Content(#[from] ContentError),
}

impl GatewayError {
    /// Machine-readable code, shared by API error bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "validation_error",
            GatewayError::UnsupportedContentKind { .. } => "unsupported_content_kind",
            GatewayError::SizeExceeded { .. } => "size_exceeded",
            GatewayError::Configuration(_) => "configuration_error",
            GatewayError::CodeEncoding(_) => "code_encoding_failed",
            GatewayError::Persistence(_) => "persistence_failure",
            GatewayError::Content(_) => "content_error",
        }
    }
}

impl From<CredentialError> for GatewayError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::MissingSecret => GatewayError::Configuration(
                "no encryption secret is configured; private resources are unavailable"
                    .to_string(),
            ),
            CredentialError::Encryption(e) => GatewayError::Configuration(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
