//! Resource record data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sharelock_crypto::{CredentialCiphertext, ResourceId};

/// What a registered identifier resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResourceKind {
    /// Uploaded file kept in the content store.
    File {
        storage_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original_name: Option<String>,
        content_type: String,
        size_bytes: u64,
    },
    /// External address the access endpoint redirects to.
    Url { address: String },
}

impl ResourceKind {
    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::File { .. } => "file",
            ResourceKind::Url { .. } => "url",
        }
    }
}

/// Access gating of a record. The ciphertext lives inside `Private`, so a
/// public record cannot carry one and a private record cannot lack one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "visibility", rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private { credential: CredentialCiphertext },
}

impl Visibility {
    pub fn is_private(&self) -> bool {
        matches!(self, Visibility::Private { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private { .. } => "private",
        }
    }
}

/// Persisted metadata for one shared resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Identifier, assigned at creation.
    pub id: ResourceId,

    /// File or URL target.
    pub kind: ResourceKind,

    /// Public or credential-gated.
    #[serde(flatten)]
    pub visibility: Visibility,

    /// Creation timestamp, informational only.
    pub created_at: DateTime<Utc>,
}

impl ResourceRecord {
    /// Create a record stamped with the current time.
    pub fn new(id: ResourceId, kind: ResourceKind, visibility: Visibility) -> Self {
        Self::new_at_time(id, kind, visibility, Utc::now())
    }

    /// Create a record with an explicit timestamp (for testing/reconstruction).
    pub fn new_at_time(
        id: ResourceId,
        kind: ResourceKind,
        visibility: Visibility,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            visibility,
            created_at,
        }
    }

    /// Validate the record fields.
    pub fn validate(&self) -> Result<(), String> {
        match &self.kind {
            ResourceKind::File {
                storage_path,
                content_type,
                size_bytes,
                ..
            } => {
                if storage_path.is_empty() {
                    return Err("Storage path cannot be empty".to_string());
                }
                if *size_bytes == 0 {
                    return Err("File size cannot be zero".to_string());
                }
                if content_type.is_empty() || content_type.len() > 128 {
                    return Err("Content type must be 1-128 characters".to_string());
                }
            }
            ResourceKind::Url { address } => {
                if address.trim().is_empty() {
                    return Err("URL address cannot be empty".to_string());
                }
            }
        }

        if let Visibility::Private { credential } = &self.visibility {
            if credential.as_str().is_empty() {
                return Err("Private record requires a credential ciphertext".to_string());
            }
        }

        Ok(())
    }
}
