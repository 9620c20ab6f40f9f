//! Upload limits and input validation.

use crate::errors::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Limits applied to uploaded files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_content_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "application/pdf".to_string(),
            ],
        }
    }
}

impl UploadPolicy {
    pub fn new(max_bytes: u64, allowed_content_types: Vec<String>) -> Self {
        Self {
            max_bytes,
            allowed_content_types,
        }
    }

    /// Check a declared content type against the allow-list. Parameters such
    /// as `; charset=...` are ignored and matching is case-insensitive.
    pub fn check_content_type(&self, content_type: &str) -> Result<()> {
        let essence = essence(content_type);
        let allowed = self
            .allowed_content_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&essence));
        if !allowed {
            return Err(GatewayError::UnsupportedContentKind {
                content_type: content_type.to_string(),
            });
        }
        Ok(())
    }

    pub fn check_size(&self, actual: u64) -> Result<()> {
        if actual > self.max_bytes {
            return Err(GatewayError::SizeExceeded {
                limit: self.max_bytes,
                actual,
            });
        }
        Ok(())
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// File extension used when storing content of `content_type`.
pub fn extension_for(content_type: &str) -> &'static str {
    match essence(content_type).as_str() {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "application/pdf" => "pdf",
        "text/plain" => "txt",
        _ => "bin",
    }
}

/// Normalize and validate a URL target. Only absolute `http`/`https`
/// addresses are accepted.
pub fn validate_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::Validation("URL cannot be empty".to_string()));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(GatewayError::Validation(
            "URL contains control characters".to_string(),
        ));
    }
    let parsed = Url::parse(trimmed)
        .map_err(|e| GatewayError::Validation(format!("Invalid URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(GatewayError::Validation(format!(
                "Unsupported URL scheme: {}",
                other
            )))
        }
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(GatewayError::Validation("URL must include a host".to_string()));
    }
    Ok(trimmed.to_string())
}
