//! Code encoder collaborator.

use std::fmt;

/// Rendered code image.
#[derive(Clone, PartialEq, Eq)]
pub struct CodeImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for CodeImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeImage")
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EncodeError(pub String);

/// Turns a payload string into a scannable image.
pub trait CodeEncoder: Send + Sync {
    fn encode(&self, payload: &str) -> Result<CodeImage, EncodeError>;
}

/// Emits the payload itself as `text/plain`. Used where no image rendering
/// is wanted, such as tests and headless tooling.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextEncoder;

impl CodeEncoder for PlainTextEncoder {
    fn encode(&self, payload: &str) -> Result<CodeImage, EncodeError> {
        Ok(CodeImage {
            content_type: "text/plain".to_string(),
            bytes: payload.as_bytes().to_vec(),
        })
    }
}
