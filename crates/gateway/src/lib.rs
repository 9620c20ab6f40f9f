//! Access gateway for shareable resources.
//!
//! Registration turns an uploaded file or an external URL into a
//! [`ResourceRecord`](sharelock_files::ResourceRecord), optionally gated by a
//! one-time credential, and returns the scannable code for its identifier.
//! Access resolves an identifier plus an optional credential into either a
//! [`Locator`] or a [`DenialReason`].

pub mod encoder;
pub mod errors;
pub mod gateway;
pub mod policy;

pub use encoder::{CodeEncoder, CodeImage, EncodeError, PlainTextEncoder};
pub use errors::*;
pub use gateway::{
    AccessDecision, AccessGateway, DenialReason, FileUpload, Locator, RegistrationReceipt,
    RegistrationRequest,
};
pub use policy::{validate_url, UploadPolicy};
