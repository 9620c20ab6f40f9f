//! Sharelock cryptographic primitives
//!
//! Identifier and credential generation, plus encryption-at-rest of
//! credentials issued for private resources.

pub mod credentials;
pub mod encryption;
pub mod identifiers;

pub use credentials::{
    encrypt, verify, CredentialCiphertext, CredentialError, CredentialManager, EncryptionSecret,
};
pub use encryption::{constant_time_eq, EncryptionError, AES256GCM};
pub use identifiers::{new_credential, new_resource_id, PlaintextCredential, ResourceId};
