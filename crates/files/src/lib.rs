//! Sharelock resource registry
//!
//! Provides the persisted `id -> record` table for shared files and URLs,
//! plus the on-disk store for uploaded file content. Records never hold a
//! plaintext credential, only its ciphertext.

pub mod content;
pub mod record;
pub mod registry;
pub mod store;

pub use content::{ContentError, ContentStore, LocalContentStore, MemoryContentStore};
pub use record::{ResourceKind, ResourceRecord, Visibility};
pub use registry::{RegistryError, ResourceRegistry};
pub use store::{JsonFileRegistryStore, MemoryRegistryStore, RegistryStore, RegistryTable};

#[cfg(test)]
mod tests;
