//! Whole-table persistence backends for the resource registry.

use crate::record::ResourceRecord;
use crate::registry::RegistryError;
use parking_lot::RwLock;
use sharelock_crypto::ResourceId;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// The full `id -> record` mapping.
pub type RegistryTable = HashMap<ResourceId, ResourceRecord>;

/// Trait for registry storage backends.
///
/// The table is always loaded and written wholesale.
pub trait RegistryStore: Send + Sync {
    /// Load the full table; an absent store yields an empty table.
    fn load_all(&self) -> Result<RegistryTable, RegistryError>;

    /// Replace the stored table with `table`. On return the write is durable.
    fn persist_all(&self, table: &RegistryTable) -> Result<(), RegistryError>;
}

/// Single pretty-printed JSON object on disk, replaced atomically.
#[derive(Debug, Clone)]
pub struct JsonFileRegistryStore {
    path: PathBuf,
}

impl JsonFileRegistryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "registry.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl RegistryStore for JsonFileRegistryStore {
    fn load_all(&self) -> Result<RegistryTable, RegistryError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(RegistryTable::new()),
            Err(err) => return Err(err.into()),
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(RegistryTable::new());
        }
        Ok(serde_json::from_slice(&data)?)
    }

    fn persist_all(&self, table: &RegistryTable) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Sorted output keeps diffs of the file readable.
        let ordered: BTreeMap<&ResourceId, &ResourceRecord> = table.iter().collect();
        let data = serde_json::to_vec_pretty(&ordered)?;

        let tmp = self.temp_path();
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory registry store (for testing and ephemeral deployments).
#[derive(Debug, Default)]
pub struct MemoryRegistryStore {
    table: RwLock<RegistryTable>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing table, as if it had been persisted earlier.
    pub fn with_table(table: RegistryTable) -> Self {
        Self {
            table: RwLock::new(table),
            ..Self::default()
        }
    }

    /// Make subsequent `persist_all` calls fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `persist_all` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl RegistryStore for MemoryRegistryStore {
    fn load_all(&self) -> Result<RegistryTable, RegistryError> {
        Ok(self.table.read().clone())
    }

    fn persist_all(&self, table: &RegistryTable) -> Result<(), RegistryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure").into());
        }
        *self.table.write() = table.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ResourceKind, Visibility};
    use sharelock_crypto::{new_resource_id, CredentialCiphertext};
    use tempfile::TempDir;

    fn sample_table() -> RegistryTable {
        let mut table = RegistryTable::new();
        for i in 0..5 {
            let id = new_resource_id();
            let kind = if i % 2 == 0 {
                ResourceKind::Url {
                    address: format!("https://example.com/{i}"),
                }
            } else {
                ResourceKind::File {
                    storage_path: format!("uploads/{id}.pdf"),
                    original_name: Some(format!("doc{i}.pdf")),
                    content_type: "application/pdf".to_string(),
                    size_bytes: 100 + i,
                }
            };
            let visibility = if i % 3 == 0 {
                Visibility::Private {
                    credential: CredentialCiphertext::from_encoded(format!("cipher{i}")),
                }
            } else {
                Visibility::Public
            };
            table.insert(id, ResourceRecord::new(id, kind, visibility));
        }
        table
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().expect("temp dir");
        let store = JsonFileRegistryStore::new(dir.path().join("absent.json"));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_json_store_roundtrip() {
        let dir = TempDir::new().expect("temp dir");
        let store = JsonFileRegistryStore::new(dir.path().join("nested").join("registry.json"));
        let table = sample_table();

        store.persist_all(&table).unwrap();
        assert_eq!(store.load_all().unwrap(), table);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_json_store_overwrites_wholesale() {
        let dir = TempDir::new().expect("temp dir");
        let store = JsonFileRegistryStore::new(dir.path().join("registry.json"));

        store.persist_all(&sample_table()).unwrap();
        let replacement = sample_table();
        store.persist_all(&replacement).unwrap();

        assert_eq!(store.load_all().unwrap(), replacement);
    }

    #[test]
    fn test_corrupt_file_is_a_serialization_error() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("registry.json");
        fs::write(&path, b"{ not json").unwrap();

        let err = JsonFileRegistryStore::new(&path).load_all().unwrap_err();
        assert!(matches!(err, RegistryError::Serialization(_)));
    }

    #[test]
    fn test_memory_store_fault_injection() {
        let store = MemoryRegistryStore::new();
        store.set_fail_writes(true);
        assert!(store.persist_all(&sample_table()).is_err());
        assert!(store.load_all().unwrap().is_empty());

        store.set_fail_writes(false);
        store.persist_all(&sample_table()).unwrap();
        assert_eq!(store.write_count(), 1);
    }
}
