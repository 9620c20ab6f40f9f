//! Resource registry: the in-process view of the persisted table.

use crate::record::ResourceRecord;
use crate::store::{RegistryStore, RegistryTable};
use parking_lot::{Mutex, RwLock};
use sharelock_crypto::ResourceId;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry errors
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("Registry persistence failed: {0}")]
    Persistence(#[from] std::io::Error),
    #[error("Registry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Resource {0} is already registered")]
    DuplicateId(ResourceId),
    #[error("Invalid resource record: {0}")]
    InvalidRecord(String),
}

/// Append-only `id -> record` registry backed by a whole-table store.
///
/// Inserts are serialized by a writer mutex spanning clone, insert, persist
/// and publish, so a later whole-table write can never drop an earlier
/// insert. Lookups only take the read lock and observe either the table
/// before or after a completed insert.
pub struct ResourceRegistry {
    store: Arc<dyn RegistryStore>,
    table: RwLock<Arc<RegistryTable>>,
    writer: Mutex<()>,
}

impl ResourceRegistry {
    /// Load the registry from `store`.
    pub fn open(store: Arc<dyn RegistryStore>) -> Result<Self, RegistryError> {
        let table = store.load_all()?;
        debug!("Loaded {} resource records", table.len());
        Ok(Self {
            store,
            table: RwLock::new(Arc::new(table)),
            writer: Mutex::new(()),
        })
    }

    /// Add a record and persist the full table.
    ///
    /// When this returns `Ok` the record is durable; on error nothing is
    /// published and the stored table is unchanged.
    pub fn insert(&self, record: ResourceRecord) -> Result<(), RegistryError> {
        record.validate().map_err(RegistryError::InvalidRecord)?;

        let _writer = self.writer.lock();
        let current = self.table.read().clone();
        if current.contains_key(&record.id) {
            return Err(RegistryError::DuplicateId(record.id));
        }

        let mut next = RegistryTable::clone(&current);
        let id = record.id;
        next.insert(id, record);

        if let Err(err) = self.store.persist_all(&next) {
            warn!("Failed to persist registry after inserting {}: {}", id, err);
            return Err(err);
        }

        *self.table.write() = Arc::new(next);
        Ok(())
    }

    /// Retrieve a record by ID.
    pub fn lookup(&self, id: &ResourceId) -> Option<ResourceRecord> {
        self.table.read().get(id).cloned()
    }

    /// Count registered resources.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone of the current table.
    pub fn snapshot(&self) -> RegistryTable {
        RegistryTable::clone(&self.table.read())
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("records", &self.len())
            .finish()
    }
}
