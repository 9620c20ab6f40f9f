//! Storage for uploaded file content.

use parking_lot::RwLock;
use sharelock_crypto::ResourceId;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ContentError {
    #[error("Content I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Storage path {0} is outside the content root")]
    OutsideRoot(String),
    #[error("Content not found: {0}")]
    NotFound(String),
}

/// Trait for uploaded content backends.
pub trait ContentStore: Send + Sync {
    /// Store `bytes` for resource `id`, returning the storage path to record.
    fn put(&self, id: &ResourceId, extension: &str, bytes: &[u8]) -> Result<String, ContentError>;

    /// Read back content previously returned by `put`.
    fn read(&self, storage_path: &str) -> Result<Vec<u8>, ContentError>;

    /// Remove content, used to roll back a registration that failed to persist.
    fn remove(&self, storage_path: &str) -> Result<(), ContentError>;
}

/// Files under a single uploads directory, named `<id>.<ext>`.
#[derive(Debug, Clone)]
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    /// Create the store, creating the uploads directory if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, ContentError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, storage_path: &str) -> Result<PathBuf, ContentError> {
        let path = Path::new(storage_path);
        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || !path.starts_with(&self.root) {
            return Err(ContentError::OutsideRoot(storage_path.to_string()));
        }
        Ok(path.to_path_buf())
    }
}

impl ContentStore for LocalContentStore {
    fn put(&self, id: &ResourceId, extension: &str, bytes: &[u8]) -> Result<String, ContentError> {
        let path = self.root.join(format!("{}.{}", id.to_hex(), extension));
        fs::write(&path, bytes)?;
        Ok(path.to_string_lossy().into_owned())
    }

    fn read(&self, storage_path: &str) -> Result<Vec<u8>, ContentError> {
        let path = self.resolve(storage_path)?;
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ContentError::NotFound(storage_path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn remove(&self, storage_path: &str) -> Result<(), ContentError> {
        let path = self.resolve(storage_path)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory content store (for testing).
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentStore for MemoryContentStore {
    fn put(&self, id: &ResourceId, extension: &str, bytes: &[u8]) -> Result<String, ContentError> {
        let path = format!("memory/{}.{}", id.to_hex(), extension);
        self.blobs.write().insert(path.clone(), bytes.to_vec());
        Ok(path)
    }

    fn read(&self, storage_path: &str) -> Result<Vec<u8>, ContentError> {
        self.blobs
            .read()
            .get(storage_path)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(storage_path.to_string()))
    }

    fn remove(&self, storage_path: &str) -> Result<(), ContentError> {
        self.blobs.write().remove(storage_path);
        Ok(())
    }
}
