//! Tests for the files crate.

#[cfg(test)]
mod integration_tests {
    use crate::record::{ResourceKind, ResourceRecord, Visibility};
    use crate::registry::ResourceRegistry;
    use crate::store::{JsonFileRegistryStore, RegistryStore};
    use crate::content::{ContentStore, LocalContentStore};
    use sharelock_crypto::{new_resource_id, CredentialCiphertext};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn open_registry(dir: &TempDir) -> ResourceRegistry {
        let store = JsonFileRegistryStore::new(dir.path().join("registry.json"));
        ResourceRegistry::open(Arc::new(store)).expect("open registry")
    }

    #[test]
    fn test_full_workflow() {
        let dir = TempDir::new().expect("temp dir");
        let content = LocalContentStore::new(dir.path().join("uploads")).unwrap();

        // Upload content and register it privately
        let id = new_resource_id();
        let bytes = b"%PDF-1.7 sharelock";
        let storage_path = content.put(&id, "pdf", bytes).unwrap();
        let record = ResourceRecord::new(
            id,
            ResourceKind::File {
                storage_path: storage_path.clone(),
                original_name: Some("report.pdf".to_string()),
                content_type: "application/pdf".to_string(),
                size_bytes: bytes.len() as u64,
            },
            Visibility::Private {
                credential: CredentialCiphertext::from_encoded("ZW5jcnlwdGVk"),
            },
        );

        {
            let registry = open_registry(&dir);
            registry.insert(record.clone()).unwrap();
        }

        // A fresh process sees the same record and content
        let registry = open_registry(&dir);
        assert_eq!(registry.lookup(&id), Some(record));
        assert_eq!(content.read(&storage_path).unwrap(), bytes);
    }

    #[test]
    fn test_persisted_table_roundtrip_matches_registry() {
        let dir = TempDir::new().expect("temp dir");
        let registry = open_registry(&dir);

        for i in 0..20 {
            let visibility = if i % 2 == 0 {
                Visibility::Public
            } else {
                Visibility::Private {
                    credential: CredentialCiphertext::from_encoded(format!("c{i}")),
                }
            };
            let record = ResourceRecord::new(
                new_resource_id(),
                ResourceKind::Url {
                    address: format!("https://example.com/{i}"),
                },
                visibility,
            );
            registry.insert(record).unwrap();
        }

        let store = JsonFileRegistryStore::new(dir.path().join("registry.json"));
        assert_eq!(store.load_all().unwrap(), registry.snapshot());
    }

    #[test]
    fn test_concurrent_inserts_are_not_lost() {
        let dir = TempDir::new().expect("temp dir");
        let registry = Arc::new(open_registry(&dir));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..10 {
                        let record = ResourceRecord::new(
                            new_resource_id(),
                            ResourceKind::Url {
                                address: format!("https://example.com/{worker}/{i}"),
                            },
                            Visibility::Public,
                        );
                        registry.insert(record).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("worker thread");
        }

        assert_eq!(registry.len(), 80);
        let reopened = open_registry(&dir);
        assert_eq!(reopened.len(), 80);
        assert_eq!(reopened.snapshot(), registry.snapshot());
    }
}
