use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use facegate_core::{Embedding, EnrolledIdentity};
use facegate_store::{IdentityStore, RecognitionLog, StoreError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Name {0} already exists")]
    Duplicate(String),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Public view of one enrolled identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentitySummary {
    pub name: String,
    pub sample_count: usize,
    pub created_at: String,
    pub updated_at: String,
}

/// The set of enrolled identities, kept in memory and mirrored to a store.
///
/// Readers share the gallery while matching. Writers hold the gallery's
/// write lock across the store call and the in-memory update, so readers see
/// either the old or the new state and a failed write changes nothing.
pub struct Registry {
    identities: RwLock<Vec<EnrolledIdentity>>,
    store: Mutex<Box<dyn IdentityStore>>,
}

impl Registry {
    /// Load every identity from `store`.
    pub fn open(store: Box<dyn IdentityStore>) -> Result<Self, StoreError> {
        let identities = store.load_all()?;
        tracing::info!(count = identities.len(), "identity registry loaded");
        Ok(Self {
            identities: RwLock::new(identities),
            store: Mutex::new(store),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<EnrolledIdentity>> {
        self.identities.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<EnrolledIdentity>> {
        self.identities.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self) -> MutexGuard<'_, Box<dyn IdentityStore>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the current gallery in registration order.
    pub fn with_gallery<R>(&self, f: impl FnOnce(&[EnrolledIdentity]) -> R) -> R {
        f(&self.read())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().iter().any(|i| i.name == name)
    }

    /// Store `embedding` under `name`. An existing entry is replaced in place
    /// when `replace` is set, otherwise the write is refused.
    pub fn upsert(
        &self,
        name: &str,
        embedding: &Embedding,
        sample_count: usize,
        replace: bool,
    ) -> Result<EnrolledIdentity, RegistryError> {
        let mut identities = self.write();
        let existing = identities.iter().position(|i| i.name == name);
        if existing.is_some() && !replace {
            return Err(RegistryError::Duplicate(name.to_string()));
        }

        let stored = self.store().upsert(name, embedding, sample_count)?;
        match existing {
            Some(idx) => identities[idx] = stored.clone(),
            None => identities.push(stored.clone()),
        }
        tracing::debug!(name, replaced = existing.is_some(), "registry updated");
        Ok(stored)
    }

    /// Remove `name`. Returns whether it was enrolled.
    pub fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let mut identities = self.write();
        let removed = self.store().delete(name)?;
        identities.retain(|i| i.name != name);
        Ok(removed)
    }

    /// Enrolled identities ordered by name.
    pub fn list(&self) -> Vec<IdentitySummary> {
        let mut summaries: Vec<IdentitySummary> = self
            .read()
            .iter()
            .map(|i| IdentitySummary {
                name: i.name.clone(),
                sample_count: i.sample_count,
                created_at: i.created_at.clone(),
                updated_at: i.updated_at.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn log(&self, entry: &RecognitionLog) -> Result<(), StoreError> {
        self.store().append_log(entry)
    }

    pub fn recent_logs(&self, limit: usize) -> Result<Vec<RecognitionLog>, StoreError> {
        self.store().recent_logs(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_store::MemoryStore;

    /// Store whose writes always fail.
    struct BrokenStore;

    impl IdentityStore for BrokenStore {
        fn load_all(&self) -> Result<Vec<EnrolledIdentity>, StoreError> {
            Ok(Vec::new())
        }
        fn upsert(
            &mut self,
            _name: &str,
            _embedding: &Embedding,
            _sample_count: usize,
        ) -> Result<EnrolledIdentity, StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
        fn delete(&mut self, _name: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
        fn append_log(&mut self, _entry: &RecognitionLog) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
        fn recent_logs(&self, _limit: usize) -> Result<Vec<RecognitionLog>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn registry() -> Registry {
        Registry::open(Box::new(MemoryStore::new())).unwrap()
    }

    fn emb(v: f32) -> Embedding {
        Embedding::new(vec![v, 0.0])
    }

    #[test]
    fn test_open_loads_existing() {
        let mut store = MemoryStore::new();
        store.upsert("zoe", &emb(1.0), 2).unwrap();
        store.upsert("adam", &emb(2.0), 2).unwrap();
        let reg = Registry::open(Box::new(store)).unwrap();
        assert_eq!(reg.len(), 2);
        let order = reg.with_gallery(|g| g.iter().map(|i| i.name.clone()).collect::<Vec<_>>());
        assert_eq!(order, vec!["zoe", "adam"]);
    }

    #[test]
    fn test_upsert_replace_keeps_position() {
        let reg = registry();
        reg.upsert("alice", &emb(1.0), 2, true).unwrap();
        reg.upsert("bob", &emb(2.0), 2, true).unwrap();
        reg.upsert("alice", &emb(3.0), 3, true).unwrap();

        reg.with_gallery(|g| {
            assert_eq!(g.len(), 2);
            assert_eq!(g[0].name, "alice");
            assert_eq!(g[0].embedding.values[0], 3.0);
            assert_eq!(g[0].sample_count, 3);
        });
    }

    #[test]
    fn test_upsert_without_replace_rejects_duplicate() {
        let reg = registry();
        reg.upsert("alice", &emb(1.0), 2, false).unwrap();
        let err = reg.upsert("alice", &emb(5.0), 2, false).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(ref n) if n == "alice"));
        reg.with_gallery(|g| assert_eq!(g[0].embedding.values[0], 1.0));
    }

    #[test]
    fn test_delete_missing_leaves_registry_unchanged() {
        let reg = registry();
        reg.upsert("alice", &emb(1.0), 2, true).unwrap();
        assert!(!reg.delete("bob").unwrap());
        assert_eq!(reg.len(), 1);
        assert!(reg.delete("alice").unwrap());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_failed_persist_leaves_memory_untouched() {
        let reg = Registry::open(Box::new(BrokenStore)).unwrap();
        let err = reg.upsert("alice", &emb(1.0), 2, true).unwrap_err();
        assert!(matches!(err, RegistryError::Store(_)));
        assert!(reg.is_empty());
        assert!(!reg.contains("alice"));
    }

    #[test]
    fn test_list_sorted_by_name() {
        let reg = registry();
        reg.upsert("carol", &emb(1.0), 2, true).unwrap();
        reg.upsert("alice", &emb(2.0), 4, true).unwrap();
        let names: Vec<_> = reg.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alice", "carol"]);
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        use std::sync::Arc;

        let reg = Arc::new(registry());
        reg.upsert("seed", &emb(0.0), 2, true).unwrap();

        let writer = {
            let reg = Arc::clone(&reg);
            std::thread::spawn(move || {
                for i in 0..50 {
                    reg.upsert(&format!("p{i}"), &emb(i as f32), 2, true).unwrap();
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        reg.with_gallery(|g| {
                            assert!(!g.is_empty());
                            assert!(g.iter().all(|i| i.embedding.dim() == 2));
                        });
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(reg.len(), 51);
    }
}
