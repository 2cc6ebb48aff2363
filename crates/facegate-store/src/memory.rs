use crate::{timestamp, IdentityStore, RecognitionLog, StoreError};
use facegate_core::{Embedding, EnrolledIdentity};

/// Volatile store with the same semantics as [`SqliteStore`](crate::SqliteStore).
#[derive(Debug, Default)]
pub struct MemoryStore {
    identities: Vec<EnrolledIdentity>,
    logs: Vec<RecognitionLog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<EnrolledIdentity>, StoreError> {
        Ok(self.identities.clone())
    }

    fn upsert(
        &mut self,
        name: &str,
        embedding: &Embedding,
        sample_count: usize,
    ) -> Result<EnrolledIdentity, StoreError> {
        let now = timestamp();
        match self.identities.iter_mut().find(|i| i.name == name) {
            Some(existing) => {
                existing.embedding = embedding.clone();
                existing.sample_count = sample_count;
                existing.updated_at = now;
                Ok(existing.clone())
            }
            None => {
                let identity = EnrolledIdentity {
                    name: name.to_string(),
                    embedding: embedding.clone(),
                    sample_count,
                    created_at: now.clone(),
                    updated_at: now,
                };
                self.identities.push(identity.clone());
                Ok(identity)
            }
        }
    }

    fn delete(&mut self, name: &str) -> Result<bool, StoreError> {
        let before = self.identities.len();
        self.identities.retain(|i| i.name != name);
        Ok(self.identities.len() != before)
    }

    fn append_log(&mut self, entry: &RecognitionLog) -> Result<(), StoreError> {
        self.logs.push(entry.clone());
        Ok(())
    }

    fn recent_logs(&self, limit: usize) -> Result<Vec<RecognitionLog>, StoreError> {
        Ok(self.logs.iter().rev().take(limit).cloned().collect())
    }
}
