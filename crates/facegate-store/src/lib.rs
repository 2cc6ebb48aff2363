//! facegate-store: Durable storage for enrolled identities.
//!
//! The engine keeps the whole gallery in memory and mirrors every change
//! through an [`IdentityStore`]. All operations are synchronous and durable
//! on return.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{SecondsFormat, Utc};
use facegate_core::{Embedding, EnrolledIdentity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cannot create database directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("stored embedding for {name} is corrupt ({len} bytes)")]
    CorruptEmbedding { name: String, len: usize },
    #[error("{0}")]
    Unavailable(String),
}

/// One accepted recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionLog {
    pub name: String,
    pub confidence: f32,
    pub timestamp: String,
    /// Free-form tag for the caller that asked (e.g. "cli").
    pub source: String,
}

/// Persistence collaborator for the identity registry.
pub trait IdentityStore: Send {
    /// Every enrolled identity, in registration order.
    fn load_all(&self) -> Result<Vec<EnrolledIdentity>, StoreError>;

    /// Insert or fully replace the identity called `name`. The original
    /// `created_at` survives a replace; `updated_at` is refreshed.
    fn upsert(
        &mut self,
        name: &str,
        embedding: &Embedding,
        sample_count: usize,
    ) -> Result<EnrolledIdentity, StoreError>;

    /// Remove `name`. Returns whether anything was deleted.
    fn delete(&mut self, name: &str) -> Result<bool, StoreError>;

    fn append_log(&mut self, entry: &RecognitionLog) -> Result<(), StoreError>;

    /// Most recent log entries, newest first.
    fn recent_logs(&self, limit: usize) -> Result<Vec<RecognitionLog>, StoreError>;
}

/// Current UTC time as an RFC 3339 string with second precision.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
