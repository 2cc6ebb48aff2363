use std::path::Path;

use facegate_core::{Embedding, EnrolledIdentity};
use rusqlite::{params, Connection};

use crate::{timestamp, IdentityStore, RecognitionLog, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS faces (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL UNIQUE,
    encoding      BLOB NOT NULL,
    model_version TEXT,
    images_count  INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS recognition_logs (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL,
    confidence REAL NOT NULL,
    timestamp  TEXT NOT NULL,
    source     TEXT NOT NULL DEFAULT ''
);
";

/// SQLite-backed identity store.
///
/// Embeddings are stored as packed little-endian `f32` blobs.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "identity database opened");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

fn encode_values(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_values(name: &str, blob: &[u8]) -> Result<Vec<f32>, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::CorruptEmbedding {
            name: name.to_string(),
            len: blob.len(),
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

struct FaceRow {
    name: String,
    blob: Vec<u8>,
    model_version: Option<String>,
    images_count: i64,
    created_at: String,
    updated_at: String,
}

impl FaceRow {
    fn into_identity(self) -> Result<EnrolledIdentity, StoreError> {
        let values = decode_values(&self.name, &self.blob)?;
        Ok(EnrolledIdentity {
            name: self.name,
            embedding: Embedding {
                values,
                model_version: self.model_version,
            },
            sample_count: self.images_count.max(0) as usize,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl IdentityStore for SqliteStore {
    fn load_all(&self) -> Result<Vec<EnrolledIdentity>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, encoding, model_version, images_count, created_at, updated_at
             FROM faces ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(FaceRow {
                name: row.get(0)?,
                blob: row.get(1)?,
                model_version: row.get(2)?,
                images_count: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?;

        let mut identities = Vec::new();
        for row in rows {
            identities.push(row?.into_identity()?);
        }
        Ok(identities)
    }

    fn upsert(
        &mut self,
        name: &str,
        embedding: &Embedding,
        sample_count: usize,
    ) -> Result<EnrolledIdentity, StoreError> {
        let now = timestamp();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO faces (name, encoding, model_version, images_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(name) DO UPDATE SET
                encoding = excluded.encoding,
                model_version = excluded.model_version,
                images_count = excluded.images_count,
                updated_at = excluded.updated_at",
            params![
                name,
                encode_values(&embedding.values),
                embedding.model_version,
                sample_count as i64,
                now,
            ],
        )?;
        let created_at: String = tx.query_row(
            "SELECT created_at FROM faces WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        tx.commit()?;

        Ok(EnrolledIdentity {
            name: name.to_string(),
            embedding: embedding.clone(),
            sample_count,
            created_at,
            updated_at: now,
        })
    }

    fn delete(&mut self, name: &str) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM faces WHERE name = ?1", params![name])?;
        Ok(removed > 0)
    }

    fn append_log(&mut self, entry: &RecognitionLog) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO recognition_logs (name, confidence, timestamp, source)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.name, entry.confidence as f64, entry.timestamp, entry.source],
        )?;
        Ok(())
    }

    fn recent_logs(&self, limit: usize) -> Result<Vec<RecognitionLog>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, confidence, timestamp, source
             FROM recognition_logs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(RecognitionLog {
                name: row.get(0)?,
                confidence: row.get::<_, f64>(1)? as f32,
                timestamp: row.get(2)?,
                source: row.get(3)?,
            })
        })?;
        let logs = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }
}
