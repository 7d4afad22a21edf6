//! SQLite vector store
//!
//! Embeddings are serialized with bincode; metadata is kept as JSON text.
//! Similarity search is a full scan with cosine distance, which is plenty
//! for a course worth of documents.

use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction, params};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

/// File name of the database inside the storage directory
const DB_FILE: &str = "chroma.sqlite3";

/// Metadata equality filter (`{"memory_type": "profile"}`)
pub type Where = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to create storage directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Collection {0} does not exist")]
    CollectionNotFound(String),

    #[error("Record {id} already exists in collection {collection}")]
    DuplicateId { collection: String, id: String },

    #[error("Failed to encode embedding: {0}")]
    Encoding(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// A record to insert
#[derive(Debug, Clone)]
pub struct Record {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: Map<String, Value>,
}

/// A search hit
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub document: String,
    pub metadata: Map<String, Value>,
    /// Cosine distance, `1 - cosine_similarity`
    pub distance: f32,
}

impl QueryHit {
    /// Similarity rounded to three decimals
    pub fn similarity(&self) -> f64 {
        round3(1.0 - self.distance as f64)
    }
}

/// Round to three decimals
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Handle to the database holding every collection
#[derive(Debug)]
pub struct VectorStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl VectorStore {
    /// Open (creating if needed) the store inside `dir`
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Arc<Self>, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(DB_FILE);
        let conn = Connection::open(&path)?;
        Self::init(conn, Some(path))
    }

    /// Open a throwaway in-memory store
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Arc<Self>, StoreError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Arc<Self>, StoreError> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS collections (
                 name TEXT PRIMARY KEY,
                 created_at INTEGER DEFAULT (strftime('%s', 'now'))
             );
             CREATE TABLE IF NOT EXISTS records (
                 collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
                 id TEXT NOT NULL,
                 embedding BLOB NOT NULL,
                 document TEXT NOT NULL,
                 metadata TEXT NOT NULL,
                 created_at INTEGER DEFAULT (strftime('%s', 'now')),
                 PRIMARY KEY (collection, id)
             );",
        )?;

        Ok(Arc::new(Self {
            conn: Mutex::new(conn),
            path,
        }))
    }

    /// Database file location, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Get an existing collection
    pub fn get_collection(self: &Arc<Self>, name: &str) -> Result<Collection, StoreError> {
        if !self.exists(name)? {
            return Err(StoreError::CollectionNotFound(name.to_string()));
        }
        Ok(Collection {
            store: Arc::clone(self),
            name: name.to_string(),
        })
    }

    /// Get a collection, creating it when missing
    pub fn get_or_create_collection(
        self: &Arc<Self>,
        name: &str,
    ) -> Result<Collection, StoreError> {
        self.lock()?.execute(
            "INSERT OR IGNORE INTO collections (name) VALUES (?1)",
            params![name],
        )?;
        Ok(Collection {
            store: Arc::clone(self),
            name: name.to_string(),
        })
    }

    /// Replace a collection's contents with `records` in one transaction
    ///
    /// The collection is created when missing. On any error the previous
    /// contents are kept.
    pub fn replace_collection(
        self: &Arc<Self>,
        name: &str,
        records: &[Record],
    ) -> Result<(Collection, usize), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM records WHERE collection = ?1", params![name])?;
        tx.execute(
            "INSERT OR IGNORE INTO collections (name) VALUES (?1)",
            params![name],
        )?;
        let added = insert_records(&tx, name, records)?;
        tx.commit()?;
        debug!("Replaced {} records in {} with {}", removed, name, added);

        Ok((
            Collection {
                store: Arc::clone(self),
                name: name.to_string(),
            },
            added,
        ))
    }

    /// Names of all collections
    pub fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

/// A named collection inside a [`VectorStore`]
#[derive(Clone, Debug)]
pub struct Collection {
    store: Arc<VectorStore>,
    name: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert records. Ids must be new; the whole batch is rejected otherwise.
    pub fn add(&self, records: Vec<Record>) -> Result<usize, StoreError> {
        let mut conn = self.store.lock()?;
        let tx = conn.transaction()?;
        let added = insert_records(&tx, &self.name, &records)?;
        tx.commit()?;
        debug!("Added {} records to {}", added, self.name);
        Ok(added)
    }

    /// Number of records
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.store.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// The `n_results` records closest to `embedding`, nearest first
    ///
    /// `filter` keeps only records whose metadata has every listed key with an
    /// equal value.
    pub fn query(
        &self,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&Where>,
    ) -> Result<Vec<QueryHit>, StoreError> {
        if n_results == 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<(String, Vec<u8>, String, String)> = {
            let conn = self.store.lock()?;
            let mut stmt = conn.prepare(
                "SELECT id, embedding, document, metadata FROM records
                 WHERE collection = ?1 ORDER BY rowid",
            )?;
            stmt.query_map(params![self.name], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<_>, _>>()?
        };

        let mut hits: Vec<QueryHit> = rows
            .into_iter()
            .filter_map(|(id, blob, document, metadata)| {
                let metadata = match serde_json::from_str::<Value>(&metadata) {
                    Ok(Value::Object(map)) => map,
                    _ => Map::new(),
                };
                if let Some(filter) = filter {
                    if !filter.iter().all(|(k, v)| metadata.get(k) == Some(v)) {
                        return None;
                    }
                }
                let stored: Vec<f32> = bincode::deserialize(&blob).ok()?;
                let distance = 1.0 - cosine_similarity(embedding, &stored);
                Some(QueryHit {
                    id,
                    document,
                    metadata,
                    distance,
                })
            })
            .collect();

        // stable sort keeps insertion order among equal distances
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n_results);
        Ok(hits)
    }
}

/// Insert `records` into `collection` inside an open transaction
fn insert_records(
    tx: &Transaction<'_>,
    collection: &str,
    records: &[Record],
) -> Result<usize, StoreError> {
    for record in records {
        let blob = bincode::serialize(&record.embedding)
            .map_err(|e| StoreError::Encoding(e.to_string()))?;
        let metadata = Value::Object(record.metadata.clone()).to_string();

        let result = tx.execute(
            "INSERT INTO records (collection, id, embedding, document, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![collection, record.id, blob, record.document, metadata],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::DuplicateId {
                    collection: collection.to_string(),
                    id: record.id.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(records.len())
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
