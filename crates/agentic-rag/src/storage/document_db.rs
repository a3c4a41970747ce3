//! SQLite store for documents, chunks, and embeddings
//!
//! Vectors live in BLOB columns and are scored in process. Search scans every
//! embedding of the requested model, which is fine for the corpus sizes this
//! store targets.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::providers::DocumentStore;
use crate::retrieval::DistanceMetric;
use crate::types::{
    Chunk, Document, DocumentStatus, Embedding, NewChunk, NewDocument, ScoredChunk,
};
use crate::util::estimate_tokens;

use super::columns::{
    enum_from_sql, metadata_from_sql, time_from_sql, time_to_sql, uuid_from_sql,
    vector_from_blob, vector_to_blob,
};

const CHUNK_COLUMNS: &str = "c.id, c.document_id, c.chunk_index, c.content, c.token_count, \
     c.start_char, c.end_char, c.metadata, c.created_at";

/// SQLite-backed knowledge base
#[derive(Clone)]
pub struct DocumentDb {
    conn: Arc<Mutex<Connection>>,
}

impl DocumentDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        tracing::info!("Document database ready at {}", path.display());
        Ok(db)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            PRAGMA busy_timeout=5000;
        "#,
        )?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT,
                source TEXT,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL UNIQUE,
                document_type TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                start_char INTEGER,
                end_char INTEGER,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
                UNIQUE(document_id, chunk_index)
            );

            CREATE TABLE IF NOT EXISTS embedding_models (
                model_name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS embeddings (
                id TEXT PRIMARY KEY,
                chunk_id TEXT NOT NULL,
                model_name TEXT NOT NULL,
                vector BLOB NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE,
                FOREIGN KEY (model_name) REFERENCES embedding_models(model_name),
                UNIQUE(chunk_id, model_name)
            );

            CREATE INDEX IF NOT EXISTS idx_embeddings_model ON embeddings(model_name);
        "#,
        )?;

        Ok(())
    }

    // ---- documents ----

    /// Register a document. Identical content is a conflict.
    pub fn insert_document(&self, new: NewDocument) -> Result<Document> {
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4(),
            content_hash: new.content_hash(),
            title: new.title,
            source: new.source,
            content: new.content,
            document_type: new.document_type,
            status: DocumentStatus::Pending,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO documents (id, title, source, content, content_hash, document_type,
                                    status, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                document.id.to_string(),
                document.title,
                document.source,
                document.content,
                document.content_hash,
                document.document_type,
                document.status.as_str(),
                serde_json::to_string(&document.metadata)?,
                time_to_sql(&now),
                time_to_sql(&now),
            ],
        )
        .map_err(|e| {
            if is_constraint(&e) {
                Error::conflict(format!(
                    "Document with content hash {} already exists",
                    document.content_hash
                ))
            } else {
                e.into()
            }
        })?;

        tracing::info!("Registered document {} ({})", document.id, document.content_hash);
        Ok(document)
    }

    /// Look up a document
    pub fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let document = conn
            .query_row(
                "SELECT id, title, source, content, content_hash, document_type, status,
                        metadata, created_at, updated_at
                 FROM documents WHERE id = ?1",
                params![id.to_string()],
                row_to_document,
            )
            .optional()?;
        Ok(document)
    }

    /// Update a document's lifecycle status
    pub fn set_document_status(&self, id: Uuid, status: DocumentStatus) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE documents SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), time_to_sql(&Utc::now()), id.to_string()],
        )?;
        if updated == 0 {
            return Err(Error::not_found("Document", id));
        }
        Ok(())
    }

    /// Delete a document with its chunks and embeddings
    pub fn delete_document(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;
        if deleted == 0 {
            return Err(Error::not_found("Document", id));
        }
        tracing::info!("Deleted document {}", id);
        Ok(())
    }

    // ---- chunks ----

    /// Append chunks after the document's last chunk, keeping indices contiguous
    pub fn append_chunks(&self, document_id: Uuid, chunks: Vec<NewChunk>) -> Result<Vec<Chunk>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM documents WHERE id = ?1",
                params![document_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(Error::not_found("Document", document_id));
        }

        let next_index: i64 = tx.query_row(
            "SELECT COALESCE(MAX(chunk_index) + 1, 0) FROM chunks WHERE document_id = ?1",
            params![document_id.to_string()],
            |row| row.get(0),
        )?;

        let now = Utc::now();
        let mut stored = Vec::with_capacity(chunks.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (id, document_id, chunk_index, content, token_count,
                                     start_char, end_char, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;

            for (offset, new) in chunks.into_iter().enumerate() {
                let chunk = Chunk {
                    id: Uuid::new_v4(),
                    document_id,
                    chunk_index: (next_index as u32) + offset as u32,
                    token_count: estimate_tokens(&[&new.content]),
                    content: new.content,
                    start_char: new.start_char,
                    end_char: new.end_char,
                    metadata: new.metadata,
                    created_at: now,
                };
                stmt.execute(params![
                    chunk.id.to_string(),
                    document_id.to_string(),
                    chunk.chunk_index as i64,
                    chunk.content,
                    chunk.token_count as i64,
                    chunk.start_char.map(|c| c as i64),
                    chunk.end_char.map(|c| c as i64),
                    serde_json::to_string(&chunk.metadata)?,
                    time_to_sql(&now),
                ])?;
                stored.push(chunk);
            }
        }

        tx.execute(
            "UPDATE documents SET updated_at = ?1 WHERE id = ?2",
            params![time_to_sql(&now), document_id.to_string()],
        )?;
        tx.commit()?;

        tracing::debug!("Appended {} chunks to document {}", stored.len(), document_id);
        Ok(stored)
    }

    /// Chunks of a document by index
    pub fn chunks_for_document(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chunks c WHERE c.document_id = ?1 ORDER BY c.chunk_index ASC",
            CHUNK_COLUMNS
        ))?;
        let chunks = stmt
            .query_map(params![document_id.to_string()], |row| row_to_chunk(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    /// Look up one chunk
    pub fn chunk(&self, id: Uuid) -> Result<Option<Chunk>> {
        let conn = self.conn.lock();
        let chunk = conn
            .query_row(
                &format!("SELECT {} FROM chunks c WHERE c.id = ?1", CHUNK_COLUMNS),
                params![id.to_string()],
                |row| row_to_chunk(row, 0),
            )
            .optional()?;
        Ok(chunk)
    }

    // ---- embeddings ----

    /// Register a model with its vector dimension.
    ///
    /// Re-registering with the same dimension is a no-op.
    pub fn register_model(&self, model: &str, dimension: usize) -> Result<()> {
        if model.trim().is_empty() {
            return Err(Error::invalid_field("model", "model cannot be empty"));
        }
        if dimension == 0 {
            return Err(Error::invalid_field("dimension", "dimension must be positive"));
        }
        let conn = self.conn.lock();
        ensure_model(&conn, model, dimension)
    }

    /// Dimension registered for a model
    pub fn model_dimension(&self, model: &str) -> Result<Option<usize>> {
        let conn = self.conn.lock();
        registered_dimension(&conn, model)
    }

    /// Store a new embedding. A second vector for the same `(chunk, model)` is a conflict.
    pub fn insert_embedding(&self, chunk_id: Uuid, model: &str, vector: Vec<f32>) -> Result<Embedding> {
        self.write_embedding(chunk_id, model, vector, false)
    }

    /// Store an embedding, replacing any existing vector for the same `(chunk, model)`
    pub fn upsert_embedding(&self, chunk_id: Uuid, model: &str, vector: Vec<f32>) -> Result<Embedding> {
        self.write_embedding(chunk_id, model, vector, true)
    }

    fn write_embedding(
        &self,
        chunk_id: Uuid,
        model: &str,
        vector: Vec<f32>,
        replace: bool,
    ) -> Result<Embedding> {
        if vector.is_empty() {
            return Err(Error::invalid_field("vector", "vector cannot be empty"));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::invalid_field("vector", "vector must contain only finite values"));
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let chunk_exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM chunks WHERE id = ?1",
                params![chunk_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if chunk_exists.is_none() {
            return Err(Error::not_found("Chunk", chunk_id));
        }
        ensure_model(&tx, model, vector.len())?;

        let now = Utc::now();
        let sql = if replace {
            "INSERT INTO embeddings (id, chunk_id, model_name, vector, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(chunk_id, model_name)
             DO UPDATE SET vector = excluded.vector, created_at = excluded.created_at"
        } else {
            "INSERT INTO embeddings (id, chunk_id, model_name, vector, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)"
        };
        tx.execute(
            sql,
            params![
                Uuid::new_v4().to_string(),
                chunk_id.to_string(),
                model,
                vector_to_blob(&vector),
                time_to_sql(&now),
            ],
        )
        .map_err(|e| {
            if is_constraint(&e) {
                Error::conflict(format!(
                    "Chunk {} already has an embedding for model '{}'",
                    chunk_id, model
                ))
            } else {
                e.into()
            }
        })?;

        let embedding = tx.query_row(
            "SELECT id, chunk_id, model_name, vector, created_at
             FROM embeddings WHERE chunk_id = ?1 AND model_name = ?2",
            params![chunk_id.to_string(), model],
            row_to_embedding,
        )?;
        tx.commit()?;

        Ok(embedding)
    }

    /// Look up the embedding of a chunk for one model
    pub fn get_embedding(&self, chunk_id: Uuid, model: &str) -> Result<Option<Embedding>> {
        let conn = self.conn.lock();
        let embedding = conn
            .query_row(
                "SELECT id, chunk_id, model_name, vector, created_at
                 FROM embeddings WHERE chunk_id = ?1 AND model_name = ?2",
                params![chunk_id.to_string(), model],
                row_to_embedding,
            )
            .optional()?;
        Ok(embedding)
    }

    /// Score every embedding of `model` and keep the best `k`
    pub fn search(
        &self,
        vector: &[f32],
        model: &str,
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredChunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT e.vector, {} FROM embeddings e
             JOIN chunks c ON c.id = e.chunk_id
             WHERE e.model_name = ?1",
            CHUNK_COLUMNS
        ))?;

        let mut scored = Vec::new();
        let mut rows = stmt.query(params![model])?;
        while let Some(row) = rows.next()? {
            let blob: Vec<u8> = row.get(0)?;
            let candidate = vector_from_blob(0, &blob)?;
            if candidate.len() != vector.len() {
                tracing::warn!("Skipping embedding with {} dimensions for {}", candidate.len(), model);
                continue;
            }
            scored.push(ScoredChunk {
                chunk: row_to_chunk(row, 1)?,
                model_name: model.to_string(),
                score: metric.score(vector, &candidate),
            });
        }

        metric.rank(&mut scored);
        scored.truncate(k);
        Ok(scored)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DocumentDbStats> {
        let conn = self.conn.lock();
        let count = |sql: &str| -> Result<u64> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };

        Ok(DocumentDbStats {
            documents: count("SELECT COUNT(*) FROM documents")?,
            chunks: count("SELECT COUNT(*) FROM chunks")?,
            embeddings: count("SELECT COUNT(*) FROM embeddings")?,
            models: count("SELECT COUNT(*) FROM embedding_models")?,
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&DocumentDb) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }
}

/// Row counts across the knowledge base tables
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DocumentDbStats {
    pub documents: u64,
    pub chunks: u64,
    pub embeddings: u64,
    pub models: u64,
}

fn is_constraint(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}

fn registered_dimension(conn: &Connection, model: &str) -> Result<Option<usize>> {
    let dimension: Option<i64> = conn
        .query_row(
            "SELECT dimension FROM embedding_models WHERE model_name = ?1",
            params![model],
            |row| row.get(0),
        )
        .optional()?;
    Ok(dimension.map(|d| d as usize))
}

/// Register `model` if unknown, otherwise require the same dimension
fn ensure_model(conn: &Connection, model: &str, dimension: usize) -> Result<()> {
    match registered_dimension(conn, model)? {
        Some(existing) if existing == dimension => Ok(()),
        Some(existing) => Err(Error::invalid_field(
            "vector",
            format!(
                "model '{}' uses {} dimensions, got {}",
                model, existing, dimension
            ),
        )),
        None => {
            conn.execute(
                "INSERT INTO embedding_models (model_name, dimension, created_at) VALUES (?1, ?2, ?3)",
                params![model, dimension as i64, time_to_sql(&Utc::now())],
            )?;
            tracing::info!("Registered embedding model {} ({} dimensions)", model, dimension);
            Ok(())
        }
    }
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let id: String = row.get(0)?;
    let status: String = row.get(6)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(Document {
        id: uuid_from_sql(0, &id)?,
        title: row.get(1)?,
        source: row.get(2)?,
        content: row.get(3)?,
        content_hash: row.get(4)?,
        document_type: row.get(5)?,
        status: enum_from_sql(6, &status)?,
        metadata: metadata_from_sql(row.get(7)?),
        created_at: time_from_sql(8, &created_at)?,
        updated_at: time_from_sql(9, &updated_at)?,
    })
}

/// Read the `CHUNK_COLUMNS` starting at column `base`
fn row_to_chunk(row: &rusqlite::Row, base: usize) -> rusqlite::Result<Chunk> {
    let id: String = row.get(base)?;
    let document_id: String = row.get(base + 1)?;
    let chunk_index: i64 = row.get(base + 2)?;
    let token_count: i64 = row.get(base + 4)?;
    let start_char: Option<i64> = row.get(base + 5)?;
    let end_char: Option<i64> = row.get(base + 6)?;
    let created_at: String = row.get(base + 8)?;

    Ok(Chunk {
        id: uuid_from_sql(base, &id)?,
        document_id: uuid_from_sql(base + 1, &document_id)?,
        chunk_index: chunk_index as u32,
        content: row.get(base + 3)?,
        token_count: token_count as u32,
        start_char: start_char.map(|c| c as u32),
        end_char: end_char.map(|c| c as u32),
        metadata: metadata_from_sql(row.get(base + 7)?),
        created_at: time_from_sql(base + 8, &created_at)?,
    })
}

fn row_to_embedding(row: &rusqlite::Row) -> rusqlite::Result<Embedding> {
    let id: String = row.get(0)?;
    let chunk_id: String = row.get(1)?;
    let blob: Vec<u8> = row.get(3)?;
    let created_at: String = row.get(4)?;

    Ok(Embedding {
        id: uuid_from_sql(0, &id)?,
        chunk_id: uuid_from_sql(1, &chunk_id)?,
        model_name: row.get(2)?,
        vector: vector_from_blob(3, &blob)?,
        created_at: time_from_sql(4, &created_at)?,
    })
}

#[async_trait]
impl DocumentStore for DocumentDb {
    async fn embedding_dimension(&self, model: &str) -> Result<Option<usize>> {
        let model = model.to_string();
        self.blocking(move |db| db.model_dimension(&model)).await
    }

    async fn similarity_search(
        &self,
        vector: &[f32],
        model: &str,
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<ScoredChunk>> {
        let vector = vector.to_vec();
        let model = model.to_string();
        self.blocking(move |db| db.search(&vector, &model, k, metric))
            .await
    }

    async fn get_chunk(&self, id: Uuid) -> Result<Option<Chunk>> {
        self.blocking(move |db| db.chunk(id)).await
    }

    async fn health_check(&self) -> Result<bool> {
        self.blocking(|db| {
            let conn = db.conn.lock();
            let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
            Ok(one == 1)
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn seeded() -> (DocumentDb, Vec<Chunk>) {
        let db = DocumentDb::in_memory().unwrap();
        let doc = db
            .insert_document(NewDocument::new("alpha beta gamma").with_title("Greek"))
            .unwrap();
        let chunks = db
            .append_chunks(
                doc.id,
                vec![
                    NewChunk::new("alpha").with_span(0, 5),
                    NewChunk::new("beta").with_span(6, 10),
                    NewChunk::new("gamma").with_span(11, 16),
                ],
            )
            .unwrap();
        (db, chunks)
    }

    #[test]
    fn test_duplicate_document_conflicts() {
        let db = DocumentDb::in_memory().unwrap();
        db.insert_document(NewDocument::new("same text")).unwrap();
        let err = db.insert_document(NewDocument::new("same text")).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_document_status_lifecycle() {
        let (db, chunks) = seeded();
        let doc_id = chunks[0].document_id;

        let doc = db.get_document(doc_id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(doc.title.as_deref(), Some("Greek"));
        assert_eq!(doc.content_hash, NewDocument::new("alpha beta gamma").content_hash());

        db.set_document_status(doc_id, DocumentStatus::Indexed).unwrap();
        let indexed = db.get_document(doc_id).unwrap().unwrap();
        assert_eq!(indexed.status, DocumentStatus::Indexed);
        assert!(indexed.updated_at >= doc.updated_at);
        assert_eq!(indexed.created_at, doc.created_at);

        assert!(db.get_document(Uuid::new_v4()).unwrap().is_none());
        let err = db.set_document_status(Uuid::new_v4(), DocumentStatus::Failed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_chunk_indices_are_contiguous() {
        let (db, chunks) = seeded();
        let doc_id = chunks[0].document_id;

        let more = db
            .append_chunks(doc_id, vec![NewChunk::new("delta"), NewChunk::new("epsilon")])
            .unwrap();
        assert_eq!(more[0].chunk_index, 3);

        let all = db.chunks_for_document(doc_id).unwrap();
        let indices: Vec<u32> = all.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(all[1].start_char, Some(6));

        let err = db.append_chunks(Uuid::new_v4(), vec![NewChunk::new("x")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_embedding_uniqueness_and_upsert() {
        let (db, chunks) = seeded();
        let chunk = &chunks[0];

        let first = db.insert_embedding(chunk.id, "m1", vec![1.0, 0.0]).unwrap();
        assert_eq!(first.dimension(), 2);

        let err = db.insert_embedding(chunk.id, "m1", vec![0.0, 1.0]).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let replaced = db.upsert_embedding(chunk.id, "m1", vec![0.0, 1.0]).unwrap();
        assert_eq!(replaced.id, first.id);
        assert_eq!(replaced.vector, vec![0.0, 1.0]);
        assert_eq!(db.stats().unwrap().embeddings, 1);

        let stored = db.get_embedding(chunk.id, "m1").unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.vector, vec![0.0, 1.0]);
        assert!(db.get_embedding(chunk.id, "m2").unwrap().is_none());
        assert!(db.get_embedding(chunks[1].id, "m1").unwrap().is_none());

        let err = db.insert_embedding(chunks[1].id, "m1", vec![1.0, 0.0, 0.0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = db.insert_embedding(Uuid::new_v4(), "m1", vec![1.0, 0.0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_search_ranks_by_metric() {
        let (db, chunks) = seeded();
        db.insert_embedding(chunks[0].id, "m1", vec![1.0, 0.0]).unwrap();
        db.insert_embedding(chunks[1].id, "m1", vec![0.7, 0.7]).unwrap();
        db.insert_embedding(chunks[2].id, "m1", vec![0.0, 1.0]).unwrap();
        db.insert_embedding(chunks[2].id, "m2", vec![1.0, 0.0, 0.0]).unwrap();

        let cosine = db.search(&[1.0, 0.0], "m1", 2, DistanceMetric::Cosine).unwrap();
        assert_eq!(cosine.len(), 2);
        assert_eq!(cosine[0].chunk.id, chunks[0].id);
        assert_eq!(cosine[1].chunk.id, chunks[1].id);
        assert!(cosine[0].score > cosine[1].score);

        let l2 = db.search(&[0.0, 1.0], "m1", 3, DistanceMetric::Euclidean).unwrap();
        assert_eq!(l2[0].chunk.id, chunks[2].id);
        assert!(l2[0].score <= l2[1].score);
        assert!(l2.iter().all(|r| r.model_name == "m1"));
    }

    #[test]
    fn test_registered_model_without_rows() {
        let db = DocumentDb::in_memory().unwrap();
        db.register_model("empty-model", 4).unwrap();
        assert_eq!(db.model_dimension("empty-model").unwrap(), Some(4));
        assert_eq!(db.model_dimension("unknown").unwrap(), None);
        assert!(db
            .search(&[1.0, 0.0, 0.0, 0.0], "empty-model", 5, DistanceMetric::Cosine)
            .unwrap()
            .is_empty());
        assert!(db.register_model("empty-model", 8).is_err());
        assert!(db.register_model("zero", 0).is_err());
    }

    #[test]
    fn test_delete_document_cascades() {
        let (db, chunks) = seeded();
        db.insert_embedding(chunks[0].id, "m1", vec![1.0, 0.0]).unwrap();

        db.delete_document(chunks[0].document_id).unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.documents, 0);
        assert_eq!(stats.chunks, 0);
        assert_eq!(stats.embeddings, 0);
        assert_eq!(stats.models, 1);
        assert!(db.chunk(chunks[0].id).unwrap().is_none());
        assert!(db.get_document(chunks[0].document_id).unwrap().is_none());
        assert!(db.get_embedding(chunks[0].id, "m1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_trait_over_blocking_pool() {
        let (db, chunks) = seeded();
        db.insert_embedding(chunks[1].id, "m1", vec![0.5, 0.5]).unwrap();

        assert!(db.health_check().await.unwrap());
        assert_eq!(db.embedding_dimension("m1").await.unwrap(), Some(2));
        let found = db.get_chunk(chunks[1].id).await.unwrap().unwrap();
        assert_eq!(found.content, "beta");

        let results = db
            .similarity_search(&[1.0, 1.0], "m1", 10, DistanceMetric::Cosine)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
