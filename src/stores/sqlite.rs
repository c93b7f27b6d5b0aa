//! SQLite + sqlite-vec implementation of the vector store.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tokio_rusqlite::{Connection, OptionalExtension, ffi, params};
use tracing::debug;

use super::{ChunkRecord, SearchHit, WriteMode};
use crate::metadata::ChunkMetadata;
use crate::types::PipelineError;

/// Handle to one store file. Cheap to clone; tables opened through it
/// share the underlying connection.
#[derive(Clone)]
pub struct VectorStore {
    conn: Connection,
}

impl VectorStore {
    /// Opens (or creates) the store file and verifies the sqlite-vec
    /// extension is loadable.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| PipelineError::Storage(err.to_string()))?;
        conn.call(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))?;
            Ok(())
        })
        .await
        .map_err(|err: tokio_rusqlite::Error| PipelineError::Storage(err.to_string()))?;
        Ok(Self { conn })
    }

    /// Resolves a table for writing.
    ///
    /// `Overwrite` drops any existing table first; `Append` creates it
    /// only when absent. Creation uses `IF NOT EXISTS`, so two racing
    /// first-writers both land on the same schema. Appending onto a
    /// table declared with a different dimensionality fails with
    /// [`PipelineError::SchemaMismatch`] before any row is written.
    pub async fn create_table(
        &self,
        name: &str,
        dims: usize,
        mode: WriteMode,
    ) -> Result<ChunkTable, PipelineError> {
        validate_table_name(name)?;
        if dims == 0 {
            return Err(PipelineError::Storage(
                "vector dimensionality must be positive".to_string(),
            ));
        }

        if mode == WriteMode::Overwrite {
            let table = name.to_string();
            self.conn
                .call(move |conn| {
                    conn.execute_batch(&format!(
                        "DROP TABLE IF EXISTS {table}_embeddings; DROP TABLE IF EXISTS {table};"
                    ))?;
                    Ok(())
                })
                .await
                .map_err(|err: tokio_rusqlite::Error| PipelineError::Storage(err.to_string()))?;
            debug!(table = name, "dropped table for overwrite");
        }

        let table = name.to_string();
        self.conn
            .call(move |conn| {
                conn.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        id TEXT NOT NULL,
                        text TEXT NOT NULL,
                        filename TEXT,
                        page_numbers TEXT,
                        title TEXT
                    );
                    CREATE VIRTUAL TABLE IF NOT EXISTS {table}_embeddings
                        USING vec0(embedding float[{dims}]);"
                ))?;
                Ok(())
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| PipelineError::Storage(err.to_string()))?;

        // IF NOT EXISTS silently keeps an older declaration around.
        let declared = self.declared_dims(name).await?.ok_or_else(|| {
            PipelineError::Storage(format!("table '{name}' missing after create"))
        })?;
        if declared != dims {
            return Err(PipelineError::SchemaMismatch {
                expected: declared,
                actual: dims,
            });
        }

        Ok(ChunkTable {
            conn: self.conn.clone(),
            name: name.to_string(),
            dims,
        })
    }

    /// Opens an existing table, recovering its dimensionality from the
    /// declared schema. Fails when the table does not exist.
    pub async fn open_table(&self, name: &str) -> Result<ChunkTable, PipelineError> {
        validate_table_name(name)?;
        let dims = self
            .declared_dims(name)
            .await?
            .ok_or_else(|| PipelineError::Storage(format!("table '{name}' does not exist")))?;
        Ok(ChunkTable {
            conn: self.conn.clone(),
            name: name.to_string(),
            dims,
        })
    }

    async fn declared_dims(&self, name: &str) -> Result<Option<usize>, PipelineError> {
        let embeddings_table = format!("{name}_embeddings");
        let declaration: Option<String> = self
            .conn
            .call(move |conn| {
                let sql = conn
                    .query_row(
                        "SELECT sql FROM sqlite_master WHERE name = ?1",
                        [&embeddings_table],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(sql)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| PipelineError::Storage(err.to_string()))?;

        let Some(declaration) = declaration else {
            return Ok(None);
        };

        static DIMS_RE: OnceLock<Regex> = OnceLock::new();
        let re = DIMS_RE.get_or_init(|| {
            Regex::new(r"float\[(\d+)\]").expect("static regex")
        });
        let dims = re
            .captures(&declaration)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .ok_or_else(|| {
                PipelineError::Storage(format!(
                    "unable to read dimensionality from schema: {declaration}"
                ))
            })?;
        Ok(Some(dims))
    }
}

/// One named table of chunk records.
#[derive(Clone, Debug)]
pub struct ChunkTable {
    conn: Connection,
    name: String,
    dims: usize,
}

/// Pre-serialized row, built outside the connection closure.
struct InsertRow {
    id: String,
    text: String,
    filename: Option<String>,
    pages_json: Option<String>,
    title: Option<String>,
    embedding_json: String,
}

struct RawHit {
    id: String,
    text: String,
    filename: Option<String>,
    pages_json: Option<String>,
    title: Option<String>,
    distance: f64,
}

impl ChunkTable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Appends records, returning how many were written. The batch is
    /// one transaction; earlier batches are never rolled back.
    pub async fn add(&self, records: Vec<ChunkRecord>) -> Result<usize, PipelineError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            if record.embedding.len() != self.dims {
                return Err(PipelineError::SchemaMismatch {
                    expected: self.dims,
                    actual: record.embedding.len(),
                });
            }
            rows.push(InsertRow {
                embedding_json: serde_json::to_string(&record.embedding)
                    .map_err(|err| PipelineError::Storage(err.to_string()))?,
                pages_json: record
                    .metadata
                    .page_numbers
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|err| PipelineError::Storage(err.to_string()))?,
                id: record.id,
                text: record.text,
                filename: record.metadata.filename,
                title: record.metadata.title,
            });
        }

        let table = self.name.clone();
        let written = rows.len();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut insert_chunk = tx.prepare(&format!(
                        "INSERT INTO {table} (id, text, filename, page_numbers, title)
                         VALUES (?1, ?2, ?3, ?4, ?5)"
                    ))?;
                    let mut insert_embedding = tx.prepare(&format!(
                        "INSERT INTO {table}_embeddings (rowid, embedding) VALUES (?1, ?2)"
                    ))?;
                    for row in &rows {
                        insert_chunk.execute(params![
                            row.id,
                            row.text,
                            row.filename,
                            row.pages_json,
                            row.title
                        ])?;
                        let rowid = tx.last_insert_rowid();
                        insert_embedding.execute(params![rowid, row.embedding_json])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| PipelineError::Storage(err.to_string()))?;

        debug!(table = %self.name, rows = written, "wrote chunk records");
        Ok(written)
    }

    /// Top-`k` records by cosine similarity to `query`, ties broken by
    /// insertion order.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, PipelineError> {
        if query.len() != self.dims {
            return Err(PipelineError::SchemaMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_json = serde_json::to_string(query)
            .map_err(|err| PipelineError::Storage(err.to_string()))?;
        let table = self.name.clone();
        let raw_hits = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT c.id, c.text, c.filename, c.page_numbers, c.title,
                            vec_distance_cosine(e.embedding, vec_f32(?1)) AS distance
                     FROM {table} c
                     JOIN {table}_embeddings e ON e.rowid = c.rowid
                     ORDER BY distance ASC, c.rowid ASC
                     LIMIT {k}"
                ))?;
                let rows = stmt.query_map([&query_json], |row| {
                    Ok(RawHit {
                        id: row.get(0)?,
                        text: row.get(1)?,
                        filename: row.get(2)?,
                        pages_json: row.get(3)?,
                        title: row.get(4)?,
                        distance: row.get(5)?,
                    })
                })?;

                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row?);
                }
                Ok(hits)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| PipelineError::Storage(err.to_string()))?;

        raw_hits
            .into_iter()
            .map(|raw| {
                let page_numbers = raw
                    .pages_json
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()
                    .map_err(|err| PipelineError::Storage(err.to_string()))?;
                Ok(SearchHit {
                    id: raw.id,
                    text: raw.text,
                    metadata: ChunkMetadata {
                        filename: raw.filename,
                        page_numbers,
                        title: raw.title,
                    },
                    similarity: 1.0 - raw.distance as f32,
                })
            })
            .collect()
    }

    pub async fn count_rows(&self) -> Result<usize, PipelineError> {
        let table = self.name.clone();
        self.conn
            .call(move |conn| {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })?;
                Ok(count as usize)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| PipelineError::Storage(err.to_string()))
    }

    /// Deletes every record originating from `filename`, returning the
    /// number of rows removed.
    pub async fn delete_by_filename(&self, filename: &str) -> Result<usize, PipelineError> {
        let table = self.name.clone();
        let filename = filename.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    &format!(
                        "DELETE FROM {table}_embeddings WHERE rowid IN
                         (SELECT rowid FROM {table} WHERE filename = ?1)"
                    ),
                    [&filename],
                )?;
                let deleted =
                    tx.execute(&format!("DELETE FROM {table} WHERE filename = ?1"), [&filename])?;
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| PipelineError::Storage(err.to_string()))
    }
}

/// Table names are interpolated into SQL; restrict them to identifier
/// characters.
fn validate_table_name(name: &str) -> Result<(), PipelineError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(PipelineError::Storage(format!(
            "invalid table name '{name}': use letters, digits, and underscores"
        )))
    }
}

fn register_sqlite_vec() -> Result<(), PipelineError> {
    static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();

    REGISTERED
        .get_or_init(|| unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!("failed to register sqlite-vec extension (code {rc})"))
            } else {
                Ok(())
            }
        })
        .clone()
        .map_err(PipelineError::Storage)
}
