use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::document::{DocId, Document, DocumentInput, ListRequest};
use crate::error::{Result, SearchError};

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS documents (
    doc_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id TEXT NOT NULL UNIQUE,
    title       TEXT NOT NULL,
    body        TEXT NOT NULL,
    source      TEXT NOT NULL DEFAULT '',
    ingested_at TEXT NOT NULL,
    revision    INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source);
";

const DOCUMENT_COLUMNS: &str =
    "doc_id, external_id, title, body, source, ingested_at, revision";

/// Durable record of raw documents, the source of truth the index is
/// derived from. One SQLite connection behind a mutex; transactions are
/// short and the busy timeout bounds waits on a contended database file.
pub struct DocumentStore {
    conn: Mutex<Connection>,
}

impl DocumentStore {
    /// Opens (creating if missing) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Volatile store for tests and demos.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Inserts or updates by external id in one statement and returns the
    /// stored row (read-your-writes). The revision bumps only when title,
    /// body, or source actually changed; re-sending identical content keeps
    /// revision and timestamp untouched.
    pub fn upsert(&self, input: &DocumentInput) -> Result<Document> {
        input.validate()?;
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let conn = self.conn.lock();
        let doc = conn.query_row(
            "INSERT INTO documents (external_id, title, body, source, ingested_at, revision)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)
             ON CONFLICT(external_id) DO UPDATE SET
                 title = excluded.title,
                 body = excluded.body,
                 source = excluded.source,
                 ingested_at = CASE WHEN documents.title = excluded.title
                                     AND documents.body = excluded.body
                                     AND documents.source = excluded.source
                                    THEN documents.ingested_at
                                    ELSE excluded.ingested_at END,
                 revision = CASE WHEN documents.title = excluded.title
                                  AND documents.body = excluded.body
                                  AND documents.source = excluded.source
                                 THEN documents.revision
                                 ELSE documents.revision + 1 END
             RETURNING doc_id, external_id, title, body, source, ingested_at, revision",
            params![input.id, input.title, input.body, input.source, now],
            row_to_document,
        )?;
        Ok(doc)
    }

    pub fn get(&self, doc_id: DocId) -> Result<Document> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE doc_id = ?1"),
            params![doc_id],
            row_to_document,
        )
        .optional()?
        .ok_or_else(|| SearchError::NotFound(format!("document {doc_id}")))
    }

    pub fn get_by_external_id(&self, external_id: &str) -> Result<Document> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE external_id = ?1"),
            params![external_id],
            row_to_document,
        )
        .optional()?
        .ok_or_else(|| SearchError::NotFound(format!("document {external_id:?}")))
    }

    /// Deletes and returns the row. `NotFound` when no such document exists.
    pub fn delete(&self, doc_id: DocId) -> Result<Document> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("DELETE FROM documents WHERE doc_id = ?1 RETURNING {DOCUMENT_COLUMNS}"),
            params![doc_id],
            row_to_document,
        )
        .optional()?
        .ok_or_else(|| SearchError::NotFound(format!("document {doc_id}")))
    }

    /// One page of documents ordered by doc id, optionally filtered by
    /// source tag.
    pub fn list(&self, req: &ListRequest) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut out = Vec::new();
        match &req.source {
            Some(source) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE source = ?1
                     ORDER BY doc_id LIMIT ?2 OFFSET ?3"
                ))?;
                let rows = stmt.query_map(
                    params![source, req.limit as i64, req.offset as i64],
                    row_to_document,
                )?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents
                     ORDER BY doc_id LIMIT ?1 OFFSET ?2"
                ))?;
                let rows =
                    stmt.query_map(params![req.limit as i64, req.offset as i64], row_to_document)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// All (doc_id, revision) pairs, for consistency checks.
    pub fn revisions(&self) -> Result<Vec<(DocId, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT doc_id, revision FROM documents ORDER BY doc_id")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Visits every document in doc id order, fetching pages so the
    /// connection lock is released while `visit` runs.
    pub fn for_each_document<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(Document) -> Result<()>,
    {
        const PAGE: usize = 256;
        let mut last_id: DocId = 0;
        loop {
            let batch = {
                let conn = self.conn.lock();
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents
                     WHERE doc_id > ?1 ORDER BY doc_id LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![last_id, PAGE as i64], row_to_document)?;
                let mut batch = Vec::with_capacity(PAGE);
                for row in rows {
                    batch.push(row?);
                }
                batch
            };
            match batch.last() {
                Some(doc) => last_id = doc.doc_id,
                None => break,
            }
            for doc in batch {
                visit(doc)?;
            }
        }
        Ok(())
    }
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let raw: String = row.get(5)?;
    let ingested_at = OffsetDateTime::parse(&raw, &Rfc3339).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Document {
        doc_id: row.get(0)?,
        external_id: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        source: row.get(4)?,
        ingested_at,
        revision: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(id: &str, title: &str, body: &str, source: &str) -> DocumentInput {
        DocumentInput {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            source: source.into(),
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = DocumentStore::open_in_memory().unwrap();
        let doc = store
            .upsert(&input("ext-1", "Asthma", "inhaler guidance", "guidelines"))
            .unwrap();
        assert_eq!(doc.revision, 1);

        let fetched = store.get(doc.doc_id).unwrap();
        assert_eq!(fetched, doc);
        let by_ext = store.get_by_external_id("ext-1").unwrap();
        assert_eq!(by_ext.doc_id, doc.doc_id);
    }

    #[test]
    fn revision_bumps_only_on_content_change() {
        let store = DocumentStore::open_in_memory().unwrap();
        let v1 = store
            .upsert(&input("ext-1", "Asthma", "inhaler guidance", ""))
            .unwrap();
        let same = store
            .upsert(&input("ext-1", "Asthma", "inhaler guidance", ""))
            .unwrap();
        assert_eq!(same.revision, 1);
        assert_eq!(same.ingested_at, v1.ingested_at);

        let changed = store
            .upsert(&input("ext-1", "Asthma", "revised guidance", ""))
            .unwrap();
        assert_eq!(changed.revision, 2);
        assert_eq!(changed.doc_id, v1.doc_id);
    }

    #[test]
    fn delete_returns_row_then_not_found() {
        let store = DocumentStore::open_in_memory().unwrap();
        let doc = store.upsert(&input("ext-1", "T", "b", "")).unwrap();
        let removed = store.delete(doc.doc_id).unwrap();
        assert_eq!(removed.external_id, "ext-1");
        assert!(matches!(
            store.delete(doc.doc_id),
            Err(SearchError::NotFound(_))
        ));
        assert!(matches!(
            store.get(doc.doc_id),
            Err(SearchError::NotFound(_))
        ));
    }

    #[test]
    fn list_filters_by_source_and_paginates() {
        let store = DocumentStore::open_in_memory().unwrap();
        for i in 0..5 {
            let source = if i % 2 == 0 { "cardiology" } else { "oncology" };
            store
                .upsert(&input(&format!("d{i}"), "T", "b", source))
                .unwrap();
        }
        let cardio = store
            .list(&ListRequest {
                source: Some("cardiology".into()),
                limit: 10,
                offset: 0,
            })
            .unwrap();
        assert_eq!(cardio.len(), 3);
        assert!(cardio.iter().all(|d| d.source == "cardiology"));

        let page = store
            .list(&ListRequest {
                source: None,
                limit: 2,
                offset: 2,
            })
            .unwrap();
        assert_eq!(page.len(), 2);
        assert!(page[0].doc_id < page[1].doc_id);
    }

    #[test]
    fn for_each_document_scans_in_id_order() {
        let store = DocumentStore::open_in_memory().unwrap();
        for i in 0..7 {
            store.upsert(&input(&format!("d{i}"), "T", "b", "")).unwrap();
        }
        let mut seen = Vec::new();
        store
            .for_each_document(|doc| {
                seen.push(doc.doc_id);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen.len(), 7);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn validation_failures_do_not_write() {
        let store = DocumentStore::open_in_memory().unwrap();
        assert!(store.upsert(&input("", "T", "b", "")).is_err());
        assert_eq!(store.count().unwrap(), 0);
    }
}
