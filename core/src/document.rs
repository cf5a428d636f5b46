use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Result, SearchError};

/// Store-assigned document identifier (the SQLite rowid).
pub type DocId = i64;

/// A persisted document row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: DocId,
    /// Caller-supplied stable identifier, unique across the corpus.
    pub external_id: String,
    pub title: String,
    pub body: String,
    pub source: String,
    #[serde(with = "time::serde::rfc3339")]
    pub ingested_at: OffsetDateTime,
    /// Bumps whenever the stored content actually changes.
    pub revision: i64,
}

/// Raw document payload accepted by the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub source: String,
}

impl DocumentInput {
    /// Rejects malformed payloads before anything is written.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(SearchError::Validation(
                "document id must not be empty".into(),
            ));
        }
        if self.title.trim().is_empty() {
            return Err(SearchError::Validation(format!(
                "document {:?} has an empty title",
                self.id
            )));
        }
        Ok(())
    }
}

/// Filter and pagination for document listings, ordered by doc id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRequest {
    pub source: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for ListRequest {
    fn default() -> Self {
        Self {
            source: None,
            limit: 50,
            offset: 0,
        }
    }
}
