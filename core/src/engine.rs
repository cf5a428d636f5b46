use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;

use crate::document::{DocId, Document, DocumentInput, ListRequest};
use crate::error::{Result, SearchError};
use crate::index::{InvertedIndex, Posting};
use crate::query;
use crate::search;
use crate::store::DocumentStore;
use crate::tokenizer::{Analyzer, AnalyzerConfig};

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SQLite database path; `None` opens a volatile in-memory store.
    pub db_path: Option<PathBuf>,
    pub analyzer: AnalyzerConfig,
    /// Weight multiplier for term occurrences in the title region.
    pub title_boost: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            analyzer: AnalyzerConfig::default(),
            title_boost: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub external_id: String,
    pub score: f32,
    pub title: String,
    pub source: String,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    /// Matching documents before pagination.
    pub total_hits: usize,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReindexSummary {
    pub documents: usize,
    pub terms: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct VerifySummary {
    pub checked: usize,
    pub repaired: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EngineStats {
    pub documents: u64,
    pub indexed_documents: usize,
    pub terms: usize,
    pub postings: usize,
}

/// The search engine: document store, inverted index, and the shared
/// analyzer behind one interface. All methods take `&self`; reads run in
/// parallel and writes are internally synchronized, so the engine can be
/// shared across threads as-is.
pub struct SearchEngine {
    analyzer: Analyzer,
    store: DocumentStore,
    index: InvertedIndex,
    title_boost: f32,
}

impl SearchEngine {
    /// Opens the store and rebuilds the index from it. The index is always
    /// derived state; a missing or stale one is reconstructed here.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let store = match &config.db_path {
            Some(path) => DocumentStore::open(path)?,
            None => DocumentStore::open_in_memory()?,
        };
        let engine = Self {
            analyzer: Analyzer::new(config.analyzer),
            store,
            index: InvertedIndex::new(),
            title_boost: config.title_boost,
        };
        engine.reindex_all()?;
        Ok(engine)
    }

    /// Volatile engine with default configuration, for tests and demos.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(EngineConfig::default())
    }

    /// Validates, persists, then indexes one document. The store row is the
    /// source of truth; when it reports a revision the index already holds,
    /// analysis is skipped entirely.
    pub fn add_or_update(&self, input: &DocumentInput) -> Result<Document> {
        input.validate()?;
        let doc = self.store.upsert(input)?;
        if self.index.doc_revision(doc.doc_id) != Some(doc.revision) {
            self.index_document(&doc);
        }
        Ok(doc)
    }

    /// Deletes a document and drops its postings.
    pub fn remove(&self, doc_id: DocId) -> Result<Document> {
        let doc = self.store.delete(doc_id)?;
        self.index.remove(doc_id);
        Ok(doc)
    }

    pub fn remove_by_external_id(&self, external_id: &str) -> Result<Document> {
        let doc = self.store.get_by_external_id(external_id)?;
        self.remove(doc.doc_id)
    }

    pub fn document(&self, doc_id: DocId) -> Result<Document> {
        self.store.get(doc_id)
    }

    pub fn document_by_external_id(&self, external_id: &str) -> Result<Document> {
        self.store.get_by_external_id(external_id)
    }

    pub fn list(&self, req: &ListRequest) -> Result<Vec<Document>> {
        self.store.list(req)
    }

    /// Ranked search over the corpus. `top_k` bounds the returned page and
    /// `offset` skips leading hits; `total_hits` counts all matches.
    pub fn search(&self, query_text: &str, top_k: usize, offset: usize) -> Result<SearchResults> {
        let parsed = query::parse_query(&self.analyzer, query_text)?;
        let ranked = {
            let reader = self.index.reader();
            search::execute(&reader, &parsed, self.title_boost)
        };
        let total_hits = ranked.len();
        let raw_words = positive_words(query_text);
        let mut hits = Vec::new();
        for r in ranked.into_iter().skip(offset).take(top_k) {
            match self.store.get(r.doc_id) {
                Ok(doc) => hits.push(SearchHit {
                    doc_id: doc.doc_id,
                    external_id: doc.external_id,
                    score: r.score,
                    title: doc.title,
                    source: doc.source,
                    snippet: search::make_snippet(&doc.body, &raw_words),
                }),
                Err(SearchError::NotFound(_)) => {
                    tracing::warn!(doc_id = r.doc_id, "dropping dangling index entry found during search");
                    self.index.remove(r.doc_id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(SearchResults {
            query: query_text.to_string(),
            total_hits,
            hits,
        })
    }

    /// Current postings for a normalized term, ordered by doc id. Terms are
    /// what the analyzer emits; surface forms should go through `search`.
    pub fn lookup(&self, term: &str) -> Vec<Posting> {
        self.index
            .lookup(term)
            .map(|postings| postings.as_ref().clone())
            .unwrap_or_default()
    }

    /// Rebuilds the whole index from the store: the startup path and the
    /// recovery path for wholesale inconsistency.
    pub fn reindex_all(&self) -> Result<ReindexSummary> {
        self.index.clear();
        let mut documents = 0usize;
        self.store.for_each_document(|doc| {
            self.index_document(&doc);
            documents += 1;
            Ok(())
        })?;
        let terms = self.index.term_count();
        tracing::info!(documents, terms, "index rebuilt from store");
        Ok(ReindexSummary { documents, terms })
    }

    /// Re-derives one document's postings from its stored row.
    pub fn reindex_document(&self, doc_id: DocId) -> Result<()> {
        let doc = self.store.get(doc_id)?;
        self.index_document(&doc);
        Ok(())
    }

    /// Compares store revisions against index revisions: mismatched
    /// documents are reindexed, index entries without a backing row are
    /// dropped. Each repair is logged as a diagnostic. A document another
    /// thread deletes after the revision snapshot counts as removed, not as
    /// a failure.
    pub fn verify(&self) -> Result<VerifySummary> {
        let mut summary = VerifySummary::default();
        let mut live: HashSet<DocId> = HashSet::new();
        for (doc_id, revision) in self.store.revisions()? {
            summary.checked += 1;
            live.insert(doc_id);
            if self.index.doc_revision(doc_id) != Some(revision) {
                tracing::warn!(doc_id, revision, "index out of date for document, reindexing");
                self.repair_document(doc_id, &mut summary)?;
            }
        }
        for doc_id in self.index.doc_ids() {
            if !live.contains(&doc_id) {
                tracing::warn!(doc_id, "index entry without stored document, removing");
                self.index.remove(doc_id);
                summary.removed += 1;
            }
        }
        Ok(summary)
    }

    /// One verification repair. A row that vanished since the revision
    /// snapshot is healed by dropping its index entry; any other failure
    /// leaves the index out of step with the store and surfaces as an
    /// inconsistency.
    fn repair_document(&self, doc_id: DocId, summary: &mut VerifySummary) -> Result<()> {
        match self.reindex_document(doc_id) {
            Ok(()) => summary.repaired += 1,
            Err(SearchError::NotFound(_)) => {
                tracing::warn!(
                    doc_id,
                    "document deleted during verification, dropping index entry"
                );
                if self.index.remove(doc_id) {
                    summary.removed += 1;
                }
            }
            Err(e) => {
                return Err(SearchError::Inconsistency(format!(
                    "document {doc_id} could not be reindexed: {e}"
                )));
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<EngineStats> {
        let index = self.index.stats();
        Ok(EngineStats {
            documents: self.store.count()?,
            indexed_documents: index.documents,
            terms: index.terms,
            postings: index.postings,
        })
    }

    fn index_document(&self, doc: &Document) -> bool {
        let title_tokens = self.analyzer.analyze(&doc.title);
        let body_tokens = self.analyzer.analyze(&doc.body);
        self.index
            .apply(doc.doc_id, doc.revision, &title_tokens, &body_tokens)
    }
}

/// Raw positive query words, used for snippet extraction against the
/// original document text.
fn positive_words(query_text: &str) -> Vec<String> {
    query_text
        .split_whitespace()
        .filter(|w| !w.starts_with('-'))
        .map(|w| w.trim_matches('"').to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(id: &str, title: &str, body: &str) -> DocumentInput {
        DocumentInput {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            source: String::new(),
        }
    }

    #[test]
    fn verify_repairs_index_drift() {
        let engine = SearchEngine::open_in_memory().unwrap();
        let doc = engine
            .add_or_update(&input("d1", "Record", "asthma inhaler guidance"))
            .unwrap();

        engine.index.remove(doc.doc_id);
        assert_eq!(engine.search("asthma", 10, 0).unwrap().total_hits, 0);

        let summary = engine.verify().unwrap();
        assert_eq!(summary.checked, 1);
        assert_eq!(summary.repaired, 1);
        assert_eq!(engine.search("asthma", 10, 0).unwrap().total_hits, 1);
    }

    #[test]
    fn search_drops_dangling_entries() {
        let engine = SearchEngine::open_in_memory().unwrap();
        let doc = engine
            .add_or_update(&input("d1", "Record", "asthma inhaler guidance"))
            .unwrap();

        engine.store.delete(doc.doc_id).unwrap();
        let first = engine.search("asthma", 10, 0).unwrap();
        assert_eq!(first.total_hits, 1);
        assert!(first.hits.is_empty());

        let second = engine.search("asthma", 10, 0).unwrap();
        assert_eq!(second.total_hits, 0);
    }

    #[test]
    fn repair_tolerates_rows_deleted_after_the_snapshot() {
        let engine = SearchEngine::open_in_memory().unwrap();
        let doc = engine
            .add_or_update(&input("d1", "Record", "asthma inhaler guidance"))
            .unwrap();

        // The state a concurrent remove leaves between the revision snapshot
        // and the repair: row gone, entry still indexed.
        engine.store.delete(doc.doc_id).unwrap();
        let mut summary = VerifySummary::default();
        engine.repair_document(doc.doc_id, &mut summary).unwrap();

        assert_eq!(summary.repaired, 0);
        assert_eq!(summary.removed, 1);
        assert_eq!(engine.stats().unwrap().indexed_documents, 0);
    }

    #[test]
    fn verify_removes_entries_without_rows() {
        let engine = SearchEngine::open_in_memory().unwrap();
        let doc = engine
            .add_or_update(&input("d1", "Record", "asthma inhaler guidance"))
            .unwrap();

        engine.store.delete(doc.doc_id).unwrap();
        let summary = engine.verify().unwrap();
        assert_eq!(summary.checked, 0);
        assert_eq!(summary.removed, 1);
        assert_eq!(engine.stats().unwrap().indexed_documents, 0);
    }

    #[test]
    fn positive_words_skip_exclusions_and_quotes() {
        let words = positive_words("diabetes -insulin \"type 2\"");
        assert_eq!(words, vec!["diabetes", "type", "2"]);
    }
}
