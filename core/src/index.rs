//! In-memory inverted index.
//!
//! Posting lists are kept sorted by doc id so multi-term queries can merge
//! them linearly. Lists are Arc-shared: writers copy-on-write through
//! `Arc::make_mut`, so a reader that cloned a list keeps a stable snapshot.
//! Per-document entries carry the store revision; an apply older than what
//! the index already holds is dropped rather than clobbering newer postings.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use serde::Serialize;

use crate::document::DocId;
use crate::tokenizer::Token;

pub type TermId = u32;

/// Token-ordinal distance inserted between the title and body regions so a
/// phrase can never match across the field boundary.
pub const FIELD_GAP: u32 = 1000;

/// Occurrence record for one (term, document) pair. `tf` counts every
/// occurrence, `title_tf` the subset inside the title region. `positions`
/// are analyzer ordinals, strictly increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
    pub title_tf: u32,
    pub positions: Vec<u32>,
}

#[derive(Debug, Clone)]
struct DocEntry {
    revision: i64,
    /// Emitted tokens across title and body, used for length normalization.
    token_count: u32,
    /// Emitted tokens in the title region alone.
    title_token_count: u32,
    /// Terms this document currently has postings under.
    term_ids: Vec<TermId>,
}

#[derive(Default)]
struct IndexInner {
    dictionary: HashMap<String, TermId>,
    /// Posting lists addressed by `TermId`, each sorted by doc id.
    postings: Vec<Arc<Vec<Posting>>>,
    docs: HashMap<DocId, DocEntry>,
}

impl IndexInner {
    fn intern(&mut self, term: String) -> TermId {
        if let Some(&term_id) = self.dictionary.get(&term) {
            return term_id;
        }
        let term_id = self.postings.len() as TermId;
        self.postings.push(Arc::new(Vec::new()));
        self.dictionary.insert(term, term_id);
        term_id
    }

    fn detach_doc(&mut self, doc_id: DocId) {
        let entry = match self.docs.remove(&doc_id) {
            Some(entry) => entry,
            None => return,
        };
        for term_id in entry.term_ids {
            let list = Arc::make_mut(&mut self.postings[term_id as usize]);
            if let Ok(i) = list.binary_search_by_key(&doc_id, |p| p.doc_id) {
                list.remove(i);
            }
        }
    }
}

#[derive(Default)]
struct TermOccurrences {
    tf: u32,
    title_tf: u32,
    positions: Vec<u32>,
}

fn title_span(title_tokens: &[Token]) -> u32 {
    title_tokens.last().map(|t| t.position + 1).unwrap_or(0)
}

fn collect_occurrences(
    title_tokens: &[Token],
    body_tokens: &[Token],
) -> BTreeMap<String, TermOccurrences> {
    let mut map: BTreeMap<String, TermOccurrences> = BTreeMap::new();
    for tok in title_tokens {
        let occ = map.entry(tok.term.clone()).or_default();
        occ.tf += 1;
        occ.title_tf += 1;
        occ.positions.push(tok.position);
    }
    let body_offset = title_span(title_tokens) + FIELD_GAP;
    for tok in body_tokens {
        let occ = map.entry(tok.term.clone()).or_default();
        occ.tf += 1;
        occ.positions.push(tok.position + body_offset);
    }
    map
}

/// Incrementally maintained term → postings map, rebuilt from the document
/// store at engine open and kept in lockstep with it afterwards.
pub struct InvertedIndex {
    inner: RwLock<IndexInner>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(IndexInner::default()),
        }
    }

    /// Replaces all postings for `doc_id` with ones derived from the given
    /// tokens, atomically with respect to readers. Returns false when the
    /// index already holds a newer revision of the document, in which case
    /// nothing changes.
    pub fn apply(
        &self,
        doc_id: DocId,
        revision: i64,
        title_tokens: &[Token],
        body_tokens: &[Token],
    ) -> bool {
        let occurrences = collect_occurrences(title_tokens, body_tokens);
        let token_count = (title_tokens.len() + body_tokens.len()) as u32;
        let title_token_count = title_tokens.len() as u32;

        let mut inner = self.inner.write();
        let held = inner.docs.get(&doc_id).map(|e| e.revision);
        if let Some(held_revision) = held {
            if held_revision > revision {
                tracing::debug!(doc_id, revision, held_revision, "dropped stale index apply");
                return false;
            }
            inner.detach_doc(doc_id);
        }

        let mut term_ids = Vec::with_capacity(occurrences.len());
        for (term, occ) in occurrences {
            let term_id = inner.intern(term);
            let posting = Posting {
                doc_id,
                tf: occ.tf,
                title_tf: occ.title_tf,
                positions: occ.positions,
            };
            let list = Arc::make_mut(&mut inner.postings[term_id as usize]);
            match list.binary_search_by_key(&doc_id, |p| p.doc_id) {
                Ok(i) => list[i] = posting,
                Err(i) => list.insert(i, posting),
            }
            term_ids.push(term_id);
        }
        inner.docs.insert(
            doc_id,
            DocEntry {
                revision,
                token_count,
                title_token_count,
                term_ids,
            },
        );
        true
    }

    /// Deletes all postings for `doc_id`. Returns whether the document was
    /// indexed.
    pub fn remove(&self, doc_id: DocId) -> bool {
        let mut inner = self.inner.write();
        if inner.docs.contains_key(&doc_id) {
            inner.detach_doc(doc_id);
            true
        } else {
            false
        }
    }

    /// Posting list for a normalized term, sorted by doc id. `None` when the
    /// term has never been indexed.
    pub fn lookup(&self, term: &str) -> Option<Arc<Vec<Posting>>> {
        let inner = self.inner.read();
        let term_id = *inner.dictionary.get(term)?;
        Some(Arc::clone(&inner.postings[term_id as usize]))
    }

    /// Revision of the indexed copy of `doc_id`, if any.
    pub fn doc_revision(&self, doc_id: DocId) -> Option<i64> {
        self.inner.read().docs.get(&doc_id).map(|e| e.revision)
    }

    pub fn doc_count(&self) -> usize {
        self.inner.read().docs.len()
    }

    pub fn term_count(&self) -> usize {
        self.inner.read().dictionary.len()
    }

    /// Sorted ids of all indexed documents.
    pub fn doc_ids(&self) -> Vec<DocId> {
        let mut ids: Vec<DocId> = self.inner.read().docs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn clear(&self) {
        *self.inner.write() = IndexInner::default();
    }

    pub fn stats(&self) -> IndexStats {
        let inner = self.inner.read();
        IndexStats {
            documents: inner.docs.len(),
            terms: inner.dictionary.len(),
            postings: inner.postings.iter().map(|l| l.len()).sum(),
        }
    }

    /// Read-locked view for the query engine, so that every lookup within
    /// one search observes the same index state.
    pub fn reader(&self) -> IndexReader<'_> {
        IndexReader {
            guard: self.inner.read(),
        }
    }
}

impl Default for InvertedIndex {
    fn default() -> Self {
        Self::new()
    }
}

pub struct IndexReader<'a> {
    guard: RwLockReadGuard<'a, IndexInner>,
}

impl IndexReader<'_> {
    pub fn doc_count(&self) -> usize {
        self.guard.docs.len()
    }

    /// Sorted postings for `term`, if any.
    pub fn postings(&self, term: &str) -> Option<&[Posting]> {
        let term_id = *self.guard.dictionary.get(term)?;
        Some(self.guard.postings[term_id as usize].as_slice())
    }

    /// Emitted token counts of an indexed document, as (total, title region).
    pub fn doc_token_counts(&self, doc_id: DocId) -> Option<(u32, u32)> {
        self.guard
            .docs
            .get(&doc_id)
            .map(|e| (e.token_count, e.title_token_count))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub terms: usize,
    pub postings: usize,
}
