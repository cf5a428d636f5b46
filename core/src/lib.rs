//! Document indexing and search over an embedded SQLite store.
//!
//! Documents live in a relational store that is the source of truth; an
//! in-memory inverted index is derived from it at open and kept in lockstep
//! by the ingestion pipeline. Queries support AND terms, `-term` exclusions,
//! and quoted phrases, ranked by length-normalized TF-IDF.
//!
//! ```no_run
//! use medsearch_core::{DocumentInput, SearchEngine};
//!
//! # fn main() -> medsearch_core::Result<()> {
//! let engine = SearchEngine::open_in_memory()?;
//! engine.add_or_update(&DocumentInput {
//!     id: "guideline-42".into(),
//!     title: "Type 2 diabetes".into(),
//!     body: "Management of type 2 diabetes without insulin.".into(),
//!     source: "guidelines".into(),
//! })?;
//! let results = engine.search("diabetes -insulin", 10, 0)?;
//! # let _ = results;
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod engine;
pub mod error;
pub mod index;
pub mod query;
mod search;
pub mod store;
pub mod tokenizer;

pub use document::{DocId, Document, DocumentInput, ListRequest};
pub use engine::{
    EngineConfig, EngineStats, ReindexSummary, SearchEngine, SearchHit, SearchResults,
    VerifySummary,
};
pub use error::{Result, SearchError};
pub use index::{IndexStats, InvertedIndex, Posting, TermId};
pub use query::{parse_query, ParsedQuery, PhraseClause};
pub use store::DocumentStore;
pub use tokenizer::{Analyzer, AnalyzerConfig, Token};
