//! Candidate generation, scoring, and snippets.
//!
//! Posting lists arrive sorted by doc id, so AND/OR/NOT combine as linear
//! merges. Scores are log-weighted TF-IDF: document weight `1 + ln(tf)` with
//! title occurrences boosted, query weight `(1 + ln(qtf)) * ln(1 + N/df)`,
//! dot product divided by `1 + ln(weighted length)` where the length counts
//! title tokens at the same boost. Term weight and length norm grow at the
//! same logarithmic rate, so an extra occurrence of a query term never
//! lowers a document's score.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::document::DocId;
use crate::index::{IndexReader, Posting};
use crate::query::{ParsedQuery, PhraseClause};

const SNIPPET_BEFORE: usize = 100;
const SNIPPET_AFTER: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Ranked {
    pub doc_id: DocId,
    pub score: f32,
}

/// Runs a parsed query against one index snapshot and returns the full
/// ranked candidate list, score descending, doc id ascending on ties.
pub(crate) fn execute(
    reader: &IndexReader<'_>,
    query: &ParsedQuery,
    title_boost: f32,
) -> Vec<Ranked> {
    if query.is_empty() {
        return Vec::new();
    }

    // Query term frequencies in sorted order, so score accumulation is
    // deterministic. Any positive term with no postings empties the AND.
    let mut qtf: BTreeMap<&str, u32> = BTreeMap::new();
    for term in query.positive_terms() {
        *qtf.entry(term).or_insert(0) += 1;
    }
    let mut term_postings: HashMap<&str, &[Posting]> = HashMap::with_capacity(qtf.len());
    for &term in qtf.keys() {
        match reader.postings(term) {
            Some(postings) if !postings.is_empty() => {
                term_postings.insert(term, postings);
            }
            _ => return Vec::new(),
        }
    }

    // Intersect, smallest list first.
    let mut lists: Vec<&[Posting]> = term_postings.values().copied().collect();
    lists.sort_by_key(|l| l.len());
    let mut candidates: Vec<DocId> = lists[0].iter().map(|p| p.doc_id).collect();
    for list in &lists[1..] {
        candidates = intersect(&candidates, list);
        if candidates.is_empty() {
            return Vec::new();
        }
    }

    for phrase in &query.phrases {
        candidates.retain(|&doc_id| phrase_matches(reader, phrase, doc_id));
        if candidates.is_empty() {
            return Vec::new();
        }
    }

    let mut banned: Vec<DocId> = Vec::new();
    for term in &query.excluded {
        if let Some(postings) = reader.postings(term) {
            banned = union(&banned, postings);
        }
    }
    candidates.retain(|doc_id| banned.binary_search(doc_id).is_err());
    for phrase in &query.excluded_phrases {
        candidates.retain(|&doc_id| !phrase_matches(reader, phrase, doc_id));
    }

    score(reader, &candidates, &qtf, &term_postings, title_boost)
}

fn score(
    reader: &IndexReader<'_>,
    candidates: &[DocId],
    qtf: &BTreeMap<&str, u32>,
    term_postings: &HashMap<&str, &[Posting]>,
    title_boost: f32,
) -> Vec<Ranked> {
    let n = reader.doc_count().max(1) as f32;
    let mut ranked = Vec::with_capacity(candidates.len());
    for &doc_id in candidates {
        let (len, title_len) = reader.doc_token_counts(doc_id).unwrap_or((1, 0));
        let weighted_len = (len as f32 + (title_boost - 1.0) * title_len as f32).max(1.0);
        let mut dot = 0.0f32;
        for (&term, &query_tf) in qtf {
            let postings = term_postings[term];
            let posting = match postings.binary_search_by_key(&doc_id, |p| p.doc_id) {
                Ok(i) => &postings[i],
                Err(_) => continue,
            };
            let tf_eff =
                (posting.tf as f32 + (title_boost - 1.0) * posting.title_tf as f32).max(1.0);
            let doc_weight = 1.0 + tf_eff.ln();
            let idf = (1.0 + n / postings.len() as f32).ln();
            let query_weight = (1.0 + (query_tf as f32).ln()) * idf;
            dot += query_weight * doc_weight;
        }
        ranked.push(Ranked {
            doc_id,
            score: dot / (1.0 + weighted_len.ln()),
        });
    }
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
    ranked
}

fn intersect(ids: &[DocId], postings: &[Posting]) -> Vec<DocId> {
    let mut out = Vec::with_capacity(ids.len().min(postings.len()));
    let (mut i, mut j) = (0, 0);
    while i < ids.len() && j < postings.len() {
        match ids[i].cmp(&postings[j].doc_id) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push(ids[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

fn union(ids: &[DocId], postings: &[Posting]) -> Vec<DocId> {
    let mut out = Vec::with_capacity(ids.len() + postings.len());
    let (mut i, mut j) = (0, 0);
    while i < ids.len() && j < postings.len() {
        match ids[i].cmp(&postings[j].doc_id) {
            Ordering::Less => {
                out.push(ids[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(postings[j].doc_id);
                j += 1;
            }
            Ordering::Equal => {
                out.push(ids[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&ids[i..]);
    out.extend(postings[j..].iter().map(|p| p.doc_id));
    out
}

fn doc_positions<'a>(
    reader: &'a IndexReader<'_>,
    term: &str,
    doc_id: DocId,
) -> Option<&'a [u32]> {
    let postings = reader.postings(term)?;
    let i = postings.binary_search_by_key(&doc_id, |p| p.doc_id).ok()?;
    Some(postings[i].positions.as_slice())
}

/// A document matches a phrase when some anchor position of the first term
/// lines up with every later term at the same relative offset the terms had
/// in the query text.
fn phrase_matches(reader: &IndexReader<'_>, phrase: &PhraseClause, doc_id: DocId) -> bool {
    let mut positions: Vec<&[u32]> = Vec::with_capacity(phrase.terms.len());
    for tok in &phrase.terms {
        match doc_positions(reader, &tok.term, doc_id) {
            Some(p) => positions.push(p),
            None => return false,
        }
    }
    let base = phrase.terms[0].position;
    positions[0].iter().any(|&anchor| {
        phrase.terms[1..]
            .iter()
            .zip(&positions[1..])
            .all(|(tok, term_positions)| {
                term_positions
                    .binary_search(&(anchor + (tok.position - base)))
                    .is_ok()
            })
    })
}

/// Plain-text excerpt around the earliest case-insensitive occurrence of any
/// query word, falling back to the document prefix. Rendering and markup
/// belong to the caller.
pub(crate) fn make_snippet(body: &str, raw_words: &[String]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let lowered = body.to_lowercase();
    let mut first: Option<usize> = None;
    for word in raw_words {
        let needle = word.to_lowercase();
        if needle.is_empty() {
            continue;
        }
        if let Some(i) = lowered.find(&needle) {
            first = Some(first.map_or(i, |f| f.min(i)));
        }
    }
    let snippet = match first {
        Some(i) => {
            let idx = i.min(body.len());
            let start = floor_char_boundary(body, idx.saturating_sub(SNIPPET_BEFORE));
            let end = ceil_char_boundary(body, (idx + SNIPPET_AFTER).min(body.len()));
            body[start..end].to_string()
        }
        None => body.chars().take(SNIPPET_AFTER).collect(),
    };
    Some(snippet)
}

fn floor_char_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(text: &str, mut i: usize) -> usize {
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}
