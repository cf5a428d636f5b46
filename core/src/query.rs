use crate::error::{Result, SearchError};
use crate::tokenizer::{Analyzer, Token};

/// A phrase clause: analyzer tokens from the quoted text, positions kept so
/// stop-word gaps inside the phrase still line up against documents.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseClause {
    pub terms: Vec<Token>,
}

/// A raw query string decomposed into clauses and normalized.
///
/// Default semantics are AND over `required`; `-term` populates `excluded`;
/// `"quoted text"` becomes a phrase clause and `-"quoted text"` an excluded
/// phrase. `required` keeps duplicates so repeated query terms weigh more.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    pub required: Vec<String>,
    pub excluded: Vec<String>,
    pub phrases: Vec<PhraseClause>,
    pub excluded_phrases: Vec<PhraseClause>,
}

impl ParsedQuery {
    /// True when no positive clause survived normalization. Such a query
    /// matches nothing by definition.
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.phrases.is_empty()
    }

    /// Every term that must be present in a matching document: required
    /// terms plus all phrase terms, duplicates included.
    pub fn positive_terms(&self) -> impl Iterator<Item = &str> {
        self.required
            .iter()
            .map(String::as_str)
            .chain(
                self.phrases
                    .iter()
                    .flat_map(|p| p.terms.iter().map(|t| t.term.as_str())),
            )
    }
}

/// Splits `raw` into clauses, then runs each through the analyzer. Clauses
/// that normalize to nothing are dropped; a phrase reduced to one term is
/// demoted to a plain term. An unterminated quote is a validation error.
pub fn parse_query(analyzer: &Analyzer, raw: &str) -> Result<ParsedQuery> {
    let mut query = ParsedQuery::default();
    let mut rest = raw.trim_start();
    while !rest.is_empty() {
        let mut negated = false;
        if let Some(stripped) = rest.strip_prefix('-') {
            negated = true;
            rest = stripped;
        }
        if let Some(stripped) = rest.strip_prefix('"') {
            match stripped.find('"') {
                Some(end) => {
                    add_phrase(analyzer, &mut query, &stripped[..end], negated);
                    rest = &stripped[end + 1..];
                }
                None => {
                    return Err(SearchError::Validation(format!(
                        "unterminated phrase quote in query {raw:?}"
                    )));
                }
            }
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            add_terms(analyzer, &mut query, &rest[..end], negated);
            rest = &rest[end..];
        }
        rest = rest.trim_start();
    }
    Ok(query)
}

fn add_terms(analyzer: &Analyzer, query: &mut ParsedQuery, word: &str, negated: bool) {
    for tok in analyzer.analyze(word) {
        if negated {
            query.excluded.push(tok.term);
        } else {
            query.required.push(tok.term);
        }
    }
}

fn add_phrase(analyzer: &Analyzer, query: &mut ParsedQuery, quoted: &str, negated: bool) {
    let mut terms = analyzer.analyze(quoted);
    match terms.len() {
        0 => {}
        1 => {
            let tok = terms.remove(0);
            if negated {
                query.excluded.push(tok.term);
            } else {
                query.required.push(tok.term);
            }
        }
        _ => {
            let clause = PhraseClause { terms };
            if negated {
                query.excluded_phrases.push(clause);
            } else {
                query.phrases.push(clause);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> Analyzer {
        Analyzer::default()
    }

    #[test]
    fn plain_terms_are_required() {
        let q = parse_query(&analyzer(), "diabetes insulin").unwrap();
        assert_eq!(q.required.len(), 2);
        assert!(q.excluded.is_empty());
        assert!(q.phrases.is_empty());
    }

    #[test]
    fn leading_dash_excludes() {
        let q = parse_query(&analyzer(), "diabetes -insulin").unwrap();
        assert_eq!(q.required.len(), 1);
        assert_eq!(q.excluded.len(), 1);
    }

    #[test]
    fn quoted_text_becomes_a_phrase() {
        let q = parse_query(&analyzer(), "\"insulin therapy\" checkup").unwrap();
        assert_eq!(q.phrases.len(), 1);
        assert_eq!(q.phrases[0].terms.len(), 2);
        assert_eq!(q.required.len(), 1);
    }

    #[test]
    fn negated_phrase_is_excluded() {
        let q = parse_query(&analyzer(), "diabetes -\"insulin therapy\"").unwrap();
        assert_eq!(q.excluded_phrases.len(), 1);
        assert!(q.excluded.is_empty());
    }

    #[test]
    fn single_term_phrase_demotes_to_term() {
        let q = parse_query(&analyzer(), "\"diabetes\"").unwrap();
        assert!(q.phrases.is_empty());
        assert_eq!(q.required.len(), 1);
    }

    #[test]
    fn stopword_only_clauses_vanish() {
        let q = parse_query(&analyzer(), "the -of \"and the\"").unwrap();
        assert!(q.is_empty());
        assert!(q.excluded.is_empty());
        assert!(q.excluded_phrases.is_empty());
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        let err = parse_query(&analyzer(), "\"insulin therapy").unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));
    }

    #[test]
    fn bare_dash_is_ignored() {
        let q = parse_query(&analyzer(), "- diabetes").unwrap();
        assert_eq!(q.required.len(), 1);
        assert!(q.excluded.is_empty());
    }

    #[test]
    fn phrase_terms_keep_stopword_gaps() {
        let q = parse_query(&analyzer(), "\"signs of diabetes\"").unwrap();
        let positions: Vec<u32> = q.phrases[0].terms.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 2]);
    }

    #[test]
    fn empty_query_parses_to_empty() {
        let q = parse_query(&analyzer(), "").unwrap();
        assert!(q.is_empty());
        let q = parse_query(&analyzer(), "   ").unwrap();
        assert!(q.is_empty());
    }

    #[test]
    fn repeated_terms_keep_their_multiplicity() {
        let q = parse_query(&analyzer(), "diabetes diabetes").unwrap();
        assert_eq!(q.required.len(), 2);
        assert_eq!(q.required[0], q.required[1]);
    }
}
