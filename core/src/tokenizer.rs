use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// A normalized term and the ordinal of the word match it came from.
///
/// Positions count every regex match, including words later dropped as stop
/// words, so the gaps they leave are visible to phrase matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    pub position: u32,
}

/// Analysis configuration. Indexing and querying must run with the same
/// configuration or terms will not line up.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Lowercase after unicode normalization.
    pub fold_case: bool,
    /// Drop tokens found in the built-in English stop-word set.
    pub filter_stopwords: bool,
    /// Reduce tokens to Snowball (English) stems.
    pub stem: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fold_case: true,
            filter_stopwords: true,
            stem: true,
        }
    }
}

/// Turns raw text into index terms: NFKD normalization with combining marks
/// stripped, case folding, word extraction, stop-word removal, stemming.
pub struct Analyzer {
    config: AnalyzerConfig,
    stemmer: Option<Stemmer>,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let stemmer = config.stem.then(|| Stemmer::create(Algorithm::English));
        Self { config, stemmer }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Tokenize `text` into (term, position) pairs. Deterministic and free of
    /// side effects; empty and all-stop-word inputs yield an empty sequence.
    pub fn analyze(&self, text: &str) -> Vec<Token> {
        if text.is_empty() {
            return Vec::new();
        }
        let decomposed: String = text.nfkd().filter(|c| !is_combining_mark(*c)).collect();
        let normalized = if self.config.fold_case {
            decomposed.to_lowercase()
        } else {
            decomposed
        };
        let mut tokens = Vec::new();
        for (pos, mat) in RE.find_iter(&normalized).enumerate() {
            let token = mat.as_str();
            if self.config.filter_stopwords && STOPWORDS.contains(token) {
                continue;
            }
            let term = match &self.stemmer {
                Some(stemmer) => stemmer.stem(token).to_string(),
                None => token.to_string(),
            };
            tokens.push(Token {
                term,
                position: pos as u32,
            });
        }
        tokens
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}
