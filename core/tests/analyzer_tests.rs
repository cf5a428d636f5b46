use medsearch_core::{Analyzer, AnalyzerConfig};

#[test]
fn it_normalizes_and_stems() {
    let analyzer = Analyzer::default();
    let toks = analyzer.analyze("Running Runners RUN! The café menu.");
    let words: Vec<String> = toks.into_iter().map(|t| t.term).collect();
    // Stemming to "run" should appear
    assert!(words.contains(&"run".to_string()));
    // Unicode normalization: café -> cafe
    assert!(words.contains(&"cafe".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let analyzer = Analyzer::default();
    let toks = analyzer.analyze("The quick brown fox and the lazy dog");
    let words: Vec<String> = toks.into_iter().map(|t| t.term).collect();
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
}

#[test]
fn index_and_query_analysis_agree() {
    let analyzer = Analyzer::default();
    let doc_terms: Vec<String> = analyzer
        .analyze("Diabetes management strategies")
        .into_iter()
        .map(|t| t.term)
        .collect();
    let query_terms: Vec<String> = analyzer
        .analyze("diabetes MANAGEMENT")
        .into_iter()
        .map(|t| t.term)
        .collect();
    assert!(!query_terms.is_empty());
    assert!(query_terms.iter().all(|t| doc_terms.contains(t)));
}

#[test]
fn repeated_analysis_is_referentially_transparent() {
    let analyzer = Analyzer::new(AnalyzerConfig::default());
    let text = "Chronic obstructive pulmonary disease: maintenance therapy";
    assert_eq!(analyzer.analyze(text), analyzer.analyze(text));
}
