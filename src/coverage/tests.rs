use super::*;
use crate::chunker::FolderType;

fn result(id: &str, score: f32, snippet: &str, section: Option<&str>) -> RetrievalResult {
    RetrievalResult {
        id: id.to_string(),
        folder_type: FolderType::Handbook,
        doc_name: "mutcd-part6".to_string(),
        doc_path: "corpus/handbooks/mutcd-part6.txt".to_string(),
        page_number: None,
        section_or_figure: section.map(ToString::to_string),
        score,
        snippet: snippet.to_string(),
    }
}

fn topics(labels: &[&str]) -> Vec<String> {
    labels.iter().map(ToString::to_string).collect()
}

#[test]
fn strong_top_result_is_sufficient() {
    let results = vec![result(
        "handbook-mutcd-part6-0",
        0.82,
        "Merging taper length is computed from speed and offset.",
        None,
    )];

    let verdict = assess_coverage(&results, &[]);
    assert!(verdict.sufficient);
    assert!(verdict.missing.is_empty());
    assert_eq!(verdict.detail.top_score, Some(0.82));
    assert_eq!(verdict.detail.handbook_results, 1);
}

#[test]
fn top_score_below_threshold_is_insufficient() {
    let results = vec![
        result("handbook-mutcd-part6-0", 0.21, "weakly related text", None),
        result("handbook-mutcd-part6-1", 0.10, "even less related", None),
    ];

    let verdict = assess_coverage(&results, &[]);
    assert!(!verdict.sufficient);
    assert_eq!(verdict.detail.top_score, Some(0.21));
    assert_eq!(verdict.detail.threshold, MIN_RELEVANCE_SCORE);
}

#[test]
fn empty_result_set_reports_all_topics_missing() {
    let required = topics(&["taper length", "sign spacing"]);
    let verdict = assess_coverage(&[], &required);

    assert!(!verdict.sufficient);
    assert_eq!(verdict.detail.top_score, None);
    assert_eq!(verdict.missing, required);
}

#[test]
fn topics_matched_in_snippet_or_section_label() {
    let results = vec![
        result(
            "handbook-mutcd-part6-0",
            0.71,
            "The merging TAPER LENGTH shall not be less than the table value.",
            None,
        ),
        result(
            "handbook-mutcd-part6-1",
            0.64,
            "Distances between advance warning signs.",
            Some("Table 6C-1 Sign Spacing"),
        ),
    ];
    let required = topics(&["taper length", "sign spacing", "flagger station"]);

    let verdict = assess_coverage(&results, &required);
    assert!(!verdict.sufficient);
    assert_eq!(verdict.missing, topics(&["flagger station"]));
    assert_eq!(
        verdict.detail.covered_topics,
        topics(&["taper length", "sign spacing"])
    );
}

#[test]
fn all_topics_covered_with_strong_score_passes() {
    let results = vec![result(
        "handbook-mutcd-part6-0",
        0.55,
        "Buffer space and taper length requirements for lane closures.",
        None,
    )];

    let verdict = assess_coverage(&results, &topics(&["buffer space", "taper length"]));
    assert!(verdict.sufficient);
    assert!(verdict.missing.is_empty());
}

#[test]
fn verdict_is_deterministic() {
    let results = vec![result("handbook-mutcd-part6-0", 0.4, "taper text", None)];
    let required = topics(&["taper"]);

    let first = assess_coverage(&results, &required);
    let second = assess_coverage(&results, &required);
    assert_eq!(first, second);
}
