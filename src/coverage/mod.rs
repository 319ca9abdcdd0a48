#[cfg(test)]
mod tests;

use serde::Serialize;

use crate::retriever::RetrievalResult;

/// Minimum cosine score the best handbook match must reach before
/// generation is allowed to proceed.
pub const MIN_RELEVANCE_SCORE: f32 = 0.35;

/// Supporting numbers behind a coverage verdict, enough for the caller to
/// render an explanation instead of a bare failure.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoverageDetail {
    pub top_score: Option<f32>,
    pub threshold: f32,
    pub handbook_results: usize,
    pub covered_topics: Vec<String>,
}

/// The coverage gate's verdict for one generation request.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoverageAssessment {
    pub sufficient: bool,
    pub missing: Vec<String>,
    pub detail: CoverageDetail,
}

/// Decide whether the retrieved handbook evidence is strong enough to ground
/// generation.
///
/// Coverage is insufficient when the handbook result set is empty, when the
/// top result's score falls below [`MIN_RELEVANCE_SCORE`], or when any
/// required topic has no supporting chunk. Pure function of its inputs: no
/// I/O, deterministic.
#[inline]
pub fn assess_coverage(
    handbook_results: &[RetrievalResult],
    required_topics: &[String],
) -> CoverageAssessment {
    // Results arrive ordered by descending score, so the first is the top.
    let top_score = handbook_results.first().map(|result| result.score);

    let mut covered = Vec::new();
    let mut missing = Vec::new();
    for topic in required_topics {
        if handbook_results.iter().any(|r| supports_topic(r, topic)) {
            covered.push(topic.clone());
        } else {
            missing.push(topic.clone());
        }
    }

    let relevant = top_score.is_some_and(|score| score >= MIN_RELEVANCE_SCORE);
    let sufficient = relevant && missing.is_empty();

    CoverageAssessment {
        sufficient,
        missing,
        detail: CoverageDetail {
            top_score,
            threshold: MIN_RELEVANCE_SCORE,
            handbook_results: handbook_results.len(),
            covered_topics: covered,
        },
    }
}

/// A topic counts as covered when its label appears in a result's snippet or
/// section label, case-insensitively.
fn supports_topic(result: &RetrievalResult, topic: &str) -> bool {
    let needle = topic.to_lowercase();
    if needle.is_empty() {
        return true;
    }

    if result.snippet.to_lowercase().contains(&needle) {
        return true;
    }

    result
        .section_or_figure
        .as_ref()
        .is_some_and(|label| label.to_lowercase().contains(&needle))
}
