//! Natural-language query routing.
//!
//! A local keyword classifier: deterministic, fast, and good enough for the
//! four intents the orchestrator dispatches on. Every result carries a
//! confidence; below the threshold the router falls back to a status query.
//! An LLM-backed classifier can replace [`classify_query`] behind the same
//! signature.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use smartspec_utils::SpecId;

/// Confidence floor below which the router falls back to `status_query`.
pub const CONFIDENCE_FALLBACK_THRESHOLD: f64 = 0.6;

static SPEC_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"spec-[a-z][a-z0-9]*-\d{3}-[a-z0-9]+(?:-[a-z0-9]+)*")
        .expect("spec id scan regex is valid")
});

/// What kind of question the input is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    StatusQuery,
    RecommendationQuery,
    ExistenceQuery,
    ComplexQuery,
}

/// Classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedQuery {
    pub intent: QueryIntent,
    /// Confidence in [0, 1] for the intent *before* fallback.
    pub confidence: f64,
    /// True when low confidence forced the status fallback.
    pub fell_back: bool,
    pub spec_id: Option<SpecId>,
}

const STATUS_MARKERS: &[&str] = &[
    "status", "state", "progress", "how far", "where are we", "where is",
];
const RECOMMENDATION_MARKERS: &[&str] = &[
    "next", "what should", "recommend", "what now", "now what", "continue", "proceed",
];
const EXISTENCE_MARKERS: &[&str] = &[
    "exist", "is there", "do we have", "does the", "any spec", "already",
];
const COMPLEX_MARKERS: &[&str] = &["and then", "after that", "why", "compare", "explain", ";"];

fn score(haystack: &str, markers: &[&str]) -> f64 {
    let hits = markers.iter().filter(|m| haystack.contains(*m)).count();
    match hits {
        0 => 0.0,
        1 => 0.7,
        2 => 0.85,
        _ => 0.95,
    }
}

/// Classify a natural-language input.
///
/// Deterministic: lowercases, scores marker sets, picks the best, extracts
/// a spec id when one appears. Low confidence falls back to status ("show
/// me status" is always safe to answer).
#[must_use]
pub fn classify_query(input: &str) -> RoutedQuery {
    let lowered = input.to_lowercase();

    let spec_id = SPEC_ID_RE
        .find(&lowered)
        .and_then(|m| SpecId::parse(m.as_str()).ok());

    let mut scored = [
        (QueryIntent::ComplexQuery, score(&lowered, COMPLEX_MARKERS)),
        (QueryIntent::StatusQuery, score(&lowered, STATUS_MARKERS)),
        (
            QueryIntent::RecommendationQuery,
            score(&lowered, RECOMMENDATION_MARKERS),
        ),
        (
            QueryIntent::ExistenceQuery,
            score(&lowered, EXISTENCE_MARKERS),
        ),
    ];
    // Stable: earlier entries win ties, so a query that chains clauses is
    // complex even when it also mentions status.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let (intent, confidence) = scored[0];

    // Very long multi-clause inputs are complex even without markers.
    let (intent, confidence) = if confidence == 0.0 && lowered.len() > 120 {
        (QueryIntent::ComplexQuery, 0.65)
    } else {
        (intent, confidence)
    };

    if confidence < CONFIDENCE_FALLBACK_THRESHOLD {
        RoutedQuery {
            intent: QueryIntent::StatusQuery,
            confidence,
            fell_back: true,
            spec_id,
        }
    } else {
        RoutedQuery {
            intent,
            confidence,
            fell_back: false,
            spec_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_questions_classify_with_confidence() {
        let routed = classify_query("What's the status of spec-core-001-auth?");
        assert_eq!(routed.intent, QueryIntent::StatusQuery);
        assert!(routed.confidence >= CONFIDENCE_FALLBACK_THRESHOLD);
        assert!(!routed.fell_back);
        assert_eq!(
            routed.spec_id.unwrap().to_string(),
            "spec-core-001-auth"
        );
    }

    #[test]
    fn recommendation_questions_route_to_recommendation() {
        let routed = classify_query("what should I do next on spec-feat-002-billing");
        assert_eq!(routed.intent, QueryIntent::RecommendationQuery);
        assert!(routed.spec_id.is_some());
    }

    #[test]
    fn existence_questions_route_to_existence() {
        let routed = classify_query("is there a spec for payment retries already?");
        assert_eq!(routed.intent, QueryIntent::ExistenceQuery);
        assert!(routed.spec_id.is_none());
    }

    #[test]
    fn multi_clause_questions_are_complex() {
        let routed =
            classify_query("verify the tasks and then explain why the gateway failed");
        assert_eq!(routed.intent, QueryIntent::ComplexQuery);
    }

    #[test]
    fn gibberish_falls_back_to_status() {
        let routed = classify_query("florble the quux");
        assert_eq!(routed.intent, QueryIntent::StatusQuery);
        assert!(routed.fell_back);
        assert!(routed.confidence < CONFIDENCE_FALLBACK_THRESHOLD);
    }

    #[test]
    fn classification_is_deterministic() {
        let a = classify_query("show me progress on spec-core-001-auth");
        let b = classify_query("show me progress on spec-core-001-auth");
        assert_eq!(a, b);
    }
}
