//! Research controller (C7): the per-iteration decision state machine,
//! recency detection, URL dedup, and the gap-driven follow-up phase.
//! See `SPEC_FULL.md` §4.6.
//!
//! The decision loop is grounded on `orchestrator.rs`'s `FallbackLoop`:
//! step, check trigger, extract-or-continue. Here the "trigger" is a
//! research-completeness gate instead of an execution-budget fallback.

use std::collections::HashSet;

use crate::budget::BudgetTracker;
use crate::config::{BudgetConfig, RecencyConfig};
use crate::model::TemporalContext;
use crate::text::overlap_ratio;

/// Why the research loop is stopping or continuing (§4.6 step 5).
#[derive(Debug, Clone, PartialEq)]
pub enum ResearchDecision {
    Continue,
    GapResearch { missing_categories: Vec<String> },
    Stop { reason: StopReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    SufficientCoverage,
    BudgetExhausted,
}

/// Coverage snapshot the decision function reasons over; built by the
/// orchestrator from `ResearchState` before each iteration.
pub struct CoverageSnapshot<'a> {
    pub evidence_count: usize,
    pub categories_present: &'a [String],
    pub min_evidence_required: usize,
    pub min_categories_required: usize,
    pub gap_research_already_run: bool,
}

const REQUIRED_CATEGORIES: &[&str] = &["supporting", "contradicting", "contextual"];

/// §4.6 step 5: the five-step decision in canonical order — budget first,
/// then completeness, then gap eligibility, then continue.
pub fn decide_next_step(
    snapshot: &CoverageSnapshot<'_>,
    tracker: &BudgetTracker,
    config: &BudgetConfig,
) -> ResearchDecision {
    if tracker.is_exceeded() {
        return ResearchDecision::Stop { reason: StopReason::BudgetExhausted };
    }

    let evidence_sufficient = snapshot.evidence_count >= snapshot.min_evidence_required;
    let categories_sufficient = snapshot.categories_present.len() >= snapshot.min_categories_required;

    if evidence_sufficient && categories_sufficient {
        return ResearchDecision::Stop { reason: StopReason::SufficientCoverage };
    }

    let missing: Vec<String> = REQUIRED_CATEGORIES
        .iter()
        .filter(|c| !snapshot.categories_present.iter().any(|p| p == *c))
        .map(|c| c.to_string())
        .collect();

    if !missing.is_empty() && !snapshot.gap_research_already_run && config.gap_research_enabled {
        return ResearchDecision::GapResearch { missing_categories: missing };
    }

    ResearchDecision::Continue
}

/// Strip scheme, `www.`, trailing slash, and common tracking query
/// parameters so equivalent URLs dedup against each other.
pub fn normalize_url_for_dedup(url: &str) -> String {
    let without_scheme = url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);

    let (path_and_query, _) = without_www.split_once('#').map_or((without_www, ""), |(a, b)| (a, b));
    let (path, query) = path_and_query.split_once('?').unwrap_or((path_and_query, ""));

    let cleaned_query: Vec<&str> = query
        .split('&')
        .filter(|p| !p.is_empty() && !p.starts_with("utm_") && !p.starts_with("fbclid") && !p.starts_with("ref"))
        .collect();

    let trimmed_path = path.trim_end_matches('/');
    let mut normalized = trimmed_path.to_lowercase();
    if !cleaned_query.is_empty() {
        let mut sorted = cleaned_query.clone();
        sorted.sort_unstable();
        normalized.push('?');
        normalized.push_str(&sorted.join("&").to_lowercase());
    }
    normalized
}

/// True when `url` has not been processed before, under dedup
/// normalization; does not mutate `processed`.
pub fn is_new_url(url: &str, processed: &HashSet<String>) -> bool {
    !processed.contains(&normalize_url_for_dedup(url))
}

const RECENCY_SIGNAL_WORDS: &[&str] = &[
    "today", "yesterday", "this week", "this month", "recently", "latest", "breaking",
    "just announced", "as of now", "currently", "ongoing",
];

/// Heuristic recency detector (§4.6 step 2): signal-word density against a
/// configured confidence threshold. LLM-based detection may override this
/// when `llm_features.context` is enabled; this is the deterministic floor.
pub fn detect_recency_sensitivity(text: &str, config: &RecencyConfig) -> TemporalContext {
    let lower = text.to_lowercase();
    let hits = RECENCY_SIGNAL_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let confidence = (hits as f64 / 3.0).min(1.0);
    TemporalContext {
        is_recency_sensitive: confidence >= config.temporal_confidence_threshold,
        confidence,
        note: if hits > 0 {
            Some(format!("{hits} recency signal word(s) detected"))
        } else {
            None
        },
    }
}

/// §4.6 step 3: relevance pre-filter before a fetched source is queued for
/// evidence extraction, avoiding spend on clearly-unrelated pages.
pub fn passes_relevance_prefilter(candidate_text: &str, thesis: &str, threshold: f64) -> bool {
    overlap_ratio(candidate_text, thesis) >= threshold
}

/// §4.6 step 4: fall back to grounded search when standard search starved
/// (too few results to make progress).
pub fn should_use_grounded_fallback(standard_result_count: usize, min_results: usize) -> bool {
    standard_result_count < min_results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(evidence: usize, categories: &[String], gap_run: bool) -> CoverageSnapshot<'_> {
        CoverageSnapshot {
            evidence_count: evidence,
            categories_present: categories,
            min_evidence_required: 4,
            min_categories_required: 2,
            gap_research_already_run: gap_run,
        }
    }

    #[test]
    fn decide_next_step_stops_on_exhausted_budget() {
        let mut tracker = BudgetTracker::default();
        let config = BudgetConfig { max_total_iterations: 1, ..BudgetConfig::default() };
        tracker.record_iteration(None, &config);
        tracker.record_iteration(None, &config);
        let categories = vec!["supporting".to_string()];
        let snap = snapshot(1, &categories, false);
        assert_eq!(decide_next_step(&snap, &tracker, &config), ResearchDecision::Stop { reason: StopReason::BudgetExhausted });
    }

    #[test]
    fn decide_next_step_requests_gap_research_when_category_missing() {
        let tracker = BudgetTracker::default();
        let config = BudgetConfig::default();
        let categories = vec!["supporting".to_string()];
        let snap = snapshot(5, &categories, false);
        match decide_next_step(&snap, &tracker, &config) {
            ResearchDecision::GapResearch { missing_categories } => {
                assert!(missing_categories.contains(&"contradicting".to_string()));
            }
            other => panic!("expected gap research, got {other:?}"),
        }
    }

    #[test]
    fn decide_next_step_stops_on_sufficient_coverage() {
        let tracker = BudgetTracker::default();
        let config = BudgetConfig::default();
        let categories = vec!["supporting".to_string(), "contradicting".to_string()];
        let snap = snapshot(4, &categories, true);
        assert_eq!(decide_next_step(&snap, &tracker, &config), ResearchDecision::Stop { reason: StopReason::SufficientCoverage });
    }

    #[test]
    fn normalize_url_strips_scheme_www_trailing_slash_and_tracking_params() {
        let a = normalize_url_for_dedup("https://www.example.com/story/?utm_source=x&id=7");
        let b = normalize_url_for_dedup("http://example.com/story?id=7");
        assert_eq!(a, b);
    }

    #[test]
    fn is_new_url_detects_previously_seen_equivalent_url() {
        let mut processed = HashSet::new();
        processed.insert(normalize_url_for_dedup("https://www.site.com/a/"));
        assert!(!is_new_url("http://site.com/a", &processed));
        assert!(is_new_url("http://site.com/b", &processed));
    }

    #[test]
    fn detect_recency_sensitivity_flags_strong_signal_density() {
        let config = RecencyConfig::default();
        let result = detect_recency_sensitivity("Breaking: as of now, the situation is ongoing and currently escalating", &config);
        assert!(result.is_recency_sensitive);
    }

    #[test]
    fn should_use_grounded_fallback_when_standard_search_starves() {
        assert!(should_use_grounded_fallback(1, 3));
        assert!(!should_use_grounded_fallback(5, 3));
    }
}
