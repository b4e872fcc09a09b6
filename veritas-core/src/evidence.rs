//! Evidence engine (C6): extraction result post-processing (high-impact
//! safeguard, probative/provenance filtering, dedup, EvidenceScope capture)
//! and bounded-parallel extraction across fetched sources. See
//! `SPEC_FULL.md` §4.5.
//!
//! Parallel extraction is grounded on `epistemic/verifier.rs`'s
//! `BatchVerifier::verify_claims_batch`: fan out with
//! `futures::future::join_all` over cloned per-item futures, `allSettled`
//! semantics (a failure is recorded, not propagated to siblings).

use std::future::Future;

use crate::config::EvidenceConfig;
use crate::error::Result;
use crate::model::{EvidenceItem, FetchedSource, Specificity};
use crate::text::jaccard_similarity;

/// Drop evidence items describing high-impact outcomes (sentencing,
/// convictions, etc.) when the source's track record is known and below
/// the configured floor. Unknown track record (None) never triggers the
/// safeguard.
pub fn apply_high_impact_safeguard(
    items: Vec<EvidenceItem>,
    track_record_score: Option<f64>,
    config: &EvidenceConfig,
) -> Vec<EvidenceItem> {
    let Some(score) = track_record_score else {
        return items;
    };
    if score >= config.high_impact_track_record_floor {
        return items;
    }
    items
        .into_iter()
        .filter(|item| {
            let lower = item.statement.to_lowercase();
            !config
                .high_impact_outcome_phrases
                .iter()
                .any(|phrase| lower.contains(&phrase.to_lowercase()))
        })
        .collect()
}

/// Deterministic probative-value filter: drops low-probative items when
/// enabled, recording a reason per dropped item for telemetry.
pub fn probative_filter(items: Vec<EvidenceItem>, enabled: bool) -> (Vec<EvidenceItem>, Vec<(String, String)>) {
    if !enabled {
        return (items, Vec::new());
    }
    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for item in items {
        if item.probative_value == crate::model::ProbativeValue::Low {
            dropped.push((item.id.clone(), "low probative value".to_string()));
        } else if !item.is_admissible() {
            dropped.push((item.id.clone(), "specificity too low or excerpt too short".to_string()));
        } else {
            kept.push(item);
        }
    }
    (kept, dropped)
}

/// Drop items with no source URL or an empty excerpt when provenance
/// validation is enabled.
pub fn provenance_filter(items: Vec<EvidenceItem>, enabled: bool) -> Vec<EvidenceItem> {
    if !enabled {
        return items;
    }
    items
        .into_iter()
        .filter(|item| !item.source_url.is_empty() && !item.source_excerpt.is_empty())
        .collect()
}

/// Jaccard-similarity dedup against already-collected items; drops exact
/// matches and near-duplicates at or above `threshold`.
pub fn dedup_against_existing(
    candidates: Vec<EvidenceItem>,
    existing: &[EvidenceItem],
    threshold: f64,
) -> Vec<EvidenceItem> {
    let mut accepted: Vec<EvidenceItem> = Vec::new();
    for candidate in candidates {
        let is_dup = existing
            .iter()
            .chain(accepted.iter())
            .any(|e| jaccard_similarity(&e.statement, &candidate.statement) >= threshold);
        if !is_dup {
            accepted.push(candidate);
        }
    }
    accepted
}

/// Result of extracting evidence from one source.
pub struct SourceExtraction {
    pub source_id: String,
    pub items: std::result::Result<Vec<EvidenceItem>, crate::error::Error>,
}

/// Extract evidence from every source concurrently, bounded to
/// `worker_limit` in-flight extractions at a time. `allSettled` semantics:
/// a failed extraction is recorded and does not abort its siblings. On a
/// rate-limit error (`is_rate_limited` returns true for that source's
/// result) the worker limit is reduced by one (floor 1) for the remaining
/// chunks of this call.
pub async fn extract_parallel<F, Fut>(
    sources: &[FetchedSource],
    worker_limit: usize,
    extract_one: F,
) -> Vec<SourceExtraction>
where
    F: Fn(&FetchedSource) -> Fut,
    Fut: Future<Output = Result<Vec<EvidenceItem>>>,
{
    let mut results = Vec::with_capacity(sources.len());
    let mut limit = worker_limit.max(1);
    let mut remaining = sources;

    while !remaining.is_empty() {
        let chunk_len = remaining.len().min(limit);
        let (chunk, rest) = remaining.split_at(chunk_len);
        let futures = chunk.iter().map(|source| async {
            let outcome = extract_one(source).await;
            SourceExtraction {
                source_id: source.id.clone(),
                items: outcome,
            }
        });
        let chunk_results = futures::future::join_all(futures).await;

        if chunk_results.iter().any(|r| matches!(&r.items, Err(e) if is_rate_limited(e))) {
            limit = (limit.saturating_sub(1)).max(1);
        }

        results.extend(chunk_results);
        remaining = rest;
    }

    results
}

fn is_rate_limited(error: &crate::error::Error) -> bool {
    matches!(error, crate::error::Error::Fetch { message, .. } if message.contains("429") || message.contains("503"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClaimDirection, EvidenceBasis, ProbativeValue, SourceAuthority};

    fn item(id: &str, statement: &str, specificity: Specificity, probative: ProbativeValue) -> EvidenceItem {
        EvidenceItem {
            id: id.to_string(),
            statement: statement.to_string(),
            source_excerpt: "x".repeat(30),
            category: "general".into(),
            specificity,
            source_id: "S1".into(),
            source_url: "https://example.com".into(),
            source_title: "Example".into(),
            context_id: None,
            claim_direction: ClaimDirection::Neutral,
            source_authority: SourceAuthority::Secondary,
            evidence_basis: EvidenceBasis::Documented,
            probative_value: probative,
            evidence_scope: None,
            is_contested_claim: false,
            claim_source: None,
            from_opposite_claim_search: false,
        }
    }

    #[test]
    fn high_impact_safeguard_drops_on_low_track_record() {
        let config = EvidenceConfig::default();
        let items = vec![item("E1", "Defendant was sentenced to 10 years in prison", Specificity::High, ProbativeValue::High)];
        let filtered = apply_high_impact_safeguard(items, Some(0.3), &config);
        assert!(filtered.is_empty());
    }

    #[test]
    fn high_impact_safeguard_keeps_when_track_record_unknown() {
        let config = EvidenceConfig::default();
        let items = vec![item("E1", "Defendant was sentenced to 10 years in prison", Specificity::High, ProbativeValue::High)];
        let filtered = apply_high_impact_safeguard(items, None, &config);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn probative_filter_drops_low_value_items() {
        let items = vec![
            item("E1", "strong statement", Specificity::High, ProbativeValue::High),
            item("E2", "weak statement", Specificity::High, ProbativeValue::Low),
        ];
        let (kept, dropped) = probative_filter(items, true);
        assert_eq!(kept.len(), 1);
        assert_eq!(dropped.len(), 1);
    }

    #[test]
    fn dedup_drops_near_identical_statements() {
        let existing = vec![item("E1", "The policy reduced emissions by 20 percent", Specificity::High, ProbativeValue::High)];
        let candidates = vec![item("E2", "The policy reduced emissions by 20 percent", Specificity::High, ProbativeValue::High)];
        let accepted = dedup_against_existing(candidates, &existing, 0.85);
        assert!(accepted.is_empty());
    }

    #[tokio::test]
    async fn extract_parallel_reduces_workers_after_rate_limit() {
        let sources: Vec<FetchedSource> = (0..4)
            .map(|i| FetchedSource {
                id: format!("S{i}"),
                url: String::new(),
                title: String::new(),
                track_record_score: None,
                track_record_confidence: None,
                full_text: String::new(),
                fetched_at: chrono::Utc::now(),
                category: None,
                fetch_success: true,
                search_query: None,
            })
            .collect();

        let results = extract_parallel(&sources, 4, |source| {
            let id = source.id.clone();
            async move {
                if id == "S0" {
                    Err(crate::error::Error::fetch("u", "429 rate limited"))
                } else {
                    Ok(vec![])
                }
            }
        })
        .await;

        assert_eq!(results.len(), 4);
        assert!(results[0].items.is_err());
    }
}
