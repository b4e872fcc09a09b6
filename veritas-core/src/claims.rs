//! Claim engine (C5): importance normalization, thesis-relevance policy,
//! counter-claim heuristic, minimum direct coverage, heuristic backfill.
//! See `SPEC_FULL.md` §4.4.
//!
//! The heuristic backfill and counter-claim detection are grounded on
//! `epistemic/claims.rs`'s `ClaimExtractor` (sentence splitting +
//! signal-word classification), generalized from code-behavior claim
//! categories to thesis-relevance/centrality classification.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::{Centrality, ClaimRole, ClaimType, HarmPotential, SubClaim, ThesisRelevance};
use crate::text::{overlap_ratio, split_sentences, tokenize};

pub const MIN_CORE_CLAIMS_PER_PROCEEDING: usize = 2;

fn negation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(not|no|never|failed to|did not|false|incorrect|unfounded|disproven)\b").unwrap()
    })
}

/// Roles whose claims are never central and never more than tangential
/// contributors to the thesis (§4.4).
fn is_non_central_role(role: ClaimRole) -> bool {
    matches!(role, ClaimRole::Attribution | ClaimRole::Source | ClaimRole::Timing)
}

/// Deterministic post-process run after every LLM write to `subClaims`:
/// forces attribution/source/timing claims to low centrality, and enforces
/// `isCentral == (centrality == High)`, with a hard cap of 1-2 high-
/// centrality claims per context (demotion by claim order on violation).
pub fn normalize_importance(claims: &mut [SubClaim], max_high_centrality_per_context: usize) {
    for claim in claims.iter_mut() {
        if is_non_central_role(claim.claim_role) {
            claim.centrality = Centrality::Low;
        }
    }

    let mut high_seen: std::collections::HashMap<Option<String>, usize> = std::collections::HashMap::new();
    for claim in claims.iter_mut() {
        if claim.centrality == Centrality::High {
            let count = high_seen.entry(claim.context_id.clone()).or_insert(0);
            *count += 1;
            if *count > max_high_centrality_per_context {
                claim.centrality = Centrality::Medium;
            }
        }
    }
}

/// §4.4: low-confidence direct claims get downgraded; non-direct claims
/// are forced to low centrality.
pub fn validate_thesis_relevance(
    claims: &mut [SubClaim],
    low_threshold: f64,
    auto_downgrade_threshold: f64,
) {
    for claim in claims.iter_mut() {
        if claim.thesis_relevance == ThesisRelevance::Direct
            && claim.thesis_relevance_confidence < low_threshold
            && claim.thesis_relevance_confidence < auto_downgrade_threshold
        {
            claim.thesis_relevance = ThesisRelevance::Tangential;
        }
        if claim.thesis_relevance != ThesisRelevance::Direct {
            claim.centrality = Centrality::Low;
        }
    }
}

/// Promote tangential claims with strong thesis-token overlap to direct;
/// demote any central claim that isn't direct.
pub fn enforce_thesis_relevance_invariants(claims: &mut [SubClaim], thesis: &str) {
    for claim in claims.iter_mut() {
        if claim.thesis_relevance == ThesisRelevance::Tangential && overlap_ratio(&claim.text, thesis) >= 0.5 {
            claim.thesis_relevance = ThesisRelevance::Direct;
        }
        if claim.centrality == Centrality::High && claim.thesis_relevance != ThesisRelevance::Direct {
            claim.thesis_relevance = ThesisRelevance::Direct;
        }
        if claim.thesis_relevance != ThesisRelevance::Direct {
            claim.centrality = Centrality::Low;
        }
    }
}

/// Policy B: drop irrelevant claims entirely, removing dangling
/// `dependsOn` references to the dropped ids.
pub fn drop_irrelevant_claims(claims: Vec<SubClaim>) -> Vec<SubClaim> {
    let dropped_ids: std::collections::HashSet<String> = claims
        .iter()
        .filter(|c| c.thesis_relevance == ThesisRelevance::Irrelevant)
        .map(|c| c.id.clone())
        .collect();

    claims
        .into_iter()
        .filter(|c| c.thesis_relevance != ThesisRelevance::Irrelevant)
        .map(|mut c| {
            c.depends_on.retain(|d| !dropped_ids.contains(d));
            c
        })
        .collect()
}

/// Ensure each context has at least `min` direct claims, promoting
/// eligible tangential claims (not attribution/source/timing, not
/// low check-worthiness) in order of highest check-worthiness first.
pub fn ensure_minimum_direct_coverage(claims: &mut [SubClaim], min: usize) {
    let mut by_context: std::collections::HashMap<Option<String>, Vec<usize>> = std::collections::HashMap::new();
    for (i, c) in claims.iter().enumerate() {
        by_context.entry(c.context_id.clone()).or_default().push(i);
    }

    for (_, indices) in by_context {
        let direct_count = indices
            .iter()
            .filter(|&&i| claims[i].thesis_relevance == ThesisRelevance::Direct)
            .count();
        if direct_count >= min {
            continue;
        }
        let mut needed = min - direct_count;
        let mut candidates: Vec<usize> = indices
            .into_iter()
            .filter(|&i| {
                claims[i].thesis_relevance != ThesisRelevance::Direct
                    && !is_non_central_role(claims[i].claim_role)
                    && claims[i].check_worthiness >= 40.0
            })
            .collect();
        candidates.sort_by(|&a, &b| claims[b].check_worthiness.partial_cmp(&claims[a].check_worthiness).unwrap());
        for i in candidates {
            if needed == 0 {
                break;
            }
            claims[i].thesis_relevance = ThesisRelevance::Direct;
            needed -= 1;
        }
    }
}

/// Deterministic counter-claim heuristic: negation/opposite-polarity
/// tokens relative to the thesis. Used only when the LLM did not already
/// flag `isCounterClaim`.
pub fn detect_counter_claim_heuristic(claim_text: &str, thesis: &str) -> bool {
    let claim_negated = negation_re().is_match(claim_text);
    let thesis_negated = negation_re().is_match(thesis);
    let shares_subject = overlap_ratio(claim_text, thesis) >= 0.3;
    shares_subject && claim_negated != thesis_negated
}

/// Derive heuristic atomic claims from raw input text when LLM backfill
/// yields nothing: sentence-segment, filter stopword-only fragments, and
/// emit core/direct/medium-centrality claims.
pub fn heuristic_backfill(input: &str, context_id: Option<String>, existing_count: usize) -> Vec<SubClaim> {
    split_sentences(input)
        .into_iter()
        .filter(|s| tokenize(s).len() >= 3)
        .enumerate()
        .map(|(i, text)| SubClaim {
            id: format!("SC{}", existing_count + i + 1),
            text,
            claim_type: ClaimType::Factual,
            claim_role: ClaimRole::Core,
            depends_on: Vec::new(),
            check_worthiness: 50.0,
            harm_potential: HarmPotential::Medium,
            centrality: Centrality::Medium,
            thesis_relevance: ThesisRelevance::Direct,
            thesis_relevance_confidence: 60.0,
            is_counter_claim: false,
            context_id: context_id.clone(),
            key_factor_id: None,
        })
        .collect()
}

/// Duplicate-detection for supplemental-claim backfill: reject a candidate
/// whose normalized text matches an existing claim.
pub fn is_duplicate_claim(candidate_text: &str, existing: &[SubClaim]) -> bool {
    let candidate_norm = crate::text::normalize(candidate_text);
    existing
        .iter()
        .any(|c| crate::text::normalize(&c.text) == candidate_norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(id: &str, role: ClaimRole, centrality: Centrality, relevance: ThesisRelevance) -> SubClaim {
        SubClaim {
            id: id.to_string(),
            text: format!("claim {id}"),
            claim_type: ClaimType::Factual,
            claim_role: role,
            depends_on: vec![],
            check_worthiness: 80.0,
            harm_potential: HarmPotential::Medium,
            centrality,
            thesis_relevance: relevance,
            thesis_relevance_confidence: 90.0,
            is_counter_claim: false,
            context_id: None,
            key_factor_id: None,
        }
    }

    #[test]
    fn normalize_importance_forces_attribution_to_low_centrality() {
        let mut claims = vec![claim("SC1", ClaimRole::Attribution, Centrality::High, ThesisRelevance::Direct)];
        normalize_importance(&mut claims, 2);
        assert_eq!(claims[0].centrality, Centrality::Low);
    }

    #[test]
    fn normalize_importance_caps_high_centrality_per_context() {
        let mut claims = vec![
            claim("SC1", ClaimRole::Core, Centrality::High, ThesisRelevance::Direct),
            claim("SC2", ClaimRole::Core, Centrality::High, ThesisRelevance::Direct),
            claim("SC3", ClaimRole::Core, Centrality::High, ThesisRelevance::Direct),
        ];
        normalize_importance(&mut claims, 2);
        let high_count = claims.iter().filter(|c| c.centrality == Centrality::High).count();
        assert_eq!(high_count, 2);
    }

    #[test]
    fn non_direct_claims_are_forced_to_low_centrality() {
        let mut claims = vec![claim("SC1", ClaimRole::Core, Centrality::High, ThesisRelevance::Tangential)];
        validate_thesis_relevance(&mut claims, 70.0, 60.0);
        assert_eq!(claims[0].centrality, Centrality::Low);
    }

    #[test]
    fn drop_irrelevant_claims_removes_dangling_dependency() {
        let mut a = claim("SC1", ClaimRole::Core, Centrality::Low, ThesisRelevance::Irrelevant);
        let mut b = claim("SC2", ClaimRole::Core, Centrality::Medium, ThesisRelevance::Direct);
        b.depends_on.push("SC1".to_string());
        a.depends_on.clear();
        let result = drop_irrelevant_claims(vec![a, b]);
        assert_eq!(result.len(), 1);
        assert!(result[0].depends_on.is_empty());
    }

    #[test]
    fn counter_claim_heuristic_detects_negated_sibling() {
        assert!(detect_counter_claim_heuristic(
            "The policy was not effective at reducing costs",
            "The policy was effective at reducing costs"
        ));
        assert!(!detect_counter_claim_heuristic(
            "The policy was effective at reducing costs",
            "The policy was effective at reducing costs"
        ));
    }

    #[test]
    fn heuristic_backfill_produces_direct_core_claims() {
        let claims = heuristic_backfill("The budget was approved unanimously. It takes effect in March.", None, 0);
        assert_eq!(claims.len(), 2);
        assert!(claims.iter().all(|c| c.thesis_relevance == ThesisRelevance::Direct));
        assert_eq!(claims[0].id, "SC1");
    }

    #[test]
    fn ensure_minimum_direct_coverage_promotes_highest_check_worthiness_first() {
        let mut claims = vec![
            claim("SC1", ClaimRole::Core, Centrality::Low, ThesisRelevance::Direct),
            claim("SC2", ClaimRole::Core, Centrality::Low, ThesisRelevance::Tangential),
            claim("SC3", ClaimRole::Core, Centrality::Low, ThesisRelevance::Tangential),
        ];
        claims[1].check_worthiness = 90.0;
        claims[2].check_worthiness = 50.0;
        ensure_minimum_direct_coverage(&mut claims, 2);
        assert_eq!(claims[1].thesis_relevance, ThesisRelevance::Direct);
        assert_eq!(claims[2].thesis_relevance, ThesisRelevance::Tangential);
    }
}
