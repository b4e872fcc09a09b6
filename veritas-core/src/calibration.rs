//! Calibration & aggregation (C9): the exact 10-step canonical order run
//! once per claim verdict before publication, plus the weighted
//! dependency-aware aggregation used for multi-context/article rollups.
//! See `SPEC_FULL.md` §4.8.
//!
//! `CENTRALITY_MULTIPLIERS` and `DEFAULT_UNKNOWN_SOURCE_SCORE` are defined
//! here exactly once (spec §9 Open Question 4) — every call site that
//! needs them (including `claims.rs`'s importance normalization, via
//! `pub use`) reads these constants rather than redefining them.
//!
//! The clamped-arithmetic style is grounded on `epistemic/kl.rs`'s
//! probability clamping (`clamp(1e-10, 1 - 1e-10)` before taking logs);
//! here the clamp guards the final percentage instead of a log argument.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::VerdictConfig;
use crate::model::{
    Centrality, ClaimDirection, ClaimVerdict, ConfidenceTier, EvidenceItem, FactorPolarity,
    FactualBasis, FetchedSource, HighlightColor, KeyFactor, RatingConfirmation,
};
use crate::text::jaccard_similarity;
use crate::verdict::highlight_color;

/// Weight multiplier applied to a claim's contribution to an aggregate
/// verdict, keyed by centrality (§4.8 step 5).
pub const CENTRALITY_MULTIPLIERS: (f64, f64, f64) = (3.0, 2.0, 1.0); // (high, medium, low)

/// Used in place of an unknown source's track record when computing the
/// evidence weighting formula (§4.8 step 7).
pub const DEFAULT_UNKNOWN_SOURCE_SCORE: f64 = 0.5;

pub fn centrality_multiplier(c: Centrality) -> f64 {
    match c {
        Centrality::High => CENTRALITY_MULTIPLIERS.0,
        Centrality::Medium => CENTRALITY_MULTIPLIERS.1,
        Centrality::Low => CENTRALITY_MULTIPLIERS.2,
    }
}

fn inversion_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(claim is (false|incorrect|unfounded|disproven)|does not hold|contradicted by)\b").unwrap())
}

/// Temporal-error phrases that indicate the model misread its own
/// knowledge cutoff against the claim's actual timeframe (§4.8 step 1).
fn temporal_error_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(temporal error|in the future|date discrepancy)").unwrap())
}

/// Step 1: strip temporal-error phrases that indicate the model mistook
/// the claim's date for one beyond its own knowledge cutoff, replacing
/// them with a neutral marker rather than leaving the confusion visible.
fn sanitize_reasoning(reasoning: &str) -> String {
    temporal_error_re().replace_all(reasoning.trim(), "[date evaluated]").trim().to_string()
}

/// Step 2: if the model's own `ratingConfirmation` self-assessment
/// contradicts the numeric verdict (`claim_refuted` at ≥58%, or
/// `claim_supported` at ≤42%), trust the confirmation and invert.
fn rating_confirmation_inversion(truth_percentage: u8, confirmation: RatingConfirmation) -> Option<u8> {
    match confirmation {
        RatingConfirmation::ClaimRefuted if truth_percentage >= 58 => Some(100 - truth_percentage),
        RatingConfirmation::ClaimSupported if truth_percentage <= 42 => Some(100 - truth_percentage),
        _ => None,
    }
}

/// Steps 2 + 3: step 2 trusts `ratingConfirmation`; step 3 is a regex
/// fallback over the reasoning text, and only runs if step 2 didn't fire.
/// Returns the corrected percentage and whether an inversion happened, so
/// step 5 can skip its own correction when one already occurred.
fn correct_rating_direction(truth_percentage: u8, reasoning: &str, confirmation: RatingConfirmation) -> (u8, bool) {
    if let Some(inverted) = rating_confirmation_inversion(truth_percentage, confirmation) {
        return (inverted, true);
    }
    let reads_as_false = inversion_re().is_match(reasoning);
    if reads_as_false && truth_percentage > 57 {
        (100 - truth_percentage, true)
    } else {
        (truth_percentage, false)
    }
}

/// Step 4: a counter-claim's verdict direction is inverted only at
/// aggregation time, never stored inverted on the claim itself — this
/// computes what the *aggregated* contribution should read as.
fn counter_claim_adjusted_percentage(truth_percentage: u8, is_counter_claim: bool) -> u8 {
    if is_counter_claim {
        100 - truth_percentage
    } else {
        truth_percentage
    }
}

/// Step 5 (multi-context only): a claim's host context carrying positive
/// factors and no *evidenced* negative (established/disputed, not mere
/// opinion) lifts a sub-72 verdict to 72. Skipped if step 2/3 already
/// inverted the verdict, or the claim is itself a counter-claim.
fn factor_based_context_correction(
    truth_percentage: u8,
    multi_context: bool,
    is_counter_claim: bool,
    already_inverted: bool,
    context_id: Option<&str>,
    key_factors: &[KeyFactor],
) -> u8 {
    if !multi_context || is_counter_claim || already_inverted || truth_percentage >= 72 {
        return truth_percentage;
    }
    let Some(context_id) = context_id else {
        return truth_percentage;
    };
    let in_context: Vec<&KeyFactor> = key_factors.iter().filter(|f| f.context_id.as_deref() == Some(context_id)).collect();
    let has_positive = in_context.iter().any(|f| f.polarity == FactorPolarity::Positive);
    let has_evidenced_negative = in_context
        .iter()
        .any(|f| f.polarity == FactorPolarity::Negative && matches!(f.factual_basis, FactualBasis::Established | FactualBasis::Disputed));
    if has_positive && !has_evidenced_negative {
        72
    } else {
        truth_percentage
    }
}

/// Step 6: established/disputed contested claims lose confidence; opinion
/// claims are unaffected (nothing to contest).
fn contestation_penalty(factual_basis: FactualBasis, is_contested: bool, config: &VerdictConfig) -> f64 {
    if !is_contested {
        return 0.0;
    }
    match factual_basis {
        FactualBasis::Established => config.contestation_penalty_established,
        FactualBasis::Disputed => config.contestation_penalty_disputed,
        _ => 0.0,
    }
}

/// Fraction of `supporting` sharing the most common `claimDirection`,
/// the "consensus" term of step 7's weighting formula.
fn evidence_consensus(supporting: &[&EvidenceItem]) -> f64 {
    if supporting.is_empty() {
        return 1.0;
    }
    let mut counts: HashMap<ClaimDirection, usize> = HashMap::new();
    for e in supporting {
        *counts.entry(e.claim_direction).or_insert(0) += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    max as f64 / supporting.len() as f64
}

/// Maps a `[0,1]` track record score onto a weight multiplier centered so
/// `DEFAULT_UNKNOWN_SOURCE_SCORE` (0.5) lands exactly on the identity
/// value (1.0) — required for P7.
fn normalized_track_weight(score: f64) -> f64 {
    (0.5 + score).clamp(0.0, 1.5)
}

/// One evidence item's effective weight. `trackRecordConfidence` and
/// `consensus` combine into how much we trust the track-record score at
/// all; at zero combined trust the item contributes the identity weight
/// regardless of the track record's value — this is what makes P7 hold.
fn effective_item_weight(track_record_score: f64, track_record_confidence: f64, consensus: f64) -> f64 {
    let base = normalized_track_weight(track_record_score);
    let trust = track_record_confidence.clamp(0.0, 1.0) * consensus.clamp(0.0, 1.0);
    1.0 + trust * (base - 1.0)
}

fn source_for<'a>(sources: &'a [FetchedSource], source_id: &str) -> Option<&'a FetchedSource> {
    sources.iter().find(|s| s.id == source_id)
}

/// Step 7: `50 + (originalTruth - 50) * avgEffectiveWeight`. With no
/// supporting evidence at all there is nothing to weight, so the verdict
/// is pulled toward the neutral midpoint using the unknown-source score,
/// same as an evidence item whose source has no track record.
fn evidence_weighting(original_truth: u8, supporting_evidence: &[&EvidenceItem], sources: &[FetchedSource]) -> f64 {
    if supporting_evidence.is_empty() {
        return 50.0 + (original_truth as f64 - 50.0) * DEFAULT_UNKNOWN_SOURCE_SCORE;
    }
    let consensus = evidence_consensus(supporting_evidence);
    let avg_weight: f64 = supporting_evidence
        .iter()
        .map(|e| {
            let source = source_for(sources, &e.source_id);
            let track_record_score = source.and_then(|s| s.track_record_score).unwrap_or(DEFAULT_UNKNOWN_SOURCE_SCORE);
            let track_record_confidence = source.and_then(|s| s.track_record_confidence).unwrap_or(0.0);
            effective_item_weight(track_record_score, track_record_confidence, consensus)
        })
        .sum::<f64>()
        / supporting_evidence.len() as f64;
    50.0 + (original_truth as f64 - 50.0) * avg_weight
}

/// Fraction of `supporting_evidence` whose direction agrees with what the
/// verdict implies (≥50% reads as support). Feeds Gate 4's agreement
/// signal; neutral items never count against agreement.
fn verdict_evidence_agreement(truth_percentage: u8, supporting_evidence: &[&EvidenceItem]) -> f64 {
    if supporting_evidence.is_empty() {
        return 1.0;
    }
    let expects_support = truth_percentage >= 50;
    let agreeing = supporting_evidence
        .iter()
        .filter(|e| {
            let supports = e.claim_direction == ClaimDirection::Supports;
            let contradicts = e.claim_direction == ClaimDirection::Contradicts;
            (expects_support && supports) || (!expects_support && contradicts) || (!supports && !contradicts)
        })
        .count();
    agreeing as f64 / supporting_evidence.len() as f64
}

/// Step 8: for claims with ≥2 directional (non-neutral) evidence items, a
/// strong verdict (≥72 or ≤28) whose evidence disagrees ≥60% of the time
/// is auto-corrected to the other half of the scale, rather than merely
/// having its confidence capped.
fn direction_validation(truth_percentage: u8, supporting_evidence: &[&EvidenceItem], threshold: f64) -> Option<u8> {
    let directional: Vec<&&EvidenceItem> = supporting_evidence.iter().filter(|e| e.claim_direction != ClaimDirection::Neutral).collect();
    if directional.len() < 2 {
        return None;
    }
    let total = directional.len() as f64;
    let contradicts = directional.iter().filter(|e| e.claim_direction == ClaimDirection::Contradicts).count() as f64;
    let supports = directional.iter().filter(|e| e.claim_direction == ClaimDirection::Supports).count() as f64;
    if truth_percentage >= 72 && contradicts / total >= threshold {
        Some(35)
    } else if truth_percentage <= 28 && supports / total >= threshold {
        Some(65)
    } else {
        None
    }
}

/// Step 9 (Gate 4): `confidenceTier`/`publishable` from evidence count,
/// average source quality, and directional agreement — never from the
/// model's self-reported confidence, and never altering `truthPercentage`.
/// Central claims are always publishable.
fn gate4_classification(supporting_evidence: &[&EvidenceItem], sources: &[FetchedSource], agreement: f64, is_central: bool) -> (ConfidenceTier, bool) {
    let count = supporting_evidence.len();
    let avg_quality = if supporting_evidence.is_empty() {
        0.0
    } else {
        supporting_evidence
            .iter()
            .map(|e| source_for(sources, &e.source_id).and_then(|s| s.track_record_score).unwrap_or(DEFAULT_UNKNOWN_SOURCE_SCORE))
            .sum::<f64>()
            / count as f64
    };
    let tier = if count >= 3 && avg_quality >= 0.7 && agreement >= 0.8 {
        ConfidenceTier::High
    } else if count >= 2 && avg_quality >= 0.5 && agreement >= 0.6 {
        ConfidenceTier::Medium
    } else if count >= 1 {
        ConfidenceTier::Low
    } else {
        ConfidenceTier::Insufficient
    };
    let publishable = is_central || tier != ConfidenceTier::Insufficient;
    (tier, publishable)
}

/// Runs the full 10-step canonical calibration order on one verdict in
/// place, given the evidence items and sources it cites and the key
/// factors of its analysis contexts. Step order is fixed: sanitize →
/// rating-confirmation check → regex inversion fallback → counter-claim
/// inversion → factor-based context correction → contestation penalty →
/// evidence weighting → direction validation → Gate 4 classification →
/// clamp. Returns whether step 8 fired, so the caller can record a
/// `verdict_direction_mismatch` warning.
#[tracing::instrument(skip(verdict, evidence, sources, key_factors, config), fields(claim_id = %verdict.claim_id))]
pub fn calibrate_verdict(
    verdict: &mut ClaimVerdict,
    is_counter_claim: bool,
    factual_basis: FactualBasis,
    is_contested: bool,
    multi_context: bool,
    evidence: &[EvidenceItem],
    sources: &[FetchedSource],
    key_factors: &[KeyFactor],
    config: &VerdictConfig,
) -> bool {
    verdict.reasoning = sanitize_reasoning(&verdict.reasoning);

    let (corrected, inverted) = correct_rating_direction(verdict.truth_percentage, &verdict.reasoning, verdict.rating_confirmation);
    if inverted {
        tracing::debug!(claim_id = %verdict.claim_id, from = verdict.truth_percentage, to = corrected, "rating direction inverted");
    }
    let counter_adjusted = counter_claim_adjusted_percentage(corrected, is_counter_claim);

    let context_corrected = factor_based_context_correction(
        counter_adjusted,
        multi_context,
        is_counter_claim,
        inverted,
        verdict.context_id.as_deref(),
        key_factors,
    );
    if context_corrected != counter_adjusted {
        tracing::debug!(claim_id = %verdict.claim_id, to = context_corrected, "lifted by factor-based context correction");
    }

    let penalty = contestation_penalty(factual_basis, is_contested, config);
    if penalty > 0.0 {
        tracing::debug!(claim_id = %verdict.claim_id, penalty, "contestation penalty applied");
    }
    let penalized = (context_corrected as f64 - penalty).max(0.0);

    let supporting: Vec<&EvidenceItem> = evidence
        .iter()
        .filter(|e| verdict.supporting_evidence_ids.contains(&e.id))
        .collect();
    let weighted = evidence_weighting(penalized.round().clamp(0.0, 100.0) as u8, &supporting, sources);
    let weighted_pct = weighted.round().clamp(0.0, 100.0) as u8;

    let direction_mismatch = direction_validation(weighted_pct, &supporting, config.direction_validation_threshold);
    let final_pct = direction_mismatch.unwrap_or(weighted_pct);
    if let Some(corrected_pct) = direction_mismatch {
        tracing::warn!(claim_id = %verdict.claim_id, from = weighted_pct, to = corrected_pct, "evidence direction mismatch");
    }

    let agreement = verdict_evidence_agreement(final_pct, &supporting);
    let (tier, publishable) = gate4_classification(&supporting, sources, agreement, verdict.is_central);

    verdict.truth_percentage = final_pct;
    verdict.verdict = final_pct;
    verdict.evidence_weight = Some(weighted / 100.0);
    verdict.highlight_color = highlight_color(final_pct);
    verdict.confidence_tier = Some(tier);
    verdict.publishable = Some(publishable);
    verdict.clamp();

    direction_mismatch.is_some()
}

/// Weighted-average aggregation of several `ClaimVerdict`s into a single
/// rollup percentage (centrality-weighted, §4.8 multi-context/article
/// summary). Counter-claims were already inverted during calibration, so
/// this is a plain weighted mean.
pub fn weighted_aggregate(verdicts: &[ClaimVerdict]) -> Option<f64> {
    if verdicts.is_empty() {
        return None;
    }
    let mut weight_sum = 0.0;
    let mut weighted_sum = 0.0;
    for v in verdicts {
        let w = centrality_multiplier(v.centrality);
        weight_sum += w;
        weighted_sum += w * v.truth_percentage as f64;
    }
    if weight_sum == 0.0 {
        return None;
    }
    Some(weighted_sum / weight_sum)
}

/// Dedup-average verdicts whose claim text is near-identical (Jaccard ≥
/// 0.6), so a claim extracted twice doesn't double-count in an aggregate.
pub fn dedup_average_verdicts(verdicts: Vec<ClaimVerdict>) -> Vec<ClaimVerdict> {
    let mut clusters: Vec<Vec<ClaimVerdict>> = Vec::new();
    'outer: for v in verdicts {
        for cluster in clusters.iter_mut() {
            if jaccard_similarity(&cluster[0].claim_text, &v.claim_text) >= 0.6 {
                cluster.push(v);
                continue 'outer;
            }
        }
        clusters.push(vec![v]);
    }

    clusters
        .into_iter()
        .map(|cluster| {
            if cluster.len() == 1 {
                return cluster.into_iter().next().unwrap();
            }
            let avg_pct = (cluster.iter().map(|v| v.truth_percentage as f64).sum::<f64>() / cluster.len() as f64)
                .round()
                .clamp(0.0, 100.0) as u8;
            let mut merged = cluster[0].clone();
            merged.truth_percentage = avg_pct;
            merged.verdict = avg_pct;
            merged.highlight_color = highlight_color(avg_pct);
            merged
        })
        .collect()
}

/// §4.8 rule: a `Tangential` claim with fewer than
/// `min_evidence_for_tangential` supporting items is excluded from the
/// headline aggregate (still reported, just not weighted into the top
/// number) so a single weak tangential claim can't sway the thesis
/// verdict.
pub fn prune_weak_tangential(verdicts: Vec<ClaimVerdict>, config: &VerdictConfig) -> Vec<ClaimVerdict> {
    verdicts
        .into_iter()
        .filter(|v| {
            v.thesis_relevance != crate::model::ThesisRelevance::Tangential
                || v.supporting_evidence_ids.len() >= config.min_evidence_for_tangential
        })
        .collect()
}

/// Article-level override (§4.8): if the article's own thesis verdict
/// contradicts the weighted sub-claim aggregate by more than one
/// highlight band, the sub-claim aggregate wins — an article's framing
/// should never outrank its own evaluated claims.
pub fn resolve_article_override(article_truth_percentage: u8, aggregate_truth_percentage: f64) -> u8 {
    let article_color = highlight_color(article_truth_percentage);
    let aggregate_color = highlight_color(aggregate_truth_percentage.round().clamp(0.0, 100.0) as u8);
    if article_color == HighlightColor::Red && aggregate_color == HighlightColor::Green
        || article_color == HighlightColor::Green && aggregate_color == HighlightColor::Red
    {
        aggregate_truth_percentage.round().clamp(0.0, 100.0) as u8
    } else {
        article_truth_percentage
    }
}
