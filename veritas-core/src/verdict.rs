//! Verdict engine (C8): turns a gateway-validated verdict payload into
//! `ClaimVerdict`s, maps the 0-100 truth percentage onto the 7-point scale
//! and its highlight color, and backfills any claim the model failed to
//! return a verdict for. See `SPEC_FULL.md` §4.7.
//!
//! Robustness (missing fields, wrong types) is handled the same way the
//! teacher's provider responses are mapped in `llm/client.rs`: match on
//! shape, fall back to a safe default rather than erroring the whole call.

use serde_json::Value;

use crate::model::{
    Centrality, ClaimVerdict, ConfidenceTier, HighlightColor, RatingConfirmation, RiskTier, SubClaim,
    ThesisRelevance,
};

/// §4.7: green ≥ 72, yellow ≥ 43, red otherwise.
pub fn highlight_color(truth_percentage: u8) -> HighlightColor {
    if truth_percentage >= 72 {
        HighlightColor::Green
    } else if truth_percentage >= 43 {
        HighlightColor::Yellow
    } else {
        HighlightColor::Red
    }
}

/// The 7-point scale label for a truth percentage, banded to align exactly
/// with `highlight_color`'s green/yellow/red thresholds.
pub fn scale_label(truth_percentage: u8) -> &'static str {
    match truth_percentage {
        0..=14 => "false",
        15..=28 => "mostly-false",
        29..=42 => "leaning-false",
        43..=57 => "mixed-or-unverified",
        58..=71 => "leaning-true",
        72..=85 => "mostly-true",
        _ => "true",
    }
}

/// Pre-calibration estimate from the model's self-reported confidence.
/// `calibration::calibrate_verdict`'s Gate 4 step overwrites this with the
/// evidence-count/quality/agreement classification before publication.
pub fn confidence_tier(confidence: u8) -> ConfidenceTier {
    if confidence >= 80 {
        ConfidenceTier::High
    } else if confidence >= 50 {
        ConfidenceTier::Medium
    } else if confidence >= 20 {
        ConfidenceTier::Low
    } else {
        ConfidenceTier::Insufficient
    }
}

fn extract_u8(obj: &serde_json::Map<String, Value>, key: &str, default: u8) -> u8 {
    obj.get(key).and_then(|v| v.as_f64()).map(|v| v.round().clamp(0.0, 100.0) as u8).unwrap_or(default)
}

fn extract_str(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    obj.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

/// Defaults to `Mixed` (no correction) when the model omits the field.
fn extract_rating_confirmation(obj: &serde_json::Map<String, Value>) -> RatingConfirmation {
    match obj.get("ratingConfirmation").and_then(|v| v.as_str()) {
        Some("claim_supported") => RatingConfirmation::ClaimSupported,
        Some("claim_refuted") => RatingConfirmation::ClaimRefuted,
        _ => RatingConfirmation::Mixed,
    }
}

/// Build one `ClaimVerdict` from a single entry of the payload's
/// `claimVerdicts` array, defaulting anything the model omitted.
pub fn build_verdict(claim: &SubClaim, raw: &Value) -> ClaimVerdict {
    let empty = serde_json::Map::new();
    let obj = raw.as_object().unwrap_or(&empty);

    let truth_percentage = extract_u8(obj, "verdict", 50);
    let confidence = extract_u8(obj, "confidence", 40);
    let reasoning = extract_str(obj, "reasoning");

    let mut verdict = ClaimVerdict {
        claim_id: claim.id.clone(),
        claim_text: claim.text.clone(),
        verdict: truth_percentage,
        confidence,
        truth_percentage,
        risk_tier: RiskTier::C,
        reasoning: if reasoning.is_empty() { "no reasoning provided".to_string() } else { reasoning },
        supporting_evidence_ids: obj
            .get("supportingEvidenceIds")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
        context_id: claim.context_id.clone(),
        key_factor_id: claim.key_factor_id.clone(),
        rating_confirmation: extract_rating_confirmation(obj),
        is_central: claim.is_central(),
        centrality: claim.centrality,
        thesis_relevance: claim.thesis_relevance,
        is_counter_claim: Some(claim.is_counter_claim),
        dependency_failed: None,
        failed_dependencies: None,
        highlight_color: highlight_color(truth_percentage),
        evidence_weight: None,
        confidence_tier: Some(confidence_tier(confidence)),
        // Gate 4 (§4.8 step 9) overwrites this from evidence signals during
        // calibration; this placeholder never reaches the final report.
        publishable: Some(true),
    };
    verdict.clamp();
    verdict
}

/// Parse the gateway-validated verdict payload's `claimVerdicts` array,
/// matching each entry back to its `SubClaim` by id. Entries referencing
/// an unknown claim id are dropped.
pub fn parse_verdicts_payload(value: &Value, claims: &[SubClaim]) -> Vec<ClaimVerdict> {
    let Some(entries) = value.get("claimVerdicts").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let claim_id = entry.get("claimId").and_then(|v| v.as_str())?;
            let claim = claims.iter().find(|c| c.id == claim_id)?;
            Some(build_verdict(claim, entry))
        })
        .collect()
}

/// Every `Direct`-relevance claim must end up with a verdict (§4.7 rule:
/// no silent drop). Any claim the model didn't return a verdict for gets a
/// `mixed-or-unverified` placeholder marked not publishable, so the gap is
/// visible in the report rather than hidden.
pub fn backfill_missing_verdicts(claims: &[SubClaim], verdicts: &mut Vec<ClaimVerdict>) -> Vec<String> {
    let mut backfilled = Vec::new();
    for claim in claims {
        if claim.thesis_relevance != ThesisRelevance::Direct {
            continue;
        }
        if verdicts.iter().any(|v| v.claim_id == claim.id) {
            continue;
        }
        verdicts.push(ClaimVerdict {
            claim_id: claim.id.clone(),
            claim_text: claim.text.clone(),
            verdict: 50,
            confidence: 0,
            truth_percentage: 50,
            risk_tier: RiskTier::C,
            reasoning: "no verdict returned by the model; insufficient evidence to evaluate".to_string(),
            supporting_evidence_ids: Vec::new(),
            context_id: claim.context_id.clone(),
            key_factor_id: claim.key_factor_id.clone(),
            rating_confirmation: RatingConfirmation::Mixed,
            is_central: claim.is_central(),
            centrality: claim.centrality,
            thesis_relevance: claim.thesis_relevance,
            is_counter_claim: Some(claim.is_counter_claim),
            dependency_failed: None,
            failed_dependencies: None,
            highlight_color: HighlightColor::Yellow,
            evidence_weight: None,
            confidence_tier: Some(ConfidenceTier::Insufficient),
            publishable: Some(false),
        });
        backfilled.push(claim.id.clone());
    }
    backfilled
}

/// §4.7 dependency propagation: a claim whose `dependsOn` target came back
/// `false`/`mostly-false` (red) is flagged `dependencyFailed`, listing which
/// dependencies dragged it down. Looked up by verdict snapshot, not
/// mutated in place, so ordering of `claims`/`verdicts` doesn't matter.
pub fn apply_dependency_inversion(verdicts: &mut [ClaimVerdict], claims: &[SubClaim]) {
    let verdict_by_claim: std::collections::HashMap<String, (u8, HighlightColor)> = verdicts
        .iter()
        .map(|v| (v.claim_id.clone(), (v.truth_percentage, v.highlight_color)))
        .collect();

    for verdict in verdicts.iter_mut() {
        let Some(claim) = claims.iter().find(|c| c.id == verdict.claim_id) else { continue };
        if claim.depends_on.is_empty() {
            continue;
        }
        let failed: Vec<String> = claim
            .depends_on
            .iter()
            .filter(|dep_id| {
                verdict_by_claim
                    .get(*dep_id)
                    .map(|(_, color)| *color == HighlightColor::Red)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        if !failed.is_empty() {
            verdict.dependency_failed = Some(true);
            verdict.failed_dependencies = Some(failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClaimRole, ClaimType, HarmPotential};

    fn claim(id: &str) -> SubClaim {
        SubClaim {
            id: id.to_string(),
            text: format!("claim {id}"),
            claim_type: ClaimType::Factual,
            claim_role: ClaimRole::Core,
            depends_on: vec![],
            check_worthiness: 80.0,
            harm_potential: HarmPotential::Medium,
            centrality: Centrality::High,
            thesis_relevance: ThesisRelevance::Direct,
            thesis_relevance_confidence: 90.0,
            is_counter_claim: false,
            context_id: None,
            key_factor_id: None,
        }
    }

    #[test]
    fn highlight_color_matches_band_boundaries() {
        assert_eq!(highlight_color(72), HighlightColor::Green);
        assert_eq!(highlight_color(71), HighlightColor::Yellow);
        assert_eq!(highlight_color(43), HighlightColor::Yellow);
        assert_eq!(highlight_color(42), HighlightColor::Red);
    }

    #[test]
    fn scale_label_bands_align_with_highlight_color() {
        assert_eq!(scale_label(90), "true");
        assert_eq!(scale_label(50), "mixed-or-unverified");
        assert_eq!(scale_label(5), "false");
    }

    #[test]
    fn build_verdict_defaults_missing_reasoning() {
        let c = claim("SC1");
        let raw = serde_json::json!({"claimId": "SC1", "verdict": 80, "confidence": 90});
        let v = build_verdict(&c, &raw);
        assert_eq!(v.truth_percentage, 80);
        assert_eq!(v.highlight_color, HighlightColor::Green);
        assert_eq!(v.confidence_tier, Some(ConfidenceTier::High));
        assert_eq!(v.rating_confirmation, RatingConfirmation::Mixed);
    }

    #[test]
    fn build_verdict_parses_rating_confirmation() {
        let c = claim("SC1");
        let raw = serde_json::json!({"claimId": "SC1", "verdict": 80, "confidence": 90, "ratingConfirmation": "claim_refuted"});
        let v = build_verdict(&c, &raw);
        assert_eq!(v.rating_confirmation, RatingConfirmation::ClaimRefuted);
    }

    #[test]
    fn backfill_adds_placeholder_for_direct_claim_with_no_verdict() {
        let claims = vec![claim("SC1"), claim("SC2")];
        let mut verdicts = vec![build_verdict(&claims[0], &serde_json::json!({"verdict": 80, "confidence": 90}))];
        let backfilled = backfill_missing_verdicts(&claims, &mut verdicts);
        assert_eq!(backfilled, vec!["SC2".to_string()]);
        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[1].publishable, Some(false));
    }

    #[test]
    fn parse_verdicts_payload_drops_entries_for_unknown_claim_ids() {
        let claims = vec![claim("SC1")];
        let payload = serde_json::json!({
            "claimVerdicts": [
                {"claimId": "SC1", "verdict": 60, "confidence": 70},
                {"claimId": "SC_UNKNOWN", "verdict": 10, "confidence": 10},
            ]
        });
        let verdicts = parse_verdicts_payload(&payload, &claims);
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].claim_id, "SC1");
    }
}
