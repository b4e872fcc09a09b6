//! Context engine (C4): canonicalization, weighted dedup, evidence-driven
//! refinement acceptance checks, coverage pruning, and the unassigned-claim
//! backstop for `AnalysisContext`. See `SPEC_FULL.md` §4.3.
//!
//! Generalizes the teacher's "stable id + builder + size tracking" idiom
//! (formerly `context::types::{SessionContext, Message}` conversation-state
//! bookkeeping) to analytical-frame bookkeeping; the conversational
//! `SessionContext`/`ExternalizedContext` concepts have no counterpart here
//! and are dropped.

use std::collections::{HashMap, HashSet};

use crate::model::{AnalysisContext, EvidenceItem, KeyFactor, SubClaim};
use crate::text::jaccard_similarity;

/// Maps a pre-canonicalization id (or merged-away id) to its surviving
/// canonical id. Chased transitively so merges-of-merges stay resolvable.
#[derive(Debug, Default, Clone)]
pub struct ContextRemap {
    map: HashMap<String, String>,
}

impl ContextRemap {
    pub fn insert(&mut self, from: String, to: String) {
        self.map.insert(from, to);
    }

    /// Resolve `id` through the remap, following chains to a fixed point.
    pub fn resolve<'a>(&'a self, id: &'a str) -> &'a str {
        let mut current = id;
        let mut seen = HashSet::new();
        while let Some(next) = self.map.get(current) {
            if !seen.insert(current) {
                break;
            }
            current = next;
        }
        current
    }

    pub fn apply_to_claims(&self, claims: &mut [SubClaim]) {
        for c in claims.iter_mut() {
            if let Some(id) = &c.context_id {
                c.context_id = Some(self.resolve(id).to_string());
            }
        }
    }

    pub fn apply_to_evidence(&self, items: &mut [EvidenceItem]) {
        for e in items.iter_mut() {
            if let Some(id) = &e.context_id {
                e.context_id = Some(self.resolve(id).to_string());
            }
        }
    }

    pub fn apply_to_key_factors(&self, factors: &mut [KeyFactor]) {
        for f in factors.iter_mut() {
            if let Some(id) = &f.context_id {
                f.context_id = Some(self.resolve(id).to_string());
            }
        }
    }
}

/// Assign stable `CTX_1..CTX_N` ids in input order, returning the remap
/// from whatever ids were present before (LLM-assigned or absent) to the
/// canonical ones. Pure and deterministic on a given input.
pub fn canonicalize(contexts: &mut [AnalysisContext]) -> ContextRemap {
    let mut remap = ContextRemap::default();
    for (i, ctx) in contexts.iter_mut().enumerate() {
        let canonical = format!("CTX_{}", i + 1);
        if ctx.id != canonical {
            remap.insert(ctx.id.clone(), canonical.clone());
            ctx.id = canonical;
        }
    }
    remap
}

/// Weighted pairwise similarity between two contexts (§4.3).
pub fn context_similarity(a: &AnalysisContext, b: &AnalysisContext) -> f64 {
    let name_sim = jaccard_similarity(&a.name, &b.name);
    let primary_sim = set_similarity(&a.metadata_primary(), &b.metadata_primary());
    let statement_sim = jaccard_similarity(&a.assessed_statement, &b.assessed_statement);
    let subject_sim = jaccard_similarity(&a.subject, &b.subject);
    let secondary_sim = set_similarity(&a.metadata_secondary(), &b.metadata_secondary());

    let base = name_sim * 0.35
        + primary_sim * 0.30
        + statement_sim * 0.20
        + subject_sim * 0.10
        + secondary_sim * 0.05;

    // Override: raise to >= 0.92 when assessedStatement similarity is high
    // and either name or primary metadata corroborate it.
    if statement_sim >= 0.75 && (name_sim >= 0.25 || primary_sim >= 0.15) {
        base.max(0.92)
    } else {
        base
    }
}

fn set_similarity(a: &[&str], b: &[&str]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let sa: HashSet<&str> = a.iter().copied().collect();
    let sb: HashSet<&str> = b.iter().copied().collect();
    let intersection = sa.intersection(&sb).count();
    let union = sa.union(&sb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Merge contexts whose pairwise similarity is `>= threshold`. Metadata
/// from mergees is union-merged into the survivor (survivor's non-empty
/// fields win). Returns the kept contexts and the id remap from every
/// merged-away id to its survivor.
pub fn dedup(contexts: Vec<AnalysisContext>, threshold: f64) -> (Vec<AnalysisContext>, ContextRemap) {
    let mut kept: Vec<AnalysisContext> = Vec::new();
    let mut remap = ContextRemap::default();

    'outer: for ctx in contexts {
        for survivor in kept.iter_mut() {
            if context_similarity(survivor, &ctx) >= threshold {
                remap.insert(ctx.id.clone(), survivor.id.clone());
                for (k, v) in ctx.metadata {
                    survivor.metadata.entry(k).or_insert(v);
                }
                if survivor.outcome.is_none() {
                    survivor.outcome = ctx.outcome;
                }
                continue 'outer;
            }
        }
        kept.push(ctx);
    }
    (kept, remap)
}

/// Evidence coverage of a proposed refinement: fraction of the evidence
/// items sent to the prompt that received an assignment.
pub fn assignment_coverage(assigned: usize, sent: usize) -> f64 {
    if sent == 0 {
        0.0
    } else {
        assigned as f64 / sent as f64
    }
}

/// §4.3 refinement acceptance: every context must end up with >= 1
/// evidence item, and coverage must be >= 70%.
pub fn refinement_is_acceptable(
    contexts: &[AnalysisContext],
    evidence_context_ids: &[Option<String>],
    assigned: usize,
    sent: usize,
) -> bool {
    if assignment_coverage(assigned, sent) < 0.70 {
        return false;
    }
    contexts.iter().all(|ctx| {
        evidence_context_ids
            .iter()
            .any(|id| id.as_deref() == Some(ctx.id.as_str()))
    })
}

/// Strong "frame signal" check for multi-context refinement outputs: >= 2
/// distinct frame keys across contexts' primary metadata, OR >= 2 distinct
/// per-evidence scope signatures spanning >= 2 contexts. Rejects likely
/// "dimension splits" that aren't really separate analytical frames.
pub fn has_strong_frame_signal(contexts: &[AnalysisContext], evidence_scopes: &[(String, String)]) -> bool {
    if contexts.len() < 2 {
        return true;
    }
    let distinct_frames: HashSet<&str> = contexts
        .iter()
        .flat_map(|c| c.metadata_primary())
        .collect();
    if distinct_frames.len() >= 2 {
        return true;
    }
    let distinct_scopes: HashSet<&str> = evidence_scopes.iter().map(|(_, scope)| scope.as_str()).collect();
    let distinct_contexts_with_scopes: HashSet<&str> =
        evidence_scopes.iter().map(|(ctx, _)| ctx.as_str()).collect();
    distinct_scopes.len() >= 2 && distinct_contexts_with_scopes.len() >= 2
}

/// Drop contexts with zero claims and zero evidence, never pruning down to
/// fewer than one context.
pub fn prune_by_coverage(
    contexts: Vec<AnalysisContext>,
    claims: &[SubClaim],
    evidence: &[EvidenceItem],
) -> Vec<AnalysisContext> {
    if contexts.len() <= 1 {
        return contexts;
    }
    let used: HashSet<&str> = claims
        .iter()
        .filter_map(|c| c.context_id.as_deref())
        .chain(evidence.iter().filter_map(|e| e.context_id.as_deref()))
        .collect();
    let kept: Vec<AnalysisContext> = contexts
        .into_iter()
        .filter(|ctx| used.contains(ctx.id.as_str()))
        .collect();
    if kept.is_empty() {
        Vec::new()
    } else {
        kept
    }
}

/// Best-matching existing context for an unassigned direct/tangential
/// claim, by text similarity to the context's signature (name + subject +
/// assessedStatement). Deterministic lexicographic tiebreak on context id.
pub fn best_matching_context<'a>(claim_text: &str, contexts: &'a [AnalysisContext]) -> Option<&'a AnalysisContext> {
    contexts
        .iter()
        .map(|ctx| {
            let signature = format!("{} {} {}", ctx.name, ctx.subject, ctx.assessed_statement);
            (jaccard_similarity(claim_text, &signature), ctx)
        })
        .max_by(|(sa, ca), (sb, cb)| {
            sa.partial_cmp(sb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| cb.id.cmp(&ca.id))
        })
        .map(|(_, ctx)| ctx)
}

/// Assign unassigned direct/tangential claims to their best-matching
/// existing context. Never creates a new context.
pub fn apply_unassigned_backstop(contexts: &[AnalysisContext], claims: &mut [SubClaim]) {
    if contexts.len() < 2 {
        return;
    }
    for claim in claims.iter_mut() {
        if claim.context_id.is_none() {
            if let Some(best) = best_matching_context(&claim.text, contexts) {
                claim.context_id = Some(best.id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContextStatus;

    fn ctx(id: &str, name: &str) -> AnalysisContext {
        AnalysisContext {
            id: id.to_string(),
            name: name.to_string(),
            short_name: name.to_string(),
            subject: String::new(),
            assessed_statement: String::new(),
            status: ContextStatus::Unknown,
            outcome: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn canonicalize_assigns_stable_sequential_ids() {
        let mut contexts = vec![ctx("llm-id-a", "First"), ctx("llm-id-b", "Second")];
        let remap = canonicalize(&mut contexts);
        assert_eq!(contexts[0].id, "CTX_1");
        assert_eq!(contexts[1].id, "CTX_2");
        assert_eq!(remap.resolve("llm-id-a"), "CTX_1");
    }

    #[test]
    fn dedup_merges_near_identical_contexts() {
        let mut a = ctx("CTX_1", "Criminal Trial");
        a.metadata.insert("institution".into(), "District Court".into());
        let mut b = ctx("CTX_2", "Criminal Trial");
        b.metadata.insert("institution".into(), "District Court".into());
        b.metadata.insert("temporal".into(), "2023".into());

        let (kept, remap) = dedup(vec![a, b], 0.85);
        assert_eq!(kept.len(), 1);
        assert_eq!(remap.resolve("CTX_2"), "CTX_1");
        assert_eq!(kept[0].metadata.get("temporal").unwrap(), "2023");
    }

    #[test]
    fn dedup_keeps_distinct_contexts_separate() {
        let a = ctx("CTX_1", "Civil Appeal");
        let b = ctx("CTX_2", "Criminal Trial");
        let (kept, _) = dedup(vec![a, b], 0.85);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn prune_by_coverage_never_drops_to_zero_contexts() {
        let contexts = vec![ctx("CTX_1", "Only")];
        let pruned = prune_by_coverage(contexts.clone(), &[], &[]);
        assert_eq!(pruned.len(), 1);
    }

    #[test]
    fn prune_by_coverage_drops_unused_context_when_others_remain() {
        let contexts = vec![ctx("CTX_1", "Used"), ctx("CTX_2", "Unused")];
        let claims = vec![SubClaim {
            id: "SC1".into(),
            text: "t".into(),
            claim_type: crate::model::ClaimType::Factual,
            claim_role: crate::model::ClaimRole::Core,
            depends_on: vec![],
            check_worthiness: 50.0,
            harm_potential: crate::model::HarmPotential::Medium,
            centrality: crate::model::Centrality::Medium,
            thesis_relevance: crate::model::ThesisRelevance::Direct,
            thesis_relevance_confidence: 80.0,
            is_counter_claim: false,
            context_id: Some("CTX_1".into()),
            key_factor_id: None,
        }];
        let pruned = prune_by_coverage(contexts, &claims, &[]);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].id, "CTX_1");
    }

    #[test]
    fn assignment_coverage_below_threshold_rejects_refinement() {
        let contexts = vec![ctx("CTX_1", "A")];
        let evidence_ctx_ids = vec![Some("CTX_1".to_string())];
        assert!(!refinement_is_acceptable(&contexts, &evidence_ctx_ids, 1, 10));
        assert!(refinement_is_acceptable(&contexts, &evidence_ctx_ids, 8, 10));
    }
}
