//! Shared data model for a single analysis run: `ResearchState` and every
//! type phases read and write on it. See `SPEC_FULL.md` §3.
//!
//! `ResearchState` has exactly one writer at a time — the orchestrator
//! owns it and passes `&mut ResearchState` into synchronous helpers between
//! `.await` points; nothing here is `Sync` by itself because nothing needs
//! to be.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::budget::BudgetTracker;
use crate::warnings::{AnalysisWarning, FallbackTracker};

/// How the user's input was classified before ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    Url,
}

/// Clamp a floating-point percentage into `[0, 100]` and round to an
/// integer, matching the defensive clamp applied on every verdict write.
pub fn clamp_pct(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedInputType {
    Claim,
    Article,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    A,
    B,
    C,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalContext {
    pub is_recency_sensitive: bool,
    pub confidence: f64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    Concluded,
    Ongoing,
    Pending,
    Unknown,
}

/// A bounded analytical frame requiring its own verdict: a different
/// institution, methodology, jurisdiction, or boundary than other frames
/// in the same analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub subject: String,
    pub assessed_statement: String,
    pub status: ContextStatus,
    pub outcome: Option<String>,
    /// Open metadata map: methodology, boundaries, jurisdiction,
    /// institution/court, temporal, geographic, scale, standard_applied.
    pub metadata: HashMap<String, String>,
}

impl AnalysisContext {
    pub fn metadata_primary(&self) -> Vec<&str> {
        ["institution", "jurisdiction", "methodology", "boundaries", "standard_applied", "court"]
            .iter()
            .filter_map(|k| self.metadata.get(*k).map(|v| v.as_str()))
            .collect()
    }

    pub fn metadata_secondary(&self) -> Vec<&str> {
        ["geographic", "temporal", "scale"]
            .iter()
            .filter_map(|k| self.metadata.get(*k).map(|v| v.as_str()))
            .collect()
    }
}

/// Per-evidence-item source metadata. Distinct from `AnalysisContext`:
/// documents with differing scopes are not directly comparable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceScope {
    pub name: Option<String>,
    pub methodology: Option<String>,
    pub boundaries: Option<String>,
    pub geographic: Option<String>,
    pub temporal: Option<String>,
    pub source_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Legal,
    Procedural,
    Factual,
    Evaluative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimRole {
    Attribution,
    Source,
    Timing,
    Core,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Centrality {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThesisRelevance {
    Direct,
    Tangential,
    Irrelevant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarmPotential {
    High,
    Medium,
    Low,
}

/// An atomic, decomposed sub-claim of the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubClaim {
    pub id: String,
    pub text: String,
    pub claim_type: ClaimType,
    pub claim_role: ClaimRole,
    pub depends_on: Vec<String>,
    pub check_worthiness: f64,
    pub harm_potential: HarmPotential,
    pub centrality: Centrality,
    pub thesis_relevance: ThesisRelevance,
    pub thesis_relevance_confidence: f64,
    pub is_counter_claim: bool,
    pub context_id: Option<String>,
    pub key_factor_id: Option<String>,
}

impl SubClaim {
    pub fn is_central(&self) -> bool {
        self.centrality == Centrality::High
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFactor {
    pub id: String,
    pub name: String,
    pub factual_basis: FactualBasis,
    /// The context this factor was identified in (`AnalysisContext.id`),
    /// absent in single-context mode.
    pub context_id: Option<String>,
    pub polarity: FactorPolarity,
}

/// Whether a key factor weighs for, against, or neither direction of the
/// context it was identified in (§4.8 step 5's factor-based correction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorPolarity {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactualBasis {
    Established,
    Disputed,
    Opinion,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specificity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimDirection {
    Supports,
    Contradicts,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceAuthority {
    Primary,
    Secondary,
    Opinion,
    Contested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceBasis {
    Scientific,
    Documented,
    Anecdotal,
    Theoretical,
    Pseudoscientific,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbativeValue {
    High,
    Medium,
    Low,
}

/// A single piece of extracted evidence, tied to a `FetchedSource`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// `<sourceId>-E<k>`.
    pub id: String,
    pub statement: String,
    pub source_excerpt: String,
    pub category: String,
    pub specificity: Specificity,
    pub source_id: String,
    pub source_url: String,
    pub source_title: String,
    pub context_id: Option<String>,
    pub claim_direction: ClaimDirection,
    pub source_authority: SourceAuthority,
    pub evidence_basis: EvidenceBasis,
    pub probative_value: ProbativeValue,
    pub evidence_scope: Option<EvidenceScope>,
    pub is_contested_claim: bool,
    pub claim_source: Option<String>,
    pub from_opposite_claim_search: bool,
}

impl EvidenceItem {
    /// §3 invariant 5: specificity must not be low, excerpt must be ≥ 20 chars.
    pub fn is_admissible(&self) -> bool {
        self.specificity != Specificity::Low && self.source_excerpt.chars().count() >= 20
    }
}

/// A fetched and text-extracted web source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedSource {
    pub id: String,
    pub url: String,
    pub title: String,
    pub track_record_score: Option<f64>,
    pub track_record_confidence: Option<f64>,
    pub full_text: String,
    pub fetched_at: DateTime<Utc>,
    pub category: Option<String>,
    pub fetch_success: bool,
    pub search_query: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightColor {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    Insufficient,
}

/// Whether the verdict engine's own self-assessment agrees with the
/// numeric verdict it produced (§4.7, §4.8 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingConfirmation {
    ClaimSupported,
    ClaimRefuted,
    Mixed,
}

/// Final or in-progress verdict for one sub-claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimVerdict {
    pub claim_id: String,
    pub claim_text: String,
    pub verdict: u8,
    pub confidence: u8,
    pub truth_percentage: u8,
    pub risk_tier: RiskTier,
    pub reasoning: String,
    pub supporting_evidence_ids: Vec<String>,
    pub context_id: Option<String>,
    pub key_factor_id: Option<String>,
    /// The model's own claim_supported/claim_refuted/mixed self-assessment,
    /// checked for consistency with `truth_percentage` (§4.8 step 2).
    pub rating_confirmation: RatingConfirmation,
    pub is_central: bool,
    pub centrality: Centrality,
    pub thesis_relevance: ThesisRelevance,
    pub is_counter_claim: Option<bool>,
    pub dependency_failed: Option<bool>,
    pub failed_dependencies: Option<Vec<String>>,
    pub highlight_color: HighlightColor,
    pub evidence_weight: Option<f64>,
    pub confidence_tier: Option<ConfidenceTier>,
    pub publishable: Option<bool>,
}

impl ClaimVerdict {
    /// Defensive clamp applied on every write (§4.8 step 10).
    pub fn clamp(&mut self) {
        self.truth_percentage = self.truth_percentage.min(100);
        self.verdict = self.verdict.min(100);
        self.confidence = self.confidence.min(100);
    }
}

/// One accepted-evidence-backed understanding of the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimUnderstanding {
    pub detected_input_type: DetectedInputType,
    pub implied_claim: String,
    pub original_input_display: String,
    pub main_thesis: String,
    pub article_thesis: Option<String>,
    pub background_details: String,
    pub analysis_contexts: Vec<AnalysisContext>,
    pub requires_separate_analysis: bool,
    pub sub_claims: Vec<SubClaim>,
    pub key_factors: Vec<KeyFactor>,
    pub research_queries: Vec<String>,
    pub risk_tier: RiskTier,
    pub temporal_context: Option<TemporalContext>,
}

impl ClaimUnderstanding {
    /// §3 invariant: `requiresSeparateAnalysis == (|analysisContexts| > 1)`.
    pub fn fix_requires_separate_analysis(&mut self) {
        self.requires_separate_analysis = self.analysis_contexts.len() > 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQueryRecord {
    pub query: String,
    pub category: String,
    pub context_id: Option<String>,
    pub claim_id: Option<String>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchIteration {
    pub index: u32,
    pub queries_issued: Vec<String>,
    pub sources_fetched: usize,
    pub evidence_collected: usize,
    pub gap_phase: bool,
}

/// The single mutable state of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    pub original_input: String,
    pub input_type: InputType,
    pub understanding: Option<ClaimUnderstanding>,
    pub iterations: Vec<ResearchIteration>,
    pub sources: Vec<FetchedSource>,
    pub evidence_items: Vec<EvidenceItem>,
    pub search_queries: Vec<SearchQueryRecord>,
    pub processed_urls: HashSet<String>,
    pub contradiction_search_performed: bool,
    pub decision_maker_search_performed: bool,
    pub recent_claims_searched: HashSet<String>,
    pub inverse_claim_search_performed: bool,
    pub central_claims_searched: HashSet<String>,
    pub budget_tracker: BudgetTracker,
    pub fallback_tracker: FallbackTracker,
    pub analysis_warnings: Vec<AnalysisWarning>,
    pub llm_calls: u32,
    pub claim_verdicts: Vec<ClaimVerdict>,
}

impl ResearchState {
    pub fn new(original_input: String, input_type: InputType) -> Self {
        Self {
            original_input,
            input_type,
            understanding: None,
            iterations: Vec::new(),
            sources: Vec::new(),
            evidence_items: Vec::new(),
            search_queries: Vec::new(),
            processed_urls: HashSet::new(),
            contradiction_search_performed: false,
            decision_maker_search_performed: false,
            recent_claims_searched: HashSet::new(),
            inverse_claim_search_performed: false,
            central_claims_searched: HashSet::new(),
            budget_tracker: BudgetTracker::default(),
            fallback_tracker: FallbackTracker::default(),
            analysis_warnings: Vec::new(),
            llm_calls: 0,
            claim_verdicts: Vec::new(),
        }
    }

    pub fn contexts(&self) -> &[AnalysisContext] {
        self.understanding
            .as_ref()
            .map(|u| u.analysis_contexts.as_slice())
            .unwrap_or(&[])
    }

    pub fn sub_claims(&self) -> &[SubClaim] {
        self.understanding
            .as_ref()
            .map(|u| u.sub_claims.as_slice())
            .unwrap_or(&[])
    }

    /// §3 invariant 1: every referenced `contextId` exists (or is empty).
    pub fn context_ids_are_valid(&self) -> bool {
        let ids: HashSet<&str> = self.contexts().iter().map(|c| c.id.as_str()).collect();
        let claims_ok = self
            .sub_claims()
            .iter()
            .all(|c| c.context_id.as_deref().map(|id| ids.contains(id)).unwrap_or(true));
        let evidence_ok = self
            .evidence_items
            .iter()
            .all(|e| e.context_id.as_deref().map(|id| ids.contains(id)).unwrap_or(true));
        claims_ok && evidence_ok
    }

    /// §3 invariant 2: every `supportingEvidenceIds` reference resolves.
    pub fn evidence_refs_are_valid(&self) -> bool {
        let ids: HashSet<&str> = self.evidence_items.iter().map(|e| e.id.as_str()).collect();
        self.claim_verdicts
            .iter()
            .all(|v| v.supporting_evidence_ids.iter().all(|id| ids.contains(id.as_str())))
    }

    pub fn next_evidence_id(&self, source_id: &str) -> String {
        let count = self
            .evidence_items
            .iter()
            .filter(|e| e.source_id == source_id)
            .count();
        format!("{source_id}-E{}", count + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(id: &str) -> AnalysisContext {
        AnalysisContext {
            id: id.to_string(),
            name: id.to_string(),
            short_name: id.to_string(),
            subject: String::new(),
            assessed_statement: String::new(),
            status: ContextStatus::Unknown,
            outcome: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn clamp_pct_bounds_both_directions() {
        assert_eq!(clamp_pct(150.0), 100);
        assert_eq!(clamp_pct(-20.0), 0);
        assert_eq!(clamp_pct(57.4), 57);
    }

    #[test]
    fn context_ids_are_valid_rejects_dangling_reference() {
        let mut state = ResearchState::new("x".into(), InputType::Text);
        state.understanding = Some(ClaimUnderstanding {
            detected_input_type: DetectedInputType::Claim,
            implied_claim: "x".into(),
            original_input_display: "x".into(),
            main_thesis: String::new(),
            article_thesis: None,
            background_details: String::new(),
            analysis_contexts: vec![ctx("CTX_1")],
            requires_separate_analysis: false,
            sub_claims: vec![],
            key_factors: vec![],
            research_queries: vec![],
            risk_tier: RiskTier::C,
            temporal_context: None,
        });
        assert!(state.context_ids_are_valid());

        state.understanding.as_mut().unwrap().sub_claims.push(SubClaim {
            id: "SC1".into(),
            text: "t".into(),
            claim_type: ClaimType::Factual,
            claim_role: ClaimRole::Core,
            depends_on: vec![],
            check_worthiness: 80.0,
            harm_potential: HarmPotential::Medium,
            centrality: Centrality::High,
            thesis_relevance: ThesisRelevance::Direct,
            thesis_relevance_confidence: 90.0,
            is_counter_claim: false,
            context_id: Some("CTX_MISSING".into()),
            key_factor_id: None,
        });
        assert!(!state.context_ids_are_valid());
    }

    #[test]
    fn evidence_id_sequencing_per_source() {
        let mut state = ResearchState::new("x".into(), InputType::Text);
        assert_eq!(state.next_evidence_id("S1"), "S1-E1");
        state.evidence_items.push(EvidenceItem {
            id: "S1-E1".into(),
            statement: String::new(),
            source_excerpt: "x".repeat(20),
            category: String::new(),
            specificity: Specificity::High,
            source_id: "S1".into(),
            source_url: String::new(),
            source_title: String::new(),
            context_id: None,
            claim_direction: ClaimDirection::Neutral,
            source_authority: SourceAuthority::Secondary,
            evidence_basis: EvidenceBasis::Documented,
            probative_value: ProbativeValue::Medium,
            evidence_scope: None,
            is_contested_claim: false,
            claim_source: None,
            from_opposite_claim_search: false,
        });
        assert_eq!(state.next_evidence_id("S1"), "S1-E2");
    }
}
