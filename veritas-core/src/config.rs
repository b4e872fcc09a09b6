//! Pipeline configuration (§6, §10.3): one struct per concern, each with a
//! `Default` matching the spec's defaults, validated once at orchestrator
//! construction. Mirrors the teacher's `OrchestratorConfig` shape
//! (single config struct + `Default` + builder-friendly nested fields).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Quick,
    Deep,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub mode: AnalysisMode,
    /// Same provider/model/prompts/config, not a cross-provider guarantee.
    pub deterministic: bool,
    pub allow_model_knowledge: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::Quick,
            deterministic: false,
            allow_model_knowledge: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub understand_model: Option<String>,
    pub extract_evidence_model: Option<String>,
    pub verdict_model: Option<String>,
    pub default_timeout_ms: u64,
    pub understand_max_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            understand_model: None,
            extract_evidence_model: None,
            verdict_model: None,
            default_timeout_ms: 300_000,
            understand_max_chars: 12_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Standard,
    Grounded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub enabled: bool,
    pub mode: SearchMode,
    pub provider: String,
    pub max_results: usize,
    pub max_sources_per_iteration: usize,
    pub date_restrict: Option<String>,
    pub domain_whitelist: Vec<String>,
    pub domain_blacklist: Vec<String>,
    pub timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: SearchMode::Standard,
            provider: "default".to_string(),
            max_results: 10,
            max_sources_per_iteration: 5,
            date_restrict: None,
            domain_whitelist: Vec::new(),
            domain_blacklist: Vec::new(),
            timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextDetectionMethod {
    Heuristic,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    pub detection_method: ContextDetectionMethod,
    pub dedup_enabled: bool,
    pub dedup_threshold: f64,
    pub dedup_override_threshold: f64,
    pub name_alignment_enabled: bool,
    pub name_alignment_threshold: f64,
    pub prompt_max_evidence_items: usize,
    pub prompt_selection_enabled: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            detection_method: ContextDetectionMethod::Hybrid,
            dedup_enabled: true,
            dedup_threshold: 0.85,
            dedup_override_threshold: 0.92,
            name_alignment_enabled: true,
            name_alignment_threshold: 0.3,
            prompt_max_evidence_items: 40,
            prompt_selection_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    pub probative_filter_enabled: bool,
    pub provenance_validation_enabled: bool,
    pub parallel_extraction_limit: usize,
    pub similarity_threshold: f64,
    pub dedup_threshold: f64,
    /// Configurable, not a hard-coded rule (spec §9 Open Question 2).
    pub high_impact_outcome_phrases: Vec<String>,
    pub high_impact_track_record_floor: f64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            probative_filter_enabled: true,
            provenance_validation_enabled: true,
            parallel_extraction_limit: 3,
            similarity_threshold: 0.4,
            dedup_threshold: 0.85,
            high_impact_outcome_phrases: vec![
                "sentenced to".to_string(),
                "convicted of".to_string(),
                "years in prison".to_string(),
                "life imprisonment".to_string(),
                "death penalty".to_string(),
            ],
            high_impact_track_record_floor: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictConfig {
    pub max_opinion_factors: usize,
    pub opinion_accumulation_warning_threshold: f64,
    pub min_evidence_for_tangential: usize,
    pub tangential_evidence_quality_check_enabled: bool,
    pub thesis_relevance_validation_enabled: bool,
    pub thesis_relevance_low_confidence_threshold: f64,
    pub thesis_relevance_auto_downgrade_threshold: f64,
    /// Spec §9 Open Question 3: a product choice, exposed as config.
    pub mixed_confidence_threshold: u8,
    pub direction_validation_threshold: f64,
    pub contestation_penalty_established: f64,
    pub contestation_penalty_disputed: f64,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            max_opinion_factors: 3,
            opinion_accumulation_warning_threshold: 0.5,
            min_evidence_for_tangential: 1,
            tangential_evidence_quality_check_enabled: true,
            thesis_relevance_validation_enabled: true,
            thesis_relevance_low_confidence_threshold: 70.0,
            thesis_relevance_auto_downgrade_threshold: 60.0,
            mixed_confidence_threshold: 60,
            direction_validation_threshold: 0.6,
            contestation_penalty_established: 12.0,
            contestation_penalty_disputed: 8.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub max_total_iterations: u32,
    pub max_iterations_per_context: u32,
    pub max_total_tokens: u64,
    pub gap_research_enabled: bool,
    pub gap_research_max_iterations: u32,
    pub gap_research_max_queries: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_total_iterations: 10,
            max_iterations_per_context: 5,
            max_total_tokens: 200_000,
            gap_research_enabled: true,
            gap_research_max_iterations: 2,
            gap_research_max_queries: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecencyConfig {
    pub temporal_confidence_threshold: f64,
    pub recency_window_months: u32,
    pub recency_confidence_penalty: f64,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            temporal_confidence_threshold: 0.6,
            recency_window_months: 6,
            recency_confidence_penalty: 20.0,
        }
    }
}

/// LLM-feature flags: enable LLM-based similarity/quality/validation in
/// addition to the deterministic heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmFeatureFlags {
    pub context: bool,
    pub evidence: bool,
    pub verdict: bool,
}

impl Default for LlmFeatureFlags {
    fn default() -> Self {
        Self {
            context: true,
            evidence: true,
            verdict: true,
        }
    }
}

/// The complete set of options recognized by `run_analysis` (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub analysis: AnalysisConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub context: ContextConfig,
    pub evidence: EvidenceConfig,
    pub verdict: VerdictConfig,
    pub budget: BudgetConfig,
    pub recency: RecencyConfig,
    pub llm_features: LlmFeatureFlags,
    /// Minimum evidence items required before the completeness gate can
    /// fire (§4.6 rule 1); smaller for `quick` mode.
    pub min_evidence_items_required: usize,
    pub min_categories_required: usize,
}

impl PipelineConfig {
    pub fn quick() -> Self {
        Self {
            min_evidence_items_required: 4,
            min_categories_required: 2,
            ..Default::default()
        }
    }

    pub fn deep() -> Self {
        Self {
            analysis: AnalysisConfig {
                mode: AnalysisMode::Deep,
                ..AnalysisConfig::default()
            },
            min_evidence_items_required: 10,
            min_categories_required: 3,
            budget: BudgetConfig {
                max_total_iterations: 20,
                max_total_tokens: 500_000,
                ..BudgetConfig::default()
            },
            ..Default::default()
        }
    }

    /// Hard validation at config-load time (§7's "Invalid config" policy).
    pub fn validate(&self) -> Result<()> {
        let checks: &[(bool, &str)] = &[
            (
                (0.0..=1.0).contains(&self.context.dedup_threshold),
                "context.dedup_threshold must be in [0,1]",
            ),
            (
                self.context.dedup_override_threshold >= self.context.dedup_threshold,
                "context.dedup_override_threshold must be >= dedup_threshold",
            ),
            (
                (0.0..=1.0).contains(&self.evidence.similarity_threshold),
                "evidence.similarity_threshold must be in [0,1]",
            ),
            (
                (0.0..=1.0).contains(&self.evidence.dedup_threshold),
                "evidence.dedup_threshold must be in [0,1]",
            ),
            (
                self.evidence.parallel_extraction_limit >= 1,
                "evidence.parallel_extraction_limit must be >= 1",
            ),
            (
                self.verdict.mixed_confidence_threshold <= 100,
                "verdict.mixed_confidence_threshold must be in [0,100]",
            ),
            (
                (0.0..=1.0).contains(&self.verdict.direction_validation_threshold),
                "verdict.direction_validation_threshold must be in [0,1]",
            ),
            (
                self.budget.max_total_iterations >= 1,
                "budget.max_total_iterations must be >= 1",
            ),
            (
                self.budget.max_total_tokens >= 1,
                "budget.max_total_tokens must be >= 1",
            ),
            (
                (0.0..=1.0).contains(&self.recency.temporal_confidence_threshold),
                "recency.temporal_confidence_threshold must be in [0,1]",
            ),
        ];
        for (ok, message) in checks {
            if !ok {
                return Err(Error::invalid_config(*message));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = PipelineConfig::default();
        config.context.dedup_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn deep_mode_raises_budget_and_evidence_minimums() {
        let deep = PipelineConfig::deep();
        let quick = PipelineConfig::quick();
        assert!(deep.min_evidence_items_required > quick.min_evidence_items_required);
        assert!(deep.budget.max_total_iterations > quick.budget.max_total_iterations);
    }
}
