//! # veritas-core
//!
//! A claim-verification orchestration library: given a claim or article,
//! decomposes it into checkable sub-claims, gathers evidence, and produces
//! calibrated truth verdicts on a 7-point scale.
//!
//! ## Pipeline
//!
//! 1. **Ingest** — classify input, fetch if it's a URL.
//! 2. **Understand** — decompose into sub-claims and analytical contexts.
//! 3. **Research** — iteratively search, fetch, and extract evidence.
//! 4. **Refine** — canonicalize and dedup analytical contexts.
//! 5. **Verdicts** — request a calibrated verdict per claim.
//! 6. **Calibrate & finalize** — apply the calibration chain, aggregate,
//!    and assemble the report.
//!
//! ## Example
//!
//! ```rust,ignore
//! use veritas_core::{run_analysis, Adapters, PipelineConfig};
//!
//! let report = run_analysis(input, &PipelineConfig::quick(), &adapters, None).await?;
//! println!("{}", report.markdown_report);
//! ```

pub mod adapters;
pub mod budget;
pub mod calibration;
pub mod claims;
pub mod config;
pub mod context;
pub mod error;
pub mod evidence;
pub mod llm;
pub mod model;
pub mod orchestrator;
pub mod research;
pub mod schema;
pub mod signature;
pub mod text;
pub mod verdict;
pub mod warnings;

// Re-exports: the public surface of the claim-verification pipeline.
pub use error::{Error, Result};

pub use model::{
    AnalysisContext, Centrality, ClaimDirection, ClaimRole, ClaimType, ClaimUnderstanding,
    ClaimVerdict, ConfidenceTier, ContextStatus, DetectedInputType, EvidenceBasis, EvidenceItem,
    EvidenceScope, FactorPolarity, FactualBasis, FetchedSource, HarmPotential, HighlightColor,
    InputType, KeyFactor, ProbativeValue, RatingConfirmation, ResearchIteration, ResearchState,
    RiskTier, SearchQueryRecord, SourceAuthority, Specificity, SubClaim, TemporalContext,
    ThesisRelevance,
};

pub use config::{
    AnalysisConfig, AnalysisMode, BudgetConfig, ContextConfig, ContextDetectionMethod,
    EvidenceConfig, LlmConfig, LlmFeatureFlags, PipelineConfig, RecencyConfig, SearchConfig,
    SearchMode, VerdictConfig,
};

pub use budget::{BudgetTracker, ExceedReason};

pub use warnings::{
    AnalysisWarning, FallbackReason, FallbackRecord, FallbackTracker, WarningKind,
    WarningSeverity, DEFAULT_EVIDENCE_BASIS, DEFAULT_FACTUAL_BASIS, DEFAULT_HARM_POTENTIAL,
    DEFAULT_IS_CONTESTED, DEFAULT_SOURCE_AUTHORITY,
};

pub use text::{find_span, jaccard_similarity, normalize, overlap_ratio, split_sentences, tokenize};

pub use schema::{
    coerce_numeric_strings, evidence_extraction_schema, lenient_default, salvage_json_object,
    understanding_schema, unwrap_wrapper_keys, verdict_schema, SchemaPair,
};

pub use context::{
    apply_unassigned_backstop, assignment_coverage, best_matching_context, canonicalize,
    context_similarity, dedup as dedup_contexts, has_strong_frame_signal, prune_by_coverage,
    refinement_is_acceptable, ContextRemap,
};

pub use claims::{
    detect_counter_claim_heuristic, drop_irrelevant_claims, ensure_minimum_direct_coverage,
    enforce_thesis_relevance_invariants, heuristic_backfill, is_duplicate_claim,
    normalize_importance, validate_thesis_relevance, MIN_CORE_CLAIMS_PER_PROCEEDING,
};

pub use evidence::{
    apply_high_impact_safeguard, dedup_against_existing, extract_parallel, is_rate_limited,
    probative_filter, provenance_filter, SourceExtraction,
};

pub use research::{
    decide_next_step, detect_recency_sensitivity, is_new_url, normalize_url_for_dedup,
    passes_relevance_prefilter, should_use_grounded_fallback, CoverageSnapshot, ResearchDecision,
    StopReason as ResearchStopReason,
};

pub use verdict::{
    apply_dependency_inversion, backfill_missing_verdicts, build_verdict, confidence_tier,
    highlight_color, parse_verdicts_payload, scale_label,
};

pub use calibration::{
    calibrate_verdict, centrality_multiplier, dedup_average_verdicts, prune_weak_tangential,
    resolve_article_override, weighted_aggregate, CENTRALITY_MULTIPLIERS,
    DEFAULT_UNKNOWN_SOURCE_SCORE,
};

pub use llm::{
    freeform, select_model, structured, AnthropicClient, ChatMessage, ClientConfig,
    CompletionRequest, CompletionResponse, LLMClient, MultiProviderClient, Provider,
    StructuredCall, TokenUsage,
};

pub use adapters::{
    EvidenceExtractionAdapter, FetcherAdapter, SearchAdapter, SearchResult,
    SourceReliabilityAdapter,
};

pub use orchestrator::{
    run_analysis, Adapters, AnalysisReport, ProgressCallback, ProgressEvent, QualityGate,
    QualityGates, ResearchMetrics, TwoPanelSummary,
};

pub use signature::{FieldSpec, FieldType};
