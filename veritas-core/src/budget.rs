//! Iteration/token/gap-query budget tracking (C10).
//!
//! Mirrors the teacher's `OrchestratorConfig` budget fields
//! (`total_token_budget`, `cost_budget_usd`) but tracks consumption rather
//! than configuring a single recursive call: one `BudgetTracker` lives on
//! `ResearchState` for the whole analysis.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::BudgetConfig;

/// Why research stopped early, if it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceedReason {
    TotalIterations,
    IterationsPerContext(String),
    TotalTokens,
    GapIterations,
    GapQueries,
}

/// Running consumption counters for one analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetTracker {
    pub tokens_used: u64,
    pub total_iterations: u32,
    pub per_context_iterations: HashMap<String, u32>,
    pub llm_calls: u32,
    pub gap_iterations: u32,
    pub gap_queries: u32,
    pub budget_exceeded: bool,
    pub exceed_reason: Option<ExceedReason>,
}

impl BudgetTracker {
    /// Record one main-phase research iteration against `config`'s limits.
    /// Returns `false` once the budget is exceeded (soft stop: the caller
    /// finishes the current iteration but issues no more).
    pub fn record_iteration(&mut self, context_id: Option<&str>, config: &BudgetConfig) -> bool {
        if self.budget_exceeded {
            return false;
        }
        self.total_iterations += 1;
        if let Some(ctx) = context_id {
            let count = self.per_context_iterations.entry(ctx.to_string()).or_insert(0);
            *count += 1;
            if *count > config.max_iterations_per_context {
                self.budget_exceeded = true;
                self.exceed_reason = Some(ExceedReason::IterationsPerContext(ctx.to_string()));
                return false;
            }
        }
        if self.total_iterations > config.max_total_iterations {
            self.budget_exceeded = true;
            self.exceed_reason = Some(ExceedReason::TotalIterations);
            return false;
        }
        true
    }

    /// Record token usage from an LLM call; returns `false` once exceeded.
    pub fn record_tokens(&mut self, tokens: u64, config: &BudgetConfig) -> bool {
        self.llm_calls += 1;
        self.tokens_used += tokens;
        if self.tokens_used > config.max_total_tokens {
            self.budget_exceeded = true;
            self.exceed_reason = Some(ExceedReason::TotalTokens);
            return false;
        }
        !self.budget_exceeded
    }

    /// Gap research has its own separate budget that does not share
    /// iteration counts with the main research phase.
    pub fn record_gap_iteration(&mut self, config: &BudgetConfig) -> bool {
        self.gap_iterations += 1;
        if self.gap_iterations > config.gap_research_max_iterations {
            self.exceed_reason = Some(ExceedReason::GapIterations);
            return false;
        }
        true
    }

    pub fn record_gap_query(&mut self, config: &BudgetConfig) -> bool {
        self.gap_queries += 1;
        if self.gap_queries > config.gap_research_max_queries {
            self.exceed_reason = Some(ExceedReason::GapQueries);
            return false;
        }
        true
    }

    pub fn is_exceeded(&self) -> bool {
        self.budget_exceeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_max_total_iterations() {
        let config = BudgetConfig {
            max_total_iterations: 2,
            ..Default::default()
        };
        let mut tracker = BudgetTracker::default();
        assert!(tracker.record_iteration(None, &config));
        assert!(tracker.record_iteration(None, &config));
        assert!(!tracker.record_iteration(None, &config));
        assert!(tracker.is_exceeded());
        assert_eq!(tracker.exceed_reason, Some(ExceedReason::TotalIterations));
    }

    #[test]
    fn per_context_limit_is_independent_per_context() {
        let config = BudgetConfig {
            max_iterations_per_context: 1,
            max_total_iterations: 100,
            ..Default::default()
        };
        let mut tracker = BudgetTracker::default();
        assert!(tracker.record_iteration(Some("CTX_1"), &config));
        assert!(!tracker.record_iteration(Some("CTX_1"), &config));
    }

    #[test]
    fn gap_budget_does_not_share_main_iteration_count() {
        let config = BudgetConfig {
            max_total_iterations: 1,
            gap_research_max_iterations: 2,
            ..Default::default()
        };
        let mut tracker = BudgetTracker::default();
        assert!(tracker.record_iteration(None, &config));
        assert!(!tracker.record_iteration(None, &config));
        // Gap phase still has its own budget after main phase is exhausted.
        assert!(tracker.record_gap_iteration(&config));
        assert!(tracker.record_gap_iteration(&config));
        assert!(!tracker.record_gap_iteration(&config));
    }
}
