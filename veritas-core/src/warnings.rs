//! Fallback classification-default normalization and analysis warnings
//! (C11). Grounded on `signature/fallback.rs`'s audit-trail shape: record
//! what was defaulted and why, rather than silently substituting a value.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why a fallback default was used for a classification field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    Missing,
    Invalid,
}

/// One audit record of a classification field that was normalized to a
/// safe default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRecord {
    pub field: String,
    pub location: String,
    /// First 100 chars of the offending text, for audit display.
    pub text: String,
    pub default_used: String,
    pub reason: FallbackReason,
}

/// Append-only audit trail of every classification default applied during
/// an analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FallbackTracker {
    pub records: Vec<FallbackRecord>,
}

impl FallbackTracker {
    pub fn record(
        &mut self,
        field: impl Into<String>,
        location: impl Into<String>,
        text: &str,
        default_used: impl Into<String>,
        reason: FallbackReason,
    ) {
        let truncated: String = text.chars().take(100).collect();
        self.records.push(FallbackRecord {
            field: field.into(),
            location: location.into(),
            text: truncated,
            default_used: default_used.into(),
            reason,
        });
    }

    pub fn counts_by_field(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for record in &self.records {
            *counts.entry(record.field.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Safe defaults for classification fields that an LLM may omit or return
/// with an invalid value (§4.10).
pub const DEFAULT_HARM_POTENTIAL: &str = "medium";
pub const DEFAULT_FACTUAL_BASIS: &str = "unknown";
pub const DEFAULT_IS_CONTESTED: &str = "false";
pub const DEFAULT_SOURCE_AUTHORITY: &str = "secondary";
pub const DEFAULT_EVIDENCE_BASIS: &str = "anecdotal";

/// Severity of a structured analysis warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    Info,
    Warning,
    Error,
}

/// The catalog of structured warnings the pipeline can surface (§4.10,
/// §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    StructuredOutputFailure,
    VerdictDirectionMismatch,
    RecencyEvidenceGap,
    BudgetExceeded,
    EvidenceFilterDegradation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisWarning {
    pub kind: WarningKind,
    pub severity: WarningSeverity,
    pub message: String,
    pub details: HashMap<String, String>,
}

impl AnalysisWarning {
    pub fn new(kind: WarningKind, severity: WarningSeverity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}
