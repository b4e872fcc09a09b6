//! Strict + lenient schema pairs for the three structured LLM outputs the
//! pipeline consumes (Understanding, Evidence extraction, Verdicts), plus
//! the shared wrapper-key/numeric-coercion helpers the gateway's
//! resilience chain uses against any of them (C3).
//!
//! Built directly on the teacher's typed-signature field model
//! (`crate::signature::{FieldSpec, FieldType}`) rather than reinventing a
//! schema representation.

use serde_json::Value;

use crate::signature::{FieldSpec, FieldType};

/// A strict schema (required fields enforced) paired with a lenient twin
/// that fills every field with a safe default via `FieldType`'s own
/// default, so a nearly-valid payload can still be salvaged (§4.2 step 2).
pub struct SchemaPair {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl SchemaPair {
    pub fn to_strict_json_schema(&self) -> Value {
        FieldType::object(self.fields.clone()).to_json_schema()
    }

    /// Validate `value` against the strict schema; on failure, fill
    /// missing/invalid fields with per-type defaults and return the
    /// lenient reconstruction instead of failing outright.
    pub fn validate_or_lenient(&self, value: Value) -> Value {
        let obj_type = FieldType::object(self.fields.clone());
        if obj_type.is_compatible(&value) {
            return value;
        }
        self.apply_lenient_defaults(value)
    }

    fn apply_lenient_defaults(&self, value: Value) -> Value {
        let mut obj = value.as_object().cloned().unwrap_or_default();
        for field in &self.fields {
            let entry = obj.get(&field.name).cloned();
            let valid = entry
                .as_ref()
                .map(|v| field.field_type.is_compatible(v))
                .unwrap_or(false);
            if !valid {
                let default = field
                    .default
                    .clone()
                    .unwrap_or_else(|| lenient_default(&field.field_type));
                obj.insert(field.name.clone(), default);
            }
        }
        Value::Object(obj)
    }
}

/// A safe, always-compatible default value for a `FieldType`.
pub fn lenient_default(field_type: &FieldType) -> Value {
    match field_type {
        FieldType::String => Value::String(String::new()),
        FieldType::Integer | FieldType::Float => Value::from(0),
        FieldType::Boolean => Value::Bool(false),
        FieldType::List(_) => Value::Array(Vec::new()),
        FieldType::Object(fields) => {
            let mut obj = serde_json::Map::new();
            for f in fields {
                obj.insert(f.name.clone(), lenient_default(&f.field_type));
            }
            Value::Object(obj)
        }
        FieldType::Enum(values) => values
            .first()
            .map(|v| Value::String(v.clone()))
            .unwrap_or_else(|| Value::String(String::new())),
        FieldType::Custom(_) => Value::Null,
    }
}

/// Known provider wrapper keys that can nest the real payload
/// (§4.2 step 1, §9).
const WRAPPER_KEYS: &[&str] = &["$PARAMETER_NAME", "data", "result", "output", "response"];

/// Peel a known wrapper key if the top-level object is a single-key
/// wrapper around the real payload; otherwise return `value` unchanged.
pub fn unwrap_wrapper_keys(value: Value) -> Value {
    let Value::Object(ref obj) = value else {
        return value;
    };
    for key in WRAPPER_KEYS {
        if let Some(inner) = obj.get(*key) {
            if obj.len() == 1 {
                return inner.clone();
            }
        }
    }
    value
}

/// Coerce string-encoded numerics (`"65"`, `"65%"`) to numbers in place,
/// recursively. Used before schema validation so provider quirks don't
/// trigger an avoidable fallback.
pub fn coerce_numeric_strings(value: &mut Value) {
    match value {
        Value::String(s) => {
            let trimmed = s.trim().trim_end_matches('%');
            if let Ok(n) = trimmed.parse::<f64>() {
                *value = serde_json::json!(n);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(coerce_numeric_strings),
        Value::Object(map) => map.values_mut().for_each(coerce_numeric_strings),
        _ => {}
    }
}

/// Salvage the first top-level JSON object embedded in free text (an error
/// message's serialized candidate, or a free-text-JSON-only fallback
/// response) (§4.2 steps 2 and 4).
pub fn salvage_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..=i];
                    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                        return Some(value);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Understanding-phase output schema (§4.11 phase 2; fields per §3's
/// `ClaimUnderstanding`).
pub fn understanding_schema() -> SchemaPair {
    SchemaPair {
        name: "understanding",
        fields: vec![
            FieldSpec::new("detectedInputType", FieldType::enum_of(["claim", "article"])),
            FieldSpec::new("impliedClaim", FieldType::String),
            FieldSpec::new("mainThesis", FieldType::String),
            FieldSpec::new("articleThesis", FieldType::String).optional(),
            FieldSpec::new("backgroundDetails", FieldType::String).optional(),
            FieldSpec::new(
                "analysisContexts",
                FieldType::list(FieldType::object(vec![
                    FieldSpec::new("name", FieldType::String),
                    FieldSpec::new("subject", FieldType::String).optional(),
                    FieldSpec::new("assessedStatement", FieldType::String).optional(),
                ])),
            )
            .optional(),
            FieldSpec::new(
                "subClaims",
                FieldType::list(FieldType::object(vec![
                    FieldSpec::new("text", FieldType::String),
                    FieldSpec::new(
                        "centrality",
                        FieldType::enum_of(["high", "medium", "low"]),
                    )
                    .optional(),
                    FieldSpec::new(
                        "thesisRelevance",
                        FieldType::enum_of(["direct", "tangential", "irrelevant"]),
                    )
                    .optional(),
                ])),
            ),
            FieldSpec::new(
                "keyFactors",
                FieldType::list(FieldType::object(vec![
                    FieldSpec::new("name", FieldType::String),
                    FieldSpec::new(
                        "factualBasis",
                        FieldType::enum_of(["established", "disputed", "opinion", "unknown"]),
                    )
                    .optional(),
                    FieldSpec::new("contextId", FieldType::String).optional(),
                    FieldSpec::new(
                        "polarity",
                        FieldType::enum_of(["positive", "negative", "neutral"]),
                    )
                    .optional(),
                ])),
            )
            .optional(),
            FieldSpec::new("researchQueries", FieldType::list(FieldType::String)).optional(),
            FieldSpec::new("riskTier", FieldType::enum_of(["A", "B", "C"])).optional(),
        ],
    }
}

/// Evidence-extraction output schema (§4.5).
pub fn evidence_extraction_schema() -> SchemaPair {
    SchemaPair {
        name: "evidence_extraction",
        fields: vec![FieldSpec::new(
            "evidenceItems",
            FieldType::list(FieldType::object(vec![
                FieldSpec::new("statement", FieldType::String),
                FieldSpec::new("category", FieldType::String).optional(),
                FieldSpec::new(
                    "specificity",
                    FieldType::enum_of(["high", "medium", "low"]),
                )
                .optional(),
                FieldSpec::new("sourceExcerpt", FieldType::String),
                FieldSpec::new("contextId", FieldType::String).optional(),
                FieldSpec::new(
                    "claimDirection",
                    FieldType::enum_of(["supports", "contradicts", "neutral"]),
                )
                .optional(),
                FieldSpec::new(
                    "sourceAuthority",
                    FieldType::enum_of(["primary", "secondary", "opinion", "contested"]),
                )
                .optional(),
                FieldSpec::new(
                    "evidenceBasis",
                    FieldType::enum_of([
                        "scientific",
                        "documented",
                        "anecdotal",
                        "theoretical",
                        "pseudoscientific",
                    ]),
                )
                .optional(),
                FieldSpec::new(
                    "probativeValue",
                    FieldType::enum_of(["high", "medium", "low"]),
                )
                .optional(),
            ])),
        )],
    }
}

/// Verdict output schema (§4.7); shared shape across the three modes, with
/// mode-specific fields left optional.
pub fn verdict_schema() -> SchemaPair {
    SchemaPair {
        name: "verdict",
        fields: vec![
            FieldSpec::new("verdictSummary", FieldType::String).optional(),
            FieldSpec::new(
                "claimVerdicts",
                FieldType::list(FieldType::object(vec![
                    FieldSpec::new("claimId", FieldType::String),
                    FieldSpec::new("verdict", FieldType::Float),
                    FieldSpec::new("confidence", FieldType::Float).optional(),
                    FieldSpec::new("reasoning", FieldType::String).optional(),
                    FieldSpec::new(
                        "ratingConfirmation",
                        FieldType::enum_of(["claim_supported", "claim_refuted", "mixed"]),
                    )
                    .optional(),
                ])),
            ),
            FieldSpec::new("analysisContextAnswers", FieldType::list(FieldType::String))
                .optional(),
            FieldSpec::new("articleAnalysis", FieldType::custom("ArticleAnalysis")).optional(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_parameter_name_wrapper() {
        let wrapped = serde_json::json!({"$PARAMETER_NAME": {"verdict": 80}});
        let unwrapped = unwrap_wrapper_keys(wrapped);
        assert_eq!(unwrapped["verdict"], 80);
    }

    #[test]
    fn leaves_multi_key_object_untouched() {
        let value = serde_json::json!({"data": {"a": 1}, "other": 2});
        let result = unwrap_wrapper_keys(value.clone());
        assert_eq!(result, value);
    }

    #[test]
    fn coerces_percent_strings_to_numbers() {
        let mut value = serde_json::json!({"verdict": "65%", "confidence": "90"});
        coerce_numeric_strings(&mut value);
        assert_eq!(value["verdict"], 65.0);
        assert_eq!(value["confidence"], 90.0);
    }

    #[test]
    fn salvages_json_object_from_surrounding_text() {
        let text = r#"Error calling tool. Value: {"verdict": 72, "confidence": 80} (end)"#;
        let salvaged = salvage_json_object(text).unwrap();
        assert_eq!(salvaged["verdict"], 72);
    }

    #[test]
    fn lenient_validation_fills_missing_required_field() {
        let schema = understanding_schema();
        let partial = serde_json::json!({"detectedInputType": "claim", "subClaims": []});
        let filled = schema.validate_or_lenient(partial);
        assert_eq!(filled["impliedClaim"], "");
        assert_eq!(filled["detectedInputType"], "claim");
    }
}
