//! Structured-output gateway (C2): `structured()`/`freeform()` over any
//! `LLMClient`, wrapping every call in the four-step output-resilience
//! chain (§4.2): wrapper-key unwrap + numeric coercion, lenient-schema
//! fallback, a compact retry, then a free-text JSON-only last resort.
//!
//! Built on the teacher's `LLMClient` trait and `CompletionRequest`/
//! `CompletionResponse` (kept unchanged) plus `crate::schema`'s salvage
//! helpers.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::llm::{ChatMessage, CompletionRequest, LLMClient};
use crate::schema::{coerce_numeric_strings, salvage_json_object, unwrap_wrapper_keys, SchemaPair};

/// Picks the model for a given task from the configured overrides, falling
/// back to the client's own default when unset (§4.11, per-phase model
/// selection).
pub fn select_model(task_model: Option<&str>, fallback: Option<&str>) -> Option<String> {
    task_model
        .or(fallback)
        .map(|s| s.to_string())
}

/// A structured-output call: system prompt, user prompt, target schema,
/// and the model to use.
pub struct StructuredCall<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub schema: &'a SchemaPair,
    pub model: Option<String>,
    pub max_tokens: u32,
}

/// Request a JSON object conforming to `call.schema`, applying the full
/// resilience chain before giving up.
///
/// 1. Ask for JSON directly; on success, unwrap any wrapper key, coerce
///    numeric-looking strings, and validate. A valid-or-lenient result
///    short-circuits here.
/// 2. Salvage a JSON object out of the raw response text (handles a
///    provider that wrapped valid JSON in prose).
/// 3. Retry once with a compact variant of the prompt, requesting a
///    smaller/terser object.
/// 4. Free-text JSON-only last resort: a minimal "reply with JSON only"
///    prompt, salvaged the same way.
///
/// Every step that succeeds returns the lenient-filled object rather than
/// failing outright; only a total failure across all four steps surfaces
/// an error to the caller (§4.2, §7).
#[tracing::instrument(skip(client, call), fields(task = %call.schema.name))]
pub async fn structured(client: &Arc<dyn LLMClient>, call: StructuredCall<'_>) -> Result<Value> {
    let task = call.schema.name.to_string();

    if let Some(value) = try_once(client, call.system, call.prompt, &call.model, call.max_tokens, call.schema).await? {
        return Ok(value);
    }
    tracing::debug!(task = %task, "direct structured call failed, retrying compact");

    let compact_prompt = format!(
        "{}\n\nReply with the smallest possible JSON object satisfying the schema. No prose.",
        call.prompt
    );
    if let Some(value) = try_once(client, call.system, &compact_prompt, &call.model, call.max_tokens, call.schema).await? {
        return Ok(value);
    }
    tracing::debug!(task = %task, "compact retry failed, falling back to free-text salvage");

    let final_prompt = format!(
        "Reply with a single JSON object only, matching this task: {}. No markdown, no prose, no commentary.",
        call.prompt
    );
    if let Some(value) = try_once(client, call.system, &final_prompt, &call.model, call.max_tokens, call.schema).await? {
        return Ok(value);
    }

    tracing::warn!(task = %task, "structured output resilience chain exhausted");
    Err(Error::structured_output(task, "exhausted resilience chain without a usable JSON object"))
}

async fn try_once(
    client: &Arc<dyn LLMClient>,
    system: &str,
    prompt: &str,
    model: &Option<String>,
    max_tokens: u32,
    schema: &SchemaPair,
) -> Result<Option<Value>> {
    let mut request = CompletionRequest::new()
        .with_system(system)
        .with_message(ChatMessage::user(prompt))
        .with_max_tokens(max_tokens);
    if let Some(m) = model {
        request = request.with_model(m.clone());
    }

    let response = client
        .complete(request)
        .await
        .map_err(|e| Error::llm_api("gateway", e.to_string()))?;

    if let Some(value) = parse_candidate(&response.content, schema) {
        return Ok(Some(value));
    }
    Ok(None)
}

fn parse_candidate(text: &str, schema: &SchemaPair) -> Option<Value> {
    let raw = serde_json::from_str::<Value>(text.trim()).ok().or_else(|| salvage_json_object(text))?;
    let unwrapped = unwrap_wrapper_keys(raw);
    let mut coerced = unwrapped;
    coerce_numeric_strings(&mut coerced);
    Some(schema.validate_or_lenient(coerced))
}

/// Unstructured completion, used for narrative report sections (§4.11
/// phase 6) where no schema applies.
pub async fn freeform(client: &Arc<dyn LLMClient>, system: &str, prompt: &str, model: Option<String>, max_tokens: u32) -> Result<String> {
    let mut request = CompletionRequest::new()
        .with_system(system)
        .with_message(ChatMessage::user(prompt))
        .with_max_tokens(max_tokens);
    if let Some(m) = model {
        request = request.with_model(m);
    }
    let response = client
        .complete(request)
        .await
        .map_err(|e| Error::llm_api("gateway", e.to_string()))?;
    Ok(response.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{EmbeddingRequest, EmbeddingResponse, ModelSpec, Provider, TokenUsage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedClient {
        responses: Vec<&'static str>,
        call_count: AtomicUsize,
    }

    #[async_trait]
    impl LLMClient for ScriptedClient {
        async fn complete(&self, _request: CompletionRequest) -> Result<crate::llm::CompletionResponse> {
            let i = self.call_count.fetch_add(1, Ordering::SeqCst);
            let content = self.responses.get(i).copied().unwrap_or("{}").to_string();
            Ok(crate::llm::CompletionResponse {
                id: "r1".into(),
                model: "test-model".into(),
                content,
                stop_reason: None,
                usage: TokenUsage::default(),
                timestamp: chrono::DateTime::from_timestamp(0, 0).unwrap(),
                cost: None,
            })
        }

        async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse> {
            unimplemented!()
        }

        fn provider(&self) -> Provider {
            Provider::Anthropic
        }

        fn available_models(&self) -> Vec<ModelSpec> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn structured_accepts_clean_json_first_try() {
        let client: Arc<dyn LLMClient> = Arc::new(ScriptedClient {
            responses: vec![r#"{"detectedInputType": "claim", "subClaims": []}"#],
            call_count: AtomicUsize::new(0),
        });
        let schema = crate::schema::understanding_schema();
        let call = StructuredCall { system: "s", prompt: "p", schema: &schema, model: None, max_tokens: 1024 };
        let value = structured(&client, call).await.unwrap();
        assert_eq!(value["detectedInputType"], "claim");
        assert_eq!(value["impliedClaim"], "");
    }

    #[tokio::test]
    async fn structured_salvages_json_embedded_in_prose() {
        let client: Arc<dyn LLMClient> = Arc::new(ScriptedClient {
            responses: vec![r#"Sure, here you go: {"detectedInputType": "article", "subClaims": []} thanks!"#],
            call_count: AtomicUsize::new(0),
        });
        let schema = crate::schema::understanding_schema();
        let call = StructuredCall { system: "s", prompt: "p", schema: &schema, model: None, max_tokens: 1024 };
        let value = structured(&client, call).await.unwrap();
        assert_eq!(value["detectedInputType"], "article");
    }

    #[tokio::test]
    async fn structured_fails_after_exhausting_all_attempts() {
        let client: Arc<dyn LLMClient> = Arc::new(ScriptedClient {
            responses: vec!["not json at all", "still not json", "nope"],
            call_count: AtomicUsize::new(0),
        });
        let schema = crate::schema::understanding_schema();
        let call = StructuredCall { system: "s", prompt: "p", schema: &schema, model: None, max_tokens: 1024 };
        let err = structured(&client, call).await.unwrap_err();
        assert!(matches!(err, Error::StructuredOutput { .. }));
    }

    #[test]
    fn select_model_prefers_task_override() {
        assert_eq!(select_model(Some("task-model"), Some("fallback")), Some("task-model".to_string()));
        assert_eq!(select_model(None, Some("fallback")), Some("fallback".to_string()));
    }
}
