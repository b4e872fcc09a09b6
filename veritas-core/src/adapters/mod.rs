//! External-system adapter contracts (§6): the orchestrator depends only
//! on these traits, never directly on a provider SDK or search API, so a
//! caller can swap in stubs for testing or a different backend in
//! production.
//!
//! Kept the teacher's "pluggable deployment adapter" naming and
//! doc-comment shape; the teacher's CLI/Claude-Code/TUI deployment
//! adapters underneath have no counterpart here and are not re-exported.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::EvidenceItem;

/// A single web search result, prior to fetching.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Issues a search query against a provider (§4.6, §6).
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

/// Fetches and extracts readable text from a URL (§6).
#[async_trait]
pub trait FetcherAdapter: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Looks up a source's historical reliability, if known (§4.5's
/// high-impact-outcome safeguard, §6).
#[async_trait]
pub trait SourceReliabilityAdapter: Send + Sync {
    /// Returns `(score, confidence)` in `[0,1]`, or `None` if the source
    /// has no known track record.
    async fn track_record(&self, url: &str) -> Result<Option<(f64, f64)>>;
}

/// Extracts evidence items from one fetched source's text in service of a
/// claim/thesis (§4.5, §6). Implementations typically wrap
/// `llm::gateway::structured` with `schema::evidence_extraction_schema()`.
#[async_trait]
pub trait EvidenceExtractionAdapter: Send + Sync {
    async fn extract_evidence(&self, source_text: &str, claim_text: &str, thesis: &str) -> Result<Vec<EvidenceItem>>;
}

#[cfg(test)]
pub mod test_doubles {
    use super::*;

    /// In-process stub returning a fixed set of results, for orchestrator
    /// tests that don't need a real network call.
    pub struct StubSearchAdapter {
        pub results: Vec<SearchResult>,
    }

    #[async_trait]
    impl SearchAdapter for StubSearchAdapter {
        async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
            Ok(self.results.iter().take(max_results).cloned().collect())
        }
    }

    pub struct StubFetcherAdapter {
        pub text_by_url: std::collections::HashMap<String, String>,
    }

    #[async_trait]
    impl FetcherAdapter for StubFetcherAdapter {
        async fn fetch(&self, url: &str) -> Result<String> {
            Ok(self.text_by_url.get(url).cloned().unwrap_or_default())
        }
    }

    pub struct StubReliabilityAdapter {
        pub score: Option<(f64, f64)>,
    }

    #[async_trait]
    impl SourceReliabilityAdapter for StubReliabilityAdapter {
        async fn track_record(&self, _url: &str) -> Result<Option<(f64, f64)>> {
            Ok(self.score)
        }
    }
}
