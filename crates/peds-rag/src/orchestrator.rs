use peds_core::{SearchHistoryRecord, SearchMethod, SearchResult};
use peds_error::{PedsError, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::store::ReferenceStore;

/// A result list plus the retrieval path that produced it.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub method: SearchMethod,
}

/// Orchestrator counters. Audit failures are swallowed on the request path
/// but counted here so operators can see audit-log degradation.
#[derive(Debug, Default)]
pub struct SearchStats {
    pub query_count: AtomicU64,
    pub text_hits: AtomicU64,
    pub vector_fallbacks: AtomicU64,
    pub no_result_queries: AtomicU64,
    pub audit_failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchStatsSnapshot {
    pub query_count: u64,
    pub text_hits: u64,
    pub vector_fallbacks: u64,
    pub no_result_queries: u64,
    pub audit_failures: u64,
}

impl SearchStats {
    pub fn snapshot(&self) -> SearchStatsSnapshot {
        SearchStatsSnapshot {
            query_count: self.query_count.load(Ordering::Relaxed),
            text_hits: self.text_hits.load(Ordering::Relaxed),
            vector_fallbacks: self.vector_fallbacks.load(Ordering::Relaxed),
            no_result_queries: self.no_result_queries.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Normalizes a query for the text-rank procedure: trim, split on
/// whitespace, strip non-word characters per token, drop empties, join
/// with the store's logical-AND operator.
pub fn normalize_query(query: &str) -> String {
    query
        .trim()
        .split_whitespace()
        .map(|term| {
            term.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|term| !term.is_empty())
        .collect::<Vec<_>>()
        .join(" & ")
}

/// Tries text search first, falls back to vector search, and records one
/// best-effort audit row per served request. The two paths are exclusive
/// per call; results are returned in store order.
pub struct SearchOrchestrator {
    store: Arc<dyn ReferenceStore>,
    stats: Arc<SearchStats>,
}

impl SearchOrchestrator {
    pub fn new(store: Arc<dyn ReferenceStore>, stats: Arc<SearchStats>) -> Self {
        Self { store, stats }
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, limit: i64) -> Result<SearchOutcome> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(PedsError::InvalidInput {
                reason: "query text is required".to_string(),
            });
        }
        if limit < 1 {
            return Err(PedsError::InvalidInput {
                reason: format!("limit must be at least 1, got {}", limit),
            });
        }
        SearchStats::bump(&self.stats.query_count);

        // Text path first: no vector index required, so it works in
        // partially provisioned deployments. A store error here is fatal.
        let normalized = normalize_query(query);
        let text_results = self.store.text_search(&normalized, limit).await?;

        let (results, method) = if !text_results.is_empty() {
            SearchStats::bump(&self.stats.text_hits);
            (text_results, SearchMethod::TextSearch)
        } else {
            // Vector fallback takes the original, unnormalized query. A
            // store error on this path degrades to zero rows.
            match self.store.vector_search(trimmed, limit).await {
                Ok(vector_results) if !vector_results.is_empty() => {
                    SearchStats::bump(&self.stats.vector_fallbacks);
                    (vector_results, SearchMethod::VectorSearch)
                }
                Ok(_) => (Vec::new(), SearchMethod::NoResults),
                Err(e) => {
                    warn!(error = %e, "vector search failed; treating as no results");
                    (Vec::new(), SearchMethod::NoResults)
                }
            }
        };

        if method == SearchMethod::NoResults {
            SearchStats::bump(&self.stats.no_result_queries);
            debug!(query = %trimmed, "no results on either path");
            return Ok(SearchOutcome { results, method });
        }

        let record = SearchHistoryRecord {
            query: trimmed.to_string(),
            response_chunks: results.iter().map(|r| r.chunk_id.clone()).collect(),
            enhanced_response: None,
        };
        if let Err(e) = self.store.log_search(&record).await {
            SearchStats::bump(&self.stats.audit_failures);
            warn!(error = %e, "failed to record search history");
        }

        debug!(
            query = %trimmed,
            method = method.as_str(),
            result_count = results.len(),
            "search completed"
        );
        Ok(SearchOutcome { results, method })
    }
}
