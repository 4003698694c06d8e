use async_trait::async_trait;
use peds_core::{SearchHistoryRecord, SearchResult};
use peds_error::{PedsError, Result};
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

/// Client seam to the external reference store. Ranking is executed
/// store-side; both search calls return rows in store order.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Text-rank procedure. Expects a normalized `&`-joined query.
    async fn text_search(&self, query: &str, limit: i64) -> Result<Vec<SearchResult>>;

    /// Embedding-similarity procedure. Takes the raw query; embedding
    /// happens store-side.
    async fn vector_search(&self, query: &str, limit: i64) -> Result<Vec<SearchResult>>;

    /// Appends one audit row. Callers treat failures as best-effort.
    async fn log_search(&self, record: &SearchHistoryRecord) -> Result<()>;
}

// ========== Postgres implementation ==========

/// Reference store backed by managed Postgres. The two ranking procedures
/// (`text_search_nelson_chunks`, `search_nelson_chunks`) live in the
/// database; this client only binds parameters and maps rows.
pub struct PgReferenceStore {
    pool: PgPool,
}

impl PgReferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferenceStore for PgReferenceStore {
    #[instrument(skip(self))]
    async fn text_search(&self, query: &str, limit: i64) -> Result<Vec<SearchResult>> {
        let rows = sqlx::query("SELECT chunk_id, content, rank FROM text_search_nelson_chunks($1, $2)")
            .bind(query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PedsError::SearchBackend {
                operation: "text_search_nelson_chunks".to_string(),
                message: e.to_string(),
            })?;

        Ok(rows
            .into_iter()
            .map(|r| SearchResult {
                chunk_id: r.get("chunk_id"),
                content: r.get("content"),
                similarity: None,
                rank: r.try_get("rank").ok(),
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn vector_search(&self, query: &str, limit: i64) -> Result<Vec<SearchResult>> {
        let rows = sqlx::query("SELECT chunk_id, content, similarity FROM search_nelson_chunks($1, $2)")
            .bind(query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PedsError::SearchBackend {
                operation: "search_nelson_chunks".to_string(),
                message: e.to_string(),
            })?;

        Ok(rows
            .into_iter()
            .map(|r| SearchResult {
                chunk_id: r.get("chunk_id"),
                content: r.get("content"),
                similarity: r.try_get("similarity").ok(),
                rank: None,
            })
            .collect())
    }

    #[instrument(skip(self, record))]
    async fn log_search(&self, record: &SearchHistoryRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO search_history (query, response_chunks, enhanced_response) VALUES ($1, $2, $3)",
        )
        .bind(&record.query)
        .bind(&record.response_chunks)
        .bind(&record.enhanced_response)
        .execute(&self.pool)
        .await
        .map_err(|e| PedsError::AuditWrite {
            message: e.to_string(),
        })?;
        Ok(())
    }
}

// ========== In-memory implementation ==========

#[derive(Debug, Clone)]
struct MemoryChunk {
    chunk_id: String,
    content: String,
}

/// In-process reference store for tests and demo deployments. Text search
/// requires every `&`-joined term; vector search stands in with token
/// overlap so fallback behavior can be exercised without a database.
#[derive(Default)]
pub struct MemoryReferenceStore {
    chunks: Arc<RwLock<Vec<MemoryChunk>>>,
    history: Arc<RwLock<Vec<SearchHistoryRecord>>>,
}

fn tokens(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|t| {
            t.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

impl MemoryReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunks(chunks: impl IntoIterator<Item = (String, String)>) -> Self {
        let chunks: Vec<MemoryChunk> = chunks
            .into_iter()
            .map(|(chunk_id, content)| MemoryChunk { chunk_id, content })
            .collect();
        Self {
            chunks: Arc::new(RwLock::new(chunks)),
            history: Arc::default(),
        }
    }

    pub async fn insert(&self, chunk_id: impl Into<String>, content: impl Into<String>) {
        self.chunks.write().await.push(MemoryChunk {
            chunk_id: chunk_id.into(),
            content: content.into(),
        });
    }

    /// Recorded audit rows, oldest first.
    pub async fn history(&self) -> Vec<SearchHistoryRecord> {
        self.history.read().await.clone()
    }
}

#[async_trait]
impl ReferenceStore for MemoryReferenceStore {
    async fn text_search(&self, query: &str, limit: i64) -> Result<Vec<SearchResult>> {
        let terms: Vec<String> = query
            .split('&')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().await;
        let mut scored: Vec<(f32, &MemoryChunk)> = chunks
            .iter()
            .filter_map(|chunk| {
                let haystack = chunk.content.to_lowercase();
                if !terms.iter().all(|t| haystack.contains(t.as_str())) {
                    return None;
                }
                let occurrences: usize = terms.iter().map(|t| haystack.matches(t.as_str()).count()).sum();
                Some((occurrences as f32, chunk))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.chunk_id.cmp(&b.1.chunk_id))
        });

        Ok(scored
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(rank, chunk)| SearchResult {
                chunk_id: chunk.chunk_id.clone(),
                content: chunk.content.clone(),
                similarity: None,
                rank: Some(rank),
            })
            .collect())
    }

    async fn vector_search(&self, query: &str, limit: i64) -> Result<Vec<SearchResult>> {
        let query_tokens = tokens(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().await;
        let mut scored: Vec<(f32, &MemoryChunk)> = chunks
            .iter()
            .filter_map(|chunk| {
                let chunk_tokens = tokens(&chunk.content);
                let shared = query_tokens.intersection(&chunk_tokens).count();
                if shared == 0 {
                    return None;
                }
                let union = query_tokens.union(&chunk_tokens).count();
                Some((shared as f32 / union as f32, chunk))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.chunk_id.cmp(&b.1.chunk_id))
        });

        Ok(scored
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(similarity, chunk)| SearchResult {
                chunk_id: chunk.chunk_id.clone(),
                content: chunk.content.clone(),
                similarity: Some(similarity),
                rank: None,
            })
            .collect())
    }

    async fn log_search(&self, record: &SearchHistoryRecord) -> Result<()> {
        self.history.write().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> MemoryReferenceStore {
        MemoryReferenceStore::with_chunks(vec![
            (
                "c1".to_string(),
                "Fever in infants requires age-specific risk assessment.".to_string(),
            ),
            (
                "c2".to_string(),
                "Pneumonia is an infection of the lung parenchyma.".to_string(),
            ),
            (
                "c3".to_string(),
                "Fever enhances immune function during infection. Fever is not a disease.".to_string(),
            ),
        ])
    }

    #[tokio::test]
    async fn text_search_requires_all_terms() {
        let store = sample_store();
        let results = store.text_search("fever & infants", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "c1");
        assert!(results[0].rank.is_some());
        assert!(results[0].similarity.is_none());
    }

    #[tokio::test]
    async fn text_search_ranks_by_occurrences() {
        let store = sample_store();
        let results = store.text_search("fever", 5).await.unwrap();
        assert_eq!(results.len(), 2);
        // c3 mentions fever twice and sorts first.
        assert_eq!(results[0].chunk_id, "c3");
        assert_eq!(results[1].chunk_id, "c1");
    }

    #[tokio::test]
    async fn vector_search_scores_token_overlap() {
        let store = sample_store();
        let results = store.vector_search("lung infection in children", 5).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].chunk_id, "c2");
        assert!(results[0].similarity.unwrap() > 0.0);
        assert!(results[0].rank.is_none());
    }

    #[tokio::test]
    async fn limit_caps_result_count() {
        let store = sample_store();
        let results = store.text_search("fever", 1).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn log_search_appends_history() {
        let store = sample_store();
        store
            .log_search(&SearchHistoryRecord {
                query: "fever".into(),
                response_chunks: vec!["c1".into()],
                enhanced_response: None,
            })
            .await
            .unwrap();
        let history = store.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].response_chunks, vec!["c1".to_string()]);
    }
}
