use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One passage returned by the reference store. `similarity` is set on the
/// vector path, `rank` on the text path; the list is never mutated after
/// creation and never mixes the two paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<f32>,
}

/// Which retrieval path produced a result list. Recorded per request for
/// observability; paths are exclusive per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    TextSearch,
    VectorSearch,
    NoResults,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::TextSearch => "text_search",
            SearchMethod::VectorSearch => "vector_search",
            SearchMethod::NoResults => "no_results",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

impl Sender {
    fn id_prefix(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Ai => "ai",
        }
    }
}

/// One turn of the conversation. Immutable once created; the conversation
/// is an append-only ordered sequence persisted whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        let timestamp = Utc::now();
        Self {
            id: format!("{}-{}", sender.id_prefix(), timestamp.timestamp_millis()),
            content: content.into(),
            sender,
            timestamp,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Sender::User, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(Sender::Ai, content)
    }
}

/// Write-only audit row. Failures to record one are swallowed by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHistoryRecord {
    pub query: String,
    pub response_chunks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced_response: Option<String>,
}

// === HTTP envelopes ===

pub const DEFAULT_SEARCH_LIMIT: i64 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<i64>,
}

impl SearchRequest {
    pub fn limit_or_default(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub method: SearchMethod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesizeRequest {
    pub query: String,
    #[serde(rename = "searchResults")]
    pub search_results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesizeResponse {
    #[serde(rename = "aiResponse")]
    pub ai_response: String,
    #[serde(rename = "searchResults")]
    pub search_results: Vec<SearchResult>,
}

pub use peds_error::{PedsError as Error, Result};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_carry_role_prefix() {
        let m = ConversationMessage::user("hello");
        assert!(m.id.starts_with("user-"));
        let m = ConversationMessage::ai("hi");
        assert!(m.id.starts_with("ai-"));
    }

    #[test]
    fn search_method_serializes_snake_case() {
        let s = serde_json::to_string(&SearchMethod::TextSearch).unwrap();
        assert_eq!(s, "\"text_search\"");
        let s = serde_json::to_string(&SearchMethod::NoResults).unwrap();
        assert_eq!(s, "\"no_results\"");
    }

    #[test]
    fn synthesize_request_uses_camel_case_wire_field() {
        let req: SynthesizeRequest = serde_json::from_str(
            r#"{"query":"fever","searchResults":[{"chunk_id":"c1","content":"Fever."}]}"#,
        )
        .unwrap();
        assert_eq!(req.search_results.len(), 1);
        assert_eq!(req.search_results[0].chunk_id, "c1");
        assert!(req.search_results[0].rank.is_none());
    }

    #[test]
    fn default_limit_is_five() {
        let req = SearchRequest {
            query: "fever".into(),
            limit: None,
        };
        assert_eq!(req.limit_or_default(), 5);
    }
}
