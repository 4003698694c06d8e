pub mod canned;
pub mod store;

pub use canned::canned_response;
pub use store::{ConversationStore, JsonFileConversationStore, MemoryConversationStore};

use peds_core::{ConversationMessage, SearchMethod, DEFAULT_SEARCH_LIMIT};
use peds_rag::{AnswerOrigin, AnswerSynthesizer, SearchOrchestrator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{instrument, warn};

/// Conversation session: an append-only message log driving the
/// search-then-synthesize pipeline. Sends are serialized through a
/// single-flight lock so assistant replies append in send order; the user
/// message of a queued send still appends immediately.
pub struct ChatSession {
    orchestrator: SearchOrchestrator,
    synthesizer: AnswerSynthesizer,
    store: Arc<dyn ConversationStore>,
    messages: Arc<RwLock<Vec<ConversationMessage>>>,
    typing: AtomicBool,
    send_lock: Mutex<()>,
    limit: i64,
}

impl ChatSession {
    /// Creates a session and restores any persisted conversation.
    pub async fn load(
        orchestrator: SearchOrchestrator,
        synthesizer: AnswerSynthesizer,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        let messages = match store.load().await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "failed to load persisted conversation; starting empty");
                Vec::new()
            }
        };
        Self {
            orchestrator,
            synthesizer,
            store,
            messages: Arc::new(RwLock::new(messages)),
            typing: AtomicBool::new(false),
            send_lock: Mutex::new(()),
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    pub async fn messages(&self) -> Vec<ConversationMessage> {
        self.messages.read().await.clone()
    }

    pub fn is_typing(&self) -> bool {
        self.typing.load(Ordering::SeqCst)
    }

    /// Sends one user turn. Blank content is a silent no-op; every other
    /// path appends exactly one assistant message, however degraded.
    #[instrument(skip(self, content))]
    pub async fn send(&self, content: &str) {
        if content.trim().is_empty() {
            return;
        }

        self.append(ConversationMessage::user(content)).await;

        // One outstanding pipeline per conversation.
        let _guard = self.send_lock.lock().await;
        self.typing.store(true, Ordering::SeqCst);

        let (reply, origin) = self.generate_reply(content).await;
        if origin != AnswerOrigin::Synthesized {
            warn!(origin = ?origin, "serving degraded answer");
        }

        self.append(ConversationMessage::ai(reply)).await;
        self.typing.store(false, Ordering::SeqCst);
    }

    /// Resets the conversation and erases stored state.
    pub async fn clear(&self) {
        self.messages.write().await.clear();
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to erase persisted conversation");
        }
    }

    /// Plain-text export of the whole conversation.
    pub async fn export_text(&self) -> String {
        let messages = self.messages.read().await;
        messages
            .iter()
            .map(|m| {
                let sender = match m.sender {
                    peds_core::Sender::User => "USER",
                    peds_core::Sender::Ai => "AI",
                };
                format!("[{}] {}\n{}\n\n", sender, m.timestamp.to_rfc3339(), m.content)
            })
            .collect()
    }

    async fn append(&self, message: ConversationMessage) {
        let mut messages = self.messages.write().await;
        messages.push(message);
        // Full overwrite on every mutation; persistence is best-effort.
        if let Err(e) = self.store.save(&messages).await {
            warn!(error = %e, "failed to persist conversation");
        }
    }

    async fn generate_reply(&self, query: &str) -> (String, AnswerOrigin) {
        let outcome = match self.orchestrator.search(query, self.limit).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "search failed; using canned response");
                return (canned_response(query), AnswerOrigin::Canned);
            }
        };

        if outcome.method == SearchMethod::NoResults {
            return (
                format!(
                    "I couldn't find specific information about \"{}\" in the Nelson Textbook of Pediatrics. Please try rephrasing your question or ask about a different pediatric topic.",
                    query.trim()
                ),
                AnswerOrigin::Canned,
            );
        }

        match self.synthesizer.synthesize(query, &outcome.results).await {
            Ok(answer) => (answer.text, answer.origin),
            Err(e) => {
                // Only reachable on a caller bug (empty results were
                // handled above); still complete the turn.
                warn!(error = %e, "synthesis rejected input; using canned response");
                (canned_response(query), AnswerOrigin::Canned)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use peds_core::{SearchHistoryRecord, SearchResult, Sender};
    use peds_error::PedsError;
    use peds_llm::CompletionModel;
    use peds_rag::{MemoryReferenceStore, ReferenceStore, SearchStats};
    use std::sync::atomic::AtomicUsize;

    struct FixedModel(&'static str);

    #[async_trait]
    impl CompletionModel for FixedModel {
        async fn complete(&self, _system: &str, _user: &str) -> peds_llm::Result<String> {
            Ok(self.0.to_string())
        }
    }

    /// First call sleeps so a concurrently issued second send would
    /// overtake it without the single-flight lock.
    struct SlowFirstModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionModel for SlowFirstModel {
        async fn complete(&self, _system: &str, user: &str) -> peds_llm::Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
            let query_line = user.lines().next().unwrap_or_default().to_string();
            Ok(format!("reply to: {}", query_line))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ReferenceStore for BrokenStore {
        async fn text_search(&self, _q: &str, _l: i64) -> peds_error::Result<Vec<SearchResult>> {
            Err(PedsError::SearchBackend {
                operation: "text_search_nelson_chunks".into(),
                message: "connection refused".into(),
            })
        }
        async fn vector_search(&self, _q: &str, _l: i64) -> peds_error::Result<Vec<SearchResult>> {
            Err(PedsError::SearchBackend {
                operation: "search_nelson_chunks".into(),
                message: "connection refused".into(),
            })
        }
        async fn log_search(&self, _r: &SearchHistoryRecord) -> peds_error::Result<()> {
            Ok(())
        }
    }

    fn corpus_store() -> Arc<MemoryReferenceStore> {
        Arc::new(MemoryReferenceStore::with_chunks(vec![
            (
                "c1".to_string(),
                "Fever in infants requires age-specific risk assessment.".to_string(),
            ),
            (
                "c2".to_string(),
                "Acetaminophen and ibuprofen are used for comfort.".to_string(),
            ),
        ]))
    }

    async fn session_with(
        reference: Arc<dyn ReferenceStore>,
        model: Arc<dyn CompletionModel>,
    ) -> ChatSession {
        let stats = Arc::new(SearchStats::default());
        let orchestrator = SearchOrchestrator::new(reference.clone(), stats.clone());
        let synthesizer = AnswerSynthesizer::new(model, reference, stats);
        ChatSession::load(orchestrator, synthesizer, Arc::new(MemoryConversationStore::new())).await
    }

    #[tokio::test]
    async fn send_appends_user_then_assistant() {
        let session = session_with(corpus_store(), Arc::new(FixedModel("## Fever\nAnswer."))).await;

        session.send("What is the approach to fever in infants?").await;

        let messages = session.messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].sender, Sender::Ai);
        assert_eq!(messages[1].content, "## Fever\nAnswer.");
        assert!(!session.is_typing());
    }

    #[tokio::test]
    async fn blank_send_is_a_silent_noop() {
        let session = session_with(corpus_store(), Arc::new(FixedModel("x"))).await;
        session.send("   ").await;
        assert!(session.messages().await.is_empty());
    }

    #[tokio::test]
    async fn no_results_yields_fixed_message() {
        let session = session_with(
            Arc::new(MemoryReferenceStore::new()),
            Arc::new(FixedModel("unused")),
        )
        .await;

        session.send("quantum chromodynamics").await;

        let messages = session.messages().await;
        assert_eq!(messages.len(), 2);
        assert!(messages[1]
            .content
            .contains("couldn't find specific information"));
        assert!(messages[1].content.contains("quantum chromodynamics"));
    }

    #[tokio::test]
    async fn search_failure_serves_keyword_matched_canned_response() {
        let session = session_with(Arc::new(BrokenStore), Arc::new(FixedModel("unused"))).await;

        session.send("my toddler has a fever").await;

        let messages = session.messages().await;
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("# Fever in Children"));
        assert!(messages[1].content.contains("Medical Disclaimer"));
    }

    #[tokio::test]
    async fn clear_resets_messages_and_store() {
        let store = Arc::new(MemoryConversationStore::new());
        let reference = corpus_store();
        let stats = Arc::new(SearchStats::default());
        let orchestrator = SearchOrchestrator::new(reference.clone(), stats.clone());
        let synthesizer = AnswerSynthesizer::new(Arc::new(FixedModel("a")), reference, stats);
        let session = ChatSession::load(orchestrator, synthesizer, store.clone()).await;

        session.send("fever").await;
        assert!(!session.messages().await.is_empty());

        session.clear().await;
        assert!(session.messages().await.is_empty());
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persisted_conversation_is_restored_on_load() {
        let store = Arc::new(MemoryConversationStore::new());
        store
            .save(&[ConversationMessage::user("earlier question")])
            .await
            .unwrap();

        let reference = corpus_store();
        let stats = Arc::new(SearchStats::default());
        let orchestrator = SearchOrchestrator::new(reference.clone(), stats.clone());
        let synthesizer = AnswerSynthesizer::new(Arc::new(FixedModel("a")), reference, stats);
        let session = ChatSession::load(orchestrator, synthesizer, store).await;

        let messages = session.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "earlier question");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_sends_append_replies_in_send_order() {
        let reference = corpus_store();
        let model = Arc::new(SlowFirstModel {
            calls: AtomicUsize::new(0),
        });
        let session = Arc::new(session_with(reference, model).await);

        let s1 = session.clone();
        let first = tokio::spawn(async move { s1.send("fever one").await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let s2 = session.clone();
        let second = tokio::spawn(async move { s2.send("fever two").await });

        first.await.unwrap();
        second.await.unwrap();

        let messages = session.messages().await;
        let ai: Vec<&ConversationMessage> =
            messages.iter().filter(|m| m.sender == Sender::Ai).collect();
        assert_eq!(ai.len(), 2);
        // The slow first pipeline still answers first.
        assert!(ai[0].content.contains("fever one") || !ai[0].content.contains("fever two"));
        assert!(ai[1].content.contains("fever two") || !ai[1].content.contains("fever one"));
    }

    #[tokio::test]
    async fn export_renders_sender_blocks() {
        let session = session_with(corpus_store(), Arc::new(FixedModel("Answer text."))).await;
        session.send("fever").await;

        let text = session.export_text().await;
        assert!(text.starts_with("[USER] "));
        assert!(text.contains("\nfever\n"));
        assert!(text.contains("[AI] "));
        assert!(text.contains("\nAnswer text.\n"));
    }
}
