use async_trait::async_trait;
use peds_core::ConversationMessage;
use peds_error::{PedsError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Repository for the persisted conversation. The sequence is always
/// written whole; `load` reconstructs timestamps from the stored form.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self) -> Result<Vec<ConversationMessage>>;
    async fn save(&self, messages: &[ConversationMessage]) -> Result<()>;

    /// Erases stored state. Defaults to overwriting with an empty sequence.
    async fn clear(&self) -> Result<()> {
        self.save(&[]).await
    }
}

#[derive(Default)]
pub struct MemoryConversationStore {
    messages: Arc<RwLock<Vec<ConversationMessage>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn load(&self) -> Result<Vec<ConversationMessage>> {
        Ok(self.messages.read().await.clone())
    }

    async fn save(&self, messages: &[ConversationMessage]) -> Result<()> {
        *self.messages.write().await = messages.to_vec();
        Ok(())
    }
}

/// Whole-file JSON persistence. A missing file loads as an empty
/// conversation; `clear` removes the file.
pub struct JsonFileConversationStore {
    path: PathBuf,
}

impl JsonFileConversationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConversationStore for JsonFileConversationStore {
    async fn load(&self) -> Result<Vec<ConversationMessage>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PedsError::Internal {
                    message: format!("read {}: {}", self.path.display(), e),
                })
            }
        };
        let messages = serde_json::from_slice(&bytes)?;
        Ok(messages)
    }

    async fn save(&self, messages: &[ConversationMessage]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PedsError::Internal {
                    message: format!("create {}: {}", parent.display(), e),
                })?;
        }
        let bytes = serde_json::to_vec_pretty(messages)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| PedsError::Internal {
                message: format!("write {}: {}", self.path.display(), e),
            })
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PedsError::Internal {
                message: format!("remove {}: {}", self.path.display(), e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_file_round_trips_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileConversationStore::new(dir.path().join("messages.json"));

        let messages = vec![
            ConversationMessage::user("What causes croup?"),
            ConversationMessage::ai("Croup is usually caused by parainfluenza viruses."),
        ];
        store.save(&messages).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, messages[0].id);
        assert_eq!(loaded[0].timestamp, messages[0].timestamp);
        assert_eq!(loaded[1].content, messages[1].content);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileConversationStore::new(dir.path().join("absent.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.json");
        let store = JsonFileConversationStore::new(&path);

        store.save(&[ConversationMessage::user("hi")]).await.unwrap();
        assert!(path.exists());
        store.clear().await.unwrap();
        assert!(!path.exists());
        // Clearing twice is a no-op.
        store.clear().await.unwrap();
    }
}
