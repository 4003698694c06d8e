use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

pub use peds_error::{PedsError, Result};

#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

// ========== Mistral (chat completions) ==========

#[derive(Clone)]
pub struct MistralConfig {
    pub api_url: String, // default https://api.mistral.ai
    pub api_key: String, // Bearer token
    pub model: String,   // e.g. mistral-large-latest
}

#[derive(Clone)]
pub struct MistralClient {
    http: Client,
    cfg: MistralConfig,
}

impl MistralClient {
    pub fn new(cfg: MistralConfig) -> Self {
        Self {
            http: Client::new(),
            cfg,
        }
    }
}

#[derive(Serialize)]
struct MistralChatMsg {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct MistralChatReq {
    model: String,
    messages: Vec<MistralChatMsg>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct MistralChoiceMsg {
    content: String,
}

#[derive(Deserialize)]
struct MistralChoice {
    message: MistralChoiceMsg,
}

#[derive(Deserialize)]
struct MistralChatResp {
    choices: Vec<MistralChoice>,
}

#[async_trait]
impl CompletionModel for MistralClient {
    #[instrument(skip(self, system, user))]
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!(
            "{}/v1/chat/completions",
            self.cfg.api_url.trim_end_matches('/')
        );
        let body = MistralChatReq {
            model: self.cfg.model.clone(),
            messages: vec![
                MistralChatMsg {
                    role: "system",
                    content: system.to_string(),
                },
                MistralChatMsg {
                    role: "user",
                    content: user.to_string(),
                },
            ],
            temperature: 0.3,
            max_tokens: 1024,
        };

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PedsError::Network {
                operation: "http_request".to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            return Err(PedsError::LlmService {
                provider: "mistral".to_string(),
                message: format!("status={} body={}", status, txt),
                retry_after: None,
            });
        }

        let data: MistralChatResp = resp.json().await.map_err(|e| PedsError::Network {
            operation: "http_request".to_string(),
            message: e.to_string(),
        })?;
        data.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PedsError::ResponseParse {
                provider: "mistral".to_string(),
                message: "missing choices[0].message.content".to_string(),
            })
    }
}

// ========== Gemini (generateContent) ==========

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_url: String, // default https://generativelanguage.googleapis.com
    pub api_key: String, // x-goog-api-key header
    pub model: String,   // e.g. gemini-1.0-pro
}

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    cfg: GeminiConfig,
}

impl GeminiClient {
    pub fn new(cfg: GeminiConfig) -> Self {
        Self {
            http: Client::new(),
            cfg,
        }
    }
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiReq {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Deserialize)]
struct GeminiRespPart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiRespContent {
    parts: Vec<GeminiRespPart>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiRespContent,
}

#[derive(Deserialize)]
struct GeminiResp {
    candidates: Vec<GeminiCandidate>,
}

#[async_trait]
impl CompletionModel for GeminiClient {
    #[instrument(skip(self, system, user))]
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.cfg.api_url.trim_end_matches('/'),
            self.cfg.model
        );
        // The generateContent shape has no system role; the instructions
        // are prepended to the single user part.
        let body = GeminiReq {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: format!("{}\n\n{}", system, user),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.3,
                max_output_tokens: 1024,
                top_p: 0.8,
                top_k: 40,
            },
        };

        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PedsError::Network {
                operation: "http_request".to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            return Err(PedsError::LlmService {
                provider: "gemini".to_string(),
                message: format!("status={} body={}", status, txt),
                retry_after: None,
            });
        }

        let data: GeminiResp = resp.json().await.map_err(|e| PedsError::Network {
            operation: "http_request".to_string(),
            message: e.to_string(),
        })?;
        data.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| PedsError::ResponseParse {
                provider: "gemini".to_string(),
                message: "missing candidates[0].content.parts[0].text".to_string(),
            })
    }
}

// ========== Provider Factory & Config ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CompletionProviderConfig {
    #[serde(rename = "mistral")]
    Mistral {
        api_url: Option<String>,
        api_key: String,
        model: Option<String>,
    },
    #[serde(rename = "gemini")]
    Gemini {
        api_url: Option<String>,
        api_key: String,
        model: Option<String>,
    },
}

pub fn make_completion_model(cfg: CompletionProviderConfig) -> Result<Box<dyn CompletionModel>> {
    let model: Box<dyn CompletionModel> = match cfg {
        CompletionProviderConfig::Mistral {
            api_url,
            api_key,
            model,
        } => Box::new(MistralClient::new(MistralConfig {
            api_url: api_url.unwrap_or_else(|| "https://api.mistral.ai".into()),
            api_key,
            model: model.unwrap_or_else(|| "mistral-large-latest".into()),
        })),
        CompletionProviderConfig::Gemini {
            api_url,
            api_key,
            model,
        } => Box::new(GeminiClient::new(GeminiConfig {
            api_url: api_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".into()),
            api_key,
            model: model.unwrap_or_else(|| "gemini-1.0-pro".into()),
        })),
    };
    Ok(model)
}
