use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "axum")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};

/// Unified error type for the pediatric reference service.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum PedsError {
    // === Request errors ===
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    // === Collaborator errors ===
    #[error("search backend error: {operation} failed")]
    SearchBackend { operation: String, message: String },

    #[error("completion service error ({provider})")]
    LlmService {
        provider: String,
        message: String,
        #[serde(skip)]
        retry_after: Option<std::time::Duration>,
    },

    #[error("unexpected completion response ({provider}): {message}")]
    ResponseParse { provider: String, message: String },

    #[error("audit write failed: {message}")]
    AuditWrite { message: String },

    #[error("database error: {message}")]
    Database { message: String },

    // === System errors ===
    #[error("configuration error: {key} - {reason}")]
    Configuration { key: String, reason: String },

    #[error("network error: {operation}")]
    Network { operation: String, message: String },

    #[error("serialization error: {format}")]
    Serialization { format: String, message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Error severity, used to pick the log level at the reporting site.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,      // expected request errors
    Medium,   // degraded collaborator, user path still completes
    High,     // a primary path failed
    Critical, // misconfiguration, nothing useful can be served
}

impl PedsError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PedsError::InvalidInput { .. } => ErrorSeverity::Low,
            PedsError::LlmService { .. }
            | PedsError::ResponseParse { .. }
            | PedsError::AuditWrite { .. }
            | PedsError::Network { .. } => ErrorSeverity::Medium,
            PedsError::SearchBackend { .. }
            | PedsError::Database { .. }
            | PedsError::Serialization { .. } => ErrorSeverity::High,
            PedsError::Configuration { .. } | PedsError::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PedsError::Network { .. } => true,
            PedsError::LlmService { retry_after, .. } => retry_after.is_some(),
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            PedsError::LlmService { retry_after, .. } => *retry_after,
            PedsError::Network { .. } => Some(std::time::Duration::from_millis(500)),
            _ => None,
        }
    }

    /// Nearest HTTP status for this error. Kept for logs and future
    /// surfaces; the public endpoints pin every failure to 500 with a
    /// descriptive body (see the `axum` feature below).
    pub fn to_http_status(&self) -> u16 {
        match self {
            PedsError::InvalidInput { .. } => 400,
            PedsError::LlmService { .. } => 502,
            PedsError::Network { .. } => 502,
            PedsError::Configuration { .. } => 500,
            _ => 500,
        }
    }

    /// Emits this error at the log level its severity calls for.
    pub fn log(&self, component: &str) {
        match self.severity() {
            ErrorSeverity::Low | ErrorSeverity::Medium => {
                tracing::warn!(component = component, error = %self, "request failed");
            }
            ErrorSeverity::High | ErrorSeverity::Critical => {
                tracing::error!(
                    component = component,
                    error = %self,
                    severity = ?self.severity(),
                    "request failed"
                );
            }
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PedsError::InvalidInput { reason } => reason.clone(),
            PedsError::SearchBackend { .. } => "Failed to search the reference library".to_string(),
            PedsError::LlmService { .. } | PedsError::ResponseParse { .. } => {
                "The answer service is temporarily unavailable".to_string()
            }
            PedsError::Configuration { key, .. } => format!("{} is not configured", key),
            _ => "Internal error, please try again later".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PedsError>;

// === Conversions ===

impl From<serde_json::Error> for PedsError {
    fn from(err: serde_json::Error) -> Self {
        PedsError::Serialization {
            format: "json".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for PedsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PedsError::Network {
                operation: "http_timeout".to_string(),
                message: err.to_string(),
            }
        } else if err.is_connect() {
            PedsError::Network {
                operation: "connect".to_string(),
                message: err.to_string(),
            }
        } else {
            PedsError::Network {
                operation: "http_request".to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl From<sqlx::Error> for PedsError {
    fn from(err: sqlx::Error) -> Self {
        PedsError::Database {
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for PedsError {
    fn from(err: tokio::task::JoinError) -> Self {
        PedsError::Internal {
            message: format!("task join: {}", err),
        }
    }
}

// Axum integration. Both public endpoints report every failure as a 500
// with `{ "error": ..., "success": false }`, matching the wire contract
// the browser client expects.
#[cfg(feature = "axum")]
impl IntoResponse for PedsError {
    fn into_response(self) -> axum::response::Response {
        self.log("http");
        let body = serde_json::json!({
            "error": self.to_string(),
            "success": false
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ladder() {
        let e = PedsError::InvalidInput {
            reason: "query text is required".into(),
        };
        assert!(matches!(e.severity(), ErrorSeverity::Low));

        let e = PedsError::Configuration {
            key: "MISTRAL_API_KEY".into(),
            reason: "missing".into(),
        };
        assert!(matches!(e.severity(), ErrorSeverity::Critical));
    }

    #[test]
    fn llm_error_retryable_only_with_hint() {
        let without = PedsError::LlmService {
            provider: "mistral".into(),
            message: "status=503".into(),
            retry_after: None,
        };
        assert!(!without.is_retryable());

        let with = PedsError::LlmService {
            provider: "mistral".into(),
            message: "status=429".into(),
            retry_after: Some(std::time::Duration::from_secs(1)),
        };
        assert!(with.is_retryable());
    }

    #[test]
    fn json_error_maps_to_serialization() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e: PedsError = err.into();
        assert!(matches!(e, PedsError::Serialization { .. }));
    }
}
