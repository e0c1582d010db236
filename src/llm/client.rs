//! Core LLM client trait, error type, and a scripted mock client

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{CompletionRequest, CompletionResponse};
use crate::error::AgentflowError;

/// Stateless LLM client - each call is independent, history travels in the request
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single completion request (blocking until complete or timed out)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Default model used when the request does not name one
    fn model(&self) -> &str;
}

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::Network(_) => true,
            LlmError::InvalidResponse(_) => false,
            LlmError::JsonError(_) => false,
            LlmError::MissingApiKey { .. } => false,
        }
    }
}

impl From<LlmError> for AgentflowError {
    fn from(err: LlmError) -> Self {
        AgentflowError::Provider(err.to_string())
    }
}

/// Scripted LLM client for tests and dry runs.
///
/// Replies are served in order; once exhausted the `repeat` reply (if any) is
/// returned forever, otherwise the call fails with `InvalidResponse`.
pub struct MockLlmClient {
    replies: Mutex<VecDeque<CompletionResponse>>,
    repeat: Option<CompletionResponse>,
    failure: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmClient {
    /// Serve the given responses in order
    pub fn new(replies: Vec<CompletionResponse>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            repeat: None,
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Serve the same response on every call
    pub fn repeating(reply: CompletionResponse) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::new(Vec::new())
        }
    }

    /// Fail every call with a transport error
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(Vec::new())
        }
    }

    /// Number of completed `complete` calls
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn is_ready(&self) -> bool {
        true
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        if let Some(message) = &self.failure {
            return Err(LlmError::ApiError {
                status: 503,
                message: message.clone(),
            });
        }

        let next = self
            .replies
            .lock()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?
            .pop_front();

        match (next, &self.repeat) {
            (Some(reply), _) => Ok(reply),
            (None, Some(reply)) => Ok(reply.clone()),
            (None, None) => Err(LlmError::InvalidResponse(
                "mock client has no scripted replies left".to_string(),
            )),
        }
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Usage;

    #[test]
    fn test_llm_error_is_retryable() {
        assert!(
            LlmError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
            .is_retryable()
        );
        assert!(
            LlmError::ApiError {
                status: 500,
                message: "Internal error".to_string()
            }
            .is_retryable()
        );
        assert!(
            !LlmError::ApiError {
                status: 400,
                message: "Bad request".to_string()
            }
            .is_retryable()
        );
        assert!(!LlmError::InvalidResponse("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_llm_error_into_provider() {
        let err: AgentflowError = LlmError::InvalidResponse("truncated".into()).into();
        assert!(matches!(err, AgentflowError::Provider(_)));
    }

    #[tokio::test]
    async fn test_mock_serves_in_order_then_errors() {
        let mock = MockLlmClient::new(vec![
            CompletionResponse::text("one", Usage::default()),
            CompletionResponse::text("two", Usage::default()),
        ]);

        let first = mock.complete(CompletionRequest::new("s")).await.unwrap();
        let second = mock.complete(CompletionRequest::new("s")).await.unwrap();
        assert_eq!(first.content, "one");
        assert_eq!(second.content, "two");
        assert!(mock.complete(CompletionRequest::new("s")).await.is_err());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_repeating() {
        let mock = MockLlmClient::repeating(CompletionResponse::text("again", Usage::default()));
        for _ in 0..5 {
            let resp = mock.complete(CompletionRequest::new("s")).await.unwrap();
            assert_eq!(resp.content, "again");
        }
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let mock = MockLlmClient::failing("upstream down");
        let err = mock.complete(CompletionRequest::new("s")).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(mock.model(), "mock-model");
    }
}
