use async_trait::async_trait;
use bookbuddy_core::errors::ApplicationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One completed exchange within a chat session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub query: String,
    pub reply: String,
}

/// Everything the agent needs to answer one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationRequest {
    pub session_id: String,
    pub instruction: String,
    /// Prior turns of this session, oldest first.
    pub history: Vec<Turn>,
    pub input: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("agent returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("agent returned an empty completion")]
    EmptyCompletion,
    #[error("unexpected agent response: {0}")]
    MalformedResponse(String),
    #[error("model `{model}` is not available from the provider")]
    ModelUnavailable { model: String, available: Vec<String> },
    #[error("agent client misconfigured: {0}")]
    Configuration(String),
}

impl AgentError {
    /// Transport failures and server-side statuses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<AgentError> for ApplicationError {
    fn from(value: AgentError) -> Self {
        match value {
            AgentError::Configuration(message) => Self::Configuration(message),
            other => Self::Integration(other.to_string()),
        }
    }
}

#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn invoke(&self, request: &InvocationRequest) -> Result<String, AgentError>;

    /// Confirms the configured model is served by the provider.
    async fn verify_model(&self) -> Result<(), AgentError>;

    fn model(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use bookbuddy_core::errors::ApplicationError;

    use super::AgentError;

    #[test]
    fn retry_policy_covers_transport_and_server_errors() {
        assert!(AgentError::Transport("connection reset".to_string()).is_retryable());
        assert!(AgentError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(AgentError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!AgentError::Status { status: 401, body: String::new() }.is_retryable());
        assert!(!AgentError::EmptyCompletion.is_retryable());
    }

    #[test]
    fn converts_into_application_errors() {
        let integration = ApplicationError::from(AgentError::EmptyCompletion);
        assert_eq!(
            integration,
            ApplicationError::Integration("agent returned an empty completion".to_string())
        );

        let configuration =
            ApplicationError::from(AgentError::Configuration("missing api key".to_string()));
        assert!(matches!(configuration, ApplicationError::Configuration(_)));
    }
}
