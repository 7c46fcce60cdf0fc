use async_trait::async_trait;

use crate::credential::CredentialError;
use crate::types::{Agent, Connection, CreateAgentRequest, MessageRole, Run, Thread, ThreadMessage};

/// Operations the search pipeline needs from the hosted agents project.
///
/// [`crate::client::ProjectClient`] implements this over HTTP; tests use the
/// in-memory stub behind the `test-utils` feature.
#[async_trait]
pub trait AgentPlatform: Send + Sync {
    /// Look up a project connection by name.
    async fn get_connection(&self, name: &str) -> Result<Connection, PlatformError>;

    /// Every agent visible to the project, oldest first.
    async fn list_agents(&self) -> Result<Vec<Agent>, PlatformError>;

    async fn create_agent(&self, request: CreateAgentRequest) -> Result<Agent, PlatformError>;

    async fn create_thread(&self) -> Result<Thread, PlatformError>;

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage, PlatformError>;

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<Run, PlatformError>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, PlatformError>;

    /// Every message on the thread in chronological order.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, PlatformError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    ApiError { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    ParseError(String),
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Credential(#[from] CredentialError),
}
