//! The grounded search pipeline.
//!
//! One call to [`GroundedSearch::search`] resolves the Bing connection,
//! reuses or creates the configured agent, opens a fresh thread, posts the
//! query, runs the agent and reads back the newest assistant message.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use grounded_core::{AgentSettings, ConfigError};

use crate::credential::CredentialError;
use crate::platform::{AgentPlatform, PlatformError};
use crate::poll::{wait_for_run, PollPolicy, WaitEnd};
use crate::types::{
    Agent, CreateAgentRequest, MessageRole, Run, RunStatus, ThreadMessage, ToolDefinition,
};

/// Temperature pinned on created agents to keep answers deterministic.
const AGENT_TEMPERATURE: f32 = 0.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchAnswer {
    pub query: String,
    pub agent_id: String,
    pub thread_id: String,
    pub run_id: String,
    pub run_status: RunStatus,
    pub assistant_response: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunFailure {
    pub query: String,
    pub status: RunStatus,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Answered(SearchAnswer),
    RunFailed(RunFailure),
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Authentication(CredentialError),
    #[error(transparent)]
    Platform(PlatformError),
}

impl From<PlatformError> for SearchError {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::Credential(c) => SearchError::Authentication(c),
            other => SearchError::Platform(other),
        }
    }
}

impl SearchError {
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::Config(_) => "config",
            SearchError::Authentication(_) => "authentication",
            SearchError::Platform(_) => "platform",
        }
    }
}

pub struct GroundedSearch {
    platform: Arc<dyn AgentPlatform>,
    settings: AgentSettings,
    policy: PollPolicy,
    /// Serializes list-then-create so one process never creates the agent twice.
    agent_lock: Mutex<()>,
}

impl GroundedSearch {
    pub fn new(platform: Arc<dyn AgentPlatform>, settings: AgentSettings, policy: PollPolicy) -> Self {
        Self {
            platform,
            settings,
            policy,
            agent_lock: Mutex::new(()),
        }
    }

    pub async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, SearchError> {
        info!(query, "Starting grounded search");

        let connection = self
            .platform
            .get_connection(&self.settings.bing_connection_name)
            .await?;
        let tool = ToolDefinition::bing_grounding(connection.id);

        let agent = self.resolve_agent(tool).await?;
        info!(agent_id = %agent.id, "Using agent");

        let thread = self.platform.create_thread().await?;
        debug!(thread_id = %thread.id, "Thread created");

        let message = self
            .platform
            .create_message(&thread.id, MessageRole::User, query)
            .await?;
        debug!(message_id = %message.id, "User message posted");

        let mut run = self.platform.create_run(&thread.id, &agent.id).await?;
        if run.thread_id.is_empty() {
            run.thread_id = thread.id.clone();
        }
        info!(run_id = %run.id, status = %run.status, "Run started");

        let (run, end) = wait_for_run(self.platform.as_ref(), run, &self.policy, cancel).await;
        if end != WaitEnd::Terminal {
            warn!(run_id = %run.id, status = %run.status, ?end, "Continuing with non-terminal run");
        }

        if run.status == RunStatus::Failed {
            let error = run.error_detail();
            warn!(run_id = %run.id, error = %error, "Run failed");
            return Ok(SearchOutcome::RunFailed(RunFailure {
                query: query.to_string(),
                status: run.status,
                error,
            }));
        }

        let messages = self.platform.list_messages(&thread.id).await?;
        let assistant_response = latest_assistant_text(&messages);
        if assistant_response.is_none() {
            warn!(
                thread_id = %thread.id,
                run_status = %run.status,
                "Assistant produced no text; the run may need longer or different instructions"
            );
        }

        let Run { id, status, .. } = run;
        Ok(SearchOutcome::Answered(SearchAnswer {
            query: query.to_string(),
            agent_id: agent.id,
            thread_id: thread.id,
            run_id: id,
            run_status: status,
            assistant_response,
        }))
    }

    /// Reuse the first agent whose name matches, otherwise create one.
    ///
    /// Agents are listed oldest first, so among duplicates the oldest wins.
    async fn resolve_agent(&self, tool: ToolDefinition) -> Result<Agent, PlatformError> {
        let _guard = self.agent_lock.lock().await;

        let agents = self.platform.list_agents().await?;
        let total = agents.len();
        if let Some(agent) = agents
            .into_iter()
            .find(|a| a.name == self.settings.agent_name)
        {
            debug!(agent_id = %agent.id, scanned = total, "Reusing existing agent");
            return Ok(agent);
        }

        info!(
            name = ?self.settings.agent_name,
            model = %self.settings.model,
            "No matching agent, creating one"
        );
        self.platform
            .create_agent(CreateAgentRequest {
                model: self.settings.model.clone(),
                name: self.settings.agent_name.clone(),
                instructions: self.settings.agent_instructions.clone(),
                tools: vec![tool],
                temperature: AGENT_TEMPERATURE,
            })
            .await
    }
}

/// Text of the newest assistant message, scanning from the end.
pub fn latest_assistant_text(messages: &[ThreadMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Assistant)
        .and_then(ThreadMessage::joined_text)
}

#[cfg(test)]
mod tests;
