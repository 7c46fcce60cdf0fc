//! HTTP client for a hosted agents project.
//!
//! Wraps the project's REST surface (`/connections`, `/assistants`,
//! `/threads`, runs and messages) behind [`AgentPlatform`]. Every call
//! carries the configured `api-version` and a bearer token from the
//! credential chain.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use grounded_core::AgentSettings;

use crate::credential::{TokenCredential, AGENTS_SCOPE};
use crate::platform::{AgentPlatform, PlatformError};
use crate::types::{
    Agent, Connection, CreateAgentRequest, CreateMessageRequest, CreateRunRequest, ListPage,
    MessageRole, Run, Thread, ThreadMessage,
};

/// Page size requested from list endpoints (platform maximum).
const PAGE_LIMIT: &str = "100";

pub struct ProjectClient {
    client: reqwest::Client,
    endpoint: String,
    api_version: String,
    credential: Arc<dyn TokenCredential>,
}

impl ProjectClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_version: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_version: api_version.into(),
            credential,
        }
    }

    pub fn from_settings(settings: &AgentSettings, credential: Arc<dyn TokenCredential>) -> Self {
        Self::new(
            settings.project_endpoint.clone(),
            settings.api_version.clone(),
            credential,
        )
    }

    /// Join `segments` onto the project endpoint, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| PlatformError::InvalidUrl(format!("{}: {}", self.endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| PlatformError::InvalidUrl(self.endpoint.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Attach `api-version` and the bearer token.
    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, PlatformError> {
        let token = self.credential.get_token(AGENTS_SCOPE).await?;
        Ok(request
            .query(&[("api-version", self.api_version.as_str())])
            .bearer_auth(token.token))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, PlatformError> {
        let response = self.authorize(request).await?.send().await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::ApiError { status, body });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| PlatformError::ParseError(e.to_string()))
    }

    /// Follow `after=<last_id>` cursors until the listing is exhausted.
    async fn list_all<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        extra_query: &[(&str, &str)],
    ) -> Result<Vec<T>, PlatformError> {
        let url = self.url(segments)?;
        let mut items = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(url.clone())
                .query(&[("limit", PAGE_LIMIT)])
                .query(extra_query);
            if let Some(ref cursor) = after {
                request = request.query(&[("after", cursor.as_str())]);
            }

            let page: ListPage<T> = self.send(request).await?;
            let fetched = page.data.len();
            items.extend(page.data);
            debug!(path = url.path(), fetched, total = items.len(), "Fetched list page");

            match page.last_id {
                Some(last) if page.has_more && fetched > 0 => after = Some(last),
                _ => break,
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl AgentPlatform for ProjectClient {
    async fn get_connection(&self, name: &str) -> Result<Connection, PlatformError> {
        let url = self.url(&["connections", name])?;
        debug!("Resolving connection '{}'", name);
        self.send(self.client.get(url)).await
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, PlatformError> {
        self.list_all(&["assistants"], &[("order", "asc")]).await
    }

    async fn create_agent(&self, request: CreateAgentRequest) -> Result<Agent, PlatformError> {
        let url = self.url(&["assistants"])?;
        debug!(model = %request.model, name = ?request.name, "Creating agent");
        self.send(
            self.client
                .post(url)
                .header("x-ms-enable-preview", "true")
                .json(&request),
        )
        .await
    }

    async fn create_thread(&self) -> Result<Thread, PlatformError> {
        let url = self.url(&["threads"])?;
        self.send(self.client.post(url).json(&serde_json::json!({})))
            .await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage, PlatformError> {
        let url = self.url(&["threads", thread_id, "messages"])?;
        self.send(
            self.client
                .post(url)
                .json(&CreateMessageRequest { role, content }),
        )
        .await
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<Run, PlatformError> {
        let url = self.url(&["threads", thread_id, "runs"])?;
        self.send(self.client.post(url).json(&CreateRunRequest {
            assistant_id: agent_id,
        }))
        .await
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, PlatformError> {
        let url = self.url(&["threads", thread_id, "runs", run_id])?;
        self.send(self.client.get(url)).await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, PlatformError> {
        self.list_all(&["threads", thread_id, "messages"], &[("order", "asc")])
            .await
    }
}
