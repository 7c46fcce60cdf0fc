//! `GET /search`: run one grounded web search.
//!
//! Every outcome the pipeline can produce is reported with status 200; the
//! body shape tells them apart.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use grounded_agents::{RunFailure, SearchAnswer, SearchError, SearchOutcome};

use crate::state::AppState;

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Free-text question to answer with web grounding.
    pub query: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SearchAnswerBody {
    pub query: String,
    pub agent_id: String,
    pub thread_id: String,
    pub run_id: String,
    /// Final (or last observed) run status, e.g. `completed`.
    pub run_status: String,
    /// Newest assistant message text; `null` when the assistant said nothing.
    pub assistant_response: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RunFailedBody {
    pub query: String,
    pub status: String,
    pub error: String,
}

/// Error payload. Beyond the plain `error` message it carries the error
/// `kind`, and `missing` for configuration errors.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SearchErrorBody {
    pub error: String,
    /// `config`, `authentication` or `platform`.
    pub kind: String,
    /// Missing environment variables (configuration errors only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum SearchResponse {
    Answer(SearchAnswerBody),
    RunFailed(RunFailedBody),
    Error(SearchErrorBody),
}

impl SearchResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, SearchResponse::Error(_))
    }
}

impl From<SearchOutcome> for SearchResponse {
    fn from(outcome: SearchOutcome) -> Self {
        match outcome {
            SearchOutcome::Answered(SearchAnswer {
                query,
                agent_id,
                thread_id,
                run_id,
                run_status,
                assistant_response,
            }) => SearchResponse::Answer(SearchAnswerBody {
                query,
                agent_id,
                thread_id,
                run_id,
                run_status: run_status.to_string(),
                assistant_response,
            }),
            SearchOutcome::RunFailed(RunFailure {
                query,
                status,
                error,
            }) => SearchResponse::RunFailed(RunFailedBody {
                query,
                status: status.to_string(),
                error,
            }),
        }
    }
}

impl From<&SearchError> for SearchErrorBody {
    fn from(e: &SearchError) -> Self {
        let missing = match e {
            SearchError::Config(c) => Some(c.missing_keys().to_vec()),
            _ => None,
        };
        Self {
            error: e.to_string(),
            kind: e.kind().to_string(),
            missing,
        }
    }
}

/// Run the pipeline for `query` and map whatever happens to a response body.
///
/// Shared by the HTTP handler and the one-shot CLI.
pub async fn run_search(state: &AppState, query: &str) -> SearchResponse {
    let search = match state.search() {
        Ok(search) => search,
        Err(e) => {
            warn!(error = %e, "Search rejected: agent settings incomplete");
            let err = SearchError::Config(e.clone());
            return SearchResponse::Error(SearchErrorBody::from(&err));
        }
    };

    let cancel = state.shutdown.child_token();
    match search.search(query, &cancel).await {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Search failed");
            SearchResponse::Error(SearchErrorBody::from(&e))
        }
    }
}

#[utoipa::path(
    get,
    path = "/search",
    tag = "Search",
    params(SearchParams),
    responses(
        (status = 200, description = "Answer, run failure, or error payload", body = SearchResponse),
        (status = 400, description = "Missing query parameter")
    )
)]
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResponse> {
    Json(run_search(&state, &params.query).await)
}
