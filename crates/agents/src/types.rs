//! Wire types for the hosted agents REST surface.
//!
//! Only the fields the search pipeline reads are modelled; everything else in
//! the platform's payloads is ignored on deserialization.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Entities ──────────────────────────────────────────────────

/// A named project connection (e.g. the Bing grounding resource).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A hosted agent ("assistant" on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    /// Non-empty text block values joined with newlines, trimmed.
    ///
    /// Returns `None` when the message carries no text at all.
    pub fn joined_text(&self) -> Option<String> {
        let mut text = String::new();
        for block in &self.content {
            if let MessageContent::Text { text: t } = block {
                if !t.value.is_empty() {
                    text.push_str(&t.value);
                    text.push('\n');
                }
            }
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// One content block of a message. Image and other block kinds are kept
/// as [`MessageContent::Other`] so unknown shapes never fail a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: MessageText },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageText {
    #[serde(default)]
    pub value: String,
}

// ── Runs ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub assistant_id: String,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

impl Run {
    /// Human-readable failure detail for a failed run.
    pub fn error_detail(&self) -> String {
        self.last_error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code.is_empty(), self.message.is_empty()) {
            (false, false) => write!(f, "{}: {}", self.code, self.message),
            (false, true) => f.write_str(&self.code),
            (true, false) => f.write_str(&self.message),
            (true, true) => f.write_str("Unknown error"),
        }
    }
}

/// Run lifecycle status. Statuses this crate does not know are preserved
/// verbatim in [`RunStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    Other(String),
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Other(s) => s,
        }
    }

    /// Whether the run can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Cancelled
                | RunStatus::Expired
                | RunStatus::Incomplete
        )
    }
}

impl From<String> for RunStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "requires_action" => RunStatus::RequiresAction,
            "cancelling" => RunStatus::Cancelling,
            "cancelled" => RunStatus::Cancelled,
            "failed" => RunStatus::Failed,
            "completed" => RunStatus::Completed,
            "incomplete" => RunStatus::Incomplete,
            "expired" => RunStatus::Expired,
            _ => RunStatus::Other(s),
        }
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Tools ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    BingGrounding { bing_grounding: BingGroundingSpec },
}

impl ToolDefinition {
    /// Web-search augmentation bound to a project connection id.
    pub fn bing_grounding(connection_id: impl Into<String>) -> Self {
        ToolDefinition::BingGrounding {
            bing_grounding: BingGroundingSpec {
                search_configurations: vec![BingSearchConfiguration {
                    connection_id: connection_id.into(),
                }],
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BingGroundingSpec {
    pub search_configurations: Vec<BingSearchConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BingSearchConfiguration {
    pub connection_id: String,
}

// ── Requests & envelopes ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateAgentRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateMessageRequest<'a> {
    pub role: MessageRole,
    pub content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateRunRequest<'a> {
    pub assistant_id: &'a str,
}

/// Cursor-paginated list envelope (`{"object":"list","data":[...],...}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ListPage<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub last_id: Option<String>,
}
