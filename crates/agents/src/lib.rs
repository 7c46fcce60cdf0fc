pub mod client;
pub mod credential;
pub mod platform;
pub mod poll;
pub mod search;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod stub;

pub use client::ProjectClient;
pub use credential::{
    AccessToken, AzureCliCredential, CredentialError, DefaultCredential, EnvironmentCredential,
    ManagedIdentityCredential, StaticTokenCredential, TokenCredential,
};
pub use platform::{AgentPlatform, PlatformError};
pub use poll::{wait_for_run, PollPolicy, WaitEnd};
pub use search::{
    latest_assistant_text, GroundedSearch, RunFailure, SearchAnswer, SearchError, SearchOutcome,
};
pub use types::{Agent, Run, RunError, RunStatus, ThreadMessage, ToolDefinition};
