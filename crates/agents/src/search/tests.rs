//! Pipeline tests against the in-memory stub platform.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use grounded_core::AgentSettings;

use super::*;
use crate::stub::StubPlatform;
use crate::types::{MessageContent, MessageText, ThreadMessage};

fn settings() -> AgentSettings {
    AgentSettings {
        project_endpoint: "https://example.test/api/projects/demo".into(),
        bing_connection_name: "bing".into(),
        agent_name: Some("web-search-agent".into()),
        agent_instructions: Some("Answer with sources.".into()),
        model: "gpt-4.1".into(),
        api_version: "2025-05-01".into(),
    }
}

fn pipeline(platform: &Arc<StubPlatform>) -> GroundedSearch {
    GroundedSearch::new(platform.clone(), settings(), PollPolicy::default())
}

fn answered(outcome: SearchOutcome) -> SearchAnswer {
    match outcome {
        SearchOutcome::Answered(a) => a,
        other => panic!("expected an answer, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn creates_agent_and_returns_answer() {
    let platform = Arc::new(StubPlatform::new());
    platform.reply_with("  Paris is the capital of France.\n");

    let outcome = pipeline(&platform)
        .search("What is the capital of France?", &CancellationToken::new())
        .await
        .unwrap();
    let answer = answered(outcome);

    assert_eq!(answer.query, "What is the capital of France?");
    assert_eq!(
        answer.assistant_response.as_deref(),
        Some("Paris is the capital of France.")
    );
    assert_eq!(answer.run_status, RunStatus::Completed);

    let created = platform.created_agents();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name.as_deref(), Some("web-search-agent"));
    assert_eq!(created[0].model, "gpt-4.1");
    assert_eq!(created[0].temperature, 0.0);
    assert_eq!(created[0].tools, vec![ToolDefinition::bing_grounding("/connections/bing")]);
    assert_eq!(platform.agents()[0].id, answer.agent_id);
}

#[tokio::test(start_paused = true)]
async fn failed_run_short_circuits() {
    let platform = Arc::new(StubPlatform::new());
    platform.run_starts_as(RunStatus::Failed);
    platform.fail_runs_with("rate_limited", "");

    let outcome = pipeline(&platform)
        .search("latest news", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SearchOutcome::RunFailed(RunFailure {
            query: "latest news".into(),
            status: RunStatus::Failed,
            error: "rate_limited".into(),
        })
    );
    assert_eq!(platform.calls("list_messages"), 0);
}

#[tokio::test(start_paused = true)]
async fn failure_observed_while_polling() {
    let platform = Arc::new(StubPlatform::new());
    platform.run_starts_as(RunStatus::Queued);
    platform.script_run_statuses(vec![RunStatus::InProgress, RunStatus::Failed]);
    platform.fail_runs_with("server_error", "tool call failed");

    let outcome = pipeline(&platform)
        .search("q", &CancellationToken::new())
        .await
        .unwrap();

    match outcome {
        SearchOutcome::RunFailed(f) => assert_eq!(f.error, "server_error: tool call failed"),
        other => panic!("expected RunFailed, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn existing_agent_is_reused() {
    let platform = Arc::new(StubPlatform::new());
    platform.with_agent("some-other-agent");
    let existing = platform.with_agent("web-search-agent");
    platform.reply_with("ok");

    let answer = answered(
        pipeline(&platform)
            .search("q", &CancellationToken::new())
            .await
            .unwrap(),
    );

    assert_eq!(answer.agent_id, existing.id);
    assert_eq!(platform.calls("create_agent"), 0);
}

#[tokio::test(start_paused = true)]
async fn duplicate_names_resolve_to_oldest_agent() {
    let platform = Arc::new(StubPlatform::new());
    let oldest = platform.with_agent("web-search-agent");
    platform.with_agent("web-search-agent");

    let answer = answered(
        pipeline(&platform)
            .search("q", &CancellationToken::new())
            .await
            .unwrap(),
    );

    assert_eq!(answer.agent_id, oldest.id);
    assert_eq!(platform.calls("create_agent"), 0);
}

#[tokio::test(start_paused = true)]
async fn no_assistant_message_gives_null_answer() {
    let platform = Arc::new(StubPlatform::new());

    let answer = answered(
        pipeline(&platform)
            .search("q", &CancellationToken::new())
            .await
            .unwrap(),
    );

    assert_eq!(answer.assistant_response, None);
    assert_eq!(answer.run_status, RunStatus::Completed);
    assert_eq!(platform.messages(&answer.thread_id).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn assistant_message_without_text_gives_null_answer() {
    let platform = Arc::new(StubPlatform::new());
    platform.reply_with_content(vec![MessageContent::Other]);

    let answer = answered(
        pipeline(&platform)
            .search("q", &CancellationToken::new())
            .await
            .unwrap(),
    );
    assert_eq!(answer.assistant_response, None);
}

#[tokio::test(start_paused = true)]
async fn sequential_requests_get_distinct_threads() {
    let platform = Arc::new(StubPlatform::new());
    platform.with_agent("web-search-agent");
    platform.reply_with("ok");
    let search = pipeline(&platform);
    let cancel = CancellationToken::new();

    let first = answered(search.search("same query", &cancel).await.unwrap());
    let second = answered(search.search("same query", &cancel).await.unwrap());

    assert_ne!(first.thread_id, second.thread_id);
    assert_eq!(first.agent_id, second.agent_id);
    assert_eq!(platform.calls("create_agent"), 0);
    assert_eq!(platform.agents().len(), 1);
    assert_eq!(platform.threads().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_first_requests_create_one_agent() {
    let platform = Arc::new(StubPlatform::new());
    platform.reply_with("ok");
    let search = Arc::new(pipeline(&platform));
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(search.search("a", &cancel), search.search("b", &cancel));
    let (a, b) = (answered(a.unwrap()), answered(b.unwrap()));

    assert_eq!(platform.calls("create_agent"), 1);
    assert_eq!(a.agent_id, b.agent_id);
}

#[tokio::test(start_paused = true)]
async fn slow_run_is_polled_to_completion() {
    let platform = Arc::new(StubPlatform::new());
    platform.run_starts_as(RunStatus::Queued);
    platform.script_run_statuses(vec![RunStatus::InProgress, RunStatus::Completed]);
    platform.reply_with("done");

    let started = tokio::time::Instant::now();
    let answer = answered(
        pipeline(&platform)
            .search("q", &CancellationToken::new())
            .await
            .unwrap(),
    );

    assert_eq!(answer.run_status, RunStatus::Completed);
    assert_eq!(answer.assistant_response.as_deref(), Some("done"));
    assert_eq!(platform.calls("get_run"), 2);
    assert!(started.elapsed() >= Duration::from_millis(2500));
}

#[tokio::test(start_paused = true)]
async fn timed_out_run_still_reads_messages() {
    let platform = Arc::new(StubPlatform::new());
    platform.run_starts_as(RunStatus::InProgress);
    platform.reply_with("partial");
    let search = GroundedSearch::new(
        platform.clone(),
        settings(),
        PollPolicy {
            timeout: Duration::from_secs(3),
            ..PollPolicy::default()
        },
    );

    let answer = answered(search.search("q", &CancellationToken::new()).await.unwrap());
    assert_eq!(answer.run_status, RunStatus::InProgress);
    assert_eq!(answer.assistant_response.as_deref(), Some("partial"));
}

#[tokio::test(start_paused = true)]
async fn platform_errors_keep_their_kind() {
    let platform = Arc::new(StubPlatform::new());
    platform.fail_operation("create_thread", 500);

    let err = pipeline(&platform)
        .search("q", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "platform");
    assert!(err.to_string().contains("500"));
    assert_eq!(platform.calls("create_run"), 0);
}

#[test]
fn credential_errors_map_to_authentication() {
    let err = SearchError::from(PlatformError::Credential(CredentialError::Exhausted(vec![
        "AzureCliCredential unavailable: az not found".into(),
    ])));
    assert_eq!(err.kind(), "authentication");
    assert!(err.to_string().contains("az not found"));
}

#[test]
fn config_errors_map_to_config() {
    let err = SearchError::from(ConfigError::Missing(vec!["BING_RESOURCE_NAME".into()]));
    assert_eq!(err.kind(), "config");
}

#[test]
fn latest_assistant_message_wins() {
    let msg = |id: &str, role: MessageRole, text: &str| ThreadMessage {
        id: id.into(),
        role,
        content: vec![MessageContent::Text {
            text: MessageText { value: text.into() },
        }],
    };
    let messages = vec![
        msg("m1", MessageRole::User, "question"),
        msg("m2", MessageRole::Assistant, "first answer"),
        msg("m3", MessageRole::User, "follow-up"),
        msg("m4", MessageRole::Assistant, "second answer"),
    ];
    assert_eq!(latest_assistant_text(&messages).as_deref(), Some("second answer"));
    assert_eq!(latest_assistant_text(&messages[..1]), None);
}
