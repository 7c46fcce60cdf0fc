//! In-memory [`AgentPlatform`] for exercising the search pipeline without
//! a real project.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::platform::{AgentPlatform, PlatformError};
use crate::types::{
    Agent, Connection, CreateAgentRequest, MessageContent, MessageRole, MessageText, Run,
    RunError, RunStatus, Thread, ThreadMessage,
};

#[derive(Default)]
struct StubState {
    next_id: u64,
    agents: Vec<Agent>,
    created_agents: Vec<CreateAgentRequest>,
    threads: Vec<Thread>,
    messages: HashMap<String, Vec<ThreadMessage>>,
    runs: HashMap<String, Run>,
    initial_run_status: Option<RunStatus>,
    run_status_script: VecDeque<RunStatus>,
    run_error: Option<RunError>,
    failing_refreshes: usize,
    reply: Option<Vec<MessageContent>>,
    failing_ops: HashMap<&'static str, u16>,
    calls: HashMap<&'static str, usize>,
}

impl StubState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{}", prefix, self.next_id)
    }

    fn record(&mut self, op: &'static str) -> Result<(), PlatformError> {
        *self.calls.entry(op).or_default() += 1;
        match self.failing_ops.get(op) {
            Some(&status) => Err(PlatformError::ApiError {
                status,
                body: format!("{} failed", op),
            }),
            None => Ok(()),
        }
    }

    fn apply_status(&self, run: &mut Run, status: RunStatus) {
        if status == RunStatus::Failed {
            run.last_error = self.run_error.clone();
        }
        run.status = status;
    }
}

/// Scriptable fake agents project.
///
/// By default runs complete immediately, connections resolve to a synthetic
/// id, and no assistant reply is produced.
#[derive(Default)]
pub struct StubPlatform {
    state: Mutex<StubState>,
}

impl StubPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing agent with the given name.
    pub fn with_agent(&self, name: &str) -> Agent {
        let mut state = self.state.lock().unwrap();
        let agent = Agent {
            id: state.next_id("asst"),
            name: Some(name.to_string()),
            model: "gpt-4.1".to_string(),
            instructions: None,
        };
        state.agents.push(agent.clone());
        agent
    }

    /// Every run appends one assistant message with this text.
    pub fn reply_with(&self, text: &str) {
        self.reply_with_content(vec![MessageContent::Text {
            text: MessageText {
                value: text.to_string(),
            },
        }]);
    }

    pub fn reply_with_content(&self, content: Vec<MessageContent>) {
        self.state.lock().unwrap().reply = Some(content);
    }

    /// Status returned by `create_run` (default `completed`).
    pub fn run_starts_as(&self, status: RunStatus) {
        self.state.lock().unwrap().initial_run_status = Some(status);
    }

    /// Statuses handed out by successive `get_run` calls.
    pub fn script_run_statuses(&self, statuses: Vec<RunStatus>) {
        self.state.lock().unwrap().run_status_script = statuses.into();
    }

    /// Failed runs report this last error.
    pub fn fail_runs_with(&self, code: &str, message: &str) {
        self.state.lock().unwrap().run_error = Some(RunError {
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    /// The next `count` calls to `get_run` return a 503.
    pub fn fail_next_run_refreshes(&self, count: usize) {
        self.state.lock().unwrap().failing_refreshes = count;
    }

    /// Make every call of `op` (e.g. `"create_thread"`) fail with `status`.
    pub fn fail_operation(&self, op: &'static str, status: u16) {
        self.state.lock().unwrap().failing_ops.insert(op, status);
    }

    /// Insert a run directly, bypassing `create_run`.
    pub fn seed_run(&self, thread_id: &str, status: RunStatus) -> Run {
        let mut state = self.state.lock().unwrap();
        let run = Run {
            id: state.next_id("run"),
            status,
            thread_id: thread_id.to_string(),
            assistant_id: String::new(),
            last_error: None,
        };
        state.runs.insert(run.id.clone(), run.clone());
        run
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state.lock().unwrap().calls.get(op).copied().unwrap_or(0)
    }

    pub fn agents(&self) -> Vec<Agent> {
        self.state.lock().unwrap().agents.clone()
    }

    pub fn threads(&self) -> Vec<Thread> {
        self.state.lock().unwrap().threads.clone()
    }

    pub fn created_agents(&self) -> Vec<CreateAgentRequest> {
        self.state.lock().unwrap().created_agents.clone()
    }

    pub fn messages(&self, thread_id: &str) -> Vec<ThreadMessage> {
        self.state
            .lock()
            .unwrap()
            .messages
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AgentPlatform for StubPlatform {
    async fn get_connection(&self, name: &str) -> Result<Connection, PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.record("get_connection")?;
        Ok(Connection {
            id: format!("/connections/{}", name),
            name: name.to_string(),
        })
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, PlatformError> {
        let agents = {
            let mut state = self.state.lock().unwrap();
            state.record("list_agents")?;
            state.agents.clone()
        };
        // Give concurrent callers a chance to interleave between list and create.
        tokio::task::yield_now().await;
        Ok(agents)
    }

    async fn create_agent(&self, request: CreateAgentRequest) -> Result<Agent, PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.record("create_agent")?;
        let agent = Agent {
            id: state.next_id("asst"),
            name: request.name.clone(),
            model: request.model.clone(),
            instructions: request.instructions.clone(),
        };
        state.agents.push(agent.clone());
        state.created_agents.push(request);
        Ok(agent)
    }

    async fn create_thread(&self) -> Result<Thread, PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.record("create_thread")?;
        let thread = Thread {
            id: state.next_id("thread"),
        };
        state.threads.push(thread.clone());
        state.messages.insert(thread.id.clone(), Vec::new());
        Ok(thread)
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage, PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.record("create_message")?;
        let message = ThreadMessage {
            id: state.next_id("msg"),
            role,
            content: vec![MessageContent::Text {
                text: MessageText {
                    value: content.to_string(),
                },
            }],
        };
        state
            .messages
            .entry(thread_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<Run, PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.record("create_run")?;
        let mut run = Run {
            id: state.next_id("run"),
            status: RunStatus::Queued,
            thread_id: thread_id.to_string(),
            assistant_id: agent_id.to_string(),
            last_error: None,
        };
        let status = state
            .initial_run_status
            .clone()
            .unwrap_or(RunStatus::Completed);
        state.apply_status(&mut run, status);

        if let Some(content) = state.reply.clone() {
            let reply = ThreadMessage {
                id: state.next_id("msg"),
                role: MessageRole::Assistant,
                content,
            };
            state
                .messages
                .entry(thread_id.to_string())
                .or_default()
                .push(reply);
        }

        state.runs.insert(run.id.clone(), run.clone());
        Ok(run)
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<Run, PlatformError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry("get_run").or_default() += 1;
        if state.failing_refreshes > 0 {
            state.failing_refreshes -= 1;
            return Err(PlatformError::ApiError {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }

        let mut run = state
            .runs
            .get(run_id)
            .cloned()
            .ok_or_else(|| PlatformError::ApiError {
                status: 404,
                body: format!("run {} not found", run_id),
            })?;
        if let Some(next) = state.run_status_script.pop_front() {
            state.apply_status(&mut run, next);
            state.runs.insert(run.id.clone(), run.clone());
        }
        Ok(run)
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.record("list_messages")?;
        Ok(state.messages.get(thread_id).cloned().unwrap_or_default())
    }
}
