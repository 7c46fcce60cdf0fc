//! Waiting for a run to finish.
//!
//! Polls the run with exponential backoff until it reaches a terminal status,
//! the deadline passes, or the cancellation token fires. A failed refresh is
//! logged and the previous snapshot kept, so the caller always gets the last
//! status that was actually observed.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use grounded_core::PollConfig;

use crate::platform::AgentPlatform;
use crate::types::Run;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(config: &PollConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.initial_delay_ms)),
            backoff_factor: 1.5,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl PollPolicy {
    fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff_factor).min(self.max_delay)
    }
}

/// How the wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEnd {
    Terminal,
    TimedOut,
    Cancelled,
}

/// Poll `run` until it settles. Returns the last observed snapshot.
pub async fn wait_for_run(
    platform: &dyn AgentPlatform,
    run: Run,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> (Run, WaitEnd) {
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut delay = policy.initial_delay;
    let mut current = run;

    loop {
        if current.status.is_terminal() {
            return (current, WaitEnd::Terminal);
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(
                run_id = %current.id,
                status = %current.status,
                timeout_secs = policy.timeout.as_secs(),
                "Run did not finish before the deadline"
            );
            return (current, WaitEnd::TimedOut);
        }

        // Compute jitter without rand: use nanosecond fraction of current time
        let jitter_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos()
            % 100;
        let sleep_for = (delay + Duration::from_millis(jitter_ms as u64)).min(deadline - now);

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = cancel.cancelled() => {
                warn!(run_id = %current.id, status = %current.status, "Run wait cancelled");
                return (current, WaitEnd::Cancelled);
            }
        }

        match platform.get_run(&current.thread_id, &current.id).await {
            Ok(refreshed) => {
                debug!(
                    run_id = %refreshed.id,
                    status = %refreshed.status,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Polled run status"
                );
                current = refreshed;
            }
            Err(e) => {
                warn!(run_id = %current.id, error = %e, "Run refresh failed, keeping last status");
            }
        }

        delay = policy.next_delay(delay);
    }
}
