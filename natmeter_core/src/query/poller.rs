use std::sync::Arc;
use std::time::Duration;

use crate::config::PollSettings;
use crate::models::{ExecutionHandle, ExecutionStatus};
use crate::query::traits::QueryEngine;
use crate::{Error, Result};

/// Polls an execution until it reaches a terminal state or runs out of attempts.
#[derive(Clone)]
pub struct CompletionPoller {
    engine: Arc<dyn QueryEngine>,
    settings: PollSettings,
}

impl CompletionPoller {
    pub fn new(engine: Arc<dyn QueryEngine>, settings: PollSettings) -> Self {
        Self { engine, settings }
    }

    pub async fn await_completion(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus> {
        self.await_completion_with(handle, self.settings.max_attempts, self.settings.interval)
            .await
    }

    /// Checks status at most `max_attempts` times, waiting `interval` between checks.
    ///
    /// The first terminal observation is returned as is (including FAILED and CANCELLED).
    /// Still RUNNING after the last attempt is [`Error::Timeout`].
    #[tracing::instrument(level = "info", skip(self), fields(execution_id = %handle))]
    pub async fn await_completion_with(
        &self,
        handle: &ExecutionHandle,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<ExecutionStatus> {
        for attempt in 1..=max_attempts {
            let status = self.engine.status(handle).await?;
            tracing::info!(
                execution_id = %handle,
                attempt,
                max_attempts,
                status = %status,
                "query status"
            );
            if status.is_terminal() {
                return Ok(status);
            }
            if attempt < max_attempts && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }

        Err(Error::Timeout {
            execution_id: handle.to_string(),
            attempts: max_attempts,
            waited_secs: interval.as_secs() * u64::from(max_attempts.saturating_sub(1)),
        })
    }
}
