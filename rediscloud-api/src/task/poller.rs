//! Waiting for tasks to reach a terminal state
//!
//! A task is polled until it completes, fails, or the caller cancels. There
//! is no attempt limit and, unless a time limit is set, no overall timeout;
//! bounding the wait is otherwise the caller's job through the cancellation
//! token.

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, TokioClock, sleep_or_cancel};
use crate::config::TaskPollConfig;
use crate::error::{WaitError, WaitResult};
use crate::service::TaskFetcher;

use super::model::Task;

/// Polls tasks through a `TaskFetcher`
pub struct TaskApi<F> {
    fetcher: F,
    clock: Arc<dyn Clock>,
    config: TaskPollConfig,
    time_limit: Option<Duration>,
}

impl<F: TaskFetcher> TaskApi<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            clock: Arc::new(TokioClock),
            config: TaskPollConfig::default(),
            time_limit: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: TaskPollConfig) -> Self {
        self.config = config;
        self
    }

    /// Give up with `Timeout` once `limit` has passed on the clock
    ///
    /// The last delay is shortened to end at the limit and one final fetch
    /// is made there.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Retrieve a task once
    ///
    /// Fails if the task couldn't be retrieved or its result embeds an error.
    pub async fn get(&self, id: &str) -> WaitResult<Task> {
        let task = self
            .fetcher
            .get_task(id)
            .await
            .map_err(|e| WaitError::fetch(format!("task {}", id), e))?;

        if let Some(error) = task.response_error() {
            return Err(WaitError::TaskResponse {
                id: id.to_string(),
                source: error.clone(),
            });
        }

        Ok(task)
    }

    /// Poll until the task finishes processing and return its final record
    pub async fn wait_for_task_to_complete(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> WaitResult<Task> {
        let mut delays = ExponentialBuilder::default()
            .with_min_delay(self.config.initial_delay)
            .with_max_delay(self.config.max_delay)
            .with_factor(2.0)
            .with_max_times(usize::MAX)
            .build();
        let start = self.clock.now();
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(WaitError::cancelled(format!("task {}", id)));
            }

            attempts += 1;
            let task = self.get(id).await?;
            let status = task.status();

            if status.is_completed() {
                debug!("task {} completed after {} fetches", id, attempts);
                return Ok(task);
            }

            if !status.is_processing() {
                return Err(WaitError::TaskFailed {
                    id: id.to_string(),
                    status: status.to_string(),
                    description: task.description().to_string(),
                });
            }

            let mut delay = delays.next().unwrap_or(self.config.max_delay);
            if let Some(limit) = self.time_limit {
                let elapsed = self.clock.now().saturating_duration_since(start);
                if elapsed >= limit {
                    return Err(WaitError::Timeout {
                        target: format!("task {}", id),
                        timeout: limit,
                        last_status: Some(status.to_string()),
                    });
                }
                delay = delay.min(limit - elapsed);
            }
            info!(
                "task {} not processed yet: {} (attempt {}, retrying in {:?})",
                id, status, attempts, delay
            );

            if !sleep_or_cancel(self.clock.as_ref(), delay, cancel).await {
                return Err(WaitError::cancelled(format!("task {}", id)));
            }
        }
    }

    /// Poll until the task finishes processing, discarding the record
    pub async fn wait(&self, id: &str, cancel: &CancellationToken) -> WaitResult<()> {
        self.wait_for_task_to_complete(id, cancel).await.map(|_| ())
    }

    /// Poll until the task finishes and return the id of the resource it created
    pub async fn wait_for_resource_id(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> WaitResult<i64> {
        let task = self.wait_for_task_to_complete(id, cancel).await?;
        task.resource_id()
            .ok_or_else(|| WaitError::MissingResourceId { id: id.to_string() })
    }
}
