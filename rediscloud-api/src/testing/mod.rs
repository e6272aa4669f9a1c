//! Test doubles for code that polls
//!
//! Enabled for this crate's tests and, through the `testing` feature, for
//! dependent crates.

mod cloud;

pub use cloud::FakeCloud;

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::clock::Clock;
use crate::error::{ApiError, ApiResult};
use crate::service::TaskFetcher;
use crate::task::{Task, TaskResponse};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Virtual clock: `sleep` records the delay and advances time instantly
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Virtual time passed since creation
    pub fn elapsed(&self) -> Duration {
        *lock(&self.elapsed)
    }

    /// Every delay requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }

    pub fn advance(&self, duration: Duration) {
        *lock(&self.elapsed) += duration;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

type FetchHook = Box<dyn Fn(usize) + Send + Sync>;

/// Task fetcher replaying a fixed script
///
/// Once the script is exhausted the last record returned is repeated, so a
/// terminal record stays terminal. The hook runs after each fetch with the
/// running fetch count.
pub struct ScriptedTasks {
    script: Mutex<VecDeque<ApiResult<Task>>>,
    last: Mutex<Option<Task>>,
    fetches: AtomicUsize,
    hook: Option<FetchHook>,
}

impl ScriptedTasks {
    pub fn new(script: impl IntoIterator<Item = ApiResult<Task>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Number of fetches served
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskFetcher for ScriptedTasks {
    async fn get_task(&self, id: &str) -> ApiResult<Task> {
        let count = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        let next = lock(&self.script).pop_front();
        let result = match next {
            Some(Ok(task)) => {
                *lock(&self.last) = Some(task.clone());
                Ok(task)
            }
            Some(Err(e)) => Err(e),
            None => lock(&self.last)
                .clone()
                .ok_or_else(|| ApiError::not_found(format!("retrieve task {}", id))),
        };
        if let Some(hook) = &self.hook {
            hook(count);
        }
        result
    }
}

/// A task record with the given status and no result
pub fn task(id: &str, status: &str) -> Task {
    Task {
        id: id.to_string(),
        command_type: None,
        status: Some(status.to_string()),
        description: None,
        timestamp: None,
        response: None,
    }
}

/// A completed task that produced `resource_id`
pub fn completed_task(id: &str, resource_id: i64) -> Task {
    Task {
        response: Some(TaskResponse {
            resource_id: Some(resource_id),
            ..Default::default()
        }),
        ..task(id, crate::task::status::PROCESSING_COMPLETED)
    }
}
