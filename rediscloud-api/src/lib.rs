//! Redis Cloud API client
//!
//! REST access to subscriptions, databases and peerings, plus the task
//! poller that turns accepted asynchronous requests into final results.
//!
//! ## Module Structure
//!
//! - `client` - reqwest-backed `RestClient`
//! - `clock` - Injectable time source used by every polling loop
//! - `config` - Connection settings and task backoff bounds
//! - `error` - `ApiError` for single calls, `WaitError` for waits
//! - `models` - Request and response bodies
//! - `service` - `TaskFetcher` and `CloudApi` traits
//! - `task` - Task records, status vocabulary and `TaskApi`

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod service;
pub mod task;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::RestClient;
pub use clock::{Clock, TokioClock, sleep_or_cancel};
pub use config::{ClientConfig, ConfigError, TaskPollConfig};
pub use error::{ApiError, ApiResult, WaitError, WaitResult};
pub use service::{CloudApi, TaskFetcher};
pub use task::{Task, TaskApi, TaskStatus};

pub use tokio_util::sync::CancellationToken;
