//! Task API
//!
//! - `model` - Task records and embedded result errors
//! - `status` - The task status vocabulary
//! - `poller` - `TaskApi`, which waits for tasks to finish

mod model;
mod poller;
pub mod status;

pub use model::{Task, TaskResponse, TaskResponseError};
pub use poller::TaskApi;
pub use status::TaskStatus;
