//! A single-threaded pool of cooperative tasks that never lets more than a
//! fixed number of them be in flight at once.
//!
//! Tasks are futures built by a work function that also receives a
//! `CompletionSignal`, so a task can report that it is done at a time of its
//! choosing rather than only when its future returns.

mod config;
mod error;
mod handle;
mod pool;
mod task;

pub use config::{PoolConfig, DEFAULT_CAPACITY, DEFAULT_POOL_NAME};
pub use error::PoolError;
pub use handle::{CompletionSignal, TaskHandle};
pub use pool::{start, start_with_config, CoopPool, FinishedCallback};
pub use task::{CompletionKind, TaskOutcome};
