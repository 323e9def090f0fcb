use crate::config::{PoolConfig, DEFAULT_CAPACITY, DEFAULT_POOL_NAME};
use crate::error::PoolError;
use crate::handle::{CompletionSignal, TaskHandle};
use crate::task::{CompletionKind, InFlightTask, TaskOutcome};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::task::Poll;

use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Callback invoked once a pool started by `start` has drained.
pub type FinishedCallback = Box<dyn FnOnce() + 'static>;

/// Bounds how many cooperative tasks are in flight at once.
///
/// All tasks share the thread of whoever is driving the pool, and they are
/// only polled while the pool itself is awaiting inside `add` or `drain`.
/// Admission is FIFO; completion order is whatever order tasks finish in.
///
/// Tasks are `'static` and never see the pool, so `add` and `drain` can only
/// be called by the code that owns it (normally the `setup` closure passed to
/// `start`).
pub struct CoopPool {
  pool_name: Arc<String>,
  capacity: usize,
  in_flight: Vec<TaskHandle>,
  running: FuturesUnordered<InFlightTask>,
  completed: u64,
}

impl fmt::Debug for CoopPool {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CoopPool")
      .field("pool_name", &self.pool_name)
      .field("capacity", &self.capacity)
      .field("in_flight", &self.in_flight)
      .field("completed", &self.completed)
      .finish_non_exhaustive()
  }
}

impl Default for CoopPool {
  fn default() -> Self {
    Self::new(DEFAULT_CAPACITY)
  }
}

impl CoopPool {
  /// Creates an empty pool admitting at most `capacity` tasks at once.
  ///
  /// The capacity is not validated: with capacity 0 the first `add` suspends
  /// forever without admitting or starting its task. Use `with_config` for a
  /// checked constructor.
  pub fn new(capacity: usize) -> Self {
    Self::build(Arc::new(DEFAULT_POOL_NAME.to_string()), capacity)
  }

  /// Creates an empty pool from validated settings.
  pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
    config.validate()?;
    Ok(Self::build(Arc::new(config.name), config.capacity))
  }

  fn build(pool_name: Arc<String>, capacity: usize) -> Self {
    if capacity == 0 {
      warn!(pool_name = %*pool_name, "Pool created with capacity 0; the first add will suspend forever without admitting its task.");
    }
    debug!(pool_name = %*pool_name, capacity, "Pool created.");
    Self {
      pool_name,
      capacity,
      in_flight: Vec::new(),
      running: FuturesUnordered::new(),
      completed: 0,
    }
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Number of admitted tasks that have not completed yet.
  pub fn in_flight_count(&self) -> usize {
    self.in_flight.len()
  }

  /// Handles of in-flight tasks, in admission order.
  pub fn in_flight(&self) -> &[TaskHandle] {
    &self.in_flight
  }

  /// Number of completions this pool has observed.
  pub fn completed_count(&self) -> u64 {
    self.completed
  }

  pub fn is_over_capacity(&self) -> bool {
    self.in_flight.len() >= self.capacity
  }

  pub fn has_pending_work(&self) -> bool {
    !self.in_flight.is_empty()
  }

  /// Adds a unit of work and starts it as soon as a slot is free.
  ///
  /// `work_fn` is called when the task is started, with the task's
  /// `CompletionSignal`; the future it returns is the task's body. The task
  /// completes when that future returns or the signal fires, whichever comes
  /// first.
  ///
  /// If the pool is full this suspends until one in-flight task completes.
  /// Starting the task polls it once right away, so a task that finishes
  /// synchronously is already gone from `in_flight` when `add` returns.
  pub async fn add<F, Fut>(&mut self, work_fn: F) -> TaskHandle
  where
    F: FnOnce(CompletionSignal) -> Fut + 'static,
    Fut: Future<Output = ()> + 'static,
  {
    let task = InFlightTask::new(work_fn);
    let handle = task.handle();
    trace!(pool_name = %*self.pool_name, task_id = %handle.id(), "Task created.");
    self.admit(task).await;
    handle
  }

  async fn admit(&mut self, mut task: InFlightTask) {
    if self.is_over_capacity() {
      trace!(
        pool_name = %*self.pool_name,
        in_flight = self.in_flight.len(),
        capacity = self.capacity,
        "Pool at capacity, waiting for a free slot."
      );
      // Exactly one slot is reclaimed per wait.
      if self.wait_for_slot().await.is_none() && self.is_over_capacity() {
        // Nothing is running that could ever free a slot (capacity 0).
        warn!(
          pool_name = %*self.pool_name,
          capacity = self.capacity,
          "No task can free a slot; admission suspends forever."
        );
        futures::future::pending::<()>().await;
      }
    }

    let handle = task.handle();
    self.in_flight.push(handle);
    debug!(
      pool_name = %*self.pool_name,
      task_id = %handle.id(),
      in_flight = self.in_flight.len(),
      "Task admitted, starting."
    );

    match futures::poll!(&mut task) {
      Poll::Ready(outcome) => self.finish(outcome),
      Poll::Pending => self.running.push(task),
    }
  }

  /// Suspends until the next in-flight task completes and removes it.
  ///
  /// Returns `None` only when nothing is running.
  pub async fn wait_for_slot(&mut self) -> Option<TaskOutcome> {
    match self.running.next().await {
      Some(outcome) => {
        self.finish(outcome);
        Some(outcome)
      }
      None => {
        if !self.in_flight.is_empty() {
          error!(
            pool_name = %*self.pool_name,
            in_flight = ?self.in_flight,
            "Handles are in flight but no task is running."
          );
        }
        None
      }
    }
  }

  /// Waits for every in-flight task to complete. Admits nothing.
  pub async fn drain(&mut self) {
    info!(pool_name = %*self.pool_name, pending = self.in_flight.len(), "Draining pool.");
    while self.has_pending_work() {
      if self.wait_for_slot().await.is_none() {
        break;
      }
    }
    info!(pool_name = %*self.pool_name, completed = self.completed, "Pool drained.");
  }

  /// Removes `handle` from the in-flight set. Removing a handle that is not
  /// in flight changes nothing and returns `false`.
  ///
  /// Only completions observed by the pool call this; a handle leaves the
  /// set only once its task has completed.
  pub(crate) fn remove(&mut self, handle: TaskHandle) -> bool {
    match self.in_flight.iter().position(|h| *h == handle) {
      Some(index) => {
        self.in_flight.remove(index);
        true
      }
      None => {
        trace!(pool_name = %*self.pool_name, task_id = %handle.id(), "Remove: task not in flight, nothing to do.");
        false
      }
    }
  }

  fn finish(&mut self, outcome: TaskOutcome) {
    let task_id = outcome.handle.id();
    match outcome.kind {
      CompletionKind::Panicked => {
        error!(pool_name = %*self.pool_name, %task_id, "Task panicked during execution.");
      }
      kind => {
        debug!(pool_name = %*self.pool_name, %task_id, ?kind, "Task completed.");
      }
    }
    if self.remove(outcome.handle) {
      self.completed += 1;
    }
  }

  /// Runs `setup` against this pool, drains it, then calls `on_finished`.
  ///
  /// This is the body of `start`, usable inline when the caller is already
  /// on its own cooperative context.
  pub async fn run<S>(mut self, on_finished: Option<FinishedCallback>, setup: S)
  where
    S: for<'a> FnOnce(&'a mut CoopPool) -> LocalBoxFuture<'a, ()>,
  {
    info!(pool_name = %*self.pool_name, capacity = self.capacity, "Pool started.");
    setup(&mut self).await;
    self.drain().await;
    if let Some(callback) = on_finished {
      debug!(pool_name = %*self.pool_name, "Invoking finished callback.");
      callback();
    }
  }
}

/// Starts a pool of `capacity` on a fresh local task of the current
/// `tokio::task::LocalSet`.
///
/// Inside that task a `CoopPool` is built, `setup` is awaited with it, the
/// pool is drained, and `on_finished` is called. The caller is not blocked;
/// await the returned handle to wait for all of it.
///
/// # Panics
/// Panics if called outside a `LocalSet`, like `tokio::task::spawn_local`.
pub fn start<S>(capacity: usize, on_finished: Option<FinishedCallback>, setup: S) -> JoinHandle<()>
where
  S: for<'a> FnOnce(&'a mut CoopPool) -> LocalBoxFuture<'a, ()>,
  S: 'static,
{
  spawn_pool(Arc::new(DEFAULT_POOL_NAME.to_string()), capacity, on_finished, setup)
}

/// Like `start`, with validated settings.
pub fn start_with_config<S>(
  config: PoolConfig,
  on_finished: Option<FinishedCallback>,
  setup: S,
) -> Result<JoinHandle<()>, PoolError>
where
  S: for<'a> FnOnce(&'a mut CoopPool) -> LocalBoxFuture<'a, ()>,
  S: 'static,
{
  config.validate()?;
  Ok(spawn_pool(Arc::new(config.name), config.capacity, on_finished, setup))
}

fn spawn_pool<S>(pool_name: Arc<String>, capacity: usize, on_finished: Option<FinishedCallback>, setup: S) -> JoinHandle<()>
where
  S: for<'a> FnOnce(&'a mut CoopPool) -> LocalBoxFuture<'a, ()>,
  S: 'static,
{
  let span = info_span!("coop_pool", name = %*pool_name);
  tokio::task::spawn_local(
    async move {
      let pool = CoopPool::build(pool_name, capacity);
      pool.run(on_finished, setup).await;
    }
    .instrument(span),
  )
}
