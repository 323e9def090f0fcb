use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use futures::channel::oneshot;
use tracing::trace;

lazy_static::lazy_static! {
  static ref NEXT_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// The identity of one unit of work added to a `CoopPool`.
///
/// Ids come from a process-wide counter, so a handle created by one pool is
/// never mistaken for a member of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle {
  task_id: u64,
}

impl TaskHandle {
  pub(crate) fn next() -> Self {
    Self {
      task_id: NEXT_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed),
    }
  }

  /// Returns the unique ID of this task.
  pub fn id(&self) -> u64 {
    self.task_id
  }
}

impl fmt::Display for TaskHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "task#{}", self.task_id)
  }
}

/// Hands a task's completion back to the pool that admitted it.
///
/// Every work function receives exactly one signal. Firing it completes the
/// task at once, wherever the call happens: deep inside the work future, in a
/// callback the work registered, or in code outside the pool that was given
/// the signal. The pool then stops polling the work future, dropping whatever
/// remained of it.
///
/// Dropping the signal without firing it is not a completion; the task then
/// completes when its work future returns.
pub struct CompletionSignal {
  handle: TaskHandle,
  sender: oneshot::Sender<()>,
}

impl fmt::Debug for CompletionSignal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CompletionSignal")
      .field("task_id", &self.handle.id())
      .field("pool_listening", &!self.sender.is_canceled())
      .finish()
  }
}

impl CompletionSignal {
  pub(crate) fn new(handle: TaskHandle) -> (Self, oneshot::Receiver<()>) {
    let (sender, receiver) = oneshot::channel();
    (Self { handle, sender }, receiver)
  }

  /// The handle of the task this signal completes.
  pub fn handle(&self) -> TaskHandle {
    self.handle
  }

  /// Marks the task as complete and wakes the pool.
  ///
  /// Consuming `self` makes a second completion of the same task impossible.
  pub fn signal(self) {
    let task_id = self.handle.id();
    if self.sender.send(()).is_err() {
      trace!(%task_id, "Completion signal fired after the task was already completed or its pool was dropped.");
    } else {
      trace!(%task_id, "Completion signal fired.");
    }
  }
}
