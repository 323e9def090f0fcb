use crate::handle::{CompletionSignal, TaskHandle};

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::FutureExt;

/// The running body of a task, with panics caught.
pub(crate) type WorkFuture = LocalBoxFuture<'static, std::thread::Result<()>>;

/// Builds a task's body once the task is started.
pub(crate) type WorkLauncher = Box<dyn FnOnce(CompletionSignal) -> WorkFuture + 'static>;

/// How a task handed its completion back to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
  /// The work future returned.
  Returned,
  /// The task fired its `CompletionSignal`.
  Signalled,
  /// The work function or its future panicked.
  Panicked,
}

/// The value a finished task resumes the pool with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOutcome {
  pub handle: TaskHandle,
  pub kind: CompletionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskState {
  Created,
  Running,
  Completed,
}

enum Stage {
  Created {
    launcher: WorkLauncher,
    signal: CompletionSignal,
  },
  Running(WorkFuture),
  Completed,
}

/// A task owned by the pool: its work, plus the receiving end of its
/// completion signal. Resolves to a `TaskOutcome` as soon as either the work
/// returns or the signal fires.
pub(crate) struct InFlightTask {
  handle: TaskHandle,
  stage: Stage,
  signal_rx: Option<oneshot::Receiver<()>>,
}

impl fmt::Debug for InFlightTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InFlightTask")
      .field("task_id", &self.handle.id())
      .field("state", &self.state())
      .finish_non_exhaustive()
  }
}

impl InFlightTask {
  pub(crate) fn new<F, Fut>(work_fn: F) -> Self
  where
    F: FnOnce(CompletionSignal) -> Fut + 'static,
    Fut: Future<Output = ()> + 'static,
  {
    let handle = TaskHandle::next();
    let (signal, signal_rx) = CompletionSignal::new(handle);
    let launcher: WorkLauncher = Box::new(move |signal: CompletionSignal| AssertUnwindSafe(work_fn(signal)).catch_unwind().boxed_local());
    Self {
      handle,
      stage: Stage::Created { launcher, signal },
      signal_rx: Some(signal_rx),
    }
  }

  pub(crate) fn handle(&self) -> TaskHandle {
    self.handle
  }

  pub(crate) fn state(&self) -> TaskState {
    match self.stage {
      Stage::Created { .. } => TaskState::Created,
      Stage::Running(_) => TaskState::Running,
      Stage::Completed => TaskState::Completed,
    }
  }

  fn complete(&mut self, kind: CompletionKind) -> Poll<TaskOutcome> {
    self.stage = Stage::Completed;
    self.signal_rx = None;
    Poll::Ready(TaskOutcome {
      handle: self.handle,
      kind,
    })
  }

  /// `true` once the signal has fired. A dropped, unfired signal stops being
  /// watched.
  fn poll_signal(&mut self, cx: &mut Context<'_>) -> bool {
    let Some(rx) = self.signal_rx.as_mut() else {
      return false;
    };
    match rx.poll_unpin(cx) {
      Poll::Ready(Ok(())) => true,
      Poll::Ready(Err(oneshot::Canceled)) => {
        self.signal_rx = None;
        false
      }
      Poll::Pending => false,
    }
  }
}

impl Future for InFlightTask {
  type Output = TaskOutcome;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<TaskOutcome> {
    let this = self.get_mut();

    if let Stage::Created { .. } = this.stage {
      let Stage::Created { launcher, signal } = std::mem::replace(&mut this.stage, Stage::Completed) else {
        unreachable!("stage checked above");
      };
      match std::panic::catch_unwind(AssertUnwindSafe(move || launcher(signal))) {
        Ok(work) => this.stage = Stage::Running(work),
        Err(_) => return this.complete(CompletionKind::Panicked),
      }
    }

    if this.poll_signal(cx) {
      return this.complete(CompletionKind::Signalled);
    }

    let work_result = match &mut this.stage {
      Stage::Running(work) => work.as_mut().poll(cx),
      Stage::Created { .. } | Stage::Completed => unreachable!("InFlightTask polled after completion"),
    };
    match work_result {
      Poll::Ready(Ok(())) => return this.complete(CompletionKind::Returned),
      Poll::Ready(Err(_panic_payload)) => return this.complete(CompletionKind::Panicked),
      Poll::Pending => {}
    }

    // The work may have fired its signal before suspending.
    if this.poll_signal(cx) {
      return this.complete(CompletionKind::Signalled);
    }
    Poll::Pending
  }
}
