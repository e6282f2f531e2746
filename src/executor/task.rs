//! Task representation.

use crate::cancel::StopToken;
use crate::error::{Error, Result};
use std::fmt;

/// Advisory metadata attached to a submission.
///
/// The pool records hints but never acts on them: reordering by priority
/// would break the FIFO pickup contract. They exist for observability and
/// for future schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHints {
    /// The lower, the more urgent.
    pub priority: i32,
    /// The I/O transfer size in bytes.
    pub io_size: i64,
    /// The approximate CPU cost in number of instructions.
    pub cpu_cost: i64,
    /// An application-specific ID.
    pub external_id: i64,
}

impl Default for TaskHints {
    fn default() -> Self {
        Self {
            priority: 0,
            io_size: -1,
            cpu_cost: -1,
            external_id: -1,
        }
    }
}

/// Invoked with the stop reason when a task is abandoned before execution.
pub type StopCallback = Box<dyn FnOnce(&Error) + Send + 'static>;

/// A type-erased one-shot unit of work.
///
/// Created at submission, consumed exactly once: either [`invoke`](Task::invoke)d
/// by a worker or [`abandon`](Task::abandon)ed when cancellation or shutdown
/// drops it. Both paths destroy the closure so captured resources release
/// promptly.
pub(crate) struct Task {
    func: Box<dyn FnOnce() + Send + 'static>,
    stop_token: StopToken,
    stop_callback: Option<StopCallback>,
    hints: TaskHints,
}

impl Task {
    pub(crate) fn new<F>(
        hints: TaskHints,
        func: F,
        stop_token: StopToken,
        stop_callback: Option<StopCallback>,
    ) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            func: Box::new(func),
            stop_token,
            stop_callback,
            hints,
        }
    }

    /// The task's stop status: `Ok` to proceed, `Err` with the stop reason
    /// once a stop has been requested.
    pub(crate) fn stop_status(&self) -> Result<()> {
        self.stop_token.poll()
    }

    /// Run the user closure, consuming the task. The stop callback is
    /// dropped uninvoked.
    pub(crate) fn invoke(self) {
        (self.func)();
    }

    /// Drop the user closure uninvoked and fire the stop callback with the
    /// reason the task was abandoned.
    pub(crate) fn abandon(self, error: &Error) {
        if let Some(callback) = self.stop_callback {
            callback(error);
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("hints", &self.hints)
            .field("stop_token", &self.stop_token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::StopSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_hints_default() {
        let hints = TaskHints::default();
        assert_eq!(hints.priority, 0);
        assert_eq!(hints.io_size, -1);
        assert_eq!(hints.cpu_cost, -1);
        assert_eq!(hints.external_id, -1);
    }

    #[test]
    fn test_invoke_runs_closure_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = {
            let counter = Arc::clone(&counter);
            Task::new(
                TaskHints::default(),
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                StopToken::unstoppable(),
                None,
            )
        };

        task.invoke();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_abandon_fires_callback_not_closure() {
        let ran = Arc::new(AtomicUsize::new(0));
        let abandoned = Arc::new(AtomicUsize::new(0));

        let task = {
            let ran = Arc::clone(&ran);
            let abandoned = Arc::clone(&abandoned);
            Task::new(
                TaskHints::default(),
                move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                },
                StopToken::unstoppable(),
                Some(Box::new(move |error: &Error| {
                    assert!(error.is_cancelled());
                    abandoned.fetch_add(1, Ordering::SeqCst);
                })),
            )
        };

        task.abandon(&Error::cancelled("dropped"));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(abandoned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_status_tracks_token() {
        let source = StopSource::new();
        let task = Task::new(TaskHints::default(), || {}, source.token(), None);

        assert!(task.stop_status().is_ok());
        source.request_stop();
        assert!(task.stop_status().unwrap_err().is_cancelled());
    }
}
