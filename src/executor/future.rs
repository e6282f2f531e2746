//! One-shot result channel between a task and its submitter.

use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::fmt;
use std::time::Duration;

/// Create a connected promise/future pair.
pub(crate) fn promise_pair<R>() -> (Promise<R>, TaskFuture<R>) {
    let (tx, rx) = bounded(1);
    (Promise { tx }, TaskFuture { rx })
}

/// The producer side: owned by the task (and its abandonment callback).
/// Cloneable; the first completion wins and later ones are discarded.
pub(crate) struct Promise<R> {
    tx: Sender<Result<R>>,
}

impl<R> Promise<R> {
    pub(crate) fn set(&self, result: Result<R>) {
        // try_send so a (conceptually impossible) second completion can
        // never block on the full buffer.
        let _ = self.tx.try_send(result);
    }
}

impl<R> Clone for Promise<R> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<R> fmt::Debug for Promise<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").finish_non_exhaustive()
    }
}

/// The consumer side of a task's result, returned by
/// [`ThreadPool::submit`](crate::ThreadPool::submit).
///
/// Completes exactly once with the task's return value, the task's panic,
/// or a cancellation if the task was abandoned before running.
pub struct TaskFuture<R> {
    rx: Receiver<Result<R>>,
}

impl<R> TaskFuture<R> {
    /// Block the calling thread until the task completes.
    pub fn get(self) -> Result<R> {
        match self.rx.recv() {
            Ok(result) => result,
            Err(_) => Err(Error::executor("task dropped without delivering a result")),
        }
    }

    /// The result if the task has already completed, `None` otherwise.
    pub fn try_get(&self) -> Option<Result<R>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                Some(Err(Error::executor("task dropped without delivering a result")))
            }
        }
    }

    /// Like [`get`](Self::get) but gives up after `timeout`, returning
    /// `None` if the task has not completed by then.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<R>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(Err(Error::executor("task dropped without delivering a result")))
            }
        }
    }
}

impl<R> fmt::Debug for TaskFuture<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_roundtrip() {
        let (promise, future) = promise_pair();
        promise.set(Ok(42));
        assert_eq!(future.get().unwrap(), 42);
    }

    #[test]
    fn test_error_roundtrip() {
        let (promise, future) = promise_pair::<i32>();
        promise.set(Err(Error::cancelled("abandoned")));
        assert!(future.get().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_first_completion_wins() {
        let (promise, future) = promise_pair();
        let clone = promise.clone();

        promise.set(Ok(1));
        clone.set(Ok(2));

        assert_eq!(future.get().unwrap(), 1);
    }

    #[test]
    fn test_dropped_promise_is_an_error() {
        let (promise, future) = promise_pair::<()>();
        drop(promise);

        let err = future.get().unwrap_err();
        assert!(matches!(err, Error::Executor(_)));
    }

    #[test]
    fn test_try_get() {
        let (promise, future) = promise_pair();
        assert!(future.try_get().is_none());

        promise.set(Ok("done"));
        assert_eq!(future.try_get().unwrap().unwrap(), "done");
    }

    #[test]
    fn test_wait_timeout_expires() {
        let (_promise, future) = promise_pair::<u8>();
        assert!(future.wait_timeout(Duration::from_millis(10)).is_none());
    }
}
