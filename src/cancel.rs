//! Cooperative cancellation.
//!
//! A [`StopSource`] is the write side of a stop request; every
//! [`StopToken`] derived from it observes the request. Cancellation is
//! cooperative: requesting a stop never preempts anything, it only makes
//! the tokens report it. The common case (not cancelled) is a single
//! atomic load.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Shared between a source and all of its tokens. Lives as long as the
/// longest holder.
#[derive(Debug)]
struct StopState {
    /// 0 = not requested, -1 = requested by API call, positive = signal
    /// number delivered from async-signal context.
    requested: AtomicI32,
    /// The stored reason. `requested == 0` implies this is `None`.
    cancel_error: Mutex<Option<Error>>,
}

impl StopState {
    fn new() -> Self {
        Self {
            requested: AtomicI32::new(0),
            cancel_error: Mutex::new(None),
        }
    }
}

/// The side that requests a stop.
#[derive(Debug, Clone)]
pub struct StopSource {
    state: Arc<StopState>,
}

impl StopSource {
    /// Create a source with no stop requested.
    pub fn new() -> Self {
        Self {
            state: Arc::new(StopState::new()),
        }
    }

    /// Request a stop with a generic cancellation reason.
    pub fn request_stop(&self) {
        self.request_stop_with(Error::cancelled("stop requested"));
    }

    /// Request a stop with an explicit reason. The first request wins;
    /// later ones are no-ops until [`reset`](Self::reset).
    pub fn request_stop_with(&self, error: Error) {
        let mut stored = self.state.cancel_error.lock();
        if self.state.requested.load(Ordering::SeqCst) == 0 {
            *stored = Some(error);
            self.state.requested.store(-1, Ordering::SeqCst);
        }
    }

    /// Request a stop from a signal handler.
    ///
    /// Only async-signal-safe code allowed here: a single atomic store, no
    /// locking, no allocation. The reason is materialized lazily by
    /// [`StopToken::poll`].
    pub fn request_stop_from_signal(&self, signum: i32) {
        self.state.requested.store(signum, Ordering::SeqCst);
    }

    /// Clear the stop request and the stored reason.
    ///
    /// Only valid while no concurrent consumer is observing the token.
    pub fn reset(&self) {
        let mut stored = self.state.cancel_error.lock();
        *stored = None;
        self.state.requested.store(0, Ordering::SeqCst);
    }

    /// Derive a token observing this source.
    pub fn token(&self) -> StopToken {
        StopToken {
            state: Some(Arc::clone(&self.state)),
        }
    }
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}

/// The side that gets asked to stop.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    state: Option<Arc<StopState>>,
}

impl StopToken {
    /// A trivial token that never reports a stop request.
    pub fn unstoppable() -> Self {
        Self { state: None }
    }

    /// Whether a stop has been requested. Reads only the atomic, so this is
    /// cheap enough to poll from a hot loop.
    pub fn is_stop_requested(&self) -> bool {
        match &self.state {
            Some(state) => state.requested.load(Ordering::SeqCst) != 0,
            None => false,
        }
    }

    /// `Ok(())` while no stop is requested, otherwise the stored reason.
    ///
    /// The signal path stores only the atomic, so the reason is
    /// manufactured here on first observation.
    pub fn poll(&self) -> Result<()> {
        let state = match &self.state {
            Some(state) => state,
            None => return Ok(()),
        };

        if state.requested.load(Ordering::SeqCst) == 0 {
            return Ok(());
        }

        let mut stored = state.cancel_error.lock();
        match &*stored {
            Some(error) => Err(error.clone()),
            None => {
                let signum = state.requested.load(Ordering::SeqCst);
                debug_assert!(signum >= 0);
                let error = Error::cancelled(format!("stop requested by signal {signum}"));
                *stored = Some(error.clone());
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_requested_by_default() {
        let source = StopSource::new();
        let token = source.token();

        assert!(!token.is_stop_requested());
        assert!(token.poll().is_ok());
    }

    #[test]
    fn test_request_stop() {
        let source = StopSource::new();
        let token = source.token();

        source.request_stop();
        assert!(token.is_stop_requested());

        let err = token.poll().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_first_request_wins() {
        let source = StopSource::new();
        let token = source.token();

        source.request_stop_with(Error::cancelled("first"));
        source.request_stop_with(Error::cancelled("second"));

        assert_eq!(token.poll().unwrap_err(), Error::cancelled("first"));
    }

    #[test]
    fn test_signal_path() {
        let source = StopSource::new();
        let token = source.token();

        source.request_stop_from_signal(2);
        assert!(token.is_stop_requested());

        let err = token.poll().unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("signal 2"));

        // The reason sticks once manufactured.
        assert_eq!(token.poll().unwrap_err(), err);
    }

    #[test]
    fn test_reset() {
        let source = StopSource::new();
        let token = source.token();

        source.request_stop();
        assert!(token.is_stop_requested());

        source.reset();
        assert!(!token.is_stop_requested());
        assert!(token.poll().is_ok());

        // A fresh request after reset takes effect again.
        source.request_stop();
        assert!(token.is_stop_requested());
    }

    #[test]
    fn test_unstoppable() {
        let token = StopToken::unstoppable();
        assert!(!token.is_stop_requested());
        assert!(token.poll().is_ok());
    }

    #[test]
    fn test_tokens_share_state() {
        let source = StopSource::new();
        let a = source.token();
        let b = a.clone();
        drop(source);

        // Tokens keep the state alive after the source is gone.
        assert!(!a.is_stop_requested());
        assert!(!b.is_stop_requested());
    }
}
