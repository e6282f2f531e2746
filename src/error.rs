//! Error types for the strand crate.

/// Result type alias for strand operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the pool and its submission surface.
///
/// `Error` is `Clone`: a stored cancellation reason is handed out to every
/// observer of a stop token, and an abandoned task's status reaches both its
/// stop callback and its future.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Bad argument (e.g. non-positive capacity) or environment failure
    #[error("invalid: {0}")]
    Invalid(String),

    /// A stop was requested on the task's stop token
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Submission or capacity change after shutdown began
    #[error("shutdown: {0}")]
    Shutdown(String),

    /// Executor failure (worker spawn, broken result channel)
    #[error("executor error: {0}")]
    Executor(String),

    /// The submitted closure panicked; delivered through the task's future
    #[error("task panicked: {0}")]
    TaskPanic(String),
}

impl Error {
    /// Create an invalid-argument error
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Error::Invalid(msg.into())
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Error::Cancelled(msg.into())
    }

    /// Create a shutdown error
    pub fn shutdown<S: Into<String>>(msg: S) -> Self {
        Error::Shutdown(msg.into())
    }

    /// Create an executor error
    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    /// True if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// True if this is a shutdown rejection
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Error::Shutdown(_))
    }

    /// True if this is an invalid-argument error
    pub fn is_invalid(&self) -> bool {
        matches!(self, Error::Invalid(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid("capacity must be > 0");
        assert_eq!(err.to_string(), "invalid: capacity must be > 0");

        let err = Error::cancelled("stop requested");
        assert!(err.is_cancelled());
        assert!(!err.is_shutdown());
    }

    #[test]
    fn test_error_clone_eq() {
        let err = Error::shutdown("pool is shutting down");
        assert_eq!(err.clone(), err);
        assert!(err.is_shutdown());
    }
}
