//! Convenient re-exports for common strand types.
//!
//! This module provides a single import for most use cases:
//! ```
//! use strand::prelude::*;
//! ```

pub use crate::cancel::{StopSource, StopToken};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{Error, Result};
pub use crate::executor::{cpu_thread_pool, TaskFuture, TaskHints, ThreadPool};
pub use crate::sync::{FifoQueue, LockFreeStack};
