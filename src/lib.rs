//! strand - CPU-bound thread pool with cooperative cancellation
//!
//! A fixed-but-resizable pool of worker threads draining a FIFO of
//! type-erased tasks, with a stop-token channel for cooperative
//! cancellation, plus two standalone lock-discipline containers (a two-lock
//! MPMC FIFO queue and a lock-free LIFO stack).
//!
//! # Quick Start
//!
//! ```
//! use strand::prelude::*;
//!
//! let pool = ThreadPool::make(4).unwrap();
//!
//! // Fire and forget
//! pool.spawn(|| println!("hello from a worker")).unwrap();
//!
//! // Submit and await a result
//! let future = pool.submit(|| (0..100).sum::<i32>()).unwrap();
//! assert_eq!(future.get().unwrap(), 4950);
//!
//! pool.shutdown(true).unwrap();
//! ```
//!
//! # Cancellation
//!
//! ```
//! use strand::prelude::*;
//!
//! let pool = ThreadPool::make(2).unwrap();
//! let source = StopSource::new();
//!
//! source.request_stop();
//! let future = pool
//!     .submit_with_options(TaskHints::default(), source.token(), None, || 42)
//!     .unwrap();
//!
//! // The stop was requested before pickup: the task body never runs.
//! assert!(future.get().unwrap_err().is_cancelled());
//! ```
//!
//! # Features
//!
//! - **FIFO pickup**: tasks start in submission order; completion order is
//!   up to the workers.
//! - **Cooperative cancellation**: queued tasks are abandoned on request;
//!   running tasks observe their token by polling.
//! - **Dynamic capacity**: grow launches workers eagerly, shrink reaps
//!   surplus at the next scheduling point.
//! - **Two-phase shutdown**: drain the queue, or abandon it.
//! - **Fork safety**: the first operation in a forked child reinitializes
//!   the pool transparently.
//!
//! Nested parallelism is unsupported: a task that blocks on another task
//! from the same pool may deadlock.

#![warn(missing_docs, missing_debug_implementations)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod sync;

pub use cancel::{StopSource, StopToken};
pub use config::{default_capacity, Config, ConfigBuilder};
pub use error::{Error, Result};
pub use executor::{
    cpu_thread_pool, cpu_thread_pool_capacity, set_cpu_thread_pool_capacity, StopCallback,
    TaskFuture, TaskHints, ThreadPool,
};
pub use sync::{FifoQueue, LockFreeStack};
