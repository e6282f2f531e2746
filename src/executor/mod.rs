//! Task execution infrastructure.
//!
//! This module provides the thread pool, the type-erased task it runs,
//! the future carrying a submitted task's result, and the worker loop.

pub mod cpu_pool;
pub mod future;
pub mod task;
mod worker;

pub use cpu_pool::{
    cpu_thread_pool, cpu_thread_pool_capacity, set_cpu_thread_pool_capacity, ThreadPool,
};
pub use future::TaskFuture;
pub use task::{StopCallback, TaskHints};
