//! Concurrent containers.
//!
//! Two standalone lock-discipline structures: [`FifoQueue`], an unbounded
//! multi-producer/multi-consumer FIFO with split head/tail locking, and
//! [`LockFreeStack`], a LIFO with split external/internal reference counting
//! for safe reclamation under contention.

pub mod fifo;
pub mod stack;

pub use fifo::FifoQueue;
pub use stack::LockFreeStack;
