//! Unbounded MPMC FIFO queue with split head/tail locking.
//!
//! A dummy-node singly linked list guarded by two mutexes. Producers
//! serialize on the tail lock, consumers on the head lock, so one producer
//! and one consumer can proceed concurrently. The head always points at a
//! dummy node; data lives on the nodes behind it, and emptiness is exactly
//! `head == tail`.

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::ptr;

struct Node<T> {
    data: Option<T>,
    next: *mut Node<T>,
}

impl<T> Node<T> {
    fn dummy() -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            data: None,
            next: ptr::null_mut(),
        }))
    }
}

/// An unbounded multi-producer/multi-consumer FIFO queue.
///
/// `push` never blocks producers behind consumers; `try_pop` is
/// non-blocking; `wait_and_pop` parks the consumer until an element
/// arrives. Ordering is strict FIFO between a push and the pop that
/// receives it; concurrent pushes are ordered by tail-lock acquisition,
/// concurrent pops by head-lock acquisition.
pub struct FifoQueue<T> {
    head: CachePadded<Mutex<*mut Node<T>>>,
    tail: CachePadded<Mutex<*mut Node<T>>>,
    data_cond: Condvar,
}

unsafe impl<T: Send> Send for FifoQueue<T> {}
unsafe impl<T: Send> Sync for FifoQueue<T> {}

impl<T> FifoQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        let dummy = Node::dummy();
        Self {
            head: CachePadded::new(Mutex::new(dummy)),
            tail: CachePadded::new(Mutex::new(dummy)),
            data_cond: Condvar::new(),
        }
    }

    /// Append `value` and wake at most one waiting consumer.
    pub fn push(&self, value: T) {
        let new_dummy = Node::dummy();
        {
            let mut tail = self.tail.lock();
            // Publish the value on the current dummy, then install a fresh
            // dummy behind it.
            unsafe {
                (**tail).data = Some(value);
                (**tail).next = new_dummy;
            }
            *tail = new_dummy;
        }
        // The signal must be ordered after the sleep of any consumer that
        // is between its emptiness check and its wait; passing through the
        // head mutex establishes that order.
        drop(self.head.lock());
        self.data_cond.notify_one();
    }

    /// Remove and return the head element, or `None` if the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        let mut head = self.head.lock();
        if *head == self.tail_snapshot() {
            return None;
        }
        Some(unsafe { Self::pop_head(&mut head) })
    }

    /// Remove and return the head element, blocking until one is available.
    pub fn wait_and_pop(&self) -> T {
        let mut head = self.head.lock();
        // Spurious wakeups are fine: the predicate is rechecked.
        while *head == self.tail_snapshot() {
            self.data_cond.wait(&mut head);
        }
        unsafe { Self::pop_head(&mut head) }
    }

    /// Snapshot emptiness. Advisory under contention.
    pub fn is_empty(&self) -> bool {
        let head = self.head.lock();
        *head == self.tail_snapshot()
    }

    /// An instantaneous tail value. Taking the tail lock avoids a torn read
    /// against a concurrent push. Callers hold the head lock, never the
    /// other way around, so the two locks cannot deadlock.
    fn tail_snapshot(&self) -> *mut Node<T> {
        *self.tail.lock()
    }

    /// Unlink the head node and return its value.
    ///
    /// Safety: the caller holds the head lock and has established
    /// `head != tail`, so the head node carries data and a successor.
    unsafe fn pop_head(head: &mut MutexGuard<'_, *mut Node<T>>) -> T {
        let mut old_head = Box::from_raw(**head);
        **head = old_head.next;
        old_head.data.take().expect("non-dummy queue node carries data")
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for FifoQueue<T> {
    fn drop(&mut self) {
        // Walk the chain from head, freeing every node including the
        // trailing dummy. Remaining values drop with their nodes.
        let mut cursor = *self.head.get_mut();
        while !cursor.is_null() {
            let node = unsafe { Box::from_raw(cursor) };
            cursor = node.next;
        }
    }
}

impl<T> fmt::Debug for FifoQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FifoQueue")
            .field("empty", &self.is_empty())
            .finish()
    }
}
