//! Lock-free LIFO stack with split reference counting.
//!
//! Every node carries an internal counter; the head pointer carries an
//! external counter packed into the same atomic word. A popping thread
//! first bumps the external count (so the node cannot be freed while it
//! inspects `next`), then races to swing the head. The winner folds the
//! external count into the node's internal count; the node is destroyed by
//! whichever thread observes the combined count reach zero. The external
//! count doubles as the generation witness that defeats ABA: a recycled
//! pointer cannot be confused with its predecessor because the counts will
//! not reconcile.

use crossbeam_utils::{Backoff, CachePadded};
use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicIsize, AtomicU64, Ordering};

/// The head word packs a 16-bit external count above a 48-bit pointer.
/// 48 bits covers canonical user-space addresses on the supported 64-bit
/// targets; 16 bits of count rides out any realistic number of threads
/// simultaneously inside `pop`.
const COUNT_SHIFT: u32 = 48;
const PTR_MASK: u64 = (1 << COUNT_SHIFT) - 1;

struct Node<T> {
    data: UnsafeCell<Option<T>>,
    internal_count: AtomicIsize,
    /// Packed counted pointer to the next node. Written only before the
    /// node is published; the publishing CAS orders it for readers.
    next: UnsafeCell<u64>,
}

fn pack<T>(external: u64, ptr: *mut Node<T>) -> u64 {
    debug_assert_eq!(ptr as u64 & !PTR_MASK, 0);
    (external << COUNT_SHIFT) | ptr as u64
}

fn unpack_ptr<T>(packed: u64) -> *mut Node<T> {
    (packed & PTR_MASK) as *mut Node<T>
}

fn unpack_count(packed: u64) -> u64 {
    packed >> COUNT_SHIFT
}

/// A lock-free LIFO stack shared by any number of producers and consumers.
pub struct LockFreeStack<T> {
    head: CachePadded<AtomicU64>,
    _marker: PhantomData<Box<Node<T>>>,
}

unsafe impl<T: Send> Send for LockFreeStack<T> {}
unsafe impl<T: Send> Sync for LockFreeStack<T> {}

impl<T> LockFreeStack<T> {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicU64::new(pack::<T>(0, std::ptr::null_mut()))),
            _marker: PhantomData,
        }
    }

    /// Insert `value` at the top of the stack.
    pub fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(Node {
            data: UnsafeCell::new(Some(value)),
            internal_count: AtomicIsize::new(0),
            next: UnsafeCell::new(self.head.load(Ordering::Relaxed)),
        }));
        let new_head = pack(1, node);
        let backoff = Backoff::new();
        let mut expected = unsafe { *(*node).next.get() };
        loop {
            match self.head.compare_exchange_weak(
                expected,
                new_head,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(current) => {
                    // Not yet published: this thread still owns the node.
                    unsafe { *(*node).next.get() = current };
                    expected = current;
                    backoff.spin();
                }
            }
        }
    }

    /// Remove and return the top element, or `None` if the stack is empty.
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        let mut old_head = self.head.load(Ordering::Relaxed);
        loop {
            // Guard the node against concurrent free before touching it.
            old_head = self.increase_head_count(old_head);
            let ptr = unpack_ptr::<T>(old_head);
            if ptr.is_null() {
                return None;
            }

            let next = unsafe { *(*ptr).next.get() };
            match self
                .head
                .compare_exchange(old_head, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => {
                    // This thread unlinked the node and owns its payload.
                    let value = unsafe { (*(*ptr).data.get()).take() };
                    // Fold the external count into the internal one: minus
                    // one for the unlink, minus one for this thread's own
                    // reference. Whoever brings the sum to zero frees.
                    let correction = unpack_count(old_head) as isize - 2;
                    let prior = unsafe {
                        (*ptr)
                            .internal_count
                            .fetch_add(correction, Ordering::Release)
                    };
                    if prior == -correction {
                        drop(unsafe { Box::from_raw(ptr) });
                    }
                    return value;
                }
                Err(current) => {
                    // Lost the race; drop this thread's reference. A prior
                    // value of 1 means every other observer is gone and the
                    // winner has already published its correction.
                    let prior =
                        unsafe { (*ptr).internal_count.fetch_add(-1, Ordering::Relaxed) };
                    if prior == 1 {
                        // Synchronize with the winner's release before
                        // freeing.
                        unsafe { (*ptr).internal_count.load(Ordering::Acquire) };
                        drop(unsafe { Box::from_raw(ptr) });
                    }
                    old_head = current;
                    backoff.spin();
                }
            }
        }
    }

    /// Snapshot emptiness. Advisory under contention.
    pub fn is_empty(&self) -> bool {
        unpack_ptr::<T>(self.head.load(Ordering::Relaxed)).is_null()
    }

    /// Bump the external count on the current head, retrying until the CAS
    /// lands on an unchanged head. Returns the packed head value this
    /// thread now holds a reference under.
    fn increase_head_count(&self, mut old: u64) -> u64 {
        let backoff = Backoff::new();
        loop {
            let bumped = old.wrapping_add(1 << COUNT_SHIFT);
            match self.head.compare_exchange_weak(
                old,
                bumped,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return bumped,
                Err(current) => {
                    old = current;
                    backoff.spin();
                }
            }
        }
    }
}

impl<T> Default for LockFreeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeStack<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

impl<T> fmt::Debug for LockFreeStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeStack")
            .field("empty", &self.is_empty())
            .finish()
    }
}
