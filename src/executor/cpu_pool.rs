//! The thread pool: a fixed-but-resizable set of workers draining a FIFO of
//! type-erased tasks.
//!
//! Submissions are picked up in FIFO order, arbitrated by the pool mutex;
//! completion order is whatever the workers make of it. Any sort of nested
//! parallelism will deadlock this pool: blocking waits inside a task are
//! fine, but one task must never wait synchronously for another task from
//! the same pool.

use super::future::{promise_pair, TaskFuture};
use super::task::{StopCallback, Task, TaskHints};
use super::worker::{self, WorkerId};
use crate::cancel::StopToken;
use crate::config::{default_capacity, Config};
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

/// Mutable pool state, guarded by the pool mutex.
pub(crate) struct PoolState {
    /// Tasks awaiting pickup, in submission order.
    pub(crate) pending_tasks: VecDeque<Task>,
    /// Live workers by id. A worker removes itself on exit.
    pub(crate) workers: HashMap<WorkerId, JoinHandle<()>>,
    /// Handles of exited workers awaiting join.
    pub(crate) finished_workers: Vec<JoinHandle<()>>,
    /// Tasks currently executing (outside the mutex).
    pub(crate) tasks_running: usize,
    next_worker_id: WorkerId,
}

/// State shared between the pool handle and its workers.
///
/// The capacity and shutdown flags live as atomics outside the mutex: the
/// single-threaded child of a fork must be able to read them even if a
/// parent thread died holding the mutex.
pub(crate) struct SharedState {
    pub(crate) lock: Mutex<PoolState>,
    pub(crate) task_available: Condvar,
    pub(crate) idle: Condvar,
    pub(crate) worker_finished: Condvar,
    pub(crate) desired_capacity: AtomicUsize,
    pub(crate) please_shutdown: AtomicBool,
    pub(crate) quick_shutdown: AtomicBool,
    thread_name_prefix: String,
    stack_size: Option<usize>,
}

impl SharedState {
    fn new(config: &Config, capacity: usize) -> Self {
        Self {
            lock: Mutex::new(PoolState {
                pending_tasks: VecDeque::new(),
                workers: HashMap::new(),
                finished_workers: Vec::new(),
                tasks_running: 0,
                next_worker_id: 0,
            }),
            task_available: Condvar::new(),
            idle: Condvar::new(),
            worker_finished: Condvar::new(),
            desired_capacity: AtomicUsize::new(capacity),
            please_shutdown: AtomicBool::new(false),
            quick_shutdown: AtomicBool::new(false),
            thread_name_prefix: config.thread_name_prefix.clone(),
            stack_size: config.stack_size,
        }
    }

    /// A fresh state carrying over the other's configuration and flags,
    /// for post-fork reinitialization.
    fn fresh_like(other: &SharedState, capacity: usize) -> Self {
        let state = SharedState::new(
            &Config {
                num_threads: Some(capacity),
                thread_name_prefix: other.thread_name_prefix.clone(),
                stack_size: other.stack_size,
            },
            capacity,
        );
        state
            .please_shutdown
            .store(other.please_shutdown.load(Ordering::Relaxed), Ordering::Relaxed);
        state
            .quick_shutdown
            .store(other.quick_shutdown.load(Ordering::Relaxed), Ordering::Relaxed);
        state
    }
}

/// A pool of worker threads for CPU-bound tasks.
///
/// See [`make`](ThreadPool::make), [`spawn`](ThreadPool::spawn) and
/// [`submit`](ThreadPool::submit). The pool shuts down on drop unless it
/// was constructed with [`make_internal`](ThreadPool::make_internal).
pub struct ThreadPool {
    // RwLock so fork protection can swap in a fresh state.
    state: RwLock<Arc<SharedState>>,
    shutdown_on_destroy: bool,
    creator_pid: AtomicU32,
}

impl ThreadPool {
    /// Construct a pool with `threads` desired workers.
    pub fn make(threads: usize) -> Result<Arc<ThreadPool>> {
        Self::build(
            Config {
                num_threads: Some(threads),
                ..Config::default()
            },
            true,
        )
    }

    /// Like [`make`](Self::make), but the returned pool survives its
    /// destructor without shutting down, making it safe to park in global
    /// state that is torn down late at process exit.
    pub fn make_internal(threads: usize) -> Result<Arc<ThreadPool>> {
        Self::build(
            Config {
                num_threads: Some(threads),
                ..Config::default()
            },
            false,
        )
    }

    /// Construct a pool from a full [`Config`].
    pub fn with_config(config: Config) -> Result<Arc<ThreadPool>> {
        Self::build(config, true)
    }

    fn build(config: Config, shutdown_on_destroy: bool) -> Result<Arc<ThreadPool>> {
        config.validate()?;
        let capacity = config.worker_threads();
        let state = Arc::new(SharedState::new(&config, capacity));
        {
            let mut st = state.lock.lock();
            Self::launch_workers_locked(&state, &mut st, capacity)?;
        }
        Ok(Arc::new(ThreadPool {
            state: RwLock::new(state),
            shutdown_on_destroy,
            creator_pid: AtomicU32::new(std::process::id()),
        }))
    }

    /// Spawn a fire-and-forget task.
    pub fn spawn<F>(&self, func: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_with_options(TaskHints::default(), StopToken::unstoppable(), None, func)
    }

    /// Spawn a fire-and-forget task with hints, a stop token, and an
    /// optional callback fired if the task is abandoned before running.
    pub fn spawn_with_options<F>(
        &self,
        hints: TaskHints,
        stop_token: StopToken,
        stop_callback: Option<StopCallback>,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Task::new(hints, func, stop_token, stop_callback))
    }

    /// Submit a task and get a [`TaskFuture`] for its result.
    ///
    /// Arguments are captured by the closure at submission time. An enqueue
    /// failure (pool shutting down) is this call's `Err`; the task's own
    /// value, panic, or cancellation travels through the future.
    pub fn submit<F, R>(&self, func: F) -> Result<TaskFuture<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit_with_options(TaskHints::default(), StopToken::unstoppable(), None, func)
    }

    /// Like [`submit`](Self::submit) with hints, a stop token, and an
    /// optional abandonment callback.
    ///
    /// If the task is abandoned (stop requested before pickup, or quick
    /// shutdown), the future completes with the cancellation status and the
    /// callback fires with the same status; the closure never runs.
    pub fn submit_with_options<F, R>(
        &self,
        hints: TaskHints,
        stop_token: StopToken,
        stop_callback: Option<StopCallback>,
        func: F,
    ) -> Result<TaskFuture<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (promise, future) = promise_pair();

        let completer = promise.clone();
        let work = move || {
            let result = catch_unwind(AssertUnwindSafe(func))
                .map_err(|payload| Error::TaskPanic(worker::panic_message(payload)));
            completer.set(result);
        };

        let callback: StopCallback = Box::new(move |error: &Error| {
            promise.set(Err(error.clone()));
            if let Some(user_callback) = stop_callback {
                user_callback(error);
            }
        });

        self.enqueue(Task::new(hints, work, stop_token, Some(callback)))?;
        Ok(future)
    }

    fn enqueue(&self, task: Task) -> Result<()> {
        let state = self.shared();
        let mut st = state.lock.lock();
        if state.please_shutdown.load(Ordering::Relaxed) {
            return Err(Error::shutdown("task submitted after shutdown"));
        }
        st.pending_tasks.push_back(task);
        drop(st);
        state.task_available.notify_one();
        Ok(())
    }

    /// The desired number of workers. The actual number may lag while a
    /// capacity change settles.
    pub fn capacity(&self) -> usize {
        self.shared().desired_capacity.load(Ordering::Relaxed)
    }

    /// Dynamically change the number of workers. Returns immediately:
    /// growth launches workers eagerly, shrink lets surplus workers exit at
    /// their next scheduling point.
    pub fn set_capacity(&self, threads: usize) -> Result<()> {
        let state = self.shared();
        let mut st = state.lock.lock();
        if state.please_shutdown.load(Ordering::Relaxed) {
            return Err(Error::shutdown("capacity change after shutdown"));
        }
        if threads == 0 {
            return Err(Error::invalid("capacity must be > 0"));
        }
        if threads > 1024 {
            return Err(Error::invalid("capacity too large (max 1024)"));
        }

        state.desired_capacity.store(threads, Ordering::Relaxed);
        let live = st.workers.len();
        if threads > live {
            Self::launch_workers_locked(&state, &mut st, threads - live)?;
        } else if threads < live {
            state.task_available.notify_all();
        }
        Self::collect_finished_locked(&mut st);
        Ok(())
    }

    /// The number of live worker threads (launched but not yet reaped).
    pub fn actual_capacity(&self) -> usize {
        let state = self.shared();
        let st = state.lock.lock();
        st.workers.len()
    }

    /// The number of tasks either queued or running.
    pub fn num_tasks(&self) -> usize {
        let state = self.shared();
        let st = state.lock.lock();
        st.pending_tasks.len() + st.tasks_running
    }

    /// Whether the calling thread is one of this pool's workers.
    pub fn owns_this_thread(&self) -> bool {
        let state = self.shared();
        worker::pool_marker() == Arc::as_ptr(&state) as usize
    }

    /// Block until the queue is empty and no task is running.
    ///
    /// Useful for sequencing tests. Must not be called while holding a
    /// resource the queued tasks need.
    pub fn wait_for_idle(&self) {
        let state = self.shared();
        let mut st = state.lock.lock();
        while !(st.pending_tasks.is_empty() && st.tasks_running == 0) {
            state.idle.wait(&mut st);
        }
    }

    /// Shut the pool down. Once shutdown begins, submissions fail.
    ///
    /// With `wait = true`, queued tasks drain before the workers exit. With
    /// `wait = false`, queued tasks are abandoned (their stop callbacks
    /// fire with a cancellation status) and workers exit as soon as their
    /// current task finishes. Either way this call returns only after every
    /// worker thread has been joined. Idempotent: a second call is a no-op
    /// returning `Ok`.
    pub fn shutdown(&self, wait: bool) -> Result<()> {
        let state = self.shared();
        let mut st = state.lock.lock();
        if state.please_shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }
        state.please_shutdown.store(true, Ordering::Relaxed);

        let mut abandoned: Vec<Task> = Vec::new();
        if !wait {
            state.quick_shutdown.store(true, Ordering::Relaxed);
            abandoned = st.pending_tasks.drain(..).collect();
        }
        state.task_available.notify_all();

        if !abandoned.is_empty() {
            // User callbacks never run under the pool mutex.
            drop(st);
            let reason = Error::cancelled("queued task abandoned by pool shutdown");
            for task in abandoned {
                task.abandon(&reason);
            }
            st = state.lock.lock();
        }

        while !st.workers.is_empty() {
            state.worker_finished.wait(&mut st);
        }
        Self::collect_finished_locked(&mut st);

        if st.pending_tasks.is_empty() && st.tasks_running == 0 {
            state.idle.notify_all();
        }
        Ok(())
    }

    /// Launch `count` additional workers. Caller holds the pool mutex, so a
    /// new worker cannot reach its own bookkeeping before it is inserted.
    fn launch_workers_locked(
        state: &Arc<SharedState>,
        st: &mut PoolState,
        count: usize,
    ) -> Result<()> {
        for _ in 0..count {
            let id = st.next_worker_id;
            st.next_worker_id += 1;

            let state_clone = Arc::clone(state);
            let mut builder =
                thread::Builder::new().name(format!("{}-{}", state.thread_name_prefix, id));
            if let Some(stack_size) = state.stack_size {
                builder = builder.stack_size(stack_size);
            }
            let handle = builder
                .spawn(move || worker::run(state_clone, id))
                .map_err(|e| Error::executor(format!("worker spawn failed: {e}")))?;
            st.workers.insert(id, handle);
        }
        Ok(())
    }

    /// Join exited workers, making sure the OS threads are gone. The
    /// threads being joined have already released the pool mutex for good.
    fn collect_finished_locked(st: &mut PoolState) {
        for handle in st.finished_workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// The current state, after fork protection.
    fn shared(&self) -> Arc<SharedState> {
        self.protect_against_fork();
        self.state.read().clone()
    }

    /// Reinitialize the pool if the process id changed.
    ///
    /// The child of a fork inherits our memory but none of the parent's
    /// threads; the old state's mutex may be held by a thread that no
    /// longer exists, and its heap structures may have been captured
    /// mid-mutation. Rebuild from the atomics mirrored outside the mutex
    /// and leak the rest.
    fn protect_against_fork(&self) {
        let pid = std::process::id();
        if self.creator_pid.load(Ordering::Acquire) == pid {
            return;
        }

        let mut slot = self.state.write();
        if self.creator_pid.load(Ordering::Acquire) == pid {
            // Another caller in the child got here first.
            return;
        }

        let old = slot.clone();
        let capacity = old.desired_capacity.load(Ordering::Relaxed);
        let fresh = Arc::new(SharedState::fresh_like(&old, capacity));
        if !fresh.please_shutdown.load(Ordering::Relaxed) {
            let mut st = fresh.lock.lock();
            // A spawn failure here leaves a smaller pool; the next capacity
            // change can grow it back.
            let _ = Self::launch_workers_locked(&fresh, &mut st, capacity);
        }
        *slot = fresh;
        std::mem::forget(old);
        self.creator_pid.store(pid, Ordering::Release);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if self.shutdown_on_destroy {
            let _ = self.shutdown(true);
        }
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read().clone();
        f.debug_struct("ThreadPool")
            .field(
                "desired_capacity",
                &state.desired_capacity.load(Ordering::Relaxed),
            )
            .field(
                "please_shutdown",
                &state.please_shutdown.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

// Process-global pool for CPU-bound tasks.
static CPU_POOL: OnceLock<Arc<ThreadPool>> = OnceLock::new();

/// The process-global pool for CPU-bound tasks, sized by
/// [`default_capacity`] on first use. Never shut down by a destructor; the
/// OS reclaims its threads at process exit.
pub fn cpu_thread_pool() -> &'static Arc<ThreadPool> {
    CPU_POOL.get_or_init(|| {
        ThreadPool::make_internal(default_capacity()).expect("default capacity is positive")
    })
}

/// The desired capacity of the global CPU pool.
pub fn cpu_thread_pool_capacity() -> usize {
    cpu_thread_pool().capacity()
}

/// Change the desired capacity of the global CPU pool.
pub fn set_cpu_thread_pool_capacity(threads: usize) -> Result<()> {
    cpu_thread_pool().set_capacity(threads)
}
