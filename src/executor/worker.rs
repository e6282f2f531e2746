// worker thread loop
use super::cpu_pool::SharedState;
use super::task::Task;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub(crate) type WorkerId = usize;

thread_local! {
    // Marks which pool state, if any, this thread belongs to.
    static CURRENT_POOL: Cell<usize> = const { Cell::new(0) };
}

/// The pool marker for the calling thread; 0 for non-worker threads.
pub(crate) fn pool_marker() -> usize {
    CURRENT_POOL.with(|marker| marker.get())
}

/// Main loop for one worker thread.
///
/// Exits on quick shutdown, when the worker set exceeds the desired
/// capacity, or when shutdown has begun and the queue has drained. On exit
/// the worker moves its own join handle to the finished list and signals
/// `worker_finished` so shutdown and capacity changes can reap it.
pub(crate) fn run(state: Arc<SharedState>, id: WorkerId) {
    CURRENT_POOL.with(|marker| marker.set(Arc::as_ptr(&state) as usize));

    let mut st = state.lock.lock();
    loop {
        if state.quick_shutdown.load(Ordering::Relaxed)
            || st.workers.len() > state.desired_capacity.load(Ordering::Relaxed)
        {
            break;
        }

        if let Some(task) = st.pending_tasks.pop_front() {
            st.tasks_running += 1;
            drop(st);

            execute(task);

            st = state.lock.lock();
            st.tasks_running -= 1;
            if st.tasks_running == 0 && st.pending_tasks.is_empty() {
                state.idle.notify_all();
            }
        } else if state.please_shutdown.load(Ordering::Relaxed) {
            break;
        } else {
            state.task_available.wait(&mut st);
        }
    }

    if let Some(handle) = st.workers.remove(&id) {
        st.finished_workers.push(handle);
    }
    drop(st);
    state.worker_finished.notify_all();
}

/// Run one task, honoring its stop token.
///
/// The token is polled once before the user closure starts; a stop
/// requested after that point is the closure's own business to observe.
fn execute(task: Task) {
    match task.stop_status() {
        Ok(()) => {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task.invoke())) {
                // A fire-and-forget task panicked; the worker survives.
                // Submitted tasks catch their own panics and report them
                // through their future instead.
                eprintln!("strand: task panicked: {}", panic_message(payload));
            }
        }
        Err(error) => task.abandon(&error),
    }
}

/// Extract a displayable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
