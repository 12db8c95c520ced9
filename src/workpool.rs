//! Work-distribution primitive.
//!
//! Every parallel stage in this crate — k-means assignment, residual
//! computation, indexing, batch query — goes through [`run`]: a shared
//! atomic counter hands out task indices `0..n` to `nthreads` workers,
//! and a single mutex is threaded through for stages that need to
//! serialize access to a shared stream (reading the next descriptor
//! file, appending to a shared output). There is no work-stealing queue
//! and no async runtime — just a flat claim-and-go counter.
//!
//! Worker ids are stable: worker `t` sees `worker_id == t` for every task
//! it claims, so callers can index per-thread scratch buffers (e.g. the
//! PQ asymmetric distance table) by `worker_id` without any locking.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{IvfadcError, Result};

/// Runs `task` once for every `i` in `0..n`, spread across `nthreads` workers.
///
/// `task(worker_id, i, lock)` receives the claiming worker's stable id, the
/// claimed task index, and a reference to the shared mutex for any
/// caller-defined critical section. No ordering across `i` is guaranteed.
///
/// A panic inside `task` aborts the stage: it is not retried, and `run`
/// returns `IvfadcError::Worker` describing which worker failed (unless the
/// process itself is built with `panic = "abort"`, in which case the whole
/// process terminates immediately — both are "the stage does not continue").
pub fn run<F>(n: usize, nthreads: usize, task: F) -> Result<()>
where
    F: Fn(usize, usize, &Mutex<()>) + Sync + Send,
{
    if n == 0 {
        return Ok(());
    }

    let nthreads = nthreads.max(1);
    let lock = Arc::new(Mutex::new(()));

    if nthreads == 1 {
        for i in 0..n {
            task(0, i, &lock);
        }
        return Ok(());
    }

    let counter = Arc::new(AtomicUsize::new(0));
    let task = Arc::new(task);

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(nthreads);
        for worker_id in 0..nthreads {
            let counter = Arc::clone(&counter);
            let lock = Arc::clone(&lock);
            let task = Arc::clone(&task);
            handles.push(scope.spawn(move || loop {
                let i = counter.fetch_add(1, Ordering::Relaxed);
                if i >= n {
                    break;
                }
                task(worker_id, i, &lock);
            }));
        }

        for (worker_id, handle) in handles.into_iter().enumerate() {
            if let Err(payload) = handle.join() {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                return Err(IvfadcError::Worker(format!(
                    "worker {worker_id} panicked: {msg}"
                )));
            }
        }
        Ok(())
    })
}
