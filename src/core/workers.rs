//! Thread pools for decode jobs
//!
//! [`Workers`] runs jobs on a fixed set of threads using work-stealing deques:
//! - Jobs pushed to a global injector
//! - Idle workers steal from each other
//! - Zero lock contention between workers
//!
//! [`InlinePool`] runs every job on the caller's thread (cooperative mode).
//!
//! Cancellation is not the pool's business: jobs check their sequence epoch
//! themselves (see `core::task`).

use crossbeam::deque::{Injector, Stealer, Worker};
use log::trace;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::entities::traits::{Job, WorkerPool};

/// Work-stealing worker pool.
///
/// # Example
/// ```ignore
/// let workers = Workers::new(4)?;
/// workers.execute(Box::new(move || {
///     // runs on a worker thread
/// }));
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Spawn `num_threads` worker threads (at least one).
    pub fn new(num_threads: usize) -> std::io::Result<Self> {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let workers_local: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = workers_local.iter().map(|w| w.stealer()).collect();

        let mut pool = Self {
            injector,
            handles: Vec::with_capacity(num_threads),
            shutdown,
        };

        for (worker_id, worker) in workers_local.into_iter().enumerate() {
            let injector = Arc::clone(&pool.injector);
            let shutdown = Arc::clone(&pool.shutdown);
            let stealers = stealers.clone();

            // On spawn failure `pool` drops here and stops the threads already running
            let handle = thread::Builder::new()
                .name(format!("geoseq-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, worker, &injector, &stealers, &shutdown))?;

            pool.handles.push(handle);
        }

        trace!("Workers initialized: {} threads (work-stealing)", num_threads);
        Ok(pool)
    }
}

fn run_worker(
    worker_id: usize,
    worker: Worker<Job>,
    injector: &Injector<Job>,
    stealers: &[Stealer<Job>],
    shutdown: &AtomicBool,
) {
    trace!("Worker {} started", worker_id);

    loop {
        // 1. Own queue
        if let Some(job) = worker.pop() {
            job();
            continue;
        }

        // 2. Global injector, moving a batch into the local queue
        if let Some(job) = injector.steal_batch_and_pop(&worker).success() {
            job();
            continue;
        }

        // 3. Other workers
        if let Some(job) = stealers.iter().find_map(|s| s.steal().success()) {
            job();
            continue;
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        // No work: short sleep instead of spinning
        thread::sleep(Duration::from_millis(1));
    }

    trace!("Worker {} stopped", worker_id);
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        self.shutdown.store(true, Ordering::SeqCst);

        // Queued jobs of closed sequences are epoch-skipped, so this drains fast.
        // The deadline only guards against a job stuck in I/O.
        let deadline = Instant::now() + Duration::from_millis(500);

        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, exiting anyway");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} workers stopped gracefully", num_threads);
    }
}

impl WorkerPool for Workers {
    fn execute(&self, job: Job) {
        self.injector.push(job);
    }

    fn threads(&self) -> usize {
        self.handles.len()
    }
}

/// Runs every job synchronously inside `execute`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlinePool;

impl WorkerPool for InlinePool {
    fn execute(&self, job: Job) {
        job();
    }

    fn threads(&self) -> usize {
        0
    }
}

/// Test pool that holds jobs until released, for observing in-flight states.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct QueuedPool {
    pending: std::sync::Mutex<std::collections::VecDeque<Job>>,
}

#[cfg(test)]
impl QueuedPool {
    /// Run every queued job on the calling thread, returns how many ran
    pub fn run_pending(&self) -> usize {
        let jobs: Vec<Job> = self.pending.lock().unwrap().drain(..).collect();
        let n = jobs.len();
        for job in jobs {
            job();
        }
        n
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[cfg(test)]
impl WorkerPool for QueuedPool {
    fn execute(&self, job: Job) {
        self.pending.lock().unwrap().push_back(job);
    }

    fn threads(&self) -> usize {
        1
    }
}
