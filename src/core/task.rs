//! Completion handles for decode jobs
//!
//! A job's result travels back over a one-shot channel. The scheduler polls
//! with [`TaskHandle::is_done`] (never blocks) and only blocks in
//! [`TaskHandle::wait`] during teardown.
//!
//! Jobs spawned through [`TaskHandle::spawn`] check the sequence [`Epoch`]
//! when they start: a job queued before the sequence was closed does nothing
//! and reports [`StreamError::TaskAborted`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use log::{error, trace};

use crate::entities::traits::WorkerPool;
use crate::error::{Result, StreamError};

/// Shared generation counter of an open sequence.
///
/// Bumped on close/reload; jobs carrying an older value are skipped.
#[derive(Debug, Clone, Default)]
pub struct Epoch(Arc<AtomicU64>);

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Invalidate every job spawned so far, returns the new epoch
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.current() == epoch
    }
}

/// Handle to the eventual result of one background job
pub struct TaskHandle<T> {
    rx: Receiver<Result<T>>,
    result: Option<Result<T>>,
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Queue `f` on `pool`, tagged with the current epoch.
    pub fn spawn<F>(pool: &dyn WorkerPool, epoch: &Epoch, f: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let epoch = epoch.clone();
        let tag = epoch.current();

        pool.execute(Box::new(move || {
            if !epoch.is_current(tag) {
                trace!("Skipping stale job (epoch {} != {})", tag, epoch.current());
                return;
            }
            match catch_unwind(AssertUnwindSafe(f)) {
                Ok(result) => {
                    // Receiver may be gone already (sequence torn down)
                    let _ = tx.send(result);
                }
                Err(_) => error!("Decode job panicked"),
            }
        }));

        Self { rx, result: None }
    }
}

impl<T> TaskHandle<T> {
    /// Handle that is already complete (used when no work needs scheduling)
    pub fn ready(result: Result<T>) -> Self {
        let (_, rx) = bounded(1);
        Self {
            rx,
            result: Some(result),
        }
    }

    /// Non-blocking completion check.
    pub fn is_done(&mut self) -> bool {
        if self.result.is_some() {
            return true;
        }
        match self.rx.try_recv() {
            Ok(result) => {
                self.result = Some(result);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.result = Some(Err(StreamError::TaskAborted));
                true
            }
        }
    }

    /// Block until the job has finished or was dropped.
    pub fn wait(&mut self) {
        if self.result.is_none() {
            let result = self.rx.recv().unwrap_or(Err(StreamError::TaskAborted));
            self.result = Some(result);
        }
    }

    /// Wait for and return the job result.
    pub fn take(mut self) -> Result<T> {
        self.wait();
        self.result.take().unwrap_or(Err(StreamError::TaskAborted))
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("done", &self.result.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::workers::{InlinePool, QueuedPool, Workers};

    #[test]
    fn test_inline_task_completes_immediately() {
        let epoch = Epoch::new();
        let mut task = TaskHandle::spawn(&InlinePool, &epoch, || Ok(21 * 2));
        assert!(task.is_done());
        assert_eq!(task.take().unwrap(), 42);
    }

    #[test]
    fn test_queued_task_polls_without_blocking() {
        let pool = QueuedPool::default();
        let epoch = Epoch::new();
        let mut task = TaskHandle::spawn(&pool, &epoch, || Ok("done"));
        assert!(!task.is_done());
        assert_eq!(pool.run_pending(), 1);
        assert!(task.is_done());
        assert_eq!(task.take().unwrap(), "done");
    }

    #[test]
    fn test_stale_epoch_skips_job() {
        let pool = QueuedPool::default();
        let epoch = Epoch::new();
        let ran = Arc::new(AtomicU64::new(0));
        let ran2 = Arc::clone(&ran);
        let mut task = TaskHandle::spawn(&pool, &epoch, move || {
            ran2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        epoch.bump();
        pool.run_pending();

        assert!(task.is_done());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(matches!(task.take(), Err(StreamError::TaskAborted)));
    }

    #[test]
    fn test_panicking_job_reports_aborted() {
        let epoch = Epoch::new();
        let task: TaskHandle<()> = TaskHandle::spawn(&InlinePool, &epoch, || panic!("boom"));
        assert!(matches!(task.take(), Err(StreamError::TaskAborted)));
    }

    #[test]
    fn test_task_on_threads() {
        let workers = Workers::new(2).unwrap();
        let epoch = Epoch::new();
        let tasks: Vec<_> = (0..16u32)
            .map(|i| TaskHandle::spawn(&workers, &epoch, move || Ok(i * i)))
            .collect();
        let sum: u32 = tasks.into_iter().map(|t| t.take().unwrap()).sum();
        assert_eq!(sum, (0..16u32).map(|i| i * i).sum::<u32>());
    }

    #[test]
    fn test_ready_handle() {
        let mut task = TaskHandle::ready(Ok(5));
        assert!(task.is_done());
        assert_eq!(task.take().unwrap(), 5);
    }
}
