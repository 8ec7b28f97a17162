//! Fixed-size work queue with push / wait batches.
//!
//! A [`WorkQueue`] owns a rayon pool of exactly `num_threads` workers and is
//! constructed once, then passed by reference to whatever needs parallel
//! dispatch. Work is grouped into a [`Batch`]:
//!
//! - [`Batch::push`] replicates one closure to every worker (it receives the
//!   worker index),
//! - [`Batch::push_parts`] enqueues one job per explicit partition,
//! - [`Batch::wait`] runs every queued job and returns only once all of them
//!   have finished.
//!
//! Each job writes its outcome into its own slot of the batch report, so no
//! two workers ever share a result location. Panics are caught and recorded
//! as [`StructMvError::WorkerPanicked`]; a failure never escapes a worker as a
//! fault. Only one batch may be open per queue; opening a second one blocks
//! until the first completes.

use crate::struct_error::StructMvError;
use parking_lot::{Mutex, MutexGuard};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Default worker count.
pub const NUM_THREADS: usize = 4;

/// Observable queue lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum QueueState {
    Idle = 0,
    Dispatching = 1,
    Draining = 2,
}

impl QueueState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => QueueState::Dispatching,
            2 => QueueState::Draining,
            _ => QueueState::Idle,
        }
    }
}

/// Work queue configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub num_threads: usize,
    pub thread_name_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            num_threads: NUM_THREADS,
            thread_name_prefix: "struct-mv-worker".into(),
        }
    }
}

type Job<'env> = Box<dyn FnOnce() -> Result<(), StructMvError> + Send + 'env>;

/// Pool of `num_threads` workers plus batch bookkeeping.
pub struct WorkQueue {
    pool: ThreadPool,
    num_threads: usize,
    gate: Mutex<()>,
    state: AtomicU8,
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("num_threads", &self.num_threads)
            .field("state", &self.state())
            .finish()
    }
}

impl WorkQueue {
    /// Pool with `num_threads` workers and default naming.
    pub fn new(num_threads: usize) -> Result<Self, StructMvError> {
        Self::from_config(&QueueConfig {
            num_threads,
            ..QueueConfig::default()
        })
    }

    /// Build a pool from configuration.
    ///
    /// # Errors
    /// `InvalidConfig` if `num_threads == 0` or the pool cannot be started.
    pub fn from_config(cfg: &QueueConfig) -> Result<Self, StructMvError> {
        if cfg.num_threads == 0 {
            return Err(StructMvError::InvalidConfig(
                "work queue needs at least one worker".into(),
            ));
        }
        let prefix = cfg.thread_name_prefix.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(cfg.num_threads)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .build()
            .map_err(|e| StructMvError::InvalidConfig(e.to_string()))?;
        log::debug!("work queue started with {} workers", cfg.num_threads);
        Ok(Self {
            pool,
            num_threads: cfg.num_threads,
            gate: Mutex::new(()),
            state: AtomicU8::new(QueueState::Idle as u8),
        })
    }

    #[inline]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Current lifecycle state.
    pub fn state(&self) -> QueueState {
        QueueState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, s: QueueState) {
        self.state.store(s as u8, Ordering::Release);
    }

    /// Open a batch, blocking while another batch is outstanding.
    ///
    /// Opening a second batch from the thread that holds the first one
    /// deadlocks; finish (or drop) the first batch before opening another.
    /// Jobs must not open batches on the queue that runs them: the outer
    /// batch holds the gate until they return.
    pub fn batch<'env>(&self) -> Batch<'_, 'env> {
        let gate = self.gate.lock();
        self.open(gate)
    }

    /// Open a batch unless one is already outstanding.
    pub fn try_batch<'env>(&self) -> Option<Batch<'_, 'env>> {
        self.gate.try_lock().map(|gate| self.open(gate))
    }

    fn open<'q, 'env>(&'q self, gate: MutexGuard<'q, ()>) -> Batch<'q, 'env> {
        self.set_state(QueueState::Dispatching);
        Batch {
            queue: self,
            _gate: gate,
            jobs: Vec::new(),
        }
    }

    /// Dispatch one job per part, wait, and surface the first failure.
    ///
    /// # Errors
    /// `InvalidConfig` when called from one of this queue's own workers.
    pub fn run_parts<'env, T, F>(&self, parts: Vec<T>, work: F) -> Result<(), StructMvError>
    where
        T: Send + 'env,
        F: Fn(usize, T) -> Result<(), StructMvError> + Send + Sync + 'env,
    {
        if self.pool.current_thread_index().is_some() {
            return Err(StructMvError::InvalidConfig(
                "work queue cannot dispatch from inside its own workers".into(),
            ));
        }
        let mut batch = self.batch();
        batch.push_parts(parts, work);
        batch.wait().into_result()
    }
}

/// An open dispatch batch. Jobs run when [`Batch::wait`] is called.
pub struct Batch<'q, 'env> {
    queue: &'q WorkQueue,
    _gate: MutexGuard<'q, ()>,
    jobs: Vec<Job<'env>>,
}

impl<'q, 'env> Batch<'q, 'env> {
    /// Enqueue `work(worker)` once per worker.
    pub fn push<F>(&mut self, work: F)
    where
        F: Fn(usize) -> Result<(), StructMvError> + Send + Sync + 'env,
    {
        let work = Arc::new(work);
        for worker in 0..self.queue.num_threads {
            let work = Arc::clone(&work);
            self.jobs.push(Box::new(move || work(worker)));
        }
    }

    /// Enqueue `work(i, part)` for every part; the caller owns the
    /// partitioning and guarantees parts are disjoint.
    pub fn push_parts<T, F>(&mut self, parts: Vec<T>, work: F)
    where
        T: Send + 'env,
        F: Fn(usize, T) -> Result<(), StructMvError> + Send + Sync + 'env,
    {
        let work = Arc::new(work);
        for (i, part) in parts.into_iter().enumerate() {
            let work = Arc::clone(&work);
            self.jobs.push(Box::new(move || work(i, part)));
        }
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Run every queued job and block until all have finished.
    pub fn wait(mut self) -> BatchReport {
        let jobs = std::mem::take(&mut self.jobs);
        self.queue.set_state(QueueState::Draining);
        log::trace!(
            "draining {} jobs on {} workers",
            jobs.len(),
            self.queue.num_threads
        );
        let mut results: Vec<Result<(), StructMvError>> = vec![Ok(()); jobs.len()];
        self.queue.pool.scope(|s| {
            for (worker, (job, slot)) in jobs.into_iter().zip(results.iter_mut()).enumerate() {
                s.spawn(move |_| {
                    *slot = match panic::catch_unwind(AssertUnwindSafe(job)) {
                        Ok(r) => r,
                        Err(payload) => Err(StructMvError::WorkerPanicked {
                            worker,
                            message: panic_message(payload.as_ref()),
                        }),
                    };
                });
            }
        });
        BatchReport { results }
    }
}

impl Drop for Batch<'_, '_> {
    fn drop(&mut self) {
        if !self.jobs.is_empty() {
            log::warn!("dropping batch with {} jobs never run", self.jobs.len());
        }
        self.queue.set_state(QueueState::Idle);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}

/// Per-batch result record: one slot per job, in push order.
#[derive(Debug, Clone)]
pub struct BatchReport {
    results: Vec<Result<(), StructMvError>>,
}

impl BatchReport {
    /// Per-job outcomes.
    pub fn results(&self) -> &[Result<(), StructMvError>] {
        &self.results
    }

    /// `(job index, error)` for every failed job.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &StructMvError)> + '_ {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }

    /// First failure by job order, if any.
    pub fn into_result(self) -> Result<(), StructMvError> {
        self.results.into_iter().collect()
    }
}
