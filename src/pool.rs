//! Fixed-size worker pool bounding concurrent fetches.
//!
//! A [`WorkerPool`] starts `W` long-lived worker tasks that pull jobs from a
//! shared queue, so at most `W` jobs execute at any instant no matter how fast
//! the session submits them. Submitting never waits for a job to finish.
//!
//! A job that panics is caught by its worker, logged, and does not take the
//! worker (or the pool) down with it. The [`InFlightCounter`] slot a job
//! occupies is released by a guard on every exit path.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::FutureExt;
use futures_util::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Minimum allowed worker count.
const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
const MAX_WORKERS: usize = 100;

/// Default worker count if not specified.
pub const DEFAULT_WORKERS: usize = 20;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Error type for worker pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Invalid worker count provided.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidSize {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The pool no longer accepts jobs.
    #[error("worker pool is closed")]
    Closed,
}

/// Counts jobs currently executing and remembers the peak.
#[derive(Debug, Clone, Default)]
pub struct InFlightCounter {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl InFlightCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one job as started; the returned guard marks it finished on drop.
    #[must_use]
    pub fn enter(&self) -> InFlightGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard {
            current: Arc::clone(&self.current),
        }
    }

    /// Jobs executing right now.
    #[must_use]
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest number of jobs ever executing at once.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Releases an [`InFlightCounter`] slot when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    current: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A fixed set of workers executing submitted jobs.
///
/// # Concurrency Model
///
/// - `W` workers share one unbounded job queue
/// - An idle worker takes the next job and runs it to completion
/// - Closing the queue lets the workers drain it and exit
#[derive(Debug)]
pub struct WorkerPool {
    sender: mpsc::UnboundedSender<Job>,
    workers: Vec<JoinHandle<()>>,
    in_flight: InFlightCounter,
}

impl WorkerPool {
    /// Starts a pool with `size` workers.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidSize`] if `size` is outside `1..=100`.
    pub fn new(size: usize) -> Result<Self, PoolError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&size) {
            return Err(PoolError::InvalidSize { value: size });
        }

        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let in_flight = InFlightCounter::new();

        let workers = (0..size)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&receiver),
                    in_flight.clone(),
                ))
            })
            .collect();

        debug!(workers = size, "worker pool started");
        Ok(Self {
            sender,
            workers,
            in_flight,
        })
    }

    /// Number of workers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// The in-flight counter shared by every worker.
    #[must_use]
    pub fn in_flight(&self) -> &InFlightCounter {
        &self.in_flight
    }

    /// Queues a job without waiting for it to run.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] if every worker has exited.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.sender
            .send(Box::pin(job))
            .map_err(|_| PoolError::Closed)
    }

    /// Closes the queue and waits until every queued job has run.
    pub async fn join(self) {
        let Self {
            sender, workers, ..
        } = self;
        drop(sender);
        join_all(workers).await;
    }

    /// Closes the queue and waits for the workers, unless `cancel` fires
    /// first, in which case every worker (and the job it runs) is aborted.
    ///
    /// Returns true if all jobs completed, false if cancelled.
    pub async fn join_or_cancel(self, cancel: &CancellationToken) -> bool {
        let Self {
            sender, workers, ..
        } = self;
        drop(sender);

        let aborts: Vec<_> = workers.iter().map(JoinHandle::abort_handle).collect();
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                for handle in &aborts {
                    handle.abort();
                }
                debug!(workers = aborts.len(), "worker pool aborted");
                false
            }
            _ = join_all(workers) => true,
        }
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    in_flight: InFlightCounter,
) {
    loop {
        // Only one idle worker waits on the queue at a time.
        let next = receiver.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };

        let _slot = in_flight.enter();
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            warn!(worker = id, "job panicked");
        }
    }
}
