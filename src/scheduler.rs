//! # Work Scheduler
//!
//! A small pool of worker threads fed through a bounded queue, used by the
//! build orchestrator to fan out per-instance generation.
//!
//! ## Behaviour
//!
//! - **Bounded queue**: [`Runner::submit`] blocks once `queue` jobs are waiting
//! - **First error wins**: after a job fails, queued jobs are drained without
//!   being invoked and further submissions are dropped; jobs already running
//!   finish and their results are discarded
//! - **Panics are errors**: a panicking job is caught and reported like any
//!   other failure
//! - **No ordering**: results come back in completion order
//!
//! [`Runner::unbounded`] spawns one thread per job, for short I/O fan-outs.

use anyhow::anyhow;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// A unit of work.
pub type Job<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send + 'static>;

/// Number of CPUs, falling back to 1 when it cannot be determined.
pub fn cpu_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Counters for one runner
#[derive(Debug, Default)]
pub struct RunnerMetrics {
    /// Jobs accepted by `submit`
    pub submitted: AtomicU64,
    /// Jobs that ran to completion, successfully or not
    pub completed: AtomicU64,
    /// Jobs dropped or drained after cancellation
    pub skipped: AtomicU64,
}

impl RunnerMetrics {
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// State shared between the runner and its workers.
struct Shared<T> {
    results: Mutex<Vec<T>>,
    first_error: Mutex<Option<anyhow::Error>>,
    cancelled: AtomicBool,
    metrics: RunnerMetrics,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            results: Mutex::new(Vec::new()),
            first_error: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            metrics: RunnerMetrics::default(),
        }
    }

    fn run(&self, job: Job<T>) {
        if self.cancelled.load(Ordering::Acquire) {
            self.metrics.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let outcome = match catch_unwind(AssertUnwindSafe(job)) {
            Ok(outcome) => outcome,
            Err(panic) => Err(anyhow!("job panicked: {}", panic_message(&*panic))),
        };
        self.metrics.completed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Ok(value) => self.results.lock().push(value),
            Err(err) => {
                let mut first = self.first_error.lock();
                if first.is_none() {
                    error!(error = %format!("{err:#}"), "job failed, cancelling remaining work");
                    *first = Some(err);
                }
                self.cancelled.store(true, Ordering::Release);
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

enum Mode<T> {
    Bounded {
        sender: Option<SyncSender<Job<T>>>,
        workers: Vec<JoinHandle<()>>,
    },
    Unbounded {
        tasks: Vec<JoinHandle<()>>,
    },
}

/// Parallel job runner with first-error cancellation.
pub struct Runner<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    mode: Mode<T>,
}

impl<T: Send + 'static> Runner<T> {
    /// `parallelism` workers consuming a queue holding at most `queue` jobs.
    pub fn bounded(queue: usize, parallelism: usize) -> anyhow::Result<Self> {
        let parallelism = parallelism.max(1);
        let (sender, receiver) = sync_channel::<Job<T>>(queue.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let shared = Arc::new(Shared::new());

        debug!(queue, parallelism, "starting runner");
        let mut workers = Vec::with_capacity(parallelism);
        for worker_id in 0..parallelism {
            let receiver: Arc<Mutex<Receiver<Job<T>>>> = Arc::clone(&receiver);
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("gatewaygen-worker-{worker_id}"))
                .spawn(move || loop {
                    // The lock is released before the job runs.
                    let next = receiver.lock().recv();
                    match next {
                        Ok(job) => shared.run(job),
                        Err(_) => break,
                    }
                })?;
            workers.push(handle);
        }

        Ok(Self {
            shared,
            mode: Mode::Bounded {
                sender: Some(sender),
                workers,
            },
        })
    }

    /// One worker per CPU, or four per CPU for I/O-bound work.
    pub fn fixed_bounded(queue: usize, io_bound: bool) -> anyhow::Result<Self> {
        let factor = if io_bound { 4 } else { 1 };
        Self::bounded(queue, cpu_count() * factor)
    }

    /// One thread per job.
    pub fn unbounded() -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            mode: Mode::Unbounded { tasks: Vec::new() },
        }
    }

    pub fn metrics(&self) -> &RunnerMetrics {
        &self.shared.metrics
    }

    /// Whether a job has failed.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Queue a job. Blocks while a bounded queue is full; once cancelled the
    /// job is dropped.
    pub fn submit<F>(&mut self, job: F) -> anyhow::Result<()>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        if self.is_cancelled() {
            self.shared.metrics.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        self.shared.metrics.submitted.fetch_add(1, Ordering::Relaxed);
        match &mut self.mode {
            Mode::Bounded { sender, .. } => {
                let sender = sender
                    .as_ref()
                    .ok_or_else(|| anyhow!("runner is already closed"))?;
                sender
                    .send(Box::new(job))
                    .map_err(|_| anyhow!("all workers have exited"))?;
            }
            Mode::Unbounded { tasks } => {
                let shared = Arc::clone(&self.shared);
                let handle = thread::Builder::new()
                    .name("gatewaygen-task".to_string())
                    .spawn(move || shared.run(Box::new(job)))?;
                tasks.push(handle);
            }
        }
        Ok(())
    }

    /// Close the queue, wait for every worker, and return all results or the
    /// first error.
    pub fn collect(mut self) -> anyhow::Result<Vec<T>> {
        let handles = match &mut self.mode {
            Mode::Bounded { sender, workers } => {
                sender.take();
                std::mem::take(workers)
            }
            Mode::Unbounded { tasks } => std::mem::take(tasks),
        };
        for handle in handles {
            if handle.join().is_err() {
                return Err(anyhow!("worker thread panicked outside a job"));
            }
        }
        if let Some(err) = self.shared.first_error.lock().take() {
            return Err(err);
        }
        Ok(std::mem::take(&mut *self.shared.results.lock()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn test_collects_all_results() {
        let mut runner = Runner::bounded(4, 3).unwrap();
        for i in 0..20u32 {
            runner.submit(move || Ok(i * 2)).unwrap();
        }
        let mut results = runner.collect().unwrap();
        results.sort();
        assert_eq!(results, (0..20).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_first_error_drains_queue() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = channel::<()>();
        let release_rx = Arc::new(std::sync::Mutex::new(release_rx));

        let mut runner: Runner<()> = Runner::bounded(16, 1).unwrap();
        {
            let release_rx = Arc::clone(&release_rx);
            runner
                .submit(move || {
                    // Hold the single worker until the queue is filled.
                    release_rx.lock().unwrap().recv().ok();
                    anyhow::bail!("boom")
                })
                .unwrap();
        }
        for _ in 0..10 {
            let invoked = Arc::clone(&invoked);
            runner
                .submit(move || {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }
        release_tx.send(()).unwrap();

        let err = runner.collect().unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_submit_after_failure_is_dropped() {
        let mut runner: Runner<u32> = Runner::bounded(1, 1).unwrap();
        runner.submit(|| anyhow::bail!("first")).unwrap();
        while !runner.is_cancelled() {
            thread::sleep(Duration::from_millis(1));
        }
        runner.submit(|| Ok(1)).unwrap();
        assert_eq!(runner.metrics().skipped(), 1);
        assert!(runner.collect().is_err());
    }

    #[test]
    fn test_panic_becomes_error() {
        let mut runner: Runner<()> = Runner::bounded(2, 2).unwrap();
        runner.submit(|| panic!("kaboom")).unwrap();
        let err = runner.collect().unwrap_err();
        assert!(err.to_string().contains("kaboom"), "{err}");
    }

    #[test]
    fn test_unbounded_runs_every_job() {
        let mut runner = Runner::unbounded();
        for i in 0..8 {
            runner.submit(move || Ok(i)).unwrap();
        }
        assert_eq!(runner.metrics().submitted(), 8);
        let mut results = runner.collect().unwrap();
        results.sort();
        assert_eq!(results, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_fixed_bounded_and_empty_collect() {
        let runner: Runner<()> = Runner::fixed_bounded(8, true).unwrap();
        assert!(runner.collect().unwrap().is_empty());
        assert!(cpu_count() >= 1);
    }
}
