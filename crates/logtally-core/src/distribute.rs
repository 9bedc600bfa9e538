//! Fan-out/fan-in worker pool over whole files.
//!
//! ```text
//!  scan_dir ──► feeder ──► work queue (bounded, P slots)
//!                               │
//!             ┌─────────────────┼─────────────────┐
//!             ▼                 ▼                 ▼
//!      tally-worker-0    tally-worker-1   …  tally-worker-P-1
//!             │                 │                 │
//!             └──────── result channel ───────────┘
//!                               │
//!                               ▼
//!                   coordinator: Reducer::fold
//! ```
//!
//! A file is the unit of work: its lines are never split across workers.
//! Idle workers pull the next path from the shared queue, so uneven file
//! sizes balance out on their own. The queue holds at most P paths, which
//! keeps the directory listing lazy. The coordinator folds each partial
//! table as soon as it arrives, so at most P partials are alive at once.
//!
//! With one worker everything runs on the calling thread.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::aggregate::{FileTally, tally_stream};
use crate::config::{ErrorPolicy, TallyConfig};
use crate::error::TallyError;
use crate::reduce::{Merge, Reducer};
use crate::stream::LineStream;
use crate::summary::{FailureReport, RunStats, RunSummary};

type FileOutcome = Result<FileTally, TallyError>;

/// Bounded pool of file workers.
#[derive(Debug, Clone)]
pub struct Distributor {
    workers: NonZeroUsize,
    policy: ErrorPolicy,
    failure_samples: usize,
}

impl Distributor {
    #[must_use]
    pub fn new(config: &TallyConfig) -> Self {
        Self {
            workers: config.resolved_workers(),
            policy: config.error_policy,
            failure_samples: config.failure_samples,
        }
    }

    /// Override the pool size.
    #[must_use]
    pub const fn with_workers(mut self, workers: NonZeroUsize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers.get()
    }

    #[must_use]
    pub const fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Tally every file produced by `files` and reduce the results.
    ///
    /// `files` is pulled lazily, at most one path ahead of each worker.
    ///
    /// # Errors
    ///
    /// Under [`ErrorPolicy::FailFast`], the first error from any file aborts
    /// the run. Under [`ErrorPolicy::Isolate`], line and file errors are
    /// recorded in the summary instead. Directory listing failures and
    /// worker failures abort the run under either policy.
    pub fn run<I>(&self, files: I) -> Result<RunSummary, TallyError>
    where
        I: IntoIterator<Item = Result<PathBuf, TallyError>>,
        I::IntoIter: Send,
    {
        let started = Instant::now();
        let mut collector = Collector::new(self.policy, self.failure_samples);

        if self.workers.get() == 1 {
            self.run_sequential(files, &mut collector)?;
        } else {
            self.run_parallel(files.into_iter(), &mut collector)?;
        }

        let summary = collector.finish(started);
        info!(
            workers = self.workers.get(),
            files = summary.stats.files,
            lines = summary.stats.lines,
            skipped_lines = summary.stats.skipped_lines,
            failed_files = summary.stats.failed_files,
            elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
            "tally complete"
        );
        Ok(summary)
    }

    fn run_sequential<I>(&self, files: I, collector: &mut Collector) -> Result<(), TallyError>
    where
        I: IntoIterator<Item = Result<PathBuf, TallyError>>,
    {
        let cancel = AtomicBool::new(false);
        for path in files {
            let outcome = path.and_then(|path| self.process_file(path, &cancel));
            collector.absorb(outcome)?;
        }
        Ok(())
    }

    fn run_parallel<I>(&self, files: I, collector: &mut Collector) -> Result<(), TallyError>
    where
        I: Iterator<Item = Result<PathBuf, TallyError>> + Send,
    {
        let workers = self.workers.get();
        let cancel = AtomicBool::new(false);
        let (work_tx, work_rx) = crossbeam_channel::bounded::<PathBuf>(workers);
        let (result_tx, result_rx) = crossbeam_channel::bounded::<FileOutcome>(workers);

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for worker_idx in 0..workers {
                let name = format!("tally-worker-{worker_idx}");
                let rx = work_rx.clone();
                let tx = result_tx.clone();
                let cancel = &cancel;
                let spawned = thread::Builder::new()
                    .name(name.clone())
                    .spawn_scoped(scope, move || self.worker_loop(&rx, &tx, cancel));
                match spawned {
                    Ok(handle) => handles.push((name, handle)),
                    Err(source) => {
                        // Workers already running exit once the queue disconnects.
                        cancel.store(true, Ordering::Relaxed);
                        drop(work_tx);
                        return Err(TallyError::WorkerSpawn(source));
                    }
                }
            }

            // Drop the coordinator's clones so disconnection is driven by
            // worker and feeder exits.
            drop(work_rx);
            let feeder_tx = result_tx.clone();
            drop(result_tx);

            let feeder = thread::Builder::new()
                .name("tally-feeder".to_string())
                .spawn_scoped(scope, {
                    let cancel = &cancel;
                    move || feed(files, &work_tx, &feeder_tx, cancel)
                });
            let feeder = match feeder {
                Ok(handle) => handle,
                Err(source) => {
                    cancel.store(true, Ordering::Relaxed);
                    return Err(TallyError::WorkerSpawn(source));
                }
            };

            let mut first_error = None;
            for outcome in &result_rx {
                if let Err(err) = collector.absorb(outcome) {
                    cancel.store(true, Ordering::Relaxed);
                    first_error = Some(err);
                    break;
                }
            }
            drop(result_rx);

            if feeder.join().is_err() {
                cancel.store(true, Ordering::Relaxed);
                first_error.get_or_insert(TallyError::WorkerPanicked {
                    name: "tally-feeder".to_string(),
                });
            }
            for (name, handle) in handles {
                if handle.join().is_err() {
                    first_error.get_or_insert(TallyError::WorkerPanicked { name });
                }
            }

            first_error.map_or(Ok(()), Err)
        })
    }

    fn worker_loop(&self, rx: &Receiver<PathBuf>, tx: &Sender<FileOutcome>, cancel: &AtomicBool) {
        for path in rx {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let outcome = self.process_file(path, cancel);
            if tx.send(outcome).is_err() {
                break;
            }
        }
    }

    fn process_file(&self, path: PathBuf, cancel: &AtomicBool) -> FileOutcome {
        debug!(path = %path.display(), "tallying file");
        let mut stream = LineStream::open(path)?;
        tally_stream(&mut stream, self.policy, self.failure_samples, cancel)
    }
}

/// Push paths into the work queue until the listing ends, fails, or the run
/// is cancelled. A listing error is forwarded to the coordinator.
fn feed<I>(
    files: I,
    work_tx: &Sender<PathBuf>,
    result_tx: &Sender<FileOutcome>,
    cancel: &AtomicBool,
) where
    I: Iterator<Item = Result<PathBuf, TallyError>>,
{
    for item in files {
        if cancel.load(Ordering::Relaxed) {
            return;
        }
        match item {
            Ok(path) => {
                if work_tx.send(path).is_err() {
                    return;
                }
            }
            Err(err) => {
                let _ = result_tx.send(Err(err));
                return;
            }
        }
    }
}

/// Coordinator-side state: the reducer plus run bookkeeping.
struct Collector {
    policy: ErrorPolicy,
    reducer: Reducer,
    stats: RunStats,
    failures: FailureReport,
}

impl Collector {
    fn new(policy: ErrorPolicy, failure_samples: usize) -> Self {
        Self {
            policy,
            reducer: Reducer::new(),
            stats: RunStats::default(),
            failures: FailureReport::new(failure_samples),
        }
    }

    fn absorb(&mut self, outcome: FileOutcome) -> Result<(), TallyError> {
        match outcome {
            Ok(tally) => {
                self.reducer.fold(tally.table);
                self.stats.merge(tally.stats);
                self.failures.merge(tally.failures);
                Ok(())
            }
            Err(err) if self.policy == ErrorPolicy::Isolate && err.kind().is_isolatable() => {
                warn!(code = %err.kind(), "skipping file: {err}");
                self.failures.record(&err);
                self.stats.failed_files += 1;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn finish(self, started: Instant) -> RunSummary {
        debug!(partials = self.reducer.folded(), "reduced partial tables");
        RunSummary {
            table: self.reducer.finish(),
            stats: self.stats,
            failures: self.failures,
            elapsed: started.elapsed(),
        }
    }
}
