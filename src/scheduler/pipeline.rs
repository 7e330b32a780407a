//! The three-stage concurrent pipeline around the selection engine.
//!
//! Profiling and selection each have one dedicated worker thread fed by a
//! bounded queue; completed tasks land on a third bounded queue that the
//! submitting side drains. Bounded queues are the backpressure mechanism:
//! there is no unbounded buffering anywhere. Because exactly one thread
//! runs the selection stage, all engine state mutation is serialized
//! without locks.

use crate::configuration::Configuration;
use crate::error::{Error, Result};
use crate::oracle::{CandidateDiscovery, QueryProfiler};
use crate::pool::{CandidatePool, IndexId};
use crate::scheduler::task::{Task, TaskKind, TaskStatus};
use crate::selector::{CandidatesSelector, EngineReport};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const WORKER_POLL: Duration = Duration::from_millis(50);

/// Pipeline throughput counters.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    submitted: AtomicU64,
    profiled: AtomicU64,
    selected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct SchedulerStatsSnapshot {
    pub submitted: u64,
    pub profiled: u64,
    pub selected: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl SchedulerStats {
    fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            profiled: self.profiled.load(Ordering::Relaxed),
            selected: self.selected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Concurrent front door of the advisor engine.
///
/// Submissions enqueue on the profiling queue; the profiling worker runs
/// the discovery and cost-oracle calls (which may block on I/O) and hands
/// the task to the selection queue; the selection worker runs the
/// CPU-bound combinatorial step and pushes the task to the completion
/// queue, where the submitting thread picks it up and asserts it got its
/// own task back. Votes enter at the selection queue directly.
pub struct TaskScheduler {
    profiling_tx: Sender<Arc<Task>>,
    selection_tx: Sender<Arc<Task>>,
    completion_rx: Receiver<Arc<Task>>,
    // drain handles for shutdown
    profiling_rx: Receiver<Arc<Task>>,
    selection_rx: Receiver<Arc<Task>>,
    shutdown: Arc<AtomicBool>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    next_task_id: AtomicU64,
    stats: Arc<SchedulerStats>,
    published: Arc<RwLock<Published>>,
}

/// State the selection worker publishes for lock-free-ish readers.
#[derive(Debug, Default)]
struct Published {
    recommendation: Configuration,
    report: EngineReport,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl TaskScheduler {
    pub fn new(
        pool: Arc<CandidatePool>,
        discovery: Arc<dyn CandidateDiscovery>,
        profiler: Arc<dyn QueryProfiler>,
        selector: CandidatesSelector,
        queue_capacity: usize,
    ) -> Self {
        let (profiling_tx, profiling_rx) = bounded::<Arc<Task>>(queue_capacity);
        let (selection_tx, selection_rx) = bounded::<Arc<Task>>(queue_capacity);
        let (completion_tx, completion_rx) = bounded::<Arc<Task>>(queue_capacity);

        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(SchedulerStats::default());
        let published = Arc::new(RwLock::new(Published::default()));

        let mut workers = Vec::with_capacity(2);
        workers.push({
            let worker = ProfilingWorker {
                pool: Arc::clone(&pool),
                discovery,
                profiler,
                input: profiling_rx.clone(),
                selection_tx: selection_tx.clone(),
                completion_tx: completion_tx.clone(),
                shutdown: Arc::clone(&shutdown),
                stats: Arc::clone(&stats),
            };
            thread::Builder::new()
                .name("indextune-profiling".into())
                .spawn(move || worker.run())
                .expect("failed to spawn profiling worker")
        });
        workers.push({
            let worker = SelectionWorker {
                pool,
                selector,
                input: selection_rx.clone(),
                completion_tx,
                shutdown: Arc::clone(&shutdown),
                stats: Arc::clone(&stats),
                published: Arc::clone(&published),
            };
            thread::Builder::new()
                .name("indextune-selection".into())
                .spawn(move || worker.run())
                .expect("failed to spawn selection worker")
        });

        Self {
            profiling_tx,
            selection_tx,
            completion_rx,
            profiling_rx,
            selection_rx,
            shutdown,
            workers: Mutex::new(workers),
            next_task_id: AtomicU64::new(0),
            stats,
            published,
        }
    }

    /// Run one statement through the full pipeline and block for its
    /// recommendation.
    pub fn submit_query(&self, sql: &str) -> Result<Configuration> {
        let task = self.new_task(Task::query(self.next_id(), sql.to_string()))?;
        self.profiling_tx
            .send(Arc::clone(&task))
            .map_err(|_| Error::Shutdown)?;
        self.await_completion(task)
    }

    /// Run a vote through the selection stage (votes skip profiling) and
    /// block for the resulting recommendation.
    pub fn submit_vote(&self, index: IndexId, positive: bool) -> Result<Configuration> {
        let task = self.new_task(Task::vote(self.next_id(), index, positive))?;
        self.selection_tx
            .send(Arc::clone(&task))
            .map_err(|_| Error::Shutdown)?;
        self.await_completion(task)
    }

    /// The recommendation as of the last completed task, readable without
    /// entering the pipeline.
    pub fn recommendation(&self) -> Configuration {
        self.published.read().recommendation.clone()
    }

    /// Internals report as of the last completed task.
    pub fn report(&self) -> EngineReport {
        self.published.read().report.clone()
    }

    pub fn stats(&self) -> SchedulerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop the pipeline: cancel everything still queued, drain the queues
    /// and join both workers. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down advisor pipeline");

        for queue in [&self.profiling_rx, &self.selection_rx, &self.completion_rx] {
            while let Ok(task) = queue.try_recv() {
                if task.status() == TaskStatus::Scheduled {
                    task.mark_cancelled();
                    task.set_outcome(Err(Error::Cancelled));
                    self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            let _ = handle.join();
        }
    }

    fn next_id(&self) -> u64 {
        self.next_task_id.fetch_add(1, Ordering::Relaxed)
    }

    fn new_task(&self, task: Task) -> Result<Arc<Task>> {
        if self.is_shut_down() {
            return Err(Error::Shutdown);
        }
        task.mark_scheduled();
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(task))
    }

    /// Block on the completion queue for `expected`. Getting someone else's
    /// task back means the pipeline wiring is broken, which is a logic bug,
    /// not a recoverable condition.
    fn await_completion(&self, expected: Arc<Task>) -> Result<Configuration> {
        match self.completion_rx.recv() {
            Ok(done) => {
                assert_eq!(
                    done.id(),
                    expected.id(),
                    "completion queue returned a foreign task"
                );
                let outcome = done.take_outcome().unwrap_or(Err(Error::Cancelled));
                if outcome.is_ok() {
                    self.stats.completed.fetch_add(1, Ordering::Relaxed);
                }
                outcome
            }
            Err(_) => Err(Error::Shutdown),
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Stage one: discovery and cost-oracle calls. Allowed to block on
/// external I/O; never touches engine state.
struct ProfilingWorker {
    pool: Arc<CandidatePool>,
    discovery: Arc<dyn CandidateDiscovery>,
    profiler: Arc<dyn QueryProfiler>,
    input: Receiver<Arc<Task>>,
    selection_tx: Sender<Arc<Task>>,
    completion_tx: Sender<Arc<Task>>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<SchedulerStats>,
}

impl ProfilingWorker {
    fn run(self) {
        debug!("profiling worker started");
        loop {
            match self.input.recv_timeout(WORKER_POLL) {
                Ok(task) => self.handle(task),
                Err(RecvTimeoutError::Timeout) => {
                    if self.shutdown.load(Ordering::Acquire) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("profiling worker stopped");
    }

    fn handle(&self, task: Arc<Task>) {
        if task.is_cancelled() {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let TaskKind::Query { sql } = task.kind() else {
            // votes are routed straight to selection; a vote here is a
            // wiring bug
            panic!("profiling worker received a non-query task");
        };

        let profiled = self
            .discovery
            .recommend_indexes(sql, &self.pool)
            .and_then(|_| self.profiler.profile(sql, &self.pool.snapshot()));

        match profiled {
            Ok(profiled) => {
                task.attach_profile(profiled, self.pool.snapshot());
                self.stats.profiled.fetch_add(1, Ordering::Relaxed);
                if self.selection_tx.send(task).is_err() {
                    debug!("selection queue closed, dropping task");
                }
            }
            Err(error) => {
                // external failure: fail this task only, keep the loop alive
                warn!(%error, "profiling failed, dropping task");
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                task.set_outcome(Err(error));
                task.mark_cancelled();
                if self.completion_tx.send(task).is_err() {
                    debug!("completion queue closed, dropping failed task");
                }
            }
        }
    }
}

/// Stage two: the CPU-bound combinatorial step. The sole owner of the
/// [`CandidatesSelector`], so engine state needs no locking.
struct SelectionWorker {
    pool: Arc<CandidatePool>,
    selector: CandidatesSelector,
    input: Receiver<Arc<Task>>,
    completion_tx: Sender<Arc<Task>>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<SchedulerStats>,
    published: Arc<RwLock<Published>>,
}

impl SelectionWorker {
    fn run(mut self) {
        debug!("selection worker started");
        loop {
            match self.input.recv_timeout(WORKER_POLL) {
                Ok(task) => self.handle(task),
                Err(RecvTimeoutError::Timeout) => {
                    if self.shutdown.load(Ordering::Acquire) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("selection worker stopped");
    }

    fn handle(&mut self, task: Arc<Task>) {
        if task.is_cancelled() {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let outcome = match task.kind() {
            TaskKind::Query { .. } => match task.take_profile() {
                Some((profiled, snapshot)) => {
                    Ok(self.selector.process_query(&snapshot, profiled.as_ref()))
                }
                None => Err(Error::Scheduler(
                    "query task reached selection without a profile".into(),
                )),
            },
            TaskKind::PositiveVote { id } => {
                Ok(self.selector.positive_vote(&self.pool.snapshot(), *id))
            }
            TaskKind::NegativeVote { id } => {
                Ok(self.selector.negative_vote(&self.pool.snapshot(), *id))
            }
        };

        if let Ok(recommendation) = &outcome {
            let mut published = self.published.write();
            published.recommendation = recommendation.clone();
            published.report = self.selector.report();
        }
        self.stats.selected.fetch_add(1, Ordering::Relaxed);
        task.set_outcome(outcome);
        task.mark_done();
        if self.completion_tx.send(task).is_err() {
            debug!("completion queue closed, dropping result");
        }
    }
}
