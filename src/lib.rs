//! Online physical-design advisor: continuously recommends which candidate
//! indexes to materialize as statements arrive, balancing speed-up against
//! creation and maintenance cost without ever re-solving from scratch.

pub mod configuration;
pub mod error;
pub mod oracle;
pub mod pool;
pub mod scheduler;
pub mod selection;
pub mod selector;
pub mod statistics;
pub mod wfa;

pub use configuration::Configuration;
pub use error::{Error, Result};
pub use oracle::{CandidateDiscovery, ProfiledQuery, QueryProfiler};
pub use pool::{CandidatePool, Index, IndexId, Snapshot};
pub use scheduler::{SchedulerStatsSnapshot, TaskScheduler, TaskStatus};
pub use selection::{HotSet, HotSetSelector, IndexPartitioning, SelectionStrategy, Subset};
pub use selector::{CandidatesSelector, EngineReport};
pub use statistics::{StatisticsWindow, WorkloadStatistics};
pub use wfa::WorkFunctionAlgorithm;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// Upper bound on the number of tracked candidate indexes.
    pub max_hot_size: usize,
    /// Upper bound on the total DP state count across all partitions
    /// (sum of `2^|subset|`).
    pub state_budget: usize,
    /// Restarts of the randomized partition search; the cheapest result
    /// wins.
    pub partition_restarts: usize,
    /// Capacity of each benefit/interaction measurement window.
    pub statistics_window: usize,
    /// Capacity of each pipeline queue.
    pub queue_capacity: usize,
    /// How additional hot-set slots are filled.
    pub selection_strategy: SelectionStrategy,
    /// Seed for the partitioner's randomized search; `None` seeds from the
    /// OS. Fix it to make a workload replay deterministic.
    pub rng_seed: Option<u64>,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            max_hot_size: 32,
            state_budget: 512,
            partition_restarts: 8,
            statistics_window: 100,
            queue_capacity: 64,
            selection_strategy: SelectionStrategy::default(),
            rng_seed: None,
        }
    }
}

impl AdvisorConfig {
    /// Preset for small workloads and tests: few tracked indexes, shallow
    /// queues.
    pub fn small() -> Self {
        Self {
            max_hot_size: 8,
            state_budget: 64,
            partition_restarts: 4,
            statistics_window: 32,
            queue_capacity: 8,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_hot_size == 0 {
            return Err(Error::Config("max_hot_size must be positive".into()));
        }
        if self.state_budget < 2 * self.max_hot_size {
            return Err(Error::Config(format!(
                "state_budget {} cannot hold {} singleton partitions",
                self.state_budget, self.max_hot_size
            )));
        }
        if self.partition_restarts == 0 {
            return Err(Error::Config("partition_restarts must be positive".into()));
        }
        if self.statistics_window == 0 {
            return Err(Error::Config("statistics_window must be positive".into()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be positive".into()));
        }
        Ok(())
    }
}

/// The capability surface the engine exposes to callers.
pub trait TuningAdvisor {
    /// Run one SQL statement through the pipeline and return the updated
    /// recommendation.
    fn process(&self, sql: &str) -> Result<Configuration>;

    /// The currently recommended configuration.
    fn recommendation(&self) -> Configuration;

    /// Pin an index into the recommendation.
    fn positive_vote(&self, index: IndexId) -> Result<Configuration>;

    /// Vote an index out of the recommendation.
    fn negative_vote(&self, index: IndexId) -> Result<Configuration>;

    /// Stop the pipeline, cancelling any queued work.
    fn shutdown(&self);
}

/// The concrete advisor engine: candidate pool plus the three-stage
/// pipeline around the selection machinery.
#[derive(Debug)]
pub struct Advisor {
    pool: Arc<CandidatePool>,
    scheduler: TaskScheduler,
}

impl Advisor {
    pub fn new(
        config: AdvisorConfig,
        discovery: Arc<dyn CandidateDiscovery>,
        profiler: Arc<dyn QueryProfiler>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(CandidatePool::new());
        let selector = CandidatesSelector::new(&config);
        let scheduler = TaskScheduler::new(
            Arc::clone(&pool),
            discovery,
            profiler,
            selector,
            config.queue_capacity,
        );
        Ok(Self { pool, scheduler })
    }

    pub fn pool(&self) -> &Arc<CandidatePool> {
        &self.pool
    }

    pub fn stats(&self) -> SchedulerStatsSnapshot {
        self.scheduler.stats()
    }

    /// Engine internals as of the last completed task.
    pub fn report(&self) -> EngineReport {
        self.scheduler.report()
    }
}

impl TuningAdvisor for Advisor {
    fn process(&self, sql: &str) -> Result<Configuration> {
        self.scheduler.submit_query(sql)
    }

    fn recommendation(&self) -> Configuration {
        self.scheduler.recommendation()
    }

    fn positive_vote(&self, index: IndexId) -> Result<Configuration> {
        if self.pool.get(index).is_none() {
            return Err(Error::UnknownIndex(index));
        }
        self.scheduler.submit_vote(index, true)
    }

    fn negative_vote(&self, index: IndexId) -> Result<Configuration> {
        if self.pool.get(index).is_none() {
            return Err(Error::UnknownIndex(index));
        }
        self.scheduler.submit_vote(index, false)
    }

    fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
