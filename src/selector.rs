//! Orchestration of the recommendation engine for one statement or vote.
//!
//! The selector owns every piece of mutable engine state and is only ever
//! driven by the scheduler's selection worker, so it needs no internal
//! locking.

use crate::configuration::Configuration;
use crate::oracle::ProfiledQuery;
use crate::pool::{IndexId, Snapshot};
use crate::selection::{HotSet, HotSetSelector, IndexPartitioning, InteractionSelector};
use crate::statistics::WorkloadStatistics;
use crate::wfa::WorkFunctionAlgorithm;
use crate::AdvisorConfig;
use tracing::debug;

/// Point-in-time view of the engine internals, published after every
/// processed task for observability surfaces.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EngineReport {
    /// Total workload cost processed so far (the statistics clock).
    pub cost_clock: f64,
    pub hot_set_size: usize,
    pub partition_count: usize,
    /// Total DP states across all partitions.
    pub state_count: usize,
    pub recommended: Vec<IndexId>,
    /// Strongest measured benefit rates among hot indexes, descending.
    pub top_benefit_rates: Vec<(IndexId, f64)>,
}

/// Ties statistics, hot-set selection, partitioning and the work-function
/// machinery together per incoming query or vote.
#[derive(Debug)]
pub struct CandidatesSelector {
    stats: WorkloadStatistics,
    hot_selector: HotSetSelector,
    interaction_selector: InteractionSelector,
    wfa: WorkFunctionAlgorithm,
    hot: HotSet,
    partitioning: IndexPartitioning,
    /// Externally materialized indexes, tracked for cost bookkeeping.
    materialized: Configuration,
    /// Indexes pinned in by positive votes.
    pinned: Configuration,
    last_required: Configuration,
    seen_candidates: usize,
}

impl CandidatesSelector {
    pub fn new(config: &AdvisorConfig) -> Self {
        Self {
            stats: WorkloadStatistics::new(config.statistics_window),
            hot_selector: HotSetSelector::new(config.max_hot_size, config.selection_strategy),
            interaction_selector: InteractionSelector::new(
                config.state_budget,
                config.partition_restarts,
                config.rng_seed,
            ),
            wfa: WorkFunctionAlgorithm::new(),
            hot: HotSet::empty(),
            partitioning: IndexPartitioning::default(),
            materialized: Configuration::new(),
            pinned: Configuration::new(),
            last_required: Configuration::new(),
            seen_candidates: 0,
        }
    }

    /// Process one profiled statement: fold it into the statistics,
    /// reorganize the tracked machinery if the world changed, then run the
    /// work-function step. Returns the resulting recommendation.
    pub fn process_query(
        &mut self,
        snapshot: &Snapshot,
        query: &dyn ProfiledQuery,
    ) -> Configuration {
        self.stats.add_query(query, &self.materialized);
        self.reorganize_if_needed(snapshot);
        self.wfa.new_task(query);
        self.recommendation()
    }

    /// Pin an index in: it joins the required set and its bit is forced on.
    pub fn positive_vote(&mut self, snapshot: &Snapshot, id: IndexId) -> Configuration {
        self.pinned.set(id);
        self.reorganize_if_needed(snapshot);
        self.wfa.vote(id, true);
        self.recommendation()
    }

    /// Vote an index out: it loses its pin and its bit is forced off.
    pub fn negative_vote(&mut self, snapshot: &Snapshot, id: IndexId) -> Configuration {
        self.pinned.clear(id);
        self.reorganize_if_needed(snapshot);
        if self.wfa.is_tracked(id) {
            self.wfa.vote(id, false);
        }
        self.recommendation()
    }

    /// Record that the caller materialized an index. Bookkeeping only: the
    /// creation cost was paid outside, drops are free, and the DP machinery
    /// is not touched.
    pub fn create(&mut self, id: IndexId) {
        self.materialized.set(id);
    }

    pub fn drop_index(&mut self, id: IndexId) {
        self.materialized.clear(id);
    }

    pub fn recommendation(&self) -> Configuration {
        self.wfa.recommendation()
    }

    pub fn statistics(&self) -> &WorkloadStatistics {
        &self.stats
    }

    pub fn hot_set(&self) -> &HotSet {
        &self.hot
    }

    pub fn report(&self) -> EngineReport {
        let mut top: Vec<(IndexId, f64)> = self
            .hot
            .iter()
            .map(|id| (id, self.stats.benefit(id)))
            .collect();
        top.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        top.truncate(10);
        EngineReport {
            cost_clock: self.stats.clock(),
            hot_set_size: self.hot.len(),
            partition_count: self.partitioning.len(),
            state_count: self.partitioning.state_count(),
            recommended: self.recommendation().iter().collect(),
            top_benefit_rates: top,
        }
    }

    /// Rebuild hot set and partitioning, but only as far as the triggers
    /// demand: hot set when candidates or the required set changed,
    /// partitioning when the hot set changed, DP tables when the
    /// partitioning changed.
    fn reorganize_if_needed(&mut self, snapshot: &Snapshot) {
        let mut required = self.materialized.clone();
        required.union_with(&self.pinned);

        let candidates_changed = snapshot.len() != self.seen_candidates;
        let required_changed = required != self.last_required;
        if !candidates_changed && !required_changed {
            return;
        }

        let hot = self
            .hot_selector
            .choose(snapshot, &self.hot, &required, &self.stats);
        if hot != self.hot {
            let partitioning =
                self.interaction_selector
                    .choose(&hot, &self.partitioning, &self.stats);
            debug!(
                hot = hot.len(),
                partitions = partitioning.len(),
                states = partitioning.state_count(),
                "hot set changed, reorganizing"
            );
            self.hot = hot;
            if !partitioning.same_groups(&self.partitioning) {
                self.wfa.repartition(&partitioning, snapshot);
                self.partitioning = partitioning;
            }
        }

        self.seen_candidates = snapshot.len();
        self.last_required = required;
    }
}
