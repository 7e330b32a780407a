//! Workload statistics: per-index benefit rates and pairwise interaction
//! rates, measured against a single monotonically advancing cost clock.

use crate::configuration::Configuration;
use crate::oracle::ProfiledQuery;
use crate::pool::IndexId;
use crate::statistics::window::StatisticsWindow;
use std::collections::HashMap;

fn pair_key(a: IndexId, b: IndexId) -> (IndexId, IndexId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Sliding-window estimators for index benefit and degree of interaction.
///
/// The clock advances by the true cost of every processed statement under
/// the configuration that was actually materialized at the time, so all
/// rates are "per unit of work the database performed", not per wall-clock
/// second.
#[derive(Debug)]
pub struct WorkloadStatistics {
    window_capacity: usize,
    clock: f64,
    benefit: HashMap<IndexId, StatisticsWindow>,
    interaction: HashMap<(IndexId, IndexId), StatisticsWindow>,
}

impl WorkloadStatistics {
    pub fn new(window_capacity: usize) -> Self {
        Self {
            window_capacity,
            clock: 0.0,
            benefit: HashMap::new(),
            interaction: HashMap::new(),
        }
    }

    /// Fold one profiled statement into the estimators and advance the
    /// clock by its total cost under `materialized`.
    pub fn add_query(&mut self, query: &dyn ProfiledQuery, materialized: &Configuration) {
        let candidates = query.candidates();
        for (i, &a) in candidates.iter().enumerate() {
            let single = Configuration::with_indexes(&[a]);
            let measurement =
                query.best_benefit(a, materialized) - query.maintenance_cost(&single);
            if measurement != 0.0 {
                let capacity = self.window_capacity;
                self.benefit
                    .entry(a)
                    .or_insert_with(|| StatisticsWindow::new(capacity))
                    .record(measurement, self.clock);
            }
            for &b in &candidates[i + 1..] {
                if a == b {
                    continue;
                }
                let doi = query.interaction_level(a, b);
                if doi != 0.0 {
                    let capacity = self.window_capacity;
                    self.interaction
                        .entry(pair_key(a, b))
                        .or_insert_with(|| StatisticsWindow::new(capacity))
                        .record(doi, self.clock);
                }
            }
        }
        self.clock += query.total_cost(materialized);
    }

    /// Recency-weighted benefit rate of one index; 0 when never measured.
    pub fn benefit(&self, id: IndexId) -> f64 {
        self.benefit
            .get(&id)
            .map_or(0.0, |w| w.max_rate(self.clock))
    }

    /// Recency-weighted degree-of-interaction rate of an unordered pair.
    pub fn doi(&self, a: IndexId, b: IndexId) -> f64 {
        self.interaction
            .get(&pair_key(a, b))
            .map_or(0.0, |w| w.max_rate(self.clock))
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }
}

impl crate::selection::BenefitSource for WorkloadStatistics {
    /// Marginal benefit of `id` given already-chosen companions: the index's
    /// own rate plus its measured interaction with everything chosen so far.
    fn benefit(&self, id: IndexId, chosen: &Configuration) -> f64 {
        let mut total = self.benefit(id);
        for other in chosen.iter() {
            total += self.doi(id, other);
        }
        total
    }
}

impl crate::selection::InteractionSource for WorkloadStatistics {
    fn doi(&self, a: IndexId, b: IndexId) -> f64 {
        WorkloadStatistics::doi(self, a, b)
    }
}
