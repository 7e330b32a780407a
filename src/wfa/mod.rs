//! Work-function recommendation machinery: one DP submachine per hot-set
//! partition, plus the bookkeeping to survive repartitioning.

pub mod submachine;

pub use submachine::{Submachine, NO_PREDECESSOR};

use crate::configuration::Configuration;
use crate::oracle::ProfiledQuery;
use crate::pool::{IndexId, Snapshot};
use crate::selection::partitioning::IndexPartitioning;
use tracing::debug;

/// The online work-function algorithm over a partitioned hot set.
///
/// Each partition runs its own [`Submachine`]; the engine-wide
/// recommendation is the union of every submachine's current state. The
/// machines assume cross-partition independence, which is exactly the
/// approximation the interaction-driven partitioner is there to keep small.
#[derive(Debug, Default)]
pub struct WorkFunctionAlgorithm {
    submachines: Vec<Submachine>,
    tracked: Configuration,
}

impl WorkFunctionAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submachines(&self) -> &[Submachine] {
        &self.submachines
    }

    /// Union of all member indexes across partitions.
    pub fn tracked(&self) -> &Configuration {
        &self.tracked
    }

    pub fn state_count(&self) -> usize {
        self.submachines.iter().map(|m| m.num_states()).sum()
    }

    /// The currently recommended configuration.
    pub fn recommendation(&self) -> Configuration {
        let mut result = Configuration::new();
        for machine in &self.submachines {
            result.union_with(&machine.current_config());
        }
        result
    }

    /// Replace the partition structure, carrying over as much computed
    /// state as possible.
    ///
    /// Each new state's value is derived additively from the old subsets it
    /// overlaps (projecting the new state onto each old local numbering),
    /// plus the creation cost of any newly tracked index it contains. This
    /// is an approximation under cross-partition independence, not an exact
    /// recomputation, so predecessors are reset. Current states are seeded
    /// from the previous recommendation, which makes repartitioning to the
    /// same structure a no-op for the recommendation.
    pub fn repartition(&mut self, partitioning: &IndexPartitioning, snapshot: &Snapshot) {
        let recommended = self.recommendation();
        let old_machines = std::mem::take(&mut self.submachines);
        let old_tracked = std::mem::take(&mut self.tracked);

        for subset in partitioning.subsets() {
            let num_states = subset.num_states();
            let mut values = vec![0.0; num_states];
            let overlapping: Vec<&Submachine> = old_machines
                .iter()
                .filter(|m| m.subset().members().iter().any(|&id| subset.contains(id)))
                .collect();

            for (state, value) in values.iter_mut().enumerate() {
                let config = subset.config_of(state);
                let mut derived = 0.0;
                for (pos, &id) in subset.members().iter().enumerate() {
                    if state & (1 << pos) != 0 && !old_tracked.contains(id) {
                        derived += snapshot
                            .get(id)
                            .map(|index| index.creation_cost())
                            .unwrap_or_else(|| {
                                panic!("partitioned index {id} missing from candidate pool")
                            });
                    }
                }
                for old in &overlapping {
                    derived += old.value(old.subset().state_of(&config));
                }
                *value = derived;
            }

            let initial = subset.state_of(&recommended);
            self.submachines
                .push(Submachine::with_values(subset.clone(), snapshot, values, initial));
            for &id in subset.members() {
                self.tracked.set(id);
            }
        }

        debug!(
            partitions = self.submachines.len(),
            states = self.state_count(),
            "rebuilt work function tables"
        );
    }

    /// Feed one profiled query through every submachine.
    ///
    /// The cost vector for a submachine's state is the query's total cost
    /// with that state's members materialized on top of the other
    /// partitions' current recommendations, holding the rest of the world
    /// fixed.
    pub fn new_task(&mut self, query: &dyn ProfiledQuery) {
        let currents: Vec<Configuration> = self
            .submachines
            .iter()
            .map(|m| m.current_config())
            .collect();

        for (i, machine) in self.submachines.iter_mut().enumerate() {
            let mut base = Configuration::new();
            for (j, current) in currents.iter().enumerate() {
                if j != i {
                    base.union_with(current);
                }
            }
            let subset = machine.subset().clone();
            let cost: Vec<f64> = (0..subset.num_states())
                .map(|state| {
                    let mut config = base.clone();
                    subset.apply_state(state, &mut config);
                    query.total_cost(&config)
                })
                .collect();
            machine.new_task(&cost);
        }
    }

    /// Route a vote to the submachine owning the index. The caller must
    /// have reorganized first so that voted indexes are tracked.
    pub fn vote(&mut self, id: IndexId, positive: bool) {
        let machine = self
            .submachines
            .iter_mut()
            .find(|m| m.subset().contains(id))
            .unwrap_or_else(|| panic!("vote for untracked index {id}"));
        machine.vote(id, positive);
    }

    pub fn is_tracked(&self, id: IndexId) -> bool {
        self.tracked.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::CandidatePool;
    use crate::selection::subset::Subset;
    use smallvec::SmallVec;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct CostTable {
        candidates: Vec<IndexId>,
        costs: HashMap<Configuration, f64>,
        default: f64,
    }

    impl ProfiledQuery for CostTable {
        fn candidates(&self) -> &[IndexId] {
            &self.candidates
        }

        fn total_cost(&self, config: &Configuration) -> f64 {
            self.costs.get(config).copied().unwrap_or(self.default)
        }

        fn plan_cost(&self, config: &Configuration) -> f64 {
            self.total_cost(config)
        }

        fn maintenance_cost(&self, _config: &Configuration) -> f64 {
            0.0
        }

        fn interaction_level(&self, _a: IndexId, _b: IndexId) -> f64 {
            0.0
        }

        fn best_benefit(&self, _id: IndexId, _config: &Configuration) -> f64 {
            0.0
        }
    }

    fn snapshot_with_costs(costs: &[f64]) -> Snapshot {
        let pool = CandidatePool::new();
        for (i, &cost) in costs.iter().enumerate() {
            pool.register(&format!("idx_{i}"), cost, 1024);
        }
        pool.snapshot()
    }

    fn partitioning(groups: &[&[IndexId]]) -> IndexPartitioning {
        IndexPartitioning::new(
            groups
                .iter()
                .map(|g| Arc::new(Subset::new(SmallVec::from_slice(g))))
                .collect(),
        )
    }

    #[test]
    fn test_single_partition_recommendation() {
        let snapshot = snapshot_with_costs(&[10.0]);
        let mut wfa = WorkFunctionAlgorithm::new();
        wfa.repartition(&partitioning(&[&[0]]), &snapshot);

        let query = CostTable {
            candidates: vec![0],
            costs: HashMap::from([
                (Configuration::new(), 100.0),
                (Configuration::with_indexes(&[0]), 80.0),
            ]),
            default: 0.0,
        };
        wfa.new_task(&query);
        assert!(wfa.recommendation().contains(0));
    }

    #[test]
    fn test_repartition_twice_preserves_recommendation() {
        let snapshot = snapshot_with_costs(&[10.0, 4.0, 6.0]);
        let mut wfa = WorkFunctionAlgorithm::new();
        let p = partitioning(&[&[0, 1], &[2]]);
        wfa.repartition(&p, &snapshot);

        let query = CostTable {
            candidates: vec![0, 1, 2],
            costs: HashMap::from([
                (Configuration::new(), 50.0),
                (Configuration::with_indexes(&[1]), 10.0),
                (Configuration::with_indexes(&[1, 2]), 8.0),
            ]),
            default: 50.0,
        };
        wfa.new_task(&query);
        let before = wfa.recommendation();

        wfa.repartition(&p, &snapshot);
        assert_eq!(wfa.recommendation(), before);

        wfa.repartition(&p, &snapshot);
        assert_eq!(wfa.recommendation(), before);
    }

    #[test]
    fn test_repartition_carries_values_from_overlapping_subsets() {
        let snapshot = snapshot_with_costs(&[10.0, 4.0]);
        let mut wfa = WorkFunctionAlgorithm::new();
        wfa.repartition(&partitioning(&[&[0], &[1]]), &snapshot);

        let query = CostTable {
            candidates: vec![0, 1],
            costs: HashMap::from([
                (Configuration::new(), 40.0),
                (Configuration::with_indexes(&[0]), 30.0),
                (Configuration::with_indexes(&[1]), 20.0),
                (Configuration::with_indexes(&[0, 1]), 15.0),
            ]),
            default: 40.0,
        };
        wfa.new_task(&query);
        let v0: Vec<f64> = (0..2).map(|s| wfa.submachines()[0].value(s)).collect();
        let v1: Vec<f64> = (0..2).map(|s| wfa.submachines()[1].value(s)).collect();

        // merge both singletons into one pair subset
        wfa.repartition(&partitioning(&[&[0, 1]]), &snapshot);
        let merged = &wfa.submachines()[0];
        // the additive decomposition sums the projections onto old subsets
        assert_eq!(merged.value(0b00), v0[0] + v1[0]);
        assert_eq!(merged.value(0b01), v0[1] + v1[0]);
        assert_eq!(merged.value(0b10), v0[0] + v1[1]);
        assert_eq!(merged.value(0b11), v0[1] + v1[1]);
        // predecessors are meaningless across a changed state space
        for state in 0..4 {
            assert_eq!(merged.predecessor(state), NO_PREDECESSOR);
        }
    }

    #[test]
    fn test_repartition_charges_newly_tracked_indexes() {
        let snapshot = snapshot_with_costs(&[10.0, 4.0]);
        let mut wfa = WorkFunctionAlgorithm::new();
        wfa.repartition(&partitioning(&[&[0]]), &snapshot);
        // index 1 enters the tracked set now: states containing it pay its
        // creation cost up front
        wfa.repartition(&partitioning(&[&[0], &[1]]), &snapshot);
        let m1 = &wfa.submachines()[1];
        assert_eq!(m1.value(0), 0.0);
        assert_eq!(m1.value(1), 4.0);
    }

    #[test]
    #[should_panic(expected = "untracked index")]
    fn test_vote_for_untracked_index_panics() {
        let mut wfa = WorkFunctionAlgorithm::new();
        wfa.vote(3, true);
    }
}
