//! Per-partition work-function table.

use crate::configuration::Configuration;
use crate::pool::{IndexId, Snapshot};
use crate::selection::subset::Subset;
use std::sync::Arc;

/// Predecessor sentinel: the state has no meaningful predecessor (fresh
/// table, or the state space changed under it).
pub const NO_PREDECESSOR: u32 = u32::MAX;

/// Work-function dynamic program over one partition's `2^k` states.
///
/// `values[s]` estimates the minimum cumulative cost of having served every
/// task so far and ending with exactly the member combination `s`
/// materialized. `predecessors[s]` records the state the optimum came from
/// in the latest rebuild. The current state is the combination this
/// submachine recommends right now.
#[derive(Debug, Clone)]
pub struct Submachine {
    subset: Arc<Subset>,
    creation_costs: Vec<f64>,
    values: Vec<f64>,
    predecessors: Vec<u32>,
    current_state: usize,
}

impl Submachine {
    pub fn new(subset: Arc<Subset>, snapshot: &Snapshot, initial_state: usize) -> Self {
        let num_states = subset.num_states();
        Self::with_values(subset, snapshot, vec![0.0; num_states], initial_state)
    }

    pub fn with_values(
        subset: Arc<Subset>,
        snapshot: &Snapshot,
        values: Vec<f64>,
        initial_state: usize,
    ) -> Self {
        assert_eq!(values.len(), subset.num_states());
        assert!(initial_state < subset.num_states());
        let creation_costs = subset
            .members()
            .iter()
            .map(|&id| {
                snapshot
                    .get(id)
                    .map(|index| index.creation_cost())
                    .unwrap_or_else(|| panic!("subset member {id} missing from candidate pool"))
            })
            .collect();
        let num_states = subset.num_states();
        Self {
            subset,
            creation_costs,
            values,
            predecessors: vec![NO_PREDECESSOR; num_states],
            current_state: initial_state,
        }
    }

    pub fn subset(&self) -> &Arc<Subset> {
        &self.subset
    }

    pub fn num_states(&self) -> usize {
        self.values.len()
    }

    pub fn value(&self, state: usize) -> f64 {
        self.values[state]
    }

    pub fn predecessor(&self, state: usize) -> u32 {
        self.predecessors[state]
    }

    pub fn current_state(&self) -> usize {
        self.current_state
    }

    /// The configuration this submachine currently recommends.
    pub fn current_config(&self) -> Configuration {
        self.subset.config_of(self.current_state)
    }

    /// Minimum work-function value across all states.
    pub fn optimum(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Cost of moving between two local states: creation cost of every
    /// newly set member. Drops are free.
    pub fn transition_cost(&self, from: usize, to: usize) -> f64 {
        let mut added = to & !from;
        let mut cost = 0.0;
        while added != 0 {
            let pos = added.trailing_zeros() as usize;
            cost += self.creation_costs[pos];
            added &= added - 1;
        }
        cost
    }

    /// Process one task given its cost under every local state.
    ///
    /// Rebuilds the whole table (`O(4^k)`), then moves the current state to
    /// the best state satisfying the consistency condition: the optimal path
    /// into it actually paid this task's cost while in it.
    pub fn new_task(&mut self, cost: &[f64]) {
        assert_eq!(cost.len(), self.values.len());
        let num_states = self.values.len();
        let old = std::mem::replace(&mut self.values, vec![0.0; num_states]);

        for to in 0..num_states {
            let mut best = f64::INFINITY;
            let mut best_from = NO_PREDECESSOR;
            for from in 0..num_states {
                let candidate = old[from] + cost[from] + self.transition_cost(from, to);
                if candidate < best {
                    best = candidate;
                    best_from = from as u32;
                }
            }
            self.values[to] = best;
            self.predecessors[to] = best_from;
        }

        let previous = self.current_state;
        let mut chosen: Option<(usize, f64, f64)> = None;
        for state in 0..num_states {
            // exact comparison: the from == state term of the minimum
            // produces these identical floats when staying put is optimal
            if self.values[state] != old[state] + cost[state] {
                continue;
            }
            let back = self.transition_cost(state, previous);
            let score = self.values[state] + back;
            let better = match chosen {
                None => true,
                Some((held, held_score, held_back)) => {
                    score < held_score
                        || (score == held_score
                            && (back < held_back
                                || (back == held_back && state == previous && held != previous)))
                }
            };
            if better {
                chosen = Some((state, score, back));
            }
        }
        match chosen {
            Some((state, _, _)) => self.current_state = state,
            None => panic!("work function rebuild left no consistent state"),
        }
    }

    /// Apply a user vote on one member: force its bit in the current state,
    /// then raise the value of every disagreeing state so that no state
    /// contradicting the vote looks cheaper than honoring it. `O(2^k)`,
    /// predecessors untouched.
    pub fn vote(&mut self, id: IndexId, positive: bool) {
        let pos = match self.subset.position_of(id) {
            Some(pos) => pos,
            None => panic!("vote for index {id} outside this submachine's subset"),
        };
        let bit = 1usize << pos;
        if positive {
            self.current_state |= bit;
        } else {
            self.current_state &= !bit;
        }

        let floor_base = self.values[self.current_state] + self.creation_costs[pos];
        for state in 0..self.values.len() {
            let agrees = (state & bit != 0) == positive;
            if agrees {
                continue;
            }
            let floor = floor_base - self.transition_cost(state, self.current_state);
            if self.values[state] < floor {
                self.values[state] = floor;
            }
        }
    }
}
