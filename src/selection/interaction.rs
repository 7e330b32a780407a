//! Interaction-driven partitioner.
//!
//! Groups the hot set into subsets bounded by a total state-count budget
//! while minimizing the interaction lost to subset boundaries. Runs a
//! randomized merge search several times and keeps the cheapest result.

use crate::pool::IndexId;
use crate::selection::hot_set::HotSet;
use crate::selection::partitioning::{IndexPartitioning, InteractionSource};
use crate::selection::subset::Subset;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::debug;

type Group = SmallVec<[IndexId; 8]>;

/// One candidate merge of two current groups.
struct MergeCandidate {
    first: usize,
    second: usize,
    weight: f64,
    singleton_pair: bool,
}

/// Chooses an [`IndexPartitioning`] for a hot set.
pub struct InteractionSelector {
    state_budget: usize,
    restarts: usize,
    rng: StdRng,
}

impl std::fmt::Debug for InteractionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionSelector")
            .field("state_budget", &self.state_budget)
            .field("restarts", &self.restarts)
            .finish()
    }
}

impl InteractionSelector {
    pub fn new(state_budget: usize, restarts: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            state_budget,
            restarts: restarts.max(1),
            rng,
        }
    }

    /// Partition `hot`, re-using groupings from `previous` where its members
    /// are still hot. The returned partitioning never exceeds the state
    /// budget.
    pub fn choose(
        &mut self,
        hot: &HotSet,
        previous: &IndexPartitioning,
        doi: &dyn InteractionSource,
    ) -> IndexPartitioning {
        if hot.is_empty() {
            return IndexPartitioning::default();
        }

        let mut best: Option<(f64, IndexPartitioning)> = None;
        for _ in 0..self.restarts {
            let candidate = self.build_once(hot, previous, doi);
            let cost = candidate.uncaptured_interaction(doi);
            if best.as_ref().is_none_or(|(best_cost, _)| cost < *best_cost) {
                best = Some((cost, candidate));
            }
        }
        let (cost, partitioning) = best.expect("at least one restart ran");
        debug!(
            subsets = partitioning.len(),
            states = partitioning.state_count(),
            uncaptured = cost,
            "chose hot-set partitioning"
        );
        partitioning
    }

    fn build_once(
        &mut self,
        hot: &HotSet,
        previous: &IndexPartitioning,
        doi: &dyn InteractionSource,
    ) -> IndexPartitioning {
        let mut groups: Vec<Group> = hot.iter().map(|id| Group::from_slice(&[id])).collect();

        self.remerge_previous_pairs(&mut groups, hot, previous);
        self.randomized_merges(&mut groups, doi);

        IndexPartitioning::new(
            groups
                .into_iter()
                .map(|g| Arc::new(Subset::new(g)))
                .collect(),
        )
    }

    /// Greedily restore pairs that shared a subset in the previous
    /// partitioning, as long as both members are still hot and the budget
    /// holds. Keeps DP state portable across reorganizations.
    fn remerge_previous_pairs(
        &self,
        groups: &mut Vec<Group>,
        hot: &HotSet,
        previous: &IndexPartitioning,
    ) {
        let members: Vec<IndexId> = hot.iter().collect();
        for (i, &a) in members.iter().enumerate() {
            for &b in &members[i + 1..] {
                if !previous.together(a, b) {
                    continue;
                }
                let (ga, gb) = match (position_of(groups, a), position_of(groups, b)) {
                    (Some(ga), Some(gb)) if ga != gb => (ga, gb),
                    _ => continue,
                };
                let merged_states = 1usize << (groups[ga].len() + groups[gb].len());
                let next_count = state_count(groups) + merged_states
                    - groups[ga].num_states()
                    - groups[gb].num_states();
                if next_count <= self.state_budget {
                    merge(groups, ga, gb);
                }
            }
        }
    }

    /// Sample merges proportional to interaction weight until nothing more
    /// can be merged within the budget.
    fn randomized_merges(&mut self, groups: &mut Vec<Group>, doi: &dyn InteractionSource) {
        loop {
            let candidates = self.merge_candidates(groups, doi);
            if candidates.is_empty() {
                break;
            }
            let total: f64 = candidates.iter().map(|c| c.weight).sum();
            let mut threshold = self.rng.random_range(0.0..total);
            let mut chosen = candidates.len() - 1;
            for (pos, candidate) in candidates.iter().enumerate() {
                threshold -= candidate.weight;
                if threshold <= 0.0 {
                    chosen = pos;
                    break;
                }
            }
            let candidate = &candidates[chosen];
            merge(groups, candidate.first, candidate.second);
        }
    }

    fn merge_candidates(
        &self,
        groups: &[Group],
        doi: &dyn InteractionSource,
    ) -> Vec<MergeCandidate> {
        let current_count = state_count(groups);
        let mut candidates = Vec::new();
        let mut any_singleton_pair = false;

        for first in 0..groups.len() {
            for second in first + 1..groups.len() {
                let mut doi_sum = 0.0;
                for &a in &groups[first] {
                    for &b in &groups[second] {
                        doi_sum += doi.doi(a, b);
                    }
                }
                if doi_sum <= 0.0 {
                    continue;
                }
                let states_first = 1usize << groups[first].len();
                let states_second = 1usize << groups[second].len();
                let merged_states = 1usize << (groups[first].len() + groups[second].len());
                if current_count + merged_states - states_first - states_second > self.state_budget
                {
                    continue;
                }
                let singleton_pair = groups[first].len() == 1 && groups[second].len() == 1;
                let weight = if singleton_pair {
                    doi_sum
                } else {
                    // charge larger merges for the extra states they create
                    doi_sum / (merged_states - states_first - states_second) as f64
                };
                any_singleton_pair |= singleton_pair;
                candidates.push(MergeCandidate {
                    first,
                    second,
                    weight,
                    singleton_pair,
                });
            }
        }

        // singleton merges keep state growth minimal, so they always win
        // over larger merges when available
        if any_singleton_pair {
            candidates.retain(|c| c.singleton_pair);
        }
        candidates
    }
}

trait GroupStates {
    fn num_states(&self) -> usize;
}

impl GroupStates for Group {
    fn num_states(&self) -> usize {
        1usize << self.len()
    }
}

fn state_count(groups: &[Group]) -> usize {
    groups.iter().map(|g| g.num_states()).sum()
}

fn position_of(groups: &[Group], id: IndexId) -> Option<usize> {
    groups.iter().position(|g| g.contains(&id))
}

fn merge(groups: &mut Vec<Group>, first: usize, second: usize) {
    debug_assert_ne!(first, second);
    let (keep, remove) = if first < second {
        (first, second)
    } else {
        (second, first)
    };
    let absorbed = groups.swap_remove(remove);
    groups[keep].extend_from_slice(&absorbed);
    groups[keep].sort_unstable();
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PairDoi(Vec<((IndexId, IndexId), f64)>);

    impl InteractionSource for PairDoi {
        fn doi(&self, a: IndexId, b: IndexId) -> f64 {
            let key = if a <= b { (a, b) } else { (b, a) };
            self.0
                .iter()
                .find(|(k, _)| *k == key)
                .map_or(0.0, |(_, v)| *v)
        }
    }

    fn selector(budget: usize) -> InteractionSelector {
        InteractionSelector::new(budget, 4, Some(42))
    }

    #[test]
    fn test_empty_hot_set_gives_empty_partitioning() {
        let mut sel = selector(16);
        let result = sel.choose(
            &HotSet::empty(),
            &IndexPartitioning::default(),
            &PairDoi(vec![]),
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_no_interaction_stays_singleton() {
        let mut sel = selector(64);
        let hot = HotSet::from_ids(vec![0, 1, 2]);
        let result = sel.choose(&hot, &IndexPartitioning::default(), &PairDoi(vec![]));
        assert_eq!(result.len(), 3);
        assert_eq!(result.state_count(), 6);
    }

    #[test]
    fn test_interacting_pair_gets_merged() {
        let mut sel = selector(64);
        let hot = HotSet::from_ids(vec![0, 1, 2]);
        let doi = PairDoi(vec![((0, 1), 10.0)]);
        let result = sel.choose(&hot, &IndexPartitioning::default(), &doi);
        assert!(result.together(0, 1));
        assert!(!result.together(0, 2));
    }

    #[test]
    fn test_budget_is_never_exceeded() {
        // every pair interacts, so only the budget stops the merging
        let mut sel = selector(8);
        let hot = HotSet::from_ids(vec![0, 1, 2, 3]);
        let doi = PairDoi(vec![
            ((0, 1), 5.0),
            ((0, 2), 5.0),
            ((0, 3), 5.0),
            ((1, 2), 5.0),
            ((1, 3), 5.0),
            ((2, 3), 5.0),
        ]);
        let result = sel.choose(&hot, &IndexPartitioning::default(), &doi);
        assert!(result.state_count() <= 8);
        assert_eq!(result.index_count(), 4);
    }

    #[test]
    fn test_previous_grouping_is_restored() {
        let mut sel = selector(64);
        let hot = HotSet::from_ids(vec![0, 1, 2]);
        let previous = IndexPartitioning::new(vec![
            Arc::new(Subset::new(Group::from_slice(&[0, 2]))),
            Arc::new(Subset::new(Group::from_slice(&[1]))),
        ]);
        // no measured interaction at all: only the re-merge seeding can
        // put 0 and 2 back together
        let result = sel.choose(&hot, &previous, &PairDoi(vec![]));
        assert!(result.together(0, 2));
    }

    #[test]
    fn test_all_members_covered_exactly_once() {
        let mut sel = selector(32);
        let hot = HotSet::from_ids(vec![0, 1, 2, 3, 4]);
        let doi = PairDoi(vec![((0, 1), 3.0), ((2, 3), 2.0), ((3, 4), 1.0)]);
        let result = sel.choose(&hot, &IndexPartitioning::default(), &doi);
        let mut members: Vec<IndexId> = result
            .subsets()
            .iter()
            .flat_map(|s| s.members().iter().copied())
            .collect();
        members.sort_unstable();
        assert_eq!(members, vec![0, 1, 2, 3, 4]);
    }
}
