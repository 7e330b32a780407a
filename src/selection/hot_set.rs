//! Hot-set selection: which bounded subset of candidates the combinatorial
//! machinery tracks.

use crate::configuration::Configuration;
use crate::pool::{IndexId, Snapshot};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Scores an index given the companions already chosen. `chosen` is empty
/// for independent scoring.
pub trait BenefitSource {
    fn benefit(&self, id: IndexId, chosen: &Configuration) -> f64;
}

/// The bounded set of candidate indexes currently tracked. Immutable; a new
/// hot set is built from scratch whenever composition should change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HotSet {
    members: Vec<IndexId>,
}

impl HotSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_ids(mut ids: Vec<IndexId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Self { members: ids }
    }

    pub fn contains(&self, id: IndexId) -> bool {
        self.members.binary_search(&id).is_ok()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = IndexId> + '_ {
        self.members.iter().copied()
    }

    pub fn as_slice(&self) -> &[IndexId] {
        &self.members
    }

    pub fn to_configuration(&self) -> Configuration {
        Configuration::with_indexes(&self.members)
    }
}

/// How additional hot-set slots are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SelectionStrategy {
    /// Independent top-k by score through a bounded min-heap. O(n log k),
    /// ignores interaction between picks.
    TopK,
    /// Greedy marginal gain, rescoring every remaining candidate against
    /// the picks made so far. O(k*n), accounts for interaction.
    #[default]
    GreedyMarginal,
}

#[derive(Debug, Clone, Copy)]
struct Scored {
    score: f64,
    id: IndexId,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        // lower score first, ties by higher id, so the heap root is always
        // the weakest entry
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.id.cmp(&self.id))
            .reverse()
    }
}

/// Chooses the bounded hot set from the candidate pool.
///
/// The required set (materialized plus pinned-by-vote indexes) is always
/// carried verbatim and never scored; remaining slots go to the candidates
/// with the best benefit-minus-penalty, where indexes that were already hot
/// pay no re-discovery penalty and cold ones are charged their creation
/// cost.
#[derive(Debug, Clone)]
pub struct HotSetSelector {
    max_size: usize,
    strategy: SelectionStrategy,
}

impl HotSetSelector {
    pub fn new(max_size: usize, strategy: SelectionStrategy) -> Self {
        Self { max_size, strategy }
    }

    pub fn choose(
        &self,
        snapshot: &Snapshot,
        previous: &HotSet,
        required: &Configuration,
        benefit: &dyn BenefitSource,
    ) -> HotSet {
        let required_ids: Vec<IndexId> = required.iter().collect();
        if self.max_size <= required_ids.len() {
            return HotSet::from_ids(required_ids);
        }
        let slots = self.max_size - required_ids.len();

        let candidates: Vec<IndexId> = (0..snapshot.len() as IndexId)
            .filter(|id| !required.contains(*id))
            .collect();

        let picks = match self.strategy {
            SelectionStrategy::TopK => self.pick_top_k(snapshot, previous, &candidates, benefit, slots),
            SelectionStrategy::GreedyMarginal => {
                self.pick_greedy(snapshot, previous, &candidates, benefit, slots)
            }
        };

        let mut members = required_ids;
        members.extend(picks);
        HotSet::from_ids(members)
    }

    fn penalty(&self, snapshot: &Snapshot, previous: &HotSet, id: IndexId) -> f64 {
        if previous.contains(id) {
            0.0
        } else {
            snapshot.get(id).map_or(0.0, |index| index.creation_cost())
        }
    }

    fn pick_top_k(
        &self,
        snapshot: &Snapshot,
        previous: &HotSet,
        candidates: &[IndexId],
        benefit: &dyn BenefitSource,
        slots: usize,
    ) -> Vec<IndexId> {
        let empty = Configuration::new();
        let mut heap: BinaryHeap<Scored> = BinaryHeap::with_capacity(slots + 1);
        for &id in candidates {
            let score = benefit.benefit(id, &empty) - self.penalty(snapshot, previous, id);
            heap.push(Scored { score, id });
            if heap.len() > slots {
                heap.pop();
            }
        }
        heap.into_iter().map(|s| s.id).collect()
    }

    fn pick_greedy(
        &self,
        snapshot: &Snapshot,
        previous: &HotSet,
        candidates: &[IndexId],
        benefit: &dyn BenefitSource,
        slots: usize,
    ) -> Vec<IndexId> {
        let mut remaining: Vec<IndexId> = candidates.to_vec();
        let mut chosen = Configuration::new();
        let mut picks = Vec::with_capacity(slots);

        for _ in 0..slots {
            let mut best: Option<(usize, f64)> = None;
            for (pos, &id) in remaining.iter().enumerate() {
                let score = benefit.benefit(id, &chosen) - self.penalty(snapshot, previous, id);
                let better = match best {
                    None => true,
                    Some((best_pos, best_score)) => {
                        score > best_score || (score == best_score && id < remaining[best_pos])
                    }
                };
                if better {
                    best = Some((pos, score));
                }
            }
            let Some((pos, _)) = best else {
                break;
            };
            let id = remaining.swap_remove(pos);
            chosen.set(id);
            picks.push(id);
        }
        picks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::CandidatePool;
    use std::collections::HashMap;

    struct TableBenefit {
        base: HashMap<IndexId, f64>,
        doi: HashMap<(IndexId, IndexId), f64>,
    }

    impl BenefitSource for TableBenefit {
        fn benefit(&self, id: IndexId, chosen: &Configuration) -> f64 {
            let mut total = self.base.get(&id).copied().unwrap_or(0.0);
            for other in chosen.iter() {
                let key = if id <= other { (id, other) } else { (other, id) };
                total += self.doi.get(&key).copied().unwrap_or(0.0);
            }
            total
        }
    }

    fn pool_with(costs: &[f64]) -> CandidatePool {
        let pool = CandidatePool::new();
        for (i, &cost) in costs.iter().enumerate() {
            pool.register(&format!("idx_{i}"), cost, 1024);
        }
        pool
    }

    #[test]
    fn test_required_returned_verbatim_when_full() {
        let pool = pool_with(&[1.0, 1.0, 1.0]);
        let selector = HotSetSelector::new(2, SelectionStrategy::TopK);
        let required = Configuration::with_indexes(&[0, 2]);
        let benefit = TableBenefit {
            base: HashMap::from([(1, 100.0)]),
            doi: HashMap::new(),
        };
        let hot = selector.choose(&pool.snapshot(), &HotSet::empty(), &required, &benefit);
        assert_eq!(hot.as_slice(), &[0, 2]);
    }

    #[test]
    fn test_top_k_picks_best_scores() {
        let pool = pool_with(&[0.0, 0.0, 0.0, 0.0]);
        let selector = HotSetSelector::new(2, SelectionStrategy::TopK);
        let benefit = TableBenefit {
            base: HashMap::from([(0, 1.0), (1, 9.0), (2, 3.0), (3, 7.0)]),
            doi: HashMap::new(),
        };
        let hot = selector.choose(
            &pool.snapshot(),
            &HotSet::empty(),
            &Configuration::new(),
            &benefit,
        );
        assert_eq!(hot.as_slice(), &[1, 3]);
    }

    #[test]
    fn test_cold_indexes_pay_creation_penalty() {
        let pool = pool_with(&[0.0, 5.0]);
        let selector = HotSetSelector::new(1, SelectionStrategy::TopK);
        // index 1 scores higher raw but pays its creation cost; index 0 wins
        let benefit = TableBenefit {
            base: HashMap::from([(0, 4.0), (1, 6.0)]),
            doi: HashMap::new(),
        };
        let hot = selector.choose(
            &pool.snapshot(),
            &HotSet::empty(),
            &Configuration::new(),
            &benefit,
        );
        assert_eq!(hot.as_slice(), &[0]);

        // once index 1 is already hot the penalty disappears and it wins
        let previous = HotSet::from_ids(vec![1]);
        let hot = selector.choose(&pool.snapshot(), &previous, &Configuration::new(), &benefit);
        assert_eq!(hot.as_slice(), &[1]);
    }

    #[test]
    fn test_greedy_accounts_for_interaction() {
        let pool = pool_with(&[0.0, 0.0, 0.0]);
        let selector = HotSetSelector::new(2, SelectionStrategy::GreedyMarginal);
        // 1 is the strongest alone; 0 interacts heavily with 1, beating 2
        let benefit = TableBenefit {
            base: HashMap::from([(0, 1.0), (1, 10.0), (2, 3.0)]),
            doi: HashMap::from([((0, 1), 5.0)]),
        };
        let hot = selector.choose(
            &pool.snapshot(),
            &HotSet::empty(),
            &Configuration::new(),
            &benefit,
        );
        assert_eq!(hot.as_slice(), &[0, 1]);
    }

    #[test]
    fn test_output_bounded_and_superset_of_required() {
        let pool = pool_with(&[1.0; 6]);
        let selector = HotSetSelector::new(4, SelectionStrategy::GreedyMarginal);
        let required = Configuration::with_indexes(&[5]);
        let benefit = TableBenefit {
            base: HashMap::from([(0, 2.0), (1, 3.0), (2, 4.0), (3, 5.0), (4, 6.0)]),
            doi: HashMap::new(),
        };
        let hot = selector.choose(&pool.snapshot(), &HotSet::empty(), &required, &benefit);
        assert!(hot.len() <= 4);
        assert!(hot.contains(5));
    }
}
