//! Disjoint covers of the hot set.

use crate::pool::IndexId;
use crate::selection::hot_set::HotSet;
use crate::selection::subset::Subset;
use std::sync::Arc;

/// Answers degree-of-interaction queries for partitioning decisions.
pub trait InteractionSource {
    fn doi(&self, a: IndexId, b: IndexId) -> f64;
}

/// A disjoint cover of the hot set by [`Subset`]s.
///
/// Invariants: every hot index belongs to exactly one subset, and the total
/// state count (sum of `2^|subset|`) stays within the budget the
/// interaction selector was configured with.
#[derive(Debug, Clone, Default)]
pub struct IndexPartitioning {
    subsets: Vec<Arc<Subset>>,
}

impl IndexPartitioning {
    pub fn new(subsets: Vec<Arc<Subset>>) -> Self {
        debug_assert!(
            {
                let mut seen = std::collections::HashSet::new();
                subsets
                    .iter()
                    .flat_map(|s| s.members().iter())
                    .all(|id| seen.insert(*id))
            },
            "partitioning subsets must be disjoint"
        );
        Self { subsets }
    }

    pub fn singletons(hot: &HotSet) -> Self {
        Self {
            subsets: hot.iter().map(|id| Arc::new(Subset::singleton(id))).collect(),
        }
    }

    pub fn subsets(&self) -> &[Arc<Subset>] {
        &self.subsets
    }

    pub fn len(&self) -> usize {
        self.subsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subsets.is_empty()
    }

    /// Total number of DP states across all subsets.
    pub fn state_count(&self) -> usize {
        self.subsets.iter().map(|s| s.num_states()).sum()
    }

    pub fn index_count(&self) -> usize {
        self.subsets.iter().map(|s| s.len()).sum()
    }

    pub fn subset_of(&self, id: IndexId) -> Option<&Arc<Subset>> {
        self.subsets.iter().find(|s| s.contains(id))
    }

    /// Whether two indexes share a subset here.
    pub fn together(&self, a: IndexId, b: IndexId) -> bool {
        self.subset_of(a).is_some_and(|s| s.contains(b))
    }

    /// Set-of-sets equality, independent of subset order.
    pub fn same_groups(&self, other: &IndexPartitioning) -> bool {
        if self.subsets.len() != other.subsets.len() {
            return false;
        }
        self.subsets
            .iter()
            .all(|s| other.subsets.iter().any(|o| o.as_ref() == s.as_ref()))
    }

    /// Interaction not captured by this partitioning: the doi mass between
    /// indexes that ended up in different subsets.
    pub fn uncaptured_interaction(&self, doi: &dyn InteractionSource) -> f64 {
        let mut total = 0.0;
        for (i, s1) in self.subsets.iter().enumerate() {
            for s2 in &self.subsets[i + 1..] {
                for &a in s1.members() {
                    for &b in s2.members() {
                        total += doi.doi(a, b);
                    }
                }
            }
        }
        total
    }
}
