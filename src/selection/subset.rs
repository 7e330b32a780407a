//! Partition subsets and their local state numbering.

use crate::configuration::Configuration;
use crate::pool::IndexId;
use smallvec::SmallVec;

/// An ordered group of hot-set indexes sharing one combinatorial state
/// space. Member position defines the local bit numbering: bit `i` of a
/// local state corresponds to `members()[i]`, so local states `0..2^k` are
/// in bijection with member combinations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subset {
    members: SmallVec<[IndexId; 8]>,
}

impl Subset {
    pub fn new(mut members: SmallVec<[IndexId; 8]>) -> Self {
        members.sort_unstable();
        members.dedup();
        Self { members }
    }

    pub fn singleton(id: IndexId) -> Self {
        Self {
            members: SmallVec::from_slice(&[id]),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn num_states(&self) -> usize {
        1usize << self.members.len()
    }

    pub fn members(&self) -> &[IndexId] {
        &self.members
    }

    pub fn contains(&self, id: IndexId) -> bool {
        self.members.binary_search(&id).is_ok()
    }

    pub fn position_of(&self, id: IndexId) -> Option<usize> {
        self.members.binary_search(&id).ok()
    }

    /// Project a global configuration onto this subset's local state.
    pub fn state_of(&self, config: &Configuration) -> usize {
        let mut state = 0usize;
        for (pos, &id) in self.members.iter().enumerate() {
            if config.contains(id) {
                state |= 1 << pos;
            }
        }
        state
    }

    /// Overwrite this subset's member bits in `config` according to a local
    /// state; bits of non-members are untouched.
    pub fn apply_state(&self, state: usize, config: &mut Configuration) {
        debug_assert!(state < self.num_states());
        for (pos, &id) in self.members.iter().enumerate() {
            if state & (1 << pos) != 0 {
                config.set(id);
            } else {
                config.clear(id);
            }
        }
    }

    /// The configuration holding exactly the members set in `state`.
    pub fn config_of(&self, state: usize) -> Configuration {
        let mut config = Configuration::new();
        self.apply_state(state, &mut config);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subset(ids: &[IndexId]) -> Subset {
        Subset::new(SmallVec::from_slice(ids))
    }

    #[test]
    fn test_local_bit_numbering_follows_member_order() {
        let s = subset(&[7, 2, 11]);
        // members are kept sorted: [2, 7, 11]
        assert_eq!(s.position_of(2), Some(0));
        assert_eq!(s.position_of(7), Some(1));
        assert_eq!(s.position_of(11), Some(2));
        assert_eq!(s.position_of(3), None);
    }

    #[test]
    fn test_state_round_trip_is_bijective() {
        let s = subset(&[1, 4, 9]);
        for state in 0..s.num_states() {
            let config = s.config_of(state);
            assert_eq!(s.state_of(&config), state);
        }
    }

    #[test]
    fn test_projection_ignores_foreign_bits() {
        let s = subset(&[3, 5]);
        let config = Configuration::with_indexes(&[3, 80]);
        assert_eq!(s.state_of(&config), 0b01);
    }

    #[test]
    fn test_apply_state_preserves_foreign_bits() {
        let s = subset(&[0, 1]);
        let mut config = Configuration::with_indexes(&[1, 42]);
        s.apply_state(0b01, &mut config);
        assert!(config.contains(0));
        assert!(!config.contains(1));
        assert!(config.contains(42));
    }
}
