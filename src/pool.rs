//! Candidate index registry.
//!
//! Every index the discovery collaborator ever proposes is interned here and
//! assigned a stable small-integer id. Ids double as bit positions in
//! [`crate::Configuration`], so the pool only grows and never reuses ids.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Stable identifier of a candidate index; also its bit position in a
/// [`crate::Configuration`].
pub type IndexId = u32;

/// An immutable candidate index. Identity is the pool-assigned id; two
/// `Index` values with the same id are the same index.
#[derive(Debug, Clone)]
pub struct Index {
    id: IndexId,
    name: String,
    creation_cost: f64,
    size_bytes: u64,
}

impl Index {
    pub fn id(&self) -> IndexId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// One-time cost of materializing this index.
    pub fn creation_cost(&self) -> f64 {
        self.creation_cost
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Index {}

impl std::hash::Hash for Index {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    entries: Vec<Arc<Index>>,
    by_name: HashMap<String, IndexId>,
}

/// Append-only registry of every candidate index discovered so far.
///
/// The pool owns the id arena: ids are handed out densely in registration
/// order. Registration deduplicates by index name, so re-discovering the
/// same index across queries returns the original entry.
#[derive(Debug, Default)]
pub struct CandidatePool {
    inner: RwLock<PoolInner>,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an index, returning the existing entry when the name is
    /// already registered.
    pub fn register(&self, name: &str, creation_cost: f64, size_bytes: u64) -> Arc<Index> {
        let mut inner = self.inner.write();
        if let Some(&id) = inner.by_name.get(name) {
            return Arc::clone(&inner.entries[id as usize]);
        }
        let id = inner.entries.len() as IndexId;
        let entry = Arc::new(Index {
            id,
            name: name.to_string(),
            creation_cost,
            size_bytes,
        });
        inner.entries.push(Arc::clone(&entry));
        inner.by_name.insert(name.to_string(), id);
        entry
    }

    pub fn get(&self, id: IndexId) -> Option<Arc<Index>> {
        self.inner.read().entries.get(id as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Immutable view of the pool at this instant. Because the pool is
    /// append-only, two snapshots with the same length are identical.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.inner.read().entries.clone().into(),
        }
    }
}

/// Immutable view over the candidate pool.
#[derive(Debug, Clone)]
pub struct Snapshot {
    entries: Arc<[Arc<Index>]>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Snapshot {
            entries: Vec::new().into(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: IndexId) -> Option<&Arc<Index>> {
        self.entries.get(id as usize)
    }

    pub fn contains(&self, id: IndexId) -> bool {
        (id as usize) < self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Index>> {
        self.entries.iter()
    }
}
