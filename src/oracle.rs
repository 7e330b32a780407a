//! External collaborator interfaces.
//!
//! The engine never parses SQL or talks to a database itself. A
//! [`QueryProfiler`] turns a statement into a [`ProfiledQuery`] handle that
//! can answer cost questions for any hypothetical configuration, and a
//! [`CandidateDiscovery`] proposes indexes worth tracking for a statement.
//! Both run on the profiling stage of the pipeline and may block on I/O.

use crate::configuration::Configuration;
use crate::error::Result;
use crate::pool::{CandidatePool, Index, IndexId, Snapshot};
use std::sync::Arc;

/// Per-statement cost handle produced by the profiler.
///
/// All answers must be deterministic for a fixed configuration within the
/// lifetime of one handle; the selection stage evaluates the same states
/// repeatedly and relies on getting the same numbers back.
pub trait ProfiledQuery: Send + Sync {
    /// Ids of the candidate indexes relevant to this statement.
    fn candidates(&self) -> &[IndexId];

    /// Full cost of executing the statement with `config` materialized,
    /// including index maintenance.
    fn total_cost(&self, config: &Configuration) -> f64;

    /// Execution cost alone under `config`.
    fn plan_cost(&self, config: &Configuration) -> f64;

    /// Cost of keeping the indexes in `config` up to date across this
    /// statement.
    fn maintenance_cost(&self, config: &Configuration) -> f64;

    /// Measured degree of interaction between two candidate indexes.
    fn interaction_level(&self, a: IndexId, b: IndexId) -> f64;

    /// Best-case benefit of `id` on top of the `config` baseline.
    fn best_benefit(&self, id: IndexId, config: &Configuration) -> f64;
}

/// Builds [`ProfiledQuery`] handles. Typically a what-if optimizer wrapper.
pub trait QueryProfiler: Send + Sync {
    fn profile(&self, sql: &str, snapshot: &Snapshot) -> Result<Box<dyn ProfiledQuery>>;
}

/// Proposes candidate indexes for a statement, registering any new ones in
/// the pool so they carry stable ids.
pub trait CandidateDiscovery: Send + Sync {
    fn recommend_indexes(&self, sql: &str, pool: &CandidatePool) -> Result<Vec<Arc<Index>>>;
}
