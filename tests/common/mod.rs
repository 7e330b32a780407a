//! Shared in-memory oracle fixtures for integration tests.

use indextune::{
    CandidateDiscovery, CandidatePool, Configuration, Error, Index, IndexId, ProfiledQuery,
    QueryProfiler, Result, Snapshot,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Route engine tracing through the test harness; safe to call from every
/// test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// One statement's behavior in the fixture workload.
#[derive(Debug, Clone, Default)]
pub struct StatementSpec {
    /// Cost with no relevant index materialized.
    pub base_cost: f64,
    /// (index name, creation cost, size, saving when materialized).
    pub indexes: Vec<(String, f64, u64, f64)>,
    /// Extra pairwise saving when both named indexes are materialized.
    pub interactions: Vec<(String, String, f64)>,
}

impl StatementSpec {
    pub fn new(base_cost: f64) -> Self {
        Self {
            base_cost,
            ..Self::default()
        }
    }

    pub fn with_index(mut self, name: &str, creation_cost: f64, saving: f64) -> Self {
        self.indexes
            .push((name.to_string(), creation_cost, 1024, saving));
        self
    }

    pub fn with_interaction(mut self, a: &str, b: &str, saving: f64) -> Self {
        self.interactions
            .push((a.to_string(), b.to_string(), saving));
        self
    }
}

/// Deterministic discovery + profiler pair driven by a statement table.
/// Statements not in the table fail profiling, which doubles as the
/// external-failure fixture.
#[derive(Debug, Default)]
pub struct FixtureOracle {
    statements: RwLock<HashMap<String, StatementSpec>>,
}

impl FixtureOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn define(&self, sql: &str, spec: StatementSpec) {
        self.statements.write().insert(sql.to_string(), spec);
    }
}

impl CandidateDiscovery for FixtureOracle {
    fn recommend_indexes(&self, sql: &str, pool: &CandidatePool) -> Result<Vec<Arc<Index>>> {
        let statements = self.statements.read();
        let spec = statements
            .get(sql)
            .ok_or_else(|| Error::Discovery(format!("no candidates for: {sql}")))?;
        Ok(spec
            .indexes
            .iter()
            .map(|(name, creation_cost, size, _)| pool.register(name, *creation_cost, *size))
            .collect())
    }
}

impl QueryProfiler for FixtureOracle {
    fn profile(&self, sql: &str, snapshot: &Snapshot) -> Result<Box<dyn ProfiledQuery>> {
        let statements = self.statements.read();
        let spec = statements
            .get(sql)
            .ok_or_else(|| Error::Oracle(format!("cannot profile: {sql}")))?;

        let mut savings = HashMap::new();
        let mut candidates = Vec::new();
        for (name, _, _, saving) in &spec.indexes {
            if let Some(index) = snapshot.iter().find(|i| i.name() == name) {
                savings.insert(index.id(), *saving);
                candidates.push(index.id());
            }
        }
        let mut interactions = HashMap::new();
        for (a, b, saving) in &spec.interactions {
            let a = snapshot.iter().find(|i| i.name() == a).map(|i| i.id());
            let b = snapshot.iter().find(|i| i.name() == b).map(|i| i.id());
            if let (Some(a), Some(b)) = (a, b) {
                interactions.insert(pair(a, b), *saving);
            }
        }
        Ok(Box::new(FixtureQuery {
            base_cost: spec.base_cost,
            candidates,
            savings,
            interactions,
        }))
    }
}

fn pair(a: IndexId, b: IndexId) -> (IndexId, IndexId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

struct FixtureQuery {
    base_cost: f64,
    candidates: Vec<IndexId>,
    savings: HashMap<IndexId, f64>,
    interactions: HashMap<(IndexId, IndexId), f64>,
}

impl ProfiledQuery for FixtureQuery {
    fn candidates(&self) -> &[IndexId] {
        &self.candidates
    }

    fn total_cost(&self, config: &Configuration) -> f64 {
        let mut cost = self.base_cost;
        let present: Vec<IndexId> = self
            .candidates
            .iter()
            .copied()
            .filter(|id| config.contains(*id))
            .collect();
        for id in &present {
            cost -= self.savings.get(id).copied().unwrap_or(0.0);
        }
        for (i, &a) in present.iter().enumerate() {
            for &b in &present[i + 1..] {
                cost -= self.interactions.get(&pair(a, b)).copied().unwrap_or(0.0);
            }
        }
        cost.max(0.0)
    }

    fn plan_cost(&self, config: &Configuration) -> f64 {
        self.total_cost(config)
    }

    fn maintenance_cost(&self, _config: &Configuration) -> f64 {
        0.0
    }

    fn interaction_level(&self, a: IndexId, b: IndexId) -> f64 {
        self.interactions.get(&pair(a, b)).copied().unwrap_or(0.0)
    }

    fn best_benefit(&self, id: IndexId, config: &Configuration) -> f64 {
        let mut with = config.clone();
        with.set(id);
        self.total_cost(config) - self.total_cost(&with)
    }
}
