//! Units of work flowing through the advisor pipeline.

use crate::configuration::Configuration;
use crate::error::Result;
use crate::oracle::ProfiledQuery;
use crate::pool::{IndexId, Snapshot};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

/// Task lifecycle. Cancellation is cooperative: a cancelled task is skipped
/// by whichever worker dequeues it next, never interrupted mid-computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Unscheduled,
    Scheduled,
    Cancelled,
}

const STATUS_UNSCHEDULED: u8 = 0;
const STATUS_SCHEDULED: u8 = 1;
const STATUS_CANCELLED: u8 = 2;

#[derive(Debug, Clone)]
pub(crate) enum TaskKind {
    Query { sql: String },
    PositiveVote { id: IndexId },
    NegativeVote { id: IndexId },
}

/// One submission travelling through the profiling, selection and
/// completion queues. Workers communicate only through the task object;
/// the submitter retrieves the outcome after completion.
pub struct Task {
    id: u64,
    kind: TaskKind,
    status: AtomicU8,
    profiled: Mutex<Option<Box<dyn ProfiledQuery>>>,
    snapshot: Mutex<Option<Snapshot>>,
    outcome: Mutex<Option<Result<Configuration>>>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("status", &self.status())
            .finish()
    }
}

impl Task {
    pub(crate) fn query(id: u64, sql: String) -> Self {
        Self::new(id, TaskKind::Query { sql })
    }

    pub(crate) fn vote(id: u64, index: IndexId, positive: bool) -> Self {
        let kind = if positive {
            TaskKind::PositiveVote { id: index }
        } else {
            TaskKind::NegativeVote { id: index }
        };
        Self::new(id, kind)
    }

    fn new(id: u64, kind: TaskKind) -> Self {
        Self {
            id,
            kind,
            status: AtomicU8::new(STATUS_UNSCHEDULED),
            profiled: Mutex::new(None),
            snapshot: Mutex::new(None),
            outcome: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn status(&self) -> TaskStatus {
        match self.status.load(Ordering::Acquire) {
            STATUS_UNSCHEDULED => TaskStatus::Unscheduled,
            STATUS_SCHEDULED => TaskStatus::Scheduled,
            _ => TaskStatus::Cancelled,
        }
    }

    pub(crate) fn mark_scheduled(&self) {
        self.status.store(STATUS_SCHEDULED, Ordering::Release);
    }

    pub(crate) fn mark_cancelled(&self) {
        self.status.store(STATUS_CANCELLED, Ordering::Release);
    }

    pub(crate) fn mark_done(&self) {
        self.status.store(STATUS_UNSCHEDULED, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.status.load(Ordering::Acquire) == STATUS_CANCELLED
    }

    pub(crate) fn attach_profile(&self, profiled: Box<dyn ProfiledQuery>, snapshot: Snapshot) {
        *self.profiled.lock() = Some(profiled);
        *self.snapshot.lock() = Some(snapshot);
    }

    pub(crate) fn take_profile(&self) -> Option<(Box<dyn ProfiledQuery>, Snapshot)> {
        let profiled = self.profiled.lock().take()?;
        let snapshot = self.snapshot.lock().take()?;
        Some((profiled, snapshot))
    }

    pub(crate) fn set_outcome(&self, outcome: Result<Configuration>) {
        *self.outcome.lock() = Some(outcome);
    }

    pub(crate) fn take_outcome(&self) -> Option<Result<Configuration>> {
        self.outcome.lock().take()
    }
}
