//! Invalidation events and their outcomes.
//!
//! An `InvalidationEvent` describes a committed mutation; `InvalidationPlan`
//! turns it into the cache removals that keep both caches coherent.

use std::fmt;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::MutationOperation;

/// Committed mutation that may have made cached artifacts stale.
#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    /// Correlates the log lines of one invalidation.
    pub id: Uuid,
    /// Affected schema; `None` when unknown or spanning several schemas.
    pub scope_id: Option<i64>,
    pub register_id: Option<i64>,
    pub operation: MutationOperation,
    /// Rows touched by the mutation, for log context.
    pub affected: Option<usize>,
    pub timestamp: OffsetDateTime,
}

impl InvalidationEvent {
    pub fn new(operation: MutationOperation, scope_id: Option<i64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope_id,
            register_id: None,
            operation,
            affected: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_register(mut self, register_id: Option<i64>) -> Self {
        self.register_id = register_id;
        self
    }

    pub fn with_affected(mut self, affected: usize) -> Self {
        self.affected = Some(affected);
        self
    }
}

/// Removals derived from one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationPlan {
    /// Drop every artifact of one schema from both caches.
    Schema(i64),
    /// Objects changed somewhere: drop the schema memory tier and all facet
    /// results, keep persisted snapshots and facet discovery.
    BroadObjects,
    /// Schemas changed somewhere: clear both caches completely.
    BroadStructural,
}

impl InvalidationPlan {
    pub fn from_event(event: &InvalidationEvent) -> Self {
        match event.scope_id {
            Some(schema_id) => InvalidationPlan::Schema(schema_id),
            None if event.operation.is_bulk() => InvalidationPlan::BroadObjects,
            None => InvalidationPlan::BroadStructural,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InvalidationPlan::Schema(_) => "schema",
            InvalidationPlan::BroadObjects => "broad_objects",
            InvalidationPlan::BroadStructural => "broad_structural",
        }
    }
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationPlan::Schema(id) => write!(f, "schema({id})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Result of the persistent-tier half of an invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierOutcome {
    Removed(u64),
    /// Persistent tier disabled by configuration or by the startup probe.
    Skipped,
    /// Table missing at call time; treated as nothing to remove.
    MissingTable,
    Failed(String),
}

impl TierOutcome {
    pub fn removed(&self) -> u64 {
        match self {
            TierOutcome::Removed(count) => *count,
            _ => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TierOutcome::Removed(_) => "removed",
            TierOutcome::Skipped => "skipped",
            TierOutcome::MissingTable => "missing_table",
            TierOutcome::Failed(_) => "failed",
        }
    }
}

/// What one cache removed while handling an invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
    pub cache: &'static str,
    pub persistent: TierOutcome,
    pub memory_removed: usize,
}

impl InvalidationReport {
    pub fn is_success(&self) -> bool {
        !matches!(self.persistent, TierOutcome::Failed(_))
    }

    pub fn failure(&self) -> Option<&str> {
        match &self.persistent {
            TierOutcome::Failed(reason) => Some(reason.as_str()),
            _ => None,
        }
    }
}

/// Terminal state of an invalidation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationOutcome {
    Succeeded { reports: Vec<InvalidationReport> },
    FailedLogged { reports: Vec<InvalidationReport> },
}

impl InvalidationOutcome {
    pub fn from_reports(reports: Vec<InvalidationReport>) -> Self {
        if reports.iter().all(InvalidationReport::is_success) {
            InvalidationOutcome::Succeeded { reports }
        } else {
            InvalidationOutcome::FailedLogged { reports }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvalidationOutcome::Succeeded { .. })
    }

    pub fn reports(&self) -> &[InvalidationReport] {
        match self {
            InvalidationOutcome::Succeeded { reports }
            | InvalidationOutcome::FailedLogged { reports } => reports,
        }
    }

    pub fn memory_removed(&self) -> usize {
        self.reports().iter().map(|report| report.memory_removed).sum()
    }
}
