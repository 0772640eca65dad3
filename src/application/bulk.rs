//! Bulk object operations and the cache invalidation that follows them.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::cache::{CacheInvalidator, InvalidationEvent, InvalidationOutcome};
use crate::domain::types::MutationOperation;

/// Where a bulk operation applied; both parts are optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkScope {
    pub register_id: Option<i64>,
    pub schema_id: Option<i64>,
}

impl BulkScope {
    pub fn register(register_id: i64) -> Self {
        Self {
            register_id: Some(register_id),
            schema_id: None,
        }
    }

    pub fn schema(register_id: Option<i64>, schema_id: i64) -> Self {
        Self {
            register_id,
            schema_id: Some(schema_id),
        }
    }
}

/// Number of objects touched by a mutation, reported with the invalidation.
pub trait AffectedRows {
    fn affected_rows(&self) -> usize;
}

impl AffectedRows for usize {
    fn affected_rows(&self) -> usize {
        *self
    }
}

impl AffectedRows for u64 {
    fn affected_rows(&self) -> usize {
        usize::try_from(*self).unwrap_or(usize::MAX)
    }
}

impl<T> AffectedRows for Vec<T> {
    fn affected_rows(&self) -> usize {
        self.len()
    }
}

/// Runs bulk mutations and keeps the caches coherent with their results.
#[derive(Clone, Default)]
pub struct BulkOperationService {
    cache_invalidator: Option<Arc<CacheInvalidator>>,
}

impl BulkOperationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache invalidator for this service.
    pub fn with_cache_invalidator(mut self, invalidator: Arc<CacheInvalidator>) -> Self {
        self.cache_invalidator = Some(invalidator);
        self
    }

    /// Awaits `mutation`, then invalidates the caches before returning.
    ///
    /// A failed mutation is returned unchanged and invalidates nothing. Cache
    /// failures are logged by the invalidator and never replace the result.
    #[instrument(skip(self, mutation), fields(operation = %operation))]
    pub async fn execute<F, T, E>(
        &self,
        operation: MutationOperation,
        scope: BulkScope,
        mutation: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        T: AffectedRows,
    {
        let output = mutation.await?;
        let affected = output.affected_rows();

        match &self.cache_invalidator {
            Some(invalidator) => {
                let event = InvalidationEvent::new(operation, scope.schema_id)
                    .with_register(scope.register_id)
                    .with_affected(affected);
                let outcome: InvalidationOutcome = invalidator.invalidate(event).await;
                debug!(
                    affected,
                    succeeded = outcome.is_success(),
                    "Bulk operation invalidated caches"
                );
            }
            None => debug!(affected, "Bulk operation completed without cache invalidator"),
        }

        Ok(output)
    }
}
