use std::fmt;

use rolesync_core::ObjectKey;
use rolesync_storage::StoreError;
use thiserror::Error;

use super::apply::ApplyFailure;
use crate::planner::PlannerError;

/// Every failure of one reconcile pass.
#[derive(Debug, Clone)]
pub struct AggregateError {
    pub owner: ObjectKey,
    pub failures: Vec<ApplyFailure>,
}

impl AggregateError {
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// True when any failure may go away on its own.
    pub fn is_retryable(&self) -> bool {
        self.failures.iter().any(ApplyFailure::is_retryable)
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failure(s) reconciling {}",
            self.failures.len(),
            self.owner
        )?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// Fetching the owner failed.
    #[error("Failed to fetch {owner}: {source}")]
    Store {
        owner: ObjectKey,
        #[source]
        source: StoreError,
    },

    /// The planner could not produce a desired set; nothing was applied.
    #[error("Planning failed for {owner}: {source}")]
    Planner {
        owner: ObjectKey,
        #[source]
        source: PlannerError,
    },

    #[error("Reconcile of {owner} cancelled")]
    Cancelled { owner: ObjectKey },

    #[error(transparent)]
    Apply(#[from] AggregateError),
}

impl ReconcileError {
    /// Conflicts, timeouts, connection errors and cancellation are expected to
    /// clear up; planner errors and rejected objects need the owner to change.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Store { source, .. } => source.is_retryable(),
            ReconcileError::Planner { .. } => false,
            ReconcileError::Cancelled { .. } => true,
            ReconcileError::Apply(aggregate) => aggregate.is_retryable(),
        }
    }

    pub fn owner(&self) -> &ObjectKey {
        match self {
            ReconcileError::Store { owner, .. }
            | ReconcileError::Planner { owner, .. }
            | ReconcileError::Cancelled { owner } => owner,
            ReconcileError::Apply(aggregate) => &aggregate.owner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::apply::{ApplyError, Step};
    use rolesync_core::Kind;
    use std::time::Duration;

    fn failure(step: Step, error: StoreError) -> ApplyFailure {
        ApplyFailure {
            kind: Kind::Role,
            key: Some(ObjectKey::new("ns", "r")),
            step,
            error: ApplyError::Store(error),
        }
    }

    #[test]
    fn test_aggregate_display_lists_every_failure() {
        let err = ReconcileError::from(AggregateError {
            owner: ObjectKey::new("ns", "simplest"),
            failures: vec![
                failure(Step::Create, StoreError::forbidden("no")),
                failure(Step::Delete, StoreError::internal("boom")),
            ],
        });

        let message = err.to_string();
        assert!(message.starts_with("2 failure(s) reconciling ns/simplest"));
        assert!(message.contains("create Role ns/r: Forbidden: no"));
        assert!(message.contains("delete Role ns/r: Internal error: boom"));
        assert!(!err.is_retryable());
        assert_eq!(err.owner(), &ObjectKey::new("ns", "simplest"));
    }

    #[test]
    fn test_retryable_classification() {
        let owner = ObjectKey::new("", "o");
        let timeout = ReconcileError::Store {
            owner: owner.clone(),
            source: StoreError::timeout("get_owner", Duration::from_secs(1)),
        };
        assert!(timeout.is_retryable());

        let planner = ReconcileError::Planner {
            owner: owner.clone(),
            source: PlannerError::invalid_owner("bad"),
        };
        assert!(!planner.is_retryable());

        assert!(ReconcileError::Cancelled { owner: owner.clone() }.is_retryable());

        let conflict = ReconcileError::from(AggregateError {
            owner,
            failures: vec![
                failure(Step::Create, StoreError::forbidden("no")),
                failure(
                    Step::Update,
                    StoreError::conflict(Kind::Role, ObjectKey::new("ns", "r"), "1", "2"),
                ),
            ],
        });
        assert!(conflict.is_retryable());
    }
}
