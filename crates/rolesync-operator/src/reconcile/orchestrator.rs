//! Entry point of a reconcile pass.

use std::sync::Arc;
use std::time::Duration;

use rolesync_core::{Kind, ManagedResource, ObjectKey};
use rolesync_storage::DynStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::apply::{ApplyExecutor, ApplyFailure, ApplyReport, Step};
use super::diff::diff;
use super::error::{AggregateError, ReconcileError};
use super::identity::list_owned;
use super::policy::ReconcileSettings;
use crate::planner::StrategyPlanner;

/// Per-kind result of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindSummary {
    pub kind: Kind,
    pub desired: usize,
    pub observed: usize,
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
}

impl KindSummary {
    fn new(kind: Kind, desired: usize, observed: usize, report: &ApplyReport) -> Self {
        Self {
            kind,
            desired,
            observed,
            created: report.created.len(),
            updated: report.updated.len(),
            replaced: report.replaced.len(),
            deleted: report.deleted.len(),
        }
    }

    pub fn changes(&self) -> usize {
        self.created + self.updated + self.replaced + self.deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub owner: ObjectKey,
    /// False when the owner was gone and nothing was done.
    pub owner_found: bool,
    pub kinds: Vec<KindSummary>,
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    fn absent(owner: ObjectKey) -> Self {
        Self {
            owner,
            owner_found: false,
            kinds: Vec::new(),
            requeue_after: None,
        }
    }

    pub fn requeue_requested(&self) -> bool {
        self.requeue_after.is_some()
    }

    pub fn changes(&self) -> usize {
        self.kinds.iter().map(KindSummary::changes).sum()
    }

    pub fn kind(&self, kind: Kind) -> Option<&KindSummary> {
        self.kinds.iter().find(|s| s.kind == kind)
    }
}

/// Drives the child resources of one owner toward the planner's desired set.
///
/// Holds no state between passes: every pass lists the store afresh. Callers
/// must not run two passes for the same owner at once.
pub struct Reconciler {
    store: DynStore,
    planner: Arc<dyn StrategyPlanner>,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(store: DynStore, planner: Arc<dyn StrategyPlanner>) -> Self {
        Self {
            store,
            planner,
            settings: ReconcileSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ReconcileSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    pub async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let cancelled = || ReconcileError::Cancelled { owner: key.clone() };

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            result = self.store.get_owner(key) => result,
        };
        let owner = match fetched.map_err(|source| ReconcileError::Store {
            owner: key.clone(),
            source,
        })? {
            Some(owner) => owner,
            None => {
                debug!(owner = %key, "Owner not found, nothing to reconcile");
                return Ok(ReconcileOutcome::absent(key.clone()));
            }
        };

        let planned = self
            .planner
            .plan(&owner)
            .map(|desired| desired.adopt(&owner))
            .and_then(|desired| desired.validate_for(&owner).map(|_| desired))
            .map_err(|source| ReconcileError::Planner {
                owner: key.clone(),
                source,
            })?;

        let reference = owner.as_owner();
        let executor = ApplyExecutor::new(self.store.clone())
            .with_immutable_fields(self.settings.immutable_fields);

        let mut kinds = Vec::with_capacity(Kind::RECONCILE_ORDER.len());
        let mut failures: Vec<ApplyFailure> = Vec::new();

        for kind in Kind::RECONCILE_ORDER {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }

            let desired: Vec<ManagedResource> = planned.get(kind).to_vec();

            let listed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                result = list_owned(self.store.as_ref(), kind, &owner) => result,
            };
            let observed = match listed {
                Ok(observed) => observed,
                Err(error) => {
                    warn!(owner = %key, kind = %kind, error = %error, "Listing owned objects failed");
                    failures.push(list_failure(kind, error.into()));
                    continue;
                }
            };

            let partition = diff(&desired, &observed, &reference);
            debug!(
                owner = %key,
                kind = %kind,
                create = partition.to_create.len(),
                update = partition.to_update.len(),
                delete = partition.to_delete.len(),
                "Partition computed"
            );

            let report = executor.apply(kind, partition, &reference, cancel).await;
            kinds.push(KindSummary::new(kind, desired.len(), observed.len(), &report));
            let was_cancelled = report.cancelled;
            failures.extend(report.failures);
            if was_cancelled {
                return Err(cancelled());
            }
        }

        let outcome = ReconcileOutcome {
            owner: key.clone(),
            owner_found: true,
            kinds,
            requeue_after: self.settings.requeue.delay(),
        };

        let created: usize = outcome.kinds.iter().map(|s| s.created).sum();
        let updated: usize = outcome.kinds.iter().map(|s| s.updated + s.replaced).sum();
        let deleted: usize = outcome.kinds.iter().map(|s| s.deleted).sum();
        if outcome.changes() > 0 {
            info!(
                owner = %key,
                created,
                updated,
                deleted,
                failed = failures.len(),
                "Child resources reconciled"
            );
        } else {
            debug!(owner = %key, failed = failures.len(), "Child resources up to date");
        }

        if !failures.is_empty() {
            return Err(AggregateError {
                owner: key.clone(),
                failures,
            }
            .into());
        }
        Ok(outcome)
    }
}

fn list_failure(kind: Kind, error: super::apply::ApplyError) -> ApplyFailure {
    ApplyFailure {
        kind,
        key: None,
        step: Step::List,
        error,
    }
}
