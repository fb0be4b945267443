//! Applies a partition against the object store.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;

use rolesync_core::{Kind, ManagedResource, ObjectKey, OwnerReference};
use rolesync_storage::{DynStore, StoreError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::diff::{Partition, UpdatePair, differs};
use super::policy::ImmutableFieldPolicy;

/// The store operation a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    List,
    Create,
    Update,
    Replace,
    Delete,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::List => "list",
            Step::Create => "create",
            Step::Update => "update",
            Step::Replace => "replace",
            Step::Delete => "delete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("object exists but is owned by someone other than {owner}")]
    NotOwned { owner: String },

    #[error("cancelled")]
    Cancelled,
}

impl ApplyError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ApplyError::Store(e) => e.is_retryable(),
            ApplyError::NotOwned { .. } => false,
            ApplyError::Cancelled => true,
        }
    }
}

/// One resource that could not be brought to its desired state.
#[derive(Debug, Clone)]
pub struct ApplyFailure {
    pub kind: Kind,
    /// `None` when listing the kind failed, so no single object is at fault.
    pub key: Option<ObjectKey>,
    pub step: Step,
    pub error: ApplyError,
}

impl ApplyFailure {
    pub fn is_retryable(&self) -> bool {
        self.error.is_retryable()
    }
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{} {} {}: {}", self.step, self.kind, key, self.error),
            None => write!(f, "{} {}: {}", self.step, self.kind, self.error),
        }
    }
}

/// Outcome of applying one kind's partition.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub kind: Kind,
    pub created: Vec<ObjectKey>,
    pub updated: Vec<ObjectKey>,
    pub replaced: Vec<ObjectKey>,
    pub deleted: Vec<ObjectKey>,
    pub failures: Vec<ApplyFailure>,
    pub cancelled: bool,
}

impl ApplyReport {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            created: Vec::new(),
            updated: Vec::new(),
            replaced: Vec::new(),
            deleted: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }

    pub fn changes(&self) -> usize {
        self.created.len() + self.updated.len() + self.replaced.len() + self.deleted.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    /// Files a per-resource result. Returns `false` once the pass was cancelled.
    fn record(&mut self, key: ObjectKey, result: StepResult) -> bool {
        match result {
            Ok(Applied::Created) => self.created.push(key),
            Ok(Applied::Updated) => self.updated.push(key),
            Ok(Applied::Replaced) => self.replaced.push(key),
            Ok(Applied::Deleted) => self.deleted.push(key),
            Ok(Applied::Unchanged) => {}
            Err((_, ApplyError::Cancelled)) => {
                self.cancelled = true;
                return false;
            }
            Err((step, error)) => {
                warn!(kind = %self.kind, key = %key, step = %step, error = %error, "Apply failed");
                self.failures.push(ApplyFailure {
                    kind: self.kind,
                    key: Some(key),
                    step,
                    error,
                });
            }
        }
        true
    }
}

enum Applied {
    Created,
    Updated,
    Replaced,
    Deleted,
    Unchanged,
}

type StepResult = Result<Applied, (Step, ApplyError)>;

/// Races a store call against cancellation.
async fn guarded<T, F>(cancel: &CancellationToken, call: F) -> Result<T, ApplyError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApplyError::Cancelled),
        result = call => result.map_err(ApplyError::from),
    }
}

/// `resource` with `owner` among its owner references, so every object
/// written here is found again by an owner-filtered list.
fn with_owner<'a>(
    resource: &'a ManagedResource,
    owner: &OwnerReference,
) -> Cow<'a, ManagedResource> {
    if resource.is_owned_by(owner) {
        return Cow::Borrowed(resource);
    }
    let mut resource = resource.clone();
    resource.metadata.owner_references.push(owner.clone());
    Cow::Owned(resource)
}

/// Issues the create, update and delete calls of a partition.
///
/// Every resource is attempted independently: a failure is recorded in the
/// report and the executor moves on. Only cancellation stops it early.
#[derive(Clone)]
pub struct ApplyExecutor {
    store: DynStore,
    immutable_fields: ImmutableFieldPolicy,
}

impl ApplyExecutor {
    pub fn new(store: DynStore) -> Self {
        Self {
            store,
            immutable_fields: ImmutableFieldPolicy::default(),
        }
    }

    pub fn with_immutable_fields(mut self, policy: ImmutableFieldPolicy) -> Self {
        self.immutable_fields = policy;
        self
    }

    pub async fn apply(
        &self,
        kind: Kind,
        partition: Partition,
        owner: &OwnerReference,
        cancel: &CancellationToken,
    ) -> ApplyReport {
        let mut report = ApplyReport::new(kind);

        for desired in &partition.to_create {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return report;
            }
            let result = self.create(desired, owner, cancel).await;
            if !report.record(desired.key(), result) {
                return report;
            }
        }

        for pair in &partition.to_update {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return report;
            }
            let result = self.update(pair, owner, cancel, true).await;
            if !report.record(pair.key(), result) {
                return report;
            }
        }

        for observed in &partition.to_delete {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return report;
            }
            let result = self.delete(observed, cancel).await;
            if !report.record(observed.key(), result) {
                return report;
            }
        }

        report
    }

    async fn create(
        &self,
        desired: &ManagedResource,
        owner: &OwnerReference,
        cancel: &CancellationToken,
    ) -> StepResult {
        let desired = with_owner(desired, owner);
        let desired = desired.as_ref();
        let kind = desired.kind();
        let key = desired.key();

        match guarded(cancel, self.store.create(desired)).await {
            Ok(_) => {
                debug!(kind = %kind, key = %key, "Created");
                Ok(Applied::Created)
            }
            Err(ApplyError::Store(e)) if e.is_already_exists() => {
                debug!(kind = %kind, key = %key, "Already exists, re-fetching");
                let existing = guarded(cancel, self.store.get(kind, &key))
                    .await
                    .map_err(|e| (Step::Create, e))?;

                match existing {
                    Some(observed) if observed.is_owned_by(owner) => {
                        if !differs(desired, &observed) {
                            return Ok(Applied::Unchanged);
                        }
                        let pair = UpdatePair {
                            desired: desired.clone(),
                            observed,
                        };
                        self.update(&pair, owner, cancel, false).await
                    }
                    Some(_) => Err((
                        Step::Create,
                        ApplyError::NotOwned {
                            owner: owner.name.clone(),
                        },
                    )),
                    // Deleted again in between: one more try
                    None => guarded(cancel, self.store.create(desired))
                        .await
                        .map(|_| Applied::Created)
                        .map_err(|e| (Step::Create, e)),
                }
            }
            Err(e) => Err((Step::Create, e)),
        }
    }

    /// Updates in place, or replaces when an immutable field changes under
    /// `Recreate`. With `fallback_create`, an object deleted concurrently is
    /// created again.
    async fn update(
        &self,
        pair: &UpdatePair,
        owner: &OwnerReference,
        cancel: &CancellationToken,
        fallback_create: bool,
    ) -> StepResult {
        let pair = match with_owner(&pair.desired, owner) {
            Cow::Borrowed(_) => Cow::Borrowed(pair),
            Cow::Owned(desired) => Cow::Owned(UpdatePair {
                desired,
                observed: pair.observed.clone(),
            }),
        };
        let pair = pair.as_ref();
        let kind = pair.desired.kind();
        let key = pair.key();

        if pair.changes_immutable_fields() && self.immutable_fields == ImmutableFieldPolicy::Recreate {
            return self.replace(pair, cancel).await;
        }

        match guarded(cancel, self.store.update(&pair.merged())).await {
            Ok(_) => {
                debug!(kind = %kind, key = %key, "Updated");
                Ok(Applied::Updated)
            }
            Err(ApplyError::Store(e)) if e.is_not_found() && fallback_create => {
                debug!(kind = %kind, key = %key, "Gone before update, creating");
                guarded(cancel, self.store.create(&pair.desired))
                    .await
                    .map(|_| Applied::Created)
                    .map_err(|e| (Step::Create, e))
            }
            Err(e) => Err((Step::Update, e)),
        }
    }

    async fn replace(&self, pair: &UpdatePair, cancel: &CancellationToken) -> StepResult {
        let kind = pair.desired.kind();
        let key = pair.key();
        debug!(kind = %kind, key = %key, "Immutable field changed, replacing");

        match guarded(cancel, self.store.delete(kind, &key)).await {
            Ok(()) => {}
            Err(ApplyError::Store(e)) if e.is_not_found() => {}
            Err(e) => return Err((Step::Replace, e)),
        }

        guarded(cancel, self.store.create(&pair.desired))
            .await
            .map(|_| Applied::Replaced)
            .map_err(|e| (Step::Replace, e))
    }

    async fn delete(&self, observed: &ManagedResource, cancel: &CancellationToken) -> StepResult {
        let kind = observed.kind();
        let key = observed.key();

        match guarded(cancel, self.store.delete(kind, &key)).await {
            Ok(()) => {
                debug!(kind = %kind, key = %key, "Deleted");
                Ok(Applied::Deleted)
            }
            Err(ApplyError::Store(e)) if e.is_not_found() => {
                debug!(kind = %kind, key = %key, "Already absent");
                Ok(Applied::Deleted)
            }
            Err(e) => Err((Step::Delete, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use rolesync_core::{Jaeger, RoleRef, Subject};
    use rolesync_db_memory::{InMemoryStore, Operation};
    use rolesync_storage::ObjectStore;

    use crate::reconcile::diff::diff;

    fn setup() -> (Arc<InMemoryStore>, ApplyExecutor, Jaeger) {
        let store = Arc::new(InMemoryStore::new());
        let executor = ApplyExecutor::new(store.clone());
        let jaeger = store.put_owner(Jaeger::new("simplest").with_namespace("ns"));
        (store, executor, jaeger)
    }

    fn binding(jaeger: &Jaeger, name: &str, role: &str) -> ManagedResource {
        ManagedResource::role_binding(
            "ns",
            name,
            RoleRef {
                api_group: String::new(),
                kind: "Role".into(),
                name: role.into(),
            },
            vec![Subject::service_account("ns", "simplest")],
        )
        .with_owner(jaeger.as_owner())
    }

    fn creates(resources: Vec<ManagedResource>) -> Partition {
        Partition {
            to_create: resources,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_already_exists_owned_falls_through_to_update() {
        let (store, executor, jaeger) = setup();
        let mut stale = binding(&jaeger, "rb", "reader");
        stale.metadata.annotations.insert("key".into(), "old".into());
        store.create(&stale).await.unwrap();

        let mut desired = binding(&jaeger, "rb", "reader");
        desired.metadata.annotations.insert("key".into(), "new".into());

        let report = executor
            .apply(
                Kind::RoleBinding,
                creates(vec![desired]),
                &jaeger.as_owner(),
                &CancellationToken::new(),
            )
            .await;

        assert!(report.is_clean());
        assert_eq!(report.updated, vec![ObjectKey::new("ns", "rb")]);
        let stored = store
            .get(Kind::RoleBinding, &ObjectKey::new("ns", "rb"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.metadata.annotations["key"], "new");
    }

    #[tokio::test]
    async fn test_writes_carry_the_owner_reference() {
        let (store, executor, jaeger) = setup();
        let owner = jaeger.as_owner();

        // Replaced binding, recreated after a concurrent delete, and a fresh role
        let observed = store.create(&binding(&jaeger, "rb", "reader")).await.unwrap();
        let gone = store.create(&binding(&jaeger, "gone", "reader")).await.unwrap();
        store.delete(Kind::RoleBinding, &gone.key()).await.unwrap();

        let mut unowned_rb = binding(&jaeger, "rb", "writer");
        unowned_rb.metadata.owner_references.clear();
        let mut unowned_gone = binding(&jaeger, "gone", "reader");
        unowned_gone.metadata.owner_references.clear();
        unowned_gone.metadata.annotations.insert("key".into(), "v".into());

        let recreate = executor.clone().with_immutable_fields(ImmutableFieldPolicy::Recreate);
        let partition = Partition {
            to_update: vec![
                UpdatePair {
                    desired: unowned_rb,
                    observed,
                },
                UpdatePair {
                    desired: unowned_gone,
                    observed: gone,
                },
            ],
            ..Default::default()
        };
        let report = recreate
            .apply(Kind::RoleBinding, partition, &owner, &CancellationToken::new())
            .await;
        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(report.replaced.len(), 1);
        assert_eq!(report.created.len(), 1);

        let report = executor
            .apply(
                Kind::Role,
                creates(vec![ManagedResource::role("ns", "r", vec![])]),
                &owner,
                &CancellationToken::new(),
            )
            .await;
        assert!(report.is_clean());

        for (kind, name) in [(Kind::RoleBinding, "rb"), (Kind::RoleBinding, "gone"), (Kind::Role, "r")] {
            let stored = store
                .get(kind, &ObjectKey::new("ns", name))
                .await
                .unwrap()
                .unwrap();
            assert!(stored.is_owned_by(&owner), "{kind} ns/{name} has no owner");
            assert_eq!(stored.metadata.owner_references.len(), 1);
        }
        assert_eq!(store.owned_by(&owner).len(), 3);
    }

    #[tokio::test]
    async fn test_already_exists_identical_is_unchanged() {
        let (store, executor, jaeger) = setup();
        store.create(&binding(&jaeger, "rb", "reader")).await.unwrap();

        let report = executor
            .apply(
                Kind::RoleBinding,
                creates(vec![binding(&jaeger, "rb", "reader")]),
                &jaeger.as_owner(),
                &CancellationToken::new(),
            )
            .await;
        assert!(report.is_clean());
        assert_eq!(report.changes(), 0);
        assert_eq!(store.stats().updates, 0);
    }

    #[tokio::test]
    async fn test_already_exists_foreign_is_left_alone() {
        let (store, executor, jaeger) = setup();
        let stranger = Jaeger::new("stranger");
        store
            .create(&binding(&stranger, "rb", "reader"))
            .await
            .unwrap();

        let report = executor
            .apply(
                Kind::RoleBinding,
                creates(vec![binding(&jaeger, "rb", "writer")]),
                &jaeger.as_owner(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.step, Step::Create);
        assert!(matches!(failure.error, ApplyError::NotOwned { .. }));
        assert!(!failure.is_retryable());

        let stored = store
            .get(Kind::RoleBinding, &ObjectKey::new("ns", "rb"))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_owned_by(&stranger.as_owner()));
    }

    #[tokio::test]
    async fn test_update_not_found_falls_back_to_create() {
        let (store, executor, jaeger) = setup();
        let observed = store.create(&binding(&jaeger, "rb", "reader")).await.unwrap();
        store
            .delete(Kind::RoleBinding, &observed.key())
            .await
            .unwrap();

        let mut desired = binding(&jaeger, "rb", "reader");
        desired.metadata.annotations.insert("key".into(), "v".into());
        let partition = diff(&[desired], &[observed], &jaeger.as_owner());

        let report = executor
            .apply(Kind::RoleBinding, partition, &jaeger.as_owner(), &CancellationToken::new())
            .await;
        assert!(report.is_clean());
        assert_eq!(report.created.len(), 1);
        assert_eq!(store.count_by_kind(Kind::RoleBinding), 1);
    }

    #[tokio::test]
    async fn test_conflict_is_recorded_as_retryable() {
        let (store, executor, jaeger) = setup();
        let observed = store.create(&binding(&jaeger, "rb", "reader")).await.unwrap();

        // An external writer bumps the version after we listed
        let mut external = observed.clone();
        external.metadata.labels.insert("touched".into(), "yes".into());
        store.update(&external).await.unwrap();

        let mut desired = binding(&jaeger, "rb", "reader");
        desired.metadata.annotations.insert("key".into(), "v".into());
        let partition = diff(&[desired], &[observed], &jaeger.as_owner());

        let report = executor
            .apply(Kind::RoleBinding, partition, &jaeger.as_owner(), &CancellationToken::new())
            .await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step, Step::Update);
        assert!(report.failures[0].is_retryable());
    }

    #[tokio::test]
    async fn test_delete_not_found_is_success() {
        let (_store, executor, jaeger) = setup();
        let ghost = binding(&jaeger, "ghost", "reader");
        let partition = Partition {
            to_delete: vec![ghost],
            ..Default::default()
        };

        let report = executor
            .apply(Kind::RoleBinding, partition, &jaeger.as_owner(), &CancellationToken::new())
            .await;
        assert!(report.is_clean());
        assert_eq!(report.deleted.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_short_circuit() {
        let (store, executor, jaeger) = setup();
        store.inject_fault(
            Operation::Create,
            Some(Kind::ServiceAccount),
            StoreError::forbidden("denied"),
            1,
        );

        let resources = ["a", "b", "c"]
            .iter()
            .map(|n| ManagedResource::service_account("ns", *n).with_owner(jaeger.as_owner()))
            .collect();
        let report = executor
            .apply(
                Kind::ServiceAccount,
                creates(resources),
                &jaeger.as_owner(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, Some(ObjectKey::new("ns", "a")));
        assert_eq!(report.created.len(), 2);
        assert_eq!(
            report.failures[0].to_string(),
            "create ServiceAccount ns/a: Forbidden: denied"
        );
    }

    #[tokio::test]
    async fn test_immutable_change_reject_and_recreate() {
        let (store, executor, jaeger) = setup();
        let observed = store.create(&binding(&jaeger, "rb", "reader")).await.unwrap();
        let desired = binding(&jaeger, "rb", "writer");

        let partition = diff(&[desired.clone()], &[observed.clone()], &jaeger.as_owner());
        let report = executor
            .apply(Kind::RoleBinding, partition, &jaeger.as_owner(), &CancellationToken::new())
            .await;
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].error,
            ApplyError::Store(StoreError::Invalid { .. })
        ));

        let recreate = executor.clone().with_immutable_fields(ImmutableFieldPolicy::Recreate);
        let partition = diff(&[desired], &[observed.clone()], &jaeger.as_owner());
        let report = recreate
            .apply(Kind::RoleBinding, partition, &jaeger.as_owner(), &CancellationToken::new())
            .await;
        assert!(report.is_clean());
        assert_eq!(report.replaced, vec![ObjectKey::new("ns", "rb")]);

        let stored = store
            .get(Kind::RoleBinding, &ObjectKey::new("ns", "rb"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.body.role_ref().map(|r| r.name.as_str()), Some("writer"));
        assert_ne!(stored.metadata.uid, observed.metadata.uid);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_applies_nothing() {
        let (store, executor, jaeger) = setup();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = executor
            .apply(
                Kind::Role,
                creates(vec![ManagedResource::role("ns", "r", vec![])]),
                &jaeger.as_owner(),
                &cancel,
            )
            .await;
        assert!(report.cancelled);
        assert!(!report.is_clean());
        assert_eq!(store.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_in_flight_call() {
        let (store, executor, jaeger) = setup();
        store.set_latency(Duration::from_secs(10));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let report = executor
            .apply(
                Kind::Role,
                creates(vec![
                    ManagedResource::role("ns", "a", vec![]),
                    ManagedResource::role("ns", "b", vec![]),
                ]),
                &jaeger.as_owner(),
                &cancel,
            )
            .await;

        assert!(report.cancelled);
        assert!(report.created.is_empty());
        assert!(report.failures.is_empty());
        assert_eq!(store.count(), 0);
    }
}
