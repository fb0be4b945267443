use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use papaya::HashMap as PapayaHashMap;
use rolesync_core::{Jaeger, Kind, ManagedResource, ObjectKey, OwnerReference};
use rolesync_storage::StoreError;
use tracing::debug;

use crate::faults::{FaultTable, Operation};

pub type StorageKey = String; // Format: "Kind/namespace/name"

pub(crate) fn make_storage_key(kind: Kind, key: &ObjectKey) -> StorageKey {
    format!("{}/{}/{}", kind, key.namespace, key.name)
}

/// Counters of mutating calls that reached the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationStats {
    pub creates: u64,
    pub updates: u64,
    pub deletes: u64,
}

impl OperationStats {
    pub fn total(&self) -> u64 {
        self.creates + self.updates + self.deletes
    }
}

/// In-memory object store using papaya lock-free HashMap.
///
/// This store provides:
/// - Lock-free concurrent reads via papaya::HashMap
/// - Store-assigned UIDs, creation timestamps and resource versions
/// - Optimistic concurrency on update and immutable `roleRef` on bindings
/// - Owner-filtered listing and cascading owner deletion
/// - Scripted faults and latency for tests
#[derive(Debug)]
pub struct InMemoryStore {
    /// Managed objects keyed by kind, namespace and name
    pub(crate) objects: Arc<PapayaHashMap<StorageKey, ManagedResource>>,
    /// Owning objects keyed by namespace and name
    pub(crate) owners: Arc<PapayaHashMap<ObjectKey, Jaeger>>,
    /// Serializes check-then-write sequences; reads never take it
    pub(crate) write_lock: Mutex<()>,
    /// Atomic counter for generating resource versions
    pub(crate) version_counter: AtomicU64,
    pub(crate) faults: FaultTable,
    latency_ms: AtomicU64,
    creates: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(PapayaHashMap::new()),
            owners: Arc::new(PapayaHashMap::new()),
            write_lock: Mutex::new(()),
            version_counter: AtomicU64::new(1),
            faults: FaultTable::default(),
            latency_ms: AtomicU64::new(0),
            creates: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Generates the next resource version.
    pub(crate) fn next_version(&self) -> String {
        self.version_counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }

    pub(crate) fn record(&self, operation: Operation) {
        let counter = match operation {
            Operation::Create => &self.creates,
            Operation::Update => &self.updates,
            Operation::Delete => &self.deletes,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Sleeps for the configured latency, then fails with a scripted fault if one matches.
    pub(crate) async fn enter(
        &self,
        operation: Operation,
        kind: Option<Kind>,
    ) -> Result<(), StoreError> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        match self.faults.take(operation, kind) {
            Some(err) => {
                debug!(?operation, ?kind, error = %err, "Injected store fault");
                Err(err)
            }
            None => Ok(()),
        }
    }

    // ==================== Owners ====================

    /// Inserts or replaces an owning object, assigning a UID if it has none.
    pub fn put_owner(&self, mut owner: Jaeger) -> Jaeger {
        if owner.metadata.uid.is_none() {
            owner.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        owner.metadata.resource_version = Some(self.next_version());
        let guard = self.owners.pin();
        guard.insert(owner.key(), owner.clone());
        owner
    }

    /// Removes an owning object.
    ///
    /// With `cascade`, every object carrying an owner reference to it is
    /// removed as well. Returns the number of cascaded deletions.
    pub fn remove_owner(&self, key: &ObjectKey, cascade: bool) -> usize {
        let removed = {
            let guard = self.owners.pin();
            guard.remove(key).cloned()
        };
        let Some(owner) = removed else {
            return 0;
        };
        if !cascade {
            return 0;
        }

        let reference = owner.as_owner();
        let _write = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let guard = self.objects.pin();
        let doomed: Vec<StorageKey> = guard
            .iter()
            .filter(|(_, obj)| obj.is_owned_by(&reference))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            guard.remove(key);
        }
        doomed.len()
    }

    pub fn owner_count(&self) -> usize {
        self.owners.pin().len()
    }

    pub fn owners(&self) -> Vec<Jaeger> {
        let guard = self.owners.pin();
        let mut owners: Vec<Jaeger> = guard.iter().map(|(_, o)| o.clone()).collect();
        owners.sort_by_key(|o| o.key());
        owners
    }

    // ==================== Inspection ====================

    pub fn count(&self) -> usize {
        self.objects.pin().len()
    }

    pub fn count_by_kind(&self, kind: Kind) -> usize {
        let prefix = format!("{kind}/");
        let guard = self.objects.pin();
        guard.iter().filter(|(k, _)| k.starts_with(&prefix)).count()
    }

    /// Returns every object owned by `owner`, across kinds, sorted by kind then key.
    pub fn owned_by(&self, owner: &OwnerReference) -> Vec<ManagedResource> {
        let guard = self.objects.pin();
        let mut owned: Vec<ManagedResource> = guard
            .iter()
            .filter(|(_, obj)| obj.is_owned_by(owner))
            .map(|(_, obj)| obj.clone())
            .collect();
        owned.sort_by(|a, b| (a.kind(), a.key()).cmp(&(b.kind(), b.key())));
        owned
    }

    pub fn stats(&self) -> OperationStats {
        OperationStats {
            creates: self.creates.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.creates.store(0, Ordering::Relaxed);
        self.updates.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
    }

    // ==================== Fault injection ====================

    /// Makes the next `times` calls of `operation` (optionally only for `kind`) fail with `error`.
    pub fn inject_fault(
        &self,
        operation: Operation,
        kind: Option<Kind>,
        error: StoreError,
        times: usize,
    ) {
        self.faults.push(operation, kind, error, times);
    }

    pub fn clear_faults(&self) {
        self.faults.clear();
    }

    pub fn pending_faults(&self) -> usize {
        self.faults.pending()
    }

    /// Delays every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolesync_core::ManagedResource;
    use rolesync_storage::ObjectStore;

    #[tokio::test]
    async fn test_put_owner_assigns_uid() {
        let store = InMemoryStore::new();
        let mut jaeger = Jaeger::new("simplest");
        jaeger.metadata.uid = None;

        let stored = store.put_owner(jaeger);
        assert!(stored.metadata.uid.is_some());
        assert_eq!(store.owner_count(), 1);

        let fetched = store
            .get_owner(&ObjectKey::new("", "simplest"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.uid(), stored.uid());
    }

    #[tokio::test]
    async fn test_remove_owner_cascades_to_owned_objects() {
        let store = InMemoryStore::new();
        let jaeger = store.put_owner(Jaeger::new("simplest"));
        let other = store.put_owner(Jaeger::new("other"));

        store
            .create(&ManagedResource::service_account("", "simplest").with_owner(jaeger.as_owner()))
            .await
            .unwrap();
        store
            .create(&ManagedResource::role("", "simplest-es", vec![]).with_owner(jaeger.as_owner()))
            .await
            .unwrap();
        store
            .create(&ManagedResource::service_account("", "other").with_owner(other.as_owner()))
            .await
            .unwrap();
        assert_eq!(store.count(), 3);

        let removed = store.remove_owner(&jaeger.key(), true);
        assert_eq!(removed, 2);
        assert_eq!(store.count(), 1);
        assert_eq!(store.owner_count(), 1);
        assert!(store.owned_by(&jaeger.as_owner()).is_empty());
    }

    #[tokio::test]
    async fn test_remove_owner_without_cascade_keeps_children() {
        let store = InMemoryStore::new();
        let jaeger = store.put_owner(Jaeger::new("simplest"));
        store
            .create(&ManagedResource::service_account("", "simplest").with_owner(jaeger.as_owner()))
            .await
            .unwrap();

        assert_eq!(store.remove_owner(&jaeger.key(), false), 0);
        assert_eq!(store.count(), 1);
        assert_eq!(store.remove_owner(&jaeger.key(), true), 0);
    }

    #[tokio::test]
    async fn test_stats_count_mutations_only() {
        let store = InMemoryStore::new();
        let sa = ManagedResource::service_account("ns", "a");
        store.create(&sa).await.unwrap();
        store.list(Kind::ServiceAccount, "ns", None).await.unwrap();
        store
            .get(Kind::ServiceAccount, &ObjectKey::new("ns", "a"))
            .await
            .unwrap();
        store
            .delete(Kind::ServiceAccount, &ObjectKey::new("ns", "a"))
            .await
            .unwrap();

        let stats = store.stats();
        assert_eq!(stats.creates, 1);
        assert_eq!(stats.updates, 0);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.total(), 2);

        store.reset_stats();
        assert_eq!(store.stats(), OperationStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_calls() {
        let store = InMemoryStore::new();
        store.set_latency(Duration::from_secs(2));

        let start = tokio::time::Instant::now();
        store.list(Kind::Role, "ns", None).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
