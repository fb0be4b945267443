//! TimeoutStore - a store wrapper that bounds every call.
//!
//! A call that exceeds the bound is abandoned and reported as the retryable
//! [`StoreError::Timeout`].
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use rolesync_storage::TimeoutStore;
//!
//! let store = TimeoutStore::new(backend, Duration::from_secs(5));
//! let role = store.get(Kind::Role, &key).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rolesync_core::{Jaeger, Kind, ManagedResource, ObjectKey, OwnerReference};
use tracing::warn;

use crate::error::StoreError;
use crate::traits::ObjectStore;

pub struct TimeoutStore<S: ObjectStore> {
    /// The inner store implementation.
    inner: S,
    /// Upper bound for a single call.
    limit: Duration,
}

impl<S: ObjectStore> TimeoutStore<S> {
    /// Create a new bounded store wrapper.
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }

    /// Get a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    backend = self.inner.backend_name(),
                    operation,
                    limit_ms = self.limit.as_millis() as u64,
                    "Store call timed out"
                );
                Err(StoreError::timeout(operation, self.limit))
            }
        }
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for TimeoutStore<S> {
    async fn get_owner(&self, key: &ObjectKey) -> Result<Option<Jaeger>, StoreError> {
        self.bounded("get_owner", self.inner.get_owner(key)).await
    }

    async fn get(
        &self,
        kind: Kind,
        key: &ObjectKey,
    ) -> Result<Option<ManagedResource>, StoreError> {
        self.bounded("get", self.inner.get(kind, key)).await
    }

    async fn list(
        &self,
        kind: Kind,
        namespace: &str,
        owner: Option<&OwnerReference>,
    ) -> Result<Vec<ManagedResource>, StoreError> {
        self.bounded("list", self.inner.list(kind, namespace, owner))
            .await
    }

    async fn create(&self, resource: &ManagedResource) -> Result<ManagedResource, StoreError> {
        self.bounded("create", self.inner.create(resource)).await
    }

    async fn update(&self, resource: &ManagedResource) -> Result<ManagedResource, StoreError> {
        self.bounded("update", self.inner.update(resource)).await
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<(), StoreError> {
        self.bounded("delete", self.inner.delete(kind, key)).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}
