//! The store capability consumed by the reconciler.

use std::sync::Arc;

use async_trait::async_trait;
use rolesync_core::{Jaeger, Kind, ManagedResource, ObjectKey, OwnerReference};

use crate::error::StoreError;

/// CRUD+List access to the remote object store.
///
/// Implementations must be thread-safe (`Send + Sync`). Every call may block
/// on I/O; callers bound them with [`crate::TimeoutStore`].
///
/// # Example
///
/// ```ignore
/// use rolesync_storage::{ObjectStore, StoreError};
///
/// async fn owned_roles(
///     store: &dyn ObjectStore,
///     owner: &OwnerReference,
/// ) -> Result<Vec<ManagedResource>, StoreError> {
///     store.list(Kind::Role, "observability", Some(owner)).await
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches an owning object by key.
    ///
    /// Returns `None` if the owner does not exist.
    async fn get_owner(&self, key: &ObjectKey) -> Result<Option<Jaeger>, StoreError>;

    /// Reads an object by kind and key.
    ///
    /// Returns `None` if the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing objects.
    async fn get(
        &self,
        kind: Kind,
        key: &ObjectKey,
    ) -> Result<Option<ManagedResource>, StoreError>;

    /// Lists objects of a kind in a namespace.
    ///
    /// When `owner` is given, only objects carrying a matching owner reference
    /// are returned. Backends without server-side filtering may return more;
    /// callers filter again.
    async fn list(
        &self,
        kind: Kind,
        namespace: &str,
        owner: Option<&OwnerReference>,
    ) -> Result<Vec<ManagedResource>, StoreError>;

    /// Creates a new object.
    ///
    /// The store assigns `uid`, `resource_version` and `creation_timestamp`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the key is taken.
    async fn create(&self, resource: &ManagedResource) -> Result<ManagedResource, StoreError>;

    /// Replaces an existing object.
    ///
    /// When the object carries a `resource_version`, the update succeeds only
    /// if it matches the stored one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the object does not exist.
    /// Returns `StoreError::Conflict` if the resource version is stale.
    /// Returns `StoreError::Invalid` if an immutable field would change.
    async fn update(&self, resource: &ManagedResource) -> Result<ManagedResource, StoreError>;

    /// Deletes an object by kind and key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the object does not exist.
    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<(), StoreError>;

    /// Returns the name of this backend for logging.
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn get_owner(&self, key: &ObjectKey) -> Result<Option<Jaeger>, StoreError> {
        (**self).get_owner(key).await
    }

    async fn get(
        &self,
        kind: Kind,
        key: &ObjectKey,
    ) -> Result<Option<ManagedResource>, StoreError> {
        (**self).get(kind, key).await
    }

    async fn list(
        &self,
        kind: Kind,
        namespace: &str,
        owner: Option<&OwnerReference>,
    ) -> Result<Vec<ManagedResource>, StoreError> {
        (**self).list(kind, namespace, owner).await
    }

    async fn create(&self, resource: &ManagedResource) -> Result<ManagedResource, StoreError> {
        (**self).create(resource).await
    }

    async fn update(&self, resource: &ManagedResource) -> Result<ManagedResource, StoreError> {
        (**self).update(resource).await
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<(), StoreError> {
        (**self).delete(kind, key).await
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}
