//! Resource identity and ownership.

use rolesync_core::{Jaeger, Kind, ManagedResource, ObjectKey, OwnerReference};
use rolesync_storage::{ObjectStore, StoreError};

/// The key a resource is addressed by within its kind.
pub fn identify(resource: &ManagedResource) -> ObjectKey {
    resource.key()
}

/// Ownership is decided by owner references alone, never by labels.
pub fn is_owned_by(resource: &ManagedResource, owner: &OwnerReference) -> bool {
    resource.is_owned_by(owner)
}

/// Lists the objects of `kind` in the owner's namespace that the owner holds.
///
/// The store is asked to filter by owner, and the result is filtered again
/// here so a backend that ignores the filter still yields only owned objects.
/// An empty result is not an error.
pub async fn list_owned<S>(
    store: &S,
    kind: Kind,
    owner: &Jaeger,
) -> Result<Vec<ManagedResource>, StoreError>
where
    S: ObjectStore + ?Sized,
{
    let reference = owner.as_owner();
    let listed = store
        .list(kind, owner.namespace(), Some(&reference))
        .await?;
    Ok(listed
        .into_iter()
        .filter(|resource| is_owned_by(resource, &reference))
        .collect())
}

/// Places a desired resource under `owner`: its namespace, plus an owner
/// reference when the planner did not attach one.
pub fn adopt(mut resource: ManagedResource, owner: &Jaeger) -> ManagedResource {
    if resource.metadata.namespace.is_empty() {
        resource.metadata.namespace = owner.namespace().to_string();
    }
    let reference = owner.as_owner();
    if !resource.is_owned_by(&reference) {
        resource.metadata.owner_references.push(reference);
    }
    resource
}
