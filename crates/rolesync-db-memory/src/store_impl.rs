//! Implementation of the ObjectStore trait for InMemoryStore.

use async_trait::async_trait;
use time::OffsetDateTime;

use rolesync_core::{Jaeger, Kind, ManagedResource, ObjectKey, OwnerReference};
use rolesync_storage::{ObjectStore, StoreError};

use crate::faults::Operation;
use crate::storage::{InMemoryStore, make_storage_key};

fn validate(resource: &ManagedResource) -> Result<(), StoreError> {
    if resource.metadata.name.is_empty() {
        return Err(StoreError::invalid(format!(
            "{}: metadata.name is required",
            resource.kind()
        )));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get_owner(&self, key: &ObjectKey) -> Result<Option<Jaeger>, StoreError> {
        self.enter(Operation::GetOwner, None).await?;
        let guard = self.owners.pin();
        Ok(guard.get(key).cloned())
    }

    async fn get(
        &self,
        kind: Kind,
        key: &ObjectKey,
    ) -> Result<Option<ManagedResource>, StoreError> {
        self.enter(Operation::Get, Some(kind)).await?;
        let guard = self.objects.pin();
        Ok(guard.get(&make_storage_key(kind, key)).cloned())
    }

    async fn list(
        &self,
        kind: Kind,
        namespace: &str,
        owner: Option<&OwnerReference>,
    ) -> Result<Vec<ManagedResource>, StoreError> {
        self.enter(Operation::List, Some(kind)).await?;
        let prefix = format!("{kind}/{namespace}/");
        let guard = self.objects.pin();
        let mut items: Vec<ManagedResource> = guard
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .filter(|(_, obj)| obj.namespace() == namespace)
            .filter(|(_, obj)| owner.is_none_or(|o| obj.is_owned_by(o)))
            .map(|(_, obj)| obj.clone())
            .collect();
        items.sort_by_key(|obj| obj.key());
        Ok(items)
    }

    async fn create(&self, resource: &ManagedResource) -> Result<ManagedResource, StoreError> {
        let kind = resource.kind();
        self.enter(Operation::Create, Some(kind)).await?;
        validate(resource)?;

        let key = make_storage_key(kind, &resource.key());
        let mut stored = resource.clone();
        stored.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        stored.metadata.resource_version = Some(self.next_version());
        stored.metadata.creation_timestamp = Some(OffsetDateTime::now_utc());

        {
            let _write = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            let guard = self.objects.pin();
            if guard.get(&key).is_some() {
                return Err(StoreError::already_exists(kind, resource.key()));
            }
            guard.insert(key, stored.clone());
        }

        self.record(Operation::Create);
        Ok(stored)
    }

    async fn update(&self, resource: &ManagedResource) -> Result<ManagedResource, StoreError> {
        let kind = resource.kind();
        self.enter(Operation::Update, Some(kind)).await?;
        validate(resource)?;

        let object_key = resource.key();
        let key = make_storage_key(kind, &object_key);

        let stored = {
            let _write = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            let guard = self.objects.pin();
            let existing = guard
                .get(&key)
                .ok_or_else(|| StoreError::not_found(kind, object_key.clone()))?;

            if let Some(expected) = resource.resource_version() {
                let actual = existing.resource_version().unwrap_or_default();
                if actual != expected {
                    return Err(StoreError::conflict(kind, object_key, expected, actual));
                }
            }

            if let (Some(old), Some(new)) = (existing.body.role_ref(), resource.body.role_ref()) {
                if old != new {
                    return Err(StoreError::invalid(format!(
                        "{kind} {object_key}: roleRef is immutable (cannot change {} to {})",
                        old.name, new.name
                    )));
                }
            }

            let mut stored = resource.clone();
            stored.metadata.uid = existing.metadata.uid.clone();
            stored.metadata.creation_timestamp = existing.metadata.creation_timestamp;
            stored.metadata.resource_version = Some(self.next_version());
            guard.insert(key, stored.clone());
            stored
        };

        self.record(Operation::Update);
        Ok(stored)
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<(), StoreError> {
        self.enter(Operation::Delete, Some(kind)).await?;

        {
            let _write = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            let guard = self.objects.pin();
            if guard.remove(&make_storage_key(kind, key)).is_none() {
                return Err(StoreError::not_found(kind, key.clone()));
            }
        }

        self.record(Operation::Delete);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
