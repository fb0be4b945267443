//! In-memory object store backend for rolesync.
//!
//! This crate provides an in-memory implementation of the `ObjectStore` trait
//! from `rolesync-storage`, using papaya lock-free HashMap for concurrent access.
//!
//! # Example
//!
//! ```ignore
//! use rolesync_db_memory::InMemoryStore;
//! use rolesync_storage::ObjectStore;
//!
//! let store = InMemoryStore::new();
//! let jaeger = store.put_owner(Jaeger::new("simplest"));
//!
//! let sa = ManagedResource::service_account("", "simplest").with_owner(jaeger.as_owner());
//! let created = store.create(&sa).await?;
//! ```

pub mod faults;
pub mod storage;
mod store_impl;

// Re-export the ObjectStore trait for convenience
pub use rolesync_storage::{ObjectStore, StoreError};

pub use faults::Operation;
pub use storage::{InMemoryStore, OperationStats, StorageKey};

/// Type alias for a shareable in-memory store.
pub type SharedMemoryStore = std::sync::Arc<InMemoryStore>;

/// Creates a new shared in-memory store.
pub fn create_memory_store() -> SharedMemoryStore {
    std::sync::Arc::new(InMemoryStore::new())
}
