//! # rolesync-storage
//!
//! Object store abstraction for the rolesync reconciler.
//!
//! This crate defines the CRUD+List capability the reconciler consumes. It
//! contains no backend - those are provided by separate crates
//! (`rolesync-db-memory`).
//!
//! ## Overview
//!
//! The main trait is [`ObjectStore`], which defines:
//! - owner lookup
//! - get / list (optionally owner-filtered)
//! - create / update (with resource version check) / delete
//!
//! [`TimeoutStore`] wraps any backend and bounds every call.

mod error;
mod timeout;
mod traits;

pub use error::{ErrorCategory, StoreError};
pub use timeout::TimeoutStore;
pub use traits::ObjectStore;

/// Type alias for a store result.
pub type StoreResult<T> = Result<T, StoreError>;

/// Type alias for a shared store trait object.
pub type DynStore = std::sync::Arc<dyn ObjectStore>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{ErrorCategory, StoreError};
    pub use crate::timeout::TimeoutStore;
    pub use crate::traits::ObjectStore;
    pub use crate::{DynStore, StoreResult};
}
