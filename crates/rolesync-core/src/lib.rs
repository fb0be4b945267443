pub mod error;
pub mod jaeger;
pub mod kind;
pub mod labels;
pub mod meta;
pub mod resource;

pub use error::{CoreError, Result};
pub use jaeger::{DeploymentStrategy, Jaeger, JaegerSpec, StorageSpec, StorageType};
pub use kind::Kind;
pub use meta::{ObjectKey, ObjectMeta, OwnerReference};
pub use resource::{ManagedResource, PolicyRule, ResourceBody, RoleRef, Subject};
