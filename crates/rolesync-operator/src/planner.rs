//! Strategy planners: decide which child resources an instance should have.

use std::sync::Arc;

use rolesync_core::labels::component_labels;
use rolesync_core::{Jaeger, Kind, ManagedResource, ObjectKey, StorageType};
use thiserror::Error;

use crate::elasticsearch::{es_role, es_role_binding};
use crate::strategy::DesiredSet;

pub const SERVICE_ACCOUNT_COMPONENT: &str = "service-account";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlannerError {
    #[error("Invalid owner: {message}")]
    InvalidOwner { message: String },

    #[error("{name} planned as {found} but filed under {expected}")]
    KindMismatch {
        expected: Kind,
        found: Kind,
        name: String,
    },

    #[error("{kind} {key} planned more than once")]
    DuplicateKey { kind: Kind, key: ObjectKey },

    #[error("{kind} planned without a name")]
    MissingName { kind: Kind },

    #[error("{kind} {key} planned outside the owner's namespace {namespace}")]
    ForeignNamespace {
        kind: Kind,
        key: ObjectKey,
        namespace: String,
    },
}

impl PlannerError {
    pub fn invalid_owner(message: impl Into<String>) -> Self {
        Self::InvalidOwner {
            message: message.into(),
        }
    }
}

/// Computes the desired child resources of one owning instance.
///
/// Planners are pure: the same owner always yields the same set, and an empty
/// set means no child resources should exist.
pub trait StrategyPlanner: Send + Sync {
    fn plan(&self, owner: &Jaeger) -> Result<DesiredSet, PlannerError>;
}

/// Adapts a closure into a planner.
pub struct FnPlanner<F> {
    f: F,
}

impl<F> FnPlanner<F>
where
    F: Fn(&Jaeger) -> DesiredSet + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> StrategyPlanner for FnPlanner<F>
where
    F: Fn(&Jaeger) -> DesiredSet + Send + Sync,
{
    fn plan(&self, owner: &Jaeger) -> Result<DesiredSet, PlannerError> {
        Ok((self.f)(owner))
    }
}

/// Shorthand for injecting a closure as a shared planner.
pub fn planner_fn<F>(f: F) -> Arc<dyn StrategyPlanner>
where
    F: Fn(&Jaeger) -> DesiredSet + Send + Sync + 'static,
{
    Arc::new(FnPlanner::new(f))
}

/// Plans the service account every instance runs as, plus the Elasticsearch
/// role and binding when the instance stores spans in Elasticsearch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPlanner;

impl StrategyPlanner for DefaultPlanner {
    fn plan(&self, owner: &Jaeger) -> Result<DesiredSet, PlannerError> {
        if owner.name().is_empty() {
            return Err(PlannerError::invalid_owner("metadata.name is empty"));
        }
        if owner.uid().is_empty() {
            return Err(PlannerError::invalid_owner(format!(
                "{} has no uid",
                owner.key()
            )));
        }

        let account = owner.service_account_name();
        let service_account = ManagedResource::service_account(owner.namespace(), account.clone())
            .with_labels(component_labels(owner, &account, SERVICE_ACCOUNT_COMPONENT))
            .with_owner(owner.as_owner());

        let mut desired = DesiredSet::new().with_service_accounts(vec![service_account]);
        if owner.spec.storage.storage_type == StorageType::Elasticsearch {
            desired = desired
                .with_roles(vec![es_role(owner)])
                .with_role_bindings(vec![es_role_binding(owner, &[account])]);
        }

        desired.validate()?;
        Ok(desired)
    }
}
