//! The desired set of child resources for one owning instance.

use std::collections::HashSet;

use indexmap::IndexMap;
use rolesync_core::{Jaeger, Kind, ManagedResource};

use crate::planner::PlannerError;
use crate::reconcile::identity::adopt;

/// Desired child resources, grouped by kind.
///
/// Kinds keep the order in which they were added, and resources keep the
/// order the planner produced them in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredSet {
    resources: IndexMap<Kind, Vec<ManagedResource>>,
}

impl DesiredSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_accounts(self, resources: Vec<ManagedResource>) -> Self {
        self.with(Kind::ServiceAccount, resources)
    }

    pub fn with_roles(self, resources: Vec<ManagedResource>) -> Self {
        self.with(Kind::Role, resources)
    }

    pub fn with_role_bindings(self, resources: Vec<ManagedResource>) -> Self {
        self.with(Kind::RoleBinding, resources)
    }

    /// Replaces the resources desired for `kind`.
    pub fn with(mut self, kind: Kind, resources: Vec<ManagedResource>) -> Self {
        self.resources.insert(kind, resources);
        self
    }

    /// Appends a resource under its own kind.
    pub fn push(&mut self, resource: ManagedResource) {
        self.resources
            .entry(resource.kind())
            .or_default()
            .push(resource);
    }

    /// Resources desired for `kind`; empty when the planner said nothing about it.
    pub fn get(&self, kind: Kind) -> &[ManagedResource] {
        self.resources.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn kinds(&self) -> impl Iterator<Item = Kind> + '_ {
        self.resources.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks that every resource is filed under its own kind, is named, and
    /// that no key appears twice within a kind.
    pub fn validate(&self) -> Result<(), PlannerError> {
        for (kind, resources) in &self.resources {
            let mut seen = HashSet::new();
            for resource in resources {
                if resource.kind() != *kind {
                    return Err(PlannerError::KindMismatch {
                        expected: *kind,
                        found: resource.kind(),
                        name: resource.name().to_string(),
                    });
                }
                if resource.name().is_empty() {
                    return Err(PlannerError::MissingName { kind: *kind });
                }
                if !seen.insert(resource.key()) {
                    return Err(PlannerError::DuplicateKey {
                        kind: *kind,
                        key: resource.key(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Places every resource under `owner`: the owner's namespace when none
    /// was planned, plus the owner reference.
    pub fn adopt(self, owner: &Jaeger) -> Self {
        let resources = self
            .resources
            .into_iter()
            .map(|(kind, resources)| {
                let adopted = resources
                    .into_iter()
                    .map(|resource| adopt(resource, owner))
                    .collect();
                (kind, adopted)
            })
            .collect();
        Self { resources }
    }

    /// [`DesiredSet::validate`], plus every resource living in the owner's
    /// namespace. Owned objects are only listed there, so anything planned
    /// elsewhere could never be cleaned up.
    pub fn validate_for(&self, owner: &Jaeger) -> Result<(), PlannerError> {
        self.validate()?;
        for (kind, resources) in &self.resources {
            if let Some(stray) = resources
                .iter()
                .find(|resource| resource.namespace() != owner.namespace())
            {
                return Err(PlannerError::ForeignNamespace {
                    kind: *kind,
                    key: stray.key(),
                    namespace: owner.namespace().to_string(),
                });
            }
        }
        Ok(())
    }
}
