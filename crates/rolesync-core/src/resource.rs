use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Kind, ObjectKey, ObjectMeta, OwnerReference};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    #[serde(default)]
    pub api_groups: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub verbs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_names: Vec<String>,
}

impl PolicyRule {
    pub fn new<S: Into<String>>(
        api_groups: impl IntoIterator<Item = S>,
        resources: impl IntoIterator<Item = S>,
        verbs: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            api_groups: api_groups.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
            verbs: verbs.into_iter().map(Into::into).collect(),
            resource_names: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    #[serde(default)]
    pub api_group: String,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
}

impl Subject {
    pub const SERVICE_ACCOUNT_KIND: &'static str = "ServiceAccount";

    pub fn service_account(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: Self::SERVICE_ACCOUNT_KIND.to_string(),
            name: name.into(),
            namespace: Some(namespace.into()),
            api_group: None,
        }
    }
}

/// Kind-specific payload of a managed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ResourceBody {
    #[serde(rename_all = "camelCase")]
    ServiceAccount {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        automount_service_account_token: Option<bool>,
    },
    Role {
        #[serde(default)]
        rules: Vec<PolicyRule>,
    },
    #[serde(rename_all = "camelCase")]
    RoleBinding {
        #[serde(default)]
        role_ref: RoleRef,
        #[serde(default)]
        subjects: Vec<Subject>,
    },
}

impl ResourceBody {
    pub fn kind(&self) -> Kind {
        match self {
            ResourceBody::ServiceAccount { .. } => Kind::ServiceAccount,
            ResourceBody::Role { .. } => Kind::Role,
            ResourceBody::RoleBinding { .. } => Kind::RoleBinding,
        }
    }

    /// Returns the role reference of a binding; other kinds have no immutable body fields.
    pub fn role_ref(&self) -> Option<&RoleRef> {
        match self {
            ResourceBody::RoleBinding { role_ref, .. } => Some(role_ref),
            _ => None,
        }
    }
}

/// A typed, named unit under reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedResource {
    pub metadata: ObjectMeta,
    #[serde(flatten)]
    pub body: ResourceBody,
}

impl ManagedResource {
    pub fn new(metadata: ObjectMeta, body: ResourceBody) -> Self {
        Self { metadata, body }
    }

    pub fn service_account(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(
            ObjectMeta::new(namespace, name),
            ResourceBody::ServiceAccount {
                automount_service_account_token: None,
            },
        )
    }

    pub fn role(
        namespace: impl Into<String>,
        name: impl Into<String>,
        rules: Vec<PolicyRule>,
    ) -> Self {
        Self::new(ObjectMeta::new(namespace, name), ResourceBody::Role { rules })
    }

    pub fn role_binding(
        namespace: impl Into<String>,
        name: impl Into<String>,
        role_ref: RoleRef,
        subjects: Vec<Subject>,
    ) -> Self {
        Self::new(
            ObjectMeta::new(namespace, name),
            ResourceBody::RoleBinding { role_ref, subjects },
        )
    }

    pub fn kind(&self) -> Kind {
        self.body.kind()
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    pub fn is_owned_by(&self, owner: &OwnerReference) -> bool {
        self.metadata.is_owned_by(owner)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.metadata.namespace = namespace.into();
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.metadata.labels = labels;
        self
    }

    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.metadata.annotations = annotations;
        self
    }

    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.metadata.owner_references.push(owner);
        self
    }
}
