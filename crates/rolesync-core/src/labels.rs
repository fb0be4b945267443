//! Naming and labeling conventions for child resources.
//!
//! Names are derived from the owning instance (`<owner>-<suffix>`), never
//! generated, so repeated passes address the same objects.

use std::collections::BTreeMap;

use crate::Jaeger;

pub const LABEL_APP: &str = "app";
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

pub const APP_NAME: &str = "jaeger";
pub const MANAGER_NAME: &str = "jaeger-operator";

/// Annotation telling the cluster's RBAC add-ons to leave a role's rules alone.
pub const AUTO_UPDATE_ANNOTATION: &str = "rbac.authorization.kubernetes.io/autoupdate";

pub fn child_name(owner: &Jaeger, suffix: &str) -> String {
    format!("{}-{}", owner.name(), suffix)
}

/// The label set every child of `owner` carries.
pub fn component_labels(owner: &Jaeger, name: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP.to_string(), APP_NAME.to_string()),
        (LABEL_NAME.to_string(), name.to_string()),
        (LABEL_INSTANCE.to_string(), owner.name().to_string()),
        (LABEL_COMPONENT.to_string(), component.to_string()),
        (LABEL_PART_OF.to_string(), APP_NAME.to_string()),
        (LABEL_MANAGED_BY.to_string(), MANAGER_NAME.to_string()),
    ])
}

pub fn auto_update_annotations() -> BTreeMap<String, String> {
    BTreeMap::from([(AUTO_UPDATE_ANNOTATION.to_string(), "true".to_string())])
}
