//! RBAC objects granting the Elasticsearch proxy access to an instance.

use rolesync_core::labels::{auto_update_annotations, child_name, component_labels};
use rolesync_core::{Jaeger, ManagedResource, PolicyRule, RoleRef, Subject};

pub const ES_SUFFIX: &str = "elasticsearch";
pub const ES_ROLE_COMPONENT: &str = "es-role";
pub const ES_ROLE_BINDING_COMPONENT: &str = "es-rolebinding";

/// The role to be created for Elasticsearch.
///
/// The rule is virtual: the search proxy checks it through a subject access
/// review rather than the API server enforcing it on real objects.
pub fn es_role(jaeger: &Jaeger) -> ManagedResource {
    let name = child_name(jaeger, ES_SUFFIX);
    ManagedResource::role(
        jaeger.namespace(),
        name.clone(),
        vec![PolicyRule::new(
            ["elasticsearch.jaegertracing.io"],
            ["jaeger"],
            ["get"],
        )],
    )
    .with_labels(component_labels(jaeger, &name, ES_ROLE_COMPONENT))
    .with_annotations(auto_update_annotations())
    .with_owner(jaeger.as_owner())
}

/// The Elasticsearch role binding for the given service accounts, in order.
pub fn es_role_binding<S: AsRef<str>>(jaeger: &Jaeger, service_accounts: &[S]) -> ManagedResource {
    let name = child_name(jaeger, ES_SUFFIX);
    let subjects = service_accounts
        .iter()
        .map(|sa| Subject::service_account(jaeger.namespace(), sa.as_ref()))
        .collect();

    ManagedResource::role_binding(
        jaeger.namespace(),
        name.clone(),
        RoleRef {
            api_group: String::new(),
            kind: "Role".to_string(),
            name: name.clone(),
        },
        subjects,
    )
    .with_labels(component_labels(jaeger, &name, ES_ROLE_BINDING_COMPONENT))
    .with_owner(jaeger.as_owner())
}
