//! Three-way partition of a desired set against an observed set of one kind.

use std::collections::HashMap;

use rolesync_core::{ManagedResource, ObjectKey, OwnerReference};

use super::identity::{identify, is_owned_by};

/// A desired resource matched with the stored object it replaces.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePair {
    pub desired: ManagedResource,
    pub observed: ManagedResource,
}

impl UpdatePair {
    pub fn key(&self) -> ObjectKey {
        identify(&self.desired)
    }

    /// The update body: desired content in the observed envelope.
    pub fn merged(&self) -> ManagedResource {
        merge(&self.desired, &self.observed)
    }

    /// True when the store would refuse this update in place.
    pub fn changes_immutable_fields(&self) -> bool {
        match (self.desired.body.role_ref(), self.observed.body.role_ref()) {
            (Some(desired), Some(observed)) => desired != observed,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub to_create: Vec<ManagedResource>,
    pub to_update: Vec<UpdatePair>,
    pub to_delete: Vec<ManagedResource>,
}

impl Partition {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len()
    }

    pub fn immutable_changes(&self) -> impl Iterator<Item = &UpdatePair> {
        self.to_update
            .iter()
            .filter(|pair| pair.changes_immutable_fields())
    }
}

/// Partitions `desired` against `observed` by key.
///
/// Pairs whose planner-controlled fields already agree are left out, and only
/// observed objects held by `owner` are ever scheduled for deletion. Output
/// follows the order of `desired` and then `observed`.
pub fn diff(
    desired: &[ManagedResource],
    observed: &[ManagedResource],
    owner: &OwnerReference,
) -> Partition {
    let observed_by_key: HashMap<ObjectKey, &ManagedResource> =
        observed.iter().map(|o| (identify(o), o)).collect();
    let mut desired_keys = std::collections::HashSet::with_capacity(desired.len());

    let mut partition = Partition::default();
    for want in desired {
        let key = identify(want);
        desired_keys.insert(key.clone());
        match observed_by_key.get(&key) {
            None => partition.to_create.push(want.clone()),
            Some(have) if differs(want, have) => partition.to_update.push(UpdatePair {
                desired: want.clone(),
                observed: (*have).clone(),
            }),
            Some(_) => {}
        }
    }

    partition.to_delete = observed
        .iter()
        .filter(|have| !desired_keys.contains(&identify(have)))
        .filter(|have| is_owned_by(have, owner))
        .cloned()
        .collect();

    partition
}

/// Compares the fields the planner controls; store-assigned fields are ignored.
pub fn differs(desired: &ManagedResource, observed: &ManagedResource) -> bool {
    let (a, b) = (&desired.metadata, &observed.metadata);
    a.labels != b.labels
        || a.annotations != b.annotations
        || a.owner_references != b.owner_references
        || desired.body != observed.body
}

/// Desired labels, annotations, owner references and body replace the observed
/// ones outright; identity and the concurrency token come from `observed`.
pub fn merge(desired: &ManagedResource, observed: &ManagedResource) -> ManagedResource {
    let mut merged = observed.clone();
    merged.metadata.labels = desired.metadata.labels.clone();
    merged.metadata.annotations = desired.metadata.annotations.clone();
    merged.metadata.owner_references = desired.metadata.owner_references.clone();
    merged.body = desired.body.clone();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolesync_core::{Jaeger, Kind, PolicyRule, RoleRef, Subject};
    use std::collections::BTreeMap;

    fn binding(name: &str, owner: &Jaeger) -> ManagedResource {
        ManagedResource::role_binding(
            "ns",
            name,
            RoleRef {
                api_group: String::new(),
                kind: "Role".into(),
                name: "reader".into(),
            },
            vec![Subject::service_account("ns", "sa")],
        )
        .with_owner(owner.as_owner())
    }

    fn stored(mut resource: ManagedResource, version: &str) -> ManagedResource {
        resource.metadata.uid = Some(format!("uid-{}", resource.name()));
        resource.metadata.resource_version = Some(version.into());
        resource
    }

    #[test]
    fn test_create_scenario() {
        let owner = Jaeger::new("o");
        let partition = diff(&[binding("X", &owner)], &[], &owner.as_owner());
        assert_eq!(partition.to_create.len(), 1);
        assert_eq!(partition.to_create[0].name(), "X");
        assert!(partition.to_update.is_empty());
        assert!(partition.to_delete.is_empty());
    }

    #[test]
    fn test_update_scenario() {
        let owner = Jaeger::new("o");
        let want = binding("X", &owner)
            .with_annotations(BTreeMap::from([("key".into(), "new-value".into())]));
        let have = stored(
            binding("X", &owner).with_annotations(BTreeMap::from([("key".into(), "value".into())])),
            "7",
        );

        let partition = diff(&[want], &[have], &owner.as_owner());
        assert_eq!(partition.to_update.len(), 1);
        assert_eq!(partition.to_update[0].key(), ObjectKey::new("ns", "X"));
        assert!(partition.to_create.is_empty() && partition.to_delete.is_empty());

        let merged = partition.to_update[0].merged();
        assert_eq!(merged.metadata.annotations["key"], "new-value");
        assert_eq!(merged.resource_version(), Some("7"));
        assert_eq!(merged.metadata.uid.as_deref(), Some("uid-X"));
    }

    #[test]
    fn test_delete_and_partial_owner_scenarios() {
        let owner = Jaeger::new("o");
        let stranger = Jaeger::new("s");
        let observed = vec![
            stored(binding("X", &owner), "1"),
            stored(binding("Y", &stranger), "2"),
            stored(ManagedResource::role("ns", "Z", vec![]), "3"),
        ];

        let partition = diff(&[], &observed, &owner.as_owner());
        let names: Vec<&str> = partition.to_delete.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["X"]);
    }

    #[test]
    fn test_unchanged_pairs_are_omitted() {
        let owner = Jaeger::new("o");
        let want = binding("X", &owner);
        let mut have = stored(want.clone(), "42");
        have.metadata.creation_timestamp = Some(time::OffsetDateTime::UNIX_EPOCH);

        let partition = diff(&[want], &[have], &owner.as_owner());
        assert!(partition.is_empty());
        assert_eq!(partition.len(), 0);
    }

    #[test]
    fn test_differs_on_body_and_owner_refs() {
        let owner = Jaeger::new("o");
        let base = ManagedResource::role("ns", "r", vec![PolicyRule::new(["a"], ["b"], ["get"])])
            .with_owner(owner.as_owner());

        let mut rules_changed = base.clone();
        rules_changed.body = rolesync_core::ResourceBody::Role {
            rules: vec![PolicyRule::new(["a"], ["b"], ["get", "list"])],
        };
        assert!(differs(&rules_changed, &base));

        let mut owners_changed = base.clone();
        owners_changed.metadata.owner_references.clear();
        assert!(differs(&owners_changed, &base));

        assert!(!differs(&base, &stored(base.clone(), "1")));
    }

    #[test]
    fn test_immutable_change_is_still_an_update() {
        let owner = Jaeger::new("o");
        let mut want = binding("X", &owner);
        if let rolesync_core::ResourceBody::RoleBinding { role_ref, .. } = &mut want.body {
            role_ref.name = "writer".into();
        }
        let have = stored(binding("X", &owner), "1");

        let partition = diff(&[want], &[have], &owner.as_owner());
        assert_eq!(partition.to_update.len(), 1);
        assert_eq!(partition.immutable_changes().count(), 1);
        assert!(partition.to_create.is_empty() && partition.to_delete.is_empty());
    }

    #[test]
    fn test_partition_preserves_desired_order() {
        let owner = Jaeger::new("o");
        let desired: Vec<ManagedResource> = ["c", "a", "b"]
            .iter()
            .map(|n| ManagedResource::service_account("ns", *n).with_owner(owner.as_owner()))
            .collect();
        let partition = diff(&desired, &[], &owner.as_owner());
        let names: Vec<&str> = partition.to_create.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert!(partition.to_create.iter().all(|r| r.kind() == Kind::ServiceAccount));
    }
}
