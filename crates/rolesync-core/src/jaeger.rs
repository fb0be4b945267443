//! The owning top-level object whose existence drives child resources.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{ObjectKey, ObjectMeta, OwnerReference};

pub const JAEGER_API_VERSION: &str = "jaegertracing.io/v1";
pub const JAEGER_KIND: &str = "Jaeger";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeploymentStrategy {
    #[default]
    AllInOne,
    Production,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Memory,
    Elasticsearch,
    Cassandra,
    Kafka,
    Badger,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StorageType::Memory => "memory",
            StorageType::Elasticsearch => "elasticsearch",
            StorageType::Cassandra => "cassandra",
            StorageType::Kafka => "kafka",
            StorageType::Badger => "badger",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageSpec {
    #[serde(rename = "type", default)]
    pub storage_type: StorageType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JaegerSpec {
    #[serde(default)]
    pub strategy: DeploymentStrategy,
    #[serde(default)]
    pub storage: StorageSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jaeger {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: JaegerSpec,
}

impl Jaeger {
    /// Builds a default instance in the empty namespace with a fresh UID.
    pub fn new(name: impl Into<String>) -> Self {
        let mut metadata = ObjectMeta::new("", name);
        metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        Self {
            metadata,
            spec: JaegerSpec::default(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.metadata.namespace = namespace.into();
        self
    }

    pub fn with_storage(mut self, storage_type: StorageType) -> Self {
        self.spec.storage.storage_type = storage_type;
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn uid(&self) -> &str {
        self.metadata.uid.as_deref().unwrap_or_default()
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    /// Returns the controller owner reference attached to every child of this instance.
    pub fn as_owner(&self) -> OwnerReference {
        OwnerReference {
            api_version: JAEGER_API_VERSION.to_string(),
            kind: JAEGER_KIND.to_string(),
            name: self.metadata.name.clone(),
            uid: self.uid().to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// Name of the service account the instance's components run as.
    pub fn service_account_name(&self) -> String {
        self.spec
            .service_account
            .clone()
            .unwrap_or_else(|| self.metadata.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_assigns_uid() {
        let a = Jaeger::new("simplest");
        let b = Jaeger::new("simplest");
        assert!(!a.uid().is_empty());
        assert_ne!(a.uid(), b.uid());
        assert_eq!(a.namespace(), "");
    }

    #[test]
    fn test_as_owner() {
        let jaeger = Jaeger::new("simplest").with_namespace("observability");
        let owner = jaeger.as_owner();
        assert_eq!(owner.kind, "Jaeger");
        assert_eq!(owner.api_version, "jaegertracing.io/v1");
        assert_eq!(owner.name, "simplest");
        assert_eq!(owner.uid, jaeger.uid());
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn test_service_account_name_defaults_to_instance_name() {
        let mut jaeger = Jaeger::new("simplest");
        assert_eq!(jaeger.service_account_name(), "simplest");
        jaeger.spec.service_account = Some("custom".into());
        assert_eq!(jaeger.service_account_name(), "custom");
    }

    #[test]
    fn test_parse_manifest() {
        let jaeger: Jaeger = serde_json::from_value(json!({
            "metadata": {"name": "prod", "namespace": "tracing", "uid": "abc"},
            "spec": {"strategy": "production", "storage": {"type": "elasticsearch"}}
        }))
        .unwrap();
        assert_eq!(jaeger.spec.strategy, DeploymentStrategy::Production);
        assert_eq!(jaeger.spec.storage.storage_type, StorageType::Elasticsearch);
        assert_eq!(jaeger.uid(), "abc");
    }
}
