//! Loading initial store contents from a JSON file.
//!
//! ```json
//! {
//!   "owners": [{ "metadata": { "name": "simplest", "namespace": "tracing", "uid": "…" },
//!                "spec": { "storage": { "type": "elasticsearch" } } }],
//!   "objects": [{ "kind": "ServiceAccount", "metadata": { "name": "leftover", … } }]
//! }
//! ```

use std::path::{Path, PathBuf};

use rolesync_core::{Jaeger, ManagedResource};
use rolesync_db_memory::InMemoryStore;
use rolesync_storage::{ObjectStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub owners: Vec<Jaeger>,
    #[serde(default)]
    pub objects: Vec<ManagedResource>,
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read seed file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse seed file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to store seed object: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub owners: usize,
    pub objects: usize,
}

pub fn load_seed(path: &Path) -> Result<SeedFile, SeedError> {
    let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| SeedError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Puts the seed's owners and objects into `store`. Store-assigned fields in
/// the file are discarded.
pub async fn apply_seed(store: &InMemoryStore, seed: SeedFile) -> Result<SeedSummary, SeedError> {
    let mut summary = SeedSummary::default();
    for owner in seed.owners {
        store.put_owner(owner);
        summary.owners += 1;
    }
    for mut object in seed.objects {
        object.metadata.clear_system_fields();
        store.create(&object).await?;
        summary.objects += 1;
    }
    Ok(summary)
}
