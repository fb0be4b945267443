//! Policy knobs of a reconcile pass.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Whether a successful pass asks to be run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeuePolicy {
    /// Only errors trigger another pass.
    Never,
    /// Re-run the owner after the given delay even when nothing failed.
    After(Duration),
}

impl RequeuePolicy {
    /// `0` means never.
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            Self::Never
        } else {
            Self::After(Duration::from_secs(secs))
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::After(delay) => Some(*delay),
        }
    }
}

/// We don't requeue successful passes; errors alone drive retries.
pub const DEFAULT_REQUEUE_POLICY: RequeuePolicy = RequeuePolicy::Never;

/// How an update that changes an immutable field is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImmutableFieldPolicy {
    /// Send the update anyway and surface the store's rejection.
    #[default]
    Reject,
    /// Delete the observed object and create the desired one in its place.
    Recreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub requeue: RequeuePolicy,
    pub immutable_fields: ImmutableFieldPolicy,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            requeue: DEFAULT_REQUEUE_POLICY,
            immutable_fields: ImmutableFieldPolicy::default(),
        }
    }
}
