//! Reconciliation engine.
//!
//! A pass fetches the owner, asks the planner for the desired child
//! resources, then for each kind in [`Kind::RECONCILE_ORDER`] lists what the
//! owner holds, diffs, and applies the difference.
//!
//! [`Kind::RECONCILE_ORDER`]: rolesync_core::Kind::RECONCILE_ORDER

pub mod apply;
pub mod diff;
mod error;
pub mod identity;
mod orchestrator;
pub mod policy;

pub use apply::{ApplyError, ApplyExecutor, ApplyFailure, ApplyReport, Step};
pub use diff::{Partition, UpdatePair, diff, differs, merge};
pub use error::{AggregateError, ReconcileError};
pub use identity::{adopt, identify, is_owned_by, list_owned};
pub use orchestrator::{KindSummary, ReconcileOutcome, Reconciler};
pub use policy::{DEFAULT_REQUEUE_POLICY, ImmutableFieldPolicy, ReconcileSettings, RequeuePolicy};
