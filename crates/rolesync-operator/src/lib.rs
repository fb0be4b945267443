//! # rolesync-operator
//!
//! Reconciles the RBAC child resources (service accounts, roles and role
//! bindings) of Jaeger instances.
//!
//! - [`planner`] decides what an instance should have
//! - [`reconcile`] converges the store toward it, one pass per owner
//! - [`controller`] queues owners and retries failed passes

pub mod config;
pub mod controller;
pub mod elasticsearch;
pub mod observability;
pub mod planner;
pub mod reconcile;
pub mod seed;
pub mod strategy;

pub use controller::{Controller, ControllerConfig, ControllerStats};
pub use planner::{DefaultPlanner, FnPlanner, PlannerError, StrategyPlanner, planner_fn};
pub use reconcile::{ReconcileError, ReconcileOutcome, Reconciler};
pub use strategy::DesiredSet;
