//! # Declarative
//!
//! A reconciliation engine for interdependent remote resources.
//!
//! This crate declares desired state, observes the remote system, and
//! converges it to match, without ever leaving a principal with more or
//! fewer privileges than declared while the pass is running.
//!
//! ## Core Concepts
//!
//! - **Descriptor**: An immutable declaration of one resource and the resources it references
//! - **DependencyGraph**: The DAG derived from references and ordering hints
//! - **Snapshot**: The observed remote state of every node, rebuilt each pass
//! - **Plan**: Create / update / delete / no-op per node; grants diff as privilege sets
//! - **Executor**: Applies the plan in dependency order on a bounded worker pool
//! - **Outputs**: Read-only values projected from a converged pass
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     Descriptor, DescriptorSet, Engine, GrantScope, GrantSpec, MemoryControlPlane,
//!     Mode, NoProgress, ResourceId, ResourceKind,
//! };
//! use std::sync::Arc;
//!
//! let role = ResourceId::role("APP_ROLE");
//! let warehouse = ResourceId::warehouse("APP_WH");
//! let set = DescriptorSet::new()
//!     .with(Descriptor::builder(ResourceKind::Warehouse, "APP_WH").attr("warehouse_size", "X-SMALL").build())
//!     .with(Descriptor::builder(ResourceKind::Role, "APP_ROLE").build())
//!     .with(Descriptor::grant(GrantSpec::new(&role, ["USAGE"], &warehouse, GrantScope::Object)));
//!
//! let engine = Engine::new(Arc::new(MemoryControlPlane::new()));
//! let report = engine.converge(&set, Mode::Apply, &mut NoProgress)?;
//! assert!(report.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! - [`ControlPlane`]: The remote system, the only source of truth
//! - [`ProgressCallback`]: Receives per-node progress updates
//!
//! Backends for a concrete platform live in their own crates and only
//! implement [`ControlPlane`].

pub mod context;
pub mod control;
pub mod descriptor;
pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod memory;
pub mod observe;
pub mod output;
pub mod planner;
pub mod rbac;
pub mod retry;
pub mod sensitive;
pub mod types;

// Re-export main types at crate root
pub use context::{CancelToken, ExecuteOptions, NoProgress, ProgressCallback};
pub use control::ControlPlane;
pub use descriptor::{Descriptor, DescriptorBuilder, DescriptorSet, GrantScope, GrantSpec};
pub use diff::{AttributeDelta, FieldChange, PrivilegeDelta};
pub use engine::{Engine, PlannedPass};
pub use error::{ApiError, Error, ErrorCategory, Result};
pub use executor::{ConvergeReport, NodeOutcome};
pub use graph::{DependencyGraph, EdgeKind};
pub use memory::{Call, MemoryControlPlane};
pub use observe::Snapshot;
pub use output::{Connection, ConnectionSpec, Outputs, View};
pub use planner::{Action, Change, Mode, Plan, PlanEntry, PlanSummary};
pub use retry::RetryConfig;
pub use sensitive::{REDACTED, Sensitive};
pub use types::{
    Attributes, ExecuteSummary, NodeStatus, ObservedState, ResourceId, ResourceKind, Value,
};
