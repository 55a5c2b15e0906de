//! Core types for declarative resource reconciliation

use crate::sensitive::Sensitive;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Category of a managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Compute warehouse
    Warehouse,
    /// Database
    Database,
    /// Schema inside a database
    Schema,
    /// Access-control role
    Role,
    /// Privilege grant from a target to a role
    Grant,
    /// Service account
    User,
}

impl ResourceKind {
    /// All kinds, in declaration order
    pub const ALL: [ResourceKind; 6] = [
        Self::Warehouse,
        Self::Database,
        Self::Schema,
        Self::Role,
        Self::Grant,
        Self::User,
    ];

    /// Lowercase name used in identifiers and output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warehouse => "warehouse",
            Self::Database => "database",
            Self::Schema => "schema",
            Self::Role => "role",
            Self::Grant => "grant",
            Self::User => "user",
        }
    }

    /// Attributes that cannot change once the resource exists.
    ///
    /// A mismatch on any of these is an `ImmutableFieldConflict`.
    pub fn immutable_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Database => &["transient"],
            Self::Schema => &["database", "transient"],
            _ => &[],
        }
    }

    /// Whether descriptors of this kind carry a grant specification
    pub fn is_grant(&self) -> bool {
        matches!(self, Self::Grant)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a resource: `(kind, name)`
///
/// Names are the remote identifiers. Schemas use the qualified
/// `DATABASE.SCHEMA` form so that the pair stays unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    /// Create an identifier
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn warehouse(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Warehouse, name)
    }

    pub fn database(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Database, name)
    }

    /// Schema identifier qualified by its database
    pub fn schema(database: &ResourceId, name: &str) -> Self {
        Self::new(ResourceKind::Schema, format!("{}.{}", database.name, name))
    }

    pub fn role(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Role, name)
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::User, name)
    }

    /// Last dotted segment of the name (`DB.SCHEMA` -> `SCHEMA`)
    pub fn leaf_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

/// Attribute value of a declared or observed resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(i64),
    Flag(bool),
    /// Reference to another declared resource, resolves to its name
    Ref(ResourceId),
    /// Write-only secret, never reported back by the remote system
    Secret(Sensitive<String>),
}

impl Value {
    /// Resolve references to the referenced name; other values are unchanged
    pub fn resolved(&self) -> Value {
        match self {
            Self::Ref(id) => Self::Text(id.name.clone()),
            other => other.clone(),
        }
    }

    /// Referenced resource, if this value is a reference
    pub fn as_ref_id(&self) -> Option<&ResourceId> {
        match self {
            Self::Ref(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Ref(id) => Some(&id.name),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, Self::Secret(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Flag(b) => write!(f, "{b}"),
            Self::Ref(id) => f.write_str(&id.name),
            Self::Secret(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<Sensitive<String>> for Value {
    fn from(value: Sensitive<String>) -> Self {
        Self::Secret(value)
    }
}

/// Attribute map, ordered for stable diffs and output
pub type Attributes = BTreeMap<String, Value>;

/// Remote state of one resource as reported by the control plane
///
/// Rebuilt every converge pass; never cached across passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedState {
    pub id: ResourceId,
    pub exists: bool,
    pub attributes: Attributes,
    /// Privileges currently held, for grants
    pub privileges: BTreeSet<String>,
}

impl ObservedState {
    /// State for a resource that does not exist remotely
    pub fn absent(id: ResourceId) -> Self {
        Self {
            id,
            exists: false,
            attributes: Attributes::new(),
            privileges: BTreeSet::new(),
        }
    }

    /// State for an existing resource
    pub fn present(id: ResourceId, attributes: Attributes) -> Self {
        Self {
            id,
            exists: true,
            attributes,
            privileges: BTreeSet::new(),
        }
    }

    /// State of a grant; it exists while at least one privilege is held
    pub fn granted(id: ResourceId, privileges: BTreeSet<String>) -> Self {
        Self {
            id,
            exists: !privileges.is_empty(),
            attributes: Attributes::new(),
            privileges,
        }
    }
}

/// Status of a graph node within one converge pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not yet executed
    Pending,
    Created,
    Updated,
    Deleted,
    /// Already in the desired state
    NoOp,
    /// The node's action failed
    Failed { reason: String },
    /// Never attempted (failed dependency or cancellation)
    Skipped { reason: String },
}

impl NodeStatus {
    /// Whether no further action will be taken for this node in the pass
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Terminal and successful: the node reached its desired state
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Updated | Self::Deleted | Self::NoOp
        )
    }

    /// Whether the node mutated the remote system
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Updated | Self::Deleted)
    }

    /// Short label for display
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::NoOp => "unchanged",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_op: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// Check if execution was fully successful (no failures, nothing skipped)
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    /// Total number of nodes processed
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted + self.skipped + self.failed + self.no_op
    }

    /// Add a node status to the summary
    pub fn add_status(&mut self, status: &NodeStatus) {
        match status {
            NodeStatus::Created => self.created += 1,
            NodeStatus::Updated => self.updated += 1,
            NodeStatus::Deleted => self.deleted += 1,
            NodeStatus::NoOp => self.no_op += 1,
            NodeStatus::Failed { .. } => self.failed += 1,
            NodeStatus::Skipped { .. } | NodeStatus::Pending => self.skipped += 1,
        }
    }
}
