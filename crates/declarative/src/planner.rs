//! Diff/plan engine - classifies each graph node as create, update, delete or no-op

use crate::descriptor::Descriptor;
use crate::diff::{AttributeDelta, PrivilegeDelta, diff_attributes, diff_privileges};
use crate::error::Error;
use crate::graph::{DependencyGraph, NodeIndex};
use crate::observe::Snapshot;
use crate::types::{ObservedState, ResourceId, ResourceKind};
use serde::Serialize;
use std::fmt;

/// Kind of converge pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Create and update declared resources; never deletes
    #[default]
    Apply,
    /// Delete every declared resource that exists, dependents first
    Destroy,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => f.write_str("apply"),
            Self::Destroy => f.write_str("destroy"),
        }
    }
}

/// What an update changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    Attributes(AttributeDelta),
    Privileges(PrivilegeDelta),
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attributes(delta) => write!(f, "{delta}"),
            Self::Privileges(delta) => write!(f, "{delta}"),
        }
    }
}

/// Planned action for one graph node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Create,
    Update { change: Change },
    Delete,
    NoOp,
    /// An immutable field differs; the node fails without an API call
    Conflict {
        field: String,
        desired: String,
        observed: String,
    },
}

impl Action {
    /// Whether executing the action calls a mutating API
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Create | Self::Update { .. } | Self::Delete)
    }

    /// One-character marker for plan display
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update { .. } => "~",
            Self::Delete => "-",
            Self::NoOp => "=",
            Self::Conflict { .. } => "!",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update { .. } => "update",
            Self::Delete => "delete",
            Self::NoOp => "no change",
            Self::Conflict { .. } => "conflict",
        }
    }

    /// Privilege delta, if this is a grant update
    pub fn privilege_delta(&self) -> Option<&PrivilegeDelta> {
        match self {
            Self::Update {
                change: Change::Privileges(delta),
            } => Some(delta),
            _ => None,
        }
    }

    /// The conflict as an error for `resource`
    pub fn conflict_error(&self, resource: &ResourceId) -> Option<Error> {
        match self {
            Self::Conflict {
                field,
                desired,
                observed,
            } => Some(Error::ImmutableFieldConflict {
                resource: resource.clone(),
                field: field.clone(),
                desired: desired.clone(),
                observed: observed.clone(),
            }),
            _ => None,
        }
    }
}

/// One planned node
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub id: ResourceId,
    pub action: Action,
}

/// Counts per action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_op: usize,
    pub conflict: usize,
}

impl PlanSummary {
    pub fn total_changes(&self) -> usize {
        self.create + self.update + self.delete
    }
}

/// Planned action per graph node, indexed like the graph
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    mode: Mode,
    entries: Vec<PlanEntry>,
    order: Vec<usize>,
}

impl Plan {
    /// Diff every node of `graph` against its observed state.
    ///
    /// Never fails: an immutable-field mismatch becomes `Action::Conflict`
    /// so that it only takes down that node and its descendants.
    pub fn build(graph: &DependencyGraph, snapshot: &Snapshot, mode: Mode) -> Self {
        let entries = graph
            .indices()
            .map(|ix| {
                let descriptor = graph.descriptor(ix);
                let observed = snapshot.state(ix);
                let action = match mode {
                    Mode::Apply => plan_apply(descriptor, observed),
                    Mode::Destroy if observed.exists => Action::Delete,
                    Mode::Destroy => Action::NoOp,
                };
                log::debug!("plan {}: {}", descriptor.id(), action.label());
                PlanEntry {
                    id: descriptor.id().clone(),
                    action,
                }
            })
            .collect();

        Self {
            mode,
            entries,
            order: graph.topological_order().iter().map(|ix| ix.index()).collect(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn action(&self, ix: NodeIndex) -> &Action {
        &self.entries[ix.index()].action
    }

    /// Entries in execution order
    pub fn entries(&self) -> impl Iterator<Item = &PlanEntry> {
        self.order.iter().map(|i| &self.entries[*i])
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Action> {
        self.entries.iter().find(|e| &e.id == id).map(|e| &e.action)
    }

    /// Entries of one kind, in execution order
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &PlanEntry> {
        self.entries().filter(move |e| e.id.kind == kind)
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for entry in &self.entries {
            match entry.action {
                Action::Create => summary.create += 1,
                Action::Update { .. } => summary.update += 1,
                Action::Delete => summary.delete += 1,
                Action::NoOp => summary.no_op += 1,
                Action::Conflict { .. } => summary.conflict += 1,
            }
        }
        summary
    }

    /// Whether the remote system already matches the declaration
    pub fn is_noop(&self) -> bool {
        self.entries.iter().all(|e| e.action == Action::NoOp)
    }

    /// Number of nodes whose action mutates the remote system
    pub fn mutation_count(&self) -> usize {
        self.entries.iter().filter(|e| e.action.is_mutation()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn plan_apply(descriptor: &Descriptor, observed: &ObservedState) -> Action {
    if !observed.exists {
        return Action::Create;
    }

    if let Some(spec) = descriptor.grant_spec() {
        let delta = diff_privileges(&spec.privileges, &observed.privileges);
        return if delta.is_empty() {
            Action::NoOp
        } else {
            Action::Update {
                change: Change::Privileges(delta),
            }
        };
    }

    match diff_attributes(descriptor, observed) {
        Ok(delta) if delta.is_empty() => Action::NoOp,
        Ok(delta) => Action::Update {
            change: Change::Attributes(delta),
        },
        Err(Error::ImmutableFieldConflict {
            field,
            desired,
            observed,
            ..
        }) => Action::Conflict {
            field,
            desired,
            observed,
        },
        Err(e) => Action::Conflict {
            field: String::new(),
            desired: e.to_string(),
            observed: String::new(),
        },
    }
}
