//! Least-privilege ordering policy for grants and role assignment
//!
//! Sits on top of the generic executor and adds three rules:
//!
//! - a grant is only created or changed once its principal and target exist
//!   in the current pass (observed or just created);
//! - a user is only created or changed once every grant to the roles it is
//!   assigned has completed, so the user never holds a partially granted role;
//! - on destroy the order reverses: the user goes first, then grants, then
//!   the role and targets.
//!
//! The first two are guaranteed by the `Privilege` edges this module adds
//! to the graph; [`admit`] re-checks them right before dispatch and reports
//! a `GrantOrderingViolation` if the guarantee was ever broken.

use crate::descriptor::{Descriptor, DescriptorSet};
use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, NodeIndex};
use crate::planner::{Action, Mode};
use crate::types::{NodeStatus, ResourceId, ResourceKind};

/// Reject grant declarations that cannot be ordered safely
pub fn validate(descriptor: &Descriptor) -> Result<()> {
    let invalid = |message: &str| Error::InvalidDescriptor {
        resource: descriptor.id().clone(),
        message: message.to_string(),
    };

    match (descriptor.kind(), descriptor.grant_spec()) {
        (ResourceKind::Grant, None) => Err(invalid("grant without a grant specification")),
        (ResourceKind::Grant, Some(spec)) => {
            if spec.principal.kind != ResourceKind::Role {
                return Err(invalid("grant principal must be a role"));
            }
            if matches!(spec.target.kind, ResourceKind::Grant | ResourceKind::User) {
                return Err(invalid("grant target must be a warehouse, database, schema or role"));
            }
            if spec.privileges.is_empty() {
                return Err(invalid("grant declares no privileges"));
            }
            Ok(())
        }
        (_, Some(_)) => Err(invalid("only grants carry a grant specification")),
        (_, None) => Ok(()),
    }
}

/// Ordering hints not implied by references: `(grant, user)` pairs where the
/// user is assigned the grant's principal role.
pub fn privilege_hints(set: &DescriptorSet) -> Vec<(ResourceId, ResourceId)> {
    let users: Vec<&Descriptor> = set
        .iter()
        .filter(|d| d.kind() == ResourceKind::User)
        .collect();

    set.iter()
        .filter_map(|d| d.grant_spec().map(|spec| (d.id(), spec)))
        .flat_map(|(grant, spec)| {
            users
                .iter()
                .filter(move |user| user.references_id(&spec.principal))
                .map(move |user| (grant.clone(), user.id().clone()))
        })
        .collect()
}

/// Per-pass view the policy checks against
pub struct PassState<'a> {
    /// Whether each node exists remotely as of now
    pub exists: &'a [bool],
    /// Current status of each node
    pub status: &'a [NodeStatus],
}

/// Check the least-privilege invariants for `ix` right before it is dispatched.
///
/// `graph` is the execution graph of the pass (reversed for destroy).
pub fn admit(graph: &DependencyGraph, ix: NodeIndex, action: &Action, mode: Mode, state: &PassState<'_>) -> Result<()> {
    let descriptor = graph.descriptor(ix);
    let violation = |reason: String| Error::GrantOrderingViolation {
        resource: descriptor.id().clone(),
        reason,
    };

    match (mode, action) {
        (Mode::Apply, Action::Create | Action::Update { .. }) => {
            if let Some(spec) = descriptor.grant_spec() {
                for endpoint in [&spec.principal, &spec.target] {
                    let exists = graph
                        .index_of(endpoint)
                        .is_some_and(|e| state.exists[e.index()]);
                    if !exists {
                        return Err(violation(format!("{endpoint} does not exist yet")));
                    }
                }
            }

            if descriptor.kind() == ResourceKind::User {
                for grant in graph.grant_dependencies(ix) {
                    if !state.status[grant.index()].is_converged() {
                        return Err(violation(format!(
                            "{} has not completed",
                            graph.descriptor(grant).id()
                        )));
                    }
                }
            }
            Ok(())
        }
        (Mode::Destroy, Action::Delete) => {
            // In the reversed graph the prerequisites are the forward dependents
            for dependent in graph.dependencies(ix) {
                if state.exists[dependent.index()] {
                    return Err(violation(format!(
                        "{} still exists",
                        graph.descriptor(dependent).id()
                    )));
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{GrantScope, GrantSpec};

    fn environment() -> (DescriptorSet, ResourceId, ResourceId) {
        let role = ResourceId::role("R");
        let w = ResourceId::warehouse("W");
        let grant = GrantSpec::new(&role, ["USAGE"], &w, GrantScope::Object);
        let grant_id = grant.resource_id();
        let set = DescriptorSet::new()
            .with(Descriptor::builder(ResourceKind::Warehouse, "W").build())
            .with(Descriptor::builder(ResourceKind::Role, "R").build())
            .with(Descriptor::grant(grant))
            .with(
                Descriptor::builder(ResourceKind::User, "U")
                    .reference("default_role", &role)
                    .build(),
            );
        (set, grant_id, ResourceId::user("U"))
    }

    #[test]
    fn test_validate_rejects_user_principal() {
        let spec = GrantSpec::new(
            &ResourceId::user("U"),
            ["USAGE"],
            &ResourceId::warehouse("W"),
            GrantScope::Object,
        );
        assert!(matches!(
            validate(&Descriptor::grant(spec)),
            Err(Error::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_privileges() {
        let spec = GrantSpec::new(
            &ResourceId::role("R"),
            Vec::<String>::new(),
            &ResourceId::warehouse("W"),
            GrantScope::Object,
        );
        assert!(validate(&Descriptor::grant(spec)).is_err());
    }

    #[test]
    fn test_privilege_hints_pair_grants_with_role_holders() {
        let (set, grant, user) = environment();
        assert_eq!(privilege_hints(&set), vec![(grant, user)]);
    }

    #[test]
    fn test_admit_grant_requires_endpoints() {
        let (set, grant, _) = environment();
        let graph = DependencyGraph::build(&set).unwrap();
        let ix = graph.index_of(&grant).unwrap();
        let status = vec![NodeStatus::Pending; graph.len()];

        let nothing = vec![false; graph.len()];
        let state = PassState {
            exists: &nothing,
            status: &status,
        };
        assert!(matches!(
            admit(&graph, ix, &Action::Create, Mode::Apply, &state),
            Err(Error::GrantOrderingViolation { .. })
        ));

        let everything = vec![true; graph.len()];
        let state = PassState {
            exists: &everything,
            status: &status,
        };
        assert!(admit(&graph, ix, &Action::Create, Mode::Apply, &state).is_ok());
    }

    #[test]
    fn test_admit_user_requires_completed_grants() {
        let (set, grant, user) = environment();
        let graph = DependencyGraph::build(&set).unwrap();
        let u = graph.index_of(&user).unwrap();
        let g = graph.index_of(&grant).unwrap();
        let exists = vec![true; graph.len()];
        let mut status = vec![NodeStatus::Created; graph.len()];
        status[g.index()] = NodeStatus::Pending;

        let state = PassState {
            exists: &exists,
            status: &status,
        };
        assert!(admit(&graph, u, &Action::Create, Mode::Apply, &state).is_err());

        status[g.index()] = NodeStatus::NoOp;
        let state = PassState {
            exists: &exists,
            status: &status,
        };
        assert!(admit(&graph, u, &Action::Create, Mode::Apply, &state).is_ok());
    }

    #[test]
    fn test_admit_user_checks_referenced_grants() {
        let role = ResourceId::role("R");
        let w = ResourceId::warehouse("W");
        let grant = GrantSpec::new(&role, ["USAGE"], &w, GrantScope::Object);
        let grant_id = grant.resource_id();
        let set = DescriptorSet::new()
            .with(Descriptor::builder(ResourceKind::Warehouse, "W").build())
            .with(Descriptor::builder(ResourceKind::Role, "R").build())
            .with(Descriptor::grant(grant))
            .with(
                Descriptor::builder(ResourceKind::User, "U")
                    .reference("default_role", &role)
                    .reference("grant", &grant_id)
                    .build(),
            );
        let graph = DependencyGraph::build(&set).unwrap();
        let u = graph.index_of(&ResourceId::user("U")).unwrap();
        let g = graph.index_of(&grant_id).unwrap();
        let exists = vec![true; graph.len()];
        let mut status = vec![NodeStatus::Created; graph.len()];
        status[g.index()] = NodeStatus::Failed {
            reason: "rejected".into(),
        };

        let state = PassState {
            exists: &exists,
            status: &status,
        };
        assert!(matches!(
            admit(&graph, u, &Action::Create, Mode::Apply, &state),
            Err(Error::GrantOrderingViolation { .. })
        ));
    }

    #[test]
    fn test_admit_destroy_requires_dependents_gone() {
        let (set, grant, user) = environment();
        let graph = DependencyGraph::build(&set).unwrap().reversed();
        let g = graph.index_of(&grant).unwrap();
        let u = graph.index_of(&user).unwrap();
        let status = vec![NodeStatus::Pending; graph.len()];
        let mut exists = vec![true; graph.len()];

        let state = PassState {
            exists: &exists,
            status: &status,
        };
        assert!(admit(&graph, g, &Action::Delete, Mode::Destroy, &state).is_err());

        exists[u.index()] = false;
        let state = PassState {
            exists: &exists,
            status: &status,
        };
        assert!(admit(&graph, g, &Action::Delete, Mode::Destroy, &state).is_ok());
    }
}
