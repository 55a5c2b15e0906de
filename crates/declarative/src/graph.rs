//! Dependency graph builder
//!
//! Nodes live in a petgraph arena and are addressed by [`NodeIndex`];
//! an edge `a -> b` means `a` must reach its desired state before `b` starts.

use crate::descriptor::{Descriptor, DescriptorSet};
use crate::error::{Error, Result};
use crate::rbac;
use crate::types::{ResourceId, ResourceKind};
use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::DiGraph;
use petgraph::visit::{Bfs, EdgeRef};
use std::collections::HashMap;

pub use petgraph::graph::NodeIndex;

/// Why an edge exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// The dependent references the dependency (attribute or grant endpoint)
    Reference,
    /// Explicit ordering hint from the declaration
    Hint,
    /// Grant to a role must complete before a user holding that role
    Privilege,
}

impl EdgeKind {
    /// Which kind a pair keeps when several edges connect it
    fn precedence(self) -> u8 {
        match self {
            Self::Hint => 0,
            Self::Privilege => 1,
            Self::Reference => 2,
        }
    }
}

/// Acyclic dependency graph over one descriptor set
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<Descriptor, EdgeKind>,
    index: HashMap<ResourceId, NodeIndex>,
    order: Vec<NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph from a descriptor set.
    ///
    /// # Errors
    ///
    /// - `DuplicateResource` if two descriptors share an id
    /// - `InvalidDescriptor` if a grant's principal is not a role
    /// - `UnresolvedReference` if a reference or hint names an undeclared resource
    /// - `Cycle` if the edges do not form a DAG
    pub fn build(set: &DescriptorSet) -> Result<Self> {
        let mut graph: DiGraph<Descriptor, EdgeKind> = DiGraph::with_capacity(set.len(), set.len() * 2);
        let mut index = HashMap::with_capacity(set.len());

        for descriptor in set.iter() {
            if index.contains_key(descriptor.id()) {
                return Err(Error::DuplicateResource(descriptor.id().clone()));
            }
            rbac::validate(descriptor)?;
            let ix = graph.add_node(descriptor.clone());
            index.insert(descriptor.id().clone(), ix);
        }

        let resolve = |from: &ResourceId, target: &ResourceId| {
            index
                .get(target)
                .copied()
                .ok_or_else(|| Error::UnresolvedReference {
                    from: from.clone(),
                    target: target.clone(),
                })
        };

        let mut edges = Vec::new();
        for descriptor in set.iter() {
            let to = index[descriptor.id()];
            for target in descriptor.references() {
                edges.push((resolve(descriptor.id(), target)?, to, EdgeKind::Reference));
            }
            for target in descriptor.ordering_hints() {
                edges.push((resolve(descriptor.id(), target)?, to, EdgeKind::Hint));
            }
        }
        for (grant, user) in rbac::privilege_hints(set) {
            edges.push((resolve(&user, &grant)?, resolve(&grant, &user)?, EdgeKind::Privilege));
        }

        for (from, to, kind) in edges {
            // One edge per pair, keeping the strongest kind
            match graph.find_edge(from, to) {
                Some(existing) => {
                    if kind.precedence() > graph[existing].precedence() {
                        graph[existing] = kind;
                    }
                }
                None => {
                    graph.add_edge(from, to, kind);
                }
            }
        }

        let order = match toposort(&graph, None) {
            Ok(order) => order,
            Err(cycle) => return Err(cycle_error(&graph, cycle.node_id())),
        };

        log::debug!(
            "dependency graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Self {
            graph,
            index,
            order,
        })
    }

    /// The same graph with every edge reversed, for destroy passes
    pub fn reversed(&self) -> Self {
        let mut graph = self.graph.clone();
        graph.reverse();
        let mut order = self.order.clone();
        order.reverse();
        Self {
            graph,
            index: self.index.clone(),
            order,
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn descriptor(&self, ix: NodeIndex) -> &Descriptor {
        &self.graph[ix]
    }

    pub fn index_of(&self, id: &ResourceId) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// Node indices in insertion order
    pub fn indices(&self) -> impl Iterator<Item = NodeIndex> {
        self.graph.node_indices()
    }

    /// A valid topological order (dependencies first)
    pub fn topological_order(&self) -> &[NodeIndex] {
        &self.order
    }

    /// Nodes that must finish before `ix` starts
    pub fn dependencies(&self, ix: NodeIndex) -> impl Iterator<Item = NodeIndex> {
        self.graph.neighbors_directed(ix, Direction::Incoming)
    }

    /// Nodes waiting on `ix`
    pub fn dependents(&self, ix: NodeIndex) -> impl Iterator<Item = NodeIndex> {
        self.graph.neighbors_directed(ix, Direction::Outgoing)
    }

    /// Dependencies of `ix` reached through edges of `kind`
    pub fn dependencies_of_kind(&self, ix: NodeIndex, kind: EdgeKind) -> Vec<NodeIndex> {
        self.graph
            .edges_directed(ix, Direction::Incoming)
            .filter(|edge| *edge.weight() == kind)
            .map(|edge| edge.source())
            .collect()
    }

    /// Grants `ix` waits on, whether referenced directly or ordered by privilege
    pub fn grant_dependencies(&self, ix: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .edges_directed(ix, Direction::Incoming)
            .filter(|edge| matches!(edge.weight(), EdgeKind::Reference | EdgeKind::Privilege))
            .map(|edge| edge.source())
            .filter(|&source| self.graph[source].kind() == ResourceKind::Grant)
            .collect()
    }

    pub fn edge_kind(&self, from: NodeIndex, to: NodeIndex) -> Option<EdgeKind> {
        self.graph.find_edge(from, to).map(|e| self.graph[e])
    }

    /// Every node transitively waiting on `ix`, excluding `ix`
    pub fn descendants(&self, ix: NodeIndex) -> Vec<NodeIndex> {
        let mut bfs = Bfs::new(&self.graph, ix);
        let mut found = Vec::new();
        while let Some(next) = bfs.next(&self.graph) {
            if next != ix {
                found.push(next);
            }
        }
        found
    }

    /// Whether `ancestor` must complete before `ix` (directly or transitively)
    pub fn depends_on(&self, ix: NodeIndex, ancestor: NodeIndex) -> bool {
        self.descendants(ancestor).contains(&ix)
    }

    /// Nodes of one kind
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = NodeIndex> {
        self.graph
            .node_indices()
            .filter(move |ix| self.graph[*ix].kind() == kind)
    }
}

/// Collect the members of the cycle containing `seed`
fn cycle_error(graph: &DiGraph<Descriptor, EdgeKind>, seed: NodeIndex) -> Error {
    let cyclic: Vec<Vec<NodeIndex>> = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .collect();
    let component = cyclic
        .iter()
        .find(|scc| scc.contains(&seed))
        .or_else(|| cyclic.first())
        .cloned()
        .unwrap_or_else(|| vec![seed]);

    let mut members: Vec<ResourceId> = component.iter().map(|ix| graph[*ix].id().clone()).collect();
    members.sort();
    Error::Cycle { members }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{GrantScope, GrantSpec};

    fn wh(name: &str) -> Descriptor {
        Descriptor::builder(ResourceKind::Warehouse, name).build()
    }

    #[test]
    fn test_reference_creates_edge() {
        let db = ResourceId::database("D");
        let schema = Descriptor::builder(ResourceKind::Schema, "D.S")
            .reference("database", &db)
            .build();
        let set = DescriptorSet::new()
            .with(schema)
            .with(Descriptor::builder(ResourceKind::Database, "D").build());

        let graph = DependencyGraph::build(&set).unwrap();
        let d = graph.index_of(&db).unwrap();
        let s = graph.index_of(&ResourceId::new(ResourceKind::Schema, "D.S")).unwrap();
        assert_eq!(graph.edge_kind(d, s), Some(EdgeKind::Reference));

        let order = graph.topological_order();
        let pos = |ix| order.iter().position(|o| *o == ix).unwrap();
        assert!(pos(d) < pos(s));
    }

    #[test]
    fn test_unresolved_reference() {
        let schema = Descriptor::builder(ResourceKind::Schema, "D.S")
            .reference("database", &ResourceId::database("D"))
            .build();
        let set = DescriptorSet::new().with(schema);
        let err = DependencyGraph::build(&set).unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { target, .. } if target.name == "D"));
    }

    #[test]
    fn test_duplicate_resource() {
        let set = DescriptorSet::new().with(wh("W")).with(wh("W"));
        assert!(matches!(
            DependencyGraph::build(&set),
            Err(Error::DuplicateResource(id)) if id.name == "W"
        ));
    }

    #[test]
    fn test_cycle_names_members() {
        let a = ResourceId::role("A");
        let b = ResourceId::role("B");
        let c = ResourceId::role("C");
        let set = DescriptorSet::new()
            .with(Descriptor::builder(ResourceKind::Role, "A").depends_on(&b).build())
            .with(Descriptor::builder(ResourceKind::Role, "B").after(&a).build())
            .with(Descriptor::builder(ResourceKind::Role, "C").depends_on(&a).build());

        match DependencyGraph::build(&set) {
            Err(Error::Cycle { members }) => {
                assert_eq!(members, vec![a, b]);
                assert!(!members.contains(&c));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let a = ResourceId::role("A");
        let set = DescriptorSet::new().with(Descriptor::builder(ResourceKind::Role, "A").after(&a).build());
        assert!(matches!(
            DependencyGraph::build(&set),
            Err(Error::Cycle { members }) if members == vec![a]
        ));
    }

    #[test]
    fn test_privilege_hint_orders_grant_before_user() {
        let role = ResourceId::role("R");
        let w = ResourceId::warehouse("W");
        let grant = Descriptor::grant(GrantSpec::new(&role, ["USAGE"], &w, GrantScope::Object));
        let grant_id = grant.id().clone();
        let set = DescriptorSet::new()
            .with(wh("W"))
            .with(Descriptor::builder(ResourceKind::Role, "R").build())
            .with(grant)
            .with(
                Descriptor::builder(ResourceKind::User, "U")
                    .reference("default_role", &role)
                    .build(),
            );

        let graph = DependencyGraph::build(&set).unwrap();
        let g = graph.index_of(&grant_id).unwrap();
        let u = graph.index_of(&ResourceId::user("U")).unwrap();
        assert_eq!(graph.edge_kind(g, u), Some(EdgeKind::Privilege));
        assert_eq!(graph.dependencies_of_kind(u, EdgeKind::Privilege), vec![g]);
        assert!(graph.depends_on(u, graph.index_of(&w).unwrap()));
    }

    #[test]
    fn test_edge_keeps_strongest_kind() {
        let role = ResourceId::role("R");
        let w = ResourceId::warehouse("W");
        let grant = Descriptor::grant(GrantSpec::new(&role, ["USAGE"], &w, GrantScope::Object));
        let grant_id = grant.id().clone();
        let set = DescriptorSet::new()
            .with(wh("W"))
            .with(Descriptor::builder(ResourceKind::Role, "R").build())
            .with(grant)
            .with(
                Descriptor::builder(ResourceKind::User, "HINTED")
                    .reference("default_role", &role)
                    .after(&grant_id)
                    .build(),
            )
            .with(
                Descriptor::builder(ResourceKind::User, "LINKED")
                    .reference("default_role", &role)
                    .reference("grant", &grant_id)
                    .build(),
            );

        let graph = DependencyGraph::build(&set).unwrap();
        let g = graph.index_of(&grant_id).unwrap();
        let hinted = graph.index_of(&ResourceId::user("HINTED")).unwrap();
        let linked = graph.index_of(&ResourceId::user("LINKED")).unwrap();

        assert_eq!(graph.edge_kind(g, hinted), Some(EdgeKind::Privilege));
        assert_eq!(graph.edge_kind(g, linked), Some(EdgeKind::Reference));
        assert_eq!(graph.grant_dependencies(hinted), vec![g]);
        assert_eq!(graph.grant_dependencies(linked), vec![g]);
    }

    #[test]
    fn test_reversed_graph_inverts_order() {
        let db = ResourceId::database("D");
        let set = DescriptorSet::new()
            .with(Descriptor::builder(ResourceKind::Database, "D").build())
            .with(
                Descriptor::builder(ResourceKind::Schema, "D.S")
                    .reference("database", &db)
                    .build(),
            );
        let graph = DependencyGraph::build(&set).unwrap();
        let reversed = graph.reversed();
        let d = reversed.index_of(&db).unwrap();
        assert_eq!(reversed.dependencies(d).count(), 1);
        assert_eq!(reversed.topological_order().last(), Some(&d));
    }
}
