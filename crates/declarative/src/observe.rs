//! Remote state observer
//!
//! Describes every graph node through the control plane and produces a
//! snapshot indexed like the graph. A snapshot is never reused across
//! passes; the remote system is the only source of truth.

use crate::context::ExecuteOptions;
use crate::control::ControlPlane;
use crate::descriptor::Descriptor;
use crate::error::{ApiError, Error, Result};
use crate::graph::{DependencyGraph, NodeIndex};
use crate::retry::with_retry;
use crate::types::{ObservedState, ResourceId};
use rayon::prelude::*;

/// Observed state of every node, indexed like the graph
#[derive(Debug, Clone)]
pub struct Snapshot {
    states: Vec<ObservedState>,
}

impl Snapshot {
    /// Snapshot in which nothing exists yet
    pub fn absent(graph: &DependencyGraph) -> Self {
        Self {
            states: graph
                .indices()
                .map(|ix| ObservedState::absent(graph.descriptor(ix).id().clone()))
                .collect(),
        }
    }

    pub fn state(&self, ix: NodeIndex) -> &ObservedState {
        &self.states[ix.index()]
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ObservedState> {
        self.states.iter().find(|s| &s.id == id)
    }

    /// Replace the state of one node
    pub fn record(&mut self, ix: NodeIndex, state: ObservedState) {
        self.states[ix.index()] = state;
    }

    /// Whether each node currently exists, indexed like the graph
    pub fn existence(&self) -> Vec<bool> {
        self.states.iter().map(|s| s.exists).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObservedState> {
        self.states.iter()
    }

    pub fn into_states(self) -> Vec<ObservedState> {
        self.states
    }
}

/// Describe every node of `graph` in parallel.
///
/// # Errors
///
/// - `Observation` tagged with the resource for any failure other than not-found;
///   no partial snapshot is returned
/// - `Cancelled` if the pass is cancelled before every read was issued
/// - `WorkerPool` if the thread pool cannot be created
pub fn observe(graph: &DependencyGraph, plane: &dyn ControlPlane, opts: &ExecuteOptions) -> Result<Snapshot> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.workers())
        .build()
        .map_err(|e| Error::WorkerPool(e.to_string()))?;

    let indices: Vec<NodeIndex> = graph.indices().collect();
    log::info!("observing {} resources", indices.len());

    let states = pool.install(|| {
        indices
            .par_iter()
            .map(|ix| observe_one(graph.descriptor(*ix), plane, opts))
            .collect::<Result<Vec<_>>>()
    })?;

    Ok(Snapshot { states })
}

fn observe_one(descriptor: &Descriptor, plane: &dyn ControlPlane, opts: &ExecuteOptions) -> Result<ObservedState> {
    if opts.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let id = descriptor.id();
    let label = format!("describe {id}");
    let observed = match descriptor.grant_spec() {
        Some(spec) => with_retry(&opts.retry, &label, || plane.describe_grant(spec))
            .result
            .map(|held| ObservedState::granted(id.clone(), held)),
        None => with_retry(&opts.retry, &label, || plane.describe(id)).result,
    };

    match observed {
        Ok(state) => {
            log::debug!("observed {id}: exists={}", state.exists);
            Ok(state)
        }
        Err(ApiError::NotFound) => {
            log::debug!("observed {id}: not found");
            Ok(ObservedState::absent(id.clone()))
        }
        Err(source) => Err(Error::Observation {
            resource: id.clone(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DescriptorSet, GrantScope, GrantSpec};
    use crate::memory::MemoryControlPlane;
    use crate::types::{Attributes, ResourceKind};

    fn graph() -> (DependencyGraph, ResourceId) {
        let role = ResourceId::role("R");
        let w = ResourceId::warehouse("W");
        let grant = GrantSpec::new(&role, ["USAGE"], &w, GrantScope::Object);
        let grant_id = grant.resource_id();
        let set = DescriptorSet::new()
            .with(Descriptor::builder(ResourceKind::Warehouse, "W").build())
            .with(Descriptor::builder(ResourceKind::Role, "R").build())
            .with(Descriptor::grant(grant));
        (DependencyGraph::build(&set).unwrap(), grant_id)
    }

    #[test]
    fn test_not_found_is_absent() {
        let (graph, grant_id) = graph();
        let plane = MemoryControlPlane::new();
        let snapshot = observe(&graph, &plane, &ExecuteOptions::default()).unwrap();
        assert!(snapshot.iter().all(|s| !s.exists));
        assert!(snapshot.get(&grant_id).unwrap().privileges.is_empty());
    }

    #[test]
    fn test_existing_resources_and_grants_are_observed() {
        let (graph, grant_id) = graph();
        let plane = MemoryControlPlane::new();
        plane.seed(ResourceId::warehouse("W"), Attributes::new());
        plane.seed(ResourceId::role("R"), Attributes::new());
        let ix = graph.index_of(&grant_id).unwrap();
        plane.seed_grant(graph.descriptor(ix).grant_spec().unwrap(), ["USAGE"]);

        let snapshot = observe(&graph, &plane, &ExecuteOptions::default()).unwrap();
        assert!(snapshot.iter().all(|s| s.exists));
        assert!(snapshot.state(ix).privileges.contains("USAGE"));
    }

    #[test]
    fn test_other_failures_are_fatal() {
        let (graph, _) = graph();
        let plane = MemoryControlPlane::new();
        plane.fail_describe(&ResourceId::role("R"), ApiError::Unauthorized("expired".into()));
        let err = observe(&graph, &plane, &ExecuteOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Observation { resource, .. } if resource == ResourceId::role("R")));
    }

    #[test]
    fn test_cancelled_before_observation() {
        let (graph, _) = graph();
        let plane = MemoryControlPlane::new();
        let opts = ExecuteOptions::default();
        opts.cancel.cancel();
        assert!(matches!(observe(&graph, &plane, &opts), Err(Error::Cancelled)));
        assert!(plane.calls().is_empty());
    }
}
