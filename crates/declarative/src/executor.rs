//! Topological executor - applies a plan in dependency order on a bounded worker pool
//!
//! The scheduler runs on the calling thread and owns every node's status.
//! Workers only perform the control-plane calls for the node they were
//! given and report back over a channel; the scheduler blocks on that
//! channel while nothing is ready, so dependents wait without polling.

use crate::context::{ExecuteOptions, ProgressCallback};
use crate::control::ControlPlane;
use crate::descriptor::{Descriptor, GrantSpec};
use crate::diff::PrivilegeDelta;
use crate::error::{ApiError, Error, Result};
use crate::graph::{DependencyGraph, NodeIndex};
use crate::observe::Snapshot;
use crate::planner::{Action, Change, Mode, Plan};
use crate::rbac::{self, PassState};
use crate::retry::with_retry;
use crate::types::{ExecuteSummary, NodeStatus, ObservedState, ResourceId};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

/// Terminal state of one node after a pass
#[derive(Debug, Clone, Serialize)]
pub struct NodeOutcome {
    pub id: ResourceId,
    pub action: Action,
    pub status: NodeStatus,
    /// Observed state after the pass (unchanged if the node never ran)
    pub observed: ObservedState,
    /// Position in completion order, for nodes that converged
    pub sequence: Option<usize>,
    /// Control-plane calls attempted, retries included
    pub attempts: u32,
}

/// Aggregate result of a converge pass
#[derive(Debug, Clone, Serialize)]
pub struct ConvergeReport {
    pub mode: Mode,
    pub summary: ExecuteSummary,
    pub cancelled: bool,
    outcomes: Vec<NodeOutcome>,
}

impl ConvergeReport {
    /// Assemble a report from per-node outcomes, indexed like the graph
    pub(crate) fn from_outcomes(mode: Mode, outcomes: Vec<NodeOutcome>, cancelled: bool) -> Self {
        let mut summary = ExecuteSummary::default();
        for outcome in &outcomes {
            summary.add_status(&outcome.status);
        }
        Self {
            mode,
            summary,
            cancelled,
            outcomes,
        }
    }

    /// Every node reached its desired state
    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }

    pub fn outcome(&self, id: &ResourceId) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| &o.id == id)
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.outcomes.iter()
    }

    /// Nodes that changed the remote system
    pub fn mutated(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_change())
    }

    pub fn failed(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, NodeStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, NodeStatus::Skipped { .. }))
    }

    /// Converged nodes in the order they completed
    pub fn completion_order(&self) -> Vec<&ResourceId> {
        let mut done: Vec<&NodeOutcome> = self.outcomes.iter().filter(|o| o.sequence.is_some()).collect();
        done.sort_by_key(|o| o.sequence);
        done.into_iter().map(|o| &o.id).collect()
    }

    /// Resources not in a converged terminal state
    pub fn unconverged(&self) -> Vec<ResourceId> {
        self.outcomes
            .iter()
            .filter(|o| !o.status.is_converged())
            .map(|o| o.id.clone())
            .collect()
    }
}

/// What a worker reports for its node
enum WorkerResult {
    Applied { status: NodeStatus, state: ObservedState },
    /// The pass was cancelled before the node's API call
    Cancelled,
    Failed(Error),
}

struct Completion {
    ix: NodeIndex,
    result: WorkerResult,
    attempts: u32,
}

/// Execute `plan` over `graph`, starting from `snapshot`.
///
/// A failed node takes down only its descendants: they are marked
/// `Skipped` and never attempted, while independent branches run to
/// completion. Per-node failures are part of the report, not errors.
///
/// # Errors
///
/// Returns `WorkerPool` if the thread pool cannot be created.
pub fn execute<P: ProgressCallback>(
    graph: &DependencyGraph,
    plan: &Plan,
    snapshot: Snapshot,
    plane: &dyn ControlPlane,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<ConvergeReport> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.workers())
        .build()
        .map_err(|e| Error::WorkerPool(e.to_string()))?;

    let mode = plan.mode();
    log::info!(
        "{mode} pass: {} resources, {} changes planned, {} workers",
        graph.len(),
        plan.mutation_count(),
        opts.workers()
    );
    progress.on_pass_start(graph.len(), mode);

    let mut pass = Pass::new(graph, plan, snapshot);
    let (tx, rx) = mpsc::channel::<Completion>();

    pool.in_place_scope(|scope| {
        let mut in_flight = 0_usize;
        loop {
            while let Some(ix) = pass.ready.pop_front() {
                if pass.settle_inline(ix, opts, progress) {
                    continue;
                }

                let descriptor = graph.descriptor(ix);
                let action = plan.action(ix);
                let observed = pass.observed[ix.index()].clone();
                let tx = tx.clone();
                log::debug!("start {}: {}", descriptor.id(), action.label());
                progress.on_node_start(descriptor.id(), action);
                in_flight += 1;

                scope.spawn(move |_| {
                    let mut attempts = 0;
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        apply_node(descriptor, action, &observed, plane, opts, &mut attempts)
                    }))
                    .unwrap_or_else(|_| {
                        WorkerResult::Failed(Error::WorkerPool(format!(
                            "worker panicked while applying {}",
                            descriptor.id()
                        )))
                    });
                    // The receiver lives until every worker has reported
                    let _ = tx.send(Completion { ix, result, attempts });
                });
            }

            if in_flight == 0 {
                break;
            }
            match rx.recv() {
                Ok(done) => {
                    in_flight -= 1;
                    pass.complete(done, progress);
                }
                Err(_) => break,
            }
        }
    });

    let report = pass.finish(mode, opts.cancel.is_cancelled());
    log::info!(
        "{mode} pass finished: {} created, {} updated, {} deleted, {} unchanged, {} failed, {} skipped",
        report.summary.created,
        report.summary.updated,
        report.summary.deleted,
        report.summary.no_op,
        report.summary.failed,
        report.summary.skipped
    );
    progress.on_pass_complete(&report.summary);
    Ok(report)
}

/// Scheduler-owned state of one pass, indexed like the graph
struct Pass<'g> {
    graph: &'g DependencyGraph,
    plan: &'g Plan,
    status: Vec<NodeStatus>,
    observed: Vec<ObservedState>,
    exists: Vec<bool>,
    /// Dependencies not yet converged
    waiting: Vec<usize>,
    attempts: Vec<u32>,
    sequence: Vec<Option<usize>>,
    next_sequence: usize,
    ready: VecDeque<NodeIndex>,
}

impl<'g> Pass<'g> {
    fn new(graph: &'g DependencyGraph, plan: &'g Plan, snapshot: Snapshot) -> Self {
        let observed = snapshot.into_states();
        let exists = observed.iter().map(|s| s.exists).collect();
        let waiting: Vec<usize> = graph.indices().map(|ix| graph.dependencies(ix).count()).collect();
        let ready = graph
            .topological_order()
            .iter()
            .copied()
            .filter(|ix| waiting[ix.index()] == 0)
            .collect();

        Self {
            graph,
            plan,
            status: vec![NodeStatus::Pending; graph.len()],
            observed,
            exists,
            waiting,
            attempts: vec![0; graph.len()],
            sequence: vec![None; graph.len()],
            next_sequence: 0,
            ready,
        }
    }

    /// Resolve `ix` without a worker when no API call is needed.
    ///
    /// Returns `false` when the node must be dispatched.
    fn settle_inline<P: ProgressCallback>(&mut self, ix: NodeIndex, opts: &ExecuteOptions, progress: &mut P) -> bool {
        let graph = self.graph;
        let plan = self.plan;
        if self.status[ix.index()].is_terminal() {
            return true;
        }

        let id = graph.descriptor(ix).id();
        if opts.cancel.is_cancelled() {
            log::warn!("pass cancelled, not starting {id}");
            self.abandon(ix, "pass cancelled before start".to_string(), progress);
            return true;
        }

        let action = plan.action(ix);
        if let Some(conflict) = action.conflict_error(id) {
            self.fail(ix, &conflict, progress);
            return true;
        }
        if *action == Action::NoOp {
            self.converge(ix, NodeStatus::NoOp, None, progress);
            return true;
        }

        let state = PassState {
            exists: &self.exists,
            status: &self.status,
        };
        if let Err(violation) = rbac::admit(graph, ix, action, plan.mode(), &state) {
            self.fail(ix, &violation, progress);
            return true;
        }
        false
    }

    fn complete<P: ProgressCallback>(&mut self, done: Completion, progress: &mut P) {
        self.attempts[done.ix.index()] = done.attempts;
        match done.result {
            WorkerResult::Applied { status, state } => self.converge(done.ix, status, Some(state), progress),
            WorkerResult::Cancelled => {
                self.abandon(done.ix, "pass cancelled before API call".to_string(), progress);
            }
            WorkerResult::Failed(error) => self.fail(done.ix, &error, progress),
        }
    }

    fn converge<P: ProgressCallback>(
        &mut self,
        ix: NodeIndex,
        status: NodeStatus,
        state: Option<ObservedState>,
        progress: &mut P,
    ) {
        let graph = self.graph;
        let i = ix.index();
        if let Some(state) = state {
            self.exists[i] = state.exists;
            self.observed[i] = state;
        }
        log::debug!("{}: {}", graph.descriptor(ix).id(), status.label());
        progress.on_node_complete(graph.descriptor(ix).id(), &status);
        self.status[i] = status;
        self.sequence[i] = Some(self.next_sequence);
        self.next_sequence += 1;

        for dependent in graph.dependents(ix) {
            let waiting = &mut self.waiting[dependent.index()];
            *waiting -= 1;
            if *waiting == 0 {
                self.ready.push_back(dependent);
            }
        }
    }

    fn fail<P: ProgressCallback>(&mut self, ix: NodeIndex, error: &Error, progress: &mut P) {
        let graph = self.graph;
        let id = graph.descriptor(ix).id();
        log::error!("{id} failed: {error}");
        let status = NodeStatus::Failed {
            reason: error.to_string(),
        };
        progress.on_node_complete(id, &status);
        self.status[ix.index()] = status;
        self.skip_descendants(ix, &format!("dependency {id} failed"), progress);
    }

    /// Skip a node that never started, along with everything waiting on it
    fn abandon<P: ProgressCallback>(&mut self, ix: NodeIndex, reason: String, progress: &mut P) {
        let graph = self.graph;
        let status = NodeStatus::Skipped { reason };
        progress.on_node_complete(graph.descriptor(ix).id(), &status);
        self.status[ix.index()] = status;
        let reason = format!("dependency {} was not applied", graph.descriptor(ix).id());
        self.skip_descendants(ix, &reason, progress);
    }

    fn skip_descendants<P: ProgressCallback>(&mut self, ix: NodeIndex, reason: &str, progress: &mut P) {
        let graph = self.graph;
        for descendant in graph.descendants(ix) {
            let i = descendant.index();
            if self.status[i] == NodeStatus::Pending {
                let status = NodeStatus::Skipped {
                    reason: reason.to_string(),
                };
                log::debug!("{}: skipped, {reason}", graph.descriptor(descendant).id());
                progress.on_node_complete(graph.descriptor(descendant).id(), &status);
                self.status[i] = status;
            }
        }
    }

    fn finish(self, mode: Mode, cancelled: bool) -> ConvergeReport {
        let graph = self.graph;
        let plan = self.plan;
        let outcomes = self
            .status
            .into_iter()
            .zip(self.observed)
            .zip(self.sequence.into_iter().zip(self.attempts))
            .enumerate()
            .map(|(i, ((status, observed), (sequence, attempts)))| {
                let ix = NodeIndex::new(i);
                let status = match status {
                    NodeStatus::Pending => NodeStatus::Skipped {
                        reason: "not reached".to_string(),
                    },
                    other => other,
                };
                NodeOutcome {
                    id: graph.descriptor(ix).id().clone(),
                    action: plan.action(ix).clone(),
                    status,
                    observed,
                    sequence,
                    attempts,
                }
            })
            .collect();

        ConvergeReport::from_outcomes(mode, outcomes, cancelled)
    }
}

/// Perform the control-plane calls for one node
fn apply_node(
    descriptor: &Descriptor,
    action: &Action,
    observed: &ObservedState,
    plane: &dyn ControlPlane,
    opts: &ExecuteOptions,
    attempts: &mut u32,
) -> WorkerResult {
    if opts.cancel.is_cancelled() {
        return WorkerResult::Cancelled;
    }
    match run_action(descriptor, action, observed, plane, opts, attempts) {
        Ok((status, state)) => WorkerResult::Applied { status, state },
        Err(error) => WorkerResult::Failed(error),
    }
}

fn run_action(
    descriptor: &Descriptor,
    action: &Action,
    observed: &ObservedState,
    plane: &dyn ControlPlane,
    opts: &ExecuteOptions,
    attempts: &mut u32,
) -> Result<(NodeStatus, ObservedState)> {
    let id = descriptor.id();
    let api = |source: ApiError| Error::Api {
        resource: id.clone(),
        source,
    };

    match (action, descriptor.grant_spec()) {
        (Action::Create, Some(spec)) => {
            retried(opts, "grant", id, attempts, || plane.grant_privileges(spec, &spec.privileges)).map_err(api)?;
            Ok((
                NodeStatus::Created,
                ObservedState::granted(id.clone(), spec.privileges.clone()),
            ))
        }
        (Action::Create, None) => {
            let state = retried(opts, "create", id, attempts, || plane.create(descriptor)).map_err(api)?;
            Ok((NodeStatus::Created, state))
        }
        (
            Action::Update {
                change: Change::Privileges(delta),
            },
            Some(spec),
        ) => {
            apply_privilege_delta(spec, delta, plane, opts, attempts).map_err(api)?;
            Ok((
                NodeStatus::Updated,
                ObservedState::granted(id.clone(), spec.privileges.clone()),
            ))
        }
        (
            Action::Update {
                change: Change::Attributes(delta),
            },
            _,
        ) => {
            let state = retried(opts, "update", id, attempts, || plane.update(descriptor, delta)).map_err(api)?;
            Ok((NodeStatus::Updated, state))
        }
        (
            Action::Update {
                change: Change::Privileges(_),
            },
            None,
        ) => Err(Error::InvalidDescriptor {
            resource: id.clone(),
            message: "privilege change planned for a resource without a grant".to_string(),
        }),
        (Action::Delete, Some(spec)) => {
            if !observed.privileges.is_empty() {
                retried(opts, "revoke", id, attempts, || {
                    plane.revoke_privileges(spec, &observed.privileges)
                })
                .map_err(api)?;
            }
            Ok((NodeStatus::Deleted, ObservedState::granted(id.clone(), BTreeSet::new())))
        }
        (Action::Delete, None) => {
            retried(opts, "delete", id, attempts, || plane.delete(id)).map_err(api)?;
            Ok((NodeStatus::Deleted, ObservedState::absent(id.clone())))
        }
        (Action::NoOp, _) => Ok((NodeStatus::NoOp, observed.clone())),
        (
            Action::Conflict {
                field,
                desired,
                observed: found,
            },
            _,
        ) => Err(Error::ImmutableFieldConflict {
            resource: id.clone(),
            field: field.clone(),
            desired: desired.clone(),
            observed: found.clone(),
        }),
    }
}

/// Revoke before granting so the principal never holds the union of old and new sets
fn apply_privilege_delta(
    spec: &GrantSpec,
    delta: &PrivilegeDelta,
    plane: &dyn ControlPlane,
    opts: &ExecuteOptions,
    attempts: &mut u32,
) -> std::result::Result<(), ApiError> {
    let id = spec.resource_id();
    if !delta.revoke.is_empty() {
        retried(opts, "revoke", &id, attempts, || plane.revoke_privileges(spec, &delta.revoke))?;
    }
    if !delta.grant.is_empty() {
        retried(opts, "grant", &id, attempts, || plane.grant_privileges(spec, &delta.grant))?;
    }
    Ok(())
}

/// Run one control-plane call under the retry policy, counting attempts
fn retried<T>(
    opts: &ExecuteOptions,
    what: &str,
    id: &ResourceId,
    attempts: &mut u32,
    op: impl FnMut() -> std::result::Result<T, ApiError>,
) -> std::result::Result<T, ApiError> {
    let attempted = with_retry(&opts.retry, &format!("{what} {id}"), op);
    *attempts += attempted.attempts;
    attempted.result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::descriptor::DescriptorSet;
    use crate::memory::MemoryControlPlane;
    use crate::observe::observe;
    use crate::types::ResourceKind;
    use std::time::Duration;

    fn independent(count: usize) -> DescriptorSet {
        (0..count)
            .map(|i| Descriptor::builder(ResourceKind::Warehouse, format!("W{i}")).build())
            .collect()
    }

    fn run(set: &DescriptorSet, plane: &dyn ControlPlane, opts: &ExecuteOptions) -> ConvergeReport {
        let graph = DependencyGraph::build(set).unwrap();
        let snapshot = observe(&graph, plane, opts).unwrap();
        let plan = Plan::build(&graph, &snapshot, Mode::Apply);
        execute(&graph, &plan, snapshot, plane, opts, &mut NoProgress).unwrap()
    }

    #[test]
    fn test_single_worker_serializes_calls() {
        let plane = MemoryControlPlane::new().with_latency(Duration::from_millis(5));
        let opts = ExecuteOptions {
            jobs: 1,
            ..Default::default()
        };
        let report = run(&independent(4), &plane, &opts);
        assert_eq!(report.summary.created, 4);
        assert_eq!(plane.peak_concurrency(), 1);
    }

    #[test]
    fn test_pool_bounds_concurrency() {
        let plane = MemoryControlPlane::new().with_latency(Duration::from_millis(5));
        let opts = ExecuteOptions {
            jobs: 2,
            ..Default::default()
        };
        let report = run(&independent(6), &plane, &opts);
        assert!(report.is_success());
        assert!(plane.peak_concurrency() <= 2);
    }

    struct PanickingPlane(MemoryControlPlane);

    impl ControlPlane for PanickingPlane {
        fn describe(&self, id: &ResourceId) -> std::result::Result<ObservedState, ApiError> {
            self.0.describe(id)
        }
        fn create(&self, desired: &Descriptor) -> std::result::Result<ObservedState, ApiError> {
            if desired.name() == "W0" {
                panic!("backend bug");
            }
            self.0.create(desired)
        }
        fn update(
            &self,
            desired: &Descriptor,
            delta: &crate::diff::AttributeDelta,
        ) -> std::result::Result<ObservedState, ApiError> {
            self.0.update(desired, delta)
        }
        fn delete(&self, id: &ResourceId) -> std::result::Result<(), ApiError> {
            self.0.delete(id)
        }
        fn describe_grant(
            &self,
            grant: &GrantSpec,
        ) -> std::result::Result<BTreeSet<String>, ApiError> {
            self.0.describe_grant(grant)
        }
        fn grant_privileges(
            &self,
            grant: &GrantSpec,
            privileges: &BTreeSet<String>,
        ) -> std::result::Result<(), ApiError> {
            self.0.grant_privileges(grant, privileges)
        }
        fn revoke_privileges(
            &self,
            grant: &GrantSpec,
            privileges: &BTreeSet<String>,
        ) -> std::result::Result<(), ApiError> {
            self.0.revoke_privileges(grant, privileges)
        }
    }

    #[test]
    fn test_worker_panic_becomes_node_failure() {
        let plane = PanickingPlane(MemoryControlPlane::new());
        let report = run(&independent(2), &plane, &ExecuteOptions::default());
        let w0 = report.outcome(&ResourceId::warehouse("W0")).unwrap();
        assert!(matches!(&w0.status, NodeStatus::Failed { reason } if reason.contains("panicked")));
        let w1 = report.outcome(&ResourceId::warehouse("W1")).unwrap();
        assert_eq!(w1.status, NodeStatus::Created);
    }
}
