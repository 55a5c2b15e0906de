//! Converge pass orchestration
//!
//! `descriptors -> graph -> observed snapshot -> plan -> executor -> report`.
//! Build errors abort before any remote call; observation errors abort
//! before a plan exists.

use crate::context::{ExecuteOptions, ProgressCallback};
use crate::control::ControlPlane;
use crate::descriptor::DescriptorSet;
use crate::error::Result;
use crate::executor::{ConvergeReport, NodeOutcome, execute};
use crate::graph::DependencyGraph;
use crate::observe::{Snapshot, observe};
use crate::output::{ConnectionSpec, Outputs, View, project};
use crate::planner::{Action, Mode, Plan};
use crate::types::NodeStatus;
use std::sync::Arc;

/// Reconciliation engine bound to a control plane
pub struct Engine {
    plane: Arc<dyn ControlPlane>,
    observer: Arc<dyn ControlPlane>,
    options: ExecuteOptions,
}

impl Engine {
    /// Engine that observes and mutates through the same control plane
    pub fn new(plane: Arc<dyn ControlPlane>) -> Self {
        Self {
            observer: Arc::clone(&plane),
            plane,
            options: ExecuteOptions::default(),
        }
    }

    /// Observe through a separate (typically read-only) control plane
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ControlPlane>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ExecuteOptions {
        &self.options
    }

    /// Build, observe and diff without mutating anything.
    ///
    /// # Errors
    ///
    /// Build errors (`DuplicateResource`, `InvalidDescriptor`,
    /// `UnresolvedReference`, `Cycle`), `Observation`, `Cancelled`, `WorkerPool`.
    pub fn plan(&self, set: &DescriptorSet, mode: Mode) -> Result<PlannedPass> {
        let graph = DependencyGraph::build(set)?;
        let graph = match mode {
            Mode::Apply => graph,
            Mode::Destroy => graph.reversed(),
        };
        let snapshot = observe(&graph, self.observer.as_ref(), &self.options)?;
        let plan = Plan::build(&graph, &snapshot, mode);
        log::info!("{mode} plan: {} of {} resources change", plan.mutation_count(), plan.len());
        Ok(PlannedPass {
            graph,
            snapshot,
            plan,
        })
    }

    /// Execute a previously computed plan.
    ///
    /// # Errors
    ///
    /// Returns `WorkerPool` if the worker pool cannot be created. Node
    /// failures are reported in the returned report.
    pub fn execute<P: ProgressCallback>(&self, pass: PlannedPass, progress: &mut P) -> Result<ConvergeReport> {
        let PlannedPass {
            graph,
            snapshot,
            plan,
        } = pass;
        execute(&graph, &plan, snapshot, self.plane.as_ref(), &self.options, progress)
    }

    /// One full converge pass.
    ///
    /// # Errors
    ///
    /// See [`Engine::plan`] and [`Engine::execute`].
    pub fn converge<P: ProgressCallback>(
        &self,
        set: &DescriptorSet,
        mode: Mode,
        progress: &mut P,
    ) -> Result<ConvergeReport> {
        let pass = self.plan(set, mode)?;
        self.execute(pass, progress)
    }

    /// Project outputs of a converged pass.
    ///
    /// # Errors
    ///
    /// Returns `IncompleteConverge` if any node did not converge.
    pub fn outputs(
        &self,
        set: &DescriptorSet,
        report: &ConvergeReport,
        connection: Option<&ConnectionSpec>,
        view: View,
    ) -> Result<Outputs> {
        project(set, report, connection, view)
    }
}

/// Graph, snapshot and plan of a pass that has not executed yet
#[derive(Debug, Clone)]
pub struct PlannedPass {
    graph: DependencyGraph,
    snapshot: Snapshot,
    plan: Plan,
}

impl PlannedPass {
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Report of the remote system as observed, without executing:
    /// nodes already in their desired state are `NoOp`, the rest stay pending.
    pub fn observed_report(&self) -> ConvergeReport {
        let outcomes = self
            .graph
            .indices()
            .map(|ix| {
                let action = self.plan.action(ix).clone();
                let status = if action == Action::NoOp {
                    NodeStatus::NoOp
                } else {
                    NodeStatus::Pending
                };
                NodeOutcome {
                    id: self.graph.descriptor(ix).id().clone(),
                    action,
                    status,
                    observed: self.snapshot.state(ix).clone(),
                    sequence: None,
                    attempts: 0,
                }
            })
            .collect();
        ConvergeReport::from_outcomes(self.plan.mode(), outcomes, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CancelToken, NoProgress};
    use crate::descriptor::{Descriptor, GrantScope, GrantSpec};
    use crate::error::{ApiError, Error};
    use crate::memory::{Call, MemoryControlPlane};
    use crate::retry::RetryConfig;
    use crate::sensitive::{REDACTED, Sensitive};
    use crate::types::{Attributes, ResourceId, ResourceKind, Value};
    use std::time::Duration;

    struct Ids {
        w: ResourceId,
        d: ResourceId,
        s: ResourceId,
        r: ResourceId,
        u: ResourceId,
        grant_w: GrantSpec,
        grant_d: GrantSpec,
        grant_s: GrantSpec,
    }

    fn ids() -> Ids {
        let w = ResourceId::warehouse("W");
        let d = ResourceId::database("D");
        let s = ResourceId::schema(&d, "S");
        let r = ResourceId::role("R");
        Ids {
            grant_w: GrantSpec::new(&r, ["USAGE"], &w, GrantScope::Object),
            grant_d: GrantSpec::new(&r, ["USAGE"], &d, GrantScope::Object),
            grant_s: GrantSpec::new(&r, ["USAGE", "CREATE TABLE"], &s, GrantScope::Object),
            u: ResourceId::user("U"),
            w,
            d,
            s,
            r,
        }
    }

    fn scenario(ids: &Ids) -> DescriptorSet {
        DescriptorSet::new()
            .with(
                Descriptor::builder(ResourceKind::Warehouse, "W")
                    .attr("warehouse_size", "X-SMALL")
                    .build(),
            )
            .with(Descriptor::builder(ResourceKind::Database, "D").build())
            .with(
                Descriptor::builder(ResourceKind::Schema, ids.s.name.clone())
                    .reference("database", &ids.d)
                    .build(),
            )
            .with(Descriptor::builder(ResourceKind::Role, "R").build())
            .with(Descriptor::grant(ids.grant_w.clone()))
            .with(Descriptor::grant(ids.grant_d.clone()))
            .with(Descriptor::grant(ids.grant_s.clone()))
            .with(
                Descriptor::builder(ResourceKind::User, "U")
                    .reference("default_role", &ids.r)
                    .secret("password", Sensitive::new("s3cret".to_string()))
                    .build(),
            )
    }

    fn fast_options() -> ExecuteOptions {
        ExecuteOptions {
            jobs: 4,
            retry: RetryConfig::new(2, Duration::from_millis(1)),
            cancel: CancelToken::new(),
        }
    }

    fn engine(plane: &Arc<MemoryControlPlane>) -> Engine {
        Engine::new(plane.clone()).with_options(fast_options())
    }

    fn position(calls: &[Call], wanted: &Call) -> usize {
        calls
            .iter()
            .position(|c| c == wanted)
            .unwrap_or_else(|| panic!("missing call {wanted:?} in {calls:?}"))
    }

    #[test]
    fn test_cycle_fails_before_any_remote_call() {
        let plane = Arc::new(MemoryControlPlane::new());
        let a = ResourceId::role("A");
        let b = ResourceId::role("B");
        let set = DescriptorSet::new()
            .with(Descriptor::builder(ResourceKind::Role, "A").depends_on(&b).build())
            .with(Descriptor::builder(ResourceKind::Role, "B").depends_on(&a).build());

        let err = engine(&plane).converge(&set, Mode::Apply, &mut NoProgress).unwrap_err();
        assert!(matches!(err, Error::Cycle { members } if members == vec![a, b]));
        assert!(plane.calls().is_empty());
    }

    #[test]
    fn test_unresolved_reference_fails_before_any_remote_call() {
        let plane = Arc::new(MemoryControlPlane::new());
        let set = DescriptorSet::new().with(
            Descriptor::builder(ResourceKind::User, "U")
                .reference("default_role", &ResourceId::role("MISSING"))
                .build(),
        );
        let err = engine(&plane).converge(&set, Mode::Apply, &mut NoProgress).unwrap_err();
        assert!(err.is_build_error());
        assert!(plane.calls().is_empty());
    }

    #[test]
    fn test_empty_remote_creates_everything_in_order() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        let engine = engine(&plane);
        let set = scenario(&ids);

        let pass = engine.plan(&set, Mode::Apply).unwrap();
        assert_eq!(pass.plan().summary().create, 8);
        assert_eq!(pass.plan().mutation_count(), 8);
        let graph = pass.graph();
        for independent in [&ids.w, &ids.d, &ids.r] {
            let ix = graph.index_of(independent).unwrap();
            assert_eq!(graph.dependencies(ix).count(), 0);
        }

        let report = engine.execute(pass, &mut NoProgress).unwrap();
        assert!(report.is_success());
        assert_eq!(report.summary.created, 8);

        let calls = plane.mutating_calls();
        assert_eq!(calls.len(), 8);
        assert_eq!(calls.last(), Some(&Call::Create(ids.u.clone())));
        assert!(position(&calls, &Call::Create(ids.d.clone())) < position(&calls, &Call::Create(ids.s.clone())));
        for spec in [&ids.grant_w, &ids.grant_d, &ids.grant_s] {
            let grant = position(&calls, &Call::Grant(spec.resource_id(), spec.privileges.clone()));
            assert!(position(&calls, &Call::Create(ids.r.clone())) < grant);
            assert!(position(&calls, &Call::Create(spec.target.clone())) < grant);
        }
    }

    #[test]
    fn test_grants_complete_before_role_holder() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new().with_latency(Duration::from_millis(2)));
        let report = engine(&plane)
            .converge(&scenario(&ids), Mode::Apply, &mut NoProgress)
            .unwrap();

        let sequence = |id: &ResourceId| report.outcome(id).and_then(|o| o.sequence).unwrap();
        let user = sequence(&ids.u);
        for spec in [&ids.grant_w, &ids.grant_d, &ids.grant_s] {
            assert!(sequence(&spec.resource_id()) < user);
        }
        assert_eq!(report.completion_order().last(), Some(&&ids.u));
    }

    #[test]
    fn test_second_pass_is_all_noop() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        let engine = engine(&plane);
        let set = scenario(&ids);
        engine.converge(&set, Mode::Apply, &mut NoProgress).unwrap();
        plane.clear_calls();

        let pass = engine.plan(&set, Mode::Apply).unwrap();
        assert!(pass.plan().is_noop());
        let report = engine.execute(pass, &mut NoProgress).unwrap();
        assert_eq!(report.summary.no_op, 8);
        assert!(plane.mutating_calls().is_empty());
    }

    #[test]
    fn test_changed_attribute_is_updated_in_place() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        let engine = engine(&plane);
        let mut set = scenario(&ids);
        engine.converge(&set, Mode::Apply, &mut NoProgress).unwrap();
        plane.clear_calls();

        set.replace(
            Descriptor::builder(ResourceKind::Warehouse, "W")
                .attr("warehouse_size", "LARGE")
                .build(),
        );
        let report = engine.converge(&set, Mode::Apply, &mut NoProgress).unwrap();
        assert!(report.is_success());
        assert_eq!(report.summary.updated, 1);
        assert_eq!(report.summary.no_op, 7);
        assert_eq!(report.outcome(&ids.w).map(|o| &o.status), Some(&NodeStatus::Updated));
        assert_eq!(plane.mutating_calls(), vec![Call::Update(ids.w.clone())]);
        assert_eq!(
            plane.attributes(&ids.w).and_then(|a| a.get("warehouse_size").cloned()),
            Some(Value::from("LARGE"))
        );

        let pass = engine.plan(&set, Mode::Apply).unwrap();
        assert_eq!(pass.plan().mutation_count(), 0);
    }

    #[test]
    fn test_removed_privilege_is_revoked_alone() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        let engine = engine(&plane);
        let mut set = scenario(&ids);
        engine.converge(&set, Mode::Apply, &mut NoProgress).unwrap();
        plane.clear_calls();

        let narrowed = GrantSpec::new(&ids.r, ["CREATE TABLE"], &ids.s, GrantScope::Object);
        set.replace(Descriptor::grant(narrowed.clone()));
        let pass = engine.plan(&set, Mode::Apply).unwrap();
        assert_eq!(pass.plan().mutation_count(), 1);

        let report = engine.execute(pass, &mut NoProgress).unwrap();
        assert!(report.is_success());
        assert_eq!(
            plane.mutating_calls(),
            vec![Call::Revoke(
                narrowed.resource_id(),
                std::collections::BTreeSet::from(["USAGE".to_string()])
            )]
        );
        assert_eq!(plane.held(&narrowed), narrowed.privileges);
    }

    #[test]
    fn test_failure_skips_descendants_only() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        plane.fail_mutation(&ids.r, ApiError::Rejected("role quota exceeded".into()));
        let report = engine(&plane)
            .converge(&scenario(&ids), Mode::Apply, &mut NoProgress)
            .unwrap();

        assert!(!report.is_success());
        assert!(matches!(
            report.outcome(&ids.r).unwrap().status,
            NodeStatus::Failed { .. }
        ));
        for skipped in [
            ids.grant_w.resource_id(),
            ids.grant_d.resource_id(),
            ids.grant_s.resource_id(),
            ids.u.clone(),
        ] {
            assert!(matches!(
                report.outcome(&skipped).unwrap().status,
                NodeStatus::Skipped { .. }
            ));
        }
        for sibling in [&ids.w, &ids.d, &ids.s] {
            assert_eq!(report.outcome(sibling).unwrap().status, NodeStatus::Created);
        }
        assert_eq!(report.mutated().count(), 3);
        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.skipped().count(), 4);
        assert!(
            plane
                .mutating_calls()
                .iter()
                .all(|c| !matches!(c, Call::Grant(..)) && *c != Call::Create(ids.u.clone()))
        );
    }

    #[test]
    fn test_transient_error_retried_once() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        plane.fail_mutation_times(&ids.w, ApiError::RateLimited, 1);
        let report = engine(&plane)
            .converge(&scenario(&ids), Mode::Apply, &mut NoProgress)
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.outcome(&ids.w).unwrap().attempts, 2);
    }

    #[test]
    fn test_transient_error_fails_after_single_retry() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        plane.fail_mutation_times(&ids.w, ApiError::Timeout, 2);
        let report = engine(&plane)
            .converge(&scenario(&ids), Mode::Apply, &mut NoProgress)
            .unwrap();
        let w = report.outcome(&ids.w).unwrap();
        assert!(matches!(&w.status, NodeStatus::Failed { reason } if reason.contains("timed out")));
        assert_eq!(w.attempts, 2);
        assert!(matches!(
            report.outcome(&ids.u).unwrap().status,
            NodeStatus::Skipped { .. }
        ));
    }

    #[test]
    fn test_non_transient_error_is_not_retried() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        plane.fail_mutation_times(&ids.d, ApiError::Unauthorized("missing CREATE DATABASE".into()), 1);
        let report = engine(&plane)
            .converge(&scenario(&ids), Mode::Apply, &mut NoProgress)
            .unwrap();
        assert_eq!(report.outcome(&ids.d).unwrap().attempts, 1);
        assert!(matches!(
            report.outcome(&ids.s).unwrap().status,
            NodeStatus::Skipped { .. }
        ));
    }

    #[test]
    fn test_immutable_conflict_fails_node_and_descendants() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        plane.seed(
            ids.d.clone(),
            Attributes::from([("transient".to_string(), Value::Flag(true))]),
        );
        let mut set = scenario(&ids);
        set.replace(Descriptor::builder(ResourceKind::Database, "D").attr("transient", false).build());

        let report = engine(&plane).converge(&set, Mode::Apply, &mut NoProgress).unwrap();
        assert!(matches!(
            &report.outcome(&ids.d).unwrap().status,
            NodeStatus::Failed { reason } if reason.contains("immutable")
        ));
        assert!(matches!(
            report.outcome(&ids.s).unwrap().status,
            NodeStatus::Skipped { .. }
        ));
        assert_eq!(report.outcome(&ids.w).unwrap().status, NodeStatus::Created);
        assert!(!plane.mutating_calls().contains(&Call::Create(ids.d.clone())));
    }

    #[test]
    fn test_observation_failure_aborts_pass() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        plane.fail_describe(&ids.r, ApiError::Unauthorized("observer lacks MONITOR".into()));
        let err = engine(&plane)
            .converge(&scenario(&ids), Mode::Apply, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::Observation { resource, .. } if resource == ids.r));
        assert!(plane.mutating_calls().is_empty());
    }

    #[test]
    fn test_separate_observer_is_used_for_reads() {
        let ids = ids();
        let admin = Arc::new(MemoryControlPlane::new());
        let observer = Arc::new(MemoryControlPlane::new());
        let engine = Engine::new(admin.clone())
            .with_observer(observer.clone())
            .with_options(fast_options());
        engine.plan(&scenario(&ids), Mode::Apply).unwrap();
        assert!(admin.calls().is_empty());
        assert_eq!(observer.calls().len(), 8);
    }

    struct CancelAfterFirst(CancelToken);

    impl ProgressCallback for CancelAfterFirst {
        fn on_pass_start(&mut self, _total: usize, _mode: Mode) {}
        fn on_node_start(&mut self, _id: &ResourceId, _action: &Action) {}
        fn on_node_complete(&mut self, _id: &ResourceId, _status: &NodeStatus) {
            self.0.cancel();
        }
        fn on_pass_complete(&mut self, _summary: &crate::types::ExecuteSummary) {}
    }

    #[test]
    fn test_cancellation_stops_unstarted_nodes() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        let engine = engine(&plane);
        let set = DescriptorSet::new()
            .with(Descriptor::builder(ResourceKind::Database, "D").build())
            .with(
                Descriptor::builder(ResourceKind::Schema, ids.s.name.clone())
                    .reference("database", &ids.d)
                    .build(),
            );

        let pass = engine.plan(&set, Mode::Apply).unwrap();
        let mut progress = CancelAfterFirst(engine.options().cancel.clone());
        let report = engine.execute(pass, &mut progress).unwrap();

        assert!(report.cancelled);
        assert_eq!(report.outcome(&ids.d).unwrap().status, NodeStatus::Created);
        assert!(matches!(
            report.outcome(&ids.s).unwrap().status,
            NodeStatus::Skipped { .. }
        ));
        assert_eq!(plane.mutating_calls(), vec![Call::Create(ids.d.clone())]);
    }

    #[test]
    fn test_cancelled_pass_makes_no_calls() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        let engine = engine(&plane);
        let pass = engine.plan(&scenario(&ids), Mode::Apply).unwrap();
        engine.options().cancel.cancel();

        let report = engine.execute(pass, &mut NoProgress).unwrap();
        assert_eq!(report.summary.skipped, 8);
        assert!(plane.mutating_calls().is_empty());
    }

    #[test]
    fn test_destroy_reverses_order() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        let engine = engine(&plane);
        let set = scenario(&ids);
        engine.converge(&set, Mode::Apply, &mut NoProgress).unwrap();
        plane.clear_calls();

        let report = engine.converge(&set, Mode::Destroy, &mut NoProgress).unwrap();
        assert!(report.is_success());
        assert_eq!(report.summary.deleted, 8);

        let calls = plane.mutating_calls();
        assert_eq!(calls.first(), Some(&Call::Delete(ids.u.clone())));
        let role = position(&calls, &Call::Delete(ids.r.clone()));
        for spec in [&ids.grant_w, &ids.grant_d, &ids.grant_s] {
            let revoke = position(&calls, &Call::Revoke(spec.resource_id(), spec.privileges.clone()));
            assert!(revoke < role);
            assert!(revoke < position(&calls, &Call::Delete(spec.target.clone())));
        }
        assert!(position(&calls, &Call::Delete(ids.s.clone())) < position(&calls, &Call::Delete(ids.d.clone())));
        for id in [&ids.w, &ids.d, &ids.s, &ids.r, &ids.u] {
            assert!(!plane.exists(id));
        }
    }

    #[test]
    fn test_apply_never_deletes_undeclared() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        let other = ResourceId::warehouse("LEGACY");
        plane.seed(other.clone(), Attributes::new());
        engine(&plane)
            .converge(&scenario(&ids), Mode::Apply, &mut NoProgress)
            .unwrap();
        assert!(plane.exists(&other));
        assert!(!plane.mutating_calls().iter().any(|c| matches!(c, Call::Delete(_))));
    }

    #[test]
    fn test_outputs_after_converge() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        let engine = engine(&plane);
        let set = scenario(&ids);
        let report = engine.converge(&set, Mode::Apply, &mut NoProgress).unwrap();
        let spec = ConnectionSpec {
            account: "acme".into(),
            user: ids.u.clone(),
            warehouse: ids.w.clone(),
            database: ids.d.clone(),
            schema: ids.s.clone(),
            role: ids.r.clone(),
            password_attribute: "password".into(),
        };

        let redacted = engine.outputs(&set, &report, Some(&spec), View::Redacted).unwrap();
        assert_eq!(redacted.attribute(&ids.u, "password").as_deref(), Some(REDACTED));
        assert!(!redacted.to_json().to_string().contains("s3cret"));

        let authenticated = engine
            .outputs(&set, &report, Some(&spec), View::Authenticated)
            .unwrap();
        assert_eq!(authenticated.connection().unwrap().database, "D");
        assert_eq!(authenticated.attribute(&ids.u, "password").as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_outputs_rejected_after_partial_failure() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        plane.fail_mutation(&ids.grant_s.resource_id(), ApiError::Rejected("unknown privilege".into()));
        let engine = engine(&plane);
        let set = scenario(&ids);
        let report = engine.converge(&set, Mode::Apply, &mut NoProgress).unwrap();
        assert_eq!(report.outcome(&ids.u).unwrap().status.label(), "skipped");

        let err = engine.outputs(&set, &report, None, View::Redacted).unwrap_err();
        assert!(matches!(err, Error::IncompleteConverge { pending } if pending.contains(&ids.u)));
    }

    #[test]
    fn test_observed_report_requires_converged_environment() {
        let ids = ids();
        let plane = Arc::new(MemoryControlPlane::new());
        let engine = engine(&plane);
        let set = scenario(&ids);

        let before = engine.plan(&set, Mode::Apply).unwrap().observed_report();
        assert!(engine.outputs(&set, &before, None, View::Redacted).is_err());

        engine.converge(&set, Mode::Apply, &mut NoProgress).unwrap();
        let after = engine.plan(&set, Mode::Apply).unwrap().observed_report();
        assert!(engine.outputs(&set, &after, None, View::Redacted).is_ok());
    }
}
