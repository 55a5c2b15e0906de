//! In-memory control plane
//!
//! Keeps resources and privilege grants in process memory, records every
//! call, and can inject failures and latency. Used by the engine tests and
//! for offline runs of the operator tooling.

use crate::control::ControlPlane;
use crate::descriptor::{Descriptor, GrantSpec, normalize_privileges};
use crate::diff::AttributeDelta;
use crate::error::ApiError;
use crate::types::{Attributes, ObservedState, ResourceId, ResourceKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// A recorded control-plane call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Describe(ResourceId),
    DescribeGrant(ResourceId),
    Create(ResourceId),
    Update(ResourceId),
    Delete(ResourceId),
    Grant(ResourceId, BTreeSet<String>),
    Revoke(ResourceId, BTreeSet<String>),
}

impl Call {
    /// Resource the call was issued for (grant calls use the grant's id)
    pub fn resource(&self) -> &ResourceId {
        match self {
            Self::Describe(id)
            | Self::DescribeGrant(id)
            | Self::Create(id)
            | Self::Update(id)
            | Self::Delete(id)
            | Self::Grant(id, _)
            | Self::Revoke(id, _) => id,
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Describe(_) | Self::DescribeGrant(_))
    }
}

#[derive(Debug)]
struct InjectedFailure {
    error: ApiError,
    /// Remaining failures; `None` fails forever
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct State {
    resources: BTreeMap<ResourceId, Attributes>,
    grants: BTreeMap<ResourceId, (GrantSpec, BTreeSet<String>)>,
    calls: Vec<Call>,
    describe_failures: HashMap<ResourceId, ApiError>,
    mutation_failures: HashMap<ResourceId, InjectedFailure>,
}

/// Control plane backed by process memory
#[derive(Debug, Default)]
pub struct MemoryControlPlane {
    state: Mutex<State>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every mutating call
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an existing resource
    pub fn seed(&self, id: ResourceId, attributes: Attributes) {
        self.lock().resources.insert(id, attributes);
    }

    /// Make `spec.principal` hold `privileges` on the spec's target and scope
    pub fn seed_grant<I, S>(&self, spec: &GrantSpec, privileges: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let held = normalize_privileges(privileges);
        self.lock()
            .grants
            .insert(spec.resource_id(), (spec.clone(), held));
    }

    /// Every describe of `id` fails with `error`
    pub fn fail_describe(&self, id: &ResourceId, error: ApiError) {
        self.lock().describe_failures.insert(id.clone(), error);
    }

    /// Every mutating call on `id` fails with `error`
    pub fn fail_mutation(&self, id: &ResourceId, error: ApiError) {
        self.lock().mutation_failures.insert(
            id.clone(),
            InjectedFailure {
                error,
                remaining: None,
            },
        );
    }

    /// The next `times` mutating calls on `id` fail with `error`
    pub fn fail_mutation_times(&self, id: &ResourceId, error: ApiError, times: u32) {
        self.lock().mutation_failures.insert(
            id.clone(),
            InjectedFailure {
                error,
                remaining: Some(times),
            },
        );
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.describe_failures.clear();
        state.mutation_failures.clear();
    }

    pub fn exists(&self, id: &ResourceId) -> bool {
        self.lock().resources.contains_key(id)
    }

    pub fn attributes(&self, id: &ResourceId) -> Option<Attributes> {
        self.lock().resources.get(id).cloned()
    }

    /// Privileges held for a grant's (principal, target, scope)
    pub fn held(&self, spec: &GrantSpec) -> BTreeSet<String> {
        self.lock()
            .grants
            .get(&spec.resource_id())
            .map(|(_, held)| held.clone())
            .unwrap_or_default()
    }

    /// Every call in issue order
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Mutating calls in issue order
    pub fn mutating_calls(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Highest number of mutating calls observed running at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Record a mutating call, simulate latency, and consume any injected failure
    fn begin_mutation(&self, call: Call) -> Result<InFlight<'_>, ApiError> {
        let id = call.resource().clone();
        {
            let mut state = self.lock();
            state.calls.push(call);
            if let Some(failure) = state.mutation_failures.get_mut(&id) {
                let error = failure.error.clone();
                match &mut failure.remaining {
                    None => return Err(error),
                    Some(0) => {}
                    Some(n) => {
                        *n -= 1;
                        return Err(error);
                    }
                }
            }
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        Ok(InFlight(self))
    }
}

/// Decrements the in-flight counter when a mutating call finishes
struct InFlight<'a>(&'a MemoryControlPlane);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl State {
    fn require(&self, id: &ResourceId) -> Result<(), ApiError> {
        if self.resources.contains_key(id) {
            Ok(())
        } else {
            Err(ApiError::Rejected(format!("{id} does not exist")))
        }
    }

    /// Drop everything contained in or granted on `id`
    fn cascade(&mut self, id: &ResourceId) {
        if id.kind == ResourceKind::Database {
            let prefix = format!("{}.", id.name);
            self.resources
                .retain(|r, _| !(r.kind == ResourceKind::Schema && r.name.starts_with(&prefix)));
        }
        let resources = &self.resources;
        self.grants.retain(|_, (spec, _)| {
            resources.contains_key(&spec.principal) && resources.contains_key(&spec.target)
        });
    }
}

impl ControlPlane for MemoryControlPlane {
    fn describe(&self, id: &ResourceId) -> Result<ObservedState, ApiError> {
        let mut state = self.lock();
        state.calls.push(Call::Describe(id.clone()));
        if let Some(error) = state.describe_failures.get(id) {
            return Err(error.clone());
        }
        state
            .resources
            .get(id)
            .map(|attributes| ObservedState::present(id.clone(), attributes.clone()))
            .ok_or(ApiError::NotFound)
    }

    fn create(&self, desired: &Descriptor) -> Result<ObservedState, ApiError> {
        let _guard = self.begin_mutation(Call::Create(desired.id().clone()))?;
        let mut state = self.lock();
        for reference in desired.references() {
            state.require(reference)?;
        }

        // Write-only attributes are applied but never reported back
        let attributes: Attributes = desired
            .diffable_attributes()
            .map(|(k, v)| (k.clone(), v.resolved()))
            .collect();
        state.resources.insert(desired.id().clone(), attributes.clone());
        Ok(ObservedState::present(desired.id().clone(), attributes))
    }

    fn update(&self, desired: &Descriptor, delta: &AttributeDelta) -> Result<ObservedState, ApiError> {
        let _guard = self.begin_mutation(Call::Update(desired.id().clone()))?;
        let mut state = self.lock();
        for reference in desired.references() {
            state.require(reference)?;
        }
        let attributes = state
            .resources
            .get_mut(desired.id())
            .ok_or(ApiError::NotFound)?;
        for (field, change) in &delta.changes {
            attributes.insert(field.clone(), change.to.clone());
        }
        Ok(ObservedState::present(desired.id().clone(), attributes.clone()))
    }

    fn delete(&self, id: &ResourceId) -> Result<(), ApiError> {
        let _guard = self.begin_mutation(Call::Delete(id.clone()))?;
        let mut state = self.lock();
        state.resources.remove(id);
        state.cascade(id);
        Ok(())
    }

    fn describe_grant(&self, grant: &GrantSpec) -> Result<BTreeSet<String>, ApiError> {
        let id = grant.resource_id();
        let mut state = self.lock();
        state.calls.push(Call::DescribeGrant(id.clone()));
        if let Some(error) = state.describe_failures.get(&id) {
            return Err(error.clone());
        }
        if !state.resources.contains_key(&grant.principal) || !state.resources.contains_key(&grant.target) {
            return Err(ApiError::NotFound);
        }
        Ok(state
            .grants
            .get(&id)
            .map(|(_, held)| held.clone())
            .unwrap_or_default())
    }

    fn grant_privileges(&self, grant: &GrantSpec, privileges: &BTreeSet<String>) -> Result<(), ApiError> {
        let id = grant.resource_id();
        let _guard = self.begin_mutation(Call::Grant(id.clone(), privileges.clone()))?;
        let mut state = self.lock();
        state.require(&grant.principal)?;
        state.require(&grant.target)?;
        let entry = state
            .grants
            .entry(id)
            .or_insert_with(|| (grant.clone(), BTreeSet::new()));
        entry.1.extend(privileges.iter().cloned());
        Ok(())
    }

    fn revoke_privileges(&self, grant: &GrantSpec, privileges: &BTreeSet<String>) -> Result<(), ApiError> {
        let id = grant.resource_id();
        let _guard = self.begin_mutation(Call::Revoke(id.clone(), privileges.clone()))?;
        let mut state = self.lock();
        if let Some((_, held)) = state.grants.get_mut(&id) {
            held.retain(|p| !privileges.contains(p));
            if held.is_empty() {
                state.grants.remove(&id);
            }
        }
        Ok(())
    }
}
