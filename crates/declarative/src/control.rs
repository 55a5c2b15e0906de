//! Control-plane interface
//!
//! The remote system is the only source of truth. The engine reaches it
//! exclusively through this trait: the observer calls the `describe*`
//! methods, the executor calls the mutating ones. Implementations must be
//! safe to call from several worker threads at once.

use crate::descriptor::{Descriptor, GrantSpec};
use crate::diff::AttributeDelta;
use crate::error::ApiError;
use crate::types::{ObservedState, ResourceId};
use std::collections::BTreeSet;

/// Remote service managing the lifecycle of compute, storage and identity resources.
///
/// Calls are only assumed idempotent when retried for the same requested state.
pub trait ControlPlane: Send + Sync {
    /// Current state of a resource.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` when the resource does not exist.
    fn describe(&self, id: &ResourceId) -> Result<ObservedState, ApiError>;

    /// Create a resource from its declaration, returning the resulting state.
    fn create(&self, desired: &Descriptor) -> Result<ObservedState, ApiError>;

    /// Apply a field-level change to an existing resource.
    fn update(&self, desired: &Descriptor, delta: &AttributeDelta) -> Result<ObservedState, ApiError>;

    /// Delete a resource.
    fn delete(&self, id: &ResourceId) -> Result<(), ApiError>;

    /// Privileges currently held by the grant's principal on its target and scope.
    ///
    /// Missing principal or target is reported as an empty set or `NotFound`.
    fn describe_grant(&self, grant: &GrantSpec) -> Result<BTreeSet<String>, ApiError>;

    /// Grant `privileges` (a subset or all of the declared ones).
    fn grant_privileges(&self, grant: &GrantSpec, privileges: &BTreeSet<String>) -> Result<(), ApiError>;

    /// Revoke `privileges` from the grant's principal.
    fn revoke_privileges(&self, grant: &GrantSpec, privileges: &BTreeSet<String>) -> Result<(), ApiError>;
}

impl<T: ControlPlane + ?Sized> ControlPlane for std::sync::Arc<T> {
    fn describe(&self, id: &ResourceId) -> Result<ObservedState, ApiError> {
        (**self).describe(id)
    }

    fn create(&self, desired: &Descriptor) -> Result<ObservedState, ApiError> {
        (**self).create(desired)
    }

    fn update(&self, desired: &Descriptor, delta: &AttributeDelta) -> Result<ObservedState, ApiError> {
        (**self).update(desired, delta)
    }

    fn delete(&self, id: &ResourceId) -> Result<(), ApiError> {
        (**self).delete(id)
    }

    fn describe_grant(&self, grant: &GrantSpec) -> Result<BTreeSet<String>, ApiError> {
        (**self).describe_grant(grant)
    }

    fn grant_privileges(&self, grant: &GrantSpec, privileges: &BTreeSet<String>) -> Result<(), ApiError> {
        (**self).grant_privileges(grant, privileges)
    }

    fn revoke_privileges(&self, grant: &GrantSpec, privileges: &BTreeSet<String>) -> Result<(), ApiError> {
        (**self).revoke_privileges(grant, privileges)
    }
}
