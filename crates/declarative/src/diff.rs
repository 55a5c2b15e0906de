//! Diff computation between declared and observed state

use crate::descriptor::Descriptor;
use crate::error::Error;
use crate::types::{ObservedState, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single changed field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    /// Remote value, absent when the remote system did not report the field
    pub from: Option<Value>,
    /// Declared value (references already resolved)
    pub to: Value,
}

/// Field-level difference for an existing resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributeDelta {
    pub changes: BTreeMap<String, FieldChange>,
}

impl AttributeDelta {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }
}

impl fmt::Display for AttributeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .changes
            .iter()
            .map(|(field, change)| match &change.from {
                Some(from) => format!("{field}: {from} -> {}", change.to),
                None => format!("{field}: (unset) -> {}", change.to),
            })
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Set difference between declared and held privileges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrivilegeDelta {
    /// Declared but not held
    pub grant: BTreeSet<String>,
    /// Held but not declared
    pub revoke: BTreeSet<String>,
}

impl PrivilegeDelta {
    pub fn is_empty(&self) -> bool {
        self.grant.is_empty() && self.revoke.is_empty()
    }
}

impl fmt::Display for PrivilegeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .grant
            .iter()
            .map(|p| format!("+{p}"))
            .chain(self.revoke.iter().map(|p| format!("-{p}")))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

/// Compare the declared attributes of an existing resource to its observed ones.
///
/// Only declared, diffable attributes are compared: extra remote attributes
/// are ignored and write-only attributes (secrets, create-only settings)
/// are never reported back, so they cannot drift.
///
/// # Errors
///
/// Returns `Error::ImmutableFieldConflict` when a field the kind cannot
/// change after creation differs.
pub fn diff_attributes(desired: &Descriptor, observed: &ObservedState) -> Result<AttributeDelta, Error> {
    let immutable = desired.kind().immutable_fields();
    let mut delta = AttributeDelta::default();

    for (field, value) in desired.diffable_attributes() {
        let wanted = value.resolved();
        let current = observed.attributes.get(field);
        if current == Some(&wanted) {
            continue;
        }

        if immutable.contains(&field.as_str()) {
            return Err(Error::ImmutableFieldConflict {
                resource: desired.id().clone(),
                field: field.clone(),
                desired: wanted.to_string(),
                observed: current.map_or_else(|| "(unset)".to_string(), ToString::to_string),
            });
        }

        delta.changes.insert(
            field.clone(),
            FieldChange {
                from: current.cloned(),
                to: wanted,
            },
        );
    }

    Ok(delta)
}

/// Exact set difference: converges held privileges to the declared set.
pub fn diff_privileges(desired: &BTreeSet<String>, held: &BTreeSet<String>) -> PrivilegeDelta {
    PrivilegeDelta {
        grant: desired.difference(held).cloned().collect(),
        revoke: held.difference(desired).cloned().collect(),
    }
}
