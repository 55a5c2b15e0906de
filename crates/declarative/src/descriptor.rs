//! Resource descriptors: immutable declarations of desired resources
//!
//! A [`Descriptor`] names a resource, its desired attributes, and every
//! other descriptor it depends on. Cross-resource values are expressed as
//! [`Value::Ref`] so the dependency edge is recorded by the builder, never
//! inferred from string contents.

use crate::sensitive::Sensitive;
use crate::types::{Attributes, ResourceId, ResourceKind, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// What a grant applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantScope {
    /// The target object itself
    Object,
    /// Objects of `object_type` (e.g. `TABLES`) created later inside the target container
    Future { object_type: String },
}

impl fmt::Display for GrantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => f.write_str("object"),
            Self::Future { object_type } => write!(f, "future {object_type}"),
        }
    }
}

/// A privilege assignment: `privileges` on `target` held by `principal`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantSpec {
    pub principal: ResourceId,
    pub target: ResourceId,
    pub privileges: BTreeSet<String>,
    pub scope: GrantScope,
}

impl GrantSpec {
    /// Build a grant, normalizing privilege names to upper case
    pub fn new<I, S>(principal: &ResourceId, privileges: I, target: &ResourceId, scope: GrantScope) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            principal: principal.clone(),
            target: target.clone(),
            privileges: normalize_privileges(privileges),
            scope,
        }
    }

    /// Stable name of the grant resource, unique per (principal, target, scope)
    pub fn resource_name(&self) -> String {
        match &self.scope {
            GrantScope::Object => format!("{}@{}", self.principal.name, self.target),
            GrantScope::Future { object_type } => format!(
                "{}@future.{}.{}",
                self.principal.name,
                object_type.to_ascii_uppercase(),
                self.target
            ),
        }
    }

    /// Identifier of the grant resource
    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(ResourceKind::Grant, self.resource_name())
    }
}

/// Upper-case and trim privilege names, dropping blanks
pub fn normalize_privileges<I, S>(privileges: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    privileges
        .into_iter()
        .map(|p| p.as_ref().trim().to_ascii_uppercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Declaration of one desired resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    id: ResourceId,
    attributes: Attributes,
    /// Attributes applied on create but never compared against remote state
    write_only: BTreeSet<String>,
    /// Structural dependencies
    references: BTreeSet<ResourceId>,
    /// Ordering hints not implied by any reference
    after: BTreeSet<ResourceId>,
    grant: Option<GrantSpec>,
}

impl Descriptor {
    /// Start building a descriptor
    pub fn builder(kind: ResourceKind, name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            descriptor: Self {
                id: ResourceId::new(kind, name),
                attributes: Attributes::new(),
                write_only: BTreeSet::new(),
                references: BTreeSet::new(),
                after: BTreeSet::new(),
                grant: None,
            },
        }
    }

    /// Descriptor for a grant; references both endpoints
    pub fn grant(spec: GrantSpec) -> Self {
        let mut references = BTreeSet::new();
        references.insert(spec.principal.clone());
        references.insert(spec.target.clone());
        Self {
            id: spec.resource_id(),
            attributes: Attributes::new(),
            write_only: BTreeSet::new(),
            references,
            after: BTreeSet::new(),
            grant: Some(spec),
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.id.kind
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Whether an attribute is only applied on create
    pub fn is_write_only(&self, key: &str) -> bool {
        self.write_only.contains(key)
            || self.attributes.get(key).is_some_and(Value::is_secret)
    }

    /// Attributes compared against remote state when diffing
    pub fn diffable_attributes(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attributes
            .iter()
            .filter(|(key, _)| !self.is_write_only(key))
    }

    pub fn references(&self) -> &BTreeSet<ResourceId> {
        &self.references
    }

    pub fn ordering_hints(&self) -> &BTreeSet<ResourceId> {
        &self.after
    }

    pub fn grant_spec(&self) -> Option<&GrantSpec> {
        self.grant.as_ref()
    }

    /// Whether this descriptor references `id` structurally
    pub fn references_id(&self, id: &ResourceId) -> bool {
        self.references.contains(id)
    }
}

/// Builder for non-grant descriptors
#[derive(Debug)]
pub struct DescriptorBuilder {
    descriptor: Descriptor,
}

impl DescriptorBuilder {
    /// Set a plain attribute
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if let Value::Ref(target) = &value {
            self.descriptor.references.insert(target.clone());
        }
        self.descriptor.attributes.insert(key.into(), value);
        self
    }

    /// Set an attribute whose value is another resource's name
    pub fn reference(self, key: impl Into<String>, target: &ResourceId) -> Self {
        self.attr(key, Value::Ref(target.clone()))
    }

    /// Set an attribute that is applied on create and never diffed
    pub fn create_only(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        self.descriptor.write_only.insert(key.clone());
        self.attr(key, value)
    }

    /// Set a secret attribute (write-only, redacted)
    pub fn secret(self, key: impl Into<String>, value: Sensitive<String>) -> Self {
        self.attr(key, Value::Secret(value))
    }

    /// Depend on another resource without carrying its name in an attribute
    pub fn depends_on(mut self, target: &ResourceId) -> Self {
        self.descriptor.references.insert(target.clone());
        self
    }

    /// Order this resource after another one
    pub fn after(mut self, target: &ResourceId) -> Self {
        self.descriptor.after.insert(target.clone());
        self
    }

    pub fn build(self) -> Descriptor {
        self.descriptor
    }
}

/// The full set of declared resources for one converge invocation
#[derive(Debug, Clone, Default)]
pub struct DescriptorSet {
    descriptors: Vec<Descriptor>,
}

impl DescriptorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, descriptor: Descriptor) {
        self.descriptors.push(descriptor);
    }

    /// Builder-style push
    pub fn with(mut self, descriptor: Descriptor) -> Self {
        self.push(descriptor);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.id() == id)
    }

    /// Remove a descriptor, returning it if it was declared
    pub fn remove(&mut self, id: &ResourceId) -> Option<Descriptor> {
        let position = self.descriptors.iter().position(|d| d.id() == id)?;
        Some(self.descriptors.remove(position))
    }

    /// Replace a declared descriptor with the same id
    pub fn replace(&mut self, descriptor: Descriptor) -> Option<Descriptor> {
        let old = self.remove(descriptor.id());
        self.push(descriptor);
        old
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl FromIterator<Descriptor> for DescriptorSet {
    fn from_iter<T: IntoIterator<Item = Descriptor>>(iter: T) -> Self {
        Self {
            descriptors: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for DescriptorSet {
    type Item = Descriptor;
    type IntoIter = std::vec::IntoIter<Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.into_iter()
    }
}
