//! Resource fragments.
//!
//! A [`Fragment`] is everything known so far about one [`Identity`]: the
//! relationship-id slots resolved for it and, once loaded, its attribute
//! payload. Fragments are created once per identity and then merged; a merge
//! only ever fills in what is still unknown.

use crate::identity::Identity;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Attribute bag of a hydrated resource.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// A hydrated resource: identity plus attributes as loaded from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    #[serde(flatten)]
    pub identity: Identity,
    pub attributes: Attributes,
}

impl Resource {
    pub fn new(identity: Identity, attributes: Attributes) -> Self {
        Self { identity, attributes }
    }

    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}

/// Resolved content of one relationship slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Linkage {
    /// To-one relation; `None` when the owner has no related record
    ToOne(Option<Identity>),
    /// To-many relation
    ToMany(BTreeSet<Identity>),
}

impl Linkage {
    /// The "nothing related" value for a relation of the given arity.
    pub fn empty(to_many: bool) -> Self {
        if to_many {
            Linkage::ToMany(BTreeSet::new())
        } else {
            Linkage::ToOne(None)
        }
    }

    pub fn is_to_many(&self) -> bool {
        matches!(self, Linkage::ToMany(_))
    }

    /// Iterate the related identities held by this slot.
    pub fn identities(&self) -> Box<dyn Iterator<Item = &Identity> + '_> {
        match self {
            Linkage::ToOne(one) => Box::new(one.iter()),
            Linkage::ToMany(many) => Box::new(many.iter()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Linkage::ToOne(one) => usize::from(one.is_some()),
            Linkage::ToMany(many) => many.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One identity's known data plus relationship-id slots.
///
/// A slot that is absent from `relationships` is "not yet resolved"; a
/// present slot is known and stays stable for the lifetime of the owning
/// [`ResourceSet`](crate::ResourceSet).
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    identity: Identity,
    resource: Option<Resource>,
    relationships: BTreeMap<String, Linkage>,
}

impl Fragment {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            resource: None,
            relationships: BTreeMap::new(),
        }
    }

    /// Fragment that already carries its hydrated resource.
    pub fn from_resource(resource: Resource) -> Self {
        Self {
            identity: resource.identity.clone(),
            resource: Some(resource),
            relationships: BTreeMap::new(),
        }
    }

    /// Builder-style slot assignment, used when constructing a fragment to merge.
    #[must_use]
    pub fn with_relationship(mut self, relation: impl Into<String>, linkage: Linkage) -> Self {
        self.relationships.insert(relation.into(), linkage);
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    pub fn is_hydrated(&self) -> bool {
        self.resource.is_some()
    }

    /// Known slot for `relation`, or `None` while it is unresolved.
    pub fn relationship(&self, relation: &str) -> Option<&Linkage> {
        self.relationships.get(relation)
    }

    pub fn relationships(&self) -> &BTreeMap<String, Linkage> {
        &self.relationships
    }

    /// Fill in whatever `other` knows that `self` does not.
    ///
    /// Known slots are never overwritten and the payload is only taken when
    /// `self` has none, which makes merging commutative and associative over
    /// fragments that agree on their known data.
    ///
    /// # Panics
    ///
    /// Debug builds assert that both fragments share one identity; the
    /// [`ResourceSet`](crate::ResourceSet) only merges fragments it keyed by
    /// identity.
    pub fn merge(&mut self, other: Fragment) {
        debug_assert_eq!(
            self.identity, other.identity,
            "merging fragments of different identities"
        );

        if self.resource.is_none() {
            self.resource = other.resource;
        }
        for (relation, linkage) in other.relationships {
            self.relationships.entry(relation).or_insert(linkage);
        }
    }

    pub(crate) fn set_resource(&mut self, resource: Resource) {
        if self.resource.is_none() {
            self.resource = Some(resource);
        }
    }
}
