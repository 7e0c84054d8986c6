//! Deduplicating aggregate of every fragment discovered for one request.

use crate::fragment::{Fragment, Linkage, Resource};
use crate::identity::{Identity, PrimaryKey, ResourceType};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Error raised by lifecycle violations on a [`ResourceSet`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSetError {
    /// `mark_populated` called twice
    AlreadyPopulated,
    /// Mutation attempted after `mark_populated`
    Populated(Identity),
}

impl fmt::Display for ResourceSetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceSetError::AlreadyPopulated => write!(f, "Resource set is already populated"),
            ResourceSetError::Populated(identity) => {
                write!(f, "Cannot add {identity}: resource set is populated")
            }
        }
    }
}

impl std::error::Error for ResourceSetError {}

/// Fragments keyed by type, then identity, plus the ordered primary identities.
///
/// Starts unpopulated; [`mark_populated`](ResourceSet::mark_populated) is a
/// one-way transition after which the set is read-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSet {
    fragments: BTreeMap<ResourceType, BTreeMap<Identity, Fragment>>,
    primary: Vec<Identity>,
    populated: bool,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty set that is already populated (zero-result primary query)
    pub fn empty_populated() -> Self {
        Self {
            populated: true,
            ..Self::default()
        }
    }

    fn guard(&self, identity: &Identity) -> Result<(), ResourceSetError> {
        if self.populated {
            Err(ResourceSetError::Populated(identity.clone()))
        } else {
            Ok(())
        }
    }

    /// Insert `fragment`, or merge it into the fragment already held for its identity
    ///
    /// # Errors
    ///
    /// Returns `ResourceSetError::Populated` once the set is populated.
    pub fn add_fragment(&mut self, fragment: Fragment) -> Result<(), ResourceSetError> {
        self.guard(fragment.identity())?;
        let identity = fragment.identity().clone();
        let by_identity = self.fragments.entry(identity.resource_type.clone()).or_default();
        match by_identity.get_mut(&identity) {
            Some(existing) => existing.merge(fragment),
            None => {
                by_identity.insert(identity, fragment);
            }
        }
        Ok(())
    }

    /// `add_fragment` that also records the identity as a primary result, in order
    ///
    /// # Errors
    ///
    /// Returns `ResourceSetError::Populated` once the set is populated.
    pub fn add_primary(&mut self, fragment: Fragment) -> Result<(), ResourceSetError> {
        let identity = fragment.identity().clone();
        self.add_fragment(fragment)?;
        if !self.primary.contains(&identity) {
            self.primary.push(identity);
        }
        Ok(())
    }

    /// Record `owner.relation = linkage` unless that slot is already known
    ///
    /// # Errors
    ///
    /// Returns `ResourceSetError::Populated` once the set is populated.
    pub fn set_relationship(
        &mut self,
        owner: &Identity,
        relation: &str,
        linkage: Linkage,
    ) -> Result<(), ResourceSetError> {
        self.add_fragment(Fragment::new(owner.clone()).with_relationship(relation, linkage))
    }

    /// Attach a loaded payload to its fragment, creating the fragment if needed
    ///
    /// # Errors
    ///
    /// Returns `ResourceSetError::Populated` once the set is populated.
    pub fn hydrate(&mut self, resource: Resource) -> Result<(), ResourceSetError> {
        self.guard(&resource.identity)?;
        let by_identity = self
            .fragments
            .entry(resource.identity.resource_type.clone())
            .or_default();
        match by_identity.get_mut(&resource.identity) {
            Some(existing) => existing.set_resource(resource),
            None => {
                by_identity.insert(resource.identity.clone(), Fragment::from_resource(resource));
            }
        }
        Ok(())
    }

    /// One-way transition to the read-only state
    ///
    /// # Errors
    ///
    /// Returns `ResourceSetError::AlreadyPopulated` on a second call.
    pub fn mark_populated(&mut self) -> Result<(), ResourceSetError> {
        if self.populated {
            return Err(ResourceSetError::AlreadyPopulated);
        }
        self.populated = true;
        Ok(())
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn by_type_and_identity(
        &self,
        resource_type: &ResourceType,
        identity: &Identity,
    ) -> Option<&Fragment> {
        self.fragments.get(resource_type).and_then(|m| m.get(identity))
    }

    pub fn get(&self, identity: &Identity) -> Option<&Fragment> {
        self.by_type_and_identity(&identity.resource_type, identity)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.get(identity).is_some()
    }

    /// Every fragment of `resource_type`, in identity order
    pub fn all(&self, resource_type: &ResourceType) -> Vec<&Fragment> {
        self.fragments
            .get(resource_type)
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &ResourceType> {
        self.fragments.keys()
    }

    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.values().flat_map(|m| m.values())
    }

    pub fn len(&self) -> usize {
        self.fragments.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Primary identities in the order the primary lookup returned them
    pub fn primary_identities(&self) -> &[Identity] {
        &self.primary
    }

    pub fn primary_fragments(&self) -> Vec<&Fragment> {
        self.primary.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Fragments reached only through includes
    pub fn included(&self) -> Vec<&Fragment> {
        let primary: BTreeSet<&Identity> = self.primary.iter().collect();
        self.fragments().filter(|f| !primary.contains(f.identity())).collect()
    }

    /// Keys of fragments still lacking a payload, grouped by type
    pub fn unhydrated(&self) -> BTreeMap<ResourceType, Vec<PrimaryKey>> {
        let mut missing: BTreeMap<ResourceType, Vec<PrimaryKey>> = BTreeMap::new();
        for fragment in self.fragments().filter(|f| !f.is_hydrated()) {
            let identity = fragment.identity();
            missing.entry(identity.resource_type.clone()).or_default().push(identity.key.clone());
        }
        missing
    }
}
