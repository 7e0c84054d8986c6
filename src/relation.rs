//! Relationship metadata and the schema registry.
//!
//! Provides the relationship kinds the resolution engine understands:
//! - belongs_to: Many-to-one relationship (optionally polymorphic)
//! - has_one: One-to-one relationship
//! - has_many: One-to-many relationship (optionally `as:` a polymorphic owner)
//!
//! Every relation is declared on its owning type and is always resolved from
//! that side. A polymorphic has_many has no statically joinable inverse on the
//! related type, so nothing here describes one.

pub mod def;
#[doc(inline)]
pub use def::{ForeignKeyOn, RelationDef, RelationTarget, RelationType};

use crate::identity::ResourceType;
use std::collections::BTreeMap;

/// Metadata for one resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDef {
    pub resource_type: ResourceType,
    /// Backing table (or collection) name
    pub table: String,
    /// Primary key column
    pub primary_key: String,
    relations: BTreeMap<String, RelationDef>,
}

impl ResourceDef {
    /// Resource whose table is named after the type and keyed by `id`
    pub fn new(resource_type: impl Into<ResourceType>) -> Self {
        let resource_type = resource_type.into();
        Self {
            table: resource_type.as_str().to_string(),
            resource_type,
            primary_key: "id".to_string(),
            relations: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    #[must_use]
    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key = column.to_string();
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    pub fn relation_def(&self, name: &str) -> Option<&RelationDef> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = &RelationDef> {
        self.relations.values()
    }
}

/// Registry of every resource type the engine may reach
#[derive(Debug, Clone, Default)]
pub struct Schema {
    resources: BTreeMap<ResourceType, ResourceDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn resource(mut self, def: ResourceDef) -> Self {
        self.resources.insert(def.resource_type.clone(), def);
        self
    }

    pub fn get(&self, resource_type: &ResourceType) -> Option<&ResourceDef> {
        self.resources.get(resource_type)
    }

    pub fn contains(&self, resource_type: &ResourceType) -> bool {
        self.resources.contains_key(resource_type)
    }

    /// Relation `name` as declared on `owner`
    pub fn relation(&self, owner: &ResourceType, name: &str) -> Option<&RelationDef> {
        self.resources.get(owner).and_then(|def| def.relation_def(name))
    }
}
