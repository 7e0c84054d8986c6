//! RelationDef struct for storing relationship metadata
//!
//! This module provides the `RelationDef` struct which contains all metadata
//! the resolution engine and a data store need about one relationship: its
//! arity, target type(s), foreign key placement and polymorphic type column.

use crate::identity::ResourceType;
use serde::Serialize;

/// Type of relationship between resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// One-to-one relationship, foreign key on the related side
    HasOne,
    /// One-to-many relationship, foreign key on the related side
    HasMany,
    /// Many-to-one relationship, foreign key on the owner
    BelongsTo,
}

/// Which table holds the foreign key column of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForeignKeyOn {
    Owner,
    Related,
}

/// Target of a relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RelationTarget {
    /// Statically known target type
    Type(ResourceType),
    /// Polymorphic target: concrete type varies per record, read from the
    /// relation's type column
    Polymorphic(Vec<ResourceType>),
}

impl RelationTarget {
    /// Every resource type this relation may point at
    pub fn types(&self) -> &[ResourceType] {
        match self {
            RelationTarget::Type(t) => std::slice::from_ref(t),
            RelationTarget::Polymorphic(types) => types,
        }
    }
}

/// Defines a relationship declared on an owning resource type
///
/// # Example
///
/// ```
/// use lifeline::relation::{RelationDef, RelationType};
///
/// // Article has_many article_comments, as: :commentable
/// let rel = RelationDef::has_many("article_comments", "comments", "commentable_id")
///     .polymorphic_as("commentable_type");
/// assert_eq!(rel.rel_type, RelationType::HasMany);
/// assert!(rel.is_polymorphic());
///
/// // Comment belongs_to commentable, polymorphic: true
/// let back = RelationDef::belongs_to_polymorphic(
///     "commentable",
///     ["articles", "posts"],
///     "commentable_id",
///     "commentable_type",
/// );
/// assert_eq!(back.target.types().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationDef {
    /// Relation name as requested in include paths
    pub name: String,
    /// Type of relationship
    pub rel_type: RelationType,
    /// Related resource type(s)
    pub target: RelationTarget,
    /// Foreign key column (on the owner for belongs_to, on the related table otherwise)
    pub foreign_key: String,
    /// Column holding the owner/target type name for polymorphic relations
    pub polymorphic_type_column: Option<String>,
    /// Target lives in a remote/foreign data source
    pub remote: bool,
}

impl RelationDef {
    fn new(name: &str, rel_type: RelationType, target: RelationTarget, foreign_key: &str) -> Self {
        Self {
            name: name.to_string(),
            rel_type,
            target,
            foreign_key: foreign_key.to_string(),
            polymorphic_type_column: None,
            remote: false,
        }
    }

    pub fn belongs_to(name: &str, target: impl Into<ResourceType>, foreign_key: &str) -> Self {
        Self::new(name, RelationType::BelongsTo, RelationTarget::Type(target.into()), foreign_key)
    }

    /// belongs_to whose target type is read per record from `type_column`
    pub fn belongs_to_polymorphic<I, T>(
        name: &str,
        targets: I,
        foreign_key: &str,
        type_column: &str,
    ) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ResourceType>,
    {
        let targets = targets.into_iter().map(Into::into).collect();
        let target = RelationTarget::Polymorphic(targets);
        let mut def = Self::new(name, RelationType::BelongsTo, target, foreign_key);
        def.polymorphic_type_column = Some(type_column.to_string());
        def
    }

    pub fn has_one(name: &str, target: impl Into<ResourceType>, foreign_key: &str) -> Self {
        Self::new(name, RelationType::HasOne, RelationTarget::Type(target.into()), foreign_key)
    }

    pub fn has_many(name: &str, target: impl Into<ResourceType>, foreign_key: &str) -> Self {
        Self::new(name, RelationType::HasMany, RelationTarget::Type(target.into()), foreign_key)
    }

    /// Mark a has_one/has_many as the owner side of a polymorphic belongs_to
    /// (`as: :commentable`): related rows carry the owner's type name in
    /// `type_column`. No relation back to the owner exists by name on the
    /// related type.
    #[must_use]
    pub fn polymorphic_as(mut self, type_column: &str) -> Self {
        self.polymorphic_type_column = Some(type_column.to_string());
        self
    }

    /// Target lives in a remote data source; including it must be allowed explicitly
    #[must_use]
    pub fn remote(mut self) -> Self {
        self.remote = true;
        self
    }

    pub fn is_to_many(&self) -> bool {
        self.rel_type == RelationType::HasMany
    }

    pub fn is_polymorphic(&self) -> bool {
        self.polymorphic_type_column.is_some()
    }

    pub fn foreign_key_on(&self) -> ForeignKeyOn {
        match self.rel_type {
            RelationType::BelongsTo => ForeignKeyOn::Owner,
            RelationType::HasOne | RelationType::HasMany => ForeignKeyOn::Related,
        }
    }
}
