//! Data store boundary.
//!
//! Provides the [`DataStore`] trait the resolution engine issues every lookup
//! through. A store executes filtered/sorted/paginated primary lookups,
//! identifier-batched relation lookups and key lookups, and owns identifier
//! quoting for its dialect.
//!
//! Relation lookups are always expressed from the owning side: "these owners
//! of type `T`, preload relation `r`". There is no way to ask a store for an
//! inverse join from the related type back through a relation name.

pub mod dialect;
pub mod memory;
pub mod sql;

pub use dialect::{FieldQuoter, SqlDialect};
pub use memory::{CallKind, InMemoryStore, StoreCall};

use crate::fragment::{Linkage, Resource};
use crate::identity::{Identity, PrimaryKey, ResourceType};
use crate::query::PrimaryQuery;
use crate::relation::RelationDef;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Data store error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Query execution error
    QueryError(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// The store refused the lookup (unsupported shape, authorization, ...)
    Rejected(String),
    /// Backend unreachable or timed out
    Unavailable(String),
    /// Other store errors
    Other(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::QueryError(s) => write!(f, "Query error: {s}"),
            StoreError::ParseError(s) => write!(f, "Parse error: {s}"),
            StoreError::Rejected(s) => write!(f, "Lookup rejected: {s}"),
            StoreError::Unavailable(s) => write!(f, "Store unavailable: {s}"),
            StoreError::Other(s) => write!(f, "Store error: {s}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// What a store can do for one resource type.
///
/// The engine branches on these declared flags, never on probing the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// `find` accepts filters, sort and pagination
    pub filtered_find: bool,
    /// `find_by_keys` loads a whole key set in one call
    pub batched_key_lookup: bool,
}

impl StoreCapabilities {
    /// Relational source: everything batched
    pub const FULL: Self = Self {
        filtered_find: true,
        batched_key_lookup: true,
    };

    /// Plain-object source: only single-key lookups
    pub const KEY_ONLY: Self = Self {
        filtered_find: false,
        batched_key_lookup: false,
    };
}

impl Default for StoreCapabilities {
    fn default() -> Self {
        Self::FULL
    }
}

/// Opaque per-request value passed through to the store untouched.
///
/// Authorization and validation layers put whatever they need here; the
/// engine never looks inside.
#[derive(Clone, Default)]
pub struct RequestContext(Option<Arc<dyn Any + Send + Sync>>);

impl RequestContext {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    pub fn empty() -> Self {
        Self(None)
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref::<T>())
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestContext")
            .field(&if self.0.is_some() { "Some" } else { "None" })
            .finish()
    }
}

/// Primary lookup as handed to [`DataStore::find`]
#[derive(Debug, Clone)]
pub struct FindQuery {
    pub query: PrimaryQuery,
    /// Qualified, aliased select list rendered through the store's quoter
    pub select: Vec<String>,
    /// Qualified order expressions rendered through the store's quoter
    pub order_by: Vec<String>,
    pub context: RequestContext,
}

/// One row found by a primary lookup
#[derive(Debug, Clone, PartialEq)]
pub struct FoundRecord {
    pub identity: Identity,
    /// Full attributes when the store loaded them; `None` for key-only results
    pub resource: Option<Resource>,
}

/// Owner-side relation lookup for a batch of owners of one type
#[derive(Debug, Clone)]
pub struct RelatedLookup {
    pub owner_type: ResourceType,
    pub relation: RelationDef,
    pub owners: Vec<Identity>,
    /// Crossing into a remote source was permitted by the include directive
    pub remote: bool,
    pub context: RequestContext,
}

/// Answer to a [`RelatedLookup`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelatedBatch {
    /// owner -> related identity / identities; owners left out have nothing related
    pub linkage: HashMap<Identity, Linkage>,
    /// Related resources the store loaded while preloading, if any
    pub resources: Vec<Resource>,
}

/// Trait for the backing store the engine resolves against
///
/// Implementations must be shareable across coroutines: in level-parallel
/// mode lookups for independent (owner type, relation) pairs run
/// concurrently.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lifeline::relation::Schema;
/// use lifeline::store::{FieldQuoter, InMemoryStore, SqlDialect};
///
/// let schema = Arc::new(Schema::new());
/// let pg = InMemoryStore::new(schema.clone(), SqlDialect::Postgres);
/// let mysql = InMemoryStore::new(schema, SqlDialect::MySql);
/// assert_eq!(pg.qualify("posts", "title"), "\"posts\".\"title\"");
/// assert_eq!(mysql.qualify("posts", "title"), "`posts`.`title`");
/// ```
pub trait DataStore: FieldQuoter + Send + Sync {
    /// Declared capabilities for `resource_type`
    fn capabilities(&self, resource_type: &ResourceType) -> StoreCapabilities;

    /// Execute a filtered/sorted/paginated primary lookup
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the lookup fails.
    fn find(&self, query: &FindQuery) -> Result<Vec<FoundRecord>, StoreError>;

    /// Count the records a primary lookup would match, ignoring pagination
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the count fails.
    fn count(&self, query: &FindQuery) -> Result<u64, StoreError>;

    /// Load every record in `keys` in one call (batched key lookup)
    ///
    /// Keys that do not exist are simply absent from the result.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the lookup fails.
    fn find_by_keys(
        &self,
        resource_type: &ResourceType,
        keys: &[PrimaryKey],
        context: &RequestContext,
    ) -> Result<Vec<Resource>, StoreError>;

    /// Load a single record by key
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the lookup fails.
    fn find_by_key(
        &self,
        resource_type: &ResourceType,
        key: &PrimaryKey,
        context: &RequestContext,
    ) -> Result<Option<Resource>, StoreError>;

    /// Resolve one relation for a batch of owners, queried from the owning side
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the lookup fails.
    fn find_related(&self, lookup: &RelatedLookup) -> Result<RelatedBatch, StoreError>;
}
