//! # Lifeline
//!
//! Resource-graph resolution for JSON:API style services, on the `may` runtime.
//!
//! Given a primary query over one resource type and a tree of relationships to
//! include, the [`Resolver`] builds a deduplicated [`ResourceSet`] with one
//! batched, owner-side store lookup per (owner type, relation) pair and include
//! level. The [`Processor`] wraps it into [`OperationResult`]s, turning every
//! failure into structured [`ApiError`]s with resolved numeric statuses.

pub mod config;
pub mod deprecation;
pub mod error;
pub mod fragment;
pub mod identity;
pub mod include;
pub mod metrics;
pub mod operation_result;
pub mod processor;
pub mod query;
pub mod relation;
pub mod resolver;
pub mod resource_set;
pub mod status;
pub mod store;

pub use config::{EngineConfig, Settings};
pub use error::{ApiError, ApiWarning, ErrorOptions};
pub use fragment::{Fragment, Linkage, Resource};
pub use identity::{Identity, PrimaryKey, ResourceType};
pub use include::{DirectiveError, IncludeDirective, IncludeOptions};
pub use operation_result::{OperationResult, PageInfo, RenderError, ResourceSerializer, ResultKind};
pub use processor::Processor;
pub use query::{Pagination, PrimaryQuery, SortCriterion, SortDirection};
pub use relation::{RelationDef, RelationType, ResourceDef, Schema};
pub use resolver::{ResolveError, Resolver};
pub use resource_set::{ResourceSet, ResourceSetError};
pub use status::StatusTable;
pub use store::{
    DataStore, FieldQuoter, InMemoryStore, RequestContext, SqlDialect, StoreCapabilities,
    StoreError,
};
