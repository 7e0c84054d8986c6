//! Operation results: the envelope handed to the serializer.
//!
//! Every result carries a resolved numeric status code plus meta, links and
//! warnings. Resource-carrying results only render from a populated set and
//! through a [`ResourceSerializer`]; error results render on their own.

use crate::config::Settings;
use crate::error::{ApiError, ApiWarning};
use crate::fragment::{Linkage, Resource};
use crate::identity::Identity;
use crate::query::Pagination;
use crate::relation::RelationDef;
use crate::resource_set::ResourceSet;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Converts populated resource graphs into wire documents
pub trait ResourceSerializer {
    /// Document for a single primary resource
    fn serialize_single(&self, set: &ResourceSet) -> Value;

    /// Document for a collection of primary resources
    fn serialize_plural(&self, set: &ResourceSet, page: &PageInfo) -> Value;

    /// Document for the resources related to `source` through `relation`
    fn serialize_related_plural(
        &self,
        set: &ResourceSet,
        source: &Identity,
        relation: &str,
        page: &PageInfo,
    ) -> Value;

    /// Relationship-only document (identities, no attributes)
    fn serialize_relationship(
        &self,
        parent: &Identity,
        relation: &RelationDef,
        linkage: &Linkage,
    ) -> Value;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Resource results need a serializer
    MissingSerializer,
    /// The result's resource set was never marked populated
    Unpopulated,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::MissingSerializer => {
                write!(f, "A serializer is required to render resources")
            }
            RenderError::Unpopulated => write!(f, "Cannot render an unpopulated resource set"),
        }
    }
}

impl std::error::Error for RenderError {}

/// Collection paging facts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub record_count: Option<u64>,
    pub page_count: Option<u64>,
    /// `first` / `prev` / `next` / `last` windows for links
    pub pagination_params: BTreeMap<String, Pagination>,
}

impl PageInfo {
    pub fn new(pagination: Option<Pagination>, record_count: Option<u64>) -> Self {
        match pagination {
            Some(page) => Self {
                record_count,
                page_count: record_count.map(|count| page.page_count(count)),
                pagination_params: page.link_params(record_count),
            },
            None => Self {
                record_count,
                page_count: record_count.map(|_| 1),
                pagination_params: BTreeMap::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultKind {
    Errors(Vec<ApiError>),
    Resource(ResourceSet),
    Resources {
        set: ResourceSet,
        page: PageInfo,
    },
    RelatedResources {
        set: ResourceSet,
        source: Identity,
        relation: String,
        page: PageInfo,
    },
    Relationship {
        parent: Identity,
        relation: RelationDef,
        linkage: Linkage,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    code: Option<String>,
    meta: Map<String, Value>,
    links: Map<String, Value>,
    warnings: Vec<ApiWarning>,
    kind: ResultKind,
}

impl OperationResult {
    fn new(settings: &Settings, status: &str, kind: ResultKind) -> Self {
        let code = settings.statuses.resolve(status);
        if code.is_none() {
            log::error!("Operation result built with unresolvable status {status:?}");
        }
        Self {
            code,
            meta: Map::new(),
            links: Map::new(),
            warnings: Vec::new(),
            kind,
        }
    }

    /// Error result; the status comes from the first error, `bad_request` when it has none
    pub fn from_errors(settings: &Settings, errors: Vec<ApiError>) -> Self {
        let status = errors
            .iter()
            .find_map(|e| e.status.clone())
            .unwrap_or_else(|| "bad_request".to_string());
        Self::new(settings, &status, ResultKind::Errors(errors))
    }

    pub fn single(settings: &Settings, status: &str, set: ResourceSet) -> Self {
        Self::new(settings, status, ResultKind::Resource(set))
    }

    pub fn collection(settings: &Settings, status: &str, set: ResourceSet, page: PageInfo) -> Self {
        Self::new(settings, status, ResultKind::Resources { set, page })
    }

    pub fn related_collection(
        settings: &Settings,
        status: &str,
        set: ResourceSet,
        source: Identity,
        relation: &str,
        page: PageInfo,
    ) -> Self {
        Self::new(
            settings,
            status,
            ResultKind::RelatedResources {
                set,
                source,
                relation: relation.to_string(),
                page,
            },
        )
    }

    pub fn relationship(
        settings: &Settings,
        status: &str,
        parent: Identity,
        relation: RelationDef,
        linkage: Linkage,
    ) -> Self {
        Self::new(
            settings,
            status,
            ResultKind::Relationship {
                parent,
                relation,
                linkage,
            },
        )
    }

    #[must_use]
    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.meta.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn with_link(mut self, key: &str, value: Value) -> Self {
        self.links.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn with_warning(mut self, warning: ApiWarning) -> Self {
        self.warnings.push(warning);
        self
    }

    /// Resolved numeric status; `None` only for an unknown status name
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn links(&self) -> &Map<String, Value> {
        &self.links
    }

    pub fn warnings(&self) -> &[ApiWarning] {
        &self.warnings
    }

    pub fn kind(&self) -> &ResultKind {
        &self.kind
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ResultKind::Errors(_))
    }

    pub fn errors(&self) -> &[ApiError] {
        match &self.kind {
            ResultKind::Errors(errors) => errors,
            _ => &[],
        }
    }

    pub fn resource_set(&self) -> Option<&ResourceSet> {
        match &self.kind {
            ResultKind::Resource(set)
            | ResultKind::Resources { set, .. }
            | ResultKind::RelatedResources { set, .. } => Some(set),
            _ => None,
        }
    }

    pub fn page(&self) -> Option<&PageInfo> {
        match &self.kind {
            ResultKind::Resources { page, .. } | ResultKind::RelatedResources { page, .. } => {
                Some(page)
            }
            _ => None,
        }
    }

    /// First hydrated primary resource
    pub fn resource(&self) -> Option<&Resource> {
        self.resource_set()
            .and_then(|set| set.primary_fragments().into_iter().find_map(|f| f.resource()))
    }

    /// Every hydrated resource in the set: primaries in primary order, then
    /// included resources by type
    pub fn resources(&self) -> Vec<&Resource> {
        self.resource_set()
            .map(|set| {
                set.primary_fragments()
                    .into_iter()
                    .chain(set.included())
                    .filter_map(|f| f.resource())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Render the wire document
    ///
    /// Meta and links are added at the top level; warnings go under
    /// `meta.warnings`.
    ///
    /// # Errors
    ///
    /// Resource-carrying results fail without a serializer or when their set
    /// is not populated. Error and relationship-only results need no set.
    pub fn render(
        &self,
        serializer: Option<&dyn ResourceSerializer>,
    ) -> Result<Value, RenderError> {
        let mut document = match &self.kind {
            ResultKind::Errors(errors) => {
                let errors: Vec<Value> = errors.iter().map(|e| Value::Object(e.to_map())).collect();
                json!({ "errors": errors })
            }
            kind => {
                let serializer = serializer.ok_or(RenderError::MissingSerializer)?;
                if self.resource_set().is_some_and(|set| !set.is_populated()) {
                    return Err(RenderError::Unpopulated);
                }
                match kind {
                    ResultKind::Resource(set) => serializer.serialize_single(set),
                    ResultKind::Resources { set, page } => serializer.serialize_plural(set, page),
                    ResultKind::RelatedResources {
                        set,
                        source,
                        relation,
                        page,
                    } => serializer.serialize_related_plural(set, source, relation, page),
                    ResultKind::Relationship {
                        parent,
                        relation,
                        linkage,
                    } => serializer.serialize_relationship(parent, relation, linkage),
                    ResultKind::Errors(_) => Value::Null,
                }
            }
        };

        if let Value::Object(doc) = &mut document {
            let mut meta = self.meta.clone();
            if !self.warnings.is_empty() {
                let warnings = self.warnings.iter().map(|w| Value::Object(w.to_map())).collect();
                meta.insert("warnings".to_string(), Value::Array(warnings));
            }
            if !meta.is_empty() {
                doc.insert("meta".to_string(), Value::Object(meta));
            }
            if !self.links.is_empty() {
                doc.insert("links".to_string(), Value::Object(self.links.clone()));
            }
        }
        Ok(document)
    }
}
