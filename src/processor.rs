//! Request-level operations on top of the resolver.
//!
//! Every operation returns an [`OperationResult`]; failures of any kind come
//! back as an errors result, never as a raw error.

use crate::config::Settings;
use crate::identity::{Identity, PrimaryKey, ResourceType};
use crate::include::IncludeDirective;
use crate::operation_result::{OperationResult, PageInfo};
use crate::query::PrimaryQuery;
use crate::relation::Schema;
use crate::resolver::{ResolveError, Resolver};
use crate::store::{DataStore, RequestContext};
use serde_json::json;
use std::sync::Arc;

pub struct Processor<'a> {
    resolver: Resolver<'a>,
    schema: &'a Schema,
    settings: &'a Settings,
}

impl<'a> Processor<'a> {
    pub fn new(store: Arc<dyn DataStore>, schema: &'a Schema, settings: &'a Settings) -> Self {
        Self {
            resolver: Resolver::new(store, schema, settings),
            schema,
            settings,
        }
    }

    fn failed(&self, error: &ResolveError) -> OperationResult {
        OperationResult::from_errors(self.settings, error.to_api_errors(self.settings))
    }

    fn include_for(
        &self,
        roots: &[ResourceType],
        include: &str,
    ) -> Result<IncludeDirective, ResolveError> {
        let paths: Vec<&str> = include.split(',').collect();
        Ok(IncludeDirective::build_for(
            self.schema,
            roots,
            &paths,
            self.settings.config.include_options(),
        )?)
    }

    /// One resource by key with its includes; 404 when it does not exist
    pub fn show(
        &self,
        resource_type: &str,
        key: impl Into<PrimaryKey>,
        include: &str,
        context: &RequestContext,
    ) -> OperationResult {
        let resource_type = ResourceType::new(resource_type);
        let key = key.into();
        log::info!("show {resource_type}#{key} include={include:?}");

        let outcome = self
            .include_for(std::slice::from_ref(&resource_type), include)
            .and_then(|tree| {
                let query = PrimaryQuery::new(resource_type.clone()).keys([key.clone()]);
                self.resolver.resolve(&query, &tree, context)
            });
        match outcome {
            Ok(set) if set.primary_identities().is_empty() => {
                self.failed(&ResolveError::MissingRecord(Identity::new(resource_type, key)))
            }
            Ok(set) => OperationResult::single(self.settings, "ok", set),
            Err(e) => self.failed(&e),
        }
    }

    /// A filtered, sorted, paginated collection with its includes
    ///
    /// Page sizes are clamped to the configured default and maximum. With
    /// `include_record_count` the matching records are counted and reported
    /// in meta.
    pub fn index(
        &self,
        query: PrimaryQuery,
        include: &str,
        context: &RequestContext,
    ) -> OperationResult {
        log::info!("index {} include={include:?}", query.resource_type);
        let config = &self.settings.config;
        let pagination = query
            .pagination
            .map(|page| page.clamped(config.default_page_size, config.maximum_page_size));
        let query = PrimaryQuery { pagination, ..query };

        let outcome = self
            .include_for(std::slice::from_ref(&query.resource_type), include)
            .and_then(|tree| {
                let set = self.resolver.resolve(&query, &tree, context)?;
                let record_count = if config.include_record_count {
                    Some(self.resolver.count(&query, &tree, context)?)
                } else {
                    None
                };
                Ok((set, record_count))
            });

        match outcome {
            Ok((set, record_count)) => {
                let page = PageInfo::new(query.pagination, record_count);
                let mut result =
                    OperationResult::collection(self.settings, "ok", set, page.clone());
                if let Some(count) = page.record_count {
                    result = result.with_meta("record_count", json!(count));
                }
                if let Some(pages) = page.page_count {
                    result = result.with_meta("page_count", json!(pages));
                }
                result
            }
            Err(e) => self.failed(&e),
        }
    }

    /// Resources reached from `source` through `relation`, with their includes
    pub fn show_related_resources(
        &self,
        source: &Identity,
        relation: &str,
        include: &str,
        context: &RequestContext,
    ) -> OperationResult {
        log::info!("show related {source}.{relation} include={include:?}");
        let outcome = (|| -> Result<_, ResolveError> {
            let (def, linkage, preloaded) =
                self.resolver.fetch_relationship(source, relation, context)?;
            let tree = self.include_for(def.target.types(), include)?;
            let related: Vec<Identity> = linkage.identities().cloned().collect();
            self.resolver.resolve_identities(&related, preloaded, &tree, context)
        })();

        match outcome {
            Ok(set) => {
                let page = PageInfo::new(None, Some(set.primary_identities().len() as u64));
                OperationResult::related_collection(
                    self.settings,
                    "ok",
                    set,
                    source.clone(),
                    relation,
                    page,
                )
            }
            Err(e) => self.failed(&e),
        }
    }

    /// Relationship linkage only: one owner-side lookup, no attributes
    pub fn show_relationship(
        &self,
        parent: &Identity,
        relation: &str,
        context: &RequestContext,
    ) -> OperationResult {
        log::info!("show relationship {parent}.{relation}");
        match self.resolver.fetch_relationship(parent, relation, context) {
            Ok((def, linkage, _)) => {
                OperationResult::relationship(self.settings, "ok", parent.clone(), def, linkage)
            }
            Err(e) => self.failed(&e),
        }
    }
}
