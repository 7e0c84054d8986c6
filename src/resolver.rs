//! Breadth-first resolution engine.
//!
//! Walks the include tree one level at a time. Per level it issues exactly
//! one owner-side [`RelatedLookup`] for each distinct (owner type, relation)
//! pair, merges what comes back into the [`ResourceSet`], and derives the next
//! level's owners from the relationship slots just recorded. After the last
//! level, fragments still lacking a payload are loaded by key, then the set is
//! marked populated.
//!
//! With `parallel_levels` the lookups of one level run in their own `may`
//! coroutines and are joined before the level is merged. Merging always
//! happens on the calling thread, so the set itself is never shared.

use crate::config::Settings;
use crate::error::{codes, ApiError, ErrorOptions};
use crate::fragment::{Fragment, Linkage, Resource};
use crate::identity::{Identity, PrimaryKey, ResourceType};
use crate::include::{DirectiveError, IncludeDirective};
use crate::query::{PrimaryQuery, SortDirection};
use crate::relation::{ForeignKeyOn, RelationDef, ResourceDef, Schema};
use crate::resource_set::{ResourceSet, ResourceSetError};
use crate::store::{DataStore, FindQuery, RelatedBatch, RelatedLookup, RequestContext, StoreError};
use serde_json::{json, Map};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Why a resolve call failed. No partial result accompanies any of these.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// Include directive could not be built
    Directive(DirectiveError),
    /// The data store failed; `operation` names the lookup that failed
    Store { operation: String, source: StoreError },
    /// A key lookup found nothing for an identity the engine needed
    MissingRecord(Identity),
    /// The query asks for something the store cannot do for this type
    UnsupportedQuery(String),
    /// Lifecycle violation on the resource set
    ResourceSet(ResourceSetError),
    /// A lookup coroutine could not be spawned or panicked
    Worker(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Directive(e) => write!(f, "Invalid include directive: {e}"),
            ResolveError::Store { operation, source } => {
                write!(f, "Store failure during {operation}: {source}")
            }
            ResolveError::MissingRecord(identity) => write!(f, "Record not found: {identity}"),
            ResolveError::UnsupportedQuery(s) => write!(f, "Unsupported query: {s}"),
            ResolveError::ResourceSet(e) => write!(f, "Resource set error: {e}"),
            ResolveError::Worker(s) => write!(f, "Lookup worker error: {s}"),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::Directive(e) => Some(e),
            ResolveError::Store { source, .. } => Some(source),
            ResolveError::ResourceSet(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DirectiveError> for ResolveError {
    fn from(e: DirectiveError) -> Self {
        ResolveError::Directive(e)
    }
}

impl From<ResourceSetError> for ResolveError {
    fn from(e: ResourceSetError) -> Self {
        ResolveError::ResourceSet(e)
    }
}

impl ResolveError {
    fn store(operation: impl Into<String>, source: StoreError) -> Self {
        ResolveError::Store {
            operation: operation.into(),
            source,
        }
    }

    /// Short label used for failure metrics
    pub fn reason(&self) -> &'static str {
        match self {
            ResolveError::Directive(_) => "directive",
            ResolveError::Store { .. } => "store",
            ResolveError::MissingRecord(_) => "missing_record",
            ResolveError::UnsupportedQuery(_) => "unsupported_query",
            ResolveError::ResourceSet(_) => "resource_set",
            ResolveError::Worker(_) => "worker",
        }
    }

    /// Client-facing errors for this failure
    ///
    /// Store and internal failures only carry their message when
    /// `expose_internal_errors` is set.
    pub fn to_api_errors(&self, settings: &Settings) -> Vec<ApiError> {
        let options = match self {
            ResolveError::Directive(DirectiveError::UnknownResourceType(t)) => ErrorOptions::new()
                .title("Invalid resource")
                .detail(format!("{t} is not a valid resource."))
                .code(codes::INVALID_RESOURCE)
                .status("bad_request"),
            ResolveError::Directive(e) => ErrorOptions::new()
                .title("Invalid field")
                .detail(e.to_string())
                .code(codes::INVALID_INCLUDE)
                .source(json!({"parameter": "include"}))
                .status("bad_request"),
            ResolveError::MissingRecord(identity) => ErrorOptions::new()
                .title("Record not found")
                .detail(format!("The record identified by {} could not be found.", identity.key))
                .code(codes::RECORD_NOT_FOUND)
                .status("not_found"),
            ResolveError::UnsupportedQuery(detail) => ErrorOptions::new()
                .title("Bad Request")
                .detail(detail.clone())
                .code(codes::BAD_REQUEST)
                .status("bad_request"),
            ResolveError::Store { .. } | ResolveError::ResourceSet(_) | ResolveError::Worker(_) => {
                let mut options = ErrorOptions::new()
                    .title("Internal Server Error")
                    .detail("Internal Server Error")
                    .code(codes::INTERNAL_SERVER_ERROR)
                    .status("internal_server_error");
                if settings.config.expose_internal_errors {
                    let mut meta = Map::new();
                    meta.insert("exception".to_string(), json!(self.to_string()));
                    options = options.detail(self.to_string()).meta(meta);
                }
                options
            }
        };
        vec![ApiError::new(settings, options)]
    }
}

/// One (owner type, relation) lookup planned for the current level
struct LookupPlan<'t> {
    owner_type: ResourceType,
    relation: RelationDef,
    remote: bool,
    /// Owners whose slot for `relation` is still unknown
    fetch: BTreeSet<Identity>,
    /// Child directives to descend into, each with the owners that reached it
    descend: Vec<(&'t IncludeDirective, BTreeSet<Identity>)>,
}

type Frontier<'t> = Vec<(&'t IncludeDirective, BTreeSet<Identity>)>;

/// Resolution engine bound to one store, schema and settings
pub struct Resolver<'a> {
    store: Arc<dyn DataStore>,
    schema: &'a Schema,
    settings: &'a Settings,
}

impl<'a> Resolver<'a> {
    pub fn new(store: Arc<dyn DataStore>, schema: &'a Schema, settings: &'a Settings) -> Self {
        Self { store, schema, settings }
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    fn resource_def(&self, resource_type: &ResourceType) -> Result<&'a ResourceDef, ResolveError> {
        self.schema.get(resource_type).ok_or_else(|| {
            ResolveError::Directive(DirectiveError::UnknownResourceType(resource_type.clone()))
        })
    }

    /// Resolve a primary query plus its include tree into a populated set
    ///
    /// A primary query with no matches yields an empty, populated set.
    ///
    /// # Errors
    ///
    /// Any store failure, unsupported query shape or missing record aborts
    /// the whole call.
    pub fn resolve(
        &self,
        query: &PrimaryQuery,
        include: &IncludeDirective,
        context: &RequestContext,
    ) -> Result<ResourceSet, ResolveError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::resolve_span(query.resource_type.as_str()).entered();

        let start = Instant::now();
        let result = self.resolve_inner(query, include, context);
        self.finish(start, &result);
        result
    }

    /// Resolve starting from already-known primary identities
    ///
    /// Payloads in `preloaded` that belong to one of `identities` are used
    /// as-is; only the remaining identities are loaded by key.
    ///
    /// # Errors
    ///
    /// Same as [`resolve`](Self::resolve).
    pub fn resolve_identities(
        &self,
        identities: &[Identity],
        preloaded: Vec<Resource>,
        include: &IncludeDirective,
        context: &RequestContext,
    ) -> Result<ResourceSet, ResolveError> {
        let start = Instant::now();
        let result = self.resolve_identities_inner(identities, preloaded, include, context);
        self.finish(start, &result);
        result
    }

    fn resolve_identities_inner(
        &self,
        identities: &[Identity],
        preloaded: Vec<Resource>,
        include: &IncludeDirective,
        context: &RequestContext,
    ) -> Result<ResourceSet, ResolveError> {
        if identities.is_empty() {
            return Ok(ResourceSet::empty_populated());
        }
        let mut set = ResourceSet::new();
        for identity in identities {
            set.add_primary(Fragment::new(identity.clone()))?;
        }
        for resource in preloaded {
            if set.contains(&resource.identity) {
                set.hydrate(resource)?;
            }
        }
        self.complete(set, include, identities.iter().cloned().collect(), context)
    }

    fn finish(&self, start: Instant, result: &Result<ResourceSet, ResolveError>) {
        match result {
            Ok(set) => {
                log::debug!("Resolved {} fragments in {:?}", set.len(), start.elapsed());
                #[cfg(feature = "metrics")]
                METRICS.record_resolve(start.elapsed());
            }
            Err(e) => {
                log::warn!("Resolve aborted: {e}");
                #[cfg(feature = "metrics")]
                METRICS.record_failure(e.reason());
            }
        }
    }

    fn resolve_inner(
        &self,
        query: &PrimaryQuery,
        include: &IncludeDirective,
        context: &RequestContext,
    ) -> Result<ResourceSet, ResolveError> {
        if !include.resource_types().contains(&query.resource_type) {
            return Err(ResolveError::UnsupportedQuery(format!(
                "include tree is not rooted at {}",
                query.resource_type
            )));
        }

        let mut set = ResourceSet::new();
        let capabilities = self.store.capabilities(&query.resource_type);

        if capabilities.filtered_find {
            let find = self.find_query(query, include, context)?;
            let records = self.observe("find", &query.resource_type, self.store.find(&find))?;
            if records.is_empty() {
                log::debug!("Primary lookup for {} matched nothing", query.resource_type);
                return Ok(ResourceSet::empty_populated());
            }
            for record in records {
                let fragment = match record.resource {
                    Some(resource) => Fragment::from_resource(resource),
                    None => Fragment::new(record.identity),
                };
                set.add_primary(fragment)?;
            }
        } else {
            if !query.filters.is_empty() || !query.sort.is_empty() {
                return Err(ResolveError::UnsupportedQuery(format!(
                    "{} only supports lookups by key; filters and sort are not available",
                    query.resource_type
                )));
            }
            let keys = paginated_keys(query);
            if keys.is_empty() {
                return Ok(ResourceSet::empty_populated());
            }
            for key in keys {
                set.add_primary(Fragment::new(Identity::new(query.resource_type.clone(), key)))?;
            }
        }

        let primary = set.primary_identities().iter().cloned().collect();
        self.complete(set, include, primary, context)
    }

    /// Walk the includes, hydrate, mark populated
    fn complete(
        &self,
        mut set: ResourceSet,
        include: &IncludeDirective,
        primary: BTreeSet<Identity>,
        context: &RequestContext,
    ) -> Result<ResourceSet, ResolveError> {
        self.walk(&mut set, include, primary, context)?;
        self.hydrate(&mut set, context)?;
        set.mark_populated()?;
        Ok(set)
    }

    fn find_query(
        &self,
        query: &PrimaryQuery,
        include: &IncludeDirective,
        context: &RequestContext,
    ) -> Result<FindQuery, ResolveError> {
        let def = self.resource_def(&query.resource_type)?;
        let table = def.table.as_str();
        let store = self.store.as_ref();

        // Key plus the owner-side foreign keys the first level will need
        let mut select = vec![store.field_with_alias(table, &def.primary_key)];
        for (name, _) in include.children() {
            if let Some(relation) = def.relation_def(name) {
                if relation.foreign_key_on() == ForeignKeyOn::Owner {
                    select.push(store.field_with_alias(table, &relation.foreign_key));
                    if let Some(type_column) = &relation.polymorphic_type_column {
                        select.push(store.field_with_alias(table, type_column));
                    }
                }
            }
        }

        let order_by = query
            .sort
            .iter()
            .map(|criterion| {
                let direction = match criterion.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                format!("{} {direction}", store.qualify(table, &criterion.field))
            })
            .collect();

        Ok(FindQuery {
            query: query.clone(),
            select,
            order_by,
            context: context.clone(),
        })
    }

    /// Count the records a primary query matches, ignoring pagination
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Store` if the count fails.
    pub fn count(
        &self,
        query: &PrimaryQuery,
        include: &IncludeDirective,
        context: &RequestContext,
    ) -> Result<u64, ResolveError> {
        if !self.store.capabilities(&query.resource_type).filtered_find {
            return Ok(query.keys.as_ref().map_or(0, |keys| keys.len() as u64));
        }
        let find = self.find_query(query, include, context)?;
        self.observe("count", &query.resource_type, self.store.count(&find))
    }

    /// Resolve one relation of a single owner (no includes, no hydration)
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Directive` when the owner type has no such
    /// relation, or `ResolveError::Store` if the lookup fails.
    pub fn fetch_relationship(
        &self,
        owner: &Identity,
        relation: &str,
        context: &RequestContext,
    ) -> Result<(RelationDef, Linkage, Vec<Resource>), ResolveError> {
        let def = self
            .schema
            .relation(&owner.resource_type, relation)
            .cloned()
            .ok_or_else(|| {
                ResolveError::Directive(DirectiveError::UnknownRelation {
                    resource_type: owner.resource_type.clone(),
                    relation: relation.to_string(),
                    path: relation.to_string(),
                })
            })?;
        if def.remote && !self.settings.config.allow_remote_includes {
            return Err(ResolveError::Directive(DirectiveError::RemoteNotAllowed {
                resource_type: owner.resource_type.clone(),
                relation: relation.to_string(),
                path: relation.to_string(),
            }));
        }

        let lookup = RelatedLookup {
            owner_type: owner.resource_type.clone(),
            relation: def.clone(),
            owners: vec![owner.clone()],
            remote: def.remote,
            context: context.clone(),
        };
        let mut batch = self.observe_related(&lookup, self.store.find_related(&lookup))?;
        let linkage = batch
            .linkage
            .remove(owner)
            .unwrap_or_else(|| Linkage::empty(def.is_to_many()));
        Ok((def, linkage, batch.resources))
    }

    fn walk(
        &self,
        set: &mut ResourceSet,
        root: &IncludeDirective,
        primary: BTreeSet<Identity>,
        context: &RequestContext,
    ) -> Result<(), ResolveError> {
        let mut frontier: Frontier<'_> = vec![(root, primary)];
        let mut depth = 0;

        while !frontier.is_empty() {
            depth += 1;
            let plans = self.plan_level(set, &frontier);
            if plans.is_empty() {
                break;
            }

            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::level_span(depth, plans.len()).entered();
            #[cfg(feature = "metrics")]
            METRICS.record_level();
            log::debug!("Resolving include level {depth}: {} lookups", plans.len());

            let batches = self.run_level(&plans, context)?;
            frontier = merge_level(set, plans, batches)?;
        }
        Ok(())
    }

    /// Group owners by concrete type and plan one lookup per (type, relation)
    fn plan_level<'t>(&self, set: &ResourceSet, frontier: &Frontier<'t>) -> Vec<LookupPlan<'t>> {
        let mut plans: BTreeMap<(ResourceType, String), LookupPlan<'t>> = BTreeMap::new();

        for (node, owners) in frontier {
            let node: &'t IncludeDirective = node;
            let mut by_type: BTreeMap<&ResourceType, BTreeSet<Identity>> = BTreeMap::new();
            for owner in owners {
                by_type.entry(&owner.resource_type).or_default().insert(owner.clone());
            }

            for (name, child) in node.children() {
                for (owner_type, typed_owners) in &by_type {
                    let Some(relation) = self.schema.relation(owner_type, name) else {
                        // Polymorphic owners: only the candidate types declaring the relation
                        log::debug!("{owner_type} has no relation {name}; skipping those owners");
                        continue;
                    };

                    let plan = plans
                        .entry(((*owner_type).clone(), name.to_string()))
                        .or_insert_with(|| LookupPlan {
                            owner_type: (*owner_type).clone(),
                            relation: relation.clone(),
                            remote: relation.remote && child.allow_remote(),
                            fetch: BTreeSet::new(),
                            descend: Vec::new(),
                        });

                    for owner in typed_owners {
                        let known = set.get(owner).is_some_and(|f| f.relationship(name).is_some());
                        if !known {
                            plan.fetch.insert(owner.clone());
                        }
                    }
                    plan.descend.push((child, typed_owners.clone()));
                }
            }
        }
        plans.into_values().collect()
    }

    /// Issue the level's lookups and return one batch per plan, in plan order
    fn run_level(
        &self,
        plans: &[LookupPlan<'_>],
        context: &RequestContext,
    ) -> Result<Vec<RelatedBatch>, ResolveError> {
        let mut batches = vec![RelatedBatch::default(); plans.len()];
        let lookups: Vec<(usize, RelatedLookup)> = plans
            .iter()
            .enumerate()
            .filter(|(_, plan)| !plan.fetch.is_empty())
            .map(|(index, plan)| {
                let lookup = RelatedLookup {
                    owner_type: plan.owner_type.clone(),
                    relation: plan.relation.clone(),
                    owners: plan.fetch.iter().cloned().collect(),
                    remote: plan.remote,
                    context: context.clone(),
                };
                (index, lookup)
            })
            .collect();

        if self.settings.config.parallel_levels && lookups.len() > 1 {
            for (index, lookup, result) in self.find_related_concurrently(lookups)? {
                batches[index] = self.observe_related(&lookup, result)?;
            }
        } else {
            for (index, lookup) in lookups {
                #[cfg(feature = "tracing")]
                let _span = tracing_helpers::related_lookup_span(
                    lookup.owner_type.as_str(),
                    &lookup.relation.name,
                    lookup.owners.len(),
                )
                .entered();
                batches[index] = self.observe_related(&lookup, self.store.find_related(&lookup))?;
            }
        }
        Ok(batches)
    }

    /// One coroutine per lookup, all joined before returning
    #[allow(clippy::type_complexity)]
    fn find_related_concurrently(
        &self,
        lookups: Vec<(usize, RelatedLookup)>,
    ) -> Result<Vec<(usize, RelatedLookup, Result<RelatedBatch, StoreError>)>, ResolveError> {
        let mut handles = Vec::with_capacity(lookups.len());
        for (index, lookup) in lookups {
            let store = Arc::clone(&self.store);
            let builder = may::coroutine::Builder::new()
                .name(format!("lifeline-{}.{}", lookup.owner_type, lookup.relation.name))
                .stack_size(self.settings.config.coroutine_stack_size);
            let handle = may::go!(builder, move || {
                let result = store.find_related(&lookup);
                (lookup, result)
            })
            .map_err(|e| ResolveError::Worker(format!("failed to spawn lookup coroutine: {e}")))?;
            handles.push((index, handle));
        }

        // Barrier: the next level depends on every lookup of this one
        let joined: Vec<_> = handles
            .into_iter()
            .map(|(index, handle)| (index, handle.join()))
            .collect();
        joined
            .into_iter()
            .map(|(index, outcome)| match outcome {
                Ok((lookup, result)) => Ok((index, lookup, result)),
                Err(_) => Err(ResolveError::Worker("lookup coroutine panicked".to_string())),
            })
            .collect()
    }

    fn observe<T>(
        &self,
        kind: &'static str,
        resource_type: &ResourceType,
        result: Result<T, StoreError>,
    ) -> Result<T, ResolveError> {
        #[cfg(feature = "metrics")]
        METRICS.record_store_call(kind);
        result.map_err(|e| {
            log::error!("Store {kind} on {resource_type} failed: {e}");
            ResolveError::store(format!("{kind} {resource_type}"), e)
        })
    }

    fn observe_related(
        &self,
        lookup: &RelatedLookup,
        result: Result<RelatedBatch, StoreError>,
    ) -> Result<RelatedBatch, ResolveError> {
        let label = format!("{}.{}", lookup.owner_type, lookup.relation.name);
        let batch = self
            .observe("find_related", &lookup.owner_type, result)
            .map_err(|e| match e {
                ResolveError::Store { source, .. } => {
                    ResolveError::store(format!("find_related {label}"), source)
                }
                other => other,
            })?;
        log::debug!(
            "Loaded {label} for {} owners: {} linked, {} preloaded",
            lookup.owners.len(),
            batch.linkage.len(),
            batch.resources.len()
        );
        Ok(batch)
    }

    /// Load payloads for every fragment that has none, per type
    fn hydrate(&self, set: &mut ResourceSet, context: &RequestContext) -> Result<(), ResolveError> {
        for (resource_type, keys) in set.unhydrated() {
            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::hydrate_span(resource_type.as_str(), keys.len()).entered();

            let resources = if self.store.capabilities(&resource_type).batched_key_lookup {
                self.observe(
                    "find_by_keys",
                    &resource_type,
                    self.store.find_by_keys(&resource_type, &keys, context),
                )?
            } else {
                log::debug!(
                    "{resource_type} has no batched key lookup; loading {} records one by one",
                    keys.len()
                );
                let mut loaded = Vec::with_capacity(keys.len());
                for key in &keys {
                    let result = self.store.find_by_key(&resource_type, key, context);
                    let found = self.observe("find_by_key", &resource_type, result)?;
                    loaded.extend(found);
                }
                loaded
            };

            let found: HashSet<Identity> = resources.iter().map(|r| r.identity.clone()).collect();
            if let Some(missing) = keys
                .into_iter()
                .map(|key| Identity::new(resource_type.clone(), key))
                .find(|identity| !found.contains(identity))
            {
                return Err(ResolveError::MissingRecord(missing));
            }
            for resource in resources {
                set.hydrate(resource)?;
            }
        }
        Ok(())
    }
}

/// Record the level's results and compute the next frontier
fn merge_level<'t>(
    set: &mut ResourceSet,
    plans: Vec<LookupPlan<'t>>,
    batches: Vec<RelatedBatch>,
) -> Result<Frontier<'t>, ResolveError> {
    let mut next: Frontier<'t> = Vec::new();

    for (plan, mut batch) in plans.into_iter().zip(batches) {
        let name = plan.relation.name.as_str();
        let to_many = plan.relation.is_to_many();

        for owner in &plan.fetch {
            let linkage = batch.linkage.remove(owner).unwrap_or_else(|| Linkage::empty(to_many));
            for related in linkage.identities() {
                set.add_fragment(Fragment::new(related.clone()))?;
            }
            set.set_relationship(owner, name, linkage)?;
        }
        for resource in batch.resources {
            set.hydrate(resource)?;
        }

        for (child, owners) in plan.descend {
            if child.is_leaf() {
                continue;
            }
            let discovered: BTreeSet<Identity> = owners
                .iter()
                .filter_map(|owner| set.get(owner))
                .filter_map(|fragment| fragment.relationship(name))
                .flat_map(|linkage| linkage.identities().cloned().collect::<Vec<_>>())
                .collect();
            if !discovered.is_empty() {
                next.push((child, discovered));
            }
        }
    }
    Ok(next)
}

/// Explicit keys with the pagination window applied
fn paginated_keys(query: &PrimaryQuery) -> Vec<PrimaryKey> {
    let keys = query.keys.clone().unwrap_or_default();
    match query.pagination {
        Some(page) => keys
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit()).unwrap_or(usize::MAX))
            .collect(),
        None => keys,
    }
}
