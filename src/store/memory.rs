//! In-memory data store.
//!
//! Rows are JSON objects grouped by resource type. The store answers every
//! [`DataStore`] call from those rows, declares per-type capabilities, can be
//! told to fail specific calls, and records each call it receives (including
//! the owner-side preload SQL it would have run) so callers can assert on
//! round trips.

use crate::fragment::{Attributes, Linkage, Resource};
use crate::identity::{Identity, PrimaryKey, ResourceType};
use crate::relation::{ForeignKeyOn, RelationDef, ResourceDef, Schema};
use crate::store::dialect::{FieldQuoter, SqlDialect};
use crate::store::{
    sql, DataStore, FindQuery, FoundRecord, RelatedBatch, RelatedLookup, RequestContext,
    StoreCapabilities, StoreError,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// Kind of store call, as recorded in the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Find,
    Count,
    FindByKeys,
    FindByKey,
    FindRelated,
}

/// One recorded store call
#[derive(Debug, Clone, PartialEq)]
pub struct StoreCall {
    pub kind: CallKind,
    /// Queried type; the owner type for `FindRelated`
    pub resource_type: ResourceType,
    pub relation: Option<String>,
    pub owners: Vec<Identity>,
    pub keys: Vec<PrimaryKey>,
    /// Select list handed over by the engine (`Find` / `Count`)
    pub select: Vec<String>,
    /// Order expressions handed over by the engine (`Find`)
    pub order_by: Vec<String>,
    /// Preload statement rendered in the store's dialect (`FindRelated`)
    pub sql: Option<String>,
}

impl StoreCall {
    fn new(kind: CallKind, resource_type: &ResourceType) -> Self {
        Self {
            kind,
            resource_type: resource_type.clone(),
            relation: None,
            owners: Vec::new(),
            keys: Vec::new(),
            select: Vec::new(),
            order_by: Vec::new(),
            sql: None,
        }
    }
}

/// JSON-row backed [`DataStore`]
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lifeline::relation::{ResourceDef, Schema};
/// use lifeline::store::{InMemoryStore, SqlDialect};
///
/// let schema = Arc::new(Schema::new().resource(ResourceDef::new("articles")));
/// let store = InMemoryStore::new(schema, SqlDialect::Postgres)
///     .insert("articles", serde_json::json!({"id": 1, "title": "JSON API paints my bikeshed!"}));
/// assert_eq!(store.call_count(), 0);
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    schema: Arc<Schema>,
    dialect: SqlDialect,
    rows: HashMap<ResourceType, Vec<Attributes>>,
    capabilities: HashMap<ResourceType, StoreCapabilities>,
    failures: HashMap<(CallKind, ResourceType), StoreError>,
    preload: bool,
    calls: Mutex<Vec<StoreCall>>,
}

impl InMemoryStore {
    pub fn new(schema: Arc<Schema>, dialect: SqlDialect) -> Self {
        Self {
            schema,
            dialect,
            rows: HashMap::new(),
            capabilities: HashMap::new(),
            failures: HashMap::new(),
            preload: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Add a row; non-object values are ignored with a warning
    #[must_use]
    pub fn insert(mut self, resource_type: &str, row: Value) -> Self {
        match row {
            Value::Object(map) => self
                .rows
                .entry(ResourceType::new(resource_type))
                .or_default()
                .push(map),
            other => log::warn!("Ignoring non-object row for {resource_type}: {other}"),
        }
        self
    }

    /// Declare what the store can do for `resource_type` (default: everything)
    #[must_use]
    pub fn with_capabilities(
        mut self,
        resource_type: &str,
        capabilities: StoreCapabilities,
    ) -> Self {
        self.capabilities.insert(ResourceType::new(resource_type), capabilities);
        self
    }

    /// Make every `kind` call against `resource_type` fail with `error`
    #[must_use]
    pub fn fail_on(mut self, kind: CallKind, resource_type: &str, error: StoreError) -> Self {
        self.failures.insert((kind, ResourceType::new(resource_type)), error);
        self
    }

    /// Answer relation lookups with linkage only, leaving related payloads
    /// to be loaded by key afterwards
    #[must_use]
    pub fn without_preload(mut self) -> Self {
        self.preload = false;
        self
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Snapshot of the call log
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn record(&self, call: StoreCall) -> Result<(), StoreError> {
        let failure = self.failures.get(&(call.kind, call.resource_type.clone())).cloned();
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn def(&self, resource_type: &ResourceType) -> Result<&ResourceDef, StoreError> {
        self.schema
            .get(resource_type)
            .ok_or_else(|| StoreError::QueryError(format!("unknown resource type {resource_type}")))
    }

    fn table(&self, resource_type: &ResourceType) -> &[Attributes] {
        self.rows.get(resource_type).map(Vec::as_slice).unwrap_or_default()
    }

    fn to_resource(def: &ResourceDef, row: &Attributes) -> Result<Resource, StoreError> {
        let key = row
            .get(&def.primary_key)
            .and_then(PrimaryKey::from_json)
            .ok_or_else(|| {
                StoreError::ParseError(format!(
                    "{} row without a usable {}",
                    def.resource_type, def.primary_key
                ))
            })?;
        let mut attributes = row.clone();
        attributes.remove(&def.primary_key);
        Ok(Resource::new(Identity::new(def.resource_type.clone(), key), attributes))
    }

    fn row_by_key<'a>(&'a self, def: &ResourceDef, key: &PrimaryKey) -> Option<&'a Attributes> {
        let wanted = key.to_json();
        self.table(&def.resource_type)
            .iter()
            .find(|row| row.get(&def.primary_key) == Some(&wanted))
    }

    /// Rows matching keys and filters, sorted, before pagination
    fn matching(&self, find: &FindQuery) -> Result<Vec<&Attributes>, StoreError> {
        let query = &find.query;
        let def = self.def(&query.resource_type)?;
        let keys: Option<Vec<Value>> = query
            .keys
            .as_ref()
            .map(|keys| keys.iter().map(PrimaryKey::to_json).collect());

        let mut rows: Vec<&Attributes> = self
            .table(&query.resource_type)
            .iter()
            .filter(|row| match &keys {
                Some(keys) => row.get(&def.primary_key).is_some_and(|pk| keys.contains(pk)),
                None => true,
            })
            .filter(|row| {
                query.filters.iter().all(|(field, wanted)| {
                    let actual = row.get(field).unwrap_or(&Value::Null);
                    match wanted {
                        Value::Array(any_of) => any_of.contains(actual),
                        single => single == actual,
                    }
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            for criterion in &query.sort {
                let left = a.get(&criterion.field).unwrap_or(&Value::Null);
                let right = b.get(&criterion.field).unwrap_or(&Value::Null);
                let ord = match criterion.direction {
                    crate::query::SortDirection::Asc => compare_json(left, right),
                    crate::query::SortDirection::Desc => compare_json(right, left),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        Ok(rows)
    }

    fn preload_sql(&self, lookup: &RelatedLookup) -> Result<String, StoreError> {
        let statement = sql::preload_statement(&self.schema, lookup, &self.dialect)?;
        Ok(self.dialect.build(&statement).0)
    }

    fn related_via_owner_key(
        &self,
        lookup: &RelatedLookup,
        batch: &mut RelatedBatch,
    ) -> Result<(), StoreError> {
        let relation = &lookup.relation;
        let owner_def = self.def(&lookup.owner_type)?;
        for owner in &lookup.owners {
            let Some(row) = self.row_by_key(owner_def, &owner.key) else {
                continue;
            };
            let Some(key) = row.get(&relation.foreign_key).and_then(PrimaryKey::from_json) else {
                batch.linkage.insert(owner.clone(), Linkage::ToOne(None));
                continue;
            };
            let target = self.target_type(relation, row)?;
            let related = Identity::new(target.clone(), key);
            if self.preload {
                let target_def = self.def(&target)?;
                if let Some(related_row) = self.row_by_key(target_def, &related.key) {
                    batch.resources.push(Self::to_resource(target_def, related_row)?);
                }
            }
            batch.linkage.insert(owner.clone(), Linkage::ToOne(Some(related)));
        }
        Ok(())
    }

    fn target_type(
        &self,
        relation: &RelationDef,
        owner_row: &Attributes,
    ) -> Result<ResourceType, StoreError> {
        let Some(type_column) = &relation.polymorphic_type_column else {
            return relation.target.types().first().cloned().ok_or_else(|| {
                StoreError::QueryError(format!("{} has no target type", relation.name))
            });
        };
        let name = owner_row
            .get(type_column)
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::ParseError(format!("{type_column} is not a type name")))?;
        relation
            .target
            .types()
            .iter()
            .find(|t| t.as_str() == name)
            .cloned()
            .ok_or_else(|| {
                StoreError::ParseError(format!("{name} is not a target of {}", relation.name))
            })
    }

    fn related_via_related_key(
        &self,
        lookup: &RelatedLookup,
        batch: &mut RelatedBatch,
    ) -> Result<(), StoreError> {
        let relation = &lookup.relation;
        let target = relation.target.types().first().cloned().ok_or_else(|| {
            StoreError::QueryError(format!("{} has no target type", relation.name))
        })?;
        let target_def = self.def(&target)?;
        let owner_type_name = Value::String(lookup.owner_type.as_str().to_string());

        for owner in &lookup.owners {
            let owner_key = owner.key.to_json();
            let mut found = BTreeSet::new();
            for row in self.table(&target) {
                if row.get(&relation.foreign_key) != Some(&owner_key) {
                    continue;
                }
                if let Some(type_column) = &relation.polymorphic_type_column {
                    if row.get(type_column) != Some(&owner_type_name) {
                        continue;
                    }
                }
                let resource = Self::to_resource(target_def, row)?;
                found.insert(resource.identity.clone());
                if self.preload {
                    batch.resources.push(resource);
                }
            }
            if found.is_empty() {
                continue;
            }
            let linkage = if relation.is_to_many() {
                Linkage::ToMany(found)
            } else {
                Linkage::ToOne(found.into_iter().next())
            };
            batch.linkage.insert(owner.clone(), linkage);
        }
        Ok(())
    }
}

/// Total order over JSON scalars for sorting: null < bool < number < string < others
fn compare_json(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

impl FieldQuoter for InMemoryStore {
    fn quote_identifier(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }
}

impl DataStore for InMemoryStore {
    fn capabilities(&self, resource_type: &ResourceType) -> StoreCapabilities {
        self.capabilities.get(resource_type).copied().unwrap_or_default()
    }

    fn find(&self, find: &FindQuery) -> Result<Vec<FoundRecord>, StoreError> {
        let query = &find.query;
        let mut call = StoreCall::new(CallKind::Find, &query.resource_type);
        call.keys = query.keys.clone().unwrap_or_default();
        call.select = find.select.clone();
        call.order_by = find.order_by.clone();
        self.record(call)?;

        if !self.capabilities(&query.resource_type).filtered_find {
            return Err(StoreError::Rejected(format!(
                "{} does not support filtered lookups",
                query.resource_type
            )));
        }

        let def = self.def(&query.resource_type)?;
        let rows = self.matching(find)?;
        let (offset, limit) = match query.pagination {
            Some(page) => (
                usize::try_from(page.offset()).unwrap_or(usize::MAX),
                usize::try_from(page.limit()).unwrap_or(usize::MAX),
            ),
            None => (0, usize::MAX),
        };
        rows.into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| {
                let resource = Self::to_resource(def, row)?;
                Ok(FoundRecord {
                    identity: resource.identity.clone(),
                    resource: Some(resource),
                })
            })
            .collect()
    }

    fn count(&self, find: &FindQuery) -> Result<u64, StoreError> {
        let mut call = StoreCall::new(CallKind::Count, &find.query.resource_type);
        call.select = find.select.clone();
        self.record(call)?;
        Ok(self.matching(find)?.len() as u64)
    }

    fn find_by_keys(
        &self,
        resource_type: &ResourceType,
        keys: &[PrimaryKey],
        _context: &RequestContext,
    ) -> Result<Vec<Resource>, StoreError> {
        let mut call = StoreCall::new(CallKind::FindByKeys, resource_type);
        call.keys = keys.to_vec();
        self.record(call)?;

        if !self.capabilities(resource_type).batched_key_lookup {
            return Err(StoreError::Rejected(format!("{resource_type} has no batched key lookup")));
        }
        let def = self.def(resource_type)?;
        keys.iter()
            .filter_map(|key| self.row_by_key(def, key))
            .map(|row| Self::to_resource(def, row))
            .collect()
    }

    fn find_by_key(
        &self,
        resource_type: &ResourceType,
        key: &PrimaryKey,
        _context: &RequestContext,
    ) -> Result<Option<Resource>, StoreError> {
        let mut call = StoreCall::new(CallKind::FindByKey, resource_type);
        call.keys = vec![key.clone()];
        self.record(call)?;

        let def = self.def(resource_type)?;
        self.row_by_key(def, key).map(|row| Self::to_resource(def, row)).transpose()
    }

    fn find_related(&self, lookup: &RelatedLookup) -> Result<RelatedBatch, StoreError> {
        let mut call = StoreCall::new(CallKind::FindRelated, &lookup.owner_type);
        call.relation = Some(lookup.relation.name.clone());
        call.owners = lookup.owners.clone();
        call.sql = Some(self.preload_sql(lookup)?);
        self.record(call)?;

        let mut batch = RelatedBatch::default();
        match lookup.relation.foreign_key_on() {
            ForeignKeyOn::Owner => self.related_via_owner_key(lookup, &mut batch)?,
            ForeignKeyOn::Related => self.related_via_related_key(lookup, &mut batch)?,
        }
        Ok(batch)
    }
}
