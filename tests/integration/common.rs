//! Shared fixtures: schema, seeded store and a minimal JSON:API serializer.

#![allow(dead_code)]

use lifeline::fragment::Fragment;
use lifeline::operation_result::{PageInfo, ResourceSerializer};
use lifeline::relation::{RelationDef, ResourceDef, Schema};
use lifeline::{Identity, InMemoryStore, Linkage, ResourceSet, SqlDialect};
use serde_json::{json, Map, Value};
use std::sync::Arc;

// ============================================================================
// Schema
// ============================================================================
//
// articles has_many article_comments, as: :commentable
// posts    has_many comments,         as: :commentable
// comments belongs_to commentable, polymorphic (articles | posts)
//
// comments declare no relation back to articles by name.

pub fn schema() -> Arc<Schema> {
    Arc::new(
        Schema::new()
            .resource(
                ResourceDef::new("articles")
                    .relation(
                        RelationDef::has_many("article_comments", "comments", "commentable_id")
                            .polymorphic_as("commentable_type"),
                    )
                    .relation(RelationDef::belongs_to("author", "people", "author_id"))
                    .relation(RelationDef::has_many("invoices", "invoices", "article_id").remote()),
            )
            .resource(
                ResourceDef::new("posts").relation(
                    RelationDef::has_many("comments", "comments", "commentable_id")
                        .polymorphic_as("commentable_type"),
                ),
            )
            .resource(
                ResourceDef::new("comments")
                    .relation(RelationDef::belongs_to_polymorphic(
                        "commentable",
                        ["articles", "posts"],
                        "commentable_id",
                        "commentable_type",
                    ))
                    .relation(RelationDef::belongs_to("author", "people", "author_id")),
            )
            .resource(
                ResourceDef::new("people")
                    .relation(RelationDef::has_many("articles", "articles", "author_id")),
            )
            .resource(ResourceDef::new("invoices")),
    )
}

/// Comment row attached to record 1 of `commentable_type`
pub fn comment(id: i64, body: &str, commentable_type: &str, author_id: Option<i64>) -> Value {
    json!({
        "id": id,
        "body": body,
        "commentable_type": commentable_type,
        "commentable_id": 1,
        "author_id": author_id
    })
}

/// Article 1 with comments 10 and 11, plus a post comment sharing the owner key
pub fn minimal_store(schema: &Arc<Schema>, dialect: SqlDialect) -> InMemoryStore {
    let article = json!({"id": 1, "title": "JSON API paints my bikeshed!", "author_id": null});
    InMemoryStore::new(schema.clone(), dialect)
        .insert("articles", article)
        .insert("posts", json!({"id": 1, "title": "Post one"}))
        .insert("comments", comment(10, "First!", "articles", None))
        .insert("comments", comment(11, "I like XML better", "articles", None))
        .insert("comments", comment(12, "On a post", "posts", None))
}

pub fn seeded_store(schema: &Arc<Schema>, dialect: SqlDialect) -> InMemoryStore {
    InMemoryStore::new(schema.clone(), dialect)
        .insert("people", json!({"id": 1, "name": "Joe Author"}))
        .insert("people", json!({"id": 2, "name": "Fred Reader"}))
        .insert(
            "articles",
            json!({"id": 1, "title": "JSON API paints my bikeshed!", "author_id": 1}),
        )
        .insert("articles", json!({"id": 2, "title": "Rails is Omakase", "author_id": 2}))
        .insert("articles", json!({"id": 3, "title": "Orphan", "author_id": null}))
        .insert("posts", json!({"id": 1, "title": "Post one"}))
        .insert("comments", comment(10, "First!", "articles", Some(2)))
        .insert("comments", comment(11, "I like XML better", "articles", Some(1)))
        .insert("comments", comment(12, "On a post", "posts", Some(2)))
}

// ============================================================================
// Serializer
// ============================================================================

pub struct JsonApiSerializer;

fn identifier(identity: &Identity) -> Value {
    json!({"type": identity.resource_type.as_str(), "id": identity.key.to_string()})
}

fn linkage_data(linkage: &Linkage) -> Value {
    match linkage {
        Linkage::ToOne(one) => one.as_ref().map_or(Value::Null, identifier),
        Linkage::ToMany(many) => Value::Array(many.iter().map(identifier).collect()),
    }
}

fn resource_object(fragment: &Fragment) -> Value {
    let mut object = Map::new();
    object.insert("type".into(), json!(fragment.identity().resource_type.as_str()));
    object.insert("id".into(), json!(fragment.identity().key.to_string()));
    if let Some(resource) = fragment.resource() {
        object.insert("attributes".into(), Value::Object(resource.attributes.clone()));
    }
    if !fragment.relationships().is_empty() {
        let relationships: Map<String, Value> = fragment
            .relationships()
            .iter()
            .map(|(name, linkage)| (name.clone(), json!({"data": linkage_data(linkage)})))
            .collect();
        object.insert("relationships".into(), Value::Object(relationships));
    }
    Value::Object(object)
}

fn included(set: &ResourceSet) -> Vec<Value> {
    set.included().into_iter().map(resource_object).collect()
}

impl ResourceSerializer for JsonApiSerializer {
    fn serialize_single(&self, set: &ResourceSet) -> Value {
        let data = set.primary_fragments().first().map_or(Value::Null, |f| resource_object(f));
        json!({"data": data, "included": included(set)})
    }

    fn serialize_plural(&self, set: &ResourceSet, _page: &PageInfo) -> Value {
        let data: Vec<Value> = set.primary_fragments().into_iter().map(resource_object).collect();
        json!({"data": data, "included": included(set)})
    }

    fn serialize_related_plural(
        &self,
        set: &ResourceSet,
        _source: &Identity,
        _relation: &str,
        page: &PageInfo,
    ) -> Value {
        self.serialize_plural(set, page)
    }

    fn serialize_relationship(
        &self,
        _parent: &Identity,
        _relation: &lifeline::RelationDef,
        linkage: &Linkage,
    ) -> Value {
        json!({"data": linkage_data(linkage)})
    }
}
