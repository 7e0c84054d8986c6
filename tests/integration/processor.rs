//! Request-level operations and rendered documents.

use crate::common::{schema, seeded_store, JsonApiSerializer};
use lifeline::error::codes;
use lifeline::store::CallKind;
use lifeline::{
    EngineConfig, Identity, Linkage, Pagination, PrimaryQuery, Processor, RequestContext,
    ResultKind, Settings, SortCriterion, SqlDialect,
};
use serde_json::json;
use std::sync::Arc;

#[test]
fn test_show_renders_resource_with_includes() {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let settings = Settings::default();
    let processor = Processor::new(store, &schema, &settings);

    let result = processor.show("articles", 1, "author", &RequestContext::empty());
    assert_eq!(result.code(), Some("200"));
    assert!(!result.is_error());
    assert_eq!(
        result.resource().and_then(|r| r.attribute("title")),
        Some(&json!("JSON API paints my bikeshed!"))
    );

    let doc = result.render(Some(&JsonApiSerializer)).expect("render");
    assert_eq!(doc["data"]["id"], json!("1"));
    assert_eq!(
        doc["data"]["relationships"]["author"]["data"],
        json!({"type": "people", "id": "1"})
    );
    assert_eq!(doc["included"][0]["type"], json!("people"));
    assert_eq!(doc["included"][0]["attributes"]["name"], json!("Joe Author"));
}

#[test]
fn test_show_missing_record_is_not_found() {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let settings = Settings::default();
    let processor = Processor::new(store, &schema, &settings);

    let result = processor.show("articles", 99, "", &RequestContext::empty());
    assert!(result.is_error());
    assert_eq!(result.code(), Some("404"));
    assert_eq!(result.errors()[0].code.as_deref(), Some(codes::RECORD_NOT_FOUND));

    let doc = result.render(None).expect("errors render without a serializer");
    assert_eq!(doc["errors"][0]["title"], json!("Record not found"));
    assert_eq!(doc["errors"][0]["status"], json!("404"));
}

#[test]
fn test_index_reports_record_and_page_counts() {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let settings = Settings::new(EngineConfig {
        include_record_count: true,
        ..EngineConfig::default()
    });
    let processor = Processor::new(store.clone(), &schema, &settings);

    let query = PrimaryQuery::new("articles")
        .sort(SortCriterion::asc("title"))
        .paginate(Pagination::Paged { number: 1, size: 2 });
    let result = processor.index(query, "", &RequestContext::empty());

    assert_eq!(result.code(), Some("200"));
    let ids: Vec<Identity> = result
        .resource_set()
        .expect("resource set")
        .primary_identities()
        .to_vec();
    assert_eq!(ids, vec![Identity::new("articles", 1), Identity::new("articles", 3)]);

    let page = result.page().expect("page info");
    assert_eq!(page.record_count, Some(3));
    assert_eq!(page.page_count, Some(2));
    assert_eq!(
        page.pagination_params.get("next"),
        Some(&Pagination::Paged { number: 2, size: 2 })
    );

    let doc = result.render(Some(&JsonApiSerializer)).expect("render");
    assert_eq!(doc["meta"], json!({"record_count": 3, "page_count": 2}));

    let kinds: Vec<CallKind> = store.calls().iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![CallKind::Find, CallKind::Count]);
}

#[test]
fn test_index_clamps_page_size() {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let settings = Settings::new(EngineConfig {
        maximum_page_size: 2,
        ..EngineConfig::default()
    });
    let processor = Processor::new(store, &schema, &settings);

    let query = PrimaryQuery::new("articles").paginate(Pagination::Offset {
        offset: 0,
        limit: 500,
    });
    let result = processor.index(query, "", &RequestContext::empty());

    assert_eq!(result.resources().len(), 2);
    assert!(result.meta().is_empty(), "record counts are off by default");
}

#[test]
fn test_show_related_resources_with_includes() {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let settings = Settings::default();
    let processor = Processor::new(store.clone(), &schema, &settings);

    let source = Identity::new("articles", 1);
    let result = processor.show_related_resources(
        &source,
        "article_comments",
        "author",
        &RequestContext::empty(),
    );

    match result.kind() {
        ResultKind::RelatedResources {
            set,
            source: reported,
            relation,
            page,
        } => {
            assert_eq!(reported, &source);
            assert_eq!(relation, "article_comments");
            assert_eq!(page.record_count, Some(2));
            assert_eq!(set.primary_identities().len(), 2);
            assert!(set.contains(&Identity::new("people", 1)));
            assert!(set.contains(&Identity::new("people", 2)));
            assert!(set.primary_fragments().iter().all(|f| f.is_hydrated()));
        }
        other => panic!("unexpected result {other:?}"),
    }

    // Comments preloaded by the relation lookup are not fetched again by key
    let kinds: Vec<CallKind> = store.calls().iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![CallKind::FindRelated, CallKind::FindRelated]);
}

#[test]
fn test_show_related_without_includes_is_one_lookup() {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let settings = Settings::default();
    let processor = Processor::new(store.clone(), &schema, &settings);

    let result = processor.show_related_resources(
        &Identity::new("articles", 1),
        "article_comments",
        "",
        &RequestContext::empty(),
    );
    assert_eq!(result.resources().len(), 2);
    assert_eq!(store.call_count(), 1);
}

#[test]
fn test_show_related_through_polymorphic_relation() {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let settings = Settings::default();
    let processor = Processor::new(store, &schema, &settings);

    let result = processor.show_related_resources(
        &Identity::new("comments", 12),
        "commentable",
        "",
        &RequestContext::empty(),
    );
    let set = result.resource_set().expect("resource set");
    assert_eq!(set.primary_identities(), &[Identity::new("posts", 1)]);
}

#[test]
fn test_show_relationship_is_linkage_only() {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let settings = Settings::default();
    let processor = Processor::new(store.clone(), &schema, &settings);

    let parent = Identity::new("articles", 2);
    let result = processor.show_relationship(&parent, "author", &RequestContext::empty());
    match result.kind() {
        ResultKind::Relationship { linkage, .. } => {
            assert_eq!(linkage, &Linkage::ToOne(Some(Identity::new("people", 2))));
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(store.call_count(), 1);

    let doc = result.render(Some(&JsonApiSerializer)).expect("render");
    assert_eq!(doc, json!({"data": {"type": "people", "id": "2"}}));
}

#[test]
fn test_unknown_relationship_is_bad_request() {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let settings = Settings::default();
    let processor = Processor::new(store.clone(), &schema, &settings);

    let parent = Identity::new("articles", 1);
    let result = processor.show_relationship(&parent, "tags", &RequestContext::empty());
    assert_eq!(result.code(), Some("400"));
    assert_eq!(result.errors()[0].code.as_deref(), Some(codes::INVALID_INCLUDE));
    assert_eq!(store.call_count(), 0);
}

#[test]
fn test_index_with_extreme_page_values() {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let settings = Settings::new(EngineConfig {
        include_record_count: true,
        ..EngineConfig::default()
    });
    let processor = Processor::new(store, &schema, &settings);

    for page in [
        Pagination::Paged { number: u64::MAX, size: 10 },
        Pagination::Offset { offset: u64::MAX, limit: 10 },
    ] {
        let query = PrimaryQuery::new("articles").paginate(page);
        let result = processor.index(query, "", &RequestContext::empty());
        assert_eq!(result.code(), Some("200"), "{page:?}");
        assert!(result.resources().is_empty(), "{page:?}");
        let info = result.page().expect("page info");
        assert_eq!(info.record_count, Some(3));
        assert!(!info.pagination_params.contains_key("next"), "{page:?}");
    }
}
