//! Resolver behaviour: call counts, deduplication, fallbacks, parallel levels.

use crate::common::{comment, minimal_store, schema, seeded_store};
use lifeline::store::{CallKind, StoreCapabilities};
use lifeline::{
    EngineConfig, Identity, IncludeDirective, IncludeOptions, Linkage, PrimaryQuery,
    RequestContext, ResolveError, Resolver, ResourceType, Settings, SqlDialect, StoreError,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

fn articles_include(schema: &lifeline::Schema, paths: &[&str]) -> IncludeDirective {
    let articles = ResourceType::new("articles");
    IncludeDirective::build(schema, &articles, paths, IncludeOptions::default())
        .expect("include directive")
}

#[test]
fn test_article_comments_resolve_in_two_store_calls() {
    let schema = schema();
    let store = Arc::new(minimal_store(&schema, SqlDialect::Postgres));
    let settings = Settings::default();
    let resolver = Resolver::new(store.clone(), &schema, &settings);

    let set = resolver
        .resolve(
            &PrimaryQuery::new("articles"),
            &articles_include(&schema, &["article_comments"]),
            &RequestContext::empty(),
        )
        .expect("resolve");

    assert_eq!(store.call_count(), 2, "one primary lookup plus one batched relation lookup");

    let articles = set.all(&ResourceType::new("articles"));
    assert_eq!(articles.len(), 1);
    let expected: BTreeSet<Identity> =
        [10, 11].into_iter().map(|id| Identity::new("comments", id)).collect();
    assert_eq!(articles[0].relationship("article_comments"), Some(&Linkage::ToMany(expected)));

    let comments = set.all(&ResourceType::new("comments"));
    assert_eq!(comments.len(), 2);
    assert!(comments.iter().all(|c| c.is_hydrated()));
    assert!(set.is_populated());
}

#[test]
fn test_call_count_does_not_grow_with_comment_count() {
    let schema = schema();
    let mut store = minimal_store(&schema, SqlDialect::Postgres);
    for id in 100..150 {
        store = store.insert("comments", comment(id, "more", "articles", None));
    }
    let store = Arc::new(store);
    let settings = Settings::default();
    let resolver = Resolver::new(store.clone(), &schema, &settings);

    let set = resolver
        .resolve(
            &PrimaryQuery::new("articles"),
            &articles_include(&schema, &["article_comments"]),
            &RequestContext::empty(),
        )
        .expect("resolve");

    assert_eq!(store.call_count(), 2);
    assert_eq!(set.all(&ResourceType::new("comments")).len(), 52);
}

#[test]
fn test_identity_reached_by_two_paths_is_one_fragment() {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let settings = Settings::default();
    let resolver = Resolver::new(store, &schema, &settings);

    // people#1 is article 1's author and comment 11's author
    let set = resolver
        .resolve(
            &PrimaryQuery::new("articles").filter("id", json!(1)),
            &articles_include(&schema, &["author.articles", "article_comments.author"]),
            &RequestContext::empty(),
        )
        .expect("resolve");

    let joe = Identity::new("people", 1);
    let people = set.all(&ResourceType::new("people"));
    assert_eq!(people.iter().filter(|f| *f.identity() == joe).count(), 1);

    // Slots discovered along the first path are kept on the shared fragment
    let fragment = set.get(&joe).expect("people#1");
    assert_eq!(
        fragment.relationship("articles"),
        Some(&Linkage::ToMany([Identity::new("articles", 1)].into_iter().collect()))
    );
    assert_eq!(set.all(&ResourceType::new("people")).len(), 2);
}

#[test]
fn test_empty_primary_result_is_populated_and_empty() {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let settings = Settings::default();
    let resolver = Resolver::new(store.clone(), &schema, &settings);

    let set = resolver
        .resolve(
            &PrimaryQuery::new("articles").filter("title", json!("No such article")),
            &articles_include(&schema, &["article_comments.author"]),
            &RequestContext::empty(),
        )
        .expect("resolve");

    assert!(set.is_populated());
    assert!(set.is_empty());
    assert_eq!(store.call_count(), 1, "no relation lookups for an empty owner set");
}

#[test]
fn test_owner_without_related_records_gets_empty_slot() {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let settings = Settings::default();
    let resolver = Resolver::new(store, &schema, &settings);

    let set = resolver
        .resolve(
            &PrimaryQuery::new("articles"),
            &articles_include(&schema, &["author", "article_comments"]),
            &RequestContext::empty(),
        )
        .expect("resolve");

    let orphan = set.get(&Identity::new("articles", 3)).expect("articles#3");
    assert_eq!(orphan.relationship("author"), Some(&Linkage::ToOne(None)));
    assert_eq!(orphan.relationship("article_comments"), Some(&Linkage::empty(true)));
}

#[test]
fn test_key_only_source_falls_back_to_single_lookups() {
    let schema = schema();
    let store = Arc::new(
        seeded_store(&schema, SqlDialect::Postgres)
            .without_preload()
            .with_capabilities("people", StoreCapabilities::KEY_ONLY),
    );
    let settings = Settings::default();
    let resolver = Resolver::new(store.clone(), &schema, &settings);

    let set = resolver
        .resolve(
            &PrimaryQuery::new("articles"),
            &articles_include(&schema, &["author"]),
            &RequestContext::empty(),
        )
        .expect("resolve");

    let kinds: Vec<CallKind> = store.calls().iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![CallKind::Find, CallKind::FindRelated, CallKind::FindByKey, CallKind::FindByKey]
    );
    for person in set.all(&ResourceType::new("people")) {
        assert!(person.resource().is_some(), "{} has no payload", person.identity());
    }
}

#[test]
fn test_key_only_primary_lookup_by_keys() {
    let schema = schema();
    let store = Arc::new(
        seeded_store(&schema, SqlDialect::Postgres)
            .with_capabilities("people", StoreCapabilities::KEY_ONLY),
    );
    let settings = Settings::default();
    let resolver = Resolver::new(store.clone(), &schema, &settings);
    let include = IncludeDirective::root("people");

    let set = resolver
        .resolve(&PrimaryQuery::new("people").keys([2, 1]), &include, &RequestContext::empty())
        .expect("resolve");
    assert_eq!(set.primary_identities(), &[Identity::new("people", 2), Identity::new("people", 1)]);
    assert!(set.primary_fragments().iter().all(|f| f.resource().is_some()));

    let none = resolver
        .resolve(&PrimaryQuery::new("people"), &include, &RequestContext::empty())
        .expect("resolve");
    assert!(none.is_empty() && none.is_populated());
}

#[test]
fn test_store_failure_aborts_without_partial_result() {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres).fail_on(
        CallKind::FindRelated,
        "comments",
        StoreError::Unavailable("replica lag".into()),
    ));
    let settings = Settings::default();
    let resolver = Resolver::new(store, &schema, &settings);

    let err = resolver
        .resolve(
            &PrimaryQuery::new("articles"),
            &articles_include(&schema, &["article_comments.author"]),
            &RequestContext::empty(),
        )
        .unwrap_err();

    match err {
        ResolveError::Store { operation, source } => {
            assert!(operation.contains("comments.author"), "{operation}");
            assert_eq!(source, StoreError::Unavailable("replica lag".into()));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_parallel_levels_match_sequential() {
    let schema = schema();
    let include = articles_include(
        &schema,
        &[
            "author.articles",
            "article_comments.author",
            "article_comments.commentable",
        ],
    );

    let sequential_store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let sequential_settings = Settings::default();
    let sequential = Resolver::new(sequential_store.clone(), &schema, &sequential_settings)
        .resolve(&PrimaryQuery::new("articles"), &include, &RequestContext::empty())
        .expect("sequential");

    let parallel_store = Arc::new(seeded_store(&schema, SqlDialect::Postgres));
    let parallel_settings = Settings::new(EngineConfig {
        parallel_levels: true,
        ..EngineConfig::default()
    });
    let parallel = Resolver::new(parallel_store.clone(), &schema, &parallel_settings)
        .resolve(&PrimaryQuery::new("articles"), &include, &RequestContext::empty())
        .expect("parallel");

    assert_eq!(sequential, parallel);
    assert_eq!(sequential_store.call_count(), parallel_store.call_count());
}

#[test]
fn test_parallel_levels_surface_store_failure() {
    let schema = schema();
    let include = articles_include(&schema, &["author", "article_comments"]);
    let store = Arc::new(seeded_store(&schema, SqlDialect::Postgres).fail_on(
        CallKind::FindRelated,
        "articles",
        StoreError::QueryError("boom".into()),
    ));
    let settings = Settings::new(EngineConfig {
        parallel_levels: true,
        ..EngineConfig::default()
    });

    let err = Resolver::new(store, &schema, &settings)
        .resolve(&PrimaryQuery::new("articles"), &include, &RequestContext::empty())
        .unwrap_err();
    assert!(matches!(err, ResolveError::Store { .. }));
}

#[test]
fn test_request_context_reaches_the_store() {
    use lifeline::store::{
        DataStore, FieldQuoter, FindQuery, FoundRecord, RelatedBatch, RelatedLookup,
    };
    use lifeline::{InMemoryStore, PrimaryKey, Resource};

    struct Tenant(&'static str);

    struct TenantChecked(InMemoryStore);

    impl FieldQuoter for TenantChecked {
        fn quote_identifier(&self, name: &str) -> String {
            self.0.quote_identifier(name)
        }
    }

    impl TenantChecked {
        fn check(&self, context: &RequestContext) -> Result<(), StoreError> {
            match context.get::<Tenant>() {
                Some(Tenant("acme")) => Ok(()),
                _ => Err(StoreError::Rejected("missing tenant".into())),
            }
        }
    }

    impl DataStore for TenantChecked {
        fn capabilities(&self, resource_type: &ResourceType) -> StoreCapabilities {
            self.0.capabilities(resource_type)
        }
        fn find(&self, query: &FindQuery) -> Result<Vec<FoundRecord>, StoreError> {
            self.check(&query.context)?;
            self.0.find(query)
        }
        fn count(&self, query: &FindQuery) -> Result<u64, StoreError> {
            self.check(&query.context)?;
            self.0.count(query)
        }
        fn find_by_keys(
            &self,
            resource_type: &ResourceType,
            keys: &[PrimaryKey],
            context: &RequestContext,
        ) -> Result<Vec<Resource>, StoreError> {
            self.check(context)?;
            self.0.find_by_keys(resource_type, keys, context)
        }
        fn find_by_key(
            &self,
            resource_type: &ResourceType,
            key: &PrimaryKey,
            context: &RequestContext,
        ) -> Result<Option<Resource>, StoreError> {
            self.check(context)?;
            self.0.find_by_key(resource_type, key, context)
        }
        fn find_related(&self, lookup: &RelatedLookup) -> Result<RelatedBatch, StoreError> {
            self.check(&lookup.context)?;
            self.0.find_related(lookup)
        }
    }

    let schema = schema();
    let store = Arc::new(TenantChecked(seeded_store(&schema, SqlDialect::Postgres)));
    let settings = Settings::default();
    let resolver = Resolver::new(store, &schema, &settings);
    let include = articles_include(&schema, &["author"]);

    assert!(resolver
        .resolve(&PrimaryQuery::new("articles"), &include, &RequestContext::new(Tenant("acme")))
        .is_ok());
    assert!(resolver
        .resolve(&PrimaryQuery::new("articles"), &include, &RequestContext::empty())
        .is_err());
}
