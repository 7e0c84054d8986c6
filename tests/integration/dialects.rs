//! Identifier quoting follows the store's dialect end to end.

use crate::common::{schema, seeded_store};
use lifeline::store::{CallKind, StoreCall};
use lifeline::{
    IncludeDirective, IncludeOptions, PrimaryQuery, RequestContext, Resolver, ResourceType,
    Settings, SortCriterion, SqlDialect,
};
use std::sync::Arc;

fn resolve_calls(dialect: SqlDialect) -> Vec<StoreCall> {
    let schema = schema();
    let store = Arc::new(seeded_store(&schema, dialect));
    let settings = Settings::default();
    let include = IncludeDirective::build(
        &schema,
        &ResourceType::new("articles"),
        &["author", "article_comments"],
        IncludeOptions::default(),
    )
    .expect("include directive");

    Resolver::new(store.clone(), &schema, &settings)
        .resolve(
            &PrimaryQuery::new("articles").sort(SortCriterion::desc("title")),
            &include,
            &RequestContext::empty(),
        )
        .expect("resolve");
    store.calls()
}

fn find_call(calls: &[StoreCall]) -> &StoreCall {
    calls.iter().find(|c| c.kind == CallKind::Find).expect("find call")
}

fn related_sql<'a>(calls: &'a [StoreCall], relation: &str) -> &'a str {
    calls
        .iter()
        .find(|c| c.kind == CallKind::FindRelated && c.relation.as_deref() == Some(relation))
        .and_then(|c| c.sql.as_deref())
        .expect("preload sql")
}

#[test]
fn test_postgres_quoting() {
    let calls = resolve_calls(SqlDialect::Postgres);
    let find = find_call(&calls);

    assert_eq!(
        find.select,
        vec![
            "\"articles\".\"id\" AS \"articles_id\"".to_string(),
            "\"articles\".\"author_id\" AS \"articles_author_id\"".to_string(),
        ]
    );
    assert_eq!(find.order_by, vec!["\"articles\".\"title\" DESC".to_string()]);

    let sql = related_sql(&calls, "article_comments");
    assert!(sql.contains("FROM \"comments\""), "{sql}");
    assert!(
        sql.contains("\"comments\".\"commentable_id\" AS \"comments_commentable_id\""),
        "{sql}"
    );
}

#[test]
fn test_mysql_quoting() {
    let calls = resolve_calls(SqlDialect::MySql);
    let find = find_call(&calls);

    assert_eq!(find.select[0], "`articles`.`id` AS `articles_id`");
    assert_eq!(find.order_by, vec!["`articles`.`title` DESC".to_string()]);

    let sql = related_sql(&calls, "author");
    assert!(sql.contains("FROM `articles`"), "{sql}");
    assert!(sql.contains("`articles`.`author_id` AS `articles_author_id`"), "{sql}");
    assert!(!sql.contains('"'), "{sql}");
}

#[test]
fn test_sqlite_quoting() {
    let calls = resolve_calls(SqlDialect::Sqlite);
    let sql = related_sql(&calls, "article_comments");
    assert!(sql.contains("\"comments\".\"commentable_type\""), "{sql}");
    assert!(!sql.contains('`'), "{sql}");
}
