//! Integration tests for the Query Builder.
//!
//! These run the builder end to end against the in-memory driver:
//! - Filter compilation and bucket placement
//! - Ordering and windowing
//! - Reads, aggregates and writes
//! - Caching and pagination

use std::sync::Arc;

use bson::{Bson, Document, doc};
use pretty_assertions::assert_eq;
use quarry_query::memory::MemoryDatabase;
use quarry_query::prelude::*;
use quarry_query::{ErrorCode, FixedPaginator};

fn setup() -> (Arc<MemoryDatabase>, Arc<Connection>) {
    let db = Arc::new(MemoryDatabase::new("app"));
    let connection = Arc::new(Connection::new("mongodb", db.clone()));
    (db, connection)
}

async fn seed(connection: &Arc<Connection>) -> QueryBuilder {
    let users = connection.collection("users");
    users
        .batch_insert(vec![
            doc! { "name": "taylor", "age": 30, "votes": 1, "tags": ["admin"] },
            doc! { "name": "dayle", "age": 25, "votes": 5, "tags": [] },
            doc! { "name": "shawn", "age": 40, "votes": 3, "tags": ["author"] },
        ])
        .await
        .unwrap()
        .unwrap();
    users
}

// ==================== Compilation ====================

#[test]
fn test_single_clause_compiles_to_and() {
    let (_, connection) = setup();
    let mut query = connection.collection("users");
    query.r#where("name", "john");
    assert_eq!(
        query.compile_wheres().unwrap(),
        doc! { "$and": [{ "name": "john" }] }
    );
}

#[test]
fn test_logic_buckets() {
    let (_, connection) = setup();

    let mut and = connection.collection("users");
    and.r#where("a", 1).and_where("b", 2);
    assert_eq!(and.compile_wheres().unwrap(), doc! { "$and": [{ "a": 1 }, { "b": 2 }] });

    let mut or = connection.collection("users");
    or.r#where("a", 1).or_where("b", 2);
    assert_eq!(or.compile_wheres().unwrap(), doc! { "$or": [{ "a": 1 }, { "b": 2 }] });

    let mut nor = connection.collection("users");
    nor.r#where("a", 1).nor_where("b", 2);
    assert_eq!(nor.compile_wheres().unwrap(), doc! { "$nor": [{ "a": 1 }, { "b": 2 }] });
}

#[test]
fn test_nested_group_compiles_recursively() {
    let (_, connection) = setup();
    let mut query = connection.collection("users");
    query.r#where("email", "x").and_where_group(|q| {
        q.r#where("age", 27).and_where("name", "J");
    });
    assert_eq!(
        query.compile_wheres().unwrap(),
        doc! { "$and": [{ "email": "x" }, { "$and": [{ "age": 27 }, { "name": "J" }] }] }
    );
}

#[test]
fn test_nested_within_nested() {
    let (_, connection) = setup();
    let mut query = connection.collection("users");
    query.or_where_group(|q| {
        q.r#where("a", 1).or_where_group(|inner| {
            inner.r#where("b", 2).or_where("c", 3);
        });
    });
    assert_eq!(
        query.compile_wheres().unwrap(),
        doc! { "$or": [{ "$or": [{ "a": 1 }, { "$or": [{ "b": 2 }, { "c": 3 }] }] }] }
    );
}

#[test]
fn test_empty_group_adds_nothing() {
    let (_, connection) = setup();
    let mut query = connection.collection("users");
    query.where_group(|_| {});
    assert!(query.wheres().is_empty());
}

#[test]
fn test_compile_is_idempotent() {
    let (_, connection) = setup();
    let mut query = connection.collection("users");
    query
        .where_in("role", ["admin", "owner"])
        .or_where_like("name", "^jo")
        .or_where_null("deleted_at");
    assert_eq!(query.compile_wheres().unwrap(), query.compile_wheres().unwrap());
}

#[test]
fn test_first_clause_with_two_buckets_is_ambiguous() {
    let (_, connection) = setup();
    let mut query = connection.collection("users");
    query.r#where("a", 1).or_where("b", 2).nor_where("c", 3);
    let err = query.compile_wheres().unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidConfiguration);
}

#[tokio::test]
async fn test_ambiguous_root_surfaces_from_reads() {
    let (_, connection) = setup();
    let mut query = connection.collection("users");
    query.r#where("a", 1).or_where("b", 2).and_where("c", 3);
    assert!(query.get(&["a"]).await.unwrap_err().is_configuration());
    assert!(query.count().await.is_err());
}

#[test]
fn test_sugar_families_share_the_primitive() {
    let (_, connection) = setup();
    let mut query = connection.collection("places");
    query
        .where_between("age", 18, 65)
        .and_where_exists("email", true)
        .and_where_mod("n", 4, 0)
        .and_where_near("loc", vec![1.0, 2.0], None, Some(10.0));
    assert_eq!(
        query.compile_wheres().unwrap(),
        doc! { "$and": [
            { "age": { "$gt": 18, "$lt": 65 } },
            { "email": { "$exists": true } },
            { "n": { "$mod": [4_i64, 0_i64] } },
            { "loc": { "$near": [1.0, 2.0], "$maxDistance": 10.0 } },
        ] }
    );
}

// ==================== Ordering and windowing ====================

#[test]
fn test_order_by_accumulates() {
    let (_, connection) = setup();
    let mut query = connection.collection("users");
    query.order_by("a", "asc").order_by("b", "desc");
    assert_eq!(query.orders(), Some(&doc! { "a": 1, "b": -1 }));
}

#[test]
fn test_for_page_is_skip_and_take() {
    let (_, connection) = setup();
    let mut paged = connection.collection("users");
    paged.for_page(2, 10);
    let mut manual = connection.collection("users");
    manual.skip(10).take(10);
    assert_eq!(paged.offset(), manual.offset());
    assert_eq!(paged.limit(), manual.limit());
}

// ==================== Reads ====================

#[tokio::test]
async fn test_insert_then_find_round_trip() {
    let (_, connection) = setup();
    let users = connection.collection("users");
    let record = doc! { "name": "john", "email": "john@example.com" };

    let id = users.insert(record.clone()).await.unwrap().unwrap();
    let mut found = users.find(id.clone(), &[] as &[&str]).await.unwrap().unwrap();
    assert_eq!(found.remove("_id"), Some(id));
    assert_eq!(found, record);
}

#[tokio::test]
async fn test_find_rejects_malformed_id() {
    let (_, connection) = setup();
    let err = connection
        .collection("users")
        .find("zzz", &["name"])
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidParameter);
}

#[tokio::test]
async fn test_get_with_projection_and_order() {
    let (_, connection) = setup();
    let mut users = seed(&connection).await;
    users.where_gte("age", 30).order_by("age", "desc");

    let rows = users.get(&["name"]).await.unwrap().to_vec().await.unwrap();
    assert_eq!(rows, vec![doc! { "name": "shawn" }, doc! { "name": "taylor" }]);
}

#[tokio::test]
async fn test_count_respects_window() {
    let (_, connection) = setup();
    let mut users = seed(&connection).await;
    assert_eq!(users.count().await.unwrap(), 3);
    users.skip(1).take(1);
    assert_eq!(users.count().await.unwrap(), 1);
    assert!(users.exists().await.unwrap());
}

#[tokio::test]
async fn test_pluck_lists_distinct_and_implode() {
    let (_, connection) = setup();
    let mut users = seed(&connection).await;
    users.order_by("age", "asc");

    assert_eq!(users.pluck("name").await.unwrap(), Some(Bson::String("dayle".into())));
    assert_eq!(users.lists("age").await.unwrap(), vec![Bson::Int32(25), Bson::Int32(30), Bson::Int32(40)]);

    let mut admins = connection.collection("users");
    admins.where_size("tags", 1);
    assert_eq!(admins.implode("name", Some(",")).await.unwrap(), "taylor,shawn");
    assert_eq!(
        admins.distinct("tags", None).await.unwrap(),
        vec![Bson::String("admin".into()), Bson::String("author".into())]
    );
}

#[tokio::test]
async fn test_like_and_in_filters_match() {
    let (_, connection) = setup();
    let mut users = seed(&connection).await;
    users.where_like("name", "^TAY").or_where_in("age", [40]);
    assert_eq!(users.count().await.unwrap(), 2);
}

// ==================== Aggregates ====================

#[tokio::test]
async fn test_aggregates_over_nothing_are_zero() {
    let (_, connection) = setup();
    let users = connection.collection("users");
    for value in [
        users.sum("age").await.unwrap(),
        users.avg("age").await.unwrap(),
        users.min("age").await.unwrap(),
        users.max("age").await.unwrap(),
    ] {
        assert_eq!(value, Bson::Int32(0));
    }
}

#[tokio::test]
async fn test_aggregates_over_matches() {
    let (_, connection) = setup();
    let mut users = seed(&connection).await;
    users.where_lt("age", 35);
    assert_eq!(users.sum("age").await.unwrap(), Bson::Int64(55));
    assert_eq!(users.avg("age").await.unwrap(), Bson::Double(27.5));
    assert_eq!(users.max("age").await.unwrap(), Bson::Int32(30));
    assert_eq!(users.min("votes").await.unwrap(), Bson::Int32(1));
}

#[tokio::test]
async fn test_group_failure_is_an_error() {
    let (_, connection) = setup();
    let users = seed(&connection).await;
    let err = users
        .group(&["age"], doc! { "count": 0 }, "function (obj, prev) { prev.count++; }", None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DatabaseError);
}

// ==================== Writes ====================

#[tokio::test]
async fn test_update_operators_apply_to_all_matches() {
    let (_, connection) = setup();
    let mut users = seed(&connection).await;
    users.where_gt("age", 26);

    assert_eq!(users.update(doc! { "active": true }).await.unwrap(), 2);
    assert_eq!(users.increment("votes", 2, Some(doc! { "bumped": true })).await.unwrap(), 2);
    assert_eq!(users.push("tags", "editor").await.unwrap(), 2);
    assert_eq!(users.rename_field("active", "enabled").await.unwrap(), 2);

    let mut taylor = connection.collection("users");
    taylor.r#where("name", "taylor");
    let doc = taylor.first(&[] as &[&str]).await.unwrap().unwrap();
    assert_eq!(doc.get_i32("votes").unwrap(), 3);
    assert_eq!(doc.get_bool("bumped").unwrap(), true);
    assert_eq!(doc.get_bool("enabled").unwrap(), true);
    assert_eq!(
        doc.get_array("tags").unwrap(),
        &vec![Bson::String("admin".into()), Bson::String("editor".into())]
    );

    assert_eq!(taylor.decrement("votes", 3, None).await.unwrap(), 1);
    assert_eq!(taylor.pluck("votes").await.unwrap(), Some(Bson::Int32(0)));
    assert_eq!(taylor.pull("tags", "admin").await.unwrap(), 1);
    assert_eq!(taylor.unset_field("bumped").await.unwrap(), 1);
    let doc = taylor.first(&[] as &[&str]).await.unwrap().unwrap();
    assert!(doc.get("bumped").is_none());
    assert_eq!(doc.get_array("tags").unwrap(), &vec![Bson::String("editor".into())]);
}

#[tokio::test]
async fn test_non_numeric_increment_is_invalid() {
    let (_, connection) = setup();
    let users = seed(&connection).await;
    let err = users.increment("votes", "many", None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidParameter);
}

#[tokio::test]
async fn test_batch_insert_wraps_single_record() {
    let (_, connection) = setup();
    let users = connection.collection("users");
    let ids = users.batch_insert(doc! { "name": "solo" }).await.unwrap().unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(users.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_save_upserts_by_id() {
    let (_, connection) = setup();
    let users = connection.collection("users");
    let id = users.save(doc! { "name": "a" }).await.unwrap().unwrap();
    users.save(doc! { "_id": id.clone(), "name": "b" }).await.unwrap();
    assert_eq!(users.count().await.unwrap(), 1);
    assert_eq!(users.pluck("name").await.unwrap(), Some(Bson::String("b".into())));
}

#[tokio::test]
async fn test_delete_and_truncate() {
    let (_, connection) = setup();
    let mut users = seed(&connection).await;
    users.where_ne("name", "taylor");
    assert_eq!(users.delete().await.unwrap(), 2);
    assert!(users.truncate().await.unwrap());
    assert_eq!(connection.collection("users").count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_rejected_commands_degrade() {
    let (db, connection) = setup();
    let users = seed(&connection).await;
    db.memory_collection("users").set_failing(true);

    assert_eq!(users.insert(doc! { "name": "x" }).await.unwrap(), None);
    assert_eq!(users.update(doc! { "a": 1 }).await.unwrap(), 0);
    assert_eq!(users.delete().await.unwrap(), 0);
    assert_eq!(users.sum("age").await.unwrap(), Bson::Int32(0));
    assert!(!users.truncate().await.unwrap());
}

// ==================== Caching and pagination ====================

#[tokio::test]
async fn test_remember_serves_cached_results() {
    let (_, connection) = setup();
    let mut users = seed(&connection).await;
    users.remember(10, None);

    let first = users.get(&["name"]).await.unwrap();
    assert!(first.is_materialized());
    assert_eq!(first.count().await.unwrap(), 3);

    connection
        .collection("users")
        .insert(doc! { "name": "late" })
        .await
        .unwrap();

    let cached: Vec<Document> = users.get(&["name"]).await.unwrap().to_vec().await.unwrap();
    assert_eq!(cached.len(), 3);
    assert_eq!(users.get_fresh(&["name"]).unwrap().count().await.unwrap(), 4);
}

#[tokio::test]
async fn test_paginate_uses_current_page() {
    let (_, connection) = setup();
    let mut users = seed(&connection).await;
    connection.set_paginator(|| Arc::new(FixedPaginator::new(2)));
    users.order_by("age", "asc");

    let page = users.paginate(2, &["name"]).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.current_page, 2);
    assert_eq!(page.last_page(), 2);
    assert_eq!(page.items, vec![doc! { "name": "shawn" }]);
}

#[tokio::test]
async fn test_remembered_paginate_reports_full_total() {
    let (_, connection) = setup();
    let mut users = seed(&connection).await;
    connection.set_paginator(|| Arc::new(FixedPaginator::new(1)));
    users.order_by("age", "asc").remember(10, None);

    let page = users.paginate(2, &["name"]).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.last_page(), 2);

    // a second read serves the cached page
    let again = users.paginate(2, &["name"]).await.unwrap();
    assert_eq!(again.items, page.items);
    assert_eq!(again.total, 3);
}
