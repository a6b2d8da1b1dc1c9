//! Integration tests for query building through the `quarry_orm` facade.
//!
//! These cover:
//! - Where clause compilation (buckets, nesting, ambiguous roots)
//! - Ordering and paging
//! - Round trips against the in-memory driver
//! - Aggregates on empty input

use std::sync::Arc;

use pretty_assertions::assert_eq;
use quarry_orm::prelude::*;
use quarry_orm::query::ErrorCode;
use quarry_orm::query::memory::MemoryDatabase;

fn connection() -> Arc<Connection> {
    Arc::new(Connection::new("mongodb", Arc::new(MemoryDatabase::new("app"))))
}

// ==================== Compilation ====================

#[test]
fn test_single_clause_compiles_to_and() {
    let mut query = connection().collection("users");
    query.r#where("name", "john");
    assert_eq!(
        query.compile_wheres().unwrap(),
        doc! { "$and": [{ "name": "john" }] }
    );
}

#[test]
fn test_logic_buckets() {
    let mut query = connection().collection("users");
    query
        .r#where("a", 1)
        .and_where("b", 2)
        .where_gt("c", 3);
    assert_eq!(
        query.compile_wheres().unwrap(),
        doc! { "$and": [{ "a": 1 }, { "b": 2 }, { "c": { "$gt": 3 } }] }
    );

    let mut query = connection().collection("users");
    query.r#where("a", 1).or_where("b", 2).or_where("c", 3);
    assert_eq!(
        query.compile_wheres().unwrap(),
        doc! { "$or": [{ "a": 1 }, { "b": 2 }, { "c": 3 }] }
    );

    let mut query = connection().collection("users");
    query.and_where("a", 1).nor_where("b", 2);
    assert_eq!(
        query.compile_wheres().unwrap(),
        doc! { "$and": [{ "a": 1 }], "$nor": [{ "b": 2 }] }
    );
}

#[test]
fn test_nested_groups() {
    let mut query = connection().collection("users");
    query.r#where("email", "x").and_where_group(|q| {
        q.r#where("age", 27).and_where("name", "J");
    });
    assert_eq!(
        query.compile_wheres().unwrap(),
        doc! {
            "$and": [
                { "email": "x" },
                { "$and": [{ "age": 27 }, { "name": "J" }] },
            ]
        }
    );

    let mut query = connection().collection("users");
    query.r#where("role", "admin").or_where_group(|q| {
        q.r#where("votes", 10).where_gt("age", 30);
    });
    assert_eq!(
        query.compile_wheres().unwrap(),
        doc! {
            "$or": [
                { "role": "admin" },
                { "$and": [{ "votes": 10 }, { "age": { "$gt": 30 } }] },
            ]
        }
    );

    // an empty group adds nothing
    let mut query = connection().collection("users");
    query.r#where("role", "admin").or_where_group(|_| {});
    assert_eq!(
        query.compile_wheres().unwrap(),
        doc! { "$and": [{ "role": "admin" }] }
    );
}

#[test]
fn test_ambiguous_root_is_a_configuration_error() {
    let mut query = connection().collection("users");
    query.r#where("a", 1).or_where("b", 2).nor_where("c", 3);
    let err = query.compile_wheres().unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidConfiguration);
}

#[test]
fn test_compilation_is_idempotent() {
    let mut query = connection().collection("users");
    query
        .r#where("a", 1)
        .or_where_in("b", [1, 2])
        .or_where_null("deleted_at");
    let first = query.compile_wheres().unwrap();
    assert_eq!(query.compile_wheres().unwrap(), first);
    assert_eq!(query.wheres().len(), 3);
}

// ==================== Ordering and paging ====================

#[test]
fn test_ordering_and_for_page() {
    let mut query = connection().collection("users");
    query.order_by("a", "asc").order_by("b", "desc").for_page(2, 10);
    assert_eq!(query.orders(), Some(&doc! { "a": 1, "b": -1 }));
    assert_eq!(query.offset(), Some(10));
    assert_eq!(query.limit(), Some(10));
}

// ==================== Round trips ====================

#[tokio::test]
async fn test_insert_then_find() {
    let connection = connection();
    let users = connection.collection("users");
    let id = users
        .insert(doc! { "name": "taylor", "votes": 3 })
        .await
        .unwrap()
        .unwrap();

    let found = users.find(&id, &["name"]).await.unwrap().unwrap();
    assert_eq!(found.get_str("name").unwrap(), "taylor");
    assert!(!found.contains_key("votes"));
    assert_eq!(found.get("_id"), Some(&id));
}

#[tokio::test]
async fn test_windowed_get_and_count() {
    let connection = connection();
    let users = connection.collection("users");
    users
        .batch_insert((1..=5).map(|n| doc! { "n": n }).collect::<Vec<_>>())
        .await
        .unwrap();

    let mut query = connection.collection("users");
    query.order_by("n", "desc").for_page(2, 2);
    let cursor = query.get::<&str>(&[]).await.unwrap();
    let values: Vec<i32> = cursor
        .to_vec()
        .await
        .unwrap()
        .iter()
        .map(|d| d.get_i32("n").unwrap())
        .collect();
    assert_eq!(values, vec![3, 2]);
    assert_eq!(cursor.count().await.unwrap(), 2);
    assert_eq!(cursor.count_all().await.unwrap(), 5);
}

#[tokio::test]
async fn test_aggregates_on_empty_input_are_zero() {
    let connection = connection();
    let empty = connection.collection("orders");
    assert_eq!(empty.sum("total").await.unwrap(), Bson::Int32(0));
    assert_eq!(empty.avg("total").await.unwrap(), Bson::Int32(0));
    assert_eq!(empty.max("total").await.unwrap(), Bson::Int32(0));
    assert_eq!(empty.min("total").await.unwrap(), Bson::Int32(0));
    assert_eq!(empty.count().await.unwrap(), 0);
    assert!(!empty.exists().await.unwrap());
}
