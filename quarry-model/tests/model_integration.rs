//! Integration tests for models and the model query builder.
//!
//! Everything runs against the in-memory driver:
//! - Persistence, dirty tracking and timestamps
//! - Mass assignment
//! - Lifecycle events
//! - Soft deletes
//! - Pagination, bulk writes and method dispatch

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use quarry_model::prelude::*;
use quarry_query::memory::MemoryDatabase;
use quarry_query::{ConnectionMap, ErrorCode, FixedPaginator};

struct Fixture {
    db: Arc<MemoryDatabase>,
    connection: Arc<Connection>,
    orm: Arc<Orm>,
    events: Arc<Dispatcher>,
}

fn setup() -> Fixture {
    let db = Arc::new(MemoryDatabase::new("app"));
    let connection = Arc::new(Connection::new("mongodb", db.clone()));
    let events = Arc::new(Dispatcher::new());
    let orm = Orm::with_dispatcher(
        Arc::new(ConnectionMap::new(Arc::clone(&connection))),
        events.clone(),
    );

    orm.register(
        ModelMeta::new("User")
            .fillable(["name", "email", "votes"])
            .hidden(["password"]),
    );
    orm.register(
        ModelMeta::new("Post")
            .fillable(["title", "votes"])
            .soft_deletes(true)
            .per_page(2)
            .scope("popular", |query, _| {
                query.where_gte("votes", 10);
            }),
    );
    orm.register(ModelMeta::new("Setting").timestamps(false));

    Fixture {
        db,
        connection,
        orm,
        events,
    }
}

fn stored(fixture: &Fixture, collection: &str) -> Vec<Document> {
    fixture.db.memory_collection(collection).documents()
}

// ==================== Persistence ====================

#[tokio::test]
async fn test_create_then_find() {
    let fx = setup();
    let user = fx
        .orm
        .create("User", doc! { "name": "taylor", "email": "t@x.io" })
        .await
        .unwrap();
    assert!(user.exists());
    assert!(!user.is_dirty());

    let id = user.key().cloned().unwrap();
    let found = fx.orm.find("User", &id).await.unwrap().unwrap();
    assert_eq!(found.get_attribute("name"), Some(Bson::from("taylor")));
    assert!(matches!(found.get_attribute("created_at"), Some(Bson::DateTime(_))));
    assert!(matches!(found.get_attribute("updated_at"), Some(Bson::DateTime(_))));
}

#[tokio::test]
async fn test_models_without_timestamps() {
    let fx = setup();
    fx.orm.unguard();
    let setting = fx.orm.create("Setting", doc! { "key": "theme" }).await.unwrap();
    fx.orm.reguard();
    assert!(!setting.has_attribute("created_at"));
    assert!(!setting.has_attribute("updated_at"));
}

#[tokio::test]
async fn test_explicit_timestamp_is_kept() {
    let fx = setup();
    let fixed = bson::DateTime::from_millis(1_000);
    let mut user = fx.orm.model("User").unwrap();
    user.set_attribute("name", "taylor")
        .set_attribute("created_at", fixed);
    user.save().await.unwrap();
    assert_eq!(user.get_attribute("created_at"), Some(Bson::DateTime(fixed)));
}

#[tokio::test]
async fn test_update_writes_changes_and_removals() {
    let fx = setup();
    let user = fx
        .orm
        .create("User", doc! { "name": "taylor", "email": "t@x.io", "votes": 1 })
        .await
        .unwrap();
    let id = user.key().cloned().unwrap();

    let mut user = fx.orm.find("User", &id).await.unwrap().unwrap();
    user.set_attribute("name", "otwell");
    user.unset_attribute("email");
    assert!(user.save().await.unwrap());

    let documents = stored(&fx, "users");
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].get_str("name").unwrap(), "otwell");
    assert!(!documents[0].contains_key("email"));
    assert_eq!(documents[0].get("_id"), Some(&id));
}

#[tokio::test]
async fn test_clean_save_does_not_touch() {
    let fx = setup();
    let mut user = fx.orm.create("User", doc! { "name": "taylor" }).await.unwrap();
    let before = user.get_attribute("updated_at");
    assert!(user.save().await.unwrap());
    assert_eq!(user.get_attribute("updated_at"), before);
}

#[tokio::test]
async fn test_hard_delete() {
    let fx = setup();
    let mut user = fx.orm.create("User", doc! { "name": "taylor" }).await.unwrap();
    assert!(user.delete().await.unwrap());
    assert!(!user.exists());
    assert!(stored(&fx, "users").is_empty());

    // already gone
    assert!(!user.delete().await.unwrap());
}

#[tokio::test]
async fn test_destroy() {
    let fx = setup();
    let a = fx.orm.create("User", doc! { "name": "a" }).await.unwrap();
    let b = fx.orm.create("User", doc! { "name": "b" }).await.unwrap();
    fx.orm.create("User", doc! { "name": "c" }).await.unwrap();

    let ids = vec![a.key().cloned().unwrap(), b.key().cloned().unwrap()];
    assert_eq!(fx.orm.destroy("User", ids).await.unwrap(), 2);
    assert_eq!(fx.orm.all("User").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_find_or_fail() {
    let fx = setup();
    let query = fx.orm.query("User").unwrap();
    let err = query.find_or_fail(ObjectId::new(), &[]).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::RecordNotFound);
    assert!(err.is_not_found());

    let err = query.first_or_fail(&[]).await.unwrap_err();
    assert!(err.is_not_found());
}

// ==================== Mass assignment ====================

#[tokio::test]
async fn test_mass_assignment() {
    let fx = setup();
    let user = fx
        .orm
        .new_instance("User", doc! { "name": "taylor", "is_admin": true })
        .unwrap();
    assert!(!user.has_attribute("is_admin"));

    let err = fx
        .orm
        .new_instance("Setting", doc! { "key": "theme" })
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::MassAssignment);
}

// ==================== Events ====================

#[tokio::test]
async fn test_creating_listener_can_cancel() {
    let fx = setup();
    fx.events.on(ModelEvent::Creating, "User", |user| {
        user.get_attribute("name") != Some(Bson::from("blocked"))
    });

    let mut blocked = fx.orm.new_instance("User", doc! { "name": "blocked" }).unwrap();
    assert!(!blocked.save().await.unwrap());
    assert!(!blocked.exists());
    assert!(stored(&fx, "users").is_empty());

    let mut allowed = fx.orm.new_instance("User", doc! { "name": "allowed" }).unwrap();
    assert!(allowed.save().await.unwrap());
}

#[tokio::test]
async fn test_after_events_fire() {
    let fx = setup();
    let fired = Arc::new(AtomicUsize::new(0));
    for event in [ModelEvent::Created, ModelEvent::Saved, ModelEvent::Updated, ModelEvent::Deleted] {
        let fired = Arc::clone(&fired);
        fx.events.on(event, "User", move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
            true
        });
    }

    let mut user = fx.orm.create("User", doc! { "name": "taylor" }).await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 2);

    user.set_attribute("name", "otwell");
    user.save().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 4);

    user.delete().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_deleting_listener_can_cancel() {
    let fx = setup();
    fx.events.on(ModelEvent::Deleting, "User", |_| false);

    let mut user = fx.orm.create("User", doc! { "name": "taylor" }).await.unwrap();
    assert!(!user.delete().await.unwrap());
    assert!(user.exists());
    assert_eq!(stored(&fx, "users").len(), 1);
}

// ==================== Soft deletes ====================

#[tokio::test]
async fn test_soft_delete_and_restore() {
    let fx = setup();
    let mut post = fx.orm.create("Post", doc! { "title": "hello" }).await.unwrap();
    fx.orm.create("Post", doc! { "title": "world" }).await.unwrap();

    assert!(post.delete().await.unwrap());
    assert!(post.trashed());
    assert_eq!(stored(&fx, "posts").len(), 2);

    let query = fx.orm.query("Post").unwrap();
    assert_eq!(query.get(&[]).await.unwrap().len(), 1);

    let mut with_trashed = fx.orm.query("Post").unwrap();
    with_trashed.with_trashed();
    assert_eq!(with_trashed.get(&[]).await.unwrap().len(), 2);

    let mut only_trashed = fx.orm.query("Post").unwrap();
    only_trashed.only_trashed();
    let trashed = only_trashed.get(&[]).await.unwrap();
    assert_eq!(trashed.len(), 1);
    assert_eq!(trashed[0].get_attribute("title"), Some(Bson::from("hello")));

    assert!(post.restore().await.unwrap());
    assert!(!post.trashed());
    assert_eq!(query.get(&[]).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_bulk_soft_delete_and_restore() {
    let fx = setup();
    for title in ["a", "b", "c"] {
        fx.orm.create("Post", doc! { "title": title }).await.unwrap();
    }

    let mut query = fx.orm.query("Post").unwrap();
    query.where_in("title", ["a", "b"]);
    assert_eq!(query.delete().await.unwrap(), 2);
    assert_eq!(fx.orm.all("Post").await.unwrap().len(), 1);

    assert_eq!(fx.orm.query("Post").unwrap().restore().await.unwrap(), 3);
    assert_eq!(fx.orm.all("Post").await.unwrap().len(), 3);

    assert_eq!(fx.orm.query("Post").unwrap().force_delete().await.unwrap(), 3);
    assert!(stored(&fx, "posts").is_empty());
}

// ==================== Bulk writes ====================

#[tokio::test]
async fn test_bulk_update_stamps_updated_at() {
    let fx = setup();
    fx.orm.create("User", doc! { "name": "a", "votes": 1 }).await.unwrap();

    let mut users = fx.orm.query("User").unwrap();
    users.r#where("name", "a");
    assert_eq!(users.update(doc! { "votes": 5 }).await.unwrap(), 1);
    assert_eq!(users.increment("votes", 2, None).await.unwrap(), 1);

    let user = users.first(&[]).await.unwrap().unwrap();
    assert_eq!(user.get_attribute("votes"), Some(Bson::Int32(7)));
    assert!(matches!(user.get_attribute("updated_at"), Some(Bson::DateTime(_))));
}

// ==================== Pagination ====================

#[tokio::test]
async fn test_paginate_counts_total_once() {
    let fx = setup();
    for n in 0..5 {
        fx.orm
            .create("Post", doc! { "title": format!("post {}", n), "votes": n })
            .await
            .unwrap();
    }
    fx.connection
        .set_paginator(|| Arc::new(FixedPaginator::new(2)));

    let mut query = fx.orm.query("Post").unwrap();
    query.order_by("votes", "asc");
    let page = query.paginate(None, &[]).await.unwrap();

    assert_eq!(page.total, 5);
    assert_eq!(page.per_page, 2);
    assert_eq!(page.current_page, 2);
    assert_eq!(page.last_page(), 3);
    let votes: Vec<Option<Bson>> = page.items.iter().map(|p| p.get_attribute("votes")).collect();
    assert_eq!(votes, vec![Some(Bson::Int32(2)), Some(Bson::Int32(3))]);
}

#[tokio::test]
async fn test_remembered_paginate_counts_every_match() {
    let fx = setup();
    for n in 0..5 {
        fx.orm
            .create("Post", doc! { "title": format!("post {}", n), "votes": n })
            .await
            .unwrap();
    }
    fx.connection
        .set_paginator(|| Arc::new(FixedPaginator::new(1)));

    let mut query = fx.orm.query("Post").unwrap();
    query.order_by("votes", "asc").remember(5, None);
    let page = query.paginate(None, &[]).await.unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total, 5);
    assert_eq!(page.last_page(), 3);
}

// ==================== Dispatch ====================

#[tokio::test]
async fn test_scopes_and_pass_through_calls() {
    let fx = setup();
    for votes in [5, 10, 20] {
        fx.orm.create("Post", doc! { "title": "t", "votes": votes }).await.unwrap();
    }

    let mut query = fx.orm.query("Post").unwrap();
    assert_eq!(query.call("popular", &[]).await.unwrap(), CallResult::Chain);
    assert_eq!(
        query.call("count", &[]).await.unwrap(),
        CallResult::Value(Bson::Int64(2))
    );
    assert_eq!(
        query.call("sum", &[Bson::from("votes")]).await.unwrap(),
        CallResult::Value(Bson::Int64(30))
    );
    assert_eq!(
        query.call("exists", &[]).await.unwrap(),
        CallResult::Value(Bson::Boolean(true))
    );

    let err = query.call("explode", &[]).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidParameter);
}

#[tokio::test]
async fn test_pluck_and_serialization() {
    let fx = setup();
    let mut user = fx.orm.model("User").unwrap();
    user.force_fill(doc! { "name": "taylor", "password": "secret" });
    user.save().await.unwrap();

    let query = fx.orm.query("User").unwrap();
    assert_eq!(query.pluck("name").await.unwrap(), Some(Bson::from("taylor")));

    let user = query.first(&[]).await.unwrap().unwrap();
    let json = user.to_value();
    assert_eq!(json["name"], "taylor");
    assert!(json.get("password").is_none());
}
