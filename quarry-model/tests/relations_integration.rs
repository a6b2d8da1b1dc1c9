//! Integration tests for relations and eager loading.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use quarry_model::prelude::*;
use quarry_model::RelationType;
use quarry_query::ConnectionMap;
use quarry_query::memory::MemoryDatabase;

fn setup() -> (Arc<MemoryDatabase>, Arc<Orm>) {
    let db = Arc::new(MemoryDatabase::new("app"));
    let connection = Arc::new(Connection::new("mongodb", db.clone()));
    let orm = Orm::new(Arc::new(ConnectionMap::new(connection)));

    orm.register(
        ModelMeta::new("User")
            .fillable(["name"])
            .relation("posts", RelationDef::has_many("Post"))
            .relation("profile", RelationDef::has_one("Profile"))
            .relation("roles", RelationDef::belongs_to_many("Role"))
            .relation("photos", RelationDef::morph_many("Photo", "imageable"))
            .relation("avatar", RelationDef::morph_one("Photo", "imageable")),
    );
    orm.register(
        ModelMeta::new("Post")
            .fillable(["title", "votes"])
            .relation("author", RelationDef::belongs_to("User").foreign_key("user_id"))
            .relation("comments", RelationDef::has_many("Comment"))
            .relation(
                "approvedComments",
                RelationDef::has_many("Comment").constrain(|q| {
                    q.r#where("approved", true);
                }),
            ),
    );
    orm.register(ModelMeta::new("Comment").fillable(["body", "approved"]));
    orm.register(ModelMeta::new("Profile").fillable(["bio"]));
    orm.register(
        ModelMeta::new("Role")
            .fillable(["name"])
            .relation("users", RelationDef::belongs_to_many("User")),
    );
    orm.register(
        ModelMeta::new("Photo")
            .fillable(["url"])
            .relation("imageable", RelationDef::morph_to("imageable")),
    );

    (db, orm)
}

async fn user(orm: &Arc<Orm>, name: &str) -> Model {
    orm.create("User", doc! { "name": name }).await.unwrap()
}

fn names(models: &[Model], field: &str) -> Vec<String> {
    let mut names: Vec<String> = models
        .iter()
        .filter_map(|m| m.get_attribute(field))
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    names.sort();
    names
}

// ==================== Has one / has many ====================

#[tokio::test]
async fn test_has_many_create_and_lazy_load() {
    let (_, orm) = setup();
    let taylor = user(&orm, "taylor").await;
    let dayle = user(&orm, "dayle").await;

    let mut posts = taylor.relation("posts").unwrap();
    posts
        .create_many(vec![doc! { "title": "a" }, doc! { "title": "b" }])
        .await
        .unwrap();
    dayle.relation("posts").unwrap().create(doc! { "title": "c" }).await.unwrap();

    let loaded = posts.get(&[]).await.unwrap();
    assert_eq!(names(&loaded, "title"), vec!["a", "b"]);
    assert_eq!(loaded[0].get_attribute("user_id"), taylor.key().cloned());
    assert_eq!(posts.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_has_one_save() {
    let (_, orm) = setup();
    let mut taylor = user(&orm, "taylor").await;

    let mut profile = orm.new_instance("Profile", doc! { "bio": "hi" }).unwrap();
    taylor.relation("profile").unwrap().save(&mut profile).await.unwrap();

    let value = taylor.related("profile").await.unwrap();
    let loaded = value.as_one().unwrap();
    assert_eq!(loaded.get_attribute("bio"), Some(Bson::from("hi")));
    assert_eq!(loaded.key(), profile.key());
}

#[tokio::test]
async fn test_relation_update_and_raw_update() {
    let (_, orm) = setup();
    let taylor = user(&orm, "taylor").await;
    let posts = taylor.relation("posts").unwrap();
    let mut writer = taylor.relation("posts").unwrap();
    writer.create(doc! { "title": "a", "votes": 1 }).await.unwrap();
    writer.create(doc! { "title": "b", "votes": 1 }).await.unwrap();

    assert_eq!(posts.update(doc! { "votes": 2 }).await.unwrap(), 2);
    assert_eq!(posts.raw_update(doc! { "votes": 3 }).await.unwrap(), 2);
    assert_eq!(posts.touch().await.unwrap(), 2);

    let loaded = posts.get(&[]).await.unwrap();
    assert!(loaded
        .iter()
        .all(|p| p.get_attribute("votes") == Some(Bson::Int32(3))));
}

// ==================== Belongs to ====================

#[tokio::test]
async fn test_belongs_to_lazy_and_associate() {
    let (_, orm) = setup();
    let taylor = user(&orm, "taylor").await;

    let post = orm.new_instance("Post", doc! { "title": "hello" }).unwrap();
    let mut author = post.relation("author").unwrap();
    author.associate(&taylor).unwrap();
    let mut post = author.into_parent();
    assert_eq!(post.get_attribute("user_id"), taylor.key().cloned());
    assert!(post.relation_loaded("author"));
    post.save().await.unwrap();

    let found = orm.find("Post", post.key().unwrap()).await.unwrap().unwrap();
    let author = found.relation("author").unwrap().first(&[]).await.unwrap().unwrap();
    assert_eq!(author.get_attribute("name"), Some(Bson::from("taylor")));

    let updated = found
        .relation("author")
        .unwrap()
        .update(doc! { "name": "otwell" })
        .await
        .unwrap();
    assert_eq!(updated, 1);
    let reloaded = orm.find("User", taylor.key().unwrap()).await.unwrap().unwrap();
    assert_eq!(reloaded.get_attribute("name"), Some(Bson::from("otwell")));
}

#[tokio::test]
async fn test_belongs_to_rejects_save() {
    let (_, orm) = setup();
    let post = orm.new_instance("Post", doc! { "title": "x" }).unwrap();
    let mut author = post.relation("author").unwrap();
    assert_eq!(author.kind(), RelationType::BelongsTo);

    let mut someone = orm.new_instance("User", doc! { "name": "x" }).unwrap();
    assert!(author.save(&mut someone).await.is_err());
}

// ==================== Eager loading ====================

#[tokio::test]
async fn test_eager_load_has_many_and_belongs_to() {
    let (_, orm) = setup();
    let taylor = user(&orm, "taylor").await;
    let dayle = user(&orm, "dayle").await;
    user(&orm, "shawn").await;

    let mut posts = taylor.relation("posts").unwrap();
    posts.create(doc! { "title": "a" }).await.unwrap();
    posts.create(doc! { "title": "b" }).await.unwrap();
    dayle.relation("posts").unwrap().create(doc! { "title": "c" }).await.unwrap();

    let mut query = orm.with("User", &["posts"]).unwrap();
    query.order_by("name", "asc");
    let users = query.get(&[]).await.unwrap();
    let counts: Vec<(String, usize)> = users
        .iter()
        .map(|u| {
            let name = u.get_attribute("name").and_then(|n| n.as_str().map(str::to_string));
            (name.unwrap_or_default(), u.get_relation("posts").map_or(0, RelationValue::len))
        })
        .collect();
    assert_eq!(
        counts,
        vec![
            ("dayle".to_string(), 1),
            ("shawn".to_string(), 0),
            ("taylor".to_string(), 2),
        ]
    );

    let posts = orm.with("Post", &["author"]).unwrap().get(&[]).await.unwrap();
    for post in &posts {
        let author = post.get_relation("author").and_then(RelationValue::as_one).unwrap();
        assert_eq!(post.get_attribute("user_id"), author.key().cloned());
    }
}

#[tokio::test]
async fn test_nested_and_constrained_eager_loading() {
    let (_, orm) = setup();
    let taylor = user(&orm, "taylor").await;
    let post = taylor
        .relation("posts")
        .unwrap()
        .create(doc! { "title": "a" })
        .await
        .unwrap();
    let mut comments = post.relation("comments").unwrap();
    comments
        .create_many(vec![
            doc! { "body": "yes", "approved": true },
            doc! { "body": "no", "approved": false },
        ])
        .await
        .unwrap();

    let users = orm
        .with("User", &["posts.comments", "posts.approvedComments"])
        .unwrap()
        .get(&[])
        .await
        .unwrap();
    let posts = users[0].get_relation("posts").unwrap().as_many();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].get_relation("comments").unwrap().len(), 2);
    let approved = posts[0].get_relation("approvedComments").unwrap().as_many();
    assert_eq!(names(approved, "body"), vec!["yes"]);

    let mut query = orm.query("Post").unwrap();
    query.with_constraint("comments", |q| {
        q.r#where("body", "no");
    });
    let posts = query.get(&[]).await.unwrap();
    let comments = posts[0].get_relation("comments").unwrap().as_many();
    assert_eq!(names(comments, "body"), vec!["no"]);

    let document = users[0].to_document();
    let posts = document.get_array("posts").unwrap();
    let first = posts[0].as_document().unwrap();
    assert!(first.contains_key("approved_comments"));
}

#[tokio::test]
async fn test_load_onto_existing_model() {
    let (_, orm) = setup();
    let mut taylor = user(&orm, "taylor").await;
    taylor.relation("posts").unwrap().create(doc! { "title": "a" }).await.unwrap();

    assert!(!taylor.relation_loaded("posts"));
    taylor.load(&["posts"]).await.unwrap();
    assert_eq!(taylor.get_relation("posts").map(RelationValue::len), Some(1));
}

// ==================== Belongs to many ====================

#[tokio::test]
async fn test_attach_and_detach_update_both_sides() {
    let (_, orm) = setup();
    let taylor = user(&orm, "taylor").await;
    let admin = orm.create("Role", doc! { "name": "admin" }).await.unwrap();
    let editor = orm.create("Role", doc! { "name": "editor" }).await.unwrap();

    let mut roles = taylor.relation("roles").unwrap();
    roles.attach(&admin).await.unwrap();
    roles.attach(editor.key().cloned().unwrap()).await.unwrap();
    // attaching twice keeps one link
    roles.attach(&admin).await.unwrap();
    assert_eq!(roles.related_ids().len(), 2);

    let stored = orm.find("User", taylor.key().unwrap()).await.unwrap().unwrap();
    assert_eq!(
        stored.get_attribute("role_id"),
        Some(Bson::Array(vec![
            admin.key().cloned().unwrap(),
            editor.key().cloned().unwrap()
        ]))
    );

    let loaded = stored.relation("roles").unwrap().get(&[]).await.unwrap();
    assert_eq!(names(&loaded, "name"), vec!["admin", "editor"]);

    let reverse = admin.relation("users").unwrap();
    assert_eq!(reverse.foreign_key(), "role_id");

    assert_eq!(roles.detach(&admin).await.unwrap(), 1);
    let admin = orm.find("Role", admin.key().unwrap()).await.unwrap().unwrap();
    assert_eq!(admin.get_attribute("user_id"), Some(Bson::Array(Vec::new())));
    assert_eq!(roles.related_ids(), vec![editor.key().cloned().unwrap()]);
}

#[tokio::test]
async fn test_sync_attaches_and_detaches_the_difference() {
    let (_, orm) = setup();
    let taylor = user(&orm, "taylor").await;
    let mut ids = Vec::new();
    for name in ["r1", "r2", "r3", "r4"] {
        let role = orm.create("Role", doc! { "name": name }).await.unwrap();
        ids.push(role.key().cloned().unwrap());
    }

    let mut roles = taylor.relation("roles").unwrap();
    roles.sync(ids[0..3].to_vec()).await.unwrap();

    let changes = roles.sync(ids[1..4].to_vec()).await.unwrap();
    assert_eq!(
        changes,
        SyncChanges {
            attached: vec![ids[3].clone()],
            detached: vec![ids[0].clone()],
        }
    );

    let linked = roles.get(&[]).await.unwrap();
    assert_eq!(names(&linked, "name"), vec!["r2", "r3", "r4"]);
    let taylor = roles.into_parent();
    assert_eq!(
        taylor.get_attribute("role_id"),
        Some(Bson::Array(ids[1..4].to_vec()))
    );
    assert!(!taylor.is_dirty());
}

#[tokio::test]
async fn test_belongs_to_many_eager_load() {
    let (_, orm) = setup();
    let a = user(&orm, "a").await;
    let b = user(&orm, "b").await;
    user(&orm, "c").await;

    let mut role = orm.model("Role").unwrap();
    role.set_attribute("name", "shared");
    for parent in [&a, &b] {
        parent.relation("roles").unwrap().save(&mut role).await.unwrap();
    }
    let mut solo = orm.new_instance("Role", doc! { "name": "solo" }).unwrap();
    a.relation("roles").unwrap().save(&mut solo).await.unwrap();

    let mut query = orm.with("User", &["roles"]).unwrap();
    query.order_by("name", 1);
    let users = query.get(&[]).await.unwrap();
    let counts: Vec<usize> = users
        .iter()
        .map(|u| u.get_relation("roles").map_or(0, RelationValue::len))
        .collect();
    assert_eq!(counts, vec![2, 1, 0]);
}

// ==================== Polymorphic ====================

#[tokio::test]
async fn test_morph_many_and_morph_to() {
    let (_, orm) = setup();
    let taylor = user(&orm, "taylor").await;

    let mut photos = taylor.relation("photos").unwrap();
    let photo = photos.create(doc! { "url": "a.png" }).await.unwrap();
    photos.create(doc! { "url": "b.png" }).await.unwrap();
    assert_eq!(photo.get_attribute("imageable_type"), Some(Bson::from("User")));
    assert_eq!(photo.get_attribute("imageable_id"), taylor.key().cloned());

    // a photo with the same id under another type is not matched
    let mut foreign = orm.model("Photo").unwrap();
    foreign
        .set_attribute("url", "c.png")
        .set_attribute("imageable_id", taylor.key().cloned().unwrap())
        .set_attribute("imageable_type", "Post");
    foreign.save().await.unwrap();

    assert_eq!(photos.get(&[]).await.unwrap().len(), 2);

    let users = orm.with("User", &["photos", "avatar"]).unwrap().get(&[]).await.unwrap();
    assert_eq!(users[0].get_relation("photos").map(RelationValue::len), Some(2));
    assert!(users[0].get_relation("avatar").and_then(RelationValue::as_one).is_some());

    let owner = photo.relation("imageable").unwrap().first(&[]).await.unwrap().unwrap();
    assert_eq!(owner.name(), "User");
    assert_eq!(owner.key(), taylor.key());

    let err = orm.with("Photo", &["imageable"]).unwrap().get(&[]).await.unwrap_err();
    assert_eq!(err.code, quarry_query::ErrorCode::InvalidParameter);
}
