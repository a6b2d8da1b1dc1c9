//! # quarry-model
//!
//! Active Record models for the Quarry ORM.
//!
//! This crate provides:
//! - [`ModelMeta`]: per-model configuration (collection, mass assignment,
//!   serialization, timestamps, soft deletes, scopes, relations)
//! - [`Model`]: attributes with dirty tracking, persistence and lifecycle
//!   events
//! - [`ModelQuery`]: a query builder returning models, with eager loading
//! - [`Relation`]: has-one, has-many, belongs-to, belongs-to-many and the
//!   polymorphic variants
//! - [`Orm`]: the registry models resolve each other through
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use quarry_model::prelude::*;
//! use quarry_query::memory::MemoryDatabase;
//! use quarry_query::ConnectionMap;
//!
//! # tokio_test_block_on(async {
//! let connection = Arc::new(Connection::new("mongodb", Arc::new(MemoryDatabase::new("app"))));
//! let orm = Orm::new(Arc::new(ConnectionMap::new(connection)));
//!
//! orm.register(
//!     ModelMeta::new("User")
//!         .fillable(["name"])
//!         .relation("posts", RelationDef::has_many("Post")),
//! );
//! orm.register(ModelMeta::new("Post").fillable(["title"]));
//!
//! let user = orm.create("User", doc! { "name": "Taylor" }).await?;
//! let mut posts = user.relation("posts")?;
//! posts.create(doc! { "title": "Hello" }).await?;
//!
//! let users = orm.with("User", &["posts"])?.get(&[]).await?;
//! assert_eq!(users[0].get_relation("posts").map(RelationValue::len), Some(1));
//! # Ok::<(), QueryError>(())
//! # }).unwrap();
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod builder;
pub mod events;
pub mod meta;
pub mod model;
pub mod naming;
pub mod orm;
pub mod relations;

pub use builder::{CallResult, ModelQuery};
pub use events::{Dispatcher, EventDispatcher, ModelEvent, NullDispatcher};
pub use meta::{ModelMeta, RelationDef, RelationKind};
pub use model::{Model, RelationValue};
pub use orm::Orm;
pub use relations::{RelatedRef, Relation, RelationType, SyncChanges};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::builder::{CallResult, ModelQuery};
    pub use crate::events::{Dispatcher, EventDispatcher, ModelEvent};
    pub use crate::meta::{ModelMeta, RelationDef};
    pub use crate::model::{Model, RelationValue};
    pub use crate::orm::Orm;
    pub use crate::relations::{RelatedRef, Relation, SyncChanges};
    pub use bson::oid::ObjectId;
    pub use bson::{Bson, Document, doc};
    pub use quarry_query::prelude::*;
}
