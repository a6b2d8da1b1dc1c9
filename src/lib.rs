//! # Quarry
//!
//! An Active Record ORM and fluent query builder for MongoDB.
//!
//! Quarry provides:
//! - A fluent query builder compiling where clauses to MongoDB filters
//! - Lazy cursors, update operators, aggregates and pagination
//! - An optional cache in front of read queries
//! - Models with mass assignment, dirty tracking, timestamps, soft deletes
//!   and lifecycle events
//! - Relations (has-one, has-many, belongs-to, belongs-to-many and the
//!   polymorphic variants) with eager loading
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use quarry_orm::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_toml_str(
//!         r#"
//!         [connections.mongodb]
//!         host = "localhost"
//!         database = "app"
//!         "#,
//!     )?;
//!     let orm = Orm::new(Arc::new(DatabaseManager::new(config)));
//!
//!     orm.register(
//!         ModelMeta::new("User")
//!             .fillable(["name", "email"])
//!             .relation("posts", RelationDef::has_many("Post")),
//!     );
//!     orm.register(ModelMeta::new("Post").fillable(["title"]).soft_deletes(true));
//!
//!     let user = orm.create("User", doc! { "name": "Taylor" }).await?;
//!     user.relation("posts")?.create(doc! { "title": "Hello" }).await?;
//!
//!     let mut query = orm.with("User", &["posts"])?;
//!     query.r#where("name", "Taylor");
//!     for user in query.get(&[]).await? {
//!         println!("{}", user.to_json()?);
//!     }
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

/// Query building, clause compilation, cursors and caching.
pub mod query {
    pub use quarry_query::*;
}

/// The MongoDB driver and connection management.
pub mod mongodb {
    pub use quarry_mongodb::*;
}

/// Models, relations and eager loading.
pub mod model {
    pub use quarry_model::*;
}

// Re-export key types at the crate root
pub use quarry_model::{Model, ModelMeta, ModelQuery, Orm, Relation, RelationDef};
pub use quarry_mongodb::{DatabaseConfig, DatabaseManager, MongoConfig};
pub use quarry_query::{Connection, QueryBuilder, QueryError, QueryResult};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use quarry_model::prelude::*;
    pub use quarry_mongodb::{DatabaseConfig, DatabaseManager, MongoConfig};
    pub use quarry_query::ConnectionMap;
}
