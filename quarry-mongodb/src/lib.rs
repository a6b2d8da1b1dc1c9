//! # quarry-mongodb
//!
//! MongoDB driver and connection management for the Quarry ORM.
//!
//! This crate provides:
//! - [`MongoConfig`] and [`DatabaseConfig`] for single and named connections,
//!   loadable from TOML
//! - [`MongoClient`], a thin wrapper over the official driver's pooled client
//! - [`MongoCollection`] / [`MongoDatabase`], the driver handles query
//!   builders execute against
//! - [`DatabaseManager`], which creates connections lazily by name
//!
//! ## Example
//!
//! ```rust,no_run
//! use quarry_mongodb::prelude::*;
//! use quarry_query::prelude::*;
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
//!
//!     let manager = DatabaseManager::new(config);
//!     let users = manager.connection(None)?.collection("users");
//!     let admins = users.clone().r#where("role", "admin").count().await?;
//!     println!("{} admins", admins);
//!     Ok(())
//! }
//! ```
//!
//! Creating a client needs a Tokio runtime; the driver starts its server
//! monitors in the background and connects on the first command.

pub mod client;
pub mod collection;
pub mod config;
pub mod error;
pub mod manager;

pub use bson::oid::ObjectId;
pub use bson::{Bson, Document, doc};
pub use client::MongoClient;
pub use collection::{MongoCollection, MongoDatabase};
pub use config::{DatabaseConfig, MongoConfig, MongoConfigBuilder, ReadPreference};
pub use error::{MongoError, MongoResult};
pub use manager::{ConnectionFactory, DatabaseManager};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::client::MongoClient;
    pub use crate::collection::{MongoCollection, MongoDatabase};
    pub use crate::config::{DatabaseConfig, MongoConfig, MongoConfigBuilder, ReadPreference};
    pub use crate::error::{MongoError, MongoResult};
    pub use crate::manager::DatabaseManager;
    pub use bson::oid::ObjectId;
    pub use bson::{Bson, Document, doc};
}
