//! # quarry-query
//!
//! Fluent MongoDB query builder for the Quarry ORM.
//!
//! This crate provides:
//! - The clause model and the expression compiler that turns accumulated
//!   conditions into `$and`/`$or`/`$nor` filter documents
//! - [`QueryBuilder`] with ordering, windowing, projection, reads,
//!   aggregates, writes and update operators
//! - [`Cursor`], a uniform view over live and cached results
//! - Result caching through a [`CacheManager`]
//! - The driver seam ([`CollectionHandle`], [`DatabaseHandle`]) plus an
//!   in-memory implementation for tests
//!
//! ## Conditions
//!
//! The first condition without explicit logic joins whichever bucket the
//! others use; later ones default to `$and`:
//!
//! ```rust
//! use std::sync::Arc;
//! use bson::doc;
//! use quarry_query::prelude::*;
//! use quarry_query::memory::MemoryDatabase;
//!
//! let connection = Arc::new(Connection::new("mongodb", Arc::new(MemoryDatabase::new("app"))));
//!
//! let mut query = connection.collection("users");
//! query.r#where("name", "john").or_where("name", "jane");
//! assert_eq!(
//!     query.compile_wheres().unwrap(),
//!     doc! { "$or": [{ "name": "john" }, { "name": "jane" }] }
//! );
//!
//! let mut query = connection.collection("users");
//! query
//!     .r#where("email", "x")
//!     .and_where_group(|q| {
//!         q.r#where("age", 27).and_where("name", "J");
//!     });
//! assert_eq!(
//!     query.compile_wheres().unwrap(),
//!     doc! { "$and": [{ "email": "x" }, { "$and": [{ "age": 27 }, { "name": "J" }] }] }
//! );
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use quarry_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::ambiguous_root();
//! assert_eq!(err.code, ErrorCode::InvalidConfiguration);
//! assert!(err.is_configuration());
//! ```

pub mod builder;
pub mod cache;
pub mod clause;
pub mod conditions;
pub mod connection;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod expression;
pub mod id;
pub mod logging;
pub mod memory;
pub mod operators;
pub mod pagination;

pub use builder::{QueryBuilder, Records, SortDirection};
pub use cache::{CacheManager, MemoryCacheManager, cache_key};
pub use clause::{Clause, Logic, WhereValue};
pub use conditions::Conditions;
pub use connection::{Connection, ConnectionMap, ConnectionResolver};
pub use cursor::Cursor;
pub use driver::{CollectionHandle, CommandResult, DatabaseHandle, FindQuery, GroupCommand};
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult};
pub use expression::Expression;
pub use id::{IntoObjectId, key_string};
pub use pagination::{FixedPaginator, Page, Paginator};

// Re-export logging utilities
pub use logging::{get_log_format, get_log_level, init as init_logging, init_debug, init_with_level, is_debug_enabled};

// Re-export for macros
#[doc(hidden)]
pub use tracing;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::builder::{QueryBuilder, Records, SortDirection};
    pub use crate::clause::{Logic, WhereValue};
    pub use crate::conditions::Conditions;
    pub use crate::connection::{Connection, ConnectionResolver};
    pub use crate::cursor::Cursor;
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::id::IntoObjectId;
    pub use crate::pagination::{Page, Paginator};
}
