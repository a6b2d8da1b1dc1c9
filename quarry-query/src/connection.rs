//! Named connections and connection resolution.
//!
//! A [`Connection`] binds a name and a [`DatabaseHandle`] together with the
//! collaborators builders need at execution time: configuration values, a
//! paginator and a cache manager. The paginator and cache are resolved from
//! factories on first use, so they can be swapped before any query runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};
use parking_lot::RwLock;

use crate::builder::QueryBuilder;
use crate::cache::{CacheManager, MemoryCacheManager};
use crate::driver::{CollectionHandle, DatabaseHandle};
use crate::error::{QueryError, QueryResult};
use crate::pagination::{FixedPaginator, Paginator};

type Factory<T> = Box<dyn Fn() -> Arc<T> + Send + Sync>;

enum Slot<T: ?Sized> {
    Pending(Factory<T>),
    Ready(Arc<T>),
}

/// A value produced by a factory the first time it is needed.
struct Deferred<T: ?Sized> {
    slot: RwLock<Slot<T>>,
}

impl<T: ?Sized> Deferred<T> {
    fn new(factory: Factory<T>) -> Self {
        Self {
            slot: RwLock::new(Slot::Pending(factory)),
        }
    }

    fn get(&self) -> Arc<T> {
        if let Slot::Ready(value) = &*self.slot.read() {
            return Arc::clone(value);
        }
        let mut slot = self.slot.write();
        let value = match &*slot {
            Slot::Ready(value) => Arc::clone(value),
            Slot::Pending(factory) => factory(),
        };
        *slot = Slot::Ready(Arc::clone(&value));
        value
    }

    fn set(&self, factory: Factory<T>) {
        *self.slot.write() = Slot::Pending(factory);
    }
}

/// A named database connection.
pub struct Connection {
    name: String,
    database: Arc<dyn DatabaseHandle>,
    config: Document,
    paginator: Deferred<dyn Paginator>,
    cache: Deferred<dyn CacheManager>,
}

impl Connection {
    /// Create a connection over a database handle.
    ///
    /// The paginator defaults to page 1 and the cache to an in-memory store.
    pub fn new(name: impl Into<String>, database: Arc<dyn DatabaseHandle>) -> Self {
        Self {
            name: name.into(),
            database,
            config: Document::new(),
            paginator: Deferred::new(Box::new(|| {
                Arc::new(FixedPaginator::default()) as Arc<dyn Paginator>
            })),
            cache: Deferred::new(Box::new(|| {
                Arc::new(MemoryCacheManager::new()) as Arc<dyn CacheManager>
            })),
        }
    }

    /// Attach configuration values readable through [`Connection::config`].
    pub fn with_config(mut self, config: Document) -> Self {
        self.config = config;
        self
    }

    /// The connection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Arc<dyn DatabaseHandle> {
        &self.database
    }

    /// The name of the underlying database.
    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    /// Get the driver handle of a collection.
    pub fn resolve_collection_handle(&self, name: &str) -> Arc<dyn CollectionHandle> {
        self.database.collection(name)
    }

    /// Start a query against a collection.
    pub fn collection(self: &Arc<Self>, name: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(Arc::clone(self), name)
    }

    /// Read a configuration value.
    pub fn config(&self, key: &str) -> Option<&Bson> {
        self.config.get(key)
    }

    /// The paginator, resolved on first use.
    pub fn paginator(&self) -> Arc<dyn Paginator> {
        self.paginator.get()
    }

    /// Replace the paginator factory.
    pub fn set_paginator<F>(&self, factory: F)
    where
        F: Fn() -> Arc<dyn Paginator> + Send + Sync + 'static,
    {
        self.paginator.set(Box::new(factory));
    }

    /// The cache manager, resolved on first use.
    pub fn cache(&self) -> Arc<dyn CacheManager> {
        self.cache.get()
    }

    /// Replace the cache manager factory.
    pub fn set_cache<F>(&self, factory: F)
    where
        F: Fn() -> Arc<dyn CacheManager> + Send + Sync + 'static,
    {
        self.cache.set(Box::new(factory));
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("database", &self.database.name())
            .finish_non_exhaustive()
    }
}

/// Resolves connections by name.
pub trait ConnectionResolver: Send + Sync {
    /// Get a connection; `None` selects the default connection.
    fn connection(&self, name: Option<&str>) -> QueryResult<Arc<Connection>>;

    /// The default connection name.
    fn default_connection(&self) -> String;
}

/// A resolver over a fixed set of established connections.
#[derive(Debug, Clone)]
pub struct ConnectionMap {
    default: String,
    connections: HashMap<String, Arc<Connection>>,
}

impl ConnectionMap {
    /// Create a map whose default is the given connection.
    pub fn new(default: Arc<Connection>) -> Self {
        let mut connections = HashMap::new();
        let name = default.name().to_string();
        connections.insert(name.clone(), default);
        Self {
            default: name,
            connections,
        }
    }

    /// Add another connection.
    pub fn with(mut self, connection: Arc<Connection>) -> Self {
        self.connections
            .insert(connection.name().to_string(), connection);
        self
    }
}

impl ConnectionResolver for ConnectionMap {
    fn connection(&self, name: Option<&str>) -> QueryResult<Arc<Connection>> {
        let name = name.unwrap_or(&self.default);
        self.connections
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::unknown_connection(name))
    }

    fn default_connection(&self) -> String {
        self.default.clone()
    }
}
