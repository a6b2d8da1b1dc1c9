//! Named connection management.
//!
//! [`DatabaseManager`] resolves connection names to [`Connection`]s. A
//! connection is built the first time its name is requested, from the
//! matching entry of a [`DatabaseConfig`], and reused afterwards.
//!
//! ```rust
//! use std::sync::Arc;
//! use quarry_mongodb::{DatabaseConfig, DatabaseManager, MongoConfig};
//! use quarry_query::memory::MemoryDatabase;
//! use quarry_query::{Connection, ConnectionResolver};
//!
//! let config = DatabaseConfig::single(MongoConfig::new("localhost", "app"));
//! let manager = DatabaseManager::new(config);
//!
//! // Route the default connection to an in-memory database.
//! manager.extend("mongodb", |name, config| {
//!     let database = Arc::new(MemoryDatabase::new(&config.database));
//!     Ok(Connection::new(name, database))
//! });
//!
//! let connection = manager.connection(None).unwrap();
//! assert_eq!(connection.database_name(), "app");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use quarry_query::{Connection, ConnectionResolver, Paginator, QueryResult};
use tracing::{debug, info};

use crate::client::MongoClient;
use crate::config::{DatabaseConfig, MongoConfig};

/// Builds a connection for a name and its configuration.
pub type ConnectionFactory =
    Arc<dyn Fn(&str, &MongoConfig) -> QueryResult<Connection> + Send + Sync>;

type PaginatorFactory = Arc<dyn Fn() -> Arc<dyn Paginator> + Send + Sync>;

/// Creates and caches connections by name.
pub struct DatabaseManager {
    config: RwLock<DatabaseConfig>,
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    extensions: RwLock<HashMap<String, ConnectionFactory>>,
    paginator: RwLock<Option<PaginatorFactory>>,
}

impl DatabaseManager {
    /// Create a manager over a set of named configurations.
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config: RwLock::new(config),
            connections: RwLock::new(HashMap::new()),
            extensions: RwLock::new(HashMap::new()),
            paginator: RwLock::new(None),
        }
    }

    /// Register a custom factory for a connection name.
    ///
    /// The factory replaces the MongoDB client for that name. Connections
    /// already created are kept until [`reconnect`](Self::reconnect).
    pub fn extend<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&str, &MongoConfig) -> QueryResult<Connection> + Send + Sync + 'static,
    {
        self.extensions.write().insert(name.into(), Arc::new(factory));
    }

    /// Set the paginator factory installed on every connection created
    /// from now on.
    pub fn set_paginator<F>(&self, factory: F)
    where
        F: Fn() -> Arc<dyn Paginator> + Send + Sync + 'static,
    {
        *self.paginator.write() = Some(Arc::new(factory));
    }

    /// Change the default connection name.
    pub fn set_default_connection(&self, name: impl Into<String>) {
        self.config.write().default = name.into();
    }

    /// Drop the cached connection so the next request rebuilds it.
    pub fn disconnect(&self, name: Option<&str>) {
        let name = self.resolve_name(name);
        if self.connections.write().remove(&name).is_some() {
            info!(connection = %name, "MongoDB connection closed");
        }
    }

    /// Rebuild a connection.
    pub fn reconnect(&self, name: Option<&str>) -> QueryResult<Arc<Connection>> {
        let name = self.resolve_name(name);
        self.disconnect(Some(&name));
        self.connection(Some(&name))
    }

    /// Names of the connections created so far.
    pub fn connected(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn resolve_name(&self, name: Option<&str>) -> String {
        match name {
            Some(name) => name.to_string(),
            None => self.config.read().default.clone(),
        }
    }

    fn make_connection(&self, name: &str) -> QueryResult<Connection> {
        let config = self.config.read().connection(name)?.clone();

        let extension = self.extensions.read().get(name).cloned();
        if let Some(factory) = extension {
            debug!(connection = %name, "using custom connection factory");
            return factory(name, &config);
        }

        let client = MongoClient::new(config).map_err(quarry_query::QueryError::from)?;
        Ok(Connection::new(name, Arc::new(client.database_handle())))
    }

    fn prepare(&self, connection: Connection) -> Connection {
        if let Some(factory) = self.paginator.read().clone() {
            connection.set_paginator(move || factory());
        }
        connection
    }
}

impl ConnectionResolver for DatabaseManager {
    fn connection(&self, name: Option<&str>) -> QueryResult<Arc<Connection>> {
        let name = self.resolve_name(name);

        if let Some(connection) = self.connections.read().get(&name) {
            return Ok(Arc::clone(connection));
        }

        let connection = Arc::new(self.prepare(self.make_connection(&name)?));
        info!(
            connection = %name,
            database = %connection.database_name(),
            "MongoDB connection established"
        );

        // A concurrent request may have won the race; keep the first.
        let mut connections = self.connections.write();
        Ok(Arc::clone(connections.entry(name).or_insert(connection)))
    }

    fn default_connection(&self) -> String {
        self.config.read().default.clone()
    }
}

impl fmt::Debug for DatabaseManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseManager")
            .field("default", &self.config.read().default)
            .field("connected", &self.connected())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_query::FixedPaginator;
    use quarry_query::memory::MemoryDatabase;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> DatabaseManager {
        let config = DatabaseConfig::single(MongoConfig::new("localhost", "app"))
            .with_connection("archive", MongoConfig::new("archive.internal", "archive"));
        let manager = DatabaseManager::new(config);
        for name in ["mongodb", "archive"] {
            manager.extend(name, |name, config| {
                Ok(Connection::new(name, Arc::new(MemoryDatabase::new(&config.database))))
            });
        }
        manager
    }

    #[test]
    fn test_default_connection() {
        let manager = manager();
        assert_eq!(manager.default_connection(), "mongodb");
        let connection = manager.connection(None).unwrap();
        assert_eq!(connection.name(), "mongodb");
        assert_eq!(connection.database_name(), "app");
    }

    #[test]
    fn test_connections_are_cached() {
        let manager = manager();
        let a = manager.connection(Some("archive")).unwrap();
        let b = manager.connection(Some("archive")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.connected(), vec!["archive".to_string()]);
    }

    #[test]
    fn test_unknown_connection_is_configuration_error() {
        let err = manager().connection(Some("reports")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_reconnect_builds_a_new_connection() {
        let manager = manager();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        manager.extend("mongodb", move |name, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Connection::new(name, Arc::new(MemoryDatabase::new("app"))))
        });

        let first = manager.connection(None).unwrap();
        let second = manager.reconnect(None).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        manager.disconnect(None);
        assert!(manager.connected().is_empty());
    }

    #[test]
    fn test_set_default_connection() {
        let manager = manager();
        manager.set_default_connection("archive");
        assert_eq!(manager.connection(None).unwrap().database_name(), "archive");
    }

    #[test]
    fn test_paginator_is_installed() {
        let manager = manager();
        manager.set_paginator(|| Arc::new(FixedPaginator::new(3)));
        assert_eq!(manager.connection(None).unwrap().paginator().current_page(), 3);
    }
}
