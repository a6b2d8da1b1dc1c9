//! MongoDB client wrapper with built-in connection pooling.

use std::sync::Arc;

use bson::{Document, doc};
use mongodb::{Client, Database};
use tracing::{debug, info};

use crate::collection::MongoDatabase;
use crate::config::MongoConfig;
use crate::error::{MongoError, MongoResult};

/// A MongoDB client bound to one database.
///
/// The driver pools connections internally and only reaches the server on
/// the first command, so creating a client never blocks.
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    database: Database,
    config: Arc<MongoConfig>,
}

impl MongoClient {
    /// Create a new client from configuration.
    pub fn new(config: MongoConfig) -> MongoResult<Self> {
        if config.database.is_empty() {
            return Err(MongoError::config("database name is required"));
        }

        let options = config.to_client_options()?;
        let client = Client::with_options(options)
            .map_err(|e| MongoError::connection(format!("failed to create client: {}", e)))?;
        let database = client.database(&config.database);

        info!(
            host = %config.host,
            port = ?config.port,
            database = %config.database,
            "MongoDB client created"
        );

        Ok(Self {
            client,
            database,
            config: Arc::new(config),
        })
    }

    /// The database as a handle usable by query builders.
    pub fn database_handle(&self) -> MongoDatabase {
        MongoDatabase::new(self.database.clone())
    }

    /// Get the underlying database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Get the underlying MongoDB client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the configuration.
    pub fn config(&self) -> &MongoConfig {
        &self.config
    }

    /// Check if the server answers a ping.
    pub async fn is_healthy(&self) -> bool {
        self.database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .is_ok()
    }

    /// List all collection names in the database.
    pub async fn list_collections(&self) -> MongoResult<Vec<String>> {
        Ok(self.database.list_collection_names(None).await?)
    }

    /// Run a database command.
    pub async fn run_command(&self, command: Document) -> MongoResult<Document> {
        debug!(database = %self.config.database, command = %command, "run_command");
        Ok(self.database.run_command(command, None).await?)
    }
}

impl std::fmt::Debug for MongoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoClient")
            .field("host", &self.config.host)
            .field("database", &self.config.database)
            .finish_non_exhaustive()
    }
}
