//! Error types for MongoDB operations.

use quarry_query::QueryError;
use thiserror::Error;

/// Result type for MongoDB operations.
pub type MongoResult<T> = Result<T, MongoError>;

/// Errors raised while configuring or talking to MongoDB.
#[derive(Error, Debug)]
pub enum MongoError {
    /// MongoDB driver error.
    #[error("mongodb error: {0}")]
    Driver(#[from] mongodb::error::Error),

    /// BSON serialization error.
    #[error("bson error: {0}")]
    Bson(#[from] bson::ser::Error),

    /// BSON deserialization error.
    #[error("bson deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// A connection name with no configuration.
    #[error("MongoDB [{0}] not configured")]
    NotConfigured(String),

    /// Timeout error.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),
}

impl MongoError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::NotConfigured(_))
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<toml::de::Error> for MongoError {
    fn from(err: toml::de::Error) -> Self {
        MongoError::Config(err.to_string())
    }
}

impl From<MongoError> for QueryError {
    fn from(err: MongoError) -> Self {
        match err {
            MongoError::Driver(e) => {
                let msg = e.to_string();
                if msg.contains("connection") || msg.contains("timed out") {
                    return QueryError::connection(msg).with_source(e);
                }
                QueryError::database(msg).with_source(e)
            }
            MongoError::Bson(e) => QueryError::serialization(e.to_string()),
            MongoError::BsonDe(e) => QueryError::serialization(e.to_string()),
            MongoError::Config(msg) => QueryError::config(msg),
            MongoError::Connection(msg) => QueryError::connection(msg),
            MongoError::NotConfigured(name) => QueryError::unknown_connection(name),
            MongoError::Timeout(ms) => QueryError::timeout(ms),
        }
    }
}
