//! Error types for query and model operations.
//!
//! Every error carries an [`ErrorCode`] for programmatic handling, a message,
//! and an [`ErrorContext`] describing what was being attempted.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: P{category}{number}
//! - 1xxx: Query errors (not found, mass assignment)
//! - 3xxx: Connection errors
//! - 5xxx: Execution errors (invalid parameter, driver command failure)
//! - 6xxx: Data errors (serialization)
//! - 7xxx: Configuration errors
//!
//! ```rust
//! use quarry_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::not_found("User");
//! assert_eq!(err.code, ErrorCode::RecordNotFound);
//! assert!(err.to_string().starts_with("[P1001]"));
//! ```

use std::fmt;

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Query errors (1xxx)
    /// Record not found (P1001).
    RecordNotFound = 1001,
    /// Invalid filter or where clause (P1003).
    InvalidFilter = 1003,
    /// Guarded attribute filled without unguarding (P1006).
    MassAssignment = 1006,

    // Connection errors (3xxx)
    /// Database connection failed (P3001).
    ConnectionFailed = 3001,
    /// Connection timeout (P3003).
    ConnectionTimeout = 3003,

    // Query execution errors (5xxx)
    /// Query timeout (P5001).
    QueryTimeout = 5001,
    /// Invalid parameter (P5003).
    InvalidParameter = 5003,
    /// Command reported failure (P5005).
    DatabaseError = 5005,

    // Data errors (6xxx)
    /// Serialization error (P6002).
    SerializationError = 6002,

    // Configuration errors (7xxx)
    /// Invalid configuration (P7001).
    InvalidConfiguration = 7001,
    /// Missing configuration (P7002).
    MissingConfiguration = 7002,

    // Internal errors (9xxx)
    /// Internal error (P9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "P1001").
    pub fn code(&self) -> String {
        format!("P{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::RecordNotFound => "Record not found",
            Self::InvalidFilter => "Invalid filter condition",
            Self::MassAssignment => "Mass assignment violation",
            Self::ConnectionFailed => "Database connection failed",
            Self::ConnectionTimeout => "Connection timeout",
            Self::QueryTimeout => "Query timeout",
            Self::InvalidParameter => "Invalid parameter",
            Self::DatabaseError => "Database error",
            Self::SerializationError => "Serialization error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::MissingConfiguration => "Missing configuration",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The model involved.
    pub model: Option<String>,
    /// The field involved.
    pub field: Option<String>,
    /// The collection involved.
    pub collection: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<String>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors that can occur during query operations.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(suggestion.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context.model = Some(model.into());
        self
    }

    /// Set the field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Set the collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.context.collection = Some(collection.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create a not found error.
    pub fn not_found(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("No {} record found matching the query", model),
        )
        .with_model(&model)
        .with_suggestion("Use find() or first() to get None instead of an error")
    }

    /// Create a mass assignment error for a guarded attribute.
    pub fn mass_assignment(model: impl Into<String>, field: impl Into<String>) -> Self {
        let model = model.into();
        let field = field.into();
        Self::new(
            ErrorCode::MassAssignment,
            format!("Cannot mass assign {} on {}: the model is guarded", field, model),
        )
        .with_model(&model)
        .with_field(&field)
        .with_suggestion(format!("Add {} to the fillable attributes", field))
        .with_help("Call Orm::unguard() to disable mass assignment protection")
    }

    /// Create the error raised when a filter cannot place its first clause.
    pub fn ambiguous_root() -> Self {
        Self::new(
            ErrorCode::InvalidConfiguration,
            "More than one logical operator found on root",
        )
        .with_context("compile_wheres")
        .with_suggestion("Start the query with where() before adding or_where()/nor_where()")
        .with_help("A first where() clause joins the single logical operator used at the root")
    }

    /// Create an unknown connection error.
    pub fn unknown_connection(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::MissingConfiguration,
            format!("Database connection [{}] not configured", name),
        )
        .with_suggestion(format!("Add a [connections.{}] section to the configuration", name))
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let message = message.into();
        Self::new(
            ErrorCode::InvalidParameter,
            format!("Invalid input for {}: {}", field, message),
        )
        .with_field(&field)
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::ConnectionFailed, format!("Connection error: {}", message))
            .with_suggestion("Check that the MongoDB server is running")
            .with_suggestion("Verify the host and port in the connection configuration")
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::new(
            ErrorCode::QueryTimeout,
            format!("Query timed out after {}ms", duration_ms),
        )
    }

    /// Create a database error for a command that reported failure.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message.into())
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message.into())
            .with_help("This is likely a bug in Quarry - please report it")
    }

    // ============== Predicates ==============

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::RecordNotFound
    }

    /// Check if this is a mass assignment error.
    pub fn is_mass_assignment(&self) -> bool {
        self.code == ErrorCode::MassAssignment
    }

    /// Check if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::InvalidConfiguration | ErrorCode::MissingConfiguration
        )
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConnectionFailed | ErrorCode::ConnectionTimeout
        )
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::QueryTimeout | ErrorCode::ConnectionTimeout
        )
    }

    /// Render the error with its suggestions and help text.
    pub fn display_full(&self) -> String {
        let mut out = format!("Error [{}]: {}", self.code.code(), self.message);
        if let Some(ref model) = self.context.model {
            out.push_str(&format!("\n  model: {}", model));
        }
        if let Some(ref field) = self.context.field {
            out.push_str(&format!("\n  field: {}", field));
        }
        for suggestion in &self.context.suggestions {
            out.push_str(&format!("\n  suggestion: {}", suggestion));
        }
        if let Some(ref help) = self.context.help {
            out.push_str(&format!("\n  help: {}", help));
        }
        out
    }
}

impl From<bson::oid::Error> for QueryError {
    fn from(err: bson::oid::Error) -> Self {
        QueryError::invalid_input("_id", err.to_string()).with_source(err)
    }
}

impl From<bson::ser::Error> for QueryError {
    fn from(err: bson::ser::Error) -> Self {
        QueryError::serialization(err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::serialization(err.to_string()).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::RecordNotFound.code(), "P1001");
        assert_eq!(ErrorCode::InvalidConfiguration.code(), "P7001");
        assert_eq!(ErrorCode::MassAssignment.to_string(), "P1006");
    }

    #[test]
    fn test_not_found_error() {
        let err = QueryError::not_found("User");
        assert!(err.is_not_found());
        assert_eq!(err.context.model.as_deref(), Some("User"));
        assert!(err.to_string().contains("No User record"));
    }

    #[test]
    fn test_mass_assignment_error() {
        let err = QueryError::mass_assignment("User", "role");
        assert!(err.is_mass_assignment());
        assert_eq!(err.context.field.as_deref(), Some("role"));
    }

    #[test]
    fn test_configuration_errors() {
        assert!(QueryError::ambiguous_root().is_configuration());
        assert!(QueryError::unknown_connection("archive").is_configuration());
        assert!(!QueryError::database("group failed").is_configuration());
    }

    #[test]
    fn test_invalid_object_id_conversion() {
        let err: QueryError = bson::oid::ObjectId::parse_str("nope").unwrap_err().into();
        assert_eq!(err.code, ErrorCode::InvalidParameter);
        assert_eq!(err.context.field.as_deref(), Some("_id"));
    }

    #[test]
    fn test_display_full() {
        let err = QueryError::mass_assignment("User", "role");
        let full = err.display_full();
        assert!(full.contains("P1006"));
        assert!(full.contains("suggestion: Add role to the fillable attributes"));
        assert!(full.contains("help:"));
    }
}
