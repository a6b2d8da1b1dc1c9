//! The seam between builders and a MongoDB driver.
//!
//! Builders never talk to a client directly. They compile their state into
//! documents and hand those to a [`CollectionHandle`]. `quarry-mongodb`
//! implements the handle over the official driver; [`crate::memory`] provides
//! an in-process implementation.
//!
//! Write commands report success through [`CommandResult::ok`] rather than an
//! `Err`: a command the server rejected is a result, a transport failure is an
//! error. Callers decide which of the two they surface.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::error::QueryResult;

/// A compiled `find` request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    /// Filter document.
    pub filter: Document,
    /// Projection document.
    pub projection: Option<Document>,
    /// Sort document.
    pub sort: Option<Document>,
    /// Documents to skip.
    pub skip: Option<u64>,
    /// Maximum documents to return.
    pub limit: Option<i64>,
}

impl FindQuery {
    /// Create a query for the given filter.
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

/// The legacy `group` command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupCommand {
    /// Fields to group by.
    pub key: Document,
    /// Initial aggregation document.
    pub initial: Document,
    /// JavaScript reduce function.
    pub reduce: String,
    /// Filter applied before grouping.
    pub condition: Document,
    /// Optional JavaScript finalize function.
    pub finalize: Option<String>,
}

/// Outcome of a driver command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandResult {
    /// Whether the server accepted the command.
    pub ok: bool,
    /// Documents affected.
    pub n: u64,
    /// Result rows (aggregation).
    pub result: Vec<Document>,
    /// Returned value (group).
    pub retval: Option<Bson>,
    /// Server error message when not ok.
    pub errmsg: Option<String>,
}

impl CommandResult {
    /// A successful command affecting no documents.
    pub fn success() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    /// A successful command affecting `n` documents.
    pub fn affected(n: u64) -> Self {
        Self {
            ok: true,
            n,
            ..Self::default()
        }
    }

    /// A failed command.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            errmsg: Some(message.into()),
            ..Self::default()
        }
    }

    /// Attach result rows.
    pub fn with_result(mut self, result: Vec<Document>) -> Self {
        self.result = result;
        self
    }

    /// Attach a returned value.
    pub fn with_retval(mut self, retval: Bson) -> Self {
        self.retval = Some(retval);
        self
    }
}

/// Operations on one collection.
#[async_trait]
pub trait CollectionHandle: Send + Sync {
    /// The collection name.
    fn name(&self) -> &str;

    /// Run a find and materialize the results.
    async fn find(&self, query: &FindQuery) -> QueryResult<Vec<Document>>;

    /// Count matches; `windowed` applies the query's skip and limit.
    async fn count(&self, query: &FindQuery, windowed: bool) -> QueryResult<u64>;

    /// Insert one document. The document carries its `_id`.
    async fn insert(&self, document: Document) -> QueryResult<CommandResult>;

    /// Insert many documents.
    async fn batch_insert(&self, documents: Vec<Document>) -> QueryResult<CommandResult>;

    /// Replace the document with the same `_id`, inserting when absent.
    async fn save(&self, document: Document) -> QueryResult<CommandResult>;

    /// Apply an update document to the first or all matches.
    async fn update(
        &self,
        filter: Document,
        update: Document,
        multiple: bool,
    ) -> QueryResult<CommandResult>;

    /// Remove all matches.
    async fn remove(&self, filter: Document) -> QueryResult<CommandResult>;

    /// Drop the collection.
    async fn drop_collection(&self) -> QueryResult<CommandResult>;

    /// Distinct values of a field among matches.
    async fn distinct(&self, field: &str, filter: Document) -> QueryResult<Vec<Bson>>;

    /// Run an aggregation pipeline.
    async fn aggregate(&self, pipeline: Vec<Document>) -> QueryResult<CommandResult>;

    /// Run the legacy group command.
    async fn group(&self, command: GroupCommand) -> QueryResult<CommandResult>;
}

/// A database: a name and a source of collection handles.
pub trait DatabaseHandle: Send + Sync {
    /// The database name.
    fn name(&self) -> &str;

    /// Get a handle to the named collection.
    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_command_result_constructors() {
        assert!(CommandResult::success().ok);
        assert_eq!(CommandResult::affected(3).n, 3);

        let failed = CommandResult::failed("exception: ns not found");
        assert!(!failed.ok);
        assert_eq!(failed.errmsg.as_deref(), Some("exception: ns not found"));

        let rows = CommandResult::success().with_result(vec![doc! { "sum": 4 }]);
        assert_eq!(rows.result.len(), 1);
    }

    #[test]
    fn test_find_query_new() {
        let query = FindQuery::new(doc! { "a": 1 });
        assert_eq!(query.filter, doc! { "a": 1 });
        assert!(query.sort.is_none());
        assert!(query.limit.is_none());
    }
}
