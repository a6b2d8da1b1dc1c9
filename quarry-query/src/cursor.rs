//! Result cursors.
//!
//! A [`Cursor`] is returned by [`QueryBuilder::get`](crate::QueryBuilder::get).
//! A live cursor holds the compiled find request and only reaches the server
//! when it is counted or materialized, so `sort`, `skip` and `limit` can still
//! be chained onto it. A cursor built from cached results holds the document
//! list itself and applies the same modifiers in memory.

use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};
use tracing::debug;

use crate::driver::{CollectionHandle, FindQuery};
use crate::error::QueryResult;
use crate::memory::{apply_window, sort_documents};

enum Source {
    Live {
        handle: Arc<dyn CollectionHandle>,
        query: FindQuery,
    },
    Materialized(Vec<Document>),
}

/// A query result.
pub struct Cursor {
    source: Source,
}

impl Cursor {
    /// A cursor over a find request that has not run yet.
    pub fn live(handle: Arc<dyn CollectionHandle>, query: FindQuery) -> Self {
        Self {
            source: Source::Live { handle, query },
        }
    }

    /// A cursor over documents already in memory.
    pub fn materialized(documents: Vec<Document>) -> Self {
        Self {
            source: Source::Materialized(documents),
        }
    }

    /// Whether the results are already in memory.
    pub fn is_materialized(&self) -> bool {
        matches!(self.source, Source::Materialized(_))
    }

    /// The underlying find request, `None` for materialized results.
    pub fn query(&self) -> Option<&FindQuery> {
        match &self.source {
            Source::Live { query, .. } => Some(query),
            Source::Materialized(_) => None,
        }
    }

    /// Number of results, honouring skip and limit.
    pub async fn count(&self) -> QueryResult<u64> {
        match &self.source {
            Source::Live { handle, query } => handle.count(query, true).await,
            Source::Materialized(documents) => Ok(documents.len() as u64),
        }
    }

    /// Number of matches ignoring skip and limit.
    ///
    /// Materialized results only know their own length.
    pub async fn count_all(&self) -> QueryResult<u64> {
        match &self.source {
            Source::Live { handle, query } => handle.count(query, false).await,
            Source::Materialized(documents) => Ok(documents.len() as u64),
        }
    }

    /// Materialize every result.
    pub async fn to_vec(&self) -> QueryResult<Vec<Document>> {
        match &self.source {
            Source::Live { handle, query } => {
                debug!(collection = %handle.name(), filter = %query.filter, "find");
                handle.find(query).await
            }
            Source::Materialized(documents) => Ok(documents.clone()),
        }
    }

    /// Consume the cursor and materialize every result.
    pub async fn into_vec(self) -> QueryResult<Vec<Document>> {
        match self.source {
            Source::Live { handle, query } => handle.find(&query).await,
            Source::Materialized(documents) => Ok(documents),
        }
    }

    /// The first result, if any.
    pub async fn first(&self) -> QueryResult<Option<Document>> {
        Ok(self.to_vec().await?.into_iter().next())
    }

    /// The results as relaxed extended JSON values.
    pub async fn to_object(&self) -> QueryResult<Vec<serde_json::Value>> {
        Ok(self
            .to_vec()
            .await?
            .into_iter()
            .map(|doc| Bson::Document(doc).into_relaxed_extjson())
            .collect())
    }

    /// The results as a relaxed extended JSON array.
    pub async fn to_json(&self) -> QueryResult<String> {
        Ok(serde_json::to_string(&self.to_object().await?)?)
    }

    /// Replace the sort order.
    pub fn sort(self, sort: Document) -> Self {
        match self.source {
            Source::Live { handle, mut query } => {
                query.sort = Some(sort);
                Self::live(handle, query)
            }
            Source::Materialized(mut documents) => {
                sort_documents(&mut documents, &sort);
                Self::materialized(documents)
            }
        }
    }

    /// Skip the first `n` results.
    pub fn skip(self, n: u64) -> Self {
        match self.source {
            Source::Live { handle, mut query } => {
                query.skip = Some(n);
                Self::live(handle, query)
            }
            Source::Materialized(documents) => {
                Self::materialized(apply_window(documents, Some(n), None))
            }
        }
    }

    /// Return at most `n` results.
    pub fn limit(self, n: i64) -> Self {
        match self.source {
            Source::Live { handle, mut query } => {
                query.limit = Some(n);
                Self::live(handle, query)
            }
            Source::Materialized(documents) => {
                Self::materialized(apply_window(documents, None, Some(n)))
            }
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Live { handle, query } => f
                .debug_struct("Cursor")
                .field("collection", &handle.name())
                .field("query", query)
                .finish(),
            Source::Materialized(documents) => f
                .debug_struct("Cursor")
                .field("materialized", &documents.len())
                .finish(),
        }
    }
}
