//! Query result caching.
//!
//! [`QueryBuilder::remember`](crate::QueryBuilder::remember) routes reads
//! through a [`CacheManager`]. The manager is a get-or-populate primitive:
//! on a miss the producer runs and its materialized result list is stored.
//! Two callers racing on the same miss may both run the producer; the later
//! write wins.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::QueryResult;

/// A get-or-populate cache for query results.
#[async_trait]
pub trait CacheManager: Send + Sync {
    /// Return the cached value for `key`, or run `producer` and cache its
    /// output for `minutes`.
    async fn remember(
        &self,
        key: &str,
        minutes: u64,
        producer: BoxFuture<'_, QueryResult<Vec<Document>>>,
    ) -> QueryResult<Vec<Document>>;

    /// Remove a key. Returns whether it was present.
    fn forget(&self, key: &str) -> bool;
}

struct CacheEntry {
    documents: Vec<Document>,
    // `None` never expires.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process cache store.
#[derive(Default)]
pub struct MemoryCacheManager {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheManager {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.read().values().filter(|e| !e.is_expired()).count()
    }

    /// Whether the cache holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry.
    pub fn flush(&self) {
        self.entries.write().clear();
    }

    /// Evict expired entries, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired());
        before - entries.len()
    }

    fn lookup(&self, key: &str) -> Option<Vec<Document>> {
        self.entries
            .read()
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.documents.clone())
    }
}

#[async_trait]
impl CacheManager for MemoryCacheManager {
    async fn remember(
        &self,
        key: &str,
        minutes: u64,
        producer: BoxFuture<'_, QueryResult<Vec<Document>>>,
    ) -> QueryResult<Vec<Document>> {
        if let Some(documents) = self.lookup(key) {
            debug!(key = %key, "Cache hit");
            return Ok(documents);
        }

        debug!(key = %key, minutes, "Cache miss");
        let documents = producer.await?;
        self.entries.write().insert(
            key.to_string(),
            CacheEntry {
                documents: documents.clone(),
                expires_at: Instant::now()
                    .checked_add(Duration::from_secs(minutes.saturating_mul(60))),
            },
        );
        Ok(documents)
    }

    fn forget(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }
}

/// Derive the cache key of a query from its connection and compiled state.
///
/// The projection only contributes when the caller chose fields.
pub fn cache_key(
    connection: &str,
    filter: &Document,
    projection: Option<&Document>,
    sort: Option<&Document>,
    skip: Option<u64>,
    limit: Option<i64>,
) -> String {
    let mut parts = vec![format!("{}{}", connection, serialize(filter))];
    if let Some(projection) = projection {
        parts.push(serialize(projection));
    }
    if let Some(sort) = sort {
        parts.push(serialize(sort));
    }
    if let Some(skip) = skip {
        parts.push(format!("skip{}", skip));
    }
    if let Some(limit) = limit {
        parts.push(format!("limit{}", limit));
    }

    hex::encode(Sha256::digest(parts.join(",").as_bytes()))
}

fn serialize(doc: &Document) -> String {
    Bson::Document(doc.clone()).into_relaxed_extjson().to_string()
}
