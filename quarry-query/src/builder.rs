//! The fluent Query Builder.
//!
//! A [`QueryBuilder`] is bound to a [`Connection`] and a collection name.
//! Condition methods come from the [`Conditions`] trait; ordering, windowing
//! and projection live here, as do the terminal operations that compile the
//! accumulated state and hand it to the collection's driver handle.
//!
//! ```rust,ignore
//! use quarry_query::prelude::*;
//!
//! let mut query = connection.collection("users");
//! query
//!     .where_gte("age", 18)
//!     .or_where("role", "admin")
//!     .order_by("name", "asc")
//!     .take(20);
//!
//! let users = query.get(&["name", "email"]).await?.to_vec().await?;
//! let total = query.count().await?;
//! ```
//!
//! Mutators take `&mut self` and return `&mut Self` for chaining; terminal
//! operations take `&self` and leave the builder untouched.

use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use tracing::{debug, warn};

use crate::cache::cache_key;
use crate::clause::{Clause, Logic, WhereValue};
use crate::conditions::Conditions;
use crate::connection::Connection;
use crate::cursor::Cursor;
use crate::driver::{CollectionHandle, CommandResult, FindQuery, GroupCommand};
use crate::error::{QueryError, QueryResult};
use crate::expression::Expression;
use crate::id::{IntoObjectId, key_string};
use crate::pagination::Page;

/// A sort direction accepted by [`QueryBuilder::order_by`].
#[derive(Debug, Clone, PartialEq)]
pub enum SortDirection {
    /// `1`
    Asc,
    /// `-1`
    Desc,
    /// Passed to the server unchanged, e.g. `{"$meta": "textScore"}`.
    Raw(Bson),
}

impl SortDirection {
    /// The value placed in the sort document.
    pub fn to_bson(&self) -> Bson {
        match self {
            Self::Asc => Bson::Int32(1),
            Self::Desc => Bson::Int32(-1),
            Self::Raw(value) => value.clone(),
        }
    }
}

impl From<&str> for SortDirection {
    fn from(direction: &str) -> Self {
        match direction {
            "asc" => Self::Asc,
            "desc" => Self::Desc,
            other => Self::Raw(Bson::String(other.to_string())),
        }
    }
}

impl From<String> for SortDirection {
    fn from(direction: String) -> Self {
        Self::from(direction.as_str())
    }
}

impl From<i32> for SortDirection {
    fn from(direction: i32) -> Self {
        match direction {
            1 => Self::Asc,
            -1 => Self::Desc,
            other => Self::Raw(Bson::Int32(other)),
        }
    }
}

impl From<Bson> for SortDirection {
    fn from(direction: Bson) -> Self {
        match direction {
            Bson::String(s) => Self::from(s),
            Bson::Int32(n) => Self::from(n),
            other => Self::Raw(other),
        }
    }
}

/// One document or many, for [`QueryBuilder::batch_insert`].
#[derive(Debug, Clone, PartialEq)]
pub enum Records {
    /// A single document, inserted as a one-element batch.
    One(Document),
    /// A list of documents.
    Many(Vec<Document>),
}

impl Records {
    fn into_vec(self) -> Vec<Document> {
        match self {
            Self::One(document) => vec![document],
            Self::Many(documents) => documents,
        }
    }
}

impl From<Document> for Records {
    fn from(document: Document) -> Self {
        Self::One(document)
    }
}

impl From<Vec<Document>> for Records {
    fn from(documents: Vec<Document>) -> Self {
        Self::Many(documents)
    }
}

/// A query against one collection.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    connection: Arc<Connection>,
    collection: String,
    wheres: Expression,
    columns: Option<Vec<String>>,
    orders: Option<Document>,
    limit: Option<i64>,
    offset: Option<u64>,
    cache_key: Option<String>,
    cache_minutes: Option<u64>,
}

impl QueryBuilder {
    /// Create a builder for a collection.
    pub fn new(connection: Arc<Connection>, collection: impl Into<String>) -> Self {
        Self {
            connection,
            collection: collection.into(),
            wheres: Expression::new(),
            columns: None,
            orders: None,
            limit: None,
            offset: None,
            cache_key: None,
            cache_minutes: None,
        }
    }

    /// The connection this builder runs on.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// The targeted collection.
    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// The driver handle of the targeted collection.
    pub fn handle(&self) -> Arc<dyn CollectionHandle> {
        self.connection.resolve_collection_handle(&self.collection)
    }

    /// Retarget to another collection, discarding all query state.
    pub fn collection(&mut self, name: impl Into<String>) -> &mut Self {
        self.collection = name.into();
        self.reset_query()
    }

    /// Discard conditions, projection, ordering, window and cache settings.
    pub fn reset_query(&mut self) -> &mut Self {
        self.wheres.clear();
        self.columns = None;
        self.orders = None;
        self.limit = None;
        self.offset = None;
        self.cache_key = None;
        self.cache_minutes = None;
        self
    }

    /// A fresh builder on the same connection and collection.
    pub fn new_query(&self) -> QueryBuilder {
        QueryBuilder::new(Arc::clone(&self.connection), self.collection.clone())
    }

    /// The accumulated conditions.
    pub fn wheres(&self) -> &Expression {
        &self.wheres
    }

    /// Mutable access to the accumulated conditions.
    pub fn wheres_mut(&mut self) -> &mut Expression {
        &mut self.wheres
    }

    /// Remove and return the accumulated clauses.
    pub fn take_wheres(&mut self) -> Vec<Clause> {
        self.wheres.take()
    }

    /// Compile the conditions into a filter document.
    pub fn compile_wheres(&self) -> QueryResult<Document> {
        self.wheres.compile()
    }

    /// Fix the projection used by every subsequent read.
    pub fn select<S: AsRef<str>>(&mut self, fields: &[S]) -> &mut Self {
        self.columns = Some(fields.iter().map(|f| f.as_ref().to_string()).collect());
        self
    }

    /// The fixed projection, if any.
    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// Add a sort key. Later keys break ties of earlier ones.
    pub fn order_by(
        &mut self,
        field: impl Into<String>,
        direction: impl Into<SortDirection>,
    ) -> &mut Self {
        self.orders
            .get_or_insert_with(Document::new)
            .insert(field.into(), direction.into().to_bson());
        self
    }

    /// The sort document, if any key was added.
    pub fn orders(&self) -> Option<&Document> {
        self.orders.as_ref()
    }

    /// Skip the first `n` matches.
    pub fn skip(&mut self, n: u64) -> &mut Self {
        self.offset = Some(n);
        self
    }

    /// Return at most `n` matches.
    pub fn take(&mut self, n: i64) -> &mut Self {
        self.limit = Some(n);
        self
    }

    /// Window onto the 1-based `page` of `per_page` documents.
    pub fn for_page(&mut self, page: u64, per_page: u64) -> &mut Self {
        self.skip(page.saturating_sub(1).saturating_mul(per_page))
            .take(i64::try_from(per_page).unwrap_or(i64::MAX))
    }

    /// The skip count, if set.
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// The limit, if set.
    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    /// Cache reads for `minutes`, under `key` or a key derived from the query.
    pub fn remember(&mut self, minutes: u64, key: Option<&str>) -> &mut Self {
        self.cache_minutes = Some(minutes);
        self.cache_key = key.map(str::to_string);
        self
    }

    // ==================== Reading ====================

    /// Run the query, through the cache when [`QueryBuilder::remember`] was
    /// called.
    ///
    /// `fields` is the projection unless [`QueryBuilder::select`] fixed one.
    pub async fn get<S: AsRef<str>>(&self, fields: &[S]) -> QueryResult<Cursor> {
        if self.cache_minutes.is_some() {
            return self.get_cached(fields).await;
        }
        self.get_fresh(fields)
    }

    /// Build a live cursor, bypassing the cache.
    pub fn get_fresh<S: AsRef<str>>(&self, fields: &[S]) -> QueryResult<Cursor> {
        let query = FindQuery {
            filter: self.compile_wheres()?,
            projection: self.prepare_columns(fields),
            sort: self.orders.clone(),
            skip: self.offset,
            limit: self.limit,
        };
        Ok(Cursor::live(self.handle(), query))
    }

    /// Read through the connection's cache manager.
    pub async fn get_cached<S: AsRef<str>>(&self, fields: &[S]) -> QueryResult<Cursor> {
        let key = self.get_cache_key(fields)?;
        let minutes = self.cache_minutes.unwrap_or(0);
        let fresh = self.get_fresh(fields)?;
        let documents = self
            .connection
            .cache()
            .remember(&key, minutes, Box::pin(fresh.into_vec()))
            .await?;
        Ok(Cursor::materialized(documents))
    }

    /// The cache key: the one given to `remember`, or a derived one.
    pub fn get_cache_key<S: AsRef<str>>(&self, fields: &[S]) -> QueryResult<String> {
        match &self.cache_key {
            Some(key) => Ok(key.clone()),
            None => self.generate_cache_key(fields),
        }
    }

    /// Derive a cache key from the connection and the compiled query.
    pub fn generate_cache_key<S: AsRef<str>>(&self, fields: &[S]) -> QueryResult<String> {
        let filter = self.compile_wheres()?;
        let projection = self.prepare_columns(fields);
        Ok(cache_key(
            self.connection.name(),
            &filter,
            projection.as_ref(),
            self.orders.as_ref(),
            self.offset,
            self.limit,
        ))
    }

    /// The first match.
    pub async fn first<S: AsRef<str>>(&self, fields: &[S]) -> QueryResult<Option<Document>> {
        let mut query = self.clone();
        query.take(1);
        query.get(fields).await?.first().await
    }

    /// The document with the given `_id`.
    pub async fn find<S: AsRef<str>>(
        &self,
        id: impl IntoObjectId,
        fields: &[S],
    ) -> QueryResult<Option<Document>> {
        let id = id.into_object_id()?;
        let mut query = self.clone();
        query.r#where("_id", id);
        query.first(fields).await
    }

    /// A single field of the first match.
    pub async fn pluck(&self, field: &str) -> QueryResult<Option<Bson>> {
        Ok(self
            .first(&[field])
            .await?
            .and_then(|mut doc| doc.remove(field)))
    }

    /// A field of every match, skipping documents without it.
    pub async fn lists(&self, field: &str) -> QueryResult<Vec<Bson>> {
        Ok(self
            .get(&[field])
            .await?
            .into_vec()
            .await?
            .into_iter()
            .filter_map(|mut doc| doc.remove(field))
            .collect())
    }

    /// Distinct values of a field. Without a filter the conditions are used.
    pub async fn distinct(&self, field: &str, filter: Option<Document>) -> QueryResult<Vec<Bson>> {
        let filter = match filter {
            Some(filter) if !filter.is_empty() => filter,
            _ => self.compile_wheres()?,
        };
        debug!(collection = %self.collection, field, filter = %filter, "distinct");
        self.handle().distinct(field, filter).await
    }

    /// Distinct values of a field joined with `glue`.
    pub async fn implode(&self, field: &str, glue: Option<&str>) -> QueryResult<String> {
        let values: Vec<String> = self
            .distinct(field, None)
            .await?
            .iter()
            .map(key_string)
            .collect();
        Ok(values.join(glue.unwrap_or("")))
    }

    /// The current page of results, with the total match count.
    ///
    /// The page is read through the cache when `remember` is set; the total
    /// always comes from the server.
    pub async fn paginate<S: AsRef<str>>(
        &self,
        per_page: u64,
        fields: &[S],
    ) -> QueryResult<Page<Document>> {
        let paginator = self.connection.paginator();
        let mut query = self.clone();
        query.for_page(paginator.current_page(), per_page);

        let items = query.get(fields).await?.into_vec().await?;
        let total = self.get_fresh(fields)?.count_all().await?;
        Ok(paginator.make(items, total, per_page))
    }

    /// Number of matches, honouring skip and take.
    pub async fn count(&self) -> QueryResult<u64> {
        self.get::<&str>(&[]).await?.count().await
    }

    /// Whether anything matches.
    pub async fn exists(&self) -> QueryResult<bool> {
        Ok(self.count().await? > 0)
    }

    // ==================== Aggregates ====================

    /// Sum of a field over the matches; `0` when nothing matches.
    pub async fn sum(&self, field: &str) -> QueryResult<Bson> {
        self.aggregate("sum", field).await
    }

    /// Average of a field over the matches; `0` when nothing matches.
    pub async fn avg(&self, field: &str) -> QueryResult<Bson> {
        self.aggregate("avg", field).await
    }

    /// Largest value of a field; `0` when nothing matches.
    pub async fn max(&self, field: &str) -> QueryResult<Bson> {
        self.aggregate("max", field).await
    }

    /// Smallest value of a field; `0` when nothing matches.
    pub async fn min(&self, field: &str) -> QueryResult<Bson> {
        self.aggregate("min", field).await
    }

    /// Run a `$group` accumulator over the matches.
    ///
    /// Degrades to `0` when the command fails or yields no row.
    pub async fn aggregate(&self, function: &str, field: &str) -> QueryResult<Bson> {
        let filter = self.compile_wheres()?;
        let mut pipeline = Vec::with_capacity(2);
        if !filter.is_empty() {
            pipeline.push(doc! { "$match": filter });
        }
        let mut group = doc! { "_id": 0 };
        group.insert(function, doc! { format!("${}", function): format!("${}", field) });
        pipeline.push(doc! { "$group": group });

        debug!(collection = %self.collection, function, field, "aggregate");
        let result = self.handle().aggregate(pipeline).await?;
        if !result.ok {
            self.degraded("aggregate", &result);
            return Ok(Bson::Int32(0));
        }
        Ok(result
            .result
            .into_iter()
            .next()
            .and_then(|mut row| row.remove(function))
            .filter(|value| !matches!(value, Bson::Null))
            .unwrap_or(Bson::Int32(0)))
    }

    /// Run the legacy `group` command with the conditions as its filter.
    ///
    /// Unlike the other commands, a failure here is an error.
    pub async fn group<S: AsRef<str>>(
        &self,
        key: &[S],
        initial: Document,
        reduce: &str,
        finalize: Option<&str>,
    ) -> QueryResult<Bson> {
        let command = GroupCommand {
            key: key.iter().map(|f| (f.as_ref().to_string(), Bson::Int32(1))).collect(),
            initial,
            reduce: reduce.to_string(),
            condition: self.compile_wheres()?,
            finalize: finalize.map(str::to_string),
        };

        debug!(collection = %self.collection, "group");
        let result = self.handle().group(command).await?;
        if !result.ok {
            return Err(QueryError::database(
                result
                    .errmsg
                    .unwrap_or_else(|| "group command failed".to_string()),
            )
            .with_collection(&self.collection)
            .with_context("group"));
        }
        Ok(result.retval.unwrap_or(Bson::Null))
    }

    // ==================== Writes ====================

    /// Insert a document, generating its `_id` when absent.
    ///
    /// Returns the `_id`, or `None` when the server rejected the insert.
    pub async fn insert(&self, mut document: Document) -> QueryResult<Option<Bson>> {
        let id = ensure_id(&mut document);
        debug!(collection = %self.collection, "insert");
        let result = self.handle().insert(document).await?;
        if !result.ok {
            self.degraded("insert", &result);
            return Ok(None);
        }
        Ok(Some(id))
    }

    /// Insert one or many documents, returning their ids.
    pub async fn batch_insert(&self, records: impl Into<Records>) -> QueryResult<Option<Vec<Bson>>> {
        let mut documents = records.into().into_vec();
        let ids: Vec<Bson> = documents.iter_mut().map(ensure_id).collect();
        debug!(collection = %self.collection, count = documents.len(), "batch insert");
        let result = self.handle().batch_insert(documents).await?;
        if !result.ok {
            self.degraded("batch insert", &result);
            return Ok(None);
        }
        Ok(Some(ids))
    }

    /// Replace the document with the same `_id`, inserting it when absent.
    pub async fn save(&self, mut document: Document) -> QueryResult<Option<Bson>> {
        let id = ensure_id(&mut document);
        debug!(collection = %self.collection, "save");
        let result = self.handle().save(document).await?;
        if !result.ok {
            self.degraded("save", &result);
            return Ok(None);
        }
        Ok(Some(id))
    }

    /// Apply an update document to every match.
    ///
    /// Returns the number of updated documents, `0` when the server rejected
    /// the command.
    pub async fn perform_update(&self, update: Document) -> QueryResult<u64> {
        let filter = self.compile_wheres()?;
        debug!(collection = %self.collection, filter = %filter, update = %update, "update");
        let result = self.handle().update(filter, update, true).await?;
        if !result.ok {
            self.degraded("update", &result);
            return Ok(0);
        }
        Ok(result.n)
    }

    /// `$set` the given fields on every match.
    pub async fn update(&self, data: Document) -> QueryResult<u64> {
        self.perform_update(doc! { "$set": data }).await
    }

    /// `$set` one field.
    pub async fn set_field(&self, field: &str, value: impl Into<Bson>) -> QueryResult<u64> {
        self.set_fields(doc! { field: value.into() }).await
    }

    /// `$set` several fields.
    pub async fn set_fields(&self, fields: Document) -> QueryResult<u64> {
        self.perform_update(doc! { "$set": fields }).await
    }

    /// `$unset` one field.
    pub async fn unset_field(&self, field: &str) -> QueryResult<u64> {
        self.unset_fields(&[field]).await
    }

    /// `$unset` several fields.
    pub async fn unset_fields<S: AsRef<str>>(&self, fields: &[S]) -> QueryResult<u64> {
        let unset: Document = fields
            .iter()
            .map(|f| (f.as_ref().to_string(), Bson::Boolean(true)))
            .collect();
        self.perform_update(doc! { "$unset": unset }).await
    }

    /// `$rename` one field.
    pub async fn rename_field(&self, old: &str, new: &str) -> QueryResult<u64> {
        self.perform_update(doc! { "$rename": { old: new } }).await
    }

    /// `$rename` several fields, given as `{old: new}`.
    pub async fn rename_fields(&self, renames: Document) -> QueryResult<u64> {
        self.perform_update(doc! { "$rename": renames }).await
    }

    /// `$inc` a field, optionally `$set`ting `extra` in the same command.
    pub async fn increment(
        &self,
        field: &str,
        amount: impl Into<Bson>,
        extra: Option<Document>,
    ) -> QueryResult<u64> {
        let amount = numeric(field, amount.into())?;
        self.perform_update(increment_document(field, amount, extra))
            .await
    }

    /// `$inc` a field by the negated amount.
    pub async fn decrement(
        &self,
        field: &str,
        amount: impl Into<Bson>,
        extra: Option<Document>,
    ) -> QueryResult<u64> {
        let amount = negate(field, numeric(field, amount.into())?)?;
        self.perform_update(increment_document(field, amount, extra))
            .await
    }

    /// `$push` a value onto an array field.
    pub async fn push(&self, field: &str, value: impl Into<Bson>) -> QueryResult<u64> {
        self.perform_update(doc! { "$push": { field: value.into() } })
            .await
    }

    /// `$push` every value onto an array field.
    pub async fn push_all(&self, field: &str, values: Vec<Bson>) -> QueryResult<u64> {
        self.perform_update(doc! { "$push": { field: { "$each": values } } })
            .await
    }

    /// `$addToSet` a value.
    pub async fn add_to_set(&self, field: &str, value: impl Into<Bson>) -> QueryResult<u64> {
        self.perform_update(doc! { "$addToSet": { field: value.into() } })
            .await
    }

    /// `$pull` a value, or the values matching a condition document.
    pub async fn pull(&self, field: &str, value: impl Into<Bson>) -> QueryResult<u64> {
        self.perform_update(doc! { "$pull": { field: value.into() } })
            .await
    }

    /// `$pullAll` the given values.
    pub async fn pull_all(&self, field: &str, values: Vec<Bson>) -> QueryResult<u64> {
        self.perform_update(doc! { "$pullAll": { field: values } })
            .await
    }

    /// `$pop` the last element (`1`) or the first (`-1`).
    pub async fn pop(&self, field: &str, direction: i32) -> QueryResult<u64> {
        self.perform_update(doc! { "$pop": { field: direction } })
            .await
    }

    /// Remove every match, returning how many were removed.
    pub async fn delete(&self) -> QueryResult<u64> {
        let filter = self.compile_wheres()?;
        debug!(collection = %self.collection, filter = %filter, "remove");
        let result = self.handle().remove(filter).await?;
        if !result.ok {
            self.degraded("remove", &result);
            return Ok(0);
        }
        Ok(result.n)
    }

    /// Alias of [`QueryBuilder::delete`].
    pub async fn remove(&self) -> QueryResult<u64> {
        self.delete().await
    }

    /// Drop the collection.
    pub async fn truncate(&self) -> QueryResult<bool> {
        debug!(collection = %self.collection, "drop");
        let result = self.handle().drop_collection().await?;
        if !result.ok {
            self.degraded("drop", &result);
        }
        Ok(result.ok)
    }

    /// The projection document for a field list.
    ///
    /// Selected fields are included and `_id` is excluded unless selected.
    pub fn prepare_columns<S: AsRef<str>>(&self, fields: &[S]) -> Option<Document> {
        let mut projection = Document::new();
        match &self.columns {
            Some(columns) => {
                for column in columns {
                    projection.insert(column.clone(), 1);
                }
            }
            None => {
                for field in fields {
                    projection.insert(field.as_ref(), 1);
                }
            }
        }
        if projection.is_empty() {
            return None;
        }
        if !projection.contains_key("_id") {
            projection.insert("_id", false);
        }
        Some(projection)
    }

    fn degraded(&self, command: &str, result: &CommandResult) {
        warn!(
            collection = %self.collection,
            command,
            error = result.errmsg.as_deref().unwrap_or("unknown"),
            "command not acknowledged"
        );
    }
}

impl Conditions for QueryBuilder {
    fn push_where(&mut self, field: String, value: WhereValue, logic: Logic) -> &mut Self {
        self.wheres.push_basic(field, value, logic);
        self
    }

    fn push_nested(&mut self, expression: Expression, logic: Logic) -> &mut Self {
        self.wheres.push_nested(expression, logic);
        self
    }

    fn nested_builder(&self) -> QueryBuilder {
        self.new_query()
    }
}

fn ensure_id(document: &mut Document) -> Bson {
    match document.get("_id") {
        Some(id) => id.clone(),
        None => {
            let id = Bson::ObjectId(ObjectId::new());
            document.insert("_id", id.clone());
            id
        }
    }
}

fn numeric(field: &str, amount: Bson) -> QueryResult<Bson> {
    match amount {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => Ok(amount),
        other => Err(QueryError::invalid_input(
            field,
            format!("cannot increment by non-numeric value {}", other),
        )),
    }
}

// `i32::MIN` widens to 64 bits; `i64::MIN` has no negation.
fn negate(field: &str, amount: Bson) -> QueryResult<Bson> {
    match amount {
        Bson::Int32(n) => Ok(n
            .checked_neg()
            .map_or(Bson::Int64(-i64::from(n)), Bson::Int32)),
        Bson::Int64(n) => n.checked_neg().map(Bson::Int64).ok_or_else(|| {
            QueryError::invalid_input(field, format!("cannot decrement by {}", n))
        }),
        Bson::Double(n) => Ok(Bson::Double(-n)),
        other => Ok(other),
    }
}

fn increment_document(field: &str, amount: Bson, extra: Option<Document>) -> Document {
    let mut update = doc! { "$inc": { field: amount } };
    if let Some(extra) = extra.filter(|e| !e.is_empty()) {
        update.insert("$set", extra);
    }
    update
}
