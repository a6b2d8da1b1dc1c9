//! The model query builder.
//!
//! [`ModelQuery`] wraps a [`QueryBuilder`] and returns hydrated
//! [`Model`]s instead of documents. It adds eager loading, soft-delete
//! scoping, timestamped bulk updates and named scopes.
//!
//! ## Eager loading
//!
//! ```rust,ignore
//! let users = orm
//!     .query("User")?
//!     .with(&["posts.comments", "roles"])
//!     .with_constraint("posts", |q| { q.where_gt("votes", 10); })
//!     .get(&[])
//!     .await?;
//! ```
//!
//! Each relation is loaded with one query for the whole result set and
//! matched back onto the parents. Dotted names load nested relations on the
//! related models.

use std::fmt;
use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use quarry_query::{
    Conditions, Expression, IntoObjectId, Logic, Page, QueryBuilder, QueryError, QueryResult,
    Records, SortDirection, WhereValue, quarry_debug,
};

use crate::meta::{Constraint, DELETED_AT, UPDATED_AT};
use crate::model::{Model, fresh_timestamp};
use crate::relations::Relation;

/// The outcome of [`ModelQuery::call`].
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    /// A scope was applied; keep chaining on the same query.
    Chain,
    /// A pass-through method returned a value.
    Value(Bson),
}

/// A query returning models.
#[derive(Clone)]
pub struct ModelQuery {
    query: QueryBuilder,
    model: Model,
    eager_load: IndexMap<String, Constraint>,
}

impl ModelQuery {
    /// Wrap a query builder for a model.
    pub fn new(query: QueryBuilder, model: Model) -> Self {
        Self {
            query,
            model,
            eager_load: IndexMap::new(),
        }
    }

    /// The underlying query builder.
    pub fn query(&self) -> &QueryBuilder {
        &self.query
    }

    /// Mutable access to the underlying query builder.
    pub fn query_mut(&mut self) -> &mut QueryBuilder {
        &mut self.query
    }

    /// Unwrap the query builder.
    pub fn into_query(self) -> QueryBuilder {
        self.query
    }

    /// The blank model instance results are hydrated from.
    pub fn model(&self) -> &Model {
        &self.model
    }

    // ==================== Query state ====================

    /// Fix the projection.
    pub fn select(&mut self, fields: &[&str]) -> &mut Self {
        self.query.select(fields);
        self
    }

    /// Add an ordering.
    pub fn order_by(
        &mut self,
        field: impl Into<String>,
        direction: impl Into<SortDirection>,
    ) -> &mut Self {
        self.query.order_by(field, direction);
        self
    }

    /// Skip `n` results.
    pub fn skip(&mut self, n: u64) -> &mut Self {
        self.query.skip(n);
        self
    }

    /// Limit the results.
    pub fn take(&mut self, n: i64) -> &mut Self {
        self.query.take(n);
        self
    }

    /// Window the results to a page.
    pub fn for_page(&mut self, page: u64, per_page: u64) -> &mut Self {
        self.query.for_page(page, per_page);
        self
    }

    /// Cache the results.
    pub fn remember(&mut self, minutes: u64, key: Option<&str>) -> &mut Self {
        self.query.remember(minutes, key);
        self
    }

    // ==================== Reading ====================

    /// The model with the given id.
    pub async fn find(&self, id: impl IntoObjectId, fields: &[&str]) -> QueryResult<Option<Model>> {
        let id = id.into_object_id()?;
        let mut query = self.clone();
        query.r#where(self.model.meta().get_key_name(), id);
        query.first(fields).await
    }

    /// The model with the given id, or a not-found error.
    pub async fn find_or_fail(&self, id: impl IntoObjectId, fields: &[&str]) -> QueryResult<Model> {
        let id = id.into_object_id()?;
        self.find(id, fields)
            .await?
            .ok_or_else(|| QueryError::not_found(self.model.name()))
    }

    /// The models with the given ids.
    pub async fn find_many<I>(&self, ids: I, fields: &[&str]) -> QueryResult<Vec<Model>>
    where
        I: IntoIterator,
        I::Item: IntoObjectId,
    {
        let ids = ids
            .into_iter()
            .map(IntoObjectId::into_object_id)
            .collect::<QueryResult<Vec<ObjectId>>>()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = self.clone();
        query.where_in(self.model.meta().get_key_name(), ids);
        query.get(fields).await
    }

    /// The first match.
    pub async fn first(&self, fields: &[&str]) -> QueryResult<Option<Model>> {
        let mut query = self.clone();
        query.take(1);
        Ok(query.get(fields).await?.into_iter().next())
    }

    /// The first match, or a not-found error.
    pub async fn first_or_fail(&self, fields: &[&str]) -> QueryResult<Model> {
        self.first(fields)
            .await?
            .ok_or_else(|| QueryError::not_found(self.model.name()))
    }

    /// Every match, with the requested relations loaded.
    pub async fn get(&self, fields: &[&str]) -> QueryResult<Vec<Model>> {
        let mut models = self.get_models(fields).await?;
        if !models.is_empty() {
            self.eager_load_relations(&mut models).await?;
        }
        Ok(models)
    }

    /// Every match, without eager loading.
    pub async fn get_models(&self, fields: &[&str]) -> QueryResult<Vec<Model>> {
        let documents = self.query.get(fields).await?.into_vec().await?;
        Ok(self.hydrate(documents))
    }

    fn hydrate(&self, documents: Vec<Document>) -> Vec<Model> {
        documents
            .into_iter()
            .map(|document| self.model.new_from_builder(document))
            .collect()
    }

    /// One attribute of the first match, through its accessor.
    pub async fn pluck(&self, field: &str) -> QueryResult<Option<Bson>> {
        Ok(self
            .first(&[field])
            .await?
            .and_then(|model| model.get_attribute(field)))
    }

    /// A page of models. The page size defaults to the model's.
    ///
    /// A remembered query caches the page, not the total.
    pub async fn paginate(&self, per_page: Option<u64>, fields: &[&str]) -> QueryResult<Page<Model>> {
        let per_page = per_page.unwrap_or_else(|| self.model.meta().get_per_page());
        let paginator = self.query.connection().paginator();

        let mut query = self.query.clone();
        query.for_page(paginator.current_page(), per_page);
        let documents = query.get(fields).await?.into_vec().await?;
        let total = self.query.get_fresh(fields)?.count_all().await?;

        let mut models = self.hydrate(documents);
        if !models.is_empty() {
            self.eager_load_relations(&mut models).await?;
        }
        Ok(paginator.make(models, total, per_page))
    }

    // ==================== Writing ====================

    fn add_updated_at(&self, mut values: Document) -> Document {
        if self.model.meta().uses_timestamps() && !values.contains_key(UPDATED_AT) {
            values.insert(UPDATED_AT, fresh_timestamp());
        }
        values
    }

    /// `$set` fields on every match, stamping `updated_at`.
    pub async fn update(&self, values: Document) -> QueryResult<u64> {
        self.query.update(self.add_updated_at(values)).await
    }

    /// Increment a field on every match, stamping `updated_at`.
    pub async fn increment(
        &self,
        field: &str,
        amount: impl Into<Bson>,
        extra: Option<Document>,
    ) -> QueryResult<u64> {
        let extra = self.add_updated_at(extra.unwrap_or_default());
        let extra = (!extra.is_empty()).then_some(extra);
        self.query.increment(field, amount, extra).await
    }

    /// Decrement a field on every match, stamping `updated_at`.
    pub async fn decrement(
        &self,
        field: &str,
        amount: impl Into<Bson>,
        extra: Option<Document>,
    ) -> QueryResult<u64> {
        let extra = self.add_updated_at(extra.unwrap_or_default());
        let extra = (!extra.is_empty()).then_some(extra);
        self.query.decrement(field, amount, extra).await
    }

    /// Delete every match; soft-deleting models set `deleted_at` instead.
    pub async fn delete(&self) -> QueryResult<u64> {
        if self.model.meta().is_soft_deleting() {
            return self.update(doc! { DELETED_AT: fresh_timestamp() }).await;
        }
        self.query.delete().await
    }

    /// Remove every match, even for soft-deleting models.
    pub async fn force_delete(&self) -> QueryResult<u64> {
        self.query.delete().await
    }

    /// Clear `deleted_at` on every match, trashed ones included.
    pub async fn restore(&self) -> QueryResult<u64> {
        if !self.model.meta().is_soft_deleting() {
            return Ok(0);
        }
        let mut query = self.clone();
        query.with_trashed();
        query.update(doc! { DELETED_AT: Bson::Null }).await
    }

    // ==================== Soft deletes ====================

    /// Include soft-deleted models.
    pub fn with_trashed(&mut self) -> &mut Self {
        self.query
            .wheres_mut()
            .retain(|clause| !clause.is_null_check(DELETED_AT));
        self
    }

    /// Only soft-deleted models.
    pub fn only_trashed(&mut self) -> &mut Self {
        self.with_trashed();
        self.where_not_null(DELETED_AT);
        self
    }

    // ==================== Eager loading ====================

    /// Eager load relations; dotted names load nested relations.
    pub fn with(&mut self, relations: &[&str]) -> &mut Self {
        for name in relations {
            self.add_nested_withs(name);
            self.eager_load
                .entry(name.to_string())
                .or_insert_with(noop_constraint);
        }
        self
    }

    /// Eager load a relation with extra conditions.
    pub fn with_constraint<F>(&mut self, relation: &str, constraint: F) -> &mut Self
    where
        F: Fn(&mut ModelQuery) + Send + Sync + 'static,
    {
        self.add_nested_withs(relation);
        self.eager_load
            .insert(relation.to_string(), Arc::new(constraint));
        self
    }

    // "a.b.c" also loads "a" and "a.b".
    fn add_nested_withs(&mut self, name: &str) {
        let segments: Vec<&str> = name.split('.').collect();
        for end in 1..segments.len() {
            let prefix = segments[..end].join(".");
            self.eager_load.entry(prefix).or_insert_with(noop_constraint);
        }
    }

    /// The relations to eager load, with their constraints.
    pub fn eager_loads(&self) -> &IndexMap<String, Constraint> {
        &self.eager_load
    }

    /// Replace the relations to eager load.
    pub fn set_eager_loads(&mut self, eager_load: IndexMap<String, Constraint>) -> &mut Self {
        self.eager_load = eager_load;
        self
    }

    /// Load every top-level relation requested through `with` onto `models`.
    pub fn eager_load_relations<'a>(
        &'a self,
        models: &'a mut [Model],
    ) -> BoxFuture<'a, QueryResult<()>> {
        async move {
            for (name, constraint) in &self.eager_load {
                if name.contains('.') {
                    continue;
                }
                quarry_debug!(model = %self.model.name(), relation = %name, "eager loading");
                self.load_relation(models, name, constraint).await?;
            }
            Ok(())
        }
        .boxed()
    }

    async fn load_relation(
        &self,
        models: &mut [Model],
        name: &str,
        constraint: &Constraint,
    ) -> QueryResult<()> {
        let mut relation = self.get_relation(name)?;
        relation.add_eager_constraints(models);
        constraint(relation.query_mut());

        relation.init_relation(models, name);
        let results = relation.get_eager().await?;
        relation.match_models(models, results, name);
        Ok(())
    }

    /// An unconstrained relation that eager loads the nested relations
    /// requested under `name`.
    pub fn get_relation(&self, name: &str) -> QueryResult<Relation> {
        let mut relation = Relation::eager(&self.model, name)?;
        let nested = self.nested_relations(name);
        if !nested.is_empty() {
            relation.query_mut().set_eager_loads(nested);
        }
        Ok(relation)
    }

    fn nested_relations(&self, relation: &str) -> IndexMap<String, Constraint> {
        let prefix = format!("{}.", relation);
        self.eager_load
            .iter()
            .filter_map(|(name, constraint)| {
                name.strip_prefix(&prefix)
                    .map(|nested| (nested.to_string(), Arc::clone(constraint)))
            })
            .collect()
    }

    // ==================== Dispatch ====================

    /// Apply a scope registered on the model.
    pub fn scope(&mut self, name: &str, args: &[Bson]) -> QueryResult<&mut Self> {
        let scope = self.model.meta().get_scope(name).cloned().ok_or_else(|| {
            QueryError::invalid_input(name, format!("model {} has no scope '{}'", self.model.name(), name))
        })?;
        scope(self, args);
        Ok(self)
    }

    /// Call a method by name: a scope, or one of the query builder methods
    /// passed through for their value (`lists`, `insert`, `batchInsert`,
    /// `save`, `pluck`, `count`, `min`, `max`, `avg`, `sum`, `exists`).
    pub async fn call(&mut self, method: &str, args: &[Bson]) -> QueryResult<CallResult> {
        if self.model.meta().get_scope(method).is_some() {
            self.scope(method, args)?;
            return Ok(CallResult::Chain);
        }

        let value = match method {
            "lists" => Bson::Array(self.query.lists(str_arg(method, args)?).await?),
            "insert" => self
                .query
                .insert(document_arg(method, args)?)
                .await?
                .unwrap_or(Bson::Null),
            "batchInsert" => self
                .query
                .batch_insert(records_arg(method, args)?)
                .await?
                .map_or(Bson::Null, Bson::Array),
            "save" => self
                .query
                .save(document_arg(method, args)?)
                .await?
                .unwrap_or(Bson::Null),
            "pluck" => self
                .query
                .pluck(str_arg(method, args)?)
                .await?
                .unwrap_or(Bson::Null),
            "count" => {
                let count = self.query.count().await?;
                Bson::Int64(i64::try_from(count).unwrap_or(i64::MAX))
            }
            "min" | "max" | "avg" | "sum" => {
                self.query.aggregate(method, str_arg(method, args)?).await?
            }
            "exists" => Bson::Boolean(self.query.exists().await?),
            _ => {
                return Err(QueryError::invalid_input(
                    method,
                    format!("call to undefined method {}::{}", self.model.name(), method),
                ));
            }
        };
        Ok(CallResult::Value(value))
    }
}

fn noop_constraint() -> Constraint {
    Arc::new(|_: &mut ModelQuery| {})
}

fn str_arg<'a>(method: &str, args: &'a [Bson]) -> QueryResult<&'a str> {
    args.first()
        .and_then(Bson::as_str)
        .ok_or_else(|| QueryError::invalid_input(method, "expected a field name argument"))
}

fn document_arg(method: &str, args: &[Bson]) -> QueryResult<Document> {
    args.first()
        .and_then(Bson::as_document)
        .cloned()
        .ok_or_else(|| QueryError::invalid_input(method, "expected a document argument"))
}

fn records_arg(method: &str, args: &[Bson]) -> QueryResult<Records> {
    match args.first() {
        Some(Bson::Document(document)) => Ok(Records::from(document.clone())),
        Some(Bson::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_document().cloned().ok_or_else(|| {
                    QueryError::invalid_input(method, "expected an array of documents")
                })
            })
            .collect::<QueryResult<Vec<Document>>>()
            .map(Records::from),
        _ => Err(QueryError::invalid_input(method, "expected documents to insert")),
    }
}

impl Conditions for ModelQuery {
    fn push_where(&mut self, field: String, value: WhereValue, logic: Logic) -> &mut Self {
        self.query.push_where(field, value, logic);
        self
    }

    fn push_nested(&mut self, expression: Expression, logic: Logic) -> &mut Self {
        self.query.push_nested(expression, logic);
        self
    }

    fn nested_builder(&self) -> QueryBuilder {
        self.query.new_query()
    }
}

impl fmt::Debug for ModelQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelQuery")
            .field("model", &self.model.name())
            .field("collection", &self.query.collection_name())
            .field("wheres", self.query.wheres())
            .field("eager_load", &self.eager_load.keys().collect::<Vec<_>>())
            .finish()
    }
}
