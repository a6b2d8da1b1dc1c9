//! Active Record models.
//!
//! A [`Model`] is one document plus the bookkeeping needed to persist it:
//! the attributes as last read or saved (`original`), loaded relations and
//! whether the document exists in its collection.
//!
//! ```rust,no_run
//! # use quarry_model::prelude::*;
//! # async fn demo(orm: std::sync::Arc<Orm>) -> QueryResult<()> {
//! let mut user = orm.new_instance("User", doc! { "name": "Taylor" })?;
//! user.save().await?;
//!
//! user.set_attribute("email", "taylor@example.com");
//! assert!(user.is_dirty());
//! user.save().await?; // $set { email }
//!
//! user.delete().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};
use indexmap::IndexMap;
use quarry_query::{Conditions, QueryBuilder, QueryError, QueryResult};
use tracing::debug;

use crate::builder::ModelQuery;
use crate::events::{ModelEvent, event_name};
use crate::meta::{CREATED_AT, DELETED_AT, ModelMeta, UPDATED_AT};
use crate::naming;
use crate::orm::Orm;
use crate::relations::Relation;

/// The current time as a BSON datetime.
pub fn fresh_timestamp() -> Bson {
    Bson::DateTime(bson::DateTime::now())
}

/// A loaded relation.
#[derive(Debug, Clone)]
pub enum RelationValue {
    /// A to-one relation; `None` when nothing matched.
    One(Option<Box<Model>>),
    /// A to-many relation.
    Many(Vec<Model>),
}

impl RelationValue {
    /// The related model of a to-one relation.
    pub fn as_one(&self) -> Option<&Model> {
        match self {
            Self::One(model) => model.as_deref(),
            Self::Many(_) => None,
        }
    }

    /// The related models of a to-many relation; empty for to-one.
    pub fn as_many(&self) -> &[Model] {
        match self {
            Self::One(_) => &[],
            Self::Many(models) => models,
        }
    }

    /// Number of related models.
    pub fn len(&self) -> usize {
        match self {
            Self::One(model) => usize::from(model.is_some()),
            Self::Many(models) => models.len(),
        }
    }

    /// Whether nothing is related.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The serialized form: a document, null, or an array.
    pub fn to_bson(&self) -> Bson {
        match self {
            Self::One(Some(model)) => Bson::Document(model.to_document()),
            Self::One(None) => Bson::Null,
            Self::Many(models) => {
                Bson::Array(models.iter().map(|m| Bson::Document(m.to_document())).collect())
            }
        }
    }
}

/// One document of a registered model.
#[derive(Clone)]
pub struct Model {
    meta: Arc<ModelMeta>,
    orm: Arc<Orm>,
    attributes: Document,
    original: Document,
    relations: IndexMap<String, RelationValue>,
    exists: bool,
    connection: Option<String>,
}

impl Model {
    /// A blank, unsaved instance.
    pub fn new(orm: Arc<Orm>, meta: Arc<ModelMeta>) -> Self {
        let connection = meta.connection_name().map(str::to_string);
        Self {
            meta,
            orm,
            attributes: Document::new(),
            original: Document::new(),
            relations: IndexMap::new(),
            exists: false,
            connection,
        }
    }

    /// A blank instance of the same model, on the same connection.
    pub fn blank(&self) -> Self {
        let mut model = Self::new(Arc::clone(&self.orm), Arc::clone(&self.meta));
        model.connection = self.connection.clone();
        model
    }

    /// An unsaved instance of the same model filled with `attributes`.
    pub fn new_instance(&self, attributes: Document) -> QueryResult<Self> {
        let mut model = self.blank();
        model.fill(attributes)?;
        Ok(model)
    }

    /// An existing instance for a stored document.
    pub fn new_from_builder(&self, attributes: Document) -> Self {
        let mut model = self.blank();
        model.set_raw_attributes(attributes, true);
        model.exists = true;
        model
    }

    /// The model metadata.
    pub fn meta(&self) -> &Arc<ModelMeta> {
        &self.meta
    }

    /// The registry this model belongs to.
    pub fn orm(&self) -> &Arc<Orm> {
        &self.orm
    }

    /// The model name.
    pub fn name(&self) -> &str {
        self.meta.name()
    }

    /// Whether the document is stored.
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// The connection name, `None` for the default connection.
    pub fn get_connection_name(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    /// Use another connection for this instance.
    pub fn set_connection(&mut self, name: impl Into<String>) -> &mut Self {
        self.connection = Some(name.into());
        self
    }

    /// The key value.
    pub fn key(&self) -> Option<&Bson> {
        self.attributes.get(self.meta.get_key_name())
    }

    // ==================== Attributes ====================

    /// An attribute, passed through its accessor when one is registered.
    pub fn get_attribute(&self, key: &str) -> Option<Bson> {
        let value = self.attributes.get(key);
        match self.meta.get_accessor(key) {
            Some(accessor) => Some(accessor(value.unwrap_or(&Bson::Null))),
            None => value.cloned(),
        }
    }

    /// An attribute as stored.
    pub fn get_raw_attribute(&self, key: &str) -> Option<&Bson> {
        self.attributes.get(key)
    }

    /// Set an attribute, passing it through its mutator when one is
    /// registered.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        let key = key.into();
        let value = match self.meta.get_mutator(&key) {
            Some(mutator) => mutator(value.into()),
            None => value.into(),
        };
        self.attributes.insert(key, value);
        self
    }

    /// Remove an attribute; saving an existing model `$unset`s it.
    pub fn unset_attribute(&mut self, key: &str) -> &mut Self {
        self.attributes.remove(key);
        self
    }

    /// Whether an attribute is present.
    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    // Changes an attribute without making it dirty.
    pub(crate) fn set_persisted_attribute(&mut self, key: impl Into<String>, value: Bson) {
        let key = key.into();
        self.attributes.insert(key.clone(), value.clone());
        self.original.insert(key, value);
    }

    /// All attributes as stored.
    pub fn attributes(&self) -> &Document {
        &self.attributes
    }

    /// Replace the attributes without mutators or mass-assignment checks.
    pub fn set_raw_attributes(&mut self, attributes: Document, sync: bool) -> &mut Self {
        self.attributes = attributes;
        if sync {
            self.sync_original();
        }
        self
    }

    /// An attribute as last read or saved.
    pub fn get_original(&self, key: &str) -> Option<&Bson> {
        self.original.get(key)
    }

    /// Every attribute as last read or saved.
    pub fn original(&self) -> &Document {
        &self.original
    }

    /// Mark the current attributes as persisted.
    pub fn sync_original(&mut self) -> &mut Self {
        self.original = self.attributes.clone();
        self
    }

    /// Whether any attribute changed since the last sync.
    pub fn is_dirty(&self) -> bool {
        !self.get_dirty().is_empty() || !self.removed_attributes().is_empty()
    }

    /// Whether one attribute changed since the last sync.
    pub fn is_dirty_attribute(&self, key: &str) -> bool {
        self.attributes.get(key) != self.original.get(key)
    }

    /// Attributes added or changed since the last sync.
    pub fn get_dirty(&self) -> Document {
        self.attributes
            .iter()
            .filter(|(key, value)| self.original.get(key.as_str()) != Some(value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn removed_attributes(&self) -> Vec<String> {
        self.original
            .keys()
            .filter(|key| !self.attributes.contains_key(key.as_str()))
            .cloned()
            .collect()
    }

    // ==================== Mass assignment ====================

    fn is_fillable(&self, key: &str) -> bool {
        self.orm.is_unguarded() || self.meta.is_fillable(key)
    }

    /// Set the mass-assignable attributes of `attributes`.
    ///
    /// On a totally guarded model any key that is not fillable is an error,
    /// and nothing is assigned. Otherwise keys that are not fillable are
    /// skipped.
    pub fn fill(&mut self, attributes: Document) -> QueryResult<&mut Self> {
        if self.meta.is_totally_guarded() && !self.orm.is_unguarded() {
            if let Some(key) = attributes.keys().find(|key| !self.is_fillable(key)) {
                return Err(QueryError::mass_assignment(self.name(), key.as_str()));
            }
        }

        for (key, value) in attributes {
            if self.is_fillable(&key) {
                self.set_attribute(key, value);
            }
        }
        Ok(self)
    }

    /// Set every attribute of `attributes`, ignoring mass-assignment rules.
    pub fn force_fill(&mut self, attributes: Document) -> &mut Self {
        for (key, value) in attributes {
            self.set_attribute(key, value);
        }
        self
    }

    // ==================== Queries ====================

    fn builder(&self) -> QueryResult<QueryBuilder> {
        let connection = self.orm.connection(self.connection.as_deref())?;
        Ok(QueryBuilder::new(connection, self.meta.collection()))
    }

    /// A query without the soft-delete constraint.
    pub fn new_base_query(&self) -> QueryResult<ModelQuery> {
        Ok(ModelQuery::new(self.builder()?, self.blank()))
    }

    /// A query for this model; soft-deleted documents are excluded.
    pub fn new_query(&self) -> QueryResult<ModelQuery> {
        let mut query = self.new_base_query()?;
        if self.meta.is_soft_deleting() {
            query.where_null(DELETED_AT);
        }
        Ok(query)
    }

    // Targets this document by key.
    pub(crate) fn key_query(&self) -> QueryResult<QueryBuilder> {
        let key_name = self.meta.get_key_name();
        let key = self.key().cloned().ok_or_else(|| {
            QueryError::invalid_input(key_name, "no primary key defined on model")
                .with_model(self.name())
        })?;
        let mut query = self.builder()?;
        query.r#where(key_name, key);
        Ok(query)
    }

    // ==================== Events ====================

    fn fire_until(&self, event: ModelEvent) -> bool {
        self.orm
            .dispatcher()
            .until(&event_name(event, self.name()), self)
    }

    fn fire(&self, event: ModelEvent) {
        self.orm
            .dispatcher()
            .fire(&event_name(event, self.name()), self);
    }

    // ==================== Persistence ====================

    /// Insert or update the document.
    ///
    /// Returns `false` when a listener cancelled the save or the server
    /// rejected the write.
    pub async fn save(&mut self) -> QueryResult<bool> {
        if !self.fire_until(ModelEvent::Saving) {
            return Ok(false);
        }

        let saved = if self.exists {
            self.perform_update().await?
        } else {
            self.perform_insert().await?
        };

        if saved {
            self.fire(ModelEvent::Saved);
            self.sync_original();
        }
        Ok(saved)
    }

    async fn perform_update(&mut self) -> QueryResult<bool> {
        if !self.is_dirty() {
            return Ok(true);
        }
        if !self.fire_until(ModelEvent::Updating) {
            return Ok(false);
        }
        if self.meta.uses_timestamps() {
            self.update_timestamps();
        }

        let key_name = self.meta.get_key_name();
        let mut dirty = self.get_dirty();
        dirty.remove(key_name);
        let removed: Vec<String> = self
            .removed_attributes()
            .into_iter()
            .filter(|key| key != key_name)
            .collect();

        let mut update = Document::new();
        if !dirty.is_empty() {
            update.insert("$set", dirty);
        }
        if !removed.is_empty() {
            let unset: Document = removed.into_iter().map(|key| (key, Bson::from(""))).collect();
            update.insert("$unset", unset);
        }

        if !update.is_empty() {
            debug!(model = %self.name(), update = %update, "updating model");
            self.key_query()?.perform_update(update).await?;
        }

        self.fire(ModelEvent::Updated);
        Ok(true)
    }

    async fn perform_insert(&mut self) -> QueryResult<bool> {
        if !self.fire_until(ModelEvent::Creating) {
            return Ok(false);
        }
        if self.meta.uses_timestamps() {
            self.update_timestamps();
        }

        let Some(id) = self.builder()?.insert(self.attributes.clone()).await? else {
            return Ok(false);
        };
        if !self.attributes.contains_key("_id") {
            self.attributes.insert("_id", id);
        }
        self.exists = true;
        debug!(model = %self.name(), "model inserted");

        self.fire(ModelEvent::Created);
        Ok(true)
    }

    // A value the caller set explicitly is kept.
    fn update_timestamps(&mut self) {
        let time = fresh_timestamp();
        if !self.is_dirty_attribute(UPDATED_AT) {
            self.attributes.insert(UPDATED_AT, time.clone());
        }
        if !self.exists && !self.is_dirty_attribute(CREATED_AT) {
            self.attributes.insert(CREATED_AT, time);
        }
    }

    /// Fill and save.
    pub async fn update(&mut self, attributes: Document) -> QueryResult<bool> {
        self.fill(attributes)?;
        self.save().await
    }

    /// Save with a fresh `updated_at`.
    pub async fn touch(&mut self) -> QueryResult<bool> {
        if !self.meta.uses_timestamps() {
            return Ok(false);
        }
        self.attributes.insert(UPDATED_AT, fresh_timestamp());
        self.save().await
    }

    /// Delete the document; soft-deleting models only set `deleted_at`.
    ///
    /// Returns `false` for unsaved models and when a listener cancelled.
    pub async fn delete(&mut self) -> QueryResult<bool> {
        self.perform_delete(false).await
    }

    /// Remove the document even when the model soft deletes.
    pub async fn force_delete(&mut self) -> QueryResult<bool> {
        self.perform_delete(true).await
    }

    async fn perform_delete(&mut self, force: bool) -> QueryResult<bool> {
        if !self.exists {
            return Ok(false);
        }
        let query = self.key_query()?;
        if !self.fire_until(ModelEvent::Deleting) {
            return Ok(false);
        }

        if self.meta.is_soft_deleting() && !force {
            let time = fresh_timestamp();
            query.update(bson::doc! { DELETED_AT: time.clone() }).await?;
            self.attributes.insert(DELETED_AT, time.clone());
            self.original.insert(DELETED_AT, time);
        } else {
            query.delete().await?;
        }
        self.exists = false;
        debug!(model = %self.name(), force, "model deleted");

        self.fire(ModelEvent::Deleted);
        Ok(true)
    }

    /// Clear `deleted_at` and save. Returns `false` for models that do not
    /// soft delete.
    pub async fn restore(&mut self) -> QueryResult<bool> {
        if !self.meta.is_soft_deleting() {
            return Ok(false);
        }
        if !self.fire_until(ModelEvent::Restoring) {
            return Ok(false);
        }

        self.attributes.insert(DELETED_AT, Bson::Null);
        self.exists = true;
        let restored = self.save().await?;

        if restored {
            self.fire(ModelEvent::Restored);
        }
        Ok(restored)
    }

    /// Whether the model is soft deleted.
    pub fn trashed(&self) -> bool {
        self.meta.is_soft_deleting()
            && self
                .attributes
                .get(DELETED_AT)
                .is_some_and(|value| *value != Bson::Null)
    }

    // ==================== Relations ====================

    /// A relation query constrained to this model.
    pub fn relation(&self, name: &str) -> QueryResult<Relation> {
        Relation::lazy(self, name)
    }

    /// Load and cache a relation unless it is already loaded.
    pub async fn related(&mut self, name: &str) -> QueryResult<&RelationValue> {
        if !self.relations.contains_key(name) {
            let value = self.relation(name)?.get_results().await?;
            self.relations.insert(name.to_string(), value);
        }
        self.relations
            .get(name)
            .ok_or_else(|| QueryError::internal(format!("relation '{}' was not loaded", name)))
    }

    /// Eager load relations onto this model, dotted names included.
    pub async fn load(&mut self, relations: &[&str]) -> QueryResult<&mut Self> {
        let mut query = self.new_query()?;
        query.with(relations);
        let mut models = vec![self.clone()];
        query.eager_load_relations(&mut models).await?;
        if let Some(loaded) = models.pop() {
            self.relations = loaded.relations;
        }
        Ok(self)
    }

    /// A loaded relation.
    pub fn get_relation(&self, name: &str) -> Option<&RelationValue> {
        self.relations.get(name)
    }

    /// Whether a relation is loaded.
    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Every loaded relation.
    pub fn relations(&self) -> &IndexMap<String, RelationValue> {
        &self.relations
    }

    /// Store a loaded relation.
    pub fn set_relation(&mut self, name: impl Into<String>, value: RelationValue) -> &mut Self {
        self.relations.insert(name.into(), value);
        self
    }

    // ==================== Serialization ====================

    fn is_visible(&self, key: &str) -> bool {
        let visible = self.meta.get_visible();
        if !visible.is_empty() && !visible.iter().any(|v| v == key) {
            return false;
        }
        !self.meta.get_hidden().iter().any(|h| h == key)
    }

    /// Attributes and loaded relations, honouring hidden/visible and
    /// accessors.
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        for key in self.attributes.keys() {
            if !self.is_visible(key) {
                continue;
            }
            if let Some(value) = self.get_attribute(key) {
                document.insert(key.clone(), value);
            }
        }

        for (name, value) in &self.relations {
            if !self.is_visible(name) {
                continue;
            }
            let key = if self.meta.uses_snake_attributes() {
                naming::snake(name)
            } else {
                name.clone()
            };
            document.insert(key, value.to_bson());
        }
        document
    }

    /// [`Model::to_document`] as relaxed extended JSON.
    pub fn to_value(&self) -> serde_json::Value {
        Bson::Document(self.to_document()).into_relaxed_extjson()
    }

    /// [`Model::to_document`] as a relaxed extended JSON string.
    pub fn to_json(&self) -> QueryResult<String> {
        Ok(serde_json::to_string(&self.to_value())?)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.meta.name())
            .field("attributes", &self.attributes)
            .field("exists", &self.exists)
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
