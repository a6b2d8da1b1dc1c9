//! The model registry.
//!
//! An [`Orm`] ties together the connection resolver, the event dispatcher
//! and the metadata of every registered model. Models look each other up by
//! name through it when resolving relations.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bson::{Bson, Document};
use parking_lot::RwLock;
use quarry_query::{Connection, ConnectionResolver, IntoObjectId, QueryError, QueryResult};
use tracing::debug;

use crate::builder::ModelQuery;
use crate::events::{EventDispatcher, NullDispatcher};
use crate::meta::ModelMeta;
use crate::model::Model;

/// Registry of models sharing a connection resolver and event dispatcher.
pub struct Orm {
    resolver: Arc<dyn ConnectionResolver>,
    dispatcher: Arc<dyn EventDispatcher>,
    models: RwLock<HashMap<String, Arc<ModelMeta>>>,
    unguarded: AtomicBool,
}

impl Orm {
    /// Create a registry without event listeners.
    pub fn new(resolver: Arc<dyn ConnectionResolver>) -> Arc<Self> {
        Self::with_dispatcher(resolver, Arc::new(NullDispatcher))
    }

    /// Create a registry dispatching model events to `dispatcher`.
    pub fn with_dispatcher(
        resolver: Arc<dyn ConnectionResolver>,
        dispatcher: Arc<dyn EventDispatcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            resolver,
            dispatcher,
            models: RwLock::new(HashMap::new()),
            unguarded: AtomicBool::new(false),
        })
    }

    /// Register a model, replacing any earlier registration of the name.
    pub fn register(&self, meta: ModelMeta) -> Arc<ModelMeta> {
        let meta = Arc::new(meta);
        debug!(model = %meta.name(), collection = %meta.collection(), "model registered");
        self.models
            .write()
            .insert(meta.name().to_string(), Arc::clone(&meta));
        meta
    }

    /// Metadata of a registered model.
    pub fn meta(&self, name: &str) -> QueryResult<Arc<ModelMeta>> {
        self.models
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::config(format!("model '{}' is not registered", name)))
    }

    /// Metadata of the model whose morph class is `class`.
    pub fn morph_meta(&self, class: &str) -> QueryResult<Arc<ModelMeta>> {
        let models = self.models.read();
        models
            .values()
            .find(|meta| meta.get_morph_class() == class)
            .or_else(|| models.get(class))
            .cloned()
            .ok_or_else(|| QueryError::config(format!("no model has morph class '{}'", class)))
    }

    /// Names of the registered models, sorted.
    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// The connection resolver.
    pub fn resolver(&self) -> &Arc<dyn ConnectionResolver> {
        &self.resolver
    }

    /// The event dispatcher.
    pub fn dispatcher(&self) -> &Arc<dyn EventDispatcher> {
        &self.dispatcher
    }

    /// Resolve a connection; `None` selects the default one.
    pub fn connection(&self, name: Option<&str>) -> QueryResult<Arc<Connection>> {
        self.resolver.connection(name)
    }

    // ==================== Mass assignment ====================

    /// Disable mass-assignment protection for every model.
    pub fn unguard(&self) {
        self.unguarded.store(true, Ordering::SeqCst);
    }

    /// Re-enable mass-assignment protection.
    pub fn reguard(&self) {
        self.unguarded.store(false, Ordering::SeqCst);
    }

    /// Whether mass-assignment protection is disabled.
    pub fn is_unguarded(&self) -> bool {
        self.unguarded.load(Ordering::SeqCst)
    }

    // ==================== Instances ====================

    /// A blank, unsaved instance.
    pub fn model(self: &Arc<Self>, name: &str) -> QueryResult<Model> {
        Ok(Model::new(Arc::clone(self), self.meta(name)?))
    }

    /// An unsaved instance filled with `attributes`.
    pub fn new_instance(self: &Arc<Self>, name: &str, attributes: Document) -> QueryResult<Model> {
        let mut model = self.model(name)?;
        model.fill(attributes)?;
        Ok(model)
    }

    /// An instance for a stored document, bypassing mass assignment.
    pub fn new_from_builder(self: &Arc<Self>, name: &str, attributes: Document) -> QueryResult<Model> {
        Ok(self.model(name)?.new_from_builder(attributes))
    }

    /// A query for a model.
    pub fn query(self: &Arc<Self>, name: &str) -> QueryResult<ModelQuery> {
        self.model(name)?.new_query()
    }

    /// A query for a model that eager loads `relations`.
    pub fn with(self: &Arc<Self>, name: &str, relations: &[&str]) -> QueryResult<ModelQuery> {
        let mut query = self.query(name)?;
        query.with(relations);
        Ok(query)
    }

    // ==================== Shortcuts ====================

    /// Fill and save a new instance.
    pub async fn create(self: &Arc<Self>, name: &str, attributes: Document) -> QueryResult<Model> {
        let mut model = self.new_instance(name, attributes)?;
        model.save().await?;
        Ok(model)
    }

    /// The instance with the given id.
    pub async fn find(self: &Arc<Self>, name: &str, id: impl IntoObjectId) -> QueryResult<Option<Model>> {
        let id = id.into_object_id()?;
        self.query(name)?.find(id, &[]).await
    }

    /// The instances with the given ids.
    pub async fn find_many(self: &Arc<Self>, name: &str, ids: Vec<Bson>) -> QueryResult<Vec<Model>> {
        self.query(name)?.find_many(ids, &[]).await
    }

    /// Every instance.
    pub async fn all(self: &Arc<Self>, name: &str) -> QueryResult<Vec<Model>> {
        self.query(name)?.get(&[]).await
    }

    /// Delete the instances with the given ids one by one, firing their
    /// events. Returns how many were deleted.
    pub async fn destroy(self: &Arc<Self>, name: &str, ids: Vec<Bson>) -> QueryResult<u64> {
        let mut deleted = 0;
        for mut model in self.find_many(name, ids).await? {
            if model.delete().await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

impl fmt::Debug for Orm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orm")
            .field("default_connection", &self.resolver.default_connection())
            .field("models", &self.registered())
            .field("unguarded", &self.is_unguarded())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_query::ConnectionMap;
    use quarry_query::memory::MemoryDatabase;

    fn orm() -> Arc<Orm> {
        let connection = Arc::new(Connection::new("mongodb", Arc::new(MemoryDatabase::new("app"))));
        Orm::new(Arc::new(ConnectionMap::new(connection)))
    }

    #[test]
    fn test_unregistered_model_is_configuration_error() {
        let err = orm().model("Ghost").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_morph_meta_lookup() {
        let orm = orm();
        orm.register(ModelMeta::new("Post").morph_class("posts"));
        orm.register(ModelMeta::new("Video"));
        assert_eq!(orm.morph_meta("posts").unwrap().name(), "Post");
        assert_eq!(orm.morph_meta("Video").unwrap().name(), "Video");
        assert!(orm.morph_meta("Audio").is_err());
        assert_eq!(orm.registered(), vec!["Post".to_string(), "Video".to_string()]);
    }

    #[test]
    fn test_unguard_toggle() {
        let orm = orm();
        assert!(!orm.is_unguarded());
        orm.unguard();
        assert!(orm.is_unguarded());
        orm.reguard();
        assert!(!orm.is_unguarded());
    }
}
