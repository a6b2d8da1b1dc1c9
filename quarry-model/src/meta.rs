//! Per-model metadata.
//!
//! A [`ModelMeta`] describes one model type: where it is stored, which
//! attributes may be mass assigned, how it serializes, and which scopes,
//! accessors, mutators and relations it offers. Metadata is registered once
//! on an [`Orm`](crate::Orm) and shared by every instance through an `Arc`.
//!
//! ```rust
//! use quarry_model::{ModelMeta, RelationDef};
//!
//! let meta = ModelMeta::new("User")
//!     .fillable(["name", "email"])
//!     .hidden(["password"])
//!     .soft_deletes(true)
//!     .relation("posts", RelationDef::has_many("Post"))
//!     .relation("roles", RelationDef::belongs_to_many("Role"));
//!
//! assert_eq!(meta.collection(), "users");
//! assert_eq!(meta.get_per_page(), 15);
//! assert!(meta.relation_def("posts").is_some());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bson::Bson;
use indexmap::IndexMap;

use crate::builder::ModelQuery;
use crate::naming;

/// Column stamped on insert.
pub const CREATED_AT: &str = "created_at";
/// Column stamped on every save.
pub const UPDATED_AT: &str = "updated_at";
/// Column set by soft deletes.
pub const DELETED_AT: &str = "deleted_at";

/// Transforms a stored value on read.
pub type Accessor = Arc<dyn Fn(&Bson) -> Bson + Send + Sync>;

/// Transforms a value before it is stored.
pub type Mutator = Arc<dyn Fn(Bson) -> Bson + Send + Sync>;

/// A named, reusable set of conditions.
pub type Scope = Arc<dyn Fn(&mut ModelQuery, &[Bson]) + Send + Sync>;

/// Extra conditions applied to a relation query.
pub type Constraint = Arc<dyn Fn(&mut ModelQuery) + Send + Sync>;

/// The shape of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// The related model stores this model's id under `foreign_key`.
    HasOne {
        related: String,
        foreign_key: Option<String>,
    },
    /// Like `HasOne`, with any number of related records.
    HasMany {
        related: String,
        foreign_key: Option<String>,
    },
    /// This model stores the related id under `foreign_key`.
    BelongsTo {
        related: String,
        foreign_key: Option<String>,
    },
    /// Related records hold `foreign_key: [ids of this model]`, this model
    /// holds `other_key: [related ids]`.
    BelongsToMany {
        related: String,
        foreign_key: Option<String>,
        other_key: Option<String>,
    },
    /// Like `HasOne`, keyed by `{name}_id` and tagged by `{name}_type`.
    MorphOne { related: String, name: String },
    /// Like `HasMany`, keyed by `{name}_id` and tagged by `{name}_type`.
    MorphMany { related: String, name: String },
    /// The owner of a morph relation, chosen by this model's `{name}_type`.
    MorphTo { name: String },
}

/// A relation declared on a model.
#[derive(Clone)]
pub struct RelationDef {
    kind: RelationKind,
    constraint: Option<Constraint>,
}

impl RelationDef {
    fn of(kind: RelationKind) -> Self {
        Self {
            kind,
            constraint: None,
        }
    }

    /// One related record holding this model's id.
    pub fn has_one(related: impl Into<String>) -> Self {
        Self::of(RelationKind::HasOne {
            related: related.into(),
            foreign_key: None,
        })
    }

    /// Related records holding this model's id.
    pub fn has_many(related: impl Into<String>) -> Self {
        Self::of(RelationKind::HasMany {
            related: related.into(),
            foreign_key: None,
        })
    }

    /// The record whose id this model holds.
    pub fn belongs_to(related: impl Into<String>) -> Self {
        Self::of(RelationKind::BelongsTo {
            related: related.into(),
            foreign_key: None,
        })
    }

    /// Records linked through id arrays on both sides.
    pub fn belongs_to_many(related: impl Into<String>) -> Self {
        Self::of(RelationKind::BelongsToMany {
            related: related.into(),
            foreign_key: None,
            other_key: None,
        })
    }

    /// One polymorphic related record.
    pub fn morph_one(related: impl Into<String>, name: impl Into<String>) -> Self {
        Self::of(RelationKind::MorphOne {
            related: related.into(),
            name: name.into(),
        })
    }

    /// Polymorphic related records.
    pub fn morph_many(related: impl Into<String>, name: impl Into<String>) -> Self {
        Self::of(RelationKind::MorphMany {
            related: related.into(),
            name: name.into(),
        })
    }

    /// The owner of a polymorphic relation. Lazy loading only.
    pub fn morph_to(name: impl Into<String>) -> Self {
        Self::of(RelationKind::MorphTo { name: name.into() })
    }

    /// Override the foreign key. Ignored by morph relations.
    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        match &mut self.kind {
            RelationKind::HasOne { foreign_key, .. }
            | RelationKind::HasMany { foreign_key, .. }
            | RelationKind::BelongsTo { foreign_key, .. }
            | RelationKind::BelongsToMany { foreign_key, .. } => *foreign_key = Some(key.into()),
            RelationKind::MorphOne { .. }
            | RelationKind::MorphMany { .. }
            | RelationKind::MorphTo { .. } => {}
        }
        self
    }

    /// Override the key this model uses to hold related ids
    /// (belongs-to-many only).
    pub fn other_key(mut self, key: impl Into<String>) -> Self {
        if let RelationKind::BelongsToMany { other_key, .. } = &mut self.kind {
            *other_key = Some(key.into());
        }
        self
    }

    /// Add conditions to every query of this relation, lazy or eager.
    pub fn constrain<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ModelQuery) + Send + Sync + 'static,
    {
        self.constraint = Some(Arc::new(f));
        self
    }

    /// The relation shape.
    pub fn kind(&self) -> &RelationKind {
        &self.kind
    }

    /// The extra constraint, if any.
    pub fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }
}

impl fmt::Debug for RelationDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationDef")
            .field("kind", &self.kind)
            .field("constrained", &self.constraint.is_some())
            .finish()
    }
}

/// Metadata shared by all instances of a model.
#[derive(Clone)]
pub struct ModelMeta {
    name: String,
    collection: String,
    key_name: String,
    connection: Option<String>,
    morph_class: String,
    fillable: Vec<String>,
    guarded: Vec<String>,
    hidden: Vec<String>,
    visible: Vec<String>,
    timestamps: bool,
    soft_deletes: bool,
    per_page: u64,
    snake_attributes: bool,
    accessors: HashMap<String, Accessor>,
    mutators: HashMap<String, Mutator>,
    scopes: HashMap<String, Scope>,
    relations: IndexMap<String, RelationDef>,
}

impl ModelMeta {
    /// Metadata with the defaults: collection `snake(name)s`, key `_id`,
    /// everything guarded, timestamps on, 15 per page.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            collection: naming::collection_name(&name),
            morph_class: name.clone(),
            name,
            key_name: "_id".to_string(),
            connection: None,
            fillable: Vec::new(),
            guarded: vec!["*".to_string()],
            hidden: Vec::new(),
            visible: Vec::new(),
            timestamps: true,
            soft_deletes: false,
            per_page: 15,
            snake_attributes: true,
            accessors: HashMap::new(),
            mutators: HashMap::new(),
            scopes: HashMap::new(),
            relations: IndexMap::new(),
        }
    }

    // ==================== Builder ====================

    /// Store the model in another collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Use another key field.
    pub fn key_name(mut self, key: impl Into<String>) -> Self {
        self.key_name = key.into();
        self
    }

    /// Use a named connection instead of the default one.
    pub fn connection(mut self, name: impl Into<String>) -> Self {
        self.connection = Some(name.into());
        self
    }

    /// The type tag stored by morph relations owned by this model.
    pub fn morph_class(mut self, class: impl Into<String>) -> Self {
        self.morph_class = class.into();
        self
    }

    /// Attributes open to mass assignment.
    pub fn fillable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fillable = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Attributes closed to mass assignment; `*` closes everything not
    /// fillable.
    pub fn guarded<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.guarded = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Attributes left out of serialized output.
    pub fn hidden<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden = fields.into_iter().map(Into::into).collect();
        self
    }

    /// When non-empty, the only attributes serialized.
    pub fn visible<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.visible = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Maintain `created_at` and `updated_at`.
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Delete by setting `deleted_at` instead of removing.
    pub fn soft_deletes(mut self, enabled: bool) -> Self {
        self.soft_deletes = enabled;
        self
    }

    /// Default page size.
    pub fn per_page(mut self, per_page: u64) -> Self {
        self.per_page = per_page;
        self
    }

    /// Serialize loaded relations under snake_case names.
    pub fn snake_attributes(mut self, enabled: bool) -> Self {
        self.snake_attributes = enabled;
        self
    }

    /// Register an accessor for an attribute.
    pub fn accessor<F>(mut self, field: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Bson) -> Bson + Send + Sync + 'static,
    {
        self.accessors.insert(field.into(), Arc::new(f));
        self
    }

    /// Register a mutator for an attribute.
    pub fn mutator<F>(mut self, field: impl Into<String>, f: F) -> Self
    where
        F: Fn(Bson) -> Bson + Send + Sync + 'static,
    {
        self.mutators.insert(field.into(), Arc::new(f));
        self
    }

    /// Register a query scope.
    pub fn scope<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut ModelQuery, &[Bson]) + Send + Sync + 'static,
    {
        self.scopes.insert(name.into(), Arc::new(f));
        self
    }

    /// Declare a relation.
    pub fn relation(mut self, name: impl Into<String>, def: RelationDef) -> Self {
        self.relations.insert(name.into(), def);
        self
    }

    // ==================== Accessors ====================

    /// The model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The key field.
    pub fn get_key_name(&self) -> &str {
        &self.key_name
    }

    /// The connection name, `None` for the default connection.
    pub fn connection_name(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    /// The morph type tag.
    pub fn get_morph_class(&self) -> &str {
        &self.morph_class
    }

    /// Mass-assignable attributes.
    pub fn get_fillable(&self) -> &[String] {
        &self.fillable
    }

    /// Guarded attributes.
    pub fn get_guarded(&self) -> &[String] {
        &self.guarded
    }

    /// Hidden attributes.
    pub fn get_hidden(&self) -> &[String] {
        &self.hidden
    }

    /// Visible attributes.
    pub fn get_visible(&self) -> &[String] {
        &self.visible
    }

    /// Whether timestamps are maintained.
    pub fn uses_timestamps(&self) -> bool {
        self.timestamps
    }

    /// Whether deletes are soft.
    pub fn is_soft_deleting(&self) -> bool {
        self.soft_deletes
    }

    /// Default page size.
    pub fn get_per_page(&self) -> u64 {
        self.per_page
    }

    /// Whether relations serialize under snake_case names.
    pub fn uses_snake_attributes(&self) -> bool {
        self.snake_attributes
    }

    /// Whether every attribute not listed as fillable is guarded.
    pub fn is_totally_guarded(&self) -> bool {
        self.fillable.is_empty() && self.guarded.iter().any(|g| g == "*")
    }

    /// Whether an attribute is guarded.
    pub fn is_guarded(&self, key: &str) -> bool {
        self.guarded.iter().any(|g| g == key || g == "*")
    }

    /// Whether an attribute may be mass assigned (ignoring unguarding).
    pub fn is_fillable(&self, key: &str) -> bool {
        if self.fillable.iter().any(|f| f == key) {
            return true;
        }
        if self.is_guarded(key) {
            return false;
        }
        self.fillable.is_empty() && !key.starts_with('_')
    }

    /// The accessor for an attribute.
    pub fn get_accessor(&self, field: &str) -> Option<&Accessor> {
        self.accessors.get(field)
    }

    /// The mutator for an attribute.
    pub fn get_mutator(&self, field: &str) -> Option<&Mutator> {
        self.mutators.get(field)
    }

    /// Names of attributes with accessors.
    pub fn accessor_names(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(String::as_str)
    }

    /// A registered scope.
    pub fn get_scope(&self, name: &str) -> Option<&Scope> {
        self.scopes.get(name)
    }

    /// A declared relation.
    pub fn relation_def(&self, name: &str) -> Option<&RelationDef> {
        self.relations.get(name)
    }

    /// All declared relations, in declaration order.
    pub fn relations(&self) -> impl Iterator<Item = (&str, &RelationDef)> {
        self.relations.iter().map(|(name, def)| (name.as_str(), def))
    }
}

impl fmt::Debug for ModelMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelMeta")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("key_name", &self.key_name)
            .field("fillable", &self.fillable)
            .field("guarded", &self.guarded)
            .field("timestamps", &self.timestamps)
            .field("soft_deletes", &self.soft_deletes)
            .field("scopes", &self.scopes.keys().collect::<Vec<_>>())
            .field("relations", &self.relations)
            .finish_non_exhaustive()
    }
}
