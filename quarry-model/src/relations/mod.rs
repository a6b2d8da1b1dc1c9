//! Relations between models.
//!
//! A [`Relation`] binds a parent [`Model`] to a [`ModelQuery`] over the
//! related model. Accessed lazily (through [`Model::relation`]) the query is
//! constrained to the parent; accessed for eager loading it starts
//! unconstrained and is narrowed to a whole set of parents at once.
//!
//! | relation | keys |
//! |----------|------|
//! | has-one / has-many | related holds `foreign_key = parent._id` |
//! | belongs-to | parent holds `foreign_key = related._id` |
//! | belongs-to-many | related holds `foreign_key: [parent ids]`, parent holds `other_key: [related ids]` |
//! | morph-one / morph-many | related holds `{name}_id` and `{name}_type` |
//!
//! A morph-to relation resolves to a belongs-to relation on the model named
//! by the parent's `{name}_type`.

mod loader;
mod pivot;
mod write;

pub use pivot::{RelatedRef, SyncChanges};

use std::fmt;
use std::ops::Range;

use bson::Bson;
use quarry_query::{Clause, Conditions, Expression, Logic, QueryBuilder, QueryError, QueryResult, WhereValue};

use crate::builder::ModelQuery;
use crate::meta::RelationKind;
use crate::model::{Model, RelationValue};
use crate::naming;

/// The resolved shape of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    HasOne,
    HasMany,
    BelongsTo,
    BelongsToMany,
    MorphOne,
    MorphMany,
}

impl RelationType {
    /// Whether the relation loads a list.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::HasMany | Self::BelongsToMany | Self::MorphMany)
    }

    /// Whether related records carry a morph type.
    pub fn is_morph(&self) -> bool {
        matches!(self, Self::MorphOne | Self::MorphMany)
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HasOne => "has-one",
            Self::HasMany => "has-many",
            Self::BelongsTo => "belongs-to",
            Self::BelongsToMany => "belongs-to-many",
            Self::MorphOne => "morph-one",
            Self::MorphMany => "morph-many",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A relation query bound to a parent model.
#[derive(Clone)]
pub struct Relation {
    name: String,
    kind: RelationType,
    query: ModelQuery,
    parent: Model,
    foreign_key: String,
    other_key: Option<String>,
    morph_type: Option<String>,
    morph_class: Option<String>,
    // Clauses added by `add_constraints`.
    parent_constraints: Option<Range<usize>>,
}

impl Relation {
    /// A relation constrained to `parent`.
    pub fn lazy(parent: &Model, name: &str) -> QueryResult<Self> {
        Self::build(parent, name, false)
    }

    /// An unconstrained relation for eager loading.
    pub fn eager(parent: &Model, name: &str) -> QueryResult<Self> {
        Self::build(parent, name, true)
    }

    fn build(parent: &Model, name: &str, eager: bool) -> QueryResult<Self> {
        let def = parent.meta().relation_def(name).cloned().ok_or_else(|| {
            QueryError::invalid_input(
                name,
                format!("model {} has no relation '{}'", parent.name(), name),
            )
        })?;
        let orm = parent.orm();
        let parent_fk = || naming::foreign_key(parent.name());

        let mut morph_type = None;
        let mut morph_class = None;
        let mut other_key = None;

        let (kind, related, foreign_key) = match def.kind() {
            RelationKind::HasOne { related, foreign_key } => (
                RelationType::HasOne,
                orm.model(related)?,
                foreign_key.clone().unwrap_or_else(parent_fk),
            ),
            RelationKind::HasMany { related, foreign_key } => (
                RelationType::HasMany,
                orm.model(related)?,
                foreign_key.clone().unwrap_or_else(parent_fk),
            ),
            RelationKind::BelongsTo { related, foreign_key } => (
                RelationType::BelongsTo,
                orm.model(related)?,
                foreign_key
                    .clone()
                    .unwrap_or_else(|| naming::foreign_key(name)),
            ),
            RelationKind::BelongsToMany {
                related,
                foreign_key,
                other_key: other,
            } => {
                other_key = Some(
                    other
                        .clone()
                        .unwrap_or_else(|| naming::foreign_key(related)),
                );
                (
                    RelationType::BelongsToMany,
                    orm.model(related)?,
                    foreign_key.clone().unwrap_or_else(parent_fk),
                )
            }
            RelationKind::MorphOne { related, name: morph }
            | RelationKind::MorphMany { related, name: morph } => {
                morph_type = Some(format!("{}_type", morph));
                morph_class = Some(parent.meta().get_morph_class().to_string());
                let kind = if matches!(def.kind(), RelationKind::MorphOne { .. }) {
                    RelationType::MorphOne
                } else {
                    RelationType::MorphMany
                };
                (kind, orm.model(related)?, format!("{}_id", morph))
            }
            RelationKind::MorphTo { name: morph } => {
                if eager {
                    return Err(QueryError::invalid_input(
                        name,
                        "morph-to relations cannot be eager loaded",
                    ));
                }
                let type_column = format!("{}_type", morph);
                let class = parent
                    .get_raw_attribute(&type_column)
                    .and_then(Bson::as_str)
                    .ok_or_else(|| {
                        QueryError::invalid_input(type_column.as_str(), "morph type is not set")
                            .with_model(parent.name())
                    })?;
                let meta = orm.morph_meta(class)?;
                morph_class = Some(class.to_string());
                morph_type = Some(type_column);
                (
                    RelationType::BelongsTo,
                    Model::new(std::sync::Arc::clone(orm), meta),
                    format!("{}_id", morph),
                )
            }
        };

        let mut relation = Self {
            name: name.to_string(),
            kind,
            query: related.new_query()?,
            parent: parent.clone(),
            foreign_key,
            other_key,
            morph_type,
            morph_class,
            parent_constraints: None,
        };
        if !eager {
            relation.add_constraints();
        }
        if let Some(constraint) = def.constraint() {
            constraint(&mut relation.query);
        }
        Ok(relation)
    }

    // ==================== Accessors ====================

    /// The relation name on the parent.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The relation shape.
    pub fn kind(&self) -> RelationType {
        self.kind
    }

    /// The related query.
    pub fn query(&self) -> &ModelQuery {
        &self.query
    }

    /// Mutable access to the related query.
    pub fn query_mut(&mut self) -> &mut ModelQuery {
        &mut self.query
    }

    /// The blank related model.
    pub fn related(&self) -> &Model {
        self.query.model()
    }

    /// The parent model.
    pub fn parent(&self) -> &Model {
        &self.parent
    }

    /// Mutable access to the parent model.
    pub fn parent_mut(&mut self) -> &mut Model {
        &mut self.parent
    }

    /// Take back the parent, with any changes made through the relation.
    pub fn into_parent(self) -> Model {
        self.parent
    }

    /// The foreign key.
    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    /// The parent-side key of a belongs-to-many relation.
    pub fn other_key(&self) -> Option<&str> {
        self.other_key.as_deref()
    }

    /// The morph type column.
    pub fn morph_type(&self) -> Option<&str> {
        self.morph_type.as_deref()
    }

    /// The morph class matched in the type column.
    pub fn morph_class(&self) -> Option<&str> {
        self.morph_class.as_deref()
    }

    fn parent_key(&self) -> QueryResult<Bson> {
        self.parent.key().cloned().ok_or_else(|| {
            QueryError::invalid_input(
                self.parent.meta().get_key_name(),
                "the parent model has no key; save it first",
            )
            .with_model(self.parent.name())
        })
    }

    fn related_key_name(&self) -> String {
        self.related().meta().get_key_name().to_string()
    }

    // ==================== Constraints ====================

    fn add_constraints(&mut self) {
        let start = self.query.query().wheres().len();

        if self.kind == RelationType::BelongsTo {
            let key = self.related_key_name();
            let value = self
                .parent
                .get_raw_attribute(&self.foreign_key)
                .cloned()
                .unwrap_or(Bson::Null);
            self.query.r#where(key, value);
        } else {
            let value = self.parent.key().cloned().unwrap_or(Bson::Null);
            let foreign_key = self.foreign_key.clone();
            self.query.r#where(foreign_key, value);
            self.add_morph_constraint();
        }

        self.parent_constraints = Some(start..self.query.query().wheres().len());
    }

    fn add_morph_constraint(&mut self) {
        if !self.kind.is_morph() {
            return;
        }
        if let (Some(column), Some(class)) = (self.morph_type.clone(), self.morph_class.clone()) {
            self.query.r#where(column, class);
        }
    }

    /// Remove the parent constraints and return the remaining clauses,
    /// leaving the query without conditions.
    pub fn get_and_reset_wheres(&mut self) -> Vec<Clause> {
        let wheres = self.query.query_mut().wheres_mut();
        if let Some(range) = self.parent_constraints.take() {
            for index in range.rev() {
                wheres.remove(index);
            }
        }
        wheres.take()
    }

    // ==================== Reading ====================

    /// The related models as a loaded relation value.
    pub async fn get_results(&self) -> QueryResult<RelationValue> {
        if self.kind.is_many() {
            Ok(RelationValue::Many(self.query.get(&[]).await?))
        } else {
            Ok(RelationValue::One(self.query.first(&[]).await?.map(Box::new)))
        }
    }

    /// Every related model.
    pub async fn get(&self, fields: &[&str]) -> QueryResult<Vec<Model>> {
        self.query.get(fields).await
    }

    /// The first related model.
    pub async fn first(&self, fields: &[&str]) -> QueryResult<Option<Model>> {
        self.query.first(fields).await
    }

    /// Number of related models.
    pub async fn count(&self) -> QueryResult<u64> {
        self.query.query().count().await
    }

    // A fresh builder on the related collection.
    fn related_builder(&self) -> QueryBuilder {
        self.query.query().new_query()
    }
}

impl Conditions for Relation {
    fn push_where(&mut self, field: String, value: WhereValue, logic: Logic) -> &mut Self {
        self.query.push_where(field, value, logic);
        self
    }

    fn push_nested(&mut self, expression: Expression, logic: Logic) -> &mut Self {
        self.query.push_nested(expression, logic);
        self
    }

    fn nested_builder(&self) -> QueryBuilder {
        self.query.nested_builder()
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("parent", &self.parent.name())
            .field("related", &self.related().name())
            .field("foreign_key", &self.foreign_key)
            .field("other_key", &self.other_key)
            .field("morph_type", &self.morph_type)
            .finish_non_exhaustive()
    }
}
