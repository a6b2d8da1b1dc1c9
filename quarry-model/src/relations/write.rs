//! Writing through relations.

use bson::{Bson, Document};
use quarry_query::{QueryError, QueryResult};

use super::{Relation, RelationType};
use crate::model::{Model, RelationValue};

impl Relation {
    fn unsupported(&self, operation: &str) -> QueryError {
        QueryError::invalid_input(
            self.name.as_str(),
            format!("{} is not supported on {} relations", operation, self.kind),
        )
        .with_model(self.parent.name())
    }

    // Stamp the keys tying `model` to the parent.
    fn stamp_keys(&self, model: &mut Model) -> QueryResult<()> {
        let key = self.parent_key()?;
        model.set_attribute(self.foreign_key.as_str(), key);
        if self.kind.is_morph() {
            if let (Some(column), Some(class)) = (&self.morph_type, &self.morph_class) {
                model.set_attribute(column.as_str(), class.as_str());
            }
        }
        Ok(())
    }

    /// Save a related model, setting its foreign key (and morph type).
    ///
    /// For belongs-to-many relations the model is saved with the parent id
    /// in its foreign key array and attached on the parent side.
    pub async fn save(&mut self, model: &mut Model) -> QueryResult<bool> {
        match self.kind {
            RelationType::BelongsTo => Err(self.unsupported("save")),
            RelationType::BelongsToMany => {
                let parent_key = self.parent_key()?;
                let mut keys = match model.get_raw_attribute(&self.foreign_key) {
                    Some(Bson::Array(keys)) => keys.clone(),
                    _ => Vec::new(),
                };
                if !keys.contains(&parent_key) {
                    keys.push(parent_key);
                }
                model.set_attribute(self.foreign_key.as_str(), keys);

                if !model.save().await? {
                    return Ok(false);
                }
                let id = model.key().cloned().unwrap_or(Bson::Null);
                self.attach_to_parent(vec![id]).await?;
                Ok(true)
            }
            _ => {
                self.stamp_keys(model)?;
                model.save().await
            }
        }
    }

    /// Save several related models.
    pub async fn save_many(&mut self, models: &mut [Model]) -> QueryResult<()> {
        for model in models {
            self.save(model).await?;
        }
        Ok(())
    }

    /// Fill, link and save a new related model.
    pub async fn create(&mut self, attributes: Document) -> QueryResult<Model> {
        let mut model = self.related().new_instance(attributes)?;
        self.save(&mut model).await?;
        Ok(model)
    }

    /// [`Relation::create`] for each set of attributes.
    pub async fn create_many(&mut self, records: Vec<Document>) -> QueryResult<Vec<Model>> {
        let mut models = Vec::with_capacity(records.len());
        for attributes in records {
            models.push(self.create(attributes).await?);
        }
        Ok(models)
    }

    /// Update the related records.
    ///
    /// Belongs-to relations load the related model, fill and save it;
    /// the others `$set` every match, stamping `updated_at`.
    pub async fn update(&self, attributes: Document) -> QueryResult<u64> {
        if self.kind != RelationType::BelongsTo {
            return self.query.update(attributes).await;
        }
        match self.query.first(&[]).await? {
            Some(mut model) => {
                model.fill(attributes)?;
                Ok(u64::from(model.save().await?))
            }
            None => Ok(0),
        }
    }

    /// Point a belongs-to relation at `model`.
    ///
    /// The parent is changed but not saved.
    pub fn associate(&mut self, model: &Model) -> QueryResult<&mut Model> {
        if self.kind != RelationType::BelongsTo {
            return Err(self.unsupported("associate"));
        }
        let key = model.key().cloned().unwrap_or(Bson::Null);
        self.parent.set_attribute(self.foreign_key.as_str(), key);
        if let Some(column) = &self.morph_type {
            self.parent
                .set_attribute(column.as_str(), model.meta().get_morph_class());
        }
        self.parent.set_relation(
            self.name.clone(),
            RelationValue::One(Some(Box::new(model.clone()))),
        );
        Ok(&mut self.parent)
    }

    /// Clear a belongs-to relation. The parent is changed but not saved.
    pub fn dissociate(&mut self) -> QueryResult<&mut Model> {
        if self.kind != RelationType::BelongsTo {
            return Err(self.unsupported("dissociate"));
        }
        self.parent.unset_attribute(&self.foreign_key);
        if let Some(column) = &self.morph_type {
            self.parent.unset_attribute(column);
        }
        self.parent
            .set_relation(self.name.clone(), RelationValue::One(None));
        Ok(&mut self.parent)
    }

    /// Stamp `updated_at` on every related record.
    pub async fn touch(&self) -> QueryResult<u64> {
        if !self.related().meta().uses_timestamps() {
            return Ok(0);
        }
        self.query.update(Document::new()).await
    }

    /// Restore soft-deleted related records.
    pub async fn restore(&self) -> QueryResult<u64> {
        self.query.restore().await
    }

    /// `$set` fields on every related record without touching timestamps.
    pub async fn raw_update(&self, attributes: Document) -> QueryResult<u64> {
        self.query.query().update(attributes).await
    }
}
