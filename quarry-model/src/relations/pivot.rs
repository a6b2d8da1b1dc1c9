//! Belongs-to-many links.
//!
//! Both sides store ids: each related document lists its parents under the
//! foreign key, and the parent lists related ids under the other key.
//! Attaching and detaching update both sides with `$addToSet` / `$pull`.

use std::collections::HashSet;

use bson::Bson;
use bson::oid::ObjectId;
use quarry_query::{Conditions, QueryError, QueryResult, key_string};
use tracing::debug;

use super::{Relation, RelationType};
use crate::model::Model;

/// A related record given as a model or by id.
#[derive(Debug, Clone)]
pub enum RelatedRef<'a> {
    Model(&'a Model),
    Id(Bson),
}

impl RelatedRef<'_> {
    fn id(&self) -> QueryResult<Bson> {
        match self {
            Self::Model(model) => model.key().cloned().ok_or_else(|| {
                QueryError::invalid_input("_id", "the related model has no key; save it first")
                    .with_model(model.name())
            }),
            Self::Id(id) => Ok(id.clone()),
        }
    }
}

impl<'a> From<&'a Model> for RelatedRef<'a> {
    fn from(model: &'a Model) -> Self {
        Self::Model(model)
    }
}

impl From<Bson> for RelatedRef<'_> {
    fn from(id: Bson) -> Self {
        Self::Id(id)
    }
}

impl From<ObjectId> for RelatedRef<'_> {
    fn from(id: ObjectId) -> Self {
        Self::Id(Bson::ObjectId(id))
    }
}

/// What [`Relation::sync`] changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncChanges {
    pub attached: Vec<Bson>,
    pub detached: Vec<Bson>,
}

impl Relation {
    fn require_pivot(&self, operation: &str) -> QueryResult<&str> {
        match (self.kind, self.other_key.as_deref()) {
            (RelationType::BelongsToMany, Some(other_key)) => Ok(other_key),
            _ => Err(QueryError::invalid_input(
                self.name.as_str(),
                format!("{} needs a belongs-to-many relation, not {}", operation, self.kind),
            )),
        }
    }

    /// The related ids stored on the parent.
    pub fn related_ids(&self) -> Vec<Bson> {
        match self
            .other_key
            .as_deref()
            .and_then(|key| self.parent.get_raw_attribute(key))
        {
            Some(Bson::Array(ids)) => ids.clone(),
            _ => Vec::new(),
        }
    }

    fn set_related_ids(&mut self, ids: Vec<Bson>) {
        if let Some(other_key) = self.other_key.clone() {
            self.parent.set_persisted_attribute(other_key, Bson::Array(ids));
        }
    }

    pub(super) async fn attach_to_parent(&mut self, ids: Vec<Bson>) -> QueryResult<()> {
        let other_key = self.require_pivot("attach")?.to_string();
        let query = self.parent.key_query()?;
        for id in &ids {
            query.add_to_set(&other_key, id.clone()).await?;
        }

        let mut current = self.related_ids();
        for id in ids {
            if !current.iter().any(|known| key_string(known) == key_string(&id)) {
                current.push(id);
            }
        }
        self.set_related_ids(current);
        Ok(())
    }

    /// Link a related record to the parent on both sides.
    pub async fn attach<'r>(&mut self, related: impl Into<RelatedRef<'r>>) -> QueryResult<()> {
        self.require_pivot("attach")?;
        let id = related.into().id()?;
        let parent_key = self.parent_key()?;

        debug!(relation = %self.name, id = %id, "attach");
        let mut query = self.related_builder();
        query.r#where("_id", id.clone());
        query.add_to_set(&self.foreign_key, parent_key).await?;

        self.attach_to_parent(vec![id]).await
    }

    /// Unlink one related record.
    pub async fn detach<'r>(&mut self, related: impl Into<RelatedRef<'r>>) -> QueryResult<u64> {
        let id = related.into().id()?;
        self.detach_many(vec![id]).await
    }

    /// Unlink related records; an empty list unlinks all of them.
    ///
    /// Returns the number of related records updated.
    pub async fn detach_many(&mut self, ids: Vec<Bson>) -> QueryResult<u64> {
        let other_key = self.require_pivot("detach")?.to_string();
        let ids = if ids.is_empty() { self.related_ids() } else { ids };
        if ids.is_empty() {
            return Ok(0);
        }
        let parent_key = self.parent_key()?;

        debug!(relation = %self.name, count = ids.len(), "detach");
        let mut query = self.related_builder();
        query.where_in("_id", ids.clone());
        let detached = query.pull(&self.foreign_key, parent_key).await?;

        self.parent
            .key_query()?
            .pull_all(&other_key, ids.clone())
            .await?;

        let removed: HashSet<String> = ids.iter().map(key_string).collect();
        let remaining = self
            .related_ids()
            .into_iter()
            .filter(|id| !removed.contains(&key_string(id)))
            .collect();
        self.set_related_ids(remaining);
        Ok(detached)
    }

    /// Make the parent linked to exactly `ids`.
    pub async fn sync(&mut self, ids: Vec<Bson>) -> QueryResult<SyncChanges> {
        self.require_pivot("sync")?;
        let current = self.related_ids();
        let current_keys: HashSet<String> = current.iter().map(key_string).collect();
        let wanted: HashSet<String> = ids.iter().map(key_string).collect();

        let detached: Vec<Bson> = current
            .into_iter()
            .filter(|id| !wanted.contains(&key_string(id)))
            .collect();

        let mut seen = HashSet::new();
        let attached: Vec<Bson> = ids
            .into_iter()
            .filter(|id| {
                let key = key_string(id);
                !current_keys.contains(&key) && seen.insert(key)
            })
            .collect();

        if !detached.is_empty() {
            self.detach_many(detached.clone()).await?;
        }
        for id in &attached {
            self.attach(id.clone()).await?;
        }

        Ok(SyncChanges { attached, detached })
    }
}
