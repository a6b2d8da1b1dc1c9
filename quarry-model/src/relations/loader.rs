//! Eager loading: one query per relation for a whole set of parents.

use std::collections::HashMap;
use std::collections::HashSet;

use bson::Bson;
use quarry_query::{Conditions, key_string};

use super::{Relation, RelationType};
use crate::model::{Model, RelationValue};

// Array values contribute each element.
fn keys_of(value: &Bson) -> Vec<&Bson> {
    match value {
        Bson::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn unique_keys<'a>(values: impl Iterator<Item = &'a Bson>) -> Vec<Bson> {
    let mut seen = HashSet::new();
    values
        .filter(|value| **value != Bson::Null)
        .filter(|value| seen.insert(key_string(value)))
        .cloned()
        .collect()
}

impl Relation {
    /// Constrain the query to the related records of every model in
    /// `models`.
    pub fn add_eager_constraints(&mut self, models: &[Model]) {
        if self.kind == RelationType::BelongsTo {
            let keys = unique_keys(
                models
                    .iter()
                    .filter_map(|model| model.get_raw_attribute(&self.foreign_key)),
            );
            let key = self.related_key_name();
            self.query.where_in(key, keys);
        } else {
            let keys = unique_keys(models.iter().filter_map(Model::key));
            let foreign_key = self.foreign_key.clone();
            self.query.where_in(foreign_key, keys);
            self.add_morph_constraint();
        }
    }

    /// Give every model an empty value for the relation.
    pub fn init_relation(&self, models: &mut [Model], name: &str) {
        for model in models {
            let empty = if self.kind.is_many() {
                RelationValue::Many(Vec::new())
            } else {
                RelationValue::One(None)
            };
            model.set_relation(name, empty);
        }
    }

    /// Eager query results.
    pub async fn get_eager(&self) -> quarry_query::QueryResult<Vec<Model>> {
        self.query.get(&[]).await
    }

    /// Group results by the key their parent will look them up with.
    pub fn build_dictionary(&self, results: &[Model]) -> HashMap<String, Vec<Model>> {
        let mut dictionary: HashMap<String, Vec<Model>> = HashMap::new();
        for result in results {
            let keys = match self.kind {
                RelationType::BelongsTo => result.key().map(|key| vec![key]),
                RelationType::BelongsToMany => result
                    .get_raw_attribute(&self.foreign_key)
                    .map(keys_of),
                _ => result
                    .get_raw_attribute(&self.foreign_key)
                    .map(|key| vec![key]),
            };
            for key in keys.unwrap_or_default() {
                dictionary
                    .entry(key_string(key))
                    .or_default()
                    .push(result.clone());
            }
        }
        dictionary
    }

    /// Store the matching results on each parent.
    pub fn match_models(&self, models: &mut [Model], results: Vec<Model>, name: &str) {
        let dictionary = self.build_dictionary(&results);

        for model in models {
            let key = match self.kind {
                RelationType::BelongsTo => model.get_raw_attribute(&self.foreign_key),
                _ => model.key(),
            };
            let Some(matched) = key.and_then(|key| dictionary.get(&key_string(key))) else {
                continue;
            };

            let value = if self.kind.is_many() {
                RelationValue::Many(matched.clone())
            } else {
                RelationValue::One(matched.first().cloned().map(Box::new))
            };
            model.set_relation(name, value);
        }
    }
}
