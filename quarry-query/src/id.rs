//! Document identifiers.

use bson::Bson;
use bson::oid::ObjectId;

use crate::error::{QueryError, QueryResult};

/// Values accepted wherever a document `_id` is expected.
///
/// Strings must be 24 hexadecimal characters.
pub trait IntoObjectId {
    /// Convert into an [`ObjectId`].
    fn into_object_id(self) -> QueryResult<ObjectId>;
}

impl IntoObjectId for ObjectId {
    fn into_object_id(self) -> QueryResult<ObjectId> {
        Ok(self)
    }
}

impl IntoObjectId for &ObjectId {
    fn into_object_id(self) -> QueryResult<ObjectId> {
        Ok(*self)
    }
}

impl IntoObjectId for &str {
    fn into_object_id(self) -> QueryResult<ObjectId> {
        Ok(ObjectId::parse_str(self)?)
    }
}

impl IntoObjectId for String {
    fn into_object_id(self) -> QueryResult<ObjectId> {
        self.as_str().into_object_id()
    }
}

impl IntoObjectId for &String {
    fn into_object_id(self) -> QueryResult<ObjectId> {
        self.as_str().into_object_id()
    }
}

impl IntoObjectId for Bson {
    fn into_object_id(self) -> QueryResult<ObjectId> {
        match self {
            Bson::ObjectId(id) => Ok(id),
            Bson::String(s) => s.into_object_id(),
            other => Err(QueryError::invalid_input(
                "_id",
                format!("expected an ObjectId, got {}", other),
            )),
        }
    }
}

impl IntoObjectId for &Bson {
    fn into_object_id(self) -> QueryResult<ObjectId> {
        self.clone().into_object_id()
    }
}

/// The string form used to key relation dictionaries.
///
/// Object ids render as their hex form, strings as themselves and anything
/// else through its extended JSON representation.
pub fn key_string(value: &Bson) -> String {
    match value {
        Bson::ObjectId(id) => id.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}
