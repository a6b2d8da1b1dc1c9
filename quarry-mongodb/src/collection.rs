//! Driver handles over the official MongoDB driver.
//!
//! [`MongoCollection`] implements [`CollectionHandle`] over a
//! `mongodb::Collection<Document>`. Commands the server rejects (command
//! errors, write errors) come back as a not-ok [`CommandResult`] so the query
//! builder can degrade them; anything else (I/O, server selection,
//! authentication) is returned as a [`QueryError`].

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::error::ErrorKind;
use mongodb::options::{CountOptions, FindOptions, ReplaceOptions};
use mongodb::{Collection, Database};
use quarry_query::driver::{
    CollectionHandle, CommandResult, DatabaseHandle, FindQuery, GroupCommand,
};
use quarry_query::{QueryError, QueryResult};
use tracing::debug;

use crate::error::MongoError;

/// Classify a driver error as a rejected command or a failure.
fn command_outcome(error: mongodb::error::Error) -> QueryResult<CommandResult> {
    match error.kind.as_ref() {
        ErrorKind::Command(command) => Ok(CommandResult::failed(command.message.clone())),
        ErrorKind::Write(_) | ErrorKind::BulkWrite(_) => Ok(CommandResult::failed(error.to_string())),
        _ => Err(transport(error)),
    }
}

fn transport(error: mongodb::error::Error) -> QueryError {
    MongoError::from(error).into()
}

/// A database reachable through the MongoDB driver.
#[derive(Clone, Debug)]
pub struct MongoDatabase {
    name: String,
    database: Database,
}

impl MongoDatabase {
    /// Wrap a driver database.
    pub fn new(database: Database) -> Self {
        Self {
            name: database.name().to_string(),
            database,
        }
    }

    /// Get the underlying database.
    pub fn inner(&self) -> &Database {
        &self.database
    }
}

impl DatabaseHandle for MongoDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle> {
        Arc::new(MongoCollection::new(self.database.clone(), name))
    }
}

/// A collection reachable through the MongoDB driver.
#[derive(Clone, Debug)]
pub struct MongoCollection {
    name: String,
    database: Database,
    collection: Collection<Document>,
}

impl MongoCollection {
    /// Open a collection of the given database.
    pub fn new(database: Database, name: &str) -> Self {
        Self {
            name: name.to_string(),
            collection: database.collection(name),
            database,
        }
    }

    /// Get the underlying collection.
    pub fn inner(&self) -> &Collection<Document> {
        &self.collection
    }
}

#[async_trait]
impl CollectionHandle for MongoCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: &FindQuery) -> QueryResult<Vec<Document>> {
        let mut options = FindOptions::default();
        options.projection = query.projection.clone();
        options.sort = query.sort.clone();
        options.skip = query.skip;
        options.limit = query.limit;

        let cursor = self
            .collection
            .find(query.filter.clone(), options)
            .await
            .map_err(transport)?;
        cursor.try_collect().await.map_err(transport)
    }

    async fn count(&self, query: &FindQuery, windowed: bool) -> QueryResult<u64> {
        let mut options = CountOptions::default();
        if windowed {
            options.skip = query.skip;
            options.limit = query.limit.filter(|n| *n != 0).map(i64::unsigned_abs);
        }

        self.collection
            .count_documents(query.filter.clone(), options)
            .await
            .map_err(transport)
    }

    async fn insert(&self, document: Document) -> QueryResult<CommandResult> {
        debug!(collection = %self.name, "insert_one");
        match self.collection.insert_one(document, None).await {
            Ok(_) => Ok(CommandResult::affected(1)),
            Err(e) => command_outcome(e),
        }
    }

    async fn batch_insert(&self, documents: Vec<Document>) -> QueryResult<CommandResult> {
        if documents.is_empty() {
            return Ok(CommandResult::success());
        }

        debug!(collection = %self.name, count = documents.len(), "insert_many");
        match self.collection.insert_many(documents, None).await {
            Ok(result) => Ok(CommandResult::affected(result.inserted_ids.len() as u64)),
            Err(e) => command_outcome(e),
        }
    }

    async fn save(&self, document: Document) -> QueryResult<CommandResult> {
        let Some(id) = document.get("_id").cloned() else {
            return self.insert(document).await;
        };

        debug!(collection = %self.name, id = %id, "replace_one (upsert)");
        let mut options = ReplaceOptions::default();
        options.upsert = Some(true);
        match self
            .collection
            .replace_one(doc! { "_id": id }, document, options)
            .await
        {
            Ok(result) => {
                let n = result.matched_count + u64::from(result.upserted_id.is_some());
                Ok(CommandResult::affected(n))
            }
            Err(e) => command_outcome(e),
        }
    }

    async fn update(
        &self,
        filter: Document,
        update: Document,
        multiple: bool,
    ) -> QueryResult<CommandResult> {
        debug!(collection = %self.name, filter = %filter, update = %update, multiple, "update");

        let is_replacement = update.keys().next().is_some_and(|key| !key.starts_with('$'));
        let result = if is_replacement && !multiple {
            self.collection.replace_one(filter, update, None).await
        } else if multiple {
            self.collection.update_many(filter, update, None).await
        } else {
            self.collection.update_one(filter, update, None).await
        };

        match result {
            Ok(result) => Ok(CommandResult::affected(result.matched_count)),
            Err(e) => command_outcome(e),
        }
    }

    async fn remove(&self, filter: Document) -> QueryResult<CommandResult> {
        debug!(collection = %self.name, filter = %filter, "delete_many");
        match self.collection.delete_many(filter, None).await {
            Ok(result) => Ok(CommandResult::affected(result.deleted_count)),
            Err(e) => command_outcome(e),
        }
    }

    async fn drop_collection(&self) -> QueryResult<CommandResult> {
        debug!(collection = %self.name, "drop");
        match self.collection.drop(None).await {
            Ok(()) => Ok(CommandResult::success()),
            Err(e) => command_outcome(e),
        }
    }

    async fn distinct(&self, field: &str, filter: Document) -> QueryResult<Vec<Bson>> {
        self.collection
            .distinct(field, filter, None)
            .await
            .map_err(transport)
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> QueryResult<CommandResult> {
        debug!(collection = %self.name, stages = pipeline.len(), "aggregate");
        let cursor = match self.collection.aggregate(pipeline, None).await {
            Ok(cursor) => cursor,
            Err(e) => return command_outcome(e),
        };
        match cursor.try_collect::<Vec<Document>>().await {
            Ok(rows) => Ok(CommandResult::success().with_result(rows)),
            Err(e) => command_outcome(e),
        }
    }

    async fn group(&self, command: GroupCommand) -> QueryResult<CommandResult> {
        let mut group = doc! {
            "ns": self.name.as_str(),
            "key": command.key,
            "initial": command.initial,
            "$reduce": Bson::JavaScriptCode(command.reduce),
            "cond": command.condition,
        };
        if let Some(finalize) = command.finalize {
            group.insert("finalize", Bson::JavaScriptCode(finalize));
        }

        debug!(collection = %self.name, "group");
        match self.database.run_command(doc! { "group": group }, None).await {
            Ok(response) => Ok(CommandResult::success()
                .with_retval(response.get("retval").cloned().unwrap_or(Bson::Array(Vec::new())))),
            Err(e) => command_outcome(e),
        }
    }
}
