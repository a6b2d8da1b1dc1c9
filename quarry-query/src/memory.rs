//! An in-process driver.
//!
//! [`MemoryDatabase`] implements [`DatabaseHandle`] over documents held in
//! memory. It evaluates the filter and update operators the builders emit,
//! so queries and models can be exercised end to end without a server.
//!
//! Supported:
//! - filters: `$and`, `$or`, `$nor`, equality, `$eq`, `$ne`, `$gt`, `$gte`,
//!   `$lt`, `$lte`, `$in`, `$nin`, `$all`, `$exists`, `$size`, `$mod`,
//!   `$type`, `$regex`/`$options` and regex values
//! - updates: `$set`, `$unset`, `$inc`, `$rename`, `$push`, `$addToSet`,
//!   `$pull`, `$pullAll`, `$pop`, and whole-document replacement
//! - aggregation stages: `$match`, `$group` (`$sum`, `$avg`, `$min`, `$max`),
//!   `$sort`, `$skip`, `$limit`
//!
//! Geospatial operators never match and the `group` command reports failure.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use parking_lot::RwLock;
use tracing::debug;

use crate::driver::{CollectionHandle, CommandResult, DatabaseHandle, FindQuery, GroupCommand};
use crate::error::QueryResult;

/// An in-memory database.
#[derive(Default)]
pub struct MemoryDatabase {
    name: String,
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create a collection with its concrete type.
    pub fn memory_collection(&self, name: &str) -> Arc<MemoryCollection> {
        if let Some(collection) = self.collections.read().get(name) {
            return Arc::clone(collection);
        }
        Arc::clone(
            self.collections
                .write()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryCollection::new(name))),
        )
    }
}

impl DatabaseHandle for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle> {
        self.memory_collection(name)
    }
}

/// An in-memory collection.
#[derive(Default)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<Vec<Document>>,
    failing: AtomicBool,
}

impl MemoryCollection {
    /// Create an empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Snapshot of the stored documents in insertion order.
    pub fn documents(&self) -> Vec<Document> {
        self.documents.read().clone()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Make every subsequent command report `ok: false`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, AtomicOrdering::SeqCst);
    }

    fn is_failing(&self) -> bool {
        self.failing.load(AtomicOrdering::SeqCst)
    }

    fn select(&self, query: &FindQuery, windowed: bool) -> Vec<Document> {
        let mut selected: Vec<Document> = self
            .documents
            .read()
            .iter()
            .filter(|doc| matches_filter(doc, &query.filter))
            .cloned()
            .collect();

        if let Some(sort) = &query.sort {
            sort_documents(&mut selected, sort);
        }
        if windowed {
            selected = apply_window(selected, query.skip, query.limit);
        }
        selected
    }
}

#[async_trait]
impl CollectionHandle for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: &FindQuery) -> QueryResult<Vec<Document>> {
        debug!(collection = %self.name, filter = %query.filter, "memory find");
        let selected = self.select(query, true);
        Ok(match &query.projection {
            Some(projection) => selected.iter().map(|d| project(d, projection)).collect(),
            None => selected,
        })
    }

    async fn count(&self, query: &FindQuery, windowed: bool) -> QueryResult<u64> {
        Ok(self.select(query, windowed).len() as u64)
    }

    async fn insert(&self, document: Document) -> QueryResult<CommandResult> {
        self.batch_insert(vec![document]).await
    }

    async fn batch_insert(&self, documents: Vec<Document>) -> QueryResult<CommandResult> {
        if self.is_failing() {
            return Ok(CommandResult::failed("insert rejected"));
        }
        let mut stored = self.documents.write();
        for document in &documents {
            if let Some(id) = document.get("_id") {
                if stored.iter().any(|d| d.get("_id") == Some(id)) {
                    return Ok(CommandResult::failed(format!(
                        "E11000 duplicate key error index: _id_ dup key: {}",
                        id
                    )));
                }
            }
        }
        let n = documents.len() as u64;
        stored.extend(documents);
        Ok(CommandResult::affected(n))
    }

    async fn save(&self, document: Document) -> QueryResult<CommandResult> {
        if self.is_failing() {
            return Ok(CommandResult::failed("save rejected"));
        }
        let mut stored = self.documents.write();
        let existing = document
            .get("_id")
            .and_then(|id| stored.iter().position(|d| d.get("_id") == Some(id)));
        match existing {
            Some(index) => stored[index] = document,
            None => stored.push(document),
        }
        Ok(CommandResult::affected(1))
    }

    async fn update(
        &self,
        filter: Document,
        update: Document,
        multiple: bool,
    ) -> QueryResult<CommandResult> {
        if self.is_failing() {
            return Ok(CommandResult::failed("update rejected"));
        }
        let mut stored = self.documents.write();
        let mut updated = Vec::new();
        for (index, document) in stored.iter().enumerate() {
            if !matches_filter(document, &filter) {
                continue;
            }
            match apply_update(document, &update) {
                Ok(next) => updated.push((index, next)),
                Err(message) => return Ok(CommandResult::failed(message)),
            }
            if !multiple {
                break;
            }
        }
        let n = updated.len() as u64;
        for (index, next) in updated {
            stored[index] = next;
        }
        Ok(CommandResult::affected(n))
    }

    async fn remove(&self, filter: Document) -> QueryResult<CommandResult> {
        if self.is_failing() {
            return Ok(CommandResult::failed("remove rejected"));
        }
        let mut stored = self.documents.write();
        let before = stored.len();
        stored.retain(|d| !matches_filter(d, &filter));
        Ok(CommandResult::affected((before - stored.len()) as u64))
    }

    async fn drop_collection(&self) -> QueryResult<CommandResult> {
        if self.is_failing() {
            return Ok(CommandResult::failed("ns not found"));
        }
        self.documents.write().clear();
        Ok(CommandResult::success())
    }

    async fn distinct(&self, field: &str, filter: Document) -> QueryResult<Vec<Bson>> {
        let mut values: Vec<Bson> = Vec::new();
        for document in self.select(&FindQuery::new(filter), false) {
            let candidates = match get_path(&document, field) {
                Some(Bson::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => continue,
            };
            for value in candidates {
                if !values.iter().any(|v| bson_eq(v, &value)) {
                    values.push(value);
                }
            }
        }
        Ok(values)
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> QueryResult<CommandResult> {
        if self.is_failing() {
            return Ok(CommandResult::failed("aggregate rejected"));
        }
        let mut rows = self.documents();
        for stage in &pipeline {
            rows = match run_stage(rows, stage) {
                Ok(rows) => rows,
                Err(message) => return Ok(CommandResult::failed(message)),
            };
        }
        Ok(CommandResult::success().with_result(rows))
    }

    async fn group(&self, _command: GroupCommand) -> QueryResult<CommandResult> {
        Ok(CommandResult::failed(
            "group command requires a JavaScript engine",
        ))
    }
}

// ==================== Filters ====================

/// Whether a document satisfies a filter document.
pub fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => sub_filters(condition).all(|f| matches_filter(document, f)),
        "$or" => sub_filters(condition).any(|f| matches_filter(document, f)),
        "$nor" => !sub_filters(condition).any(|f| matches_filter(document, f)),
        field => matches_value(get_path(document, field), condition),
    })
}

fn sub_filters(condition: &Bson) -> impl Iterator<Item = &Document> {
    condition
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Bson::as_document)
}

fn is_operator_document(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'))
}

fn matches_value(actual: Option<&Bson>, condition: &Bson) -> bool {
    match condition {
        Bson::Document(ops) if is_operator_document(ops) => {
            ops.iter().all(|(op, operand)| apply_operator(actual, op, operand, ops))
        }
        Bson::RegularExpression(regex) => {
            regex_matches(actual, &regex.pattern, &regex.options)
        }
        expected => equals(actual, expected),
    }
}

fn equals(actual: Option<&Bson>, expected: &Bson) -> bool {
    match (actual, expected) {
        (None, Bson::Null) => true,
        (None, _) => false,
        (Some(Bson::Array(items)), expected) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| bson_eq(item, expected))
        }
        (Some(value), expected) => bson_eq(value, expected),
    }
}

fn apply_operator(actual: Option<&Bson>, op: &str, operand: &Bson, ops: &Document) -> bool {
    match op {
        "$eq" => equals(actual, operand),
        "$ne" => !equals(actual, operand),
        "$gt" => compare_with(actual, operand, |o| o == Ordering::Greater),
        "$gte" => compare_with(actual, operand, |o| o != Ordering::Less),
        "$lt" => compare_with(actual, operand, |o| o == Ordering::Less),
        "$lte" => compare_with(actual, operand, |o| o != Ordering::Greater),
        "$in" => operand
            .as_array()
            .is_some_and(|set| set.iter().any(|v| equals(actual, v))),
        "$nin" => operand
            .as_array()
            .is_some_and(|set| !set.iter().any(|v| equals(actual, v))),
        "$all" => match (actual, operand.as_array()) {
            (Some(Bson::Array(items)), Some(wanted)) => wanted
                .iter()
                .all(|w| items.iter().any(|item| bson_eq(item, w))),
            _ => false,
        },
        "$exists" => actual.is_some() == truthy(operand),
        "$size" => match actual {
            Some(Bson::Array(items)) => as_f64(operand) == Some(items.len() as f64),
            _ => false,
        },
        "$mod" => {
            let (Some(value), Some(args)) = (actual.and_then(as_f64), operand.as_array()) else {
                return false;
            };
            match (args.first().and_then(as_f64), args.get(1).and_then(as_f64)) {
                (Some(divisor), Some(remainder)) if divisor != 0.0 => {
                    (value.trunc() % divisor) == remainder
                }
                _ => false,
            }
        }
        "$type" => actual.is_some_and(|value| type_matches(value, operand)),
        "$regex" => {
            let options = ops.get_str("$options").unwrap_or("");
            match operand {
                Bson::String(pattern) => regex_matches(actual, pattern, options),
                Bson::RegularExpression(regex) => {
                    regex_matches(actual, &regex.pattern, &regex.options)
                }
                _ => false,
            }
        }
        "$options" => true,
        _ => false,
    }
}

fn compare_with(actual: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match actual {
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| comparable(item, operand) && accept(compare_bson(item, operand))),
        Some(value) => comparable(value, operand) && accept(compare_bson(value, operand)),
        None => false,
    }
}

// Range operators only compare values of the same type class.
fn comparable(a: &Bson, b: &Bson) -> bool {
    (as_f64(a).is_some() && as_f64(b).is_some()) || type_rank(a) == type_rank(b)
}

fn regex_matches(actual: Option<&Bson>, pattern: &str, options: &str) -> bool {
    let Ok(regex) = regex_lite::RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
    else {
        return false;
    };
    match actual {
        Some(Bson::String(s)) => regex.is_match(s),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(s) if regex.is_match(s))),
        _ => false,
    }
}

fn type_matches(value: &Bson, operand: &Bson) -> bool {
    let alias = match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::Decimal128(_) => "decimal",
        _ => "other",
    };
    match operand {
        Bson::String(name) => name == alias || (name == "number" && as_f64(value).is_some()),
        number => as_f64(number).is_some_and(|n| n as u8 == value.element_type() as u8),
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => as_f64(other).is_none_or(|n| n != 0.0),
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Resolve a dotted path inside a document.
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut current = document;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        let value = current.get(part)?;
        if parts.peek().is_none() {
            return Some(value);
        }
        current = value.as_document()?;
    }
    None
}

/// Total order used for sorting and range comparisons.
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.total_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 255,
        _ => 12,
    }
}

/// Sort documents in place by a `{field: 1 | -1}` document.
pub fn sort_documents(documents: &mut [Document], sort: &Document) {
    documents.sort_by(|a, b| {
        for (field, direction) in sort {
            let ordering = match (get_path(a, field), get_path(b, field)) {
                (Some(x), Some(y)) => compare_bson(x, y),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                let descending = as_f64(direction).is_some_and(|d| d < 0.0);
                return if descending { ordering.reverse() } else { ordering };
            }
        }
        Ordering::Equal
    });
}

/// Apply skip and limit to an already ordered list.
pub fn apply_window(documents: Vec<Document>, skip: Option<u64>, limit: Option<i64>) -> Vec<Document> {
    let skipped = documents.into_iter().skip(skip.unwrap_or(0) as usize);
    match limit {
        Some(limit) if limit != 0 => skipped.take(limit.unsigned_abs() as usize).collect(),
        _ => skipped.collect(),
    }
}

fn project(document: &Document, projection: &Document) -> Document {
    let include_id = projection.get("_id").is_none_or(truthy);
    let included: Vec<&str> = projection
        .iter()
        .filter(|(k, v)| k.as_str() != "_id" && truthy(v))
        .map(|(k, _)| k.as_str())
        .collect();

    if included.is_empty() {
        let mut out = document.clone();
        for (field, flag) in projection {
            if !truthy(flag) {
                out.remove(field);
            }
        }
        return out;
    }

    let mut out = Document::new();
    if include_id {
        if let Some(id) = document.get("_id") {
            out.insert("_id", id.clone());
        }
    }
    for field in included {
        if let Some(value) = document.get(field) {
            out.insert(field, value.clone());
        }
    }
    out
}

// ==================== Updates ====================

fn apply_update(document: &Document, update: &Document) -> Result<Document, String> {
    if !update.keys().any(|k| k.starts_with('$')) {
        let mut replacement = update.clone();
        if let Some(id) = document.get("_id") {
            replacement.insert("_id", id.clone());
        }
        return Ok(replacement);
    }

    let mut next = document.clone();
    for (op, fields) in update {
        let fields = fields
            .as_document()
            .ok_or_else(|| format!("{} requires a document", op))?;
        for (field, value) in fields {
            match op.as_str() {
                "$set" => set_path(&mut next, field, value.clone()),
                "$unset" => {
                    remove_path(&mut next, field);
                }
                "$inc" => {
                    let current = get_path(&next, field).cloned().unwrap_or(Bson::Int32(0));
                    let sum = add_numbers(&current, value)
                        .ok_or_else(|| format!("cannot $inc field {} by that amount", field))?;
                    set_path(&mut next, field, sum);
                }
                "$rename" => {
                    let target = value
                        .as_str()
                        .ok_or_else(|| "$rename target must be a string".to_string())?;
                    if let Some(moved) = remove_path(&mut next, field) {
                        set_path(&mut next, target, moved);
                    }
                }
                "$push" | "$addToSet" => {
                    let mut items = array_at(&next, field)?;
                    let additions = match value {
                        Bson::Document(d) if d.contains_key("$each") => {
                            d.get_array("$each").map_err(|e| e.to_string())?.clone()
                        }
                        other => vec![other.clone()],
                    };
                    for addition in additions {
                        if op == "$push" || !items.iter().any(|i| bson_eq(i, &addition)) {
                            items.push(addition);
                        }
                    }
                    set_path(&mut next, field, Bson::Array(items));
                }
                "$pull" => {
                    let mut items = array_at(&next, field)?;
                    items.retain(|item| !matches_value(Some(item), value));
                    set_path(&mut next, field, Bson::Array(items));
                }
                "$pullAll" => {
                    let mut items = array_at(&next, field)?;
                    let removals = value.as_array().cloned().unwrap_or_default();
                    items.retain(|item| !removals.iter().any(|r| bson_eq(item, r)));
                    set_path(&mut next, field, Bson::Array(items));
                }
                "$pop" => {
                    let mut items = array_at(&next, field)?;
                    if as_f64(value).is_some_and(|d| d < 0.0) {
                        if !items.is_empty() {
                            items.remove(0);
                        }
                    } else {
                        items.pop();
                    }
                    set_path(&mut next, field, Bson::Array(items));
                }
                other => return Err(format!("unsupported update operator {}", other)),
            }
        }
    }
    Ok(next)
}

fn array_at(document: &Document, field: &str) -> Result<Vec<Bson>, String> {
    match get_path(document, field) {
        None | Some(Bson::Null) => Ok(Vec::new()),
        Some(Bson::Array(items)) => Ok(items.clone()),
        Some(_) => Err(format!("field {} is not an array", field)),
    }
}

fn add_numbers(a: &Bson, b: &Bson) -> Option<Bson> {
    Some(match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => x
            .checked_add(*y)
            .map_or(Bson::Int64(i64::from(*x) + i64::from(*y)), Bson::Int32),
        (Bson::Int32(x), Bson::Int64(y)) => Bson::Int64(i64::from(*x).checked_add(*y)?),
        (Bson::Int64(x), Bson::Int32(y)) => Bson::Int64(x.checked_add(i64::from(*y))?),
        (Bson::Int64(x), Bson::Int64(y)) => Bson::Int64(x.checked_add(*y)?),
        (x, y) => Bson::Double(as_f64(x)? + as_f64(y)?),
    })
}

fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                set_path(child, rest, value);
            }
        }
    }
}

fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head) {
            Some(Bson::Document(child)) => remove_path(child, rest),
            _ => None,
        },
    }
}

// ==================== Aggregation ====================

fn run_stage(rows: Vec<Document>, stage: &Document) -> Result<Vec<Document>, String> {
    let (name, spec) = stage
        .iter()
        .next()
        .ok_or_else(|| "empty pipeline stage".to_string())?;
    match name.as_str() {
        "$match" => {
            let filter = spec.as_document().cloned().unwrap_or_default();
            Ok(rows.into_iter().filter(|d| matches_filter(d, &filter)).collect())
        }
        "$sort" => {
            let mut rows = rows;
            if let Some(sort) = spec.as_document() {
                sort_documents(&mut rows, sort);
            }
            Ok(rows)
        }
        "$skip" => Ok(apply_window(rows, as_f64(spec).map(|n| n as u64), None)),
        "$limit" => Ok(apply_window(rows, None, as_f64(spec).map(|n| n as i64))),
        "$group" => group_rows(rows, spec.as_document().cloned().unwrap_or_default()),
        other => Err(format!("unsupported pipeline stage {}", other)),
    }
}

fn group_rows(rows: Vec<Document>, spec: Document) -> Result<Vec<Document>, String> {
    let key_spec = spec.get("_id").cloned().unwrap_or(Bson::Null);
    let mut groups: Vec<(Bson, Vec<Document>)> = Vec::new();

    for row in rows {
        let key = evaluate(&row, &key_spec);
        match groups.iter_mut().find(|(k, _)| bson_eq(k, &key)) {
            Some((_, members)) => members.push(row),
            None => groups.push((key, vec![row])),
        }
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let mut result = doc! { "_id": key };
        for (name, accumulator) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
            let (op, expr) = accumulator
                .as_document()
                .and_then(|d| d.iter().next())
                .ok_or_else(|| format!("invalid accumulator for {}", name))?;
            let values: Vec<Bson> = members.iter().map(|m| evaluate(m, expr)).collect();
            let numbers: Vec<f64> = values.iter().filter_map(as_f64).collect();
            let value = match op.as_str() {
                "$sum" => numeric(numbers.iter().sum()),
                "$avg" if numbers.is_empty() => Bson::Null,
                "$avg" => Bson::Double(numbers.iter().sum::<f64>() / numbers.len() as f64),
                "$min" => extreme(values, Ordering::Less),
                "$max" => extreme(values, Ordering::Greater),
                other => return Err(format!("unsupported accumulator {}", other)),
            };
            result.insert(name.clone(), value);
        }
        out.push(result);
    }
    Ok(out)
}

fn evaluate(row: &Document, expr: &Bson) -> Bson {
    match expr {
        Bson::String(path) if path.starts_with('$') => {
            get_path(row, &path[1..]).cloned().unwrap_or(Bson::Null)
        }
        other => other.clone(),
    }
}

fn numeric(n: f64) -> Bson {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Bson::Int64(n as i64)
    } else {
        Bson::Double(n)
    }
}

fn extreme(values: Vec<Bson>, wanted: Ordering) -> Bson {
    values
        .into_iter()
        .filter(|v| !matches!(v, Bson::Null))
        .reduce(|best, v| if compare_bson(&v, &best) == wanted { v } else { best })
        .unwrap_or(Bson::Null)
}
