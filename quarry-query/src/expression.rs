//! Clause accumulation and compilation into MongoDB filter documents.
//!
//! An [`Expression`] is the ordered clause list owned by a builder. Clauses
//! are tagged with a [`Logic`]; compilation groups them into `$and`, `$or`
//! and `$nor` buckets in insertion order:
//!
//! ```rust
//! use bson::{doc, Bson};
//! use quarry_query::{Expression, Logic};
//!
//! let mut expr = Expression::new();
//! expr.push_basic("a", Bson::Int32(1).into(), Logic::First);
//! expr.push_basic("b", Bson::Int32(2).into(), Logic::Or);
//!
//! assert_eq!(expr.compile().unwrap(), doc! { "$or": [{ "a": 1 }, { "b": 2 }] });
//! ```
//!
//! The clause tagged [`Logic::First`] is placed at the head of whichever single
//! bucket the other clauses populate. When they populate more than one bucket
//! there is no deterministic position for it and compilation fails with
//! [`QueryError::ambiguous_root`].

use bson::{Bson, Document};
use indexmap::IndexMap;

use crate::clause::{Clause, Logic, WhereValue};
use crate::error::{QueryError, QueryResult};

/// An ordered list of clauses with first-clause tracking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expression {
    clauses: Vec<Clause>,
    first_taken: bool,
}

impl Expression {
    /// Create an empty expression.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a basic clause.
    pub fn push_basic(&mut self, field: impl Into<String>, value: WhereValue, logic: Logic) {
        let logic = self.resolve(logic);
        self.clauses.push(Clause::Basic {
            field: field.into(),
            value,
            logic,
        });
    }

    /// Append a nested group. Empty groups are ignored.
    pub fn push_nested(&mut self, expression: Expression, logic: Logic) {
        if expression.is_empty() {
            return;
        }
        let logic = self.resolve(logic);
        self.clauses.push(Clause::Nested { expression, logic });
    }

    // Only the first default-logic clause keeps the First tag.
    fn resolve(&mut self, logic: Logic) -> Logic {
        match logic {
            Logic::First if !self.first_taken => {
                self.first_taken = true;
                Logic::First
            }
            Logic::First => Logic::And,
            explicit => explicit,
        }
    }

    /// The accumulated clauses in insertion order.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Number of clauses.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Whether no clause has been added.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Remove the clause at `index`, if any.
    pub fn remove(&mut self, index: usize) -> Option<Clause> {
        (index < self.clauses.len()).then(|| self.clauses.remove(index))
    }

    /// Keep only the clauses matching the predicate.
    pub fn retain(&mut self, f: impl FnMut(&Clause) -> bool) {
        self.clauses.retain(f);
    }

    /// Remove every clause and reset first-clause tracking.
    pub fn clear(&mut self) {
        self.clauses.clear();
        self.first_taken = false;
    }

    /// Take the clause list, leaving this expression empty.
    pub fn take(&mut self) -> Vec<Clause> {
        self.first_taken = false;
        std::mem::take(&mut self.clauses)
    }

    /// Compile into a filter document.
    ///
    /// An empty expression compiles to the empty document.
    pub fn compile(&self) -> QueryResult<Document> {
        let mut first: Option<Document> = None;
        let mut buckets: IndexMap<&'static str, Vec<Bson>> = IndexMap::new();

        for clause in &self.clauses {
            let compiled = compile_clause(clause)?;
            match clause.logic().operator() {
                None => first = Some(compiled),
                Some(op) => buckets.entry(op).or_default().push(Bson::Document(compiled)),
            }
        }

        if let Some(first) = first {
            if buckets.len() > 1 {
                return Err(QueryError::ambiguous_root());
            }
            let op = buckets.keys().next().copied().unwrap_or("$and");
            buckets.entry(op).or_default().insert(0, Bson::Document(first));
        }

        Ok(buckets
            .into_iter()
            .map(|(op, list)| (op.to_string(), Bson::Array(list)))
            .collect())
    }
}

fn compile_clause(clause: &Clause) -> QueryResult<Document> {
    match clause {
        Clause::Basic { field, value, .. } => {
            let mut doc = Document::new();
            doc.insert(field.clone(), value.to_bson());
            Ok(doc)
        }
        Clause::Nested { expression, .. } => expression.compile(),
    }
}
