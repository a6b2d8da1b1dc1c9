//! The clause model: one filter condition per [`Clause`].

use std::fmt;

use bson::{Bson, Document, Regex};

use crate::expression::Expression;

/// The logical operator a clause is joined with at its level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Logic {
    /// The default: the first clause of a builder keeps this tag and joins
    /// whichever bucket the remaining clauses use; later clauses become `And`.
    #[default]
    First,
    /// `$and`
    And,
    /// `$or`
    Or,
    /// `$nor`
    Nor,
}

impl Logic {
    /// The MongoDB operator for this logic, `None` for [`Logic::First`].
    pub fn operator(&self) -> Option<&'static str> {
        match self {
            Self::First => None,
            Self::And => Some("$and"),
            Self::Or => Some("$or"),
            Self::Nor => Some("$nor"),
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operator().unwrap_or("first"))
    }
}

/// The value side of a basic clause.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereValue {
    /// Plain equality value.
    Scalar(Bson),
    /// Operator document such as `{"$gt": 5}`.
    Operator(Document),
    /// Regular expression match.
    Regex(Regex),
}

impl WhereValue {
    /// Build a regex value; options are stored sorted as MongoDB expects.
    pub fn regex(pattern: impl Into<String>, options: impl AsRef<str>) -> Self {
        let mut flags: Vec<char> = options.as_ref().chars().collect();
        flags.sort_unstable();
        flags.dedup();
        Self::Regex(Regex {
            pattern: pattern.into(),
            options: flags.into_iter().collect(),
        })
    }

    /// Whether this is an equality match against `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Bson::Null))
    }

    /// Convert into the BSON value placed under the field name.
    pub fn to_bson(&self) -> Bson {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Operator(doc) => Bson::Document(doc.clone()),
            Self::Regex(regex) => Bson::RegularExpression(regex.clone()),
        }
    }
}

impl From<Bson> for WhereValue {
    fn from(value: Bson) -> Self {
        match value {
            Bson::RegularExpression(regex) => Self::Regex(regex),
            Bson::Document(doc) if !doc.is_empty() && doc.keys().all(|k| k.starts_with('$')) => {
                Self::Operator(doc)
            }
            other => Self::Scalar(other),
        }
    }
}

impl From<Document> for WhereValue {
    fn from(doc: Document) -> Self {
        Self::from(Bson::Document(doc))
    }
}

impl From<Regex> for WhereValue {
    fn from(regex: Regex) -> Self {
        Self::Regex(regex)
    }
}

/// A single filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// `{field: value}`
    Basic {
        field: String,
        value: WhereValue,
        logic: Logic,
    },
    /// A parenthesized group compiled from its own clause list.
    Nested { expression: Expression, logic: Logic },
}

impl Clause {
    /// The logic tag of this clause.
    pub fn logic(&self) -> Logic {
        match self {
            Self::Basic { logic, .. } | Self::Nested { logic, .. } => *logic,
        }
    }

    /// The field of a basic clause.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Basic { field, .. } => Some(field),
            Self::Nested { .. } => None,
        }
    }

    /// Whether this is `field = null` for the given field.
    pub fn is_null_check(&self, column: &str) -> bool {
        matches!(self, Self::Basic { field, value, .. } if field == column && value.is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_logic_operator() {
        assert_eq!(Logic::First.operator(), None);
        assert_eq!(Logic::And.operator(), Some("$and"));
        assert_eq!(Logic::Or.to_string(), "$or");
        assert_eq!(Logic::Nor.to_string(), "$nor");
    }

    #[test]
    fn test_where_value_classification() {
        assert!(matches!(
            WhereValue::from(Bson::Int32(5)),
            WhereValue::Scalar(Bson::Int32(5))
        ));
        assert!(matches!(
            WhereValue::from(doc! { "$gt": 5 }),
            WhereValue::Operator(_)
        ));
        // embedded documents are compared as values
        assert!(matches!(
            WhereValue::from(doc! { "city": "Oslo" }),
            WhereValue::Scalar(Bson::Document(_))
        ));
        assert!(matches!(
            WhereValue::from(Bson::RegularExpression(Regex {
                pattern: "^a".into(),
                options: String::new(),
            })),
            WhereValue::Regex(_)
        ));
    }

    #[test]
    fn test_regex_options_sorted() {
        let value = WhereValue::regex("john", "mi");
        assert_eq!(
            value.to_bson(),
            Bson::RegularExpression(Regex {
                pattern: "john".into(),
                options: "im".into(),
            })
        );
    }

    #[test]
    fn test_null_check() {
        let clause = Clause::Basic {
            field: "deleted_at".into(),
            value: WhereValue::Scalar(Bson::Null),
            logic: Logic::First,
        };
        assert!(clause.is_null_check("deleted_at"));
        assert!(!clause.is_null_check("updated_at"));
    }
}
