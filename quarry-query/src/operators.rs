//! Constructors for the condition values the `where_*` families emit.
//!
//! Each function returns the [`WhereValue`] placed under a field name:
//!
//! ```rust
//! use bson::{doc, Bson};
//! use quarry_query::operators;
//!
//! assert_eq!(
//!     operators::between(18, 65).to_bson(),
//!     Bson::Document(doc! { "$gt": 18, "$lt": 65 })
//! );
//! ```

use bson::{Bson, Document, doc};

use crate::clause::WhereValue;

fn op(name: &str, value: impl Into<Bson>) -> WhereValue {
    let mut doc = Document::new();
    doc.insert(name, value.into());
    WhereValue::Operator(doc)
}

fn list<V: Into<Bson>>(values: impl IntoIterator<Item = V>) -> Bson {
    Bson::Array(values.into_iter().map(Into::into).collect())
}

/// `{"$all": [..]}`
pub fn all<V: Into<Bson>>(values: impl IntoIterator<Item = V>) -> WhereValue {
    op("$all", list(values))
}

/// `{"$lt": value}`
pub fn lt(value: impl Into<Bson>) -> WhereValue {
    op("$lt", value)
}

/// `{"$lte": value}`
pub fn lte(value: impl Into<Bson>) -> WhereValue {
    op("$lte", value)
}

/// `{"$gt": value}`
pub fn gt(value: impl Into<Bson>) -> WhereValue {
    op("$gt", value)
}

/// `{"$gte": value}`
pub fn gte(value: impl Into<Bson>) -> WhereValue {
    op("$gte", value)
}

/// `{"$gt": min, "$lt": max}`, exclusive on both ends.
pub fn between(min: impl Into<Bson>, max: impl Into<Bson>) -> WhereValue {
    WhereValue::Operator(doc! { "$gt": min.into(), "$lt": max.into() })
}

/// `{"$in": [..]}`
pub fn in_list<V: Into<Bson>>(values: impl IntoIterator<Item = V>) -> WhereValue {
    op("$in", list(values))
}

/// `{"$nin": [..]}`
pub fn not_in<V: Into<Bson>>(values: impl IntoIterator<Item = V>) -> WhereValue {
    op("$nin", list(values))
}

/// `{"$ne": value}`
pub fn ne(value: impl Into<Bson>) -> WhereValue {
    op("$ne", value)
}

/// `{"$exists": exists}`
pub fn exists(exists: bool) -> WhereValue {
    op("$exists", exists)
}

/// `{"$type": type}`, as a BSON type number or alias.
pub fn type_of(bson_type: impl Into<Bson>) -> WhereValue {
    op("$type", bson_type)
}

/// `{"$mod": [divisor, remainder]}`
pub fn modulo(divisor: i64, remainder: i64) -> WhereValue {
    op("$mod", vec![Bson::Int64(divisor), Bson::Int64(remainder)])
}

/// A regular expression.
///
/// `/pattern/flags` literals are split into pattern and options; anything
/// else is used as the pattern with no options.
pub fn regex(expression: &str) -> WhereValue {
    if let Some(body) = expression.strip_prefix('/') {
        if let Some(end) = body.rfind('/') {
            return WhereValue::regex(&body[..end], &body[end + 1..]);
        }
    }
    WhereValue::regex(expression, "")
}

/// A regular expression matching `value` anywhere, with the given flags.
///
/// The value is used as a pattern as is.
pub fn like(value: &str, flags: &str) -> WhereValue {
    WhereValue::regex(value, flags)
}

/// `{"$size": n}`
pub fn size(n: i64) -> WhereValue {
    op("$size", n)
}

/// `{"$near": ..}` with legacy coordinates or a GeoJSON geometry.
pub fn near(coords: impl Into<Bson>, geometry: Option<&str>, max_distance: Option<f64>) -> WhereValue {
    proximity("$near", coords.into(), geometry, max_distance)
}

/// `{"$nearSphere": ..}` with legacy coordinates or a GeoJSON geometry.
pub fn near_sphere(
    coords: impl Into<Bson>,
    geometry: Option<&str>,
    max_distance: Option<f64>,
) -> WhereValue {
    proximity("$nearSphere", coords.into(), geometry, max_distance)
}

// With a geometry `$maxDistance` sits next to `$geometry`, where the server
// reads it; with legacy pairs it is a sibling of the operator.
fn proximity(
    operator: &str,
    coords: Bson,
    geometry: Option<&str>,
    max_distance: Option<f64>,
) -> WhereValue {
    let mut value = Document::new();
    match geometry {
        None => {
            value.insert(operator, coords);
            if let Some(distance) = max_distance {
                value.insert("$maxDistance", distance);
            }
        }
        Some(kind) => {
            let mut inner = doc! { "$geometry": { "type": kind, "coordinates": coords } };
            if let Some(distance) = max_distance {
                inner.insert("$maxDistance", distance);
            }
            value.insert(operator, inner);
        }
    }
    WhereValue::Operator(value)
}

/// `{"$geoWithin": ..}`
///
/// A shape operator such as `$box` or `$centerSphere` is used directly, any
/// other shape names a GeoJSON geometry type.
pub fn geo_within(shape: &str, coords: impl Into<Bson>) -> WhereValue {
    let coords = coords.into();
    let inner = if shape.starts_with('$') {
        let mut inner = Document::new();
        inner.insert(shape, coords);
        inner
    } else {
        doc! { "$geometry": { "type": shape, "coordinates": coords } }
    };
    op("$geoWithin", inner)
}

/// `{"$geoIntersects": {"$geometry": {type, coordinates}}}`
pub fn geo_intersects(geometry: &str, coords: impl Into<Bson>) -> WhereValue {
    op(
        "$geoIntersects",
        doc! { "$geometry": { "type": geometry, "coordinates": coords.into() } },
    )
}

/// Equality with `null`; also matches documents missing the field.
pub fn null() -> WhereValue {
    WhereValue::Scalar(Bson::Null)
}

/// `{"$ne": null}`
pub fn not_null() -> WhereValue {
    op("$ne", Bson::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::Regex;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_comparison_values() {
        assert_eq!(lt(5).to_bson(), Bson::Document(doc! { "$lt": 5 }));
        assert_eq!(in_list([1, 2]).to_bson(), Bson::Document(doc! { "$in": [1, 2] }));
        assert_eq!(not_null().to_bson(), Bson::Document(doc! { "$ne": Bson::Null }));
        assert_eq!(
            modulo(10, 1).to_bson(),
            Bson::Document(doc! { "$mod": [10_i64, 1_i64] })
        );
    }

    #[test]
    fn test_regex_literal_is_split() {
        assert_eq!(
            regex("/^jo/mi").to_bson(),
            Bson::RegularExpression(Regex {
                pattern: "^jo".into(),
                options: "im".into(),
            })
        );
        assert_eq!(
            regex("plain").to_bson(),
            Bson::RegularExpression(Regex {
                pattern: "plain".into(),
                options: String::new(),
            })
        );
    }

    #[test]
    fn test_near_legacy_and_geometry() {
        assert_eq!(
            near(vec![1.0, 2.0], None, Some(5.0)).to_bson(),
            Bson::Document(doc! { "$near": [1.0, 2.0], "$maxDistance": 5.0 })
        );
        assert_eq!(
            near_sphere(vec![1.0, 2.0], Some("Point"), Some(5.0)).to_bson(),
            Bson::Document(doc! {
                "$nearSphere": {
                    "$geometry": { "type": "Point", "coordinates": [1.0, 2.0] },
                    "$maxDistance": 5.0,
                }
            })
        );
    }

    #[test]
    fn test_geo_within_shapes() {
        assert_eq!(
            geo_within("$box", vec![vec![0.0, 0.0], vec![1.0, 1.0]]).to_bson(),
            Bson::Document(doc! { "$geoWithin": { "$box": [[0.0, 0.0], [1.0, 1.0]] } })
        );
        assert_eq!(
            geo_intersects("Point", vec![1.0, 2.0]).to_bson(),
            Bson::Document(doc! {
                "$geoIntersects": { "$geometry": { "type": "Point", "coordinates": [1.0, 2.0] } }
            })
        );
    }
}
