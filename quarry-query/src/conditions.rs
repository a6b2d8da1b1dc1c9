//! The condition-building surface shared by every builder.
//!
//! [`Conditions`] has one primitive, [`Conditions::push_where`]. Everything
//! else is sugar that builds a [`WhereValue`] and delegates to it. Each sugar
//! family comes in four flavours: `where_x` uses the default logic, and
//! `and_where_x`, `or_where_x` and `nor_where_x` pick the bucket explicitly.
//!
//! ```rust,ignore
//! users
//!     .where_gt("age", 18)
//!     .or_where_like("name", "^jo")
//!     .or_where_group(|q| {
//!         q.where_in("role", ["admin", "owner"]).where_exists("email", true);
//!     });
//! ```

use bson::Bson;

use crate::builder::QueryBuilder;
use crate::clause::{Logic, WhereValue};
use crate::expression::Expression;
use crate::operators;

macro_rules! condition_family {
    ($(
        $(#[$meta:meta])*
        $base:ident, $and:ident, $or:ident, $nor:ident => ($($arg:ident : $ty:ty),*) => $value:expr;
    )*) => {
        $(
            $(#[$meta])*
            fn $base(&mut self, field: impl Into<String>, $($arg: $ty),*) -> &mut Self {
                self.where_with(field, $value, Logic::First)
            }

            #[doc = concat!("[`Conditions::", stringify!($base), "`] joined with `$and`.")]
            fn $and(&mut self, field: impl Into<String>, $($arg: $ty),*) -> &mut Self {
                self.where_with(field, $value, Logic::And)
            }

            #[doc = concat!("[`Conditions::", stringify!($base), "`] joined with `$or`.")]
            fn $or(&mut self, field: impl Into<String>, $($arg: $ty),*) -> &mut Self {
                self.where_with(field, $value, Logic::Or)
            }

            #[doc = concat!("[`Conditions::", stringify!($base), "`] joined with `$nor`.")]
            fn $nor(&mut self, field: impl Into<String>, $($arg: $ty),*) -> &mut Self {
                self.where_with(field, $value, Logic::Nor)
            }
        )*
    };
}

/// Fluent filter construction.
pub trait Conditions {
    /// Append a basic clause.
    fn push_where(&mut self, field: String, value: WhereValue, logic: Logic) -> &mut Self;

    /// Append a nested group; empty groups are ignored.
    fn push_nested(&mut self, expression: Expression, logic: Logic) -> &mut Self;

    /// A fresh builder for collecting the clauses of a nested group.
    fn nested_builder(&self) -> QueryBuilder;

    /// Append a clause with an explicit value and logic.
    fn where_with(
        &mut self,
        field: impl Into<String>,
        value: impl Into<WhereValue>,
        logic: Logic,
    ) -> &mut Self {
        self.push_where(field.into(), value.into(), logic)
    }

    /// Equality, or an operator document when every key starts with `$`.
    fn r#where(&mut self, field: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        self.where_with(field, value.into(), Logic::First)
    }

    /// [`Conditions::where`] joined with `$and`.
    fn and_where(&mut self, field: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        self.where_with(field, value.into(), Logic::And)
    }

    /// [`Conditions::where`] joined with `$or`.
    fn or_where(&mut self, field: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        self.where_with(field, value.into(), Logic::Or)
    }

    /// [`Conditions::where`] joined with `$nor`.
    fn nor_where(&mut self, field: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        self.where_with(field, value.into(), Logic::Nor)
    }

    /// Collect the clauses added by `f` into one nested group.
    fn where_nested<F>(&mut self, f: F, logic: Logic) -> &mut Self
    where
        F: FnOnce(&mut QueryBuilder),
    {
        let mut child = self.nested_builder();
        f(&mut child);
        let expression = std::mem::take(child.wheres_mut());
        self.push_nested(expression, logic)
    }

    /// A nested group with the default logic.
    fn where_group<F: FnOnce(&mut QueryBuilder)>(&mut self, f: F) -> &mut Self {
        self.where_nested(f, Logic::First)
    }

    /// A nested group joined with `$and`.
    fn and_where_group<F: FnOnce(&mut QueryBuilder)>(&mut self, f: F) -> &mut Self {
        self.where_nested(f, Logic::And)
    }

    /// A nested group joined with `$or`.
    fn or_where_group<F: FnOnce(&mut QueryBuilder)>(&mut self, f: F) -> &mut Self {
        self.where_nested(f, Logic::Or)
    }

    /// A nested group joined with `$nor`.
    fn nor_where_group<F: FnOnce(&mut QueryBuilder)>(&mut self, f: F) -> &mut Self {
        self.where_nested(f, Logic::Nor)
    }

    condition_family! {
        /// The array field contains every value.
        where_all, and_where_all, or_where_all, nor_where_all
            => (values: impl IntoIterator<Item = impl Into<Bson>>) => operators::all(values);
        /// `field < value`
        where_lt, and_where_lt, or_where_lt, nor_where_lt
            => (value: impl Into<Bson>) => operators::lt(value);
        /// `field <= value`
        where_lte, and_where_lte, or_where_lte, nor_where_lte
            => (value: impl Into<Bson>) => operators::lte(value);
        /// `field > value`
        where_gt, and_where_gt, or_where_gt, nor_where_gt
            => (value: impl Into<Bson>) => operators::gt(value);
        /// `field >= value`
        where_gte, and_where_gte, or_where_gte, nor_where_gte
            => (value: impl Into<Bson>) => operators::gte(value);
        /// `min < field < max`
        where_between, and_where_between, or_where_between, nor_where_between
            => (min: impl Into<Bson>, max: impl Into<Bson>) => operators::between(min, max);
        /// The field equals one of the values.
        where_in, and_where_in, or_where_in, nor_where_in
            => (values: impl IntoIterator<Item = impl Into<Bson>>) => operators::in_list(values);
        /// The field equals none of the values.
        where_nin, and_where_nin, or_where_nin, nor_where_nin
            => (values: impl IntoIterator<Item = impl Into<Bson>>) => operators::not_in(values);
        /// `field != value`
        where_ne, and_where_ne, or_where_ne, nor_where_ne
            => (value: impl Into<Bson>) => operators::ne(value);
        /// The field is present (or absent).
        where_exists, and_where_exists, or_where_exists, nor_where_exists
            => (exists: bool) => operators::exists(exists);
        /// The field has the given BSON type.
        where_type, and_where_type, or_where_type, nor_where_type
            => (bson_type: impl Into<Bson>) => operators::type_of(bson_type);
        /// `field % divisor == remainder`
        where_mod, and_where_mod, or_where_mod, nor_where_mod
            => (divisor: i64, remainder: i64) => operators::modulo(divisor, remainder);
        /// Regular expression match; accepts `/pattern/flags` literals.
        where_regex, and_where_regex, or_where_regex, nor_where_regex
            => (expression: &str) => operators::regex(expression);
        /// Case-insensitive multi-line pattern match.
        where_like, and_where_like, or_where_like, nor_where_like
            => (value: &str) => operators::like(value, "im");
        /// Pattern match with explicit flags.
        where_like_flags, and_where_like_flags, or_where_like_flags, nor_where_like_flags
            => (value: &str, flags: &str) => operators::like(value, flags);
        /// The array field has exactly `n` elements.
        where_size, and_where_size, or_where_size, nor_where_size
            => (n: i64) => operators::size(n);
        /// Proximity to a point.
        where_near, and_where_near, or_where_near, nor_where_near
            => (coords: impl Into<Bson>, geometry: Option<&str>, max_distance: Option<f64>)
            => operators::near(coords, geometry, max_distance);
        /// Proximity to a point on a sphere.
        where_near_sphere, and_where_near_sphere, or_where_near_sphere, nor_where_near_sphere
            => (coords: impl Into<Bson>, geometry: Option<&str>, max_distance: Option<f64>)
            => operators::near_sphere(coords, geometry, max_distance);
        /// The geometry lies within a shape.
        where_geo_within, and_where_geo_within, or_where_geo_within, nor_where_geo_within
            => (shape: &str, coords: impl Into<Bson>) => operators::geo_within(shape, coords);
        /// The geometry intersects another.
        where_geo_intersects, and_where_geo_intersects, or_where_geo_intersects, nor_where_geo_intersects
            => (geometry: &str, coords: impl Into<Bson>) => operators::geo_intersects(geometry, coords);
        /// The field is null or missing.
        where_null, and_where_null, or_where_null, nor_where_null
            => () => operators::null();
        /// The field is present and not null.
        where_not_null, and_where_not_null, or_where_not_null, nor_where_not_null
            => () => operators::not_null();
    }
}
