//! In-code type descriptions.
//!
//! A [`Schema`] is a live validator tree. Annotations are wrapper nodes
//! (`Optional`, `Nullable`, `Default`) here, unlike the flat
//! [`Descriptor`](crate::schema::Descriptor) form.
//!
//! # Example
//!
//! ```rust
//! use schemagraph::schema::{boolean, object, string};
//!
//! let task = object([
//!     ("title", string()),
//!     ("completed", boolean().with_default(false)),
//!     ("notes", string().optional()),
//! ]);
//! ```

use std::collections::BTreeMap;

use crate::model::Value;

/// A recursive type description.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    String,
    Number,
    Boolean,
    /// RFC 3339 date or datetime string, normalized to UTC.
    Date,
    /// Integral number or a string of decimal digits.
    BigInt,
    Array(Box<Schema>),
    Object(BTreeMap<String, Schema>),
    Enum(Vec<String>),
    Literal(Value),
    Union(Vec<Schema>),
    Intersection(Box<Schema>, Box<Schema>),
    Tuple {
        items: Vec<Schema>,
        rest: Option<Box<Schema>>,
    },
    Record(Box<Schema>, Box<Schema>),
    /// Array of `[key, value]` pairs.
    Map(Box<Schema>, Box<Schema>),
    /// Array of distinct values.
    Set(Box<Schema>),
    Function,
    Lazy,
    /// Stored values are already resolved; validates against the inner schema.
    Promise(Box<Schema>),
    Unknown,

    Optional(Box<Schema>),
    Nullable(Box<Schema>),
    Default(Box<Schema>, Value),
}

impl Schema {
    /// Allows the value to be absent.
    pub fn optional(self) -> Schema {
        Schema::Optional(Box::new(self))
    }

    /// Allows the value to be `null`.
    pub fn nullable(self) -> Schema {
        Schema::Nullable(Box::new(self))
    }

    /// Substitutes `value` when the value is absent.
    pub fn with_default(self, value: impl Into<Value>) -> Schema {
        Schema::Default(Box::new(self), value.into())
    }

    /// Returns the object fields, looking through annotation wrappers.
    pub fn object_shape(&self) -> Option<&BTreeMap<String, Schema>> {
        match self {
            Schema::Object(shape) => Some(shape),
            Schema::Optional(inner) | Schema::Nullable(inner) | Schema::Default(inner, _) => {
                inner.object_shape()
            }
            _ => None,
        }
    }

    /// Returns the declared default, looking through `Optional`/`Nullable`.
    pub fn declared_default(&self) -> Option<&Value> {
        match self {
            Schema::Default(_, value) => Some(value),
            Schema::Optional(inner) | Schema::Nullable(inner) => inner.declared_default(),
            _ => None,
        }
    }

    /// Returns true for kinds that accept any value.
    pub fn is_permissive(&self) -> bool {
        matches!(self, Schema::Function | Schema::Lazy | Schema::Unknown)
    }
}

pub fn string() -> Schema {
    Schema::String
}

pub fn number() -> Schema {
    Schema::Number
}

pub fn boolean() -> Schema {
    Schema::Boolean
}

pub fn date() -> Schema {
    Schema::Date
}

pub fn bigint() -> Schema {
    Schema::BigInt
}

pub fn unknown() -> Schema {
    Schema::Unknown
}

pub fn function() -> Schema {
    Schema::Function
}

pub fn lazy() -> Schema {
    Schema::Lazy
}

pub fn array(element: Schema) -> Schema {
    Schema::Array(Box::new(element))
}

/// Builds an object schema from `(field, schema)` pairs.
pub fn object<K, I>(fields: I) -> Schema
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Schema)>,
{
    Schema::Object(fields.into_iter().map(|(k, s)| (k.into(), s)).collect())
}

pub fn enumeration<S, I>(values: I) -> Schema
where
    S: Into<String>,
    I: IntoIterator<Item = S>,
{
    Schema::Enum(values.into_iter().map(Into::into).collect())
}

pub fn literal(value: impl Into<Value>) -> Schema {
    Schema::Literal(value.into())
}

pub fn union(options: impl IntoIterator<Item = Schema>) -> Schema {
    Schema::Union(options.into_iter().collect())
}

pub fn intersection(left: Schema, right: Schema) -> Schema {
    Schema::Intersection(Box::new(left), Box::new(right))
}

pub fn tuple(items: impl IntoIterator<Item = Schema>) -> Schema {
    Schema::Tuple {
        items: items.into_iter().collect(),
        rest: None,
    }
}

/// A tuple whose extra trailing items must satisfy `rest`.
pub fn tuple_with_rest(items: impl IntoIterator<Item = Schema>, rest: Schema) -> Schema {
    Schema::Tuple {
        items: items.into_iter().collect(),
        rest: Some(Box::new(rest)),
    }
}

pub fn record(key: Schema, value: Schema) -> Schema {
    Schema::Record(Box::new(key), Box::new(value))
}

pub fn map(key: Schema, value: Schema) -> Schema {
    Schema::Map(Box::new(key), Box::new(value))
}

pub fn set(value: Schema) -> Schema {
    Schema::Set(Box::new(value))
}

pub fn promise(inner: Schema) -> Schema {
    Schema::Promise(Box::new(inner))
}
