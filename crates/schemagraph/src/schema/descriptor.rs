//! Storable schema descriptors.
//!
//! A [`Descriptor`] is the serialized form of a [`Schema`](crate::schema::Schema).
//! It is a recursive tagged union over descriptor kinds, with the three
//! annotations (`optional`, `nullable`, `default`) stored flat on every node
//! instead of as wrapper nodes:
//!
//! ```json
//! {"type": "object", "shape": {
//!     "title": {"type": "string"},
//!     "completed": {"type": "boolean", "default": false}
//! }}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;
use crate::model::Value;

/// The kind of a descriptor node and its kind-specific children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DescriptorKind {
    String,
    Number,
    Boolean,
    Date,
    Bigint,
    Array {
        element: Box<Descriptor>,
    },
    Object {
        shape: BTreeMap<String, Descriptor>,
    },
    Enum {
        values: Vec<String>,
    },
    Literal {
        value: Value,
    },
    Union {
        options: Vec<Descriptor>,
    },
    Intersection {
        left: Box<Descriptor>,
        right: Box<Descriptor>,
    },
    Tuple {
        items: Vec<Descriptor>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rest: Option<Box<Descriptor>>,
    },
    Record {
        key: Box<Descriptor>,
        value: Box<Descriptor>,
    },
    Map {
        key: Box<Descriptor>,
        value: Box<Descriptor>,
    },
    Set {
        value: Box<Descriptor>,
    },
    /// Opaque; accepts anything.
    Function,
    /// Opaque; accepts anything.
    Lazy,
    Promise {
        inner: Box<Descriptor>,
    },
    Unknown,
}

impl DescriptorKind {
    /// Returns the `type` tag of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            DescriptorKind::String => "string",
            DescriptorKind::Number => "number",
            DescriptorKind::Boolean => "boolean",
            DescriptorKind::Date => "date",
            DescriptorKind::Bigint => "bigint",
            DescriptorKind::Array { .. } => "array",
            DescriptorKind::Object { .. } => "object",
            DescriptorKind::Enum { .. } => "enum",
            DescriptorKind::Literal { .. } => "literal",
            DescriptorKind::Union { .. } => "union",
            DescriptorKind::Intersection { .. } => "intersection",
            DescriptorKind::Tuple { .. } => "tuple",
            DescriptorKind::Record { .. } => "record",
            DescriptorKind::Map { .. } => "map",
            DescriptorKind::Set { .. } => "set",
            DescriptorKind::Function => "function",
            DescriptorKind::Lazy => "lazy",
            DescriptorKind::Promise { .. } => "promise",
            DescriptorKind::Unknown => "unknown",
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A serializable type description node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(flatten)]
    pub kind: DescriptorKind,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,
    /// A `null` default is indistinguishable from no default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Descriptor {
    /// Creates an unannotated descriptor of the given kind.
    pub fn new(kind: DescriptorKind) -> Self {
        Self {
            kind,
            optional: false,
            nullable: false,
            default: None,
        }
    }

    /// Returns true if a field with this descriptor must be present.
    pub fn is_required(&self) -> bool {
        !self.optional
    }

    /// Returns true if this node carries a non-null default.
    pub fn has_default(&self) -> bool {
        self.default.as_ref().is_some_and(|v| !v.is_null())
    }

    /// Returns the field map if this is an `object` descriptor.
    pub fn shape(&self) -> Option<&BTreeMap<String, Descriptor>> {
        match &self.kind {
            DescriptorKind::Object { shape } => Some(shape),
            _ => None,
        }
    }

    /// Checks that this descriptor can be an element or link type schema.
    pub fn require_object(&self) -> Result<(), DescriptorError> {
        let found = match (&self.kind, self.optional, self.nullable) {
            (DescriptorKind::Object { .. }, false, false) => return Ok(()),
            (DescriptorKind::Object { .. }, true, _) => "optional object".to_string(),
            (DescriptorKind::Object { .. }, _, true) => "nullable object".to_string(),
            (kind, _, _) => kind.name().to_string(),
        };
        Err(DescriptorError::NotObject { found })
    }

    /// Parses a descriptor from its stored JSON text.
    pub fn from_json(s: &str) -> Result<Self, DescriptorError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Renders the descriptor as its stored JSON value.
    pub fn to_json_value(&self) -> Result<serde_json::Value, DescriptorError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Renders the descriptor as compact JSON text.
    pub fn to_json(&self) -> Result<String, DescriptorError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<DescriptorKind> for Descriptor {
    fn from(kind: DescriptorKind) -> Self {
        Descriptor::new(kind)
    }
}
