//! Conversion between [`Schema`] and [`Descriptor`].
//!
//! `serialize` recurses into children first, then flattens annotation
//! wrappers onto the serialized inner node. `deserialize` builds the base
//! schema and re-applies annotations in the order default, nullable,
//! optional. For every descriptor `d` produced by `serialize`,
//! `serialize(&deserialize(&d)) == d`.

use crate::schema::{Descriptor, DescriptorKind, Schema};

/// Converts a type description into its storable descriptor.
pub fn serialize(schema: &Schema) -> Descriptor {
    match schema {
        Schema::Optional(inner) => {
            let mut d = serialize(inner);
            d.optional = true;
            d
        }
        Schema::Nullable(inner) => {
            let mut d = serialize(inner);
            d.nullable = true;
            d
        }
        Schema::Default(inner, value) => {
            let mut d = serialize(inner);
            if !value.is_null() {
                d.default = Some(value.clone());
            }
            d
        }
        base => Descriptor::new(serialize_kind(base)),
    }
}

fn boxed(schema: &Schema) -> Box<Descriptor> {
    Box::new(serialize(schema))
}

fn serialize_kind(schema: &Schema) -> DescriptorKind {
    match schema {
        Schema::String => DescriptorKind::String,
        Schema::Number => DescriptorKind::Number,
        Schema::Boolean => DescriptorKind::Boolean,
        Schema::Date => DescriptorKind::Date,
        Schema::BigInt => DescriptorKind::Bigint,
        Schema::Array(element) => DescriptorKind::Array {
            element: boxed(element),
        },
        Schema::Object(shape) => DescriptorKind::Object {
            shape: shape
                .iter()
                .map(|(field, s)| (field.clone(), serialize(s)))
                .collect(),
        },
        Schema::Enum(values) => DescriptorKind::Enum {
            values: values.clone(),
        },
        Schema::Literal(value) => DescriptorKind::Literal {
            value: value.clone(),
        },
        Schema::Union(options) => DescriptorKind::Union {
            options: options.iter().map(serialize).collect(),
        },
        Schema::Intersection(left, right) => DescriptorKind::Intersection {
            left: boxed(left),
            right: boxed(right),
        },
        Schema::Tuple { items, rest } => DescriptorKind::Tuple {
            items: items.iter().map(serialize).collect(),
            rest: rest.as_deref().map(boxed),
        },
        Schema::Record(key, value) => DescriptorKind::Record {
            key: boxed(key),
            value: boxed(value),
        },
        Schema::Map(key, value) => DescriptorKind::Map {
            key: boxed(key),
            value: boxed(value),
        },
        Schema::Set(value) => DescriptorKind::Set {
            value: boxed(value),
        },
        Schema::Function => DescriptorKind::Function,
        Schema::Lazy => DescriptorKind::Lazy,
        Schema::Promise(inner) => DescriptorKind::Promise {
            inner: boxed(inner),
        },
        Schema::Unknown => DescriptorKind::Unknown,
        // `serialize` peels wrappers before calling this.
        Schema::Optional(inner) | Schema::Nullable(inner) | Schema::Default(inner, _) => {
            serialize_kind(inner)
        }
    }
}

/// Rebuilds a type description from a stored descriptor.
pub fn deserialize(descriptor: &Descriptor) -> Schema {
    let mut schema = deserialize_kind(&descriptor.kind);

    // Order matters: a default must apply when the key is absent,
    // whether or not null is also allowed.
    if let Some(value) = descriptor.default.as_ref().filter(|v| !v.is_null()) {
        schema = Schema::Default(Box::new(schema), value.clone());
    }
    if descriptor.nullable {
        schema = Schema::Nullable(Box::new(schema));
    }
    if descriptor.optional {
        schema = Schema::Optional(Box::new(schema));
    }
    schema
}

fn unboxed(descriptor: &Descriptor) -> Box<Schema> {
    Box::new(deserialize(descriptor))
}

fn deserialize_kind(kind: &DescriptorKind) -> Schema {
    match kind {
        DescriptorKind::String => Schema::String,
        DescriptorKind::Number => Schema::Number,
        DescriptorKind::Boolean => Schema::Boolean,
        DescriptorKind::Date => Schema::Date,
        DescriptorKind::Bigint => Schema::BigInt,
        DescriptorKind::Array { element } => Schema::Array(unboxed(element)),
        DescriptorKind::Object { shape } => Schema::Object(
            shape
                .iter()
                .map(|(field, d)| (field.clone(), deserialize(d)))
                .collect(),
        ),
        DescriptorKind::Enum { values } => Schema::Enum(values.clone()),
        DescriptorKind::Literal { value } => Schema::Literal(value.clone()),
        DescriptorKind::Union { options } => Schema::Union(options.iter().map(deserialize).collect()),
        DescriptorKind::Intersection { left, right } => {
            Schema::Intersection(unboxed(left), unboxed(right))
        }
        DescriptorKind::Tuple { items, rest } => Schema::Tuple {
            items: items.iter().map(deserialize).collect(),
            rest: rest.as_deref().map(unboxed),
        },
        DescriptorKind::Record { key, value } => Schema::Record(unboxed(key), unboxed(value)),
        DescriptorKind::Map { key, value } => Schema::Map(unboxed(key), unboxed(value)),
        DescriptorKind::Set { value } => Schema::Set(unboxed(value)),
        DescriptorKind::Function => Schema::Function,
        DescriptorKind::Lazy => Schema::Lazy,
        DescriptorKind::Promise { inner } => Schema::Promise(unboxed(inner)),
        DescriptorKind::Unknown => Schema::Unknown,
    }
}

impl From<&Schema> for Descriptor {
    fn from(schema: &Schema) -> Self {
        serialize(schema)
    }
}

impl From<&Descriptor> for Schema {
    fn from(descriptor: &Descriptor) -> Self {
        deserialize(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::model::Value;
    use crate::schema::types::*;

    fn task() -> Schema {
        object([
            ("title", string()),
            ("completed", boolean().with_default(false)),
            ("notes", string().optional().nullable()),
        ])
    }

    #[test]
    fn test_wrappers_flatten_onto_inner_node() {
        let d = serialize(&task());
        let shape = d.shape().unwrap();
        assert_eq!(shape["completed"].kind, DescriptorKind::Boolean);
        assert_eq!(shape["completed"].default, Some(Value::Bool(false)));
        assert!(shape["notes"].optional);
        assert!(shape["notes"].nullable);
        assert!(!shape["title"].optional);
    }

    #[test]
    fn test_deserialize_applies_default_nullable_optional_in_order() {
        let d = Descriptor {
            kind: DescriptorKind::Number,
            optional: true,
            nullable: true,
            default: Some(Value::from(1)),
        };
        let expected = Schema::Optional(Box::new(Schema::Nullable(Box::new(Schema::Default(
            Box::new(Schema::Number),
            Value::from(1),
        )))));
        assert_eq!(deserialize(&d), expected);
    }

    #[test]
    fn test_wrapper_order_in_source_does_not_matter() {
        let a = serialize(&string().optional().nullable());
        let b = serialize(&string().nullable().optional());
        assert_eq!(a, b);
    }

    #[test]
    fn test_null_default_is_dropped() {
        let d = serialize(&string().with_default(Value::Null));
        assert_eq!(d.default, None);
    }

    #[test]
    fn test_opaque_kinds_keep_their_tag() {
        for s in [function(), lazy(), unknown(), promise(function())] {
            let d = serialize(&s);
            assert_eq!(serialize(&deserialize(&d)), d);
        }
    }

    #[test]
    fn test_json_roundtrip_of_serialized_task() {
        let d = serialize(&task());
        let json = d.to_json().unwrap();
        let parsed = Descriptor::from_json(&json).unwrap();
        assert_eq!(parsed, d);
        assert_eq!(serialize(&deserialize(&parsed)), d);
    }

    fn arb_leaf() -> impl Strategy<Value = Schema> {
        prop_oneof![
            Just(string()),
            Just(number()),
            Just(boolean()),
            Just(date()),
            Just(bigint()),
            Just(function()),
            Just(lazy()),
            Just(unknown()),
            prop::collection::vec("[a-z]{1,4}", 1..4).prop_map(|v| enumeration(v)),
            any::<i32>().prop_map(|n| literal(n)),
            "[a-z]{0,6}".prop_map(|s| literal(s)),
        ]
    }

    fn arb_annotated(inner: impl Strategy<Value = Schema>) -> impl Strategy<Value = Schema> {
        (inner, any::<bool>(), any::<bool>(), prop::option::of(any::<i16>())).prop_map(
            |(s, optional, nullable, default)| {
                let mut s = s;
                if let Some(d) = default {
                    s = s.with_default(i32::from(d));
                }
                if nullable {
                    s = s.nullable();
                }
                if optional {
                    s = s.optional();
                }
                s
            },
        )
    }

    fn arb_schema() -> impl Strategy<Value = Schema> {
        arb_annotated(arb_leaf()).prop_recursive(4, 32, 4, |inner| {
            arb_annotated(prop_oneof![
                inner.clone().prop_map(array),
                prop::collection::btree_map("[a-z]{1,5}", inner.clone(), 0..4)
                    .prop_map(Schema::Object),
                prop::collection::vec(inner.clone(), 1..3).prop_map(|v| union(v)),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| intersection(l, r)),
                (prop::collection::vec(inner.clone(), 0..3), prop::option::of(inner.clone()))
                    .prop_map(|(items, rest)| match rest {
                        Some(r) => tuple_with_rest(items, r),
                        None => tuple(items),
                    }),
                (inner.clone(), inner.clone()).prop_map(|(k, v)| record(k, v)),
                (inner.clone(), inner.clone()).prop_map(|(k, v)| map(k, v)),
                inner.clone().prop_map(set),
                inner.prop_map(promise),
            ])
        })
    }

    proptest! {
        /// serialize(deserialize(d)) == d for every serializer output.
        #[test]
        fn descriptor_roundtrip(schema in arb_schema()) {
            let d = serialize(&schema);
            prop_assert_eq!(serialize(&deserialize(&d)), d.clone());

            let json = d.to_json().unwrap();
            prop_assert_eq!(Descriptor::from_json(&json).unwrap(), d);
        }
    }
}
