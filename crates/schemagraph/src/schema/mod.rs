//! Schema descriptions and their storable form.
//!
//! - [`types`]: the in-code [`Schema`] tree and builder functions
//! - [`descriptor`]: the flat, serializable [`Descriptor`]
//! - [`serialize`](mod@serialize): conversion between the two

pub mod descriptor;
pub mod serialize;
pub mod types;

pub use descriptor::{Descriptor, DescriptorKind};
pub use serialize::{deserialize, serialize};
pub use types::{
    array, bigint, boolean, date, enumeration, function, intersection, lazy, literal, map,
    number, object, promise, record, set, string, tuple, tuple_with_rest, union, unknown, Schema,
};
