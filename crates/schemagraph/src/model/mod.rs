//! Data model types for schemagraph.
//!
//! This module contains the core record types:
//! - Values (dynamically-typed payloads)
//! - Identifiers (generated element and link ids)
//! - Records (type definitions, elements, links)

pub mod id;
pub mod record;
pub mod value;

pub use id::new_id;
pub use record::{Element, ElementType, Link, LinkType, Timestamp};
pub use value::{Number, Object, Value};
