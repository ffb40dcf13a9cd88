//! Stored records: type definitions, elements and links.

use serde::{Deserialize, Serialize};

use crate::model::Value;
use crate::schema::Descriptor;

/// Microseconds since the Unix epoch.
pub type Timestamp = i64;

/// Declares the shape of a class of elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementType {
    /// Unique type name.
    pub id: String,
    pub schema: Descriptor,
    /// Recorded but not consulted by validation or traversal.
    pub parent_types: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Declares the shape of a class of links and the element types it is
/// intended to connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkType {
    pub id: String,
    pub from_type: String,
    pub to_type: String,
    pub schema: Descriptor,
    pub parent_types: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A typed graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    pub type_id: String,
    /// Object-shaped payload.
    pub data: Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A typed, directed edge between two elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    pub link_type_id: String,
    pub data: Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Link {
    /// Returns the endpoint opposite `element_id`, if the link touches it.
    pub fn other_end(&self, element_id: &str) -> Option<&str> {
        if self.from_id == element_id {
            Some(&self.to_id)
        } else if self.to_id == element_id {
            Some(&self.from_id)
        } else {
            None
        }
    }
}
