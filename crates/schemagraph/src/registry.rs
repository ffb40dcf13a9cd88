//! Registry of element and link type definitions.
//!
//! Types are persisted as serialized [`Descriptor`]s; callers may pass either
//! an in-code [`Schema`] or an already-serialized descriptor. A type schema
//! must be a required, non-nullable object, so every element and link
//! payload is an object; anything else fails with [`Error::Descriptor`]. No uniqueness
//! beyond the primary key is enforced: creating a type whose id exists
//! surfaces the backend's [`BackendError::Duplicate`](crate::error::BackendError::Duplicate).

use std::sync::Arc;

use tracing::debug;

use crate::backend::Backend;
use crate::error::{Error, RecordKind, Result};
use crate::model::{ElementType, LinkType};
use crate::schema::{serialize, Descriptor, Schema};
use crate::util::now_micros;

/// Fields to change on a type definition. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeUpdate {
    pub schema: Option<Descriptor>,
    pub parent_types: Option<Vec<String>>,
}

impl TypeUpdate {
    /// An update replacing the schema.
    pub fn schema(schema: &Schema) -> Self {
        Self {
            schema: Some(serialize(schema)),
            parent_types: None,
        }
    }

    /// An update replacing the parent type list.
    pub fn parent_types(parent_types: Vec<String>) -> Self {
        Self {
            schema: None,
            parent_types: Some(parent_types),
        }
    }

    /// Also replaces the parent type list.
    pub fn with_parent_types(mut self, parent_types: Vec<String>) -> Self {
        self.parent_types = Some(parent_types);
        self
    }
}

/// CRUD over [`ElementType`] and [`LinkType`] definitions.
#[derive(Clone)]
pub struct TypeRegistry {
    backend: Arc<dyn Backend>,
}

impl TypeRegistry {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Returns the backend this registry writes to.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    // =========================================================================
    // Element types
    // =========================================================================

    /// Declares an element type from an in-code schema.
    pub fn create_element_type(
        &self,
        id: &str,
        schema: &Schema,
        parent_types: Vec<String>,
    ) -> Result<ElementType> {
        self.create_element_type_from_descriptor(id, serialize(schema), parent_types)
    }

    /// Declares an element type from a serialized descriptor.
    pub fn create_element_type_from_descriptor(
        &self,
        id: &str,
        schema: Descriptor,
        parent_types: Vec<String>,
    ) -> Result<ElementType> {
        schema.require_object()?;
        let now = now_micros();
        let row = ElementType {
            id: id.to_string(),
            schema,
            parent_types,
            created_at: now,
            updated_at: now,
        };
        self.backend.insert_element_type(&row)?;
        debug!(type_id = id, "created element type");
        Ok(row)
    }

    /// Looks up an element type, failing with [`Error::TypeNotFound`].
    pub fn element_type(&self, id: &str) -> Result<ElementType> {
        self.backend
            .element_type(id)?
            .ok_or_else(|| Error::TypeNotFound { id: id.to_string() })
    }

    pub fn update_element_type(&self, id: &str, update: TypeUpdate) -> Result<ElementType> {
        let mut row = self.element_type(id)?;
        if let Some(schema) = update.schema {
            schema.require_object()?;
            row.schema = schema;
        }
        if let Some(parent_types) = update.parent_types {
            row.parent_types = parent_types;
        }
        row.updated_at = now_micros().max(row.updated_at);
        if !self.backend.update_element_type(&row)? {
            return Err(Error::TypeNotFound { id: id.to_string() });
        }
        debug!(type_id = id, "updated element type");
        Ok(row)
    }

    /// Deletes an element type that has no elements.
    pub fn delete_element_type(&self, id: &str) -> Result<()> {
        self.element_type(id)?;
        let count = self.backend.count_elements_by_type(id)?;
        if count > 0 {
            return Err(Error::TypeInUse {
                kind: RecordKind::ElementType,
                id: id.to_string(),
                count,
            });
        }
        if !self.backend.delete_element_type(id)? {
            return Err(Error::TypeNotFound { id: id.to_string() });
        }
        debug!(type_id = id, "deleted element type");
        Ok(())
    }

    /// Lists element types in creation order.
    pub fn element_types(&self) -> Result<Vec<ElementType>> {
        Ok(self.backend.element_types()?)
    }

    // =========================================================================
    // Link types
    // =========================================================================

    /// Declares a link type from an in-code schema.
    pub fn create_link_type(
        &self,
        id: &str,
        from_type: &str,
        to_type: &str,
        schema: &Schema,
        parent_types: Vec<String>,
    ) -> Result<LinkType> {
        self.create_link_type_from_descriptor(id, from_type, to_type, serialize(schema), parent_types)
    }

    /// Declares a link type from a serialized descriptor.
    pub fn create_link_type_from_descriptor(
        &self,
        id: &str,
        from_type: &str,
        to_type: &str,
        schema: Descriptor,
        parent_types: Vec<String>,
    ) -> Result<LinkType> {
        schema.require_object()?;
        let now = now_micros();
        let row = LinkType {
            id: id.to_string(),
            from_type: from_type.to_string(),
            to_type: to_type.to_string(),
            schema,
            parent_types,
            created_at: now,
            updated_at: now,
        };
        self.backend.insert_link_type(&row)?;
        debug!(type_id = id, from_type, to_type, "created link type");
        Ok(row)
    }

    /// Looks up a link type, failing with [`Error::TypeNotFound`].
    pub fn link_type(&self, id: &str) -> Result<LinkType> {
        self.backend
            .link_type(id)?
            .ok_or_else(|| Error::TypeNotFound { id: id.to_string() })
    }

    pub fn update_link_type(&self, id: &str, update: TypeUpdate) -> Result<LinkType> {
        let mut row = self.link_type(id)?;
        if let Some(schema) = update.schema {
            schema.require_object()?;
            row.schema = schema;
        }
        if let Some(parent_types) = update.parent_types {
            row.parent_types = parent_types;
        }
        row.updated_at = now_micros().max(row.updated_at);
        if !self.backend.update_link_type(&row)? {
            return Err(Error::TypeNotFound { id: id.to_string() });
        }
        debug!(type_id = id, "updated link type");
        Ok(row)
    }

    /// Deletes a link type that has no links.
    pub fn delete_link_type(&self, id: &str) -> Result<()> {
        self.link_type(id)?;
        let count = self.backend.count_links_by_type(id)?;
        if count > 0 {
            return Err(Error::TypeInUse {
                kind: RecordKind::LinkType,
                id: id.to_string(),
                count,
            });
        }
        if !self.backend.delete_link_type(id)? {
            return Err(Error::TypeNotFound { id: id.to_string() });
        }
        debug!(type_id = id, "deleted link type");
        Ok(())
    }

    /// Lists link types in creation order.
    pub fn link_types(&self) -> Result<Vec<LinkType>> {
        Ok(self.backend.link_types()?)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry").finish_non_exhaustive()
    }
}
