//! Typed CRUD over elements and links.
//!
//! Every write validates strictly against the record's declared type before
//! touching the backend, so a failed write leaves no partial state. Every
//! read validates loosely: stored data that predates a schema change comes
//! back with newly declared defaults filled in, and never fails validation.
//!
//! Read-modify-write operations (`update_element`, `update_link`) are not
//! wrapped in a backend transaction. Concurrent updates to one id resolve as
//! last write wins.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::Backend;
use crate::error::{Error, RecordKind, Result, Side};
use crate::model::{new_id, Element, Link, LinkType, Value};
use crate::registry::TypeRegistry;
use crate::schema::Descriptor;
use crate::util::now_micros;
use crate::validate::{validate, Mode};

/// Store behavior switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Reject links whose endpoint elements are not of the link type's
    /// declared `from_type` / `to_type`.
    pub enforce_link_endpoint_types: bool,
    /// Depth bound for [`Query::traverse_default`](crate::query::Query::traverse_default).
    pub default_max_depth: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enforce_link_endpoint_types: false,
            default_max_depth: 3,
        }
    }
}

impl StoreConfig {
    /// Parses a config from JSON; absent fields take their defaults.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn with_endpoint_type_checks(mut self, enforce: bool) -> Self {
        self.enforce_link_endpoint_types = enforce;
        self
    }
}

fn strict(data: &Value, schema: &Descriptor) -> Result<Value> {
    validate(data, schema, Mode::Strict)
        .into_result()
        .map_err(|errors| Error::ValidationFailed { errors })
}

fn loose(data: &Value, schema: &Descriptor) -> Value {
    validate(data, schema, Mode::Loose).data
}

/// Element and link operations over a backend, resolving types through a
/// [`TypeRegistry`].
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Backend>,
    registry: TypeRegistry,
    config: StoreConfig,
}

impl Store {
    pub fn new(backend: Arc<dyn Backend>, registry: TypeRegistry, config: StoreConfig) -> Self {
        Self {
            backend,
            registry,
            config,
        }
    }

    /// Builds a store and registry sharing one backend.
    pub fn with_backend(backend: Arc<dyn Backend>, config: StoreConfig) -> Self {
        let registry = TypeRegistry::new(Arc::clone(&backend));
        Self::new(backend, registry, config)
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // =========================================================================
    // Elements
    // =========================================================================

    /// Creates an element of `type_id` after strict validation of `data`.
    pub fn create_element(&self, type_id: &str, data: &Value) -> Result<Element> {
        let element_type = self.registry.element_type(type_id)?;
        let data = strict(data, &element_type.schema)?;

        let now = now_micros();
        let element = Element {
            id: new_id(),
            type_id: type_id.to_string(),
            data,
            created_at: now,
            updated_at: now,
        };
        self.backend.insert_element(&element)?;
        debug!(id = %element.id, type_id, "created element");
        Ok(element)
    }

    /// Reads an element, loose-validating its data.
    pub fn element(&self, id: &str) -> Result<Element> {
        let mut element = self.backend.element(id)?.ok_or_else(|| Error::NotFound {
            kind: RecordKind::Element,
            id: id.to_string(),
        })?;
        let element_type = self.registry.element_type(&element.type_id)?;
        element.data = loose(&element.data, &element_type.schema);
        Ok(element)
    }

    /// Shallow-merges `patch` over the element's current data and stores the
    /// result if it passes strict validation.
    pub fn update_element(&self, id: &str, patch: &Value) -> Result<Element> {
        let mut element = self.element(id)?;
        let element_type = self.registry.element_type(&element.type_id)?;

        element.data.shallow_merge(patch);
        element.data = strict(&element.data, &element_type.schema)?;
        element.updated_at = now_micros().max(element.updated_at);

        if !self.backend.update_element(&element)? {
            return Err(Error::NotFound {
                kind: RecordKind::Element,
                id: id.to_string(),
            });
        }
        debug!(id, type_id = %element.type_id, "updated element");
        Ok(element)
    }

    /// Deletes an element and every link touching it.
    pub fn delete_element(&self, id: &str) -> Result<()> {
        let links = self.backend.delete_element(id)?.ok_or_else(|| Error::NotFound {
            kind: RecordKind::Element,
            id: id.to_string(),
        })?;
        debug!(id, links, "deleted element");
        Ok(())
    }

    /// Elements of one type in creation order, each loose-validated.
    pub fn elements_of_type(&self, type_id: &str) -> Result<Vec<Element>> {
        let element_type = self.registry.element_type(type_id)?;
        let mut elements = self.backend.elements_by_type(type_id)?;
        for element in &mut elements {
            element.data = loose(&element.data, &element_type.schema);
        }
        Ok(elements)
    }

    // =========================================================================
    // Links
    // =========================================================================

    /// Creates a link between two existing elements.
    pub fn create_link(
        &self,
        from_id: &str,
        to_id: &str,
        link_type_id: &str,
        data: &Value,
    ) -> Result<Link> {
        let from = self.endpoint(Side::From, from_id)?;
        let to = self.endpoint(Side::To, to_id)?;
        let link_type = self.registry.link_type(link_type_id)?;
        if self.config.enforce_link_endpoint_types {
            check_endpoint(&link_type, Side::From, &from)?;
            check_endpoint(&link_type, Side::To, &to)?;
        }
        let data = strict(data, &link_type.schema)?;

        let now = now_micros();
        let link = Link {
            id: new_id(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            link_type_id: link_type_id.to_string(),
            data,
            created_at: now,
            updated_at: now,
        };
        self.backend.insert_link(&link)?;
        debug!(id = %link.id, from_id, to_id, link_type_id, "created link");
        Ok(link)
    }

    fn endpoint(&self, side: Side, id: &str) -> Result<Element> {
        self.backend
            .element(id)?
            .ok_or_else(|| Error::ReferentialIntegrity {
                side,
                id: id.to_string(),
            })
    }

    /// Reads a link, loose-validating its data.
    pub fn link(&self, id: &str) -> Result<Link> {
        let mut link = self.backend.link(id)?.ok_or_else(|| Error::NotFound {
            kind: RecordKind::Link,
            id: id.to_string(),
        })?;
        let link_type = self.registry.link_type(&link.link_type_id)?;
        link.data = loose(&link.data, &link_type.schema);
        Ok(link)
    }

    /// Shallow-merges `patch` over the link's data; strict on write.
    pub fn update_link(&self, id: &str, patch: &Value) -> Result<Link> {
        let mut link = self.link(id)?;
        let link_type = self.registry.link_type(&link.link_type_id)?;

        link.data.shallow_merge(patch);
        link.data = strict(&link.data, &link_type.schema)?;
        link.updated_at = now_micros().max(link.updated_at);

        if !self.backend.update_link(&link)? {
            return Err(Error::NotFound {
                kind: RecordKind::Link,
                id: id.to_string(),
            });
        }
        debug!(id, link_type_id = %link.link_type_id, "updated link");
        Ok(link)
    }

    pub fn delete_link(&self, id: &str) -> Result<()> {
        if !self.backend.delete_link(id)? {
            return Err(Error::NotFound {
                kind: RecordKind::Link,
                id: id.to_string(),
            });
        }
        debug!(id, "deleted link");
        Ok(())
    }

    /// Links leaving `element_id`, optionally of one link type.
    pub fn links_from(&self, element_id: &str, link_type_id: Option<&str>) -> Result<Vec<Link>> {
        let links = self.backend.links_from(element_id, link_type_id)?;
        self.read_links(links)
    }

    /// Links arriving at `element_id`, optionally of one link type.
    pub fn links_to(&self, element_id: &str, link_type_id: Option<&str>) -> Result<Vec<Link>> {
        let links = self.backend.links_to(element_id, link_type_id)?;
        self.read_links(links)
    }

    /// Links of one link type in creation order, each loose-validated.
    pub fn links_of_type(&self, link_type_id: &str) -> Result<Vec<Link>> {
        let link_type = self.registry.link_type(link_type_id)?;
        let mut links = self.backend.links_by_type(link_type_id)?;
        for link in &mut links {
            link.data = loose(&link.data, &link_type.schema);
        }
        Ok(links)
    }

    /// Loose-validates a batch of links, resolving each link type once.
    fn read_links(&self, mut links: Vec<Link>) -> Result<Vec<Link>> {
        let mut schemas: FxHashMap<String, Descriptor> = FxHashMap::default();
        for link in &mut links {
            if !schemas.contains_key(&link.link_type_id) {
                let link_type = self.registry.link_type(&link.link_type_id)?;
                schemas.insert(link.link_type_id.clone(), link_type.schema);
            }
            if let Some(schema) = schemas.get(&link.link_type_id) {
                link.data = loose(&link.data, schema);
            }
        }
        Ok(links)
    }
}

fn check_endpoint(link_type: &LinkType, side: Side, element: &Element) -> Result<()> {
    let expected = match side {
        Side::From => &link_type.from_type,
        Side::To => &link_type.to_type,
    };
    if &element.type_id == expected {
        return Ok(());
    }
    Err(Error::LinkEndpointMismatch {
        link_type: link_type.id.clone(),
        side,
        expected: expected.clone(),
        actual: element.type_id.clone(),
    })
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
