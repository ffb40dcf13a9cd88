//! Backing stores for type definitions, elements and links.
//!
//! A [`Backend`] provides row-level access to four tables: `element_type`,
//! `link_type`, `element` and `link`. It enforces primary-key uniqueness
//! and the element-to-link cascade on delete. It does not validate
//! payloads or check that referenced rows exist; that is the job of
//! [`Store`](crate::store::Store) and [`TypeRegistry`](crate::registry::TypeRegistry).
//!
//! Two implementations ship with the crate:
//! - [`MemoryBackend`]: in-process hash tables, for tests and embedding
//! - [`SqliteBackend`]: the relational layout on SQLite

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::error::BackendError;
use crate::model::{Element, ElementType, Link, LinkType};

/// Result alias for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Rows removed by a bulk delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Removed {
    pub links: usize,
    pub elements: usize,
}

/// Row storage for the four tables.
///
/// Listing operations return rows in insertion order. `update_*` and
/// `delete_*` return `false` when no row has the given id.
pub trait Backend: Send + Sync {
    // Element types

    fn insert_element_type(&self, row: &ElementType) -> BackendResult<()>;
    fn element_type(&self, id: &str) -> BackendResult<Option<ElementType>>;
    fn update_element_type(&self, row: &ElementType) -> BackendResult<bool>;
    fn delete_element_type(&self, id: &str) -> BackendResult<bool>;
    fn element_types(&self) -> BackendResult<Vec<ElementType>>;

    // Link types

    fn insert_link_type(&self, row: &LinkType) -> BackendResult<()>;
    fn link_type(&self, id: &str) -> BackendResult<Option<LinkType>>;
    fn update_link_type(&self, row: &LinkType) -> BackendResult<bool>;
    fn delete_link_type(&self, id: &str) -> BackendResult<bool>;
    fn link_types(&self) -> BackendResult<Vec<LinkType>>;

    // Elements

    fn insert_element(&self, row: &Element) -> BackendResult<()>;
    fn element(&self, id: &str) -> BackendResult<Option<Element>>;
    fn update_element(&self, row: &Element) -> BackendResult<bool>;

    /// Deletes an element and every link whose `from_id` or `to_id` is it,
    /// as one operation. Returns the number of links removed, or `None` if
    /// the element did not exist.
    fn delete_element(&self, id: &str) -> BackendResult<Option<usize>>;

    fn elements_by_type(&self, type_id: &str) -> BackendResult<Vec<Element>>;
    fn count_elements_by_type(&self, type_id: &str) -> BackendResult<usize>;

    /// Deletes every element of a type, cascading to their links.
    fn delete_elements_by_type(&self, type_id: &str) -> BackendResult<Removed>;

    // Links

    fn insert_link(&self, row: &Link) -> BackendResult<()>;
    fn link(&self, id: &str) -> BackendResult<Option<Link>>;
    fn update_link(&self, row: &Link) -> BackendResult<bool>;
    fn delete_link(&self, id: &str) -> BackendResult<bool>;

    /// Links with `from_id == element_id`, optionally of one link type.
    fn links_from(&self, element_id: &str, link_type_id: Option<&str>) -> BackendResult<Vec<Link>>;

    /// Links with `to_id == element_id`, optionally of one link type.
    fn links_to(&self, element_id: &str, link_type_id: Option<&str>) -> BackendResult<Vec<Link>>;

    fn links_by_type(&self, link_type_id: &str) -> BackendResult<Vec<Link>>;
    fn count_links_by_type(&self, link_type_id: &str) -> BackendResult<usize>;
    fn delete_links_by_type(&self, link_type_id: &str) -> BackendResult<usize>;
}

/// Shared behavioral checks run against every backend implementation.
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::error::RecordKind;
    use crate::model::Value;
    use crate::schema::{boolean, object, serialize, string};

    fn element_type(id: &str) -> ElementType {
        ElementType {
            id: id.into(),
            schema: serialize(&object([("title", string())])),
            parent_types: vec!["base".into()],
            created_at: 1,
            updated_at: 1,
        }
    }

    fn link_type(id: &str) -> LinkType {
        LinkType {
            id: id.into(),
            from_type: "task".into(),
            to_type: "task".into(),
            schema: serialize(&object([("weight", boolean().optional())])),
            parent_types: vec![],
            created_at: 2,
            updated_at: 2,
        }
    }

    fn element(id: &str, type_id: &str) -> Element {
        Element {
            id: id.into(),
            type_id: type_id.into(),
            data: Value::object([("title", Value::from(id))]),
            created_at: 10,
            updated_at: 10,
        }
    }

    fn link(id: &str, from: &str, to: &str, type_id: &str) -> Link {
        Link {
            id: id.into(),
            from_id: from.into(),
            to_id: to.into(),
            link_type_id: type_id.into(),
            data: Value::empty_object(),
            created_at: 20,
            updated_at: 20,
        }
    }

    fn ids<T>(rows: &[T], id: impl Fn(&T) -> &str) -> Vec<String> {
        rows.iter().map(|r| id(r).to_string()).collect()
    }

    pub fn type_rows(b: &dyn Backend) {
        b.insert_element_type(&element_type("task")).unwrap();
        b.insert_element_type(&element_type("note")).unwrap();
        assert_eq!(
            b.insert_element_type(&element_type("task")).unwrap_err(),
            BackendError::Duplicate {
                kind: RecordKind::ElementType,
                id: "task".into()
            }
        );

        let got = b.element_type("task").unwrap().unwrap();
        assert_eq!(got, element_type("task"));
        assert_eq!(ids(&b.element_types().unwrap(), |t| t.id.as_str()), ["task", "note"]);

        let mut changed = got.clone();
        changed.parent_types = vec![];
        changed.updated_at = 5;
        assert!(b.update_element_type(&changed).unwrap());
        assert_eq!(b.element_type("task").unwrap().unwrap(), changed);
        assert!(!b.update_element_type(&element_type("ghost")).unwrap());

        assert!(b.delete_element_type("note").unwrap());
        assert!(!b.delete_element_type("note").unwrap());
        assert!(b.element_type("note").unwrap().is_none());

        b.insert_link_type(&link_type("blocks")).unwrap();
        assert_eq!(b.link_type("blocks").unwrap().unwrap(), link_type("blocks"));
        assert!(b.insert_link_type(&link_type("blocks")).is_err());
        assert_eq!(b.link_types().unwrap().len(), 1);
        assert!(b.delete_link_type("blocks").unwrap());
        assert!(b.link_types().unwrap().is_empty());
    }

    pub fn element_rows(b: &dyn Backend) {
        b.insert_element(&element("a", "task")).unwrap();
        b.insert_element(&element("b", "task")).unwrap();
        b.insert_element(&element("c", "note")).unwrap();
        assert!(matches!(
            b.insert_element(&element("a", "task")),
            Err(BackendError::Duplicate { kind: RecordKind::Element, .. })
        ));

        assert_eq!(b.element("a").unwrap().unwrap(), element("a", "task"));
        assert!(b.element("zz").unwrap().is_none());
        assert_eq!(ids(&b.elements_by_type("task").unwrap(), |e| e.id.as_str()), ["a", "b"]);
        assert_eq!(b.count_elements_by_type("task").unwrap(), 2);
        assert_eq!(b.count_elements_by_type("none").unwrap(), 0);

        let mut a = element("a", "task");
        a.data = Value::object([("title", Value::from("renamed"))]);
        a.updated_at = 11;
        assert!(b.update_element(&a).unwrap());
        assert_eq!(b.element("a").unwrap().unwrap(), a);
        assert!(!b.update_element(&element("zz", "task")).unwrap());
    }

    pub fn link_rows_and_cascade(b: &dyn Backend) {
        for id in ["a", "b", "c"] {
            b.insert_element(&element(id, "task")).unwrap();
        }
        b.insert_link(&link("l1", "a", "b", "blocks")).unwrap();
        b.insert_link(&link("l2", "b", "c", "blocks")).unwrap();
        b.insert_link(&link("l3", "a", "c", "mentions")).unwrap();
        assert!(b.insert_link(&link("l1", "a", "b", "blocks")).is_err());

        assert_eq!(ids(&b.links_from("a", None).unwrap(), |l| l.id.as_str()), ["l1", "l3"]);
        assert_eq!(ids(&b.links_from("a", Some("blocks")).unwrap(), |l| l.id.as_str()), ["l1"]);
        assert_eq!(ids(&b.links_to("c", None).unwrap(), |l| l.id.as_str()), ["l2", "l3"]);
        assert_eq!(ids(&b.links_to("c", Some("mentions")).unwrap(), |l| l.id.as_str()), ["l3"]);
        assert_eq!(b.count_links_by_type("blocks").unwrap(), 2);
        assert_eq!(ids(&b.links_by_type("blocks").unwrap(), |l| l.id.as_str()), ["l1", "l2"]);

        let mut l1 = b.link("l1").unwrap().unwrap();
        l1.data = Value::object([("weight", Value::Bool(true))]);
        assert!(b.update_link(&l1).unwrap());
        assert_eq!(b.link("l1").unwrap().unwrap(), l1);

        // Deleting b removes l1 (to b) and l2 (from b).
        assert_eq!(b.delete_element("b").unwrap(), Some(2));
        assert_eq!(b.delete_element("b").unwrap(), None);
        assert!(b.link("l1").unwrap().is_none());
        assert!(b.link("l2").unwrap().is_none());
        assert_eq!(ids(&b.links_from("a", None).unwrap(), |l| l.id.as_str()), ["l3"]);

        assert!(b.delete_link("l3").unwrap());
        assert!(!b.delete_link("l3").unwrap());
        assert!(b.links_from("a", None).unwrap().is_empty());
    }

    pub fn bulk_deletes(b: &dyn Backend) {
        for (id, ty) in [("a", "task"), ("b", "task"), ("n", "note")] {
            b.insert_element(&element(id, ty)).unwrap();
        }
        b.insert_link(&link("l1", "a", "b", "blocks")).unwrap();
        b.insert_link(&link("l2", "n", "a", "mentions")).unwrap();
        b.insert_link(&link("l3", "n", "n", "mentions")).unwrap();

        assert_eq!(b.delete_links_by_type("blocks").unwrap(), 1);
        assert_eq!(b.count_links_by_type("blocks").unwrap(), 0);

        let removed = b.delete_elements_by_type("task").unwrap();
        assert_eq!(removed, Removed { links: 1, elements: 2 });
        assert_eq!(b.count_elements_by_type("task").unwrap(), 0);
        assert_eq!(ids(&b.links_from("n", None).unwrap(), |l| l.id.as_str()), ["l3"]);
        assert!(b.element("n").unwrap().is_some());

        assert_eq!(b.delete_elements_by_type("task").unwrap(), Removed::default());
    }

    pub fn run_all(make: impl Fn() -> Box<dyn Backend>) {
        type_rows(make().as_ref());
        element_rows(make().as_ref());
        link_rows_and_cascade(make().as_ref());
        bulk_deletes(make().as_ref());
    }
}
