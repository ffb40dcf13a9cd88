//! In-process backend over hash tables.

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::backend::{Backend, BackendResult, Removed};
use crate::error::{BackendError, RecordKind};
use crate::model::{Element, ElementType, Link, LinkType};

/// Rows keyed by id, each tagged with its insertion sequence number.
struct Table<T> {
    kind: RecordKind,
    rows: FxHashMap<String, (u64, T)>,
    next_seq: u64,
}

impl<T: Clone> Table<T> {
    fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            rows: FxHashMap::default(),
            next_seq: 0,
        }
    }

    fn insert(&mut self, id: &str, row: T) -> BackendResult<()> {
        if self.rows.contains_key(id) {
            return Err(BackendError::Duplicate {
                kind: self.kind,
                id: id.to_string(),
            });
        }
        self.rows.insert(id.to_string(), (self.next_seq, row));
        self.next_seq += 1;
        Ok(())
    }

    fn get(&self, id: &str) -> Option<&T> {
        self.rows.get(id).map(|(_, row)| row)
    }

    /// Replaces a row in place, keeping its sequence number.
    fn replace(&mut self, id: &str, row: T) -> Option<T> {
        self.rows
            .get_mut(id)
            .map(|(_, slot)| std::mem::replace(slot, row))
    }

    fn remove(&mut self, id: &str) -> Option<T> {
        self.rows.remove(id).map(|(_, row)| row)
    }

    fn all(&self) -> Vec<T> {
        let mut rows: Vec<_> = self.rows.values().collect();
        rows.sort_unstable_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, row)| row.clone()).collect()
    }

    /// Returns the rows for `ids` in insertion order.
    fn select<'a>(&self, ids: impl IntoIterator<Item = &'a String>) -> Vec<T> {
        let mut rows: Vec<_> = ids.into_iter().filter_map(|id| self.rows.get(id)).collect();
        rows.sort_unstable_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, row)| row.clone()).collect()
    }
}

/// Secondary index from a column value to row ids.
#[derive(Default)]
struct Index(FxHashMap<String, FxHashSet<String>>);

impl Index {
    fn add(&mut self, key: &str, id: &str) {
        self.0
            .entry(key.to_string())
            .or_default()
            .insert(id.to_string());
    }

    fn remove(&mut self, key: &str, id: &str) {
        if let Some(ids) = self.0.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.0.remove(key);
            }
        }
    }

    fn ids(&self, key: &str) -> impl Iterator<Item = &String> {
        self.0.get(key).into_iter().flatten()
    }

    fn count(&self, key: &str) -> usize {
        self.0.get(key).map_or(0, |ids| ids.len())
    }
}

struct Tables {
    element_types: Table<ElementType>,
    link_types: Table<LinkType>,
    elements: Table<Element>,
    links: Table<Link>,
    elements_by_type: Index,
    links_by_from: Index,
    links_by_to: Index,
    links_by_type: Index,
}

impl Tables {
    fn new() -> Self {
        Self {
            element_types: Table::new(RecordKind::ElementType),
            link_types: Table::new(RecordKind::LinkType),
            elements: Table::new(RecordKind::Element),
            links: Table::new(RecordKind::Link),
            elements_by_type: Index::default(),
            links_by_from: Index::default(),
            links_by_to: Index::default(),
            links_by_type: Index::default(),
        }
    }

    fn index_link(&mut self, link: &Link) {
        self.links_by_from.add(&link.from_id, &link.id);
        self.links_by_to.add(&link.to_id, &link.id);
        self.links_by_type.add(&link.link_type_id, &link.id);
    }

    fn unindex_link(&mut self, link: &Link) {
        self.links_by_from.remove(&link.from_id, &link.id);
        self.links_by_to.remove(&link.to_id, &link.id);
        self.links_by_type.remove(&link.link_type_id, &link.id);
    }

    fn remove_link(&mut self, id: &str) -> bool {
        match self.links.remove(id) {
            Some(link) => {
                self.unindex_link(&link);
                true
            }
            None => false,
        }
    }

    /// Removes an element and its links; returns the link count, or `None`
    /// if the element is absent.
    fn remove_element(&mut self, id: &str) -> Option<usize> {
        let element = self.elements.remove(id)?;
        self.elements_by_type.remove(&element.type_id, id);

        let touching: FxHashSet<String> = self
            .links_by_from
            .ids(id)
            .chain(self.links_by_to.ids(id))
            .cloned()
            .collect();
        for link_id in &touching {
            self.remove_link(link_id);
        }
        Some(touching.len())
    }

    fn links_matching<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a String>,
        link_type_id: Option<&str>,
    ) -> Vec<Link> {
        let mut links = self.links.select(ids);
        if let Some(type_id) = link_type_id {
            links.retain(|l| l.link_type_id == type_id);
        }
        links
    }
}

/// A [`Backend`] held entirely in memory.
///
/// All tables sit behind a single lock, so every operation, including the
/// delete cascade, is atomic with respect to other callers.
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::new()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.tables.read();
        f.debug_struct("MemoryBackend")
            .field("element_types", &t.element_types.rows.len())
            .field("link_types", &t.link_types.rows.len())
            .field("elements", &t.elements.rows.len())
            .field("links", &t.links.rows.len())
            .finish()
    }
}

impl Backend for MemoryBackend {
    fn insert_element_type(&self, row: &ElementType) -> BackendResult<()> {
        self.tables.write().element_types.insert(&row.id, row.clone())
    }

    fn element_type(&self, id: &str) -> BackendResult<Option<ElementType>> {
        Ok(self.tables.read().element_types.get(id).cloned())
    }

    fn update_element_type(&self, row: &ElementType) -> BackendResult<bool> {
        Ok(self
            .tables
            .write()
            .element_types
            .replace(&row.id, row.clone())
            .is_some())
    }

    fn delete_element_type(&self, id: &str) -> BackendResult<bool> {
        Ok(self.tables.write().element_types.remove(id).is_some())
    }

    fn element_types(&self) -> BackendResult<Vec<ElementType>> {
        Ok(self.tables.read().element_types.all())
    }

    fn insert_link_type(&self, row: &LinkType) -> BackendResult<()> {
        self.tables.write().link_types.insert(&row.id, row.clone())
    }

    fn link_type(&self, id: &str) -> BackendResult<Option<LinkType>> {
        Ok(self.tables.read().link_types.get(id).cloned())
    }

    fn update_link_type(&self, row: &LinkType) -> BackendResult<bool> {
        Ok(self
            .tables
            .write()
            .link_types
            .replace(&row.id, row.clone())
            .is_some())
    }

    fn delete_link_type(&self, id: &str) -> BackendResult<bool> {
        Ok(self.tables.write().link_types.remove(id).is_some())
    }

    fn link_types(&self) -> BackendResult<Vec<LinkType>> {
        Ok(self.tables.read().link_types.all())
    }

    fn insert_element(&self, row: &Element) -> BackendResult<()> {
        let mut t = self.tables.write();
        t.elements.insert(&row.id, row.clone())?;
        t.elements_by_type.add(&row.type_id, &row.id);
        Ok(())
    }

    fn element(&self, id: &str) -> BackendResult<Option<Element>> {
        Ok(self.tables.read().elements.get(id).cloned())
    }

    fn update_element(&self, row: &Element) -> BackendResult<bool> {
        let mut t = self.tables.write();
        let Some(old) = t.elements.replace(&row.id, row.clone()) else {
            return Ok(false);
        };
        if old.type_id != row.type_id {
            t.elements_by_type.remove(&old.type_id, &row.id);
            t.elements_by_type.add(&row.type_id, &row.id);
        }
        Ok(true)
    }

    fn delete_element(&self, id: &str) -> BackendResult<Option<usize>> {
        Ok(self.tables.write().remove_element(id))
    }

    fn elements_by_type(&self, type_id: &str) -> BackendResult<Vec<Element>> {
        let t = self.tables.read();
        Ok(t.elements.select(t.elements_by_type.ids(type_id)))
    }

    fn count_elements_by_type(&self, type_id: &str) -> BackendResult<usize> {
        Ok(self.tables.read().elements_by_type.count(type_id))
    }

    fn delete_elements_by_type(&self, type_id: &str) -> BackendResult<Removed> {
        let mut t = self.tables.write();
        let ids: Vec<String> = t.elements_by_type.ids(type_id).cloned().collect();
        let mut removed = Removed::default();
        for id in &ids {
            if let Some(links) = t.remove_element(id) {
                removed.links += links;
                removed.elements += 1;
            }
        }
        Ok(removed)
    }

    fn insert_link(&self, row: &Link) -> BackendResult<()> {
        let mut t = self.tables.write();
        t.links.insert(&row.id, row.clone())?;
        t.index_link(row);
        Ok(())
    }

    fn link(&self, id: &str) -> BackendResult<Option<Link>> {
        Ok(self.tables.read().links.get(id).cloned())
    }

    fn update_link(&self, row: &Link) -> BackendResult<bool> {
        let mut t = self.tables.write();
        let Some(old) = t.links.replace(&row.id, row.clone()) else {
            return Ok(false);
        };
        t.unindex_link(&old);
        t.index_link(row);
        Ok(true)
    }

    fn delete_link(&self, id: &str) -> BackendResult<bool> {
        Ok(self.tables.write().remove_link(id))
    }

    fn links_from(&self, element_id: &str, link_type_id: Option<&str>) -> BackendResult<Vec<Link>> {
        let t = self.tables.read();
        Ok(t.links_matching(t.links_by_from.ids(element_id), link_type_id))
    }

    fn links_to(&self, element_id: &str, link_type_id: Option<&str>) -> BackendResult<Vec<Link>> {
        let t = self.tables.read();
        Ok(t.links_matching(t.links_by_to.ids(element_id), link_type_id))
    }

    fn links_by_type(&self, link_type_id: &str) -> BackendResult<Vec<Link>> {
        let t = self.tables.read();
        Ok(t.links.select(t.links_by_type.ids(link_type_id)))
    }

    fn count_links_by_type(&self, link_type_id: &str) -> BackendResult<usize> {
        Ok(self.tables.read().links_by_type.count(link_type_id))
    }

    fn delete_links_by_type(&self, link_type_id: &str) -> BackendResult<usize> {
        let mut t = self.tables.write();
        let ids: Vec<String> = t.links_by_type.ids(link_type_id).cloned().collect();
        Ok(ids.iter().filter(|id| t.remove_link(id)).count())
    }
}
