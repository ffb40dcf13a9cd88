//! Type-scoped listing, neighbor lookup and bounded traversal.
//!
//! All reads go through [`Store`], so every returned element and link has
//! been loose-validated against its type. Traversal does not snapshot the
//! graph: each hop is a separate read and may observe concurrent writes.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::{Element, Link};
use crate::store::Store;

/// One page of a type-scoped listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Element>,
    /// Number of elements of the type across all pages.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    /// Returns true if elements exist past this page.
    pub fn has_more(&self) -> bool {
        self.offset.saturating_add(self.items.len()) < self.total
    }
}

/// Where a neighbor sits relative to the queried element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The neighbor is the link's source; the queried element is its target.
    From,
    /// The neighbor is the link's target; the queried element is its source.
    To,
}

/// A neighbor reached over one link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connected {
    pub element: Element,
    pub link: Link,
    pub direction: Direction,
}

/// An element reached by [`Query::traverse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub element: Element,
    /// Hops from the start element.
    pub depth: usize,
    /// Element ids from the start element to this one, inclusive.
    pub path: Vec<String>,
}

/// Read-only graph queries over a [`Store`].
#[derive(Debug, Clone)]
pub struct Query {
    store: Store,
}

impl Query {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// All elements of a type, in creation order.
    pub fn find_by_type(&self, type_id: &str) -> Result<Vec<Element>> {
        self.store.elements_of_type(type_id)
    }

    /// All links of a link type, in creation order.
    pub fn find_links_by_type(&self, link_type_id: &str) -> Result<Vec<Link>> {
        self.store.links_of_type(link_type_id)
    }

    /// Elements `[offset, offset + limit)` of a type, with the full count.
    ///
    /// The whole type is read and sliced in memory.
    pub fn find_by_type_paginated(&self, type_id: &str, limit: usize, offset: usize) -> Result<Page> {
        let all = self.find_by_type(type_id)?;
        let total = all.len();
        let items = all.into_iter().skip(offset).take(limit).collect();
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    /// Neighbors of `element_id` over links in either direction, optionally
    /// restricted to one link type.
    ///
    /// Outgoing links come first, then incoming ones. A neighbor that no
    /// longer exists is skipped.
    pub fn connected_elements(
        &self,
        element_id: &str,
        link_type_id: Option<&str>,
    ) -> Result<Vec<Connected>> {
        let outgoing = self
            .store
            .links_from(element_id, link_type_id)?
            .into_iter()
            .map(|link| (Direction::To, link));
        let incoming = self
            .store
            .links_to(element_id, link_type_id)?
            .into_iter()
            .map(|link| (Direction::From, link));

        let mut connected = Vec::new();
        for (direction, link) in outgoing.chain(incoming) {
            let Some(neighbor_id) = link.other_end(element_id) else {
                continue;
            };
            match self.store.element(neighbor_id) {
                Ok(element) => connected.push(Connected {
                    element,
                    link,
                    direction,
                }),
                Err(Error::NotFound { .. }) => {
                    warn!(element_id, neighbor_id = %neighbor_id, link_id = %link.id, "skipping missing neighbor");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(connected)
    }

    /// Breadth-first walk from `start_id`, at most `max_depth` hops out.
    ///
    /// Each element is reported once, at the depth it was first reached.
    /// Cycles terminate.
    pub fn traverse(
        &self,
        start_id: &str,
        link_type_id: Option<&str>,
        max_depth: usize,
    ) -> Result<Vec<Visit>> {
        let start = self.store.element(start_id)?;

        let mut visited: FxHashSet<String> = FxHashSet::default();
        let mut visits = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back((start, 0usize, vec![start_id.to_string()]));

        while let Some((element, depth, path)) = queue.pop_front() {
            if depth > max_depth || visited.contains(&element.id) {
                continue;
            }
            visited.insert(element.id.clone());

            if depth < max_depth {
                for next in self.connected_elements(&element.id, link_type_id)? {
                    if visited.contains(&next.element.id) {
                        continue;
                    }
                    let mut next_path = path.clone();
                    next_path.push(next.element.id.clone());
                    queue.push_back((next.element, depth + 1, next_path));
                }
            }
            visits.push(Visit {
                element,
                depth,
                path,
            });
        }
        Ok(visits)
    }

    /// [`traverse`](Self::traverse) bounded by the store's configured depth.
    pub fn traverse_default(&self, start_id: &str, link_type_id: Option<&str>) -> Result<Vec<Visit>> {
        self.traverse(start_id, link_type_id, self.store.config().default_max_depth)
    }
}
