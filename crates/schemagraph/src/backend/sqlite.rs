//! SQLite backend.
//!
//! Column mapping from the relational layout: `jsonb` columns are JSON
//! `TEXT`, `text[]` columns are JSON array `TEXT`, and `timestamptz` columns
//! are `INTEGER` microseconds since the Unix epoch. There are no declared
//! foreign keys; the element-to-link cascade runs as "delete dependent
//! links, then the element" inside one transaction.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Params};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::{Backend, BackendResult, Removed};
use crate::error::{BackendError, RecordKind};
use crate::model::{Element, ElementType, Link, LinkType, Timestamp};
use crate::schema::Descriptor;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS element_type (
  id TEXT PRIMARY KEY,
  schema TEXT NOT NULL,
  parent_types TEXT NOT NULL DEFAULT '[]',
  created_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000000),
  updated_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000000)
);

CREATE TABLE IF NOT EXISTS link_type (
  id TEXT PRIMARY KEY,
  from_type TEXT NOT NULL,
  to_type TEXT NOT NULL,
  schema TEXT NOT NULL,
  parent_types TEXT NOT NULL DEFAULT '[]',
  created_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000000),
  updated_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000000)
);

CREATE TABLE IF NOT EXISTS element (
  id TEXT PRIMARY KEY,
  type_id TEXT NOT NULL,
  data TEXT NOT NULL DEFAULT '{}',
  created_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000000),
  updated_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000000)
);

CREATE TABLE IF NOT EXISTS link (
  id TEXT PRIMARY KEY,
  from_id TEXT NOT NULL,
  to_id TEXT NOT NULL,
  link_type_id TEXT NOT NULL,
  data TEXT NOT NULL DEFAULT '{}',
  created_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000000),
  updated_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000000)
);

CREATE INDEX IF NOT EXISTS idx_element_type_id ON element(type_id);
CREATE INDEX IF NOT EXISTS idx_link_from_id ON link(from_id);
CREATE INDEX IF NOT EXISTS idx_link_to_id ON link(to_id);
CREATE INDEX IF NOT EXISTS idx_link_link_type_id ON link(link_type_id);
"#;

fn decode_json<T: DeserializeOwned>(kind: RecordKind, id: &str, text: &str) -> BackendResult<T> {
    serde_json::from_str(text).map_err(|e| BackendError::Corrupt {
        kind,
        id: id.to_string(),
        message: e.to_string(),
    })
}

fn decode_descriptor(kind: RecordKind, id: &str, text: &str) -> BackendResult<Descriptor> {
    Descriptor::from_json(text).map_err(|e| BackendError::Corrupt {
        kind,
        id: id.to_string(),
        message: e.to_string(),
    })
}

fn encode_json<T: Serialize>(kind: RecordKind, id: &str, value: &T) -> BackendResult<String> {
    serde_json::to_string(value).map_err(|e| BackendError::Corrupt {
        kind,
        id: id.to_string(),
        message: e.to_string(),
    })
}

/// Maps a unique-constraint failure on insert to [`BackendError::Duplicate`].
fn insert_error(err: rusqlite::Error, kind: RecordKind, id: &str) -> BackendError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            BackendError::Duplicate {
                kind,
                id: id.to_string(),
            }
        }
        _ => err.into(),
    }
}

fn to_count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

/// A record type stored in one table: how to read its columns and decode
/// the JSON ones.
trait Stored: Sized {
    type Raw;
    const SELECT: &'static str;
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self::Raw>;
    fn decode(raw: Self::Raw) -> BackendResult<Self>;
}

impl Stored for ElementType {
    type Raw = (String, String, String, Timestamp, Timestamp);
    const SELECT: &'static str =
        "SELECT id, schema, parent_types, created_at, updated_at FROM element_type";

    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self::Raw> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    fn decode((id, schema, parents, created_at, updated_at): Self::Raw) -> BackendResult<Self> {
        let kind = RecordKind::ElementType;
        Ok(ElementType {
            schema: decode_descriptor(kind, &id, &schema)?,
            parent_types: decode_json(kind, &id, &parents)?,
            id,
            created_at,
            updated_at,
        })
    }
}

impl Stored for LinkType {
    type Raw = (String, String, String, String, String, Timestamp, Timestamp);
    const SELECT: &'static str =
        "SELECT id, from_type, to_type, schema, parent_types, created_at, updated_at FROM link_type";

    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self::Raw> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn decode(
        (id, from_type, to_type, schema, parents, created_at, updated_at): Self::Raw,
    ) -> BackendResult<Self> {
        let kind = RecordKind::LinkType;
        Ok(LinkType {
            schema: decode_descriptor(kind, &id, &schema)?,
            parent_types: decode_json(kind, &id, &parents)?,
            id,
            from_type,
            to_type,
            created_at,
            updated_at,
        })
    }
}

impl Stored for Element {
    type Raw = (String, String, String, Timestamp, Timestamp);
    const SELECT: &'static str = "SELECT id, type_id, data, created_at, updated_at FROM element";

    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self::Raw> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    fn decode((id, type_id, data, created_at, updated_at): Self::Raw) -> BackendResult<Self> {
        Ok(Element {
            data: decode_json(RecordKind::Element, &id, &data)?,
            id,
            type_id,
            created_at,
            updated_at,
        })
    }
}

impl Stored for Link {
    type Raw = (String, String, String, String, String, Timestamp, Timestamp);
    const SELECT: &'static str =
        "SELECT id, from_id, to_id, link_type_id, data, created_at, updated_at FROM link";

    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self::Raw> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn decode(
        (id, from_id, to_id, link_type_id, data, created_at, updated_at): Self::Raw,
    ) -> BackendResult<Self> {
        Ok(Link {
            data: decode_json(RecordKind::Link, &id, &data)?,
            id,
            from_id,
            to_id,
            link_type_id,
            created_at,
            updated_at,
        })
    }
}

fn select_all<T: Stored>(conn: &Connection, filter: &str, params: impl Params) -> BackendResult<Vec<T>> {
    let sql = format!("{} {} ORDER BY rowid", T::SELECT, filter);
    let mut stmt = conn.prepare_cached(&sql)?;
    let raws = stmt
        .query_map(params, T::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(T::decode).collect()
}

fn select_by_id<T: Stored>(conn: &Connection, id: &str) -> BackendResult<Option<T>> {
    let sql = format!("{} WHERE id = ?1", T::SELECT);
    let raw = conn.query_row(&sql, [id], T::read).optional()?;
    raw.map(T::decode).transpose()
}

fn count(conn: &Connection, sql: &str, key: &str) -> BackendResult<usize> {
    let n: i64 = conn.query_row(sql, [key], |r| r.get(0))?;
    Ok(to_count(n))
}

/// A [`Backend`] over a SQLite database.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (creating if needed) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> BackendResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> BackendResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let conn = self.conn.lock();
        f.debug_struct("SqliteBackend")
            .field("path", &conn.path())
            .finish()
    }
}

impl Backend for SqliteBackend {
    fn insert_element_type(&self, row: &ElementType) -> BackendResult<()> {
        let kind = RecordKind::ElementType;
        let schema = encode_json(kind, &row.id, &row.schema)?;
        let parents = encode_json(kind, &row.id, &row.parent_types)?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO element_type (id, schema, parent_types, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![row.id, schema, parents, row.created_at, row.updated_at],
            )
            .map_err(|e| insert_error(e, kind, &row.id))?;
        Ok(())
    }

    fn element_type(&self, id: &str) -> BackendResult<Option<ElementType>> {
        select_by_id(&self.conn.lock(), id)
    }

    fn update_element_type(&self, row: &ElementType) -> BackendResult<bool> {
        let kind = RecordKind::ElementType;
        let schema = encode_json(kind, &row.id, &row.schema)?;
        let parents = encode_json(kind, &row.id, &row.parent_types)?;
        let n = self.conn.lock().execute(
            "UPDATE element_type SET schema = ?2, parent_types = ?3, created_at = ?4, updated_at = ?5
             WHERE id = ?1",
            params![row.id, schema, parents, row.created_at, row.updated_at],
        )?;
        Ok(n > 0)
    }

    fn delete_element_type(&self, id: &str) -> BackendResult<bool> {
        let n = self
            .conn
            .lock()
            .execute("DELETE FROM element_type WHERE id = ?1", [id])?;
        Ok(n > 0)
    }

    fn element_types(&self) -> BackendResult<Vec<ElementType>> {
        select_all(&self.conn.lock(), "", [])
    }

    fn insert_link_type(&self, row: &LinkType) -> BackendResult<()> {
        let kind = RecordKind::LinkType;
        let schema = encode_json(kind, &row.id, &row.schema)?;
        let parents = encode_json(kind, &row.id, &row.parent_types)?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO link_type (id, from_type, to_type, schema, parent_types, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row.id,
                    row.from_type,
                    row.to_type,
                    schema,
                    parents,
                    row.created_at,
                    row.updated_at
                ],
            )
            .map_err(|e| insert_error(e, kind, &row.id))?;
        Ok(())
    }

    fn link_type(&self, id: &str) -> BackendResult<Option<LinkType>> {
        select_by_id(&self.conn.lock(), id)
    }

    fn update_link_type(&self, row: &LinkType) -> BackendResult<bool> {
        let kind = RecordKind::LinkType;
        let schema = encode_json(kind, &row.id, &row.schema)?;
        let parents = encode_json(kind, &row.id, &row.parent_types)?;
        let n = self.conn.lock().execute(
            "UPDATE link_type SET from_type = ?2, to_type = ?3, schema = ?4, parent_types = ?5,
                    created_at = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                row.id,
                row.from_type,
                row.to_type,
                schema,
                parents,
                row.created_at,
                row.updated_at
            ],
        )?;
        Ok(n > 0)
    }

    fn delete_link_type(&self, id: &str) -> BackendResult<bool> {
        let n = self
            .conn
            .lock()
            .execute("DELETE FROM link_type WHERE id = ?1", [id])?;
        Ok(n > 0)
    }

    fn link_types(&self) -> BackendResult<Vec<LinkType>> {
        select_all(&self.conn.lock(), "", [])
    }

    fn insert_element(&self, row: &Element) -> BackendResult<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO element (id, type_id, data, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    row.id,
                    row.type_id,
                    row.data.to_json_string(),
                    row.created_at,
                    row.updated_at
                ],
            )
            .map_err(|e| insert_error(e, RecordKind::Element, &row.id))?;
        Ok(())
    }

    fn element(&self, id: &str) -> BackendResult<Option<Element>> {
        select_by_id(&self.conn.lock(), id)
    }

    fn update_element(&self, row: &Element) -> BackendResult<bool> {
        let n = self.conn.lock().execute(
            "UPDATE element SET type_id = ?2, data = ?3, created_at = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                row.id,
                row.type_id,
                row.data.to_json_string(),
                row.created_at,
                row.updated_at
            ],
        )?;
        Ok(n > 0)
    }

    fn delete_element(&self, id: &str) -> BackendResult<Option<usize>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let links = tx.execute("DELETE FROM link WHERE from_id = ?1 OR to_id = ?1", [id])?;
        let elements = tx.execute("DELETE FROM element WHERE id = ?1", [id])?;
        if elements == 0 {
            // Dropping the transaction rolls back the link delete.
            return Ok(None);
        }
        tx.commit()?;
        Ok(Some(links))
    }

    fn elements_by_type(&self, type_id: &str) -> BackendResult<Vec<Element>> {
        select_all(&self.conn.lock(), "WHERE type_id = ?1", [type_id])
    }

    fn count_elements_by_type(&self, type_id: &str) -> BackendResult<usize> {
        count(
            &self.conn.lock(),
            "SELECT COUNT(*) FROM element WHERE type_id = ?1",
            type_id,
        )
    }

    fn delete_elements_by_type(&self, type_id: &str) -> BackendResult<Removed> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let links = tx.execute(
            "DELETE FROM link
             WHERE from_id IN (SELECT id FROM element WHERE type_id = ?1)
                OR to_id IN (SELECT id FROM element WHERE type_id = ?1)",
            [type_id],
        )?;
        let elements = tx.execute("DELETE FROM element WHERE type_id = ?1", [type_id])?;
        tx.commit()?;
        Ok(Removed { links, elements })
    }

    fn insert_link(&self, row: &Link) -> BackendResult<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO link (id, from_id, to_id, link_type_id, data, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row.id,
                    row.from_id,
                    row.to_id,
                    row.link_type_id,
                    row.data.to_json_string(),
                    row.created_at,
                    row.updated_at
                ],
            )
            .map_err(|e| insert_error(e, RecordKind::Link, &row.id))?;
        Ok(())
    }

    fn link(&self, id: &str) -> BackendResult<Option<Link>> {
        select_by_id(&self.conn.lock(), id)
    }

    fn update_link(&self, row: &Link) -> BackendResult<bool> {
        let n = self.conn.lock().execute(
            "UPDATE link SET from_id = ?2, to_id = ?3, link_type_id = ?4, data = ?5,
                    created_at = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                row.id,
                row.from_id,
                row.to_id,
                row.link_type_id,
                row.data.to_json_string(),
                row.created_at,
                row.updated_at
            ],
        )?;
        Ok(n > 0)
    }

    fn delete_link(&self, id: &str) -> BackendResult<bool> {
        let n = self
            .conn
            .lock()
            .execute("DELETE FROM link WHERE id = ?1", [id])?;
        Ok(n > 0)
    }

    fn links_from(&self, element_id: &str, link_type_id: Option<&str>) -> BackendResult<Vec<Link>> {
        select_all(
            &self.conn.lock(),
            "WHERE from_id = ?1 AND (?2 IS NULL OR link_type_id = ?2)",
            params![element_id, link_type_id],
        )
    }

    fn links_to(&self, element_id: &str, link_type_id: Option<&str>) -> BackendResult<Vec<Link>> {
        select_all(
            &self.conn.lock(),
            "WHERE to_id = ?1 AND (?2 IS NULL OR link_type_id = ?2)",
            params![element_id, link_type_id],
        )
    }

    fn links_by_type(&self, link_type_id: &str) -> BackendResult<Vec<Link>> {
        select_all(&self.conn.lock(), "WHERE link_type_id = ?1", [link_type_id])
    }

    fn count_links_by_type(&self, link_type_id: &str) -> BackendResult<usize> {
        count(
            &self.conn.lock(),
            "SELECT COUNT(*) FROM link WHERE link_type_id = ?1",
            link_type_id,
        )
    }

    fn delete_links_by_type(&self, link_type_id: &str) -> BackendResult<usize> {
        let n = self
            .conn
            .lock()
            .execute("DELETE FROM link WHERE link_type_id = ?1", [link_type_id])?;
        Ok(n)
    }
}
