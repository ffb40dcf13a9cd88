//! Error types for the schemagraph store, registry, backends and sync.

use std::fmt;

use thiserror::Error;

use crate::validate::Issue;

/// Which kind of stored record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Element,
    Link,
    ElementType,
    LinkType,
}

impl RecordKind {
    /// Returns the backing table name for this record kind.
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Element => "element",
            RecordKind::Link => "link",
            RecordKind::ElementType => "element_type",
            RecordKind::LinkType => "link_type",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Element => write!(f, "element"),
            RecordKind::Link => write!(f, "link"),
            RecordKind::ElementType => write!(f, "element type"),
            RecordKind::LinkType => write!(f, "link type"),
        }
    }
}

/// The end of a link an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    From,
    To,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::From => write!(f, "from"),
            Side::To => write!(f, "to"),
        }
    }
}

fn join_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error returned by registry, store and query operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("type not found: {id}")]
    TypeNotFound { id: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    #[error("validation failed: {}", join_issues(.errors))]
    ValidationFailed { errors: Vec<Issue> },

    #[error("referential integrity violation: {side} element {id} does not exist")]
    ReferentialIntegrity { side: Side, id: String },

    #[error("link type {link_type} expects {side} element of type {expected}, found {actual}")]
    LinkEndpointMismatch {
        link_type: String,
        side: Side,
        expected: String,
        actual: String,
    },

    #[error("{kind} {id} still has {count} instance(s)")]
    TypeInUse {
        kind: RecordKind,
        id: String,
        count: usize,
    },

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result alias for store-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error raised by a backing store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// Primary key already present (unique-constraint violation).
    #[error("duplicate {kind} id: {id}")]
    Duplicate { kind: RecordKind, id: String },

    /// A stored column could not be decoded.
    #[error("corrupt {kind} row {id}: {message}")]
    Corrupt {
        kind: RecordKind,
        id: String,
        message: String,
    },

    #[error("sqlite: {0}")]
    Sqlite(String),
}

impl From<rusqlite::Error> for BackendError {
    fn from(err: rusqlite::Error) -> Self {
        BackendError::Sqlite(err.to_string())
    }
}

/// Error decoding or accepting a schema descriptor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DescriptorError {
    #[error("malformed descriptor: {0}")]
    Malformed(String),

    /// Type schemas govern record payloads, which are always objects.
    #[error("type schema must be a required, non-nullable object, found {found}")]
    NotObject { found: String },
}

impl From<serde_json::Error> for DescriptorError {
    fn from(err: serde_json::Error) -> Self {
        DescriptorError::Malformed(err.to_string())
    }
}

/// Per-type error reported by the sync engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("unsafe schema change to {type_id}.{field}: {reason}")]
    UnsafeSchemaChange {
        type_id: String,
        field: String,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] Error),
}

impl From<BackendError> for SyncError {
    fn from(err: BackendError) -> Self {
        SyncError::Store(Error::Backend(err))
    }
}
