//! schemagraph: a schema-validated property graph over a relational backing store.
//!
//! This crate stores typed graph nodes ("elements") and typed directed edges
//! ("links") whose payloads are free-form JSON, constrained at runtime by
//! user-declared, serializable schemas.
//!
//! # Overview
//!
//! - **Declared types**: element and link types carry a schema descriptor,
//!   stored as JSON next to the data it governs
//! - **Strict writes, loose reads**: every write is rejected unless it passes
//!   its type's schema; every read fills defaults added since the record was
//!   written and never fails validation
//! - **Safe evolution**: schema changes are diffed and refused when they would
//!   strand existing records
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use schemagraph::schema::{boolean, object, string};
//! use schemagraph::{MemoryBackend, Query, Store, StoreConfig, Value};
//!
//! let store = Store::with_backend(Arc::new(MemoryBackend::new()), StoreConfig::default());
//! store
//!     .registry()
//!     .create_element_type(
//!         "task",
//!         &object([
//!             ("title", string()),
//!             ("completed", boolean().with_default(false)),
//!         ]),
//!         vec![],
//!     )
//!     .unwrap();
//!
//! let task = store
//!     .create_element("task", &Value::object([("title", Value::from("Buy milk"))]))
//!     .unwrap();
//! assert_eq!(task.data.get("completed"), Some(&Value::Bool(false)));
//!
//! let done = store
//!     .update_element(&task.id, &Value::object([("completed", Value::Bool(true))]))
//!     .unwrap();
//! assert_eq!(done.data.get("title").and_then(|v| v.as_str()), Some("Buy milk"));
//!
//! let query = Query::new(store);
//! assert_eq!(query.find_by_type("task").unwrap().len(), 1);
//! ```
//!
//! # Modules
//!
//! - [`model`]: Values, identifiers and stored records
//! - [`schema`]: In-code schemas, storable descriptors and conversion
//! - [`validate`]: Strict/loose validation and schema change safety
//! - [`backend`]: Backing store trait with memory and SQLite implementations
//! - [`registry`]: Element and link type definitions
//! - [`store`]: Element and link CRUD
//! - [`query`]: Listing, neighbors and traversal
//! - [`sync`]: Reconciling declared types with the store
//! - [`error`]: Error types

pub mod backend;
pub mod error;
pub mod model;
pub mod query;
pub mod registry;
pub mod schema;
pub mod store;
pub mod sync;
pub mod util;
pub mod validate;

// Re-export commonly used types at crate root
pub use backend::{Backend, MemoryBackend, SqliteBackend};
pub use error::{BackendError, DescriptorError, Error, RecordKind, Result, Side, SyncError};
pub use model::{Element, ElementType, Link, LinkType, Timestamp, Value};
pub use query::{Connected, Direction, Page, Query, Visit};
pub use registry::{TypeRegistry, TypeUpdate};
pub use schema::{deserialize, serialize, Descriptor, DescriptorKind, Schema};
pub use store::{Store, StoreConfig};
pub use sync::{SyncOptions, SyncOutcome, SyncReport, TypeManifest, TypeSync};
pub use validate::{validate, Issue, Mode, Validation};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
