//! Reconciles code-declared type definitions with the stored registry.
//!
//! For each declared type:
//! - absent from the store: inserted, reported `added`
//! - stored with an identical descriptor and parents: `unchanged`
//! - stored with a different definition: the descriptors are diffed, the
//!   existing records of the type are counted, and the change is judged by
//!   [`is_safe`]. Safe changes are written (`updated`); unsafe ones leave the
//!   stored definition untouched (`unsafe`).
//!
//! Stored types missing from the manifest are reported `orphaned`, or with
//! [`SyncOptions::prune`] deleted together with their instances (`pruned`).
//! Every type is processed; per-type failures are collected in the report
//! rather than aborting the run.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::backend::{Backend, Removed};
use crate::error::{Error, SyncError};
use crate::model::LinkType;
use crate::registry::{TypeRegistry, TypeUpdate};
use crate::schema::{serialize, Descriptor, Schema};
use crate::util::now_micros;
use crate::validate::{diff, is_safe, Change};

/// A code-declared element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredElementType {
    pub id: String,
    pub schema: Descriptor,
    #[serde(default)]
    pub parent_types: Vec<String>,
}

/// A code-declared link type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredLinkType {
    pub id: String,
    pub from_type: String,
    pub to_type: String,
    pub schema: Descriptor,
    #[serde(default)]
    pub parent_types: Vec<String>,
}

/// The full set of type definitions the store should hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeManifest {
    #[serde(default)]
    pub element_types: Vec<DeclaredElementType>,
    #[serde(default)]
    pub link_types: Vec<DeclaredLinkType>,
}

impl TypeManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a manifest from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Declares an element type.
    pub fn element(mut self, id: &str, schema: &Schema) -> Self {
        self.element_types.push(DeclaredElementType {
            id: id.to_string(),
            schema: serialize(schema),
            parent_types: Vec::new(),
        });
        self
    }

    /// Declares a link type.
    pub fn link(mut self, id: &str, from_type: &str, to_type: &str, schema: &Schema) -> Self {
        self.link_types.push(DeclaredLinkType {
            id: id.to_string(),
            from_type: from_type.to_string(),
            to_type: to_type.to_string(),
            schema: serialize(schema),
            parent_types: Vec::new(),
        });
        self
    }
}

/// Run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Delete orphaned types and all their instances.
    pub prune: bool,
    /// Compute the report without writing.
    pub dry_run: bool,
}

/// Which registry a report entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Element,
    Link,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Element => write!(f, "element type"),
            TypeKind::Link => write!(f, "link type"),
        }
    }
}

/// What happened to one type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SyncOutcome {
    Added,
    Updated { changes: Vec<Change> },
    Unchanged,
    Orphaned,
    Pruned { links: usize, elements: usize },
    Unsafe { field: String, reason: String },
    Failed { message: String },
}

impl SyncOutcome {
    fn from_error(err: SyncError) -> Self {
        match err {
            SyncError::UnsafeSchemaChange { field, reason, .. } => SyncOutcome::Unsafe { field, reason },
            SyncError::Store(err) => SyncOutcome::Failed {
                message: err.to_string(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SyncOutcome::Unsafe { .. } | SyncOutcome::Failed { .. })
    }
}

/// One line of a [`SyncReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEntry {
    pub kind: TypeKind,
    pub type_id: String,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

impl fmt::Display for SyncEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, id) = (&self.kind, &self.type_id);
        match &self.outcome {
            SyncOutcome::Added => write!(f, "added {kind} {id}"),
            SyncOutcome::Updated { changes } => {
                write!(f, "updated {kind} {id} ({} field change(s))", changes.len())
            }
            SyncOutcome::Unchanged => write!(f, "unchanged {kind} {id}"),
            SyncOutcome::Orphaned => write!(f, "orphaned {kind} {id}"),
            SyncOutcome::Pruned { links, elements } => write!(
                f,
                "pruned {kind} {id} ({links} link(s), {elements} element(s) removed)"
            ),
            SyncOutcome::Unsafe { reason, .. } => write!(f, "error: unsafe change to {kind} {id}: {reason}"),
            SyncOutcome::Failed { message } => write!(f, "error: {kind} {id}: {message}"),
        }
    }
}

/// Outcome counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub orphaned: usize,
    pub pruned: usize,
    pub errors: usize,
}

/// Per-type results of [`TypeSync::run`], in processing order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub entries: Vec<SyncEntry>,
}

impl SyncReport {
    /// Returns true if any type had an unsafe change or failed.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.outcome.is_error())
    }

    /// Entries that are errors.
    pub fn errors(&self) -> impl Iterator<Item = &SyncEntry> {
        self.entries.iter().filter(|e| e.outcome.is_error())
    }

    /// Looks up the entry for a type.
    pub fn entry(&self, kind: TypeKind, type_id: &str) -> Option<&SyncEntry> {
        self.entries
            .iter()
            .find(|e| e.kind == kind && e.type_id == type_id)
    }

    pub fn summary(&self) -> SyncSummary {
        let mut s = SyncSummary::default();
        for entry in &self.entries {
            match entry.outcome {
                SyncOutcome::Added => s.added += 1,
                SyncOutcome::Updated { .. } => s.updated += 1,
                SyncOutcome::Unchanged => s.unchanged += 1,
                SyncOutcome::Orphaned => s.orphaned += 1,
                SyncOutcome::Pruned { .. } => s.pruned += 1,
                SyncOutcome::Unsafe { .. } | SyncOutcome::Failed { .. } => s.errors += 1,
            }
        }
        s
    }
}

type SyncResult<T> = std::result::Result<T, SyncError>;

/// The sync engine.
pub struct TypeSync {
    registry: TypeRegistry,
    backend: Arc<dyn Backend>,
}

impl TypeSync {
    pub fn new(registry: TypeRegistry, backend: Arc<dyn Backend>) -> Self {
        Self { registry, backend }
    }

    /// Reconciles the store with `manifest`.
    ///
    /// Fails only if the stored type lists cannot be read; everything else
    /// is reported per type.
    pub fn run(&self, manifest: &TypeManifest, options: SyncOptions) -> SyncResult<SyncReport> {
        let stored_elements = self.registry.element_types()?;
        let stored_links = self.registry.link_types()?;

        let mut report = SyncReport {
            dry_run: options.dry_run,
            entries: Vec::new(),
        };

        for declared in &manifest.element_types {
            let result = self.sync_element_type(declared, options);
            report.push(TypeKind::Element, &declared.id, result);
        }
        for declared in &manifest.link_types {
            let result = self.sync_link_type(declared, options);
            report.push(TypeKind::Link, &declared.id, result);
        }

        let declared_links: BTreeSet<&str> =
            manifest.link_types.iter().map(|t| t.id.as_str()).collect();
        for stored in stored_links.iter().filter(|t| !declared_links.contains(t.id.as_str())) {
            let result = self.orphan(TypeKind::Link, &stored.id, options);
            report.push(TypeKind::Link, &stored.id, result);
        }

        let declared_elements: BTreeSet<&str> =
            manifest.element_types.iter().map(|t| t.id.as_str()).collect();
        for stored in stored_elements.iter().filter(|t| !declared_elements.contains(t.id.as_str())) {
            let result = self.orphan(TypeKind::Element, &stored.id, options);
            report.push(TypeKind::Element, &stored.id, result);
        }

        let s = report.summary();
        info!(
            added = s.added,
            updated = s.updated,
            unchanged = s.unchanged,
            orphaned = s.orphaned,
            pruned = s.pruned,
            errors = s.errors,
            dry_run = options.dry_run,
            "type sync finished"
        );
        Ok(report)
    }

    fn sync_element_type(
        &self,
        declared: &DeclaredElementType,
        options: SyncOptions,
    ) -> SyncResult<SyncOutcome> {
        declared.schema.require_object().map_err(Error::from)?;
        let stored = match self.registry.element_type(&declared.id) {
            Ok(stored) => stored,
            Err(Error::TypeNotFound { .. }) => {
                if !options.dry_run {
                    self.registry.create_element_type_from_descriptor(
                        &declared.id,
                        declared.schema.clone(),
                        declared.parent_types.clone(),
                    )?;
                }
                return Ok(SyncOutcome::Added);
            }
            Err(err) => return Err(err.into()),
        };

        if stored.schema == declared.schema && stored.parent_types == declared.parent_types {
            return Ok(SyncOutcome::Unchanged);
        }

        let changes = self.check_changes(&declared.id, &stored.schema, &declared.schema, || {
            self.backend.count_elements_by_type(&declared.id)
        })?;

        if !options.dry_run {
            self.registry.update_element_type(
                &declared.id,
                TypeUpdate {
                    schema: Some(declared.schema.clone()),
                    parent_types: Some(declared.parent_types.clone()),
                },
            )?;
        }
        Ok(SyncOutcome::Updated { changes })
    }

    fn sync_link_type(&self, declared: &DeclaredLinkType, options: SyncOptions) -> SyncResult<SyncOutcome> {
        declared.schema.require_object().map_err(Error::from)?;
        let stored = match self.registry.link_type(&declared.id) {
            Ok(stored) => stored,
            Err(Error::TypeNotFound { .. }) => {
                if !options.dry_run {
                    self.registry.create_link_type_from_descriptor(
                        &declared.id,
                        &declared.from_type,
                        &declared.to_type,
                        declared.schema.clone(),
                        declared.parent_types.clone(),
                    )?;
                }
                return Ok(SyncOutcome::Added);
            }
            Err(err) => return Err(err.into()),
        };

        if stored.schema == declared.schema
            && stored.parent_types == declared.parent_types
            && stored.from_type == declared.from_type
            && stored.to_type == declared.to_type
        {
            return Ok(SyncOutcome::Unchanged);
        }

        let changes = self.check_changes(&declared.id, &stored.schema, &declared.schema, || {
            self.backend.count_links_by_type(&declared.id)
        })?;

        if !options.dry_run {
            let row = LinkType {
                from_type: declared.from_type.clone(),
                to_type: declared.to_type.clone(),
                schema: declared.schema.clone(),
                parent_types: declared.parent_types.clone(),
                updated_at: now_micros().max(stored.updated_at),
                ..stored
            };
            if !self.backend.update_link_type(&row)? {
                return Err(Error::TypeNotFound { id: row.id }.into());
            }
        }
        Ok(SyncOutcome::Updated { changes })
    }

    /// Diffs two descriptors and fails if the change is unsafe given the
    /// number of existing records.
    fn check_changes(
        &self,
        type_id: &str,
        old: &Descriptor,
        new: &Descriptor,
        count: impl FnOnce() -> crate::backend::BackendResult<usize>,
    ) -> SyncResult<Vec<Change>> {
        let changes = diff(old, new);
        if changes.iter().any(Change::breaks_existing) {
            let safety = is_safe(&changes, count()?);
            if !safety.safe {
                return Err(SyncError::UnsafeSchemaChange {
                    type_id: type_id.to_string(),
                    field: safety.field.unwrap_or_default(),
                    reason: safety.reason.unwrap_or_default(),
                });
            }
        }
        Ok(changes)
    }

    fn orphan(&self, kind: TypeKind, type_id: &str, options: SyncOptions) -> SyncResult<SyncOutcome> {
        if !options.prune {
            return Ok(SyncOutcome::Orphaned);
        }
        if options.dry_run {
            info!(%kind, type_id, "dry run: orphan would be pruned");
            return Ok(SyncOutcome::Orphaned);
        }

        let (removed, type_row_deleted) = match kind {
            TypeKind::Link => {
                let links = self.backend.delete_links_by_type(type_id)?;
                let deleted = self.backend.delete_link_type(type_id)?;
                (Removed { links, elements: 0 }, deleted)
            }
            TypeKind::Element => {
                let removed = self.backend.delete_elements_by_type(type_id)?;
                let deleted = self.backend.delete_element_type(type_id)?;
                (removed, deleted)
            }
        };
        if !type_row_deleted {
            warn!(%kind, type_id, "orphaned type disappeared before it was pruned");
        }
        info!(
            %kind,
            type_id,
            links = removed.links,
            elements = removed.elements,
            "pruned orphaned type"
        );
        Ok(SyncOutcome::Pruned {
            links: removed.links,
            elements: removed.elements,
        })
    }
}

impl SyncReport {
    fn push(&mut self, kind: TypeKind, type_id: &str, result: SyncResult<SyncOutcome>) {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                match &err {
                    SyncError::UnsafeSchemaChange { .. } => warn!(%kind, type_id, %err, "rejected schema change"),
                    SyncError::Store(_) => error!(%kind, type_id, %err, "type sync failed"),
                }
                SyncOutcome::from_error(err)
            }
        };
        match &outcome {
            SyncOutcome::Added | SyncOutcome::Updated { .. } | SyncOutcome::Orphaned => {
                info!(%kind, type_id, outcome = ?outcome, "type synced")
            }
            _ => {}
        }
        self.entries.push(SyncEntry {
            kind,
            type_id: type_id.to_string(),
            outcome,
        });
    }
}

impl fmt::Debug for TypeSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSync").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::model::Value;
    use crate::schema::{boolean, number, object, string};
    use crate::store::{Store, StoreConfig};
    use crate::validate::ChangeKind;

    fn task_v1() -> Schema {
        object([
            ("title", string()),
            ("completed", boolean().with_default(false)),
        ])
    }

    fn task_with_priority(priority: Schema) -> Schema {
        object([
            ("title", string()),
            ("completed", boolean().with_default(false)),
            ("priority", priority),
        ])
    }

    struct Fixture {
        store: Store,
        sync: TypeSync,
    }

    fn fixture() -> Fixture {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let store = Store::with_backend(Arc::clone(&backend), StoreConfig::default());
        let sync = TypeSync::new(store.registry().clone(), backend);
        Fixture { store, sync }
    }

    fn task(f: &Fixture, title: &str) -> String {
        f.store
            .create_element("task", &Value::object([("title", Value::from(title))]))
            .unwrap()
            .id
    }

    #[test]
    fn test_adds_new_types() {
        let f = fixture();
        let manifest = TypeManifest::new()
            .element("task", &task_v1())
            .link("blocks", "task", "task", &object([("hard", boolean().optional())]));
        let report = f.sync.run(&manifest, SyncOptions::default()).unwrap();

        assert!(!report.has_errors());
        assert_eq!(report.summary().added, 2);
        assert_eq!(f.store.registry().element_type("task").unwrap().schema, serialize(&task_v1()));
        assert_eq!(f.store.registry().link_type("blocks").unwrap().to_type, "task");

        let again = f.sync.run(&manifest, SyncOptions::default()).unwrap();
        assert_eq!(again.summary().unchanged, 2);
    }

    #[test]
    fn test_unsafe_change_leaves_stored_type() {
        let f = fixture();
        f.sync
            .run(&TypeManifest::new().element("task", &task_v1()), SyncOptions::default())
            .unwrap();
        task(&f, "a");

        let manifest = TypeManifest::new().element("task", &task_with_priority(number()));
        let report = f.sync.run(&manifest, SyncOptions::default()).unwrap();

        assert!(report.has_errors());
        let entry = report.entry(TypeKind::Element, "task").unwrap();
        let SyncOutcome::Unsafe { field, reason } = &entry.outcome else {
            panic!("expected unsafe outcome, got {:?}", entry.outcome);
        };
        assert_eq!(field, "priority");
        assert!(reason.contains("priority"));
        assert_eq!(f.store.registry().element_type("task").unwrap().schema, serialize(&task_v1()));
    }

    #[test]
    fn test_same_change_is_safe_without_records() {
        let f = fixture();
        f.sync
            .run(&TypeManifest::new().element("task", &task_v1()), SyncOptions::default())
            .unwrap();

        let next = task_with_priority(number());
        let report = f
            .sync
            .run(&TypeManifest::new().element("task", &next), SyncOptions::default())
            .unwrap();
        let entry = report.entry(TypeKind::Element, "task").unwrap();
        match &entry.outcome {
            SyncOutcome::Updated { changes } => {
                assert_eq!(changes.len(), 1);
                assert_eq!(changes[0].kind, ChangeKind::Added);
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(f.store.registry().element_type("task").unwrap().schema, serialize(&next));
    }

    #[test]
    fn test_defaulted_addition_applies_with_records() {
        let f = fixture();
        f.sync
            .run(&TypeManifest::new().element("task", &task_v1()), SyncOptions::default())
            .unwrap();
        let id = task(&f, "a");

        let next = task_with_priority(number().with_default(1));
        let report = f
            .sync
            .run(&TypeManifest::new().element("task", &next), SyncOptions::default())
            .unwrap();
        assert!(!report.has_errors());
        assert_eq!(report.summary().updated, 1);
        assert_eq!(
            f.store.element(&id).unwrap().data.get("priority"),
            Some(&Value::from(1))
        );
    }

    #[test]
    fn test_errors_do_not_stop_other_types() {
        let f = fixture();
        let v1 = TypeManifest::new()
            .element("task", &task_v1())
            .element("note", &object([("body", string())]));
        f.sync.run(&v1, SyncOptions::default()).unwrap();
        task(&f, "a");

        let v2 = TypeManifest::new()
            .element("task", &task_with_priority(number()))
            .element("note", &object([("body", string()), ("pinned", boolean().optional())]))
            .element("tag", &object([("label", string())]));
        let report = f.sync.run(&v2, SyncOptions::default()).unwrap();

        let s = report.summary();
        assert_eq!((s.errors, s.updated, s.added), (1, 1, 1));
        assert_eq!(report.errors().count(), 1);
    }

    #[test]
    fn test_orphans_reported_then_pruned() {
        let f = fixture();
        let v1 = TypeManifest::new()
            .element("task", &task_v1())
            .element("person", &object([("name", string())]))
            .link("assigned", "task", "person", &Schema::Object(Default::default()));
        f.sync.run(&v1, SyncOptions::default()).unwrap();

        let t = task(&f, "a");
        let p = f
            .store
            .create_element("person", &Value::object([("name", Value::from("Ada"))]))
            .unwrap();
        f.store
            .create_link(&t, &p.id, "assigned", &Value::empty_object())
            .unwrap();

        let v2 = TypeManifest::new().element("task", &task_v1());
        let report = f.sync.run(&v2, SyncOptions::default()).unwrap();
        assert_eq!(report.summary().orphaned, 2);
        assert!(!report.has_errors());

        let dry = f
            .sync
            .run(&v2, SyncOptions { prune: true, dry_run: true })
            .unwrap();
        assert_eq!(dry.summary().orphaned, 2);
        assert!(f.store.registry().element_type("person").is_ok());

        let pruned = f
            .sync
            .run(&v2, SyncOptions { prune: true, dry_run: false })
            .unwrap();
        assert_eq!(
            pruned.entry(TypeKind::Link, "assigned").unwrap().outcome,
            SyncOutcome::Pruned { links: 1, elements: 0 }
        );
        assert_eq!(
            pruned.entry(TypeKind::Element, "person").unwrap().outcome,
            SyncOutcome::Pruned { links: 0, elements: 1 }
        );
        assert!(f.store.registry().element_type("person").is_err());
        assert!(f.store.element(&t).is_ok());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let f = fixture();
        let manifest = TypeManifest::new().element("task", &task_v1());
        let report = f
            .sync
            .run(&manifest, SyncOptions { prune: false, dry_run: true })
            .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.summary().added, 1);
        assert!(f.store.registry().element_types().unwrap().is_empty());
    }

    #[test]
    fn test_non_object_schema_fails_without_blocking_others() {
        let f = fixture();
        let manifest = TypeManifest::new()
            .element("label", &string())
            .element("task", &task_v1());
        for dry_run in [true, false] {
            let report = f
                .sync
                .run(&manifest, SyncOptions { prune: false, dry_run })
                .unwrap();
            assert_eq!(
                report.entry(TypeKind::Element, "label").unwrap().outcome,
                SyncOutcome::Failed {
                    message: "type schema must be a required, non-nullable object, found string".into()
                }
            );
            assert_eq!(report.entry(TypeKind::Element, "task").unwrap().outcome, SyncOutcome::Added);
        }
        assert!(matches!(
            f.store.registry().element_type("label"),
            Err(Error::TypeNotFound { .. })
        ));
    }

    #[test]
    fn test_prune_of_vanished_type_is_not_an_error() {
        let f = fixture();
        let options = SyncOptions { prune: true, dry_run: false };
        assert_eq!(
            f.sync.orphan(TypeKind::Element, "ghost", options).unwrap(),
            SyncOutcome::Pruned { links: 0, elements: 0 }
        );
        assert_eq!(
            f.sync.orphan(TypeKind::Link, "ghost", options).unwrap(),
            SyncOutcome::Pruned { links: 0, elements: 0 }
        );
    }

    #[test]
    fn test_manifest_json_and_report_json() {
        let manifest = TypeManifest::from_json(
            r#"{
                "element_types": [
                    {"id": "task", "schema": {"type": "object", "shape": {"title": {"type": "string"}}}}
                ],
                "link_types": [
                    {"id": "blocks", "from_type": "task", "to_type": "task",
                     "schema": {"type": "object", "shape": {}}, "parent_types": ["relation"]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.element_types[0].parent_types, Vec::<String>::new());
        assert_eq!(manifest.link_types[0].parent_types, vec!["relation".to_string()]);

        let entry = SyncEntry {
            kind: TypeKind::Element,
            type_id: "task".into(),
            outcome: SyncOutcome::Pruned { links: 2, elements: 3 },
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            serde_json::json!({"kind": "element", "type_id": "task", "outcome": "pruned", "links": 2, "elements": 3})
        );
        assert_eq!(
            entry.to_string(),
            "pruned element type task (2 link(s), 3 element(s) removed)"
        );
    }
}
