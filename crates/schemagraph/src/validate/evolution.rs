//! Schema change detection and safety judgment.
//!
//! Only the schema used for future writes is checked; stored data is never
//! migrated. A change is unsafe when existing records could no longer pass
//! strict validation on their next update: a required field without a
//! default was added or changed while records of the type exist.

use serde::{Deserialize, Serialize};

use crate::schema::Descriptor;

/// How a field differs between two object descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

/// One field-level difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub field: String,
    /// Set for `Added` and `Changed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    /// Set for `Added` and `Changed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_default: Option<bool>,
}

impl Change {
    fn describing(kind: ChangeKind, field: &str, descriptor: &Descriptor) -> Self {
        Self {
            kind,
            field: field.to_string(),
            required: Some(descriptor.is_required()),
            has_default: Some(descriptor.has_default()),
        }
    }

    fn removed(field: &str) -> Self {
        Self {
            kind: ChangeKind::Removed,
            field: field.to_string(),
            required: None,
            has_default: None,
        }
    }

    /// Required without a default: existing records cannot satisfy it.
    pub fn breaks_existing(&self) -> bool {
        self.kind != ChangeKind::Removed
            && self.required == Some(true)
            && self.has_default == Some(false)
    }
}

/// Verdict of [`is_safe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Safety {
    pub safe: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Field named by `reason`, if unsafe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Safety {
    fn safe() -> Self {
        Self {
            safe: true,
            reason: None,
            field: None,
        }
    }
}

fn json_of(d: &Descriptor) -> Option<serde_json::Value> {
    d.to_json_value().ok()
}

/// Computes field-level changes between two `object` descriptors.
///
/// Returns an empty list unless both descriptors are objects. A field whose
/// descriptor serializes to different JSON is `Changed`.
pub fn diff(old: &Descriptor, new: &Descriptor) -> Vec<Change> {
    let (Some(old_shape), Some(new_shape)) = (old.shape(), new.shape()) else {
        return Vec::new();
    };

    let mut changes = Vec::new();
    for (field, new_field) in new_shape {
        match old_shape.get(field) {
            None => changes.push(Change::describing(ChangeKind::Added, field, new_field)),
            Some(old_field) if json_of(old_field) != json_of(new_field) => {
                changes.push(Change::describing(ChangeKind::Changed, field, new_field))
            }
            Some(_) => {}
        }
    }
    for field in old_shape.keys() {
        if !new_shape.contains_key(field) {
            changes.push(Change::removed(field));
        }
    }
    changes
}

/// Judges whether `changes` can be applied with `existing` records present.
pub fn is_safe(changes: &[Change], existing: usize) -> Safety {
    if existing == 0 {
        return Safety::safe();
    }
    match changes.iter().find(|c| c.breaks_existing()) {
        Some(change) => Safety {
            safe: false,
            reason: Some(format!(
                "field '{}' is required with no default, but {} existing record(s) lack it",
                change.field, existing
            )),
            field: Some(change.field.clone()),
        },
        None => Safety::safe(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;
    use crate::schema::serialize;
    use crate::schema::types::*;

    fn task() -> Descriptor {
        serialize(&object([
            ("title", string()),
            ("completed", boolean().with_default(false)),
        ]))
    }

    fn task_with(field: &str, schema: Schema) -> Descriptor {
        serialize(&object([
            ("title", string()),
            ("completed", boolean().with_default(false)),
            (field, schema),
        ]))
    }

    #[test]
    fn test_added_required_field_unsafe_with_records() {
        let changes = diff(&task(), &task_with("priority", number()));
        assert_eq!(
            changes,
            vec![Change {
                kind: ChangeKind::Added,
                field: "priority".into(),
                required: Some(true),
                has_default: Some(false),
            }]
        );

        let verdict = is_safe(&changes, 5);
        assert!(!verdict.safe);
        assert_eq!(verdict.field.as_deref(), Some("priority"));
        assert!(verdict.reason.unwrap().contains("priority"));

        assert!(is_safe(&changes, 0).safe);
    }

    #[test]
    fn test_optional_or_defaulted_additions_are_safe() {
        let changes = diff(&task(), &task_with("priority", number().optional()));
        assert!(is_safe(&changes, 5).safe);

        let changes = diff(&task(), &task_with("priority", number().with_default(1)));
        assert_eq!(changes[0].has_default, Some(true));
        assert!(is_safe(&changes, 5).safe);
    }

    #[test]
    fn test_removed_field_is_safe() {
        let old = task_with("priority", number());
        let changes = diff(&old, &task());
        assert_eq!(changes, vec![Change::removed("priority")]);
        assert!(is_safe(&changes, 100).safe);
    }

    #[test]
    fn test_changed_field() {
        let old = task();
        let new = serialize(&object([
            ("title", number()),
            ("completed", boolean().with_default(false)),
        ]));
        let changes = diff(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Changed);
        assert!(!is_safe(&changes, 1).safe);
    }

    #[test]
    fn test_default_value_change_is_a_change() {
        let new = serialize(&object([
            ("title", string()),
            ("completed", boolean().with_default(true)),
        ]));
        let changes = diff(&task(), &new);
        assert_eq!(changes[0].kind, ChangeKind::Changed);
        assert!(is_safe(&changes, 3).safe);
    }

    #[test]
    fn test_non_object_diff_is_empty() {
        let a = serialize(&string());
        let b = serialize(&number());
        assert!(diff(&a, &b).is_empty());
        assert!(diff(&a, &task()).is_empty());
    }

    #[test]
    fn test_identical_is_empty() {
        assert!(diff(&task(), &task()).is_empty());
    }

    #[test]
    fn test_change_serializes_lowercase() {
        let c = Change::removed("x");
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "removed", "field": "x"}));
        let _: Value = Value::from(json);
    }
}
