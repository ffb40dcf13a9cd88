//! Validation of payloads against schema descriptors.
//!
//! Two modes share one interpreter:
//!
//! - **Strict** (write path): the value is parsed as given. On failure the
//!   result carries one issue per offending field and the *original* value.
//! - **Loose** (read path): absent top-level object fields are first filled
//!   from their own defaults, then parsed. On failure the issues are logged
//!   as warnings and the result is still successful, carrying the
//!   defaulted-but-unparsed value. Loose validation never blocks a read.
//!
//! Neither entry point returns an error. Schema evolution checks live in
//! [`evolution`].

pub mod evolution;
mod interpret;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::Value;
use crate::schema::{deserialize, Descriptor, Schema};

use interpret::Interpreter;

pub use evolution::{diff, is_safe, Change, ChangeKind, Safety};

/// One validation failure at a field path (`.`-separated, empty for the root).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl Issue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Validation strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Strict,
    Loose,
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub success: bool,
    pub data: Value,
    pub errors: Vec<Issue>,
}

impl Validation {
    /// Converts a strict outcome into the validated data or its issues.
    pub fn into_result(self) -> Result<Value, Vec<Issue>> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self.errors)
        }
    }
}

/// Validates `value` against a stored descriptor.
pub fn validate(value: &Value, descriptor: &Descriptor, mode: Mode) -> Validation {
    validate_schema(value, &deserialize(descriptor), mode)
}

/// Validates `value` against an in-code schema.
pub fn validate_schema(value: &Value, schema: &Schema, mode: Mode) -> Validation {
    match mode {
        Mode::Strict => {
            let (out, errors) = run(schema, value);
            if errors.is_empty() {
                Validation {
                    success: true,
                    data: out.unwrap_or_default(),
                    errors,
                }
            } else {
                Validation {
                    success: false,
                    data: value.clone(),
                    errors,
                }
            }
        }
        Mode::Loose => {
            let defaulted = fill_top_level_defaults(value, schema);
            let (out, errors) = run(schema, &defaulted);
            if errors.is_empty() {
                return Validation {
                    success: true,
                    data: out.unwrap_or_default(),
                    errors,
                };
            }
            for issue in &errors {
                warn!(path = %issue.path, message = %issue.message, "loose validation issue");
            }
            Validation {
                success: true,
                data: defaulted,
                errors,
            }
        }
    }
}

fn run(schema: &Schema, value: &Value) -> (Option<Value>, Vec<Issue>) {
    let mut interp = Interpreter::new();
    let out = interp.parse(schema, Some(value));
    (out, interp.into_issues())
}

/// Fills absent top-level fields of an object schema from their defaults.
/// Nested objects are not visited.
fn fill_top_level_defaults(value: &Value, schema: &Schema) -> Value {
    let mut out = value.clone();
    if let (Some(shape), Some(fields)) = (schema.object_shape(), out.as_object_mut()) {
        for (name, field_schema) in shape {
            if fields.contains_key(name) {
                continue;
            }
            if let Some(default) = field_schema.declared_default() {
                fields.insert(name.clone(), default.clone());
            }
        }
    }
    out
}
