//! Record identifiers.
//!
//! Element and link ids are generated by the store: a UUIDv7 rendered as
//! non-hyphenated lowercase hex. Callers treat them as opaque strings.
//! Type ids are caller-chosen names and never pass through here.

use uuid::Uuid;

/// Generates a fresh, time-ordered record id.
pub fn new_id() -> String {
    Uuid::now_v7().simple().to_string()
}
