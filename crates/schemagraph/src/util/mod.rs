//! Utility modules for schemagraph.

pub mod datetime;

pub use datetime::{
    format_datetime_rfc3339, normalize_date, now_micros, parse_date_rfc3339,
    parse_datetime_rfc3339, DateTimeParseError,
};
