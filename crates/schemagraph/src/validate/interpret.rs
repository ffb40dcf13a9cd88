//! Recursive interpreter evaluating a [`Schema`] against a [`Value`].
//!
//! Absence is modelled as `None` on both sides: a missing object field is
//! parsed with `None` input, and an `Optional` schema yields `None` output
//! so the field is left out of the result.

use rustc_hash::FxHashSet;

use crate::model::{Object, Value};
use crate::schema::Schema;
use crate::util::normalize_date;
use crate::validate::Issue;

/// Accumulates issues and tracks the current field path.
pub(crate) struct Interpreter {
    path: Vec<String>,
    issues: Vec<Issue>,
}

impl Interpreter {
    pub(crate) fn new() -> Self {
        Self {
            path: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub(crate) fn into_issues(self) -> Vec<Issue> {
        self.issues
    }

    fn issue(&mut self, message: impl Into<String>) {
        self.issues.push(Issue::new(self.path.join("."), message));
    }

    fn expected(&mut self, what: &str, input: &Value) {
        self.issue(format!("expected {}, received {}", what, input.kind()));
    }

    fn at<T>(&mut self, segment: impl ToString, f: impl FnOnce(&mut Self) -> T) -> T {
        self.path.push(segment.to_string());
        let out = f(self);
        self.path.pop();
        out
    }

    /// Runs `f` against a scratch issue list, returning its output and
    /// whether it produced no issues. Scratch issues are discarded.
    fn attempt(&mut self, f: impl FnOnce(&mut Self) -> Option<Value>) -> (Option<Value>, bool) {
        let saved = std::mem::take(&mut self.issues);
        let out = f(self);
        let ok = self.issues.is_empty();
        self.issues = saved;
        (out, ok)
    }

    /// Parses `input` against `schema`. The output is meaningful only if no
    /// new issues were recorded.
    pub(crate) fn parse(&mut self, schema: &Schema, input: Option<&Value>) -> Option<Value> {
        match schema {
            Schema::Optional(inner) => match input {
                None => None,
                Some(_) => self.parse(inner, input),
            },
            Schema::Nullable(inner) => match input {
                Some(Value::Null) => Some(Value::Null),
                _ => self.parse(inner, input),
            },
            Schema::Default(inner, default) => match input {
                None => self.parse(inner, Some(default)),
                Some(_) => self.parse(inner, input),
            },
            permissive if permissive.is_permissive() => input.cloned(),
            Schema::Promise(inner) => self.parse(inner, input),
            _ => match input {
                None => {
                    self.issue("required");
                    None
                }
                Some(value) => self.parse_present(schema, value),
            },
        }
    }

    fn parse_present(&mut self, schema: &Schema, input: &Value) -> Option<Value> {
        match schema {
            Schema::String => match input {
                Value::String(_) => Some(input.clone()),
                _ => self.fail("string", input),
            },
            Schema::Number => match input {
                Value::Number(_) => Some(input.clone()),
                _ => self.fail("number", input),
            },
            Schema::Boolean => match input {
                Value::Bool(_) => Some(input.clone()),
                _ => self.fail("boolean", input),
            },
            Schema::Date => match input {
                Value::String(s) => match normalize_date(s) {
                    Ok(normalized) => Some(Value::String(normalized)),
                    Err(e) => {
                        self.issue(format!("invalid date: {}", e));
                        None
                    }
                },
                _ => self.fail("date string", input),
            },
            Schema::BigInt => match input {
                Value::Number(_) if input.is_integer() => Some(input.clone()),
                Value::String(s) if is_integer_literal(s) => Some(input.clone()),
                _ => self.fail("bigint", input),
            },
            Schema::Array(element) => match input {
                Value::Array(items) => self.parse_items(element, items).map(Value::Array),
                _ => self.fail("array", input),
            },
            Schema::Object(shape) => match input {
                Value::Object(fields) => {
                    let mut out = Object::new();
                    for (name, field_schema) in shape {
                        let parsed = self.at(name, |me| me.parse(field_schema, fields.get(name)));
                        if let Some(v) = parsed {
                            out.insert(name.clone(), v);
                        }
                    }
                    Some(Value::Object(out))
                }
                _ => self.fail("object", input),
            },
            Schema::Enum(values) => match input {
                Value::String(s) if values.iter().any(|v| v == s) => Some(input.clone()),
                _ => {
                    self.issue(format!(
                        "invalid enum value, expected one of: {}",
                        values.join(", ")
                    ));
                    None
                }
            },
            Schema::Literal(expected) => {
                if input == expected {
                    Some(input.clone())
                } else {
                    self.issue(format!("invalid literal, expected {}", expected));
                    None
                }
            }
            Schema::Union(options) => {
                for option in options {
                    let (out, ok) = self.attempt(|me| me.parse(option, Some(input)));
                    if ok {
                        return out;
                    }
                }
                self.issue("invalid union: no option matched");
                None
            }
            Schema::Intersection(left, right) => {
                let before = self.issues.len();
                let l = self.parse(left, Some(input));
                let r = self.parse(right, Some(input));
                if self.issues.len() > before {
                    return None;
                }
                match merge_intersection(l, r) {
                    Some(merged) => Some(merged),
                    None => {
                        self.issue("intersection results could not be merged");
                        None
                    }
                }
            }
            Schema::Tuple { items, rest } => match input {
                Value::Array(values) => self.parse_tuple(items, rest.as_deref(), values),
                _ => self.fail("tuple", input),
            },
            Schema::Record(key, value) => match input {
                Value::Object(fields) => {
                    let mut out = Object::new();
                    for (name, v) in fields {
                        let k = self.at(name, |me| me.parse(key, Some(&Value::String(name.clone()))));
                        let parsed = self.at(name, |me| me.parse(value, Some(v)));
                        let out_key = match k {
                            Some(Value::String(s)) => s,
                            _ => name.clone(),
                        };
                        if let Some(parsed) = parsed {
                            out.insert(out_key, parsed);
                        }
                    }
                    Some(Value::Object(out))
                }
                _ => self.fail("record object", input),
            },
            Schema::Map(key, value) => match input {
                Value::Array(entries) => {
                    let mut out = Vec::with_capacity(entries.len());
                    for (i, entry) in entries.iter().enumerate() {
                        let pair = self.at(i, |me| match entry {
                            Value::Array(kv) if kv.len() == 2 => {
                                let k = me.at("key", |me| me.parse(key, Some(&kv[0])));
                                let v = me.at("value", |me| me.parse(value, Some(&kv[1])));
                                Some(Value::Array(vec![
                                    k.unwrap_or_default(),
                                    v.unwrap_or_default(),
                                ]))
                            }
                            _ => me.fail("[key, value] pair", entry),
                        });
                        out.extend(pair);
                    }
                    Some(Value::Array(out))
                }
                _ => self.fail("map entries array", input),
            },
            Schema::Set(element) => match input {
                Value::Array(items) => {
                    let mut seen: FxHashSet<String> = FxHashSet::default();
                    for (i, item) in items.iter().enumerate() {
                        if !seen.insert(item.to_json_string()) {
                            self.at(i, |me| me.issue("duplicate set element"));
                        }
                    }
                    self.parse_items(element, items).map(Value::Array)
                }
                _ => self.fail("set array", input),
            },
            // Handled in `parse`.
            Schema::Optional(_)
            | Schema::Nullable(_)
            | Schema::Default(..)
            | Schema::Function
            | Schema::Lazy
            | Schema::Unknown
            | Schema::Promise(_) => self.parse(schema, Some(input)),
        }
    }

    fn fail(&mut self, what: &str, input: &Value) -> Option<Value> {
        self.expected(what, input);
        None
    }

    fn parse_items(&mut self, element: &Schema, items: &[Value]) -> Option<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let parsed = self.at(i, |me| me.parse(element, Some(item)));
            out.push(parsed.unwrap_or_default());
        }
        Some(out)
    }

    fn parse_tuple(
        &mut self,
        items: &[Schema],
        rest: Option<&Schema>,
        values: &[Value],
    ) -> Option<Value> {
        if values.len() < items.len() {
            self.issue(format!(
                "tuple expects at least {} items, received {}",
                items.len(),
                values.len()
            ));
            return None;
        }
        if rest.is_none() && values.len() > items.len() {
            self.issue(format!(
                "tuple expects {} items, received {}",
                items.len(),
                values.len()
            ));
            return None;
        }

        let mut out = Vec::with_capacity(values.len());
        for (i, value) in values.iter().enumerate() {
            let schema = match items.get(i) {
                Some(s) => s,
                None => match rest {
                    Some(r) => r,
                    None => break,
                },
            };
            let parsed = self.at(i, |me| me.parse(schema, Some(value)));
            out.push(parsed.unwrap_or_default());
        }
        Some(Value::Array(out))
    }
}

fn is_integer_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Merges the outputs of both intersection sides: objects merge key-wise,
/// anything else must be equal.
fn merge_intersection(left: Option<Value>, right: Option<Value>) -> Option<Value> {
    match (left, right) {
        (Some(Value::Object(mut l)), Some(Value::Object(r))) => {
            for (k, rv) in r {
                match l.remove(&k) {
                    Some(lv) => {
                        let merged = merge_intersection(Some(lv), Some(rv))?;
                        l.insert(k, merged);
                    }
                    None => {
                        l.insert(k, rv);
                    }
                }
            }
            Some(Value::Object(l))
        }
        (Some(l), Some(r)) if l == r => Some(l),
        (None, None) => Some(Value::Null),
        (Some(v), None) | (None, Some(v)) => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::*;

    fn run(schema: &Schema, input: Value) -> Result<Option<Value>, Vec<Issue>> {
        let mut interp = Interpreter::new();
        let out = interp.parse(schema, Some(&input));
        let issues = interp.into_issues();
        if issues.is_empty() { Ok(out) } else { Err(issues) }
    }

    fn json(s: &str) -> Value {
        Value::from_json_str(s).unwrap()
    }

    #[test]
    fn test_primitive_mismatch_message() {
        let issues = run(&string(), Value::from(3)).unwrap_err();
        assert_eq!(issues[0].message, "expected string, received number");
        assert_eq!(issues[0].path, "");
    }

    #[test]
    fn test_object_collects_one_issue_per_field() {
        let s = object([("a", string()), ("b", number()), ("c", boolean())]);
        let issues = run(&s, json(r#"{"a": 1, "c": true}"#)).unwrap_err();
        let paths: Vec<_> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b"]);
        assert_eq!(issues[1].message, "required");
    }

    #[test]
    fn test_object_strips_unknown_keys_and_omits_optional() {
        let s = object([("a", string()), ("b", string().optional())]);
        let out = run(&s, json(r#"{"a": "x", "extra": 1}"#)).unwrap();
        assert_eq!(out, Some(json(r#"{"a": "x"}"#)));
    }

    #[test]
    fn test_nested_paths() {
        let s = object([("tags", array(string()))]);
        let issues = run(&s, json(r#"{"tags": ["a", 2]}"#)).unwrap_err();
        assert_eq!(issues[0].path, "tags.1");
    }

    #[test]
    fn test_default_fills_absent_not_null() {
        let s = object([("n", number().with_default(7))]);
        assert_eq!(run(&s, json("{}")).unwrap(), Some(json(r#"{"n": 7}"#)));
        assert!(run(&s, json(r#"{"n": null}"#)).is_err());

        let s = object([("n", number().with_default(7).nullable())]);
        assert_eq!(run(&s, json(r#"{"n": null}"#)).unwrap(), Some(json(r#"{"n": null}"#)));
    }

    #[test]
    fn test_date_transform() {
        let out = run(&date(), Value::from("2024-03-15")).unwrap();
        assert_eq!(out, Some(Value::from("2024-03-15T00:00:00Z")));
        assert!(run(&date(), Value::from("someday")).is_err());
    }

    #[test]
    fn test_bigint() {
        assert!(run(&bigint(), Value::from(42)).is_ok());
        assert!(run(&bigint(), Value::from("-123456789012345678901234567890")).is_ok());
        assert!(run(&bigint(), Value::from(1.5)).is_err());
        assert!(run(&bigint(), Value::from("12a")).is_err());
    }

    #[test]
    fn test_enum_and_literal() {
        let s = enumeration(["low", "high"]);
        assert!(run(&s, Value::from("low")).is_ok());
        assert!(run(&s, Value::from("mid")).is_err());
        assert!(run(&literal(3), Value::from(3)).is_ok());
        assert!(run(&literal(3), Value::from("3")).is_err());
    }

    #[test]
    fn test_union_first_match_and_single_issue() {
        let s = union([number(), string()]);
        assert_eq!(run(&s, Value::from("x")).unwrap(), Some(Value::from("x")));
        let issues = run(&s, Value::Bool(true)).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.starts_with("invalid union"));
    }

    #[test]
    fn test_intersection_merges_objects() {
        let s = intersection(object([("a", string())]), object([("b", number())]));
        let out = run(&s, json(r#"{"a": "x", "b": 1}"#)).unwrap();
        assert_eq!(out, Some(json(r#"{"a": "x", "b": 1}"#)));
        assert!(run(&s, json(r#"{"a": "x"}"#)).is_err());
    }

    #[test]
    fn test_tuple_lengths() {
        let s = tuple([string(), number()]);
        assert!(run(&s, json(r#"["a", 1]"#)).is_ok());
        assert!(run(&s, json(r#"["a"]"#)).is_err());
        assert!(run(&s, json(r#"["a", 1, 2]"#)).is_err());

        let s = tuple_with_rest([string()], number());
        assert!(run(&s, json(r#"["a", 1, 2, 3]"#)).is_ok());
        assert!(run(&s, json(r#"["a", 1, "b"]"#)).is_err());
    }

    #[test]
    fn test_record_map_set() {
        let r = record(string(), number());
        assert!(run(&r, json(r#"{"x": 1, "y": 2}"#)).is_ok());
        assert_eq!(run(&r, json(r#"{"x": "1"}"#)).unwrap_err()[0].path, "x");

        let m = map(string(), boolean());
        assert!(run(&m, json(r#"[["a", true], ["b", false]]"#)).is_ok());
        assert!(run(&m, json(r#"[["a"]]"#)).is_err());

        let s = set(number());
        assert!(run(&s, json("[1, 2, 3]")).is_ok());
        assert_eq!(run(&s, json("[1, 2, 1]")).unwrap_err()[0].message, "duplicate set element");
    }

    #[test]
    fn test_set_duplicates_compare_by_value() {
        let s = set(record(string(), number()));
        let issues = run(&s, json(r#"[{"a": 1, "b": 2}, {"b": 2, "a": 1}]"#)).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "1");

        // 1 and 1.0 are the same number.
        assert!(run(&set(number()), json("[1, 1.0]")).is_err());
    }

    #[test]
    fn test_large_set() {
        let items: Vec<Value> = (0..20_000).map(Value::from).collect();
        assert!(run(&set(number()), Value::Array(items.clone())).is_ok());

        let mut dup = items;
        dup.push(Value::from(19_999));
        let issues = run(&set(number()), Value::Array(dup)).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "20000");
    }

    #[test]
    fn test_bigint_keeps_large_integers() {
        let big = json("12345678901234567891");
        assert_eq!(run(&bigint(), big.clone()).unwrap(), Some(big));
        let near = json("9007199254740993");
        assert_eq!(run(&bigint(), near.clone()).unwrap().unwrap().to_json_string(), "9007199254740993");
    }

    #[test]
    fn test_opaque_kinds_accept_anything() {
        for s in [function(), lazy(), unknown()] {
            assert!(run(&s, json(r#"{"any": [1, null]}"#)).is_ok());
        }
        let s = object([("cb", function())]);
        assert_eq!(run(&s, json("{}")).unwrap(), Some(json("{}")));
    }

    #[test]
    fn test_promise_validates_resolved_value() {
        assert!(run(&promise(number()), Value::from(1)).is_ok());
        assert!(run(&promise(number()), Value::from("1")).is_err());
        assert!(run(&promise(lazy()), Value::from("1")).is_ok());
    }
}
