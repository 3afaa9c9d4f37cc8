//! Row codec - revive rows from their transport encoding
//!
//! Exports written by Typeson-based tools annotate rows whose members do not
//! survive plain JSON with a `$types` map from member path to type name:
//!
//! ```json
//! { "id": 1, "score": null, "$types": { "score": "NaN" } }
//! ```
//!
//! An empty path refers to the value itself. Non-object values that need
//! annotations are wrapped as `{ "$": value, "$types": {...} }`.

use serde_json::{Map, Number, Value};
use crate::{Error, Result};

const TYPES_KEY: &str = "$types";
const WRAPPED_KEY: &str = "$";

/// Reconstructs a native value from its transport encoding
pub trait RowCodec: Send + Sync {
    fn revive(&self, row: Value) -> Result<Value>;
}

/// Rows are stored exactly as they were exported
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl RowCodec for PassthroughCodec {
    fn revive(&self, row: Value) -> Result<Value> {
        Ok(row)
    }
}

/// Resolves Typeson `$types` annotations
#[derive(Debug, Clone, Copy, Default)]
pub struct TypesonCodec;

impl RowCodec for TypesonCodec {
    fn revive(&self, row: Value) -> Result<Value> {
        let Value::Object(mut object) = row else {
            return Ok(row);
        };
        let Some(types) = object.remove(TYPES_KEY) else {
            return Ok(Value::Object(object));
        };
        let Value::Object(types) = types else {
            return Err(Error::Parse(format!("{} annotation must be an object", TYPES_KEY)));
        };

        let mut value = match object.remove(WRAPPED_KEY) {
            Some(wrapped) if object.is_empty() => wrapped,
            Some(wrapped) => {
                object.insert(WRAPPED_KEY.to_string(), wrapped);
                Value::Object(object)
            }
            None => Value::Object(object),
        };
        // Deepest paths first so removals never disturb a parent lookup
        let mut entries: Vec<(String, Value)> = types.into_iter().collect();
        entries.sort_by_key(|(path, _)| std::cmp::Reverse(path.matches('.').count()));

        for (path, kind) in entries {
            let Some(kind) = kind.as_str() else { continue };
            revive_at(&mut value, &path, kind);
        }
        Ok(value)
    }
}

fn revive_at(root: &mut Value, path: &str, kind: &str) {
    if path.is_empty() {
        if let Some(revived) = revive_member(root.take(), kind) {
            *root = revived;
        }
        return;
    }

    let (parent_path, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (Some(parent), last),
        None => (None, path),
    };
    let parent = match parent_path {
        Some(parent) => lookup_mut(root, parent),
        None => Some(root),
    };
    match parent {
        Some(Value::Object(members)) => revive_in_object(members, last, kind),
        Some(Value::Array(items)) => {
            if let Some(slot) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                // Arrays keep their length; an undefined slot becomes null
                *slot = revive_member(slot.take(), kind).unwrap_or(Value::Null);
            }
        }
        _ => {}
    }
}

fn revive_in_object(members: &mut Map<String, Value>, key: &str, kind: &str) {
    let Some(current) = members.remove(key) else {
        return;
    };
    if let Some(revived) = revive_member(current, kind) {
        members.insert(key.to_string(), revived);
    }
}

fn lookup_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(members) => members.get_mut(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    })
}

/// Revive one member. `None` means the member does not exist natively.
fn revive_member(value: Value, kind: &str) -> Option<Value> {
    match kind {
        "undefined" => None,
        "NaN" | "Infinity" | "-Infinity" => Some(Value::Null),
        "bigint" | "BigInt" => Some(match value.as_str() {
            Some(digits) => parse_integer(digits).unwrap_or(value),
            None => value,
        }),
        // Dates travel as epoch milliseconds and are stored as such
        _ => Some(value),
    }
}

fn parse_integer(digits: &str) -> Option<Value> {
    if let Ok(n) = digits.parse::<i64>() {
        return Some(Value::Number(Number::from(n)));
    }
    digits.parse::<u64>().ok().map(|n| Value::Number(Number::from(n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_passthrough_keeps_annotations() {
        let row = json!({ "id": 1, "$types": { "x": "undefined" } });
        assert_eq!(PassthroughCodec.revive(row.clone()).unwrap(), row);
    }

    #[test]
    fn test_plain_rows_unchanged() {
        let row = json!({ "id": 1, "name": "Ada" });
        assert_eq!(TypesonCodec.revive(row.clone()).unwrap(), row);
        assert_eq!(TypesonCodec.revive(json!(42)).unwrap(), json!(42));
    }

    #[test]
    fn test_typeson_annotations() {
        let row = json!({
            "id": 1,
            "gone": "x",
            "score": "NaN",
            "big": "9007199254740993",
            "meta": { "created": 1700000000000u64, "tmp": null },
            "$types": {
                "gone": "undefined",
                "score": "NaN",
                "big": "bigint",
                "meta.created": "date",
                "meta.tmp": "undefined"
            }
        });
        let revived = TypesonCodec.revive(row).unwrap();
        assert_eq!(
            revived,
            json!({
                "id": 1,
                "score": null,
                "big": 9007199254740993u64,
                "meta": { "created": 1700000000000u64 }
            })
        );
    }

    #[test]
    fn test_array_slot_and_bigint() {
        let row = json!({ "list": [1, "u", 3], "$types": { "list.1": "undefined" } });
        assert_eq!(TypesonCodec.revive(row).unwrap(), json!({ "list": [1, null, 3] }));

        let small = json!({ "v": "12", "$types": { "v": "bigint" } });
        assert_eq!(TypesonCodec.revive(small).unwrap(), json!({ "v": 12 }));
    }

    #[test]
    fn test_wrapped_array() {
        let row = json!({ "$": [5, { "n": "1" }], "$types": { "1.n": "bigint" } });
        assert_eq!(TypesonCodec.revive(row).unwrap(), json!([5, { "n": 1 }]));

        let row = json!({ "$": "x", "other": 1, "$types": {} });
        assert_eq!(TypesonCodec.revive(row).unwrap(), json!({ "$": "x", "other": 1 }));
    }

    #[test]
    fn test_bad_annotation() {
        let row = json!({ "id": 1, "$types": "date" });
        assert!(matches!(TypesonCodec.revive(row), Err(Error::Parse(_))));
    }
}
