//! Primary key definitions
//!
//! Grammar of a primary key source (first field of a table schema):
//! - `id` inbound key at member `id`
//! - `++id` inbound, auto-incremented when absent
//! - `&id` inbound (unique marker, implied for primary keys)
//! - `a.b` inbound key at a nested member
//! - `[a+b]` compound inbound key
//! - `` or `++` outbound keys, supplied separately

use serde_json::Value;

/// Where a key lives inside a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPath {
    Single(String),
    Compound(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    /// Source text as declared
    pub src: String,
    pub key_path: Option<KeyPath>,
    pub auto_increment: bool,
}

impl PrimaryKey {
    pub fn parse(src: &str) -> Self {
        let src = src.trim();
        let mut rest = src;
        let auto_increment = rest.starts_with("++");
        if auto_increment {
            rest = &rest[2..];
        }
        rest = rest.trim_start_matches('&');

        let key_path = if rest.is_empty() {
            None
        } else if let Some(inner) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            Some(KeyPath::Compound(inner.split('+').map(|p| p.trim().to_string()).collect()))
        } else {
            Some(KeyPath::Single(rest.to_string()))
        };

        Self {
            src: src.to_string(),
            key_path,
            auto_increment,
        }
    }

    /// Keys are embedded in values
    pub fn is_inbound(&self) -> bool {
        self.key_path.is_some()
    }

    /// Extract the key from a value, if every component is present
    pub fn extract(&self, value: &Value) -> Option<Value> {
        match self.key_path.as_ref()? {
            KeyPath::Single(path) => lookup(value, path).cloned(),
            KeyPath::Compound(paths) => paths
                .iter()
                .map(|p| lookup(value, p).cloned())
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Write a generated key into a value at a single key path
    pub fn inject(&self, value: &mut Value, key: Value) -> bool {
        let Some(KeyPath::Single(path)) = &self.key_path else {
            return false;
        };
        let mut node = value;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let Value::Object(members) = node else {
                return false;
            };
            if segments.peek().is_none() {
                members.insert(segment.to_string(), key);
                return true;
            }
            node = members
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
        }
        false
    }
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |node, segment| node.get(segment))
        .filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_variants() {
        let pk = PrimaryKey::parse("++id");
        assert!(pk.auto_increment);
        assert_eq!(pk.key_path, Some(KeyPath::Single("id".into())));
        assert_eq!(pk.src, "++id");

        let pk = PrimaryKey::parse("&email");
        assert!(!pk.auto_increment);
        assert_eq!(pk.key_path, Some(KeyPath::Single("email".into())));

        let pk = PrimaryKey::parse("[first+last]");
        assert_eq!(pk.key_path, Some(KeyPath::Compound(vec!["first".into(), "last".into()])));

        assert!(!PrimaryKey::parse("").is_inbound());
        let pk = PrimaryKey::parse("++");
        assert!(pk.auto_increment && !pk.is_inbound());
    }

    #[test]
    fn test_extract() {
        let value = json!({ "id": 7, "name": { "first": "Ada", "last": "King" } });
        assert_eq!(PrimaryKey::parse("id").extract(&value), Some(json!(7)));
        assert_eq!(PrimaryKey::parse("name.first").extract(&value), Some(json!("Ada")));
        assert_eq!(
            PrimaryKey::parse("[name.first+name.last]").extract(&value),
            Some(json!(["Ada", "King"]))
        );
        assert_eq!(PrimaryKey::parse("missing").extract(&value), None);
        assert_eq!(PrimaryKey::parse("").extract(&value), None);
    }

    #[test]
    fn test_inject() {
        let pk = PrimaryKey::parse("++meta.id");
        let mut value = json!({ "name": "x" });
        assert!(pk.inject(&mut value, json!(3)));
        assert_eq!(value, json!({ "name": "x", "meta": { "id": 3 } }));

        let mut scalar = json!(5);
        assert!(!pk.inject(&mut scalar, json!(1)));
    }
}
