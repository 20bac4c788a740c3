//! Renderable parameter values
//!
//! Step parameters form a tree of scalars, lists and maps. String leaves may
//! contain `{{ }}` placeholders; everything else is passed through untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A node in a step's parameter tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Borrow the string payload, if this is a string leaf
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the map payload, if this is a map
    pub fn as_map(&self) -> Option<&BTreeMap<String, ParamValue>> {
        match self {
            ParamValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// All string leaves, depth first
    pub fn strings(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_strings(&mut out);
        out
    }

    fn collect_strings<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ParamValue::String(s) => out.push(s),
            ParamValue::List(items) => {
                for item in items {
                    item.collect_strings(out);
                }
            }
            ParamValue::Map(map) => {
                for value in map.values() {
                    value.collect_strings(out);
                }
            }
            ParamValue::Null | ParamValue::Bool(_) | ParamValue::Integer(_) | ParamValue::Float(_) => {}
        }
    }

    /// Rebuild the tree with every string leaf replaced by `f(leaf)`
    pub fn try_map_strings<E, F>(&self, f: &mut F) -> Result<ParamValue, E>
    where
        F: FnMut(&str) -> Result<String, E>,
    {
        Ok(match self {
            ParamValue::String(s) => ParamValue::String(f(s)?),
            ParamValue::List(items) => ParamValue::List(
                items
                    .iter()
                    .map(|item| item.try_map_strings(f))
                    .collect::<Result<_, _>>()?,
            ),
            ParamValue::Map(map) => {
                let mut rendered = BTreeMap::new();
                for (key, value) in map {
                    rendered.insert(key.clone(), value.try_map_strings(f)?);
                }
                ParamValue::Map(rendered)
            }
            other => other.clone(),
        })
    }

    /// Convert to JSON, preserving structure
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Null => serde_json::Value::Null,
            ParamValue::Bool(b) => serde_json::Value::Bool(*b),
            ParamValue::Integer(i) => serde_json::Value::Number((*i).into()),
            ParamValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ParamValue::String(s) => serde_json::Value::String(s.clone()),
            ParamValue::List(items) => {
                serde_json::Value::Array(items.iter().map(ParamValue::to_json).collect())
            }
            ParamValue::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Convert from JSON; used for post-exec outputs and CLI parameters
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ParamValue::Null,
            serde_json::Value::Bool(b) => ParamValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ParamValue::Integer(i),
                None => n.as_f64().map(ParamValue::Float).unwrap_or(ParamValue::Null),
            },
            serde_json::Value::String(s) => ParamValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                ParamValue::List(items.iter().map(ParamValue::from_json).collect())
            }
            serde_json::Value::Object(map) => ParamValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), ParamValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => Ok(()),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Integer(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::String(s) => f.write_str(s),
            ParamValue::List(_) | ParamValue::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Integer(i)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_nested_tree() {
        let yaml = r#"
model: resnet
batch: 8
ratio: 0.5
flags: [a, "{{ steps.prep.outputs.flag }}"]
nested:
  path: "{{ steps.compile.outputs.dir }}"
  enabled: true
  empty: ~
"#;
        let value: ParamValue = serde_yaml::from_str(yaml).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.get("batch"), Some(&ParamValue::Integer(8)));
        assert_eq!(map.get("ratio"), Some(&ParamValue::Float(0.5)));
        assert_eq!(
            map.get("nested").and_then(|n| n.as_map()).and_then(|n| n.get("empty")),
            Some(&ParamValue::Null)
        );
    }

    #[test]
    fn test_strings_visits_every_leaf() {
        let value: ParamValue = serde_yaml::from_str(
            r#"
a: one
b: [two, 3, {c: four}]
"#,
        )
        .unwrap();

        let mut strings = value.strings();
        strings.sort();
        assert_eq!(strings, vec!["four", "one", "two"]);
    }

    #[test]
    fn test_try_map_strings_keeps_non_strings() {
        let value: ParamValue = serde_yaml::from_str("{a: x, b: 2, c: [y, false]}").unwrap();
        let mapped: ParamValue = value
            .try_map_strings(&mut |s| Ok::<_, ()>(s.to_uppercase()))
            .unwrap();

        let expected: ParamValue = serde_yaml::from_str("{a: X, b: 2, c: [Y, false]}").unwrap();
        assert_eq!(mapped, expected);
    }

    #[test]
    fn test_try_map_strings_propagates_error() {
        let value: ParamValue = serde_yaml::from_str("[ok, bad, ok]").unwrap();
        let result = value.try_map_strings(&mut |s| {
            if s == "bad" {
                Err(s.to_string())
            } else {
                Ok(s.to_string())
            }
        });
        assert_eq!(result, Err("bad".to_string()));
    }

    #[test]
    fn test_display() {
        assert_eq!(ParamValue::from("text").to_string(), "text");
        assert_eq!(ParamValue::Integer(42).to_string(), "42");
        assert_eq!(ParamValue::Null.to_string(), "");
        let list: ParamValue = serde_yaml::from_str("[1, a]").unwrap();
        assert_eq!(list.to_string(), r#"[1,"a"]"#);
    }
}
