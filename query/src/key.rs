//! Structured query keys and their canonical string form.
//!
//! A key is an ordered sequence of JSON parts. Two keys that only differ in
//! the insertion order of object properties canonicalize to the same string;
//! sequence order and primitive values are preserved exactly.

use crate::error::QueryError;

use std::fmt::{self, Write};
use std::hash::{Hash, Hasher};

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// An ordered sequence of serializable parts identifying a cached result.
///
/// Equality and hashing go through the canonical form, so
/// `[{"a":1,"b":2}]` and `[{"b":2,"a":1}]` are the same key.
#[derive(Clone)]
pub struct QueryKey {
  parts: Vec<Value>,
  canonical: String,
}

impl QueryKey {
  /// Builds a key from anything that serializes to a JSON array: tuples,
  /// slices, `Vec`s, or a `json!([...])` value.
  pub fn new<K>(key: &K) -> Result<Self, QueryError>
  where
    K: Serialize + ?Sized,
  {
    match serde_json::to_value(key).map_err(QueryError::InvalidKey)? {
      Value::Array(parts) => Ok(Self::from_parts(parts)),
      other => Err(QueryError::NotASequence {
        found: kind_of(&other),
      }),
    }
  }

  /// Builds a key from already converted parts.
  pub fn from_parts(parts: Vec<Value>) -> Self {
    let mut canonical = String::new();
    write_sequence(&parts, &mut canonical);
    Self { parts, canonical }
  }

  pub fn parts(&self) -> &[Value] {
    &self.parts
  }

  /// The canonical string this key is stored under.
  pub fn canonical(&self) -> &str {
    &self.canonical
  }
}

/// Returns the canonical string form of `key`.
pub fn canonicalize(key: &QueryKey) -> String {
  key.canonical.clone()
}

impl PartialEq for QueryKey {
  fn eq(&self, other: &Self) -> bool {
    self.canonical == other.canonical
  }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.canonical.hash(state);
  }
}

impl fmt::Debug for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("QueryKey").field(&self.canonical).finish()
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.canonical)
  }
}

impl Serialize for QueryKey {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(self.parts.len()))?;
    for part in &self.parts {
      seq.serialize_element(part)?;
    }
    seq.end()
  }
}

impl From<Vec<Value>> for QueryKey {
  fn from(parts: Vec<Value>) -> Self {
    Self::from_parts(parts)
  }
}

fn kind_of(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

fn write_sequence(items: &[Value], out: &mut String) {
  out.push('[');
  for (i, item) in items.iter().enumerate() {
    if i > 0 {
      out.push(',');
    }
    write_canonical(item, out);
  }
  out.push(']');
}

// Writing into a `String` cannot fail, so the `fmt::Result`s are ignored.
fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Array(items) => write_sequence(items, out),
    Value::Object(map) => {
      let mut fields: Vec<(&String, &Value)> = map.iter().collect();
      fields.sort_unstable_by(|a, b| a.0.cmp(b.0));

      out.push('{');
      for (i, (name, field)) in fields.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        // Reuse serde_json's string escaping for property names.
        let _ = write!(out, "{}", Value::String(name.clone()));
        out.push(':');
        write_canonical(field, out);
      }
      out.push('}');
    }
    primitive => {
      let _ = write!(out, "{}", primitive);
    }
  }
}
