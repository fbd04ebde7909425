//! Performance oriented JSON manipulation.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Entry;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// Extension trait for [`serde_json_bytes::Value`].
pub trait ValueExt {
    /// Deep merge the JSON objects, array and override the values in `&mut self` if they already
    /// exists.
    fn deep_merge(&mut self, other: Self);

    /// Reads the `__typename` of an object, if any.
    fn typename(&self) -> Option<&str>;
}

impl ValueExt for Value {
    fn deep_merge(&mut self, other: Self) {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => {
                for (key, value) in b.into_iter() {
                    match a.entry(key) {
                        Entry::Vacant(e) => {
                            e.insert(value);
                        }
                        Entry::Occupied(e) => {
                            e.into_mut().deep_merge(value);
                        }
                    }
                }
            }
            (Value::Array(a), Value::Array(mut b)) => {
                for (b_value, a_value) in b.drain(..a.len().min(b.len())).zip(a.iter_mut()) {
                    a_value.deep_merge(b_value);
                }

                a.extend(b);
            }
            (_, Value::Null) => {}
            (Value::Object(_), Value::Array(_)) => {
                tracing::debug!("trying to replace an object with an array");
            }
            (Value::Array(_), Value::Object(_)) => {
                tracing::debug!("trying to replace an array with an object");
            }
            (a, b) => {
                *a = b;
            }
        }
    }

    fn typename(&self) -> Option<&str> {
        self.as_object()?.get("__typename")?.as_str()
    }
}

/// A path element in a response path.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// An index path element.
    Index(usize),

    /// A key path element.
    Key(String),
}

impl PathElement {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathElement::Key(key) => Some(key.as_str()),
            PathElement::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathElement::Index(index) => Some(*index),
            PathElement::Key(_) => None,
        }
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Index(index) => write!(f, "{index}"),
            PathElement::Key(key) => write!(f, "{key}"),
        }
    }
}

impl From<&str> for PathElement {
    fn from(key: &str) -> Self {
        PathElement::Key(key.to_string())
    }
}

impl From<usize> for PathElement {
    fn from(index: usize) -> Self {
        PathElement::Index(index)
    }
}

/// A path into the result document.
///
/// This can be composed of strings and numbers
#[derive(Clone, Debug, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Path {
        Path(Default::default())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&PathElement> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&PathElement> {
        self.0.last()
    }

    pub fn get(&self, index: usize) -> Option<&PathElement> {
        self.0.get(index)
    }

    pub fn push(&mut self, element: impl Into<PathElement>) {
        self.0.push(element.into())
    }

    pub fn pop(&mut self) -> Option<PathElement> {
        self.0.pop()
    }

    /// Returns a new path with `element` appended.
    pub fn join(&self, element: impl Into<PathElement>) -> Path {
        let mut path = self.clone();
        path.push(element);
        path
    }

    /// Returns the path without its first segment.
    pub fn slice(&self) -> Path {
        Path(self.0.iter().skip(1).cloned().collect())
    }
}

impl<T> From<T> for Path
where
    T: AsRef<str>,
{
    /// Parses a path where keys and indices are separated by `/`.
    fn from(s: T) -> Self {
        Self(
            s.as_ref()
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| match segment.parse::<usize>() {
                    Ok(index) => PathElement::Index(index),
                    Err(_) => PathElement::Key(segment.to_string()),
                })
                .collect(),
        )
    }
}

impl FromIterator<PathElement> for Path {
    fn from_iter<I: IntoIterator<Item = PathElement>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in self.iter() {
            write!(f, "/{element}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn deep_merge_nested_objects() {
        let mut a = json!({"product": {"upc": "1", "name": "Table"}, "list": [{"a": 1}]});
        a.deep_merge(json!({"product": {"price": 899}, "list": [{"b": 2}, {"c": 3}]}));
        assert_eq!(
            a,
            json!({
                "product": {"upc": "1", "name": "Table", "price": 899},
                "list": [{"a": 1, "b": 2}, {"c": 3}]
            })
        );
    }

    #[test]
    fn deep_merge_keeps_value_over_null() {
        let mut a = json!({"name": "Table"});
        a.deep_merge(json!({"name": null}));
        assert_eq!(a, json!({"name": "Table"}));
    }

    #[test]
    fn path_parsing_and_display() {
        let path = Path::from("topProducts/0/price");
        assert_eq!(
            path,
            Path(vec![
                PathElement::Key("topProducts".to_string()),
                PathElement::Index(0),
                PathElement::Key("price".to_string()),
            ])
        );
        assert_eq!(path.to_string(), "/topProducts/0/price");
        assert_eq!(path.slice(), Path::from("0/price"));
    }

    #[test]
    fn path_serializes_as_mixed_array() {
        let path = Path::from("topProducts/0/price");
        let value = serde_json_bytes::to_value(&path).unwrap();
        assert_eq!(value, json!(["topProducts", 0, "price"]));
        let back: Path = serde_json_bytes::from_value(value).unwrap();
        assert_eq!(back, path);
    }
}
