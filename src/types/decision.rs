use std::collections::BTreeMap;

use crate::error::DecisionValidationError;

use super::Value;

/// An incoming record to classify: a mapping from field names to [`Value`]s.
///
/// Struct-valued fields nest as [`Value::Record`], and dot-separated paths
/// (`"addr.city"`) read and write through that nesting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    data: BTreeMap<String, Value>,
}

impl Decision {
    /// Create an empty decision.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value at a dot-separated path. Creates intermediate records as
    /// needed.
    #[must_use]
    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.insert(path, value.into());
        self
    }

    /// Insert a value at a dot-separated path (mutable reference version).
    pub fn insert(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        Self::insert_recursive(&mut self.data, &segments, value);
    }

    /// Look up a value by dot-separated path. Returns the value at the
    /// terminal segment, which may itself be a [`Value::Record`].
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.data.get(first)?;
        for segment in segments {
            match current {
                Value::Record(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// The decision's `id` field, if present.
    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        self.data.get("id")
    }

    /// Iterate over the top-level fields.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The number of top-level fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the decision carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Parse a decision from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] for malformed JSON and
    /// [`crate::Error::DecisionValidation`] when the top level is not an
    /// object.
    pub fn from_json(text: &str) -> Result<Self, crate::Error> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        match Value::from(json) {
            Value::Record(data) => Ok(Self { data }),
            other => Err(DecisionValidationError::new(format!(
                "decision JSON must be a top-level object, got {}",
                other.type_name()
            ))
            .into()),
        }
    }

    fn insert_recursive(map: &mut BTreeMap<String, Value>, segments: &[&str], value: Value) {
        match segments {
            [] => {}
            [last] => {
                map.insert((*last).to_owned(), value);
            }
            [first, rest @ ..] => {
                let entry = map
                    .entry((*first).to_owned())
                    .or_insert_with(|| Value::Record(BTreeMap::new()));
                if !matches!(entry, Value::Record(_)) {
                    *entry = Value::Record(BTreeMap::new());
                }
                if let Value::Record(nested) = entry {
                    Self::insert_recursive(nested, rest, value);
                }
            }
        }
    }
}

impl From<BTreeMap<String, Value>> for Decision {
    fn from(data: BTreeMap<String, Value>) -> Self {
        Self { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_simple() {
        let decision = Decision::new().set("name", "alice");
        assert_eq!(decision.get("name"), Some(&Value::Str("alice".to_owned())));
    }

    #[test]
    fn set_and_get_nested() {
        let decision = Decision::new().set("user.profile.age", 25_i64);
        assert_eq!(decision.get("user.profile.age"), Some(&Value::Int(25)));
    }

    #[test]
    fn get_intermediate_returns_record() {
        let decision = Decision::new().set("addr.city", "SF");
        assert!(matches!(decision.get("addr"), Some(Value::Record(_))));
    }

    #[test]
    fn get_missing_returns_none() {
        let decision = Decision::new().set("user.age", 25_i64);
        assert_eq!(decision.get("user.name"), None);
        assert_eq!(decision.get("nonexistent"), None);
    }

    #[test]
    fn get_through_leaf_returns_none() {
        let decision = Decision::new().set("score", 10_i64);
        assert_eq!(decision.get("score.deeper"), None);
    }

    #[test]
    fn overwrite_leaf_with_record() {
        let decision = Decision::new()
            .set("user", "old_value")
            .set("user.age", 30_i64);
        assert_eq!(decision.get("user.age"), Some(&Value::Int(30)));
    }

    #[test]
    fn overwrite_value() {
        let decision = Decision::new().set("score", 10_i64).set("score", 20_i64);
        assert_eq!(decision.get("score"), Some(&Value::Int(20)));
    }

    #[test]
    fn id_accessor() {
        let decision = Decision::new().set("id", "d-1");
        assert_eq!(decision.id(), Some(&Value::Str("d-1".to_owned())));
        assert_eq!(Decision::new().id(), None);
    }

    #[test]
    fn from_json_object() {
        let decision =
            Decision::from_json(r#"{"credit_score": 580, "addr": {"city": "SF"}}"#).unwrap();
        assert_eq!(decision.get("credit_score"), Some(&Value::Int(580)));
        assert_eq!(decision.get("addr.city"), Some(&Value::Str("SF".into())));
    }

    #[test]
    fn from_json_rejects_non_object() {
        let result = Decision::from_json("[1, 2, 3]");
        assert!(matches!(
            result,
            Err(crate::Error::DecisionValidation(_))
        ));
    }

    #[test]
    fn from_json_rejects_malformed() {
        assert!(matches!(
            Decision::from_json("{not json"),
            Err(crate::Error::Json(_))
        ));
    }

    #[test]
    fn deeply_nested_path() {
        let decision = Decision::new().set("a.b.c.d.e", 42_i64);
        assert_eq!(decision.get("a.b.c.d.e"), Some(&Value::Int(42)));
    }
}
