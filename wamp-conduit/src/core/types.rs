use serde::{
    Deserialize,
    Serialize,
};

/// Type alias for hash maps used across the library.
pub type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;

/// Type alias for hash sets used across the library.
pub type HashSet<V> = std::collections::HashSet<V, ahash::RandomState>;

pub type Integer = i64;

/// Keyword arguments, details, and options, keyed by name.
pub type Dictionary<P = Value> = HashMap<String, P>;

/// Positional arguments.
pub type List<P = Value> = Vec<P>;

/// A dynamically-typed payload tree.
///
/// This is the smallest value model that covers the WAMP message catalog. Applications that need
/// floating point numbers or nulls should use [`serde_json::Value`] as their payload type instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(Integer),
    String(String),
    Bool(bool),
    Dictionary(Dictionary),
    List(List),
}

impl Value {
    pub fn integer(&self) -> Option<Integer> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn dictionary(&self) -> Option<&Dictionary> {
        match self {
            Self::Dictionary(value) => Some(value),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&List> {
        match self {
            Self::List(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Integer> for Value {
    fn from(value: Integer) -> Self {
        Self::Integer(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Dictionary> for Value {
    fn from(value: Dictionary) -> Self {
        Self::Dictionary(value)
    }
}

impl From<List> for Value {
    fn from(value: List) -> Self {
        Self::List(value)
    }
}

#[cfg(test)]
mod types_test {
    use crate::core::types::{
        Dictionary,
        Value,
    };

    #[test]
    fn deserializes_untagged_values() {
        let value = serde_json::from_str::<Value>(r#"{"a":[-2,"x",true]}"#).unwrap();
        assert_eq!(
            value,
            Value::Dictionary(Dictionary::from_iter([(
                "a".to_owned(),
                Value::List(Vec::from_iter([
                    Value::Integer(-2),
                    Value::String("x".to_owned()),
                    Value::Bool(true),
                ])),
            )]))
        );
    }

    #[test]
    fn rejects_floating_point_numbers() {
        assert_matches::assert_matches!(serde_json::from_str::<Value>("1.5"), Err(_));
    }
}
