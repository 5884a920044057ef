use std::fmt::Debug;

use serde::{
    Serialize,
    de::DeserializeOwned,
};
use thiserror::Error;

use crate::core::types::Value;

/// Error for converting between a payload representation and a concrete type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("failed to encode payload: {0}")]
    Encode(String),
    #[error("failed to decode payload: {0}")]
    Decode(String),
}

/// The representation of a single message field, as produced by a binding.
///
/// A payload is opaque until a concrete target type is known. Conversions happen on demand through
/// serde, so a payload is never speculatively coerced before its shape is known.
pub trait Payload:
    Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync + 'static
{
    /// Encodes a value into the payload representation.
    fn encode<T>(value: &T) -> Result<Self, PayloadError>
    where
        T: Serialize + ?Sized;

    /// Decodes the payload into a concrete type.
    fn decode<T>(&self) -> Result<T, PayloadError>
    where
        T: DeserializeOwned;
}

impl Payload for serde_json::Value {
    fn encode<T>(value: &T) -> Result<Self, PayloadError>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_value(value).map_err(|err| PayloadError::Encode(err.to_string()))
    }

    fn decode<T>(&self) -> Result<T, PayloadError>
    where
        T: DeserializeOwned,
    {
        T::deserialize(self).map_err(|err| PayloadError::Decode(err.to_string()))
    }
}

impl Payload for Value {
    fn encode<T>(value: &T) -> Result<Self, PayloadError>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::Value::encode(value)?;
        serde_json::from_value(json).map_err(|err| PayloadError::Encode(err.to_string()))
    }

    fn decode<T>(&self) -> Result<T, PayloadError>
    where
        T: DeserializeOwned,
    {
        serde_json::Value::encode(self)
            .map_err(|err| PayloadError::Decode(err.to_string()))?
            .decode()
    }
}

#[cfg(test)]
mod payload_test {
    use serde::{
        Deserialize,
        Serialize,
    };

    use crate::core::{
        payload::{
            Payload,
            PayloadError,
        },
        types::{
            Dictionary,
            Value,
        },
    };

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Stars {
        nick: String,
        #[serde(default)]
        stars: i64,
    }

    #[test]
    fn decodes_values_into_structs() {
        let value = Value::Dictionary(Dictionary::from_iter([(
            "nick".to_owned(),
            Value::from("Homer"),
        )]));
        assert_matches::assert_matches!(value.decode::<Stars>(), Ok(stars) => {
            pretty_assertions::assert_eq!(stars, Stars { nick: "Homer".to_owned(), stars: 0 });
        });
    }

    #[test]
    fn fails_decoding_mismatched_type() {
        assert_matches::assert_matches!(
            Value::from("five").decode::<i64>(),
            Err(PayloadError::Decode(_))
        );
        assert_matches::assert_matches!(
            serde_json::Value::from("five").decode::<i64>(),
            Err(PayloadError::Decode(_))
        );
    }

    #[test]
    fn fails_encoding_unrepresentable_value() {
        assert_matches::assert_matches!(Value::encode(&1.5f64), Err(PayloadError::Encode(_)));
        assert_matches::assert_matches!(serde_json::Value::encode(&1.5f64), Ok(_));
    }

    #[test]
    fn encodes_negative_integers() {
        assert_matches::assert_matches!(Value::encode(&-2i64), Ok(Value::Integer(-2)));
    }
}
