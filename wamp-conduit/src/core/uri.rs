use std::{
    fmt::Display,
    sync::LazyLock,
};

use regex::Regex;
use serde::{
    Deserialize,
    Serialize,
    de::{
        Unexpected,
        Visitor,
    },
};
use thiserror::Error;

use crate::core::error::error_uri_str;

/// Error for an invalid URI.
#[derive(Debug, Error)]
#[error("invalid URI: {0}")]
pub struct InvalidUri(String);

static STRICT_URI: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([0-9a-z_]+\.)*([0-9a-z_]+)$").ok());

/// Validates a strict URI.
pub fn validate_strict_uri<S>(uri: S) -> Result<(), InvalidUri>
where
    S: AsRef<str>,
{
    let uri = uri.as_ref();
    match STRICT_URI.as_ref() {
        Some(re) if re.is_match(uri) => Ok(()),
        _ => Err(InvalidUri(uri.to_owned())),
    }
}

/// A uniform resource identifier, used in many aspects of WAMP messaging for identifying resources,
/// such as realms, topics, procedures, and errors.
///
/// Only strict URIs are supported, since dispatch tables match exactly.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Uri(String);

impl Uri {
    /// Constructs a URI directly from a value known to be valid, skipping validation.
    pub(crate) fn from_known<S>(value: S) -> Self
    where
        S: Into<String>,
    {
        Self(value.into())
    }

    /// The URI describing an error.
    pub fn for_error(error: &anyhow::Error) -> Self {
        Self::from_known(error_uri_str(error))
    }

    /// Splits the URI into its components.
    pub fn split(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl Display for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for Uri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Uri {
    type Error = InvalidUri;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_strict_uri(&value)?;
        Ok(Self(value))
    }
}

impl TryFrom<&str> for Uri {
    type Error = InvalidUri;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_strict_uri(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl From<Uri> for String {
    fn from(value: Uri) -> Self {
        value.0
    }
}

struct UriVisitor;

impl<'de> Visitor<'de> for UriVisitor {
    type Value = Uri;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "a URI")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Uri::try_from(v).map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(UriVisitor)
    }
}

#[cfg(test)]
mod uri_test {
    use crate::core::{
        error::InteractionError,
        uri::{
            Uri,
            validate_strict_uri,
        },
    };

    #[test]
    fn validates_strict_uris() {
        assert_matches::assert_matches!(validate_strict_uri("com"), Ok(()));
        assert_matches::assert_matches!(validate_strict_uri("com123"), Ok(()));
        assert_matches::assert_matches!(validate_strict_uri("com.arguments.add2"), Ok(()));
        assert_matches::assert_matches!(validate_strict_uri("com.arguments.ADD2"), Err(_));
        assert_matches::assert_matches!(validate_strict_uri("com.errors.sqrt-@!!"), Err(_));
        assert_matches::assert_matches!(validate_strict_uri("com.1"), Ok(()));
        assert_matches::assert_matches!(validate_strict_uri("."), Err(_));
        assert_matches::assert_matches!(validate_strict_uri("com..sqrt"), Err(_));
        assert_matches::assert_matches!(validate_strict_uri(".com.errors"), Err(_));
        assert_matches::assert_matches!(validate_strict_uri("com.errors#"), Err(_));
    }

    #[test]
    fn fails_deserialization_invalid_uri() {
        assert_matches::assert_matches!(serde_json::from_str::<Uri>(r#""com.arguments.ADD2""#), Err(err) => {
            assert!(err.to_string().contains("expected a URI"));
        });
    }

    #[test]
    fn describes_errors() {
        assert_eq!(
            Uri::for_error(&InteractionError::NoSuchProcedure.into()).as_ref(),
            "wamp.error.no_such_procedure"
        );
        assert_eq!(
            Uri::for_error(&anyhow::Error::msg("boom")).as_ref(),
            "wamp.error.runtime_error"
        );
    }
}
