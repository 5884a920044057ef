use std::fmt::Display;

use anyhow::Error;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::core::{
    id::Id,
    payload::{
        Payload,
        PayloadError,
    },
    types::{
        Dictionary,
        List,
    },
    uri::Uri,
};

/// A basic error that occurs while processing a WAMP message.
#[derive(Debug, Error)]
pub enum BasicError {
    /// A generic resource was not found.
    ///
    /// WAMP defines standard URIs for not finding specific resource types. This error should only
    /// be used when the standard URI cannot be used.
    #[error("{0}")]
    NotFound(String),
    /// An invalid argument was passed.
    #[error("{0}")]
    InvalidArgument(String),
    /// The operation is not allowed in the current state.
    #[error("{0}")]
    NotAllowed(String),
    /// Some internal error occurred.
    #[error("{0}")]
    Internal(String),
}

impl BasicError {
    /// The trailing URI component for the error.
    pub fn uri_component(&self) -> &str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotAllowed(_) => "not_allowed",
            Self::Internal(_) => "internal",
        }
    }
}

/// An interaction error that occurs while processing a WAMP message.
///
/// Interaction errors are clearly defined in the WAMP standard and are reserved for errors that
/// peers must be able to parse easily.
#[derive(Debug, Error)]
pub enum InteractionError {
    /// The incoming message violates the WAMP protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// The procedure being called does not exist.
    #[error("no such procedure")]
    NoSuchProcedure,
    /// The procedure being registered already exists.
    #[error("procedure already exists")]
    ProcedureAlreadyExists,
    /// The registration being referenced does not exist.
    #[error("no such registration")]
    NoSuchRegistration,
    /// The subscription being referenced does not exist.
    #[error("no such subscription")]
    NoSuchSubscription,
    /// The realm being referenced does not exist.
    #[error("no such realm")]
    NoSuchRealm,
    /// The callee went away before answering.
    #[error("canceled")]
    Canceled,
}

impl InteractionError {
    /// The trailing URI component for the error.
    pub fn uri_component(&self) -> &str {
        match self {
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::NoSuchProcedure => "no_such_procedure",
            Self::ProcedureAlreadyExists => "procedure_already_exists",
            Self::NoSuchRegistration => "no_such_registration",
            Self::NoSuchSubscription => "no_such_subscription",
            Self::NoSuchRealm => "no_such_realm",
            Self::Canceled => "canceled",
        }
    }
}

/// An operation was attempted on an object that has already been torn down.
#[derive(Debug, Error)]
#[error("{0} has been disposed")]
pub struct ObjectDisposed(pub &'static str);

pub(crate) fn error_uri_str(error: &Error) -> String {
    if let Some(error) = error.downcast_ref::<InteractionError>() {
        format!("wamp.error.{}", error.uri_component())
    } else if let Some(error) = error.downcast_ref::<BasicError>() {
        format!("wamp.error.{}", error.uri_component())
    } else {
        "wamp.error.runtime_error".to_owned()
    }
}

/// Creates an [`struct@Error`] from a URI error reason and message.
pub fn error_from_uri_reason_and_message(reason: &Uri, message: String) -> Error {
    match reason.as_ref() {
        "wamp.error.not_found" => BasicError::NotFound(message).into(),
        "wamp.error.invalid_argument" => BasicError::InvalidArgument(message).into(),
        "wamp.error.not_allowed" => BasicError::NotAllowed(message).into(),
        "wamp.error.protocol_violation" => InteractionError::ProtocolViolation(message).into(),
        "wamp.error.no_such_procedure" => InteractionError::NoSuchProcedure.into(),
        "wamp.error.procedure_already_exists" => InteractionError::ProcedureAlreadyExists.into(),
        "wamp.error.no_such_registration" => InteractionError::NoSuchRegistration.into(),
        "wamp.error.no_such_subscription" => InteractionError::NoSuchSubscription.into(),
        "wamp.error.no_such_realm" => InteractionError::NoSuchRealm.into(),
        "wamp.error.canceled" => InteractionError::Canceled.into(),
        _ => BasicError::Internal(format!("{reason}: {message}")).into(),
    }
}

/// An error reported by the remote end of a call, carried verbatim.
///
/// Arguments stay in the payload representation of the connection's binding. Use the typed
/// accessors to deserialize them against whatever shape the caller expects.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError<P> {
    pub uri: Uri,
    pub details: Dictionary<P>,
    pub arguments: List<P>,
    pub arguments_keyword: Dictionary<P>,
}

impl<P> RemoteError<P>
where
    P: Payload,
{
    pub fn new(uri: Uri) -> Self {
        Self {
            uri,
            details: Default::default(),
            arguments: Default::default(),
            arguments_keyword: Default::default(),
        }
    }

    pub fn with_arguments(mut self, arguments: List<P>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_arguments_keyword(mut self, arguments_keyword: Dictionary<P>) -> Self {
        self.arguments_keyword = arguments_keyword;
        self
    }

    /// Builds a remote error out of a local failure, so that it can be sent to a peer.
    pub fn from_error(error: &Error) -> Self {
        let mut remote = Self::new(Uri::for_error(error));
        if let Ok(message) = P::encode(&error.to_string()) {
            remote.details.insert("message".to_owned(), message);
        }
        remote
    }

    /// The human-readable message in the error details, if any.
    pub fn message(&self) -> Option<String> {
        self.details
            .get("message")
            .and_then(|message| message.decode::<String>().ok())
    }

    /// Deserializes one positional argument.
    pub fn argument<T>(&self, index: usize) -> Result<T, PayloadError>
    where
        T: DeserializeOwned,
    {
        self.arguments
            .get(index)
            .ok_or_else(|| PayloadError::Decode(format!("no argument at index {index}")))?
            .decode()
    }

    /// Deserializes the full list of positional arguments.
    pub fn arguments_as<T>(&self) -> Result<T, PayloadError>
    where
        T: DeserializeOwned,
    {
        P::encode(&self.arguments)?.decode()
    }

    /// Deserializes the keyword arguments.
    pub fn arguments_keyword_as<T>(&self) -> Result<T, PayloadError>
    where
        T: DeserializeOwned,
    {
        P::encode(&self.arguments_keyword)?.decode()
    }

    /// Converts the remote error into one of the library's standard errors, if it describes one.
    pub fn into_error(self) -> Error {
        let message = self.message().unwrap_or_default();
        error_from_uri_reason_and_message(&self.uri, message)
    }
}

impl<P> Display for RemoteError<P>
where
    P: Payload,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "remote error {}", self.uri)?;
        match self.message() {
            Some(message) => write!(f, ": {message}"),
            None => match self.argument::<String>(0) {
                Ok(argument) => write!(f, ": {argument}"),
                Err(_) => Ok(()),
            },
        }
    }
}

impl<P> std::error::Error for RemoteError<P> where P: Payload {}

/// The failure of a single call.
///
/// Every call resolves to exactly one of these or to its typed result.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError<P> {
    /// The callee answered with an ERROR message.
    Remote(RemoteError<P>),
    /// The result payload could not be converted into the expected type.
    ResultTypeMismatch(String),
    /// The call arguments could not be converted into the payload representation.
    ArgumentEncoding(String),
    /// The connection closed before the call resolved.
    ConnectionLost(String),
    /// The request could not be written to the transport.
    Transport(String),
    /// The request id is already in use by an outstanding request.
    DuplicateRequest(Id),
    /// There is no open session to send the request on.
    SessionNotOpen,
}

impl<P> Display for CallError<P>
where
    P: Payload,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(error) => error.fmt(f),
            Self::ResultTypeMismatch(message) => write!(f, "result type mismatch: {message}"),
            Self::ArgumentEncoding(message) => {
                write!(f, "failed to encode call arguments: {message}")
            }
            Self::ConnectionLost(message) => write!(f, "connection lost: {message}"),
            Self::Transport(message) => write!(f, "failed to send request: {message}"),
            Self::DuplicateRequest(id) => write!(f, "request id {id} is already outstanding"),
            Self::SessionNotOpen => write!(f, "session is not open"),
        }
    }
}

impl<P> std::error::Error for CallError<P>
where
    P: Payload,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Remote(error) => Some(error),
            _ => None,
        }
    }
}

impl<P> CallError<P> {
    /// The remote error, if the callee reported one.
    pub fn remote(&self) -> Option<&RemoteError<P>> {
        match self {
            Self::Remote(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod error_test {
    use crate::core::{
        error::{
            BasicError,
            CallError,
            InteractionError,
            RemoteError,
            error_from_uri_reason_and_message,
        },
        types::Value,
        uri::Uri,
    };

    #[test]
    fn exposes_remote_error_arguments_on_demand() {
        let error = RemoteError::<Value>::new(Uri::try_from("wamp.error.runtime_error").unwrap())
            .with_arguments(Vec::from_iter([
                Value::from("The square root of a negative number is non real"),
                Value::from("x"),
            ]));
        assert_matches::assert_matches!(error.argument::<String>(1), Ok(arg) => {
            assert_eq!(arg, "x");
        });
        assert_matches::assert_matches!(error.argument::<i64>(0), Err(_));
        assert_matches::assert_matches!(error.argument::<String>(2), Err(_));
        assert_matches::assert_matches!(error.arguments_as::<(String, String)>(), Ok((_, x)) => {
            assert_eq!(x, "x");
        });
        assert_eq!(
            CallError::Remote(error).to_string(),
            "remote error wamp.error.runtime_error: The square root of a negative number is non real"
        );
    }

    #[test]
    fn converts_local_errors_to_remote_errors() {
        let error = RemoteError::<serde_json::Value>::from_error(
            &InteractionError::NoSuchProcedure.into(),
        );
        assert_eq!(error.uri.as_ref(), "wamp.error.no_such_procedure");
        assert_eq!(error.message(), Some("no such procedure".to_owned()));
        assert_matches::assert_matches!(
            error.into_error().downcast::<InteractionError>(),
            Ok(InteractionError::NoSuchProcedure)
        );
    }

    #[test]
    fn maps_unknown_uris_to_internal_errors() {
        let error = error_from_uri_reason_and_message(
            &Uri::try_from("com.example.unknown").unwrap(),
            "bad".to_owned(),
        );
        assert_matches::assert_matches!(error.downcast::<BasicError>(), Ok(BasicError::Internal(message)) => {
            assert_eq!(message, "com.example.unknown: bad");
        });
    }
}
