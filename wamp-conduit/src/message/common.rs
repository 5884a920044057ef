use anyhow::Error;

use crate::{
    core::{
        close::CloseReason,
        error::RemoteError,
        id::Id,
        payload::Payload,
        types::Dictionary,
        uri::Uri,
    },
    message::{
        envelope::MessageKind,
        message::{
            AbortMessage,
            ErrorMessage,
            GoodbyeMessage,
            Message,
        },
    },
};

/// Details carrying a human-readable message.
pub fn details_with_message<P>(message: &str) -> Dictionary<P>
where
    P: Payload,
{
    match P::encode(message) {
        Ok(message) => Dictionary::<P>::from_iter([("message".to_owned(), message)]),
        Err(_) => Default::default(),
    }
}

pub fn abort_message_for_error<P>(error: &Error) -> Message<P>
where
    P: Payload,
{
    Message::Abort(AbortMessage {
        details: details_with_message(&error.to_string()),
        reason: Uri::for_error(error),
    })
}

pub fn goodbye_with_close_reason<P>(close_reason: CloseReason) -> Message<P>
where
    P: Payload,
{
    Message::Goodbye(GoodbyeMessage {
        details: Default::default(),
        reason: close_reason.uri(),
    })
}

pub fn goodbye_and_out<P>() -> Message<P>
where
    P: Payload,
{
    goodbye_with_close_reason(CloseReason::GoodbyeAndOut)
}

/// An ERROR message answering the request `request` of kind `request_kind`.
pub fn error_for_request<P>(request_kind: MessageKind, request: Id, error: &Error) -> Message<P>
where
    P: Payload,
{
    remote_error_for_request(request_kind, request, RemoteError::from_error(error))
}

/// An ERROR message carrying a remote error verbatim.
pub fn remote_error_for_request<P>(
    request_kind: MessageKind,
    request: Id,
    error: RemoteError<P>,
) -> Message<P>
where
    P: Payload,
{
    Message::Error(ErrorMessage {
        request_kind,
        request,
        details: error.details,
        error: error.uri,
        arguments: error.arguments,
        arguments_keyword: error.arguments_keyword,
    })
}

#[cfg(test)]
mod common_test {
    use crate::{
        core::{
            error::InteractionError,
            id::Id,
            types::Value,
        },
        message::{
            common::{
                abort_message_for_error,
                error_for_request,
            },
            envelope::MessageKind,
            message::{
                AbortMessage,
                ErrorMessage,
                Message,
            },
        },
    };

    #[test]
    fn builds_abort_from_error() {
        let message =
            abort_message_for_error::<Value>(&InteractionError::NoSuchRealm.into());
        assert_matches::assert_matches!(message, Message::Abort(AbortMessage { details, reason }) => {
            assert_eq!(reason.as_ref(), "wamp.error.no_such_realm");
            assert_eq!(details.get("message"), Some(&Value::from("no such realm")));
        });
    }

    #[test]
    fn builds_error_for_request() {
        let message = error_for_request::<Value>(
            MessageKind::Call,
            Id::try_from(4u64).unwrap(),
            &InteractionError::NoSuchProcedure.into(),
        );
        assert_matches::assert_matches!(message, Message::Error(ErrorMessage { request_kind: MessageKind::Call, request, error, .. }) => {
            assert_eq!(request, Id::try_from(4u64).unwrap());
            assert_eq!(error.as_ref(), "wamp.error.no_such_procedure");
        });
    }
}
