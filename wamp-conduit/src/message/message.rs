use serde::{
    Serialize,
    de::DeserializeOwned,
};
use thiserror::Error;

use crate::{
    core::{
        id::Id,
        payload::Payload,
        types::{
            Dictionary,
            List,
        },
        uri::Uri,
    },
    message::envelope::{
        Envelope,
        MessageKind,
    },
};

/// Error for a message whose fields do not match its kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("{kind} message is missing field {field}")]
    MissingField {
        kind: MessageKind,
        field: &'static str,
    },
    #[error("{kind} message has an invalid {field} field: {error}")]
    InvalidField {
        kind: MessageKind,
        field: &'static str,
        error: String,
    },
    #[error("{kind} message has {count} unexpected trailing fields")]
    TrailingFields { kind: MessageKind, count: usize },
    #[error("failed to encode {field} field of {kind} message: {error}")]
    Encoding {
        kind: MessageKind,
        field: &'static str,
        error: String,
    },
}

/// Reads the fields of an envelope in order, converting each into its typed form.
struct FieldReader<P> {
    kind: MessageKind,
    fields: std::vec::IntoIter<P>,
}

impl<P> FieldReader<P>
where
    P: Payload,
{
    fn new(envelope: Envelope<P>) -> Self {
        Self {
            kind: envelope.kind(),
            fields: envelope.into_fields().into_iter(),
        }
    }

    fn raw(&mut self, field: &'static str) -> Result<P, MessageError> {
        self.fields.next().ok_or(MessageError::MissingField {
            kind: self.kind,
            field,
        })
    }

    fn required<T>(&mut self, field: &'static str) -> Result<T, MessageError>
    where
        T: DeserializeOwned,
    {
        let value = self.raw(field)?;
        self.decode(field, &value)
    }

    fn optional<T>(&mut self, field: &'static str) -> Result<T, MessageError>
    where
        T: DeserializeOwned + Default,
    {
        match self.fields.next() {
            Some(value) => self.decode(field, &value),
            None => Ok(T::default()),
        }
    }

    fn decode<T>(&self, field: &'static str, value: &P) -> Result<T, MessageError>
    where
        T: DeserializeOwned,
    {
        value.decode().map_err(|err| MessageError::InvalidField {
            kind: self.kind,
            field,
            error: err.to_string(),
        })
    }

    fn kind_field(&mut self, field: &'static str) -> Result<MessageKind, MessageError> {
        let code = self.required::<u64>(field)?;
        MessageKind::from_code(code).ok_or_else(|| MessageError::InvalidField {
            kind: self.kind,
            field,
            error: format!("unknown message kind {code}"),
        })
    }

    /// Reads the optional positional and keyword arguments that close out many messages.
    fn arguments(&mut self) -> Result<(List<P>, Dictionary<P>), MessageError> {
        let arguments = self.optional("arguments")?;
        let arguments_keyword = self.optional("arguments_keyword")?;
        Ok((arguments, arguments_keyword))
    }

    fn finish(self) -> Result<(), MessageError> {
        match self.fields.len() {
            0 => Ok(()),
            count => Err(MessageError::TrailingFields {
                kind: self.kind,
                count,
            }),
        }
    }
}

/// Collects the typed fields of a message into envelope fields.
struct FieldWriter<P> {
    kind: MessageKind,
    fields: Vec<P>,
}

impl<P> FieldWriter<P>
where
    P: Payload,
{
    fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    fn push<T>(&mut self, field: &'static str, value: &T) -> Result<(), MessageError>
    where
        T: Serialize + ?Sized,
    {
        let value = P::encode(value).map_err(|err| MessageError::Encoding {
            kind: self.kind,
            field,
            error: err.to_string(),
        })?;
        self.fields.push(value);
        Ok(())
    }

    /// Writes trailing arguments, omitting them when empty.
    ///
    /// Positional arguments must be present (even if empty) when keyword arguments are.
    fn arguments(
        &mut self,
        arguments: &List<P>,
        arguments_keyword: &Dictionary<P>,
    ) -> Result<(), MessageError> {
        if !arguments.is_empty() || !arguments_keyword.is_empty() {
            self.push("arguments", arguments)?;
        }
        if !arguments_keyword.is_empty() {
            self.push("arguments_keyword", arguments_keyword)?;
        }
        Ok(())
    }

    fn finish(self) -> Envelope<P> {
        Envelope::new(self.kind, self.fields)
    }
}

/// Conversion between a typed message and its envelope fields.
trait MessageFields<P>: Sized {
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError>;
    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError>;
}

/// A HELLO message for a peer to initiate a WAMP session in a realm.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage<P> {
    pub realm: Uri,
    pub details: Dictionary<P>,
}

impl<P> MessageFields<P> for HelloMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            realm: reader.required("realm")?,
            details: reader.required("details")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("realm", &self.realm)?;
        writer.push("details", &self.details)
    }
}

/// A WELCOME message for a router to confirm a peer's WAMP session in a realm.
#[derive(Debug, Clone, PartialEq)]
pub struct WelcomeMessage<P> {
    pub session: Id,
    pub details: Dictionary<P>,
}

impl<P> MessageFields<P> for WelcomeMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            session: reader.required("session")?,
            details: reader.required("details")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("session", &self.session)?;
        writer.push("details", &self.details)
    }
}

/// An ABORT message for quickly terminating a WAMP session.
#[derive(Debug, Clone, PartialEq)]
pub struct AbortMessage<P> {
    pub details: Dictionary<P>,
    pub reason: Uri,
}

impl<P> MessageFields<P> for AbortMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            details: reader.required("details")?,
            reason: reader.required("reason")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("details", &self.details)?;
        writer.push("reason", &self.reason)
    }
}

/// A GOODBYE message for ending a WAMP session with a two-way handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct GoodbyeMessage<P> {
    pub details: Dictionary<P>,
    pub reason: Uri,
}

impl<P> MessageFields<P> for GoodbyeMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            details: reader.required("details")?,
            reason: reader.required("reason")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("details", &self.details)?;
        writer.push("reason", &self.reason)
    }
}

/// An ERROR message for communicating an error in response to a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage<P> {
    pub request_kind: MessageKind,
    pub request: Id,
    pub details: Dictionary<P>,
    pub error: Uri,
    pub arguments: List<P>,
    pub arguments_keyword: Dictionary<P>,
}

impl<P> MessageFields<P> for ErrorMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        let request_kind = reader.kind_field("request_kind")?;
        let request = reader.required("request")?;
        let details = reader.required("details")?;
        let error = reader.required("error")?;
        let (arguments, arguments_keyword) = reader.arguments()?;
        Ok(Self {
            request_kind,
            request,
            details,
            error,
            arguments,
            arguments_keyword,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("request_kind", &self.request_kind.code())?;
        writer.push("request", &self.request)?;
        writer.push("details", &self.details)?;
        writer.push("error", &self.error)?;
        writer.arguments(&self.arguments, &self.arguments_keyword)
    }
}

/// A PUBLISH message for publishing an event to a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishMessage<P> {
    pub request: Id,
    pub options: Dictionary<P>,
    pub topic: Uri,
    pub arguments: List<P>,
    pub arguments_keyword: Dictionary<P>,
}

impl<P> MessageFields<P> for PublishMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        let request = reader.required("request")?;
        let options = reader.required("options")?;
        let topic = reader.required("topic")?;
        let (arguments, arguments_keyword) = reader.arguments()?;
        Ok(Self {
            request,
            options,
            topic,
            arguments,
            arguments_keyword,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("request", &self.request)?;
        writer.push("options", &self.options)?;
        writer.push("topic", &self.topic)?;
        writer.arguments(&self.arguments, &self.arguments_keyword)
    }
}

/// A PUBLISHED message for confirming an event was published.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub publish_request: Id,
    pub publication: Id,
}

impl<P> MessageFields<P> for PublishedMessage
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            publish_request: reader.required("publish_request")?,
            publication: reader.required("publication")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("publish_request", &self.publish_request)?;
        writer.push("publication", &self.publication)
    }
}

/// A SUBSCRIBE message for subscribing to a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeMessage<P> {
    pub request: Id,
    pub options: Dictionary<P>,
    pub topic: Uri,
}

impl<P> MessageFields<P> for SubscribeMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            request: reader.required("request")?,
            options: reader.required("options")?,
            topic: reader.required("topic")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("request", &self.request)?;
        writer.push("options", &self.options)?;
        writer.push("topic", &self.topic)
    }
}

/// A SUBSCRIBED message for confirming a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribedMessage {
    pub subscribe_request: Id,
    pub subscription: Id,
}

impl<P> MessageFields<P> for SubscribedMessage
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            subscribe_request: reader.required("subscribe_request")?,
            subscription: reader.required("subscription")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("subscribe_request", &self.subscribe_request)?;
        writer.push("subscription", &self.subscription)
    }
}

/// An UNSUBSCRIBE message for removing a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsubscribeMessage {
    pub request: Id,
    pub subscribed_subscription: Id,
}

impl<P> MessageFields<P> for UnsubscribeMessage
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            request: reader.required("request")?,
            subscribed_subscription: reader.required("subscribed_subscription")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("request", &self.request)?;
        writer.push("subscribed_subscription", &self.subscribed_subscription)
    }
}

/// An UNSUBSCRIBED message for confirming a subscription was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsubscribedMessage {
    pub unsubscribe_request: Id,
}

impl<P> MessageFields<P> for UnsubscribedMessage
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            unsubscribe_request: reader.required("unsubscribe_request")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("unsubscribe_request", &self.unsubscribe_request)
    }
}

/// An EVENT message for delivering a published event to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage<P> {
    pub subscribed_subscription: Id,
    pub published_publication: Id,
    pub details: Dictionary<P>,
    pub publish_arguments: List<P>,
    pub publish_arguments_keyword: Dictionary<P>,
}

impl<P> MessageFields<P> for EventMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        let subscribed_subscription = reader.required("subscribed_subscription")?;
        let published_publication = reader.required("published_publication")?;
        let details = reader.required("details")?;
        let (publish_arguments, publish_arguments_keyword) = reader.arguments()?;
        Ok(Self {
            subscribed_subscription,
            published_publication,
            details,
            publish_arguments,
            publish_arguments_keyword,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("subscribed_subscription", &self.subscribed_subscription)?;
        writer.push("published_publication", &self.published_publication)?;
        writer.push("details", &self.details)?;
        writer.arguments(&self.publish_arguments, &self.publish_arguments_keyword)
    }
}

/// A CALL message for calling a procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct CallMessage<P> {
    pub request: Id,
    pub options: Dictionary<P>,
    pub procedure: Uri,
    pub arguments: List<P>,
    pub arguments_keyword: Dictionary<P>,
}

impl<P> MessageFields<P> for CallMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        let request = reader.required("request")?;
        let options = reader.required("options")?;
        let procedure = reader.required("procedure")?;
        let (arguments, arguments_keyword) = reader.arguments()?;
        Ok(Self {
            request,
            options,
            procedure,
            arguments,
            arguments_keyword,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("request", &self.request)?;
        writer.push("options", &self.options)?;
        writer.push("procedure", &self.procedure)?;
        writer.arguments(&self.arguments, &self.arguments_keyword)
    }
}

/// A CANCEL message for canceling an outstanding call.
///
/// Sent as an ordinary message. Cancellation is not fast-pathed.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelMessage<P> {
    pub call_request: Id,
    pub options: Dictionary<P>,
}

impl<P> MessageFields<P> for CancelMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            call_request: reader.required("call_request")?,
            options: reader.required("options")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("call_request", &self.call_request)?;
        writer.push("options", &self.options)
    }
}

/// A RESULT message for returning the result of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMessage<P> {
    pub call_request: Id,
    pub details: Dictionary<P>,
    pub yield_arguments: List<P>,
    pub yield_arguments_keyword: Dictionary<P>,
}

impl<P> MessageFields<P> for ResultMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        let call_request = reader.required("call_request")?;
        let details = reader.required("details")?;
        let (yield_arguments, yield_arguments_keyword) = reader.arguments()?;
        Ok(Self {
            call_request,
            details,
            yield_arguments,
            yield_arguments_keyword,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("call_request", &self.call_request)?;
        writer.push("details", &self.details)?;
        writer.arguments(&self.yield_arguments, &self.yield_arguments_keyword)
    }
}

/// A REGISTER message for registering a procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterMessage<P> {
    pub request: Id,
    pub options: Dictionary<P>,
    pub procedure: Uri,
}

impl<P> MessageFields<P> for RegisterMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            request: reader.required("request")?,
            options: reader.required("options")?,
            procedure: reader.required("procedure")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("request", &self.request)?;
        writer.push("options", &self.options)?;
        writer.push("procedure", &self.procedure)
    }
}

/// A REGISTERED message for confirming a procedure registration.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredMessage {
    pub register_request: Id,
    pub registration: Id,
}

impl<P> MessageFields<P> for RegisteredMessage
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            register_request: reader.required("register_request")?,
            registration: reader.required("registration")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("register_request", &self.register_request)?;
        writer.push("registration", &self.registration)
    }
}

/// An UNREGISTER message for removing a procedure registration.
#[derive(Debug, Clone, PartialEq)]
pub struct UnregisterMessage {
    pub request: Id,
    pub registered_registration: Id,
}

impl<P> MessageFields<P> for UnregisterMessage
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            request: reader.required("request")?,
            registered_registration: reader.required("registered_registration")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("request", &self.request)?;
        writer.push("registered_registration", &self.registered_registration)
    }
}

/// An UNREGISTERED message for confirming a procedure registration was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct UnregisteredMessage {
    pub unregister_request: Id,
}

impl<P> MessageFields<P> for UnregisteredMessage
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            unregister_request: reader.required("unregister_request")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("unregister_request", &self.unregister_request)
    }
}

/// An INVOCATION message for a router to invoke a procedure on its callee.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationMessage<P> {
    pub request: Id,
    pub registered_registration: Id,
    pub details: Dictionary<P>,
    pub call_arguments: List<P>,
    pub call_arguments_keyword: Dictionary<P>,
}

impl<P> MessageFields<P> for InvocationMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        let request = reader.required("request")?;
        let registered_registration = reader.required("registered_registration")?;
        let details = reader.required("details")?;
        let (call_arguments, call_arguments_keyword) = reader.arguments()?;
        Ok(Self {
            request,
            registered_registration,
            details,
            call_arguments,
            call_arguments_keyword,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("request", &self.request)?;
        writer.push("registered_registration", &self.registered_registration)?;
        writer.push("details", &self.details)?;
        writer.arguments(&self.call_arguments, &self.call_arguments_keyword)
    }
}

/// An INTERRUPT message for a router to interrupt an outstanding invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptMessage<P> {
    pub invocation_request: Id,
    pub options: Dictionary<P>,
}

impl<P> MessageFields<P> for InterruptMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        Ok(Self {
            invocation_request: reader.required("invocation_request")?,
            options: reader.required("options")?,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("invocation_request", &self.invocation_request)?;
        writer.push("options", &self.options)
    }
}

/// A YIELD message for a callee to return the result of an invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldMessage<P> {
    pub invocation_request: Id,
    pub options: Dictionary<P>,
    pub arguments: List<P>,
    pub arguments_keyword: Dictionary<P>,
}

impl<P> MessageFields<P> for YieldMessage<P>
where
    P: Payload,
{
    fn read(reader: &mut FieldReader<P>) -> Result<Self, MessageError> {
        let invocation_request = reader.required("invocation_request")?;
        let options = reader.required("options")?;
        let (arguments, arguments_keyword) = reader.arguments()?;
        Ok(Self {
            invocation_request,
            options,
            arguments,
            arguments_keyword,
        })
    }

    fn write(&self, writer: &mut FieldWriter<P>) -> Result<(), MessageError> {
        writer.push("invocation_request", &self.invocation_request)?;
        writer.push("options", &self.options)?;
        writer.arguments(&self.arguments, &self.arguments_keyword)
    }
}

macro_rules! message_catalog {
    ($($variant:ident($message:ty),)*) => {
        /// A typed WAMP message.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Message<P> {
            $($variant($message),)*
        }

        impl<P> Message<P>
        where
            P: Payload,
        {
            /// The kind of the message.
            pub fn kind(&self) -> MessageKind {
                match self {
                    $(Self::$variant(_) => MessageKind::$variant,)*
                }
            }

            /// Converts the message into an envelope of opaque fields.
            pub fn to_envelope(&self) -> Result<Envelope<P>, MessageError> {
                let mut writer = FieldWriter::new(self.kind());
                match self {
                    $(Self::$variant(message) => MessageFields::<P>::write(message, &mut writer)?,)*
                }
                Ok(writer.finish())
            }

            /// Converts an envelope into a typed message, validating the fields of its kind.
            pub fn from_envelope(envelope: Envelope<P>) -> Result<Self, MessageError> {
                let mut reader = FieldReader::new(envelope);
                let kind = reader.kind;
                let message = match kind {
                    $(MessageKind::$variant => Self::$variant(<$message as MessageFields<P>>::read(&mut reader)?),)*
                };
                reader.finish()?;
                Ok(message)
            }
        }
    };
}

message_catalog! {
    Hello(HelloMessage<P>),
    Welcome(WelcomeMessage<P>),
    Abort(AbortMessage<P>),
    Goodbye(GoodbyeMessage<P>),
    Error(ErrorMessage<P>),
    Publish(PublishMessage<P>),
    Published(PublishedMessage),
    Subscribe(SubscribeMessage<P>),
    Subscribed(SubscribedMessage),
    Unsubscribe(UnsubscribeMessage),
    Unsubscribed(UnsubscribedMessage),
    Event(EventMessage<P>),
    Call(CallMessage<P>),
    Cancel(CancelMessage<P>),
    Result(ResultMessage<P>),
    Register(RegisterMessage<P>),
    Registered(RegisteredMessage),
    Unregister(UnregisterMessage),
    Unregistered(UnregisteredMessage),
    Invocation(InvocationMessage<P>),
    Interrupt(InterruptMessage<P>),
    Yield(YieldMessage<P>),
}

impl<P> Message<P>
where
    P: Payload,
{
    /// The name of the message, for logging.
    pub fn message_name(&self) -> &'static str {
        self.kind().name()
    }

    /// The request ID of the message, if the message is a request or correlated to one.
    pub fn request_id(&self) -> Option<Id> {
        match self {
            Self::Error(message) => Some(message.request),
            Self::Publish(message) => Some(message.request),
            Self::Published(message) => Some(message.publish_request),
            Self::Subscribe(message) => Some(message.request),
            Self::Subscribed(message) => Some(message.subscribe_request),
            Self::Unsubscribe(message) => Some(message.request),
            Self::Unsubscribed(message) => Some(message.unsubscribe_request),
            Self::Call(message) => Some(message.request),
            Self::Cancel(message) => Some(message.call_request),
            Self::Result(message) => Some(message.call_request),
            Self::Register(message) => Some(message.request),
            Self::Registered(message) => Some(message.register_request),
            Self::Unregister(message) => Some(message.request),
            Self::Unregistered(message) => Some(message.unregister_request),
            Self::Invocation(message) => Some(message.request),
            Self::Interrupt(message) => Some(message.invocation_request),
            Self::Yield(message) => Some(message.invocation_request),
            _ => None,
        }
    }

    /// The details of the message, if any.
    pub fn details(&self) -> Option<&Dictionary<P>> {
        match self {
            Self::Hello(message) => Some(&message.details),
            Self::Welcome(message) => Some(&message.details),
            Self::Abort(message) => Some(&message.details),
            Self::Goodbye(message) => Some(&message.details),
            Self::Error(message) => Some(&message.details),
            Self::Event(message) => Some(&message.details),
            Self::Result(message) => Some(&message.details),
            Self::Invocation(message) => Some(&message.details),
            _ => None,
        }
    }

    /// The reason URI of the message, if any.
    pub fn reason(&self) -> Option<&Uri> {
        match self {
            Self::Abort(message) => Some(&message.reason),
            Self::Goodbye(message) => Some(&message.reason),
            Self::Error(message) => Some(&message.error),
            _ => None,
        }
    }
}

impl<P> TryFrom<Envelope<P>> for Message<P>
where
    P: Payload,
{
    type Error = MessageError;

    fn try_from(value: Envelope<P>) -> Result<Self, MessageError> {
        Self::from_envelope(value)
    }
}

#[cfg(test)]
mod message_test {
    use crate::{
        core::{
            id::Id,
            types::{
                Dictionary,
                Value,
            },
            uri::Uri,
        },
        message::{
            envelope::{
                Envelope,
                MessageKind,
            },
            message::{
                CallMessage,
                ErrorMessage,
                Message,
                MessageError,
                ResultMessage,
            },
        },
    };

    fn id(value: u64) -> Id {
        Id::try_from(value).unwrap()
    }

    #[test]
    fn reads_call_with_positional_arguments() {
        let envelope = Envelope::new(
            MessageKind::Call,
            Vec::from_iter([
                Value::Integer(7),
                Value::Dictionary(Dictionary::default()),
                Value::from("com.arguments.add2"),
                Value::List(Vec::from_iter([Value::Integer(2), Value::Integer(3)])),
            ]),
        );
        pretty_assertions::assert_eq!(
            Message::from_envelope(envelope),
            Ok(Message::Call(CallMessage {
                request: id(7),
                options: Dictionary::default(),
                procedure: Uri::try_from("com.arguments.add2").unwrap(),
                arguments: Vec::from_iter([Value::Integer(2), Value::Integer(3)]),
                arguments_keyword: Dictionary::default(),
            }))
        );
    }

    #[test]
    fn omits_empty_trailing_arguments() {
        let message = Message::Result(ResultMessage::<Value> {
            call_request: id(3),
            details: Dictionary::default(),
            yield_arguments: Vec::new(),
            yield_arguments_keyword: Dictionary::default(),
        });
        assert_eq!(message.to_envelope().unwrap().fields().len(), 2);

        let message = Message::Result(ResultMessage::<Value> {
            call_request: id(3),
            details: Dictionary::default(),
            yield_arguments: Vec::new(),
            yield_arguments_keyword: Dictionary::from_iter([(
                "c".to_owned(),
                Value::Integer(1),
            )]),
        });
        let envelope = message.to_envelope().unwrap();
        assert_eq!(
            envelope.fields().get(2),
            Some(&Value::List(Vec::new()))
        );
        assert_eq!(Message::from_envelope(envelope), Ok(message));
    }

    #[test]
    fn reports_missing_fields() {
        let envelope = Envelope::new(MessageKind::Welcome, Vec::from_iter([Value::Integer(1)]));
        assert_matches::assert_matches!(
            Message::from_envelope(envelope),
            Err(MessageError::MissingField {
                kind: MessageKind::Welcome,
                field: "details",
            })
        );
    }

    #[test]
    fn reports_invalid_fields() {
        let envelope = Envelope::new(
            MessageKind::Hello,
            Vec::from_iter([
                Value::from("Not A Realm"),
                Value::Dictionary(Dictionary::default()),
            ]),
        );
        assert_matches::assert_matches!(
            Message::from_envelope(envelope),
            Err(MessageError::InvalidField { field: "realm", .. })
        );
    }

    #[test]
    fn reports_trailing_fields() {
        let envelope = Envelope::new(
            MessageKind::Unregistered,
            Vec::from_iter([Value::Integer(1), Value::Integer(2)]),
        );
        assert_matches::assert_matches!(
            Message::from_envelope(envelope),
            Err(MessageError::TrailingFields { count: 1, .. })
        );
    }

    #[test]
    fn reads_error_request_kind() {
        let envelope = Envelope::new(
            MessageKind::Error,
            Vec::from_iter([
                Value::Integer(48),
                Value::Integer(9),
                Value::Dictionary(Dictionary::default()),
                Value::from("wamp.error.runtime_error"),
                Value::List(Vec::from_iter([Value::from("x")])),
            ]),
        );
        assert_matches::assert_matches!(
            Message::from_envelope(envelope),
            Ok(Message::Error(ErrorMessage { request_kind: MessageKind::Call, request, arguments, .. })) => {
                assert_eq!(request, id(9));
                assert_eq!(arguments, Vec::from_iter([Value::from("x")]));
            }
        );

        let envelope = Envelope::new(
            MessageKind::Error,
            Vec::from_iter([
                Value::Integer(4),
                Value::Integer(9),
                Value::Dictionary(Dictionary::default()),
                Value::from("wamp.error.runtime_error"),
            ]),
        );
        assert_matches::assert_matches!(
            Message::from_envelope(envelope),
            Err(MessageError::InvalidField { field: "request_kind", .. })
        );
    }
}
