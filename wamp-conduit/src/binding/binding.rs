use std::{
    fmt::Debug,
    sync::Arc,
};

use thiserror::Error;

use crate::{
    binding::{
        json::JsonBinding,
        message_pack::MessagePackBinding,
    },
    core::{
        payload::Payload,
        uri::Uri,
    },
    message::envelope::{
        Envelope,
        MessageKind,
        RawEnvelope,
    },
};

/// Error for converting between envelopes and wire bytes.
///
/// Every binding error is session-ending, since a peer that cannot be understood cannot be trusted
/// to resynchronize.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    /// A field could not be represented in the wire encoding.
    #[error("failed to encode message: {0}")]
    Encoding(String),
    /// The bytes are not a well-formed message in the wire encoding.
    #[error("failed to decode message: {0}")]
    Decoding(String),
    /// The leading kind code is not part of the message catalog.
    #[error("unknown message kind {0}")]
    UnknownMessageKind(u64),
}

/// The type of binding to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// Encodes messages as JavaScript Object Notation text.
    Json,
    /// Encodes messages in the MessagePack format.
    MessagePack,
}

impl BindingType {
    /// The protocol URI used during protocol negotiation.
    pub fn uri(&self) -> Uri {
        match self {
            Self::Json => Uri::from_known("wamp.2.json"),
            Self::MessagePack => Uri::from_known("wamp.2.msgpack"),
        }
    }

    /// Whether frames of this binding must be sent as binary data.
    pub fn is_binary(&self) -> bool {
        match self {
            Self::Json => false,
            Self::MessagePack => true,
        }
    }
}

impl TryFrom<&str> for BindingType {
    type Error = &'static str;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "wamp.2.json" => Ok(Self::Json),
            "wamp.2.msgpack" => Ok(Self::MessagePack),
            _ => Err("unsupported binding"),
        }
    }
}

/// A binding, which converts envelopes to and from one wire encoding.
///
/// Bindings are stateless, so one instance can be shared by any number of connections. Framing is
/// left to the transport: every call handles exactly one complete message.
pub trait Binding<P>: Send + Sync + Debug {
    /// The type of the binding.
    fn binding_type(&self) -> BindingType;

    /// Formats an envelope into bytes.
    fn format(&self, envelope: &Envelope<P>) -> Result<Vec<u8>, BindingError>;

    /// Parses bytes into an envelope.
    fn parse(&self, bytes: &[u8]) -> Result<Envelope<P>, BindingError>;
}

/// Creates a new [`Binding`] for the given type.
pub fn new_binding<P>(binding_type: BindingType) -> Arc<dyn Binding<P>>
where
    P: Payload,
{
    match binding_type {
        BindingType::Json => Arc::new(JsonBinding::default()),
        BindingType::MessagePack => Arc::new(MessagePackBinding::default()),
    }
}

pub(crate) fn envelope_from_raw<P>(raw: RawEnvelope<P>) -> Result<Envelope<P>, BindingError> {
    let kind =
        MessageKind::from_code(raw.code).ok_or(BindingError::UnknownMessageKind(raw.code))?;
    Ok(Envelope::new(kind, raw.fields))
}
