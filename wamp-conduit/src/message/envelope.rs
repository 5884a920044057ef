use std::{
    fmt::Display,
    marker::PhantomData,
};

use serde::{
    Deserialize,
    Serialize,
    de::{
        SeqAccess,
        Visitor,
    },
    ser::SerializeSeq,
};

/// The kind of a WAMP message, identified on the wire by its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Hello,
    Welcome,
    Abort,
    Goodbye,
    Error,
    Publish,
    Published,
    Subscribe,
    Subscribed,
    Unsubscribe,
    Unsubscribed,
    Event,
    Call,
    Cancel,
    Result,
    Register,
    Registered,
    Unregister,
    Unregistered,
    Invocation,
    Interrupt,
    Yield,
}

impl MessageKind {
    /// Every message kind in the catalog.
    pub const ALL: [MessageKind; 22] = [
        Self::Hello,
        Self::Welcome,
        Self::Abort,
        Self::Goodbye,
        Self::Error,
        Self::Publish,
        Self::Published,
        Self::Subscribe,
        Self::Subscribed,
        Self::Unsubscribe,
        Self::Unsubscribed,
        Self::Event,
        Self::Call,
        Self::Cancel,
        Self::Result,
        Self::Register,
        Self::Registered,
        Self::Unregister,
        Self::Unregistered,
        Self::Invocation,
        Self::Interrupt,
        Self::Yield,
    ];

    /// The integer code of the message kind.
    pub fn code(&self) -> u64 {
        match self {
            Self::Hello => 1,
            Self::Welcome => 2,
            Self::Abort => 3,
            Self::Goodbye => 6,
            Self::Error => 8,
            Self::Publish => 16,
            Self::Published => 17,
            Self::Subscribe => 32,
            Self::Subscribed => 33,
            Self::Unsubscribe => 34,
            Self::Unsubscribed => 35,
            Self::Event => 36,
            Self::Call => 48,
            Self::Cancel => 49,
            Self::Result => 50,
            Self::Register => 64,
            Self::Registered => 65,
            Self::Unregister => 66,
            Self::Unregistered => 67,
            Self::Invocation => 68,
            Self::Interrupt => 69,
            Self::Yield => 70,
        }
    }

    /// The name of the message kind, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::Welcome => "WELCOME",
            Self::Abort => "ABORT",
            Self::Goodbye => "GOODBYE",
            Self::Error => "ERROR",
            Self::Publish => "PUBLISH",
            Self::Published => "PUBLISHED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Subscribed => "SUBSCRIBED",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Unsubscribed => "UNSUBSCRIBED",
            Self::Event => "EVENT",
            Self::Call => "CALL",
            Self::Cancel => "CANCEL",
            Self::Result => "RESULT",
            Self::Register => "REGISTER",
            Self::Registered => "REGISTERED",
            Self::Unregister => "UNREGISTER",
            Self::Unregistered => "UNREGISTERED",
            Self::Invocation => "INVOCATION",
            Self::Interrupt => "INTERRUPT",
            Self::Yield => "YIELD",
        }
    }

    /// Looks up the message kind for an integer code.
    pub fn from_code(code: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One protocol message: its kind and an ordered sequence of opaque payload fields.
///
/// The envelope does not enforce the arity of any message kind. That is the job of the typed
/// messages in [`crate::message::message`].
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<P> {
    kind: MessageKind,
    fields: Vec<P>,
}

impl<P> Envelope<P> {
    pub fn new(kind: MessageKind, fields: Vec<P>) -> Self {
        Self { kind, fields }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn fields(&self) -> &[P] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<P> {
        self.fields
    }
}

impl<P> Serialize for Envelope<P>
where
    P: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.fields.len() + 1))?;
        seq.serialize_element(&self.kind.code())?;
        for field in &self.fields {
            seq.serialize_element(field)?;
        }
        seq.end()
    }
}

/// An envelope as read off the wire, before its kind code is checked against the catalog.
#[derive(Debug)]
pub(crate) struct RawEnvelope<P> {
    pub code: u64,
    pub fields: Vec<P>,
}

struct RawEnvelopeVisitor<P>(PhantomData<P>);

impl<'de, P> Visitor<'de> for RawEnvelopeVisitor<P>
where
    P: Deserialize<'de>,
{
    type Value = RawEnvelope<P>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "a message kind code followed by message fields")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let code = seq
            .next_element::<u64>()?
            .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
        let mut fields = Vec::with_capacity(seq.size_hint().unwrap_or_default());
        while let Some(field) = seq.next_element::<P>()? {
            fields.push(field);
        }
        Ok(RawEnvelope { code, fields })
    }
}

impl<'de, P> Deserialize<'de> for RawEnvelope<P>
where
    P: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_seq(RawEnvelopeVisitor(PhantomData))
    }
}
