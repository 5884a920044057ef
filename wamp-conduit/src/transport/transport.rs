use std::fmt::Debug;

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    Sink,
    Stream,
};

use crate::binding::binding::BindingType;

/// Data moved over a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportData {
    /// Data that should be perceived as a health check and immediately sent back to the sender.
    Ping(Vec<u8>),
    /// One complete, encoded WAMP message.
    Message(Vec<u8>),
}

/// A transport, over which encoded WAMP messages can be sent and received.
///
/// Implemented as a [`Stream`] and [`Sink`] of whole frames. Framing is the transport's job, so
/// every [`TransportData::Message`] holds exactly one message. The stream ends when the remote end
/// closes the transport.
pub trait Transport:
    Send + Stream<Item = Result<TransportData>> + Sink<TransportData, Error = Error> + Unpin + Debug
{
}

/// A factory for creating a new [`Transport`] out of an established stream.
pub trait TransportFactory<S>: Send + Sync {
    /// Creates a new [`Transport`] for WAMP messaging.
    fn new_transport(&self, stream: S, binding_type: BindingType) -> Box<dyn Transport>;
}
