use anyhow::Result;
use async_trait::async_trait;

use crate::{
    binding::binding::BindingType,
    transport::transport::Transport,
};

/// A transport that completed its handshake and is ready to carry WAMP messages.
pub struct Accepted {
    /// The established transport.
    pub transport: Box<dyn Transport>,
    /// The binding negotiated during the handshake.
    pub binding: BindingType,
    /// Description of the remote end, for logging.
    pub description: String,
}

/// A connection that was accepted, but has not yet completed its transport handshake.
///
/// Note that establishing only makes sure both ends can talk WAMP. It does not establish a
/// session.
#[async_trait]
pub trait IncomingConnection: Send {
    /// Description of the remote end, for logging.
    fn description(&self) -> String;

    /// Performs the transport handshake.
    async fn establish(self: Box<Self>) -> Result<Accepted>;
}

/// A source of incoming connections.
#[async_trait]
pub trait ConnectionListener: Send + Sync {
    /// Waits for the next incoming connection.
    ///
    /// Returns `None` when the listener will never produce another connection.
    async fn accept(&self) -> Result<Option<Box<dyn IncomingConnection>>>;
}
