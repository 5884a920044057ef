use anyhow::{
    Error,
    Result,
};
use async_trait::async_trait;
use tokio::sync::{
    Mutex,
    mpsc::{
        UnboundedReceiver,
        UnboundedSender,
        unbounded_channel,
    },
};

use crate::{
    binding::binding::BindingType,
    router::listener::listener::{
        Accepted,
        ConnectionListener,
        IncomingConnection,
    },
    transport::direct_transport::{
        DirectTransport,
        direct_transport_pair,
    },
};

struct EstablishedConnection {
    accepted: Accepted,
}

#[async_trait]
impl IncomingConnection for EstablishedConnection {
    fn description(&self) -> String {
        self.accepted.description.clone()
    }

    async fn establish(self: Box<Self>) -> Result<Accepted> {
        Ok(self.accepted)
    }
}

/// A [`ConnectionListener`] yielding in-process connections created by a [`ChannelConnector`].
pub struct ChannelListener {
    rx: Mutex<UnboundedReceiver<Accepted>>,
}

#[async_trait]
impl ConnectionListener for ChannelListener {
    async fn accept(&self) -> Result<Option<Box<dyn IncomingConnection>>> {
        Ok(self
            .rx
            .lock()
            .await
            .recv()
            .await
            .map(|accepted| -> Box<dyn IncomingConnection> {
                Box::new(EstablishedConnection { accepted })
            }))
    }
}

/// Creates in-process connections to a [`ChannelListener`].
#[derive(Clone)]
pub struct ChannelConnector {
    tx: UnboundedSender<Accepted>,
    description: String,
}

impl ChannelConnector {
    /// Connects to the listener, returning the local end of the connection.
    pub fn connect(&self, binding: BindingType) -> Result<DirectTransport> {
        let (remote, local) = direct_transport_pair();
        self.tx
            .send(Accepted {
                transport: Box::new(remote),
                binding,
                description: self.description.clone(),
            })
            .map_err(|_| Error::msg("listener is closed"))?;
        Ok(local)
    }
}

/// Creates a connected [`ChannelConnector`] and [`ChannelListener`].
///
/// The listener stops producing connections once every connector is dropped.
pub fn channel_listener(description: &str) -> (ChannelConnector, ChannelListener) {
    let (tx, rx) = unbounded_channel();
    (
        ChannelConnector {
            tx,
            description: description.to_owned(),
        },
        ChannelListener { rx: Mutex::new(rx) },
    )
}
