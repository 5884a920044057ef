use anyhow::Result;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream,
    WebSocketStream,
};

use crate::{
    core::payload::Payload,
    peer::{
        WebSocketConnector,
        peer::{
            Peer,
            PeerConfig,
        },
    },
    transport::web_socket_transport::WebSocketTransportFactory,
};

/// A [`Peer`] connecting to routers over WebSocket.
pub type WebSocketPeer<P = serde_json::Value> = Peer<WebSocketStream<MaybeTlsStream<TcpStream>>, P>;

pub fn new_web_socket_peer<P>(config: PeerConfig) -> Result<WebSocketPeer<P>>
where
    P: Payload,
{
    Peer::new(
        config,
        Box::new(WebSocketConnector),
        Box::new(WebSocketTransportFactory::default()),
    )
}
