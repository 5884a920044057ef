mod connector;
mod marshaler;
mod peer;
mod session;
mod web_socket_peer;

pub use connector::{
    ConnectedStream,
    Connector,
    WebSocketConnector,
};
pub use marshaler::{
    Decoder,
    Invoked,
    Marshaler,
    PendingCall,
};
pub use peer::{
    Peer,
    PeerConfig,
    PeerNotConnectedError,
};
pub use session::{
    ClientSession,
    Invocation,
    PublishedEvent,
    ReceivedEvent,
    Registration,
    RpcYield,
    Subscription,
};
pub use web_socket_peer::{
    WebSocketPeer,
    new_web_socket_peer,
};
