mod connector;
mod web_socket_connector;

pub use connector::{
    ConnectedStream,
    Connector,
};
pub use web_socket_connector::WebSocketConnector;
