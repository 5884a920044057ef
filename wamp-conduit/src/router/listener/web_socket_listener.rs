use std::net::SocketAddr;

use anyhow::{
    Error,
    Result,
};
use async_trait::async_trait;
use log::debug;
use tokio::net::{
    TcpListener,
    TcpStream,
};
use tokio_tungstenite::{
    MaybeTlsStream,
    tungstenite::{
        handshake::server::{
            Callback,
            ErrorResponse,
            Request,
            Response,
        },
        http::{
            HeaderValue,
            StatusCode,
            header::SEC_WEBSOCKET_PROTOCOL,
        },
    },
};

use crate::{
    binding::binding::BindingType,
    core::types::HashSet,
    router::listener::listener::{
        Accepted,
        ConnectionListener,
        IncomingConnection,
    },
    transport::{
        transport::TransportFactory,
        web_socket_transport::WebSocketTransportFactory,
    },
};

struct WebSocketWampNegotiator {
    supported_protocols: HashSet<String>,
    selected_protocol: Option<String>,
}

impl WebSocketWampNegotiator {
    fn new(bindings: &HashSet<BindingType>) -> Self {
        let supported_protocols = bindings
            .iter()
            .map(|binding| binding.uri().to_string())
            .collect();
        Self {
            supported_protocols,
            selected_protocol: None,
        }
    }

    fn reject_response<S>(message: S) -> ErrorResponse
    where
        S: Into<String>,
    {
        let mut response = ErrorResponse::new(Some(message.into()));
        *response.status_mut() = StatusCode::BAD_REQUEST;
        response
    }

    fn callback(&mut self) -> impl Callback + use<'_> {
        |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            let selected_protocol = request
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|protocols| match protocols.to_str() {
                    Ok(protocols) => protocols
                        .split(',')
                        .map(|protocol| protocol.trim())
                        .find(|protocol| self.supported_protocols.contains(*protocol)),
                    Err(_) => None,
                });
            let selected_protocol = match selected_protocol {
                Some(protocol) => protocol,
                None => return Err(Self::reject_response("no supported protocol")),
            };
            self.selected_protocol = Some(selected_protocol.to_owned());
            let header = match HeaderValue::from_str(selected_protocol) {
                Ok(header) => header,
                Err(_) => return Err(Self::reject_response("failed to create response header")),
            };
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, header);
            Ok(response)
        }
    }
}

struct WebSocketIncomingConnection {
    stream: TcpStream,
    addr: SocketAddr,
    bindings: HashSet<BindingType>,
}

#[async_trait]
impl IncomingConnection for WebSocketIncomingConnection {
    fn description(&self) -> String {
        self.addr.to_string()
    }

    async fn establish(self: Box<Self>) -> Result<Accepted> {
        let mut negotiator = WebSocketWampNegotiator::new(&self.bindings);
        let stream =
            tokio_tungstenite::accept_hdr_async(MaybeTlsStream::Plain(self.stream), negotiator.callback())
                .await?;
        let protocol = match negotiator.selected_protocol {
            Some(protocol) => protocol,
            None => return Err(Error::msg("expected protocol after negotiation")),
        };
        let binding = BindingType::try_from(protocol.as_str()).map_err(Error::msg)?;
        debug!("WAMP connection established with {} over {protocol}", self.addr);
        Ok(Accepted {
            transport: WebSocketTransportFactory::default().new_transport(stream, binding),
            binding,
            description: self.addr.to_string(),
        })
    }
}

/// A [`ConnectionListener`] accepting WebSocket connections over TCP.
///
/// The binding is negotiated as the WebSocket subprotocol. Clients offering no supported binding
/// are rejected during the handshake.
pub struct WebSocketListener {
    listener: TcpListener,
    bindings: HashSet<BindingType>,
}

impl WebSocketListener {
    /// Binds a new listener to `addr`.
    pub async fn bind(addr: &str, bindings: HashSet<BindingType>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, bindings })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::new)
    }
}

#[async_trait]
impl ConnectionListener for WebSocketListener {
    async fn accept(&self) -> Result<Option<Box<dyn IncomingConnection>>> {
        let (stream, addr) = self.listener.accept().await?;
        debug!("Incoming TCP connection from {addr}");
        Ok(Some(Box::new(WebSocketIncomingConnection {
            stream,
            addr,
            bindings: self.bindings.clone(),
        })))
    }
}
