use anyhow::{
    Error,
    Result,
};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream,
    WebSocketStream,
    connect_async,
    tungstenite::{
        ClientRequestBuilder,
        http::{
            HeaderValue,
            header::SEC_WEBSOCKET_PROTOCOL,
        },
    },
};

use crate::{
    binding::binding::BindingType,
    core::types::HashSet,
    peer::{
        connector::connector::{
            ConnectedStream,
            Connector,
        },
        peer::PeerConfig,
    },
};

/// Checks the subprotocol selected by the router against the bindings offered by the peer.
fn negotiated_binding(
    selected: Option<&HeaderValue>,
    offered: &HashSet<BindingType>,
) -> Result<BindingType> {
    let selected = selected.ok_or_else(|| Error::msg("router did not select a subprotocol"))?;
    let binding = BindingType::try_from(selected.to_str()?).map_err(Error::msg)?;
    if !offered.contains(&binding) {
        return Err(Error::msg(format!(
            "router selected {} which was not offered",
            binding.uri()
        )));
    }
    Ok(binding)
}

/// Connects to a router over WebSocket, offering every configured binding as a subprotocol.
#[derive(Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector<WebSocketStream<MaybeTlsStream<TcpStream>>> for WebSocketConnector {
    async fn connect(
        &self,
        config: &PeerConfig,
        uri: &str,
    ) -> Result<ConnectedStream<WebSocketStream<MaybeTlsStream<TcpStream>>>> {
        let request = config.bindings.iter().fold(
            ClientRequestBuilder::new(uri.try_into()?).with_header("User-Agent", &config.agent),
            |request, binding| request.with_sub_protocol(binding.uri().to_string()),
        );
        let (stream, response) = connect_async(request).await?;
        let binding =
            negotiated_binding(response.headers().get(SEC_WEBSOCKET_PROTOCOL), &config.bindings)?;
        Ok(ConnectedStream { stream, binding })
    }
}

#[cfg(test)]
mod web_socket_connector_test {
    use tokio_tungstenite::tungstenite::http::HeaderValue;

    use crate::{
        binding::binding::BindingType,
        core::types::HashSet,
        peer::connector::web_socket_connector::negotiated_binding,
    };

    #[test]
    fn accepts_offered_subprotocol() {
        let offered = HashSet::from_iter([BindingType::Json, BindingType::MessagePack]);
        assert_matches::assert_matches!(
            negotiated_binding(Some(&HeaderValue::from_static("wamp.2.msgpack")), &offered),
            Ok(BindingType::MessagePack)
        );
    }

    #[test]
    fn rejects_missing_or_unoffered_subprotocol() {
        let offered = HashSet::from_iter([BindingType::Json]);
        assert_matches::assert_matches!(negotiated_binding(None, &offered), Err(_));
        assert_matches::assert_matches!(
            negotiated_binding(Some(&HeaderValue::from_static("wamp.2.msgpack")), &offered),
            Err(_)
        );
        assert_matches::assert_matches!(
            negotiated_binding(Some(&HeaderValue::from_static("wamp.2.cbor")), &offered),
            Err(_)
        );
    }
}
