use std::{
    pin::Pin,
    task,
};

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    Sink,
    SinkExt,
    Stream,
    StreamExt,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream,
    WebSocketStream,
    tungstenite::Message,
};

use crate::{
    binding::binding::BindingType,
    transport::transport::{
        Transport,
        TransportData,
        TransportFactory,
    },
};

/// A transport implemented for a TCP stream using the WebSocket protocol.
///
/// Text bindings are carried in text frames and binary bindings in binary frames. A frame of the
/// wrong type is a transport error.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    binary: bool,
}

impl WebSocketTransport {
    pub fn new(
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        binding_type: BindingType,
    ) -> Self {
        Self {
            stream,
            binary: binding_type.is_binary(),
        }
    }

    fn frame_to_data(&self, message: Message) -> Option<Result<TransportData>> {
        match message {
            Message::Ping(data) => Some(Ok(TransportData::Ping(data.to_vec()))),
            Message::Text(text) if !self.binary => {
                Some(Ok(TransportData::Message(text.as_bytes().to_vec())))
            }
            Message::Binary(data) if self.binary => Some(Ok(TransportData::Message(data.to_vec()))),
            Message::Text(_) => Some(Err(Error::msg("expected binary frame"))),
            Message::Binary(_) => Some(Err(Error::msg("expected text frame"))),
            Message::Close(_) => None,
            _ => Some(Err(Error::msg("unexpected websocket frame"))),
        }
    }
}

impl Transport for WebSocketTransport {}

impl Stream for WebSocketTransport {
    type Item = Result<TransportData>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        loop {
            match futures_util::ready!(self.stream.poll_next_unpin(cx)) {
                // Pongs answer our own pings and carry nothing for the layers above.
                Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(message)) => return task::Poll::Ready(self.frame_to_data(message)),
                Some(Err(err)) => return task::Poll::Ready(Some(Err(err.into()))),
                None => return task::Poll::Ready(None),
            }
        }
    }
}

impl Sink<TransportData> for WebSocketTransport {
    type Error = Error;

    fn poll_ready(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Result<(), Self::Error>> {
        self.stream.poll_ready_unpin(cx).map_err(Error::new)
    }

    fn start_send(mut self: Pin<&mut Self>, item: TransportData) -> Result<(), Self::Error> {
        let message = match item {
            TransportData::Ping(data) => Message::Pong(data.into()),
            TransportData::Message(data) => {
                if self.binary {
                    Message::Binary(data.into())
                } else {
                    Message::Text(String::from_utf8(data)?.into())
                }
            }
        };
        self.stream.start_send_unpin(message).map_err(Error::new)
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Result<(), Self::Error>> {
        self.stream.poll_flush_unpin(cx).map_err(Error::new)
    }

    fn poll_close(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Result<(), Self::Error>> {
        self.stream.poll_close_unpin(cx).map_err(Error::new)
    }
}

/// A factory for [`WebSocketTransport`].
#[derive(Default)]
pub struct WebSocketTransportFactory {}

impl TransportFactory<WebSocketStream<MaybeTlsStream<TcpStream>>> for WebSocketTransportFactory {
    fn new_transport(
        &self,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        binding_type: BindingType,
    ) -> Box<dyn Transport> {
        Box::new(WebSocketTransport::new(stream, binding_type))
    }
}
