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
    Stream,
};
use tokio::sync::mpsc::{
    UnboundedReceiver,
    UnboundedSender,
    unbounded_channel,
};

use crate::transport::transport::{
    Transport,
    TransportData,
};

/// An in-process transport, connected to exactly one other [`DirectTransport`].
///
/// Frames are moved over channels without any network involvement. Closing one end ends the stream
/// of the other.
#[derive(Debug)]
pub struct DirectTransport {
    tx: Option<UnboundedSender<Vec<u8>>>,
    rx: UnboundedReceiver<Vec<u8>>,
}

/// Creates two connected [`DirectTransport`]s.
pub fn direct_transport_pair() -> (DirectTransport, DirectTransport) {
    let (a_tx, a_rx) = unbounded_channel();
    let (b_tx, b_rx) = unbounded_channel();
    (
        DirectTransport {
            tx: Some(a_tx),
            rx: b_rx,
        },
        DirectTransport {
            tx: Some(b_tx),
            rx: a_rx,
        },
    )
}

impl Transport for DirectTransport {}

impl Stream for DirectTransport {
    type Item = Result<TransportData>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
            .map(|data| data.map(|data| Ok(TransportData::Message(data))))
    }
}

impl Sink<TransportData> for DirectTransport {
    type Error = Error;

    fn poll_ready(
        self: Pin<&mut Self>,
        _: &mut task::Context<'_>,
    ) -> task::Poll<Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: TransportData) -> Result<(), Self::Error> {
        let data = match item {
            // Nothing on the other end ever pings, so there is nothing to answer.
            TransportData::Ping(_) => return Ok(()),
            TransportData::Message(data) => data,
        };
        match &self.tx {
            Some(tx) => tx
                .send(data)
                .map_err(|_| Error::msg("direct transport peer is gone")),
            None => Err(Error::msg("direct transport is closed")),
        }
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        _: &mut task::Context<'_>,
    ) -> task::Poll<Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn poll_close(
        mut self: Pin<&mut Self>,
        _: &mut task::Context<'_>,
    ) -> task::Poll<Result<(), Self::Error>> {
        self.tx.take();
        task::Poll::Ready(Ok(()))
    }
}
