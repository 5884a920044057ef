use std::{
    pin::Pin,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{
    SinkExt,
    StreamExt,
    stream::{
        SplitSink,
        SplitStream,
    },
};
use log::{
    debug,
    error,
    info,
    trace,
};
use thiserror::Error;
use tokio::{
    sync::watch,
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    binding::binding::{
        Binding,
        BindingError,
        BindingType,
    },
    core::{
        error::InteractionError,
        payload::Payload,
    },
    message::{
        common::abort_message_for_error,
        envelope::Envelope,
        message::{
            Message,
            MessageError,
        },
    },
    transport::transport::{
        Transport,
        TransportData,
    },
};

/// Error for a single connection.
///
/// Returned from sends, and recorded as the cause when a connection terminates abnormally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionError {
    #[error("failed to write to transport: {0}")]
    TransportWrite(String),
    #[error("transport is closed")]
    TransportClosed,
    #[error("failed to read from transport: {0}")]
    TransportRead(String),
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error("connection timed out")]
    TimedOut,
    #[error("message handler failed: {0}")]
    Handler(String),
}

/// The terminal notification of a [`Connection`].
#[derive(Debug, Default, Clone)]
pub struct ConnectionClosed {
    /// The reason the connection terminated, if it did not close cleanly.
    pub cause: Option<Arc<ConnectionError>>,
}

impl ConnectionClosed {
    /// A human-readable reason for the closure.
    pub fn reason(&self) -> String {
        match &self.cause {
            Some(cause) => cause.to_string(),
            None => "connection closed".to_owned(),
        }
    }
}

/// What the inbound loop should do after a message is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Close,
}

/// The single consumer of messages received on a [`Connection`].
#[async_trait]
pub trait MessageHandler<P>: Send + Sync {
    /// Handles one inbound message.
    ///
    /// Messages are handled strictly in arrival order; the next frame is not read until this
    /// returns. An error terminates the connection.
    ///
    /// Handlers must not await [`Connection::close`], since closing waits for the inbound loop.
    /// Return [`Disposition::Close`] instead.
    async fn handle_message(&self, message: Message<P>) -> Result<Disposition>;

    /// Called exactly once, after the connection terminates.
    async fn handle_closed(&self, closed: &ConnectionClosed);
}

/// Configuration for a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Name of the connection, for logging.
    pub name: String,
    /// Amount of time without any inbound frame before the connection is terminated.
    ///
    /// Termination fails every pending request with a lost connection, so a call outstanding
    /// longer than this window on an otherwise quiet connection fails as well.
    pub idle_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            name: "connection".to_owned(),
            idle_timeout: Some(Duration::from_secs(300)),
        }
    }
}

type PinnedTransport = Pin<Box<dyn Transport>>;
type TransportSink = SplitSink<PinnedTransport, TransportData>;
type TransportStream = SplitStream<PinnedTransport>;

/// A duplex connection bridging one live transport to the message layer.
///
/// Outbound messages are formatted with the connection's binding and written as exactly one
/// transport frame. Inbound frames are parsed by a task owned by the connection and passed to a
/// single [`MessageHandler`].
pub struct Connection<P> {
    uuid: Uuid,
    name: String,
    idle_timeout: Option<Duration>,
    binding: Arc<dyn Binding<P>>,

    sink: tokio::sync::Mutex<Option<TransportSink>>,
    stream: Mutex<Option<TransportStream>>,

    started: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
    requested_cause: Mutex<Option<ConnectionError>>,
    cancel_tx: watch::Sender<bool>,
    closed_tx: watch::Sender<Option<ConnectionClosed>>,
}

impl<P> std::fmt::Debug for Connection<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .finish()
    }
}

impl<P> Connection<P>
where
    P: Payload,
{
    /// Creates a new connection over an established transport.
    ///
    /// Nothing is read from the transport until [`Self::start`] is called.
    pub fn new(
        config: ConnectionConfig,
        transport: Box<dyn Transport>,
        binding: Arc<dyn Binding<P>>,
    ) -> Arc<Self> {
        let (sink, stream) = Box::into_pin(transport).split();
        let (cancel_tx, _) = watch::channel(false);
        let (closed_tx, _) = watch::channel(None);
        Arc::new(Self {
            uuid: Uuid::new_v4(),
            name: config.name,
            idle_timeout: config.idle_timeout,
            binding,
            sink: tokio::sync::Mutex::new(Some(sink)),
            stream: Mutex::new(Some(stream)),
            started: AtomicBool::new(false),
            reader: Mutex::new(None),
            requested_cause: Mutex::new(None),
            cancel_tx,
            closed_tx,
        })
    }

    /// The unique identifier of the connection.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binding_type(&self) -> BindingType {
        self.binding.binding_type()
    }

    /// Starts the inbound loop, passing every received message to `handler`.
    pub fn start(self: &Arc<Self>, handler: Arc<dyn MessageHandler<P>>) {
        if self.started.swap(true, Ordering::SeqCst) {
            error!("Connection {} was already started", self.name);
            return;
        }
        let handle = tokio::spawn(self.clone().run(handler));
        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Sends an envelope as exactly one transport frame.
    ///
    /// A transport failure terminates the connection.
    pub async fn send(&self, envelope: &Envelope<P>) -> Result<(), ConnectionError> {
        let data = self.binding.format(envelope)?;
        let mut sink = self.sink.lock().await;
        let writer = sink.as_mut().ok_or(ConnectionError::TransportClosed)?;
        let result = writer.send(TransportData::Message(data)).await;
        if let Err(err) = result {
            let error = ConnectionError::TransportWrite(err.to_string());
            error!("Connection {} failed to send {}: {err}", self.name, envelope.kind());
            sink.take();
            drop(sink);
            self.request_close(Some(error.clone()));
            return Err(error);
        }
        Ok(())
    }

    /// Sends a typed message.
    pub async fn send_message(&self, message: Message<P>) -> Result<(), ConnectionError> {
        trace!(
            "Connection {} sending {} message: {message:?}",
            self.name,
            message.message_name()
        );
        let envelope = message.to_envelope()?;
        self.send(&envelope).await
    }

    /// Checks if the connection has terminated.
    pub fn is_closed(&self) -> bool {
        self.closed_tx.borrow().is_some()
    }

    /// Waits for the connection to terminate.
    ///
    /// Can be awaited by any number of observers, any number of times.
    pub async fn closed(&self) -> ConnectionClosed {
        let mut closed_rx = self.closed_tx.subscribe();
        match closed_rx.wait_for(|closed| closed.is_some()).await {
            Ok(closed) => closed.clone().unwrap_or_default(),
            Err(_) => ConnectionClosed::default(),
        }
    }

    /// Closes the connection, releasing the transport.
    ///
    /// Closing an already closed connection does nothing.
    pub async fn close(&self) {
        self.request_close(None);
        if !self.started.load(Ordering::SeqCst) {
            self.finish(None, None).await;
            return;
        }
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match reader {
            Some(reader) => {
                if let Err(err) = reader.await {
                    error!("Connection {} reader task failed: {err}", self.name);
                }
            }
            None => {
                self.closed().await;
            }
        }
    }

    fn request_close(&self, cause: Option<ConnectionError>) {
        if let Some(cause) = cause {
            let mut requested_cause = self
                .requested_cause
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if requested_cause.is_none() {
                *requested_cause = Some(cause);
            }
        }
        self.cancel_tx.send_replace(true);
    }

    fn take_requested_cause(&self) -> Option<ConnectionError> {
        self.requested_cause
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn run(self: Arc<Self>, handler: Arc<dyn MessageHandler<P>>) {
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let cause = match stream {
            Some(stream) => self.read_loop(stream, handler.as_ref()).await,
            None => None,
        };
        if let Some(cause) = &cause {
            error!("Connection {} terminated: {cause}", self.name);
        }
        self.finish(cause, Some(handler.as_ref())).await;
    }

    async fn read_loop(
        &self,
        mut stream: TransportStream,
        handler: &dyn MessageHandler<P>,
    ) -> Option<ConnectionError> {
        let mut cancel_rx = self.cancel_tx.subscribe();
        loop {
            tokio::select! {
                frame = stream.next() => {
                    let data = match frame {
                        Some(Ok(TransportData::Ping(data))) => {
                            if let Err(err) = self.pong(data).await {
                                return Some(err);
                            }
                            continue;
                        }
                        Some(Ok(TransportData::Message(data))) => data,
                        Some(Err(err)) => return Some(ConnectionError::TransportRead(err.to_string())),
                        None => {
                            debug!("Connection {} transport ended", self.name);
                            return self.take_requested_cause();
                        }
                    };
                    let message = match self.parse(&data) {
                        Ok(message) => message,
                        Err(err) => {
                            self.abort_for_protocol_violation(&err).await;
                            return Some(err);
                        }
                    };
                    trace!(
                        "Connection {} received {} message: {message:?}",
                        self.name,
                        message.message_name()
                    );
                    match handler.handle_message(message).await {
                        Ok(Disposition::Continue) => (),
                        Ok(Disposition::Close) => return self.take_requested_cause(),
                        Err(err) => return Some(ConnectionError::Handler(format!("{err:#}"))),
                    }
                }
                _ = Self::cancelled(&mut cancel_rx) => {
                    return self.take_requested_cause();
                }
                _ = Self::idle(self.idle_timeout) => {
                    return Some(ConnectionError::TimedOut);
                }
            }
        }
    }

    async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
        // The sender lives as long as the connection.
        cancel_rx.wait_for(|cancel| *cancel).await.ok();
    }

    async fn idle(timeout: Option<Duration>) {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    }

    fn parse(&self, data: &[u8]) -> Result<Message<P>, ConnectionError> {
        let envelope = self.binding.parse(data)?;
        Ok(Message::from_envelope(envelope)?)
    }

    async fn pong(&self, data: Vec<u8>) -> Result<(), ConnectionError> {
        let mut sink = self.sink.lock().await;
        let writer = sink.as_mut().ok_or(ConnectionError::TransportClosed)?;
        writer
            .send(TransportData::Ping(data))
            .await
            .map_err(|err| ConnectionError::TransportWrite(err.to_string()))
    }

    async fn abort_for_protocol_violation(&self, error: &ConnectionError) {
        let abort = abort_message_for_error(
            &InteractionError::ProtocolViolation(error.to_string()).into(),
        );
        // The transport may already be gone.
        self.send_message(abort).await.ok();
    }

    async fn finish(&self, cause: Option<ConnectionError>, handler: Option<&dyn MessageHandler<P>>) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            sink.close().await.ok();
        }
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let cause = cause.or_else(|| self.take_requested_cause());
        let closed = ConnectionClosed {
            cause: cause.map(Arc::new),
        };
        let first = self.closed_tx.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(closed.clone());
            true
        });
        if !first {
            return;
        }

        info!("Connection {} closed: {}", self.name, closed.reason());
        if let Some(handler) = handler {
            handler.handle_closed(&closed).await;
        }
    }
}

#[cfg(test)]
mod connection_test {
    use std::{
        sync::{
            Arc,
            atomic::{
                AtomicUsize,
                Ordering,
            },
        },
        time::Duration,
    };

    use anyhow::Result;
    use async_trait::async_trait;
    use futures_util::{
        SinkExt,
        StreamExt,
    };
    use tokio::sync::mpsc::{
        UnboundedSender,
        unbounded_channel,
    };

    use crate::{
        binding::binding::{
            BindingError,
            BindingType,
            new_binding,
        },
        connection::connection::{
            Connection,
            ConnectionClosed,
            ConnectionConfig,
            ConnectionError,
            Disposition,
            MessageHandler,
        },
        core::uri::Uri,
        message::message::{
            GoodbyeMessage,
            HelloMessage,
            Message,
        },
        transport::{
            direct_transport::{
                DirectTransport,
                direct_transport_pair,
            },
            transport::TransportData,
        },
    };

    struct RecordingHandler {
        messages_tx: UnboundedSender<Message<serde_json::Value>>,
        close_on_goodbye: bool,
        closed_count: AtomicUsize,
    }

    impl RecordingHandler {
        fn new(messages_tx: UnboundedSender<Message<serde_json::Value>>) -> Self {
            Self {
                messages_tx,
                close_on_goodbye: false,
                closed_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MessageHandler<serde_json::Value> for RecordingHandler {
        async fn handle_message(&self, message: Message<serde_json::Value>) -> Result<Disposition> {
            let goodbye = matches!(message, Message::Goodbye(_));
            self.messages_tx.send(message)?;
            if goodbye && self.close_on_goodbye {
                return Ok(Disposition::Close);
            }
            Ok(Disposition::Continue)
        }

        async fn handle_closed(&self, _: &ConnectionClosed) {
            self.closed_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn connection_over(
        transport: DirectTransport,
        idle_timeout: Option<Duration>,
    ) -> Arc<Connection<serde_json::Value>> {
        Connection::new(
            ConnectionConfig {
                name: "test".to_owned(),
                idle_timeout,
            },
            Box::new(transport),
            new_binding(BindingType::Json),
        )
    }

    fn hello() -> Message<serde_json::Value> {
        Message::Hello(HelloMessage {
            realm: Uri::try_from("com.conduit.realm").unwrap(),
            details: Default::default(),
        })
    }

    async fn next_frame(transport: &mut DirectTransport) -> serde_json::Value {
        match transport.next().await {
            Some(Ok(TransportData::Message(data))) => serde_json::from_slice(&data).unwrap(),
            frame => panic!("unexpected frame: {frame:?}"),
        }
    }

    #[tokio::test]
    async fn sends_one_frame_per_message() {
        let (local, mut remote) = direct_transport_pair();
        let connection = connection_over(local, None);
        connection.send_message(hello()).await.unwrap();
        pretty_assertions::assert_eq!(
            next_frame(&mut remote).await,
            serde_json::json!([1, "com.conduit.realm", {}])
        );
    }

    #[tokio::test]
    async fn delivers_inbound_messages_in_order() {
        let (local, mut remote) = direct_transport_pair();
        let connection = connection_over(local, None);
        let (messages_tx, mut messages_rx) = unbounded_channel();
        connection.start(Arc::new(RecordingHandler::new(messages_tx)));

        remote
            .send(TransportData::Message(br#"[1,"com.conduit.one",{}]"#.to_vec()))
            .await
            .unwrap();
        remote
            .send(TransportData::Message(br#"[1,"com.conduit.two",{}]"#.to_vec()))
            .await
            .unwrap();

        assert_matches::assert_matches!(messages_rx.recv().await, Some(Message::Hello(message)) => {
            assert_eq!(message.realm.as_ref(), "com.conduit.one");
        });
        assert_matches::assert_matches!(messages_rx.recv().await, Some(Message::Hello(message)) => {
            assert_eq!(message.realm.as_ref(), "com.conduit.two");
        });
    }

    #[tokio::test]
    async fn aborts_and_terminates_on_parse_failure() {
        let (local, mut remote) = direct_transport_pair();
        let connection = connection_over(local, None);
        let (messages_tx, _messages_rx) = unbounded_channel();
        let handler = Arc::new(RecordingHandler::new(messages_tx));
        connection.start(handler.clone());

        remote
            .send(TransportData::Message(b"not json".to_vec()))
            .await
            .unwrap();

        let abort = next_frame(&mut remote).await;
        assert_eq!(abort[0], serde_json::json!(3));
        assert_eq!(abort[2], serde_json::json!("wamp.error.protocol_violation"));

        let closed = connection.closed().await;
        assert_matches::assert_matches!(closed.cause.as_deref(), Some(ConnectionError::Binding(BindingError::Decoding(_))));
        assert!(connection.is_closed());
        assert_eq!(handler.closed_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn aborts_on_invalid_message_fields() {
        let (local, mut remote) = direct_transport_pair();
        let connection = connection_over(local, None);
        let (messages_tx, _messages_rx) = unbounded_channel();
        connection.start(Arc::new(RecordingHandler::new(messages_tx)));

        remote
            .send(TransportData::Message(br#"[1,"Invalid Realm",{}]"#.to_vec()))
            .await
            .unwrap();

        let abort = next_frame(&mut remote).await;
        assert_eq!(abort[0], serde_json::json!(3));
        assert_matches::assert_matches!(
            connection.closed().await.cause.as_deref(),
            Some(ConnectionError::Message(_))
        );
    }

    #[tokio::test]
    async fn closes_cleanly_when_handler_requests() {
        let (local, mut remote) = direct_transport_pair();
        let connection = connection_over(local, None);
        let (messages_tx, mut messages_rx) = unbounded_channel();
        let mut handler = RecordingHandler::new(messages_tx);
        handler.close_on_goodbye = true;
        connection.start(Arc::new(handler));

        let goodbye = Message::<serde_json::Value>::Goodbye(GoodbyeMessage {
            details: Default::default(),
            reason: Uri::try_from("wamp.close.normal").unwrap(),
        });
        let data = serde_json::to_vec(&goodbye.to_envelope().unwrap()).unwrap();
        remote.send(TransportData::Message(data)).await.unwrap();

        assert_matches::assert_matches!(messages_rx.recv().await, Some(Message::Goodbye(_)));
        assert_matches::assert_matches!(connection.closed().await.cause, None);
        assert_matches::assert_matches!(remote.next().await, None);
    }

    #[tokio::test]
    async fn closes_when_remote_transport_ends() {
        let (local, remote) = direct_transport_pair();
        let connection = connection_over(local, None);
        let (messages_tx, _messages_rx) = unbounded_channel();
        connection.start(Arc::new(RecordingHandler::new(messages_tx)));
        drop(remote);
        assert_matches::assert_matches!(connection.closed().await.cause, None);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_observable_many_times() {
        let (local, _remote) = direct_transport_pair();
        let connection = connection_over(local, None);
        let (messages_tx, _messages_rx) = unbounded_channel();
        let handler = Arc::new(RecordingHandler::new(messages_tx));
        connection.start(handler.clone());

        connection.close().await;
        connection.close().await;

        assert_matches::assert_matches!(connection.closed().await.cause, None);
        assert_matches::assert_matches!(connection.closed().await.cause, None);
        assert_eq!(handler.closed_count.load(Ordering::SeqCst), 1);
        assert_matches::assert_matches!(
            connection.send_message(hello()).await,
            Err(ConnectionError::TransportClosed)
        );
    }

    #[tokio::test]
    async fn write_failure_terminates_connection() {
        let (local, remote) = direct_transport_pair();
        let connection = connection_over(local, None);
        drop(remote);

        assert_matches::assert_matches!(
            connection.send_message(hello()).await,
            Err(ConnectionError::TransportWrite(_))
        );
        assert_matches::assert_matches!(
            connection.send_message(hello()).await,
            Err(ConnectionError::TransportClosed)
        );

        connection.close().await;
        assert_matches::assert_matches!(
            connection.closed().await.cause.as_deref(),
            Some(ConnectionError::TransportWrite(_))
        );
    }

    #[tokio::test]
    async fn times_out_without_inbound_frames() {
        let (local, _remote) = direct_transport_pair();
        let connection = connection_over(local, Some(Duration::from_millis(50)));
        let (messages_tx, _messages_rx) = unbounded_channel();
        connection.start(Arc::new(RecordingHandler::new(messages_tx)));
        assert_matches::assert_matches!(
            connection.closed().await.cause.as_deref(),
            Some(ConnectionError::TimedOut)
        );
    }
}
