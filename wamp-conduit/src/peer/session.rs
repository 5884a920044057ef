use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    PoisonError,
};

use anyhow::{
    Error,
    Result,
};
use async_trait::async_trait;
use log::{
    debug,
    info,
    trace,
    warn,
};
use tokio::sync::{
    broadcast,
    mpsc::{
        UnboundedReceiver,
        UnboundedSender,
        unbounded_channel,
    },
    oneshot,
};

use crate::{
    connection::connection::{
        Connection,
        ConnectionClosed,
        ConnectionError,
        Disposition,
        MessageHandler,
    },
    core::{
        close::CloseReason,
        error::{
            CallError,
            InteractionError,
            RemoteError,
            error_from_uri_reason_and_message,
        },
        id::{
            Id,
            SequentialIdAllocator,
        },
        payload::Payload,
        types::{
            Dictionary,
            HashMap,
            List,
        },
        uri::Uri,
    },
    message::{
        common::{
            abort_message_for_error,
            goodbye_and_out,
            goodbye_with_close_reason,
            remote_error_for_request,
        },
        envelope::MessageKind,
        message::{
            CallMessage,
            ErrorMessage,
            EventMessage,
            HelloMessage,
            InvocationMessage,
            Message,
            PublishMessage,
            RegisterMessage,
            ResultMessage,
            SubscribeMessage,
            UnregisterMessage,
            UnsubscribeMessage,
            YieldMessage,
        },
    },
    rpc::{
        adapter::{
            RpcResult,
            adapt_failure,
        },
        arguments::RpcCall,
        correlator::{
            PendingHandle,
            RequestCorrelator,
        },
    },
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
enum SessionState {
    #[default]
    Closed,
    Connecting {
        realm: Uri,
    },
    Open {
        session_id: Id,
        realm: Uri,
    },
    Closing,
}

impl SessionState {
    fn allowed_state_transition(&self, next: &Self) -> bool {
        match (self, next) {
            (Self::Closed, Self::Connecting { .. }) => true,
            (Self::Connecting { .. }, Self::Closed) => true,
            (Self::Connecting { .. }, Self::Open { .. }) => true,
            (Self::Open { .. }, Self::Closing) => true,
            (Self::Open { .. }, Self::Closed) => true,
            (Self::Closing, Self::Closed) => true,
            _ => false,
        }
    }
}

/// An event published to a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent<P> {
    pub arguments: List<P>,
    pub arguments_keyword: Dictionary<P>,
    /// Whether the router should acknowledge the publication.
    pub acknowledge: bool,
}

impl<P> Default for PublishedEvent<P> {
    fn default() -> Self {
        Self {
            arguments: Default::default(),
            arguments_keyword: Default::default(),
            acknowledge: false,
        }
    }
}

/// An event received for a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedEvent<P> {
    pub publication: Id,
    pub arguments: List<P>,
    pub arguments_keyword: Dictionary<P>,
    pub details: Dictionary<P>,
}

/// A subscription to a topic.
#[derive(Debug)]
pub struct Subscription<P> {
    /// The subscription ID.
    pub id: Id,
    /// The event receiver channel.
    pub events: broadcast::Receiver<ReceivedEvent<P>>,
}

/// The result of an invocation, produced by a callee.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcYield<P> {
    pub arguments: List<P>,
    pub arguments_keyword: Dictionary<P>,
}

impl<P> Default for RpcYield<P> {
    fn default() -> Self {
        Self {
            arguments: Default::default(),
            arguments_keyword: Default::default(),
        }
    }
}

/// An invocation of a procedure registered by this peer.
///
/// Every invocation should be answered with [`Invocation::respond`].
#[derive(Debug)]
pub struct Invocation<P> {
    pub registration: Id,
    pub arguments: List<P>,
    pub arguments_keyword: Dictionary<P>,
    pub details: Dictionary<P>,
    request: Id,
    connection: Arc<Connection<P>>,
}

impl<P> Invocation<P>
where
    P: Payload,
{
    /// The request ID of the invocation, assigned by the router.
    pub fn request(&self) -> Id {
        self.request
    }

    /// Responds to the invocation with a YIELD or an ERROR.
    pub async fn respond(
        self,
        result: Result<RpcYield<P>, RemoteError<P>>,
    ) -> Result<(), ConnectionError> {
        let message = match result {
            Ok(result) => Message::Yield(YieldMessage {
                invocation_request: self.request,
                options: Default::default(),
                arguments: result.arguments,
                arguments_keyword: result.arguments_keyword,
            }),
            Err(error) => remote_error_for_request(MessageKind::Invocation, self.request, error),
        };
        self.connection.send_message(message).await
    }

    /// Responds to the invocation with an ERROR built from a local failure.
    pub async fn respond_error(self, error: &Error) -> Result<(), ConnectionError> {
        self.respond(Err(RemoteError::from_error(error))).await
    }
}

/// A procedure registered by this peer.
#[derive(Debug)]
pub struct Registration<P> {
    /// The registration ID.
    pub id: Id,
    /// The invocation receiver channel.
    pub invocations: UnboundedReceiver<Invocation<P>>,
}

/// The client side of a WAMP session, bound to one connection.
///
/// Outstanding requests of every kind are tracked by request ID. Responses are delivered to the
/// waiting caller while the inbound message is being handled.
pub struct ClientSession<P> {
    name: String,
    connection: Arc<Connection<P>>,
    request_ids: SequentialIdAllocator,
    state: Mutex<SessionState>,

    join_tx: Mutex<Option<oneshot::Sender<Result<Id>>>>,
    leave_tx: Mutex<Option<oneshot::Sender<()>>>,

    calls: RequestCorrelator<RpcResult<P>, P>,
    publications: RequestCorrelator<Id, P>,
    subscribes: RequestCorrelator<Subscription<P>, P>,
    unsubscribes: RequestCorrelator<(), P>,
    registers: RequestCorrelator<Registration<P>, P>,
    unregisters: RequestCorrelator<(), P>,

    events: Mutex<HashMap<Id, broadcast::Sender<ReceivedEvent<P>>>>,
    invocations: Mutex<HashMap<Id, UnboundedSender<Invocation<P>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<P> ClientSession<P>
where
    P: Payload,
{
    pub fn new(name: String, connection: Arc<Connection<P>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            connection,
            request_ids: SequentialIdAllocator::default(),
            state: Mutex::new(SessionState::default()),
            join_tx: Mutex::new(None),
            leave_tx: Mutex::new(None),
            calls: RequestCorrelator::new("calls"),
            publications: RequestCorrelator::new("publications"),
            subscribes: RequestCorrelator::new("subscriptions"),
            unsubscribes: RequestCorrelator::new("unsubscriptions"),
            registers: RequestCorrelator::new("registrations"),
            unregisters: RequestCorrelator::new("unregistrations"),
            events: Mutex::new(HashMap::default()),
            invocations: Mutex::new(HashMap::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> &Arc<Connection<P>> {
        &self.connection
    }

    /// The session ID assigned by the router, if the session is open.
    pub fn current_session_id(&self) -> Option<Id> {
        match &*lock(&self.state) {
            SessionState::Open { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }

    /// The realm of the session, if the session is open.
    pub fn current_realm(&self) -> Option<Uri> {
        match &*lock(&self.state) {
            SessionState::Open { realm, .. } => Some(realm.clone()),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.current_session_id().is_some()
    }

    fn transition_state(&self, next: SessionState) -> Result<()> {
        let mut state = lock(&self.state);
        if *state == next {
            return Ok(());
        }
        if !state.allowed_state_transition(&next) {
            return Err(Error::msg(format!(
                "invalid state transition from {:?} to {next:?}",
                *state
            )));
        }
        debug!("Peer {} transitioned from {:?} to {next:?}", self.name, *state);
        *state = next;
        Ok(())
    }

    /// Joins a realm, establishing the session.
    pub async fn join(&self, realm: Uri, details: Dictionary<P>) -> Result<Id> {
        self.transition_state(SessionState::Connecting {
            realm: realm.clone(),
        })?;
        let (join_tx, join_rx) = oneshot::channel();
        *lock(&self.join_tx) = Some(join_tx);

        let hello = Message::Hello(HelloMessage { realm, details });
        if let Err(err) = self.connection.send_message(hello).await {
            lock(&self.join_tx).take();
            self.transition_state(SessionState::Closed).ok();
            return Err(err.into());
        }

        let session_id = join_rx
            .await
            .map_err(|_| Error::msg("connection closed before the session was established"))??;
        info!("Peer {} joined realm as session {session_id}", self.name);
        Ok(session_id)
    }

    /// Leaves the realm, closing the session.
    ///
    /// Waits for the router to acknowledge the GOODBYE.
    pub async fn leave(&self, reason: CloseReason) -> Result<()> {
        self.transition_state(SessionState::Closing)?;
        let (leave_tx, leave_rx) = oneshot::channel();
        *lock(&self.leave_tx) = Some(leave_tx);

        if let Err(err) = self
            .connection
            .send_message(goodbye_with_close_reason(reason))
            .await
        {
            lock(&self.leave_tx).take();
            self.session_closed("session closed");
            return Err(err.into());
        }

        // A dropped sender means the connection closed, which also ends the session.
        leave_rx.await.ok();
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), CallError<P>> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CallError::SessionNotOpen)
        }
    }

    async fn request<T>(
        &self,
        correlator: &RequestCorrelator<T, P>,
        message: impl FnOnce(Id) -> Message<P>,
    ) -> Result<PendingHandle<T, P>, CallError<P>> {
        self.ensure_open()?;
        let request = self.request_ids.next_id();
        let pending = correlator.register(request)?;
        if let Err(err) = self.connection.send_message(message(request)).await {
            correlator.discard(request);
            return Err(CallError::Transport(err.to_string()));
        }
        Ok(pending)
    }

    /// Sends a CALL message, returning the pending result.
    pub async fn call(
        &self,
        procedure: Uri,
        call: RpcCall<P>,
    ) -> Result<PendingHandle<RpcResult<P>, P>, CallError<P>> {
        self.request(&self.calls, |request| {
            Message::Call(CallMessage {
                request,
                options: call.options,
                procedure,
                arguments: call.arguments,
                arguments_keyword: call.arguments_keyword,
            })
        })
        .await
    }

    /// Sends a PUBLISH message.
    ///
    /// Returns the publication ID if the publication was acknowledged.
    pub async fn publish(
        &self,
        topic: Uri,
        event: PublishedEvent<P>,
    ) -> Result<Option<Id>, CallError<P>> {
        let mut options = Dictionary::<P>::default();
        if event.acknowledge {
            let acknowledge =
                P::encode(&true).map_err(|err| CallError::ArgumentEncoding(err.to_string()))?;
            options.insert("acknowledge".to_owned(), acknowledge);
        }
        let message = |request| {
            Message::Publish(PublishMessage {
                request,
                options,
                topic,
                arguments: event.arguments,
                arguments_keyword: event.arguments_keyword,
            })
        };

        if event.acknowledge {
            let publication = self.request(&self.publications, message).await?.await?;
            return Ok(Some(publication));
        }

        self.ensure_open()?;
        let request = self.request_ids.next_id();
        self.connection
            .send_message(message(request))
            .await
            .map_err(|err| CallError::Transport(err.to_string()))?;
        Ok(None)
    }

    /// Subscribes to a topic.
    pub async fn subscribe(&self, topic: Uri) -> Result<Subscription<P>, CallError<P>> {
        self.request(&self.subscribes, |request| {
            Message::Subscribe(SubscribeMessage {
                request,
                options: Default::default(),
                topic,
            })
        })
        .await?
        .await
    }

    /// Unsubscribes from a topic.
    ///
    /// Events for the subscription stop being delivered immediately.
    pub async fn unsubscribe(&self, subscription: Id) -> Result<(), CallError<P>> {
        lock(&self.events).remove(&subscription);
        self.request(&self.unsubscribes, |request| {
            Message::Unsubscribe(UnsubscribeMessage {
                request,
                subscribed_subscription: subscription,
            })
        })
        .await?
        .await
    }

    /// Registers a procedure.
    pub async fn register(&self, procedure: Uri) -> Result<Registration<P>, CallError<P>> {
        self.request(&self.registers, |request| {
            Message::Register(RegisterMessage {
                request,
                options: Default::default(),
                procedure,
            })
        })
        .await?
        .await
    }

    /// Unregisters a procedure.
    ///
    /// Invocations for the registration stop being delivered immediately.
    pub async fn unregister(&self, registration: Id) -> Result<(), CallError<P>> {
        lock(&self.invocations).remove(&registration);
        self.request(&self.unregisters, |request| {
            Message::Unregister(UnregisterMessage {
                request,
                registered_registration: registration,
            })
        })
        .await?
        .await
    }

    fn session_closed(&self, reason: &str) {
        *lock(&self.state) = SessionState::Closed;
        lock(&self.join_tx).take();
        if let Some(leave_tx) = lock(&self.leave_tx).take() {
            leave_tx.send(()).ok();
        }
        let error = CallError::ConnectionLost(reason.to_owned());
        self.calls.reject_all(error.clone());
        self.publications.reject_all(error.clone());
        self.subscribes.reject_all(error.clone());
        self.unsubscribes.reject_all(error.clone());
        self.registers.reject_all(error.clone());
        self.unregisters.reject_all(error);
        lock(&self.events).clear();
        lock(&self.invocations).clear();
    }

    async fn protocol_violation(&self, message: &Message<P>) -> Result<Disposition> {
        let error: Error = InteractionError::ProtocolViolation(format!(
            "received {} message in an invalid state",
            message.message_name()
        ))
        .into();
        warn!("Peer {} aborting session: {error}", self.name);
        // The transport may already be gone.
        self.connection
            .send_message(abort_message_for_error(&error))
            .await
            .ok();
        self.session_closed("protocol violation");
        Ok(Disposition::Close)
    }

    async fn handle_connecting(&self, message: Message<P>) -> Result<Disposition> {
        match message {
            Message::Welcome(welcome) => {
                let realm = match &*lock(&self.state) {
                    SessionState::Connecting { realm } => realm.clone(),
                    _ => return Err(Error::msg("session is not in the connecting state")),
                };
                self.transition_state(SessionState::Open {
                    session_id: welcome.session,
                    realm,
                })?;
                if let Some(join_tx) = lock(&self.join_tx).take() {
                    join_tx.send(Ok(welcome.session)).ok();
                }
                Ok(Disposition::Continue)
            }
            Message::Abort(abort) => {
                self.transition_state(SessionState::Closed)?;
                let message = abort
                    .details
                    .get("message")
                    .and_then(|message| message.decode::<String>().ok())
                    .unwrap_or_default();
                if let Some(join_tx) = lock(&self.join_tx).take() {
                    join_tx
                        .send(Err(error_from_uri_reason_and_message(&abort.reason, message)))
                        .ok();
                }
                Ok(Disposition::Continue)
            }
            message => self.protocol_violation(&message).await,
        }
    }

    async fn handle_established(&self, message: Message<P>) -> Result<Disposition> {
        match message {
            Message::Goodbye(goodbye) => {
                info!(
                    "Peer {} session closed by router: {}",
                    self.name, goodbye.reason
                );
                self.session_closed("session closed by router");
                self.connection.send_message(goodbye_and_out()).await?;
                Ok(Disposition::Continue)
            }
            Message::Abort(abort) => {
                warn!("Peer {} session aborted by router: {}", self.name, abort.reason);
                self.session_closed("session aborted by router");
                Ok(Disposition::Close)
            }
            message => self.dispatch(message).await,
        }
    }

    async fn handle_closing(&self, message: Message<P>) -> Result<Disposition> {
        match message {
            Message::Goodbye(_) | Message::Abort(_) => {
                self.session_closed("session closed");
                Ok(Disposition::Continue)
            }
            message => self.dispatch(message).await,
        }
    }

    async fn dispatch(&self, message: Message<P>) -> Result<Disposition> {
        match message {
            Message::Result(result) => self.handle_result(result),
            Message::Error(error) => self.handle_error(error),
            Message::Published(published) => {
                self.publications
                    .resolve(published.publish_request, published.publication);
            }
            Message::Subscribed(subscribed) => {
                let events = lock(&self.events)
                    .entry(subscribed.subscription)
                    .or_insert_with(|| broadcast::channel(64).0)
                    .subscribe();
                self.subscribes.resolve(
                    subscribed.subscribe_request,
                    Subscription {
                        id: subscribed.subscription,
                        events,
                    },
                );
            }
            Message::Unsubscribed(unsubscribed) => {
                self.unsubscribes.resolve(unsubscribed.unsubscribe_request, ());
            }
            Message::Registered(registered) => {
                let (invocations_tx, invocations_rx) = unbounded_channel();
                lock(&self.invocations).insert(registered.registration, invocations_tx);
                self.registers.resolve(
                    registered.register_request,
                    Registration {
                        id: registered.registration,
                        invocations: invocations_rx,
                    },
                );
            }
            Message::Unregistered(unregistered) => {
                self.unregisters
                    .resolve(unregistered.unregister_request, ());
            }
            Message::Event(event) => self.handle_event(event),
            Message::Invocation(invocation) => self.handle_invocation(invocation).await?,
            Message::Interrupt(interrupt) => {
                debug!(
                    "Peer {} ignoring INTERRUPT for invocation {}",
                    self.name, interrupt.invocation_request
                );
            }
            message => return self.protocol_violation(&message).await,
        }
        Ok(Disposition::Continue)
    }

    fn handle_result(&self, result: ResultMessage<P>) {
        self.calls.resolve(
            result.call_request,
            RpcResult {
                arguments: result.yield_arguments,
                arguments_keyword: result.yield_arguments_keyword,
                details: result.details,
            },
        );
    }

    fn handle_error(&self, error: ErrorMessage<P>) {
        let request = error.request;
        let request_kind = error.request_kind;
        let error = CallError::Remote(adapt_failure(error));
        match request_kind {
            MessageKind::Call => self.calls.reject(request, error),
            MessageKind::Publish => self.publications.reject(request, error),
            MessageKind::Subscribe => self.subscribes.reject(request, error),
            MessageKind::Unsubscribe => self.unsubscribes.reject(request, error),
            MessageKind::Register => self.registers.reject(request, error),
            MessageKind::Unregister => self.unregisters.reject(request, error),
            kind => {
                warn!("Peer {} received ERROR for unexpected {kind} request", self.name);
                false
            }
        };
    }

    fn handle_event(&self, event: EventMessage<P>) {
        let events = lock(&self.events);
        let events = match events.get(&event.subscribed_subscription) {
            Some(events) => events,
            None => {
                debug!(
                    "Peer {} dropping event for unknown subscription {}",
                    self.name, event.subscribed_subscription
                );
                return;
            }
        };
        // No receivers is not a failure; the subscriber may simply not be listening.
        events
            .send(ReceivedEvent {
                publication: event.published_publication,
                arguments: event.publish_arguments,
                arguments_keyword: event.publish_arguments_keyword,
                details: event.details,
            })
            .ok();
    }

    async fn handle_invocation(&self, invocation: InvocationMessage<P>) -> Result<()> {
        let request = invocation.request;
        let delivered = match lock(&self.invocations).get(&invocation.registered_registration) {
            Some(invocations_tx) => invocations_tx
                .send(Invocation {
                    registration: invocation.registered_registration,
                    arguments: invocation.call_arguments,
                    arguments_keyword: invocation.call_arguments_keyword,
                    details: invocation.details,
                    request,
                    connection: self.connection.clone(),
                })
                .is_ok(),
            None => false,
        };
        if !delivered {
            self.connection
                .send_message(remote_error_for_request(
                    MessageKind::Invocation,
                    request,
                    RemoteError::from_error(&InteractionError::NoSuchRegistration.into()),
                ))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<P> MessageHandler<P> for ClientSession<P>
where
    P: Payload,
{
    async fn handle_message(&self, message: Message<P>) -> Result<Disposition> {
        trace!(
            "Peer {} handling {} message",
            self.name,
            message.message_name()
        );
        let state = lock(&self.state).clone();
        match state {
            SessionState::Closed => {
                warn!(
                    "Peer {} ignoring {} message without an open session",
                    self.name,
                    message.message_name()
                );
                Ok(Disposition::Continue)
            }
            SessionState::Connecting { .. } => self.handle_connecting(message).await,
            SessionState::Open { .. } => self.handle_established(message).await,
            SessionState::Closing => self.handle_closing(message).await,
        }
    }

    async fn handle_closed(&self, closed: &ConnectionClosed) {
        let reason = closed.reason();
        info!("Peer {} connection closed: {reason}", self.name);
        self.session_closed(&reason);
        self.calls.fail_all(&reason);
        self.publications.fail_all(&reason);
        self.subscribes.fail_all(&reason);
        self.unsubscribes.fail_all(&reason);
        self.registers.fail_all(&reason);
        self.unregisters.fail_all(&reason);
    }
}

#[cfg(test)]
mod session_test {
    use std::sync::{
        Arc,
        Mutex,
    };

    use futures_util::{
        SinkExt,
        StreamExt,
    };

    use crate::{
        binding::binding::{
            Binding,
            BindingType,
            new_binding,
        },
        connection::connection::{
            Connection,
            ConnectionConfig,
        },
        core::{
            id::Id,
            uri::Uri,
        },
        message::message::{
            Message,
            ResultMessage,
            WelcomeMessage,
        },
        peer::session::ClientSession,
        rpc::arguments::RpcCall,
        transport::{
            direct_transport::{
                DirectTransport,
                direct_transport_pair,
            },
            transport::TransportData,
        },
    };

    type Payload = serde_json::Value;

    struct TestRouter {
        transport: DirectTransport,
        binding: Arc<dyn Binding<Payload>>,
    }

    impl TestRouter {
        async fn send(&mut self, message: Message<Payload>) {
            let data = self
                .binding
                .format(&message.to_envelope().unwrap())
                .unwrap();
            self.transport
                .send(TransportData::Message(data))
                .await
                .unwrap();
        }

        async fn receive(&mut self) -> Message<Payload> {
            match self.transport.next().await {
                Some(Ok(TransportData::Message(data))) => {
                    Message::from_envelope(self.binding.parse(&data).unwrap()).unwrap()
                }
                data => panic!("unexpected transport data: {data:?}"),
            }
        }
    }

    async fn open_session() -> (Arc<ClientSession<Payload>>, TestRouter) {
        let (peer_transport, router_transport) = direct_transport_pair();
        let connection = Connection::new(
            ConnectionConfig::default(),
            Box::new(peer_transport),
            new_binding(BindingType::Json),
        );
        let session = ClientSession::new("peer".to_owned(), connection.clone());
        connection.start(session.clone());
        let mut router = TestRouter {
            transport: router_transport,
            binding: new_binding(BindingType::Json),
        };

        let join = tokio::spawn({
            let session = session.clone();
            async move {
                session
                    .join(Uri::try_from("com.conduit.test").unwrap(), Default::default())
                    .await
            }
        });
        assert_matches::assert_matches!(router.receive().await, Message::Hello(_));
        router
            .send(Message::Welcome(WelcomeMessage {
                session: Id::try_from(10u64).unwrap(),
                details: Default::default(),
            }))
            .await;
        assert_matches::assert_matches!(join.await.unwrap(), Ok(id) => {
            assert_eq!(id.value(), 10);
        });
        (session, router)
    }

    async fn call_request(router: &mut TestRouter) -> Id {
        match router.receive().await {
            Message::Call(message) => message.request,
            message => panic!("expected CALL, got {}", message.message_name()),
        }
    }

    fn result(request: Id, value: u64) -> Message<Payload> {
        Message::Result(ResultMessage {
            call_request: request,
            details: Default::default(),
            yield_arguments: vec![serde_json::json!(value)],
            yield_arguments_keyword: Default::default(),
        })
    }

    #[tokio::test]
    async fn resumes_callers_in_wire_order() {
        let (session, mut router) = open_session().await;
        let procedure = Uri::try_from("com.conduit.order").unwrap();

        let first = session
            .call(procedure.clone(), RpcCall::default())
            .await
            .unwrap();
        let first_request = call_request(&mut router).await;
        let second = session.call(procedure, RpcCall::default()).await.unwrap();
        let second_request = call_request(&mut router).await;

        let order = Arc::new(Mutex::new(Vec::new()));
        // The second caller starts waiting first, so only the order of results decides who wakes
        // first.
        let second_waiter = tokio::spawn({
            let order = order.clone();
            async move {
                let result = second.await.unwrap();
                order.lock().unwrap().push(result.arguments);
            }
        });
        let first_waiter = tokio::spawn({
            let order = order.clone();
            async move {
                let result = first.await.unwrap();
                order.lock().unwrap().push(result.arguments);
            }
        });
        tokio::task::yield_now().await;

        router.send(result(first_request, 1)).await;
        router.send(result(second_request, 2)).await;
        first_waiter.await.unwrap();
        second_waiter.await.unwrap();

        pretty_assertions::assert_eq!(
            *order.lock().unwrap(),
            vec![vec![serde_json::json!(1)], vec![serde_json::json!(2)]]
        );
    }

    #[tokio::test]
    async fn late_result_after_connection_loss_is_ignored() {
        let (session, mut router) = open_session().await;
        let pending = session
            .call(Uri::try_from("com.conduit.late").unwrap(), RpcCall::default())
            .await
            .unwrap();
        let request = call_request(&mut router).await;

        session.connection().close().await;
        assert_matches::assert_matches!(pending.await, Err(_));
        assert!(!session.calls.resolve(
            request,
            crate::rpc::adapter::RpcResult {
                arguments: Vec::new(),
                arguments_keyword: Default::default(),
                details: Default::default(),
            }
        ));
    }
}
