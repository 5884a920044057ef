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
    error,
    info,
    trace,
    warn,
};

use crate::{
    connection::connection::{
        Connection,
        ConnectionClosed,
        Disposition,
        MessageHandler,
    },
    core::{
        error::{
            CallError,
            InteractionError,
        },
        id::Id,
        payload::Payload,
        roles::roles_dictionary,
        types::Dictionary,
    },
    message::{
        common::{
            abort_message_for_error,
            error_for_request,
            goodbye_and_out,
            remote_error_for_request,
        },
        envelope::MessageKind,
        message::{
            CallMessage,
            EventMessage,
            HelloMessage,
            InvocationMessage,
            Message,
            PublishMessage,
            PublishedMessage,
            RegisterMessage,
            RegisteredMessage,
            ResultMessage,
            SubscribeMessage,
            SubscribedMessage,
            UnregisterMessage,
            UnregisteredMessage,
            UnsubscribeMessage,
            UnsubscribedMessage,
            WelcomeMessage,
            YieldMessage,
        },
    },
    router::{
        context::RouterContext,
        procedure::LocalInvocation,
        realm::{
            ProcedureRoute,
            Realm,
            RealmSession,
        },
    },
    rpc::adapter::{
        RpcResult,
        adapt_failure,
    },
};

#[derive(Clone)]
enum RouterSessionState<P> {
    Accepted,
    Handshaking,
    Joined {
        realm: Arc<Realm<P>>,
        session: RealmSession<P>,
    },
    Active {
        realm: Arc<Realm<P>>,
        session: RealmSession<P>,
    },
    Closing,
    Closed,
}

impl<P> RouterSessionState<P> {
    fn name(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Handshaking => "handshaking",
            Self::Joined { .. } => "joined",
            Self::Active { .. } => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    fn allowed_state_transition(&self, next: &Self) -> bool {
        match (self, next) {
            (Self::Accepted, Self::Handshaking) => true,
            (Self::Closed, Self::Handshaking) => true,
            (Self::Handshaking, Self::Joined { .. }) => true,
            (Self::Handshaking, Self::Closed) => true,
            (Self::Joined { .. }, Self::Active { .. }) => true,
            (Self::Joined { .. }, Self::Closed) => true,
            (Self::Active { .. }, Self::Closing) => true,
            (Self::Active { .. }, Self::Closed) => true,
            (Self::Closing, Self::Closed) => true,
            _ => false,
        }
    }

    fn joined(&self) -> Option<(Arc<Realm<P>>, RealmSession<P>)>
    where
        P: Clone,
    {
        match self {
            Self::Joined { realm, session } | Self::Active { realm, session } => {
                Some((realm.clone(), session.clone()))
            }
            _ => None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The router end of a WAMP session, handling every message received on one connection.
pub struct RouterSession<P> {
    context: Arc<RouterContext<P>>,
    connection: Arc<Connection<P>>,
    state: Mutex<RouterSessionState<P>>,
}

impl<P> RouterSession<P>
where
    P: Payload,
{
    pub fn new(context: Arc<RouterContext<P>>, connection: Arc<Connection<P>>) -> Arc<Self> {
        Arc::new(Self {
            context,
            connection,
            state: Mutex::new(RouterSessionState::Accepted),
        })
    }

    /// The session ID, if the session is joined to a realm.
    pub fn session_id(&self) -> Option<Id> {
        lock(&self.state).joined().map(|(_, session)| session.id)
    }

    fn transition_state(&self, next: RouterSessionState<P>) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.allowed_state_transition(&next) {
            return Err(InteractionError::ProtocolViolation(format!(
                "invalid state transition from {} to {}",
                state.name(),
                next.name()
            ))
            .into());
        }
        debug!(
            "Router session on connection {} transitioned from {} to {}",
            self.connection.name(),
            state.name(),
            next.name()
        );
        *state = next;
        Ok(())
    }

    async fn send_message(&self, message: Message<P>) -> Result<()> {
        self.connection
            .send_message(message)
            .await
            .map_err(Error::new)
    }

    async fn abort(&self, error: Error) -> Result<Disposition> {
        warn!(
            "Router session on connection {} aborting: {error}",
            self.connection.name()
        );
        self.leave_realm(&error.to_string(), RouterSessionState::Closed);
        self.send_message(abort_message_for_error(&error)).await.ok();
        Ok(Disposition::Close)
    }

    /// Removes the session from its realm, if joined, and moves to `next`.
    ///
    /// Registrations and subscriptions of the session are removed, and every invocation still
    /// waiting on the session is failed.
    fn leave_realm(&self, reason: &str, next: RouterSessionState<P>) {
        let previous = std::mem::replace(&mut *lock(&self.state), next);
        if let Some((realm, session)) = previous.joined() {
            realm.leave(session.id);
            let failed = session.invocations.fail_all(reason);
            info!(
                "Router session {} left realm {} ({failed} pending invocations failed)",
                session.id,
                realm.uri()
            );
        }
    }

    async fn handle_hello(&self, message: HelloMessage<P>) -> Result<Disposition> {
        self.transition_state(RouterSessionState::Handshaking)?;
        let realm = match self.context.realm(&message.realm) {
            Ok(realm) => realm,
            Err(err) => {
                self.transition_state(RouterSessionState::Closed)?;
                return self.abort(err).await;
            }
        };

        let session = realm.join(self.connection.clone()).await;
        let id = session.id;
        self.transition_state(RouterSessionState::Joined {
            realm: realm.clone(),
            session: session.clone(),
        })?;

        let mut details = Dictionary::<P>::default();
        details.insert("agent".to_owned(), P::encode(&self.context.agent)?);
        details.insert(
            "roles".to_owned(),
            roles_dictionary::<P, _>(self.context.roles.iter().map(|role| role.name()))?,
        );
        if let Err(err) = self
            .send_message(Message::Welcome(WelcomeMessage {
                session: id,
                details,
            }))
            .await
        {
            self.leave_realm(&err.to_string(), RouterSessionState::Closed);
            return Err(err);
        }

        self.transition_state(RouterSessionState::Active {
            realm: realm.clone(),
            session,
        })?;
        info!("Router session {id} joined realm {}", realm.uri());
        Ok(Disposition::Continue)
    }

    async fn handle_active(
        &self,
        realm: Arc<Realm<P>>,
        session: RealmSession<P>,
        message: Message<P>,
    ) -> Result<Disposition> {
        match message {
            Message::Goodbye(message) => {
                debug!(
                    "Router session {} received GOODBYE: {}",
                    session.id, message.reason
                );
                self.leave_realm(message.reason.as_ref(), RouterSessionState::Closing);
                self.send_message(goodbye_and_out()).await?;
                self.transition_state(RouterSessionState::Closed)?;
                Ok(Disposition::Continue)
            }
            Message::Abort(message) => {
                warn!(
                    "Router session {} aborted by peer: {}",
                    session.id, message.reason
                );
                self.leave_realm(message.reason.as_ref(), RouterSessionState::Closed);
                Ok(Disposition::Close)
            }
            Message::Call(message) => {
                self.handle_call(&realm, &session, message).await?;
                Ok(Disposition::Continue)
            }
            Message::Yield(message) => {
                self.handle_yield(&session, message);
                Ok(Disposition::Continue)
            }
            Message::Error(message) if message.request_kind == MessageKind::Invocation => {
                let request = message.request;
                session
                    .invocations
                    .reject(request, CallError::Remote(adapt_failure(message)));
                Ok(Disposition::Continue)
            }
            Message::Register(message) => {
                self.handle_register(&realm, &session, message).await?;
                Ok(Disposition::Continue)
            }
            Message::Unregister(message) => {
                self.handle_unregister(&realm, &session, message).await?;
                Ok(Disposition::Continue)
            }
            Message::Subscribe(message) => {
                self.handle_subscribe(&realm, &session, message).await?;
                Ok(Disposition::Continue)
            }
            Message::Unsubscribe(message) => {
                self.handle_unsubscribe(&realm, &session, message).await?;
                Ok(Disposition::Continue)
            }
            Message::Publish(message) => {
                self.handle_publish(&realm, &session, message).await?;
                Ok(Disposition::Continue)
            }
            Message::Cancel(message) => {
                trace!(
                    "Router session {} ignoring CANCEL for call {}",
                    session.id, message.call_request
                );
                Ok(Disposition::Continue)
            }
            message => {
                self.abort(
                    InteractionError::ProtocolViolation(format!(
                        "received {} message on an active session",
                        message.message_name()
                    ))
                    .into(),
                )
                .await
            }
        }
    }

    async fn handle_call(
        &self,
        realm: &Realm<P>,
        session: &RealmSession<P>,
        message: CallMessage<P>,
    ) -> Result<()> {
        let request = message.request;
        match realm.procedure(&message.procedure) {
            None => {
                self.send_message(error_for_request(
                    MessageKind::Call,
                    request,
                    &InteractionError::NoSuchProcedure.into(),
                ))
                .await
            }
            Some(ProcedureRoute::Local { procedure, .. }) => {
                let caller = self.connection.clone();
                let invocation = LocalInvocation {
                    caller: session.id,
                    arguments: message.arguments,
                    arguments_keyword: message.arguments_keyword,
                };
                tokio::spawn(async move {
                    let response = match procedure.invoke(invocation).await {
                        Ok(result) => Message::Result(ResultMessage {
                            call_request: request,
                            details: Default::default(),
                            yield_arguments: result.arguments,
                            yield_arguments_keyword: result.arguments_keyword,
                        }),
                        Err(err) => remote_error_for_request(MessageKind::Call, request, err),
                    };
                    if let Err(err) = caller.send_message(response).await {
                        debug!("Failed to send result of call {request}: {err}");
                    }
                });
                Ok(())
            }
            Some(ProcedureRoute::Remote {
                registration,
                callee,
            }) => {
                let invocation_request = callee.request_ids.next_id();
                let pending = match callee.invocations.register(invocation_request) {
                    Ok(pending) => pending,
                    Err(err) => {
                        warn!("Failed to route call {request} to session {}: {err}", callee.id);
                        return self
                            .send_message(error_for_request(
                                MessageKind::Call,
                                request,
                                &InteractionError::Canceled.into(),
                            ))
                            .await;
                    }
                };
                let invocation = Message::Invocation(InvocationMessage {
                    request: invocation_request,
                    registered_registration: registration,
                    details: Default::default(),
                    call_arguments: message.arguments,
                    call_arguments_keyword: message.arguments_keyword,
                });
                if let Err(err) = callee.connection.send_message(invocation).await {
                    warn!("Failed to send invocation to session {}: {err}", callee.id);
                    callee.invocations.discard(invocation_request);
                    return self
                        .send_message(error_for_request(
                            MessageKind::Call,
                            request,
                            &InteractionError::Canceled.into(),
                        ))
                        .await;
                }

                let caller = self.connection.clone();
                tokio::spawn(async move {
                    let response = match pending.await {
                        Ok(result) => Message::Result(ResultMessage {
                            call_request: request,
                            details: Default::default(),
                            yield_arguments: result.arguments,
                            yield_arguments_keyword: result.arguments_keyword,
                        }),
                        Err(CallError::Remote(err)) => {
                            remote_error_for_request(MessageKind::Call, request, err)
                        }
                        Err(err) => {
                            debug!("Invocation for call {request} failed: {err}");
                            error_for_request(
                                MessageKind::Call,
                                request,
                                &InteractionError::Canceled.into(),
                            )
                        }
                    };
                    if let Err(err) = caller.send_message(response).await {
                        debug!("Failed to send result of call {request}: {err}");
                    }
                });
                Ok(())
            }
        }
    }

    fn handle_yield(&self, session: &RealmSession<P>, message: YieldMessage<P>) {
        session.invocations.resolve(
            message.invocation_request,
            RpcResult {
                arguments: message.arguments,
                arguments_keyword: message.arguments_keyword,
                details: message.options,
            },
        );
    }

    async fn handle_register(
        &self,
        realm: &Realm<P>,
        session: &RealmSession<P>,
        message: RegisterMessage<P>,
    ) -> Result<()> {
        match realm.register(session.id, message.procedure.clone()).await {
            Ok(registration) => {
                self.send_message(Message::Registered(RegisteredMessage {
                    register_request: message.request,
                    registration,
                }))
                .await?;
                realm.activate_registration(registration);
                debug!(
                    "Router session {} registered {} as {registration}",
                    session.id, message.procedure
                );
                Ok(())
            }
            Err(err) => {
                self.send_message(error_for_request(
                    MessageKind::Register,
                    message.request,
                    &err,
                ))
                .await
            }
        }
    }

    async fn handle_unregister(
        &self,
        realm: &Realm<P>,
        session: &RealmSession<P>,
        message: UnregisterMessage,
    ) -> Result<()> {
        match realm.unregister(session.id, message.registered_registration) {
            Ok(()) => {
                self.send_message(Message::Unregistered(UnregisteredMessage {
                    unregister_request: message.request,
                }))
                .await
            }
            Err(err) => {
                self.send_message(error_for_request(
                    MessageKind::Unregister,
                    message.request,
                    &err,
                ))
                .await
            }
        }
    }

    async fn handle_subscribe(
        &self,
        realm: &Realm<P>,
        session: &RealmSession<P>,
        message: SubscribeMessage<P>,
    ) -> Result<()> {
        let subscription = realm.subscribe(session.id, message.topic.clone()).await;
        self.send_message(Message::Subscribed(SubscribedMessage {
            subscribe_request: message.request,
            subscription,
        }))
        .await?;
        realm.activate_subscription(session.id, subscription);
        debug!(
            "Router session {} subscribed to {} as {subscription}",
            session.id, message.topic
        );
        Ok(())
    }

    async fn handle_unsubscribe(
        &self,
        realm: &Realm<P>,
        session: &RealmSession<P>,
        message: UnsubscribeMessage,
    ) -> Result<()> {
        match realm.unsubscribe(session.id, message.subscribed_subscription) {
            Ok(()) => {
                self.send_message(Message::Unsubscribed(UnsubscribedMessage {
                    unsubscribe_request: message.request,
                }))
                .await
            }
            Err(err) => {
                self.send_message(error_for_request(
                    MessageKind::Unsubscribe,
                    message.request,
                    &err,
                ))
                .await
            }
        }
    }

    async fn handle_publish(
        &self,
        realm: &Realm<P>,
        session: &RealmSession<P>,
        message: PublishMessage<P>,
    ) -> Result<()> {
        let acknowledge = message
            .options
            .get("acknowledge")
            .and_then(|acknowledge| acknowledge.decode::<bool>().ok())
            .unwrap_or(false);
        let publication = realm.publication_id().await;
        if let Some((subscription, subscribers)) = realm.subscribers(&message.topic, session.id) {
            for subscriber in subscribers {
                let event = Message::Event(EventMessage {
                    subscribed_subscription: subscription,
                    published_publication: publication,
                    details: Default::default(),
                    publish_arguments: message.arguments.clone(),
                    publish_arguments_keyword: message.arguments_keyword.clone(),
                });
                if let Err(err) = subscriber.connection.send_message(event).await {
                    warn!(
                        "Failed to deliver publication {publication} to session {}: {err}",
                        subscriber.id
                    );
                }
            }
        }
        if acknowledge {
            self.send_message(Message::Published(PublishedMessage {
                publish_request: message.request,
                publication,
            }))
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<P> MessageHandler<P> for RouterSession<P>
where
    P: Payload,
{
    async fn handle_message(&self, message: Message<P>) -> Result<Disposition> {
        trace!(
            "Router session on connection {} handling {} message",
            self.connection.name(),
            message.message_name()
        );
        let state = lock(&self.state).clone();
        match state {
            RouterSessionState::Accepted | RouterSessionState::Closed => match message {
                Message::Hello(message) => self.handle_hello(message).await,
                message => {
                    self.abort(
                        InteractionError::ProtocolViolation(format!(
                            "received {} message before HELLO",
                            message.message_name()
                        ))
                        .into(),
                    )
                    .await
                }
            },
            RouterSessionState::Active { realm, session } => {
                self.handle_active(realm, session, message).await
            }
            state => {
                error!(
                    "Router session on connection {} received {} message in the {} state",
                    self.connection.name(),
                    message.message_name(),
                    state.name()
                );
                self.abort(
                    InteractionError::ProtocolViolation(format!(
                        "received {} message during a state transition",
                        message.message_name()
                    ))
                    .into(),
                )
                .await
            }
        }
    }

    async fn handle_closed(&self, closed: &ConnectionClosed) {
        let reason = closed.reason();
        debug!(
            "Router session on connection {} closed: {reason}",
            self.connection.name()
        );
        self.leave_realm(&reason, RouterSessionState::Closed);
    }
}

#[cfg(test)]
mod session_test {
    use std::sync::Arc;

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
            close::CloseReason,
            error::{
                CallError,
                InteractionError,
            },
            id::Id,
            roles::RouterRole,
            types::{
                Dictionary,
                HashSet,
            },
            uri::Uri,
        },
        message::message::{
            CallMessage,
            GoodbyeMessage,
            HelloMessage,
            Message,
            PublishMessage,
            RegisterMessage,
            SubscribeMessage,
        },
        router::{
            context::RouterContext,
            realm::{
                Realm,
                RealmConfig,
                RealmContainer,
            },
            session::RouterSession,
        },
        transport::{
            direct_transport::{
                DirectTransport,
                direct_transport_pair,
            },
            transport::TransportData,
        },
    };

    type Payload = serde_json::Value;

    struct TestPeer {
        transport: DirectTransport,
        binding: Arc<dyn Binding<Payload>>,
    }

    impl TestPeer {
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

        async fn receive(&mut self) -> Option<Message<Payload>> {
            match self.transport.next().await? {
                Ok(TransportData::Message(data)) => {
                    Some(Message::from_envelope(self.binding.parse(&data).unwrap()).unwrap())
                }
                _ => None,
            }
        }
    }

    fn realm_uri() -> Uri {
        Uri::try_from("com.conduit.test").unwrap()
    }

    fn start() -> (Arc<Connection<Payload>>, TestPeer) {
        let (connection, _, peer) = start_in_realm();
        (connection, peer)
    }

    fn start_in_realm() -> (Arc<Connection<Payload>>, Arc<Realm<Payload>>, TestPeer) {
        let mut realms = RealmContainer::default();
        realms.insert(Realm::new(RealmConfig {
            name: "test".to_owned(),
            uri: realm_uri(),
        }));
        let realm = realms.get(&realm_uri()).unwrap();
        let context = RouterContext::new(
            "test-router".to_owned(),
            HashSet::from_iter([RouterRole::Dealer, RouterRole::Broker]),
            ConnectionConfig::default(),
            realms,
        );
        let (router_transport, peer_transport) = direct_transport_pair();
        let connection = Connection::new(
            ConnectionConfig::default(),
            Box::new(router_transport),
            new_binding(BindingType::Json),
        );
        connection.start(RouterSession::new(context, connection.clone()));
        (
            connection,
            realm,
            TestPeer {
                transport: peer_transport,
                binding: new_binding(BindingType::Json),
            },
        )
    }

    fn hello(realm: Uri) -> Message<Payload> {
        Message::Hello(HelloMessage {
            realm,
            details: Default::default(),
        })
    }

    #[tokio::test]
    async fn welcomes_session_with_router_details() {
        let (_connection, mut peer) = start();
        peer.send(hello(realm_uri())).await;
        assert_matches::assert_matches!(peer.receive().await, Some(Message::Welcome(message)) => {
            assert_eq!(message.details.get("agent"), Some(&serde_json::json!("test-router")));
            assert_matches::assert_matches!(message.details.get("roles"), Some(serde_json::Value::Object(roles)) => {
                assert!(roles.contains_key("dealer"));
                assert!(roles.contains_key("broker"));
            });
        });
    }

    #[tokio::test]
    async fn aborts_unknown_realm() {
        let (connection, mut peer) = start();
        peer.send(hello(Uri::try_from("com.conduit.missing").unwrap()))
            .await;
        assert_matches::assert_matches!(peer.receive().await, Some(Message::Abort(message)) => {
            assert_eq!(message.reason.as_ref(), "wamp.error.no_such_realm");
        });
        connection.closed().await;
        assert_matches::assert_matches!(peer.receive().await, None);
    }

    #[tokio::test]
    async fn aborts_message_before_hello() {
        let (connection, mut peer) = start();
        peer.send(Message::Subscribe(SubscribeMessage {
            request: Id::try_from(1u64).unwrap(),
            options: Default::default(),
            topic: Uri::try_from("com.conduit.topic").unwrap(),
        }))
        .await;
        assert_matches::assert_matches!(peer.receive().await, Some(Message::Abort(message)) => {
            assert_eq!(message.reason.as_ref(), "wamp.error.protocol_violation");
        });
        connection.closed().await;
    }

    #[tokio::test]
    async fn fails_call_to_missing_procedure() {
        let (_connection, mut peer) = start();
        peer.send(hello(realm_uri())).await;
        assert_matches::assert_matches!(peer.receive().await, Some(Message::Welcome(_)));
        peer.send(Message::Call(CallMessage {
            request: Id::try_from(7u64).unwrap(),
            options: Default::default(),
            procedure: Uri::try_from("com.conduit.missing").unwrap(),
            arguments: Default::default(),
            arguments_keyword: Default::default(),
        }))
        .await;
        assert_matches::assert_matches!(peer.receive().await, Some(Message::Error(message)) => {
            assert_eq!(message.request.value(), 7);
            assert_eq!(
                message.error,
                Uri::for_error(&InteractionError::NoSuchProcedure.into())
            );
        });
    }

    #[tokio::test]
    async fn acknowledges_publication_and_answers_goodbye() {
        let (_connection, mut peer) = start();
        peer.send(hello(realm_uri())).await;
        assert_matches::assert_matches!(peer.receive().await, Some(Message::Welcome(_)));
        peer.send(Message::Publish(PublishMessage {
            request: Id::try_from(3u64).unwrap(),
            options: Dictionary::<Payload>::from_iter([(
                "acknowledge".to_owned(),
                serde_json::Value::Bool(true),
            )]),
            topic: Uri::try_from("com.conduit.topic").unwrap(),
            arguments: Default::default(),
            arguments_keyword: Default::default(),
        }))
        .await;
        assert_matches::assert_matches!(peer.receive().await, Some(Message::Published(message)) => {
            assert_eq!(message.publish_request.value(), 3);
        });

        peer.send(Message::Goodbye(GoodbyeMessage {
            details: Default::default(),
            reason: CloseReason::Normal.uri(),
        }))
        .await;
        assert_matches::assert_matches!(peer.receive().await, Some(Message::Goodbye(message)) => {
            assert_eq!(message.reason, CloseReason::GoodbyeAndOut.uri());
        });

        peer.send(hello(realm_uri())).await;
        assert_matches::assert_matches!(peer.receive().await, Some(Message::Welcome(_)));
    }

    #[tokio::test]
    async fn goodbye_removes_session_from_realm() {
        let (_connection, realm, mut peer) = start_in_realm();
        peer.send(hello(realm_uri())).await;
        assert_matches::assert_matches!(peer.receive().await, Some(Message::Welcome(_)));
        peer.send(Message::Register(RegisterMessage {
            request: Id::try_from(1u64).unwrap(),
            options: Default::default(),
            procedure: Uri::try_from("com.conduit.echo").unwrap(),
        }))
        .await;
        assert_matches::assert_matches!(peer.receive().await, Some(Message::Registered(_)));
        peer.send(Message::Subscribe(SubscribeMessage {
            request: Id::try_from(2u64).unwrap(),
            options: Default::default(),
            topic: Uri::try_from("com.conduit.topic").unwrap(),
        }))
        .await;
        assert_matches::assert_matches!(peer.receive().await, Some(Message::Subscribed(_)));

        let session = realm.sessions().pop().unwrap();
        let pending = session
            .invocations
            .register(session.request_ids.next_id())
            .unwrap();
        assert_matches::assert_matches!(
            realm.procedure(&Uri::try_from("com.conduit.echo").unwrap()),
            Some(_)
        );

        peer.send(Message::Goodbye(GoodbyeMessage {
            details: Default::default(),
            reason: CloseReason::Normal.uri(),
        }))
        .await;
        assert_matches::assert_matches!(peer.receive().await, Some(Message::Goodbye(_)));

        assert_matches::assert_matches!(pending.await, Err(CallError::ConnectionLost(_)));
        assert!(realm.sessions().is_empty());
        assert_matches::assert_matches!(
            realm.procedure(&Uri::try_from("com.conduit.echo").unwrap()),
            None
        );
        assert_matches::assert_matches!(
            realm.subscribers(
                &Uri::try_from("com.conduit.topic").unwrap(),
                Id::try_from(1u64).unwrap()
            ),
            None
        );
    }
}
