use std::sync::{
    Arc,
    Mutex,
    PoisonError,
};

use anyhow::{
    Error,
    Result,
};
use log::{
    info,
    warn,
};
use thiserror::Error;

use crate::{
    binding::binding::{
        BindingType,
        new_binding,
    },
    connection::connection::{
        Connection,
        ConnectionConfig,
    },
    core::{
        close::CloseReason,
        error::CallError,
        id::Id,
        payload::Payload,
        roles::{
            PeerRole,
            roles_dictionary,
        },
        types::{
            Dictionary,
            HashSet,
        },
        uri::Uri,
    },
    peer::{
        connector::Connector,
        marshaler::{
            Marshaler,
            PendingCall,
        },
        session::{
            ClientSession,
            PublishedEvent,
            Registration,
            Subscription,
        },
    },
    rpc::{
        adapter::{
            Raw,
            ResultAdapter,
            RpcResult,
        },
        arguments::IntoRpcCall,
        stub::ServiceStub,
    },
    transport::transport::{
        Transport,
        TransportFactory,
    },
};

const DEFAULT_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

/// Configuration for a [`Peer`].
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Name of the peer, mostly for logging.
    pub name: String,
    /// Agent name, communicated to the router.
    pub agent: String,
    /// Roles implemented by the peer.
    pub roles: HashSet<PeerRole>,
    /// Allowed bindings.
    ///
    /// The actual binding will be selected when the connection with the router is established.
    pub bindings: HashSet<BindingType>,
    /// Configuration for connections made by the peer.
    pub connection: ConnectionConfig,
}

impl PeerConfig {
    fn validate(&self) -> Result<()> {
        if self.bindings.is_empty() {
            return Err(Error::msg("at least one binding is required"));
        }
        Ok(())
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT.to_owned(),
            agent: DEFAULT_AGENT.to_owned(),
            roles: HashSet::from_iter([
                PeerRole::Callee,
                PeerRole::Caller,
                PeerRole::Publisher,
                PeerRole::Subscriber,
            ]),
            bindings: HashSet::from_iter([BindingType::Json, BindingType::MessagePack]),
            // Synchronous calls may wait on a quiet connection indefinitely.
            connection: ConnectionConfig {
                name: "peer".to_owned(),
                idle_timeout: None,
            },
        }
    }
}

/// Error for a peer not being connected for some operation.
#[derive(Debug, Error)]
#[error("peer is not connected")]
pub struct PeerNotConnectedError;

/// A WAMP peer (a.k.a., client) that connects to a WAMP router, establishes sessions in a realm,
/// and interacts with resources in the realm.
///
/// `S` is the type of stream produced when connecting to a router, and `P` is the payload
/// representation of every message.
pub struct Peer<S, P> {
    config: PeerConfig,
    connector: Box<dyn Connector<S>>,
    transport_factory: Box<dyn TransportFactory<S>>,
    session: Mutex<Option<Arc<ClientSession<P>>>>,
}

impl<S, P> Peer<S, P>
where
    S: Send + 'static,
    P: Payload,
{
    /// Creates a new peer.
    pub fn new(
        config: PeerConfig,
        connector: Box<dyn Connector<S>>,
        transport_factory: Box<dyn TransportFactory<S>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            transport_factory,
            session: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// Connects to a router.
    ///
    /// This method merely establishes a network connection with the router. It does not establish
    /// any WAMP session. The connection can be reused across multiple WAMP sessions.
    pub async fn connect(&self, uri: &str) -> Result<()> {
        let connected = self.connector.connect(&self.config, uri).await?;
        info!(
            "WAMP connection established with {uri} for peer {}",
            self.config.name
        );
        let transport = self
            .transport_factory
            .new_transport(connected.stream, connected.binding);
        self.direct_connect(transport, connected.binding).await
    }

    /// Directly connects to a router over an established transport.
    ///
    /// Any active connection is closed first.
    pub async fn direct_connect(
        &self,
        transport: Box<dyn Transport>,
        binding_type: BindingType,
    ) -> Result<()> {
        self.disconnect().await?;

        let connection = Connection::new(
            ConnectionConfig {
                name: self.config.name.clone(),
                ..self.config.connection.clone()
            },
            transport,
            new_binding::<P>(binding_type),
        );
        let session = ClientSession::new(self.config.name.clone(), connection.clone());
        connection.start(session.clone());
        *self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    /// Disconnects from the router, leaving the realm first if a session is open.
    pub async fn disconnect(&self) -> Result<()> {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let session = match session {
            Some(session) => session,
            None => return Ok(()),
        };
        if session.is_open() {
            if let Err(err) = session.leave(CloseReason::Normal).await {
                warn!(
                    "Peer {} failed to leave realm before disconnecting: {err}",
                    self.config.name
                );
            }
        }
        session.connection().close().await;
        Ok(())
    }

    fn session(&self) -> Result<Arc<ClientSession<P>>> {
        match self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(session) if !session.connection().is_closed() => Ok(session.clone()),
            _ => Err(PeerNotConnectedError.into()),
        }
    }

    fn open_session(&self) -> Result<Arc<ClientSession<P>>, CallError<P>> {
        self.session().map_err(|_| CallError::SessionNotOpen)
    }

    /// The current session ID, as given by the router.
    ///
    /// Since a peer is reused across multiple router sessions, this ID is subject to change.
    pub fn current_session_id(&self) -> Option<Id> {
        self.session().ok()?.current_session_id()
    }

    /// Joins the realm, establishing a WAMP session.
    ///
    /// To join a different realm, [`Self::leave_realm`] should be called first.
    pub async fn join_realm(&self, realm: &str) -> Result<()> {
        let session = self.session()?;
        let mut details = Dictionary::<P>::default();
        details.insert("agent".to_owned(), P::encode(&self.config.agent)?);
        details.insert(
            "roles".to_owned(),
            roles_dictionary(self.config.roles.iter().map(|role| role.name()))?,
        );
        session.join(Uri::try_from(realm)?, details).await?;
        Ok(())
    }

    /// Leaves the realm, closing the WAMP session.
    pub async fn leave_realm(&self) -> Result<()> {
        self.session()?.leave(CloseReason::Normal).await
    }

    /// A marshaler for the current session.
    pub fn marshaler(&self) -> Result<Marshaler<P>> {
        Ok(Marshaler::new(self.session()?))
    }

    /// A typed service stub for the current session.
    pub fn service_stub(&self) -> Result<ServiceStub<P>> {
        Ok(ServiceStub::new(self.marshaler()?))
    }

    /// Calls a procedure, returning the pending result.
    pub async fn call<Args>(
        &self,
        procedure: Uri,
        args: Args,
    ) -> Result<PendingCall<P, RpcResult<P>>, CallError<P>>
    where
        Args: IntoRpcCall<P>,
    {
        let session = self.open_session()?;
        let handle = session.call(procedure, args.into_rpc_call()?).await?;
        Ok(PendingCall::new(
            handle,
            Arc::new(|result: RpcResult<P>| Raw.adapt_success(result)),
        ))
    }

    /// Calls a procedure and waits for the result.
    pub async fn call_and_wait<Args>(
        &self,
        procedure: Uri,
        args: Args,
    ) -> Result<RpcResult<P>, CallError<P>>
    where
        Args: IntoRpcCall<P>,
    {
        self.call(procedure, args).await?.await
    }

    /// Publishes an event to a topic.
    pub async fn publish(
        &self,
        topic: Uri,
        event: PublishedEvent<P>,
    ) -> Result<Option<Id>, CallError<P>> {
        self.open_session()?.publish(topic, event).await
    }

    /// Subscribes to a topic.
    pub async fn subscribe(&self, topic: Uri) -> Result<Subscription<P>, CallError<P>> {
        self.open_session()?.subscribe(topic).await
    }

    /// Unsubscribes from a topic.
    pub async fn unsubscribe(&self, id: Id) -> Result<(), CallError<P>> {
        self.open_session()?.unsubscribe(id).await
    }

    /// Registers a procedure.
    pub async fn register(&self, procedure: Uri) -> Result<Registration<P>, CallError<P>> {
        self.open_session()?.register(procedure).await
    }

    /// Unregisters a procedure.
    pub async fn unregister(&self, id: Id) -> Result<(), CallError<P>> {
        self.open_session()?.unregister(id).await
    }
}

#[cfg(test)]
mod peer_test {
    use crate::{
        binding::binding::BindingType,
        peer::peer::PeerConfig,
    };

    #[test]
    fn default_config_never_times_out_idle_connections() {
        let config = PeerConfig::default();
        assert_eq!(config.connection.idle_timeout, None);
        assert!(config.bindings.contains(&BindingType::Json));
        assert!(config.bindings.contains(&BindingType::MessagePack));
    }
}
