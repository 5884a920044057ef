use std::{
    net::{
        IpAddr,
        Ipv4Addr,
        SocketAddr,
    },
    sync::Arc,
};

use anyhow::{
    Error,
    Result,
};
use log::info;

use crate::{
    binding::binding::BindingType,
    connection::connection::ConnectionConfig,
    core::{
        payload::Payload,
        roles::RouterRole,
        types::HashSet,
        uri::Uri,
    },
    router::{
        context::RouterContext,
        host::BindingHost,
        listener::{
            listener::Accepted,
            web_socket_listener::WebSocketListener,
        },
        realm::{
            Realm,
            RealmConfig,
            RealmContainer,
        },
    },
    transport::direct_transport::{
        DirectTransport,
        direct_transport_pair,
    },
};

const DEFAULT_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

/// Configuration for a [`Router`].
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// IP address the router starts on.
    pub address: IpAddr,
    /// Network port the router starts on.
    pub port: u16,
    /// Agent name, communicated to peers.
    pub agent: String,
    /// Roles implemented by the router.
    pub roles: HashSet<RouterRole>,
    /// Allowed bindings.
    ///
    /// The actual binding is selected when the connection with the router is established.
    pub bindings: HashSet<BindingType>,
    /// Realms available on the router.
    pub realms: Vec<RealmConfig>,
    /// Configuration for accepted connections.
    pub connection: ConnectionConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 0,
            agent: DEFAULT_AGENT.to_owned(),
            roles: HashSet::from_iter([RouterRole::Broker, RouterRole::Dealer]),
            bindings: HashSet::from_iter([BindingType::Json, BindingType::MessagePack]),
            realms: Vec::default(),
            connection: ConnectionConfig {
                name: "router".to_owned(),
                ..Default::default()
            },
        }
    }
}

/// A handle to an asynchronously-running [`Router`].
pub struct RouterHandle<P> {
    context: Arc<RouterContext<P>>,
    host: BindingHost<P>,
    local_addr: SocketAddr,
}

impl<P> RouterHandle<P>
where
    P: Payload,
{
    /// The local address of the router.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Looks up a realm by URI.
    pub fn realm(&self, uri: &Uri) -> Option<Arc<Realm<P>>> {
        self.context.realms().get(uri)
    }

    /// Starts a direct connection to the router, managed externally in the same process.
    pub fn direct_connect(&self, binding: BindingType) -> Result<DirectTransport> {
        let (router_end, peer_end) = direct_transport_pair();
        self.host.attach(Accepted {
            transport: Box::new(router_end),
            binding,
            description: "direct".to_owned(),
        })?;
        Ok(peer_end)
    }

    /// Closes the router.
    ///
    /// Every connected peer is sent a GOODBYE message before its connection is closed.
    pub async fn close(&self) {
        info!("Closing router {}", self.context.agent);
        self.host.dispose().await;
    }
}

/// A WAMP router (a.k.a., server) that accepts incoming connections and handles sessions.
pub struct Router<P> {
    config: RouterConfig,
    realms: RealmContainer<P>,
}

impl<P> Router<P>
where
    P: Payload,
{
    /// Creates a new [`Router`].
    pub fn new(config: RouterConfig) -> Result<Self> {
        if config.bindings.is_empty() {
            return Err(Error::msg("router must allow at least one binding"));
        }
        let mut realms = RealmContainer::default();
        for realm_config in &config.realms {
            realms.insert(Realm::new(realm_config.clone()));
        }
        Ok(Self { config, realms })
    }

    /// Looks up a realm by URI, for setting it up before the router starts.
    pub fn realm(&self, uri: &Uri) -> Option<Arc<Realm<P>>> {
        self.realms.get(uri)
    }

    /// Starts the router asynchronously.
    ///
    /// The returned handle can be used to interact with the router since its ownership is
    /// transferred away.
    pub async fn start(self) -> Result<RouterHandle<P>> {
        let addr = format!("{}:{}", self.config.address, self.config.port);
        info!(
            "Starting router {} at {addr}: {:?}",
            self.config.agent, self.config
        );
        let listener = WebSocketListener::bind(&addr, self.config.bindings.clone()).await?;
        let local_addr = listener.local_addr()?;

        let context = RouterContext::new(
            self.config.agent,
            self.config.roles,
            self.config.connection,
            self.realms,
        );
        let host = BindingHost::new(context.clone(), Arc::new(listener));
        host.open()?;
        Ok(RouterHandle {
            context,
            host,
            local_addr,
        })
    }
}
