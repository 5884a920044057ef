use std::sync::Arc;

use anyhow::Result;

use crate::{
    connection::connection::ConnectionConfig,
    core::{
        error::InteractionError,
        payload::Payload,
        roles::RouterRole,
        types::HashSet,
        uri::Uri,
    },
    router::realm::{
        Realm,
        RealmContainer,
    },
};

/// The context shared by every session running for a router.
pub struct RouterContext<P> {
    /// Agent name, communicated to peers.
    pub agent: String,
    /// Roles implemented by the router.
    pub roles: HashSet<RouterRole>,
    /// Configuration for accepted connections.
    pub connection: ConnectionConfig,
    realms: RealmContainer<P>,
}

impl<P> RouterContext<P>
where
    P: Payload,
{
    pub fn new(
        agent: String,
        roles: HashSet<RouterRole>,
        connection: ConnectionConfig,
        realms: RealmContainer<P>,
    ) -> Arc<Self> {
        Arc::new(Self {
            agent,
            roles,
            connection,
            realms,
        })
    }

    pub fn realms(&self) -> &RealmContainer<P> {
        &self.realms
    }

    /// Looks up a realm, failing with [`InteractionError::NoSuchRealm`].
    pub fn realm(&self, uri: &Uri) -> Result<Arc<Realm<P>>> {
        self.realms
            .get(uri)
            .ok_or_else(|| InteractionError::NoSuchRealm.into())
    }
}
