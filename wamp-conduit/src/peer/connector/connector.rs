use anyhow::Result;
use async_trait::async_trait;

use crate::{
    binding::binding::BindingType,
    peer::peer::PeerConfig,
};

/// A stream to a router, along with the binding negotiated for it.
pub struct ConnectedStream<S> {
    pub stream: S,
    pub binding: BindingType,
}

/// Opens streams to a router.
///
/// Only the bindings in [`PeerConfig::bindings`] may be negotiated.
#[async_trait]
pub trait Connector<S>: Send + Sync {
    async fn connect(&self, config: &PeerConfig, uri: &str) -> Result<ConnectedStream<S>>;
}
