use std::{
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Duration,
};

use anyhow::Result;
use futures_util::future::join_all;
use log::{
    debug,
    error,
    info,
    warn,
};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    binding::binding::new_binding,
    connection::connection::{
        Connection,
        ConnectionConfig,
    },
    core::{
        close::CloseReason,
        error::ObjectDisposed,
        payload::Payload,
        types::HashMap,
    },
    message::common::goodbye_with_close_reason,
    router::{
        context::RouterContext,
        listener::listener::{
            Accepted,
            ConnectionListener,
            IncomingConnection,
        },
        session::RouterSession,
    },
};

const DISPOSED: ObjectDisposed = ObjectDisposed("binding host");

struct AcceptLoop {
    generation: u64,
    cancel_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct HostState<P> {
    disposed: bool,
    accept_loop: Option<AcceptLoop>,
    accept_generation: u64,
    connections: HashMap<Uuid, Arc<Connection<P>>>,
}

struct HostShared<P> {
    context: Arc<RouterContext<P>>,
    listener: Arc<dyn ConnectionListener>,
    state: Mutex<HostState<P>>,
}

impl<P> HostShared<P>
where
    P: Payload,
{
    fn lock(&self) -> MutexGuard<'_, HostState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn accept_loop(self: Arc<Self>, generation: u64, mut cancel_rx: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                incoming = self.listener.accept() => {
                    let incoming = match incoming {
                        Ok(Some(incoming)) => incoming,
                        Ok(None) => {
                            info!("Connection listener closed");
                            break;
                        }
                        Err(err) => {
                            error!("Failed to accept incoming connection: {err}");
                            break;
                        }
                    };
                    tokio::spawn(self.clone().establish(incoming));
                }
                _ = &mut cancel_rx => {
                    debug!("Binding host accept loop stopped");
                    return;
                }
            }
        }

        // The listener ended on its own, so the host is no longer open.
        let mut state = self.lock();
        if state
            .accept_loop
            .as_ref()
            .is_some_and(|accept_loop| accept_loop.generation == generation)
        {
            state.accept_loop = None;
        }
        debug!("Binding host accept loop ended");
    }

    async fn establish(self: Arc<Self>, incoming: Box<dyn IncomingConnection>) {
        let description = incoming.description();
        let result = match incoming.establish().await {
            Ok(accepted) => self.attach(accepted),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            error!("Failed to start handling connection from {description}: {err}");
        }
    }

    fn attach(self: &Arc<Self>, accepted: Accepted) -> Result<Uuid> {
        let config = ConnectionConfig {
            name: format!("{} ({})", self.context.connection.name, accepted.description),
            ..self.context.connection.clone()
        };
        let connection = Connection::new(
            config,
            accepted.transport,
            new_binding(accepted.binding),
        );
        let uuid = connection.uuid();
        {
            let mut state = self.lock();
            if state.disposed {
                return Err(DISPOSED.into());
            }
            state.connections.insert(uuid, connection.clone());
        }
        info!(
            "Created connection {uuid} for {} over {}",
            accepted.description,
            accepted.binding.uri()
        );

        connection.start(RouterSession::new(
            self.context.clone(),
            connection.clone(),
        ));
        let shared = Arc::downgrade(self);
        tokio::spawn(async move {
            connection.closed().await;
            if let Some(shared) = shared.upgrade() {
                shared.lock().connections.remove(&uuid);
            }
            debug!("Connection {uuid} removed from binding host");
        });
        Ok(uuid)
    }
}

/// Orchestrates a [`ConnectionListener`], turning every accepted connection into a router session.
pub struct BindingHost<P> {
    shared: Arc<HostShared<P>>,
}

impl<P> BindingHost<P>
where
    P: Payload,
{
    pub fn new(context: Arc<RouterContext<P>>, listener: Arc<dyn ConnectionListener>) -> Self {
        Self {
            shared: Arc::new(HostShared {
                context,
                listener,
                state: Mutex::new(HostState {
                    disposed: false,
                    accept_loop: None,
                    accept_generation: 0,
                    connections: HashMap::default(),
                }),
            }),
        }
    }

    /// Starts accepting connections.
    ///
    /// Opening a host that is already open does nothing.
    pub fn open(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if state.disposed {
            return Err(DISPOSED.into());
        }
        if state.accept_loop.is_some() {
            return Ok(());
        }
        state.accept_generation += 1;
        let generation = state.accept_generation;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(self.shared.clone().accept_loop(generation, cancel_rx));
        state.accept_loop = Some(AcceptLoop {
            generation,
            cancel_tx,
            handle,
        });
        Ok(())
    }

    /// Stops accepting connections.
    ///
    /// Established connections are unaffected. Stopping a host that is not open does nothing.
    pub async fn stop(&self) -> Result<()> {
        if self.shared.lock().disposed {
            return Err(DISPOSED.into());
        }
        self.stop_accepting().await;
        Ok(())
    }

    async fn stop_accepting(&self) {
        let accept_loop = self.shared.lock().accept_loop.take();
        if let Some(AcceptLoop {
            cancel_tx, handle, ..
        }) = accept_loop
        {
            cancel_tx.send(()).ok();
            if let Err(err) = handle.await {
                error!("Binding host accept loop failed: {err}");
            }
        }
    }

    /// Starts a router session over a transport that has already been established.
    pub fn attach(&self, accepted: Accepted) -> Result<Uuid> {
        self.shared.attach(accepted)
    }

    /// Checks if the host is accepting connections.
    pub fn is_open(&self) -> bool {
        self.shared.lock().accept_loop.is_some()
    }

    /// The number of live connections.
    pub fn connection_count(&self) -> usize {
        self.shared.lock().connections.len()
    }

    /// Stops accepting connections and closes every live connection.
    ///
    /// Peers are sent a GOODBYE message before their connection is closed. Disposing a host twice
    /// does nothing.
    pub async fn dispose(&self) {
        let connections = {
            let mut state = self.shared.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state
                .connections
                .drain()
                .map(|(_, connection)| connection)
                .collect::<Vec<_>>()
        };
        self.stop_accepting().await;

        info!("Disposing binding host with {} connections", connections.len());
        let futures = connections.into_iter().map(|connection| async move {
            connection
                .send_message(goodbye_with_close_reason(CloseReason::SystemShutdown))
                .await
                .ok();
            connection.close().await;
        });
        if tokio::time::timeout(Duration::from_secs(2), join_all(futures))
            .await
            .is_err()
        {
            warn!("Timed out waiting for connections to close cleanly");
        }
    }
}
