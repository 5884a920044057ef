use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

use anyhow::Result;
use log::debug;

use crate::{
    connection::connection::Connection,
    core::{
        id::{
            Id,
            IdAllocator,
            RandomIdAllocator,
            SequentialIdAllocator,
        },
        payload::Payload,
        types::HashMap,
        uri::Uri,
    },
    router::{
        procedure::{
            LocalProcedure,
            ProcedureManager,
            ProcedureTarget,
        },
        topic::TopicManager,
    },
    rpc::{
        adapter::RpcResult,
        correlator::RequestCorrelator,
    },
};

/// Configuration for a realm.
#[derive(Debug, Clone)]
pub struct RealmConfig {
    /// Name of the realm, mostly for logging.
    pub name: String,
    /// URI for peers to connect to the realm.
    pub uri: Uri,
}

/// A single session joined to a realm.
#[derive(Clone)]
pub struct RealmSession<P> {
    pub id: Id,
    pub connection: Arc<Connection<P>>,
    /// Outstanding invocations sent to this session as a callee.
    pub invocations: Arc<RequestCorrelator<RpcResult<P>, P>>,
    /// Request IDs for messages the router originates on this session.
    pub request_ids: Arc<SequentialIdAllocator>,
}

impl<P> fmt::Debug for RealmSession<P>
where
    P: Payload,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmSession")
            .field("id", &self.id)
            .field("connection", &self.connection.name())
            .finish_non_exhaustive()
    }
}

/// Where a call is routed.
pub enum ProcedureRoute<P> {
    Local {
        registration: Id,
        procedure: Arc<dyn LocalProcedure<P>>,
    },
    Remote {
        registration: Id,
        callee: RealmSession<P>,
    },
}

impl<P> fmt::Debug for ProcedureRoute<P>
where
    P: Payload,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { registration, .. } => f
                .debug_struct("Local")
                .field("registration", registration)
                .finish_non_exhaustive(),
            Self::Remote {
                registration,
                callee,
            } => f
                .debug_struct("Remote")
                .field("registration", registration)
                .field("callee", callee)
                .finish(),
        }
    }
}

struct RealmState<P> {
    sessions: HashMap<Id, RealmSession<P>>,
    procedures: ProcedureManager<P>,
    topics: TopicManager,
}

/// A realm, which is a scoped area for peer sessions and resources.
///
/// WAMP sessions cannot communicate across realms.
pub struct Realm<P> {
    config: RealmConfig,
    id_allocator: Box<dyn IdAllocator>,
    state: Mutex<RealmState<P>>,
}

impl<P> Realm<P>
where
    P: Payload,
{
    /// Creates a new realm.
    pub fn new(config: RealmConfig) -> Self {
        Self {
            config,
            id_allocator: Box::new(RandomIdAllocator::default()),
            state: Mutex::new(RealmState {
                sessions: HashMap::default(),
                procedures: ProcedureManager::default(),
                topics: TopicManager::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RealmState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The URI for accessing the realm.
    pub fn uri(&self) -> &Uri {
        &self.config.uri
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Registers a procedure implemented inside the router.
    pub async fn register_local(
        &self,
        procedure: Uri,
        implementation: Arc<dyn LocalProcedure<P>>,
    ) -> Result<Id> {
        let registration = self.id_allocator.generate_id().await;
        self.lock().procedures.insert(
            procedure.clone(),
            registration,
            ProcedureTarget::Local(implementation),
            true,
        )?;
        debug!(
            "Realm {} registered local procedure {procedure} as {registration}",
            self.config.name
        );
        Ok(registration)
    }

    /// Joins a new session over `connection`, assigning a session ID unique within the realm.
    pub async fn join(&self, connection: Arc<Connection<P>>) -> RealmSession<P> {
        loop {
            let id = self.id_allocator.generate_id().await;
            let mut state = self.lock();
            if state.sessions.contains_key(&id) {
                continue;
            }
            let session = RealmSession {
                id,
                connection: connection.clone(),
                invocations: Arc::new(RequestCorrelator::new("invocations")),
                request_ids: Arc::new(SequentialIdAllocator::default()),
            };
            state.sessions.insert(id, session.clone());
            return session;
        }
    }

    /// Removes a session, along with all of its registrations and subscriptions.
    pub fn leave(&self, session: Id) -> Option<RealmSession<P>> {
        let mut state = self.lock();
        let removed = state.sessions.remove(&session);
        let registrations = state.procedures.remove_callee(session);
        state.topics.remove_subscriber(session);
        if removed.is_some() {
            debug!(
                "Session {session} left realm {} ({registrations} registrations removed)",
                self.config.name
            );
        }
        removed
    }

    pub fn session(&self, session: Id) -> Option<RealmSession<P>> {
        self.lock().sessions.get(&session).cloned()
    }

    pub fn sessions(&self) -> Vec<RealmSession<P>> {
        self.lock().sessions.values().cloned().collect()
    }

    /// Registers a procedure implemented by a callee session.
    ///
    /// The procedure is not callable until [`Self::activate_registration`] is called.
    pub async fn register(&self, callee: Id, procedure: Uri) -> Result<Id> {
        let registration = self.id_allocator.generate_id().await;
        self.lock().procedures.insert(
            procedure,
            registration,
            ProcedureTarget::Remote { callee },
            false,
        )?;
        Ok(registration)
    }

    pub fn activate_registration(&self, registration: Id) {
        self.lock().procedures.activate(registration);
    }

    pub fn unregister(&self, callee: Id, registration: Id) -> Result<()> {
        self.lock().procedures.remove(callee, registration)
    }

    /// Looks up the route for calling a procedure.
    pub fn procedure(&self, procedure: &Uri) -> Option<ProcedureRoute<P>> {
        let state = self.lock();
        let entry = state.procedures.get(procedure)?;
        match &entry.target {
            ProcedureTarget::Local(implementation) => Some(ProcedureRoute::Local {
                registration: entry.registration,
                procedure: implementation.clone(),
            }),
            ProcedureTarget::Remote { callee } => {
                state
                    .sessions
                    .get(callee)
                    .map(|callee| ProcedureRoute::Remote {
                        registration: entry.registration,
                        callee: callee.clone(),
                    })
            }
        }
    }

    /// Subscribes a session to a topic.
    ///
    /// Events are not delivered until [`Self::activate_subscription`] is called.
    pub async fn subscribe(&self, subscriber: Id, topic: Uri) -> Id {
        let new_subscription = self.id_allocator.generate_id().await;
        self.lock()
            .topics
            .subscribe(subscriber, topic, new_subscription)
    }

    pub fn activate_subscription(&self, subscriber: Id, subscription: Id) {
        self.lock().topics.activate(subscriber, subscription);
    }

    pub fn unsubscribe(&self, subscriber: Id, subscription: Id) -> Result<()> {
        self.lock().topics.unsubscribe(subscriber, subscription)
    }

    /// The subscription ID of a topic and its active subscribers, except `publisher`.
    pub fn subscribers(&self, topic: &Uri, publisher: Id) -> Option<(Id, Vec<RealmSession<P>>)> {
        let state = self.lock();
        let (subscription, subscribers) = state.topics.subscribers(topic)?;
        let subscribers = subscribers
            .into_iter()
            .filter(|subscriber| *subscriber != publisher)
            .filter_map(|subscriber| state.sessions.get(&subscriber).cloned())
            .collect();
        Some((subscription, subscribers))
    }

    /// Generates a new publication ID.
    pub async fn publication_id(&self) -> Id {
        self.id_allocator.generate_id().await
    }
}

/// All realms owned by a router.
pub struct RealmContainer<P> {
    realms: HashMap<Uri, Arc<Realm<P>>>,
}

impl<P> Default for RealmContainer<P> {
    fn default() -> Self {
        Self {
            realms: HashMap::default(),
        }
    }
}

impl<P> RealmContainer<P>
where
    P: Payload,
{
    /// Looks up realm by URI.
    pub fn get(&self, uri: &Uri) -> Option<Arc<Realm<P>>> {
        self.realms.get(uri).cloned()
    }

    /// Inserts a new realm.
    pub fn insert(&mut self, realm: Realm<P>) {
        let uri = realm.uri().clone();
        self.realms.insert(uri, Arc::new(realm));
    }

    /// Returns an iterator over all realm URIs.
    pub fn uris(&self) -> impl Iterator<Item = &Uri> {
        self.realms.keys()
    }
}
