use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        Mutex,
        MutexGuard,
        PoisonError,
    },
    task,
};

use log::warn;
use tokio::sync::oneshot;

use crate::core::{
    error::CallError,
    id::Id,
    types::HashMap,
};

type Completion<T, P> = oneshot::Sender<Result<T, CallError<P>>>;

struct CorrelatorState<T, P> {
    pending: HashMap<Id, Completion<T, P>>,
    closed: Option<String>,
}

/// Tracks outstanding requests by request ID, completing each exactly once.
///
/// The first terminal write for a request ID takes effect and removes the entry. Later writes for
/// the same ID are unknown and ignored.
pub struct RequestCorrelator<T, P> {
    name: &'static str,
    state: Mutex<CorrelatorState<T, P>>,
}

impl<T, P> RequestCorrelator<T, P> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(CorrelatorState {
                pending: HashMap::default(),
                closed: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CorrelatorState<T, P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new outstanding request.
    pub fn register(&self, id: Id) -> Result<PendingHandle<T, P>, CallError<P>> {
        let mut state = self.lock();
        if let Some(reason) = &state.closed {
            return Err(CallError::ConnectionLost(reason.clone()));
        }
        if state.pending.contains_key(&id) {
            return Err(CallError::DuplicateRequest(id));
        }
        let (tx, rx) = oneshot::channel();
        state.pending.insert(id, tx);
        Ok(PendingHandle { id, rx })
    }

    /// Completes a request successfully.
    ///
    /// Returns `false` if the request ID is unknown.
    pub fn resolve(&self, id: Id, value: T) -> bool {
        self.complete(id, Ok(value))
    }

    /// Completes a request with a failure.
    ///
    /// Returns `false` if the request ID is unknown.
    pub fn reject(&self, id: Id, error: CallError<P>) -> bool {
        self.complete(id, Err(error))
    }

    fn complete(&self, id: Id, result: Result<T, CallError<P>>) -> bool {
        let tx = self.lock().pending.remove(&id);
        match tx {
            Some(tx) => {
                // The caller may have lost interest in the result.
                tx.send(result).ok();
                true
            }
            None => {
                warn!("UnknownRequestId: {} has no outstanding request {id}", self.name);
                false
            }
        }
    }

    /// Removes a request without completing it.
    pub fn discard(&self, id: Id) {
        self.lock().pending.remove(&id);
    }

    /// Rejects every outstanding request with a connection loss, and refuses new requests.
    ///
    /// Returns the number of requests rejected.
    pub fn fail_all(&self, reason: &str) -> usize {
        let pending = {
            let mut state = self.lock();
            state.closed = Some(reason.to_owned());
            std::mem::take(&mut state.pending)
        };
        let count = pending.len();
        for (_, tx) in pending {
            tx.send(Err(CallError::ConnectionLost(reason.to_owned())))
                .ok();
        }
        count
    }

    /// Rejects every outstanding request, leaving the correlator open for new requests.
    pub fn reject_all(&self, error: CallError<P>) -> usize
    where
        P: Clone,
    {
        let pending = std::mem::take(&mut self.lock().pending);
        let count = pending.len();
        for (_, tx) in pending {
            tx.send(Err(error.clone())).ok();
        }
        count
    }

    /// The number of outstanding requests.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The caller's side of an outstanding request.
///
/// Resolves when the request is completed. If the entry is dropped without completion, the request
/// is considered lost with the connection.
pub struct PendingHandle<T, P> {
    id: Id,
    rx: oneshot::Receiver<Result<T, CallError<P>>>,
}

impl<T, P> PendingHandle<T, P> {
    pub fn id(&self) -> Id {
        self.id
    }
}

impl<T, P> fmt::Debug for PendingHandle<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<T, P> Future for PendingHandle<T, P> {
    type Output = Result<T, CallError<P>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| match result {
            Ok(result) => result,
            Err(_) => Err(CallError::ConnectionLost(
                "request was dropped without completion".to_owned(),
            )),
        })
    }
}
