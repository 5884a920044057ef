use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task,
};

use crate::{
    core::{
        error::CallError,
        id::Id,
        payload::Payload,
        uri::Uri,
    },
    peer::session::{
        ClientSession,
        PublishedEvent,
    },
    rpc::{
        adapter::{
            ReturnShape,
            RpcResult,
        },
        arguments::RpcCall,
        correlator::PendingHandle,
    },
};

/// Converts an untyped call result into the caller's return type.
pub type Decoder<P, R> = Arc<dyn Fn(RpcResult<P>) -> Result<R, CallError<P>> + Send + Sync>;

enum PendingState<P, R> {
    Waiting {
        handle: PendingHandle<RpcResult<P>, P>,
        decoder: Decoder<P, R>,
    },
    Ready(Option<R>),
}

/// A procedure call whose result has not yet arrived.
///
/// Resolves to the decoded result, or to the failure of the call. Dropping the pending call
/// discards interest in the result; the request stays outstanding until it completes or the
/// connection closes.
pub struct PendingCall<P, R> {
    state: PendingState<P, R>,
}

impl<P, R> PendingCall<P, R> {
    pub(crate) fn new(handle: PendingHandle<RpcResult<P>, P>, decoder: Decoder<P, R>) -> Self {
        Self {
            state: PendingState::Waiting { handle, decoder },
        }
    }

    pub(crate) fn ready(value: R) -> Self {
        Self {
            state: PendingState::Ready(Some(value)),
        }
    }

    /// The request ID of the call, if it is still outstanding.
    pub fn request(&self) -> Option<Id> {
        match &self.state {
            PendingState::Waiting { handle, .. } => Some(handle.id()),
            PendingState::Ready(_) => None,
        }
    }
}

impl<P, R> fmt::Debug for PendingCall<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("request", &self.request())
            .finish_non_exhaustive()
    }
}

impl<P, R> Unpin for PendingCall<P, R> {}

impl<P, R> Future for PendingCall<P, R> {
    type Output = Result<R, CallError<P>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Self::Output> {
        match &mut self.state {
            PendingState::Waiting { handle, decoder } => {
                let result = futures_util::ready!(Pin::new(handle).poll(cx));
                task::Poll::Ready(result.and_then(|result| decoder(result)))
            }
            PendingState::Ready(value) => match value.take() {
                Some(value) => task::Poll::Ready(Ok(value)),
                None => task::Poll::Ready(Err(CallError::ConnectionLost(
                    "pending call was polled after completion".to_owned(),
                ))),
            },
        }
    }
}

/// The outcome of marshaling a call.
#[derive(Debug)]
pub enum Invoked<P, R> {
    /// The call completed, since its shape is synchronous.
    Ready(R),
    /// The call is outstanding, since its shape is asynchronous.
    Pending(PendingCall<P, R>),
}

/// Turns local calls into outgoing CALL and PUBLISH messages on a session.
///
/// Cheap to clone. Every clone marshals onto the same session.
pub struct Marshaler<P> {
    session: Arc<ClientSession<P>>,
}

impl<P> Clone for Marshaler<P> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}

impl<P> Marshaler<P>
where
    P: Payload,
{
    pub(crate) fn new(session: Arc<ClientSession<P>>) -> Self {
        Self { session }
    }

    /// Invokes a procedure.
    ///
    /// A request ID is allocated and a pending call is registered before CALL is sent. Synchronous
    /// shapes wait for the result; asynchronous shapes return the pending call immediately.
    pub async fn invoke<R>(
        &self,
        procedure: Uri,
        call: RpcCall<P>,
        shape: ReturnShape,
        decoder: Decoder<P, R>,
    ) -> Result<Invoked<P, R>, CallError<P>> {
        let handle = self.session.call(procedure, call).await?;
        let pending = PendingCall::new(handle, decoder);
        if shape.is_synchronous() {
            Ok(Invoked::Ready(pending.await?))
        } else {
            Ok(Invoked::Pending(pending))
        }
    }

    /// Publishes an event to a topic.
    ///
    /// Only acknowledged publications wait for the router, returning the publication ID.
    pub async fn publish(
        &self,
        topic: Uri,
        event: PublishedEvent<P>,
    ) -> Result<Option<Id>, CallError<P>> {
        self.session.publish(topic, event).await
    }
}
