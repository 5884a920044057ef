use std::{
    marker::PhantomData,
    sync::Arc,
};

use anyhow::Result;

use crate::{
    core::{
        error::{
            CallError,
            InteractionError,
        },
        id::Id,
        payload::Payload,
        types::HashMap,
        uri::Uri,
    },
    peer::{
        Decoder,
        Invoked,
        Marshaler,
        PendingCall,
        PublishedEvent,
    },
    rpc::{
        adapter::{
            ResultAdapter,
            ReturnShape,
            RpcResult,
        },
        arguments::IntoRpcCall,
    },
};

/// The description of one procedure on a service interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureDescriptor {
    pub uri: Uri,
    pub shape: ReturnShape,
}

/// The procedures of one service interface, keyed by URI.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    procedures: HashMap<Uri, ProcedureDescriptor>,
}

impl ServiceRegistry {
    /// Adds a procedure to the registry.
    ///
    /// Fails if a procedure with the same URI already exists.
    pub fn add(&mut self, descriptor: ProcedureDescriptor) -> Result<()> {
        if self.procedures.contains_key(&descriptor.uri) {
            return Err(InteractionError::ProcedureAlreadyExists.into());
        }
        self.procedures.insert(descriptor.uri.clone(), descriptor);
        Ok(())
    }

    pub fn get(&self, uri: &Uri) -> Option<&ProcedureDescriptor> {
        self.procedures.get(uri)
    }

    pub fn procedures(&self) -> impl Iterator<Item = &ProcedureDescriptor> {
        self.procedures.values()
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

fn decoder_for<P, A>(adapter: A) -> Decoder<P, A::Output>
where
    P: Payload,
    A: ResultAdapter<P>,
{
    Arc::new(move |result: RpcResult<P>| adapter.adapt_success(result))
}

/// A typed client for one service interface.
///
/// Every procedure handle is built once, which classifies its return shape and records it in the
/// service's registry.
pub struct ServiceStub<P> {
    marshaler: Marshaler<P>,
    registry: ServiceRegistry,
}

impl<P> ServiceStub<P>
where
    P: Payload,
{
    pub fn new(marshaler: Marshaler<P>) -> Self {
        Self {
            marshaler,
            registry: ServiceRegistry::default(),
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Builds a handle for a procedure whose callers wait for the result.
    pub fn procedure<Args, A>(
        &mut self,
        uri: Uri,
        adapter: A,
    ) -> Result<Procedure<P, Args, A::Output>>
    where
        Args: IntoRpcCall<P>,
        A: ResultAdapter<P>,
    {
        let shape = if adapter.returns_value() {
            ReturnShape::Single
        } else {
            ReturnShape::None
        };
        let descriptor = ProcedureDescriptor { uri, shape };
        self.registry.add(descriptor.clone())?;
        Ok(Procedure {
            marshaler: self.marshaler.clone(),
            descriptor,
            decoder: decoder_for(adapter),
            _args: PhantomData,
        })
    }

    /// Builds a handle for a procedure whose callers receive a pending call.
    pub fn async_procedure<Args, A>(
        &mut self,
        uri: Uri,
        adapter: A,
    ) -> Result<AsyncProcedure<P, Args, A::Output>>
    where
        Args: IntoRpcCall<P>,
        A: ResultAdapter<P>,
    {
        let shape = ReturnShape::Async {
            value: adapter.returns_value(),
        };
        let descriptor = ProcedureDescriptor { uri, shape };
        self.registry.add(descriptor.clone())?;
        Ok(AsyncProcedure {
            marshaler: self.marshaler.clone(),
            descriptor,
            decoder: decoder_for(adapter),
            _args: PhantomData,
        })
    }

    /// Builds a handle for publishing to a topic.
    pub fn topic<Args>(&self, uri: Uri) -> Topic<P, Args>
    where
        Args: IntoRpcCall<P>,
    {
        Topic {
            marshaler: self.marshaler.clone(),
            uri,
            acknowledge: false,
            _args: PhantomData,
        }
    }
}

/// A procedure whose callers wait for the result.
pub struct Procedure<P, Args, R> {
    marshaler: Marshaler<P>,
    descriptor: ProcedureDescriptor,
    decoder: Decoder<P, R>,
    _args: PhantomData<fn(Args)>,
}

impl<P, Args, R> Procedure<P, Args, R>
where
    P: Payload,
    Args: IntoRpcCall<P>,
{
    pub fn descriptor(&self) -> &ProcedureDescriptor {
        &self.descriptor
    }

    /// Calls the procedure, waiting for its result.
    pub async fn invoke(&self, args: Args) -> Result<R, CallError<P>> {
        let call = args.into_rpc_call()?;
        match self
            .marshaler
            .invoke(
                self.descriptor.uri.clone(),
                call,
                self.descriptor.shape,
                self.decoder.clone(),
            )
            .await?
        {
            Invoked::Ready(result) => Ok(result),
            Invoked::Pending(pending) => pending.await,
        }
    }
}

/// A procedure whose callers receive a pending call immediately.
pub struct AsyncProcedure<P, Args, R> {
    marshaler: Marshaler<P>,
    descriptor: ProcedureDescriptor,
    decoder: Decoder<P, R>,
    _args: PhantomData<fn(Args)>,
}

impl<P, Args, R> AsyncProcedure<P, Args, R>
where
    P: Payload,
    Args: IntoRpcCall<P>,
{
    pub fn descriptor(&self) -> &ProcedureDescriptor {
        &self.descriptor
    }

    /// Calls the procedure.
    ///
    /// Returns as soon as the CALL is sent.
    pub async fn invoke(&self, args: Args) -> Result<PendingCall<P, R>, CallError<P>> {
        let call = args.into_rpc_call()?;
        match self
            .marshaler
            .invoke(
                self.descriptor.uri.clone(),
                call,
                self.descriptor.shape,
                self.decoder.clone(),
            )
            .await?
        {
            Invoked::Ready(result) => Ok(PendingCall::ready(result)),
            Invoked::Pending(pending) => Ok(pending),
        }
    }
}

/// A topic that events can be published to.
pub struct Topic<P, Args> {
    marshaler: Marshaler<P>,
    uri: Uri,
    acknowledge: bool,
    _args: PhantomData<fn(Args)>,
}

impl<P, Args> Topic<P, Args>
where
    P: Payload,
    Args: IntoRpcCall<P>,
{
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Requires the router to acknowledge every publication.
    pub fn acknowledged(mut self) -> Self {
        self.acknowledge = true;
        self
    }

    /// Publishes an event.
    ///
    /// Returns the publication ID if the publication was acknowledged.
    pub async fn publish(&self, args: Args) -> Result<Option<Id>, CallError<P>> {
        let call = args.into_rpc_call()?;
        self.marshaler
            .publish(
                self.uri.clone(),
                PublishedEvent {
                    arguments: call.arguments,
                    arguments_keyword: call.arguments_keyword,
                    acknowledge: self.acknowledge,
                },
            )
            .await
    }
}

#[cfg(test)]
mod stub_test {
    use crate::{
        core::uri::Uri,
        rpc::{
            adapter::ReturnShape,
            stub::{
                ProcedureDescriptor,
                ServiceRegistry,
            },
        },
    };

    #[test]
    fn rejects_duplicate_procedure_uri() {
        let mut registry = ServiceRegistry::default();
        let uri = Uri::try_from("com.arguments.add2").unwrap();
        registry
            .add(ProcedureDescriptor {
                uri: uri.clone(),
                shape: ReturnShape::Single,
            })
            .unwrap();
        assert_matches::assert_matches!(
            registry.add(ProcedureDescriptor {
                uri: uri.clone(),
                shape: ReturnShape::None,
            }),
            Err(err) => {
                assert_eq!(err.to_string(), "procedure already exists");
            }
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&uri).map(|procedure| procedure.shape),
            Some(ReturnShape::Single)
        );
    }
}
