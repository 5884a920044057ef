use std::{
    fmt,
    future::Future,
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::{
    core::{
        error::{
            InteractionError,
            RemoteError,
        },
        id::Id,
        payload::{
            Payload,
            PayloadError,
        },
        types::{
            Dictionary,
            HashMap,
            List,
        },
        uri::Uri,
    },
    peer::RpcYield,
};

/// An invocation of a procedure implemented inside the router.
#[derive(Debug, Clone)]
pub struct LocalInvocation<P> {
    /// The session ID of the caller.
    pub caller: Id,
    pub arguments: List<P>,
    pub arguments_keyword: Dictionary<P>,
}

impl<P> LocalInvocation<P>
where
    P: Payload,
{
    /// Deserializes one positional argument.
    pub fn argument<T>(&self, index: usize) -> Result<T, PayloadError>
    where
        T: DeserializeOwned,
    {
        self.arguments
            .get(index)
            .ok_or_else(|| PayloadError::Decode(format!("missing argument at index {index}")))?
            .decode()
    }

    /// Deserializes the keyword arguments.
    pub fn arguments_keyword_as<T>(&self) -> Result<T, PayloadError>
    where
        T: DeserializeOwned,
    {
        P::encode(&self.arguments_keyword)?.decode()
    }
}

/// A procedure implemented inside the router, callable by any session in its realm.
#[async_trait]
pub trait LocalProcedure<P>: Send + Sync {
    async fn invoke(&self, invocation: LocalInvocation<P>) -> Result<RpcYield<P>, RemoteError<P>>;
}

struct FnProcedure<F> {
    f: F,
}

#[async_trait]
impl<P, F, Fut> LocalProcedure<P> for FnProcedure<F>
where
    P: Payload,
    F: Fn(LocalInvocation<P>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RpcYield<P>, RemoteError<P>>> + Send + 'static,
{
    async fn invoke(&self, invocation: LocalInvocation<P>) -> Result<RpcYield<P>, RemoteError<P>> {
        (self.f)(invocation).await
    }
}

/// Wraps an asynchronous closure as a [`LocalProcedure`].
pub fn local_procedure<P, F, Fut>(f: F) -> Arc<dyn LocalProcedure<P>>
where
    P: Payload,
    F: Fn(LocalInvocation<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RpcYield<P>, RemoteError<P>>> + Send + 'static,
{
    Arc::new(FnProcedure { f })
}

/// Where invocations of a procedure are routed.
pub enum ProcedureTarget<P> {
    /// Implemented in the router.
    Local(Arc<dyn LocalProcedure<P>>),
    /// Implemented by a callee session.
    Remote { callee: Id },
}

impl<P> Clone for ProcedureTarget<P> {
    fn clone(&self) -> Self {
        match self {
            Self::Local(procedure) => Self::Local(procedure.clone()),
            Self::Remote { callee } => Self::Remote { callee: *callee },
        }
    }
}

/// A registered procedure.
pub struct ProcedureEntry<P> {
    pub registration: Id,
    pub target: ProcedureTarget<P>,
    active: bool,
}

impl<P> fmt::Debug for ProcedureTarget<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(_) => f.write_str("Local"),
            Self::Remote { callee } => f.debug_struct("Remote").field("callee", callee).finish(),
        }
    }
}

impl<P> fmt::Debug for ProcedureEntry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureEntry")
            .field("registration", &self.registration)
            .field("target", &self.target)
            .field("active", &self.active)
            .finish()
    }
}

/// Exact-match procedure table of a realm.
pub struct ProcedureManager<P> {
    procedures: HashMap<Uri, ProcedureEntry<P>>,
    registrations: HashMap<Id, Uri>,
}

impl<P> Default for ProcedureManager<P> {
    fn default() -> Self {
        Self {
            procedures: HashMap::default(),
            registrations: HashMap::default(),
        }
    }
}

impl<P> ProcedureManager<P> {
    /// Inserts a procedure.
    ///
    /// Inactive procedures cannot be invoked until [`Self::activate`] is called.
    pub fn insert(
        &mut self,
        procedure: Uri,
        registration: Id,
        target: ProcedureTarget<P>,
        active: bool,
    ) -> Result<()> {
        if self.procedures.contains_key(&procedure) {
            return Err(InteractionError::ProcedureAlreadyExists.into());
        }
        self.registrations.insert(registration, procedure.clone());
        self.procedures.insert(
            procedure,
            ProcedureEntry {
                registration,
                target,
                active,
            },
        );
        Ok(())
    }

    pub fn activate(&mut self, registration: Id) {
        if let Some(entry) = self
            .registrations
            .get(&registration)
            .and_then(|procedure| self.procedures.get_mut(procedure))
        {
            entry.active = true;
        }
    }

    /// Looks up an active procedure.
    pub fn get(&self, procedure: &Uri) -> Option<&ProcedureEntry<P>> {
        self.procedures.get(procedure).filter(|entry| entry.active)
    }

    /// Removes a registration owned by `callee`.
    pub fn remove(&mut self, callee: Id, registration: Id) -> Result<()> {
        let procedure = match self.registrations.get(&registration) {
            Some(procedure) => procedure,
            None => return Err(InteractionError::NoSuchRegistration.into()),
        };
        match self.procedures.get(procedure).map(|entry| &entry.target) {
            Some(ProcedureTarget::Remote { callee: owner }) if *owner == callee => (),
            _ => return Err(InteractionError::NoSuchRegistration.into()),
        }
        if let Some(procedure) = self.registrations.remove(&registration) {
            self.procedures.remove(&procedure);
        }
        Ok(())
    }

    /// Removes every registration owned by `callee`.
    pub fn remove_callee(&mut self, callee: Id) -> usize {
        let registrations = self
            .procedures
            .values()
            .filter(|entry| matches!(entry.target, ProcedureTarget::Remote { callee: owner } if owner == callee))
            .map(|entry| entry.registration)
            .collect::<Vec<_>>();
        for registration in &registrations {
            if let Some(procedure) = self.registrations.remove(registration) {
                self.procedures.remove(&procedure);
            }
        }
        registrations.len()
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

#[cfg(test)]
mod procedure_test {
    use crate::{
        core::{
            error::InteractionError,
            id::Id,
            uri::Uri,
        },
        router::procedure::{
            ProcedureManager,
            ProcedureTarget,
        },
    };

    fn id(value: u64) -> Id {
        Id::try_from(value).unwrap()
    }

    fn uri(value: &str) -> Uri {
        Uri::try_from(value).unwrap()
    }

    #[test]
    fn hides_inactive_procedures() {
        let mut procedures = ProcedureManager::<serde_json::Value>::default();
        procedures
            .insert(
                uri("com.conduit.add2"),
                id(10),
                ProcedureTarget::Remote { callee: id(1) },
                false,
            )
            .unwrap();
        assert!(procedures.get(&uri("com.conduit.add2")).is_none());
        procedures.activate(id(10));
        assert_matches::assert_matches!(procedures.get(&uri("com.conduit.add2")), Some(entry) => {
            assert_eq!(entry.registration, id(10));
        });
    }

    #[test]
    fn rejects_duplicate_procedure() {
        let mut procedures = ProcedureManager::<serde_json::Value>::default();
        procedures
            .insert(
                uri("com.conduit.add2"),
                id(10),
                ProcedureTarget::Remote { callee: id(1) },
                true,
            )
            .unwrap();
        assert_matches::assert_matches!(
            procedures.insert(
                uri("com.conduit.add2"),
                id(11),
                ProcedureTarget::Remote { callee: id(2) },
                true,
            ),
            Err(err) => {
                assert_matches::assert_matches!(
                    err.downcast_ref::<InteractionError>(),
                    Some(InteractionError::ProcedureAlreadyExists)
                );
            }
        );
    }

    #[test]
    fn only_owner_can_remove_registration() {
        let mut procedures = ProcedureManager::<serde_json::Value>::default();
        procedures
            .insert(
                uri("com.conduit.add2"),
                id(10),
                ProcedureTarget::Remote { callee: id(1) },
                true,
            )
            .unwrap();
        assert_matches::assert_matches!(procedures.remove(id(2), id(10)), Err(_));
        assert_matches::assert_matches!(procedures.remove(id(1), id(10)), Ok(()));
        assert!(procedures.is_empty());
        assert_matches::assert_matches!(procedures.remove(id(1), id(10)), Err(_));
    }

    #[test]
    fn removes_all_procedures_of_callee() {
        let mut procedures = ProcedureManager::<serde_json::Value>::default();
        for (value, callee) in [(10, 1), (11, 1), (12, 2)] {
            procedures
                .insert(
                    uri(&format!("com.conduit.procedure{value}")),
                    id(value),
                    ProcedureTarget::Remote { callee: id(callee) },
                    true,
                )
                .unwrap();
        }
        assert_eq!(procedures.remove_callee(id(1)), 2);
        assert_eq!(procedures.len(), 1);
    }
}
