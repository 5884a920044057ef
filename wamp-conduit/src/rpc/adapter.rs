use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::{
    core::{
        error::{
            CallError,
            RemoteError,
        },
        payload::Payload,
        types::{
            Dictionary,
            List,
        },
    },
    message::message::ErrorMessage,
};

/// The return shape of a procedure, classified once when its stub is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    /// The caller waits for completion, but the result payload is discarded.
    None,
    /// The caller waits for a single result value.
    Single,
    /// The caller receives a pending call immediately.
    Async {
        /// Whether the pending call yields a value.
        value: bool,
    },
}

impl ReturnShape {
    /// Whether the caller waits for the result before the invocation returns.
    pub fn is_synchronous(&self) -> bool {
        !matches!(self, Self::Async { .. })
    }
}

/// The untyped result of a procedure call.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResult<P> {
    pub arguments: List<P>,
    pub arguments_keyword: Dictionary<P>,
    pub details: Dictionary<P>,
}

impl<P> Default for RpcResult<P> {
    fn default() -> Self {
        Self {
            arguments: Default::default(),
            arguments_keyword: Default::default(),
            details: Default::default(),
        }
    }
}

/// Converts an untyped call result into the statically expected return type.
pub trait ResultAdapter<P>: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Whether the adapter produces a meaningful value.
    fn returns_value(&self) -> bool;

    /// Adapts a successful result.
    ///
    /// Failure only affects the call being adapted.
    fn adapt_success(&self, result: RpcResult<P>) -> Result<Self::Output, CallError<P>>;
}

/// Maps an ERROR message into a remote error, keeping all payloads verbatim.
pub fn adapt_failure<P>(message: ErrorMessage<P>) -> RemoteError<P>
where
    P: Payload,
{
    RemoteError {
        uri: message.error,
        details: message.details,
        arguments: message.arguments,
        arguments_keyword: message.arguments_keyword,
    }
}

fn mismatch<P>(error: impl ToString) -> CallError<P> {
    CallError::ResultTypeMismatch(error.to_string())
}

/// Discards the result payload entirely.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl<P> ResultAdapter<P> for Discard
where
    P: Payload,
{
    type Output = ();

    fn returns_value(&self) -> bool {
        false
    }

    fn adapt_success(&self, _: RpcResult<P>) -> Result<Self::Output, CallError<P>> {
        Ok(())
    }
}

/// Coerces the first positional result into `T`.
pub struct Single<T>(PhantomData<fn() -> T>);

impl<T> Single<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Single<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, T> ResultAdapter<P> for Single<T>
where
    P: Payload,
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn returns_value(&self) -> bool {
        true
    }

    fn adapt_success(&self, result: RpcResult<P>) -> Result<Self::Output, CallError<P>> {
        let value = result
            .arguments
            .into_iter()
            .next()
            .ok_or_else(|| mismatch("expected a result value, but the result was empty"))?;
        value.decode().map_err(mismatch)
    }
}

/// Coerces the entire list of positional results into `T`.
pub struct MultiValued<T>(PhantomData<fn() -> T>);

impl<T> MultiValued<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for MultiValued<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, T> ResultAdapter<P> for MultiValued<T>
where
    P: Payload,
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn returns_value(&self) -> bool {
        true
    }

    fn adapt_success(&self, result: RpcResult<P>) -> Result<Self::Output, CallError<P>> {
        P::encode(&result.arguments)
            .and_then(|arguments| arguments.decode())
            .map_err(mismatch)
    }
}

/// Coerces the keyword results into `T`.
pub struct Keyword<T>(PhantomData<fn() -> T>);

impl<T> Keyword<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Keyword<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, T> ResultAdapter<P> for Keyword<T>
where
    P: Payload,
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn returns_value(&self) -> bool {
        true
    }

    fn adapt_success(&self, result: RpcResult<P>) -> Result<Self::Output, CallError<P>> {
        P::encode(&result.arguments_keyword)
            .and_then(|arguments_keyword| arguments_keyword.decode())
            .map_err(mismatch)
    }
}

/// Passes the untyped result through as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct Raw;

impl<P> ResultAdapter<P> for Raw
where
    P: Payload,
{
    type Output = RpcResult<P>;

    fn returns_value(&self) -> bool {
        true
    }

    fn adapt_success(&self, result: RpcResult<P>) -> Result<Self::Output, CallError<P>> {
        Ok(result)
    }
}
