use serde::Serialize;

use crate::core::{
    error::CallError,
    payload::Payload,
    types::{
        Dictionary,
        List,
    },
};

/// The untyped arguments of a procedure call.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall<P> {
    pub arguments: List<P>,
    pub arguments_keyword: Dictionary<P>,
    pub options: Dictionary<P>,
}

impl<P> Default for RpcCall<P> {
    fn default() -> Self {
        Self {
            arguments: Default::default(),
            arguments_keyword: Default::default(),
            options: Default::default(),
        }
    }
}

/// Conversion of local call arguments into the payload representation.
pub trait IntoRpcCall<P> {
    fn into_rpc_call(self) -> Result<RpcCall<P>, CallError<P>>;
}

fn encode_argument<P, T>(value: &T) -> Result<P, CallError<P>>
where
    P: Payload,
    T: Serialize + ?Sized,
{
    P::encode(value).map_err(|err| CallError::ArgumentEncoding(err.to_string()))
}

impl<P> IntoRpcCall<P> for RpcCall<P> {
    fn into_rpc_call(self) -> Result<RpcCall<P>, CallError<P>> {
        Ok(self)
    }
}

macro_rules! tuple_into_rpc_call {
    ($($name:ident),*) => {
        impl<P, $($name,)*> IntoRpcCall<P> for ($($name,)*)
        where
            P: Payload,
            $($name: Serialize,)*
        {
            #[allow(non_snake_case)]
            fn into_rpc_call(self) -> Result<RpcCall<P>, CallError<P>> {
                let ($($name,)*) = self;
                Ok(RpcCall {
                    arguments: vec![$(encode_argument(&$name)?,)*],
                    ..Default::default()
                })
            }
        }
    };
}

tuple_into_rpc_call!();
tuple_into_rpc_call!(A);
tuple_into_rpc_call!(A, B);
tuple_into_rpc_call!(A, B, C);
tuple_into_rpc_call!(A, B, C, D);
tuple_into_rpc_call!(A, B, C, D, E);
tuple_into_rpc_call!(A, B, C, D, E, F);

/// Keyword arguments, taken from the fields of a serializable struct or map.
#[derive(Debug, Clone)]
pub struct Keywords<T>(pub T);

fn encode_keywords<P, T>(value: &T) -> Result<Dictionary<P>, CallError<P>>
where
    P: Payload,
    T: Serialize,
{
    encode_argument::<P, T>(value)?
        .decode()
        .map_err(|err| CallError::ArgumentEncoding(format!("keyword arguments must be a map: {err}")))
}

impl<P, T> IntoRpcCall<P> for Keywords<T>
where
    P: Payload,
    T: Serialize,
{
    fn into_rpc_call(self) -> Result<RpcCall<P>, CallError<P>> {
        Ok(RpcCall {
            arguments_keyword: encode_keywords(&self.0)?,
            ..Default::default()
        })
    }
}

/// Positional arguments combined with keyword arguments.
#[derive(Debug, Clone)]
pub struct WithKeywords<A, K> {
    pub arguments: A,
    pub keywords: K,
}

impl<P, A, K> IntoRpcCall<P> for WithKeywords<A, K>
where
    P: Payload,
    A: IntoRpcCall<P>,
    K: Serialize,
{
    fn into_rpc_call(self) -> Result<RpcCall<P>, CallError<P>> {
        let mut call = self.arguments.into_rpc_call()?;
        call.arguments_keyword.extend(encode_keywords(&self.keywords)?);
        Ok(call)
    }
}
