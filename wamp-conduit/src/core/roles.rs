use std::fmt::Display;

use anyhow::Error;

use crate::core::{
    payload::{
        Payload,
        PayloadError,
    },
    types::Dictionary,
};

/// A role a peer can take on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerRole {
    /// Calls procedures.
    Caller,
    /// Registers procedures.
    Callee,
    /// Publishes events to topics.
    Publisher,
    /// Subscribes to topics.
    Subscriber,
}

impl PeerRole {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Callee => "callee",
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
        }
    }
}

impl TryFrom<&str> for PeerRole {
    type Error = Error;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "caller" => Ok(Self::Caller),
            "callee" => Ok(Self::Callee),
            "publisher" => Ok(Self::Publisher),
            "subscriber" => Ok(Self::Subscriber),
            _ => Err(Error::msg(format!("invalid peer role: {value}"))),
        }
    }
}

impl Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A role a router can take on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouterRole {
    /// Routes calls to callees.
    Dealer,
    /// Routes events to subscribers.
    Broker,
}

impl RouterRole {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dealer => "dealer",
            Self::Broker => "broker",
        }
    }
}

impl Display for RouterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds the `roles` entry of HELLO and WELCOME details.
///
/// Every role maps to an empty feature dictionary, since no advanced profile is announced.
pub fn roles_dictionary<P, I>(roles: I) -> Result<P, PayloadError>
where
    P: Payload,
    I: IntoIterator<Item = &'static str>,
{
    let roles = roles
        .into_iter()
        .map(|role| Ok((role.to_owned(), P::encode(&Dictionary::<P>::default())?)))
        .collect::<Result<Dictionary<P>, PayloadError>>()?;
    P::encode(&roles)
}
