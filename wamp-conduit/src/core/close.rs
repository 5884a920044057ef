use crate::core::uri::Uri;

/// The reason for closing a WAMP session, sent in GOODBYE and ABORT messages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    #[default]
    Normal,
    SystemShutdown,
    CloseRealm,
    TimedOut,
    GoodbyeAndOut,
}

impl CloseReason {
    fn uri_str(&self) -> &'static str {
        match self {
            Self::Normal => "wamp.close.normal",
            Self::SystemShutdown => "wamp.close.system_shutdown",
            Self::CloseRealm => "wamp.close.close_realm",
            Self::TimedOut => "wamp.close.timed_out",
            Self::GoodbyeAndOut => "wamp.close.goodbye_and_out",
        }
    }

    /// URI for the close reason.
    pub fn uri(&self) -> Uri {
        Uri::from_known(self.uri_str())
    }

    /// Looks up the close reason for a URI received from a peer.
    pub fn from_uri(uri: &Uri) -> Option<Self> {
        [
            Self::Normal,
            Self::SystemShutdown,
            Self::CloseRealm,
            Self::TimedOut,
            Self::GoodbyeAndOut,
        ]
        .into_iter()
        .find(|reason| reason.uri_str() == uri.as_ref())
    }
}

#[cfg(test)]
mod close_test {
    use crate::core::{
        close::CloseReason,
        uri::Uri,
    };

    #[test]
    fn maps_uris_to_close_reasons() {
        assert_eq!(
            CloseReason::from_uri(&CloseReason::GoodbyeAndOut.uri()),
            Some(CloseReason::GoodbyeAndOut)
        );
        assert_eq!(
            CloseReason::from_uri(&Uri::try_from("wamp.close.unknown").unwrap()),
            None
        );
    }
}
