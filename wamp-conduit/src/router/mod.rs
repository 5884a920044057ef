mod context;
mod host;
mod listener;
mod procedure;
mod realm;
mod router;
mod session;
mod topic;

pub use context::RouterContext;
pub use host::BindingHost;
pub use listener::{
    channel_listener::{
        ChannelConnector,
        ChannelListener,
        channel_listener,
    },
    listener::{
        Accepted,
        ConnectionListener,
        IncomingConnection,
    },
    web_socket_listener::WebSocketListener,
};
pub use procedure::{
    LocalInvocation,
    LocalProcedure,
    local_procedure,
};
pub use realm::{
    Realm,
    RealmConfig,
    RealmContainer,
    RealmSession,
};
pub use router::{
    Router,
    RouterConfig,
    RouterHandle,
};
pub use session::RouterSession;
