use std::time::Duration;

use anyhow::{
    Error,
    Result,
};
use wamp_conduit::{
    binding::binding::BindingType,
    core::{
        error::CallError,
        types::HashSet,
        uri::Uri,
    },
    peer::{
        PeerConfig,
        WebSocketPeer,
        new_web_socket_peer,
    },
    router::{
        RealmConfig,
        Router,
        RouterConfig,
        RouterHandle,
    },
};

const REALM: &str = "com.conduit.test";

type Payload = serde_json::Value;

async fn start_router_with_config(mut config: RouterConfig) -> Result<RouterHandle<Payload>, Error> {
    config.realms.push(RealmConfig {
        name: "test".to_owned(),
        uri: Uri::try_from(REALM)?,
    });
    Router::<Payload>::new(config)?.start().await
}

async fn start_router() -> Result<RouterHandle<Payload>, Error> {
    start_router_with_config(RouterConfig::default()).await
}

fn create_peer_with_bindings(bindings: &[BindingType]) -> Result<WebSocketPeer> {
    let mut config = PeerConfig::default();
    config.name = "peer".to_owned();
    config.bindings = HashSet::from_iter(bindings.iter().cloned());
    new_web_socket_peer(config)
}

async fn wait_for_session_to_close(peer: &WebSocketPeer) -> bool {
    for _ in 0..50 {
        if peer.current_session_id().is_none() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn peer_joins_realm_with_each_binding() {
    test_utils::setup::setup_test_environment();

    let router_handle = start_router().await.unwrap();
    for binding in [BindingType::Json, BindingType::MessagePack] {
        let peer = create_peer_with_bindings(&[binding]).unwrap();
        assert_matches::assert_matches!(
            peer.connect(&format!("ws://{}", router_handle.local_addr()))
                .await,
            Ok(())
        );
        assert_matches::assert_matches!(peer.join_realm(REALM).await, Ok(()));
        assert!(peer.current_session_id().is_some());
        assert_matches::assert_matches!(peer.disconnect().await, Ok(()));
        assert_matches::assert_matches!(peer.current_session_id(), None);
    }
    router_handle.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn router_rejects_peer_without_supported_binding() {
    test_utils::setup::setup_test_environment();

    let mut config = RouterConfig::default();
    config.bindings = HashSet::from_iter([BindingType::Json]);
    let router_handle = start_router_with_config(config).await.unwrap();

    let peer = create_peer_with_bindings(&[BindingType::MessagePack]).unwrap();
    assert_matches::assert_matches!(
        peer.connect(&format!("ws://{}", router_handle.local_addr()))
            .await,
        Err(_)
    );

    router_handle.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn peer_fails_to_join_missing_realm() {
    test_utils::setup::setup_test_environment();

    let router_handle = start_router().await.unwrap();
    let peer = create_peer_with_bindings(&[BindingType::Json]).unwrap();
    peer.connect(&format!("ws://{}", router_handle.local_addr()))
        .await
        .unwrap();
    assert_matches::assert_matches!(peer.join_realm("com.conduit.missing").await, Err(err) => {
        assert_eq!(err.to_string(), "no such realm");
    });

    router_handle.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn router_close_ends_peer_sessions() {
    test_utils::setup::setup_test_environment();

    let router_handle = start_router().await.unwrap();
    let peer = create_peer_with_bindings(&[BindingType::Json]).unwrap();
    peer.connect(&format!("ws://{}", router_handle.local_addr()))
        .await
        .unwrap();
    peer.join_realm(REALM).await.unwrap();

    router_handle.close().await;
    assert!(wait_for_session_to_close(&peer).await);
    assert_matches::assert_matches!(
        peer.call_and_wait(Uri::try_from("com.conduit.add2").unwrap(), (1, 2))
            .await,
        Err(CallError::SessionNotOpen)
    );
}
