//! Channel integration tests over loopback TCP.
//!
//! Tests verify end-to-end channel functionality:
//! - Negotiated handshake reaching Secured on both ends
//! - Round trips in every security mode
//! - Per-message failures leaving the channel usable
//! - State gating of `send`


use sealink_core::frame::Tag;
use sealink_core::{Role, TaggedFrame};
use sealink_crypto::{AeadProvider, TransformProvider};
use sealink_transport::session::{negotiate, TransformSession};
use sealink_transport::{
    Channel, ChannelEvent, ChannelState, Error, PresharedSecrets, SecurityMode,
};
use test_helpers::*;
use tokio::time::timeout;

/// Test: full handshake over loopback, then several round trips
#[tokio::test]
async fn test_negotiated_loopback_reaches_secured() {
    let (addr, server) = spawn_server(SecurityMode::Negotiated).await;

    let mut channel = Channel::new(client_config(addr, SecurityMode::Negotiated));
    assert!(!channel.is_secured());

    timeout(TEST_TIMEOUT, channel.connect())
        .await
        .expect("Connect timed out")
        .expect("Connect failed");
    assert_eq!(channel.state(), ChannelState::Secured);
    assert!(channel.is_secured());

    let events = drain_events(&mut channel).await;
    assert_eq!(events, [ChannelEvent::Connected, ChannelEvent::Secured]);

    let large: Vec<u8> = (0..100_000u32).map(|i| (i % 253) as u8).collect();
    for message in [b"hello".to_vec(), Vec::new(), vec![0x42; 1500], large] {
        channel.send(&message).expect("Send failed");
        assert_eq!(channel.state(), ChannelState::AwaitingReply);

        match expect_event(&mut channel).await {
            ChannelEvent::MessageReceived(reply) => assert_eq!(reply, reverse(&message)),
            other => panic!("Unexpected event: {:?}", other),
        }
        assert_eq!(channel.state(), ChannelState::Secured);
    }

    channel.terminate().await;
    assert_eq!(channel.state(), ChannelState::Offline);
    assert!(!channel.is_secured());

    let served = timeout(TEST_TIMEOUT, server)
        .await
        .expect("Server timeout")
        .expect("Server task failed");
    assert!(served.is_ok(), "Server should end cleanly: {:?}", served);
}

/// Test: the server side of a negotiated session is secured after accept
#[tokio::test]
async fn test_server_session_secured_after_accept() {
    let config = sealink_transport::ServerConfig::new("127.0.0.1:0");
    let server = sealink_transport::SecureServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();

    let accept = tokio::spawn(async move { server.accept().await });
    let _channel = connect_channel(client_config(addr, SecurityMode::Negotiated)).await;

    let session = timeout(TEST_TIMEOUT, accept)
        .await
        .expect("Accept timeout")
        .expect("Accept task failed")
        .expect("Server setup failed");
    assert!(session.is_secured());
}

/// Test: pre-shared mode with default secrets on both ends
#[tokio::test]
async fn test_preshared_round_trip() {
    let security = SecurityMode::PreShared(PresharedSecrets::default());
    let (addr, _server) = spawn_server(security.clone()).await;

    let mut channel = Channel::new(client_config(addr, security));
    channel.connect().await.expect("Connect failed");
    assert_eq!(
        drain_events(&mut channel).await,
        [ChannelEvent::Connected, ChannelEvent::Secured]
    );

    channel.send(b"abc").unwrap();
    assert_eq!(
        expect_event(&mut channel).await,
        ChannelEvent::MessageReceived(b"cba".to_vec())
    );
    channel.terminate().await;
}

/// Test: plain mode never secures but still exchanges messages
#[tokio::test]
async fn test_plain_round_trip() {
    let (addr, _server) = spawn_server(SecurityMode::Plain).await;

    let mut channel = Channel::new(client_config(addr, SecurityMode::Plain));
    channel.connect().await.expect("Connect failed");
    assert_eq!(drain_events(&mut channel).await, [ChannelEvent::Connected]);
    assert_eq!(channel.state(), ChannelState::Connected);
    assert!(!channel.is_secured());

    channel.send(b"ping").unwrap();
    assert_eq!(
        expect_event(&mut channel).await,
        ChannelEvent::MessageReceived(b"gnip".to_vec())
    );
    assert_eq!(channel.state(), ChannelState::Connected);
    channel.terminate().await;
}

/// Test: mismatched pre-shared personalization fails per message only
#[tokio::test]
async fn test_mismatched_preshared_is_message_failure() {
    let server_secrets = PresharedSecrets {
        personalization: "server".into(),
        ..PresharedSecrets::default()
    };
    let (addr, _server) = spawn_server(SecurityMode::PreShared(server_secrets)).await;

    let mut channel = connect_channel(client_config(
        addr,
        SecurityMode::PreShared(PresharedSecrets::default()),
    ))
    .await;

    for _ in 0..2 {
        channel.send(b"hello").unwrap();
        assert!(matches!(
            expect_event(&mut channel).await,
            ChannelEvent::MessageFailed(_)
        ));
        assert_eq!(channel.state(), ChannelState::Secured);
    }
    channel.terminate().await;
}

/// Test: a tampered reply fails, the next round trip succeeds
#[tokio::test]
async fn test_tampered_reply_then_next_send_succeeds() {
    let (listener, addr) = raw_listener().await;

    let server = tokio::spawn(async move {
        let (transport, _) = listener.accept().await.unwrap();
        let secrets = negotiate(&transport, Role::Server).await.unwrap().secrets;
        let mut transforms =
            TransformSession::instantiate(&AeadProvider::new(), secrets.encoder, secrets.decoder)
                .unwrap();

        for round in 0..2 {
            let body = transport.receive().await.unwrap();
            let frame = TaggedFrame::parse(&body).unwrap();
            assert_eq!(frame.kind(), Some(Tag::Message));
            let request = transforms.decode(frame.payload).unwrap();

            let mut reply = transforms.encode(&reverse(&request)).unwrap();
            if round == 0 {
                let last = reply.len() - 1;
                reply[last] ^= 0x01;
            }
            transport
                .send(Some(Tag::Message.to_u8()), &reply)
                .await
                .unwrap();
        }
    });

    let mut channel = connect_channel(client_config(addr, SecurityMode::Negotiated)).await;

    channel.send(b"first").unwrap();
    assert!(matches!(
        expect_event(&mut channel).await,
        ChannelEvent::MessageFailed(_)
    ));
    assert_eq!(channel.state(), ChannelState::Secured);

    channel.send(b"second").unwrap();
    assert_eq!(
        expect_event(&mut channel).await,
        ChannelEvent::MessageReceived(b"dnoces".to_vec())
    );
    assert_eq!(channel.state(), ChannelState::Secured);

    timeout(TEST_TIMEOUT, server)
        .await
        .expect("Server timeout")
        .expect("Server task failed");
    channel.terminate().await;
}

/// Test: send is rejected unless Secured, without touching the transport
#[tokio::test]
async fn test_send_rejected_outside_secured() {
    let (addr, _server) = spawn_server(SecurityMode::Negotiated).await;

    let mut channel = Channel::new(client_config(addr, SecurityMode::Negotiated));
    assert!(matches!(channel.send(b"early"), Err(Error::InvalidState(_))));
    assert_eq!(channel.state(), ChannelState::Offline);

    channel.connect().await.unwrap();
    drain_events(&mut channel).await;

    channel.send(b"one").unwrap();
    assert!(matches!(channel.send(b"two"), Err(Error::InvalidState(_))));
    assert_eq!(channel.state(), ChannelState::AwaitingReply);

    assert_eq!(
        expect_event(&mut channel).await,
        ChannelEvent::MessageReceived(b"eno".to_vec())
    );
    assert!(channel.next_event().await.is_none());

    channel.terminate().await;
    assert!(matches!(channel.send(b"late"), Err(Error::InvalidState(_))));
}

/// Test: connect while already connected is rejected
#[tokio::test]
async fn test_connect_twice_rejected() {
    let (addr, _server) = spawn_server(SecurityMode::Plain).await;
    let mut channel = connect_channel(client_config(addr, SecurityMode::Plain)).await;

    assert!(matches!(
        channel.connect().await,
        Err(Error::InvalidState(_))
    ));
    assert_eq!(channel.state(), ChannelState::Connected);
    channel.terminate().await;
}

/// Test: terminate while a reply is pending drops the stale reply
#[tokio::test]
async fn test_terminate_while_awaiting_reply() {
    let (listener, addr) = raw_listener().await;
    let server = tokio::spawn(async move {
        let (transport, _) = listener.accept().await.unwrap();
        // Read the request and never answer.
        let _ = transport.receive().await;
        let _ = transport.receive().await;
    });

    let mut channel = connect_channel(client_config(addr, SecurityMode::Plain)).await;
    channel.send(b"no answer").unwrap();
    assert_eq!(channel.state(), ChannelState::AwaitingReply);

    timeout(TEST_TIMEOUT, channel.terminate())
        .await
        .expect("Terminate blocked on pending read");
    assert_eq!(channel.state(), ChannelState::Offline);
    assert!(channel.next_event().await.is_none());

    timeout(TEST_TIMEOUT, server)
        .await
        .expect("Server timeout")
        .expect("Server task failed");
}

/// Provider used only to check the dyn seam.
struct CountingProvider {
    inner: AeadProvider,
    encoders: std::sync::atomic::AtomicUsize,
}

impl TransformProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    fn initialize(&self) -> sealink_crypto::Result<()> {
        self.inner.initialize()
    }

    fn encoder(
        &self,
        params: sealink_crypto::TransformParams,
    ) -> sealink_crypto::Result<Box<dyn sealink_crypto::Encoder>> {
        self.encoders
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.inner.encoder(params)
    }

    fn decoder(
        &self,
        params: sealink_crypto::TransformParams,
    ) -> sealink_crypto::Result<Box<dyn sealink_crypto::Decoder>> {
        self.inner.decoder(params)
    }
}

/// Test: a custom provider is used for the client's transforms
#[tokio::test]
async fn test_custom_provider_used() {
    let (addr, _server) = spawn_server(SecurityMode::Negotiated).await;
    let provider = std::sync::Arc::new(CountingProvider {
        inner: AeadProvider::new(),
        encoders: Default::default(),
    });

    let mut channel = Channel::with_provider(
        client_config(addr, SecurityMode::Negotiated),
        provider.clone(),
    );
    channel.connect().await.unwrap();
    assert_eq!(
        provider
            .encoders
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );

    drain_events(&mut channel).await;
    channel.send(b"x").unwrap();
    assert_eq!(
        expect_event(&mut channel).await,
        ChannelEvent::MessageReceived(b"x".to_vec())
    );
    channel.terminate().await;
}
