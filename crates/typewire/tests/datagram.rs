//! Integration tests for the UDP node.

mod common;

use std::net::SocketAddr;

use common::*;
use tokio::net::UdpSocket;
use typewire::prelude::*;

// =========================================================================
// Helpers
// =========================================================================

async fn start_node() -> (Node<Msg>, SocketAddr, Inbox) {
    let (handler, rx) = forward();
    let mut node = Node::with_config(registry(), loopback()).on_packet_received(handler);
    node.start(0).await.expect("node should start");
    let addr = node.local_addr().expect("running node has an address");
    (node, addr, rx)
}

// =========================================================================
// Message exchange
// =========================================================================

#[tokio::test]
async fn test_nodes_exchange_packets() {
    let (mut alice, alice_addr, mut alice_rx) = start_node().await;
    let (mut bob, bob_addr, mut bob_rx) = start_node().await;

    assert!(alice.send(&chat("hi bob"), bob_addr).await.unwrap());
    let (msg, shape) = next(&mut bob_rx).await;
    assert_eq!(shape, ChatMessage::shape());
    assert_eq!(msg, Msg::Chat(chat("hi bob")));

    let reply = Position {
        x: 1,
        y: 2,
        grounded: false,
    };
    assert!(bob.send(&reply, alice_addr).await.unwrap());
    assert_eq!(next(&mut alice_rx).await.0, Msg::Position(reply));

    alice.stop().await.unwrap();
    bob.stop().await.unwrap();
}

#[tokio::test]
async fn test_timestamp_keeps_microseconds() {
    let (mut sender, _, _) = start_node().await;
    let (mut receiver, addr, mut rx) = start_node().await;

    let packet = ChatMessage {
        message: "tick".into(),
        time_sent: timestamp(1_234_567_890_123_457),
    };
    sender.send(&packet, addr).await.unwrap();
    assert_eq!(next(&mut rx).await.0, Msg::Chat(packet));

    sender.stop().await.unwrap();
    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_and_malformed_datagrams_are_ignored() {
    let (mut node, addr, mut rx) = start_node().await;
    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    // Size 2, id 99, no payload.
    raw.send_to(&[2, 0, 99, 0], addr).await.unwrap();
    // Too short for a size prefix.
    raw.send_to(&[7], addr).await.unwrap();
    // Size prefix disagrees with the datagram length.
    raw.send_to(&[40, 0, 2, 0, 1], addr).await.unwrap();
    // Position (id 2) with a truncated payload.
    raw.send_to(&[4, 0, 2, 0, 1, 0], addr).await.unwrap();

    let (mut sender, _, _) = start_node().await;
    sender.send(&chat("valid"), addr).await.unwrap();

    assert_eq!(next(&mut rx).await.0, Msg::Chat(chat("valid")));
    assert_quiet(&mut rx).await;
    assert!(node.is_receiving());

    sender.stop().await.unwrap();
    node.stop().await.unwrap();
}

#[tokio::test]
async fn test_oversized_packet_is_not_sent() {
    let (mut sender, _, _) = start_node().await;
    let (mut receiver, addr, mut rx) = start_node().await;

    let err = sender
        .send(
            &Blob {
                data: "x".repeat(70_000),
            },
            addr,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TypewireError::Protocol(ProtocolError::PacketTooLarge { .. })
    ));

    sender.send(&Blob { data: "ok".into() }, addr).await.unwrap();
    assert_eq!(
        next(&mut rx).await.0,
        Msg::Blob(Blob { data: "ok".into() })
    );
    assert_quiet(&mut rx).await;

    sender.stop().await.unwrap();
    receiver.stop().await.unwrap();
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_operations_require_running_node() {
    let mut node = Node::<Msg>::with_config(registry(), loopback());
    assert_eq!(node.state(), NodeState::Stopped);

    let dest: SocketAddr = "127.0.0.1:9".parse().unwrap();
    assert!(matches!(
        node.send(&chat("x"), dest).await,
        Err(TypewireError::InvalidState {
            operation: "send",
            state: "Stopped"
        })
    ));
    assert!(matches!(
        node.local_addr(),
        Err(TypewireError::InvalidState { .. })
    ));
    assert!(matches!(
        node.stop().await,
        Err(TypewireError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_double_start_and_stop_fail() {
    let (mut node, _, _rx) = start_node().await;
    assert_eq!(node.state(), NodeState::Running);

    assert!(matches!(
        node.start(0).await,
        Err(TypewireError::InvalidState {
            operation: "start",
            state: "Running"
        })
    ));

    node.stop().await.unwrap();
    assert_eq!(node.state(), NodeState::Stopped);
    assert!(!node.is_receiving());
    assert!(matches!(
        node.stop().await,
        Err(TypewireError::InvalidState { .. })
    ));
    assert_eq!(node.state(), NodeState::Stopped);
}

#[tokio::test]
async fn test_restart_on_same_port() {
    let (mut node, addr, mut rx) = start_node().await;
    node.stop().await.unwrap();

    node.start(addr.port()).await.unwrap();
    assert_eq!(node.local_addr().unwrap(), addr);

    let (mut sender, _, _) = start_node().await;
    sender.send(&chat("back"), addr).await.unwrap();
    assert_eq!(next(&mut rx).await.0, Msg::Chat(chat("back")));

    sender.stop().await.unwrap();
    node.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_on_taken_port_fails() {
    let (mut first, addr, _rx) = start_node().await;

    let mut second = Node::<Msg>::with_config(registry(), loopback());
    let err = second.start(addr.port()).await.unwrap_err();
    assert!(matches!(
        err,
        TypewireError::Transport(TransportError::BindFailed(_))
    ));
    assert_eq!(second.state(), NodeState::Stopped);

    first.stop().await.unwrap();
}
