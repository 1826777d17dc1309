//! Shared packet types and helpers for the integration tests.

#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc::{self, UnboundedReceiver};
use typewire::prelude::*;

packet! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct ChatMessage {
        pub message: String,
        pub time_sent: SystemTime,
    }
}

packet! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct Position {
        pub x: i32,
        pub y: i32,
        pub grounded: bool,
    }
}

packet! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct Blob {
        pub data: String,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    Chat(ChatMessage),
    Position(Position),
    Blob(Blob),
}

impl From<ChatMessage> for Msg {
    fn from(p: ChatMessage) -> Self {
        Msg::Chat(p)
    }
}

impl From<Position> for Msg {
    fn from(p: Position) -> Self {
        Msg::Position(p)
    }
}

impl From<Blob> for Msg {
    fn from(p: Blob) -> Self {
        Msg::Blob(p)
    }
}

pub const TIMEOUT: Duration = Duration::from_secs(2);

/// Registry with ids Chat = 1, Position = 2, Blob = 3.
pub fn registry() -> Arc<PacketRegistry<Msg>> {
    let mut registry = PacketRegistry::new();
    registry.register::<ChatMessage>().unwrap();
    registry.register::<Position>().unwrap();
    registry.register::<Blob>().unwrap();
    Arc::new(registry)
}

pub fn loopback() -> ConnectionConfig {
    ConnectionConfig::with_bind_ip(Ipv4Addr::LOCALHOST)
}

/// A timestamp with whole microseconds, so it survives the wire exactly.
pub fn timestamp(micros: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_micros(micros)
}

pub fn chat(message: &str) -> ChatMessage {
    ChatMessage {
        message: message.into(),
        time_sent: timestamp(1_700_000_000_123_456),
    }
}

/// Packets delivered to a [`forward`] callback, with the shape they arrived as.
pub type Inbox = UnboundedReceiver<(Msg, &'static PacketShape)>;

/// A callback that forwards every packet, with its shape, to a channel.
pub fn forward() -> (
    impl Fn(Msg, &'static PacketShape) + Send + Sync + 'static,
    Inbox,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |msg: Msg, shape: &'static PacketShape| {
        let _ = tx.send((msg, shape));
    };
    (handler, rx)
}

/// Waits for the next packet or fails the test.
pub async fn next(rx: &mut Inbox) -> (Msg, &'static PacketShape) {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a packet")
        .expect("handler channel closed")
}

/// Asserts that nothing arrives within a short grace period.
///
/// A closed channel counts as quiet: replacing a callback drops the old
/// one together with its sender.
pub async fn assert_quiet(rx: &mut Inbox) {
    let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(!matches!(extra, Ok(Some(_))), "unexpected packet: {extra:?}");
}

/// Polls `condition` until it holds or the test times out.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
