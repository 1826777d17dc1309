//! Peer-to-peer chat over UDP, built on a typewire [`Node`].
//!
//! Run two instances that point at each other:
//!
//! ```text
//! cargo run -p udp-chat -- 9000 127.0.0.1:9001
//! cargo run -p udp-chat -- 9001 127.0.0.1:9000
//! ```
//!
//! Every line typed on stdin is sent to the peer as a `ChatMessage`.
//! Set `UDP_CHAT_CONFIG` to a JSON file to override the socket settings,
//! and `RUST_LOG` to control logging.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use typewire::prelude::*;

packet! {
    #[derive(Debug, Clone)]
    pub struct ChatMessage {
        pub message: String,
        pub time_sent: SystemTime,
    }
}

fn load_config() -> Result<ConnectionConfig, Box<dyn std::error::Error>> {
    match std::env::var("UDP_CHAT_CONFIG") {
        Ok(path) => {
            let text = std::fs::read_to_string(&path)?;
            let config: ConnectionConfig = serde_json::from_str(&text)?;
            tracing::info!(%path, "loaded config");
            Ok(config)
        }
        Err(_) => Ok(ConnectionConfig::default()),
    }
}

fn parse_args() -> Result<(u16, SocketAddr), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let (Some(port), Some(peer)) = (args.next(), args.next()) else {
        return Err("usage: udp-chat <local-port> <peer-host:port>".into());
    };
    Ok((port.parse()?, peer.parse()?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "udp_chat=info,typewire=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (port, peer) = parse_args()?;

    let mut registry = PacketRegistry::<ChatMessage>::new();
    registry.register::<ChatMessage>()?;

    let mut node = Node::with_config(Arc::new(registry), load_config()?).on_packet_received(
        |chat: ChatMessage, _| {
            let sent = chat
                .time_sent
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            println!("[{sent}] {}", chat.message);
        },
    );
    node.start(port).await?;
    tracing::info!(local = %node.local_addr()?, %peer, "chatting; type a line and press enter");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        let chat = ChatMessage {
            message: line,
            time_sent: SystemTime::now(),
        };
        if !node.send(&chat, peer).await? {
            tracing::warn!("message was only partially sent");
        }
    }

    node.stop().await?;
    Ok(())
}
