//! # Typewire
//!
//! Typed packet messaging over raw TCP and UDP sockets.
//!
//! Declare packet types with [`packet!`], register them in a
//! [`PacketRegistry`] in the same order on both ends, and exchange them
//! through a [`Client`]/[`Server`] pair or between [`Node`]s. Every packet
//! travels as `[u16 size][u16 id][payload]`, little-endian.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use typewire::prelude::*;
//!
//! packet! {
//!     #[derive(Debug)]
//!     pub struct Chat { pub text: String }
//! }
//!
//! # async fn demo() -> Result<(), TypewireError> {
//! let mut registry = PacketRegistry::<Chat>::new();
//! registry.register::<Chat>()?;
//! let registry = Arc::new(registry);
//!
//! let mut server = Server::new(Arc::clone(&registry))
//!     .on_packet_received(|chat: Chat, _| println!("got {}", chat.text));
//! server.start(7000).await?;
//!
//! let mut client = Client::new(registry);
//! client.connect("127.0.0.1", 7000).await?;
//! client.send(&Chat { text: "hello".into() }).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! ```text
//! Client / Server / Node   lifecycle, receive loops, callbacks
//!        │
//! typewire-protocol        registry, codec, framing
//!        │
//! typewire-transport       TCP streams, UDP datagrams
//! ```

mod client;
mod config;
mod error;
mod node;
mod receiver;
mod server;
mod state;

pub use client::Client;
pub use config::ConnectionConfig;
pub use error::TypewireError;
pub use node::Node;
pub use receiver::PacketHandler;
pub use server::Server;
pub use state::{ConnectionState, NodeState};

pub use typewire_protocol::{
    FieldDescriptor, FieldType, FieldValue, Packet, PacketId, PacketRegistry, PacketShape,
    ProtocolError, Received, Record, WireField, packet,
};
pub use typewire_transport::TransportError;

/// The protocol crate, for direct codec and framing access.
pub mod protocol {
    pub use typewire_protocol::*;
}

/// The transport crate, for raw socket access.
pub mod transport {
    pub use typewire_transport::*;
}

/// Everything needed to declare packets and run endpoints.
pub mod prelude {
    pub use crate::{
        Client, ConnectionConfig, ConnectionState, Node, NodeState, Packet, PacketRegistry,
        PacketShape, ProtocolError, Server, TransportError, TypewireError, packet,
    };
}
