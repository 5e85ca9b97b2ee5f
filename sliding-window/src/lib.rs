//! `sliding-window`: a reliable, ordered, flow-controlled byte stream over an
//! unreliable datagram transport.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   DATA packets   ┌──────────┐
//!  │  Sender  │─────────────────▶│ Receiver │
//!  └────┬─────┘                  └─────┬────┘
//!       │◀────── cumulative ACK ───────┘
//!       │        + advertised window
//!  ┌────▼─────────────────────────────────┐
//!  │  Transport (UDP or simulated link)   │
//!  │  may drop, reorder, duplicate        │
//!  └──────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]       : wire format (serialise / deserialise)
//! - [`send_window`]  : in-flight set, cumulative ACKs, retransmit deadlines
//! - [`recv_window`]  : reorder buffer, cumulative ACK, advertised window
//! - [`sender`]       : send endpoint: queue, event loop, retransmission
//! - [`receiver`]     : receive endpoint: receive task, in-order `recv`
//! - [`transport`]    : transport port and the lossy UDP endpoint
//! - [`simulator`]    : in-memory lossy/reordering link for testing
//! - [`config`]       : endpoint tuning
//! - [`error`]        : crate error type

pub mod config;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod recv_window;
pub mod send_window;
pub mod sender;
pub mod simulator;
pub mod transport;

pub use config::{ReceiverConfig, SenderConfig};
pub use error::SwpError;
pub use packet::{Packet, PacketError, PacketType, MAX_DATA_SIZE};
pub use receiver::Receiver;
pub use sender::Sender;
pub use transport::{Transport, UdpEndpoint};
