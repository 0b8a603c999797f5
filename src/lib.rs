//! Core user-space TCP/IP stack: a bounded byte-stream, an out-of-order
//! reassembler, wrapping sequence-number arithmetic, a TCP sender/receiver
//! pair, and an ARP-resolving network interface with longest-prefix-match
//! routing.
//!
//! Wire-level codecs (IPv4/TCP headers and checksums) are deliberately left
//! to `etherparse`; Ethernet framing and ARP messages, which `etherparse`
//! does not cover, get their own small hand-rolled modules (`ethernet`,
//! `arp`). The demo binary (`src/main.rs`) is the only place that touches a
//! real device, driving everything below through one synchronous,
//! single-threaded loop — there is no background thread and no lock
//! anywhere in this crate.

pub mod arp;
pub mod byte_stream;
pub mod connection;
pub mod ethernet;
pub mod network_interface;
pub mod reassembler;
pub mod router;
pub mod tcp;
pub mod wrap32;

pub use byte_stream::ByteStream;
pub use connection::{Tcp4Tuple, TcpConnection, TcpSegment};
pub use network_interface::NetworkInterface;
pub use reassembler::Reassembler;
pub use router::Router;
pub use wrap32::Wrap32;
