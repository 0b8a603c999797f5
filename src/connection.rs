//! Ambient demonstration glue: bundles one [`ByteStream`] pair with a
//! [`TCPSender`]/[`TCPReceiver`] pair into a single per-flow connection, the
//! way the teacher's `tcp::connection::Connection` bundled its hand-rolled
//! sequence-space bookkeeping with `ingress`/`unacked` buffers. Unlike the
//! teacher, a [`TcpConnection`] here is driven by one synchronous
//! `on_segment`/`tick` pair rather than reaching back into a shared
//! `Mutex`-guarded table — there is no concurrency to hide.

use std::net::Ipv4Addr;

use crate::byte_stream::ByteStream;
use crate::tcp::{TCPReceiver, TCPReceiverMessage, TCPSender, TCPSenderMessage};
use crate::wrap32::Wrap32;

/// The four-tuple identifying one TCP flow, keyed exactly as the teacher
/// crate keys its connection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tcp4Tuple {
    pub src: (Ipv4Addr, u16),
    pub dst: (Ipv4Addr, u16),
}

/// A TCP segment as it crosses the wire: the sender-to-receiver fields
/// (`seqno`/`syn`/`payload`/`fin`) piggybacked with the receiver-to-sender
/// ack fields (`ackno`/`window_size`), the way a real TCP header carries
/// both directions' bookkeeping in one packet.
#[derive(Debug, Clone, Default)]
pub struct TcpSegment {
    pub seqno: Wrap32,
    pub syn: bool,
    pub payload: Vec<u8>,
    pub fin: bool,
    pub ackno: Option<Wrap32>,
    pub window_size: u16,
}

pub struct TcpConnection {
    incoming: ByteStream,
    outgoing: ByteStream,
    sender: TCPSender,
    receiver: TCPReceiver,
}

impl TcpConnection {
    pub fn new(initial_rto_ms: u64, isn: Wrap32, stream_capacity: usize) -> Self {
        TcpConnection {
            incoming: ByteStream::new(stream_capacity),
            outgoing: ByteStream::new(stream_capacity),
            sender: TCPSender::new(initial_rto_ms, isn),
            receiver: TCPReceiver::new(),
        }
    }

    /// Feed one inbound segment through the receiver and sender, then pump
    /// out whatever there now is to send.
    pub fn on_segment(&mut self, segment: TcpSegment) -> TcpSegment {
        self.receiver.receive(
            TCPSenderMessage {
                seqno: segment.seqno,
                syn: segment.syn,
                payload: segment.payload,
                fin: segment.fin,
            },
            &mut self.incoming,
        );
        self.sender.receive(TCPReceiverMessage {
            ackno: segment.ackno,
            window_size: segment.window_size,
        });
        self.pump()
    }

    /// Drain whatever the application has written, and build the next reply
    /// segment (an empty ack if there's nothing new to send).
    pub fn pump(&mut self) -> TcpSegment {
        self.sender.push(&mut self.outgoing);
        let outbound = self
            .sender
            .maybe_send()
            .unwrap_or_else(|| self.sender.send_empty_message());
        let ack = self.receiver.send(&self.incoming);
        TcpSegment {
            seqno: outbound.seqno,
            syn: outbound.syn,
            payload: outbound.payload,
            fin: outbound.fin,
            ackno: ack.ackno,
            window_size: ack.window_size,
        }
    }

    pub fn tick(&mut self, ms_since_last_tick: u64) {
        self.sender.tick(ms_since_last_tick);
    }

    /// Drain one segment the sender already had queued (most likely a
    /// timer-driven retransmission from `tick`) without pushing new data.
    /// Piggybacks the current ack/window so the segment is still a valid
    /// standalone TCP packet.
    pub fn maybe_send(&mut self) -> Option<TcpSegment> {
        let outbound = self.sender.maybe_send()?;
        let ack = self.receiver.send(&self.incoming);
        Some(TcpSegment {
            seqno: outbound.seqno,
            syn: outbound.syn,
            payload: outbound.payload,
            fin: outbound.fin,
            ackno: ack.ackno,
            window_size: ack.window_size,
        })
    }

    /// Whether the peer has signalled EOF (its FIN has been delivered).
    pub fn peer_closed(&self) -> bool {
        self.incoming.is_closed()
    }

    /// Queue application data for transmission. Returns the number of bytes
    /// actually accepted (may be less than `data.len()` if the stream is
    /// near capacity).
    pub fn write(&mut self, data: &[u8]) -> usize {
        let before = self.outgoing.bytes_pushed();
        self.outgoing.push(data);
        (self.outgoing.bytes_pushed() - before) as usize
    }

    pub fn close(&mut self) {
        self.outgoing.close();
    }

    /// A contiguous prefix of the bytes the peer has sent us so far.
    pub fn peek(&self) -> &[u8] {
        self.incoming.peek()
    }

    pub fn consume(&mut self, len: usize) {
        self.incoming.pop(len);
    }

    pub fn is_finished(&self) -> bool {
        self.incoming.is_finished() && self.sender.sequence_numbers_in_flight() == 0
    }
}
