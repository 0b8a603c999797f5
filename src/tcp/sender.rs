//! Segments an outbound [`ByteStream`], tracks the peer's advertised window,
//! and retransmits with exponential backoff.
//!
//! The retransmission set is a `BTreeMap<u64, TCPSenderMessage>` keyed by
//! **absolute** sequence number, per the design-notes re-architecture: the
//! teacher crate's hand-rolled sender (`Connection::on_timer` in
//! `tcp/connection.rs`) walks a `BTreeMap<u32, Instant>` keyed on the raw
//! wrapped sequence number, which silently breaks once a connection's
//! sequence space wraps around. Keying on the monotone absolute seqno avoids
//! that trap entirely.

use std::collections::{BTreeMap, VecDeque};

use crate::byte_stream::ByteStream;
use crate::wrap32::Wrap32;

use super::message::{TCPReceiverMessage, TCPSenderMessage};

/// Protocol constant: the largest payload a single segment carries.
pub const MAX_PAYLOAD: usize = 1452;

/// Peek-then-pop up to `len` bytes out of `reader`. `ByteStream::peek` only
/// guarantees a contiguous prefix, so this loops until `len` bytes are
/// collected or the stream runs dry.
fn read_from_stream(reader: &mut ByteStream, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    while out.len() < len && reader.bytes_buffered() > 0 {
        let want = len - out.len();
        let chunk = &reader.peek()[..want.min(reader.peek().len())];
        let taken = chunk.len();
        out.extend_from_slice(chunk);
        reader.pop(taken);
    }
    out
}

/// A countdown timer. Not a background task — `tick` is the only thing that
/// ever advances it; nothing here reads the wall clock.
#[derive(Debug, Default)]
struct Timer {
    running: bool,
    elapsed_ms: u64,
}

impl Timer {
    /// Idempotent: starting an already-running timer is a no-op, so that
    /// pushing more data while a retransmission is already pending does not
    /// reset its elapsed time.
    fn start(&mut self) {
        if !self.running {
            self.running = true;
            self.elapsed_ms = 0;
        }
    }

    fn stop(&mut self) {
        self.running = false;
        self.elapsed_ms = 0;
    }

    /// Returns whether the timer just crossed `threshold_ms`.
    fn tick(&mut self, ms: u64, threshold_ms: u64) -> bool {
        if !self.running {
            return false;
        }
        self.elapsed_ms += ms;
        self.elapsed_ms >= threshold_ms
    }
}

#[derive(Debug)]
pub struct TCPSender {
    isn: Wrap32,
    initial_rto_ms: u64,
    current_rto_ms: u64,

    next_abs_seqno: u64,
    ack_abs_seqno: u64,
    window_size: u16,
    outstanding: usize,
    retransmit_count: u64,

    syn_sent: bool,
    fin_sent: bool,
    received_any_ack: bool,

    timer: Timer,
    send_queue: VecDeque<TCPSenderMessage>,
    outstanding_segments: BTreeMap<u64, TCPSenderMessage>,
}

impl TCPSender {
    pub fn new(initial_rto_ms: u64, isn: Wrap32) -> Self {
        TCPSender {
            isn,
            initial_rto_ms,
            current_rto_ms: initial_rto_ms,
            next_abs_seqno: 0,
            ack_abs_seqno: 0,
            window_size: 0,
            outstanding: 0,
            retransmit_count: 0,
            syn_sent: false,
            fin_sent: false,
            received_any_ack: false,
            timer: Timer::default(),
            send_queue: VecDeque::new(),
            outstanding_segments: BTreeMap::new(),
        }
    }

    pub fn sequence_numbers_in_flight(&self) -> usize {
        self.outstanding
    }

    pub fn consecutive_retransmissions(&self) -> u64 {
        self.retransmit_count
    }

    /// Whether any `TCPReceiverMessage` has ever reached `receive`. Exposed
    /// for tests.
    #[cfg(test)]
    fn has_received_ack(&self) -> bool {
        self.received_any_ack
    }

    fn effective_window(&self) -> usize {
        (self.window_size.max(1) as usize).saturating_sub(self.outstanding)
    }

    /// Emit as many segments as the effective window allows, draining
    /// `reader`.
    pub fn push(&mut self, reader: &mut ByteStream) {
        loop {
            let mut window_remaining = self.effective_window();
            if window_remaining == 0 {
                break;
            }

            let syn = !self.syn_sent;
            if syn {
                window_remaining -= 1;
            }

            let payload_len = window_remaining.min(reader.bytes_buffered()).min(MAX_PAYLOAD);
            let payload = read_from_stream(reader, payload_len);

            let sequence_length_so_far = syn as usize + payload.len();
            let fin = !self.fin_sent
                && reader.is_finished()
                && sequence_length_so_far < window_remaining + syn as usize;

            if !syn && payload.is_empty() && !fin {
                break;
            }

            let seqno = Wrap32::wrap(self.next_abs_seqno, self.isn);
            let message = TCPSenderMessage {
                seqno,
                syn,
                payload,
                fin,
            };
            let sequence_length = message.sequence_length();

            if syn {
                self.syn_sent = true;
            }
            if fin {
                self.fin_sent = true;
            }

            let abs_seqno = self.next_abs_seqno;
            self.next_abs_seqno += sequence_length as u64;
            self.outstanding += sequence_length;
            self.outstanding_segments.insert(abs_seqno, message.clone());
            self.timer.start();
            self.send_queue.push_back(message);
        }
    }

    pub fn maybe_send(&mut self) -> Option<TCPSenderMessage> {
        self.send_queue.pop_front()
    }

    /// Number of segments queued for transmission but not yet handed to the
    /// link layer via `maybe_send`. Exposed for tests.
    #[cfg(test)]
    fn send_queue_len(&self) -> usize {
        self.send_queue.len()
    }

    pub fn send_empty_message(&self) -> TCPSenderMessage {
        TCPSenderMessage {
            seqno: Wrap32::wrap(self.next_abs_seqno, self.isn),
            syn: false,
            payload: Vec::new(),
            fin: false,
        }
    }

    pub fn receive(&mut self, message: TCPReceiverMessage) {
        self.received_any_ack = true;
        self.window_size = message.window_size;

        let Some(ackno) = message.ackno else {
            return;
        };
        let ack_abs = ackno.unwrap(self.isn, self.next_abs_seqno);
        if ack_abs <= self.ack_abs_seqno || ack_abs > self.next_abs_seqno {
            return;
        }

        self.ack_abs_seqno = ack_abs;

        let fully_acked: Vec<u64> = self
            .outstanding_segments
            .iter()
            .filter(|(&seqno, msg)| seqno + msg.sequence_length() as u64 <= ack_abs)
            .map(|(&seqno, _)| seqno)
            .collect();
        for seqno in fully_acked {
            if let Some(msg) = self.outstanding_segments.remove(&seqno) {
                self.outstanding -= msg.sequence_length();
            }
        }

        self.current_rto_ms = self.initial_rto_ms;
        self.retransmit_count = 0;
        self.timer.stop();
        if self.outstanding > 0 {
            self.timer.start();
        }
    }

    pub fn tick(&mut self, ms_since_last_tick: u64) {
        if !self.timer.tick(ms_since_last_tick, self.current_rto_ms) {
            return;
        }

        if let Some((_, message)) = self.outstanding_segments.iter().next() {
            let message = message.clone();
            // A retransmitted SYN always escalates the backoff, even under a
            // zero window, since the handshake itself cannot be probed away;
            // otherwise only a genuinely non-zero window escalates it.
            if message.syn || self.window_size > 0 {
                self.retransmit_count += 1;
                self.current_rto_ms *= 2;
            }
            self.send_queue.push_back(message);
        }

        self.timer.stop();
        self.timer.start();
    }
}
