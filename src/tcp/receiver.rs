//! Consumes inbound segments, drives a [`Reassembler`], and produces the
//! ackno/window pair that flows back to the peer's [`super::sender::TCPSender`].

use crate::byte_stream::ByteStream;
use crate::reassembler::Reassembler;
use crate::wrap32::Wrap32;

use super::message::{TCPReceiverMessage, TCPSenderMessage};

#[derive(Debug)]
pub struct TCPReceiver {
    reassembler: Reassembler,
    synced: bool,
    isn: Wrap32,
}

impl TCPReceiver {
    pub fn new() -> Self {
        TCPReceiver {
            reassembler: Reassembler::new(),
            synced: false,
            isn: Wrap32::new(0),
        }
    }

    /// Feed one inbound segment. Drives `inbound_stream` through the
    /// reassembler. Malformed or out-of-window data is silently dropped by
    /// the reassembler itself; this method never fails.
    pub fn receive(&mut self, message: TCPSenderMessage, inbound_stream: &mut ByteStream) {
        if message.syn && !self.synced {
            self.synced = true;
            self.isn = message.seqno;
        }

        if !self.synced {
            return;
        }

        // `synced` is sticky: once set, a later SYN is just ordinary
        // (almost certainly out-of-window) data, never a re-sync.
        let checkpoint = self.next_abs_seqno(inbound_stream);
        let unwrapped = message.seqno.unwrap(self.isn, checkpoint);

        let stream_index = if message.syn {
            0
        } else {
            unwrapped.saturating_sub(1)
        };

        if !message.payload.is_empty() || message.fin {
            self.reassembler
                .insert(stream_index, message.payload, message.fin, inbound_stream);
        }
    }

    /// `{ackno, window}` to report back to the sender.
    pub fn send(&self, inbound_stream: &ByteStream) -> TCPReceiverMessage {
        let ackno = if self.synced {
            Some(Wrap32::wrap(self.next_abs_seqno(inbound_stream), self.isn))
        } else {
            None
        };
        let window_size = inbound_stream.available_capacity().min(65535) as u16;
        TCPReceiverMessage { ackno, window_size }
    }

    /// `1 (SYN) + bytes delivered so far + 1 once the stream has been closed`.
    fn next_abs_seqno(&self, inbound_stream: &ByteStream) -> u64 {
        1 + inbound_stream.bytes_pushed() + inbound_stream.is_closed() as u64
    }
}

impl Default for TCPReceiver {
    fn default() -> Self {
        Self::new()
    }
}
