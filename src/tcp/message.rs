//! The value records that cross the boundary between a [`super::sender::TCPSender`]
//! and a [`super::receiver::TCPReceiver`]. On-the-wire encoding into an actual
//! TCP segment is out of scope here and left to `etherparse` at the host
//! adapter layer.

use crate::wrap32::Wrap32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TCPSenderMessage {
    pub seqno: Wrap32,
    pub syn: bool,
    pub payload: Vec<u8>,
    pub fin: bool,
}

impl TCPSenderMessage {
    pub fn sequence_length(&self) -> usize {
        self.syn as usize + self.payload.len() + self.fin as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TCPReceiverMessage {
    pub ackno: Option<Wrap32>,
    pub window_size: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_length_counts_syn_payload_fin() {
        let msg = TCPSenderMessage {
            seqno: Wrap32::new(0),
            syn: true,
            payload: vec![1, 2, 3],
            fin: true,
        };
        assert_eq!(msg.sequence_length(), 5);
    }
}
