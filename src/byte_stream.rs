//! A capacity-bounded, single-producer/single-consumer byte FIFO.
//!
//! Unlike the C++ original this crate's design was distilled from, there is
//! no separate `Reader`/`Writer` subclass pair — a `ByteStream` is one
//! concrete struct, and `push`/`pop`/`close`/`set_error` are just methods on
//! it, mutated by whichever side (sender or receiver plumbing) currently
//! holds it. That mirrors how the teacher crate owns its connection buffers:
//! `Connection::ingress`/`unacked` are plain `VecDeque<u8>` fields, not trait
//! objects.

use std::collections::VecDeque;

#[derive(Debug)]
pub struct ByteStream {
    capacity: usize,
    buffer: VecDeque<u8>,
    closed: bool,
    errored: bool,
    bytes_pushed: u64,
    bytes_popped: u64,
}

impl ByteStream {
    pub fn new(capacity: usize) -> Self {
        ByteStream {
            capacity,
            buffer: VecDeque::new(),
            closed: false,
            errored: false,
            bytes_pushed: 0,
            bytes_popped: 0,
        }
    }

    /// Append the largest prefix of `data` that fits in the remaining
    /// capacity. A no-op once the stream is closed. Never fails.
    pub fn push(&mut self, data: &[u8]) {
        if self.closed {
            return;
        }
        let n = data.len().min(self.available_capacity());
        self.buffer.extend(&data[..n]);
        self.bytes_pushed += n as u64;
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn set_error(&mut self) {
        self.errored = true;
    }

    /// A contiguous prefix of the buffered bytes. May be shorter than the
    /// entire buffer when the underlying deque wraps; callers peek-then-pop
    /// in a loop to drain everything.
    pub fn peek(&self) -> &[u8] {
        self.buffer.as_slices().0
    }

    pub fn pop(&mut self, len: usize) {
        let n = len.min(self.buffer.len());
        self.buffer.drain(..n);
        self.bytes_popped += n as u64;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_finished(&self) -> bool {
        self.closed && self.buffer.is_empty()
    }

    pub fn has_error(&self) -> bool {
        self.errored
    }

    pub fn bytes_buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn available_capacity(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    pub fn bytes_pushed(&self) -> u64 {
        self.bytes_pushed
    }

    pub fn bytes_popped(&self) -> u64 {
        self.bytes_popped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_clip_truncates_the_push() {
        let mut s = ByteStream::new(5);
        s.push(b"hello world");
        assert_eq!(s.bytes_pushed(), 5);
        assert_eq!(s.peek(), b"hello");
        assert_eq!(s.available_capacity(), 0);
    }

    #[test]
    fn push_after_close_is_a_silent_no_op() {
        let mut s = ByteStream::new(5);
        s.close();
        s.push(b"abc");
        assert_eq!(s.bytes_pushed(), 0);
    }

    #[test]
    fn finished_requires_closed_and_drained() {
        let mut s = ByteStream::new(5);
        s.push(b"ab");
        s.close();
        assert!(!s.is_finished());
        s.pop(2);
        assert!(s.is_finished());
    }

    #[test]
    fn pop_saturates_at_buffered_length() {
        let mut s = ByteStream::new(5);
        s.push(b"ab");
        s.pop(100);
        assert_eq!(s.bytes_buffered(), 0);
        assert_eq!(s.bytes_popped(), 2);
    }

    #[test]
    fn error_flag_is_sticky() {
        let mut s = ByteStream::new(5);
        s.set_error();
        assert!(s.has_error());
        s.push(b"x");
        assert!(s.has_error());
    }

    #[test]
    fn push_pop_accounting_matches_buffered() {
        let mut s = ByteStream::new(10);
        s.push(b"abcdef");
        s.pop(2);
        s.push(b"gh");
        assert_eq!(
            s.bytes_pushed() - s.bytes_popped(),
            s.bytes_buffered() as u64
        );
    }
}
