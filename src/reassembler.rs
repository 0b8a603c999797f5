//! Orders out-of-order, possibly overlapping, indexed substrings into a
//! [`ByteStream`].
//!
//! Fragments are kept in a `BTreeMap<u64, Vec<u8>>` keyed by `first_index`,
//! per the re-architecture the design notes call for: the C++ original this
//! was distilled from threads a hand-sorted `std::list`, trimming neighbours
//! in place on every insert. A sorted map gets the "disjoint after merge"
//! invariant for free from its key ordering.

use std::collections::BTreeMap;

use crate::byte_stream::ByteStream;

#[derive(Debug)]
pub struct Reassembler {
    unassembled_index: u64,
    eof_index: Option<u64>,
    bytes_pending: usize,
    fragments: BTreeMap<u64, Vec<u8>>,
}

impl Reassembler {
    pub fn new() -> Self {
        Reassembler {
            unassembled_index: 0,
            eof_index: None,
            bytes_pending: 0,
            fragments: BTreeMap::new(),
        }
    }

    pub fn bytes_pending(&self) -> usize {
        self.bytes_pending
    }

    /// Insert a substring `data` starting at absolute byte `first_index`.
    /// `is_last_substring` marks `data` as containing the final byte of the
    /// stream. As soon as the next contiguous run of bytes is known, they
    /// are pushed into `output`; everything else is held pending.
    pub fn insert(
        &mut self,
        first_index: u64,
        mut data: Vec<u8>,
        is_last_substring: bool,
        output: &mut ByteStream,
    ) {
        if is_last_substring {
            self.eof_index = Some(first_index + data.len() as u64);
        }

        let window_end = self.unassembled_index + output.available_capacity() as u64;

        // Trim the part before the window.
        if first_index < self.unassembled_index {
            let skip = (self.unassembled_index - first_index) as usize;
            if skip >= data.len() {
                data.clear();
            } else {
                data.drain(..skip);
            }
        }
        let first_index = first_index.max(self.unassembled_index);

        // Trim the part beyond the window.
        if first_index + data.len() as u64 > window_end {
            let keep = window_end.saturating_sub(first_index) as usize;
            data.truncate(keep);
        }

        if !data.is_empty() {
            self.merge(first_index, data);
        }

        self.drain_into(output);
    }

    fn merge(&mut self, first_index: u64, data: Vec<u8>) {
        let end_index = first_index + data.len() as u64;

        // Drop/trim any existing fragments the new one fully or partially
        // covers, and bail out early if an existing fragment already covers
        // the new one entirely.
        let mut to_remove = Vec::new();
        for (&start, existing) in self.fragments.range(..end_index) {
            let existing_end = start + existing.len() as u64;
            if existing_end <= first_index {
                continue;
            }
            if start <= first_index && existing_end >= end_index {
                // Fully covered by an existing fragment: nothing to insert.
                return;
            }
            to_remove.push(start);
        }
        for start in to_remove {
            let existing = self.fragments.remove(&start).unwrap();
            let existing_end = start + existing.len() as u64;
            self.bytes_pending -= existing.len();

            if start < first_index && existing_end > first_index {
                // Keep the prefix that precedes the new fragment.
                let keep = (first_index - start) as usize;
                let mut trimmed = existing;
                trimmed.truncate(keep);
                self.bytes_pending += trimmed.len();
                self.fragments.insert(start, trimmed);
            }
            if existing_end > end_index {
                // Keep the suffix that follows the new fragment.
                let skip = (end_index - start) as usize;
                let mut trimmed = existing;
                trimmed.drain(..skip);
                self.bytes_pending += trimmed.len();
                self.fragments.insert(end_index, trimmed);
            }
        }

        self.bytes_pending += data.len();
        self.fragments.insert(first_index, data);
    }

    fn drain_into(&mut self, output: &mut ByteStream) {
        while let Some(data) = self.fragments.remove(&self.unassembled_index) {
            self.bytes_pending -= data.len();
            self.unassembled_index += data.len() as u64;
            output.push(&data);
        }
        if self.eof_index == Some(self.unassembled_index) {
            output.close();
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
