//! The buffer for segments that arrived ahead of the stream.
//!
//! Segments whose sequence number lies beyond the next expected one wait
//! here until the gap before them closes. Entries are kept ordered by
//! wrap-aware sequence number and no two entries share one; capacity is
//! governed by the receive window, which the receiver charges for every
//! buffered segment.
use alloc::vec::Vec;

use crate::wire::{Segment, SeqNumber};

/// The reorder buffer of a single connection.
#[derive(Debug, Default)]
pub struct ReorderBuffer {
    entries: Vec<Segment>,
}

impl ReorderBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        ReorderBuffer::default()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of buffered segments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether a segment with this exact sequence number is buffered.
    pub fn contains(&self, seq: SeqNumber) -> bool {
        self.entries.iter().any(|entry| entry.view().seq_number() == seq)
    }

    /// Insert an out-of-order segment, keeping the buffer sorted.
    ///
    /// Returns `false` for a duplicate sequence number, the new segment is
    /// dropped in that case. The wrap-aware comparison stays sound because
    /// the receiver only admits segments within one window of each other.
    pub fn insert(&mut self, segment: Segment) -> bool {
        let seq = segment.view().seq_number();
        let position = self.entries.iter()
            .position(|entry| seq <= entry.view().seq_number());

        match position {
            Some(at) if self.entries[at].view().seq_number() == seq => false,
            Some(at) => {
                self.entries.insert(at, segment);
                true
            }
            None => {
                self.entries.push(segment);
                true
            }
        }
    }

    /// Remove and return the segment at exactly this sequence number.
    ///
    /// The receiver drains the buffer by repeatedly popping the segment the
    /// stream now expects.
    pub fn pop_at(&mut self, seq: SeqNumber) -> Option<Segment> {
        let position = self.entries.iter()
            .position(|entry| entry.view().seq_number() == seq)?;
        Some(self.entries.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{Flags, Repr};

    fn data_segment(seq: i32, payload: &[u8]) -> Segment {
        let repr = Repr {
            src_port: 1,
            dst_port: 2,
            flags: {
                let mut flags = Flags::default();
                flags.set_syn(true);
                flags
            },
            seq_number: SeqNumber(seq),
            ack_number: None,
            window_len: 3072,
            payload_len: payload.len() as u16,
        };
        Segment::compose(repr, payload)
    }

    #[test]
    fn keeps_wrap_aware_order() {
        let mut buffer = ReorderBuffer::new();
        // Two sequence numbers on either side of the unsigned wrap.
        assert!(buffer.insert(data_segment(3, &[0; 8])));
        assert!(buffer.insert(data_segment(-5, &[0; 8])));
        assert!(buffer.insert(data_segment(-1, &[0; 8])));

        assert_eq!(buffer.len(), 3);
        let order: Vec<_> = buffer.entries.iter()
            .map(|entry| entry.view().seq_number())
            .collect();
        assert_eq!(order, [SeqNumber(-5), SeqNumber(-1), SeqNumber(3)]);
    }

    #[test]
    fn rejects_duplicates() {
        let mut buffer = ReorderBuffer::new();
        assert!(buffer.insert(data_segment(300, &[1; 16])));
        assert!(!buffer.insert(data_segment(300, &[2; 16])));
        assert_eq!(buffer.len(), 1);
        assert!(buffer.contains(SeqNumber(300)));
    }

    #[test]
    fn pops_exactly_the_expected_segment() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(data_segment(300, &[0; 16]));
        buffer.insert(data_segment(200, &[0; 16]));

        assert!(buffer.pop_at(SeqNumber(100)).is_none());
        let popped = buffer.pop_at(SeqNumber(200)).unwrap();
        assert_eq!(popped.view().seq_number(), SeqNumber(200));
        assert_eq!(buffer.len(), 1);
    }
}
