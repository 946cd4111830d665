//! The queue of unacknowledged outgoing segments.
//!
//! Every transmitted segment that expects acknowledgement parks here until
//! a cumulative ACK covers it or its retransmissions are exhausted. The
//! queue is the ground truth for the Go-Back-N scheme: a timeout of the
//! oldest deadline retransmits that entry and everything behind it.
use alloc::vec::Vec;

use crate::time::{Expiration, Instant};
use crate::wire::{Segment, SeqNumber};

/// One in-flight segment.
///
/// The entry owns its segment bytes by value; the header view is a
/// read-only projection computed on demand.
#[derive(Debug)]
pub struct Entry {
    segment: Segment,
    seq: SeqNumber,
    ack_expected: SeqNumber,
    deadline: Instant,
    retries: u8,
    acked: bool,
}

/// The retransmit queue of a single connection.
///
/// Invariants: entries are ordered strictly by sequence number, no two
/// entries share one, their numbers exactly cover `[snd_una, snd_nxt)`, and
/// the payload they carry never exceeds the peer window at send time. The
/// entry count is bounded by the peer window over the payload floor so the
/// queue never grows past a small ceiling.
#[derive(Debug, Default)]
pub struct RetransmitQueue {
    entries: Vec<Entry>,
}

impl Entry {
    /// The sequence number of the segment.
    pub fn seq(&self) -> SeqNumber {
        self.seq
    }

    /// The acknowledgement number that covers this segment.
    ///
    /// That is its sequence number plus its length in sequence space.
    pub fn ack_expected(&self) -> SeqNumber {
        self.ack_expected
    }

    /// The number of retransmissions so far.
    pub fn retries(&self) -> u8 {
        self.retries
    }

    /// When the next retransmission fires.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Whether the segment carries a FIN.
    pub fn is_fin(&self) -> bool {
        self.segment.view().flags().fin()
    }

    /// The octets that go over the wire.
    pub fn as_bytes(&self) -> &[u8] {
        self.segment.as_bytes()
    }

    fn payload_len(&self) -> usize {
        self.segment.view().payload_slice().len()
    }
}

impl RetransmitQueue {
    /// An empty queue.
    pub fn new() -> Self {
        RetransmitQueue::default()
    }

    /// Whether no segment is waiting for acknowledgement.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of queued segments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The payload octets currently in flight.
    ///
    /// Entries already covered by an ACK but not yet swept out do not
    /// count, their bytes have arrived.
    pub fn in_flight(&self) -> usize {
        self.entries.iter()
            .filter(|entry| !entry.acked)
            .map(Entry::payload_len)
            .sum()
    }

    /// Append a freshly sent segment.
    ///
    /// Sequence numbers only ever move forward so appending keeps the queue
    /// ordered.
    pub fn push(&mut self, segment: Segment, deadline: Instant) {
        let seq = segment.view().seq_number();
        let ack_expected = seq + segment.view().sequence_len();
        debug_assert!(self.entries.last().map_or(true, |last| last.seq < seq));

        self.entries.push(Entry {
            segment,
            seq,
            ack_expected,
            deadline,
            retries: 0,
            acked: false,
        });
    }

    /// Apply a cumulative acknowledgement.
    ///
    /// Finds the entry whose expected acknowledgement number matches `ack`
    /// exactly and marks it and every earlier entry as acknowledged.
    /// Returns whether any entry matched; an unknown number changes
    /// nothing and is reported as such for the caller to ignore.
    pub fn mark_acked(&mut self, ack: SeqNumber) -> bool {
        let position = match self.entries.iter().position(|entry| entry.ack_expected == ack) {
            Some(position) => position,
            None => return false,
        };

        for entry in &mut self.entries[..=position] {
            entry.acked = true;
        }
        true
    }

    /// Remove acknowledged entries, handing each to the caller.
    ///
    /// Cumulative marking only ever acknowledges a prefix of the queue so
    /// this pops from the front.
    pub fn drain_acked(&mut self) -> impl Iterator<Item = Entry> + '_ {
        let acked = self.entries.iter()
            .take_while(|entry| entry.acked)
            .count();
        self.entries.drain(..acked)
    }

    /// The earliest deadline among unacknowledged entries.
    ///
    /// This is the timeout the event loop passes to the multiplexer.
    pub fn next_deadline(&self) -> Expiration {
        self.entries.iter()
            .filter(|entry| !entry.acked)
            .map(|entry| entry.deadline)
            .min()
            .into()
    }

    /// The unacknowledged entry whose deadline has passed, if any.
    ///
    /// Of several expired entries this reports the oldest deadline, the one
    /// the wait timed out on.
    pub fn due(&self, now: Instant) -> Option<usize> {
        self.entries.iter()
            .enumerate()
            .filter(|(_, entry)| !entry.acked)
            .min_by_key(|(_, entry)| entry.deadline)
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(index, _)| index)
    }

    /// Inspect an entry by index.
    pub fn get(&self, index: usize) -> &Entry {
        &self.entries[index]
    }

    /// Drop an entry without acknowledgement.
    pub fn remove(&mut self, index: usize) -> Entry {
        self.entries.remove(index)
    }

    /// Go back N: retransmit the expired entry and every one behind it.
    ///
    /// Every retransmitted entry gets the fresh deadline; only the
    /// triggering entry has its retry counter incremented.
    pub fn go_back_n<F>(&mut self, from: usize, deadline: Instant, mut emit: F)
        where F: FnMut(&[u8])
    {
        self.entries[from].retries += 1;

        for entry in self.entries[from..].iter_mut().filter(|entry| !entry.acked) {
            entry.deadline = deadline;
            emit(entry.segment.as_bytes());
        }
    }
}
