use core::{cmp, fmt, ops};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};

/// The length of the fixed, option-less header in octets.
pub const HEADER_LEN: usize = field::URGENT.end;

/// The maximum segment size, header included.
pub const MAX_SEGMENT_SIZE: usize = 536;

/// An STCP sequence number.
///
/// A sequence number is a monotonically advancing integer modulo 2<sup>32</sup>.
/// Sequence numbers do not have a discontiguity when compared pairwise across a signed overflow.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub i32);

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0 as u32)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        if rhs > i32::max_value() as usize {
            panic!("attempt to add to sequence number with unsigned overflow")
        }
        SeqNumber(self.0.wrapping_add(rhs as i32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl ops::Sub for SeqNumber {
    type Output = usize;

    fn sub(self, rhs: SeqNumber) -> usize {
        let result = self.0.wrapping_sub(rhs.0);
        if result < 0 {
            panic!("attempt to subtract sequence numbers with underflow")
        }
        result as usize
    }
}

impl cmp::PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &SeqNumber) -> Option<cmp::Ordering> {
        self.0.wrapping_sub(other.0).partial_cmp(&0)
    }
}

/// A set of segment flags.
///
/// Only the low six bits of the flag octet are meaningful and of those the
/// protocol uses SYN, ACK and FIN. Note one deviation from standard TCP that
/// both peers must agree on: outside of the handshake, the SYN flag marks a
/// segment as carrying stream data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags(pub u16);

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::Field;

    pub const SRC_PORT: Field = 0..2;
    pub const DST_PORT: Field = 2..4;
    pub const SEQ_NUM:  Field = 4..8;
    pub const ACK_NUM:  Field = 8..12;
    pub const FLAGS:    Field = 12..14;
    pub const WIN_SIZE: Field = 14..16;
    pub const CHECKSUM: Field = 16..18;
    pub const URGENT:   Field = 18..20;

    pub const FLG_FIN: u16 = 0x001;
    pub const FLG_SYN: u16 = 0x002;
    pub const FLG_ACK: u16 = 0x010;

    pub const FLG_MASK: u16 = 0x03f;
}

byte_wrapper! {
    /// A byte sequence representing an STCP segment.
    #[derive(Debug, PartialEq, Eq)]
    pub struct segment([u8]);
}

impl segment {
    /// Interpret a raw octet buffer as a segment.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Interpret a mutable raw octet buffer as a segment.
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        let this = Self::new_unchecked(data);
        this.check_len()?;
        Ok(this)
    }

    /// Ensure that no header accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is too short and
    /// `Err(Error::Malformed)` if the data offset is not the five words of an
    /// option-less header or the buffer exceeds the maximum segment size.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < HEADER_LEN {
            Err(Error::Truncated)
        } else if self.0.len() > MAX_SEGMENT_SIZE {
            Err(Error::Malformed)
        } else if self.header_len() as usize != HEADER_LEN {
            Err(Error::Malformed)
        } else {
            Ok(())
        }
    }

    /// Return the underlying octets.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Return the source port field.
    #[inline]
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::SRC_PORT])
    }

    /// Return the destination port field.
    #[inline]
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::DST_PORT])
    }

    /// Return the sequence number field.
    #[inline]
    pub fn seq_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_i32(&self.0[field::SEQ_NUM]))
    }

    /// Return the acknowledgement number field.
    #[inline]
    pub fn ack_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_i32(&self.0[field::ACK_NUM]))
    }

    /// Read all flags at once.
    pub fn flags(&self) -> Flags {
        Flags(NetworkEndian::read_u16(&self.0[field::FLAGS]) & field::FLG_MASK)
    }

    /// Return the header length, in octets.
    #[inline]
    pub fn header_len(&self) -> u8 {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]);
        ((raw >> 12) * 4) as u8
    }

    /// Return the window size field.
    #[inline]
    pub fn window_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::WIN_SIZE])
    }

    /// Return the checksum field.
    ///
    /// The protocol neither fills nor verifies it, it is always zero.
    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Return the urgent pointer field, always zero.
    #[inline]
    pub fn urgent_at(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::URGENT])
    }

    /// Return the payload octets following the header.
    #[inline]
    pub fn payload_slice(&self) -> &[u8] {
        &self.0[HEADER_LEN..]
    }

    /// Return the length of the segment, in terms of sequence space.
    pub fn sequence_len(&self) -> usize {
        self.payload_slice().len() + self.flags().sequence_len()
    }

    /// Set the source port field.
    #[inline]
    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::SRC_PORT], value)
    }

    /// Set the destination port field.
    #[inline]
    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::DST_PORT], value)
    }

    /// Set the sequence number field.
    #[inline]
    pub fn set_seq_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_i32(&mut self.0[field::SEQ_NUM], value.0)
    }

    /// Set the acknowledgement number field.
    #[inline]
    pub fn set_ack_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_i32(&mut self.0[field::ACK_NUM], value.0)
    }

    /// Set a combination of flags, leaving the data offset untouched.
    #[inline]
    pub fn set_flags(&mut self, Flags(flags): Flags) {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]) & !0x0fff;
        NetworkEndian::write_u16(&mut self.0[field::FLAGS], raw | (flags & field::FLG_MASK))
    }

    /// Set the header length, in octets.
    #[inline]
    pub fn set_header_len(&mut self, value: u8) {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]);
        let raw = (raw & !0xf000) | (u16::from(value) / 4) << 12;
        NetworkEndian::write_u16(&mut self.0[field::FLAGS], raw)
    }

    /// Set the window size field.
    #[inline]
    pub fn set_window_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::WIN_SIZE], value)
    }

    /// Set the checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    /// Set the urgent pointer field.
    #[inline]
    pub fn set_urgent_at(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::URGENT], value)
    }

    /// Return a mutable reference to the payload octets.
    #[inline]
    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0[HEADER_LEN..]
    }
}

impl Flags {
    /// Return the FIN flag.
    #[inline]
    pub fn fin(&self) -> bool {
        self.0 & field::FLG_FIN != 0
    }

    /// Return the SYN flag.
    #[inline]
    pub fn syn(&self) -> bool {
        self.0 & field::FLG_SYN != 0
    }

    /// Return the ACK flag.
    #[inline]
    pub fn ack(&self) -> bool {
        self.0 & field::FLG_ACK != 0
    }

    /// Set the FIN flag.
    #[inline]
    pub fn set_fin(&mut self, value: bool) {
        let flag = if value { field::FLG_FIN } else { 0 };
        self.0 = (self.0 & !field::FLG_FIN) | flag;
    }

    /// Set the SYN flag.
    #[inline]
    pub fn set_syn(&mut self, value: bool) {
        let flag = if value { field::FLG_SYN } else { 0 };
        self.0 = (self.0 & !field::FLG_SYN) | flag;
    }

    /// Set the ACK flag.
    #[inline]
    pub fn set_ack(&mut self, value: bool) {
        let flag = if value { field::FLG_ACK } else { 0 };
        self.0 = (self.0 & !field::FLG_ACK) | flag;
    }

    /// Return the length of the control flags, in terms of sequence space.
    ///
    /// Only FIN counts here. In this variant SYN marks stream data outside of
    /// the handshake and owns no sequence space of its own; the handshake
    /// driver accounts for the numbers of its SYN segments explicitly.
    pub fn sequence_len(self) -> usize {
        if self.fin() { 1 } else { 0 }
    }
}

/// A high-level representation of an STCP segment header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    /// The source port, opaque to the connection runtime.
    pub src_port: u16,
    /// The destination port, opaque to the connection runtime.
    pub dst_port: u16,
    /// The flags, without ACK which follows from `ack_number`.
    pub flags: Flags,
    /// The sequence number of the first payload octet.
    pub seq_number: SeqNumber,
    /// The acknowledgement number if the ACK flag is set.
    pub ack_number: Option<SeqNumber>,
    /// The advertised receive window.
    pub window_len: u16,
    /// The number of payload octets following the header.
    pub payload_len: u16,
}

impl Repr {
    /// Parse a segment and return a high-level representation.
    pub fn parse(seg: &segment) -> Result<Repr> {
        seg.check_len()?;

        let flags = seg.flags();
        let ack_number = if flags.ack() {
            Some(seg.ack_number())
        } else {
            None
        };

        Ok(Repr {
            src_port:    seg.src_port(),
            dst_port:    seg.dst_port(),
            flags,
            seq_number:  seg.seq_number(),
            ack_number,
            window_len:  seg.window_len(),
            payload_len: seg.payload_slice().len() as u16,
        })
    }

    /// Return the length of the emitted header, always [HEADER_LEN].
    ///
    /// [HEADER_LEN]: constant.HEADER_LEN.html
    pub fn header_len(&self) -> usize {
        HEADER_LEN
    }

    /// Return the length of a buffer emitting this representation.
    pub fn buffer_len(&self) -> usize {
        self.header_len() + usize::from(self.payload_len)
    }

    /// Emit this high-level representation into a segment.
    ///
    /// The checksum is written as zero, it is neither computed nor verified
    /// anywhere in the protocol.
    pub fn emit(&self, seg: &mut segment) {
        seg.set_src_port(self.src_port);
        seg.set_dst_port(self.dst_port);
        seg.set_seq_number(self.seq_number);
        seg.set_ack_number(self.ack_number.unwrap_or(SeqNumber(0)));
        seg.set_header_len(HEADER_LEN as u8);
        let mut flags = self.flags;
        flags.set_ack(self.ack_number.is_some());
        seg.set_flags(flags);
        seg.set_window_len(self.window_len);
        seg.set_checksum(0);
        seg.set_urgent_at(0);
    }

    /// Return the length of the segment, in terms of sequence space.
    pub fn sequence_len(&self) -> usize {
        usize::from(self.payload_len) + self.flags.sequence_len()
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "STCP src={} dst={}", self.src_port, self.dst_port)?;
        if self.flags.syn() { write!(f, " syn")? }
        if self.flags.fin() { write!(f, " fin")? }
        write!(f, " seq={}", self.seq_number)?;
        if let Some(ack_number) = self.ack_number {
            write!(f, " ack={}", ack_number)?;
        }
        write!(f, " win={}", self.window_len)?;
        write!(f, " len={}", self.payload_len)
    }
}

/// An owned buffer holding exactly one segment.
///
/// Queues that hold on to segments past the call that produced them, the
/// retransmit queue and the reorder buffer, store this type by value. The
/// header view is a projection computed on demand through [`view`], nothing
/// is cached alongside the bytes.
///
/// [`view`]: #method.view
#[derive(Clone)]
pub struct Segment {
    len: u16,
    data: [u8; MAX_SEGMENT_SIZE],
}

impl Segment {
    /// Copy one received segment into an owned buffer.
    ///
    /// Validates the header along the way so that later views need no
    /// further checks.
    pub fn copy_from_slice(bytes: &[u8]) -> Result<Segment> {
        segment::new_checked(bytes)?;
        let mut data = [0; MAX_SEGMENT_SIZE];
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(Segment { len: bytes.len() as u16, data })
    }

    /// Build a segment from a header representation and its payload.
    ///
    /// # Panics
    /// This function panics if `payload` does not match `repr.payload_len` or
    /// the resulting segment would exceed the maximum segment size.
    pub fn compose(repr: Repr, payload: &[u8]) -> Segment {
        assert_eq!(payload.len(), usize::from(repr.payload_len));
        assert!(repr.buffer_len() <= MAX_SEGMENT_SIZE);

        let mut data = [0; MAX_SEGMENT_SIZE];
        repr.emit(segment::new_unchecked_mut(&mut data));
        data[HEADER_LEN..repr.buffer_len()].copy_from_slice(payload);
        Segment { len: repr.buffer_len() as u16, data }
    }

    /// The wire length of the segment, header included.
    pub fn wire_len(&self) -> usize {
        usize::from(self.len)
    }

    /// Return the segment octets.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }

    /// View the header fields of the owned bytes.
    pub fn view(&self) -> &segment {
        segment::new_unchecked(self.as_bytes())
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Segment")
            .field("len", &self.len)
            .field("seq", &self.view().seq_number())
            .field("flags", &self.view().flags())
            .finish()
    }
}
