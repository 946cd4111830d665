/*! Low-level segment access and construction.

# An overview over segment representations

The `wire` module deals with the segment *representation*. It provides three
levels of functionality.

 * First, it provides functions to extract fields from a sequence of octets,
   and to insert fields into a sequence of octets. This happens in the
   lowercase [`segment`] byte wrapper.
 * Second, it provides a compact, high-level representation of header data
   that can be created by parsing and emitted into a sequence of octets.
   This happens through the [`Repr`] struct.
 * Third, it provides an owning buffer type sized for exactly one segment,
   [`Segment`], used wherever a queue holds on to segment bytes past the
   call that produced them.

[`segment`]: struct.segment.html
[`Repr`]: struct.Repr.html
[`Segment`]: struct.Segment.html

The header is a fixed twenty octets in network byte order: ports, sequence
and acknowledgement numbers, a combined offset-and-flags word, the window,
and the (unused) checksum and urgent fields. There are no options; the data
offset is always `5`.

If the `segment::check_len()` method returned `Ok(())`, then no field
accessor or setter method will panic. `Repr::parse()` never panics on
checked input and `Repr::emit()` never panics as long as the underlying
buffer is at least `HEADER_LEN + payload_len` octets long.
*/
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in parts from `smoltcp` originally distributed under 0-clause BSD
//
// Applies to files in this folder. These are:
// * `stcp.rs`

use core::fmt;

mod stcp;

pub use self::stcp::{
    segment,
    Flags,
    Repr,
    Segment,
    SeqNumber,
    HEADER_LEN,
    MAX_SEGMENT_SIZE,
};

mod field {
    pub type Field = ::core::ops::Range<usize>;
}

/// The error type for parsing segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An incoming segment could not be parsed because it was shorter than assumed.
    ///
    /// The buffer may be shorter than the fixed header length, or shorter than the
    /// length a well-formed segment of its kind would have.
    Truncated,

    /// An incoming segment was recognized but was self-contradictory.
    ///
    /// Examples: a data offset other than the five words of an option-less
    /// header, or a segment longer than the maximum segment size.
    Malformed,
}

/// The result type for the wire module.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated => write!(f, "truncated segment"),
            Error::Malformed => write!(f, "malformed segment"),
        }
    }
}
