//! Initial sequence number generation.
//!
//! Uses a keyed cryptographic hash function (SipHash-2-4) over the
//! connection start time, in the spirit of rfc6528 but reduced to the range
//! the protocol expects: the ISS of a connection is drawn from `[0, 255]`.
//! Hash function SipHash-2-4 from:
//!
//! > SipHash: a fast short-input PRF, Jean-Philippe Aumasson and Daniel J. Bernstein
use crate::time::Instant;
use crate::wire::SeqNumber;

/// An initial sequence number generator based on SipHash-2-4.
///
/// The sixteen byte key makes the chosen ISS unpredictable to an off-path
/// observer; the connection start time varies it between connections of the
/// same endpoint. Deterministic tests bypass the generator entirely through
/// the `fixed_isn` configuration flag.
pub struct IsnGenerator {
    keys: (u64, u64),
}

// Yes, that's the initial values, as ASCII text.
const IV: [&[u8; 8]; 4] = [
    b"somepseu",
    b"dorandom",
    b"lygenera",
    b"tedbytes"];

struct State {
    v0: u64,
    v1: u64,
    v2: u64,
    v3: u64,
}

impl IsnGenerator {
    /// Create a generator by deriving a key from the standard `RandomState`.
    ///
    /// This is done by individually hashing the numbers `0u64` and `1u64`
    /// each with the same hasher created from a new instance of
    /// `RandomState`. The two output tags are then used as the internal key
    /// state.
    #[cfg(feature = "std")]
    pub fn from_std_hash() -> Self {
        use std::hash::{Hasher, BuildHasher};
        use std::collections::hash_map::RandomState;

        let hash = RandomState::new().build_hasher();
        let x0 = {
            let mut hash = hash.clone();
            hash.write_u64(0);
            hash.finish()
        };
        let x1 = {
            let mut hash = hash.clone();
            hash.write_u64(1);
            hash.finish()
        };

        IsnGenerator {
            keys: (x0, x1),
        }
    }

    /// Create a generator with some pre-defined secret key.
    ///
    /// Really, create the key with some cryptographic random means or derive
    /// it from some other key with a key derivation function.
    pub fn from_secret_key_bytes(bytes: [u8; 16]) -> Self {
        use core::convert::TryInto;
        let a = u64::from_le_bytes(bytes[..8].try_into().unwrap());
        let b = u64::from_le_bytes(bytes[8..].try_into().unwrap());
        IsnGenerator { keys: (a, b), }
    }

    /// Get an initial sequence number for a connection opened now.
    ///
    /// The result lies in `[0, 255]`, the range the protocol draws its
    /// initial sequence numbers from.
    pub fn get_isn(&self, time: Instant) -> SeqNumber {
        let mut state = State::init(self.keys.0, self.keys.1);

        let m = time.total_millis() as u64;
        // Message length = 8, absorbed with the final block.
        let p = 8_u64 << 56;
        state.absorb(m);
        state.absorb(p);
        let num = state.finalize();

        SeqNumber((num & 0xff) as i32)
    }
}

impl State {
    const SIP_C: usize = 2;
    const SIP_D: usize = 4;

    fn init(k0: u64, k1: u64) -> Self {
        State {
            v0: u64::from_be_bytes(*IV[0]) ^ k0,
            v1: u64::from_be_bytes(*IV[1]) ^ k1,
            v2: u64::from_be_bytes(*IV[2]) ^ k0,
            v3: u64::from_be_bytes(*IV[3]) ^ k1,
        }
    }

    fn round(&mut self) {
        self.v0 = self.v0.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(13);
        self.v1 ^= self.v0;
        self.v0 = self.v0.rotate_left(32);
        self.v2 = self.v2.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(16);
        self.v3 ^= self.v2;
        self.v0 = self.v0.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(21);
        self.v3 ^= self.v0;
        self.v2 = self.v2.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(17);
        self.v1 ^= self.v2;
        self.v2 = self.v2.rotate_left(32);
    }

    /// Process a single portion of the message.
    ///
    /// All users need to manually absorb the length in the last block. This
    /// is slightly easier to read since it arranges the input to only have
    /// 8-byte blocks in all cases which separates the length block
    /// completely and makes it a constant.
    fn absorb(&mut self, m: u64) {
        self.v3 ^= m;
        (0..Self::SIP_C).for_each(|_| self.round());
        self.v0 ^= m;
    }

    /// Do the finalization rounds.
    fn finalize(mut self) -> u64 {
        self.v2 ^= 0xff;
        (0..Self::SIP_D).for_each(|_| self.round());
        self.v0 ^ self.v1 ^ self.v2 ^ self.v3
    }
}
