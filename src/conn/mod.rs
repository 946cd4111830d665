//! The per-connection STCP runtime.
//!
//! This layer owns everything one connection needs: the state machine
//! context, the retransmit queue, the reorder buffer, and the event loop
//! multiplexing the four event sources (network arrival, application write,
//! application close, timer expiry). It is strictly single threaded and
//! cooperative. The only suspension point is [`Wait::wait_for_event`]; it is
//! the sole place where the loop yields and the sole point at which external
//! events become observable. No locks, no per-segment timers, no threads.
//!
//! The collaborators below and above are traits, deliberately small:
//!
//! * [`Network`] is the unreliable datagram service. One call sends or
//!   receives exactly one segment, best effort, without ordering or delivery
//!   guarantees.
//! * [`Application`] is the byte-stream service towards the user. Bytes the
//!   application wrote are drained with `app_recv`, in-order stream bytes
//!   are pushed up with `app_send`, and `app_unblock`/`app_fin` signal
//!   establishment and peer half-close.
//! * [`Wait`] is the event multiplexer and the clock. All deadlines are
//!   absolute instants of its monotonic clock, which lets tests drive time
//!   by hand.
//!
//! ## Deviations
//!
//! A few places knowingly differ from the TCP standard. Outside of the
//! handshake the SYN flag marks a segment as carrying stream data; a peer
//! speaking standard TCP would be very confused, both ends of a connection
//! must speak this dialect. There is no TIME_WAIT: once the ACK for the
//! last FIN is in, the connection is closed for good. The handshake does
//! not retransmit its SYN. None of these are accidental, they mirror the
//! protocol as deployed.
//!
//! [`Network`]: trait.Network.html
//! [`Application`]: trait.Application.html
//! [`Wait`]: trait.Wait.html
//! [`Wait::wait_for_event`]: trait.Wait.html#tymethod.wait_for_event
use core::{fmt, ops};

use crate::time::{Duration, Expiration, Instant};

mod driver;
mod handshake;
mod isn;
mod recv;
mod reorder;
mod rtx;
mod send;
mod state;

#[cfg(test)]
mod tests;

pub use driver::Driver;
pub use isn::IsnGenerator;
pub use reorder::ReorderBuffer;
pub use rtx::{Entry, RetransmitQueue};
pub use state::{Context, Receive, Send, State};

/// The size of the staging regions for application bytes.
pub const APP_BUFFER_LEN: usize = 3072;

/// How a connection comes into being.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Actively open by sending the first SYN.
    Active,
    /// Passively listen for a peer SYN.
    Passive,
}

/// Tuning constants of a connection.
///
/// The defaults are the deployed protocol constants; deviating from them is
/// possible but both peers should agree at least on the segment size.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Maximum size of one segment, header included.
    pub max_segment_size: usize,

    /// The receive window advertised while the reorder buffer is empty.
    pub local_recv_window: u16,

    /// Upper bound applied to the peer's advertised window.
    ///
    /// This is the entire congestion control mechanism.
    pub congestion_ceiling: u16,

    /// Time between (re-)transmission of a segment and its timeout.
    pub retransmission_timeout: Duration,

    /// Number of retransmissions of a single segment before the connection
    /// is abandoned.
    pub max_retries: u8,

    /// Use the fixed initial sequence number `1` instead of a generated one.
    ///
    /// Deterministic tests want this; everything else does not.
    pub fixed_isn: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_segment_size: crate::wire::MAX_SEGMENT_SIZE,
            local_recv_window: 3072,
            congestion_ceiling: 3072,
            retransmission_timeout: Duration::from_secs(1),
            max_retries: 6,
            fixed_isn: false,
        }
    }
}

/// A set of multiplexer events.
///
/// Several events may be signalled in a single wake, the loop processes
/// each. TIMEOUT is only ever reported on its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Events(pub u8);

impl Events {
    /// No event occurred.
    pub const NONE: Events = Events(0);
    /// A segment arrived from the network.
    pub const NETWORK_DATA: Events = Events(0b0001);
    /// The application queued bytes for sending.
    pub const APP_DATA: Events = Events(0b0010);
    /// The application requested the connection be closed.
    pub const APP_CLOSE_REQUESTED: Events = Events(0b0100);
    /// The deadline passed without any of the masked events occurring.
    pub const TIMEOUT: Events = Events(0b1000);
    /// All external event sources, everything except TIMEOUT.
    pub const ANY: Events = Events(0b0111);

    /// Whether no event bit is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether all bits of `other` are set in `self`.
    pub fn contains(self, other: Events) -> bool {
        self.0 & other.0 == other.0
    }

    /// Return the NETWORK_DATA bit.
    pub fn network_data(self) -> bool {
        self.contains(Self::NETWORK_DATA)
    }

    /// Return the APP_DATA bit.
    pub fn app_data(self) -> bool {
        self.contains(Self::APP_DATA)
    }

    /// Return the APP_CLOSE_REQUESTED bit.
    pub fn app_close_requested(self) -> bool {
        self.contains(Self::APP_CLOSE_REQUESTED)
    }

    /// Return the TIMEOUT bit.
    pub fn timeout(self) -> bool {
        self.contains(Self::TIMEOUT)
    }
}

impl ops::BitOr for Events {
    type Output = Events;

    fn bitor(self, rhs: Events) -> Events {
        Events(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for Events {
    fn bitor_assign(&mut self, rhs: Events) {
        self.0 |= rhs.0;
    }
}

impl ops::BitAnd for Events {
    type Output = Events;

    fn bitand(self, rhs: Events) -> Events {
        Events(self.0 & rhs.0)
    }
}

/// The unreliable datagram service below the connection.
pub trait Network {
    /// Emit one segment, best effort.
    ///
    /// The service gives no ordering or delivery guarantee and the runtime
    /// asks for none, loss is recovered by retransmission.
    fn net_send(&mut self, segment: &[u8]);

    /// Receive one segment into `buf`, returning its length.
    ///
    /// Returns `0` when no segment is currently available. The runtime only
    /// calls this after the multiplexer signalled NETWORK_DATA so that case
    /// is a spurious wake, not an error.
    fn net_recv(&mut self, buf: &mut [u8]) -> usize;
}

/// The application-facing byte-stream service.
pub trait Application {
    /// Drain bytes the application queued for sending, up to `buf.len()`.
    ///
    /// Bytes not drained stay queued and re-signal APP_DATA on the next
    /// wait.
    fn app_recv(&mut self, buf: &mut [u8]) -> usize;

    /// Deliver in-order stream bytes to the application.
    fn app_send(&mut self, bytes: &[u8]);

    /// Signal that the connection has become established.
    fn app_unblock(&mut self);

    /// Signal that the peer closed its half of the stream.
    fn app_fin(&mut self);
}

/// The event multiplexer and clock of the connection.
pub trait Wait {
    /// The current instant of the multiplexer's monotonic clock.
    fn now(&self) -> Instant;

    /// Block until one or more of the masked events occur or the deadline
    /// expires.
    ///
    /// The deadline is an absolute instant of the same clock `now` reads.
    /// An expired deadline must be reported promptly as TIMEOUT even when
    /// no I/O occurred. Events outside `mask` are not reported.
    fn wait_for_event(&mut self, mask: Events, deadline: Expiration) -> Events;
}

/// The error cases a connection can end in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The connection was abandoned without a clean FIN exchange.
    ///
    /// A segment exhausted its retransmissions or a retransmission expired
    /// while the connection was already tearing down.
    ConnectionAborted,
}

/// The result type for running a connection.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ConnectionAborted => write!(f, "connection aborted"),
        }
    }
}
