use crate::wire::SeqNumber;

/// The state of a connection.
///
/// Includes the current state machine state and the sequence number
/// bookkeeping for both directions of the stream. The context is created at
/// open, owned exclusively by the connection runtime, and destroyed at
/// close; nothing in it is shared across connections.
#[derive(Clone, Copy, Debug)]
pub struct Context {
    /// The current state of the state machine.
    pub current: State,

    /// The sending state.
    ///
    /// In RFC793 this is referred to as `SND`.
    pub send: Send,

    /// The receiving state.
    ///
    /// In RFC793 this is referred to as `RCV`.
    pub recv: Receive,

    /// Set once the connection is closed and the event loop must exit.
    pub done: bool,

    /// Set when the close was an abandonment instead of a FIN exchange.
    pub aborted: bool,
}

/// The sending half of the sequence number bookkeeping.
#[derive(Clone, Copy, Debug)]
pub struct Send {
    /// The oldest not yet acknowledged sequence number.
    ///
    /// In RFC793 this is referred to as `SND.UNA`.
    pub unacked: SeqNumber,

    /// The next sequence number to use for transmission.
    ///
    /// In RFC793 this is referred to as `SND.NXT`.
    pub next: SeqNumber,

    /// The send window size indicated by the receiver, already clamped to
    /// the congestion ceiling.
    ///
    /// Payload in flight must never exceed it. In RFC793 this is referred
    /// to as `SND.WND`.
    pub window: u16,

    /// The initial sequence number.
    ///
    /// This is read-only after the handshake and mostly useful for
    /// debugging. In RFC793 this is referred to as `ISS`.
    pub initial_seq: SeqNumber,
}

/// The receiving half of the sequence number bookkeeping.
#[derive(Clone, Copy, Debug)]
pub struct Receive {
    /// The next expected sequence number.
    ///
    /// Also the number every cumulative ACK we emit carries. In RFC793 this
    /// is referred to as `RCV.NXT`.
    pub next: SeqNumber,

    /// The receive window we advertise.
    ///
    /// Decreases while the reorder buffer holds segments, increases again
    /// when their bytes are delivered. In RFC793 this is referred to as
    /// `RCV.WND`.
    pub window: u16,

    /// The peer's initial sequence number, recorded during the handshake.
    pub initial_seq: SeqNumber,
}

/// State enum of the statemachine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    /// Marker state for a connection that is gone or was never opened.
    Closed,

    /// A listening connection, waiting for a peer SYN.
    Listen,

    /// An open connection request.
    SynSent,

    /// Connection request we intend to answer, waiting on ack.
    SynReceived,

    /// An open connection.
    Established,

    /// Closed our side of the connection.
    FinWait1,

    /// Closing connection nicely, initiated by us and acknowledged.
    FinWait2,

    /// Other side closed its connection.
    CloseWait,

    /// Connection closed after other side closed its already.
    LastAck,
}

impl Context {
    /// A fresh context around the chosen initial sequence number.
    pub fn new(initial_seq: SeqNumber, local_window: u16) -> Self {
        Context {
            current: State::Closed,
            send: Send {
                unacked: initial_seq,
                next: initial_seq,
                window: local_window,
                initial_seq,
            },
            recv: Receive {
                next: SeqNumber::default(),
                window: local_window,
                initial_seq: SeqNumber::default(),
            },
            done: false,
            aborted: false,
        }
    }

    /// Transition to a new state.
    pub fn set_state(&mut self, state: State) {
        net_trace!("{:?} -> {:?}", self.current, state);
        self.current = state;
    }

    /// Record the peer's advertised window, clamped to the ceiling.
    pub fn set_peer_window(&mut self, advertised: u16, ceiling: u16) {
        self.send.window = advertised.min(ceiling);
    }

    /// Close the connection without a FIN exchange.
    pub fn abandon(&mut self) {
        self.set_state(State::Closed);
        self.done = true;
        self.aborted = true;
    }

    /// Whether the connection is in a state where retransmission no longer
    /// makes sense.
    ///
    /// A timeout in one of these states kills the connection instead of
    /// going back N.
    pub fn is_winding_down(&self) -> bool {
        match self.current {
            State::Closed
            | State::LastAck
            | State::FinWait1
            | State::FinWait2 => true,
            _ => false,
        }
    }
}

impl Default for State {
    fn default() -> Self {
        State::Closed
    }
}
