//! The event loop owning one connection.
use super::{Application, Config, Error, Events, Network, Result, Role, Wait};
use super::APP_BUFFER_LEN;
use super::isn::IsnGenerator;
use super::reorder::ReorderBuffer;
use super::rtx::RetransmitQueue;
use super::state::{Context, State};
use crate::time::Expiration;
use crate::wire::{segment, Flags, Repr, HEADER_LEN, MAX_SEGMENT_SIZE};

/// The runtime of a single connection.
///
/// Owns the context, both queues, and the service handles for its whole
/// lifetime. [`run`] drives the connection from the first SYN to the final
/// state; [`step`] performs a single event-loop iteration for callers that
/// interleave several connections or, as the tests do, both ends of one.
///
/// The source and destination port fields of emitted segments are written
/// as zero: the socket descriptor of the datagram service carries the
/// addressing and the ports are opaque to this layer.
///
/// [`run`]: #method.run
/// [`step`]: #method.step
pub struct Driver<N, A, W> {
    pub(super) cfg: Config,
    pub(super) role: Role,
    pub(super) ctx: Context,
    pub(super) rtx: RetransmitQueue,
    pub(super) reorder: ReorderBuffer,
    pub(super) net: N,
    pub(super) app: A,
    pub(super) wait: W,
    /// Staging region for bytes drained from the application.
    pub(super) app_buf: [u8; APP_BUFFER_LEN],
    /// Staging region for one segment received from the network.
    pub(super) net_buf: [u8; MAX_SEGMENT_SIZE],
}

impl<N, A, W> Driver<N, A, W>
where
    N: Network,
    A: Application,
    W: Wait,
{
    /// Create the runtime for one yet unopened connection.
    ///
    /// The initial sequence number is drawn from the generator unless the
    /// configuration pins it to `1` for deterministic testing.
    pub fn new(net: N, app: A, wait: W, cfg: Config, role: Role, isn: &IsnGenerator) -> Self {
        let iss = if cfg.fixed_isn {
            crate::wire::SeqNumber(1)
        } else {
            isn.get_isn(wait.now())
        };

        Driver {
            ctx: Context::new(iss, cfg.local_recv_window),
            rtx: RetransmitQueue::new(),
            reorder: ReorderBuffer::new(),
            cfg,
            role,
            net,
            app,
            wait,
            app_buf: [0; APP_BUFFER_LEN],
            net_buf: [0; MAX_SEGMENT_SIZE],
        }
    }

    /// Drive the connection from open to close.
    ///
    /// Performs the handshake, unblocks the application, and loops over
    /// [`step`] until the terminal flag is set. Returns `Ok` after a clean
    /// FIN exchange and [`Error::ConnectionAborted`] when the peer stopped
    /// responding.
    ///
    /// [`step`]: #method.step
    /// [`Error::ConnectionAborted`]: enum.Error.html
    pub fn run(&mut self) -> Result<()> {
        self.connect();

        while !self.ctx.done {
            self.step();
        }

        if self.ctx.aborted {
            Err(Error::ConnectionAborted)
        } else {
            Ok(())
        }
    }

    /// Perform the three-way handshake until established.
    ///
    /// Consumes only the network receive path; nothing sent here is ever
    /// retransmitted.
    pub fn connect(&mut self) {
        self.handshake_initiate();

        while self.ctx.current != State::Established {
            let _ = self.wait.wait_for_event(Events::NETWORK_DATA, Expiration::Never);
            self.handshake_step();
        }
    }

    /// One event-loop iteration.
    ///
    /// Sweeps the retransmit queue, waits on the multiplexer with the
    /// earliest retransmission deadline, and dispatches whatever events the
    /// wake reported.
    pub fn step(&mut self) {
        self.sweep();
        if self.ctx.done {
            return;
        }

        let deadline = self.rtx.next_deadline();
        let events = self.wait.wait_for_event(Events::ANY, deadline);

        if events.network_data() {
            self.receive_one();
        }
        if events == Events::TIMEOUT {
            self.retransmit_due();
        }
        if events.app_data() {
            self.transmit_app_data();
        }
        if events.app_close_requested() {
            self.close_initiated();
        }
    }

    /// Inspect the connection state.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Whether the event loop has reached its terminal state.
    pub fn is_done(&self) -> bool {
        self.ctx.done
    }

    /// Apply the state transitions of acknowledged segments and purge them.
    ///
    /// The ACK processor only marks entries; their removal and any
    /// transition they trigger happen here, at the start of the following
    /// iteration.
    pub(super) fn sweep(&mut self) {
        let Driver { ctx, rtx, .. } = self;

        for entry in rtx.drain_acked() {
            ctx.send.unacked = entry.ack_expected();

            if entry.is_fin() {
                match ctx.current {
                    State::FinWait1 => ctx.set_state(State::FinWait2),
                    State::LastAck => {
                        ctx.set_state(State::Closed);
                        ctx.done = true;
                    }
                    _ => (),
                }
            }
        }
    }

    /// React to the retransmission timer firing.
    fn retransmit_due(&mut self) {
        let now = self.wait.now();
        let index = match self.rtx.due(now) {
            Some(index) => index,
            None => return,
        };

        if self.ctx.is_winding_down() || self.rtx.get(index).retries() >= self.cfg.max_retries {
            let entry = self.rtx.remove(index);
            net_debug!("abandoning connection, seq {} exhausted", entry.seq());
            self.ctx.abandon();
            return;
        }

        let deadline = now + self.cfg.retransmission_timeout;
        let Driver { rtx, net, .. } = self;
        rtx.go_back_n(index, deadline, |bytes| net.net_send(bytes));
    }

    /// Emit the cumulative acknowledgement for the current stream position.
    ///
    /// Pure ACKs occupy no sequence space and are never retransmitted, the
    /// next data or FIN segment repeats their information anyway.
    pub(super) fn emit_ack(&mut self) {
        let repr = Repr {
            src_port: 0,
            dst_port: 0,
            flags: Flags::default(),
            seq_number: self.ctx.send.next,
            ack_number: Some(self.ctx.recv.next),
            window_len: self.ctx.recv.window,
            payload_len: 0,
        };

        let mut buf = [0; HEADER_LEN];
        repr.emit(segment::new_unchecked_mut(&mut buf));
        self.net.net_send(&buf);
    }
}
