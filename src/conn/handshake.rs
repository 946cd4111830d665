//! The three-way handshake, active and passive.
//!
//! Runs before the event loop and consumes only the network receive path.
//! An active open starts directly in SynSent, a passive one in Listen. A
//! SYN arriving in SynSent is the simultaneous open; answering it with
//! SYN+ACK moves to SynReceived and the subsequent ACK completes. Nothing
//! sent here is retransmitted, a lost handshake segment stalls the open
//! until the peer repeats its part.
use super::{Application, Network, Role, Wait};
use super::driver::Driver;
use super::state::State;
use crate::wire::{segment, Flags, Repr, SeqNumber, HEADER_LEN};

impl<N, A, W> Driver<N, A, W>
where
    N: Network,
    A: Application,
    W: Wait,
{
    /// Take the first step of the handshake.
    ///
    /// The active side sends its SYN and moves to SynSent, the passive side
    /// just starts listening.
    pub(super) fn handshake_initiate(&mut self) {
        match self.role {
            Role::Active => {
                let iss = self.ctx.send.initial_seq;
                self.send_handshake_segment(iss, None, true);
                self.ctx.set_state(State::SynSent);
            }
            Role::Passive => {
                self.ctx.set_state(State::Listen);
            }
        }
    }

    /// Consume one handshake segment and react to it.
    ///
    /// Anything that does not fit the current state is dropped without an
    /// answer; the protocol knows no RST.
    pub(super) fn handshake_step(&mut self) {
        let len = {
            let Driver { net, net_buf, .. } = self;
            net.net_recv(&mut net_buf[..])
        };
        if len == 0 {
            return;
        }

        let repr = match segment::new_checked(&self.net_buf[..len]).and_then(Repr::parse) {
            Ok(repr) => repr,
            Err(err) => {
                net_debug!("dropping handshake segment: {}", err);
                return;
            }
        };

        let iss = self.ctx.send.initial_seq;
        match self.ctx.current {
            // The normal active-open completion.
            State::SynSent if repr.flags.syn() && repr.ack_number.is_some() => {
                if repr.ack_number != Some(iss + 1) {
                    net_debug!("dropping syn+ack, acks {:?}", repr.ack_number);
                    return;
                }

                self.record_peer(repr);
                self.send_handshake_segment(iss + 1, Some(self.ctx.recv.next), false);
                self.establish();
            }

            // Simultaneous open, or the usual opening of a listener.
            State::SynSent | State::Listen if repr.flags.syn() => {
                self.record_peer(repr);
                self.send_handshake_segment(iss, Some(self.ctx.recv.next), true);
                self.ctx.set_state(State::SynReceived);
            }

            State::SynReceived if repr.flags.ack() => {
                if repr.ack_number != Some(iss + 1) {
                    net_debug!("dropping ack, acks {:?}", repr.ack_number);
                    return;
                }

                self.ctx.set_peer_window(repr.window_len, self.cfg.congestion_ceiling);
                if repr.flags.syn() {
                    // The peer combined its SYN with the ACK, answer it.
                    self.send_handshake_segment(iss + 1, Some(self.ctx.recv.next), false);
                }
                self.establish();
            }

            _ => net_debug!("dropping segment in {:?}", self.ctx.current),
        }
    }

    /// Record the peer's initial sequence number and window.
    fn record_peer(&mut self, repr: Repr) {
        self.ctx.recv.initial_seq = repr.seq_number;
        self.ctx.recv.next = repr.seq_number + 1;
        self.ctx.set_peer_window(repr.window_len, self.cfg.congestion_ceiling);
    }

    /// Emit one header-only handshake segment.
    ///
    /// These are not queued for retransmission.
    fn send_handshake_segment(&mut self, seq: SeqNumber, ack: Option<SeqNumber>, syn: bool) {
        let repr = Repr {
            src_port: 0,
            dst_port: 0,
            flags: {
                let mut flags = Flags::default();
                flags.set_syn(syn);
                flags
            },
            seq_number: seq,
            ack_number: ack,
            window_len: self.ctx.recv.window,
            payload_len: 0,
        };

        let mut buf = [0; HEADER_LEN];
        repr.emit(segment::new_unchecked_mut(&mut buf));
        self.net.net_send(&buf);
    }

    /// Enter Established and hand control to the application.
    fn establish(&mut self) {
        let iss = self.ctx.send.initial_seq;
        self.ctx.send.unacked = iss + 1;
        self.ctx.send.next = iss + 1;
        self.ctx.set_state(State::Established);
        self.app.app_unblock();
    }
}
