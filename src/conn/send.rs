//! The segmenter and the sending half of the teardown.
use super::{Application, Network, Wait, APP_BUFFER_LEN};
use super::driver::Driver;
use super::state::State;
use crate::wire::{Flags, Repr, Segment, HEADER_LEN};

impl<N, A, W> Driver<N, A, W>
where
    N: Network,
    A: Application,
    W: Wait,
{
    /// Drain application bytes and send them as segments.
    ///
    /// Never transmits more payload than the peer window minus what is in
    /// flight allows. Whatever the window does not permit stays queued with
    /// the application and re-signals APP_DATA once acknowledgements widen
    /// the window again.
    pub(super) fn transmit_app_data(&mut self) {
        match self.ctx.current {
            State::Established | State::CloseWait => (),
            _ => return,
        }

        let window = usize::from(self.ctx.send.window);
        let budget = window
            .saturating_sub(self.rtx.in_flight())
            .min(APP_BUFFER_LEN);
        if budget == 0 {
            return;
        }

        let len = {
            let Driver { app, app_buf, .. } = self;
            app.app_recv(&mut app_buf[..budget])
        };
        if len == 0 {
            return;
        }

        self.transmit_staged(len);
    }

    /// Chop the staged bytes into segments and hand each to the network.
    ///
    /// Every segment carries the SYN data marker, the cumulative ack, and
    /// our current window; each is queued for retransmission before it goes
    /// out.
    fn transmit_staged(&mut self, len: usize) {
        let max_payload = self.cfg.max_segment_size - HEADER_LEN;
        let deadline = self.wait.now() + self.cfg.retransmission_timeout;

        let mut offset = 0;
        while offset < len {
            let payload_len = (len - offset).min(max_payload);
            let repr = Repr {
                src_port: 0,
                dst_port: 0,
                flags: {
                    let mut flags = Flags::default();
                    flags.set_syn(true);
                    flags
                },
                seq_number: self.ctx.send.next,
                ack_number: Some(self.ctx.recv.next),
                window_len: self.ctx.recv.window,
                payload_len: payload_len as u16,
            };

            let segment = Segment::compose(repr, &self.app_buf[offset..offset + payload_len]);
            net_trace!("sending {}", repr);
            self.net.net_send(segment.as_bytes());
            self.rtx.push(segment, deadline);

            self.ctx.send.next += payload_len;
            offset += payload_len;
        }
    }

    /// React to the application requesting the close.
    ///
    /// Sends the FIN, which occupies one sequence number and is
    /// retransmitted like data, and records which side of the four-way
    /// teardown we are on.
    pub(super) fn close_initiated(&mut self) {
        match self.ctx.current {
            State::Established => self.ctx.set_state(State::FinWait1),
            State::CloseWait => self.ctx.set_state(State::LastAck),
            _ => return,
        }

        let repr = Repr {
            src_port: 0,
            dst_port: 0,
            flags: {
                let mut flags = Flags::default();
                flags.set_fin(true);
                flags
            },
            seq_number: self.ctx.send.next,
            ack_number: Some(self.ctx.recv.next),
            window_len: self.ctx.recv.window,
            payload_len: 0,
        };

        let segment = Segment::compose(repr, &[]);
        let deadline = self.wait.now() + self.cfg.retransmission_timeout;
        net_trace!("sending {}", repr);
        self.net.net_send(segment.as_bytes());
        self.rtx.push(segment, deadline);

        self.ctx.send.next += 1;
    }
}
