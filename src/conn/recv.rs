//! The receiver: classification, the reorder buffer discipline, and the
//! ACK processor.
use super::{Application, Network, Wait};
use super::driver::Driver;
use super::state::State;
use crate::wire::{segment, Repr, Segment, SeqNumber};

impl<N, A, W> Driver<N, A, W>
where
    N: Network,
    A: Application,
    W: Wait,
{
    /// Receive and process one segment from the network.
    pub(super) fn receive_one(&mut self) {
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
                net_debug!("dropping segment: {}", err);
                return;
            }
        };
        net_trace!("received {}", repr);

        // Every inbound segment refreshes the peer window advertisement.
        self.ctx.set_peer_window(repr.window_len, self.cfg.congestion_ceiling);

        if repr.flags.syn() || repr.flags.fin() {
            // UNWRAP: the byte view just parsed, it fits the owned buffer.
            let owned = Segment::copy_from_slice(&self.net_buf[..len]).unwrap();
            self.receive_stream_segment(owned);
        } else if repr.ack_number.is_some() && repr.payload_len == 0 {
            self.process_ack(repr.ack_number.unwrap());
        } else {
            net_debug!("dropping segment, no flags and no ack");
        }
    }

    /// Handle a data-bearing or FIN segment.
    ///
    /// Stale and duplicate segments only provoke a repeated cumulative ACK.
    /// Out-of-order segments within the window are buffered and charged
    /// against it; the in-order case delivers, drains the reorder buffer as
    /// far as it now reaches, and acknowledges the new stream position.
    fn receive_stream_segment(&mut self, segment: Segment) {
        let seq = segment.view().seq_number();
        let rcv_nxt = self.ctx.recv.next;

        if seq < rcv_nxt {
            net_trace!("stale segment {}, expecting {}", seq, rcv_nxt);
            return self.emit_ack();
        }

        if seq != rcv_nxt {
            return self.receive_out_of_order(segment);
        }

        self.deliver(segment);
        while let Some(next) = self.reorder.pop_at(self.ctx.recv.next) {
            // Delivered entries return their charge to the window.
            self.ctx.recv.window += next.wire_len() as u16;
            self.deliver(next);
        }

        self.emit_ack()
    }

    /// Buffer a segment that arrived ahead of the stream.
    fn receive_out_of_order(&mut self, segment: Segment) {
        let seq = segment.view().seq_number();

        if self.reorder.contains(seq) {
            net_trace!("duplicate of buffered segment {}", seq);
            return self.emit_ack();
        }

        let distance = seq - self.ctx.recv.next;
        let charge = segment.wire_len() as u16;
        if distance >= usize::from(self.ctx.recv.window) || charge > self.ctx.recv.window {
            net_debug!("segment {} outside the receive window", seq);
            return self.emit_ack();
        }

        self.ctx.recv.window -= charge;
        let inserted = self.reorder.insert(segment);
        debug_assert!(inserted);

        // The gap before it is still open, the cumulative ACK stands.
        self.emit_ack()
    }

    /// Deliver one in-order segment and apply its state transitions.
    fn deliver(&mut self, segment: Segment) {
        let view = segment.view();
        let flags = view.flags();
        let payload = view.payload_slice();

        self.ctx.recv.next += view.sequence_len();

        if !payload.is_empty() {
            self.app.app_send(payload);
        }

        if flags.fin() {
            self.app.app_fin();
            match self.ctx.current {
                State::FinWait1 | State::FinWait2 => {
                    self.ctx.set_state(State::Closed);
                    self.ctx.done = true;
                }
                _ => self.ctx.set_state(State::CloseWait),
            }
        }
    }

    /// Apply a cumulative acknowledgement to the retransmit queue.
    ///
    /// Entries are only marked here; the sweep at the start of the next
    /// iteration removes them and performs the transitions they trigger. An
    /// acknowledgement for nothing in flight is silently ignored.
    fn process_ack(&mut self, ack: SeqNumber) {
        if !self.rtx.mark_acked(ack) {
            net_trace!("ack {} matches nothing in flight", ack);
        }
    }
}
