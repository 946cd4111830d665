use super::{Config, Driver, Error, Events, IsnGenerator, Role, State};
use crate::sim::{channel, App, Clock, Endpoint, Loss, Waiter};
use crate::time::Duration;
use crate::wire::{segment, Flags, Repr, Segment, SeqNumber, MAX_SEGMENT_SIZE};

struct Host {
    driver: Driver<Endpoint, App, Waiter>,
    app: App,
    net: Endpoint,
    waiter: Waiter,
    clock: Clock,
}

fn host(net: Endpoint, clock: &Clock, role: Role) -> Host {
    let app = App::new();
    let waiter = Waiter::new(clock, &net, &app);
    let cfg = Config {
        fixed_isn: true,
        ..Config::default()
    };
    let isn = IsnGenerator::from_secret_key_bytes([7; 16]);
    let driver = Driver::new(net.clone(), app.clone(), waiter.clone(), cfg, role, &isn);

    Host { driver, app, net, waiter, clock: clock.clone() }
}

/// Two connected hosts sharing one clock.
fn pair() -> (Host, Host) {
    let clock = Clock::new();
    let (na, nb) = channel();
    (host(na, &clock, Role::Active), host(nb, &clock, Role::Passive))
}

/// One host whose peer is played by the test through the raw endpoint.
fn scripted(role: Role) -> (Host, Endpoint) {
    let clock = Clock::new();
    let (local, peer) = channel();
    (host(local, &clock, role), peer)
}

fn raw(seq: i32, ack: Option<i32>, syn: bool, fin: bool, window: u16, payload: &[u8]) -> Vec<u8> {
    let mut flags = Flags::default();
    flags.set_syn(syn);
    flags.set_fin(fin);
    let repr = Repr {
        src_port: 0,
        dst_port: 0,
        flags,
        seq_number: SeqNumber(seq),
        ack_number: ack.map(SeqNumber),
        window_len: window,
        payload_len: payload.len() as u16,
    };
    Segment::compose(repr, payload).as_bytes().to_vec()
}

fn recv_one(peer: &mut Endpoint) -> Vec<u8> {
    use super::Network;
    let mut buf = [0; MAX_SEGMENT_SIZE];
    let len = peer.net_recv(&mut buf);
    assert!(len > 0, "expected a segment from the host");
    buf[..len].to_vec()
}

fn repr_of(bytes: &[u8]) -> Repr {
    Repr::parse(segment::new_checked(bytes).unwrap()).unwrap()
}

fn discard_one(net: &mut Endpoint) {
    use super::Network;
    let mut buf = [0; MAX_SEGMENT_SIZE];
    net.net_recv(&mut buf);
}

/// Walk both hosts through the three-way handshake.
fn establish(a: &mut Host, b: &mut Host) {
    a.driver.handshake_initiate();
    b.driver.handshake_initiate();
    b.driver.handshake_step();
    a.driver.handshake_step();
    b.driver.handshake_step();

    assert_eq!(a.driver.context().current, State::Established);
    assert_eq!(b.driver.context().current, State::Established);
    assert!(a.app.unblocked());
    assert!(b.app.unblocked());
}

/// Step whichever host has pending events until the simulation settles.
fn pump(a: &mut Host, b: &mut Host) {
    for _ in 0..10_000 {
        if !a.driver.is_done() { a.driver.sweep(); }
        if !b.driver.is_done() { b.driver.sweep(); }

        let pa = a.waiter.poll(Events::ANY);
        let pb = b.waiter.poll(Events::ANY);

        // A finished host no longer reads its queue, throw strays away.
        if a.driver.is_done() && pa.network_data() {
            discard_one(&mut a.net);
            continue;
        }
        if b.driver.is_done() && pb.network_data() {
            discard_one(&mut b.net);
            continue;
        }

        let mut progressed = false;
        if !pa.is_empty() && !a.driver.is_done() {
            a.driver.step();
            progressed = true;
        }
        if !pb.is_empty() && !b.driver.is_done() {
            b.driver.step();
            progressed = true;
        }
        if !progressed {
            return;
        }
    }
    panic!("simulation did not settle");
}

#[test]
fn three_way_handshake() {
    let (mut a, mut b) = pair();
    establish(&mut a, &mut b);

    let a_ctx = a.driver.context();
    assert_eq!(a_ctx.send.next, a_ctx.send.initial_seq + 1);
    assert_eq!(a_ctx.send.unacked, a_ctx.send.next);
    assert_eq!(a_ctx.recv.next, b.driver.context().send.initial_seq + 1);
}

#[test]
fn simultaneous_open() {
    let clock = Clock::new();
    let (na, nb) = channel();
    let mut a = host(na, &clock, Role::Active);
    let mut b = host(nb, &clock, Role::Active);

    a.driver.handshake_initiate();
    b.driver.handshake_initiate();
    // Each answers the crossed SYN with SYN+ACK, then completes on it.
    a.driver.handshake_step();
    b.driver.handshake_step();
    a.driver.handshake_step();
    b.driver.handshake_step();

    assert_eq!(a.driver.context().current, State::Established);
    assert_eq!(b.driver.context().current, State::Established);

    // The crossed final ACKs match nothing in flight and are ignored.
    a.driver.step();
    b.driver.step();
    assert_eq!(a.driver.context().current, State::Established);
    assert_eq!(b.driver.context().current, State::Established);
}

#[test]
fn active_open_clean_close_on_the_wire() {
    let (mut a, mut peer) = scripted(Role::Active);
    use super::Network;

    peer.net_send(&raw(500, Some(2), true, false, 3072, &[]));
    a.driver.connect();

    let syn = repr_of(&recv_one(&mut peer));
    assert!(syn.flags.syn());
    assert_eq!(syn.ack_number, None);
    assert_eq!(syn.seq_number, SeqNumber(1));
    assert_eq!(syn.window_len, 3072);

    let ack = repr_of(&recv_one(&mut peer));
    assert_eq!(ack.seq_number, SeqNumber(2));
    assert_eq!(ack.ack_number, Some(SeqNumber(501)));

    a.app.close();
    a.driver.step();
    let fin = repr_of(&recv_one(&mut peer));
    assert!(fin.flags.fin());
    assert_eq!(fin.seq_number, SeqNumber(2));
    assert_eq!(fin.ack_number, Some(SeqNumber(501)));
    assert_eq!(a.driver.context().current, State::FinWait1);

    peer.net_send(&raw(501, Some(3), false, false, 3072, &[]));
    a.driver.step();
    a.driver.sweep();
    assert_eq!(a.driver.context().current, State::FinWait2);

    peer.net_send(&raw(501, Some(3), false, true, 3072, &[]));
    a.driver.step();
    assert_eq!(a.driver.context().current, State::Closed);
    assert!(a.driver.is_done());
    assert!(!a.driver.context().aborted);
    assert!(a.app.fin_received());

    let last_ack = repr_of(&recv_one(&mut peer));
    assert_eq!(last_ack.ack_number, Some(SeqNumber(502)));
    assert_eq!(last_ack.seq_number, SeqNumber(3));
}

#[test]
fn clean_transfer_and_close() {
    let (mut a, mut b) = pair();
    establish(&mut a, &mut b);

    a.app.write(b"hello world");
    pump(&mut a, &mut b);
    assert_eq!(b.app.delivered(), b"hello world");
    assert!(a.driver.rtx.is_empty());

    a.app.close();
    pump(&mut a, &mut b);
    assert_eq!(a.driver.context().current, State::FinWait2);
    assert_eq!(b.driver.context().current, State::CloseWait);
    assert!(b.app.fin_received());

    b.app.close();
    pump(&mut a, &mut b);
    assert!(a.driver.is_done());
    assert!(b.driver.is_done());
    assert!(!a.driver.context().aborted);
    assert!(!b.driver.context().aborted);
}

#[test]
fn lost_segment_triggers_go_back_n() {
    let (mut a, mut b) = pair();
    establish(&mut a, &mut b);

    // The SYN and the final handshake ACK were sends zero and one; the
    // second data segment is the fourth send overall.
    a.net.set_loss(Loss::Nth(vec![3]));

    a.app.write(&[1; 100]);
    a.driver.step();
    a.app.write(&[2; 100]);
    a.driver.step();
    a.app.write(&[3; 100]);
    a.driver.step();

    let a_ctx = a.driver.context();
    assert_eq!(a_ctx.send.unacked, SeqNumber(2));
    assert_eq!(a_ctx.send.next, SeqNumber(302));
    assert_eq!(a.driver.rtx.len(), 3);
    assert_eq!(a.driver.rtx.in_flight(), 300);

    // The first segment is in order, the third lands in the reorder buffer
    // and repeats the cumulative ACK.
    b.driver.step();
    b.driver.step();
    assert_eq!(b.app.delivered(), vec![1; 100]);
    assert_eq!(b.driver.reorder.len(), 1);
    assert_eq!(b.driver.context().recv.next, SeqNumber(102));

    a.driver.step();
    a.driver.step();
    assert_eq!(a.driver.context().send.unacked, SeqNumber(102));

    // No more events: the retransmission timer fires and goes back N.
    a.driver.step();
    assert_eq!(a.net.pending(), 0);
    assert_eq!(b.net.pending(), 2);
    assert_eq!(a.driver.rtx.get(0).retries(), 1);
    assert_eq!(a.driver.rtx.get(1).retries(), 0);

    pump(&mut a, &mut b);
    let mut expected = vec![1; 100];
    expected.extend_from_slice(&[2; 100]);
    expected.extend_from_slice(&[3; 100]);
    assert_eq!(b.app.delivered(), expected);
    assert!(b.driver.reorder.is_empty());
    assert!(a.driver.rtx.is_empty());
    assert_eq!(a.driver.context().send.unacked, SeqNumber(302));
    assert_eq!(b.driver.context().recv.window, 3072);
}

#[test]
fn duplicate_ack_is_harmless() {
    let (mut a, mut peer) = scripted(Role::Active);
    use super::Network;

    peer.net_send(&raw(500, Some(2), true, false, 3072, &[]));
    a.driver.connect();

    a.app.write(&[8; 100]);
    a.driver.step();
    assert_eq!(a.driver.rtx.len(), 1);

    peer.net_send(&raw(501, Some(102), false, false, 3072, &[]));
    peer.net_send(&raw(501, Some(102), false, false, 3072, &[]));
    a.driver.step();
    a.driver.step();
    a.driver.sweep();

    assert!(a.driver.rtx.is_empty());
    assert_eq!(a.driver.context().send.unacked, SeqNumber(102));
    assert_eq!(a.driver.context().current, State::Established);
}

#[test]
fn simultaneous_fin() {
    let (mut a, mut peer) = scripted(Role::Active);
    use super::Network;

    peer.net_send(&raw(500, Some(2), true, false, 3072, &[]));
    a.driver.connect();

    a.app.close();
    a.driver.step();
    assert_eq!(a.driver.context().current, State::FinWait1);

    // The peer's own FIN crossed ours and does not acknowledge it yet.
    peer.net_send(&raw(501, Some(2), false, true, 3072, &[]));
    a.driver.step();

    assert!(a.driver.is_done());
    assert_eq!(a.driver.context().current, State::Closed);
    assert!(!a.driver.context().aborted);
    assert!(a.app.fin_received());
}

#[test]
fn passive_open_receiving_data() {
    let (mut b, mut peer) = scripted(Role::Passive);
    use super::Network;

    b.driver.handshake_initiate();
    assert_eq!(b.driver.context().current, State::Listen);

    peer.net_send(&raw(700, None, true, false, 3072, &[]));
    b.driver.handshake_step();
    assert_eq!(b.driver.context().current, State::SynReceived);

    let syn_ack = repr_of(&recv_one(&mut peer));
    assert!(syn_ack.flags.syn());
    assert_eq!(syn_ack.seq_number, SeqNumber(1));
    assert_eq!(syn_ack.ack_number, Some(SeqNumber(701)));

    peer.net_send(&raw(701, Some(2), false, false, 3072, &[]));
    b.driver.handshake_step();
    assert_eq!(b.driver.context().current, State::Established);
    assert!(b.app.unblocked());

    peer.net_send(&raw(701, Some(2), true, false, 3072, &[7; 50]));
    b.driver.step();
    assert_eq!(b.app.delivered(), vec![7; 50]);
    let ack = repr_of(&recv_one(&mut peer));
    assert_eq!(ack.ack_number, Some(SeqNumber(751)));
    assert_eq!(ack.window_len, 3072);

    // An identical duplicate is not delivered twice but acked again.
    peer.net_send(&raw(701, Some(2), true, false, 3072, &[7; 50]));
    b.driver.step();
    assert_eq!(b.app.delivered(), vec![7; 50]);
    let ack = repr_of(&recv_one(&mut peer));
    assert_eq!(ack.ack_number, Some(SeqNumber(751)));
}

#[test]
fn reordered_segments_reassemble() {
    let (mut b, mut peer) = scripted(Role::Passive);
    use super::Network;

    b.driver.handshake_initiate();
    peer.net_send(&raw(700, None, true, false, 3072, &[]));
    b.driver.handshake_step();
    discard_one(&mut peer);
    peer.net_send(&raw(701, Some(2), false, false, 3072, &[]));
    b.driver.handshake_step();

    // The stream 701..851 arrives in the order third, second, first.
    peer.net_send(&raw(801, Some(2), true, false, 3072, &[3; 50]));
    peer.net_send(&raw(751, Some(2), true, false, 3072, &[2; 50]));
    peer.net_send(&raw(701, Some(2), true, false, 3072, &[1; 50]));

    b.driver.step();
    let ack = repr_of(&recv_one(&mut peer));
    assert_eq!(ack.ack_number, Some(SeqNumber(701)));
    assert_eq!(ack.window_len, 3072 - 70);

    b.driver.step();
    let ack = repr_of(&recv_one(&mut peer));
    assert_eq!(ack.ack_number, Some(SeqNumber(701)));
    assert_eq!(ack.window_len, 3072 - 140);

    b.driver.step();
    let ack = repr_of(&recv_one(&mut peer));
    assert_eq!(ack.ack_number, Some(SeqNumber(851)));
    assert_eq!(ack.window_len, 3072);

    let mut expected = vec![1; 50];
    expected.extend_from_slice(&[2; 50]);
    expected.extend_from_slice(&[3; 50]);
    assert_eq!(b.app.delivered(), expected);
    assert!(b.driver.reorder.is_empty());
}

#[test]
fn segment_at_window_boundary_is_discarded() {
    let (mut b, mut peer) = scripted(Role::Passive);
    use super::Network;

    b.driver.handshake_initiate();
    peer.net_send(&raw(700, None, true, false, 3072, &[]));
    b.driver.handshake_step();
    discard_one(&mut peer);
    peer.net_send(&raw(701, Some(2), false, false, 3072, &[]));
    b.driver.handshake_step();

    // Sequence number exactly one receive window ahead.
    peer.net_send(&raw(701 + 3072, Some(2), true, false, 3072, &[9; 50]));
    b.driver.step();

    assert!(b.driver.reorder.is_empty());
    assert!(b.app.delivered().is_empty());
    let ack = repr_of(&recv_one(&mut peer));
    assert_eq!(ack.ack_number, Some(SeqNumber(701)));
    assert_eq!(ack.window_len, 3072);

    // One short of the boundary is buffered and charged.
    peer.net_send(&raw(701 + 3071, Some(2), true, false, 3072, &[9; 1]));
    b.driver.step();
    assert_eq!(b.driver.reorder.len(), 1);
    let ack = repr_of(&recv_one(&mut peer));
    assert_eq!(ack.ack_number, Some(SeqNumber(701)));
    assert_eq!(ack.window_len, 3072 - 21);
}

#[test]
fn maxed_out_retries_abandon_the_connection() {
    let (mut a, mut peer) = scripted(Role::Active);
    use super::Network;

    peer.net_send(&raw(500, Some(2), true, false, 3072, &[]));
    a.driver.connect();
    discard_one(&mut peer);
    discard_one(&mut peer);

    let t0 = a.clock.now();
    a.app.write(&[9; 50]);
    a.driver.step();
    assert_eq!(repr_of(&recv_one(&mut peer)).seq_number, SeqNumber(2));

    // The peer stays silent; each timeout retransmits at one second pace.
    for retry in 1..=6 {
        a.driver.step();
        assert_eq!(a.driver.rtx.get(0).retries(), retry);
        assert_eq!(a.clock.now(), t0 + Duration::from_secs(u64::from(retry)));
        assert_eq!(repr_of(&recv_one(&mut peer)).seq_number, SeqNumber(2));
    }

    // The seventh timeout purges the entry and gives up.
    a.driver.step();
    assert_eq!(a.clock.now(), t0 + Duration::from_secs(7));
    assert!(a.driver.is_done());
    assert!(a.driver.context().aborted);
    assert_eq!(a.driver.context().current, State::Closed);
    assert!(a.driver.rtx.is_empty());
}

#[test]
fn run_reports_the_abandonment() {
    let (mut a, mut peer) = scripted(Role::Active);
    use super::Network;

    peer.net_send(&raw(500, Some(2), true, false, 3072, &[]));
    a.app.write(&[9; 50]);

    assert_eq!(a.driver.run(), Err(Error::ConnectionAborted));
    assert_eq!(a.driver.context().current, State::Closed);
}

#[test]
fn segmenter_splits_at_max_payload() {
    let (mut a, mut peer) = scripted(Role::Active);
    use super::Network;

    peer.net_send(&raw(500, Some(2), true, false, 3072, &[]));
    a.driver.connect();
    discard_one(&mut peer);
    discard_one(&mut peer);

    // One maximum sized payload fits a single segment.
    a.app.write(&[5; MAX_SEGMENT_SIZE - 20]);
    a.driver.step();
    let first = recv_one(&mut peer);
    assert_eq!(first.len(), MAX_SEGMENT_SIZE);
    assert_eq!(peer.pending(), 0);

    // One byte more spills into a second segment.
    a.app.write(&[6; MAX_SEGMENT_SIZE - 19]);
    a.driver.step();
    let first = recv_one(&mut peer);
    let second = recv_one(&mut peer);
    assert_eq!(first.len(), MAX_SEGMENT_SIZE);
    assert_eq!(second.len(), 21);
    assert_eq!(
        repr_of(&second).seq_number,
        repr_of(&first).seq_number + (MAX_SEGMENT_SIZE - 20));
}

#[test]
fn peer_window_gates_the_sender() {
    let (mut a, mut peer) = scripted(Role::Active);
    use super::Network;

    peer.net_send(&raw(500, Some(2), true, false, 3072, &[]));
    a.driver.connect();
    discard_one(&mut peer);
    discard_one(&mut peer);

    // The peer closes its window; queued bytes must stay with the app.
    peer.net_send(&raw(501, Some(2), false, false, 0, &[]));
    a.driver.step();
    a.app.write(&[4; 100]);
    a.driver.step();
    assert_eq!(peer.pending(), 0);
    assert_eq!(a.app.queued(), 100);
    assert!(a.driver.rtx.is_empty());

    // Reopening the window releases them.
    peer.net_send(&raw(501, Some(2), false, false, 3072, &[]));
    a.driver.step();
    assert_eq!(a.app.queued(), 0);
    let data = repr_of(&recv_one(&mut peer));
    assert_eq!(data.payload_len, 100);
    assert_eq!(data.seq_number, SeqNumber(2));
}
