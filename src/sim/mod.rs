//! In-memory collaborators for exercising connections.
//!
//! The simulation module provides the three services a connection runtime
//! consumes, implemented over plain queues with a hand-driven clock:
//!
//! * [`channel`] creates the two ends of an unreliable datagram link. Each
//!   end implements [`conn::Network`]; loss is simulated by a pseudo-random
//!   or scripted [`Loss`] policy applied to outgoing segments and tests can
//!   reorder or inject segments directly.
//! * [`App`] implements [`conn::Application`] and records everything the
//!   connection reports upwards.
//! * [`Waiter`] implements [`conn::Wait`] over a shared [`Clock`]. A wait
//!   that would time out advances the clock to the deadline, so
//!   retransmission scenarios run in no time at all; a wait that could
//!   never return panics instead of deadlocking the test.
//!
//! All handles are shallow clones over shared state, mirroring how the real
//! services live outside the connection.
//!
//! [`channel`]: fn.channel.html
//! [`App`]: struct.App.html
//! [`Waiter`]: struct.Waiter.html
//! [`Clock`]: struct.Clock.html
//! [`Loss`]: enum.Loss.html
//! [`conn::Network`]: ../conn/trait.Network.html
//! [`conn::Application`]: ../conn/trait.Application.html
//! [`conn::Wait`]: ../conn/trait.Wait.html
use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use crate::conn::{Application, Events, Network, Wait};
use crate::time::{Duration, Expiration, Instant};

type Queue = Rc<RefCell<VecDeque<Vec<u8>>>>;

/// Simple pseudo-random or scripted loss.
#[derive(Clone, Debug)]
pub enum Loss {
    /// Deliver everything.
    None,

    /// Drop each segment with the given probability, a (0, 32)-bit fixed
    /// point number.
    Uniform {
        /// Loss rate; `u32::max_value()` drops everything.
        lossrate: u32,
        /// The current prng state (or seed at the start).
        prng: Xoroshiro256,
    },

    /// Drop exactly the outgoing segments with these indices, counted from
    /// zero across the lifetime of the endpoint.
    Nth(Vec<usize>),
}

/// Xoroshiro256**, far too good a generator for dropping test packets.
#[derive(Clone, Copy, Debug, Hash)]
pub struct Xoroshiro256 {
    state: [u64; 4],
}

/// One end of an in-memory datagram link.
///
/// Cloning yields another handle onto the same end; tests keep a clone to
/// inspect and manipulate the queues while the connection owns the other.
#[derive(Clone)]
pub struct Endpoint {
    rx: Queue,
    tx: Queue,
    loss: Rc<RefCell<Loss>>,
    sent: Rc<Cell<usize>>,
}

/// Create a connected pair of lossless endpoints.
pub fn channel() -> (Endpoint, Endpoint) {
    let forward: Queue = Rc::default();
    let backward: Queue = Rc::default();

    let a = Endpoint {
        rx: backward.clone(),
        tx: forward.clone(),
        loss: Rc::new(RefCell::new(Loss::None)),
        sent: Rc::default(),
    };
    let b = Endpoint {
        rx: forward,
        tx: backward,
        loss: Rc::new(RefCell::new(Loss::None)),
        sent: Rc::default(),
    };

    (a, b)
}

impl Endpoint {
    /// Replace the loss policy applied to segments sent from this end.
    pub fn set_loss(&self, loss: Loss) {
        *self.loss.borrow_mut() = loss;
    }

    /// The number of segments waiting to be received by this end.
    pub fn pending(&self) -> usize {
        self.rx.borrow().len()
    }

    /// Push a hand-crafted segment into this end's receive queue.
    pub fn inject(&self, segment: &[u8]) {
        self.rx.borrow_mut().push_back(segment.to_vec());
    }

    /// Swap two segments waiting in this end's receive queue.
    ///
    /// This is how tests simulate reordering by the network.
    pub fn swap_pending(&self, left: usize, right: usize) {
        self.rx.borrow_mut().swap(left, right);
    }
}

impl Network for Endpoint {
    fn net_send(&mut self, segment: &[u8]) {
        let index = self.sent.get();
        self.sent.set(index + 1);

        if self.loss.borrow_mut().claims(index) {
            return;
        }
        self.tx.borrow_mut().push_back(segment.to_vec());
    }

    fn net_recv(&mut self, buf: &mut [u8]) -> usize {
        let segment = match self.rx.borrow_mut().pop_front() {
            Some(segment) => segment,
            None => return 0,
        };

        let len = segment.len().min(buf.len());
        buf[..len].copy_from_slice(&segment[..len]);
        len
    }
}

impl Loss {
    /// Decide the fate of the outgoing segment with this index.
    fn claims(&mut self, index: usize) -> bool {
        match self {
            Loss::None => false,
            Loss::Uniform { lossrate, prng } => {
                (prng.next() & u64::from(!0u32)) as u32 <= *lossrate
            }
            Loss::Nth(drops) => drops.contains(&index),
        }
    }
}

impl Xoroshiro256 {
    /// Seed the generator.
    pub fn new(seed: u64) -> Self {
        Xoroshiro256 {
            state: [seed, 0, 0, 0],
        }
    }

    /// Generate the next value.
    pub fn next(&mut self) -> u64 {
        let s = &mut self.state;
        let result_starstar = s[1]
            .wrapping_mul(5)
            .rotate_left(7)
            .wrapping_mul(9);

        let t = s[1] << 17;

        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];

        s[2] ^= t;

        s[3] = s[3].rotate_left(45);

        result_starstar
    }
}

#[derive(Default)]
struct AppState {
    outgoing: VecDeque<u8>,
    delivered: Vec<u8>,
    close_requested: bool,
    unblocked: bool,
    fin_received: bool,
}

/// An in-memory application endpoint.
///
/// The test writes the bytes the application would send and reads back what
/// the connection delivered; clones share the same state.
#[derive(Clone, Default)]
pub struct App {
    state: Rc<RefCell<AppState>>,
}

impl App {
    /// A fresh application with nothing queued.
    pub fn new() -> Self {
        App::default()
    }

    /// Queue bytes for the connection to send.
    pub fn write(&self, bytes: &[u8]) {
        self.state.borrow_mut().outgoing.extend(bytes.iter().copied());
    }

    /// Ask the connection to close.
    pub fn close(&self) {
        self.state.borrow_mut().close_requested = true;
    }

    /// The bytes delivered to the application so far.
    pub fn delivered(&self) -> Vec<u8> {
        self.state.borrow().delivered.clone()
    }

    /// The number of written bytes the connection has not yet drained.
    pub fn queued(&self) -> usize {
        self.state.borrow().outgoing.len()
    }

    /// Whether the connection reported establishment.
    pub fn unblocked(&self) -> bool {
        self.state.borrow().unblocked
    }

    /// Whether the connection reported the peer's half-close.
    pub fn fin_received(&self) -> bool {
        self.state.borrow().fin_received
    }
}

impl Application for App {
    fn app_recv(&mut self, buf: &mut [u8]) -> usize {
        let mut state = self.state.borrow_mut();
        let len = buf.len().min(state.outgoing.len());
        for slot in buf[..len].iter_mut() {
            *slot = state.outgoing.pop_front().unwrap();
        }
        len
    }

    fn app_send(&mut self, bytes: &[u8]) {
        self.state.borrow_mut().delivered.extend_from_slice(bytes);
    }

    fn app_unblock(&mut self) {
        self.state.borrow_mut().unblocked = true;
    }

    fn app_fin(&mut self) {
        self.state.borrow_mut().fin_received = true;
    }
}

/// A hand-driven monotonic clock shared between waiters.
#[derive(Clone, Default)]
pub struct Clock {
    millis: Rc<Cell<i64>>,
}

impl Clock {
    /// A clock starting at zero.
    pub fn new() -> Self {
        Clock::default()
    }

    /// The current instant.
    pub fn now(&self) -> Instant {
        Instant::from_millis(self.millis.get())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.millis.set((self.now() + by).total_millis());
    }

    fn advance_to(&self, instant: Instant) {
        if instant.total_millis() > self.millis.get() {
            self.millis.set(instant.total_millis());
        }
    }
}

/// The event multiplexer of one simulated endpoint.
#[derive(Clone)]
pub struct Waiter {
    clock: Clock,
    rx: Queue,
    app: App,
}

impl Waiter {
    /// Tie a multiplexer to an endpoint's receive queue, its application,
    /// and the shared clock.
    pub fn new(clock: &Clock, net: &Endpoint, app: &App) -> Self {
        Waiter {
            clock: clock.clone(),
            rx: net.rx.clone(),
            app: app.clone(),
        }
    }

    /// The currently signalled events, without consuming any.
    pub fn poll(&self, mask: Events) -> Events {
        let mut events = Events::NONE;
        let app = self.app.state.borrow();

        if !self.rx.borrow().is_empty() {
            events |= Events::NETWORK_DATA;
        }
        if app.unblocked && !app.outgoing.is_empty() {
            events |= Events::APP_DATA;
        }
        if app.unblocked && app.close_requested {
            events |= Events::APP_CLOSE_REQUESTED;
        }

        events & mask
    }
}

impl Wait for Waiter {
    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn wait_for_event(&mut self, mask: Events, deadline: Expiration) -> Events {
        let events = self.poll(mask);
        if !events.is_empty() {
            if events.app_close_requested() {
                // The close request is signalled exactly once.
                self.app.state.borrow_mut().close_requested = false;
            }
            return events;
        }

        match deadline {
            Expiration::When(instant) => {
                // Nobody else can act in the meantime, sleep to the deadline.
                self.clock.advance_to(instant);
                Events::TIMEOUT
            }
            Expiration::Never => {
                panic!("wait_for_event would block forever");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_delivers_in_order() {
        let (mut a, mut b) = channel();
        a.net_send(&[1; 20]);
        a.net_send(&[2; 20]);

        assert_eq!(b.pending(), 2);
        let mut buf = [0; 64];
        assert_eq!(b.net_recv(&mut buf), 20);
        assert_eq!(buf[0], 1);
        assert_eq!(b.net_recv(&mut buf), 20);
        assert_eq!(buf[0], 2);
        assert_eq!(b.net_recv(&mut buf), 0);
    }

    #[test]
    fn nth_loss_drops_exactly_those() {
        let (mut a, b) = channel();
        a.set_loss(Loss::Nth(vec![1]));
        a.net_send(&[1; 20]);
        a.net_send(&[2; 20]);
        a.net_send(&[3; 20]);

        assert_eq!(b.pending(), 2);
    }

    #[test]
    fn waiter_times_out_by_advancing_the_clock() {
        let clock = Clock::new();
        let (a, _b) = channel();
        let app = App::new();
        let mut waiter = Waiter::new(&clock, &a, &app);

        let deadline = Expiration::When(Instant::from_secs(3));
        assert_eq!(waiter.wait_for_event(Events::ANY, deadline), Events::TIMEOUT);
        assert_eq!(clock.now(), Instant::from_secs(3));
    }

    #[test]
    fn app_events_wait_for_unblock() {
        let clock = Clock::new();
        let (a, _b) = channel();
        let app = App::new();
        let waiter = Waiter::new(&clock, &a, &app);

        app.write(b"hello");
        assert_eq!(waiter.poll(Events::ANY), Events::NONE);

        let mut service = app.clone();
        service.app_unblock();
        assert_eq!(waiter.poll(Events::ANY), Events::APP_DATA);
    }
}
