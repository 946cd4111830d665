//! A user-space transport layer for STCP, a simplified TCP.
//!
//! ## Table of contents
//!
//! 1. [Overview](#overview)
//! 2. [The wire module](wire/index.html)
//! 3. [The connection module](conn/index.html)
//! 4. [The simulation module](sim/index.html)
//!
//! ## Overview
//!
//! STCP provides a reliable, in-order byte stream on top of an unreliable
//! datagram service. It keeps a useful subset of TCP: the three-way
//! handshake, sliding-window flow control with cumulative acknowledgement,
//! Go-Back-N retransmission on timeout, and the four-way FIN teardown. It
//! drops the rest: no options, no selective acknowledgement, no urgent data,
//! no checksum, and no congestion avoidance beyond a fixed window ceiling.
//!
//! The deliverable is the per-connection runtime in [`conn`]: a strictly
//! single-threaded event loop that owns the connection context, the
//! retransmit queue, and the reorder buffer for one socket. The datagram
//! service below it, the application byte stream above it, and the event
//! multiplexer it suspends on are all traits ([`conn::Network`],
//! [`conn::Application`], [`conn::Wait`]); in-memory implementations for
//! testing live in [`sim`].
//!
//! Nothing here ever allocates beyond the per-connection ceilings fixed at
//! creation: two 3072-byte staging regions, a retransmit queue bounded by
//! the peer window, and a reorder buffer bounded by the local window.
//!
//! [`conn`]: conn/index.html
//! [`sim`]: sim/index.html
//! [`conn::Network`]: conn/trait.Network.html
//! [`conn::Application`]: conn/trait.Application.html
//! [`conn::Wait`]: conn/trait.Wait.html
#![warn(missing_docs)]
#![warn(unreachable_pub)]

// tests should be able to use `std`
#![cfg_attr(all(
    not(feature = "std"),
    not(test)),
no_std)]

extern crate alloc;

#[macro_use] mod macros;
pub mod conn;
pub mod sim;
pub mod time;
pub mod wire;
