//! Receive-side sliding-window state machine.
//!
//! [`ReceiveWindow`] buffers DATA packets that arrive out of order, exposes
//! them to the application strictly in sequence order, and computes the
//! cumulative ACK and advertised window the caller should send back.
//!
//! - Packets below the consumption point are duplicates: discarded, but the
//!   caller still acknowledges them so a sender whose ACK was lost converges.
//! - Packets at or beyond `consumed + buffer_size` do not fit the buffer and
//!   are dropped; the caller answers them with the current ACK, whose
//!   advertised window tells the sender how much room there is.
//! - Everything in between is stored in a ring of `buffer_size` slots indexed
//!   by `seq % buffer_size`.
//!
//! This module only manages state; all transport I/O is the caller's
//! responsibility (same split as [`crate::send_window::SendWindow`]).

use crate::packet::Packet;

/// What happened to an inbound DATA packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Already handed to the application; payload discarded.
    Duplicate,
    /// Outside the receive window; payload dropped.
    OutOfWindow,
    /// Stored.  `ready` chunks became available to the application.
    Buffered { ready: usize },
}

// ---------------------------------------------------------------------------
// ReceiveWindow
// ---------------------------------------------------------------------------

/// Receive-side window state for one session.
///
/// The three counters are exclusive bounds (one past the sequence number
/// they describe), so the "nothing yet" state is simply 0:
///
/// ```text
///   consumed       signaled          received_end
///      │               │                  │
///  ────┼───────────────┼──────────────────┼────────▶ seq space
///      │ <── ready ──▶ │ <── gaps/held ─▶ │
///      │ <──────────── buffer_size slots ───────────▶│
/// ```
#[derive(Debug)]
pub struct ReceiveWindow {
    slots: Vec<Option<Vec<u8>>>,

    /// Next sequence number the application will consume.
    consumed: u32,

    /// One past the highest contiguous sequence number ready for the
    /// application.  Never regresses.
    signaled: u32,

    /// One past the highest sequence number ever stored.
    received_end: u32,

    /// Window carried by the most recent ACK built.
    last_advertised: Option<u32>,
}

impl ReceiveWindow {
    /// Create an empty window with `buffer_size` slots (≥ 1).
    pub fn new(buffer_size: usize) -> Self {
        assert!(buffer_size >= 1, "buffer_size must be at least 1");
        Self {
            slots: vec![None; buffer_size],
            consumed: 0,
            signaled: 0,
            received_end: 0,
            last_advertised: None,
        }
    }

    /// Number of chunks ready to be consumed.
    pub fn ready(&self) -> usize {
        (self.signaled - self.consumed) as usize
    }

    /// Process one inbound DATA packet.
    pub fn on_data(&mut self, seq: u32, payload: Vec<u8>) -> Arrival {
        if seq < self.consumed {
            return Arrival::Duplicate;
        }
        if (seq - self.consumed) as usize >= self.slots.len() {
            return Arrival::OutOfWindow;
        }

        let slot = self.slot(seq);
        self.slots[slot] = Some(payload);
        self.received_end = self.received_end.max(seq + 1);

        // Walk forward from the first unsignaled slot until the next gap.
        let mut ready = 0usize;
        while self.signaled < self.received_end {
            let slot = self.slot(self.signaled);
            if self.slots[slot].is_none() {
                break;
            }
            self.signaled += 1;
            ready += 1;
        }
        Arrival::Buffered { ready }
    }

    /// Take the next in-order chunk, if one is ready.
    pub fn pop_ready(&mut self) -> Option<Vec<u8>> {
        if self.consumed == self.signaled {
            return None;
        }
        let slot = self.slot(self.consumed);
        let chunk = self.slots[slot].take();
        debug_assert!(chunk.is_some(), "signaled slot {} is empty", self.consumed);
        self.consumed += 1;
        chunk
    }

    /// Cumulative ACK number: the highest sequence number such that every
    /// packet up to and including it is ready or consumed.  `u32::MAX`
    /// (the wire form of -1) while nothing is.
    pub fn ack_number(&self) -> u32 {
        self.signaled.wrapping_sub(1)
    }

    /// `buffer_size - (highest received - last consumed)`, clamped at zero.
    pub fn advertised_window(&self) -> u32 {
        let occupied = self.received_end - self.consumed;
        (self.slots.len() as u32).saturating_sub(occupied)
    }

    /// Build the cumulative ACK reflecting the current state.
    pub fn ack(&mut self) -> Packet {
        let window = self.advertised_window();
        self.last_advertised = Some(window);
        Packet::ack(self.ack_number(), window)
    }

    /// `true` when the last ACK advertised a closed window and consumption
    /// has since opened it again.
    pub fn window_reopened(&self) -> bool {
        self.last_advertised == Some(0) && self.advertised_window() > 0
    }

    fn slot(&self, seq: u32) -> usize {
        seq as usize % self.slots.len()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
