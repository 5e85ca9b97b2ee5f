//! Send-side sliding-window state machine.
//!
//! [`SendWindow`] tracks every DATA packet that has been transmitted but not
//! yet cumulatively acknowledged.
//!
//! # Protocol contract
//!
//! - Sequence numbers count packets, not bytes, and start at 0.
//! - At most `min(window_size, peer advertised window)` packets may be in
//!   flight at once.  Until the first ACK reports the peer's window, only
//!   one packet goes out.
//! - ACKs are **cumulative**: `ack = K` means every packet with sequence
//!   number ≤ `K` has been delivered.  `K = u32::MAX` is the receiver's
//!   "nothing delivered yet" value.
//! - Each in-flight packet carries its own retransmission deadline; expired
//!   packets are resent unmodified (selective, not go-back-N).  Packets
//!   that fall outside a window the peer has since shrunk stay parked until
//!   it reopens.
//! - While the window is closed, a persist packet goes out once per RTO so a
//!   lost window update cannot stall the session.
//! - Sequence numbers do not wrap within a session.
//!
//! This module only manages state; all transport I/O is the caller's
//! responsibility.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::packet::Packet;

// ---------------------------------------------------------------------------
// InFlight
// ---------------------------------------------------------------------------

/// A single transmitted, unacknowledged packet.
#[derive(Debug, Clone)]
pub struct InFlight {
    /// The packet exactly as it went on the wire.
    pub packet: Packet,
    /// Total number of times this packet has been transmitted.
    pub tx_count: u32,
    /// Time of the most recent transmission.
    pub sent_at: Instant,
}

impl InFlight {
    fn expired(&self, now: Instant, rto: Duration) -> bool {
        now.saturating_duration_since(self.sent_at) >= rto
    }
}

// ---------------------------------------------------------------------------
// SendWindow
// ---------------------------------------------------------------------------

/// Send-side window state for one session.
///
/// ```text
///  send_base          next_seq
///      │                  │
///  ────┼──────────────────┼──────────────────▶ seq space
///      │ <── in flight ──▶│ <── queued ─────▶
/// ```
#[derive(Debug)]
pub struct SendWindow {
    /// Sequence number of the oldest unacknowledged packet.
    send_base: u32,

    /// Sequence number for the next new packet.
    next_seq: u32,

    /// Locally configured window limit.
    window_size: usize,

    /// Window advertised by the most recent accepted ACK, if any.
    peer_window: Option<u32>,

    /// In-flight packets ordered by sequence number (front = oldest).
    in_flight: VecDeque<InFlight>,

    /// Most recently acknowledged packet, resent by the persist timer.
    last_acked: Option<Packet>,

    /// Last time the window made progress or a persist packet went out.
    last_progress: Option<Instant>,
}

impl SendWindow {
    /// Create a window whose first packet gets sequence number 0.
    pub fn new(window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            send_base: 0,
            next_seq: 0,
            window_size,
            peer_window: None,
            in_flight: VecDeque::with_capacity(window_size),
            last_acked: None,
            last_progress: None,
        }
    }

    /// Sequence number of the oldest unacknowledged packet.
    pub fn send_base(&self) -> u32 {
        self.send_base
    }

    /// Sequence number the next packet will get.
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// `min(window_size, peer advertised window)`, or 1 before any ACK.
    pub fn effective_window(&self) -> usize {
        match self.peer_window {
            Some(peer) => self.window_size.min(peer as usize),
            None => 1,
        }
    }

    /// `true` when one more packet may go in flight.
    pub fn can_send(&self) -> bool {
        self.in_flight.len() < self.effective_window()
    }

    /// Number of packets awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// `true` when nothing is awaiting acknowledgement.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Iterate over in-flight packets from oldest to newest.
    pub fn entries(&self) -> impl Iterator<Item = &InFlight> {
        self.in_flight.iter()
    }

    /// Assign the next sequence number to `payload`, record it as sent at
    /// `now` and return the packet to put on the wire.
    ///
    /// Check [`can_send`](Self::can_send) first.
    pub fn push(&mut self, payload: Vec<u8>, now: Instant) -> Packet {
        debug_assert!(
            self.can_send(),
            "push on a full window ({} / {})",
            self.in_flight.len(),
            self.effective_window()
        );
        let packet = Packet::data(self.next_seq, payload);
        self.next_seq += 1;
        self.in_flight.push_back(InFlight {
            packet: packet.clone(),
            tx_count: 1,
            sent_at: now,
        });
        packet
    }

    /// Process a cumulative ACK.
    ///
    /// Releases every in-flight packet with sequence number ≤ `ack` and
    /// adopts `adv_win` as the peer window.  Returns the number of packets
    /// released.
    ///
    /// ACKs for packets never sent are ignored entirely.  Stale ACKs (below
    /// the window base) release nothing and leave the peer window alone.
    pub fn on_ack(&mut self, ack: u32, adv_win: u32, now: Instant) -> usize {
        // Exclusive upper bound; the u32::MAX sentinel maps to 0.
        let acked_through = ack.wrapping_add(1);
        if acked_through > self.next_seq || acked_through < self.send_base {
            return 0;
        }

        self.peer_window = Some(adv_win);

        let mut released = 0usize;
        while let Some(front) = self.in_flight.front() {
            if front.packet.seq_num >= acked_through {
                break;
            }
            if let Some(entry) = self.in_flight.pop_front() {
                self.last_acked = Some(entry.packet);
                released += 1;
            }
        }
        self.send_base = acked_through;
        self.last_progress = Some(now);
        released
    }

    /// Collect every in-flight packet inside the current window whose
    /// retransmission deadline has passed, refreshing its deadline and
    /// bumping its transmission count.
    ///
    /// Entries at or beyond `send_base + effective_window` are left alone.
    pub fn expired(&mut self, now: Instant, rto: Duration) -> Vec<InFlight> {
        let window = self.effective_window();
        let base = self.send_base;
        self.in_flight
            .iter_mut()
            .filter(|entry| (entry.packet.seq_num.wrapping_sub(base) as usize) < window)
            .filter(|entry| entry.expired(now, rto))
            .map(|entry| {
                entry.tx_count += 1;
                entry.sent_at = now;
                entry.clone()
            })
            .collect()
    }

    /// Packet to send from the persist timer, if one is due.
    ///
    /// Due when the peer has closed the window and at least `rto` has passed
    /// since the last ACK or persist packet.  The packet is the oldest parked
    /// entry if anything is in flight, otherwise the most recently
    /// acknowledged packet; either way no new sequence number is used.  The
    /// caller decides whether there is anything left to deliver.
    pub fn persist(&mut self, now: Instant, rto: Duration) -> Option<Packet> {
        if self.effective_window() > 0 {
            return None;
        }
        let since = self.last_progress?;
        if now.saturating_duration_since(since) < rto {
            return None;
        }

        let packet = match self.in_flight.front_mut() {
            Some(oldest) => {
                oldest.tx_count += 1;
                oldest.sent_at = now;
                oldest.packet.clone()
            }
            None => self.last_acked.clone()?,
        };
        self.last_progress = Some(now);
        Some(packet)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
