//! In-memory network simulator.
//!
//! Real networks drop, reorder, and duplicate packets.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`link`] builds a pair of connected [`SimEndpoint`]s that implement
//! [`Transport`] over channels and apply a configurable fault model to every
//! frame they send:
//!
//! | Fault            | Description                                        |
//! |------------------|----------------------------------------------------|
//! | Packet loss      | Drop a frame with probability `loss_rate`.         |
//! | Reordering       | Hold a frame back with probability `reorder_rate`  |
//! |                  | and release it after the next frame.               |
//! | Duplication      | Deliver a frame twice with `duplicate_rate`.       |
//! | Scripted loss    | [`SimEndpoint::drop_next`] drops the next N frames.|
//!
//! Faults are rolled from a seeded RNG when `seed` is set, so failures are
//! reproducible.  Every frame that actually reaches the peer is recorded and
//! can be inspected with [`SimEndpoint::delivered`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, watch};

use crate::transport::Transport;

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    /// Probability that any given frame is silently dropped.
    pub loss_rate: f64,
    /// Probability that a frame is held back behind the next one.
    pub reorder_rate: f64,
    /// Probability that a frame is delivered twice.
    pub duplicate_rate: f64,
    /// RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl SimulatorConfig {
    /// A lossy link dropping frames with probability `loss_rate`.
    pub fn lossy(loss_rate: f64) -> Self {
        Self {
            loss_rate,
            ..Self::default()
        }
    }
}

/// Build two connected endpoints.  `a` governs frames sent by the first
/// endpoint, `b` frames sent by the second.
pub fn link(a: SimulatorConfig, b: SimulatorConfig) -> (SimEndpoint, SimEndpoint) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (SimEndpoint::new(a, a_tx, a_rx), SimEndpoint::new(b, b_tx, b_rx))
}

/// Per-endpoint mutable fault state.
#[derive(Debug)]
struct Faults {
    rng: StdRng,
    held_back: Option<Vec<u8>>,
    delivered: Vec<Vec<u8>>,
}

/// One side of a simulated link.
#[derive(Debug)]
pub struct SimEndpoint {
    config: SimulatorConfig,
    faults: Mutex<Faults>,
    drop_next: AtomicUsize,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: watch::Sender<bool>,
}

impl SimEndpoint {
    fn new(
        config: SimulatorConfig,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (closed, _) = watch::channel(false);
        Self {
            config,
            faults: Mutex::new(Faults {
                rng,
                held_back: None,
                delivered: Vec::new(),
            }),
            drop_next: AtomicUsize::new(0),
            outbound,
            inbound: tokio::sync::Mutex::new(inbound),
            closed,
        }
    }

    /// Deterministically drop the next `n` outbound frames.
    pub fn drop_next(&self, n: usize) {
        self.drop_next.store(n, Ordering::SeqCst);
    }

    /// Every frame this endpoint has delivered to its peer, in order.
    pub fn delivered(&self) -> Vec<Vec<u8>> {
        self.faults().delivered.clone()
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_scripted_drop(&self) -> bool {
        self.drop_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn deliver(&self, faults: &mut Faults, frame: Vec<u8>) -> bool {
        if self.outbound.send(frame.clone()).is_err() {
            return false;
        }
        faults.delivered.push(frame);
        true
    }
}

fn roll(rng: &mut StdRng, probability: f64) -> bool {
    probability > 0.0 && rng.gen_bool(probability.min(1.0))
}

#[async_trait]
impl Transport for SimEndpoint {
    async fn send(&self, frame: &[u8]) -> Option<usize> {
        if *self.closed.borrow() {
            return None;
        }
        if self.take_scripted_drop() {
            log::debug!("[sim] scripted drop of {} bytes", frame.len());
            return None;
        }

        let mut faults = self.faults();
        if roll(&mut faults.rng, self.config.loss_rate) {
            log::debug!("[sim] dropped {} bytes", frame.len());
            return None;
        }
        if faults.held_back.is_none() && roll(&mut faults.rng, self.config.reorder_rate) {
            log::debug!("[sim] holding back {} bytes", frame.len());
            faults.held_back = Some(frame.to_vec());
            return Some(frame.len());
        }

        if !self.deliver(&mut faults, frame.to_vec()) {
            return None;
        }
        if roll(&mut faults.rng, self.config.duplicate_rate) {
            log::debug!("[sim] duplicating {} bytes", frame.len());
            self.deliver(&mut faults, frame.to_vec());
        }
        if let Some(held) = faults.held_back.take() {
            self.deliver(&mut faults, held);
        }
        Some(frame.len())
    }

    async fn recv(&self) -> Option<Vec<u8>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return None;
        }
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            frame = inbound.recv() => frame,
            _ = closed.wait_for(|closed| *closed) => None,
        }
    }

    fn shutdown(&self) {
        if !self.closed.send_replace(true) {
            log::debug!("[sim] endpoint shut down");
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
