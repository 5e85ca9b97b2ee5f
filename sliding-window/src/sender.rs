//! Send-side protocol endpoint.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  send(data)  ──chunks──▶  mpsc (unbounded queue)
//!      │  flush()                        │
//!      ▼                                 ▼
//!  Sender handle               event_loop task (tokio::select!)
//!                                ├── queued chunk, if window has room ──▶ DATA
//!                                ├── transport.recv() ◀── ACK
//!                                └── scan tick ──▶ retransmit / persist
//! ```
//!
//! The event loop exclusively owns the [`SendWindow`], so the in-flight set
//! and the next sequence number are never touched from two places at once.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::SenderConfig;
use crate::error::{Result, SwpError};
use crate::packet::{Packet, PacketType, MAX_DATA_SIZE};
use crate::send_window::SendWindow;
use crate::transport::{Transport, UdpEndpoint};

/// Work items handed from the application to the event loop.
#[derive(Debug)]
enum Command {
    /// One chunk of at most [`MAX_DATA_SIZE`] bytes.
    Data(Vec<u8>),
    /// Resolve once everything queued before it has been acknowledged.
    Flush(oneshot::Sender<()>),
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Reliable, windowed sender bound to one transport endpoint.
///
/// Must be created inside a tokio runtime.  Dropping the handle closes the
/// transport; call [`flush`](Self::flush) first to make sure queued data was
/// delivered.
pub struct Sender<T: Transport> {
    commands: mpsc::UnboundedSender<Command>,
    transport: Arc<T>,
    task: Option<JoinHandle<()>>,
}

impl Sender<UdpEndpoint> {
    /// Send to `remote` over UDP, dropping outbound frames with
    /// `loss_probability`.
    pub async fn connect(
        remote: SocketAddr,
        loss_probability: f64,
        config: SenderConfig,
    ) -> Result<Self> {
        let endpoint = UdpEndpoint::connect(remote, loss_probability).await?;
        Self::new(endpoint, config)
    }
}

impl<T: Transport> Sender<T> {
    /// Start a sender on `transport`.
    pub fn new(transport: T, config: SenderConfig) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(transport);
        let (commands, queue) = mpsc::unbounded_channel();
        let task = tokio::spawn(event_loop(transport.clone(), config, queue));
        Ok(Self {
            commands,
            transport,
            task: Some(task),
        })
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Queue `data` for delivery.
    ///
    /// `data` is split into chunks of at most [`MAX_DATA_SIZE`] bytes, each
    /// of which becomes one DATA packet.  Returns as soon as the chunks are
    /// queued; delivery happens in the background, in order.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        for chunk in data.chunks(MAX_DATA_SIZE) {
            self.commands
                .send(Command::Data(chunk.to_vec()))
                .map_err(|_| SwpError::Closed)?;
        }
        Ok(())
    }

    /// Wait until every chunk queued so far has been acknowledged.
    pub async fn flush(&self) -> Result<()> {
        let (done, waiter) = oneshot::channel();
        self.commands
            .send(Command::Flush(done))
            .map_err(|_| SwpError::Closed)?;
        waiter.await.map_err(|_| SwpError::Closed)
    }

    /// Close the transport without waiting for the event loop.
    pub fn close(&self) {
        self.transport.shutdown();
    }

    /// Close the transport and wait for the event loop to exit.
    pub async fn shutdown(mut self) {
        self.transport.shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<T: Transport> Drop for Sender<T> {
    fn drop(&mut self) {
        self.transport.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Background event loop
// ---------------------------------------------------------------------------

async fn event_loop<T: Transport>(
    transport: Arc<T>,
    config: SenderConfig,
    mut queue: mpsc::UnboundedReceiver<Command>,
) {
    let mut window = SendWindow::new(config.window_size);
    let mut flush_waiters: Vec<oneshot::Sender<()>> = Vec::new();
    let mut accepting = true;

    let mut scan = tokio::time::interval(config.scan_interval);
    scan.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // ── Branch 1: next queued chunk ──────────────────────────────
            // Only eligible while the window has room: this is the
            // backpressure point.
            command = queue.recv(), if accepting && window.can_send() => {
                match command {
                    Some(Command::Data(chunk)) => {
                        let packet = window.push(chunk, Instant::now());
                        transport.send(&packet.encode()).await;
                        log::debug!("[swp:send] → {packet} in_flight={}", window.in_flight());
                    }
                    Some(Command::Flush(done)) => flush_waiters.push(done),
                    None => accepting = false,
                }
            }

            // ── Branch 2: inbound frame ──────────────────────────────────
            frame = transport.recv() => {
                let Some(raw) = frame else {
                    log::debug!("[swp:send] transport closed");
                    break;
                };
                on_frame(&mut window, &raw);
            }

            // ── Branch 3: retransmission scan ────────────────────────────
            _ = scan.tick() => {
                let now = Instant::now();
                for entry in window.expired(now, config.rto) {
                    log::debug!(
                        "[swp:send] timeout, retransmitting {} tx={}",
                        entry.packet,
                        entry.tx_count
                    );
                    transport.send(&entry.packet.encode()).await;
                }
                if !window.is_idle() || !queue.is_empty() {
                    if let Some(packet) = window.persist(now, config.rto) {
                        log::debug!("[swp:send] zero window, persisting with {packet}");
                        transport.send(&packet.encode()).await;
                    }
                }
            }
        }

        if window.is_idle() {
            for done in flush_waiters.drain(..) {
                let _ = done.send(());
            }
            if !accepting {
                break;
            }
        }
    }
}

/// Apply one inbound frame to the window.
fn on_frame(window: &mut SendWindow, raw: &[u8]) {
    let packet = match Packet::decode(raw) {
        Ok(packet) => packet,
        Err(e) => {
            log::warn!("[swp:send] discarding frame: {e}");
            return;
        }
    };
    if packet.kind != PacketType::Ack {
        log::debug!("[swp:send] ignoring unexpected {packet}");
        return;
    }
    let released = window.on_ack(packet.seq_num, packet.adv_win, Instant::now());
    log::debug!(
        "[swp:send] ← {packet} released={released} in_flight={} window={}",
        window.in_flight(),
        window.effective_window()
    );
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
