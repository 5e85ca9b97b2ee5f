//! Receive-side protocol endpoint.
//!
//! A background task reads DATA frames from the transport, feeds them to the
//! shared [`ReceiveWindow`] and answers each with a cumulative ACK.  The
//! application pulls in-order chunks with [`Receiver::recv`].
//!
//! The window lives behind one mutex.  The receive task commits a packet to
//! the window and only then wakes waiting consumers, so a wakeup always finds
//! its data in place; a consumer that finds nothing ready re-checks after the
//! next wakeup instead of trusting a separate counter.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::ReceiverConfig;
use crate::error::{Result, SwpError};
use crate::packet::{Packet, PacketType};
use crate::recv_window::{Arrival, ReceiveWindow};
use crate::transport::{Transport, UdpEndpoint};

/// State shared by the receive task and the application.
struct Shared<T> {
    transport: T,
    window: Mutex<ReceiveWindow>,
    ready: Notify,
    closed: AtomicBool,
}

impl<T: Transport> Shared<T> {
    fn window(&self) -> MutexGuard<'_, ReceiveWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply an inbound DATA packet; returns the outcome and the ACK to send.
    ///
    /// Every DATA packet is answered, including ones that do not fit, so a
    /// sender holding a closed window always learns the current one.
    fn on_data(&self, packet: Packet) -> (Arrival, Packet) {
        let mut window = self.window();
        let arrival = window.on_data(packet.seq_num, packet.payload);
        (arrival, window.ack())
    }

    /// Pop the next ready chunk, plus a window update if consuming it
    /// reopened a closed window.
    fn take_ready(&self) -> Option<(Vec<u8>, Option<Packet>)> {
        let mut window = self.window();
        let chunk = window.pop_ready()?;
        let update = window.window_reopened().then(|| window.ack());
        Some((chunk, update))
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Reliable, in-order receiver bound to one transport endpoint.
///
/// Must be created inside a tokio runtime.  Dropping the handle closes the
/// transport.
pub struct Receiver<T: Transport> {
    shared: Arc<Shared<T>>,
    task: Option<JoinHandle<()>>,
}

impl Receiver<UdpEndpoint> {
    /// Listen on `local` over UDP, dropping outbound ACKs with
    /// `loss_probability`.
    pub async fn bind(
        local: SocketAddr,
        loss_probability: f64,
        config: ReceiverConfig,
    ) -> Result<Self> {
        let endpoint = UdpEndpoint::bind(local, loss_probability).await?;
        Self::new(endpoint, config)
    }
}

impl<T: Transport> Receiver<T> {
    /// Start a receiver on `transport`.
    pub fn new(transport: T, config: ReceiverConfig) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared {
            transport,
            window: Mutex::new(ReceiveWindow::new(config.buffer_size)),
            ready: Notify::new(),
            closed: AtomicBool::new(false),
        });
        let task = tokio::spawn(receive_loop(shared.clone()));
        Ok(Self {
            shared,
            task: Some(task),
        })
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    /// Number of chunks ready to be returned by [`recv`](Self::recv) without
    /// waiting.
    pub fn ready(&self) -> usize {
        self.shared.window().ready()
    }

    /// Wait for the next in-order chunk.
    ///
    /// Chunks come back exactly once each, in sequence order, regardless of
    /// loss, reordering or duplication below.  Returns
    /// [`SwpError::Closed`] once the transport is closed and nothing ready
    /// remains.
    pub async fn recv(&self) -> Result<Vec<u8>> {
        loop {
            let notified = self.shared.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some((chunk, update)) = self.shared.take_ready() {
                if let Some(ack) = update {
                    self.shared.transport.send(&ack.encode()).await;
                    log::debug!("[swp:recv] → {ack} (window update)");
                }
                return Ok(chunk);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(SwpError::Closed);
            }
            notified.await;
        }
    }

    /// Close the transport without waiting for the receive task.
    pub fn close(&self) {
        self.shared.transport.shutdown();
    }

    /// Close the transport and wait for the receive task to exit.
    pub async fn shutdown(mut self) {
        self.shared.transport.shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<T: Transport> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.shared.transport.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Background receive task
// ---------------------------------------------------------------------------

async fn receive_loop<T: Transport>(shared: Arc<Shared<T>>) {
    while let Some(raw) = shared.transport.recv().await {
        let packet = match Packet::decode(&raw) {
            Ok(packet) => packet,
            Err(e) => {
                log::warn!("[swp:recv] discarding frame: {e}");
                continue;
            }
        };
        if packet.kind != PacketType::Data {
            log::debug!("[swp:recv] ignoring unexpected {packet}");
            continue;
        }

        let seq = packet.seq_num;
        let len = packet.payload.len();
        let (arrival, ack) = shared.on_data(packet);
        match arrival {
            Arrival::Duplicate => {
                log::debug!("[swp:recv] ← DATA seq={seq} duplicate");
            }
            Arrival::OutOfWindow => {
                log::warn!("[swp:recv] ← DATA seq={seq} exceeds buffer capacity; dropped");
            }
            Arrival::Buffered { ready } => {
                log::debug!("[swp:recv] ← DATA seq={seq} len={len} ready+={ready}");
                if ready > 0 {
                    shared.ready.notify_waiters();
                }
            }
        }

        shared.transport.send(&ack.encode()).await;
        log::debug!("[swp:recv] → {ack}");
    }

    log::debug!("[swp:recv] transport closed");
    shared.closed.store(true, Ordering::Release);
    shared.ready.notify_waiters();
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
