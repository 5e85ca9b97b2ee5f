//! Unreliable datagram transport.
//!
//! [`Transport`] is the port the protocol endpoints talk through: it moves
//! opaque frames between two fixed peers and may lose any of them.
//! [`UdpEndpoint`] is the production implementation, a thin wrapper around
//! `tokio::net::UdpSocket` with optional outbound loss.  All protocol logic
//! lives elsewhere; this module owns only byte I/O.

use std::io;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::config::validate_loss;
use crate::error::Result;

/// Largest datagram accepted from the socket.
const MAX_DATAGRAM: usize = 65_535;

// ---------------------------------------------------------------------------
// Transport port
// ---------------------------------------------------------------------------

/// Best-effort frame transport between two fixed endpoints.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one frame.  Returns the number of bytes handed to the network,
    /// or `None` if the frame was dropped or could not be sent.  Loss is
    /// never reported as an error.
    async fn send(&self, frame: &[u8]) -> Option<usize>;

    /// Wait for the next frame.  Returns `None` once the transport is shut
    /// down, the peer is gone, or the socket failed for good.
    ///
    /// Must be cancel-safe: it is raced against other events in
    /// `tokio::select!`.
    async fn recv(&self) -> Option<Vec<u8>>;

    /// Close the transport.  Idempotent; wakes any pending [`recv`](Self::recv).
    fn shutdown(&self);
}

/// Roll the dice for one outbound frame.
pub(crate) fn lost(probability: f64) -> bool {
    probability > 0.0 && rand::random::<f64>() < probability
}

/// Returns true if the error is likely transient (a later receive may succeed).
///
/// Some platforms report an ICMP port-unreachable from an absent peer as
/// `ConnectionRefused`/`ConnectionReset` on the next receive.
fn is_transient_io_error(e: &io::Error) -> bool {
    use io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    )
}

// ---------------------------------------------------------------------------
// UdpEndpoint
// ---------------------------------------------------------------------------

/// A lossy UDP endpoint bound to a single peer.
///
/// The sending side knows its peer up front ([`connect`](Self::connect)); the
/// receiving side learns it from the first datagram that arrives
/// ([`bind`](Self::bind)) and ignores other sources afterwards.
#[derive(Debug)]
pub struct UdpEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    peer: Mutex<Option<SocketAddr>>,
    loss_probability: f64,
    closed: watch::Sender<bool>,
}

impl UdpEndpoint {
    /// Bind to `local_addr` and wait for a peer to show up.
    pub async fn bind(local_addr: SocketAddr, loss_probability: f64) -> Result<Self> {
        validate_loss(loss_probability)?;
        let socket = UdpSocket::bind(local_addr).await?;
        Ok(Self::from_socket(socket, None, loss_probability)?)
    }

    /// Bind an ephemeral local port and talk to `remote` only.
    pub async fn connect(remote: SocketAddr, loss_probability: f64) -> Result<Self> {
        validate_loss(loss_probability)?;
        let any: SocketAddr = if remote.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(any).await?;
        Ok(Self::from_socket(socket, Some(remote), loss_probability)?)
    }

    fn from_socket(
        socket: UdpSocket,
        peer: Option<SocketAddr>,
        loss_probability: f64,
    ) -> io::Result<Self> {
        let local_addr = socket.local_addr()?;
        let (closed, _) = watch::channel(false);
        Ok(Self {
            socket,
            local_addr,
            peer: Mutex::new(peer),
            loss_probability,
            closed,
        })
    }

    /// Address this socket is bound to (after the OS assigned any ephemeral port).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The remote peer, once known.
    pub fn peer(&self) -> Option<SocketAddr> {
        *self.peer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept a datagram from `addr` if it comes from our peer, adopting
    /// `addr` as the peer if none is known yet.
    fn admit(&self, addr: SocketAddr) -> bool {
        let mut peer = self.peer.lock().unwrap_or_else(PoisonError::into_inner);
        match *peer {
            Some(known) => known == addr,
            None => {
                log::debug!("[udp] peer is {addr}");
                *peer = Some(addr);
                true
            }
        }
    }

    async fn recv_datagram(&self, buf: &mut [u8]) -> Option<usize> {
        loop {
            match self.socket.recv_from(buf).await {
                Ok((0, _)) => continue,
                Ok((n, addr)) => {
                    if self.admit(addr) {
                        return Some(n);
                    }
                    log::debug!("[udp] ignoring {n} bytes from stranger {addr}");
                }
                Err(e) if is_transient_io_error(&e) => {
                    log::debug!("[udp] transient receive error: {e}");
                }
                Err(e) => {
                    log::warn!("[udp] receive failed: {e}");
                    return None;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for UdpEndpoint {
    async fn send(&self, frame: &[u8]) -> Option<usize> {
        if *self.closed.borrow() {
            return None;
        }
        if lost(self.loss_probability) {
            log::debug!("[udp] dropped {} bytes", frame.len());
            return None;
        }
        let Some(peer) = self.peer() else {
            log::debug!("[udp] no peer yet; {} bytes not sent", frame.len());
            return None;
        };
        match self.socket.send_to(frame, peer).await {
            Ok(n) => {
                log::debug!("[udp] sent {n} bytes to {peer}");
                Some(n)
            }
            Err(e) => {
                log::debug!("[udp] send to {peer} failed: {e}");
                None
            }
        }
    }

    async fn recv(&self) -> Option<Vec<u8>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return None;
        }

        let mut buf = vec![0u8; MAX_DATAGRAM];
        tokio::select! {
            received = self.recv_datagram(&mut buf) => {
                let n = received?;
                buf.truncate(n);
                log::debug!("[udp] received {n} bytes");
                Some(buf)
            }
            _ = closed.wait_for(|closed| *closed) => None,
        }
    }

    fn shutdown(&self) {
        if !self.closed.send_replace(true) {
            log::debug!("[udp] {} shut down", self.local_addr);
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn loss_extremes() {
        assert!(!lost(0.0));
        assert!(lost(1.0));
    }

    #[tokio::test]
    async fn invalid_loss_probability_rejected() {
        assert!(UdpEndpoint::bind(loopback(), 2.0).await.is_err());
    }

    #[tokio::test]
    async fn bound_endpoint_learns_peer_from_first_datagram() {
        let server = UdpEndpoint::bind(loopback(), 0.0).await.unwrap();
        assert!(server.peer().is_none());
        // Nothing to reply to yet.
        assert_eq!(server.send(b"early").await, None);

        let client = UdpEndpoint::connect(server.local_addr(), 0.0).await.unwrap();
        assert_eq!(client.send(b"hello").await, Some(5));
        assert_eq!(server.recv().await.unwrap(), b"hello");
        assert_eq!(server.peer().unwrap().port(), client.local_addr().port());

        server.send(b"world").await.unwrap();
        assert_eq!(client.recv().await.unwrap(), b"world");
    }

    #[tokio::test]
    async fn total_loss_sends_nothing() {
        let server = UdpEndpoint::bind(loopback(), 0.0).await.unwrap();
        let client = UdpEndpoint::connect(server.local_addr(), 1.0).await.unwrap();
        assert_eq!(client.send(b"gone").await, None);
    }

    #[tokio::test]
    async fn shutdown_wakes_pending_recv() {
        let endpoint = std::sync::Arc::new(UdpEndpoint::bind(loopback(), 0.0).await.unwrap());
        let waiter = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move { endpoint.recv().await })
        };
        tokio::task::yield_now().await;
        endpoint.shutdown();
        endpoint.shutdown();
        assert_eq!(waiter.await.unwrap(), None);
        assert_eq!(endpoint.recv().await, None);
    }
}
