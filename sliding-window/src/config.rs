//! Tuning knobs for the two protocol endpoints.

use std::time::Duration;

use crate::error::{Result, SwpError};

/// Send-side parameters.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Maximum number of unacknowledged DATA packets in flight.  The peer's
    /// advertised window may lower this further, never raise it.
    pub window_size: usize,
    /// Fixed retransmission timeout.  There is no RTT estimation and no
    /// back-off.
    pub rto: Duration,
    /// How often the event loop scans the window for expired packets.
    pub scan_interval: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            rto: Duration::from_secs(1),
            scan_interval: Duration::from_millis(100),
        }
    }
}

impl SenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(SwpError::Config("window_size must be at least 1".into()));
        }
        if self.rto.is_zero() {
            return Err(SwpError::Config("rto must be non-zero".into()));
        }
        if self.scan_interval.is_zero() {
            return Err(SwpError::Config("scan_interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// Receive-side parameters.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Number of packet slots in the receive buffer.
    pub buffer_size: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self { buffer_size: 5 }
    }
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(SwpError::Config("buffer_size must be at least 1".into()));
        }
        if u32::try_from(self.buffer_size).is_err() {
            return Err(SwpError::Config("buffer_size does not fit the advertised window field".into()));
        }
        Ok(())
    }
}

/// Check that a loss probability lies in `[0, 1]`.
pub fn validate_loss(probability: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&probability) {
        return Err(SwpError::Config(format!(
            "loss probability {probability} is outside [0, 1]"
        )));
    }
    Ok(())
}
