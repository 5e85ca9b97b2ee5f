//! Entry point for `sliding-window`.
//!
//! Parses CLI arguments and dispatches into either **sender** or **receiver**
//! mode.  All protocol work is delegated to the library; `main.rs` owns only
//! process setup (logging, argument parsing, stdin/stdout).

use std::io::Write;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use sliding_window::{Receiver, ReceiverConfig, Sender, SenderConfig, UdpEndpoint};

/// Reliable sliding-window byte stream over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Read lines from stdin and send each one to a receiver.
    Sender {
        /// Remote port.
        #[arg(short, long)]
        port: u16,
        /// Remote hostname.
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        hostname: String,
        /// Probability of dropping an outbound frame.
        #[arg(short, long, default_value_t = 0.0)]
        loss: f64,
        /// Maximum number of unacknowledged packets.
        #[arg(short, long, default_value_t = 5)]
        window: usize,
        /// Retransmission timeout in milliseconds.
        #[arg(long, default_value_t = 1000)]
        rto_ms: u64,
    },
    /// Receive chunks and print them to stdout.
    Receiver {
        /// Local port.
        #[arg(short, long)]
        port: u16,
        /// Local hostname.
        #[arg(short = 'H', long, default_value = "0.0.0.0")]
        hostname: String,
        /// Receive buffer size, in packets.
        #[arg(short, long, default_value_t = 5)]
        buffer: usize,
        /// Probability of dropping an outbound frame.
        #[arg(short, long, default_value_t = 0.0)]
        loss: f64,
        /// Seconds to wait before consuming each chunk; 0 consumes immediately.
        #[arg(short, long, default_value_t = 0.0)]
        consumption: f64,
    },
}

fn resolve(hostname: &str, port: u16) -> Result<SocketAddr> {
    (hostname, port)
        .to_socket_addrs()
        .with_context(|| format!("resolving {hostname}:{port}"))?
        .next()
        .ok_or_else(|| anyhow!("{hostname}:{port} did not resolve to an address"))
}

async fn run_sender(remote: SocketAddr, loss: f64, config: SenderConfig) -> Result<()> {
    let sender = Sender::<UdpEndpoint>::connect(remote, loss, config).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        sender.send(format!("{line}\n").as_bytes())?;
    }

    log::info!("stdin closed; waiting for outstanding data to be acknowledged");
    sender.flush().await?;
    sender.shutdown().await;
    Ok(())
}

async fn run_receiver(
    local: SocketAddr,
    loss: f64,
    config: ReceiverConfig,
    consumption: Duration,
) -> Result<()> {
    let receiver = Receiver::<UdpEndpoint>::bind(local, loss, config).await?;
    log::info!("listening on {}", receiver.transport().local_addr());

    // Bytes of a character split across chunks, held until the rest arrives.
    let mut pending = Vec::new();
    loop {
        tokio::time::sleep(consumption).await;
        pending.extend(receiver.recv().await?);
        let tail = pending.split_off(pending.len() - incomplete_utf8_tail(&pending));
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(String::from_utf8_lossy(&pending).as_bytes())?;
        stdout.flush()?;
        pending = tail;
    }
}

/// Length of a trailing multi-byte UTF-8 sequence that is not complete yet.
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let byte = bytes[len - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Sender {
            port,
            hostname,
            loss,
            window,
            rto_ms,
        } => {
            let remote = resolve(&hostname, port)?;
            log::info!("Sending to {remote}");
            let config = SenderConfig {
                window_size: window,
                rto: Duration::from_millis(rto_ms),
                ..SenderConfig::default()
            };
            run_sender(remote, loss, config).await
        }
        Mode::Receiver {
            port,
            hostname,
            buffer,
            loss,
            consumption,
        } => {
            let local = resolve(&hostname, port)?;
            log::info!("Starting receiver on {local}");
            let consumption = Duration::try_from_secs_f64(consumption)
                .context("consumption interval must be a non-negative number of seconds")?;
            run_receiver(local, loss, ReceiverConfig { buffer_size: buffer }, consumption).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_text_has_no_tail() {
        assert_eq!(incomplete_utf8_tail(b""), 0);
        assert_eq!(incomplete_utf8_tail(b"plain\n"), 0);
        assert_eq!(incomplete_utf8_tail("caf\u{e9}".as_bytes()), 0);
        assert_eq!(incomplete_utf8_tail("\u{1F980}".as_bytes()), 0);
    }

    #[test]
    fn split_character_is_held_back() {
        let crab = "\u{1F980}".as_bytes();
        for cut in 1..crab.len() {
            let mut chunk = b"ok ".to_vec();
            chunk.extend_from_slice(&crab[..cut]);
            assert_eq!(incomplete_utf8_tail(&chunk), cut, "cut at {cut}");
        }
    }

    #[test]
    fn character_split_across_chunks_is_reassembled() {
        let text = "na\u{ef}ve \u{65e5}\u{672c}";
        let bytes = text.as_bytes();
        let mut out = String::new();
        let mut pending = Vec::new();
        for chunk in bytes.chunks(4) {
            pending.extend_from_slice(chunk);
            let tail = pending.split_off(pending.len() - incomplete_utf8_tail(&pending));
            out.push_str(&String::from_utf8_lossy(&pending));
            pending = tail;
        }
        assert!(pending.is_empty());
        assert_eq!(out, text);
    }
}
