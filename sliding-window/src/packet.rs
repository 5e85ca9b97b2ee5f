//! Wire-format definitions for protocol packets.
//!
//! Every datagram exchanged between a [`crate::sender::Sender`] and a
//! [`crate::receiver::Receiver`] is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (type tag, sequence number,
//!   advertised window, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], returning errors
//!   for truncated headers or unknown type tags.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |            Sequence Number ...                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     ...       |            Advertised Window ...              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     ...       |            Payload (DATA only) ...            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 9 bytes.
//! type(1) + seq(4) + adv_win(4)

use std::fmt;

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 9;

/// Largest payload a single DATA packet carries.
///
/// Leaves plenty of room for IP + UDP + our own header inside a 1500-byte MTU.
pub const MAX_DATA_SIZE: usize = 1400;

// Byte offsets of each field within the serialised header.
const OFF_TYPE: usize = 0;
const OFF_SEQ: usize = 1;
const OFF_ADV_WIN: usize = 5;

/// Packet type, encoded as a single ASCII tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Application payload (`'D'`).
    Data,
    /// Cumulative acknowledgement (`'A'`).
    Ack,
}

impl PacketType {
    /// The tag byte written on the wire.
    pub const fn tag(self) -> u8 {
        match self {
            PacketType::Data => b'D',
            PacketType::Ack => b'A',
        }
    }

    /// Map a tag byte back to a [`PacketType`].
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'D' => Some(PacketType::Data),
            b'A' => Some(PacketType::Ack),
            _ => None,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Data => f.write_str("DATA"),
            PacketType::Ack => f.write_str("ACK"),
        }
    }
}

/// A complete protocol datagram.
///
/// `adv_win` is only meaningful on ACK packets and is zero on DATA packets.
/// ACK packets carry no payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    /// DATA: sequence number of this chunk.  ACK: highest sequence number
    /// such that every packet up to and including it has been delivered.
    pub seq_num: u32,
    /// Advertised receive window, in packets.
    pub adv_win: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a DATA packet.
    pub fn data(seq_num: u32, payload: Vec<u8>) -> Self {
        Self {
            kind: PacketType::Data,
            seq_num,
            adv_win: 0,
            payload,
        }
    }

    /// Build a cumulative ACK packet.
    pub fn ack(seq_num: u32, adv_win: u32) -> Self {
        Self {
            kind: PacketType::Ack,
            seq_num,
            adv_win,
            payload: Vec::new(),
        }
    }

    /// Serialise this packet into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];

        buf[OFF_TYPE] = self.kind.tag();
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq_num.to_be_bytes());
        buf[OFF_ADV_WIN..OFF_ADV_WIN + 4].copy_from_slice(&self.adv_win.to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        buf
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Returns [`Err`] if `buf` is shorter than [`HEADER_LEN`] or the type
    /// tag is unknown.  Everything after the header is the payload; its
    /// length is not checked against [`MAX_DATA_SIZE`].
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::Truncated { len: buf.len() });
        }

        let kind =
            PacketType::from_tag(buf[OFF_TYPE]).ok_or(PacketError::UnknownType(buf[OFF_TYPE]))?;
        let seq_num = read_u32(&buf[OFF_SEQ..OFF_SEQ + 4]);
        let adv_win = read_u32(&buf[OFF_ADV_WIN..OFF_ADV_WIN + 4]);

        Ok(Packet {
            kind,
            seq_num,
            adv_win,
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PacketType::Data => write!(f, "DATA seq={} len={}", self.seq_num, self.payload.len()),
            PacketType::Ack if self.seq_num == u32::MAX => {
                write!(f, "ACK seq=-1 win={}", self.adv_win)
            }
            PacketType::Ack => write!(f, "ACK seq={} win={}", self.seq_num, self.adv_win),
        }
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    u32::from_be_bytes(word)
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer shorter than the fixed header size.
    #[error("malformed packet: {len} bytes is shorter than the {}-byte header", HEADER_LEN)]
    Truncated { len: usize },
    /// Type tag is neither `'D'` nor `'A'`.
    #[error("malformed packet: unknown type tag {0:#04x}")]
    UnknownType(u8),
}
