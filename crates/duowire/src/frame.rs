//! # Frames
//!
//! A length-delimited binary encoding of a [`Packet`] for byte-stream transports.
//!
//! ## Wire Format
//!
//! ```text
//! flag:u8 | sequence:u64 | command_len:u16 | payload_len:u32 | command | payload
//! ```
//!
//! All integers are big-endian. The header has a fixed size of [`HEADER_LEN`]
//! bytes so a reader knows exactly how much body to wait for.
//!
//! ## Invariants
//! - **Panic Safety**: All decoding paths return `Result`, never panicking on unknown data.
//! - The client id is never encoded; readers stamp it on decode.

use crate::error::Error;
use crate::error::Result;
use crate::packet::Flags;
use crate::packet::Kind;
use crate::packet::Packet;

pub const HEADER_LEN: usize = 15;

/// The fixed-size prefix of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub flag: u8,
    pub sequence: u64,
    pub command_len: u16,
    pub payload_len: u32,
}

impl Header {
    /// Parses a header. The kind is validated later in [`Header::into_packet`]
    /// so that a reader can still skip the body of an unknown frame.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Self {
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&bytes[1..9]);
        Self {
            flag: bytes[0],
            sequence: u64::from_be_bytes(seq),
            command_len: u16::from_be_bytes([bytes[9], bytes[10]]),
            payload_len: u32::from_be_bytes([bytes[11], bytes[12], bytes[13], bytes[14]]),
        }
    }

    pub fn body_len(&self) -> usize {
        self.command_len as usize + self.payload_len as usize
    }

    /// Builds the packet from the body that followed this header.
    pub fn into_packet(self, body: &[u8]) -> Result<Packet> {
        if body.len() != self.body_len() {
            return Err(Error::LengthMismatch { expected: self.body_len(), found: body.len() });
        }
        let kind = Kind::from_bits(self.flag).ok_or(Error::UnknownKind(self.flag))?;
        let (command, payload) = body.split_at(self.command_len as usize);
        let command = std::str::from_utf8(command).map_err(|_| Error::InvalidCommand)?;

        Ok(Packet {
            client_id: 0,
            kind,
            flags: Flags::from_bits(self.flag),
            command: command.to_owned(),
            sequence: self.sequence,
            payload: payload.to_vec(),
        })
    }
}

/// Encodes a packet into a single frame.
pub fn encode(packet: &Packet) -> Result<Vec<u8>> {
    let command_len = u16::try_from(packet.command.len())
        .map_err(|_| Error::CommandTooLong(packet.command.len()))?;
    let payload_len = u32::try_from(packet.length())
        .map_err(|_| Error::PayloadTooLarge(packet.length()))?;

    let mut buf = Vec::with_capacity(HEADER_LEN + packet.command.len() + packet.length());
    buf.push(packet.flag_byte());
    buf.extend_from_slice(&packet.sequence.to_be_bytes());
    buf.extend_from_slice(&command_len.to_be_bytes());
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(packet.command.as_bytes());
    buf.extend_from_slice(&packet.payload);
    Ok(buf)
}

/// Decodes exactly one frame. Trailing bytes are a length mismatch.
pub fn decode(bytes: &[u8]) -> Result<Packet> {
    let Some((head, body)) = bytes.split_first_chunk::<HEADER_LEN>() else {
        return Err(Error::Truncated { needed: HEADER_LEN, available: bytes.len() });
    };
    let header = Header::parse(head);
    if body.len() < header.body_len() {
        return Err(Error::Truncated { needed: HEADER_LEN + header.body_len(), available: bytes.len() });
    }
    header.into_packet(body)
}
