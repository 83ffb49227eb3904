//! # Error Definitions

/// Failures while encoding or decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Fewer bytes were available than the header announced.
    Truncated { needed: usize, available: usize },
    /// The kind bits of the flag byte name no known kind.
    UnknownKind(u8),
    /// The command does not fit the 16-bit length field.
    CommandTooLong(usize),
    /// The payload does not fit the 32-bit length field.
    PayloadTooLarge(usize),
    /// The command bytes are not valid UTF-8.
    InvalidCommand,
    /// The body length does not match the lengths declared in the header.
    LengthMismatch { expected: usize, found: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { needed, available } => {
                write!(f, "Truncated frame: needed {} bytes, {} available", needed, available)
            }
            Self::UnknownKind(bits) => write!(f, "Unknown packet kind: {:#04x}", bits),
            Self::CommandTooLong(len) => write!(f, "Command too long: {} bytes", len),
            Self::PayloadTooLarge(len) => write!(f, "Payload too large: {} bytes", len),
            Self::InvalidCommand => write!(f, "Command is not valid UTF-8"),
            Self::LengthMismatch { expected, found } => {
                write!(f, "Frame body length mismatch: expected {}, found {}", expected, found)
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
