//! # Transport Abstraction
//!
//! The boundary between a session and whatever actually moves packets.
//!
//! ## Philosophy
//!
//! - **Send-only outbound**: A session needs exactly one thing from a transport,
//!   the ability to send a packet. Framing, byte order and reconnection are the
//!   transport's business.
//! - **Pumped inbound**: Received packets come from a [`Source`] that a session
//!   drains serially via [`Session::serve`](crate::Session::serve).

use duowire::Packet;

pub mod mem;
pub mod stream;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// The transport was shut down locally.
    Closed,
    /// A frame exceeded the configured maximum size.
    PayloadTooLarge(usize),
    /// Generic I/O error or internal transport failure.
    Io(String),
    /// A frame could not be encoded or decoded.
    Frame(duowire::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Closed => write!(f, "Transport closed"),
            Self::PayloadTooLarge(len) => write!(f, "Frame of {} bytes too large for transport", len),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
            Self::Frame(e) => write!(f, "Frame error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => Self::ConnectionLost(e.to_string()),
            _ => Self::Io(e.to_string()),
        }
    }
}

impl From<duowire::Error> for Error {
    fn from(e: duowire::Error) -> Self {
        Self::Frame(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Sends one packet to the peer.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// # invariants
    /// - Must return `Ok(())` once the packet has been handed to the connection.
    /// - Must not reorder packets sent from one task.
    async fn send(&self, packet: Packet) -> Result<()>;
}

/// Yields the packets received from the peer, in arrival order.
#[async_trait::async_trait]
pub trait Source: Send {
    /// Returns `Ok(None)` once the connection has ended cleanly.
    async fn recv(&mut self) -> Result<Option<Packet>>;
}
