//! # Error Definitions
//!
//! Every failure a caller of a session or a router can observe.

use duowire::Packet;

use crate::codec;
use crate::transport;

#[derive(Debug)]
pub enum Error {
    /// No reply or pong arrived before the deadline.
    Timeout,
    /// The peer answered with an error response.
    Remote { message: String, packet: Packet },
    /// No route is registered for the command.
    NotFound(String),
    /// The handler panicked; the panic was contained at the dispatch boundary.
    HandlerFault(String),
    Serialize(codec::Error),
    Deserialize(codec::Error),
    /// Sending failed. Propagated verbatim from the transport.
    Transport(transport::Error),
    /// A handler was rejected at registration.
    InvalidHandler(String),
    /// The session was closed before the call completed.
    Closed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "Request timed out"),
            Self::Remote { message, .. } => write!(f, "Remote error: {}", message),
            Self::NotFound(command) => write!(f, "Command not found: {}", command),
            Self::HandlerFault(message) => write!(f, "Handler fault: {}", message),
            Self::Serialize(e) => write!(f, "Serialize error: {}", e),
            Self::Deserialize(e) => write!(f, "Deserialize error: {}", e),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::InvalidHandler(msg) => write!(f, "Invalid handler: {}", msg),
            Self::Closed => write!(f, "Session closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialize(e) | Self::Deserialize(e) => Some(e),
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
