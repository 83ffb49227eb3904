//! # duowire
//!
//! The wire vocabulary shared by both ends of a duorpc connection.
//!
//! A [`Packet`] is one of five logical messages: an RPC request, an RPC
//! response, an RPC error response, a ping, or a pong. The [`Kind`] selects
//! RPC vs Ping and the [`Flags`] sub-flags select the message within a kind.
//!
//! The [`frame`] module defines an optional binary encoding of a packet for
//! byte-stream transports. Nothing in this crate performs I/O.

pub mod error;
pub mod frame;
pub mod packet;

pub use error::Error;
pub use error::Result;
pub use packet::Class;
pub use packet::Flags;
pub use packet::Kind;
pub use packet::Packet;

#[cfg(test)]
mod tests;
