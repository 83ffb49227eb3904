//! # Packet
//!
//! One wire message and its flag vocabulary.
//!
//! ## Flag byte
//!
//! ```text
//!   7   6   5   4   3   2   1   0
//! +---+---+---+---+---+---+---+---+
//! |   sub-flags   |     kind      |
//! +---+---+---+---+---+---+---+---+
//! ```
//!
//! Sub-flag meaning depends on the kind: on RPC packets bit 4 marks a
//! response, on Ping packets the same bit marks a ping.

const KIND_MASK: u8 = 0x0f;
const FLAGS_MASK: u8 = 0xf0;

/// Selects the family a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Rpc,
    Ping,
}

impl Kind {
    /// The low-nibble bits of this kind.
    pub const fn bits(self) -> u8 {
        match self {
            Self::Rpc => 0x01,
            Self::Ping => 0x02,
        }
    }

    /// Reads the kind out of a full flag byte. Sub-flag bits are ignored.
    pub const fn from_bits(byte: u8) -> Option<Self> {
        match byte & KIND_MASK {
            0x01 => Some(Self::Rpc),
            0x02 => Some(Self::Ping),
            _ => None,
        }
    }
}

/// Sub-flags of a packet. Only the high nibble is ever set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);

    /// RPC: this packet answers a request.
    pub const RESPONSE: Flags = Flags(0x10);
    /// RPC: the call failed; only meaningful together with `RESPONSE`.
    pub const ERROR: Flags = Flags(0x20);
    /// RPC: the sender of this request awaits a response.
    pub const RESPONSE_EXPECTED: Flags = Flags(0x40);

    /// Ping: liveness probe.
    pub const PING: Flags = Flags(0x10);
    /// Ping: answer to a probe.
    pub const PONG: Flags = Flags(0x20);

    pub const fn from_bits(byte: u8) -> Self {
        Flags(byte & FLAGS_MASK)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Flags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        self.union(rhs)
    }
}

/// The logical message a packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Request,
    Response,
    Failure,
    Ping,
    Pong,
}

/// One wire message.
///
/// The sequence is unique only among the outstanding calls of the same kind on
/// one session; responses and pongs echo the sequence of what they answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Endpoint identity. Never encoded into a frame.
    pub client_id: u64,
    pub kind: Kind,
    pub flags: Flags,
    /// Target route. Empty on pings and on responses.
    pub command: String,
    pub sequence: u64,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn request(command: impl Into<String>, sequence: u64, payload: Vec<u8>, expects_response: bool) -> Self {
        let flags = if expects_response { Flags::RESPONSE_EXPECTED } else { Flags::NONE };
        Self::new(Kind::Rpc, flags, command.into(), sequence, payload)
    }

    pub fn response(sequence: u64, payload: Vec<u8>) -> Self {
        Self::new(Kind::Rpc, Flags::RESPONSE, String::new(), sequence, payload)
    }

    /// An error response whose payload is the failure's human readable text.
    pub fn failure(sequence: u64, text: impl Into<String>) -> Self {
        let payload = text.into().into_bytes();
        Self::new(Kind::Rpc, Flags::RESPONSE | Flags::ERROR, String::new(), sequence, payload)
    }

    pub fn ping(sequence: u64, payload: Vec<u8>) -> Self {
        Self::new(Kind::Ping, Flags::PING, String::new(), sequence, payload)
    }

    pub fn pong(sequence: u64, payload: Vec<u8>) -> Self {
        Self::new(Kind::Ping, Flags::PONG, String::new(), sequence, payload)
    }

    fn new(kind: Kind, flags: Flags, command: String, sequence: u64, payload: Vec<u8>) -> Self {
        Self {
            client_id: 0,
            kind,
            flags,
            command,
            sequence,
            payload,
        }
    }

    /// Returns the packet with its client id replaced.
    pub fn with_client_id(mut self, client_id: u64) -> Self {
        self.client_id = client_id;
        self
    }

    /// Byte length of the payload.
    pub fn length(&self) -> usize {
        self.payload.len()
    }

    /// The full flag byte: kind bits and sub-flags.
    pub fn flag_byte(&self) -> u8 {
        self.kind.bits() | self.flags.bits()
    }

    pub fn is_response(&self) -> bool {
        self.kind == Kind::Rpc && self.flags.contains(Flags::RESPONSE)
    }

    /// Error flag on a response. Ignored on requests.
    pub fn is_failure(&self) -> bool {
        self.is_response() && self.flags.contains(Flags::ERROR)
    }

    pub fn expects_response(&self) -> bool {
        self.kind == Kind::Rpc && !self.is_response() && self.flags.contains(Flags::RESPONSE_EXPECTED)
    }

    /// Classifies the packet. `None` for a ping packet carrying neither
    /// direction flag.
    pub fn class(&self) -> Option<Class> {
        match self.kind {
            Kind::Rpc if self.is_failure() => Some(Class::Failure),
            Kind::Rpc if self.is_response() => Some(Class::Response),
            Kind::Rpc => Some(Class::Request),
            Kind::Ping if self.flags.contains(Flags::PING) => Some(Class::Ping),
            Kind::Ping if self.flags.contains(Flags::PONG) => Some(Class::Pong),
            Kind::Ping => None,
        }
    }
}
