//! In-process duplex transport over tokio mpsc channels.
//!
//! Packets sent on one end appear on the other end's [`MemSource`] and vice
//! versa. Useful for tests and for two sessions living in the same process.

use tokio::sync::mpsc;

use duowire::Packet;

use crate::transport;
use crate::transport::Source;
use crate::transport::Transport;

/// Sending half of one end.
#[derive(Clone)]
pub struct MemTransport {
    tx: mpsc::UnboundedSender<Packet>,
}

/// Receiving half of one end.
pub struct MemSource {
    rx: mpsc::UnboundedReceiver<Packet>,
}

/// One end of an in-memory connection.
pub struct Endpoint {
    pub transport: MemTransport,
    pub source: MemSource,
}

/// Creates a pair of endpoints connected to each other.
pub fn pair() -> (Endpoint, Endpoint) {
    let (tx_a, rx_a) = mpsc::unbounded_channel();
    let (tx_b, rx_b) = mpsc::unbounded_channel();

    let a = Endpoint {
        transport: MemTransport { tx: tx_a },
        source: MemSource { rx: rx_b },
    };
    let b = Endpoint {
        transport: MemTransport { tx: tx_b },
        source: MemSource { rx: rx_a },
    };

    (a, b)
}

#[async_trait::async_trait]
impl Transport for MemTransport {
    async fn send(&self, packet: Packet) -> transport::Result<()> {
        self.tx
            .send(packet)
            .map_err(|_| transport::Error::ConnectionLost("Channel closed".into()))
    }
}

impl MemSource {
    /// Receives without waiting; `None` if nothing is queued.
    pub fn try_recv(&mut self) -> Option<Packet> {
        self.rx.try_recv().ok()
    }
}

#[async_trait::async_trait]
impl Source for MemSource {
    async fn recv(&mut self) -> transport::Result<Option<Packet>> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_is_crossed() {
        let (a, mut b) = pair();
        a.transport.send(Packet::ping(1, Vec::new())).await.unwrap();

        let got = b.source.recv().await.unwrap().unwrap();
        assert_eq!(got.sequence, 1);
        assert!(b.source.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped() {
        let (a, b) = pair();
        drop(b);
        let err = a.transport.send(Packet::ping(1, Vec::new())).await.unwrap_err();
        assert!(matches!(err, transport::Error::ConnectionLost(_)));
    }
}
