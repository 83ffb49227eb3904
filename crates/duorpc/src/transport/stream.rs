//! Byte-stream transport over any tokio `AsyncRead`/`AsyncWrite` pair.
//!
//! Each packet travels as one [`duowire::frame`]. Split a socket with
//! `into_split()` (or `tokio::io::split`) and hand the halves to
//! [`StreamTransport`] and [`PacketReader`].

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use duowire::Packet;
use duowire::frame;
use duowire::frame::HEADER_LEN;
use duowire::frame::Header;

use crate::transport;
use crate::transport::Source;
use crate::transport::Transport;

/// Largest frame body accepted by default.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// An encoded frame and where to report how writing it went.
type Job = (Vec<u8>, oneshot::Sender<transport::Result<()>>);

/// Writes one frame per packet.
///
/// Frames are written by a task that owns the writer, so a frame is always
/// written whole even when the `send` that queued it is dropped midway. After
/// a failed write the task stops and every later send fails with
/// `ConnectionLost`.
pub struct StreamTransport {
    jobs: mpsc::UnboundedSender<Job>,
}

impl StreamTransport {
    /// Spawns the writer task. Must be called within a tokio runtime.
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_frames(writer, rx));
        Self { jobs }
    }
}

async fn write_frames<W>(mut writer: W, mut jobs: mpsc::UnboundedReceiver<Job>)
where
    W: AsyncWrite + Unpin,
{
    while let Some((bytes, done)) = jobs.recv().await {
        let result = write_frame(&mut writer, &bytes).await;
        let failed = result.is_err();
        let _ = done.send(result);
        if failed {
            tracing::debug!("stream writer stopped after a failed write");
            break;
        }
    }
}

async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> transport::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[async_trait::async_trait]
impl Transport for StreamTransport {
    async fn send(&self, packet: Packet) -> transport::Result<()> {
        let bytes = frame::encode(&packet)?;
        let (done, written) = oneshot::channel();
        self.jobs
            .send((bytes, done))
            .map_err(|_| transport::Error::ConnectionLost("Stream writer stopped".into()))?;
        written
            .await
            .map_err(|_| transport::Error::ConnectionLost("Stream writer stopped".into()))?
    }
}

/// Reads frames and turns them into packets stamped with a client id.
pub struct PacketReader<R> {
    reader: R,
    client_id: u64,
    max_frame_len: usize,
}

impl<R> PacketReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R, client_id: u64) -> Self {
        Self {
            reader,
            client_id,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max;
        self
    }

    /// Reads the next header. `None` on a clean end of stream, i.e. EOF
    /// exactly on a frame boundary.
    async fn read_header(&mut self) -> transport::Result<Option<Header>> {
        let mut head = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = self.reader.read(&mut head[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(transport::Error::ConnectionLost("Stream ended inside a frame header".into()));
            }
            filled += n;
        }
        Ok(Some(Header::parse(&head)))
    }
}

#[async_trait::async_trait]
impl<R> Source for PacketReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn recv(&mut self) -> transport::Result<Option<Packet>> {
        loop {
            let Some(header) = self.read_header().await? else {
                return Ok(None);
            };
            if header.body_len() > self.max_frame_len {
                return Err(transport::Error::PayloadTooLarge(header.body_len()));
            }

            let mut body = vec![0u8; header.body_len()];
            self.reader.read_exact(&mut body).await?;

            match header.into_packet(&body) {
                Ok(packet) => return Ok(Some(packet.with_client_id(self.client_id))),
                // the body was consumed, so the stream is still in sync
                Err(duowire::Error::UnknownKind(bits)) => {
                    tracing::warn!(client_id = self.client_id, flag = bits, "dropping frame of unknown kind");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_frames_cross_a_duplex_pipe() {
        let (client, server) = tokio::io::duplex(1024);
        let transport = StreamTransport::new(client);
        let mut reader = PacketReader::new(server, 11);

        transport.send(Packet::request("sum", 1, b"[1,2]".to_vec(), true)).await.unwrap();
        transport.send(Packet::pong(4, vec![0; 8])).await.unwrap();

        let first = reader.recv().await.unwrap().unwrap();
        assert_eq!(first.command, "sum");
        assert_eq!(first.client_id, 11);
        assert!(first.expects_response());

        let second = reader.recv().await.unwrap().unwrap();
        assert_eq!(second.sequence, 4);
        assert_eq!(second.length(), 8);
    }

    #[tokio::test]
    async fn test_clean_eof_ends_the_source() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let mut reader = PacketReader::new(server, 0);
        assert!(reader.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_kind_is_skipped() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut junk = frame::encode(&Packet::ping(1, vec![1, 2])).unwrap();
        junk[0] = 0x0e;
        let good = frame::encode(&Packet::ping(2, Vec::new())).unwrap();
        client.write_all(&junk).await.unwrap();
        client.write_all(&good).await.unwrap();

        let mut reader = PacketReader::new(server, 0);
        let packet = reader.recv().await.unwrap().unwrap();
        assert_eq!(packet.sequence, 2);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (client, server) = tokio::io::duplex(1024);
        let transport = StreamTransport::new(client);
        transport.send(Packet::response(1, vec![0; 64])).await.unwrap();

        let mut reader = PacketReader::new(server, 0).max_frame_len(32);
        match reader.recv().await {
            Err(transport::Error::PayloadTooLarge(64)) => {}
            other => panic!("expected PayloadTooLarge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_send_still_writes_whole_frame() {
        let (client, server) = tokio::io::duplex(64);
        let transport = Arc::new(StreamTransport::new(client));

        // the pipe holds 64 bytes and nobody reads yet, so this send stalls
        let stalled = Packet::request("stalled", 1, vec![0xaa; 1024], true);
        let cancelled = tokio::time::timeout(Duration::from_millis(20), transport.send(stalled)).await;
        assert!(cancelled.is_err());

        let queued = tokio::spawn({
            let transport = transport.clone();
            async move { transport.send(Packet::request("small", 2, b"x".to_vec(), false)).await }
        });

        let mut reader = PacketReader::new(server, 0);
        let first = reader.recv().await.unwrap().unwrap();
        let second = reader.recv().await.unwrap().unwrap();
        assert_eq!(first.command, "stalled");
        assert_eq!(first.length(), 1024);
        assert_eq!(second.command, "small");
        queued.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_send_after_failed_write_is_connection_lost() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let transport = StreamTransport::new(client);

        let first = transport.send(Packet::ping(1, Vec::new())).await;
        assert!(matches!(first, Err(transport::Error::ConnectionLost(_))));
        let second = transport.send(Packet::ping(2, Vec::new())).await;
        assert!(matches!(second, Err(transport::Error::ConnectionLost(_))));
    }
}
