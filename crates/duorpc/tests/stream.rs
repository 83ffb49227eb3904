//! Sessions talking over framed byte streams.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::DuplexStream;
use tokio::io::ReadHalf;

use duorpc::Error;
use duorpc::Message;
use duorpc::Packet;
use duorpc::Router;
use duorpc::Session;
use duorpc::transport::Source;
use duorpc::transport::stream::PacketReader;
use duorpc::transport::stream::StreamTransport;

/// Builds a session on one end of a duplex pipe and returns the reader the
/// caller should pump.
fn attach(end: DuplexStream, client_id: u64, router: Router) -> (Session, PacketReader<ReadHalf<DuplexStream>>) {
    let (read, write) = tokio::io::split(end);
    let session = Session::builder(Arc::new(StreamTransport::new(write)), Arc::new(router))
        .client_id(client_id)
        .timeout(Duration::from_secs(2))
        .build();
    (session, PacketReader::new(read, client_id))
}

fn spawn_serve(session: &Session, reader: PacketReader<ReadHalf<DuplexStream>>) {
    let session = session.clone();
    tokio::spawn(async move { session.serve(reader).await });
}

#[tokio::test]
async fn test_call_over_stream() -> anyhow::Result<()> {
    let router: Router = Router::new();
    router.add_route("origin", |packet: Packet| async move { Message(packet.client_id) })?;
    router.add_route("len", |bytes: Vec<u8>| async move { Message(bytes.len()) })?;

    let (a, b) = tokio::io::duplex(64 * 1024);
    let (client, client_reader) = attach(a, 1, Router::new());
    let (server, server_reader) = attach(b, 2, router);
    spawn_serve(&client, client_reader);
    spawn_serve(&server, server_reader);

    // the reader stamps its own configured id on inbound packets
    let origin: u64 = client.call("origin", &()).await?;
    assert_eq!(origin, 2);

    let big = vec![7u8; 200 * 1024];
    let len: usize = serde_json::from_slice(&client.get_reply_raw("len", big).await?)?;
    assert_eq!(len, 200 * 1024);

    client.ping(8, Duration::from_secs(1)).await?;
    server.ping(16, Duration::from_secs(1)).await?;
    Ok(())
}

#[tokio::test]
async fn test_peer_hangup_closes_session() -> anyhow::Result<()> {
    let (a, b) = tokio::io::duplex(1024);
    let (client, client_reader) = attach(a, 1, Router::new());

    let served = tokio::spawn({
        let client = client.clone();
        async move { client.serve(client_reader).await }
    });
    let caller = tokio::spawn({
        let client = client.clone();
        async move { client.get_reply_raw("hang", Vec::new()).await }
    });

    let mut peer = PacketReader::new(b, 0);
    let request = peer.recv().await?.expect("a request");
    assert_eq!(request.command, "hang");
    drop(peer);

    assert!(matches!(caller.await?, Err(Error::Closed)));
    assert!(served.await?.is_ok());
    assert!(client.is_closed());
    Ok(())
}
