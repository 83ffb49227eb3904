//! TCP echo example.
//!
//! Starts a server on an ephemeral local port, connects a client to it, makes
//! a few calls and a ping, then exits.
//!
//! Run with: `RUST_LOG=debug cargo run --example tcp_echo -p duorpc`

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

use duorpc::Message;
use duorpc::Router;
use duorpc::Session;
use duorpc::transport::stream::PacketReader;
use duorpc::transport::stream::StreamTransport;

fn router() -> anyhow::Result<Arc<Router>> {
    let router: Router = Router::new();
    router.add_route("echo", |Message(text): Message<String>| async move {
        tracing::info!("echo({:?})", text);
        Message(text)
    })?;
    router.add_route("fail", |_: Vec<u8>| async { Err::<(), _>("this command always fails") })?;
    Ok(Arc::new(router))
}

fn session(socket: TcpStream, client_id: u64, tag: &str, router: Arc<Router>) -> (Session, PacketReader<tokio::net::tcp::OwnedReadHalf>) {
    let (read, write) = socket.into_split();
    let session = Session::builder(Arc::new(StreamTransport::new(write)), router)
        .client_id(client_id)
        .tag(tag)
        .timeout(Duration::from_secs(5))
        .debug(true)
        .build();
    (session, PacketReader::new(read, client_id))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tracing::info!("listening on {}", addr);

    let routes = router()?;
    tokio::spawn(async move {
        let mut next_id = 1;
        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("accept failed: {}", e);
                    return;
                }
            };
            tracing::info!("connection from {}", peer);

            let (server, reader) = session(socket, next_id, "server", routes.clone());
            next_id += 1;
            server.on_close(move |s| tracing::info!(client_id = s.client_id(), "connection from {} closed", peer));
            tokio::spawn(async move {
                if let Err(e) = server.serve(reader).await {
                    tracing::warn!("connection from {} failed: {}", peer, e);
                }
            });
        }
    });

    let (client, reader) = session(TcpStream::connect(addr).await?, 0, "client", Arc::new(Router::new()));
    tokio::spawn({
        let client = client.clone();
        async move { client.serve(reader).await }
    });

    let reply: String = client.call("echo", "hello over tcp").await?;
    tracing::info!("echo replied {:?}", reply);

    match client.get_reply("fail", &()).await {
        Err(e) => tracing::info!("fail replied with an error, as expected: {}", e),
        Ok(_) => anyhow::bail!("fail should not succeed"),
    }

    client.ping(8, Duration::from_secs(1)).await?;
    tracing::info!("ping answered");

    client.close();
    Ok(())
}
