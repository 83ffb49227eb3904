//! # Session
//!
//! One per connection. Correlates outbound calls with their responses, answers
//! keepalive pings and hands inbound requests to the [`Router`].
//!
//! ## Invariants
//!
//! - RPC and ping sequences are separate counters, both starting at 1 and
//!   strictly increasing for the lifetime of the session.
//! - A reply slot is registered before its request is sent, and removed when
//!   the wait ends, whatever the outcome (including the waiting future being
//!   dropped).
//! - Inbound packets are delivered through [`Session::emit_packet`] by one task
//!   at a time; outbound calls may come from any number of tasks.
//! - Once closed, outstanding waiters fail with [`Error::Closed`], new calls
//!   fail the same way, and the close callback has fired exactly once.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use duowire::Class;
use duowire::Packet;

use crate::codec::Codec;
use crate::codec::Json;
use crate::error::Error;
use crate::error::Result;
use crate::router::Router;
use crate::transport::Source;
use crate::transport::Transport;

/// Call timeout used when the builder is not given one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

type Callback<C> = Arc<dyn Fn(&Session<C>) + Send + Sync>;

struct Inner<C> {
    client_id: u64,
    transport: Arc<dyn Transport>,
    router: Arc<Router<C>>,
    timeout: Duration,
    debug: bool,
    tag: Option<String>,
    rpc_seq: AtomicU64,
    ping_seq: AtomicU64,
    replies: DashMap<u64, oneshot::Sender<Packet>>,
    pongs: DashMap<u64, oneshot::Sender<Vec<u8>>>,
    current: Mutex<Option<Packet>>,
    on_ping: Mutex<Option<Callback<C>>>,
    on_close: Mutex<Option<Callback<C>>>,
    closed: AtomicBool,
    _codec: PhantomData<fn() -> C>,
}

/// A handle to one connection. Clones share the same session.
pub struct Session<C = Json> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for Session<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

/// Removes a registry entry when the wait for it ends.
struct Pending<'a, T> {
    registry: &'a DashMap<u64, oneshot::Sender<T>>,
    seq: u64,
}

impl<T> Drop for Pending<'_, T> {
    fn drop(&mut self) {
        self.registry.remove(&self.seq);
    }
}

impl<C: Codec> Session<C> {
    pub fn builder(transport: Arc<dyn Transport>, router: Arc<Router<C>>) -> SessionBuilder<C> {
        SessionBuilder::new(transport, router)
    }

    /// A session with client id 0 and the default timeout.
    pub fn new(transport: Arc<dyn Transport>, router: Arc<Router<C>>) -> Self {
        SessionBuilder::new(transport, router).build()
    }

    pub fn client_id(&self) -> u64 {
        self.inner.client_id
    }

    pub fn tag(&self) -> Option<&str> {
        self.inner.tag.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn router(&self) -> &Arc<Router<C>> {
        &self.inner.router
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// The most recent request delivered to this session.
    pub fn current_packet(&self) -> Option<Packet> {
        self.inner.current.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Sends `message` without asking for a response.
    pub async fn send_message<M>(&self, command: impl Into<String>, message: &M) -> Result<()>
    where
        M: Serialize + ?Sized,
    {
        let payload = C::encode(message).map_err(Error::Serialize)?;
        self.send_raw(command, payload).await
    }

    /// Sends `payload` verbatim without asking for a response.
    pub async fn send_raw(&self, command: impl Into<String>, payload: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        let seq = self.inner.rpc_seq.fetch_add(1, Ordering::SeqCst);
        self.send(Packet::request(command, seq, payload, false)).await
    }

    /// Sends `message` and waits for the response payload.
    pub async fn get_reply<M>(&self, command: impl Into<String>, message: &M) -> Result<Vec<u8>>
    where
        M: Serialize + ?Sized,
    {
        let payload = C::encode(message).map_err(Error::Serialize)?;
        self.get_reply_raw(command, payload).await
    }

    /// Sends `payload` verbatim and waits for the response payload.
    ///
    /// Fails with `Timeout` when no response arrives within the session
    /// timeout, and with `Remote` when the peer answers with an error.
    pub async fn get_reply_raw(&self, command: impl Into<String>, payload: Vec<u8>) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let seq = self.inner.rpc_seq.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        self.inner.replies.insert(seq, tx);
        let _pending = Pending { registry: &self.inner.replies, seq };

        // close() may have drained the registry before the insert
        self.ensure_open()?;

        self.send(Packet::request(command, seq, payload, true)).await?;

        let reply = match tokio::time::timeout(self.inner.timeout, rx).await {
            Ok(Ok(packet)) => packet,
            Ok(Err(_)) => return Err(Error::Closed),
            Err(_) => {
                self.debug(format_args!("call {} timed out", seq));
                return Err(Error::Timeout);
            }
        };

        if reply.is_failure() {
            let message = String::from_utf8_lossy(&reply.payload).into_owned();
            return Err(Error::Remote { message, packet: reply });
        }
        Ok(reply.payload)
    }

    /// Sends `message`, waits for the response and decodes it as `R`.
    pub async fn call<R, M>(&self, command: impl Into<String>, message: &M) -> Result<R>
    where
        R: DeserializeOwned,
        M: Serialize + ?Sized,
    {
        let payload = self.get_reply(command, message).await?;
        C::decode(&payload).map_err(Error::Deserialize)
    }

    /// Starts a call on the runtime and returns a handle to its result.
    ///
    /// The call runs to completion even if the handle is dropped. Must be
    /// invoked from within a tokio runtime.
    pub fn get_async<M>(&self, command: impl Into<String>, message: &M) -> AsyncReply
    where
        M: Serialize + ?Sized,
    {
        let (tx, rx) = oneshot::channel();
        match C::encode(message) {
            Ok(payload) => {
                let session = self.clone();
                let command = command.into();
                tokio::spawn(async move {
                    let _ = tx.send(session.get_reply_raw(command, payload).await);
                });
            }
            Err(e) => {
                let _ = tx.send(Err(Error::Serialize(e)));
            }
        }
        AsyncReply { rx }
    }

    /// Sends a ping carrying `length` zero bytes and waits up to `timeout`
    /// for the matching pong.
    pub async fn ping(&self, length: usize, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        let seq = self.inner.ping_seq.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        self.inner.pongs.insert(seq, tx);
        let _pending = Pending { registry: &self.inner.pongs, seq };

        self.ensure_open()?;

        self.send(Packet::ping(seq, vec![0; length])).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                self.debug(format_args!("ping {} timed out", seq));
                Err(Error::Timeout)
            }
        }
    }

    /// Called after each inbound ping has been answered.
    pub fn on_ping(&self, f: impl Fn(&Session<C>) + Send + Sync + 'static) {
        *self.inner.on_ping.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(f));
    }

    /// Called once, when the session closes.
    pub fn on_close(&self, f: impl Fn(&Session<C>) + Send + Sync + 'static) {
        *self.inner.on_close.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(f));
    }

    /// Closes the session. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // dropping the senders wakes every waiter with `Closed`
        self.inner.replies.clear();
        self.inner.pongs.clear();

        tracing::debug!(client_id = self.inner.client_id, tag = self.tag(), "session closed");

        let callback = self.inner.on_close.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(callback) = callback {
            callback(self);
        }
    }

    /// Delivers one inbound packet.
    ///
    /// Responses and pongs resolve the matching waiter, or are dropped when
    /// nobody is waiting. Requests go to the router; pings are answered. Never
    /// fails: problems are logged.
    pub async fn emit_packet(&self, packet: Packet) {
        self.debug(format_args!(
            "recv flag={:#04x} seq={} command={:?} len={}",
            packet.flag_byte(),
            packet.sequence,
            packet.command,
            packet.length()
        ));

        match packet.class() {
            Some(Class::Response | Class::Failure) => {
                let seq = packet.sequence;
                match self.inner.replies.remove(&seq) {
                    Some((_, tx)) => {
                        let _ = tx.send(packet);
                    }
                    None => {
                        tracing::debug!(client_id = self.inner.client_id, seq, "dropping response nobody is waiting for");
                    }
                }
            }
            Some(Class::Request) => {
                let command = packet.command.clone();
                let seq = packet.sequence;
                *self.inner.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(packet.clone());

                if let Err(e) = self.inner.router.emit_packet(self, packet).await {
                    tracing::warn!(
                        client_id = self.inner.client_id,
                        tag = self.tag(),
                        command = %command,
                        seq,
                        "dispatch failed: {}",
                        e
                    );
                }
            }
            Some(Class::Ping) => {
                let seq = packet.sequence;
                if let Err(e) = self.send(Packet::pong(seq, packet.payload)).await {
                    tracing::warn!(client_id = self.inner.client_id, seq, "failed to answer ping: {}", e);
                }

                let callback = self.inner.on_ping.lock().unwrap_or_else(PoisonError::into_inner).clone();
                if let Some(callback) = callback {
                    callback(self);
                }
            }
            Some(Class::Pong) => {
                if let Some((_, tx)) = self.inner.pongs.remove(&packet.sequence) {
                    let _ = tx.send(packet.payload);
                }
            }
            None => {
                tracing::warn!(
                    client_id = self.inner.client_id,
                    flag = packet.flag_byte(),
                    "dropping packet of unrecognized kind"
                );
            }
        }
    }

    /// Feeds every packet from `source` into [`emit_packet`](Self::emit_packet)
    /// until the source ends, fails, or the session is closed, then closes the
    /// session.
    pub async fn serve<S: Source>(&self, mut source: S) -> Result<()> {
        let result = loop {
            if self.is_closed() {
                break Ok(());
            }
            match source.recv().await {
                Ok(Some(packet)) => self.emit_packet(packet).await,
                Ok(None) => break Ok(()),
                Err(e) => {
                    tracing::warn!(client_id = self.inner.client_id, "source failed: {}", e);
                    break Err(Error::Transport(e));
                }
            }
        };
        self.close();
        result
    }

    pub(crate) async fn send_response(&self, seq: u64, payload: Vec<u8>) -> Result<()> {
        self.send(Packet::response(seq, payload)).await
    }

    pub(crate) async fn send_failure(&self, seq: u64, text: impl Into<String>) -> Result<()> {
        self.send(Packet::failure(seq, text)).await
    }

    /// Outstanding reply and pong slots.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> (usize, usize) {
        (self.inner.replies.len(), self.inner.pongs.len())
    }

    async fn send(&self, packet: Packet) -> Result<()> {
        self.ensure_open()?;
        let packet = packet.with_client_id(self.inner.client_id);
        self.debug(format_args!(
            "send flag={:#04x} seq={} command={:?} len={}",
            packet.flag_byte(),
            packet.sequence,
            packet.command,
            packet.length()
        ));
        self.inner.transport.send(packet).await?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn debug(&self, args: fmt::Arguments<'_>) {
        if self.inner.debug {
            tracing::debug!(client_id = self.inner.client_id, tag = self.tag(), "{}", args);
        }
    }
}

impl<C> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.inner.client_id)
            .field("tag", &self.inner.tag)
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// The eventual result of [`Session::get_async`].
pub struct AsyncReply {
    rx: oneshot::Receiver<Result<Vec<u8>>>,
}

impl Future for AsyncReply {
    type Output = Result<Vec<u8>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| received.unwrap_or(Err(Error::Closed)))
    }
}

/// Fluent builder for a [`Session`].
pub struct SessionBuilder<C = Json> {
    transport: Arc<dyn Transport>,
    router: Arc<Router<C>>,
    client_id: u64,
    timeout: Duration,
    debug: bool,
    tag: Option<String>,
}

impl<C: Codec> SessionBuilder<C> {
    pub fn new(transport: Arc<dyn Transport>, router: Arc<Router<C>>) -> Self {
        Self {
            transport,
            router,
            client_id: 0,
            timeout: DEFAULT_TIMEOUT,
            debug: false,
            tag: None,
        }
    }

    pub fn client_id(mut self, client_id: u64) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Logs every packet sent and received at debug level.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn build(self) -> Session<C> {
        Session {
            inner: Arc::new(Inner {
                client_id: self.client_id,
                transport: self.transport,
                router: self.router,
                timeout: self.timeout,
                debug: self.debug,
                tag: self.tag,
                rpc_seq: AtomicU64::new(1),
                ping_seq: AtomicU64::new(1),
                replies: DashMap::new(),
                pongs: DashMap::new(),
                current: Mutex::new(None),
                on_ping: Mutex::new(None),
                on_close: Mutex::new(None),
                closed: AtomicBool::new(false),
                _codec: PhantomData,
            }),
        }
    }
}
