//! # duorpc
//!
//! Request/response correlation, fire-and-forget messaging, keepalive and
//! command dispatch between two endpoints of a packet transport.
//!
//! A [`Session`] sits on one connection. Outbound, it numbers calls and waits
//! for their responses; inbound, it answers pings and hands requests to a
//! shared [`Router`], which runs the handler bound to the request's command.
//!
//! Handler panics fail only the call that raised them. Containing them
//! installs a process-wide panic hook the first time a request is dispatched;
//! see [`fault`] for how it chains with a hook the application installs.
//!
//! ```ignore
//! let router = Arc::new(Router::<Json>::new());
//! router.add_route("echo", |Message(text): Message<String>| async move { Message(text) })?;
//!
//! let (near, far) = transport::mem::pair();
//! let server = Session::new(Arc::new(far.transport), router.clone());
//! tokio::spawn(async move { server.serve(far.source).await });
//!
//! let client = Session::new(Arc::new(near.transport), router);
//! tokio::spawn({ let client = client.clone(); async move { client.serve(near.source).await } });
//! let reply: String = client.call("echo", "hi").await?;
//! ```

pub mod codec;
pub mod error;
pub mod fault;
pub mod handler;
pub mod route;
pub mod router;
pub mod session;
pub mod transport;

pub use codec::Codec;
pub use codec::Json;
pub use codec::Postcard;
pub use duowire::Packet;
pub use error::Error;
pub use error::Result;
pub use handler::Handler;
pub use handler::Message;
pub use route::Route;
pub use router::Router;
pub use session::AsyncReply;
pub use session::DEFAULT_TIMEOUT;
pub use session::Session;
pub use session::SessionBuilder;
