//! # Router
//!
//! The command table. Built before traffic begins and shared by every session
//! that serves the same commands; lookups and registrations may interleave
//! safely because the table is a `DashMap`.

use std::sync::Arc;

use dashmap::DashMap;

use duowire::Packet;

use crate::codec::Codec;
use crate::codec::Json;
use crate::error::Error;
use crate::error::Result;
use crate::handler::Handler;
use crate::route::Route;
use crate::session::Session;

pub struct Router<C = Json> {
    routes: DashMap<String, Arc<Route<C>>>,
}

impl<C: Codec> Router<C> {
    pub fn new() -> Self {
        Self { routes: DashMap::new() }
    }

    /// Registers `handler` for `command`, replacing any earlier route for it.
    ///
    /// Fails with `InvalidHandler` when the handler's parameters cannot be
    /// bound; nothing is registered in that case.
    ///
    /// Handler panics are contained by [`fault::catch`](crate::fault::catch),
    /// which installs a process-wide panic hook on the first dispatch. A hook
    /// set before that point is kept and still runs for panics outside
    /// handlers; a hook set after it replaces the one that captures handler
    /// backtraces.
    pub fn add_route<H, Args>(&self, command: impl Into<String>, handler: H) -> Result<()>
    where
        H: Handler<C, Args>,
    {
        let route = Route::new(command, handler)?;
        if let Some(previous) = self.routes.insert(route.command().to_owned(), Arc::new(route)) {
            tracing::debug!(command = previous.command(), "route replaced");
        }
        Ok(())
    }

    pub fn get_route(&self, command: &str) -> Option<Arc<Route<C>>> {
        self.routes.get(command).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches one request. An unknown command is answered with a
    /// `NotFound` error response and never reaches handler code.
    pub(crate) async fn emit_packet(&self, session: &Session<C>, packet: Packet) -> Result<()> {
        let Some(route) = self.get_route(&packet.command) else {
            let err = Error::NotFound(packet.command);
            session.send_failure(packet.sequence, err.to_string()).await?;
            return Err(err);
        };
        route.emit_packet(session, packet).await
    }
}

impl<C: Codec> Default for Router<C> {
    fn default() -> Self {
        Self::new()
    }
}
