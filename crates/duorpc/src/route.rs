//! # Route
//!
//! One command bound to one handler, with the handler's parameter categories
//! and return shape fixed when the route is built.

use futures::future::BoxFuture;

use duowire::Packet;

use crate::codec::Codec;
use crate::error::Error;
use crate::error::Result;
use crate::fault;
use crate::handler::Handler;
use crate::handler::Outcome;
use crate::handler::Param;
use crate::handler::Shape;
use crate::session::Session;

type Invoke<C> = Box<dyn Fn(&Session<C>, &Packet) -> Result<BoxFuture<'static, Result<Outcome>>> + Send + Sync>;

pub struct Route<C> {
    command: String,
    params: Vec<Param>,
    shape: Shape,
    invoke: Invoke<C>,
}

impl<C: Codec> Route<C> {
    /// Builds a route, rejecting handlers that read the payload more than once
    /// (at most one of bytes, text or message).
    pub fn new<H, Args>(command: impl Into<String>, handler: H) -> Result<Self>
    where
        H: Handler<C, Args>,
    {
        let command = command.into();
        let params = H::params();

        let readers = params.iter().filter(|p| p.reads_payload()).count();
        if readers > 1 {
            return Err(Error::InvalidHandler(format!(
                "handler for '{}' takes {} payload parameters, at most one of bytes, text or message is allowed",
                command, readers
            )));
        }

        Ok(Self {
            command,
            params,
            shape: H::shape(),
            invoke: Box::new(move |session, packet| handler.call(session, packet)),
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Runs the handler for one request and answers the caller.
    ///
    /// Errors the handler returns go back to the caller as an error response,
    /// whether or not one was requested, and are not reported here. Binding
    /// failures and contained panics are answered only when the caller asked
    /// for a response, and are always returned so the session can log them.
    pub(crate) async fn emit_packet(&self, session: &Session<C>, packet: Packet) -> Result<()> {
        let seq = packet.sequence;
        let expects_response = packet.expects_response();

        let invoke = &self.invoke;
        let outcome = match fault::catch(async { invoke(session, &packet)?.await }).await {
            Ok(outcome) => outcome,
            Err(fault) => {
                tracing::error!(
                    command = %self.command,
                    seq,
                    "handler panicked: {}\n{}",
                    fault.message,
                    fault.backtrace
                );
                Err(Error::HandlerFault(fault.message))
            }
        };

        match outcome {
            Err(e) if !expects_response => Err(e),
            Err(e) => {
                session.send_failure(seq, e.to_string()).await?;
                Err(e)
            }
            Ok(Outcome::Failed(text)) => session.send_failure(seq, text).await,
            Ok(_) if !expects_response => Ok(()),
            Ok(Outcome::Reply(bytes)) => session.send_response(seq, bytes).await,
            Ok(Outcome::Done) => session.send_response(seq, Vec::new()).await,
        }
    }
}

impl<C> std::fmt::Debug for Route<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("command", &self.command)
            .field("params", &self.params)
            .field("shape", &self.shape)
            .finish()
    }
}
