//! # Handler Binding
//!
//! Lets ordinary async functions serve as command handlers without
//! hand-written (de)serialization.
//!
//! A handler declares what it needs through its parameter types and what it
//! produces through its return type:
//!
//! | parameter       | category  | supplied as                          |
//! |-----------------|-----------|--------------------------------------|
//! | `Session<C>`    | session   | the session the request arrived on   |
//! | `Packet`        | packet    | the request packet                   |
//! | `Vec<u8>`       | bytes     | the payload verbatim                 |
//! | `String`        | text      | the payload as UTF-8 text            |
//! | `Message<T>`    | message   | the payload decoded via the codec    |
//!
//! | return                         | shape             |
//! |--------------------------------|-------------------|
//! | `()`                           | none              |
//! | `Result<(), E>`                | error only        |
//! | `Vec<u8>`, `String`, `Message<T>` | result only    |
//! | `Result<body, E>`              | result and error  |
//!
//! Any other return type does not implement [`IntoReply`] and is rejected by
//! the compiler. The parameter list is checked once, when the route is built.

use std::fmt::Display;
use std::future::Future;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;

use duowire::Packet;

use crate::codec;
use crate::codec::Codec;
use crate::error::Error;
use crate::error::Result;
use crate::session::Session;

/// The category a handler parameter is bound by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Session,
    Packet,
    Bytes,
    Text,
    Message,
}

impl Param {
    /// Bytes, text and message all consume the payload.
    pub fn reads_payload(self) -> bool {
        matches!(self, Self::Bytes | Self::Text | Self::Message)
    }
}

/// The return shape of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    None,
    ErrorOnly,
    ResultOnly,
    ResultAndError,
}

/// What a finished handler asks the route to send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to return; acknowledged with an empty payload when expected.
    Done,
    /// An encoded result.
    Reply(Vec<u8>),
    /// The handler reported an error; its text goes back to the caller.
    Failed(String),
}

/// A payload decoded into (or encoded from) `T` via the session's codec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message<T>(pub T);

/// Binds one handler parameter from the request.
pub trait FromPacket<C: Codec>: Sized {
    const PARAM: Param;

    fn from_packet(session: &Session<C>, packet: &Packet) -> Result<Self>;
}

impl<C: Codec> FromPacket<C> for Session<C> {
    const PARAM: Param = Param::Session;

    fn from_packet(session: &Session<C>, _packet: &Packet) -> Result<Self> {
        Ok(session.clone())
    }
}

impl<C: Codec> FromPacket<C> for Packet {
    const PARAM: Param = Param::Packet;

    fn from_packet(_session: &Session<C>, packet: &Packet) -> Result<Self> {
        Ok(packet.clone())
    }
}

impl<C: Codec> FromPacket<C> for Vec<u8> {
    const PARAM: Param = Param::Bytes;

    fn from_packet(_session: &Session<C>, packet: &Packet) -> Result<Self> {
        Ok(packet.payload.clone())
    }
}

impl<C: Codec> FromPacket<C> for String {
    const PARAM: Param = Param::Text;

    fn from_packet(_session: &Session<C>, packet: &Packet) -> Result<Self> {
        String::from_utf8(packet.payload.clone())
            .map_err(|e| Error::Deserialize(codec::Error::new(e.to_string())))
    }
}

impl<C: Codec, T: DeserializeOwned> FromPacket<C> for Message<T> {
    const PARAM: Param = Param::Message;

    fn from_packet(_session: &Session<C>, packet: &Packet) -> Result<Self> {
        C::decode(&packet.payload).map(Message).map_err(Error::Deserialize)
    }
}

/// A success value a handler can return.
pub trait Body {
    const SHAPE: Shape;

    fn into_outcome<C: Codec>(self) -> Result<Outcome>;
}

impl Body for () {
    const SHAPE: Shape = Shape::None;

    fn into_outcome<C: Codec>(self) -> Result<Outcome> {
        Ok(Outcome::Done)
    }
}

impl Body for Vec<u8> {
    const SHAPE: Shape = Shape::ResultOnly;

    fn into_outcome<C: Codec>(self) -> Result<Outcome> {
        Ok(Outcome::Reply(self))
    }
}

impl Body for String {
    const SHAPE: Shape = Shape::ResultOnly;

    fn into_outcome<C: Codec>(self) -> Result<Outcome> {
        Ok(Outcome::Reply(self.into_bytes()))
    }
}

impl<T: Serialize> Body for Message<T> {
    const SHAPE: Shape = Shape::ResultOnly;

    fn into_outcome<C: Codec>(self) -> Result<Outcome> {
        C::encode(&self.0).map(Outcome::Reply).map_err(Error::Serialize)
    }
}

/// Everything a handler may return: a [`Body`], or a `Result` of one.
pub trait IntoReply {
    const SHAPE: Shape;

    fn into_outcome<C: Codec>(self) -> Result<Outcome>;
}

impl<B: Body> IntoReply for B {
    const SHAPE: Shape = <B as Body>::SHAPE;

    fn into_outcome<C: Codec>(self) -> Result<Outcome> {
        Body::into_outcome::<C>(self)
    }
}

impl<B: Body, E: Display> IntoReply for std::result::Result<B, E> {
    const SHAPE: Shape = match <B as Body>::SHAPE {
        Shape::None => Shape::ErrorOnly,
        _ => Shape::ResultAndError,
    };

    fn into_outcome<C: Codec>(self) -> Result<Outcome> {
        match self {
            Ok(body) => Body::into_outcome::<C>(body),
            Err(e) => Ok(Outcome::Failed(e.to_string())),
        }
    }
}

/// An async function usable as a route handler.
///
/// Implemented for functions of up to four [`FromPacket`] parameters whose
/// future resolves to an [`IntoReply`] value.
pub trait Handler<C: Codec, Args>: Send + Sync + 'static {
    fn params() -> Vec<Param>;

    fn shape() -> Shape;

    /// Binds the parameters and starts the handler.
    fn call(&self, session: &Session<C>, packet: &Packet) -> Result<BoxFuture<'static, Result<Outcome>>>;
}

macro_rules! impl_handler {
    ($($arg:ident),*) => {
        #[allow(non_snake_case, unused_variables)]
        impl<C, F, Fut, R, $($arg,)*> Handler<C, ($($arg,)*)> for F
        where
            C: Codec,
            F: Fn($($arg),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoReply,
            $($arg: FromPacket<C>,)*
        {
            fn params() -> Vec<Param> {
                vec![$(<$arg as FromPacket<C>>::PARAM),*]
            }

            fn shape() -> Shape {
                <R as IntoReply>::SHAPE
            }

            fn call(&self, session: &Session<C>, packet: &Packet) -> Result<BoxFuture<'static, Result<Outcome>>> {
                $(let $arg = <$arg as FromPacket<C>>::from_packet(session, packet)?;)*
                let fut = (self)($($arg),*);
                Ok(Box::pin(async move { IntoReply::into_outcome::<C>(fut.await) }))
            }
        }
    };
}

impl_handler!();
impl_handler!(A1);
impl_handler!(A1, A2);
impl_handler!(A1, A2, A3);
impl_handler!(A1, A2, A3, A4);

#[cfg(test)]
mod tests {
    use super::*;

    use crate::codec::Json;

    fn params_of<Args, H: Handler<Json, Args>>(_: H) -> Vec<Param> {
        H::params()
    }

    fn shape_of<Args, H: Handler<Json, Args>>(_: H) -> Shape {
        H::shape()
    }

    #[test]
    fn test_parameter_categories() {
        async fn all(_: Session<Json>, _: Packet, _: Message<u32>) {}
        async fn text_first(_: String, _: Session<Json>) {}

        assert_eq!(params_of(all), vec![Param::Session, Param::Packet, Param::Message]);
        assert_eq!(params_of(text_first), vec![Param::Text, Param::Session]);
        assert_eq!(params_of(|| async {}), Vec::<Param>::new());
    }

    #[test]
    fn test_return_shapes() {
        async fn none() {}
        async fn error_only() -> std::result::Result<(), String> {
            Ok(())
        }
        async fn result_only(bytes: Vec<u8>) -> Vec<u8> {
            bytes
        }
        async fn both(Message(n): Message<u32>) -> std::result::Result<Message<u32>, String> {
            Ok(Message(n + 1))
        }

        assert_eq!(shape_of(none), Shape::None);
        assert_eq!(shape_of(error_only), Shape::ErrorOnly);
        assert_eq!(shape_of(result_only), Shape::ResultOnly);
        assert_eq!(shape_of(both), Shape::ResultAndError);
        assert_eq!(shape_of(|| async { String::from("ok") }), Shape::ResultOnly);
    }

    #[test]
    fn test_outcomes() {
        assert_eq!(IntoReply::into_outcome::<Json>(()).unwrap(), Outcome::Done);
        assert_eq!(
            IntoReply::into_outcome::<Json>(String::from("hi")).unwrap(),
            Outcome::Reply(b"hi".to_vec())
        );
        assert_eq!(
            IntoReply::into_outcome::<Json>(Message(vec![1, 2])).unwrap(),
            Outcome::Reply(b"[1,2]".to_vec())
        );

        let failed: std::result::Result<Vec<u8>, &str> = Err("disk full");
        assert_eq!(
            IntoReply::into_outcome::<Json>(failed).unwrap(),
            Outcome::Failed("disk full".into())
        );
    }

    #[test]
    fn test_reads_payload() {
        assert!(Param::Bytes.reads_payload());
        assert!(Param::Text.reads_payload());
        assert!(Param::Message.reads_payload());
        assert!(!Param::Session.reads_payload());
        assert!(!Param::Packet.reads_payload());
    }
}
