//! Socket listener for the command endpoint.
//!
//! The listener binds the configured Unix or TCP endpoint, accepts
//! connections on a background thread and gives every connection its own
//! thread so that a long exposure never blocks an abort.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub(crate) use self::handler::{ConnectionHandler, ConnectionStream};
pub(crate) use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
