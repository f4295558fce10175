//! Socket and stream transports for controller sessions.
//!
//! The listener binds the configured socket endpoint and accepts connections
//! on a background thread. Every connection, and the stdio pair, is served as
//! a newline-delimited session by [`session`].

mod errors;
mod handler;
mod listener;
mod session;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub(crate) use self::handler::{ConnectionHandler, ConnectionStream};
pub(crate) use self::listener::{ListenerHandle, SocketListener};
pub(crate) use self::session::{SessionHandler, serve_session};
#[cfg(test)]
pub(crate) use self::test_utils::{CountingHandler, HoldingHandler};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
