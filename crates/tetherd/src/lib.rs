//! The tether command server.
//!
//! A controller process drives embedded views over newline-delimited JSON:
//! it asks for a view under one of its native windows, then moves, shows,
//! reparents, navigates and closes it by the numeric handle it got back.
//!
//! Startup follows a fixed sequence: load [`tether_config::Config`], install
//! structured telemetry, prepare the socket filesystem, then assemble a
//! [`Server`] over a [`Surface`]. The server owns one host context (the loop
//! every view operation runs on) and serves either stdio or every connection
//! accepted on a TCP or Unix socket. Lifecycle events are reported through a
//! [`HealthReporter`].
//!
//! Views themselves come from a [`Surface`]. The binary uses
//! [`HeadlessSurface`]; an embedder with a real engine implements the trait
//! and calls [`Runtime::into_server`] with it.

mod bootstrap;
mod builtins;
mod health;
mod process;
mod server;
#[cfg(unix)]
mod signals;
pub mod surface;
mod telemetry;
mod transport;
mod views;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Runtime, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use builtins::register_builtins;
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, run_server};
pub use server::{Server, ServerError};
#[cfg(unix)]
pub use signals::{SignalError, forward_signals};
pub use surface::{HeadlessSurface, Surface, SurfaceError, View};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::ListenerError;
pub use views::{ExitMode, ViewHost, register_methods};

#[cfg(test)]
mod tests;
