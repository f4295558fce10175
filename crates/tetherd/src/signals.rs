//! Termination signal handling.

use std::io;
use std::thread;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tracing::{debug, info};

use tether_rpc::Bridge;

use crate::surface::Surface;
use crate::views::{ExitMode, ViewHost};

const SIGNAL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::signals");

/// Errors reported while installing signal forwarding.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The forwarding thread could not be started.
    #[error("failed to spawn signal thread: {source}")]
    Spawn {
        /// Thread creation error.
        #[source]
        source: io::Error,
    },
}

/// Turns termination signals into immediate exit requests on the host.
///
/// The returned handle stops forwarding when closed.
pub fn forward_signals<S: Surface>(bridge: Bridge<ViewHost<S>>) -> Result<Handle, SignalError> {
    let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
        .map_err(|source| SignalError::Install { source })?;
    let handle = signals.handle();
    thread::Builder::new()
        .name("tether-signals".to_owned())
        .spawn(move || {
            for signal in signals.forever() {
                info!(target: SIGNAL_TARGET, signal, "shutdown signal received");
                let posted = bridge.post(move |host| {
                    host.request_exit(ExitMode::Immediate, &format!("signal {signal}"));
                });
                if posted.is_err() {
                    debug!(target: SIGNAL_TARGET, "host already stopped");
                    break;
                }
            }
        })
        .map_err(|source| SignalError::Spawn { source })?;
    Ok(handle)
}
