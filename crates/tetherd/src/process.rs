//! Process entry point: bootstrap, assemble, serve.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use tether_rpc::RunOutcome;

use crate::bootstrap::{BootstrapError, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::server::ServerError;
use crate::surface::HeadlessSurface;

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Errors that end the server process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrap failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The server could not be assembled or failed while running.
    #[error(transparent)]
    Server(#[from] ServerError),
    /// Signal forwarding could not be installed.
    #[cfg(unix)]
    #[error(transparent)]
    Signals(#[from] crate::signals::SignalError),
}

/// Loads configuration from the process environment and serves until exit.
///
/// Views are created on the headless surface; embedders with a native surface
/// assemble a [`crate::Server`] themselves.
pub fn run_server() -> Result<RunOutcome, LaunchError> {
    let reporter: Arc<dyn HealthReporter> = Arc::new(StructuredHealthReporter::new());
    let runtime = bootstrap_with(&SystemConfigLoader, reporter)?;
    let server = runtime.into_server(HeadlessSurface::new())?;

    #[cfg(unix)]
    let signals = crate::signals::forward_signals(server.bridge())?;

    let outcome = server.run()?;
    info!(target: PROCESS_TARGET, ?outcome, "server stopped");

    #[cfg(unix)]
    signals.close();
    Ok(outcome)
}
