//! Structured health reporting for server lifecycle events.

use std::sync::Arc;

use tether_config::Config;
use tether_rpc::Handle;

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked when a controller session starts.
    fn session_opened(&self, peer: &str);

    /// Invoked when a controller session ends.
    fn session_closed(&self, peer: &str, requests: usize);

    /// Invoked after a view has been registered.
    fn view_created(&self, handle: Handle);

    /// Invoked after a view has been removed.
    fn view_closed(&self, handle: Handle);

    /// Invoked once the server starts shutting down.
    fn shutdown_requested(&self, reason: &str);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn session_opened(&self, peer: &str) {
        (**self).session_opened(peer);
    }

    fn session_closed(&self, peer: &str, requests: usize) {
        (**self).session_closed(peer, requests);
    }

    fn view_created(&self, handle: Handle) {
        (**self).view_created(handle);
    }

    fn view_closed(&self, handle: Handle) {
        (**self).view_closed(handle);
    }

    fn shutdown_requested(&self, reason: &str) {
        (**self).shutdown_requested(reason);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting server bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            endpoint = %config.endpoint(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            missing_handle = %config.missing_handle(),
            "server bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "server bootstrap failed"
        );
    }

    fn session_opened(&self, peer: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "session_opened",
            peer,
            "controller session opened"
        );
    }

    fn session_closed(&self, peer: &str, requests: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "session_closed",
            peer,
            requests,
            "controller session closed"
        );
    }

    fn view_created(&self, handle: Handle) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "view_created",
            handle = handle.get(),
            "view registered"
        );
    }

    fn view_closed(&self, handle: Handle) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "view_closed",
            handle = handle.get(),
            "view removed"
        );
    }

    fn shutdown_requested(&self, reason: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_requested",
            reason,
            "server shutting down"
        );
    }
}
