//! The controlled-view method set.
//!
//! [`ViewHost`] is the host context state: the surface, the registry of live
//! views and the exit flag. It is only ever touched by work the host loop runs,
//! so none of it is locked. [`register_methods`] wires the controller-facing
//! methods to it through a [`Bridge`].

mod commands;
mod create;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use tether_config::{Config, MissingHandlePolicy};
use tether_rpc::{
    Bridge, Completion, Handle, HostMethods, HostState, MethodError, MethodTable,
    ResourceRegistry, ShutdownSignal,
};

use crate::health::HealthReporter;
use crate::surface::{Surface, SurfaceError, View};

pub(crate) const VIEWS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::views");

/// How urgently the host loop should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExitMode {
    /// Stop once every view creation in flight has been answered.
    WhenIdle,
    /// Stop after the current unit of work.
    Immediate,
}

/// Host context state for the view methods.
pub struct ViewHost<S: Surface> {
    surface: S,
    views: ResourceRegistry<S::View>,
    policy: MissingHandlePolicy,
    default_url: String,
    reporter: Arc<dyn HealthReporter>,
    shutdown: ShutdownSignal,
    exit: Option<ExitMode>,
    creating: HashMap<u64, Completion>,
    next_ticket: u64,
}

impl<S: Surface> std::fmt::Debug for ViewHost<S> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ViewHost")
            .field("views", &self.views.handles())
            .field("policy", &self.policy)
            .field("exit", &self.exit)
            .field("pending_creates", &self.creating.len())
            .finish_non_exhaustive()
    }
}

impl<S: Surface> ViewHost<S> {
    /// Builds the host state over `surface`.
    pub fn new(
        surface: S,
        config: &Config,
        reporter: Arc<dyn HealthReporter>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            surface,
            views: ResourceRegistry::new(),
            policy: config.missing_handle(),
            default_url: config.default_url().to_owned(),
            reporter,
            shutdown,
            exit: None,
            creating: HashMap::new(),
            next_ticket: 0,
        }
    }

    /// The surface views are created on.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Live views.
    pub fn views(&self) -> &ResourceRegistry<S::View> {
        &self.views
    }

    /// View creations started but not yet answered.
    pub fn pending_creates(&self) -> usize {
        self.creating.len()
    }

    /// Answers every view creation still in flight with `shutting-down`,
    /// returning how many were answered.
    ///
    /// A surface callback that fires afterwards finds its request settled and
    /// replies nothing.
    pub fn abandon_creates(&mut self) -> usize {
        let mut abandoned = 0;
        for (ticket, completion) in self.creating.drain() {
            if completion.is_settled() {
                continue;
            }
            debug!(
                target: VIEWS_TARGET,
                ticket,
                id = ?completion.request_id(),
                "view creation abandoned at shutdown"
            );
            if let Err(error) = completion.reply_error(MethodError::shutting_down()) {
                warn!(target: VIEWS_TARGET, ticket, %error, "abandoned creation not answered");
            }
            abandoned += 1;
        }
        abandoned
    }

    fn track_create(&mut self, completion: Completion) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.creating.insert(ticket, completion);
        ticket
    }

    fn untrack_create(&mut self, ticket: u64) {
        self.creating.remove(&ticket);
    }

    /// Asks the host loop to stop and raises the shutdown signal.
    ///
    /// An immediate request overrides an earlier idle one, never the reverse.
    pub fn request_exit(&mut self, mode: ExitMode, reason: &str) {
        if self.exit.is_none() {
            self.reporter.shutdown_requested(reason);
        }
        self.shutdown.trigger();
        self.exit = Some(self.exit.map_or(mode, |current| current.max(mode)));
    }

    /// Closes and removes every live view, returning how many there were.
    pub fn close_all(&mut self) -> usize {
        let drained = self.views.drain();
        let count = drained.len();
        for (handle, mut view) in drained {
            if let Err(error) = view.close() {
                warn!(target: VIEWS_TARGET, %handle, %error, "view failed to close cleanly");
            }
            self.reporter.view_closed(handle);
        }
        count
    }

    fn missing(&self, handle: Handle, benign: Value) -> Result<Value, MethodError> {
        debug!(target: VIEWS_TARGET, %handle, policy = %self.policy, "handle not registered");
        match self.policy {
            MissingHandlePolicy::Benign => Ok(benign),
            MissingHandlePolicy::Error => Err(MethodError::resource_not_found(handle)),
        }
    }

    /// Runs `operation` against the view under `handle`, or answers with the
    /// configured not-found convention.
    fn with_view(
        &mut self,
        handle: Handle,
        benign: Value,
        operation: impl FnOnce(&mut S::View) -> Result<Value, SurfaceError>,
    ) -> Result<Value, MethodError> {
        match self.views.lookup_mut(handle) {
            Some(view) => operation(view).map_err(surface_failure),
            None => self.missing(handle, benign),
        }
    }
}

impl<S: Surface> HostState for ViewHost<S> {
    fn exit_requested(&self) -> bool {
        match self.exit {
            Some(ExitMode::Immediate) => true,
            Some(ExitMode::WhenIdle) => self.creating.is_empty(),
            None => false,
        }
    }
}

pub(crate) fn surface_failure(error: SurfaceError) -> MethodError {
    MethodError::handler_failed(error.to_string())
}

/// Registers the view methods on `table`, posting their work through `bridge`.
pub fn register_methods<S: Surface>(table: &mut MethodTable, bridge: Bridge<ViewHost<S>>) {
    HostMethods::new(table, bridge)
        .register_host("exit", commands::exit)
        .register_host_async("new", create::start)
        .register_host("close", commands::close)
        .register_host("resize", commands::resize)
        .register_host("set-visible", commands::set_visible)
        .register_host("reparent", commands::reparent)
        .register_host("get-title", commands::get_title)
        .register_host("navigate", commands::navigate)
        .register_host("set-focus", commands::set_focus)
        .register_host("list", commands::list);
}
