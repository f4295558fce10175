//! Registration helpers for methods that touch host-confined state.
//!
//! Both helpers register an asynchronous method whose only job on the
//! receiving thread is to post the real handler to the host context. If the
//! host has already stopped, the request is answered with `shutting-down`.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::bridge::Bridge;
use crate::completion::Completion;
use crate::errors::MethodError;
use crate::methods::MethodTable;
use crate::params::Params;

const HOST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host");

/// Registers methods that run against the host state `T`.
#[derive(Debug)]
pub struct HostMethods<'table, T> {
    table: &'table mut MethodTable,
    bridge: Bridge<T>,
}

impl<'table, T: 'static> HostMethods<'table, T> {
    /// Wraps `table`, posting handler work through `bridge`.
    pub const fn new(table: &'table mut MethodTable, bridge: Bridge<T>) -> Self {
        Self { table, bridge }
    }

    /// Bridge the registered methods post through.
    #[must_use]
    pub const fn bridge(&self) -> &Bridge<T> {
        &self.bridge
    }

    /// Registers a handler that runs on the host context and answers with its
    /// return value.
    pub fn register_host<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut T, Params) -> Result<Value, MethodError> + Send + Sync + 'static,
    {
        let shared = Arc::new(handler);
        let bridge = self.bridge.clone();
        self.table
            .register_async(name, move |params: Params, completion: Completion| {
                let run = Arc::clone(&shared);
                let pending = completion.clone();
                let posted = bridge.post(move |state| {
                    settle(&completion, run(state, params));
                });
                if posted.is_err() {
                    settle(&pending, Err(MethodError::shutting_down()));
                }
            });
        self
    }

    /// Registers a handler that starts on the host context and settles its
    /// [`Completion`] whenever the work it starts finishes.
    ///
    /// The handler receives a bridge so callbacks arriving on other threads
    /// can re-enter the host context.
    pub fn register_host_async<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut T, Params, Completion, &Bridge<T>) + Send + Sync + 'static,
    {
        let shared = Arc::new(handler);
        let bridge = self.bridge.clone();
        self.table
            .register_async(name, move |params: Params, completion: Completion| {
                let run = Arc::clone(&shared);
                let pending = completion.clone();
                let reentry = bridge.clone();
                let posted = bridge.post(move |state| {
                    run(state, params, completion, &reentry);
                });
                if posted.is_err() {
                    settle(&pending, Err(MethodError::shutting_down()));
                }
            });
        self
    }
}

/// Settles `completion`, leaving the logging of rejected settlements to it.
pub(crate) fn settle(completion: &Completion, result: Result<Value, MethodError>) {
    if let Err(error) = completion.settle(result) {
        debug!(target: HOST_TARGET, method = completion.method(), %error, "settlement not applied");
    }
}
