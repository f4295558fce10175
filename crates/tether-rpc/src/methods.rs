//! Method table: name to handler.
//!
//! The table is populated once at startup and then shared read-only with the
//! dispatcher, so lookups need no synchronisation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::completion::Completion;
use crate::errors::MethodError;
use crate::params::Params;

const METHODS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::methods");

/// Handler that answers within the dispatch call.
pub type SyncHandler = dyn Fn(Params) -> Result<Value, MethodError> + Send + Sync;

/// Handler that settles its request later through a [`Completion`].
pub type AsyncHandler = dyn Fn(Params, Completion) + Send + Sync;

/// Whether a method answers inline or later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Result is returned from the handler.
    Sync,
    /// Result is delivered through a [`Completion`].
    Async,
}

/// A registered handler.
#[derive(Clone)]
pub enum Method {
    /// Synchronous handler.
    Sync(Arc<SyncHandler>),
    /// Asynchronous handler.
    Async(Arc<AsyncHandler>),
}

impl Method {
    /// Kind of the handler.
    #[must_use]
    pub const fn kind(&self) -> MethodKind {
        match self {
            Self::Sync(_) => MethodKind::Sync,
            Self::Async(_) => MethodKind::Async,
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_tuple("Method").field(&self.kind()).finish()
    }
}

/// Registered methods, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, Method>,
}

impl MethodTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a synchronous handler, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Params) -> Result<Value, MethodError> + Send + Sync + 'static,
    {
        self.insert(name.into(), Method::Sync(Arc::new(handler)));
    }

    /// Registers an asynchronous handler, replacing any previous entry.
    ///
    /// The handler must eventually settle the [`Completion`] it is given, or
    /// drop it, which answers with an `internal-error`.
    pub fn register_async<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Params, Completion) + Send + Sync + 'static,
    {
        self.insert(name.into(), Method::Async(Arc::new(handler)));
    }

    fn insert(&mut self, name: String, method: Method) {
        let kind = method.kind();
        if self.methods.insert(name.clone(), method).is_some() {
            debug!(target: METHODS_TARGET, method = %name, ?kind, "replaced existing method");
        } else {
            debug!(target: METHODS_TARGET, method = %name, ?kind, "registered method");
        }
    }

    /// Looks up the handler registered under `name`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
