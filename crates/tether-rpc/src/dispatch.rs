//! Request dispatcher.
//!
//! Turns one inbound line into at most one response. The dispatcher never
//! blocks on handler work: synchronous handlers answer inline, asynchronous
//! handlers receive a [`Completion`] and the dispatcher returns immediately.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::completion::Completion;
use crate::errors::{DispatchError, MethodError};
use crate::methods::{Method, MethodTable};
use crate::outbound::Outbound;
use crate::protocol::{Request, RequestId, Response};
use crate::shutdown::ShutdownSignal;
use crate::unwind::describe_panic;

/// Tracing target for dispatch events.
pub const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Default ceiling on a single request line.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// What the dispatcher did with one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A response was queued.
    Replied,
    /// An asynchronous handler owns the request and will answer later.
    Deferred,
    /// The request was a notification; nothing was written.
    Notified,
    /// The line was unusable and an error response was queued.
    Rejected,
}

/// Parses requests, resolves their methods and routes the results.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    methods: Arc<MethodTable>,
    outbound: Outbound,
    max_request_bytes: usize,
    shutdown: Option<ShutdownSignal>,
}

impl Dispatcher {
    /// Creates a dispatcher answering through `outbound`.
    #[must_use]
    pub fn new(methods: Arc<MethodTable>, outbound: Outbound) -> Self {
        Self {
            methods,
            outbound,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            shutdown: None,
        }
    }

    /// Sets the ceiling on request line length.
    #[must_use]
    pub const fn with_max_request_bytes(mut self, max_request_bytes: usize) -> Self {
        self.max_request_bytes = max_request_bytes;
        self
    }

    /// Refuses new identified requests once `shutdown` is triggered.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Ceiling on request line length.
    #[must_use]
    pub const fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }

    /// Outbound writer this dispatcher answers through.
    #[must_use]
    pub const fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Dispatches one raw request line.
    #[expect(
        clippy::must_use_candidate,
        reason = "the outcome is informational; the response is already queued"
    )]
    pub fn dispatch_line(&self, line: &[u8]) -> DispatchOutcome {
        if line.len() > self.max_request_bytes {
            return self.reject(&DispatchError::request_too_large(
                line.len(),
                self.max_request_bytes,
            ));
        }
        match Request::parse(line) {
            Ok(request) => self.dispatch(request),
            Err(error) => self.reject(&error),
        }
    }

    /// Answers a line that could not be turned into a request.
    #[expect(
        clippy::must_use_candidate,
        reason = "the outcome is informational; the response is already queued"
    )]
    pub fn reject(&self, error: &DispatchError) -> DispatchOutcome {
        warn!(target: DISPATCH_TARGET, %error, "rejected request");
        self.send(Response::failure(
            error.request_id().cloned(),
            error.to_method_error(),
        ));
        DispatchOutcome::Rejected
    }

    /// Dispatches a parsed request.
    #[expect(
        clippy::must_use_candidate,
        reason = "the outcome is informational; the response is already queued"
    )]
    pub fn dispatch(&self, request: Request) -> DispatchOutcome {
        let Request { id, method, params } = request;

        if self.shutdown.as_ref().is_some_and(ShutdownSignal::is_triggered) {
            debug!(target: DISPATCH_TARGET, %method, "refusing request during shutdown");
            return self.answer(id, &method, Err(MethodError::shutting_down()));
        }

        let Some(handler) = self.methods.resolve(&method).cloned() else {
            return self.answer(id, &method, Err(MethodError::method_not_found(&method)));
        };

        debug!(target: DISPATCH_TARGET, %method, id = ?id, kind = ?handler.kind(), "dispatching");
        match handler {
            Method::Sync(call) => {
                let result = panic::catch_unwind(AssertUnwindSafe(|| call(params)))
                    .unwrap_or_else(|payload| {
                        Err(handler_panicked(&method, &describe_panic(payload.as_ref())))
                    });
                self.answer(id, &method, result)
            }
            Method::Async(start) => {
                let notification = id.is_none();
                let completion = Completion::new(id, method.clone(), self.outbound.clone());
                let handed_over = completion.clone();
                if let Err(payload) =
                    panic::catch_unwind(AssertUnwindSafe(move || start(params, handed_over)))
                {
                    let failure = handler_panicked(&method, &describe_panic(payload.as_ref()));
                    if !completion.is_settled() && completion.reply_error(failure).is_err() {
                        debug!(target: DISPATCH_TARGET, %method, "panic reply not delivered");
                    }
                }
                if notification {
                    DispatchOutcome::Notified
                } else {
                    DispatchOutcome::Deferred
                }
            }
        }
    }

    fn answer(
        &self,
        id: Option<RequestId>,
        method: &str,
        result: Result<Value, MethodError>,
    ) -> DispatchOutcome {
        let Some(request_id) = id else {
            if let Err(failure) = result {
                warn!(target: DISPATCH_TARGET, %method, error = %failure, "notification failed");
            }
            return DispatchOutcome::Notified;
        };
        self.send(Response::from_result(Some(request_id), result));
        DispatchOutcome::Replied
    }

    fn send(&self, response: Response) {
        if let Err(error) = self.outbound.send(response) {
            warn!(target: DISPATCH_TARGET, %error, "response dropped");
        }
    }
}

fn handler_panicked(method: &str, detail: &str) -> MethodError {
    error!(target: DISPATCH_TARGET, %method, panic = detail, "handler panicked");
    MethodError::internal(format!("handler for '{method}' panicked"))
}
