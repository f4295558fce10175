//! Server assembly and the host loop.
//!
//! [`Server::new`] builds the host context, registers every method and binds
//! the configured socket. [`Server::run`] then serves controllers until an
//! `exit` request, a signal, or the end of stdio input, with the host loop on
//! the calling thread.

use std::io::{self, BufReader, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tracing::{debug, info, warn};

use tether_config::Config;
use tether_rpc::{
    Bridge, Dispatcher, HostLoop, MethodTable, Outbound, OutboundError, RunOutcome,
    ShutdownSignal,
};

use crate::builtins::register_builtins;
use crate::health::HealthReporter;
use crate::surface::Surface;
use crate::transport::{
    ListenerError, ListenerHandle, SessionHandler, SocketListener, serve_session,
};
use crate::views::{ExitMode, ViewHost, register_methods};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");
const STDIO_PEER: &str = "stdio";

/// Errors raised while assembling or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The socket endpoint could not be bound or served.
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// The response writer could not be started or failed.
    #[error("response writer failed: {0}")]
    Outbound(#[from] OutboundError),
    /// A server thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Role of the thread.
        name: &'static str,
        /// Thread creation error.
        #[source]
        source: io::Error,
    },
}

/// An assembled server, ready to run.
pub struct Server<S: Surface> {
    host: HostLoop<ViewHost<S>>,
    bridge: Bridge<ViewHost<S>>,
    methods: Arc<MethodTable>,
    shutdown: ShutdownSignal,
    reporter: Arc<dyn HealthReporter>,
    max_request_bytes: usize,
    listener: Option<SocketListener>,
}

impl<S: Surface> std::fmt::Debug for Server<S> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Server")
            .field("methods", &self.methods.names())
            .field("max_request_bytes", &self.max_request_bytes)
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl<S: Surface> Server<S> {
    /// Builds the host context over `surface` and binds the configured
    /// endpoint. Stdio endpoints bind nothing.
    ///
    /// # Errors
    ///
    /// Fails when the socket endpoint cannot be bound.
    pub fn new(
        config: &Config,
        surface: S,
        reporter: Arc<dyn HealthReporter>,
    ) -> Result<Self, ServerError> {
        let shutdown = ShutdownSignal::new();
        let state = ViewHost::new(surface, config, Arc::clone(&reporter), shutdown.clone());
        let (host, bridge) = HostLoop::new(state);

        let mut methods = MethodTable::new();
        register_builtins(&mut methods);
        register_methods(&mut methods, bridge.clone());

        let listener = if config.endpoint().is_stdio() {
            None
        } else {
            Some(SocketListener::bind(config.endpoint())?)
        };
        debug!(target: SERVER_TARGET, methods = ?methods.names(), "server assembled");

        Ok(Self {
            host,
            bridge,
            methods: Arc::new(methods),
            shutdown,
            reporter,
            max_request_bytes: config.max_request_bytes(),
            listener,
        })
    }

    /// Bound TCP address, when serving TCP.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(SocketListener::local_addr)
    }

    /// A bridge into the host context, for signal handlers and embedders.
    #[must_use]
    pub fn bridge(&self) -> Bridge<ViewHost<S>> {
        self.bridge.clone()
    }

    /// Signal raised once the server starts shutting down.
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Serves the configured endpoint until the host loop stops.
    ///
    /// # Errors
    ///
    /// Fails when a server thread cannot be started or the listener or writer
    /// fails.
    pub fn run(mut self) -> Result<RunOutcome, ServerError> {
        match self.listener.take() {
            Some(listener) => self.run_listener(listener),
            None => self.run_with_io(io::stdin(), io::stdout()),
        }
    }

    /// Serves a single session over `reader` and `writer`.
    ///
    /// The end of `reader` asks the host to stop once every view creation in
    /// flight has been answered.
    ///
    /// # Errors
    ///
    /// Fails when the reader thread or writer cannot be started, or when the
    /// writer stops on an error.
    pub fn run_with_io<R, W>(self, reader: R, writer: W) -> Result<RunOutcome, ServerError>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (outbound, writer) = Outbound::spawn(writer)?;
        let dispatcher = self.dispatcher(outbound.clone());
        let bridge = self.bridge.clone();
        let reporter = Arc::clone(&self.reporter);

        thread::Builder::new()
            .name("tether-stdio".to_owned())
            .spawn(move || {
                reporter.session_opened(STDIO_PEER);
                let served = serve_session(BufReader::new(reader), &dispatcher);
                drop(dispatcher);
                let requests = served.unwrap_or_else(|error| {
                    warn!(target: SERVER_TARGET, %error, "controller input failed");
                    0
                });
                reporter.session_closed(STDIO_PEER, requests);
                let posted = bridge.post(|host| {
                    host.request_exit(ExitMode::WhenIdle, "controller input closed");
                });
                if posted.is_err() {
                    debug!(target: SERVER_TARGET, "host already stopped at end of input");
                }
            })
            .map_err(|source| ServerError::Spawn {
                name: "stdio reader",
                source,
            })?;

        let outcome = self.host_until_exit(None)?;
        outbound.close();
        let written = writer.join()?;
        debug!(target: SERVER_TARGET, written, "responses flushed");
        Ok(outcome)
    }

    fn run_listener(self, listener: SocketListener) -> Result<RunOutcome, ServerError> {
        let handler = Arc::new(SessionHandler::new(
            Arc::clone(&self.methods),
            self.shutdown.clone(),
            self.max_request_bytes,
            Arc::clone(&self.reporter),
        ));
        let handle = listener.start(handler)?;
        self.host_until_exit(Some(handle))
    }

    fn dispatcher(&self, outbound: Outbound) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.methods), outbound)
            .with_max_request_bytes(self.max_request_bytes)
            .with_shutdown(self.shutdown.clone())
    }

    /// Runs the host loop on this thread, then tears the server down.
    fn host_until_exit(
        self,
        listener: Option<ListenerHandle>,
    ) -> Result<RunOutcome, ServerError> {
        let Self {
            mut host,
            bridge,
            shutdown,
            reporter,
            ..
        } = self;
        drop(bridge);

        info!(target: SERVER_TARGET, "host loop running");
        let outcome = host.run();
        if !shutdown.is_triggered() {
            reporter.shutdown_requested("host context disconnected");
            shutdown.trigger();
        }

        let abandoned = host.state_mut().abandon_creates();
        let closed = host.state_mut().close_all();
        info!(target: SERVER_TARGET, ?outcome, abandoned, closed, "host loop stopped");
        // Work still queued is dropped here; each dropped request is answered.
        drop(host);

        // Sessions flush their writers before the listener thread returns.
        if let Some(listener) = listener {
            listener.shutdown();
            listener.join()?;
        }
        Ok(outcome)
    }
}
