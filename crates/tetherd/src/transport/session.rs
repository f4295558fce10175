//! Newline-delimited controller sessions.
//!
//! A session reads request lines until end of input and hands each one to a
//! [`Dispatcher`]. Responses leave through the dispatcher's outbound writer,
//! never through the reader, so a session never waits on handler work.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use tether_rpc::{DispatchError, Dispatcher, MethodTable, Outbound, ShutdownSignal};

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET};
use crate::health::HealthReporter;

/// One unit read from the input stream.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Line {
    /// A line within the size limit, without its terminator.
    Complete(Vec<u8>),
    /// A line over the size limit, discarded up to its terminator.
    TooLarge(usize),
    /// End of input.
    Eof,
}

/// Splits a byte stream into bounded lines.
///
/// Oversized lines are skipped rather than buffered, so a runaway controller
/// cannot make the reader hold more than the limit in memory.
#[derive(Debug)]
pub(crate) struct LineReader<R> {
    inner: R,
    max_bytes: usize,
}

impl<R: BufRead> LineReader<R> {
    pub(crate) const fn new(inner: R, max_bytes: usize) -> Self {
        Self { inner, max_bytes }
    }

    pub(crate) fn next_line(&mut self) -> io::Result<Line> {
        let mut line = Vec::new();
        let mut size = 0_usize;
        let mut oversized = false;
        loop {
            let available = match self.inner.fill_buf() {
                Ok(available) => available,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            };
            if available.is_empty() {
                return Ok(if size == 0 {
                    Line::Eof
                } else if oversized {
                    Line::TooLarge(size)
                } else {
                    Line::Complete(line)
                });
            }

            let newline = available.iter().position(|byte| *byte == b'\n');
            let chunk = &available[..newline.unwrap_or(available.len())];
            size += chunk.len();
            if !oversized && size > self.max_bytes {
                oversized = true;
                line = Vec::new();
            }
            if !oversized {
                line.extend_from_slice(chunk);
            }
            let consumed = chunk.len() + usize::from(newline.is_some());
            self.inner.consume(consumed);

            if newline.is_some() {
                return Ok(if oversized {
                    Line::TooLarge(size)
                } else {
                    Line::Complete(line)
                });
            }
        }
    }
}

/// Dispatches every line of `reader`, returning how many requests were read.
///
/// Blank lines are ignored.
pub(crate) fn serve_session<R: BufRead>(reader: R, dispatcher: &Dispatcher) -> io::Result<usize> {
    let max_bytes = dispatcher.max_request_bytes();
    let mut lines = LineReader::new(reader, max_bytes);
    let mut requests = 0_usize;
    loop {
        match lines.next_line()? {
            Line::Eof => return Ok(requests),
            Line::TooLarge(size) => {
                requests += 1;
                dispatcher.reject(&DispatchError::request_too_large(size, max_bytes));
            }
            Line::Complete(line) => {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                requests += 1;
                let outcome = dispatcher.dispatch_line(&line);
                debug!(target: LISTENER_TARGET, ?outcome, "request line handled");
            }
        }
    }
}

/// Serves accepted socket connections as independent sessions.
///
/// Each connection gets its own writer; all of them share one method table
/// and therefore one host context. The handler keeps the control half of
/// every live connection so shutdown can end its input.
pub(crate) struct SessionHandler {
    methods: Arc<MethodTable>,
    shutdown: ShutdownSignal,
    max_request_bytes: usize,
    reporter: Arc<dyn HealthReporter>,
    sessions: Mutex<HashMap<u64, ConnectionStream>>,
    next_session: AtomicU64,
}

impl SessionHandler {
    pub(crate) fn new(
        methods: Arc<MethodTable>,
        shutdown: ShutdownSignal,
        max_request_bytes: usize,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            methods,
            shutdown,
            max_request_bytes,
            reporter,
            sessions: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<u64, ConnectionStream>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatcher(&self, outbound: Outbound) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.methods), outbound)
            .with_max_request_bytes(self.max_request_bytes)
            .with_shutdown(self.shutdown.clone())
    }

    fn enroll(&self, control: ConnectionStream) -> u64 {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let mut sessions = self.lock_sessions();
        // Accepted just as the server stopped: nothing will wake it later.
        if self.shutdown.is_triggered() {
            end_input(id, &control);
        }
        sessions.insert(id, control);
        id
    }
}

fn end_input(id: u64, control: &ConnectionStream) {
    if let Err(error) = control.shutdown_read() {
        debug!(target: LISTENER_TARGET, session = id, %error, "session input already closed");
    }
}

impl ConnectionHandler for SessionHandler {
    fn handle(&self, stream: ConnectionStream) {
        let peer = stream.peer();
        let opened = stream
            .try_clone()
            .and_then(|control| stream.try_clone().map(|output| (control, output)))
            .map_err(tether_rpc::OutboundError::Io)
            .and_then(|(control, output)| {
                Outbound::spawn(output).map(|(outbound, writer)| (control, outbound, writer))
            });
        let (control, outbound, writer) = match opened {
            Ok(parts) => parts,
            Err(error) => {
                warn!(target: LISTENER_TARGET, %peer, %error, "failed to open session writer");
                return;
            }
        };

        let id = self.enroll(control);
        self.reporter.session_opened(&peer);
        let dispatcher = self.dispatcher(outbound);
        let served = serve_session(BufReader::new(stream), &dispatcher);
        drop(dispatcher);

        let requests = served.unwrap_or_else(|error| {
            warn!(target: LISTENER_TARGET, %peer, %error, "session input failed");
            0
        });
        // Unsettled completions still hold the writer; it stops once every
        // request of this session has been answered.
        if let Err(error) = writer.join() {
            warn!(target: LISTENER_TARGET, %peer, %error, "session writer failed");
        }
        self.lock_sessions().remove(&id);
        self.reporter.session_closed(&peer, requests);
    }

    fn shutdown(&self) {
        let sessions = self.lock_sessions();
        info!(target: LISTENER_TARGET, live = sessions.len(), "ending session input");
        for (id, control) in sessions.iter() {
            end_input(*id, control);
        }
    }
}
