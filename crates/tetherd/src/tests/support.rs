//! Shared fixtures for the server test suites.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ortho_config::OrthoError;
use serde_json::Value;

use tether_config::{Config, Endpoint, MissingHandlePolicy};
use tether_rpc::{Handle, Response, RunOutcome};

use crate::bootstrap::{BootstrapError, ConfigLoader};
use crate::health::HealthReporter;
use crate::server::{Server, ServerError};
use crate::surface::{
    HeadlessSurface, HeadlessView, Ready, Surface, SurfaceError, WindowId,
};

/// Lifecycle events captured by [`RecordingHealthReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    SessionOpened(String),
    SessionClosed { peer: String, requests: usize },
    ViewCreated(Handle),
    ViewClosed(Handle),
    ShutdownRequested(String),
}

/// Records health events for assertions.
#[derive(Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn session_opened(&self, peer: &str) {
        self.record(HealthEvent::SessionOpened(peer.to_owned()));
    }

    fn session_closed(&self, peer: &str, requests: usize) {
        self.record(HealthEvent::SessionClosed {
            peer: peer.to_owned(),
            requests,
        });
    }

    fn view_created(&self, handle: Handle) {
        self.record(HealthEvent::ViewCreated(handle));
    }

    fn view_closed(&self, handle: Handle) {
        self.record(HealthEvent::ViewClosed(handle));
    }

    fn shutdown_requested(&self, reason: &str) {
        self.record(HealthEvent::ShutdownRequested(reason.to_owned()));
    }
}

/// Loader that fails by passing an unparsable request limit.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("tetherd"),
            OsString::from("--max-request-bytes"),
            OsString::from("plenty"),
        ];
        Config::load_from_iter(args)
    }
}

/// Configuration serving an ephemeral loopback TCP port.
pub fn tcp_config(policy: MissingHandlePolicy) -> Config {
    Config {
        endpoint: Endpoint::tcp("127.0.0.1", 0),
        missing_handle: policy,
        ..Config::default()
    }
}

/// A server running on a background thread with one connected controller.
pub struct Controller {
    pub surface: HeadlessSurface,
    pub reporter: Arc<RecordingHealthReporter>,
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    server: Option<JoinHandle<Result<RunOutcome, ServerError>>>,
}

impl Controller {
    /// Starts a TCP server and connects to it.
    pub fn connect(config: &Config) -> Self {
        let surface = HeadlessSurface::new();
        let reporter = Arc::new(RecordingHealthReporter::default());
        let server = Server::new(config, surface.clone(), reporter.clone())
            .expect("server should assemble");
        let addr: SocketAddr = server.local_addr().expect("tcp server reports its address");
        let handle = thread::spawn(move || server.run());

        let stream = TcpStream::connect(addr).expect("connect controller");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("set read timeout");
        let reader = BufReader::new(stream.try_clone().expect("clone controller stream"));
        Self {
            surface,
            reporter,
            stream,
            reader,
            server: Some(handle),
        }
    }

    /// Writes one raw request line.
    pub fn send(&mut self, line: &str) {
        self.stream
            .write_all(format!("{line}\n").as_bytes())
            .expect("write request");
    }

    /// Reads the next response.
    pub fn receive(&mut self) -> Response {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response");
        serde_json::from_str(&line).expect("response should be valid JSON")
    }

    /// Sends one request and waits for its response.
    pub fn call(&mut self, line: &str) -> Response {
        self.send(line);
        self.receive()
    }

    /// Sends one request and returns its result, failing on error responses.
    pub fn result(&mut self, line: &str) -> Value {
        let response = self.call(line);
        response
            .result()
            .cloned()
            .unwrap_or_else(|| panic!("expected a result for {line}, got {response:?}"))
    }

    /// Sends `exit` and waits for the server thread.
    pub fn exit(mut self) -> RunOutcome {
        let response = self.call(r#"{"id":"bye","method":"exit"}"#);
        assert_eq!(response.result(), Some(&Value::Null));
        self.join()
    }

    fn join(&mut self) -> RunOutcome {
        self.server
            .take()
            .expect("server already joined")
            .join()
            .expect("server thread panicked")
            .expect("server should stop cleanly")
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.server.is_some() {
            let _ = self.stream.write_all(b"{\"method\":\"exit\"}\n");
            let _ = self.stream.shutdown(std::net::Shutdown::Both);
            if !thread::panicking() {
                self.join();
            }
        }
    }
}

/// Surface whose environment preparation never completes on its own.
///
/// Callbacks are held until [`StalledSurface::fire_held`] runs them, so a
/// view creation can be kept in flight across a shutdown.
#[derive(Clone, Default)]
pub struct StalledSurface {
    held: Arc<Mutex<Vec<Ready<()>>>>,
}

impl StalledSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of environment callbacks waiting to fire.
    pub fn held(&self) -> usize {
        self.held.lock().expect("stalled surface lock").len()
    }

    /// Fires every held callback with `result`.
    pub fn fire_held(&self, result: &Result<(), SurfaceError>) {
        let held = std::mem::take(&mut *self.held.lock().expect("stalled surface lock"));
        for ready in held {
            ready(result.clone());
        }
    }
}

impl Surface for StalledSurface {
    type Environment = ();
    type View = HeadlessView;

    fn prepare_environment(&mut self, ready: Ready<()>) {
        self.held.lock().expect("stalled surface lock").push(ready);
    }

    fn create_view(&mut self, _environment: (), _parent: WindowId, ready: Ready<HeadlessView>) {
        ready(Err(SurfaceError::Creation("stalled surface creates nothing".to_owned())));
    }

    fn focus(&mut self, _window: WindowId) -> Result<(), SurfaceError> {
        Ok(())
    }
}

/// Waits until `condition` holds, failing after five seconds.
pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(std::time::Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Writer whose contents can be inspected after the server stops.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Every response written so far, parsed.
    pub fn responses(&self) -> Vec<Response> {
        let bytes = self.0.lock().expect("buffer lock").clone();
        String::from_utf8(bytes)
            .expect("utf8 output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("response line"))
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
