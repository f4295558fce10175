//! The single outbound writer.
//!
//! Responses can be produced on any thread: the receiving thread for
//! synchronous handlers, the host context for resource methods, arbitrary
//! callback threads for asynchronous completions. All of them funnel through
//! one channel into one writer thread, so lines never interleave.

use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::Response;

const OUTBOUND_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::outbound");

/// Errors raised by the outbound writer.
#[derive(Debug, Error)]
pub enum OutboundError {
    /// The writer has stopped; the response was not queued.
    #[error("outbound channel is closed")]
    Closed,
    /// Spawning the writer thread failed.
    #[error("failed to spawn writer thread: {0}")]
    Spawn(#[source] io::Error),
    /// Writing to the underlying stream failed.
    #[error("failed to write response: {0}")]
    Io(#[from] io::Error),
    /// Encoding a response failed.
    #[error("failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The writer thread panicked.
    #[error("writer thread panicked")]
    WriterPanicked,
}

enum Command {
    Write(Response),
    Close,
}

/// Cloneable handle used to queue responses for the writer.
#[derive(Clone)]
pub struct Outbound {
    sender: Sender<Command>,
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("Outbound").finish_non_exhaustive()
    }
}

impl Outbound {
    /// Starts a writer thread that owns `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`OutboundError::Spawn`] if the thread cannot be started.
    pub fn spawn<W>(writer: W) -> Result<(Self, WriterHandle), OutboundError>
    where
        W: Write + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("tether-writer".to_owned())
            .spawn(move || run_writer(ResponseWriter::new(writer), &receiver))
            .map_err(OutboundError::Spawn)?;
        Ok((Self { sender }, WriterHandle { handle: Some(handle) }))
    }

    /// Creates an outbound handle whose responses are delivered to a channel.
    ///
    /// Useful when the embedding application owns the transport itself, and
    /// in tests.
    #[must_use]
    pub fn channel() -> (Self, ResponseReceiver) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, ResponseReceiver { receiver })
    }

    /// Queues a response for writing.
    ///
    /// # Errors
    ///
    /// Returns [`OutboundError::Closed`] once the writer has stopped.
    pub fn send(&self, response: Response) -> Result<(), OutboundError> {
        self.sender
            .send(Command::Write(response))
            .map_err(|_| OutboundError::Closed)
    }

    /// Asks the writer to stop after everything queued so far is written.
    pub fn close(&self) {
        if self.sender.send(Command::Close).is_err() {
            debug!(target: OUTBOUND_TARGET, "writer already stopped");
        }
    }
}

/// Receiving end of [`Outbound::channel`].
#[derive(Debug)]
pub struct ResponseReceiver {
    receiver: Receiver<Command>,
}

impl ResponseReceiver {
    /// Waits for the next response, returning `None` once closed.
    #[must_use]
    pub fn recv(&self) -> Option<Response> {
        match self.receiver.recv().ok()? {
            Command::Write(response) => Some(response),
            Command::Close => None,
        }
    }

    /// Waits up to `timeout` for the next response.
    #[must_use]
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<Response> {
        match self.receiver.recv_timeout(timeout).ok()? {
            Command::Write(response) => Some(response),
            Command::Close => None,
        }
    }

    /// Returns every response already queued without waiting.
    #[must_use]
    pub fn drain(&self) -> Vec<Response> {
        let mut responses = Vec::new();
        while let Ok(command) = self.receiver.try_recv() {
            match command {
                Command::Write(response) => responses.push(response),
                Command::Close => break,
            }
        }
        responses
    }
}

/// Join handle for the writer thread.
#[derive(Debug)]
pub struct WriterHandle {
    handle: Option<JoinHandle<Result<usize, OutboundError>>>,
}

impl WriterHandle {
    /// Waits for the writer to finish, returning how many responses it wrote.
    ///
    /// The writer stops after [`Outbound::close`] or once every [`Outbound`]
    /// clone has been dropped.
    ///
    /// # Errors
    ///
    /// Propagates the write error that stopped the writer, or reports a panic.
    pub fn join(mut self) -> Result<usize, OutboundError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| OutboundError::WriterPanicked)?,
            None => Ok(0),
        }
    }
}

/// Serialises responses as JSON lines.
struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    const fn new(writer: W) -> Self {
        Self { writer }
    }

    fn write_response(&mut self, response: &Response) -> Result<(), OutboundError> {
        serde_json::to_writer(&mut self.writer, response)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

fn run_writer<W: Write>(
    mut writer: ResponseWriter<W>,
    receiver: &Receiver<Command>,
) -> Result<usize, OutboundError> {
    let mut written = 0_usize;
    while let Ok(command) = receiver.recv() {
        match command {
            Command::Write(response) => {
                if let Err(error) = writer.write_response(&response) {
                    warn!(target: OUTBOUND_TARGET, %error, "response writer stopped");
                    return Err(error);
                }
                written += 1;
            }
            Command::Close => break,
        }
    }
    debug!(target: OUTBOUND_TARGET, written, "response writer finished");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::protocol::RequestId;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            let bytes = self.0.lock().expect("buffer lock").clone();
            String::from_utf8(bytes).expect("utf8 output")
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

    #[test]
    fn writes_one_line_per_response() {
        let buffer = SharedBuffer::default();
        let (outbound, writer) = Outbound::spawn(buffer.clone()).expect("spawn writer");
        outbound
            .send(Response::success(Some(RequestId::from(1)), json!(5)))
            .expect("send first");
        outbound
            .send(Response::success(Some(RequestId::from(2)), json!(false)))
            .expect("send second");
        outbound.close();
        assert_eq!(writer.join().expect("join writer"), 2);

        let output = buffer.contents();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"jsonrpc":"2.0","id":1,"result":5}"#);
        assert!(output.ends_with('\n'));
    }

    #[test]
    fn concurrent_senders_never_interleave() {
        let buffer = SharedBuffer::default();
        let (outbound, writer) = Outbound::spawn(buffer.clone()).expect("spawn writer");
        let senders: Vec<_> = (0..8_u64)
            .map(|worker| {
                let outbound = outbound.clone();
                thread::spawn(move || {
                    for index in 0..50_u64 {
                        let id = RequestId::from(worker * 1000 + index);
                        outbound
                            .send(Response::success(Some(id), json!("x".repeat(64))))
                            .expect("send");
                    }
                })
            })
            .collect();
        for sender in senders {
            sender.join().expect("sender thread");
        }
        drop(outbound);
        assert_eq!(writer.join().expect("join writer"), 400);

        for line in buffer.contents().lines() {
            let response: Response = serde_json::from_str(line).expect("each line is whole");
            assert!(response.result().is_some());
        }
    }

    #[test]
    fn send_after_close_reports_closed() {
        let (outbound, writer) = Outbound::spawn(io::sink()).expect("spawn writer");
        outbound.close();
        writer.join().expect("join writer");
        let error = outbound
            .send(Response::success(None, json!(null)))
            .expect_err("writer stopped");
        assert!(matches!(error, OutboundError::Closed));
    }

    #[test]
    fn channel_delivers_in_order() {
        let (outbound, receiver) = Outbound::channel();
        outbound
            .send(Response::success(Some(RequestId::from(1)), json!(1)))
            .expect("send");
        outbound
            .send(Response::success(Some(RequestId::from(2)), json!(2)))
            .expect("send");
        let ids: Vec<_> = receiver.drain().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Some(RequestId::from(1)), Some(RequestId::from(2))]);
    }
}
