//! Execution-domain bridge.
//!
//! Resources are confined to one host context: the thread that owns the
//! [`HostLoop`] and its state. Every other thread reaches that state by posting
//! a unit of work through a [`Bridge`]. Posting never blocks and never runs the
//! work inline, so a collaborator callback firing on the host thread itself
//! still goes through the queue.
//!
//! The loop can be driven two ways. [`HostLoop::run`] blocks and owns the
//! thread. [`HostLoop::drain`] runs whatever is queued and returns, for hosts
//! that already pump a native event loop and want to interleave; pair it with a
//! waker ([`Bridge::with_waker`]) that nudges that event loop on each post.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error};

use crate::unwind::describe_panic;

const BRIDGE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bridge");

/// One unit of host-confined work.
pub type Work<T> = Box<dyn FnOnce(&mut T) + Send>;

type Waker = Arc<dyn Fn() + Send + Sync>;

/// State owned by a [`HostLoop`].
pub trait HostState {
    /// Returns true once [`HostLoop::run`] should stop.
    fn exit_requested(&self) -> bool {
        false
    }
}

/// Errors raised when posting to the host context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The host loop has been dropped.
    #[error("host context has stopped")]
    HostClosed,
}

/// Why [`HostLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The state asked to stop.
    ExitRequested,
    /// Every [`Bridge`] was dropped, so no more work can arrive.
    Disconnected,
}

/// Sending side of the host queue. Cheap to clone and safe to move anywhere.
pub struct Bridge<T> {
    sender: Sender<Work<T>>,
    waker: Option<Waker>,
}

impl<T> Clone for Bridge<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            waker: self.waker.clone(),
        }
    }
}

impl<T> fmt::Debug for Bridge<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Bridge")
            .field("waker", &self.waker.is_some())
            .finish_non_exhaustive()
    }
}

impl<T> Bridge<T> {
    /// Installs a callback invoked after every successful post.
    #[must_use]
    pub fn with_waker(mut self, waker: impl Fn() + Send + Sync + 'static) -> Self {
        self.waker = Some(Arc::new(waker));
        self
    }

    /// Queues `work` to run on the host context and returns immediately.
    ///
    /// Work posted from one thread runs in the order it was posted.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::HostClosed`] if the host loop is gone; the work
    /// is dropped without running.
    pub fn post(&self, work: impl FnOnce(&mut T) + Send + 'static) -> Result<(), BridgeError> {
        self.sender
            .send(Box::new(work))
            .map_err(|_| BridgeError::HostClosed)?;
        if let Some(waker) = &self.waker {
            waker();
        }
        Ok(())
    }
}

/// Owner of the host context state and its work queue.
pub struct HostLoop<T> {
    state: T,
    receiver: Receiver<Work<T>>,
}

impl<T> fmt::Debug for HostLoop<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("HostLoop").finish_non_exhaustive()
    }
}

impl<T> HostLoop<T> {
    /// Creates a loop owning `state` and the first bridge into it.
    #[must_use]
    pub fn new(state: T) -> (Self, Bridge<T>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self { state, receiver },
            Bridge {
                sender,
                waker: None,
            },
        )
    }

    /// Borrows the state.
    #[must_use]
    pub const fn state(&self) -> &T {
        &self.state
    }

    /// Mutably borrows the state, for setup on the host thread.
    pub const fn state_mut(&mut self) -> &mut T {
        &mut self.state
    }

    /// Consumes the loop, returning the state. Queued work is dropped.
    #[must_use]
    pub fn into_state(self) -> T {
        self.state
    }

    /// Runs every queued unit without blocking, returning how many ran.
    pub fn drain(&mut self) -> usize {
        let mut ran = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(work) => {
                    self.execute(work);
                    ran += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return ran,
            }
        }
    }

    /// Waits up to `timeout` for work, then drains the queue.
    pub fn pump(&mut self, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(work) => {
                self.execute(work);
                1 + self.drain()
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    fn execute(&mut self, work: Work<T>) {
        let state = &mut self.state;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || work(state))) {
            error!(
                target: BRIDGE_TARGET,
                panic = %describe_panic(payload.as_ref()),
                "host work panicked; continuing"
            );
        }
    }
}

impl<T: HostState> HostLoop<T> {
    /// Runs units one at a time until the state requests exit or every bridge
    /// has been dropped.
    pub fn run(&mut self) -> RunOutcome {
        loop {
            if self.state.exit_requested() {
                debug!(target: BRIDGE_TARGET, "host loop exiting on request");
                return RunOutcome::ExitRequested;
            }
            match self.receiver.recv() {
                Ok(work) => self.execute(work),
                Err(_) => {
                    debug!(target: BRIDGE_TARGET, "host loop exiting: all bridges dropped");
                    return RunOutcome::Disconnected;
                }
            }
        }
    }
}
