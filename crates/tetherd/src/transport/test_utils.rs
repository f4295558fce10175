//! Test helpers for the transport module.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

use super::{ConnectionHandler, ConnectionStream};

/// Records the peer of every connection it is handed, then hangs up.
#[derive(Default)]
pub(crate) struct CountingHandler {
    peers: Mutex<Vec<String>>,
}

impl CountingHandler {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn count(&self) -> usize {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn peers(&self) -> Vec<String> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stream.peer());
    }
}

/// Holds every connection open until the listener asks it to wind down.
#[derive(Default)]
pub(crate) struct HoldingHandler {
    state: Mutex<HoldingState>,
    released: Condvar,
}

#[derive(Default)]
struct HoldingState {
    entered: usize,
    finished: usize,
    released: bool,
}

impl HoldingHandler {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn entered(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).entered
    }

    pub(crate) fn finished(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).finished
    }
}

impl ConnectionHandler for HoldingHandler {
    fn handle(&self, _stream: ConnectionStream) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.entered += 1;
        while !state.released {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.finished += 1;
    }

    fn shutdown(&self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).released = true;
        self.released.notify_all();
    }
}
