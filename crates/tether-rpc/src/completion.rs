//! Single-use settlement capsule for asynchronous handlers.
//!
//! A [`Completion`] binds one request id to the outbound writer. Clones share
//! the same slot, so several callbacks of one external operation can race to
//! settle it; the first one wins and every later attempt is rejected without
//! touching the channel. If the last clone is dropped unsettled, the slot
//! answers the controller with an `internal-error` so no request is left
//! waiting forever.
//!
//! Settling releases the slot's writer handle, so a settled completion that is
//! still held somewhere never keeps a writer running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::errors::MethodError;
use crate::outbound::{Outbound, OutboundError};
use crate::protocol::{RequestId, Response};

const COMPLETION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::completion");

/// Errors raised when settling a [`Completion`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// Another settlement already took effect.
    #[error("request for '{method}' was already settled")]
    AlreadySettled {
        /// Method of the request.
        method: String,
    },
    /// The settlement was recorded but the writer had stopped.
    #[error("reply for '{method}' could not be queued: outbound channel closed")]
    ChannelClosed {
        /// Method of the request.
        method: String,
    },
}

struct Slot {
    id: Option<RequestId>,
    method: String,
    outbound: Mutex<Option<Outbound>>,
    settled: AtomicBool,
}

impl Slot {
    fn claim(&self) -> Result<(), CompletionError> {
        if self.settled.swap(true, Ordering::AcqRel) {
            error!(
                target: COMPLETION_TARGET,
                method = %self.method,
                id = ?self.id,
                "request settled more than once; ignoring the later settlement"
            );
            return Err(CompletionError::AlreadySettled {
                method: self.method.clone(),
            });
        }
        Ok(())
    }

    fn deliver(&self, result: Result<Value, MethodError>) -> Result<(), CompletionError> {
        let writer = self
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(id) = self.id.clone() else {
            if let Err(failure) = &result {
                warn!(
                    target: COMPLETION_TARGET,
                    method = %self.method,
                    error = %failure,
                    "notification handler failed"
                );
            }
            return Ok(());
        };

        writer
            .ok_or(OutboundError::Closed)
            .and_then(|outbound| outbound.send(Response::from_result(Some(id), result)))
            .map_err(|_| {
                warn!(
                    target: COMPLETION_TARGET,
                    method = %self.method,
                    "reply dropped: outbound channel closed"
                );
                CompletionError::ChannelClosed {
                    method: self.method.clone(),
                }
            })
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if *self.settled.get_mut() {
            return;
        }
        error!(
            target: COMPLETION_TARGET,
            method = %self.method,
            id = ?self.id,
            "request dropped without a reply"
        );
        let fallback = Err(MethodError::internal(format!(
            "request for '{}' was dropped without a reply",
            self.method
        )));
        if self.deliver(fallback).is_err() {
            debug!(target: COMPLETION_TARGET, "fallback reply not delivered");
        }
    }
}

/// Handle through which an asynchronous handler settles its request.
#[derive(Clone)]
pub struct Completion {
    slot: Arc<Slot>,
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Completion")
            .field("id", &self.slot.id)
            .field("method", &self.slot.method)
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl Completion {
    /// Binds a request to the outbound writer.
    #[must_use]
    pub fn new(id: Option<RequestId>, method: impl Into<String>, outbound: Outbound) -> Self {
        Self {
            slot: Arc::new(Slot {
                id,
                method: method.into(),
                outbound: Mutex::new(Some(outbound)),
                settled: AtomicBool::new(false),
            }),
        }
    }

    /// Identifier of the request; `None` for notifications.
    #[must_use]
    pub fn request_id(&self) -> Option<&RequestId> {
        self.slot.id.as_ref()
    }

    /// Method the request named.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.slot.method
    }

    /// Returns true once any clone has settled the request.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot.settled.load(Ordering::Acquire)
    }

    /// Settles the request with a success value.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::AlreadySettled`] if the request was settled
    /// before, and [`CompletionError::ChannelClosed`] if the writer has gone.
    pub fn reply(&self, value: impl Into<Value>) -> Result<(), CompletionError> {
        self.settle(Ok(value.into()))
    }

    /// Settles the request with a failure.
    ///
    /// # Errors
    ///
    /// As for [`Completion::reply`].
    pub fn reply_error(&self, failure: MethodError) -> Result<(), CompletionError> {
        self.settle(Err(failure))
    }

    /// Settles the request with a handler result.
    ///
    /// # Errors
    ///
    /// As for [`Completion::reply`].
    pub fn settle(&self, result: Result<Value, MethodError>) -> Result<(), CompletionError> {
        self.slot.claim()?;
        self.slot.deliver(result)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use serde_json::json;

    use super::*;
    use crate::protocol::ErrorCode;

    #[test]
    fn reply_emits_one_response() {
        let (outbound, receiver) = Outbound::channel();
        let completion = Completion::new(Some(RequestId::from(3)), "new", outbound);
        completion.reply(json!(1)).expect("first reply");

        let responses = receiver.drain();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, Some(RequestId::from(3)));
        assert_eq!(responses[0].result(), Some(&json!(1)));
    }

    #[test]
    fn second_settlement_is_rejected_and_silent() {
        let (outbound, receiver) = Outbound::channel();
        let completion = Completion::new(Some(RequestId::from(4)), "new", outbound);
        completion.reply(json!(true)).expect("first reply");

        let error = completion.reply(json!(false)).expect_err("second reply");
        assert!(matches!(error, CompletionError::AlreadySettled { .. }));
        let error = completion
            .reply_error(MethodError::handler_failed("late"))
            .expect_err("late failure");
        assert!(matches!(error, CompletionError::AlreadySettled { .. }));

        drop(completion);
        let responses = receiver.drain();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].result(), Some(&json!(true)));
    }

    #[test]
    fn racing_clones_settle_exactly_once() {
        let (outbound, receiver) = Outbound::channel();
        let completion = Completion::new(Some(RequestId::from(5)), "race", outbound);
        let racers: Vec<_> = (0..8)
            .map(|index| {
                let completion = completion.clone();
                thread::spawn(move || completion.reply(json!(index)).is_ok())
            })
            .collect();
        drop(completion);
        let winners = racers
            .into_iter()
            .map(|racer| racer.join().expect("racer thread"))
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(receiver.drain().len(), 1);
    }

    #[test]
    fn dropping_unsettled_answers_with_internal_error() {
        let (outbound, receiver) = Outbound::channel();
        let completion = Completion::new(Some(RequestId::from(6)), "new", outbound);
        let clone = completion.clone();
        drop(completion);
        assert!(receiver.drain().is_empty(), "a clone is still alive");
        drop(clone);

        let responses = receiver.drain();
        assert_eq!(responses.len(), 1);
        let error = responses[0].error().expect("error response");
        assert_eq!(error.code, ErrorCode::InternalError);
        assert!(error.message.contains("dropped without a reply"));
    }

    #[test]
    fn notifications_settle_without_output() {
        let (outbound, receiver) = Outbound::channel();
        let completion = Completion::new(None, "exit", outbound);
        completion
            .reply_error(MethodError::handler_failed("ignored"))
            .expect("notification settles");
        assert!(completion.is_settled());
        drop(completion);
        assert!(receiver.drain().is_empty());
    }

    #[test]
    fn settling_releases_the_writer() {
        let (outbound, writer) = Outbound::spawn(std::io::sink()).expect("spawn writer");
        let completion = Completion::new(Some(RequestId::from(9)), "new", outbound);
        let held = completion.clone();
        completion
            .reply_error(MethodError::shutting_down())
            .expect("first settlement");
        drop(completion);

        assert_eq!(writer.join().expect("writer stops"), 1);
        assert!(held.is_settled());
    }

    #[test]
    fn closed_channel_is_reported() {
        let (outbound, receiver) = Outbound::channel();
        drop(receiver);
        let completion = Completion::new(Some(RequestId::from(7)), "new", outbound);
        let error = completion.reply(json!(1)).expect_err("writer gone");
        assert!(matches!(error, CompletionError::ChannelClosed { .. }));
        assert!(completion.is_settled());
    }
}
