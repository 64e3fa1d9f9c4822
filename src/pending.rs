//! Pending Call Tracking
//!
//! This module correlates locally issued calls with the results the peer
//! sends back. Each call gets a monotonically increasing id and a
//! single-shot slot; delivery removes the slot, and session teardown drops
//! every remaining sender so awaiting callers unblock as cancelled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::errors::Error;

/// Correlation-id sequence, scoped to one session
pub(crate) struct IdSequence(AtomicI64);

impl IdSequence {
    pub(crate) fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    /// Next unused id
    pub(crate) fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Map from correlation id to the slot awaiting that result
#[derive(Default)]
pub(crate) struct PendingCalls {
    slots: RwLock<HashMap<i64, oneshot::Sender<Value>>>,
}

impl PendingCalls {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a slot under an id; must happen before the request is
    /// enqueued so a fast reply cannot race the registration
    pub(crate) fn register(&self, id: i64, slot: oneshot::Sender<Value>) {
        self.slots.write().unwrap().insert(id, slot);
    }

    /// Atomically remove and return the slot for an id
    pub(crate) fn take(&self, id: i64) -> Option<oneshot::Sender<Value>> {
        self.slots.write().unwrap().remove(&id)
    }

    /// Number of calls still awaiting results
    pub(crate) fn len(&self) -> usize {
        self.slots.read().unwrap().len()
    }

    /// Drop every remaining slot, cancelling its awaiting caller
    pub(crate) fn cancel_all(&self) {
        self.slots.write().unwrap().clear();
    }
}

/// The receiving end of one pending call
///
/// Holds the correlation id of the request and resolves at most once, with
/// the raw JSON `result` the peer sent back.
pub struct CallSlot {
    id: i64,
    receiver: oneshot::Receiver<Value>,
}

impl std::fmt::Debug for CallSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSlot").field("id", &self.id).finish_non_exhaustive()
    }
}

impl CallSlot {
    pub(crate) fn new(id: i64, receiver: oneshot::Receiver<Value>) -> Self {
        Self { id, receiver }
    }

    /// Correlation id of the outbound request
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Wait for the matching result
    ///
    /// Resolves with the raw result value, or [`Error::Cancelled`] when the
    /// session is torn down before the peer answers. Timeouts are the
    /// caller's responsibility.
    pub async fn result(self) -> Result<Value, Error> {
        self.receiver.await.map_err(|_| Error::Cancelled)
    }
}
