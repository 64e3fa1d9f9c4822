//! Per-Connection Session
//!
//! This module implements the session state machine that sits between a
//! transport and the service registry. Inbound frames are classified as
//! parse failures, protocol violations, results for local calls, or
//! requests; requests are dispatched on their own tasks so a slow handler
//! never blocks the reader, and everything outbound funnels through one
//! bounded queue drained by the transport writer.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::errors::{error_codes, Error};
use crate::messages::{ErrorObject, Frame, Outbound, Request, Response, JSONRPC_VERSION};
use crate::pending::{CallSlot, IdSequence, PendingCalls};
use crate::registry::ServiceRegistry;
use crate::service::ServiceObject;
use crate::transport::Transport;

/// Default capacity of the outbound frame queue
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 32;

/// Configuration options for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Capacity of the outbound queue; producers block when it is full
    pub outbound_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { outbound_capacity: DEFAULT_OUTBOUND_CAPACITY }
    }
}

/// One JSON-RPC session over one transport connection
///
/// Holds the registry view, the outbound queue, the id sequence, and the
/// pending-call table. Services are fixed at construction.
pub struct Session {
    registry: ServiceRegistry,
    outbound_tx: mpsc::Sender<Outbound>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Outbound>>>,
    pending: PendingCalls,
    ids: IdSequence,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session serving the given instances, with default options
    pub fn new(services: Vec<Arc<dyn ServiceObject>>) -> Result<Arc<Self>, Error> {
        Self::with_options(services, SessionOptions::default())
    }

    /// Create a session serving the given instances
    pub fn with_options(
        services: Vec<Arc<dyn ServiceObject>>,
        options: SessionOptions,
    ) -> Result<Arc<Self>, Error> {
        if services.is_empty() {
            return Err(Error::Registration("At least one service is required".to_string()));
        }

        let registry = ServiceRegistry::new();
        for service in services {
            registry.add_service(service)?;
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(options.outbound_capacity);
        Ok(Arc::new(Self {
            registry,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            pending: PendingCalls::new(),
            ids: IdSequence::new(),
        }))
    }

    /// The session's service registry
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Number of local calls still awaiting results
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Send a JSON-RPC request to the peer
    ///
    /// Returns a slot that resolves with the peer's result. The slot is
    /// registered before the request is enqueued, so a reply can never
    /// arrive ahead of its registration.
    pub async fn call_method(
        &self,
        method: &str,
        params: impl Serialize,
    ) -> Result<CallSlot, Error> {
        let params = serde_json::to_value(params)?;
        let id = self.ids.next();
        let (slot_tx, slot_rx) = oneshot::channel();
        self.pending.register(id, slot_tx);

        let request = Request::new(method, params, Some(id));
        if self.outbound_tx.send(Outbound::Request(request)).await.is_err() {
            self.pending.take(id);
            return Err(Error::Transport("Session is closed".to_string()));
        }
        Ok(CallSlot::new(id, slot_rx))
    }

    /// Send a JSON-RPC event to the peer; no id, no reply
    pub async fn send_event(&self, method: &str, params: impl Serialize) -> Result<(), Error> {
        let params = serde_json::to_value(params)?;
        let request = Request::new(method, params, None);
        if self.outbound_tx.send(Outbound::Request(request)).await.is_err() {
            return Err(Error::Transport("Session is closed".to_string()));
        }
        Ok(())
    }

    /// Run the session over a transport until the connection ends
    ///
    /// Each inbound message is dispatched on its own task; outbound frames
    /// are written by this loop as the queue yields them. On end of stream
    /// the queue stops accepting frames, in-flight handlers are drained,
    /// and every pending call is cancelled.
    pub async fn serve<T: Transport>(self: Arc<Self>, mut transport: T) -> Result<(), Error> {
        let mut outbound_rx = self
            .outbound_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::Transport("Session is already serving".to_string()))?;

        enum Step {
            Inbound(Option<Result<Vec<u8>, Error>>),
            Outbound(Option<Outbound>),
        }

        let mut handlers = JoinSet::new();
        loop {
            let step = tokio::select! {
                inbound = transport.next_message() => Step::Inbound(inbound),
                frame = outbound_rx.recv() => Step::Outbound(frame),
            };

            match step {
                Step::Inbound(Some(Ok(raw))) => {
                    handlers.spawn(Arc::clone(&self).process_message(raw));
                }
                Step::Inbound(Some(Err(err))) => {
                    error!("Transport read error: {err}");
                    break;
                }
                Step::Inbound(None) => break,
                Step::Outbound(Some(frame)) => {
                    if let Err(err) = transport.send(&frame).await {
                        error!("Transport write error: {err}");
                        break;
                    }
                }
                Step::Outbound(None) => break,
            }
        }

        outbound_rx.close();
        while handlers.join_next().await.is_some() {}
        self.pending.cancel_all();
        transport.close().await
    }

    /// Dispatch one inbound message and queue its response, if any
    async fn process_message(self: Arc<Self>, raw: Vec<u8>) {
        if let Some(response) = self.handle_message(&raw).await {
            if self.outbound_tx.send(Outbound::Response(response)).await.is_err() {
                debug!("Session closed before a response could be queued");
            }
        }
    }

    /// Classify and handle one inbound message
    ///
    /// Returns the response to send back, or `None` for events and result
    /// frames.
    async fn handle_message(&self, raw: &[u8]) -> Option<Response> {
        let mut frame: Frame = match serde_json::from_slice(raw) {
            Ok(frame) => frame,
            Err(_) => {
                return Some(Response::error(
                    ErrorObject::new(error_codes::PARSE_ERROR, "Parse Error"),
                    Value::Null,
                ))
            }
        };

        if frame.jsonrpc != JSONRPC_VERSION {
            return Some(
                frame.error_response(error_codes::INVALID_REQUEST, "Invalid JSONRPC Version"),
            );
        }

        if frame.params.is_some() && frame.result.is_some() {
            return Some(frame.error_response(
                error_codes::INVALID_REQUEST,
                "Message can't have both 'params' and 'result' present",
            ));
        }

        if let Some(result) = frame.result.take() {
            self.deliver_result(frame.id.take(), result);
            return None;
        }

        self.handle_request(frame).await
    }

    /// Dispatch a request or event to the registry
    async fn handle_request(&self, frame: Frame) -> Option<Response> {
        let id = frame.id.unwrap_or(Value::Null);
        let method = frame.method.unwrap_or_default();

        match self.registry.call_method(&method, frame.params).await {
            Ok(Some(result)) => Some(Response::result(id, result)),
            Ok(None) => None,
            Err(Error::Rpc(err)) => Some(Response::error(err, id)),
            Err(err) => Some(Response::error(
                ErrorObject::new(error_codes::INTERNAL_ERROR, err.to_string()),
                id,
            )),
        }
    }

    /// Route an inbound result to the pending call that issued it
    ///
    /// Unmatched results are logged and dropped; there is no counterpart
    /// to inform on the wire.
    fn deliver_result(&self, id: Option<Value>, result: Value) {
        let Some(id) = id else {
            warn!("Result with null id received");
            return;
        };
        let Some(id) = id.as_i64() else {
            warn!("Result id must be an integer: {id}");
            return;
        };
        match self.pending.take(id) {
            Some(slot) => {
                let _ = slot.send(result);
            }
            None => warn!("No previous request found for result.id:{id}"),
        }
    }
}
