//! Transport Contract
//!
//! This module defines the boundary between a session and the
//! bidirectional byte transport that carries its frames. The session
//! consumes one byte payload per inbound message and hands typed outbound
//! frames to the transport for serialization and delivery.

use async_trait::async_trait;

use crate::errors::Error;
use crate::messages::Outbound;

pub mod ws;

pub use ws::{WsServer, WsServerHandle, WsServerOptions, WsTransport};

/// A message-oriented bidirectional transport
///
/// `next_message` must be cancel safe: the session polls it concurrently
/// with its outbound queue and drops the in-flight read when a frame needs
/// writing.
#[async_trait]
pub trait Transport: Send {
    /// Receive the next inbound message; `None` signals end of stream
    async fn next_message(&mut self) -> Option<Result<Vec<u8>, Error>>;

    /// Serialize and transmit one outbound frame
    async fn send(&mut self, frame: &Outbound) -> Result<(), Error>;

    /// Terminate the transport; idempotent
    async fn close(&mut self) -> Result<(), Error>;
}
