//! WebSocket Transport
//!
//! Axum-based WebSocket adapter: [`WsTransport`] bridges one upgraded
//! socket to a session, and [`WsServer`] serves an endpoint that builds a
//! fresh session per connection from a service factory invoked at upgrade
//! time.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::Error;
use crate::messages::Outbound;
use crate::service::ServiceObject;
use crate::session::{Session, SessionOptions, DEFAULT_OUTBOUND_CAPACITY};
use crate::transport::Transport;

/// Builds the services served to one connection
///
/// Invoked once per accepted socket, before the session starts.
pub type ServiceFactory = Arc<dyn Fn() -> Vec<Arc<dyn ServiceObject>> + Send + Sync>;

/// Transport adapter over one upgraded WebSocket
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    /// Wrap an upgraded socket
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn next_message(&mut self) -> Option<Result<Vec<u8>, Error>> {
        while let Some(message) = self.socket.recv().await {
            match message {
                Ok(WsMessage::Text(text)) => return Some(Ok(text.as_bytes().to_vec())),
                Ok(WsMessage::Binary(data)) => return Some(Ok(data.to_vec())),
                Ok(WsMessage::Close(_)) => return None,
                // Ping/pong stay inside the protocol layer
                Ok(_) => continue,
                Err(err) => return Some(Err(Error::Transport(err.to_string()))),
            }
        }
        None
    }

    async fn send(&mut self, frame: &Outbound) -> Result<(), Error> {
        let json = serde_json::to_string(frame)?;
        self.socket
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|err| Error::Transport(err.to_string()))
    }

    async fn close(&mut self) -> Result<(), Error> {
        let _ = self.socket.send(WsMessage::Close(None)).await;
        Ok(())
    }
}

/// Configuration options for the WebSocket server
#[derive(Debug, Clone)]
pub struct WsServerOptions {
    /// Address to bind the server to
    pub bind_address: SocketAddr,
    /// Path of the WebSocket endpoint
    pub path: String,
    /// Outbound queue capacity of each session
    pub outbound_capacity: usize,
    /// CORS allowed origins; permissive when unset
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for WsServerOptions {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 9000)),
            path: "/ws".to_string(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            allowed_origins: None,
        }
    }
}

/// Shared state of the WebSocket endpoint
#[derive(Clone)]
struct AppState {
    factory: ServiceFactory,
    options: WsServerOptions,
}

/// WebSocket server exposing sessions built from a service factory
pub struct WsServer {
    options: WsServerOptions,
    factory: ServiceFactory,
}

impl WsServer {
    /// Create a server with default options
    pub fn new(
        factory: impl Fn() -> Vec<Arc<dyn ServiceObject>> + Send + Sync + 'static,
    ) -> Self {
        Self::with_options(factory, WsServerOptions::default())
    }

    /// Create a server with the specified options
    pub fn with_options(
        factory: impl Fn() -> Vec<Arc<dyn ServiceObject>> + Send + Sync + 'static,
        options: WsServerOptions,
    ) -> Self {
        Self { options, factory: Arc::new(factory) }
    }

    /// Build the router serving the WebSocket endpoint
    ///
    /// Useful to mount the endpoint into an existing application.
    pub fn router(&self) -> Router {
        let state = AppState { factory: self.factory.clone(), options: self.options.clone() };

        let cors = match &self.options.allowed_origins {
            Some(origins) => {
                let mut layer = CorsLayer::new();
                for origin in origins {
                    match origin.parse::<HeaderValue>() {
                        Ok(value) => layer = layer.allow_origin(value),
                        Err(_) => warn!("Ignoring invalid CORS origin: {origin}"),
                    }
                }
                layer.allow_methods(Any).allow_headers(Any)
            }
            None => CorsLayer::permissive(),
        };

        Router::new()
            .route(&self.options.path, get(ws_handler))
            .layer(Extension(state))
            .layer(cors)
    }

    /// Bind and start serving; returns a handle for shutdown
    pub async fn serve(self) -> Result<WsServerHandle, Error> {
        let listener = tokio::net::TcpListener::bind(&self.options.bind_address).await?;
        let local_addr = listener.local_addr()?;
        let app = self.router();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!("Server error: {err}");
            }
        });

        info!("WebSocket server started at ws://{}{}", local_addr, self.options.path);
        Ok(WsServerHandle { local_addr, shutdown_tx, task })
    }
}

/// Handle for a running server, used for shutdown
pub struct WsServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl WsServerHandle {
    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the server to finish
    pub async fn shutdown(self) -> Result<(), Error> {
        let _ = self.shutdown_tx.send(());
        self.task
            .await
            .map_err(|err| Error::Transport(format!("Server task failed: {err}")))
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serve one accepted socket until it closes
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();

    let services = (state.factory)();
    let options = SessionOptions { outbound_capacity: state.options.outbound_capacity };
    let session = match Session::with_options(services, options) {
        Ok(session) => session,
        Err(err) => {
            error!("Error creating session for connection {connection_id}: {err}");
            return;
        }
    };

    info!("WebSocket client connected: {connection_id}");
    let _disconnect = scopeguard::guard((), move |_| {
        info!("WebSocket client disconnected: {connection_id}");
    });

    if let Err(err) = session.serve(WsTransport::new(socket)).await {
        error!("Session error on connection {connection_id}: {err}");
    }
}
