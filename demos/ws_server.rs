//! Minimal WebSocket JSON-RPC server
//!
//! Serves a greeter service on `ws://127.0.0.1:9000/ws`. Try it with a
//! WebSocket client:
//!
//! ```text
//! {"jsonrpc": "2.0", "method": "GreeterService.Hello", "params": {"name": "world", "times": 2}, "id": 1}
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use wsrpc::{Error, MethodDef, Param, ServiceObject, WsServer};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Greeting {
    name: String,
    times: i64,
}

impl Param for Greeting {
    const OBJECT: bool = true;
}

#[derive(Default)]
struct GreeterService;

impl GreeterService {
    fn hello(&self, greeting: Greeting) -> Result<String, Error> {
        if greeting.times <= 0 {
            return Err(Error::rpc(1, "times must be positive"));
        }
        Ok(format!("{}{}", "hello ".repeat(greeting.times as usize), greeting.name))
    }
}

impl ServiceObject for GreeterService {
    fn describe(self: Arc<Self>) -> Vec<MethodDef> {
        vec![
            MethodDef::call("ApiHello", {
                let svc = self.clone();
                move |(greeting,): (Greeting,)| {
                    let svc = svc.clone();
                    async move { svc.hello(greeting) }
                }
            }),
            MethodDef::event("ApiLog", |(line,): (String,)| async move {
                info!("client says: {line}");
            }),
        ]
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let server =
        WsServer::new(|| vec![Arc::new(GreeterService::default()) as Arc<dyn ServiceObject>]);
    let handle = server.serve().await?;
    info!("Greeter ready at ws://{}/ws", handle.local_addr());

    tokio::signal::ctrl_c().await?;
    handle.shutdown().await
}
