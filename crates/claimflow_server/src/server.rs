//! The claims HTTP server.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{HandlerContext, RequestHandler};
use crate::routes;
use axum::Router;
use claimflow_core::RecordStore;
use claimflow_queue::QueueTransport;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// The claims HTTP server.
///
/// Submissions are published through the transport; reads and status updates
/// go to the record store shared with the queue consumer.
///
/// # Example
///
/// ```rust,ignore
/// use claimflow_server::{ClaimServer, ServerConfig};
///
/// let server = ClaimServer::new(ServerConfig::default(), store, broker);
/// server.serve(async { tokio::signal::ctrl_c().await.ok(); }).await?;
/// ```
pub struct ClaimServer {
    handler: Arc<RequestHandler>,
    context: Arc<HandlerContext>,
}

impl ClaimServer {
    /// Creates a server over a store and a queue transport.
    pub fn new(
        config: ServerConfig,
        store: Arc<RecordStore>,
        transport: Arc<dyn QueueTransport>,
    ) -> Self {
        let context = Arc::new(HandlerContext::new(config, store, transport));
        let handler = Arc::new(RequestHandler::new(Arc::clone(&context)));

        Self { handler, context }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Builds the router, for embedding or testing.
    pub fn router(&self) -> Router {
        routes::router(Arc::clone(&self.handler))
    }

    /// Binds `config.bind_addr` and serves until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.context.config.bind_addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    ///
    /// In-flight requests complete before this returns.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(%addr, queue = %self.context.config.queue, "claims API listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("claims API stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimflow_core::ClaimFields;
    use claimflow_queue::MemoryBroker;
    use claimflow_testkit::TestStore;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn serves_until_shutdown() {
        let store = TestStore::new();
        store
            .append_record(ClaimFields::new("A1", "X", 100.0, "d1"))
            .unwrap();
        let broker: Arc<dyn QueueTransport> = Arc::new(MemoryBroker::new());
        let server = ClaimServer::new(ServerConfig::default(), store.shared(), broker);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(server.serve_on(listener, async {
            stop_rx.await.ok();
        }));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /claims/A1 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"id\":\"A1\""));

        stop_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
