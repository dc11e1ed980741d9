//! API server lifecycle.
//!
//! Bind, spawn the axum server in a background task, and return a handle
//! with a shutdown channel. [`serve`] is the foreground variant used by the
//! CLI and stops on Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::api::router::api_router;
use crate::pipeline::processor::DocumentProcessor;

/// Handle to a running background server.
pub struct ApiServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl ApiServer {
    /// Signal shutdown. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }

    /// Signal shutdown and wait for in-flight requests to finish.
    pub async fn stop(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Start the server on `addr` (port 0 picks an ephemeral port).
pub async fn start_server_on(
    processor: Arc<DocumentProcessor>,
    addr: SocketAddr,
) -> std::io::Result<ApiServer> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    let app = api_router(processor);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }
        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

/// Serve in the foreground until Ctrl-C.
pub async fn serve(processor: Arc<DocumentProcessor>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, api_router(processor))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {e}");
            }
            tracing::info!("Shutting down");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::catalogue::FieldCatalogue;
    use crate::config::ExtractionConfig;

    fn processor() -> Arc<DocumentProcessor> {
        Arc::new(DocumentProcessor::new(
            FieldCatalogue::from_entries(vec![]),
            None,
            ExtractionConfig::default(),
        ))
    }

    async fn raw_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn start_and_stop_server() {
        let server = start_server_on(processor(), SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("server should start");
        assert!(server.addr.port() > 0);

        let response = raw_get(server.addr, "/healthcheck").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("healthy"));

        server.stop().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let mut server = start_server_on(processor(), SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("server should start");
        server.shutdown();
        server.shutdown();
    }
}
