//! TCP server driving one dispatcher per connection

use crate::codec::HttpCodec;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use switchyard_dispatch::{ConnectionId, Outbox};
use switchyard_http::HttpRouter;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to bind to {address}: {reason}\n\nTroubleshooting:\n  • Check if another process is using this port: lsof -i :{port}\n  • Try using a different address or port")]
    BindError {
        address: String,
        port: u16,
        reason: String,
    },
}

impl ServerError {
    /// The peer went away mid-exchange: reset, broken pipe or a request cut short.
    ///
    /// These are client noise, not server faults.
    pub fn is_bad_client(&self) -> bool {
        match self {
            ServerError::IoError(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            ServerError::BindError { .. } => false,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_head_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_head_bytes: 8192,
        }
    }
}

/// HTTP server routing every connection through one router
pub struct HttpServer {
    config: ServerConfig,
    router: HttpRouter,
}

impl HttpServer {
    pub fn new(config: ServerConfig, router: HttpRouter) -> Self {
        Self { config, router }
    }

    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| ServerError::BindError {
                address: self.config.bind_addr.ip().to_string(),
                port: self.config.bind_addr.port(),
                reason: e.to_string(),
            })
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn start(&self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from `listener` until `shutdown` resolves.
    ///
    /// Connections still open at shutdown are torn down; each closes once its
    /// current event is handled.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        info!("HTTP server listening on {}", local_addr);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    let closed = self.router.connections().teardown_all();
                    info!("HTTP server on {} shutting down, closed {} connection(s)", local_addr, closed);
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => {
                        debug!("Accepted connection from {}", peer_addr);
                        let router = self.router.clone();
                        let max_head_bytes = self.config.max_head_bytes;
                        tokio::spawn(async move {
                            match handle_connection(socket, peer_addr, router, max_head_bytes).await {
                                Ok(()) => {}
                                Err(e) if e.is_bad_client() => {
                                    debug!("Bad client {}: {}", peer_addr, e);
                                }
                                Err(e) => {
                                    error!("Failed to handle connection from {}: {}", peer_addr, e);
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }
    }
}

/// Feed one connection's requests through its dispatcher and write back the
/// responses produced for each event.
async fn handle_connection(
    socket: TcpStream,
    peer_addr: SocketAddr,
    router: HttpRouter,
    max_head_bytes: usize,
) -> Result<(), ServerError> {
    let id = ConnectionId::new();
    let mut dispatcher = router.connect(id);
    let mut framed = Framed::new(socket, HttpCodec::new(max_head_bytes));
    let mut outbox = Outbox::new();

    debug!("Connection {} opened for {}", id, peer_addr);

    while let Some(event) = framed.next().await {
        let event = event?;
        let dispatched = dispatcher.dispatch(event, &mut outbox);

        for response in outbox.drain() {
            framed.feed(response).await?;
        }
        framed.flush().await?;

        if let Err(e) = dispatched {
            warn!("Closing connection {} from {}: {}", id, peer_addr, e);
            break;
        }
        if outbox.should_close() {
            debug!("Closing connection {} from {} after response", id, peer_addr);
            break;
        }
    }

    dispatcher.teardown();
    debug!("Connection {} closed", id);
    Ok(())
}
