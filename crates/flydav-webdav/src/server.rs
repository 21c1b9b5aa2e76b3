//! HTTP server lifecycle management.
//!
//! Binds a listener, serves every connection on its own task and hands
//! each request to the [`Dispatcher`].

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use hyper::Request;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 = auto-assign).
    pub port: u16,
    /// Bind address.
    pub bind_address: IpAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

impl ServerConfig {
    /// Listener settings from the `[server]` section.
    pub fn from_config(config: &Config) -> Result<Self, std::io::Error> {
        let bind_address = config.server.host.parse().map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid bind address: {}", config.server.host),
            )
        })?;
        Ok(Self {
            port: config.server.port,
            bind_address,
        })
    }
}

/// A running server instance.
pub struct WebDavServer {
    /// The actual bound address.
    pub addr: SocketAddr,
    mount_prefix: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl WebDavServer {
    /// Bind and start serving.
    pub async fn start(
        dispatcher: Dispatcher,
        config: ServerConfig,
    ) -> Result<Self, std::io::Error> {
        let addr = SocketAddr::new(config.bind_address, config.port);
        let listener = TcpListener::bind(addr).await?;
        let actual_addr = listener.local_addr()?;
        let mount_prefix = dispatcher.mount_prefix().to_string();

        info!(addr = %actual_addr, prefix = %mount_prefix, "Starting flydav server");

        let dispatcher = Arc::new(dispatcher);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server_handle = tokio::spawn(async move {
            tokio::select! {
                () = run_server(listener, dispatcher) => {
                    debug!("Server loop ended");
                }
                _ = shutdown_rx => {
                    info!("Received shutdown signal");
                }
            }
        });

        Ok(Self {
            addr: actual_addr,
            mount_prefix,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Base URL of the mount, without a trailing slash.
    pub fn url(&self) -> String {
        let prefix = self.mount_prefix.trim_end_matches('/');
        format!("http://{}{prefix}", self.addr)
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
        info!("flydav server stopped");
    }

    fn stop_sync(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for WebDavServer {
    fn drop(&mut self) {
        self.stop_sync();
    }
}

async fn run_server(listener: TcpListener, dispatcher: Arc<Dispatcher>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req: Request<Incoming>| {
                        let dispatcher = Arc::clone(&dispatcher);
                        async move { Ok::<_, Infallible>(dispatcher.handle(req).await) }
                    });

                    if let Err(e) = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await
                    {
                        warn!(peer = %peer_addr, error = %e, "HTTP connection error");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
