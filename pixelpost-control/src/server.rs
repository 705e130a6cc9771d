#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use pixelpost_common::Signal;
use tokio::{
    net::{UnixListener, UnixStream},
    sync::broadcast,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    ControlError, Request, Response, Result,
    protocol::{read_frame, write_frame},
};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Answers decoded control requests.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// An `Err` is sent back to the client as an error response.
    async fn handle_request(&self, request: Request) -> Result<Response>;
}

/// Serves the control protocol on a Unix domain socket.
pub struct ControlServer {
    socket_path: String,
    handler: Arc<dyn CommandHandler>,
}

impl ControlServer {
    #[must_use]
    pub fn new(socket_path: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            socket_path: socket_path.into(),
            handler,
        }
    }

    #[must_use]
    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Accept connections until a shutdown signal arrives, then remove the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if another live instance owns the socket, or the
    /// socket cannot be bound.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<()> {
        let socket_path = Path::new(&self.socket_path);
        if socket_path.exists() {
            if UnixStream::connect(socket_path).await.is_ok() {
                return Err(ControlError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    format!("Socket already in use by running instance: {}", self.socket_path),
                )));
            }

            info!("Replacing stale control socket at {}", self.socket_path);
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        #[cfg(unix)]
        {
            let mut perms = tokio::fs::metadata(&self.socket_path).await?.permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(&self.socket_path, perms).await?;
        }
        info!("Control socket listening on {} (mode 0600)", self.socket_path);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let handler = Arc::clone(&self.handler);
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, handler).await {
                                    error!("Control connection failed: {e}");
                                }
                            });
                        }
                        Err(e) => error!("Error accepting control connection: {e}"),
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => info!("Control server shutting down"),
                        Err(e) => error!("Control server shutdown channel error: {e}"),
                    }
                    break;
                }
            }
        }

        if socket_path.exists() {
            debug!("Control socket {} removed", self.socket_path);
            if let Err(e) = tokio::fs::remove_file(socket_path).await {
                warn!("Failed to remove socket file {}: {e}", self.socket_path);
            }
        }

        Ok(())
    }

    async fn handle_connection(mut stream: UnixStream, handler: Arc<dyn CommandHandler>) -> Result<()> {
        let request: Request = tokio::time::timeout(CONNECTION_TIMEOUT, read_frame(&mut stream))
            .await
            .map_err(|_| ControlError::Timeout)??;

        trace!(command = ?request.command, "Received control request");

        let response = if request.is_version_compatible() {
            match handler.handle_request(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Control command failed: {e}");
                    Response::error(e.to_string())
                }
            }
        } else {
            Response::error(format!(
                "Incompatible protocol version: client={}, server={}",
                request.version,
                crate::PROTOCOL_VERSION
            ))
        };

        trace!(success = response.is_success(), "Sending control response");

        tokio::time::timeout(CONNECTION_TIMEOUT, write_frame(&mut stream, &response))
            .await
            .map_err(|_| ControlError::Timeout)??;

        Ok(())
    }
}
