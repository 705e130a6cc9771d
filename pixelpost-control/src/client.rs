use std::{path::Path, time::Duration};

use tokio::net::UnixStream;
use tracing::debug;

use crate::{
    ControlError, Request, RequestCommand, Response, ResponsePayload, Result,
    protocol::{read_frame, write_frame},
};

/// One connection per request; the server closes after answering.
#[derive(Debug, Clone)]
pub struct ControlClient {
    socket_path: String,
    token: Option<String>,
    timeout: Duration,
}

impl ControlClient {
    #[must_use]
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach `token` to every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Send `command` with the configured token.
    ///
    /// # Errors
    ///
    /// See [`Self::send_request`].
    pub async fn send(&self, command: RequestCommand) -> Result<Response> {
        let request = match &self.token {
            Some(token) => Request::with_token(command, token.clone()),
            None => Request::new(command),
        };
        self.send_request(request).await
    }

    /// Send a request and wait for the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails, the exchange times out, the
    /// server speaks another protocol version, or it answers with an error.
    pub async fn send_request(&self, request: Request) -> Result<Response> {
        tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| ControlError::Timeout)?
    }

    async fn exchange(&self, request: Request) -> Result<Response> {
        debug!("Connecting to control socket: {}", self.socket_path);
        let mut stream = UnixStream::connect(&self.socket_path).await?;

        write_frame(&mut stream, &request).await?;
        let response: Response = read_frame(&mut stream).await?;

        if !response.is_version_compatible() {
            return Err(ControlError::Protocol(format!(
                "Incompatible protocol version: server={}, client={}",
                response.version,
                crate::PROTOCOL_VERSION
            )));
        }

        if let ResponsePayload::Error(message) = response.payload {
            return Err(ControlError::ServerError(message));
        }

        Ok(response)
    }

    /// # Errors
    ///
    /// Returns an error if nothing exists at the socket path.
    pub fn check_socket_exists(&self) -> Result<()> {
        if Path::new(&self.socket_path).exists() {
            Ok(())
        } else {
            Err(ControlError::InvalidSocketPath(self.socket_path.clone()))
        }
    }
}
