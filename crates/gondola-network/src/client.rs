//! Client for the status endpoint.
//!
//! Used by external drivers and tooling to query the controller and inject
//! events. Each call sends one request line and waits for one response line.
//!
//! # Example Usage
//!
//! ```no_run
//! use gondola_network::{Request, Response, StatusClient, StatusClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = StatusClient::new(StatusClientConfig {
//!     server_addr: "127.0.0.1:5000".parse()?,
//!     ..StatusClientConfig::default()
//! });
//! client.connect().await?;
//!
//! if let Response::Status(snapshot) = client.request(&Request::Status).await? {
//!     println!("Engine state: {}", snapshot.state);
//! }
//! client.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Timeout Handling
//!
//! Connect, send and receive each have the configured timeout (default
//! 3000ms). Timeouts are returned to the caller; the client never retries.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, info, trace, warn};

use crate::message::{Request, Response};
use crate::server::MAX_REQUEST_LENGTH;

/// Configuration for the status client
#[derive(Debug, Clone)]
pub struct StatusClientConfig {
    /// Server address to connect to
    pub server_addr: SocketAddr,

    /// Timeout for all I/O operations (connect, send, recv)
    pub timeout: Duration,
}

impl Default for StatusClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 5000)),
            timeout: Duration::from_millis(3000),
        }
    }
}

/// Errors that can occur during status client operations
#[derive(Debug, Error)]
pub enum StatusClientError {
    /// Client is not connected to server
    #[error("Not connected to server")]
    NotConnected,

    /// Connection attempt timed out
    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    /// Read operation timed out
    #[error("Read timeout after {0}ms")]
    ReadTimeout(u64),

    /// Write operation timed out
    #[error("Write timeout after {0}ms")]
    WriteTimeout(u64),

    /// Connection was lost during operation
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error
    #[error("Codec error: {0}")]
    Codec(String),

    /// Response line was not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<LinesCodecError> for StatusClientError {
    fn from(error: LinesCodecError) -> Self {
        match error {
            LinesCodecError::Io(e) => Self::Io(e),
            other => Self::Codec(other.to_string()),
        }
    }
}

/// JSON-lines client for the status endpoint
pub struct StatusClient {
    server_addr: SocketAddr,
    framed: Option<Framed<TcpStream, LinesCodec>>,
    timeout: Duration,
}

impl StatusClient {
    /// Create a new client. Call `connect()` before sending requests.
    ///
    /// # Example
    ///
    /// ```
    /// use gondola_network::{StatusClient, StatusClientConfig};
    ///
    /// let client = StatusClient::new(StatusClientConfig::default());
    /// assert!(!client.is_connected());
    /// ```
    pub fn new(config: StatusClientConfig) -> Self {
        debug!("Creating status client for {}", config.server_addr);

        Self {
            server_addr: config.server_addr,
            framed: None,
            timeout: config.timeout,
        }
    }

    /// Connect to the status endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the connection times out or is refused.
    pub async fn connect(&mut self) -> Result<(), StatusClientError> {
        info!("Connecting to status endpoint at {}", self.server_addr);

        let stream =
            match tokio::time::timeout(self.timeout, TcpStream::connect(self.server_addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    warn!("Connection timeout after {}ms", self.timeout.as_millis());
                    return Err(StatusClientError::ConnectionTimeout(
                        self.timeout.as_millis() as u64,
                    ));
                }
            };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        self.framed = Some(Framed::new(
            stream,
            LinesCodec::new_with_max_length(MAX_REQUEST_LENGTH),
        ));
        Ok(())
    }

    /// Send one request and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not connected, an operation times
    /// out, the server closes the connection, or the response is not JSON.
    pub async fn request(&mut self, request: &Request) -> Result<Response, StatusClientError> {
        let line = serde_json::to_string(request)?;
        self.send_line(line).await?;
        let reply = self.recv_line().await?;
        Ok(serde_json::from_str(&reply)?)
    }

    /// Send a raw line. Useful for talking to the server without the typed
    /// request vocabulary.
    pub async fn send_line(&mut self, line: String) -> Result<(), StatusClientError> {
        let framed = self.framed.as_mut().ok_or(StatusClientError::NotConnected)?;
        trace!(%line, "Sending request");

        match tokio::time::timeout(self.timeout, framed.send(line)).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(StatusClientError::WriteTimeout(
                self.timeout.as_millis() as u64,
            )),
        }
    }

    /// Wait for the next response line.
    pub async fn recv_line(&mut self) -> Result<String, StatusClientError> {
        let framed = self.framed.as_mut().ok_or(StatusClientError::NotConnected)?;

        match tokio::time::timeout(self.timeout, framed.next()).await {
            Ok(Some(Ok(line))) => {
                trace!(%line, "Received response");
                Ok(line)
            }
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(None) => Err(StatusClientError::ConnectionLost(
                "Server closed connection".to_string(),
            )),
            Err(_) => Err(StatusClientError::ReadTimeout(
                self.timeout.as_millis() as u64,
            )),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Close the connection. Idempotent.
    pub async fn close(&mut self) -> Result<(), StatusClientError> {
        if let Some(framed) = self.framed.take() {
            debug!("Closing connection to {}", self.server_addr);
            let mut stream = framed.into_inner();
            let shutdown_timeout = Duration::from_millis(500);
            match tokio::time::timeout(shutdown_timeout, stream.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Error during shutdown: {}", e),
                Err(_) => warn!(
                    "Shutdown timeout during close ({}ms)",
                    shutdown_timeout.as_millis()
                ),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_without_connection() {
        let mut client = StatusClient::new(StatusClientConfig::default());
        let result = client.request(&Request::Status).await;
        assert!(matches!(result, Err(StatusClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut client = StatusClient::new(StatusClientConfig::default());
        client.close().await.unwrap();
        client.close().await.unwrap();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = StatusClient::new(StatusClientConfig {
            server_addr: addr,
            timeout: Duration::from_millis(500),
        });
        assert!(client.connect().await.is_err());
        assert!(!client.is_connected());
    }
}
