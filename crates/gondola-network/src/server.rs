//! TCP status and administration endpoint.
//!
//! The server speaks JSON lines (see [`message`](crate::message)). It serves
//! the dashboard's read model and log ring, replaces the gondola registry, and
//! lets external drivers inject events and perception results.
//!
//! # Architecture
//!
//! ```text
//! Dashboard ──┐                      ┌──> SharedState (read model, registry)
//!             ├──> StatusServer ─────┼──> event queue  ──> Driver
//! Driver    ──┘    (one task per     └──> frame queue  ──> VisionBridge
//!                   connection)
//! ```
//!
//! Binding the server marks the web side as ready, which lets the protocol
//! engine leave `WebUiReady`.
//!
//! # Example Usage
//!
//! ```no_run
//! use gondola_engine::{SharedState, StatusPublisher, event_queue};
//! use gondola_network::{ServerContext, StatusServer, StatusServerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (events, _event_rx) = event_queue();
//! let context = ServerContext::new(StatusPublisher::new(SharedState::default()), events);
//!
//! let server = StatusServer::bind(StatusServerConfig::default(), context).await?;
//! println!("Listening on {}", server.local_addr()?);
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::{SinkExt, StreamExt};
use gondola_core::FrameObservation;
use gondola_core::constants::DEFAULT_STATUS_ADDR;
use gondola_engine::{EventSender, StatusPublisher};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, trace, warn};

use crate::message::{Request, Response};

/// Longest accepted request line. Frames carry encoded crops, hence the room.
pub const MAX_REQUEST_LENGTH: usize = 4 * 1024 * 1024;

/// Producer side of the frame queue consumed by the vision bridge.
pub type FrameSender = UnboundedSender<FrameObservation>;

/// Configuration for the status server
#[derive(Debug, Clone)]
pub struct StatusServerConfig {
    /// Address to bind the server to
    pub bind_addr: String,

    /// Maximum number of simultaneous connections
    pub max_connections: usize,
}

impl Default for StatusServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_STATUS_ADDR.to_string(),
            max_connections: 16,
        }
    }
}

/// Errors that can occur during status server operations
#[derive(Debug, Error)]
pub enum StatusServerError {
    /// Failed to bind to address
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error
    #[error("Codec error: {0}")]
    Codec(String),

    /// Response could not be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<LinesCodecError> for StatusServerError {
    fn from(error: LinesCodecError) -> Self {
        match error {
            LinesCodecError::Io(e) => Self::Io(e),
            other => Self::Codec(other.to_string()),
        }
    }
}

/// Everything a connection needs to answer requests.
#[derive(Debug, Clone)]
pub struct ServerContext {
    status: StatusPublisher,
    events: EventSender,
    frames: Option<FrameSender>,
}

impl ServerContext {
    pub fn new(status: StatusPublisher, events: EventSender) -> Self {
        Self {
            status,
            events,
            frames: None,
        }
    }

    /// Accept `frame` requests and forward them to the vision bridge.
    pub fn with_frames(mut self, frames: FrameSender) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn status(&self) -> &StatusPublisher {
        &self.status
    }

    /// Answer one request.
    pub fn handle(&self, request: Request) -> Response {
        match request {
            Request::Status => Response::Status(self.status.snapshot()),
            Request::Logs { limit } => {
                let mut entries = self.status.logs();
                if let Some(limit) = limit {
                    let skip = entries.len().saturating_sub(limit);
                    entries.drain(..skip);
                }
                Response::Logs { entries }
            }
            Request::Gondolas => Response::Gondolas {
                gondolas: self.status.shared().gondolas(),
            },
            Request::SetGondolas { gondolas } => {
                let count = gondolas.len();
                match self.status.shared().replace_gondolas(gondolas) {
                    Ok(report) => {
                        self.status
                            .log(format!("Gondola registry replaced ({count} entries)"));
                        Response::GondolasReplaced {
                            count,
                            duplicates: report.duplicates,
                        }
                    }
                    Err(e) => Response::error(e.to_string()),
                }
            }
            Request::Event { event } => {
                let Some(event) = event.into_event() else {
                    trace!("Event without a recognised type dropped");
                    return Response::Ignored;
                };
                trace!(kind = %event.kind, "Event received over network");
                if self.events.send(event).is_err() {
                    return Response::error("event queue closed");
                }
                Response::Accepted
            }
            Request::Frame { frame } => {
                let Some(frames) = &self.frames else {
                    return Response::error("frame input not enabled");
                };
                if frames.send(frame).is_err() {
                    return Response::error("frame queue closed");
                }
                Response::Accepted
            }
        }
    }
}

/// TCP server for the status endpoint
///
/// Accepts connections and answers requests on a task per connection. A
/// malformed line gets an error response; the connection stays open.
pub struct StatusServer {
    listener: TcpListener,
    context: ServerContext,
    config: StatusServerConfig,
    active: Arc<AtomicUsize>,
}

impl StatusServer {
    /// Bind the server to the configured address and mark the web side ready.
    ///
    /// # Errors
    ///
    /// Returns `StatusServerError::BindFailed` if the address is invalid or
    /// already in use.
    pub async fn bind(
        config: StatusServerConfig,
        context: ServerContext,
    ) -> Result<Self, StatusServerError> {
        info!("Binding status server to {}", config.bind_addr);

        let listener = TcpListener::bind(config.bind_addr.as_str())
            .await
            .map_err(|source| StatusServerError::BindFailed {
                addr: config.bind_addr.clone(),
                source,
            })?;

        let addr = listener.local_addr()?;
        context.status.shared().set_webserver_ready(true);
        context
            .status
            .log(format!("Status endpoint listening on {addr}"));

        Ok(Self {
            listener,
            context,
            config,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, StatusServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Accept connections until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns an error only if the listener socket itself fails.
    pub async fn run(self) -> Result<(), StatusServerError> {
        loop {
            let (stream, addr) = self.listener.accept().await?;

            if self.active.load(Ordering::Relaxed) >= self.config.max_connections {
                warn!(
                    addr = %addr,
                    max_connections = self.config.max_connections,
                    "Connection rejected: maximum connections reached"
                );
                drop(stream);
                continue;
            }

            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
            }

            let context = self.context.clone();
            let active = Arc::clone(&self.active);
            active.fetch_add(1, Ordering::Relaxed);
            debug!("Accepted status connection from {}", addr);

            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, &context).await {
                    error!("Status connection {} failed: {}", addr, e);
                }
                active.fetch_sub(1, Ordering::Relaxed);
                debug!("Status connection {} closed", addr);
            });
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    context: &ServerContext,
) -> Result<(), StatusServerError> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_REQUEST_LENGTH));

    while let Some(line) = framed.next().await {
        let response = match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => match serde_json::from_str::<Request>(&line) {
                Ok(request) => context.handle(request),
                Err(e) => Response::error(format!("invalid request: {e}")),
            },
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                Response::error("request line too long")
            }
            Err(e) => return Err(e.into()),
        };

        framed.send(serde_json::to_string(&response)?).await?;
    }
    Ok(())
}
