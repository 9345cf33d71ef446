//! Network layer for the gondola controller
//!
//! This crate exposes the controller's read model and administrative
//! interface over TCP, one JSON object per line.
//!
//! # Components
//!
//! - **StatusServer**: serves status, logs and the gondola registry, and
//!   accepts events and perception frames from external drivers
//! - **StatusClient**: request/response client for the same endpoint
//!
//! # Example
//!
//! ```no_run
//! use gondola_network::{Request, StatusClient, StatusClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = StatusClient::new(StatusClientConfig::default());
//! client.connect().await?;
//! let response = client.request(&Request::Gondolas).await?;
//! println!("{response:?}");
//! # Ok(())
//! # }
//! ```

mod client;
pub mod message;
mod server;

pub use client::{StatusClient, StatusClientConfig, StatusClientError};
pub use message::{Request, Response};
pub use server::{
    FrameSender, MAX_REQUEST_LENGTH, ServerContext, StatusServer, StatusServerConfig,
    StatusServerError,
};
