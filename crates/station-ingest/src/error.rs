//! Error types for the ingestion crate.

use thiserror::Error;

/// Errors that can occur inside the ingestion channels.
///
/// These never cross the orchestrator's public boundary: every public
/// operation catches them, logs, raises an error notification, and
/// returns a `false`/empty/`None` result instead.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{0} requires an access token")]
    MissingCredential(String),

    #[error("no station selected")]
    NoStationSelected,

    #[error("all ingestion channels failed to start")]
    AllChannelsFailed,

    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("not connected to the cloud stream")]
    NotConnected,
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;
