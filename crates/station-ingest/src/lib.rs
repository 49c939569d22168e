//! Telemetry ingestion for personal weather stations.
//!
//! Three channels feed one canonical event stream: a local UDP
//! broadcast listener, a persistent cloud WebSocket stream, and a
//! polled cloud query client. The [`Orchestrator`] owns all three,
//! ranks them per event according to the configured
//! [`ConnectionMode`], and fans the published telemetry out to
//! registered listeners.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod query;
pub mod stream;

#[cfg(test)]
mod testutil;

pub use broadcast::BroadcastListener;
pub use config::{ConnectionMode, IngestConfig};
pub use error::{IngestError, Result};
pub use events::{ActiveSource, Channel, ChannelEvents, EventBus};
pub use orchestrator::Orchestrator;
pub use query::CloudQueryClient;
pub use stream::CloudStreamClient;
