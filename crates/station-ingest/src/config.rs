//! Ingestion configuration: connection mode and channel endpoints.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which ingestion channels the orchestrator runs, and how broadcast
/// events rank against the cloud stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// Only the local broadcast listener runs.
    #[default]
    LocalOnly,
    /// Cloud stream preferred; broadcast events pass through only
    /// while the stream is disconnected.
    CloudWithLocalFallback,
    /// Only the cloud stream publishes. Requires a credential and a
    /// selected station.
    CloudOnly,
}

impl ConnectionMode {
    /// Whether this mode cannot start without an access token.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, ConnectionMode::LocalOnly)
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionMode::LocalOnly => "local-only",
            ConnectionMode::CloudWithLocalFallback => "cloud-with-local-fallback",
            ConnectionMode::CloudOnly => "cloud-only",
        };
        f.write_str(name)
    }
}

impl FromStr for ConnectionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local-only" | "local" => Ok(ConnectionMode::LocalOnly),
            "cloud-with-local-fallback" | "fallback" => Ok(ConnectionMode::CloudWithLocalFallback),
            "cloud-only" | "cloud" => Ok(ConnectionMode::CloudOnly),
            other => Err(format!("unknown connection mode: {other}")),
        }
    }
}

/// Configuration for the connection orchestrator.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Connection mode the orchestrator starts in.
    pub mode: ConnectionMode,
    /// Cloud access token, if any.
    pub access_token: Option<String>,
    /// Well-known local port the hub broadcasts on.
    pub broadcast_port: u16,
    /// Cloud stream endpoint (token appended as a query parameter).
    pub stream_url: String,
    /// Cloud query endpoint base.
    pub query_base_url: String,
    /// Interval between summary refreshes via the query channel.
    pub summary_refresh_interval: Duration,
    /// Query client request timeout.
    pub request_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::LocalOnly,
            access_token: None,
            broadcast_port: 50222,
            stream_url: "wss://ws.weatherflow.com/swd/data".to_string(),
            query_base_url: "https://swd.weatherflow.com/swd/rest".to_string(),
            summary_refresh_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_roundtrip() {
        for mode in [
            ConnectionMode::LocalOnly,
            ConnectionMode::CloudWithLocalFallback,
            ConnectionMode::CloudOnly,
        ] {
            assert_eq!(mode.to_string().parse::<ConnectionMode>().unwrap(), mode);
        }
        assert!("carrier-pigeon".parse::<ConnectionMode>().is_err());
    }

    #[test]
    fn test_credential_requirements() {
        assert!(!ConnectionMode::LocalOnly.requires_credential());
        assert!(ConnectionMode::CloudWithLocalFallback.requires_credential());
        assert!(ConnectionMode::CloudOnly.requires_credential());
    }
}
