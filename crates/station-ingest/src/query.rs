//! Stateless cloud query client.
//!
//! Request/response over the cloud REST endpoint, credential passed as
//! a query parameter. This layer never lets a failure escape: missing
//! credential, non-success status, malformed JSON, and transport
//! errors are all logged and converted to an empty/`None` result.

use std::sync::RwLock;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use station_model::{
    DeviceObservationResponse, StationConfig, StationObservationResponse, StationsResponse,
};

/// Client for the cloud metadata and summary endpoints.
pub struct CloudQueryClient {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl CloudQueryClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            token: RwLock::new(None),
        }
    }

    pub fn set_credential(&self, token: &str) {
        let value = (!token.is_empty()).then(|| token.to_string());
        *self.token.write().expect("query state poisoned") = value;
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .expect("query state poisoned")
            .is_some()
    }

    /// All stations registered to the authenticated account.
    pub async fn list_stations(&self) -> Vec<StationConfig> {
        let Some(token) = self.credential() else {
            warn!("cannot list stations - no access token");
            return Vec::new();
        };

        let response: Option<StationsResponse> = self.get_json("stations", &token).await;
        let stations = response.map(|r| r.stations).unwrap_or_default();
        info!(count = stations.len(), "retrieved station list");
        stations
    }

    /// Latest station-level observation, or `None` on any failure.
    pub async fn get_station_observation(
        &self,
        station_id: i64,
    ) -> Option<StationObservationResponse> {
        let Some(token) = self.credential() else {
            warn!("cannot get station observation - no access token");
            return None;
        };

        self.get_json(&format!("observations/station/{station_id}"), &token)
            .await
    }

    /// Latest device-level observation (summary + raw rows), or `None`
    /// on any failure.
    pub async fn get_device_observation(
        &self,
        device_id: i64,
    ) -> Option<DeviceObservationResponse> {
        let Some(token) = self.credential() else {
            warn!("cannot get device observation - no access token");
            return None;
        };

        self.get_json(&format!("observations/device/{device_id}"), &token)
            .await
    }

    fn credential(&self) -> Option<String> {
        self.token.read().expect("query state poisoned").clone()
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, token: &str) -> Option<T> {
        let url = format!("{}/{}", self.base_url, path);

        let response = match self
            .client
            .get(&url)
            .query(&[("token", token)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(url = %url, error = %e, "query request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::NOT_FOUND {
                error!(
                    url = %url,
                    "query returned 404 - the endpoint or access token may be invalid"
                );
            } else {
                error!(url = %url, status = %status, "query returned non-success status");
            }
            return None;
        }

        match response.json::<T>().await {
            Ok(value) => {
                debug!(url = %url, "query succeeded");
                Some(value)
            }
            Err(e) => {
                error!(url = %url, error = %e, "failed to decode query response");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CloudQueryClient {
        CloudQueryClient::new("https://example.invalid/rest", Duration::from_secs(5))
    }

    #[test]
    fn test_credential_tracking() {
        let client = client();
        assert!(!client.is_authenticated());
        client.set_credential("tok-123");
        assert!(client.is_authenticated());
        client.set_credential("");
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn test_calls_fail_soft_without_credential() {
        // No credential: no request is attempted, nothing is returned
        let client = client();
        assert!(client.list_stations().await.is_empty());
        assert!(client.get_station_observation(4211).await.is_none());
        assert!(client.get_device_observation(1002).await.is_none());
    }
}
