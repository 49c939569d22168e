//! Shared test doubles for the ingestion channels.

use std::sync::Mutex;

use station_model::{DeviceStatus, ObservationSummary, WeatherSnapshot, WindSample};

use crate::events::{Channel, ChannelEvents};

/// Sink that records everything the adapters publish.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub observations: Mutex<Vec<(Channel, WeatherSnapshot, Option<ObservationSummary>)>>,
    pub winds: Mutex<Vec<(Channel, WindSample)>>,
    pub statuses: Mutex<Vec<DeviceStatus>>,
    pub connections: Mutex<Vec<bool>>,
    pub errors: Mutex<Vec<(Channel, String)>>,
}

impl ChannelEvents for RecordingSink {
    fn observation_received(
        &self,
        channel: Channel,
        snapshot: WeatherSnapshot,
        summary: Option<ObservationSummary>,
    ) {
        self.observations
            .lock()
            .unwrap()
            .push((channel, snapshot, summary));
    }

    fn wind_received(&self, channel: Channel, sample: WindSample) {
        self.winds.lock().unwrap().push((channel, sample));
    }

    fn device_status_received(&self, _channel: Channel, status: DeviceStatus) {
        self.statuses.lock().unwrap().push(status);
    }

    fn connection_changed(&self, connected: bool) {
        self.connections.lock().unwrap().push(connected);
    }

    fn channel_error(&self, channel: Channel, message: String) {
        self.errors.lock().unwrap().push((channel, message));
    }
}
