//! Event plumbing: the adapter-facing sink and the consumer-facing
//! listener registry.
//!
//! Delivery is synchronous and in registration order: a publish
//! happens-after the triggering parse and reaches every registered
//! listener before the publishing call returns, so tests can assert
//! post-conditions immediately after injecting a message.

use std::fmt;
use std::sync::RwLock;

use station_model::{DeviceStatus, ObservationSummary, StationConfig, WeatherSnapshot, WindSample};

/// The ingestion channel an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Local UDP broadcast listener.
    Broadcast,
    /// Persistent cloud WebSocket stream.
    CloudStream,
    /// Polled cloud query endpoint (summary refresh).
    CloudQuery,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Broadcast => "broadcast",
            Channel::CloudStream => "cloud-stream",
            Channel::CloudQuery => "cloud-query",
        };
        f.write_str(name)
    }
}

/// Sink the channel adapters publish into.
///
/// The orchestrator implements this and applies the precedence policy
/// per incoming event; adapters never gate on connectivity themselves.
pub trait ChannelEvents: Send + Sync {
    /// A full observation was decoded, possibly with an attached
    /// server-computed summary (query channel only).
    fn observation_received(
        &self,
        channel: Channel,
        snapshot: WeatherSnapshot,
        summary: Option<ObservationSummary>,
    );

    /// A rapid-wind sample was decoded.
    fn wind_received(&self, channel: Channel, sample: WindSample);

    /// An advisory device-status report was decoded.
    fn device_status_received(&self, channel: Channel, status: DeviceStatus);

    /// The cloud stream connected or disconnected.
    fn connection_changed(&self, connected: bool);

    /// A transport-level failure on a channel.
    fn channel_error(&self, channel: Channel, message: String);
}

/// Human-readable label for the channel currently backing published
/// snapshots. Purely observational; precedence logic reads connection
/// state, never this label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveSource {
    #[default]
    None,
    LocalOnly,
    Cloud,
    CloudWithLocalBackup,
    LocalCloudError,
    LocalCloudDisconnected,
}

impl fmt::Display for ActiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActiveSource::None => "none",
            ActiveSource::LocalOnly => "local-only",
            ActiveSource::Cloud => "cloud",
            ActiveSource::CloudWithLocalBackup => "cloud-with-local-backup",
            ActiveSource::LocalCloudError => "local-due-to-cloud-error",
            ActiveSource::LocalCloudDisconnected => "local-due-to-cloud-disconnected",
        };
        f.write_str(label)
    }
}

type Listener<T> = Box<dyn Fn(&T) + Send + Sync>;
type TextListener = Box<dyn Fn(&str) + Send + Sync>;

/// Consumer-facing listener registry.
///
/// Registration never blocks emission for long: locks are held only
/// for the synchronous callback pass and never across an await.
#[derive(Default)]
pub struct EventBus {
    weather: RwLock<Vec<Listener<WeatherSnapshot>>>,
    wind: RwLock<Vec<Listener<WindSample>>>,
    device_status: RwLock<Vec<Listener<DeviceStatus>>>,
    station: RwLock<Vec<Listener<StationConfig>>>,
    errors: RwLock<Vec<TextListener>>,
    status: RwLock<Vec<TextListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_weather(&self, listener: impl Fn(&WeatherSnapshot) + Send + Sync + 'static) {
        self.weather
            .write()
            .expect("listener registry poisoned")
            .push(Box::new(listener));
    }

    pub fn on_wind(&self, listener: impl Fn(&WindSample) + Send + Sync + 'static) {
        self.wind
            .write()
            .expect("listener registry poisoned")
            .push(Box::new(listener));
    }

    pub fn on_device_status(&self, listener: impl Fn(&DeviceStatus) + Send + Sync + 'static) {
        self.device_status
            .write()
            .expect("listener registry poisoned")
            .push(Box::new(listener));
    }

    pub fn on_station_changed(&self, listener: impl Fn(&StationConfig) + Send + Sync + 'static) {
        self.station
            .write()
            .expect("listener registry poisoned")
            .push(Box::new(listener));
    }

    pub fn on_error(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.errors
            .write()
            .expect("listener registry poisoned")
            .push(Box::new(listener));
    }

    pub fn on_status_changed(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.status
            .write()
            .expect("listener registry poisoned")
            .push(Box::new(listener));
    }

    pub fn emit_weather(&self, snapshot: &WeatherSnapshot) {
        for listener in self
            .weather
            .read()
            .expect("listener registry poisoned")
            .iter()
        {
            listener(snapshot);
        }
    }

    pub fn emit_wind(&self, sample: &WindSample) {
        for listener in self.wind.read().expect("listener registry poisoned").iter() {
            listener(sample);
        }
    }

    pub fn emit_device_status(&self, status: &DeviceStatus) {
        for listener in self
            .device_status
            .read()
            .expect("listener registry poisoned")
            .iter()
        {
            listener(status);
        }
    }

    pub fn emit_station_changed(&self, station: &StationConfig) {
        for listener in self
            .station
            .read()
            .expect("listener registry poisoned")
            .iter()
        {
            listener(station);
        }
    }

    pub fn emit_error(&self, message: &str) {
        for listener in self
            .errors
            .read()
            .expect("listener registry poisoned")
            .iter()
        {
            listener(message);
        }
    }

    pub fn emit_status(&self, message: &str) {
        for listener in self
            .status
            .read()
            .expect("listener registry poisoned")
            .iter()
        {
            listener(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_delivery_is_synchronous_and_ordered() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.on_status_changed(move |message| {
                seen.lock().unwrap().push(format!("{tag}:{message}"));
            });
        }

        bus.emit_status("ready");

        // All listeners ran before emit returned, in registration order
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:ready", "second:ready", "third:ready"]
        );
    }

    #[test]
    fn test_active_source_labels() {
        assert_eq!(ActiveSource::None.to_string(), "none");
        assert_eq!(
            ActiveSource::CloudWithLocalBackup.to_string(),
            "cloud-with-local-backup"
        );
        assert_eq!(
            ActiveSource::LocalCloudDisconnected.to_string(),
            "local-due-to-cloud-disconnected"
        );
    }
}
