//! Connection orchestrator.
//!
//! Owns the three channel adapters, applies the per-event precedence
//! policy, caches the latest published values, and fans events out to
//! registered listeners. All public operations are fail-soft: failures
//! are logged and surfaced as error notifications, never panics or
//! propagated errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use station_model::{
    DeviceStatus, ObservationSummary, StationConfig, WeatherSnapshot, WindSample,
};

use crate::broadcast::BroadcastListener;
use crate::config::{ConnectionMode, IngestConfig};
use crate::error::{IngestError, Result};
use crate::events::{ActiveSource, Channel, ChannelEvents, EventBus};
use crate::query::CloudQueryClient;
use crate::stream::CloudStreamClient;

struct RefreshTask {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Shared state and precedence policy. Implements [`ChannelEvents`] so
/// the adapters publish straight into it.
struct Core {
    mode: RwLock<ConnectionMode>,
    token: RwLock<Option<String>>,
    stations: RwLock<Vec<StationConfig>>,
    selected: RwLock<Option<StationConfig>>,
    running: AtomicBool,
    stream_connected: AtomicBool,
    active_source: RwLock<ActiveSource>,
    latest_weather: RwLock<Option<WeatherSnapshot>>,
    latest_summary: RwLock<Option<ObservationSummary>>,
    latest_wind: RwLock<Option<WindSample>>,
    latest_device_status: RwLock<Option<DeviceStatus>>,
    last_update: RwLock<Option<DateTime<Utc>>>,
    bus: EventBus,
}

impl Core {
    fn new(mode: ConnectionMode, token: Option<String>) -> Self {
        Self {
            mode: RwLock::new(mode),
            token: RwLock::new(token),
            stations: RwLock::new(Vec::new()),
            selected: RwLock::new(None),
            running: AtomicBool::new(false),
            stream_connected: AtomicBool::new(false),
            active_source: RwLock::new(ActiveSource::None),
            latest_weather: RwLock::new(None),
            latest_summary: RwLock::new(None),
            latest_wind: RwLock::new(None),
            latest_device_status: RwLock::new(None),
            last_update: RwLock::new(None),
            bus: EventBus::new(),
        }
    }

    fn mode(&self) -> ConnectionMode {
        *self.mode.read().expect("orchestrator state poisoned")
    }

    fn token(&self) -> Option<String> {
        self.token
            .read()
            .expect("orchestrator state poisoned")
            .clone()
    }

    fn selected(&self) -> Option<StationConfig> {
        self.selected
            .read()
            .expect("orchestrator state poisoned")
            .clone()
    }

    /// Whether a broadcast event passes the precedence check right now.
    /// Evaluated per event, never latched.
    fn accepts_broadcast(&self) -> bool {
        match self.mode() {
            ConnectionMode::LocalOnly => true,
            ConnectionMode::CloudWithLocalFallback => {
                !self.stream_connected.load(Ordering::SeqCst)
            }
            ConnectionMode::CloudOnly => false,
        }
    }

    /// Update the active-source label, reporting a status change only
    /// on an actual transition.
    fn set_active_source(&self, source: ActiveSource) {
        let mut current = self
            .active_source
            .write()
            .expect("orchestrator state poisoned");
        if *current == source {
            return;
        }
        *current = source;
        drop(current);

        info!(source = %source, "active source changed");
        self.bus.emit_status(&format!("active source: {source}"));
    }

    /// Re-derive the label after an accepted telemetry event.
    fn refresh_active_source(&self) {
        let next = match self.mode() {
            ConnectionMode::LocalOnly => ActiveSource::LocalOnly,
            ConnectionMode::CloudOnly => ActiveSource::Cloud,
            ConnectionMode::CloudWithLocalFallback => {
                if self.stream_connected.load(Ordering::SeqCst) {
                    ActiveSource::CloudWithLocalBackup
                } else {
                    // Keep the more specific reason if a transition
                    // already recorded one
                    let current = *self
                        .active_source
                        .read()
                        .expect("orchestrator state poisoned");
                    match current {
                        ActiveSource::LocalCloudError => ActiveSource::LocalCloudError,
                        _ => ActiveSource::LocalCloudDisconnected,
                    }
                }
            }
        };
        self.set_active_source(next);
    }

    fn touch(&self) {
        *self
            .last_update
            .write()
            .expect("orchestrator state poisoned") = Some(Utc::now());
    }
}

impl ChannelEvents for Core {
    fn observation_received(
        &self,
        channel: Channel,
        snapshot: WeatherSnapshot,
        summary: Option<ObservationSummary>,
    ) {
        if channel == Channel::Broadcast && !self.accepts_broadcast() {
            trace!("suppressing broadcast observation while cloud stream is live");
            return;
        }

        *self
            .latest_weather
            .write()
            .expect("orchestrator state poisoned") = Some(snapshot.clone());
        // A summary arrives only on the query channel; keep the last
        // known one when other channels publish without
        if summary.is_some() {
            *self
                .latest_summary
                .write()
                .expect("orchestrator state poisoned") = summary;
        }
        self.touch();
        self.refresh_active_source();
        self.bus.emit_weather(&snapshot);
    }

    fn wind_received(&self, channel: Channel, sample: WindSample) {
        if channel == Channel::Broadcast && !self.accepts_broadcast() {
            trace!("suppressing broadcast wind sample while cloud stream is live");
            return;
        }

        *self
            .latest_wind
            .write()
            .expect("orchestrator state poisoned") = Some(sample.clone());
        self.touch();
        self.refresh_active_source();
        self.bus.emit_wind(&sample);
    }

    fn device_status_received(&self, channel: Channel, status: DeviceStatus) {
        // Advisory telemetry: never gated by precedence
        debug!(channel = %channel, voltage = status.voltage, "device status updated");
        *self
            .latest_device_status
            .write()
            .expect("orchestrator state poisoned") = Some(status.clone());
        self.bus.emit_device_status(&status);
    }

    fn connection_changed(&self, connected: bool) {
        self.stream_connected.store(connected, Ordering::SeqCst);

        if connected {
            info!("cloud stream connected");
            match self.mode() {
                ConnectionMode::CloudOnly => self.set_active_source(ActiveSource::Cloud),
                ConnectionMode::CloudWithLocalFallback => {
                    self.set_active_source(ActiveSource::CloudWithLocalBackup)
                }
                ConnectionMode::LocalOnly => {}
            }
        } else {
            warn!("cloud stream disconnected");
            if self.mode() == ConnectionMode::CloudWithLocalFallback
                && self.running.load(Ordering::SeqCst)
            {
                self.set_active_source(ActiveSource::LocalCloudDisconnected);
                self.bus
                    .emit_status("cloud stream disconnected, local broadcast takes over");
            }
        }
    }

    fn channel_error(&self, channel: Channel, message: String) {
        error!(channel = %channel, message = %message, "channel error");
        self.bus.emit_error(&format!("{channel}: {message}"));

        if channel == Channel::CloudStream
            && self.mode() == ConnectionMode::CloudWithLocalFallback
        {
            self.set_active_source(ActiveSource::LocalCloudError);
        }
    }
}

struct Inner {
    config: IngestConfig,
    core: Arc<Core>,
    broadcast: BroadcastListener,
    stream: CloudStreamClient,
    query: CloudQueryClient,
    /// Serializes start/stop/set_mode so concurrent callers cannot
    /// interleave adapter lifecycles.
    lifecycle: tokio::sync::Mutex<()>,
    refresh_task: Mutex<Option<RefreshTask>>,
}

/// Session-scoped facade over the three ingestion channels.
///
/// Cheap to clone; all clones share one set of adapters and caches.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(config: IngestConfig) -> Self {
        let core = Arc::new(Core::new(config.mode, config.access_token.clone()));
        let events: Arc<dyn ChannelEvents> = core.clone();

        let broadcast = BroadcastListener::new(config.broadcast_port, events.clone());
        let stream = CloudStreamClient::new(config.stream_url.clone(), events);
        let query = CloudQueryClient::new(config.query_base_url.clone(), config.request_timeout);

        if let Some(token) = config.access_token.as_deref() {
            stream.set_credential(token);
            query.set_credential(token);
        }

        Self {
            inner: Arc::new(Inner {
                config,
                core,
                broadcast,
                stream,
                query,
                lifecycle: tokio::sync::Mutex::new(()),
                refresh_task: Mutex::new(None),
            }),
        }
    }

    /// Start ingestion in the configured mode. Idempotent; a second
    /// start while running changes nothing and reports success.
    #[instrument(skip(self))]
    pub async fn start(&self) -> bool {
        let inner = &self.inner;
        let _guard = inner.lifecycle.lock().await;

        if inner.core.running.load(Ordering::SeqCst) {
            debug!("already running, start is a no-op");
            return true;
        }

        match inner.start_locked().await {
            Ok(()) => {
                inner.core.running.store(true, Ordering::SeqCst);
                info!(mode = %inner.core.mode(), "ingestion started");
                true
            }
            Err(e) => {
                error!(error = %e, "failed to start ingestion");
                inner.core.bus.emit_error(&format!("failed to start: {e}"));
                inner.core.set_active_source(ActiveSource::None);
                false
            }
        }
    }

    /// Stop all channels, cancel the refresh timer, and reset the
    /// active-source label. Safe to call when never started.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let inner = &self.inner;
        let _guard = inner.lifecycle.lock().await;

        if !inner.core.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("stopping ingestion");
        inner.stream.disconnect().await;
        inner.broadcast.stop().await;
        inner.cancel_summary_refresh().await;

        inner.core.set_active_source(ActiveSource::None);
        inner.core.bus.emit_status("stopped");
    }

    /// Install or replace the cloud credential on the live session.
    /// A non-empty token triggers a station refresh in the background,
    /// so this must be called from within a Tokio runtime.
    pub fn set_credential(&self, token: &str) {
        let value = (!token.is_empty()).then(|| token.to_string());
        let refresh = value.is_some();
        *self
            .inner
            .core
            .token
            .write()
            .expect("orchestrator state poisoned") = value;

        self.inner.stream.set_credential(token);
        self.inner.query.set_credential(token);

        if refresh {
            let orchestrator = self.clone();
            tokio::spawn(async move {
                orchestrator.refresh_stations().await;
            });
        }
    }

    /// Switch connection mode, restarting the channels under the new
    /// policy. A credential-requiring mode without a token falls back
    /// to local-only instead of failing.
    #[instrument(skip(self))]
    pub async fn set_mode(&self, mode: ConnectionMode) -> bool {
        let core = &self.inner.core;

        let mode = if mode.requires_credential() && core.token().is_none() {
            warn!(requested = %mode, "mode requires an access token, falling back to local-only");
            core.bus
                .emit_status("no access token, falling back to local-only");
            ConnectionMode::LocalOnly
        } else {
            mode
        };

        *core.mode.write().expect("orchestrator state poisoned") = mode;
        info!(mode = %mode, "connection mode changed");

        self.stop().await;
        self.start().await
    }

    /// Make `station` the session's telemetry source. In a cloud mode
    /// this ensures the stream is connected, resubscribes every sensor
    /// device, and refreshes the summary immediately. A station-changed
    /// notification is raised once the sequence completes, whether or
    /// not the cloud leg succeeded.
    #[instrument(skip(self, station), fields(station_id = station.station_id))]
    pub async fn select_station(&self, station: StationConfig) -> bool {
        let inner = &self.inner;
        info!(station = %station.display_name(), "station selected");

        let previous = inner
            .core
            .selected
            .write()
            .expect("orchestrator state poisoned")
            .replace(station.clone());

        // Release the previous station's subscriptions first;
        // best-effort, a dead stream drops them anyway
        if let Some(previous) = previous.filter(|p| p.station_id != station.station_id) {
            if inner.stream.is_connected() {
                for device in previous.sensor_devices() {
                    if let Err(e) = inner.stream.unsubscribe(device.device_id).await {
                        warn!(device_id = device.device_id, error = %e, "unsubscribe failed");
                    }
                }
            }
        }

        let mut ok = true;
        if inner.core.mode() != ConnectionMode::LocalOnly {
            if !inner.stream.is_connected() {
                if let Err(e) = inner.stream.connect().await {
                    error!(error = %e, "failed to connect cloud stream after station selection");
                    inner
                        .core
                        .bus
                        .emit_error(&format!("cloud stream connection failed: {e}"));
                    ok = false;
                }
            }
            if inner.stream.is_connected() {
                inner.subscribe_selected_station().await;
                inner.refresh_summary().await;
            }
        }

        inner.core.bus.emit_station_changed(&station);
        ok
    }

    /// Re-query the station list for the current credential. Fail-soft:
    /// no credential or a failed query yields an empty list plus a
    /// status message. The first station is auto-selected when nothing
    /// is selected yet.
    pub async fn refresh_stations(&self) -> Vec<StationConfig> {
        self.inner.refresh_stations().await
    }

    // Accessors for the cached session state.

    pub fn latest_weather(&self) -> Option<WeatherSnapshot> {
        self.inner
            .core
            .latest_weather
            .read()
            .expect("orchestrator state poisoned")
            .clone()
    }

    pub fn latest_summary(&self) -> Option<ObservationSummary> {
        self.inner
            .core
            .latest_summary
            .read()
            .expect("orchestrator state poisoned")
            .clone()
    }

    pub fn latest_wind(&self) -> Option<WindSample> {
        self.inner
            .core
            .latest_wind
            .read()
            .expect("orchestrator state poisoned")
            .clone()
    }

    pub fn latest_device_status(&self) -> Option<DeviceStatus> {
        self.inner
            .core
            .latest_device_status
            .read()
            .expect("orchestrator state poisoned")
            .clone()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self
            .inner
            .core
            .last_update
            .read()
            .expect("orchestrator state poisoned")
    }

    pub fn is_running(&self) -> bool {
        self.inner.core.running.load(Ordering::SeqCst)
    }

    /// True while any channel can deliver data: fresh broadcast
    /// traffic, a live cloud stream, or an authenticated query client.
    pub fn is_connected(&self) -> bool {
        self.inner.broadcast.is_connected()
            || self.inner.stream.is_connected()
            || self.inner.query.is_authenticated()
    }

    pub fn mode(&self) -> ConnectionMode {
        self.inner.core.mode()
    }

    pub fn active_source(&self) -> ActiveSource {
        *self
            .inner
            .core
            .active_source
            .read()
            .expect("orchestrator state poisoned")
    }

    pub fn stations(&self) -> Vec<StationConfig> {
        self.inner
            .core
            .stations
            .read()
            .expect("orchestrator state poisoned")
            .clone()
    }

    pub fn selected_station(&self) -> Option<StationConfig> {
        self.inner.core.selected()
    }

    /// Bound broadcast socket address while the listener runs.
    pub fn broadcast_addr(&self) -> Option<std::net::SocketAddr> {
        self.inner.broadcast.local_addr()
    }

    // Listener registration. Callbacks run synchronously on the
    // publishing task; keep them short.

    pub fn on_weather_updated(&self, listener: impl Fn(&WeatherSnapshot) + Send + Sync + 'static) {
        self.inner.core.bus.on_weather(listener);
    }

    pub fn on_wind_updated(&self, listener: impl Fn(&WindSample) + Send + Sync + 'static) {
        self.inner.core.bus.on_wind(listener);
    }

    pub fn on_device_status(&self, listener: impl Fn(&DeviceStatus) + Send + Sync + 'static) {
        self.inner.core.bus.on_device_status(listener);
    }

    pub fn on_station_changed(&self, listener: impl Fn(&StationConfig) + Send + Sync + 'static) {
        self.inner.core.bus.on_station_changed(listener);
    }

    pub fn on_error(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.core.bus.on_error(listener);
    }

    pub fn on_status_changed(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.core.bus.on_status_changed(listener);
    }
}

impl Inner {
    async fn start_locked(self: &Arc<Self>) -> Result<()> {
        let mode = self.core.mode();
        info!(mode = %mode, "starting ingestion");

        if mode != ConnectionMode::LocalOnly && self.core.selected().is_none() {
            self.refresh_stations().await;
        }

        match mode {
            ConnectionMode::LocalOnly => self.start_local_only().await?,
            ConnectionMode::CloudOnly => self.start_cloud_only().await?,
            ConnectionMode::CloudWithLocalFallback => self.start_fallback().await?,
        }

        if mode != ConnectionMode::LocalOnly {
            self.arm_summary_refresh();
        }
        Ok(())
    }

    async fn start_local_only(&self) -> Result<()> {
        self.core.bus.emit_status("starting broadcast listener");
        self.broadcast.start().await?;
        self.core.set_active_source(ActiveSource::LocalOnly);
        Ok(())
    }

    async fn start_cloud_only(&self) -> Result<()> {
        if self.core.token().is_none() {
            return Err(IngestError::MissingCredential(
                ConnectionMode::CloudOnly.to_string() + " mode",
            ));
        }
        if self.core.selected().is_none() {
            return Err(IngestError::NoStationSelected);
        }

        self.core.bus.emit_status("connecting to cloud stream");
        self.connect_cloud().await?;
        self.core.set_active_source(ActiveSource::Cloud);
        Ok(())
    }

    /// Start both legs independently; succeed if either came up.
    async fn start_fallback(&self) -> Result<()> {
        let cloud_ok = if self.core.token().is_some() && self.core.selected().is_some() {
            match self.connect_cloud().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "cloud leg failed to start, relying on local broadcast");
                    self.core
                        .bus
                        .emit_error(&format!("cloud startup failed: {e}"));
                    false
                }
            }
        } else {
            debug!("no credential or station, skipping cloud leg");
            false
        };

        let local_ok = match self.broadcast.start().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "broadcast listener failed to start");
                self.core
                    .bus
                    .emit_error(&format!("broadcast startup failed: {e}"));
                false
            }
        };

        if cloud_ok {
            self.core
                .set_active_source(ActiveSource::CloudWithLocalBackup);
        } else if local_ok {
            self.core.set_active_source(ActiveSource::LocalCloudError);
        } else {
            return Err(IngestError::AllChannelsFailed);
        }
        Ok(())
    }

    async fn connect_cloud(&self) -> Result<()> {
        self.stream.connect().await?;
        self.subscribe_selected_station().await;
        Ok(())
    }

    /// Subscribe both telemetry streams for every sensor device of the
    /// selected station. Permissive: a failed subscription is logged
    /// and skipped, the rest proceed.
    async fn subscribe_selected_station(&self) {
        let devices: Vec<i64> = self
            .core
            .selected()
            .map(|station| {
                station
                    .sensor_devices()
                    .map(|device| device.device_id)
                    .collect()
            })
            .unwrap_or_default();

        if devices.is_empty() {
            warn!("selected station has no sensor devices to subscribe");
            return;
        }

        for device_id in devices {
            if let Err(e) = self.stream.subscribe_observations(device_id).await {
                warn!(device_id = device_id, error = %e, "observation subscription failed");
                continue;
            }
            if let Err(e) = self.stream.subscribe_rapid_wind(device_id).await {
                warn!(device_id = device_id, error = %e, "rapid wind subscription failed");
            }
            info!(device_id = device_id, "subscribed to device telemetry");
        }
    }

    async fn refresh_stations(&self) -> Vec<StationConfig> {
        if self.core.token().is_none() {
            warn!("cannot refresh stations - no access token");
            self.core.bus.emit_status("no access token");
            return Vec::new();
        }

        self.core.bus.emit_status("refreshing stations");
        let stations = self.query.list_stations().await;
        self.apply_station_list(&stations);
        stations
    }

    fn apply_station_list(&self, stations: &[StationConfig]) {
        *self
            .core
            .stations
            .write()
            .expect("orchestrator state poisoned") = stations.to_vec();

        if stations.is_empty() {
            warn!("no stations found for this account");
            self.core.bus.emit_status("no stations found");
            return;
        }

        info!(count = stations.len(), "stations refreshed");
        self.core
            .bus
            .emit_status(&format!("found {} stations", stations.len()));

        let mut selected = self
            .core
            .selected
            .write()
            .expect("orchestrator state poisoned");
        if selected.is_none() {
            info!(
                station = %stations[0].display_name(),
                "auto-selected first station"
            );
            *selected = Some(stations[0].clone());
        }
    }

    /// Spawn the periodic summary-refresh task. The first tick fires
    /// immediately so a fresh session gets a summary without waiting a
    /// full interval.
    fn arm_summary_refresh(self: &Arc<Self>) {
        let (shutdown, mut shutdown_rx) = broadcast::channel(1);
        let inner = self.clone();
        let interval = inner.config.summary_refresh_interval;

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("summary refresh task shutting down");
                        break;
                    }
                    _ = tick.tick() => inner.refresh_summary().await,
                }
            }
        });

        *self
            .refresh_task
            .lock()
            .expect("orchestrator state poisoned") = Some(RefreshTask { shutdown, handle });
    }

    async fn cancel_summary_refresh(&self) {
        let task = self
            .refresh_task
            .lock()
            .expect("orchestrator state poisoned")
            .take();
        if let Some(task) = task {
            let _ = task.shutdown.send(());
            let _ = task.handle.await;
        }
    }

    /// Pull the latest device observation from the query channel and
    /// republish it, summary attached, through the normal event path.
    async fn refresh_summary(&self) {
        let device_id = match self
            .core
            .selected()
            .as_ref()
            .and_then(|station| station.sensor_devices().next().map(|d| d.device_id))
        {
            Some(device_id) => device_id,
            None => {
                debug!("no sensor device selected, skipping summary refresh");
                return;
            }
        };

        let Some(response) = self.query.get_device_observation(device_id).await else {
            return;
        };

        let row = match response.obs.as_ref().and_then(|rows| rows.first()) {
            Some(row) => row,
            None => {
                debug!(device_id = device_id, "summary refresh returned no rows");
                return;
            }
        };

        match WeatherSnapshot::from_row(row) {
            Some(snapshot) => {
                debug!(device_id = device_id, "summary refresh republished observation");
                self.core
                    .observation_received(Channel::CloudQuery, snapshot, response.summary);
            }
            None => debug!(fields = row.len(), "summary refresh returned a short row"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use station_model::Device;

    fn test_config(mode: ConnectionMode) -> IngestConfig {
        IngestConfig {
            mode,
            access_token: None,
            // Port 0: the OS picks a free port per test
            broadcast_port: 0,
            stream_url: "wss://example.invalid/data".to_string(),
            query_base_url: "https://example.invalid/rest".to_string(),
            summary_refresh_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn sample_snapshot(temperature: f64) -> WeatherSnapshot {
        let row = vec![
            1700000000.0,
            0.1,
            2.3,
            5.0,
            180.0,
            3.0,
            1005.2,
            temperature,
            55.0,
            1200.0,
            1.2,
            300.0,
            0.0,
            0.0,
            0.0,
            0.0,
            2.6,
            1.0,
        ];
        WeatherSnapshot::from_row(&row).unwrap()
    }

    fn sample_wind() -> WindSample {
        WindSample::from_row(&[1700000001.0, 3.4, 270.0]).unwrap()
    }

    fn station(station_id: i64, name: &str) -> StationConfig {
        StationConfig {
            station_id,
            name: Some(name.to_string()),
            public_name: None,
            latitude: None,
            longitude: None,
            elevation: None,
            timezone: None,
            devices: vec![Device {
                device_id: station_id * 10,
                device_type: "ST".to_string(),
                serial_number: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_local_only_lifecycle_is_idempotent() {
        let orchestrator = Orchestrator::new(test_config(ConnectionMode::LocalOnly));

        assert!(!orchestrator.is_running());
        assert!(orchestrator.start().await);
        assert!(orchestrator.is_running());
        assert_eq!(orchestrator.active_source(), ActiveSource::LocalOnly);

        // Second start changes nothing and still reports success
        assert!(orchestrator.start().await);
        assert!(orchestrator.is_running());

        orchestrator.stop().await;
        assert!(!orchestrator.is_running());
        assert_eq!(orchestrator.active_source(), ActiveSource::None);
    }

    #[tokio::test]
    async fn test_stop_when_never_started() {
        let orchestrator = Orchestrator::new(test_config(ConnectionMode::LocalOnly));
        orchestrator.stop().await;
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_cloud_only_without_credential_fails_soft() {
        let orchestrator = Orchestrator::new(test_config(ConnectionMode::CloudOnly));

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        orchestrator.on_error(move |message| sink.lock().unwrap().push(message.to_string()));

        assert!(!orchestrator.start().await);
        assert!(!orchestrator.is_running());
        assert_eq!(orchestrator.active_source(), ActiveSource::None);

        let errors = errors.lock().unwrap();
        assert!(errors.iter().any(|m| m.contains("access token")), "{errors:?}");
    }

    #[tokio::test]
    async fn test_set_mode_without_credential_falls_back_to_local() {
        let orchestrator = Orchestrator::new(test_config(ConnectionMode::LocalOnly));

        assert!(orchestrator.set_mode(ConnectionMode::CloudOnly).await);
        assert_eq!(orchestrator.mode(), ConnectionMode::LocalOnly);
        assert!(orchestrator.is_running());
        assert_eq!(orchestrator.active_source(), ActiveSource::LocalOnly);

        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_local_only_publishes_broadcast_events() {
        let orchestrator = Orchestrator::new(test_config(ConnectionMode::LocalOnly));
        let core = orchestrator.inner.core.clone();

        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = published.clone();
        orchestrator.on_weather_updated(move |snapshot| {
            sink.lock().unwrap().push(snapshot.air_temperature)
        });

        core.observation_received(Channel::Broadcast, sample_snapshot(21.5), None);

        assert_eq!(*published.lock().unwrap(), vec![21.5]);
        assert_eq!(
            orchestrator.latest_weather().unwrap().air_temperature,
            21.5
        );
        assert!(orchestrator.last_update().is_some());
        assert_eq!(orchestrator.active_source(), ActiveSource::LocalOnly);
    }

    #[tokio::test]
    async fn test_fallback_precedence_is_evaluated_per_event() {
        let orchestrator =
            Orchestrator::new(test_config(ConnectionMode::CloudWithLocalFallback));
        let core = orchestrator.inner.core.clone();

        // Stream up: broadcast observations are suppressed
        core.connection_changed(true);
        core.observation_received(Channel::Broadcast, sample_snapshot(10.0), None);
        assert!(orchestrator.latest_weather().is_none());

        // Stream events always pass
        core.observation_received(Channel::CloudStream, sample_snapshot(11.0), None);
        assert_eq!(orchestrator.latest_weather().unwrap().air_temperature, 11.0);
        assert_eq!(
            orchestrator.active_source(),
            ActiveSource::CloudWithLocalBackup
        );

        // Stream down: the next broadcast event goes through, no
        // restart required
        core.connection_changed(false);
        core.observation_received(Channel::Broadcast, sample_snapshot(12.0), None);
        assert_eq!(orchestrator.latest_weather().unwrap().air_temperature, 12.0);
        assert_eq!(
            orchestrator.active_source(),
            ActiveSource::LocalCloudDisconnected
        );

        // Wind follows the same policy
        core.connection_changed(true);
        core.wind_received(Channel::Broadcast, sample_wind());
        assert!(orchestrator.latest_wind().is_none());
        core.wind_received(Channel::CloudStream, sample_wind());
        assert!(orchestrator.latest_wind().is_some());
    }

    #[tokio::test]
    async fn test_cloud_error_labels_fallback_source() {
        let orchestrator =
            Orchestrator::new(test_config(ConnectionMode::CloudWithLocalFallback));
        let core = orchestrator.inner.core.clone();

        core.channel_error(Channel::CloudStream, "stream fault: boom".to_string());
        assert_eq!(orchestrator.active_source(), ActiveSource::LocalCloudError);

        // Broadcast data keeps the error label rather than downgrading
        // it to a generic disconnect
        core.observation_received(Channel::Broadcast, sample_snapshot(9.0), None);
        assert_eq!(orchestrator.active_source(), ActiveSource::LocalCloudError);
    }

    #[tokio::test]
    async fn test_device_status_bypasses_precedence() {
        let orchestrator =
            Orchestrator::new(test_config(ConnectionMode::CloudWithLocalFallback));
        let core = orchestrator.inner.core.clone();
        core.connection_changed(true);

        let status: DeviceStatus = serde_json::from_str(
            r#"{"timestamp":1700000000,"voltage":2.64,"rssi":-52}"#,
        )
        .unwrap();
        core.device_status_received(Channel::Broadcast, status);

        assert!(orchestrator.latest_device_status().is_some());
        // But weather from the same channel stays suppressed
        core.observation_received(Channel::Broadcast, sample_snapshot(5.0), None);
        assert!(orchestrator.latest_weather().is_none());
    }

    #[tokio::test]
    async fn test_summary_is_retained_across_channels() {
        let orchestrator = Orchestrator::new(test_config(ConnectionMode::LocalOnly));
        let core = orchestrator.inner.core.clone();

        let summary: ObservationSummary =
            serde_json::from_str(r#"{"pressure_trend":"falling"}"#).unwrap();
        core.observation_received(Channel::CloudQuery, sample_snapshot(20.0), Some(summary));
        assert_eq!(
            orchestrator.latest_summary().unwrap().pressure_trend.as_deref(),
            Some("falling")
        );

        // A later summary-less broadcast observation replaces the
        // snapshot but keeps the summary
        core.observation_received(Channel::Broadcast, sample_snapshot(21.0), None);
        assert_eq!(orchestrator.latest_weather().unwrap().air_temperature, 21.0);
        assert!(orchestrator.latest_summary().is_some());
    }

    #[tokio::test]
    async fn test_apply_station_list_auto_selects_first() {
        let orchestrator = Orchestrator::new(test_config(ConnectionMode::LocalOnly));

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = statuses.clone();
        orchestrator.on_status_changed(move |message| {
            sink.lock().unwrap().push(message.to_string())
        });

        orchestrator
            .inner
            .apply_station_list(&[station(4211, "Backyard"), station(4212, "Cabin")]);

        assert_eq!(orchestrator.stations().len(), 2);
        assert_eq!(orchestrator.selected_station().unwrap().station_id, 4211);
        assert!(statuses
            .lock()
            .unwrap()
            .iter()
            .any(|m| m == "found 2 stations"));

        // A later refresh never steals an existing selection
        orchestrator.inner.apply_station_list(&[station(9000, "Other")]);
        assert_eq!(orchestrator.selected_station().unwrap().station_id, 4211);
    }

    #[tokio::test]
    async fn test_apply_empty_station_list() {
        let orchestrator = Orchestrator::new(test_config(ConnectionMode::LocalOnly));

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = statuses.clone();
        orchestrator.on_status_changed(move |message| {
            sink.lock().unwrap().push(message.to_string())
        });

        orchestrator.inner.apply_station_list(&[]);

        assert!(orchestrator.stations().is_empty());
        assert!(orchestrator.selected_station().is_none());
        assert!(statuses
            .lock()
            .unwrap()
            .iter()
            .any(|m| m == "no stations found"));
    }

    #[tokio::test]
    async fn test_refresh_stations_without_credential() {
        let orchestrator = Orchestrator::new(test_config(ConnectionMode::LocalOnly));
        assert!(orchestrator.refresh_stations().await.is_empty());
        assert!(orchestrator.stations().is_empty());
    }

    #[tokio::test]
    async fn test_select_station_in_local_mode_skips_cloud() {
        let orchestrator = Orchestrator::new(test_config(ConnectionMode::LocalOnly));

        let changed = Arc::new(Mutex::new(Vec::new()));
        let sink = changed.clone();
        orchestrator.on_station_changed(move |station| {
            sink.lock().unwrap().push(station.station_id)
        });

        assert!(orchestrator.select_station(station(4211, "Backyard")).await);
        assert_eq!(orchestrator.selected_station().unwrap().station_id, 4211);
        assert_eq!(*changed.lock().unwrap(), vec![4211]);
    }
}
