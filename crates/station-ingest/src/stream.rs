//! Persistent cloud stream client.
//!
//! One WebSocket connection per credential, token embedded in the
//! connection URI. Telemetry is subscription-based: observation and
//! rapid-wind streams are requested per device with separate control
//! messages, each carrying a fresh correlation id. The client never
//! reconnects on its own; the orchestrator decides whether and when
//! to re-attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use station_model::{StationMessage, WeatherSnapshot, WindSample};

use crate::error::{IngestError, Result};
use crate::events::{Channel, ChannelEvents};

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

struct StreamTask {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Full-duplex client for the cloud telemetry stream.
pub struct CloudStreamClient {
    url: String,
    token: RwLock<Option<String>>,
    events: Arc<dyn ChannelEvents>,
    connected: Arc<AtomicBool>,
    writer: tokio::sync::Mutex<Option<WsWriter>>,
    task: Mutex<Option<StreamTask>>,
}

impl CloudStreamClient {
    pub fn new(url: impl Into<String>, events: Arc<dyn ChannelEvents>) -> Self {
        Self {
            url: url.into(),
            token: RwLock::new(None),
            events,
            connected: Arc::new(AtomicBool::new(false)),
            writer: tokio::sync::Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn set_credential(&self, token: &str) {
        let value = (!token.is_empty()).then(|| token.to_string());
        *self.token.write().expect("stream state poisoned") = value;
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Open the stream connection and start the receive loop.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let token = self
            .token
            .read()
            .expect("stream state poisoned")
            .clone()
            .ok_or_else(|| IngestError::MissingCredential("cloud stream connect".to_string()))?;

        let uri = format!("{}?token={}", self.url, token);
        let (ws, _response) = connect_async(&uri).await?;
        let (writer, reader) = ws.split();

        *self.writer.lock().await = Some(writer);
        set_connected(&self.connected, self.events.as_ref(), true);

        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let events = self.events.clone();
        let connected = self.connected.clone();
        let handle = tokio::spawn(receive_loop(reader, events, connected, shutdown_rx));

        *self.task.lock().expect("stream state poisoned") = Some(StreamTask {
            shutdown,
            handle,
        });

        info!(url = %self.url, "connected to cloud stream");
        Ok(())
    }

    /// Close gracefully if open, cancel the receive loop, and await it.
    /// Always safe to call, connected or not.
    pub async fn disconnect(&self) {
        set_connected(&self.connected, self.events.as_ref(), false);

        let task = self.task.lock().expect("stream state poisoned").take();
        if let Some(task) = task {
            let _ = task.shutdown.send(());

            if let Some(mut writer) = self.writer.lock().await.take() {
                let _ = writer.send(Message::Close(None)).await;
                let _ = writer.close().await;
            }

            let _ = task.handle.await;
            info!("disconnected from cloud stream");
        } else {
            *self.writer.lock().await = None;
        }
    }

    /// Request the full observation stream for a device.
    pub async fn subscribe_observations(&self, device_id: i64) -> Result<()> {
        self.send_control("listen_start", device_id).await
    }

    /// Request the rapid-wind stream for a device. Independent of the
    /// observation subscription; one does not imply the other.
    pub async fn subscribe_rapid_wind(&self, device_id: i64) -> Result<()> {
        self.send_control("listen_rapid_start", device_id).await
    }

    /// Stop both streams for a device. Best-effort when disconnected.
    pub async fn unsubscribe(&self, device_id: i64) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        self.send_control("listen_stop", device_id).await
    }

    async fn send_control(&self, kind: &str, device_id: i64) -> Result<()> {
        if !self.is_connected() {
            return Err(IngestError::NotConnected);
        }

        let frame = serde_json::json!({
            "type": kind,
            "device_id": device_id,
            "id": Uuid::new_v4().to_string(),
        });

        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(IngestError::NotConnected)?;
        writer.send(Message::Text(frame.to_string())).await?;

        trace!(kind = kind, device_id = device_id, "sent stream control message");
        Ok(())
    }
}

/// Flip the connected flag, raising `connection_changed` only on an
/// actual transition.
fn set_connected(connected: &AtomicBool, events: &dyn ChannelEvents, value: bool) {
    if connected.swap(value, Ordering::SeqCst) != value {
        events.connection_changed(value);
    }
}

async fn receive_loop(
    mut reader: WsReader,
    events: Arc<dyn ChannelEvents>,
    connected: Arc<AtomicBool>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!("stream receive loop shutting down");
                break;
            }
            frame = reader.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_frame(&text, events.as_ref()),
                Some(Ok(Message::Close(_))) => {
                    info!("cloud stream closed by server");
                    set_connected(&connected, events.as_ref(), false);
                    break;
                }
                // Ping/pong and binary frames carry no telemetry
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "cloud stream transport fault");
                    events.channel_error(Channel::CloudStream, format!("stream fault: {e}"));
                    set_connected(&connected, events.as_ref(), false);
                    break;
                }
                None => {
                    info!("cloud stream ended");
                    set_connected(&connected, events.as_ref(), false);
                    break;
                }
            }
        }
    }
}

/// Decode one inbound stream frame and raise the matching event.
fn handle_frame(text: &str, events: &dyn ChannelEvents) {
    let message: StationMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "dropping undecodable stream frame");
            return;
        }
    };

    match message {
        StationMessage::Ack { id } => debug!(id = ?id, "stream control acknowledged"),
        StationMessage::ObsSt { obs, summary, .. } => match obs.first() {
            Some(row) => match WeatherSnapshot::from_row(row) {
                Some(snapshot) => {
                    debug!(
                        temperature = snapshot.air_temperature,
                        "stream observation received"
                    );
                    events.observation_received(Channel::CloudStream, snapshot, summary);
                }
                None => warn!(fields = row.len(), "dropping short observation row"),
            },
            None => warn!("dropping obs_st with empty observation array"),
        },
        StationMessage::RapidWind { ob, device_id, .. } => match WindSample::from_row(&ob) {
            Some(sample) => {
                debug!(
                    device_id = ?device_id,
                    speed = sample.speed,
                    "stream rapid wind received"
                );
                events.wind_received(Channel::CloudStream, sample);
            }
            None => debug!(fields = ob.len(), "dropping malformed rapid wind row"),
        },
        StationMessage::DeviceStatus(status) => {
            events.device_status_received(Channel::CloudStream, status);
        }
        StationMessage::EvtPrecip {} => info!("rain event detected via cloud stream"),
        StationMessage::EvtStrike {} => info!("lightning strike detected via cloud stream"),
        StationMessage::HubStatus {} => debug!("hub status received via cloud stream"),
        StationMessage::Unknown => trace!("ignoring unknown stream message type"),
    }
}
