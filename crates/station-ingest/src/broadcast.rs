//! Local broadcast listener.
//!
//! Binds the well-known hub broadcast port with `SO_REUSEADDR` (other
//! listeners on the host must coexist) and decodes each UDP datagram
//! into canonical events on a dedicated task. Decode failures are
//! dropped, never fatal; receive failures back off briefly and retry
//! until the listener is stopped.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use station_model::{StationMessage, WeatherSnapshot, WindSample};

use crate::error::Result;
use crate::events::{Channel, ChannelEvents};

/// Delay before retrying after an unexpected receive failure.
const RECEIVE_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Data older than this no longer counts as a live connection.
const STALENESS_WINDOW: Duration = Duration::from_secs(300);

struct ListenerTask {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Listens for hub broadcasts on the local network.
pub struct BroadcastListener {
    port: u16,
    events: Arc<dyn ChannelEvents>,
    task: Mutex<Option<ListenerTask>>,
    listening: AtomicBool,
    local_addr: RwLock<Option<SocketAddr>>,
    last_received: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl BroadcastListener {
    pub fn new(port: u16, events: Arc<dyn ChannelEvents>) -> Self {
        Self {
            port,
            events,
            task: Mutex::new(None),
            listening: AtomicBool::new(false),
            local_addr: RwLock::new(None),
            last_received: Arc::new(RwLock::new(None)),
        }
    }

    /// Bind the broadcast port and start the receive loop.
    /// Idempotent: a listener that is already running stays running.
    pub async fn start(&self) -> Result<()> {
        if self.listening.load(Ordering::SeqCst) {
            return Ok(());
        }

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, self.port).into();
        socket.bind(&bind_addr.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        let local_addr = socket.local_addr()?;
        *self
            .local_addr
            .write()
            .expect("listener state poisoned") = Some(local_addr);

        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let events = self.events.clone();
        let last_received = self.last_received.clone();
        let handle = tokio::spawn(receive_loop(socket, events, last_received, shutdown_rx));

        *self.task.lock().expect("listener state poisoned") = Some(ListenerTask {
            shutdown,
            handle,
        });
        self.listening.store(true, Ordering::SeqCst);

        info!(addr = %local_addr, "broadcast listener started");
        Ok(())
    }

    /// Signal the receive loop, await its termination, and release the
    /// socket. Safe to call when never started.
    pub async fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);

        let task = self.task.lock().expect("listener state poisoned").take();
        if let Some(task) = task {
            let _ = task.shutdown.send(());
            let _ = task.handle.await;
            info!("broadcast listener stopped");
        }

        *self.local_addr.write().expect("listener state poisoned") = None;
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Listening and data seen within the staleness window.
    pub fn is_connected(&self) -> bool {
        if !self.is_listening() {
            return false;
        }
        self.last_received
            .read()
            .expect("listener state poisoned")
            .map(|t| Utc::now().signed_duration_since(t).to_std().unwrap_or_default()
                < STALENESS_WINDOW)
            .unwrap_or(false)
    }

    /// The bound socket address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().expect("listener state poisoned")
    }

    pub fn last_received(&self) -> Option<DateTime<Utc>> {
        *self.last_received.read().expect("listener state poisoned")
    }
}

async fn receive_loop(
    socket: UdpSocket,
    events: Arc<dyn ChannelEvents>,
    last_received: Arc<RwLock<Option<DateTime<Utc>>>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; 2048];

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!("broadcast receive loop shutting down");
                break;
            }
            result = socket.recv_from(&mut buf) => match result {
                Ok((len, peer)) => {
                    *last_received.write().expect("listener state poisoned") = Some(Utc::now());
                    match std::str::from_utf8(&buf[..len]) {
                        Ok(text) => {
                            trace!(peer = %peer, len = len, "received broadcast datagram");
                            handle_datagram(text, events.as_ref());
                        }
                        Err(_) => debug!(peer = %peer, "dropping non-UTF-8 datagram"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "broadcast receive failed, backing off");
                    events.channel_error(Channel::Broadcast, format!("receive failed: {e}"));
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(RECEIVE_RETRY_BACKOFF) => {}
                    }
                }
            }
        }
    }
}

/// Decode one datagram and raise the matching canonical event.
/// Malformed input is logged and dropped; never an error.
fn handle_datagram(text: &str, events: &dyn ChannelEvents) {
    let message: StationMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "dropping undecodable datagram");
            return;
        }
    };

    match message {
        StationMessage::ObsSt { obs, summary, .. } => match obs.first() {
            Some(row) => match WeatherSnapshot::from_row(row) {
                Some(snapshot) => {
                    debug!(
                        temperature = snapshot.air_temperature,
                        humidity = snapshot.relative_humidity,
                        pressure = snapshot.station_pressure,
                        "broadcast observation received"
                    );
                    events.observation_received(Channel::Broadcast, snapshot, summary);
                }
                None => warn!(fields = row.len(), "dropping short observation row"),
            },
            None => warn!("dropping obs_st with empty observation array"),
        },
        StationMessage::RapidWind { ob, .. } => match WindSample::from_row(&ob) {
            Some(sample) => {
                debug!(
                    speed = sample.speed,
                    direction = sample.direction,
                    "broadcast rapid wind received"
                );
                events.wind_received(Channel::Broadcast, sample);
            }
            None => debug!(fields = ob.len(), "dropping malformed rapid wind row"),
        },
        StationMessage::DeviceStatus(status) => {
            debug!(
                voltage = status.voltage,
                rssi = status.rssi,
                "device status received"
            );
            events.device_status_received(Channel::Broadcast, status);
        }
        StationMessage::EvtPrecip {} => info!("rain event detected"),
        StationMessage::EvtStrike {} => info!("lightning strike detected"),
        StationMessage::HubStatus {} => debug!("hub status received"),
        StationMessage::Ack { id } => debug!(id = ?id, "unexpected ack on broadcast channel"),
        StationMessage::Unknown => trace!("ignoring unknown broadcast message type"),
    }
}
