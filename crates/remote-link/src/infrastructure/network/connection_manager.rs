//! The device connection manager.
//!
//! [`ConnectionManager`] is an explicitly constructed service.  Cloning it
//! hands out another reference to the same registry, sessions and listener.
//! It drives two independent kinds of background work:
//!
//! 1. **Discovery**: a [`BeaconListener`] thread plus a pump task that folds
//!    decoded beacons into the [`DeviceRegistry`].
//! 2. **Sessions**: one Tokio task per connected device.  The task owns the
//!    device's [`DeviceLink`] and works through a queue of commands, one
//!    request/reply exchange at a time.
//!
//! None of the public operations wait on the network.  Connection outcomes
//! show up in the registry (and as [`LinkEvent`]s), command outcomes arrive
//! through their completion.
//!
//! # Sending to a disconnected device
//!
//! `send_command` connects on demand: the command is queued on a fresh
//! session and goes out once the connection is up.  If the connection
//! fails, every queued command completes with
//! [`LinkError::DeviceUnreachable`].
//!
//! # Failure handling
//!
//! A timed-out command, a write or read error, an unparseable reply or a
//! closed connection end the session.  The device returns to
//! `Disconnected`, and the next command starts a new session.  `busyIR` and
//! `ERR` replies fail only the command that caused them.  Replies echoing
//! another command's id are skipped, so a late reply cannot complete the
//! wrong command.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Weak,
};
use std::time::Duration;

use remote_core::{encode_command, parse_response, DeviceBeacon, DeviceResponse};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::discovery::{BeaconListener, ListenerSettings};
use super::transport::{DeviceConnector, DeviceLink, TcpConnector};
use crate::application::completion::{
    spawn_completion_pump, CommandReceipt, Completion, CompletionCallback, LinkError, PumpSender,
};
use crate::application::manage_devices::{
    ConnectionState, DeviceId, DeviceRecord, DeviceRegistry,
};
use crate::infrastructure::storage::config::{save_config_to, AppConfig, KnownDevice};

/// Change notifications for subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    DeviceDiscovered { id: DeviceId, address: SocketAddr },
    DeviceRemoved { id: DeviceId },
    StateChanged { id: DeviceId, state: ConnectionState },
    DefaultDeviceChanged(Option<DeviceId>),
    DetectionChanged { detecting: bool },
}

const SEND_IR: &str = "sendir";
const LIST_DEVICES: &str = "getdevices";
const END_LIST_DEVICES: &str = "endlistdevices";

struct QueuedCommand {
    line: String,
    completion: Completion,
}

struct Session {
    id: u64,
    jobs: mpsc::UnboundedSender<QueuedCommand>,
}

struct Inner {
    config: Mutex<AppConfig>,
    config_path: Option<PathBuf>,
    command_port: u16,
    command_timeout: Duration,
    registry: RwLock<DeviceRegistry>,
    sessions: Mutex<HashMap<DeviceId, Session>>,
    discovery: Mutex<Option<BeaconListener>>,
    connector: Arc<dyn DeviceConnector>,
    events: broadcast::Sender<LinkEvent>,
    pump: PumpSender,
    next_session: AtomicU64,
    shut_down: AtomicBool,
}

/// Discovers iTach devices, tracks their connection state and sends them
/// commands.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Creates a manager that talks TCP and never writes the config file.
    ///
    /// Must be called from within a Tokio runtime: the completion pump is
    /// spawned here.
    pub fn new(config: AppConfig) -> Self {
        let connector = Arc::new(TcpConnector::new(config.network.connect_timeout()));
        Self::with_connector(config, None, connector)
    }

    /// Creates a TCP manager that persists default-device changes to `path`.
    pub fn with_config_path(config: AppConfig, path: PathBuf) -> Self {
        let connector = Arc::new(TcpConnector::new(config.network.connect_timeout()));
        Self::with_connector(config, Some(path), connector)
    }

    /// Creates a manager on top of an arbitrary transport.
    ///
    /// Devices listed under `[[devices.known]]` are registered as
    /// disconnected; entries with an unusable address are skipped.
    pub fn with_connector(
        config: AppConfig,
        config_path: Option<PathBuf>,
        connector: Arc<dyn DeviceConnector>,
    ) -> Self {
        let command_port = config.network.command_port;
        let mut registry = DeviceRegistry::new();
        for known in &config.devices.known {
            match known.ip() {
                Ok(ip) => {
                    registry.upsert(DeviceRecord::known(
                        known.id.clone(),
                        known.name.clone(),
                        ip,
                        command_port,
                    ));
                }
                Err(e) => warn!(device = %known.id, "skipping known device: {e}"),
            }
        }
        registry.set_default_device(config.devices.default_device.clone());

        let (events, _) = broadcast::channel(64);
        let (pump, _) = spawn_completion_pump();

        Self {
            inner: Arc::new(Inner {
                command_port,
                command_timeout: config.network.command_timeout(),
                config: Mutex::new(config),
                config_path,
                registry: RwLock::new(registry),
                sessions: Mutex::new(HashMap::new()),
                discovery: Mutex::new(None),
                connector,
                events,
                pump,
                next_session: AtomicU64::new(1),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    // ── Discovery ─────────────────────────────────────────────────────────────

    /// Starts listening for device beacons.
    ///
    /// Calling it while already listening is a no-op that succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::SocketBindFailure`] if the socket cannot be bound
    /// or joined to the multicast group, and [`LinkError::ShutDown`] after
    /// [`shutdown`](Self::shutdown).
    pub async fn detect_network_devices(&self) -> Result<(), LinkError> {
        if self.is_shut_down() {
            return Err(LinkError::ShutDown);
        }
        let mut discovery = self.inner.discovery.lock().await;
        if discovery.as_ref().is_some_and(BeaconListener::is_running) {
            debug!("already detecting devices");
            return Ok(());
        }
        if let Some(stale) = discovery.take() {
            join_listener(stale).await;
        }

        let network = self.inner.config.lock().await.network.clone();
        let settings = ListenerSettings::from_config(&network)
            .map_err(|e| LinkError::SocketBindFailure(e.to_string()))?;
        let (listener, beacons) = BeaconListener::start(settings).map_err(|e| {
            warn!("device detection unavailable: {e}");
            LinkError::SocketBindFailure(e.to_string())
        })?;
        tokio::spawn(beacon_pump(Arc::downgrade(&self.inner), beacons));
        *discovery = Some(listener);
        drop(discovery);

        self.inner.emit(LinkEvent::DetectionChanged { detecting: true });
        Ok(())
    }

    /// Stops listening and releases the beacon socket.  Safe to call when not
    /// detecting.
    pub async fn stop_network_device_detection(&self) {
        let listener = self.inner.discovery.lock().await.take();
        if let Some(listener) = listener {
            join_listener(listener).await;
            self.inner.emit(LinkEvent::DetectionChanged { detecting: false });
        }
    }

    pub async fn detecting_network_devices(&self) -> bool {
        self.inner
            .discovery
            .lock()
            .await
            .as_ref()
            .is_some_and(BeaconListener::is_running)
    }

    /// Local address of the beacon socket while detecting.
    pub async fn discovery_address(&self) -> Option<SocketAddr> {
        self.inner
            .discovery
            .lock()
            .await
            .as_ref()
            .map(BeaconListener::local_addr)
    }

    /// Folds a beacon into the registry as if it had arrived on the socket.
    ///
    /// Returns `true` when the device was not known before.
    pub async fn register_beacon(&self, beacon: DeviceBeacon) -> bool {
        self.inner.record_beacon(beacon).await
    }

    // ── Registry ──────────────────────────────────────────────────────────────

    /// Snapshot of every known device, ordered by id.
    pub async fn devices(&self) -> Vec<DeviceRecord> {
        self.inner.registry.read().await.all()
    }

    pub async fn device(&self, id: &str) -> Option<DeviceRecord> {
        self.inner.registry.read().await.get(id).cloned()
    }

    pub async fn connection_state(&self, id: &str) -> Option<ConnectionState> {
        self.inner.registry.read().await.get(id).map(|d| d.state)
    }

    pub async fn default_device(&self) -> Option<DeviceId> {
        self.inner
            .registry
            .read()
            .await
            .default_device()
            .map(str::to_string)
    }

    /// Selects the target for operations that name no device.
    ///
    /// When the manager has a config path the choice is written there,
    /// together with the device's address so it is known on the next start.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Config`] if the config file cannot be written.
    /// The in-memory selection is updated regardless.
    pub async fn set_default_device(&self, id: Option<DeviceId>) -> Result<(), LinkError> {
        let record = {
            let mut registry = self.inner.registry.write().await;
            registry.set_default_device(id.clone());
            id.as_deref().and_then(|id| registry.get(id).cloned())
        };
        info!(device = ?id, "default device changed");
        self.inner.emit(LinkEvent::DefaultDeviceChanged(id.clone()));

        let mut config = self.inner.config.lock().await;
        config.devices.default_device = id;
        if let Some(record) = record {
            remember_device(&mut config, &record);
        }
        match &self.inner.config_path {
            Some(path) => save_config_to(path, &config).map_err(|e| {
                warn!("could not persist default device: {e}");
                LinkError::Config(e.to_string())
            }),
            None => Ok(()),
        }
    }

    /// `true` when a default device is selected, known and connected.
    pub async fn default_device_connected(&self) -> bool {
        self.inner.registry.read().await.default_device_connected()
    }

    /// One-line summary of discovery, devices and the default selection.
    pub async fn status_description(&self) -> String {
        let detecting = self.detecting_network_devices().await;
        let registry = self.inner.registry.read().await;

        let discovery = if detecting {
            "detecting devices"
        } else {
            "not detecting"
        };
        let devices = match registry.len() {
            1 => format!("1 device ({} connected)", registry.connected_count()),
            n => format!("{n} devices ({} connected)", registry.connected_count()),
        };
        let default = match (registry.default_device(), registry.resolve(None)) {
            (_, Some(device)) => format!("default {} ({})", device.name, device.state),
            (Some(id), None) => format!("default {id} (not found)"),
            (None, None) => "no default device".to_string(),
        };
        format!("{discovery}; {devices}; {default}")
    }

    /// Removes a device from the live set and closes its session.
    ///
    /// A command already on the wire finishes; queued ones still go out before
    /// the session closes.  Returns `false` if the device was not known.
    pub async fn disconnect_device(&self, id: &str) -> bool {
        self.inner.sessions.lock().await.remove(id);
        let removed = self.inner.registry.write().await.remove(id).is_some();
        if removed {
            info!(device = %id, "device removed");
            self.inner.emit(LinkEvent::DeviceRemoved { id: id.to_string() });
        }
        removed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.inner.events.subscribe()
    }

    // ── Connections and commands ──────────────────────────────────────────────

    /// Starts connecting to `id`, or to the default device when `id` is
    /// `None`.
    ///
    /// Returns whether an attempt is under way (or the device is already
    /// connected).  The result of the attempt shows up in
    /// [`connection_state`](Self::connection_state).
    pub async fn connect_with_device(&self, id: Option<&str>) -> bool {
        if self.is_shut_down() {
            return false;
        }
        let record = self.inner.registry.read().await.resolve(id).cloned();
        match record {
            Some(record) => {
                self.inner.ensure_session(&record).await;
                true
            }
            None => {
                debug!(device = ?id, "connect requested for unknown device");
                false
            }
        }
    }

    /// Queues `command` for `device` (or the default device).
    ///
    /// A literal `<tag>` in `command` is replaced by `tag`, and the line is
    /// terminated with `\r`.  `completion` runs exactly once on the
    /// completion pump with an outcome carrying `tag`, including when the
    /// command is refused here, in which case this returns `false`.
    pub async fn send_command(
        &self,
        command: &str,
        tag: u32,
        device: Option<&str>,
        completion: CompletionCallback,
    ) -> bool {
        let record = self.inner.registry.read().await.resolve(device).cloned();
        let Some(record) = record else {
            let wanted = match device {
                Some(id) => id.to_string(),
                None => self
                    .default_device()
                    .await
                    .unwrap_or_else(|| "<no default device>".to_string()),
            };
            debug!(tag, device = %wanted, "command for unknown device");
            Completion::new(tag, device.map(str::to_string), completion, self.inner.pump.clone())
                .fire(Err(LinkError::DeviceNotFound(wanted)));
            return false;
        };

        let completion = Completion::new(
            tag,
            Some(record.id.clone()),
            completion,
            self.inner.pump.clone(),
        );
        if self.is_shut_down() {
            completion.fire(Err(LinkError::ShutDown));
            return false;
        }

        let jobs = self.inner.ensure_session(&record).await;
        let line = encode_command(command, tag);
        debug!(tag, device = %record.id, "queueing command");
        match jobs.send(QueuedCommand { line, completion }) {
            Ok(()) => true,
            Err(mpsc::error::SendError(queued)) => {
                queued.completion.fire(Err(LinkError::DeviceUnreachable {
                    device: record.id,
                    reason: "session closed".to_string(),
                }));
                false
            }
        }
    }

    /// Future form of [`send_command`](Self::send_command).
    pub async fn dispatch(&self, command: &str, tag: u32, device: Option<&str>) -> CommandReceipt {
        let (callback, receipt) = CommandReceipt::channel(tag);
        self.send_command(command, tag, device, callback).await;
        receipt
    }

    /// Stops discovery, closes every session and marks every device
    /// disconnected.  Commands still queued complete with
    /// [`LinkError::ShutDown`].
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down device link");
        self.stop_network_device_detection().await;

        let mut sessions = self.inner.sessions.lock().await;
        sessions.clear();
        let changed = self.inner.registry.write().await.disconnect_all();
        drop(sessions);
        for id in changed {
            self.inner.emit(LinkEvent::StateChanged {
                id,
                state: ConnectionState::Disconnected,
            });
        }
    }

    fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn emit(&self, event: LinkEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Updates the registry and announces real changes.
    async fn set_state(&self, id: &str, state: ConnectionState) {
        if state != ConnectionState::Disconnected && self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        let previous = self.registry.write().await.set_state(id, state);
        if previous.is_some_and(|previous| previous != state) {
            debug!(device = %id, %state, "connection state changed");
            self.emit(LinkEvent::StateChanged {
                id: id.to_string(),
                state,
            });
        }
    }

    async fn record_beacon(&self, beacon: DeviceBeacon) -> bool {
        let uuid = beacon.uuid.clone();
        let Some(record) = DeviceRecord::from_beacon(beacon, self.command_port) else {
            debug!(device = %uuid, "beacon without a usable address");
            return false;
        };
        let (id, address) = (record.id.clone(), record.address);
        let added = self.registry.write().await.upsert(record);
        if added {
            info!(device = %id, %address, "discovered device");
            self.emit(LinkEvent::DeviceDiscovered { id, address });
        }
        added
    }

    /// Returns the command queue of the device's session, starting one if
    /// none is open.
    async fn ensure_session(
        self: &Arc<Self>,
        record: &DeviceRecord,
    ) -> mpsc::UnboundedSender<QueuedCommand> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&record.id) {
            if !session.jobs.is_closed() {
                return session.jobs.clone();
            }
        }

        let session_id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let (jobs, queue) = mpsc::unbounded_channel();
        sessions.insert(
            record.id.clone(),
            Session {
                id: session_id,
                jobs: jobs.clone(),
            },
        );
        self.set_state(&record.id, ConnectionState::Connecting).await;
        drop(sessions);

        info!(device = %record.id, address = %record.address, "connecting");
        tokio::spawn(run_session(
            Arc::downgrade(self),
            Arc::clone(&self.connector),
            record.id.clone(),
            record.address,
            session_id,
            self.command_timeout,
            queue,
        ));
        jobs
    }

    /// Retires session `session_id` if it is still the device's current one.
    async fn end_session(&self, id: &str, session_id: u64) {
        let mut sessions = self.sessions.lock().await;
        let current = sessions.get(id).is_some_and(|s| s.id == session_id);
        if current {
            sessions.remove(id);
        }
        // A replaced or removed session leaves the state to its successor.
        if current || !sessions.contains_key(id) {
            self.set_state(id, ConnectionState::Disconnected).await;
        }
    }
}

/// Remembers `record` under `[[devices.known]]` if it is not there yet.
fn remember_device(config: &mut AppConfig, record: &DeviceRecord) {
    if config.devices.known.iter().any(|known| known.id == record.id) {
        return;
    }
    config.devices.known.push(KnownDevice {
        id: record.id.clone(),
        address: record.address.ip().to_string(),
        name: Some(record.name.clone()),
    });
}

async fn join_listener(listener: BeaconListener) {
    if let Some(thread) = listener.stop() {
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => {}
            _ => warn!("beacon listener thread did not exit cleanly"),
        }
    }
}

async fn beacon_pump(inner: Weak<Inner>, mut beacons: mpsc::Receiver<DeviceBeacon>) {
    while let Some(beacon) = beacons.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.record_beacon(beacon).await;
    }
    debug!("beacon pump stopped");
}

async fn run_session(
    inner: Weak<Inner>,
    connector: Arc<dyn DeviceConnector>,
    id: DeviceId,
    address: SocketAddr,
    session_id: u64,
    command_timeout: Duration,
    mut queue: mpsc::UnboundedReceiver<QueuedCommand>,
) {
    let unreachable = |reason: String| LinkError::DeviceUnreachable {
        device: id.clone(),
        reason,
    };

    let mut link = match connector.connect(address).await {
        Ok(link) => link,
        Err(e) => {
            warn!(device = %id, %address, "connection failed: {e}");
            if let Some(inner) = inner.upgrade() {
                inner.end_session(&id, session_id).await;
            }
            fail_queued(&mut queue, unreachable(e.to_string()));
            return;
        }
    };

    match inner.upgrade() {
        Some(strong) if !strong.shut_down.load(Ordering::SeqCst) => {
            info!(device = %id, "connected");
            strong.set_state(&id, ConnectionState::Connected).await;
        }
        _ => {
            fail_queued(&mut queue, LinkError::ShutDown);
            return;
        }
    }

    while let Some(job) = queue.recv().await {
        let shut_down = inner
            .upgrade()
            .map_or(true, |strong| strong.shut_down.load(Ordering::SeqCst));
        if shut_down {
            job.completion.fire(Err(LinkError::ShutDown));
            continue;
        }

        let tag = job.completion.tag();
        let result = exchange(link.as_mut(), &job.line, tag, command_timeout, &unreachable).await;
        let fatal = matches!(
            result,
            Err(LinkError::DeviceUnreachable { .. }
                | LinkError::CommandTimeout(_)
                | LinkError::CommandTransmissionFailure(_))
        );
        if let Err(e) = &result {
            warn!(device = %id, tag, "command failed: {e}");
        }
        job.completion.fire(result);
        if fatal {
            break;
        }
    }

    drop(link);
    if let Some(inner) = inner.upgrade() {
        inner.end_session(&id, session_id).await;
    }
    fail_queued(&mut queue, unreachable("session closed".to_string()));
    info!(device = %id, "disconnected");
}

/// One request/reply round trip.
///
/// Lines that cannot belong to this command are skipped: an IR reply
/// echoing another id, or a plain line while an IR reply is expected.
/// `ERR` lines always answer the command in flight.  `getdevices` replies
/// are collected up to `endlistdevices` and joined with `\n`.
async fn exchange(
    link: &mut dyn DeviceLink,
    line: &str,
    tag: u32,
    command_timeout: Duration,
    unreachable: &impl Fn(String) -> LinkError,
) -> Result<String, LinkError> {
    let keyword = line
        .trim_end_matches(['\r', '\n'])
        .split(',')
        .next()
        .unwrap_or_default()
        .to_string();
    let round_trip = async {
        link.send_line(line)
            .await
            .map_err(|e| LinkError::CommandTransmissionFailure(e.to_string()))?;

        let mut listing = Vec::new();
        loop {
            let reply = link
                .read_line()
                .await
                .map_err(|e| LinkError::CommandTransmissionFailure(e.to_string()))?
                .ok_or_else(|| unreachable("connection closed by device".to_string()))?;
            let response = parse_response(&reply)
                .map_err(|e| LinkError::CommandTransmissionFailure(e.to_string()))?;

            match &response {
                DeviceResponse::Error { .. } => {}
                _ if keyword == LIST_DEVICES => {
                    let done = reply == END_LIST_DEVICES;
                    listing.push(reply);
                    if done {
                        return Ok(listing.join("\n"));
                    }
                    continue;
                }
                DeviceResponse::CompleteIr { id, .. } | DeviceResponse::BusyIr { id, .. }
                    if *id != tag =>
                {
                    debug!(tag, echoed = id, "skipping reply for another command");
                    continue;
                }
                DeviceResponse::Ack(_) if keyword == SEND_IR => {
                    debug!(tag, %reply, "skipping stray line while waiting for IR reply");
                    continue;
                }
                _ => {}
            }
            return match response.failure_reason() {
                None => Ok(reply),
                Some(reason) => Err(LinkError::CommandRejected(reason)),
            };
        }
    };
    tokio::time::timeout(command_timeout, round_trip)
        .await
        .map_err(|_| LinkError::CommandTimeout(command_timeout.as_millis() as u64))?
}

/// Closes the queue and fails everything still in it.
fn fail_queued(queue: &mut mpsc::UnboundedReceiver<QueuedCommand>, error: LinkError) {
    queue.close();
    while let Ok(job) = queue.try_recv() {
        job.completion.fire(Err(error.clone()));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::transport::MockDeviceConnector;
    use crate::infrastructure::storage::config::{load_config_from, NetworkConfig};
    use crate::CommandOutcome;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io;
    use std::net::Ipv4Addr;
    use uuid::Uuid;

    /// Replies with the scripted lines in order, then stays silent.
    struct ScriptedLink {
        replies: VecDeque<String>,
        sent: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl DeviceLink for ScriptedLink {
        async fn send_line(&mut self, line: &str) -> io::Result<()> {
            self.sent.lock().expect("lock").push(line.to_string());
            Ok(())
        }

        async fn read_line(&mut self) -> io::Result<Option<String>> {
            match self.replies.pop_front() {
                Some(reply) => Ok(Some(reply)),
                None => std::future::pending().await,
            }
        }
    }

    fn scripted_connector(
        replies: &[&str],
    ) -> (Arc<MockDeviceConnector>, Arc<std::sync::Mutex<Vec<String>>>) {
        let sent = Arc::new(std::sync::Mutex::new(Vec::new()));
        let replies: Vec<String> = replies.iter().map(|r| r.to_string()).collect();
        let sink = Arc::clone(&sent);
        let mut connector = MockDeviceConnector::new();
        connector.expect_connect().returning(move |_| {
            let link: Box<dyn DeviceLink> = Box::new(ScriptedLink {
                replies: replies.iter().cloned().collect(),
                sent: Arc::clone(&sink),
            });
            Ok(link)
        });
        (Arc::new(connector), sent)
    }

    /// Answers every `sendir` with the `completeir` for its own id.
    struct EchoLink {
        pending: VecDeque<String>,
    }

    #[async_trait]
    impl DeviceLink for EchoLink {
        async fn send_line(&mut self, line: &str) -> io::Result<()> {
            let id = line.trim_end().split(',').nth(2).unwrap_or_default();
            self.pending.push_back(format!("completeir,1:1,{id}"));
            Ok(())
        }

        async fn read_line(&mut self) -> io::Result<Option<String>> {
            match self.pending.pop_front() {
                Some(reply) => Ok(Some(reply)),
                None => std::future::pending().await,
            }
        }
    }

    fn echo_connector() -> Arc<MockDeviceConnector> {
        let mut connector = MockDeviceConnector::new();
        connector.expect_connect().returning(|_| {
            let link: Box<dyn DeviceLink> = Box::new(EchoLink {
                pending: VecDeque::new(),
            });
            Ok(link)
        });
        Arc::new(connector)
    }

    fn refusing_connector() -> Arc<MockDeviceConnector> {
        let mut connector = MockDeviceConnector::new();
        connector.expect_connect().returning(|_| {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        });
        Arc::new(connector)
    }

    fn config_with_devices(ids: &[&str]) -> AppConfig {
        let mut config = AppConfig::default();
        config.network = NetworkConfig {
            bind_address: "127.0.0.1".to_string(),
            beacon_port: 0,
            join_multicast: false,
            command_timeout_ms: 100,
            ..NetworkConfig::default()
        };
        for (i, id) in ids.iter().enumerate() {
            config.devices.known.push(KnownDevice {
                id: id.to_string(),
                address: format!("10.0.0.{}", i + 1),
                name: None,
            });
        }
        config
    }

    async fn wait_for_state(manager: &ConnectionManager, id: &str, state: ConnectionState) {
        for _ in 0..200 {
            if manager.connection_state(id).await == Some(state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{id} never reached {state}");
    }

    async fn outcome_of(receipt: CommandReceipt) -> CommandOutcome {
        tokio::time::timeout(Duration::from_secs(5), receipt)
            .await
            .expect("completion within timeout")
    }

    // ── Connection ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_connect_without_default_or_devices_returns_false() {
        // Arrange
        let (connector, _) = scripted_connector(&[]);
        let manager = ConnectionManager::with_connector(config_with_devices(&[]), None, connector);

        // Act
        let dispatched = manager.connect_with_device(None).await;

        // Assert
        assert!(!dispatched);
        assert!(!manager.detecting_network_devices().await);
    }

    #[tokio::test]
    async fn test_connect_unknown_device_returns_false() {
        let (connector, _) = scripted_connector(&[]);
        let manager =
            ConnectionManager::with_connector(config_with_devices(&["GlobalCache_A"]), None, connector);

        assert!(!manager.connect_with_device(Some("GlobalCache_Z")).await);
    }

    #[tokio::test]
    async fn test_connect_default_device_reaches_connected() {
        // Arrange
        let (connector, _) = scripted_connector(&[]);
        let mut config = config_with_devices(&["GlobalCache_A"]);
        config.devices.default_device = Some("GlobalCache_A".to_string());
        let manager = ConnectionManager::with_connector(config, None, connector);

        // Act
        let dispatched = manager.connect_with_device(None).await;

        // Assert
        assert!(dispatched);
        wait_for_state(&manager, "GlobalCache_A", ConnectionState::Connected).await;
        assert!(manager.default_device_connected().await);
    }

    #[tokio::test]
    async fn test_failed_connect_ends_disconnected() {
        // Arrange
        let manager = ConnectionManager::with_connector(
            config_with_devices(&["GlobalCache_A"]),
            None,
            refusing_connector(),
        );
        let mut events = manager.subscribe();

        // Act
        assert!(manager.connect_with_device(Some("GlobalCache_A")).await);

        // Assert
        let first = events.recv().await.expect("event");
        assert_eq!(
            first,
            LinkEvent::StateChanged {
                id: "GlobalCache_A".to_string(),
                state: ConnectionState::Connecting
            }
        );
        wait_for_state(&manager, "GlobalCache_A", ConnectionState::Disconnected).await;
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_send_to_unknown_device_completes_with_not_found() {
        // Arrange
        let (connector, _) = scripted_connector(&[]);
        let manager = ConnectionManager::with_connector(config_with_devices(&[]), None, connector);
        let (callback, receipt) = CommandReceipt::channel(17);

        // Act
        let accepted = manager
            .send_command("getversion", 17, Some("GlobalCache_Z"), callback)
            .await;

        // Assert
        assert!(!accepted);
        let outcome = outcome_of(receipt).await;
        assert_eq!(outcome.tag, 17);
        assert_eq!(
            outcome.result,
            Err(LinkError::DeviceNotFound("GlobalCache_Z".to_string()))
        );
    }

    #[tokio::test]
    async fn test_send_connects_on_demand_and_substitutes_tag() {
        // Arrange
        let (connector, sent) = scripted_connector(&["completeir,1:1,42"]);
        let manager =
            ConnectionManager::with_connector(config_with_devices(&["GlobalCache_A"]), None, connector);

        // Act
        let receipt = manager
            .dispatch("sendir,1:1,<tag>,38000,1,1,24,24", 42, Some("GlobalCache_A"))
            .await;
        let outcome = outcome_of(receipt).await;

        // Assert
        assert_eq!(outcome.tag, 42);
        assert_eq!(outcome.result, Ok("completeir,1:1,42".to_string()));
        assert_eq!(
            sent.lock().expect("lock").as_slice(),
            ["sendir,1:1,42,38000,1,1,24,24\r"]
        );
        wait_for_state(&manager, "GlobalCache_A", ConnectionState::Connected).await;
    }

    #[tokio::test]
    async fn test_busy_reply_rejects_command_but_keeps_connection() {
        // Arrange
        let (connector, _) = scripted_connector(&["busyIR,1:1,5", "completeir,1:1,6"]);
        let manager =
            ConnectionManager::with_connector(config_with_devices(&["GlobalCache_A"]), None, connector);

        // Act
        let first = outcome_of(manager.dispatch("sendir,<tag>", 5, Some("GlobalCache_A")).await).await;
        let second = outcome_of(manager.dispatch("sendir,<tag>", 6, Some("GlobalCache_A")).await).await;

        // Assert
        assert!(matches!(first.result, Err(LinkError::CommandRejected(_))));
        assert!(second.is_success());
        assert_eq!(
            manager.connection_state("GlobalCache_A").await,
            Some(ConnectionState::Connected)
        );
    }

    #[tokio::test]
    async fn test_stale_ir_reply_is_skipped_for_matching_id() {
        // Arrange
        let (connector, _) = scripted_connector(&["completeir,1:1,99", "completeir,1:1,7"]);
        let manager =
            ConnectionManager::with_connector(config_with_devices(&["GlobalCache_A"]), None, connector);

        // Act
        let outcome = outcome_of(
            manager
                .dispatch("sendir,1:1,<tag>,38000,1,1,24,24", 7, Some("GlobalCache_A"))
                .await,
        )
        .await;

        // Assert
        assert_eq!(outcome.tag, 7);
        assert_eq!(outcome.result, Ok("completeir,1:1,7".to_string()));
    }

    #[tokio::test]
    async fn test_device_listing_is_read_to_its_end_marker() {
        // Arrange
        let (connector, _) = scripted_connector(&[
            "device,0,0 ETHERNET",
            "device,1,3 IR",
            "endlistdevices",
            "completeir,1:1,7",
        ]);
        let manager =
            ConnectionManager::with_connector(config_with_devices(&["GlobalCache_A"]), None, connector);

        // Act
        let listing = outcome_of(manager.dispatch("getdevices", 1, Some("GlobalCache_A")).await).await;
        let ir = outcome_of(
            manager
                .dispatch("sendir,1:1,<tag>,38000,1,1,24,24", 7, Some("GlobalCache_A"))
                .await,
        )
        .await;

        // Assert
        assert_eq!(
            listing.result,
            Ok("device,0,0 ETHERNET\ndevice,1,3 IR\nendlistdevices".to_string())
        );
        assert_eq!(ir.result, Ok("completeir,1:1,7".to_string()));
    }

    #[tokio::test]
    async fn test_stray_line_before_ir_reply_is_skipped() {
        let (connector, _) = scripted_connector(&["device,1,3 IR", "completeir,1:1,4"]);
        let manager =
            ConnectionManager::with_connector(config_with_devices(&["GlobalCache_A"]), None, connector);

        let outcome =
            outcome_of(manager.dispatch("sendir,1:1,<tag>,38000,1,1,24,24", 4, Some("GlobalCache_A")).await)
                .await;

        assert_eq!(outcome.result, Ok("completeir,1:1,4".to_string()));
    }

    #[tokio::test]
    async fn test_error_reply_carries_description() {
        let (connector, _) = scripted_connector(&["ERR_1:1,010"]);
        let manager =
            ConnectionManager::with_connector(config_with_devices(&["GlobalCache_A"]), None, connector);

        let outcome = outcome_of(manager.dispatch("sendir", 1, Some("GlobalCache_A")).await).await;

        match outcome.result {
            Err(LinkError::CommandRejected(reason)) => assert!(reason.starts_with("ERR 010")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_silent_device_times_out_and_disconnects() {
        // Arrange
        let (connector, _) = scripted_connector(&[]);
        let manager =
            ConnectionManager::with_connector(config_with_devices(&["GlobalCache_A"]), None, connector);

        // Act
        let outcome = outcome_of(manager.dispatch("getversion", 3, Some("GlobalCache_A")).await).await;

        // Assert
        assert_eq!(outcome.result, Err(LinkError::CommandTimeout(100)));
        wait_for_state(&manager, "GlobalCache_A", ConnectionState::Disconnected).await;
    }

    #[tokio::test]
    async fn test_unreachable_device_fails_queued_command() {
        let manager = ConnectionManager::with_connector(
            config_with_devices(&["GlobalCache_A"]),
            None,
            refusing_connector(),
        );

        let outcome = outcome_of(manager.dispatch("getversion", 8, Some("GlobalCache_A")).await).await;

        assert_eq!(outcome.tag, 8);
        assert!(matches!(
            outcome.result,
            Err(LinkError::DeviceUnreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_sends_complete_once_with_their_own_tags() {
        // Arrange
        let manager = ConnectionManager::with_connector(
            config_with_devices(&["GlobalCache_A", "GlobalCache_B"]),
            None,
            echo_connector(),
        );
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        // Act
        let mut tasks = Vec::new();
        for tag in 0..10u32 {
            let manager = manager.clone();
            let seen = Arc::clone(&seen);
            tasks.push(tokio::spawn(async move {
                let device = if tag % 2 == 0 { "GlobalCache_A" } else { "GlobalCache_B" };
                let (tx, rx) = tokio::sync::oneshot::channel();
                let callback: CompletionCallback = Box::new(move |outcome| {
                    seen.lock().expect("lock").push(outcome.tag);
                    let _ = tx.send(());
                });
                manager
                    .send_command("sendir,1:1,<tag>,38000,1,1,24,24", tag, Some(device), callback)
                    .await;
                rx.await.expect("completion fired");
            }));
        }
        for task in tasks {
            task.await.expect("task");
        }

        // Assert
        let mut tags = seen.lock().expect("lock").clone();
        tags.sort_unstable();
        assert_eq!(tags, (0..10).collect::<Vec<_>>());
    }

    // ── Discovery ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_detect_twice_keeps_single_listener() {
        // Arrange
        let (connector, _) = scripted_connector(&[]);
        let manager = ConnectionManager::with_connector(config_with_devices(&[]), None, connector);

        // Act
        manager.detect_network_devices().await.expect("first");
        let first = manager.discovery_address().await;
        manager.detect_network_devices().await.expect("second");
        let second = manager.discovery_address().await;

        // Assert
        assert!(manager.detecting_network_devices().await);
        assert!(first.is_some());
        assert_eq!(first, second);

        manager.stop_network_device_detection().await;
        assert!(!manager.detecting_network_devices().await);
    }

    #[tokio::test]
    async fn test_stop_when_not_detecting_is_harmless() {
        let (connector, _) = scripted_connector(&[]);
        let manager = ConnectionManager::with_connector(config_with_devices(&[]), None, connector);

        manager.stop_network_device_detection().await;

        assert!(!manager.detecting_network_devices().await);
    }

    #[tokio::test]
    async fn test_detect_with_bad_group_is_bind_failure() {
        // Arrange
        let (connector, _) = scripted_connector(&[]);
        let mut config = config_with_devices(&[]);
        config.network.join_multicast = true;
        config.network.multicast_group = "10.1.1.1".to_string();
        let manager = ConnectionManager::with_connector(config, None, connector);

        // Act
        let result = manager.detect_network_devices().await;

        // Assert
        assert!(matches!(result, Err(LinkError::SocketBindFailure(_))));
        assert!(!manager.detecting_network_devices().await);
    }

    #[tokio::test]
    async fn test_register_beacon_announces_new_device_once() {
        // Arrange
        let (connector, _) = scripted_connector(&[]);
        let manager = ConnectionManager::with_connector(config_with_devices(&[]), None, connector);
        let mut events = manager.subscribe();
        let beacon = remote_core::parse_beacon(
            "AMXB<-UUID=GlobalCache_1><-Model=iTachIP2IR><-Make=GlobalCache>",
            Some(Ipv4Addr::new(192, 168, 1, 9).into()),
        )
        .expect("beacon");

        // Act
        let first = manager.register_beacon(beacon.clone()).await;
        let second = manager.register_beacon(beacon).await;

        // Assert
        assert!(first);
        assert!(!second);
        assert_eq!(
            events.recv().await.expect("event"),
            LinkEvent::DeviceDiscovered {
                id: "GlobalCache_1".to_string(),
                address: "192.168.1.9:4998".parse().expect("addr"),
            }
        );
        let device = manager.device("GlobalCache_1").await.expect("device");
        assert_eq!(device.name, "iTachIP2IR-GlobalCache");
    }

    // ── Default device, status, teardown ──────────────────────────────────────

    #[tokio::test]
    async fn test_set_default_device_persists_to_config_file() {
        // Arrange
        let path = std::env::temp_dir()
            .join(format!("remote-link-test-{}", Uuid::new_v4()))
            .join("config.toml");
        let (connector, _) = scripted_connector(&[]);
        let manager = ConnectionManager::with_connector(config_with_devices(&[]), Some(path.clone()), connector);
        let beacon = remote_core::parse_beacon(
            "AMXB<-UUID=GlobalCache_1><-Config-URL=http://192.168.1.9>",
            None,
        )
        .expect("beacon");
        manager.register_beacon(beacon).await;

        // Act
        manager
            .set_default_device(Some("GlobalCache_1".to_string()))
            .await
            .expect("persist");

        // Assert
        let saved = load_config_from(&path).expect("load");
        assert_eq!(saved.devices.default_device.as_deref(), Some("GlobalCache_1"));
        assert_eq!(saved.devices.known.len(), 1);
        assert_eq!(saved.devices.known[0].address, "192.168.1.9");
        assert_eq!(manager.default_device().await.as_deref(), Some("GlobalCache_1"));

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn test_status_description_summarises_registry() {
        // Arrange
        let (connector, _) = scripted_connector(&[]);
        let mut config = config_with_devices(&["GlobalCache_A", "GlobalCache_B"]);
        config.devices.default_device = Some("GlobalCache_B".to_string());
        let manager = ConnectionManager::with_connector(config, None, connector);

        // Act
        let status = manager.status_description().await;

        // Assert
        assert_eq!(
            status,
            "not detecting; 2 devices (0 connected); default GlobalCache_B (disconnected)"
        );
    }

    #[tokio::test]
    async fn test_disconnect_device_removes_it_from_live_set() {
        let (connector, _) = scripted_connector(&[]);
        let manager =
            ConnectionManager::with_connector(config_with_devices(&["GlobalCache_A"]), None, connector);

        assert!(manager.disconnect_device("GlobalCache_A").await);
        assert!(!manager.disconnect_device("GlobalCache_A").await);
        assert!(manager.devices().await.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_everything() {
        // Arrange
        let (connector, _) = scripted_connector(&[]);
        let manager =
            ConnectionManager::with_connector(config_with_devices(&["GlobalCache_A"]), None, connector);
        manager.connect_with_device(Some("GlobalCache_A")).await;
        wait_for_state(&manager, "GlobalCache_A", ConnectionState::Connected).await;

        // Act
        manager.shutdown().await;
        let after = outcome_of(manager.dispatch("getversion", 4, Some("GlobalCache_A")).await).await;

        // Assert
        assert_eq!(
            manager.connection_state("GlobalCache_A").await,
            Some(ConnectionState::Disconnected)
        );
        assert_eq!(after.result, Err(LinkError::ShutDown));
        assert!(!manager.connect_with_device(Some("GlobalCache_A")).await);
    }
}
