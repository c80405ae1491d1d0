//! Multicast beacon listener.
//!
//! iTach units announce themselves roughly once a minute by sending an
//! `AMXB<-UUID=...><-Model=...>...` datagram to the multicast group
//! `239.255.250.250`, port `9131`.  The listener binds that port, joins the
//! group, and forwards every beacon it can decode over an async channel.
//!
//! # Threading
//!
//! The socket is a blocking `std::net::UdpSocket` driven by a dedicated,
//! named thread, which keeps synchronous socket I/O off the Tokio runtime.
//! The thread owns the socket outright, so stopping the listener while a
//! datagram is being processed cannot release the socket from under it.
//!
//! # Read timeout
//!
//! `recv_from` is given a 500 ms read timeout.  After every timeout the loop
//! re-checks the `running` flag, which bounds how long [`BeaconListener::stop`]
//! takes to be observed.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use remote_core::{parse_beacon, DeviceBeacon, ProtocolError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::infrastructure::storage::config::{ConfigError, NetworkConfig};

/// Error type for the beacon listener.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The configured addresses are unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The UDP socket could not be bound.
    #[error("failed to bind beacon socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The socket could not join the multicast group.
    #[error("failed to join multicast group {group}: {source}")]
    JoinFailed {
        group: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    /// The listener thread could not be started.
    #[error("failed to spawn beacon listener thread: {0}")]
    Spawn(std::io::Error),
}

/// Where and how the listener binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerSettings {
    pub bind_address: Ipv4Addr,
    pub port: u16,
    /// Group to join after binding; `None` listens for unicast/broadcast only.
    pub multicast_group: Option<Ipv4Addr>,
}

impl ListenerSettings {
    /// Derives listener settings from the `[network]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if an address field is unusable.
    pub fn from_config(network: &NetworkConfig) -> Result<Self, ConfigError> {
        let multicast_group = if network.join_multicast {
            Some(network.multicast_group_addr()?)
        } else {
            None
        };
        Ok(Self {
            bind_address: network.bind_addr()?,
            port: network.beacon_port,
            multicast_group,
        })
    }
}

/// A running beacon listener.
///
/// Dropping the handle signals the thread to stop.
pub struct BeaconListener {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl BeaconListener {
    /// Binds the beacon socket, joins the group and starts the listener thread.
    ///
    /// Returns the handle plus a receiver of decoded beacons.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::BindFailed`] or [`DiscoveryError::JoinFailed`]
    /// when the socket cannot be set up, and [`DiscoveryError::Spawn`] if the
    /// thread cannot be created.
    pub fn start(
        settings: ListenerSettings,
    ) -> Result<(Self, mpsc::Receiver<DeviceBeacon>), DiscoveryError> {
        let addr = SocketAddr::V4(SocketAddrV4::new(settings.bind_address, settings.port));
        let socket =
            UdpSocket::bind(addr).map_err(|source| DiscoveryError::BindFailed { addr, source })?;
        if let Some(group) = settings.multicast_group {
            socket
                .join_multicast_v4(&group, &settings.bind_address)
                .map_err(|source| DiscoveryError::JoinFailed { group, source })?;
        }
        if let Err(e) = socket.set_read_timeout(Some(Duration::from_millis(500))) {
            warn!("could not set beacon socket read timeout: {e}");
        }
        let local_addr = socket
            .local_addr()
            .map_err(|source| DiscoveryError::BindFailed { addr, source })?;

        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel(64);

        let thread_running = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("remote-link-discovery".to_string())
            .spawn(move || beacon_loop(socket, settings, tx, thread_running))
            .map_err(DiscoveryError::Spawn)?;

        info!("beacon listener on UDP {local_addr}");
        Ok((
            Self {
                running,
                thread: Some(thread),
                local_addr,
            },
            rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `true` until the listener is stopped or its thread exits.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signals the thread to stop and hands back its join handle.
    ///
    /// The thread notices within one read timeout.  Joining the handle waits
    /// until the socket has actually been released.
    pub fn stop(mut self) -> Option<JoinHandle<()>> {
        self.running.store(false, Ordering::Relaxed);
        self.thread.take()
    }
}

impl Drop for BeaconListener {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

fn beacon_loop(
    socket: UdpSocket,
    settings: ListenerSettings,
    tx: mpsc::Sender<DeviceBeacon>,
    running: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; 2048];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                error!("beacon recv error: {e}");
                continue;
            }
        };

        let payload = String::from_utf8_lossy(&buf[..len]);
        match parse_beacon(&payload, Some(src.ip())) {
            Ok(beacon) => {
                debug!(uuid = %beacon.uuid, model = %beacon.model, "beacon from {src}");
                if tx.blocking_send(beacon).is_err() {
                    // Receiver dropped: the manager is shutting down.
                    break;
                }
            }
            Err(ProtocolError::NotABeacon(_)) => {
                debug!("ignoring non-beacon datagram from {src}");
            }
            Err(e) => warn!("undecodable beacon from {src}: {e}"),
        }
    }

    if let Some(group) = settings.multicast_group {
        if let Err(e) = socket.leave_multicast_v4(&group, &settings.bind_address) {
            debug!("leaving multicast group {group}: {e}");
        }
    }
    info!("beacon listener stopped");
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
