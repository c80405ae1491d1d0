//! Device registry and per-device connection state.
//!
//! The `DeviceRegistry` is the single live set of iTach units the link knows
//! about, whether they announced themselves with a beacon or were remembered
//! in the config file.  It also holds the default-device selection that
//! operations without an explicit device fall back to.
//!
//! # Connection lifecycle
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected
//!      ▲               │              │
//!      └───────────────┴──────────────┘
//!           (failure, timeout or teardown)
//! ```
//!
//! A device never stays in an in-between state after a failure: every error
//! path drives it back to `Disconnected`.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use remote_core::DeviceBeacon;
use serde::Serialize;

/// Identifier a device announces in its beacon (e.g. `GlobalCache_000C1E024239`).
///
/// iTach identifiers are vendor strings rather than RFC 4122 UUIDs, so they
/// are kept as text.
pub type DeviceId = String;

/// Connection state of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(text)
    }
}

/// Everything the link knows about one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub name: String,
    /// Address of the device's command service.
    pub address: SocketAddr,
    pub state: ConnectionState,
    /// Most recent beacon, absent for devices loaded from configuration.
    pub beacon: Option<DeviceBeacon>,
}

impl DeviceRecord {
    /// Builds a record from a decoded beacon.  Returns `None` when the beacon
    /// carries no usable address.
    pub fn from_beacon(beacon: DeviceBeacon, command_port: u16) -> Option<Self> {
        let ip = beacon.address?;
        Some(Self {
            id: beacon.uuid.clone(),
            name: beacon.display_name(),
            address: SocketAddr::new(ip, command_port),
            state: ConnectionState::Disconnected,
            beacon: Some(beacon),
        })
    }

    pub fn known(id: DeviceId, name: Option<String>, ip: IpAddr, command_port: u16) -> Self {
        Self {
            name: name.unwrap_or_else(|| id.clone()),
            id,
            address: SocketAddr::new(ip, command_port),
            state: ConnectionState::Disconnected,
            beacon: None,
        }
    }
}

/// In-memory registry of every known device plus the default selection.
///
/// Shared behind an async `RwLock` by the connection manager, so every read
/// sees a whole snapshot and every mutation is serialized.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, DeviceRecord>,
    default_device: Option<DeviceId>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device or refreshes an existing one.
    ///
    /// A refresh updates the address, name and beacon but keeps the current
    /// connection state.  Returns `true` when the device was not known before.
    pub fn upsert(&mut self, record: DeviceRecord) -> bool {
        match self.devices.get_mut(&record.id) {
            Some(existing) => {
                existing.address = record.address;
                existing.name = record.name;
                if record.beacon.is_some() {
                    existing.beacon = record.beacon;
                }
                false
            }
            None => {
                self.devices.insert(record.id.clone(), record);
                true
            }
        }
    }

    /// Returns a snapshot of all devices, ordered by identifier.
    pub fn all(&self) -> Vec<DeviceRecord> {
        let mut devices: Vec<_> = self.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    pub fn get(&self, id: &str) -> Option<&DeviceRecord> {
        self.devices.get(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Updates the connection state of a device.
    ///
    /// Returns the previous state, or `None` if the device is unknown.
    pub fn set_state(&mut self, id: &str, state: ConnectionState) -> Option<ConnectionState> {
        self.devices
            .get_mut(id)
            .map(|device| std::mem::replace(&mut device.state, state))
    }

    /// Marks every device disconnected and returns the ids that changed.
    pub fn disconnect_all(&mut self) -> Vec<DeviceId> {
        let mut changed = Vec::new();
        for device in self.devices.values_mut() {
            if device.state != ConnectionState::Disconnected {
                device.state = ConnectionState::Disconnected;
                changed.push(device.id.clone());
            }
        }
        changed.sort();
        changed
    }

    /// Removes a device from the live set.
    ///
    /// The default selection is kept, so a device that comes back with a new
    /// beacon is still the default.
    pub fn remove(&mut self, id: &str) -> Option<DeviceRecord> {
        self.devices.remove(id)
    }

    pub fn default_device(&self) -> Option<&str> {
        self.default_device.as_deref()
    }

    pub fn set_default_device(&mut self, id: Option<DeviceId>) {
        self.default_device = id;
    }

    /// Resolves an explicit device id, or the default when `id` is `None`.
    pub fn resolve(&self, id: Option<&str>) -> Option<&DeviceRecord> {
        let id = id.or(self.default_device.as_deref())?;
        self.devices.get(id)
    }

    /// `true` when a default is set, known, and connected.
    pub fn default_device_connected(&self) -> bool {
        self.resolve(None)
            .is_some_and(|device| device.state == ConnectionState::Connected)
    }

    pub fn connected_count(&self) -> usize {
        self.devices
            .values()
            .filter(|device| device.state == ConnectionState::Connected)
            .count()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn make_device(id: &str) -> DeviceRecord {
        DeviceRecord::known(
            id.to_string(),
            None,
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
            4998,
        )
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = DeviceRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.default_device(), None);
    }

    #[test]
    fn test_upsert_reports_new_devices_only() {
        // Arrange
        let mut registry = DeviceRegistry::new();

        // Act
        let first = registry.upsert(make_device("GlobalCache_A"));
        let second = registry.upsert(make_device("GlobalCache_A"));

        // Assert
        assert!(first);
        assert!(!second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_upsert_refresh_keeps_connection_state() {
        // Arrange
        let mut registry = DeviceRegistry::new();
        registry.upsert(make_device("GlobalCache_A"));
        registry.set_state("GlobalCache_A", ConnectionState::Connected);
        let mut moved = make_device("GlobalCache_A");
        moved.address = "10.0.0.9:4998".parse().expect("addr");

        // Act
        registry.upsert(moved);

        // Assert
        let device = registry.get("GlobalCache_A").expect("device");
        assert_eq!(device.state, ConnectionState::Connected);
        assert_eq!(device.address.ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)));
    }

    #[test]
    fn test_set_state_returns_previous_state() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(make_device("GlobalCache_A"));

        let previous = registry.set_state("GlobalCache_A", ConnectionState::Connecting);

        assert_eq!(previous, Some(ConnectionState::Disconnected));
        assert_eq!(registry.set_state("missing", ConnectionState::Connected), None);
    }

    #[test]
    fn test_all_is_sorted_by_id() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(make_device("GlobalCache_C"));
        registry.upsert(make_device("GlobalCache_A"));
        registry.upsert(make_device("GlobalCache_B"));

        let ids: Vec<_> = registry.all().into_iter().map(|d| d.id).collect();

        assert_eq!(ids, ["GlobalCache_A", "GlobalCache_B", "GlobalCache_C"]);
    }

    #[test]
    fn test_resolve_falls_back_to_default_device() {
        // Arrange
        let mut registry = DeviceRegistry::new();
        registry.upsert(make_device("GlobalCache_A"));
        registry.upsert(make_device("GlobalCache_B"));
        registry.set_default_device(Some("GlobalCache_B".to_string()));

        // Act / Assert
        assert_eq!(
            registry.resolve(None).map(|d| d.id.as_str()),
            Some("GlobalCache_B")
        );
        assert_eq!(
            registry.resolve(Some("GlobalCache_A")).map(|d| d.id.as_str()),
            Some("GlobalCache_A")
        );
    }

    #[test]
    fn test_resolve_without_default_is_none() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(make_device("GlobalCache_A"));
        assert!(registry.resolve(None).is_none());
    }

    #[test]
    fn test_default_device_connected_tracks_state() {
        // Arrange
        let mut registry = DeviceRegistry::new();
        registry.upsert(make_device("GlobalCache_A"));
        registry.set_default_device(Some("GlobalCache_A".to_string()));
        assert!(!registry.default_device_connected());

        // Act
        registry.set_state("GlobalCache_A", ConnectionState::Connected);

        // Assert
        assert!(registry.default_device_connected());
    }

    #[test]
    fn test_remove_keeps_default_selection() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(make_device("GlobalCache_A"));
        registry.set_default_device(Some("GlobalCache_A".to_string()));

        let removed = registry.remove("GlobalCache_A");

        assert!(removed.is_some());
        assert_eq!(registry.default_device(), Some("GlobalCache_A"));
        assert!(registry.resolve(None).is_none());
    }

    #[test]
    fn test_disconnect_all_reports_changed_devices() {
        // Arrange
        let mut registry = DeviceRegistry::new();
        registry.upsert(make_device("GlobalCache_A"));
        registry.upsert(make_device("GlobalCache_B"));
        registry.set_state("GlobalCache_B", ConnectionState::Connected);

        // Act
        let changed = registry.disconnect_all();

        // Assert
        assert_eq!(changed, ["GlobalCache_B"]);
        assert_eq!(registry.connected_count(), 0);
    }

    #[test]
    fn test_from_beacon_uses_command_port() {
        // Arrange
        let beacon = remote_core::parse_beacon(
            "AMXB<-UUID=GlobalCache_000C1E024239><-Model=iTachIP2IR><-Make=GlobalCache><-Config-URL=http://192.168.1.70>",
            None,
        )
        .expect("beacon");

        // Act
        let record = DeviceRecord::from_beacon(beacon, 4998).expect("record");

        // Assert
        assert_eq!(record.id, "GlobalCache_000C1E024239");
        assert_eq!(record.address, "192.168.1.70:4998".parse().expect("addr"));
        assert_eq!(record.state, ConnectionState::Disconnected);
    }
}
