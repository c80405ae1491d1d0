//! Network infrastructure.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Listens for iTach `AMXB` beacons on the multicast
//!   group and forwards decoded beacons over an async channel.
//!
//! - **`transport`** – The `DeviceConnector` / `DeviceLink` seam and its TCP
//!   implementation speaking the carriage-return-terminated command protocol.
//!
//! - **`connection_manager`** – The `ConnectionManager` service: discovery
//!   lifecycle, per-device sessions, command dispatch and status.

pub mod connection_manager;
pub mod discovery;
pub mod transport;
