//! remote-link library entry point.
//!
//! Discovers Global Caché iTach IR blasters on the local network, keeps
//! track of their connection state and delivers commands to them.  The
//! binary in `main.rs` and the integration tests in `tests/` share this
//! module tree.

pub mod application;
pub mod infrastructure;

pub use application::completion::{
    CommandOutcome, CommandReceipt, CompletionCallback, LinkError,
};
pub use application::manage_devices::{ConnectionState, DeviceId, DeviceRecord};
pub use infrastructure::network::connection_manager::{ConnectionManager, LinkEvent};
