//! Application layer of the device link.
//!
//! # What lives here (for beginners)
//!
//! This layer holds the state and rules of the link without touching a
//! socket.  The infrastructure layer owns the sockets and calls in here to
//! record what it learned (a beacon arrived, a connection dropped) and to
//! report results back to callers.
//!
//! # Sub-modules
//!
//! - **`manage_devices`** – The live registry of known iTach units, their
//!   connection states and the default-device selection.
//!
//! - **`completion`** – Exactly-once command completions, the future-style
//!   `CommandReceipt`, and the pump that runs every completion callback on
//!   one task.

pub mod completion;
pub mod manage_devices;
