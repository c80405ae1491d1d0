//! Infrastructure layer of the device link.
//!
//! Contains the OS-facing adapters: the beacon listener thread, the TCP
//! command transport, the connection manager that drives them, and TOML
//! configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `remote_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
