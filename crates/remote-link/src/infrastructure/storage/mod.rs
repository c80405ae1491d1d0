//! Storage infrastructure.
//!
//! - **`config`** – Loads and saves the TOML configuration file, including
//!   remembered devices and the default-device selection.

pub mod config;
