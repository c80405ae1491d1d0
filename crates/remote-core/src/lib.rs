//! # remote-core
//!
//! Shared library for the remote editor: the element tree, its layout
//! constraints, the textual constraint format, JSON import/export and the
//! iTach wire protocol.
//!
//! Nothing in this crate opens a socket or touches the filesystem; the
//! `remote-link` crate does the I/O.
//!
//! # Architecture overview (for beginners)
//!
//! A *remote* is a screen of buttons grouped into button groups.  Each element
//! is placed by layout constraints instead of fixed coordinates, so a remote
//! adapts to different screens.  Editing a remote (dragging a button, making
//! two buttons the same width) means rewriting those constraints without
//! leaving any element over- or under-determined.
//!
//! - **`domain`** – The element tree, the constraint model and the
//!   [`ConstraintManager`] that performs the editing operations.
//!
//! - **`format`** – The line-oriented text format for constraints
//!   (`"b.left = a.right + 8 @750"`), parsed and printed.
//!
//! - **`import`** – Loading and saving a whole remote as JSON.
//!
//! - **`protocol`** – The Global Caché iTach protocol: discovery beacons,
//!   IR command strings and device responses.

pub mod domain;
pub mod format;
pub mod import;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `remote_core::ElementGraph` instead of `remote_core::domain::graph::ElementGraph`.
pub use domain::constraint::{
    Axis, ConstraintId, LayoutAttribute, LayoutConstraint, Relation, PRIORITY_REQUIRED,
};
pub use domain::constraint_manager::ConstraintManager;
pub use domain::element::{ElementId, ElementKind, RemoteElement};
pub use domain::geometry::{Metrics, Point, Rect, Size};
pub use domain::graph::{ConstraintError, ElementGraph, LayoutConfiguration, Order};
pub use format::{FormatError, PseudoConstraint};
pub use import::{export_remote, import_remote, ImportError};
pub use protocol::beacon::{parse_beacon, DeviceBeacon};
pub use protocol::command::{
    encode_command, parse_response, DeviceResponse, IrCode, ProtocolError,
};
