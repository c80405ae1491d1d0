//! Global Caché iTach protocol: discovery beacons and the text command set.

pub mod beacon;
pub mod command;

pub use beacon::{parse_beacon, DeviceBeacon, BEACON_PREFIX};
pub use command::{
    encode_command, error_description, parse_response, DeviceResponse, IrCode, ProtocolError,
    TAG_PLACEHOLDER,
};
