//! iTach discovery beacons.
//!
//! Devices announce themselves by multicasting a datagram such as:
//!
//! ```text
//! AMXB<-UUID=GlobalCache_000C1E024239><-SDKClass=Utility><-Make=GlobalCache>
//! <-Model=iTachIP2IR><-Revision=710-1005-05><-Pkg_Level=GCPK002>
//! <-Config-URL=http://192.168.1.70><-PCB_PN=025-0026-06><-Status=Ready>
//! ```
//!
//! (on one line, terminated by `\r`).

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::command::ProtocolError;

/// Every beacon starts with this marker.
pub const BEACON_PREFIX: &str = "AMXB";

/// Decoded beacon fields.  Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBeacon {
    pub uuid: String,
    pub sdk_class: String,
    pub make: String,
    pub model: String,
    pub revision: String,
    pub pkg_level: String,
    /// Configuration page host, without the `http://` prefix.
    pub config_url: String,
    pub pcb_pn: String,
    pub status: String,
    /// Where commands go: the config URL's host, or the datagram source.
    pub address: Option<IpAddr>,
}

impl DeviceBeacon {
    /// `"<model>-<make>"`, or whichever of the two is present, or the UUID.
    pub fn display_name(&self) -> String {
        match (self.model.is_empty(), self.make.is_empty()) {
            (false, false) => format!("{}-{}", self.model, self.make),
            (false, true) => self.model.clone(),
            (true, false) => self.make.clone(),
            (true, true) => self.uuid.clone(),
        }
    }
}

impl fmt::Display for DeviceBeacon {
    /// Writes the wire form (without the trailing `\r`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{BEACON_PREFIX}")?;
        let fields = [
            ("UUID", &self.uuid),
            ("SDKClass", &self.sdk_class),
            ("Make", &self.make),
            ("Model", &self.model),
            ("Revision", &self.revision),
            ("Pkg_Level", &self.pkg_level),
            ("Config-URL", &self.config_url),
            ("PCB_PN", &self.pcb_pn),
            ("Status", &self.status),
        ];
        for (key, value) in fields {
            if key == "Config-URL" && !value.is_empty() {
                write!(f, "<-{key}=http://{value}>")?;
            } else if !value.is_empty() {
                write!(f, "<-{key}={value}>")?;
            }
        }
        Ok(())
    }
}

/// Decodes a beacon datagram.  `source` is the sender's address, used when
/// the config URL does not name a host.
pub fn parse_beacon(payload: &str, source: Option<IpAddr>) -> Result<DeviceBeacon, ProtocolError> {
    let payload = payload.trim_end_matches(['\r', '\n', '\0']);
    let body = payload
        .strip_prefix(BEACON_PREFIX)
        .ok_or_else(|| ProtocolError::NotABeacon(payload.chars().take(32).collect()))?;

    let mut beacon = DeviceBeacon::default();
    for field in body.split('>').map(str::trim).filter(|f| !f.is_empty()) {
        let field = field
            .strip_prefix("<-")
            .ok_or_else(|| ProtocolError::MalformedBeacon(format!("bad field {field:?}")))?;
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| ProtocolError::MalformedBeacon(format!("field {field:?} has no value")))?;
        let value = value.to_string();
        match key {
            "UUID" => beacon.uuid = value,
            "SDKClass" => beacon.sdk_class = value,
            "Make" => beacon.make = value,
            "Model" => beacon.model = value,
            "Revision" => beacon.revision = value,
            "Pkg_Level" => beacon.pkg_level = value,
            "Config-URL" => {
                beacon.config_url = value
                    .strip_prefix("http://")
                    .map(str::to_string)
                    .unwrap_or(value)
            }
            "PCB_PN" => beacon.pcb_pn = value,
            "Status" => beacon.status = value,
            _ => {}
        }
    }
    if beacon.uuid.is_empty() {
        return Err(ProtocolError::MalformedBeacon("missing UUID".into()));
    }
    beacon.address = config_host(&beacon.config_url).or(source);
    Ok(beacon)
}

fn config_host(url: &str) -> Option<IpAddr> {
    let host = url.split('/').next()?;
    let host = host.rsplit_once(':').map_or(host, |(h, _)| h);
    host.parse().ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const BEACON: &str = "AMXB<-UUID=GlobalCache_000C1E024239><-SDKClass=Utility>\
        <-Make=GlobalCache><-Model=iTachIP2IR><-Revision=710-1005-05>\
        <-Pkg_Level=GCPK002><-Config-URL=http://192.168.1.70><-PCB_PN=025-0026-06>\
        <-Status=Ready>\r";

    #[test]
    fn test_parse_beacon_reads_every_field() {
        // Act
        let beacon = parse_beacon(BEACON, None).unwrap();

        // Assert
        assert_eq!(beacon.uuid, "GlobalCache_000C1E024239");
        assert_eq!(beacon.sdk_class, "Utility");
        assert_eq!(beacon.make, "GlobalCache");
        assert_eq!(beacon.model, "iTachIP2IR");
        assert_eq!(beacon.revision, "710-1005-05");
        assert_eq!(beacon.pkg_level, "GCPK002");
        assert_eq!(beacon.config_url, "192.168.1.70");
        assert_eq!(beacon.pcb_pn, "025-0026-06");
        assert_eq!(beacon.status, "Ready");
        assert_eq!(beacon.address, Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 70))));
        assert_eq!(beacon.display_name(), "iTachIP2IR-GlobalCache");
    }

    #[test]
    fn test_parse_beacon_falls_back_to_source_address() {
        let source = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9));
        let beacon = parse_beacon("AMXB<-UUID=abc><-Config-URL=http://itach.local>", Some(source)).unwrap();
        assert_eq!(beacon.address, Some(source));
    }

    #[test]
    fn test_parse_beacon_rejects_other_datagrams() {
        assert!(matches!(
            parse_beacon("M-SEARCH * HTTP/1.1", None),
            Err(ProtocolError::NotABeacon(_))
        ));
        assert!(matches!(
            parse_beacon("AMXB<-Make=GlobalCache>", None),
            Err(ProtocolError::MalformedBeacon(_))
        ));
    }

    #[test]
    fn test_beacon_display_is_parseable() {
        let beacon = parse_beacon(BEACON, None).unwrap();
        let reparsed = parse_beacon(&beacon.to_string(), None).unwrap();
        assert_eq!(reparsed, beacon);
    }
}
