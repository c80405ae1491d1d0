//! iTach command strings and device responses.
//!
//! Commands are ASCII lines terminated by a carriage return.  An IR command
//! carries a numeric id which the device echoes in its reply; callers write
//! the literal `<tag>` where that id goes and [`encode_command`] fills it in.
//!
//! # Replies
//!
//! | Line                       | Meaning                                 |
//! |----------------------------|-----------------------------------------|
//! | `completeir,1:3,42`        | IR command 42 finished on module 1 / 3  |
//! | `busyIR,1:3,42`            | connector busy, command 42 not sent     |
//! | `ERR_1:3,010`              | error 010 on module 1 / connector 3     |
//! | `ERR 017`                  | error 017, no address                   |
//! | anything else              | acknowledgement (e.g. `getversion`)     |

use thiserror::Error;

/// Placeholder replaced by the caller's tag before a command is sent.
pub const TAG_PLACEHOLDER: &str = "<tag>";

/// Errors that can occur while decoding iTach traffic.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ProtocolError {
    /// The datagram is not an `AMXB` beacon.
    #[error("not a device beacon: {0:?}")]
    NotABeacon(String),

    /// A beacon field is malformed or a required one is missing.
    #[error("malformed beacon: {0}")]
    MalformedBeacon(String),

    /// A reply line could not be decoded.
    #[error("malformed response {line:?}: {reason}")]
    MalformedResponse { line: String, reason: String },
}

/// A learned IR code addressed to one connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrCode {
    /// Connector on module 1 (1-3 on an iTach IP2IR).
    pub port: u8,
    /// Carrier frequency in Hz.
    pub frequency: u32,
    pub repeat: u8,
    /// Index in `pattern` where repeats restart.
    pub offset: u16,
    /// Comma-separated on/off pulse counts.
    pub pattern: String,
}

impl IrCode {
    /// The `sendir` command for this code, with a `<tag>` placeholder for the id.
    pub fn command(&self) -> String {
        format!(
            "sendir,1:{},{TAG_PLACEHOLDER},{},{},{},{}",
            self.port, self.frequency, self.repeat, self.offset, self.pattern
        )
    }
}

/// Fills in `tag` and terminates `command` with a carriage return.
pub fn encode_command(command: &str, tag: u32) -> String {
    let mut line = command
        .trim_end_matches(['\r', '\n'])
        .replace(TAG_PLACEHOLDER, &tag.to_string());
    line.push('\r');
    line
}

/// One decoded reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceResponse {
    CompleteIr { module: u8, connector: u8, id: u32 },
    BusyIr { module: u8, connector: u8, id: u32 },
    Error { address: Option<(u8, u8)>, code: u8 },
    Ack(String),
}

impl DeviceResponse {
    /// `true` for a completed IR command or a plain acknowledgement.
    pub fn is_success(&self) -> bool {
        matches!(self, DeviceResponse::CompleteIr { .. } | DeviceResponse::Ack(_))
    }

    /// The command id echoed by the device, when the reply carries one.
    pub fn tag(&self) -> Option<u32> {
        match self {
            DeviceResponse::CompleteIr { id, .. } | DeviceResponse::BusyIr { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Human-readable reason for an unsuccessful reply.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            DeviceResponse::BusyIr {
                module, connector, ..
            } => Some(format!("connector {module}:{connector} is busy")),
            DeviceResponse::Error { code, .. } => {
                Some(format!("ERR {code:03}: {}", error_description(*code)))
            }
            _ => None,
        }
    }
}

/// Decodes one reply line (with or without its trailing `\r`).
pub fn parse_response(line: &str) -> Result<DeviceResponse, ProtocolError> {
    let line = line.trim_matches(|c: char| c == '\r' || c == '\n' || c == ' ');
    let malformed = |reason: &str| ProtocolError::MalformedResponse {
        line: line.to_string(),
        reason: reason.to_string(),
    };
    if line.is_empty() {
        return Err(malformed("empty line"));
    }

    if let Some(rest) = line.strip_prefix("completeir,") {
        let (module, connector, id) = addressed_id(rest).ok_or_else(|| malformed("bad completeir"))?;
        return Ok(DeviceResponse::CompleteIr {
            module,
            connector,
            id,
        });
    }
    if let Some(rest) = line.strip_prefix("busyIR,") {
        let (module, connector, id) = addressed_id(rest).ok_or_else(|| malformed("bad busyIR"))?;
        return Ok(DeviceResponse::BusyIr {
            module,
            connector,
            id,
        });
    }
    if let Some(rest) = line.strip_prefix("ERR_") {
        let (address, code) = rest.split_once(',').ok_or_else(|| malformed("missing error code"))?;
        let address = module_connector(address).ok_or_else(|| malformed("bad error address"))?;
        let code = code.trim().parse().map_err(|_| malformed("bad error code"))?;
        return Ok(DeviceResponse::Error {
            address: Some(address),
            code,
        });
    }
    if let Some(rest) = line.strip_prefix("ERR") {
        let code = rest
            .trim_start_matches([' ', ','])
            .parse()
            .map_err(|_| malformed("bad error code"))?;
        return Ok(DeviceResponse::Error {
            address: None,
            code,
        });
    }
    Ok(DeviceResponse::Ack(line.to_string()))
}

fn module_connector(s: &str) -> Option<(u8, u8)> {
    let (module, connector) = s.split_once(':')?;
    Some((module.trim().parse().ok()?, connector.trim().parse().ok()?))
}

fn addressed_id(s: &str) -> Option<(u8, u8, u32)> {
    let (address, id) = s.split_once(',')?;
    let (module, connector) = module_connector(address)?;
    Some((module, connector, id.trim().parse().ok()?))
}

/// Description of an iTach `ERR` code.
pub fn error_description(code: u8) -> &'static str {
    match code {
        1 => "invalid command, command not found",
        2 => "invalid module address",
        3 => "invalid connector address",
        4 => "invalid ID value",
        5 => "invalid frequency value",
        6 => "invalid repeat value",
        7 => "invalid offset value",
        8 => "invalid pulse count",
        9 => "invalid pulse data",
        10 => "uneven amount of on/off statements",
        11 => "no carriage return found",
        12 => "repeat count exceeded",
        13 => "IR command sent to input connector",
        14 => "blaster command sent to non-blaster connector",
        15 => "no carriage return before buffer full",
        16 => "no carriage return",
        17 => "bad command syntax",
        18 => "sensor command sent to non-input connector",
        19 => "repeated IR transmission failure",
        20 => "above designated IR on/off pair limit",
        21 => "symbol odd boundary",
        22 => "undefined symbol",
        23 => "unknown option",
        24 => "invalid baud rate setting",
        25 => "invalid flow control setting",
        26 => "invalid parity setting",
        27 => "settings are locked",
        _ => "unknown error",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn power_code() -> IrCode {
        IrCode {
            port: 2,
            frequency: 38_000,
            repeat: 1,
            offset: 1,
            pattern: "343,171,21,64,21,1517".into(),
        }
    }

    #[test]
    fn test_ir_code_command_has_tag_placeholder() {
        assert_eq!(
            power_code().command(),
            "sendir,1:2,<tag>,38000,1,1,343,171,21,64,21,1517"
        );
    }

    #[test]
    fn test_encode_command_substitutes_tag_and_terminates_with_cr() {
        let line = encode_command(&power_code().command(), 42);
        assert_eq!(line, "sendir,1:2,42,38000,1,1,343,171,21,64,21,1517\r");
    }

    #[test]
    fn test_encode_command_does_not_double_terminate() {
        assert_eq!(encode_command("getversion\r\n", 7), "getversion\r");
    }

    #[test]
    fn test_parse_response_completeir_carries_tag() {
        let response = parse_response("completeir,1:2,42\r").unwrap();
        assert_eq!(
            response,
            DeviceResponse::CompleteIr {
                module: 1,
                connector: 2,
                id: 42
            }
        );
        assert!(response.is_success());
        assert_eq!(response.tag(), Some(42));
    }

    #[test]
    fn test_parse_response_busy_is_failure() {
        let response = parse_response("busyIR,1:3,9").unwrap();
        assert!(!response.is_success());
        assert_eq!(response.failure_reason().unwrap(), "connector 1:3 is busy");
    }

    #[test]
    fn test_parse_response_addressed_error_code() {
        let response = parse_response("ERR_1:1,010").unwrap();
        assert_eq!(
            response,
            DeviceResponse::Error {
                address: Some((1, 1)),
                code: 10
            }
        );
        assert_eq!(
            response.failure_reason().unwrap(),
            "ERR 010: uneven amount of on/off statements"
        );
    }

    #[test]
    fn test_parse_response_plain_error_code() {
        assert_eq!(
            parse_response("ERR 017").unwrap(),
            DeviceResponse::Error {
                address: None,
                code: 17
            }
        );
    }

    #[test]
    fn test_parse_response_other_line_is_ack() {
        assert_eq!(
            parse_response("710-1005-05\r").unwrap(),
            DeviceResponse::Ack("710-1005-05".into())
        );
    }

    #[test]
    fn test_parse_response_rejects_garbled_completeir() {
        assert!(matches!(
            parse_response("completeir,x"),
            Err(ProtocolError::MalformedResponse { .. })
        ));
        assert!(parse_response("\r").is_err());
    }
}
