//! Miner API version response parsing.
//!
//! Pure functions only — the bytes come from `infra::network`.

use bosflash_common::FirmwareKind;
use serde_json::Value;

use crate::domain::error::ProbeError;

/// TCP port of the cgminer-compatible JSON API.
pub const API_PORT: u16 = 4028;

/// Request sent to the API port to identify the firmware.
pub const VERSION_REQUEST: &[u8] = br#"{"command":"version"}"#;

/// Keys in `VERSION[0]` that only BraiinsOS (bosminer family) reports.
pub const UPGRADED_KEYS: &[&str] = &["BOSminer", "bosminer", "BOSer"];

/// Keys consulted, in order, for the human-readable version string.
const VERSION_STRING_KEYS: &[&str] = &["BOSminer", "bosminer", "BOSer", "CGMiner", "BMMiner", "Miner"];

/// Result of a successful firmware identity query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareIdentity {
    pub kind: FirmwareKind,
    /// Descriptive version string, when the response carried one.
    pub version: Option<String>,
}

impl FirmwareIdentity {
    /// Identity used when the API keeps refusing connections.
    #[must_use]
    pub fn stock_fallback() -> Self {
        Self {
            kind: FirmwareKind::StockFirmware,
            version: None,
        }
    }
}

/// Parse a raw API response into a [`FirmwareIdentity`].
///
/// The miner terminates its JSON with a NUL byte (sometimes followed by a
/// newline); trailing terminators are stripped before parsing.
///
/// # Errors
///
/// Returns [`ProbeError::Protocol`] if the payload is not JSON or has no
/// `VERSION[0]` object.
pub fn parse_version_response(raw: &[u8]) -> Result<FirmwareIdentity, ProbeError> {
    let end = raw
        .iter()
        .rposition(|b| !matches!(b, 0 | b'\n' | b'\r'))
        .map_or(0, |i| i + 1);
    let payload: Value = serde_json::from_slice(&raw[..end])
        .map_err(|e| ProbeError::Protocol(format!("invalid JSON: {e}")))?;

    let entry = payload
        .get("VERSION")
        .and_then(Value::as_array)
        .and_then(|v| v.first())
        .and_then(Value::as_object)
        .ok_or_else(|| ProbeError::Protocol("missing VERSION[0] object".to_string()))?;

    let kind = if UPGRADED_KEYS.iter().any(|k| entry.contains_key(*k)) {
        FirmwareKind::UpgradedFirmware
    } else {
        FirmwareKind::StockFirmware
    };

    let version = VERSION_STRING_KEYS
        .iter()
        .find_map(|k| entry.get(*k).and_then(Value::as_str))
        .or_else(|| entry.values().find_map(Value::as_str))
        .map(str::to_string);

    Ok(FirmwareIdentity { kind, version })
}
