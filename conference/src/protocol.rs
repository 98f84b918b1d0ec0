//! App-level message envelope carried over the conference backend's
//! unicast data channel (spec.md §4.6 "App-level messaging protocol").
//!
//! Everything that is not a track or presence event rides inside one of
//! these frames so the normalized `ConferenceEvent` set stays independent
//! of whatever custom-event support (or lack of it) the backend offers.

use room_core::Error;
use serde::{Deserialize, Serialize};

/// Fingerprint every frame carries so receivers can cheaply discard
/// traffic that isn't ours (spec.md §7, failure kind 5: protocol mismatch
/// is silently discarded, never surfaced as an error).
pub const APP_FINGERPRINT: &str = "room.rs";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppFrame {
    pub hax: String,
    pub command: String,
    pub value: serde_json::Value,
}

impl AppFrame {
    pub fn new(command: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            hax: APP_FINGERPRINT.to_string(),
            command: command.into(),
            value,
        }
    }

    pub fn is_recognized(&self) -> bool {
        self.hax == APP_FINGERPRINT
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decodes a frame, returning `Ok(None)` (not an error) for a frame
    /// whose fingerprint doesn't match ours — that path is a silent
    /// discard per the failure taxonomy, not a caller-visible error.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>, Error> {
        let frame: AppFrame =
            serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))?;
        if frame.is_recognized() {
            Ok(Some(frame))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let frame = AppFrame::new("userMoved", serde_json::json!({"x": 1.0, "y": 2.0, "z": 3.0}));
        let bytes = frame.encode().unwrap();
        let decoded = AppFrame::decode(&bytes).unwrap().unwrap();
        assert_eq!(decoded.command, "userMoved");
    }

    #[test]
    fn mismatched_fingerprint_is_discarded_not_errored() {
        let bytes = serde_json::to_vec(&serde_json::json!({
            "hax": "SomeOtherApp",
            "command": "userMoved",
            "value": {}
        }))
        .unwrap();
        let decoded = AppFrame::decode(&bytes).unwrap();
        assert!(decoded.is_none());
    }
}
