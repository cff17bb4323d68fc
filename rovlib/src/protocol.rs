//! Wire protocol definitions for the surface-to-vehicle link
//!
//! The control channel exchanges one self-contained UTF-8 JSON object per
//! send/receive cycle; the object's field names double as state store
//! keys. The video channel is a raw byte stream where each frame is
//! terminated by a fixed ASCII marker and acknowledged before the sender
//! may transmit the next one.

use std::collections::HashMap;

use log::warn;

use crate::error::RovResult;

/// Store keys eligible to cross the network (agreed with the vehicle side)
pub const TRANSMISSION_KEYS: &[&str] = &[
    "Thr_FP", "Thr_FS", "Thr_AP", "Thr_AS", "Thr_TFP", "Thr_TFS", "Thr_TAP",
    "Thr_TAS", "Mot_R", "Mot_G", "Mot_F", "LED_M",
];

/// Subset of the transmit keys covered by the current safeguard
pub const SAFEGUARD_KEYS: &[&str] = &[
    "Thr_FP", "Thr_FS", "Thr_AP", "Thr_AS", "Thr_TFP", "Thr_TFS", "Thr_TAP",
    "Thr_TAS", "Mot_F", "Mot_G",
];

/// Marker terminating one video frame in the byte stream
pub const FRAME_END_MARKER: &[u8] = b"Frame was successfully sent";

/// Acknowledgement token sent back after a full frame is reassembled
pub const FRAME_ACK: &[u8] = b"ACK";

/// Receive buffer size for both channels; a control message must fit in
/// one receive call
pub const RECV_BUFFER_SIZE: usize = 4096;

/// Serialize a state projection as one control-channel message
pub fn encode_state(data: &HashMap<String, f64>) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(data)
}

/// Decode a control-channel payload into store entries.
///
/// The payload is UTF-8 text holding a flat JSON object whose field names
/// are store keys. Non-numeric fields are logged and skipped.
pub fn decode_state(payload: &[u8]) -> RovResult<HashMap<String, f64>> {
    let text = std::str::from_utf8(payload)?.trim();
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;

    let mut entries = HashMap::with_capacity(object.len());
    for (key, value) in object {
        match value.as_f64() {
            Some(number) => {
                entries.insert(key, number);
            }
            None => warn!("Ignoring non-numeric field {:?} = {}", key, value),
        }
    }
    Ok(entries)
}
