//! Wire message formatting for forwarded sensor readings.
//!
//! A reading is rendered once, at `forward()` time, into the JSON object
//! the gateway protocol expects; from then on it travels as an opaque
//! string through the publish and cache paths. Field order is fixed by
//! the struct declaration and both timestamps are serialized as strings,
//! matching what receivers of this format already parse.

use serde::Serialize;

/// Offset of the advertisement's length byte within the raw payload.
const DATA_LENGTH_OFFSET: usize = 3;

/// Bytes of frame metadata preceding the advertised length.
const FRAME_METADATA_LEN: usize = 4;

/// The outbound message, in wire field order.
#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    gw_mac: &'a str,
    rssi: i32,
    aoa: [f64; 0],
    gwts: String,
    ts: String,
    data: String,
    coords: &'static str,
}

/// Renders a raw reading into the JSON wire message.
///
/// The hex `data` field carries the payload truncated to the length byte
/// at offset 3 plus the 4 metadata bytes; payloads too short to carry a
/// length byte, or whose advertised length overruns the buffer, are
/// encoded whole. `gwts` and `ts` both carry `ts_unix` and are always
/// identical.
///
/// # Errors
///
/// Propagates the JSON serializer's error; with this flat struct that is
/// effectively unreachable, but the caller absorbs it anyway.
pub fn render(
    payload: &[u8],
    rssi: i32,
    gateway_id: &str,
    ts_unix: i64,
) -> Result<String, serde_json::Error> {
    let stamp = ts_unix.to_string();
    let message = WireMessage {
        gw_mac: gateway_id,
        rssi,
        aoa: [],
        gwts: stamp.clone(),
        ts: stamp,
        data: hex::encode_upper(&payload[..frame_len(payload)]),
        coords: "",
    };
    serde_json::to_string(&message)
}

/// How many leading payload bytes belong to the frame.
fn frame_len(payload: &[u8]) -> usize {
    match payload.get(DATA_LENGTH_OFFSET) {
        Some(&len) => {
            let wanted = len as usize + FRAME_METADATA_LEN;
            if wanted <= payload.len() {
                wanted
            } else {
                payload.len()
            }
        }
        None => payload.len(),
    }
}
