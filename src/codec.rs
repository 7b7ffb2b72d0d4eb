//! Versioned payload format for stored session data
//!
//! Records hold a JSON document `{"v":1,"values":{...}}`. The version field
//! lets other implementations sharing the backend detect incompatible payloads.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::session::SessionValues;

/// Current payload format version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct PayloadRef<'a> {
    v: u32,
    values: &'a SessionValues,
}

#[derive(Deserialize)]
struct Payload {
    v: u32,
    #[serde(default)]
    values: SessionValues,
}

/// Serialize session values into a record payload
pub fn encode_values(values: &SessionValues) -> Result<Vec<u8>, SessionError> {
    let payload = PayloadRef {
        v: FORMAT_VERSION,
        values,
    };
    Ok(serde_json::to_vec(&payload)?)
}

/// Deserialize a record payload into session values
pub fn decode_values(bytes: &[u8]) -> Result<SessionValues, SessionError> {
    let payload: Payload = serde_json::from_slice(bytes)?;
    if payload.v != FORMAT_VERSION {
        return Err(SessionError::Serialization(format!(
            "unsupported payload version {} (expected {})",
            payload.v, FORMAT_VERSION
        )));
    }
    Ok(payload.values)
}
