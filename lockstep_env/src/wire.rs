//! Binary framing contract for actions crossing the transport.
//!
//! The transport collaborator owns the byte layout. The scheduler only ever
//! sees decoded values, so a frame that fails to decode never reaches it.
//!
//! Multi-byte integer fields are fixed little-endian. Times and originator
//! ids travel as 48-bit fields.

use crate::error::EnvError;
use crate::types::U48_MAX;

/// An action type that can be carried in an [`ActionEnvelope`](crate::ActionEnvelope).
pub trait WireFormat: Sized {
    /// Encodes the value into a self-contained frame.
    fn encode(&self) -> Result<Vec<u8>, EnvError>;

    /// Decodes a frame produced by [`WireFormat::encode`].
    fn decode(bytes: &[u8]) -> Result<Self, EnvError>;
}

/// Appends a 48-bit little-endian field.
pub fn put_u48_le(buf: &mut Vec<u8>, value: u64, field: &str) -> Result<(), EnvError> {
    if value > U48_MAX {
        return Err(EnvError::serialization(format!(
            "{field} {value} does not fit in 48 bits"
        )));
    }
    buf.extend_from_slice(&value.to_le_bytes()[..6]);
    Ok(())
}

/// Reads a 48-bit little-endian field starting at `offset`.
pub fn get_u48_le(bytes: &[u8], offset: usize, field: &str) -> Result<u64, EnvError> {
    let raw = bytes.get(offset..offset + 6).ok_or_else(|| {
        EnvError::serialization(format!(
            "frame truncated reading {field}: need {} bytes, have {}",
            offset + 6,
            bytes.len()
        ))
    })?;
    let mut full = [0u8; 8];
    full[..6].copy_from_slice(raw);
    Ok(u64::from_le_bytes(full))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u48_layout_is_little_endian() {
        let mut buf = Vec::new();
        put_u48_le(&mut buf, 0x0102_0304_0506, "time").unwrap();
        assert_eq!(buf, vec![0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(get_u48_le(&buf, 0, "time").unwrap(), 0x0102_0304_0506);
    }

    #[test]
    fn test_u48_rejects_oversized_values() {
        let mut buf = Vec::new();
        assert!(put_u48_le(&mut buf, U48_MAX, "pid").is_ok());
        assert!(put_u48_le(&mut buf, U48_MAX + 1, "pid").is_err());
    }

    #[test]
    fn test_u48_truncated_frame() {
        let err = get_u48_le(&[1, 2, 3], 0, "time").unwrap_err();
        assert!(matches!(err, EnvError::SerializationError(_)));
    }
}
