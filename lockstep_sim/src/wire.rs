//! Binary frames for walkers actions.
//!
//! ```text
//! SetNick:   [0] [time: u48 LE] [pid: u48 LE] [name: UTF-8 ...]
//! KeyEvent:  [1] [time: u48 LE] [pid: u48 LE] [key: u8] [down: 0|1]
//! ```

use crate::game::{KeyCode, WalkAction};
use lockstep_env::wire::{get_u48_le, put_u48_le};
use lockstep_env::{EnvError, WireFormat};

const TAG_SET_NICK: u8 = 0;
const TAG_KEY_EVENT: u8 = 1;

/// Tag, time and pid.
const HEADER_LEN: usize = 13;

impl WireFormat for WalkAction {
    fn encode(&self) -> Result<Vec<u8>, EnvError> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 2);
        match self {
            WalkAction::SetNick { time, pid, name } => {
                buf.push(TAG_SET_NICK);
                put_u48_le(&mut buf, *time, "time")?;
                put_u48_le(&mut buf, *pid, "pid")?;
                buf.extend_from_slice(name.as_bytes());
            }
            WalkAction::KeyEvent {
                time,
                pid,
                key,
                down,
            } => {
                buf.push(TAG_KEY_EVENT);
                put_u48_le(&mut buf, *time, "time")?;
                put_u48_le(&mut buf, *pid, "pid")?;
                buf.push(key.0);
                buf.push(u8::from(*down));
            }
        }
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> Result<Self, EnvError> {
        let tag = *bytes
            .first()
            .ok_or_else(|| EnvError::serialization("empty action frame"))?;
        if tag != TAG_SET_NICK && tag != TAG_KEY_EVENT {
            return Err(EnvError::serialization(format!("unknown action tag {tag}")));
        }

        let time = get_u48_le(bytes, 1, "time")?;
        let pid = get_u48_le(bytes, 7, "pid")?;

        if tag == TAG_SET_NICK {
            let name = std::str::from_utf8(&bytes[HEADER_LEN..])
                .map_err(|e| EnvError::serialization(format!("nickname is not UTF-8: {e}")))?;
            return Ok(WalkAction::SetNick {
                time,
                pid,
                name: name.to_string(),
            });
        }

        let body = bytes.get(HEADER_LEN..HEADER_LEN + 2).ok_or_else(|| {
            EnvError::serialization(format!(
                "key event truncated: need {} bytes, have {}",
                HEADER_LEN + 2,
                bytes.len()
            ))
        })?;
        let down = match body[1] {
            0 => false,
            1 => true,
            other => {
                return Err(EnvError::serialization(format!(
                    "key state must be 0 or 1, got {other}"
                )))
            }
        };
        Ok(WalkAction::KeyEvent {
            time,
            pid,
            key: KeyCode(body[0]),
            down,
        })
    }
}
