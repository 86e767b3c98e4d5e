//! Portable session strings.
//!
//! Layout (big-endian, 271 bytes before encoding):
//!
//! | field     | type      |
//! |-----------|-----------|
//! | dc_id     | `u8`      |
//! | api_id    | `u32`     |
//! | test_mode | `u8` bool |
//! | auth_key  | 256 bytes |
//! | user_id   | `u64`     |
//! | is_bot    | `u8` bool |
//!
//! encoded as URL-safe base64 without padding.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::errors::StoreError;
use crate::session::{AuthKey, SessionRecord};

const PACKED_LEN: usize = 1 + 4 + 1 + AuthKey::LEN + 8 + 1;

/// Encode a session record. Needs a full-length auth key, an `api_id` and a `user_id`.
pub fn encode(r: &SessionRecord) -> Result<String, StoreError> {
    let key = r.auth_key.as_ref()
        .and_then(AuthKey::to_array)
        .ok_or(StoreError::IncompleteSession("256-byte auth key"))?;
    let api_id  = r.api_id.ok_or(StoreError::IncompleteSession("api_id"))?;
    let user_id = r.user_id.ok_or(StoreError::IncompleteSession("user_id"))?;
    let dc_id   = u8::try_from(r.dc_id)
        .map_err(|_| StoreError::InvalidSessionString(format!("dc_id {} does not fit", r.dc_id)))?;

    let mut b = Vec::with_capacity(PACKED_LEN);
    b.push(dc_id);
    b.extend_from_slice(&(api_id as u32).to_be_bytes());
    b.push(r.test_mode as u8);
    b.extend_from_slice(&key);
    b.extend_from_slice(&(user_id as u64).to_be_bytes());
    b.push(r.is_bot.unwrap_or(false) as u8);
    Ok(URL_SAFE_NO_PAD.encode(b))
}

/// Decode a session string. `date` is left at `0`.
pub fn decode(s: &str) -> Result<SessionRecord, StoreError> {
    let buf = URL_SAFE_NO_PAD
        .decode(s.trim().trim_end_matches('='))
        .map_err(|e| StoreError::InvalidSessionString(e.to_string()))?;
    if buf.len() != PACKED_LEN {
        return Err(StoreError::InvalidSessionString(format!(
            "expected {PACKED_LEN} bytes, got {}", buf.len()
        )));
    }

    const KEY_AT:  usize = 6;
    const USER_AT: usize = KEY_AT + AuthKey::LEN;

    let mut api = [0u8; 4];
    api.copy_from_slice(&buf[1..KEY_AT - 1]);
    let mut user = [0u8; 8];
    user.copy_from_slice(&buf[USER_AT..USER_AT + 8]);

    let dc_id     = i32::from(buf[0]);
    let api_id    = u32::from_be_bytes(api) as i32;
    let test_mode = buf[KEY_AT - 1] != 0;
    let auth_key  = AuthKey::new(&buf[KEY_AT..USER_AT]);
    let user_id   = u64::from_be_bytes(user) as i64;
    let is_bot    = buf[PACKED_LEN - 1] != 0;

    Ok(SessionRecord {
        dc_id,
        api_id: Some(api_id),
        test_mode,
        auth_key: Some(auth_key),
        date: 0,
        user_id: Some(user_id),
        is_bot: Some(is_bot),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        SessionRecord {
            dc_id:     4,
            api_id:    Some(123_456),
            test_mode: false,
            auth_key:  Some(AuthKey::from([0xAB; 256])),
            date:      0,
            user_id:   Some(987_654_321),
            is_bot:    Some(true),
        }
    }

    #[test]
    fn encode_then_decode() {
        let s = encode(&record()).unwrap();
        assert!(!s.contains('=') && !s.contains('+') && !s.contains('/'));
        assert_eq!(decode(&s).unwrap(), record());
    }

    #[test]
    fn encoded_header_layout() {
        let s = encode(&record()).unwrap();
        let raw = URL_SAFE_NO_PAD.decode(s).unwrap();
        assert_eq!(raw.len(), 271);
        assert_eq!(raw[0], 4);
        assert_eq!(&raw[1..5], &123_456u32.to_be_bytes());
        assert_eq!(raw[270], 1);
    }

    #[test]
    fn export_needs_full_record() {
        let mut r = record();
        r.auth_key = Some(AuthKey::new(vec![1, 2, 3]));
        assert!(matches!(encode(&r), Err(StoreError::IncompleteSession(_))));
        let mut r = record();
        r.user_id = None;
        assert!(matches!(encode(&r), Err(StoreError::IncompleteSession("user_id"))));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode("not base64!"), Err(StoreError::InvalidSessionString(_))));
        assert!(matches!(decode("AAAA"), Err(StoreError::InvalidSessionString(_))));
    }
}
