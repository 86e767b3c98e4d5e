//! Marked peer ids.
//!
//! Telegram hands out raw ids per peer class. The store keys everything on a
//! single signed "marked" id instead: users are positive, basic groups are the
//! negated chat id, channels are `MAX_CHANNEL_ID - channel_id`.

use crate::errors::StoreError;

pub const MIN_CHANNEL_ID: i64 = -1_002_147_483_647;
pub const MAX_CHANNEL_ID: i64 = -1_000_000_000_000;
pub const MIN_CHAT_ID:    i64 = -999_999_999_999;
pub const MAX_USER_ID:    i64 = 999_999_999_999;

/// Peer class implied by the range a marked id falls in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerType {
    User,
    Chat,
    Channel,
}

/// Classify a marked id.
pub fn peer_type(peer_id: i64) -> Result<PeerType, StoreError> {
    if peer_id < 0 {
        if MIN_CHAT_ID <= peer_id {
            return Ok(PeerType::Chat);
        }
        if (MIN_CHANNEL_ID..MAX_CHANNEL_ID).contains(&peer_id) {
            return Ok(PeerType::Channel);
        }
    } else if (1..=MAX_USER_ID).contains(&peer_id) {
        return Ok(PeerType::User);
    }
    Err(StoreError::InvalidPeerId(peer_id))
}

/// Raw channel id from a marked channel id.
pub fn channel_id(peer_id: i64) -> Result<i64, StoreError> {
    MAX_CHANNEL_ID.checked_sub(peer_id).ok_or(StoreError::InvalidPeerId(peer_id))
}

/// Marked id from a raw channel id.
pub fn marked_channel_id(channel_id: i64) -> Result<i64, StoreError> {
    MAX_CHANNEL_ID.checked_sub(channel_id).ok_or(StoreError::InvalidPeerId(channel_id))
}

/// Raw basic-group id from a marked chat id.
pub fn chat_id(peer_id: i64) -> Result<i64, StoreError> {
    peer_id.checked_neg().ok_or(StoreError::InvalidPeerId(peer_id))
}

/// Marked id from a raw basic-group id.
pub fn marked_chat_id(chat_id: i64) -> Result<i64, StoreError> {
    chat_id.checked_neg().ok_or(StoreError::InvalidPeerId(chat_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_id_ranges() {
        assert_eq!(peer_type(777).unwrap(), PeerType::User);
        assert_eq!(peer_type(-123).unwrap(), PeerType::Chat);
        assert_eq!(peer_type(-1_001_234_567_890).unwrap(), PeerType::Channel);
        assert!(matches!(peer_type(0), Err(StoreError::InvalidPeerId(0))));
        assert!(peer_type(MAX_CHANNEL_ID).is_err());
    }

    #[test]
    fn channel_ids_round_trip() {
        let marked = marked_channel_id(1_234_567_890).unwrap();
        assert_eq!(marked, -1_001_234_567_890);
        assert_eq!(channel_id(marked).unwrap(), 1_234_567_890);
        assert_eq!(marked_chat_id(55).unwrap(), -55);
        assert_eq!(chat_id(-55).unwrap(), 55);
    }

    #[test]
    fn conversions_refuse_to_overflow() {
        assert!(matches!(channel_id(i64::MAX), Err(StoreError::InvalidPeerId(i64::MAX))));
        assert!(matches!(marked_channel_id(i64::MAX), Err(StoreError::InvalidPeerId(_))));
        assert!(matches!(chat_id(i64::MIN), Err(StoreError::InvalidPeerId(i64::MIN))));
        assert!(matches!(marked_chat_id(i64::MIN), Err(StoreError::InvalidPeerId(_))));
    }
}
